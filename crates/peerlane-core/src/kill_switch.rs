use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

/// One-way shutdown signal shared by the stages of a stream.
///
/// An association hands its control-idle switch over to the next
/// incarnation so that a single stream shutdown covers both.
#[derive(Debug)]
pub struct KillSwitch {
    name: String,
    shutdown: AtomicBool,
}

impl KillSwitch {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            shutdown: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Trip the switch. Returns `true` if this call tripped it.
    pub fn shutdown(&self) -> bool {
        let tripped = !self.shutdown.swap(true, Ordering::AcqRel);
        if tripped {
            debug!(switch = %self.name, "kill switch tripped");
        }
        tripped
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shutdown_trips_once() {
        let switch = KillSwitch::new("control-idle");
        assert!(!switch.is_shutdown());
        assert!(switch.shutdown());
        assert!(!switch.shutdown());
        assert!(switch.is_shutdown());
        assert_eq!(switch.name(), "control-idle");
    }
}

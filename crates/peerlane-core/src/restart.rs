use std::time::{Duration, Instant};

use tracing::debug;

use crate::snapshot::Snapshot;

/// Outcome of a pipeline failure, as decided by a [`RestartCounter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartDecision {
    /// Still within budget: restart the failed sub-pipeline.
    Restart,
    /// Budget exhausted within the window: the owner should tear down.
    GiveUp,
}

#[derive(Debug, Clone, Copy)]
struct State {
    count: u32,
    deadline: Instant,
}

/// Counts restarts within a rolling window.
///
/// A restart after the window has expired starts a new window with a count
/// of one. Shared by the inbound and outbound pipelines.
#[derive(Debug)]
pub struct RestartCounter {
    max_restarts: u32,
    restart_timeout: Duration,
    state: Snapshot<State>,
}

impl RestartCounter {
    pub fn new(max_restarts: u32, restart_timeout: Duration) -> Self {
        Self::starting_at(max_restarts, restart_timeout, Instant::now())
    }

    /// Counter whose first window opens at `now`.
    pub fn starting_at(max_restarts: u32, restart_timeout: Duration, now: Instant) -> Self {
        Self {
            max_restarts,
            restart_timeout,
            state: Snapshot::new(State {
                count: 0,
                deadline: now + restart_timeout,
            }),
        }
    }

    pub fn max_restarts(&self) -> u32 {
        self.max_restarts
    }

    pub fn restart_timeout(&self) -> Duration {
        self.restart_timeout
    }

    /// Restarts counted in the current window.
    pub fn count(&self) -> u32 {
        self.state.load().count
    }

    /// Record a restart now. Returns `true` while the count is within budget.
    pub fn restart(&self) -> bool {
        self.restart_at(Instant::now())
    }

    /// Record a restart at `now`. Returns `true` while the count is within
    /// budget.
    pub fn restart_at(&self, now: Instant) -> bool {
        let timeout = self.restart_timeout;
        let updated = self.state.update(|state| {
            if now <= state.deadline {
                State {
                    count: state.count.saturating_add(1),
                    deadline: state.deadline,
                }
            } else {
                State {
                    count: 1,
                    deadline: now + timeout,
                }
            }
        });

        let within = updated.count <= self.max_restarts;
        debug!(
            count = updated.count,
            max = self.max_restarts,
            within,
            "restart recorded"
        );
        within
    }

    /// Record a restart and map the result to a [`RestartDecision`].
    pub fn decide(&self) -> RestartDecision {
        self.decide_at(Instant::now())
    }

    pub fn decide_at(&self, now: Instant) -> RestartDecision {
        if self.restart_at(now) {
            RestartDecision::Restart
        } else {
            RestartDecision::GiveUp
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn three_restarts_within_window_then_give_up() {
        let start = Instant::now();
        let counter = RestartCounter::starting_at(3, Duration::from_secs(1), start);

        let within = start + Duration::from_millis(100);
        assert!(counter.restart_at(within));
        assert!(counter.restart_at(within));
        assert!(counter.restart_at(within));
        assert!(!counter.restart_at(within));
        assert_eq!(counter.count(), 4);
    }

    #[test]
    fn expired_window_resets_count() {
        let start = Instant::now();
        let counter = RestartCounter::starting_at(3, Duration::from_secs(1), start);
        for _ in 0..4 {
            counter.restart_at(start);
        }
        assert_eq!(counter.decide_at(start), RestartDecision::GiveUp);

        let later = start + Duration::from_secs(2);
        assert!(counter.restart_at(later));
        assert_eq!(counter.count(), 1);

        // The new window is anchored at `later`.
        assert!(counter.restart_at(later + Duration::from_millis(900)));
        assert_eq!(counter.count(), 2);
    }

    #[test]
    fn decide_maps_budget_to_decision() {
        let counter = RestartCounter::new(1, Duration::from_secs(60));
        assert_eq!(counter.decide(), RestartDecision::Restart);
        assert_eq!(counter.decide(), RestartDecision::GiveUp);
    }
}

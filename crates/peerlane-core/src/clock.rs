use std::sync::OnceLock;
use std::time::Instant;

static ORIGIN: OnceLock<Instant> = OnceLock::new();

fn origin() -> Instant {
    *ORIGIN.get_or_init(Instant::now)
}

/// Nanoseconds elapsed on a process-wide monotonic clock.
///
/// Values are only comparable with other values from this function.
pub fn monotonic_nanos() -> u64 {
    nanos_of(Instant::now())
}

/// Position of `instant` on the same clock as [`monotonic_nanos`].
///
/// Instants taken before the clock was first read map to zero.
pub fn nanos_of(instant: Instant) -> u64 {
    let elapsed = instant.saturating_duration_since(origin());
    u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn monotonic_nanos_never_goes_backwards() {
        let a = monotonic_nanos();
        let b = monotonic_nanos();
        assert!(b >= a);
    }

    #[test]
    fn nanos_of_tracks_instant_offsets() {
        monotonic_nanos();
        let base = Instant::now();
        let later = base + Duration::from_millis(5);
        assert_eq!(nanos_of(later) - nanos_of(base), 5_000_000);
    }
}

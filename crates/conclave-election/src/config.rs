//! Election timing configuration.

use std::time::Duration;

/// How long the election loop keeps draining the receive queue once it
/// believes it has reached the end of the election, waiting for a
/// last-minute better candidate.
pub const FINALIZE_WAIT: Duration = Duration::from_millis(200);

/// Poll interval of the messenger workers. Bounds how long a worker takes
/// to notice a shutdown request.
pub(crate) const WORKER_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Tunable timing bounds for the election loop.
#[derive(Debug, Clone)]
pub struct ElectionConfig {
    /// Lower bound on the idle-notification check, and the starting value
    /// of the backoff sequence.
    pub min_notification_interval: Duration,
    /// Upper bound on the time between two consecutive notification
    /// checks. This impacts how quickly the ensemble recovers after long
    /// partitions.
    pub max_notification_interval: Duration,
}

impl Default for ElectionConfig {
    fn default() -> Self {
        Self {
            min_notification_interval: FINALIZE_WAIT,
            max_notification_interval: Duration::from_secs(60),
        }
    }
}

/// One step of the idle backoff: double, clamped to `max`.
pub(crate) fn next_timeout(current: Duration, max: Duration) -> Duration {
    (current * 2).min(max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ElectionConfig::default();
        assert_eq!(config.min_notification_interval, FINALIZE_WAIT);
        assert_eq!(config.max_notification_interval, Duration::from_secs(60));
    }

    #[test]
    fn backoff_doubles_until_clamped() {
        let config = ElectionConfig::default();
        let max = config.max_notification_interval;

        let mut t = config.min_notification_interval;
        let mut observed = Vec::new();
        for _ in 0..12 {
            t = next_timeout(t, max);
            observed.push(t);
        }

        // 400ms, 800ms, ... doubling, then pinned at the maximum
        let mut expected = Vec::new();
        let mut e = config.min_notification_interval;
        for _ in 0..12 {
            e = (e * 2).min(max);
            expected.push(e);
        }
        assert_eq!(observed, expected);
        assert_eq!(*observed.last().unwrap(), max);
    }
}

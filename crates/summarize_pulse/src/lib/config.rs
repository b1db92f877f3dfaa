use std::time::Duration;

/// Polling and batching policy of a [`crate::SummarizeStatusTracker`]
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Delay between status polls of a pending episode
    pub poll_interval: Duration,
    /// Polls without progress an episode may take. The poll after that
    /// marks it as timed out.
    pub max_poll_attempts: u32,
    /// How long lookups are collected before a batch is sent
    pub lookup_window: Duration,
    /// Batches are flushed early once they hold this many urls
    pub max_lookup_batch: usize,
    /// Capacity of the event broadcast channel
    pub event_capacity: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            max_poll_attempts: 120,
            lookup_window: Duration::from_millis(50),
            max_lookup_batch: 50,
            event_capacity: 256,
        }
    }
}

impl TrackerConfig {
    /// Clamps values that would stall the tracker
    pub(crate) fn sanitized(mut self) -> Self {
        if self.poll_interval.is_zero() {
            self.poll_interval = Duration::from_millis(1);
        }
        self.max_lookup_batch = self.max_lookup_batch.max(1);
        self.event_capacity = self.event_capacity.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitized_clamps_zero_values() {
        let config = TrackerConfig {
            poll_interval: Duration::ZERO,
            max_poll_attempts: 0,
            lookup_window: Duration::ZERO,
            max_lookup_batch: 0,
            event_capacity: 0,
        }
        .sanitized();

        assert_eq!(config.poll_interval, Duration::from_millis(1));
        assert_eq!(config.max_poll_attempts, 0);
        assert_eq!(config.max_lookup_batch, 1);
        assert_eq!(config.event_capacity, 1);
        assert_eq!(config.lookup_window, Duration::ZERO);
    }
}

use std::time::Duration;

use episode_api::{BatchAvailabilityEndpoint, ImportEndpoint, StatusEndpoint};

use crate::{SummarizeStatusTracker, TrackerConfig};

pub struct SummarizeStatusTrackerBuilder<I = (), S = (), B = ()> {
    import: I,
    status: S,
    availability: B,
    config: TrackerConfig,
}

impl SummarizeStatusTrackerBuilder {
    pub fn new() -> Self {
        Self {
            import: (),
            status: (),
            availability: (),
            config: TrackerConfig::default(),
        }
    }
}

impl Default for SummarizeStatusTrackerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl<I, S, B> SummarizeStatusTrackerBuilder<I, S, B> {
    pub fn import_endpoint<I2: ImportEndpoint + Send + Sync + 'static>(
        self,
        import: I2,
    ) -> SummarizeStatusTrackerBuilder<I2, S, B> {
        SummarizeStatusTrackerBuilder {
            import,
            status: self.status,
            availability: self.availability,
            config: self.config,
        }
    }

    pub fn status_endpoint<S2: StatusEndpoint + Send + Sync + 'static>(
        self,
        status: S2,
    ) -> SummarizeStatusTrackerBuilder<I, S2, B> {
        SummarizeStatusTrackerBuilder {
            import: self.import,
            status,
            availability: self.availability,
            config: self.config,
        }
    }

    pub fn availability_endpoint<B2: BatchAvailabilityEndpoint + Send + Sync + 'static>(
        self,
        availability: B2,
    ) -> SummarizeStatusTrackerBuilder<I, S, B2> {
        SummarizeStatusTrackerBuilder {
            import: self.import,
            status: self.status,
            availability,
            config: self.config,
        }
    }

    pub fn config(mut self, config: TrackerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn poll_interval(mut self, poll_interval: Duration) -> Self {
        self.config.poll_interval = poll_interval;
        self
    }

    pub fn max_poll_attempts(mut self, max_poll_attempts: u32) -> Self {
        self.config.max_poll_attempts = max_poll_attempts;
        self
    }

    pub fn lookup_window(mut self, lookup_window: Duration) -> Self {
        self.config.lookup_window = lookup_window;
        self
    }
}

impl<I, S, B> SummarizeStatusTrackerBuilder<I, S, B>
where
    I: ImportEndpoint + Send + Sync + 'static,
    S: StatusEndpoint + Send + Sync + 'static,
    B: BatchAvailabilityEndpoint + Send + Sync + 'static,
{
    /// Spawns the poll driver and lookup batcher, so this must run inside a
    /// tokio runtime
    pub fn build(self) -> SummarizeStatusTracker<I, S, B> {
        SummarizeStatusTracker::start(self.import, self.status, self.availability, self.config)
    }
}

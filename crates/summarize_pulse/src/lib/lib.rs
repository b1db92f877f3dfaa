mod config;
mod error;
mod lookup;
pub mod tracing;
mod tracker;
mod types;

pub use config::TrackerConfig;
pub use error::{ImportError, TrackerError};
pub use tracker::{builder::SummarizeStatusTrackerBuilder, SummarizeStatusTracker};
pub use types::{EntryState, FailureCause, LookupResult, QueueEntry, SummaryStatus, TrackerEvent};

pub use episode_api;

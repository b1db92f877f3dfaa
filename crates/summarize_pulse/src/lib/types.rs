use chrono::{DateTime, Utc};
use episode_api::{EpisodeAvailability, RemoteStatus};
use serde::Serialize;

/// Lifecycle state of a tracked summarization job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryState {
    Queued,
    Transcribing,
    Summarizing,
    Ready,
    Failed,
}

impl EntryState {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryState::Queued => "queued",
            EntryState::Transcribing => "transcribing",
            EntryState::Summarizing => "summarizing",
            EntryState::Ready => "ready",
            EntryState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, EntryState::Ready | EntryState::Failed)
    }

    /// Position along the happy path. `Failed` sits outside of it.
    fn rank(&self) -> Option<u8> {
        match self {
            EntryState::Queued => Some(0),
            EntryState::Transcribing => Some(1),
            EntryState::Summarizing => Some(2),
            EntryState::Ready => Some(3),
            EntryState::Failed => None,
        }
    }

    /// Maps a backend status onto the tracker's states.
    /// `not_ready` carries no progress information and has no counterpart.
    pub fn from_remote(status: RemoteStatus) -> Option<Self> {
        match status {
            RemoteStatus::NotReady => None,
            RemoteStatus::Queued => Some(EntryState::Queued),
            RemoteStatus::Transcribing => Some(EntryState::Transcribing),
            RemoteStatus::Summarizing => Some(EntryState::Summarizing),
            RemoteStatus::Ready => Some(EntryState::Ready),
            RemoteStatus::Failed => Some(EntryState::Failed),
        }
    }

    /// Whether moving from `self` to `next` is progress on the happy path
    pub fn is_advanced_by(&self, next: EntryState) -> bool {
        match (self.rank(), next.rank()) {
            (Some(current), Some(next)) => next > current,
            _ => false,
        }
    }
}

impl std::fmt::Display for EntryState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCause {
    /// The backend reported the job as failed
    Processing,
    /// The attempt ceiling was reached without a terminal status
    TimedOut,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueEntry {
    pub episode_id: String,
    pub state: EntryState,
    pub enqueued_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub poll_attempts: u32,
    pub failure: Option<FailureCause>,
    #[serde(skip)]
    pub(crate) generation: u64,
}

impl QueueEntry {
    pub(crate) fn queued(episode_id: String, enqueued_at: DateTime<Utc>, generation: u64) -> Self {
        Self {
            episode_id,
            state: EntryState::Queued,
            enqueued_at,
            updated_at: enqueued_at,
            poll_attempts: 0,
            failure: None,
            generation,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub(crate) fn is_pollable(&self) -> bool {
        !self.is_terminal()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryStatus {
    Ready,
    Failed,
}

/// Summary availability of a single audio url
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LookupResult {
    pub audio_url: String,
    /// `None` until the episode has been imported
    pub episode_id: Option<String>,
    pub summary_status: Option<SummaryStatus>,
    pub has_quick_summary: bool,
    pub has_deep_summary: bool,
}

impl LookupResult {
    /// Result for a url the backend knows nothing about
    pub(crate) fn unknown(audio_url: impl Into<String>) -> Self {
        Self {
            audio_url: audio_url.into(),
            episode_id: None,
            summary_status: None,
            has_quick_summary: false,
            has_deep_summary: false,
        }
    }
}

impl From<EpisodeAvailability> for LookupResult {
    fn from(availability: EpisodeAvailability) -> Self {
        let statuses = [
            availability.quick_status.as_deref(),
            availability.deep_status.as_deref(),
        ];

        let summary_status = if availability.has_quick_summary
            || availability.has_deep_summary
            || statuses.contains(&Some("ready"))
        {
            Some(SummaryStatus::Ready)
        } else if statuses.contains(&Some("failed")) {
            Some(SummaryStatus::Failed)
        } else {
            None
        };

        Self {
            audio_url: availability.audio_url,
            episode_id: availability.episode_id,
            summary_status,
            has_quick_summary: availability.has_quick_summary,
            has_deep_summary: availability.has_deep_summary,
        }
    }
}

/// Notifications broadcast to tracker subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerEvent {
    StateChanged { episode_id: String, state: EntryState },
    Removed { episode_id: String },
    LookupResolved { audio_url: String },
    /// The batch carrying this url failed; registering it again retries
    LookupFailed { audio_url: String },
}

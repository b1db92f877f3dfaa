#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error("Episode id must not be empty")]
    EmptyEpisodeId,
}

/// Failure of the one-shot import that precedes tracking.
/// Never stored as a queue entry state.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("Failed to import episode {external_id}: {message}")]
    ImportFailed {
        external_id: String,
        message: String,
    },
    #[error(transparent)]
    Tracker(#[from] TrackerError),
}

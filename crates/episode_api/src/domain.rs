use chrono::{DateTime, Utc};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// Processing status as reported by the backend for a single episode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteStatus {
    NotReady,
    Queued,
    Transcribing,
    Summarizing,
    Ready,
    Failed,
}

impl RemoteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RemoteStatus::NotReady => "not_ready",
            RemoteStatus::Queued => "queued",
            RemoteStatus::Transcribing => "transcribing",
            RemoteStatus::Summarizing => "summarizing",
            RemoteStatus::Ready => "ready",
            RemoteStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for RemoteStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw episode metadata as scraped from Spotify, Apple Podcasts or YouTube
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EpisodeMetadata {
    pub external_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    /// Duration in whole seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    pub audio_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodcastMetadata {
    pub external_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artist_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artwork_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feed_url: Option<String>,
}

/// Body of `POST /episodes/import`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportRequest {
    pub episode: EpisodeMetadata,
    pub podcast: PodcastMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportResponse {
    pub episode_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: RemoteStatus,
}

/// Body of `POST /summaries/check`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityRequest {
    pub audio_urls: Vec<String>,
}

impl AvailabilityRequest {
    /// Builds a request with duplicate urls removed, preserving first-seen order
    pub fn new<I, S>(audio_urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            audio_urls: audio_urls.into_iter().map(Into::into).unique().collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EpisodeAvailability {
    pub audio_url: String,
    #[serde(default)]
    pub episode_id: Option<String>,
    #[serde(default)]
    pub has_quick_summary: bool,
    #[serde(default)]
    pub has_deep_summary: bool,
    #[serde(default)]
    pub quick_status: Option<String>,
    #[serde(default)]
    pub deep_status: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityResponse {
    #[serde(default)]
    pub availability: Vec<EpisodeAvailability>,
}

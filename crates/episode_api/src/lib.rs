//! # Episode API Module
//!
//! This module describes the three backend collaborators the summarization
//! tracker depends on: episode import, per-episode status checks and batched
//! summary availability lookups.
//!
//! The traits in [`endpoints`] are the seams the tracker is generic over, and
//! [`HttpEpisodeApi`] is the reqwest-backed implementation used in production.

mod domain;
mod endpoints;

pub use domain::{
    AvailabilityRequest, AvailabilityResponse, EpisodeAvailability, EpisodeMetadata,
    ImportRequest, ImportResponse, PodcastMetadata, RemoteStatus, StatusResponse,
};
pub use endpoints::http::{ApiError, HttpEpisodeApi};
pub use endpoints::{BatchAvailabilityEndpoint, ImportEndpoint, StatusEndpoint};

use std::{fmt::Debug, future::Future, sync::Arc};

use crate::{AvailabilityRequest, AvailabilityResponse, ImportRequest, ImportResponse, RemoteStatus};

pub mod http;

/// Registers external episode metadata, returning the internal episode id.
/// Importing the same `externalId` twice yields the same id.
pub trait ImportEndpoint {
    type Error: Debug + Send;

    fn import_episode(
        &self,
        request: &ImportRequest,
    ) -> impl Future<Output = Result<ImportResponse, Self::Error>> + Send;
}

pub trait StatusEndpoint {
    type Error: Debug + Send;

    fn episode_status(
        &self,
        episode_id: &str,
    ) -> impl Future<Output = Result<RemoteStatus, Self::Error>> + Send;
}

pub trait BatchAvailabilityEndpoint {
    type Error: Debug + Send;

    fn check_availability(
        &self,
        request: &AvailabilityRequest,
    ) -> impl Future<Output = Result<AvailabilityResponse, Self::Error>> + Send;
}

impl<T: ImportEndpoint + Send + Sync> ImportEndpoint for Arc<T> {
    type Error = T::Error;

    async fn import_episode(&self, request: &ImportRequest) -> Result<ImportResponse, Self::Error> {
        (**self).import_episode(request).await
    }
}

impl<T: StatusEndpoint + Send + Sync> StatusEndpoint for Arc<T> {
    type Error = T::Error;

    async fn episode_status(&self, episode_id: &str) -> Result<RemoteStatus, Self::Error> {
        (**self).episode_status(episode_id).await
    }
}

impl<T: BatchAvailabilityEndpoint + Send + Sync> BatchAvailabilityEndpoint for Arc<T> {
    type Error = T::Error;

    async fn check_availability(
        &self,
        request: &AvailabilityRequest,
    ) -> Result<AvailabilityResponse, Self::Error> {
        (**self).check_availability(request).await
    }
}

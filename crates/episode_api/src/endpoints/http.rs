use reqwest::{
    header::{AUTHORIZATION, CONTENT_TYPE},
    Response,
};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware, RequestBuilder};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::de::DeserializeOwned;

use crate::{
    AvailabilityRequest, AvailabilityResponse, BatchAvailabilityEndpoint, ImportEndpoint,
    ImportRequest, ImportResponse, RemoteStatus, StatusEndpoint, StatusResponse,
};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("HTTP error: {0}")]
    Request(#[from] reqwest_middleware::Error),
    #[error("Failed to decode response: {0}")]
    Decode(#[from] reqwest::Error),
    #[error("Failed to encode request body: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },
}

/// Client for the episode import, status and summary availability routes
#[derive(Clone)]
pub struct HttpEpisodeApi {
    client: ClientWithMiddleware,
    base_url: String,
    api_token: Option<String>,
}

impl HttpEpisodeApi {
    const MAX_RETRIES: u32 = 3;

    pub fn new(base_url: impl Into<String>) -> Self {
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(Self::MAX_RETRIES);
        let client = ClientBuilder::new(reqwest::Client::new())
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_token: None,
        }
    }

    pub fn with_api_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_token {
            Some(token) => request.header(AUTHORIZATION, format!("Bearer {token}")),
            None => request,
        }
    }

    async fn post_json<B, R>(&self, path: &str, body: &B) -> Result<R, ApiError>
    where
        B: serde::Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let body = serde_json::to_vec(body)?;
        let request = self
            .client
            .post(format!("{}{path}", self.base_url))
            .header(CONTENT_TYPE, "application/json")
            .body(body);

        let resp = self
            .authorize(request)
            .send()
            .await
            .inspect_err(|e| tracing::error!(error = %e, path, "Failed to make http request"))?;

        Self::decode(resp).await
    }

    async fn decode<R: DeserializeOwned>(resp: Response) -> Result<R, ApiError> {
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let message = resp.text().await.unwrap_or_default();
            return Err(ApiError::Api { status, message });
        }

        Ok(resp.json::<R>().await?)
    }
}

impl ImportEndpoint for HttpEpisodeApi {
    type Error = ApiError;

    #[tracing::instrument(skip_all, fields(external_id = %request.episode.external_id))]
    async fn import_episode(&self, request: &ImportRequest) -> Result<ImportResponse, Self::Error> {
        self.post_json("/episodes/import", request).await
    }
}

impl StatusEndpoint for HttpEpisodeApi {
    type Error = ApiError;

    #[tracing::instrument(skip(self))]
    async fn episode_status(&self, episode_id: &str) -> Result<RemoteStatus, Self::Error> {
        let request = self
            .client
            .get(format!("{}/episodes/{episode_id}/status", self.base_url));

        let resp = self
            .authorize(request)
            .send()
            .await
            .inspect_err(|e| tracing::warn!(error = %e, "Failed to fetch episode status"))?;

        let status = Self::decode::<StatusResponse>(resp).await?;
        Ok(status.status)
    }
}

impl BatchAvailabilityEndpoint for HttpEpisodeApi {
    type Error = ApiError;

    #[tracing::instrument(skip_all, fields(count = request.audio_urls.len()))]
    async fn check_availability(
        &self,
        request: &AvailabilityRequest,
    ) -> Result<AvailabilityResponse, Self::Error> {
        self.post_json("/summaries/check", request).await
    }
}

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};
use summarize_pulse::episode_api::{
    AvailabilityRequest, AvailabilityResponse, BatchAvailabilityEndpoint, EpisodeAvailability,
};

#[derive(Clone, Default)]
pub struct MockAvailabilityEndpoint {
    pub known: HashMap<String, EpisodeAvailability>,
    pub calls: Arc<Mutex<Vec<Vec<String>>>>,
    /// Number of upcoming calls that fail
    pub failures_left: Arc<Mutex<usize>>,
}

impl MockAvailabilityEndpoint {
    pub fn with_summary(mut self, audio_url: &str, episode_id: &str) -> Self {
        self.known.insert(
            audio_url.to_string(),
            EpisodeAvailability {
                audio_url: audio_url.to_string(),
                episode_id: Some(episode_id.to_string()),
                has_quick_summary: true,
                has_deep_summary: false,
                quick_status: Some("ready".into()),
                deep_status: None,
            },
        );
        self
    }

    pub fn failing_first(self, calls: usize) -> Self {
        *self.failures_left.lock().unwrap() = calls;
        self
    }
}

impl BatchAvailabilityEndpoint for MockAvailabilityEndpoint {
    type Error = anyhow::Error;

    async fn check_availability(
        &self,
        request: &AvailabilityRequest,
    ) -> Result<AvailabilityResponse, Self::Error> {
        self.calls.lock().unwrap().push(request.audio_urls.clone());

        {
            let mut failures_left = self.failures_left.lock().unwrap();
            if *failures_left > 0 {
                *failures_left -= 1;
                return Err(anyhow::anyhow!("availability service unavailable"));
            }
        }

        let availability = request
            .audio_urls
            .iter()
            .filter_map(|audio_url| self.known.get(audio_url).cloned())
            .collect();
        Ok(AvailabilityResponse { availability })
    }
}

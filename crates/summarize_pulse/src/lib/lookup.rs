use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use episode_api::{AvailabilityRequest, BatchAvailabilityEndpoint};
use tokio::{
    sync::{broadcast, mpsc},
    task::JoinSet,
    time::Instant,
};
use tokio_util::sync::CancellationToken;

use crate::{LookupResult, TrackerEvent};

#[derive(Debug, Default)]
struct LookupState {
    results: HashMap<String, LookupResult>,
    /// Urls that are waiting for a batch or whose batch is in flight
    pending: HashSet<String>,
}

/// Coalesces availability lookups into batched calls.
///
/// Urls registered within `window` of the first url of a batch are sent
/// together. A url is sent at most once while unresolved; once resolved it
/// is served from the cache.
pub(crate) struct LookupBatcher<B> {
    endpoint: B,
    window: Duration,
    max_batch: usize,
    state: Mutex<LookupState>,
    sender: mpsc::UnboundedSender<String>,
    events: broadcast::Sender<TrackerEvent>,
}

impl<B> LookupBatcher<B> {
    fn lock(&self) -> MutexGuard<'_, LookupState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn result(&self, audio_url: &str) -> Option<LookupResult> {
        self.lock().results.get(audio_url).cloned()
    }
}

impl<B> LookupBatcher<B>
where
    B: BatchAvailabilityEndpoint + Send + Sync + 'static,
{
    pub(crate) fn spawn(
        endpoint: B,
        window: Duration,
        max_batch: usize,
        events: broadcast::Sender<TrackerEvent>,
        cancel: CancellationToken,
    ) -> (Arc<Self>, tokio::task::JoinHandle<()>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let batcher = Arc::new(Self {
            endpoint,
            window,
            max_batch,
            state: Mutex::default(),
            sender,
            events,
        });

        let handle = tokio::spawn(Arc::clone(&batcher).run(receiver, cancel));
        (batcher, handle)
    }

    pub(crate) fn register(&self, audio_url: &str) {
        {
            let mut state = self.lock();
            if state.results.contains_key(audio_url) || !state.pending.insert(audio_url.to_string())
            {
                return;
            }
        }

        if self.sender.send(audio_url.to_string()).is_err() {
            tracing::debug!(audio_url, "Lookup batcher stopped, dropping registration");
            self.lock().pending.remove(audio_url);
        }
    }

    /// Records a freshly imported episode id against its audio url, if known
    pub(crate) fn record_import(&self, audio_url: &str, episode_id: &str) {
        if let Some(result) = self.lock().results.get_mut(audio_url) {
            result.episode_id = Some(episode_id.to_string());
        }
    }

    async fn run(
        self: Arc<Self>,
        mut receiver: mpsc::UnboundedReceiver<String>,
        cancel: CancellationToken,
    ) {
        let mut batch: Vec<String> = Vec::new();
        let mut in_flight = JoinSet::new();

        let deadline = tokio::time::sleep(self.window);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                Some(audio_url) = receiver.recv() => {
                    if batch.is_empty() {
                        deadline.as_mut().reset(Instant::now() + self.window);
                    }
                    batch.push(audio_url);
                    if batch.len() >= self.max_batch {
                        self.flush(&mut batch, &mut in_flight);
                    }
                }
                _ = &mut deadline, if !batch.is_empty() => {
                    self.flush(&mut batch, &mut in_flight);
                }
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    if let Err(e) = joined {
                        tracing::error!(error = %e, "Lookup batch task failed");
                    }
                }
            }
        }

        in_flight.shutdown().await;
        tracing::debug!("Lookup batcher stopped");
    }

    fn flush(self: &Arc<Self>, batch: &mut Vec<String>, in_flight: &mut JoinSet<()>) {
        let audio_urls = std::mem::take(batch);
        tracing::debug!(count = audio_urls.len(), "Flushing lookup batch");

        let batcher = Arc::clone(self);
        in_flight.spawn(async move {
            let request = AvailabilityRequest::new(audio_urls);
            let response = batcher.endpoint.check_availability(&request).await;
            batcher.resolve(request.audio_urls, response);
        });
    }

    fn resolve<E: std::fmt::Debug>(
        &self,
        audio_urls: Vec<String>,
        response: Result<episode_api::AvailabilityResponse, E>,
    ) {
        let resolved = {
            let mut state = self.lock();
            for audio_url in &audio_urls {
                state.pending.remove(audio_url);
            }

            let response = match response {
                Ok(response) => response,
                Err(e) => {
                    tracing::warn!(error = ?e, count = audio_urls.len(), "Availability lookup failed");
                    drop(state);
                    for audio_url in audio_urls {
                        let _ = self.events.send(TrackerEvent::LookupFailed { audio_url });
                    }
                    return;
                }
            };

            for availability in response.availability {
                let result = LookupResult::from(availability);
                state.results.insert(result.audio_url.clone(), result);
            }
            for audio_url in &audio_urls {
                state
                    .results
                    .entry(audio_url.clone())
                    .or_insert_with(|| LookupResult::unknown(audio_url.as_str()));
            }
            audio_urls
        };

        for audio_url in resolved {
            let _ = self.events.send(TrackerEvent::LookupResolved { audio_url });
        }
    }
}

pub mod builder;

use std::{
    collections::{HashMap, HashSet},
    fmt::Debug,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use chrono::{DateTime, Utc};
use episode_api::{
    BatchAvailabilityEndpoint, ImportEndpoint, ImportRequest, RemoteStatus, StatusEndpoint,
};
use itertools::Itertools;
use tokio::{
    sync::{broadcast, Notify},
    task::{JoinHandle, JoinSet},
    time::MissedTickBehavior,
};
use tokio_util::sync::CancellationToken;

use crate::{
    lookup::LookupBatcher, EntryState, FailureCause, ImportError, LookupResult, QueueEntry,
    TrackerConfig, TrackerError, TrackerEvent,
};

#[derive(Debug, Default)]
struct QueueState {
    entries: HashMap<String, QueueEntry>,
    /// Episodes with an outstanding status request
    in_flight: HashSet<String>,
    last_enqueued_at: Option<DateTime<Utc>>,
    next_generation: u64,
}

impl QueueState {
    /// Strictly increasing timestamps keep FIFO ordering free of ties
    fn next_enqueue_stamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let stamp = match self.last_enqueued_at {
            Some(last) if now <= last => last + chrono::Duration::microseconds(1),
            _ => now,
        };
        self.last_enqueued_at = Some(stamp);
        stamp
    }

    /// Inserts a fresh `queued` entry, replacing any existing one
    fn enqueue(&mut self, episode_id: &str) -> QueueEntry {
        let enqueued_at = self.next_enqueue_stamp();
        self.next_generation += 1;

        let entry = QueueEntry::queued(episode_id.to_string(), enqueued_at, self.next_generation);
        self.entries.insert(episode_id.to_string(), entry.clone());
        entry
    }
}

/// Episode state shared between the tracker handle, its poll driver and the poll tasks
struct PollQueue<S> {
    status: S,
    max_poll_attempts: u32,
    state: Mutex<QueueState>,
    wake: Notify,
    events: broadcast::Sender<TrackerEvent>,
}

/// Marks an episode as having an outstanding status request.
/// Dropping it without [`InFlightGuard::release`] (abort, panic) frees the key.
struct InFlightGuard<S> {
    queue: Arc<PollQueue<S>>,
    episode_id: String,
    released: bool,
}

impl<S> InFlightGuard<S> {
    fn release(&mut self, state: &mut QueueState) {
        state.in_flight.remove(&self.episode_id);
        self.released = true;
    }
}

impl<S> Drop for InFlightGuard<S> {
    fn drop(&mut self) {
        if !self.released {
            self.queue.lock().in_flight.remove(&self.episode_id);
        }
    }
}

impl<S> PollQueue<S> {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: TrackerEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    fn emit_state(&self, entry: &QueueEntry) {
        self.emit(TrackerEvent::StateChanged {
            episode_id: entry.episode_id.clone(),
            state: entry.state,
        });
    }

    /// Applies the outcome of one status poll, releasing the in-flight key
    /// under the same lock
    fn apply_poll<E: Debug>(
        &self,
        guard: &mut InFlightGuard<S>,
        generation: u64,
        result: Result<RemoteStatus, E>,
    ) {
        let changed = {
            let mut state = self.lock();
            guard.release(&mut state);

            let Some(entry) = state.entries.get_mut(&guard.episode_id) else {
                tracing::debug!(episode_id = %guard.episode_id, "Entry cleared while polling");
                return;
            };
            if entry.generation != generation || entry.is_terminal() {
                tracing::debug!(episode_id = %entry.episode_id, "Discarding stale poll result");
                return;
            }

            let next = match result {
                Ok(status) => EntryState::from_remote(status),
                Err(e) => {
                    tracing::warn!(
                        error = ?e,
                        episode_id = %entry.episode_id,
                        attempts = entry.poll_attempts,
                        "Failed to poll episode status"
                    );
                    None
                }
            };

            let now = Utc::now();
            match next {
                Some(EntryState::Failed) => {
                    entry.state = EntryState::Failed;
                    entry.failure = Some(FailureCause::Processing);
                    entry.updated_at = now;
                    Some(entry.clone())
                }
                Some(next) if entry.state.is_advanced_by(next) => {
                    entry.state = next;
                    entry.poll_attempts = 0;
                    entry.updated_at = now;
                    Some(entry.clone())
                }
                _ => {
                    entry.poll_attempts += 1;
                    if entry.poll_attempts > self.max_poll_attempts {
                        tracing::warn!(
                            episode_id = %entry.episode_id,
                            attempts = entry.poll_attempts,
                            "Episode timed out waiting for a terminal status"
                        );
                        entry.state = EntryState::Failed;
                        entry.failure = Some(FailureCause::TimedOut);
                        entry.updated_at = now;
                        Some(entry.clone())
                    } else {
                        None
                    }
                }
            }
        };

        if let Some(entry) = changed {
            tracing::info!(episode_id = %entry.episode_id, state = %entry.state, "Episode state changed");
            self.emit_state(&entry);
        }
    }
}

impl<S> PollQueue<S>
where
    S: StatusEndpoint + Send + Sync + 'static,
{
    /// Starts one status poll per pending episode that has none outstanding
    fn dispatch_polls(self: &Arc<Self>, polls: &mut JoinSet<()>) {
        let due = {
            let mut state = self.lock();
            let QueueState {
                entries, in_flight, ..
            } = &mut *state;

            let due = entries
                .values()
                .filter(|entry| entry.is_pollable() && !in_flight.contains(&entry.episode_id))
                .map(|entry| (entry.episode_id.clone(), entry.generation))
                .collect::<Vec<_>>();
            in_flight.extend(due.iter().map(|(episode_id, _)| episode_id.clone()));
            due
        };

        for (episode_id, generation) in due {
            let mut guard = InFlightGuard {
                queue: Arc::clone(self),
                episode_id,
                released: false,
            };
            polls.spawn(async move {
                let queue = Arc::clone(&guard.queue);
                let result = queue.status.episode_status(&guard.episode_id).await;
                queue.apply_poll(&mut guard, generation, result);
            });
        }
    }

    async fn run(self: Arc<Self>, poll_interval: std::time::Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut polls = JoinSet::new();

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = self.wake.notified() => {
                    self.dispatch_polls(&mut polls);
                    ticker.reset();
                }
                _ = ticker.tick() => self.dispatch_polls(&mut polls),
                Some(joined) = polls.join_next(), if !polls.is_empty() => {
                    if let Err(e) = joined {
                        tracing::error!(error = %e, "Status poll task failed");
                    }
                }
            }
        }

        // aborts outstanding polls, their results are discarded
        polls.shutdown().await;
        tracing::debug!("Poll driver stopped");
    }
}

/// Tracks summarization jobs of many episodes for a single session.
///
/// Pending episodes are polled on an interval with at most one outstanding
/// status request per episode. Failures are recorded as entry state and
/// never returned to the caller, except for the one-shot import.
pub struct SummarizeStatusTracker<I, S, B> {
    import: I,
    queue: Arc<PollQueue<S>>,
    lookups: Arc<LookupBatcher<B>>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl<I, S, B> SummarizeStatusTracker<I, S, B>
where
    I: ImportEndpoint + Send + Sync + 'static,
    S: StatusEndpoint + Send + Sync + 'static,
    B: BatchAvailabilityEndpoint + Send + Sync + 'static,
{
    pub(crate) fn start(import: I, status: S, availability: B, config: TrackerConfig) -> Self {
        let config = config.sanitized();
        let cancel = CancellationToken::new();
        let (events, _) = broadcast::channel(config.event_capacity);

        let queue = Arc::new(PollQueue {
            status,
            max_poll_attempts: config.max_poll_attempts,
            state: Mutex::default(),
            wake: Notify::new(),
            events: events.clone(),
        });
        let poll_driver = tokio::spawn(
            Arc::clone(&queue).run(config.poll_interval, cancel.child_token()),
        );

        let (lookups, lookup_driver) = LookupBatcher::spawn(
            availability,
            config.lookup_window,
            config.max_lookup_batch,
            events,
            cancel.child_token(),
        );

        Self {
            import,
            queue,
            lookups,
            cancel,
            tasks: vec![poll_driver, lookup_driver],
        }
    }

    /// Starts tracking an episode and polls it right away. Tracking an
    /// already tracked episode returns its entry untouched and leaves its
    /// poll schedule alone.
    pub fn add_to_queue(&self, episode_id: &str) -> Result<QueueEntry, TrackerError> {
        if episode_id.is_empty() {
            return Err(TrackerError::EmptyEpisodeId);
        }

        let (entry, created) = {
            let mut state = self.queue.lock();
            match state.entries.get(episode_id).cloned() {
                Some(existing) => (existing, false),
                None => (state.enqueue(episode_id), true),
            }
        };

        if created {
            tracing::info!(episode_id, "Episode added to queue");
            self.queue.emit_state(&entry);
            self.queue.wake.notify_one();
        }

        Ok(entry)
    }

    /// Re-queues a failed (or untracked) episode. Entries in any other state
    /// are returned unchanged.
    pub fn retry_episode(&self, episode_id: &str) -> Result<QueueEntry, TrackerError> {
        if episode_id.is_empty() {
            return Err(TrackerError::EmptyEpisodeId);
        }

        let entry = {
            let mut state = self.queue.lock();
            match state.entries.get(episode_id).cloned() {
                Some(existing) if existing.state != EntryState::Failed => {
                    tracing::debug!(episode_id, state = %existing.state, "Ignoring retry");
                    return Ok(existing);
                }
                _ => state.enqueue(episode_id),
            }
        };

        tracing::info!(episode_id, "Retrying episode");
        self.queue.emit_state(&entry);
        self.queue.wake.notify_one();

        Ok(entry)
    }

    /// Imports an episode, then starts tracking it.
    /// A failed import creates no entry.
    #[tracing::instrument(skip_all, fields(external_id = %request.episode.external_id))]
    pub async fn import_and_enqueue(
        &self,
        request: &ImportRequest,
    ) -> Result<QueueEntry, ImportError> {
        let response = self
            .import
            .import_episode(request)
            .await
            .inspect_err(|e| tracing::error!(error = ?e, "Failed to import episode"))
            .map_err(|e| ImportError::ImportFailed {
                external_id: request.episode.external_id.clone(),
                message: format!("{e:?}"),
            })?;

        self.lookups
            .record_import(&request.episode.audio_url, &response.episode_id);

        Ok(self.add_to_queue(&response.episode_id)?)
    }

    /// Starts tracking an episode, skipping the import when a lookup already
    /// resolved its internal id
    pub async fn request_summary(&self, request: &ImportRequest) -> Result<QueueEntry, ImportError> {
        let known_id = self
            .lookups
            .result(&request.episode.audio_url)
            .and_then(|result| result.episode_id);

        match known_id {
            Some(episode_id) => {
                tracing::debug!(%episode_id, "Episode already imported");
                Ok(self.add_to_queue(&episode_id)?)
            }
            None => self.import_and_enqueue(request).await,
        }
    }

    pub fn register_lookup(&self, audio_url: &str) {
        self.lookups.register(audio_url);
    }
}

impl<I, S, B> SummarizeStatusTracker<I, S, B> {
    pub fn get_queue_item(&self, episode_id: &str) -> Option<QueueEntry> {
        self.queue.lock().entries.get(episode_id).cloned()
    }

    /// 0-based FIFO rank among queued episodes, or -1 when the episode is not queued
    pub fn get_queue_position(&self, episode_id: &str) -> i64 {
        let state = self.queue.lock();
        let Some(entry) = state
            .entries
            .get(episode_id)
            .filter(|entry| entry.state == EntryState::Queued)
        else {
            return -1;
        };

        state
            .entries
            .values()
            .filter(|other| other.state == EntryState::Queued && other.enqueued_at < entry.enqueued_at)
            .count() as i64
    }

    pub fn get_lookup_result(&self, audio_url: &str) -> Option<LookupResult> {
        self.lookups.result(audio_url)
    }

    /// Stops tracking an episode. An outstanding poll for it is discarded.
    pub fn clear(&self, episode_id: &str) -> Option<QueueEntry> {
        let removed = self.queue.lock().entries.remove(episode_id);
        if removed.is_some() {
            self.queue.emit(TrackerEvent::Removed {
                episode_id: episode_id.to_string(),
            });
        }
        removed
    }

    /// Snapshot of all entries ordered by `enqueued_at`
    pub fn entries(&self) -> Vec<QueueEntry> {
        self.queue
            .lock()
            .entries
            .values()
            .cloned()
            .sorted_by_key(|entry| entry.enqueued_at)
            .collect()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TrackerEvent> {
        self.queue.events.subscribe()
    }

    /// Stops polling and batching, discarding in-flight requests
    pub async fn dispose(mut self) {
        self.cancel.cancel();
        for task in std::mem::take(&mut self.tasks) {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Tracker task failed");
            }
        }
        tracing::debug!("Tracker disposed");
    }
}

impl<I, S, B> Drop for SummarizeStatusTracker<I, S, B> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

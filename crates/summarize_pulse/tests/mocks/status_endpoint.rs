use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex},
    time::Duration,
};
use summarize_pulse::episode_api::{RemoteStatus, StatusEndpoint};

type Script = VecDeque<Result<RemoteStatus, String>>;

/// Replays a scripted sequence of statuses per episode. The last response of
/// a script repeats once the script is exhausted; unscripted episodes report
/// `not_ready`.
#[derive(Clone, Default)]
pub struct MockStatusEndpoint {
    pub scripts: Arc<Mutex<HashMap<String, Script>>>,
    pub calls: Arc<Mutex<Vec<String>>>,
    pub outstanding: Arc<Mutex<HashMap<String, usize>>>,
    pub max_outstanding: Arc<Mutex<HashMap<String, usize>>>,
    pub delay: Duration,
}

impl MockStatusEndpoint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(self, episode_id: &str, statuses: &[RemoteStatus]) -> Self {
        let script = statuses.iter().copied().map(Ok).collect();
        self.scripts
            .lock()
            .unwrap()
            .insert(episode_id.to_string(), script);
        self
    }

    pub fn script_results(self, episode_id: &str, results: Vec<Result<RemoteStatus, &str>>) -> Self {
        let script = results
            .into_iter()
            .map(|r| r.map_err(String::from))
            .collect();
        self.scripts
            .lock()
            .unwrap()
            .insert(episode_id.to_string(), script);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn call_count(&self, episode_id: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|id| id.as_str() == episode_id)
            .count()
    }

    pub fn max_outstanding(&self, episode_id: &str) -> usize {
        self.max_outstanding
            .lock()
            .unwrap()
            .get(episode_id)
            .copied()
            .unwrap_or_default()
    }

    fn next_response(&self, episode_id: &str) -> Result<RemoteStatus, String> {
        let mut scripts = self.scripts.lock().unwrap();
        match scripts.get_mut(episode_id) {
            Some(script) if script.len() > 1 => script.pop_front().unwrap(),
            Some(script) => script.front().cloned().unwrap_or(Ok(RemoteStatus::NotReady)),
            None => Ok(RemoteStatus::NotReady),
        }
    }
}

impl StatusEndpoint for MockStatusEndpoint {
    type Error = anyhow::Error;

    async fn episode_status(&self, episode_id: &str) -> Result<RemoteStatus, Self::Error> {
        self.calls.lock().unwrap().push(episode_id.to_string());
        {
            let mut outstanding = self.outstanding.lock().unwrap();
            let count = outstanding.entry(episode_id.to_string()).or_default();
            *count += 1;

            let mut max = self.max_outstanding.lock().unwrap();
            let max = max.entry(episode_id.to_string()).or_default();
            *max = (*max).max(*count);
        }

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        *self
            .outstanding
            .lock()
            .unwrap()
            .get_mut(episode_id)
            .unwrap() -= 1;

        self.next_response(episode_id)
            .map_err(|msg| anyhow::anyhow!("{}", msg))
    }
}

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};
use summarize_pulse::episode_api::{ImportEndpoint, ImportRequest, ImportResponse};

/// Hands out `imported-<n>` ids, reusing the id of a known external id
#[derive(Clone, Default)]
pub struct MockImportEndpoint {
    pub imported: Arc<Mutex<HashMap<String, String>>>,
    pub calls: Arc<Mutex<Vec<ImportRequest>>>,
    pub fail_with: Option<String>,
}

impl MockImportEndpoint {
    pub fn failing(msg: &str) -> Self {
        Self {
            fail_with: Some(msg.to_string()),
            ..Default::default()
        }
    }
}

impl ImportEndpoint for MockImportEndpoint {
    type Error = anyhow::Error;

    async fn import_episode(&self, request: &ImportRequest) -> Result<ImportResponse, Self::Error> {
        self.calls.lock().unwrap().push(request.clone());
        if let Some(ref msg) = self.fail_with {
            return Err(anyhow::anyhow!("{}", msg));
        }

        let mut imported = self.imported.lock().unwrap();
        let next_id = format!("imported-{}", imported.len() + 1);
        let episode_id = imported
            .entry(request.episode.external_id.clone())
            .or_insert(next_id)
            .clone();

        Ok(ImportResponse { episode_id })
    }
}

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::Context;
use clap::{Parser, Subcommand};
use episode_api::{HttpEpisodeApi, ImportRequest};
use tokio::sync::broadcast::error::RecvError;

use summarize_pulse::{
    tracing::init_tracing_subscriber, SummarizeStatusTracker, SummarizeStatusTrackerBuilder,
    TrackerConfig, TrackerEvent,
};

type Tracker = SummarizeStatusTracker<Arc<HttpEpisodeApi>, Arc<HttpEpisodeApi>, Arc<HttpEpisodeApi>>;

#[derive(Parser)]
#[command(
    name = "summarize-pulse",
    about = "Tracks podcast episode summarization jobs"
)]
struct Cli {
    /// Base URL of the episodes API
    #[arg(long, env = "SUMMARIZE_API_URL")]
    api_url: String,

    /// Bearer token sent with every request
    #[arg(long, env = "SUMMARIZE_API_TOKEN")]
    api_token: Option<String>,

    /// Delay between status polls in milliseconds
    #[arg(long, env = "POLL_INTERVAL_MS", default_value = "5000")]
    poll_interval_ms: u64,

    /// Polls without progress before an episode is marked as timed out
    #[arg(long, env = "MAX_POLL_ATTEMPTS", default_value = "120")]
    max_poll_attempts: u32,

    /// Window in which availability lookups are batched, in milliseconds
    #[arg(long, env = "LOOKUP_WINDOW_MS", default_value = "50")]
    lookup_window_ms: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Track already imported episodes until they are ready or failed
    Watch {
        #[arg(required = true)]
        episode_ids: Vec<String>,
    },
    /// Check which audio urls already have summaries
    Check {
        #[arg(required = true)]
        audio_urls: Vec<String>,
    },
    /// Import episodes from a JSON file and track their summaries
    Import {
        /// JSON array of episode import requests
        file: PathBuf,
    },
}

fn build_tracker(cli: &Cli) -> Tracker {
    let mut api = HttpEpisodeApi::new(&cli.api_url);
    if let Some(token) = &cli.api_token {
        api = api.with_api_token(token);
    }
    let api = Arc::new(api);

    let config = TrackerConfig {
        poll_interval: Duration::from_millis(cli.poll_interval_ms),
        max_poll_attempts: cli.max_poll_attempts,
        lookup_window: Duration::from_millis(cli.lookup_window_ms),
        ..Default::default()
    };

    SummarizeStatusTrackerBuilder::new()
        .import_endpoint(Arc::clone(&api))
        .status_endpoint(Arc::clone(&api))
        .availability_endpoint(api)
        .config(config)
        .build()
}

/// Waits until every watched episode reached a terminal state
async fn watch(tracker: &Tracker, episode_ids: &[String]) -> anyhow::Result<()> {
    let mut events = tracker.subscribe();
    let mut pending = HashSet::new();

    for episode_id in episode_ids {
        let entry = tracker.add_to_queue(episode_id)?;
        if !entry.is_terminal() {
            pending.insert(episode_id.clone());
        }
    }

    while !pending.is_empty() {
        match events.recv().await {
            Ok(TrackerEvent::StateChanged { episode_id, state }) => {
                tracing::info!(%episode_id, %state, "Episode progressed");
                if state.is_terminal() {
                    pending.remove(&episode_id);
                }
            }
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Missed tracker events, resyncing");
                pending.retain(|episode_id| {
                    tracker
                        .get_queue_item(episode_id)
                        .is_some_and(|entry| !entry.is_terminal())
                });
            }
            Err(RecvError::Closed) => anyhow::bail!("Tracker event channel closed"),
        }
    }

    let entries = episode_ids
        .iter()
        .filter_map(|episode_id| tracker.get_queue_item(episode_id))
        .collect::<Vec<_>>();
    println!("{}", serde_json::to_string_pretty(&entries)?);

    Ok(())
}

async fn check(tracker: &Tracker, audio_urls: &[String]) -> anyhow::Result<()> {
    let mut events = tracker.subscribe();
    let mut pending = audio_urls.iter().cloned().collect::<HashSet<_>>();

    for audio_url in audio_urls {
        tracker.register_lookup(audio_url);
    }
    // cached urls resolve without an event
    pending.retain(|audio_url| tracker.get_lookup_result(audio_url).is_none());

    while !pending.is_empty() {
        match events.recv().await {
            Ok(TrackerEvent::LookupResolved { audio_url }) => {
                pending.remove(&audio_url);
            }
            Ok(TrackerEvent::LookupFailed { audio_url }) => {
                tracing::warn!(%audio_url, "Availability lookup failed");
                pending.remove(&audio_url);
            }
            Ok(_) => {}
            Err(RecvError::Lagged(_)) => {
                pending.retain(|audio_url| tracker.get_lookup_result(audio_url).is_none());
            }
            Err(RecvError::Closed) => anyhow::bail!("Tracker event channel closed"),
        }
    }

    let results = audio_urls
        .iter()
        .filter_map(|audio_url| tracker.get_lookup_result(audio_url))
        .collect::<Vec<_>>();
    println!("{}", serde_json::to_string_pretty(&results)?);

    Ok(())
}

async fn import(tracker: &Tracker, file: &Path) -> anyhow::Result<()> {
    let raw = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let requests: Vec<ImportRequest> =
        serde_json::from_str(&raw).context("Failed to parse import requests")?;

    // resolve already imported episodes before importing anything
    let audio_urls = requests
        .iter()
        .map(|request| request.episode.audio_url.clone())
        .collect::<Vec<_>>();
    check(tracker, &audio_urls).await?;

    let results = futures::future::join_all(
        requests
            .iter()
            .map(|request| tracker.request_summary(request)),
    )
    .await;

    let mut episode_ids = Vec::new();
    for (request, result) in requests.iter().zip(results) {
        match result {
            Ok(entry) => episode_ids.push(entry.episode_id),
            Err(e) => tracing::error!(
                error = %e,
                external_id = %request.episode.external_id,
                "Skipping episode"
            ),
        }
    }

    if episode_ids.is_empty() {
        anyhow::bail!("No episode could be imported");
    }

    watch(tracker, &episode_ids).await
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let _guard = sentry::init((
        std::env::var("SENTRY_DSN").unwrap_or_default(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: Some("production".into()),
            ..Default::default()
        },
    ));

    let cli = Cli::parse();
    init_tracing_subscriber()?;

    let tracker = build_tracker(&cli);

    let result = match &cli.command {
        Command::Watch { episode_ids } => watch(&tracker, episode_ids).await,
        Command::Check { audio_urls } => check(&tracker, audio_urls).await,
        Command::Import { file } => import(&tracker, file).await,
    };

    tracker.dispose().await;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_tuning_flags_read_env() {
        let command = Cli::command();
        command.clone().debug_assert();

        for (id, env) in [
            ("poll_interval_ms", "POLL_INTERVAL_MS"),
            ("max_poll_attempts", "MAX_POLL_ATTEMPTS"),
            ("lookup_window_ms", "LOOKUP_WINDOW_MS"),
        ] {
            let arg = command
                .get_arguments()
                .find(|arg| arg.get_id() == id)
                .unwrap();
            assert_eq!(arg.get_env(), Some(std::ffi::OsStr::new(env)), "{id}");
        }
    }
}

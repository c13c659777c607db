mod config;
mod dedup;
mod dispatcher;
mod drive;
mod event;
mod gemini;
mod server;
mod slack;
mod worker;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::config::Config;
use crate::dedup::DedupCache;
use crate::dispatcher::Dispatcher;
use crate::drive::DriveClient;
use crate::gemini::GeminiClient;
use crate::server::AppState;
use crate::slack::SlackClient;

/// Timeout applied to every outbound Slack / Gemini / Drive call.
const OUTBOUND_TIMEOUT: Duration = Duration::from_secs(30);
const SHUTDOWN_DRAIN: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("gemrelay.toml"));
    info!(path = %config_path.display(), "loading configuration");
    let config = Config::load(&config_path)?;
    config.validate()?;

    let http = reqwest::Client::builder()
        .timeout(OUTBOUND_TIMEOUT)
        .connect_timeout(Duration::from_secs(5))
        .build()
        .context("failed to build HTTP client")?;

    let slack = SlackClient::new(
        http.clone(),
        config.slack.bot_token.clone(),
        config.slack.api_base.clone(),
    );
    let gemini = GeminiClient::new(http.clone(), config.gemini.clone());
    let drive = if config.drive.enabled {
        info!("Drive folder search mode enabled");
        Some(DriveClient::from_json(
            http,
            &config.drive.service_account_json,
            config.drive.api_base.clone(),
        )?)
    } else {
        None
    };

    // Resolve our own identity so the self-message filter can work.
    let bot_user_id = if !config.slack.bot_user_id.is_empty() {
        config.slack.bot_user_id.clone()
    } else {
        match slack.auth_test().await {
            Ok(id) => {
                info!(bot_user_id = %id, "resolved bot identity");
                id
            }
            Err(e) => {
                warn!(error = %e, "failed to resolve bot user ID; self-message filtering degraded");
                String::new()
            }
        }
    };

    let ttl = Duration::from_secs(config.dedup.ttl_secs);
    let event_dedup = DedupCache::new(config.dedup.capacity, ttl);
    let ts_dedup = DedupCache::new(config.dedup.capacity, ttl);

    let dispatcher = Arc::new(Dispatcher::new(
        slack,
        gemini,
        drive,
        ts_dedup,
        config.gemini.narrative_prompt.clone(),
        config.gemini.image_generation,
    ));

    let (jobs, rx) = worker::channel(config.worker.queue_capacity);
    let pool = worker::spawn_pool(config.worker.pool_size, dispatcher, rx);

    let state = Arc::new(AppState {
        jobs,
        event_dedup,
        bot_user_id,
    });
    let app = server::router(state, config.server.max_body_bytes);

    let addr = format!("{}:{}", config.server.bind, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "listening for Slack events");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    // The router (and with it every queue sender) is gone; let in-flight
    // workers finish before exiting.
    info!("shutting down, draining in-flight work");
    worker::drain(pool, SHUTDOWN_DRAIN).await;
    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
}

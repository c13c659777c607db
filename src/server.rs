//! Inbound webhook listener for the Slack Events API.
//!
//! One POST route. Each request runs the admission pipeline:
//! 1. Echo `url_verification` challenges.
//! 2. Absorb unparseable or irrelevant payloads.
//! 3. Suppress duplicate `event_id` deliveries.
//! 4. Suppress the bot's own messages.
//! 5. Enqueue the event and return immediately; Slack retries anything
//!    slower than its response budget, duplicating the event.

use axum::body::Bytes;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

use crate::dedup::DedupCache;
use crate::event::{InboundEvent, SlackEnvelope};
use crate::worker::JobSender;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct AppState {
    pub jobs: JobSender,
    pub event_dedup: DedupCache,
    /// Our own user ID; empty when unresolved (filtering degrades to the
    /// `bot_id` marker alone).
    pub bot_user_id: String,
}

pub fn router(state: Arc<AppState>, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/slack/events", post(slack_events))
        .route("/healthz", get(healthz))
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .with_state(state)
}

async fn healthz() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn slack_events(State(state): State<Arc<AppState>>, body: Bytes) -> Json<Value> {
    let envelope: SlackEnvelope = match serde_json::from_slice(&body) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::warn!(error = %e, "unparseable event payload");
            return Json(json!({ "status": "ignored" }));
        }
    };

    match envelope {
        SlackEnvelope::UrlVerification { challenge } => Json(json!({ "challenge": challenge })),
        SlackEnvelope::EventCallback { event_id, event } => {
            let Some(event) = InboundEvent::from_event(event_id, event) else {
                return Json(json!({ "status": "ignored" }));
            };

            if !state.event_dedup.insert(&event.event_id) {
                tracing::debug!(event_id = %event.event_id, "duplicate event delivery");
                return Json(json!({ "status": "duplicate event ignored" }));
            }

            let from_self =
                !state.bot_user_id.is_empty() && event.user == state.bot_user_id;
            if event.bot_id.is_some() || from_self {
                tracing::debug!(event_id = %event.event_id, "bot-originated message");
                return Json(json!({ "status": "ignored bot message" }));
            }

            let event_id = event.event_id.clone();
            match state.jobs.enqueue(event) {
                Ok(()) => Json(json!({ "status": "accepted" })),
                Err(e) => {
                    tracing::warn!(event_id = %event_id, error = %e, "rejecting event");
                    // Let a Slack redelivery through once capacity frees up.
                    state.event_dedup.release(&event_id);
                    Json(json!({ "status": "queue full" }))
                }
            }
        }
        SlackEnvelope::Unknown => Json(json!({ "status": "ignored" })),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

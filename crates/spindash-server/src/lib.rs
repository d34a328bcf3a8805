//! HTTP layer for the spindash backend.
//!
//! Two surfaces over one [`spindash_core`] engine:
//! - `POST /update` — the sensor webhook. Guarded by a shared-secret check
//!   that sits in front of the ingest entrypoint and is independent of the
//!   transition logic.
//! - `GET /summary`, `/series`, `/control`, `/health` — the poll-driven
//!   dashboard queries. Readers only; they never mutate state.
//!
//! This crate stays thin: request decoding, the key guard, origin
//! extraction, and status-code mapping. Every rule about sessions and
//! samples lives in the core.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{ConnectInfo, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
};
use log::warn;
use serde::{Deserialize, Serialize};

use spindash_core::{IngestCoordinator, IngestError, SensorEvent, StatsAggregator};

/// Transport-level configuration.
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
    /// Shared secret the sensor must present on every push. With no key
    /// configured the guard refuses all pushes.
    pub api_key: Option<String>,
    /// Authorize every `/control` caller. Local development only.
    pub dev_mode: bool,
}

/// Shared server state.
struct AppState {
    ingest: IngestCoordinator,
    stats: StatsAggregator,
    config: ServerConfig,
}

// ---------------------------------------------------------------------------
// Wire shapes
// ---------------------------------------------------------------------------

/// Envelope the sensor posts: the shared secret plus the event record.
/// Older firmware double-encodes `data` as a JSON string; both forms are
/// accepted.
#[derive(Debug, Deserialize)]
struct PushEnvelope {
    apikey: Option<String>,
    data: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct Reply {
    reply: String,
}

fn reply(text: impl Into<String>) -> Json<Reply> {
    Json(Reply { reply: text.into() })
}

#[derive(Debug, Serialize)]
struct ControlReply {
    authorized: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'static str>,
}

// ---------------------------------------------------------------------------
// Guards and helpers
// ---------------------------------------------------------------------------

/// Shared-secret check in front of the ingest entrypoint. Fails closed:
/// no configured key, or no presented key, refuses the push.
fn api_key_matches(expected: Option<&str>, presented: Option<&str>) -> bool {
    match (expected, presented) {
        (Some(expected), Some(presented)) => expected == presented,
        _ => false,
    }
}

/// The caller's origin address: first entry of `X-Forwarded-For` when a
/// proxy fronts us, else the socket peer.
fn client_origin(headers: &HeaderMap, peer: SocketAddr) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| peer.ip().to_string())
}

/// Unwrap the optional double-encoding of the `data` field.
fn event_payload(data: serde_json::Value) -> Result<serde_json::Value, IngestError> {
    match data {
        serde_json::Value::String(text) => serde_json::from_str(&text)
            .map_err(|e| IngestError::MalformedPayload(e.to_string())),
        other => Ok(other),
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn handle_update(
    State(state): State<Arc<AppState>>,
    Json(envelope): Json<PushEnvelope>,
) -> (StatusCode, Json<Reply>) {
    if !api_key_matches(state.config.api_key.as_deref(), envelope.apikey.as_deref()) {
        warn!("rejected push with invalid api key");
        return (StatusCode::UNAUTHORIZED, reply("invalid key"));
    }

    let event = match event_payload(envelope.data).and_then(SensorEvent::from_value) {
        Ok(event) => event,
        Err(e) => return (StatusCode::BAD_REQUEST, reply(e.to_string())),
    };

    match state.ingest.submit(&event) {
        Ok(ack) => (StatusCode::OK, reply(ack.reply())),
        Err(e @ IngestError::UnknownEventKind(_)) => {
            (StatusCode::NOT_IMPLEMENTED, reply(e.to_string()))
        }
        Err(e @ IngestError::MalformedPayload(_)) => (StatusCode::BAD_REQUEST, reply(e.to_string())),
        Err(e @ IngestError::Storage(_)) => {
            warn!("state store failed during ingest: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, reply(e.to_string()))
        }
    }
}

async fn handle_summary(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let summary = state
        .stats
        .summary()
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    serde_json::to_value(summary)
        .map(Json)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

async fn handle_series(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let series = state
        .stats
        .series()
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    serde_json::to_value(series)
        .map(Json)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

async fn handle_control(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Result<Json<ControlReply>, StatusCode> {
    if state.config.dev_mode {
        return Ok(Json(ControlReply {
            authorized: true,
            reason: Some("dev mode"),
        }));
    }

    let origin = client_origin(&headers, peer);
    let authorized = state
        .stats
        .is_authorized_origin(&origin)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(ControlReply {
        authorized,
        reason: authorized.then_some("ip match"),
    }))
}

async fn handle_health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<serde_json::Value>) {
    match state.ingest.log().len() {
        Ok(samples) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "ok",
                "samples": samples,
                "version": spindash_core::VERSION,
            })),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({
                "status": "degraded",
                "error": e.to_string(),
            })),
        ),
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the axum router.
pub fn build_router(
    ingest: IngestCoordinator,
    stats: StatsAggregator,
    config: ServerConfig,
) -> Router {
    let state = Arc::new(AppState {
        ingest,
        stats,
        config,
    });

    Router::new()
        .route("/update", post(handle_update))
        .route("/summary", get(handle_summary))
        .route("/series", get(handle_series))
        .route("/control", get(handle_control))
        .route("/health", get(handle_health))
        .with_state(state)
}

/// Run the HTTP layer until the process is stopped.
pub async fn run_server(
    ingest: IngestCoordinator,
    stats: StatsAggregator,
    config: ServerConfig,
    host: &str,
    port: u16,
) {
    let app = build_router(ingest, stats, config);
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .unwrap();
}

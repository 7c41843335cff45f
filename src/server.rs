//! HTTP boundary for the question-answering pipeline.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/` | Liveness check (service name and version) |
//! | `POST` | `/response` | Answer a conversation about a URL |
//!
//! # Error Contract
//!
//! Shape violations (bad JSON, missing fields, out-of-range message counts,
//! non-http URLs) are rejected with `422 {"detail": ...}` before the
//! pipeline runs. Everything past validation resolves to `200`: pipeline
//! failures arrive as soft-answer text in a normal response body. The only
//! `500` is a panic escaping the spawned pipeline task, reported as
//! `{"detail": ..., "type": ...}`.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted; the service is called
//! directly from browser extensions.

use anyhow::Context;
use axum::{
    extract::{rejection::JsonRejection, Request, State},
    http::{HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::models::ChatMessage;
use crate::pipeline::Pipeline;

/// Upper bound on conversation length accepted per request.
pub const MAX_MESSAGES: usize = 20;

/// Requests slower than this are logged at warn.
const SLOW_REQUEST_SECS: f64 = 5.0;

// ============ Metrics ============

/// Request counters, owned by the hosting layer and shared with the
/// middleware through state.
#[derive(Debug, Default)]
pub struct Metrics {
    requests: AtomicU64,
    errors: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }
}

// ============ State and router ============

/// Shared application state passed to handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub metrics: Arc<Metrics>,
}

/// Assemble the router. Split out from [`run_server`] so tests can drive
/// the full middleware stack without binding a socket.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_health))
        .route("/response", post(handle_response))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            track_request,
        ))
        .layer(cors)
        .with_state(state)
}

/// Bind and serve until ctrl-c, then log final request totals.
pub async fn run_server(config: &Config, pipeline: Arc<Pipeline>) -> anyhow::Result<()> {
    let metrics = Arc::new(Metrics::new());
    let state = AppState {
        pipeline,
        metrics: Arc::clone(&metrics),
    };
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.server.bind))?;
    info!(addr = %config.server.bind, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!(
        requests = metrics.requests(),
        errors = metrics.errors(),
        "server stopped"
    );
    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to listen for shutdown signal");
    info!("shutdown signal received, draining connections");
}

// ============ Middleware ============

/// Counts the request, stamps `X-Process-Time` on the response, counts
/// error statuses, and flags slow requests.
async fn track_request(State(state): State<AppState>, request: Request, next: Next) -> Response {
    state.metrics.record_request();
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();

    let mut response = next.run(request).await;

    let elapsed = started.elapsed().as_secs_f64();
    if let Ok(value) = HeaderValue::from_str(&format!("{:.6}", elapsed)) {
        response.headers_mut().insert("x-process-time", value);
    }
    if response.status().is_client_error() || response.status().is_server_error() {
        state.metrics.record_error();
    }
    if elapsed > SLOW_REQUEST_SECS {
        warn!(%method, path = %path, elapsed_secs = elapsed, "slow request");
    }

    response
}

// ============ GET / ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    service: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /response ============

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub messages: Vec<ChatMessage>,
    pub url: String,
}

#[derive(Debug, Serialize)]
struct AskResponse {
    answer: String,
    metadata: ResponseMetadata,
}

#[derive(Debug, Serialize)]
struct ResponseMetadata {
    /// Pipeline wall time in seconds.
    process_time: f64,
    url: String,
}

/// Handler for `POST /response`.
///
/// The pipeline runs in a spawned task so a panic is contained at the
/// join instead of tearing down the connection; it surfaces as the one
/// genuine 500 this service can produce.
async fn handle_response(
    State(state): State<AppState>,
    payload: Result<Json<AskRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(json) => json,
        Err(rejection) => return unprocessable(rejection.body_text()),
    };

    if let Err(message) = validate_request(&request) {
        return unprocessable(message);
    }

    let pipeline = Arc::clone(&state.pipeline);
    let url = request.url.clone();
    let started = Instant::now();
    let task =
        tokio::spawn(async move { pipeline.respond(&request.messages, &request.url).await });

    match task.await {
        Ok(answer) => {
            let process_time = started.elapsed().as_secs_f64();
            Json(AskResponse {
                answer,
                metadata: ResponseMetadata { process_time, url },
            })
            .into_response()
        }
        Err(join_error) => {
            error!(url = %url, error = %join_error, "pipeline task did not complete");
            let kind = if join_error.is_panic() {
                "panic"
            } else {
                "cancelled"
            };
            internal_error(kind)
        }
    }
}

fn validate_request(request: &AskRequest) -> Result<(), String> {
    if !(request.url.starts_with("http://") || request.url.starts_with("https://")) {
        return Err("URL must start with http:// or https://".to_string());
    }
    if request.messages.is_empty() {
        return Err("Messages list cannot be empty".to_string());
    }
    if request.messages.len() > MAX_MESSAGES {
        return Err(format!(
            "Too many messages in conversation history (max: {})",
            MAX_MESSAGES
        ));
    }
    Ok(())
}

fn unprocessable(detail: impl Into<String>) -> Response {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(serde_json::json!({ "detail": detail.into() })),
    )
        .into_response()
}

fn internal_error(kind: &str) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({
            "detail": "An unexpected error occurred while processing your request",
            "type": kind,
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_with(messages: usize, url: &str) -> AskRequest {
        AskRequest {
            messages: (0..messages)
                .map(|i| ChatMessage::user(format!("message {}", i)))
                .collect(),
            url: url.to_string(),
        }
    }

    #[test]
    fn test_validate_accepts_http_and_https() {
        assert!(validate_request(&request_with(1, "http://example.com")).is_ok());
        assert!(validate_request(&request_with(1, "https://example.com")).is_ok());
    }

    #[test]
    fn test_validate_rejects_other_schemes() {
        let err = validate_request(&request_with(1, "ftp://example.com")).unwrap_err();
        assert_eq!(err, "URL must start with http:// or https://");

        let err = validate_request(&request_with(1, "")).unwrap_err();
        assert_eq!(err, "URL must start with http:// or https://");
    }

    #[test]
    fn test_validate_rejects_empty_conversation() {
        let err = validate_request(&request_with(0, "https://example.com")).unwrap_err();
        assert_eq!(err, "Messages list cannot be empty");
    }

    #[test]
    fn test_validate_rejects_oversized_conversation() {
        assert!(validate_request(&request_with(20, "https://example.com")).is_ok());
        let err = validate_request(&request_with(21, "https://example.com")).unwrap_err();
        assert_eq!(err, "Too many messages in conversation history (max: 20)");
    }

    #[test]
    fn test_metrics_counters() {
        let metrics = Metrics::new();
        metrics.record_request();
        metrics.record_request();
        metrics.record_error();
        assert_eq!(metrics.requests(), 2);
        assert_eq!(metrics.errors(), 1);
    }
}

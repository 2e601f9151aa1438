//! HTTP surface.
//!
//! Routes:
//! - `GET /relay/{prompt}` streams the upstream completion back as plain
//!   text; `?metrics=true` brackets it with latency annotations,
//!   `?ttft=true` stops after the first token.
//! - `POST /probe` runs one probe fan-out and returns the JSON report.
//! - `GET /healthz` is liveness.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde::Deserialize;

use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::probe::{ProbeClient, ProbeTarget};
use crate::relay::{RelayMode, relay};
use crate::upstream::UpstreamClient;

#[derive(Clone)]
pub struct AppState {
    pub upstream: Arc<UpstreamClient>,
    pub probe: Option<Arc<ProbeClient>>,
}

impl AppState {
    pub fn from_config(config: &RelayConfig) -> Result<Self, RelayError> {
        let upstream = Arc::new(UpstreamClient::new(config.upstream.clone())?);
        let probe = match &config.probe {
            Some(probe_config) => Some(Arc::new(ProbeClient::new(probe_config.clone())?)),
            None => None,
        };
        Ok(Self { upstream, probe })
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/relay", get(missing_prompt))
        .route("/relay/", get(missing_prompt))
        .route("/relay/{prompt}", get(relay_handler))
        .route("/probe", post(probe_handler))
        .with_state(state)
}

#[derive(Debug, Default, Deserialize)]
struct RelayQuery {
    #[serde(default)]
    metrics: bool,
    #[serde(default)]
    ttft: bool,
}

async fn healthz() -> &'static str {
    "ok"
}

async fn missing_prompt() -> Response {
    error_response(&RelayError::MissingPrompt)
}

async fn relay_handler(
    State(state): State<AppState>,
    Path(prompt): Path<String>,
    Query(query): Query<RelayQuery>,
) -> Response {
    let prompt = prompt.trim();
    if prompt.is_empty() {
        return error_response(&RelayError::MissingPrompt);
    }
    let mode = RelayMode::from_flags(query.metrics, query.ttft);
    tracing::info!(mode = ?mode, prompt_len = prompt.len(), "relay request");

    match relay(&state.upstream, prompt, mode).await {
        Ok(handle) => Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(Body::from_stream(handle.stream))
            .unwrap_or_else(|e| {
                error_response(&RelayError::InternalError(e.to_string()))
            }),
        Err(e) => error_response(&e),
    }
}

async fn probe_handler(
    State(state): State<AppState>,
    axum::Json(target): axum::Json<ProbeTarget>,
) -> Response {
    let Some(probe) = state.probe else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            "probe is not configured".to_string(),
        )
            .into_response();
    };

    match probe.run(&target).await {
        Ok(report) => axum::Json(report).into_response(),
        Err(e) => error_response(&e),
    }
}

fn error_response(err: &RelayError) -> Response {
    let status =
        StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, err.to_string()).into_response()
}

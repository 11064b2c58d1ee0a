//! zkpf-rails-mina-prover library
//!
//! Axum-based HTTP front for [`zkpf_mina_prover::TxProver`].

pub mod counter;

use std::{sync::Arc, time::Instant};

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::error;

use zkpf_mina_prover::{Completion, ProverError, ProvingOutcome, TxProver, TxProvingInput};

use crate::counter::InvocationCounter;

/// Application state
pub struct AppState {
    pub prover: Arc<TxProver>,
    pub counter: InvocationCounter,
}

impl AppState {
    pub fn new(prover: Arc<TxProver>) -> Self {
        let counter = InvocationCounter::new(&prover.config().cache_dir);
        Self { prover, counter }
    }
}

/// Build the router.
pub fn app_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/prove", post(prove))
        .layer(cors)
        .with_state(Arc::new(state))
}

/// Health check endpoint, including what the process is bound to.
async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "network": state.prover.config().network,
        "state": state.prover.state().snapshot(),
    }))
}

/// Prove request body.
#[derive(Debug, Deserialize)]
pub struct ProveRequest {
    pub payload: TxProvingInput,
}

/// Prove response body.
#[derive(Debug, Serialize)]
pub struct ProveResponse {
    pub result: ProveResult,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProveResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serialized_proven_transaction: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
}

impl From<ProvingOutcome> for ProveResult {
    fn from(outcome: ProvingOutcome) -> Self {
        match outcome {
            Completion::Success(tx) => Self {
                success: true,
                serialized_proven_transaction: Some(tx),
                errors: None,
            },
            Completion::Failure(errors) => Self {
                success: false,
                serialized_proven_transaction: None,
                errors: Some(errors),
            },
        }
    }
}

/// Prove a transaction.
///
/// A proof the engine rejects is still a 200; only fatal errors map to
/// error statuses.
async fn prove(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<ProveResponse>, ApiError> {
    let started = Instant::now();
    state.counter.increment().await;

    if body.is_empty() {
        return Err(ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "No body provided",
            "MissingBody",
            started,
        ));
    }

    let request: ProveRequest = serde_json::from_slice(&body).map_err(|e| {
        ApiError::new(
            StatusCode::BAD_REQUEST,
            format!("Malformed request: {e}"),
            "MalformedRequest",
            started,
        )
    })?;

    let outcome = state
        .prover
        .prove(&request.payload)
        .await
        .map_err(|e| ApiError::from_prover(e, started))?;

    Ok(Json(ProveResponse {
        result: outcome.into(),
    }))
}

// ============================================================================
// Errors
// ============================================================================

/// Fatal request error, rendered with enough context for triage.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    kind: &'static str,
    stack: Vec<String>,
    started: Instant,
}

impl ApiError {
    pub fn new(
        status: StatusCode,
        message: impl Into<String>,
        kind: &'static str,
        started: Instant,
    ) -> Self {
        Self {
            status,
            message: message.into(),
            kind,
            stack: Vec::new(),
            started,
        }
    }

    fn from_prover(err: ProverError, started: Instant) -> Self {
        let mut stack = Vec::new();
        let mut source = std::error::Error::source(&err);
        while let Some(cause) = source {
            stack.push(cause.to_string());
            source = cause.source();
        }
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: err.to_string(),
            kind: err.kind(),
            stack,
            started,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    message: String,
    error: &'static str,
    stack: Vec<String>,
    memory_usage: MemoryUsage,
    /// Milliseconds since the request arrived.
    execution_time: u64,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let body = ErrorBody {
            message: self.message,
            error: self.kind,
            stack: self.stack,
            memory_usage: MemoryUsage::current(),
            execution_time: self.started.elapsed().as_millis() as u64,
        };
        error!(
            status = %self.status,
            kind = body.error,
            elapsed_ms = body.execution_time,
            rss_kb = ?body.memory_usage.rss_kb,
            "request failed: {}",
            body.message
        );
        (self.status, Json(body)).into_response()
    }
}

/// Resident memory of this process, from `/proc/self/status` where available.
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct MemoryUsage {
    rss_kb: Option<u64>,
    peak_rss_kb: Option<u64>,
}

impl MemoryUsage {
    fn current() -> Self {
        std::fs::read_to_string("/proc/self/status")
            .map(|status| Self::parse(&status))
            .unwrap_or_default()
    }

    fn parse(status: &str) -> Self {
        let field = |name: &str| {
            status
                .lines()
                .find_map(|line| line.strip_prefix(name))
                .and_then(|rest| rest.trim().trim_end_matches("kB").trim().parse().ok())
        };
        Self {
            rss_kb: field("VmRSS:"),
            peak_rss_kb: field("VmHWM:"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_usage_parsing() {
        let status = "Name:\tzkpf\nVmHWM:\t  204800 kB\nVmRSS:\t  102400 kB\nThreads:\t8\n";
        let usage = MemoryUsage::parse(status);
        assert_eq!(usage.rss_kb, Some(102_400));
        assert_eq!(usage.peak_rss_kb, Some(204_800));

        let empty = MemoryUsage::parse("");
        assert!(empty.rss_kb.is_none());
    }

    #[test]
    fn test_failure_result_shape() {
        let result = ProveResult::from(Completion::Failure(vec!["insufficient balance".into()]));
        let json = serde_json::to_value(ProveResponse { result }).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "result": { "success": false, "errors": ["insufficient balance"] }
            })
        );
    }

    #[test]
    fn test_prover_error_keeps_source_chain() {
        let err = ProverError::NetworkQueryFailed(zkpf_mina_prover::NetworkError::Request(
            "connection reset".into(),
        ));
        let api = ApiError::from_prover(err, Instant::now());
        assert_eq!(api.kind, "NetworkQueryFailed");
        assert_eq!(api.stack, vec!["request failed: connection reset".to_string()]);
        assert_eq!(api.status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}

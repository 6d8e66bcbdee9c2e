//! REST API Server for the wealth advisor orchestrator
//!
//! Exposes the query pipeline, tool health and usage analytics over HTTP.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::agent::Orchestrator;
use crate::config::MAX_COOLDOWN;
use crate::error::OrchestrationError;
use crate::tools::cooldown_deadline;

/// Longest question accepted by the query endpoint, in characters
pub const MAX_QUESTION_CHARS: usize = 4_000;

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct QueryRequest {
    pub question: String,
    #[serde(default = "default_include_context")]
    pub include_context: bool,
}

fn default_include_context() -> bool {
    true
}

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct DisableRequest {
    /// Overrides the configured circuit-breaker cooldown
    pub cooldown_secs: Option<u64>,
}

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Arc<Orchestrator>,
}

fn status_for(error: &OrchestrationError) -> StatusCode {
    match error {
        OrchestrationError::InvalidQuestion(_) | OrchestrationError::InvalidRequest(_) => {
            StatusCode::BAD_REQUEST
        }
        OrchestrationError::ToolNotFound(_) => StatusCode::NOT_FOUND,
        OrchestrationError::SynthesisFailure(_) => StatusCode::BAD_GATEWAY,
        OrchestrationError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn failure(error: OrchestrationError) -> (StatusCode, Json<ApiResponse>) {
    (status_for(&error), Json(ApiResponse::error(error.to_string())))
}

fn validate_question(question: &str) -> Result<(), OrchestrationError> {
    let chars = question.chars().count();
    if chars > MAX_QUESTION_CHARS {
        return Err(OrchestrationError::InvalidQuestion(format!(
            "question is {} characters; the limit is {}",
            chars, MAX_QUESTION_CHARS
        )));
    }
    Ok(())
}

fn disable_cooldown(requested: Option<u64>, default: Duration) -> Result<Duration, OrchestrationError> {
    match requested {
        None => Ok(default),
        Some(secs) if secs > MAX_COOLDOWN.as_secs() => Err(OrchestrationError::InvalidRequest(format!(
            "cooldown_secs is {}; the limit is {}",
            secs,
            MAX_COOLDOWN.as_secs()
        ))),
        Some(secs) => Ok(Duration::from_secs(secs)),
    }
}

/// =============================
/// Health Endpoint
/// =============================

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Query Endpoint
/// =============================

async fn query(
    State(state): State<ApiState>,
    Json(req): Json<QueryRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    if let Err(e) = validate_question(&req.question) {
        warn!(error = %e, "Rejected question");
        return failure(e);
    }

    match state.orchestrator.query(&req.question, req.include_context).await {
        Ok(response) => (StatusCode::OK, Json(ApiResponse::success(response))),
        Err(e) => failure(e),
    }
}

/// =============================
/// Tool Health Endpoints
/// =============================

async fn tools_status(State(state): State<ApiState>) -> (StatusCode, Json<ApiResponse>) {
    let status = state.orchestrator.registry().status().await;
    (StatusCode::OK, Json(ApiResponse::success(status)))
}

async fn enable_tool(
    State(state): State<ApiState>,
    Path(tool_id): Path<String>,
) -> (StatusCode, Json<ApiResponse>) {
    match state.orchestrator.registry().mark_available(&tool_id).await {
        Ok(()) => {
            info!(tool_id = %tool_id, "Tool enabled via API");
            (
                StatusCode::OK,
                Json(ApiResponse::success(serde_json::json!({
                    "id": tool_id,
                    "enabled": true,
                }))),
            )
        }
        Err(e) => failure(e),
    }
}

async fn disable_tool(
    State(state): State<ApiState>,
    Path(tool_id): Path<String>,
    body: Option<Json<DisableRequest>>,
) -> (StatusCode, Json<ApiResponse>) {
    let requested = body.and_then(|Json(req)| req.cooldown_secs);
    let cooldown = match disable_cooldown(requested, state.orchestrator.circuit_cooldown()) {
        Ok(cooldown) => cooldown,
        Err(e) => {
            warn!(tool_id = %tool_id, error = %e, "Rejected disable request");
            return failure(e);
        }
    };

    match state
        .orchestrator
        .registry()
        .mark_unavailable(&tool_id, cooldown_deadline(cooldown))
        .await
    {
        Ok(()) => {
            info!(tool_id = %tool_id, cooldown_secs = cooldown.as_secs(), "Tool disabled via API");
            (
                StatusCode::OK,
                Json(ApiResponse::success(serde_json::json!({
                    "id": tool_id,
                    "enabled": false,
                    "cooldown_secs": cooldown.as_secs(),
                }))),
            )
        }
        Err(e) => failure(e),
    }
}

/// =============================
/// Analytics Endpoint
/// =============================

async fn analytics(State(state): State<ApiState>) -> (StatusCode, Json<ApiResponse>) {
    let snapshot = state.orchestrator.analytics().snapshot().await;
    (StatusCode::OK, Json(ApiResponse::success(snapshot)))
}

/// =============================
/// Router
/// =============================

pub fn create_router(orchestrator: Arc<Orchestrator>) -> Router {
    let state = ApiState { orchestrator };

    Router::new()
        .route("/health", get(health))
        .route("/api/v1/advisor/query", post(query))
        .route("/api/v1/advisor/tools/status", get(tools_status))
        .route("/api/v1/advisor/tools/:id/enable", post(enable_tool))
        .route("/api/v1/advisor/tools/:id/disable", post(disable_tool))
        .route("/api/v1/advisor/analytics", get(analytics))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    orchestrator: Arc<Orchestrator>,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(orchestrator);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}

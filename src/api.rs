//! REST API server for the financial query agent
//!
//! Exposes the planning loop via HTTP endpoints
//! Integrates with frontend UI

use axum::{extract::Path, extract::State, http::StatusCode, routing::get, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::agent::Orchestrator;
use crate::models::UserPreferences;

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    pub session_id: Option<String>,
    pub preferences: Option<UserPreferences>,
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

/// =============================
/// Helpers
/// =============================

fn stable_uuid_from_string(input: &str) -> uuid::Uuid {
    use sha2::{Digest, Sha256};

    let hash = Sha256::digest(input.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&hash[..16]);

    // Set UUID version (4) and variant (RFC4122) bits.
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;

    uuid::Uuid::from_bytes(bytes)
}

fn parse_or_stable_uuid(value: Option<&str>, fallback_seed: &str) -> uuid::Uuid {
    match value {
        Some(v) if !v.trim().is_empty() => {
            uuid::Uuid::parse_str(v).unwrap_or_else(|_| stable_uuid_from_string(v))
        }
        _ => stable_uuid_from_string(fallback_seed),
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

async fn run_query(
    State(state): State<ApiState>,
    Json(req): Json<QueryRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    info!("Received query: {}", req.query);

    if req.query.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error("Query must not be empty".into())),
        );
    }

    let session_id = parse_or_stable_uuid(req.session_id.as_deref(), "anonymous-session");

    match state
        .orchestrator
        .run_turn(session_id, &req.query, req.preferences)
        .await
    {
        Ok(turn) => (
            StatusCode::OK,
            Json(ApiResponse::success(serde_json::json!({
                "session_id": session_id.to_string(),
                "plan": turn.plan,
                "notes": turn.notes,
                "failure": turn.failure,
                "executed_steps": turn.steps.len(),
            }))),
        ),
        Err(e) => (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error(format!("Planning failed: {}", e))),
        ),
    }
}

/// =============================
/// Audit Endpoint
/// =============================

async fn session_audits(
    State(state): State<ApiState>,
    Path(session_id): Path<String>,
) -> (StatusCode, Json<ApiResponse>) {
    let session_id = parse_or_stable_uuid(Some(&session_id), "anonymous-session");
    let audits = state.orchestrator.audit_log().list_for_session(session_id).await;
    (StatusCode::OK, Json(ApiResponse::success(audits)))
}

/// =============================
/// Router
/// =============================

pub fn create_router(orchestrator: Arc<Orchestrator>) -> Router {
    let state = ApiState { orchestrator };

    Router::new()
        .route("/health", get(health))
        .route("/api/query", post(run_query))
        .route("/api/session/:session_id/audits", get(session_audits))
        .with_state(state)
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stable_uuid_is_deterministic() {
        let a = stable_uuid_from_string("session-alpha");
        let b = stable_uuid_from_string("session-alpha");
        let c = stable_uuid_from_string("session-beta");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_parse_or_stable_uuid_accepts_real_uuid() {
        let real = uuid::Uuid::new_v4();
        assert_eq!(parse_or_stable_uuid(Some(&real.to_string()), "seed"), real);
        assert_eq!(
            parse_or_stable_uuid(None, "seed"),
            stable_uuid_from_string("seed")
        );
    }
}

//! Campaign Vitals HTTP REST API
//!
//! Axum server exposing evaluation and trace management over HTTP. Runs
//! alongside the Unix socket IPC server.
//!
//! Each endpoint has a thin axum handler that delegates to an inner function
//! returning `(StatusCode, serde_json::Value)`. Inner functions build an IPC
//! request and go through the same router as the socket server.
//!
//! Endpoints:
//! - GET    /health               health and wiring
//! - GET    /version              server version
//! - GET    /api/config           effective (non-secret) configuration
//! - GET    /api/categories       health category catalog
//! - POST   /api/analyze          evaluate one record
//! - POST   /api/analyze/batch    evaluate many records
//! - POST   /api/analyze/text     extract from free text, then evaluate
//! - POST   /api/extract          extract only, no model call
//! - GET    /api/sessions         session summaries, newest first
//! - GET    /api/sessions/:id     one session with its summary
//! - DELETE /api/sessions/:id     delete a session
//! - POST   /api/traces/cleanup   retention pass (optionally dry run)
//! - GET    /api/traces/export    every session
//! - GET    /api/traces/stats     aggregate statistics

use std::sync::Arc;

use anyhow::Result;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use vitals_core::ipc::{VitalsRequest, VitalsResponse};
use vitals_core::models::ClientRecord;

use crate::state::AppState;

/// Build the Axum router with all endpoints
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        .route("/api/config", get(config_handler))
        .route("/api/categories", get(categories_handler))
        .route("/api/analyze", post(analyze_handler))
        .route("/api/analyze/batch", post(analyze_batch_handler))
        .route("/api/analyze/text", post(analyze_text_handler))
        .route("/api/extract", post(extract_handler))
        .route("/api/sessions", get(list_sessions_handler))
        .route(
            "/api/sessions/:id",
            get(get_session_handler).delete(delete_session_handler),
        )
        .route("/api/traces/cleanup", post(cleanup_handler))
        .route("/api/traces/export", get(export_handler))
        .route("/api/traces/stats", get(stats_handler))
        .with_state(state)
}

/// Start the HTTP server on the configured address.
/// Gracefully shuts down when the broadcast shutdown signal fires.
pub async fn start_http_server(
    state: Arc<AppState>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let addr = format!("{}:{}", state.config.http.host, state.config.http.port);

    let app = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Vitals HTTP API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

// ============================================================================
// Request DTOs
// ============================================================================

/// A record with an optional session id alongside its fields.
#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    #[serde(flatten)]
    pub record: ClientRecord,
    pub session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    pub records: Vec<ClientRecord>,
    pub session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TextRequest {
    pub text: String,
    pub session_id: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct CleanupRequest {
    pub max_age_days: Option<u32>,
    #[serde(default)]
    pub dry_run: bool,
}

// ============================================================================
// Inner (directly testable) functions
// ============================================================================

/// Run one IPC request through the router and map it onto HTTP.
pub async fn dispatch(state: &Arc<AppState>, request: VitalsRequest) -> (StatusCode, serde_json::Value) {
    let response = crate::router::handle_request(request, state).await;
    match response_to_http(response) {
        Ok(data) => (StatusCode::OK, data),
        Err(failure) => failure,
    }
}

pub async fn health_inner(state: &Arc<AppState>) -> (StatusCode, serde_json::Value) {
    let (status, mut body) = dispatch(state, VitalsRequest::Health).await;
    if let Some(obj) = body.as_object_mut() {
        obj.insert(
            "socket".to_string(),
            serde_json::json!(state.config.service.socket_path),
        );
    }
    (status, body)
}

pub fn version_inner() -> serde_json::Value {
    serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "protocol": "vitals/1",
    })
}

/// Effective configuration. API keys never live in the config and are not shown.
pub fn config_inner(state: &AppState) -> serde_json::Value {
    let config = &state.config;
    serde_json::json!({
        "model": {
            "provider": config.model.provider,
            "model_name": config.model.model_name,
            "max_tokens": config.model.max_tokens,
            "temperature": config.model.temperature,
            "timeout_seconds": config.model.timeout_seconds,
        },
        "trace": {
            "enabled": config.trace.enabled,
            "backend": config.trace.backend,
            "max_age_days": config.trace.max_age_days,
            "max_events_per_session": config.trace.max_events_per_session,
            "auto_cleanup": config.trace.auto_cleanup,
            "include_sensitive_data": config.trace.include_sensitive_data,
        },
        "evaluation": {
            "max_concurrency": config.evaluation.max_concurrency,
        },
        "validation": {
            "company_name_max_length": config.validation.company_name_max_length,
            "monthly_budget_max": config.validation.monthly_budget_max,
            "duration_min_months": config.validation.duration_min_months,
            "duration_max_months": config.validation.duration_max_months,
            "text_field_max_length": config.validation.text_field_max_length,
            "min_text_fields": config.validation.min_text_fields,
        },
        "categories": state.catalog.entries(),
    })
}

pub async fn analyze_inner(state: &Arc<AppState>, req: AnalyzeRequest) -> (StatusCode, serde_json::Value) {
    dispatch(
        state,
        VitalsRequest::Analyze {
            record: req.record,
            session_id: req.session_id,
        },
    )
    .await
}

pub async fn analyze_batch_inner(
    state: &Arc<AppState>,
    req: BatchRequest,
) -> (StatusCode, serde_json::Value) {
    dispatch(
        state,
        VitalsRequest::AnalyzeBatch {
            records: req.records,
            session_id: req.session_id,
        },
    )
    .await
}

pub async fn analyze_text_inner(
    state: &Arc<AppState>,
    req: TextRequest,
) -> (StatusCode, serde_json::Value) {
    dispatch(
        state,
        VitalsRequest::AnalyzeText {
            text: req.text,
            session_id: req.session_id,
        },
    )
    .await
}

pub async fn cleanup_inner(
    state: &Arc<AppState>,
    req: CleanupRequest,
) -> (StatusCode, serde_json::Value) {
    dispatch(
        state,
        VitalsRequest::Cleanup {
            max_age_days: req.max_age_days,
            dry_run: req.dry_run,
        },
    )
    .await
}

// ============================================================================
// Axum handler wrappers (thin, delegate to inner functions)
// ============================================================================

pub async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let (status, body) = health_inner(&state).await;
    (status, Json(body))
}

pub async fn version_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(version_inner()))
}

pub async fn config_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (StatusCode::OK, Json(config_inner(&state)))
}

pub async fn categories_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let (status, body) = dispatch(&state, VitalsRequest::Categories).await;
    (status, Json(body))
}

pub async fn analyze_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AnalyzeRequest>,
) -> impl IntoResponse {
    let (status, body) = analyze_inner(&state, req).await;
    (status, Json(body))
}

pub async fn analyze_batch_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BatchRequest>,
) -> impl IntoResponse {
    let (status, body) = analyze_batch_inner(&state, req).await;
    (status, Json(body))
}

pub async fn analyze_text_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TextRequest>,
) -> impl IntoResponse {
    let (status, body) = analyze_text_inner(&state, req).await;
    (status, Json(body))
}

pub async fn extract_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TextRequest>,
) -> impl IntoResponse {
    let (status, body) = dispatch(&state, VitalsRequest::Extract { text: req.text }).await;
    (status, Json(body))
}

pub async fn list_sessions_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let (status, body) = dispatch(&state, VitalsRequest::ListSessions).await;
    (status, Json(body))
}

pub async fn get_session_handler(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    let (status, body) = dispatch(&state, VitalsRequest::GetSession { session_id }).await;
    (status, Json(body))
}

pub async fn delete_session_handler(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    let (status, body) = dispatch(&state, VitalsRequest::DeleteSession { session_id }).await;
    (status, Json(body))
}

/// The body is optional; an empty POST runs a real cleanup at the configured age.
pub async fn cleanup_handler(
    State(state): State<Arc<AppState>>,
    req: Option<Json<CleanupRequest>>,
) -> impl IntoResponse {
    let req = req.map(|Json(r)| r).unwrap_or_default();
    let (status, body) = cleanup_inner(&state, req).await;
    (status, Json(body))
}

pub async fn export_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let (status, body) = dispatch(&state, VitalsRequest::Export).await;
    (status, Json(body))
}

pub async fn stats_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let (status, body) = dispatch(&state, VitalsRequest::Stats).await;
    (status, Json(body))
}

// ============================================================================
// Helpers
// ============================================================================

/// HTTP status for an error taxonomy name.
pub fn status_for_kind(kind: &str) -> StatusCode {
    match kind {
        "InvalidRecord" | "InvalidSessionId" | "InvalidRequest" => StatusCode::BAD_REQUEST,
        "SessionNotFound" => StatusCode::NOT_FOUND,
        "SessionCapacityExceeded" => StatusCode::CONFLICT,
        "ProviderRejected" => StatusCode::UNPROCESSABLE_ENTITY,
        "MalformedResponse" => StatusCode::BAD_GATEWAY,
        "ProviderUnavailable" => StatusCode::SERVICE_UNAVAILABLE,
        "ProviderTimeout" => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Convert an IPC `VitalsResponse` into an HTTP body, or a status and error body.
pub fn response_to_http(
    response: VitalsResponse,
) -> std::result::Result<serde_json::Value, (StatusCode, serde_json::Value)> {
    if response.status == "ok" {
        return Ok(response.data.unwrap_or(serde_json::json!({})));
    }

    let kind = response
        .error_kind
        .unwrap_or_else(|| "InternalError".to_string());
    Err((
        status_for_kind(&kind),
        serde_json::json!({
            "status": "error",
            "error_kind": kind,
            "error": response.error.unwrap_or_else(|| "unknown error".to_string()),
        }),
    ))
}

// ============================================================================
// Unit Tests: inner functions and mapping
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use vitals_core::{
        FileTraceStore, InvokeOptions, ModelInvoker, ModelOutput, PromptSpec, ProviderError,
        VitalsConfig,
    };

    struct Offline;

    #[async_trait]
    impl ModelInvoker for Offline {
        async fn invoke(
            &self,
            _prompt: &PromptSpec,
            _options: &InvokeOptions,
        ) -> Result<ModelOutput, ProviderError> {
            Err(ProviderError::Unavailable("connection refused".to_string()))
        }

        fn name(&self) -> &str {
            "offline"
        }
    }

    fn make_state(dir: &tempfile::TempDir) -> Arc<AppState> {
        let store = Arc::new(FileTraceStore::open(dir.path(), 1000).unwrap());
        Arc::new(AppState::new(VitalsConfig::default(), Arc::new(Offline), store).unwrap())
    }

    // ========================================================================
    // TEST 1: version_inner is pure
    // ========================================================================
    #[test]
    fn test_version_inner_pure() {
        let v = version_inner();
        assert!(v["version"].is_string());
        assert_eq!(v["protocol"], "vitals/1");
    }

    // ========================================================================
    // TEST 2: response_to_http: ok extracts data, missing data is {}
    // ========================================================================
    #[test]
    fn test_response_to_http_ok() {
        let resp = VitalsResponse::ok(serde_json::json!({"total": 0}));
        assert_eq!(response_to_http(resp).unwrap()["total"], 0);

        let mut resp = VitalsResponse::ok(serde_json::json!({}));
        resp.data = None;
        assert!(response_to_http(resp).unwrap().is_object());
    }

    // ========================================================================
    // TEST 3: response_to_http: error carries kind and status
    // ========================================================================
    #[test]
    fn test_response_to_http_error() {
        let resp = VitalsResponse::err("SessionNotFound", "Session not found: x");
        let (status, body) = response_to_http(resp).unwrap_err();
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error_kind"], "SessionNotFound");
        assert_eq!(body["error"], "Session not found: x");

        let mut resp = VitalsResponse::err("x", "y");
        resp.error = None;
        resp.error_kind = None;
        let (status, body) = response_to_http(resp).unwrap_err();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "unknown error");
    }

    // ========================================================================
    // TEST 4: every taxonomy kind has its status
    // ========================================================================
    #[test]
    fn test_status_for_kind() {
        assert_eq!(status_for_kind("InvalidRecord"), StatusCode::BAD_REQUEST);
        assert_eq!(status_for_kind("InvalidSessionId"), StatusCode::BAD_REQUEST);
        assert_eq!(status_for_kind("SessionCapacityExceeded"), StatusCode::CONFLICT);
        assert_eq!(status_for_kind("ProviderRejected"), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(status_for_kind("MalformedResponse"), StatusCode::BAD_GATEWAY);
        assert_eq!(status_for_kind("ProviderUnavailable"), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(status_for_kind("ProviderTimeout"), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(
            status_for_kind("TraceStoreUnavailable"),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(status_for_kind("InternalError"), StatusCode::INTERNAL_SERVER_ERROR);
    }

    // ========================================================================
    // TEST 5: health_inner reports wiring
    // ========================================================================
    #[tokio::test]
    async fn test_health_inner() {
        let dir = tempfile::tempdir().unwrap();
        let state = make_state(&dir);
        let (status, body) = health_inner(&state).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["provider"], "offline");
        assert_eq!(body["trace_backend"], "file");
        assert_eq!(body["socket"], "/tmp/vitals.sock");
    }

    // ========================================================================
    // TEST 6: provider outage surfaces as 503
    // ========================================================================
    #[tokio::test]
    async fn test_analyze_inner_provider_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let state = make_state(&dir);

        let req = AnalyzeRequest {
            record: ClientRecord {
                company_name: "Acme".to_string(),
                campaign_objectives: "Leads".to_string(),
                client_reported_notes: "Happy".to_string(),
                ..ClientRecord::default()
            },
            session_id: Some("outage".to_string()),
        };
        let (status, body) = analyze_inner(&state, req).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error_kind"], "ProviderUnavailable");
    }

    // ========================================================================
    // TEST 7: config never exposes more than the documented sections
    // ========================================================================
    #[test]
    fn test_config_inner_sections() {
        let dir = tempfile::tempdir().unwrap();
        let state = make_state(&dir);
        let body = config_inner(&state);
        assert_eq!(body["model"]["model_name"], "gpt-3.5-turbo");
        assert_eq!(body["trace"]["include_sensitive_data"], false);
        assert_eq!(body["categories"].as_array().unwrap().len(), 4);
        assert!(body["model"].get("base_url").is_none());
    }
}

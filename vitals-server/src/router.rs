use std::sync::Arc;

use serde::Serialize;
use vitals_core::ipc::{VitalsRequest, VitalsResponse};
use vitals_core::models::EvaluationResult;
use vitals_core::trace::validate_session_id;
use vitals_core::{TraceError, VitalsError};

use crate::state::AppState;
use crate::subsystems::evaluate;

/// Dispatch one IPC request. Shared by the Unix socket server and the HTTP API.
pub async fn handle_request(request: VitalsRequest, state: &Arc<AppState>) -> VitalsResponse {
    match request {
        VitalsRequest::Ping => VitalsResponse::pong(),
        VitalsRequest::Health => VitalsResponse::ok(serde_json::json!({
            "status": "healthy",
            "version": env!("CARGO_PKG_VERSION"),
            "provider": state.invoker.name(),
            "model": state.options.model,
            "trace_backend": state.store.name(),
            "tracing_enabled": state.config.trace.enabled,
        })),
        VitalsRequest::Categories => to_response(state.catalog.entries()),
        VitalsRequest::Analyze { record, session_id } => {
            let session_id = match resolve_session_id(session_id) {
                Ok(id) => id,
                Err(e) => return fail(e),
            };
            match evaluate::evaluate_one(state, record, &session_id).await {
                Ok(result) => VitalsResponse::ok(serde_json::json!({
                    "session_id": session_id,
                    "result": result,
                })),
                Err(e) => VitalsResponse::from(&e),
            }
        }
        VitalsRequest::AnalyzeBatch {
            records,
            session_id,
        } => {
            if records.is_empty() {
                return fail(VitalsError::InvalidRecord(vec![
                    "At least one record is required".to_string(),
                ]));
            }
            let session_id = match resolve_session_id(session_id) {
                Ok(id) => id,
                Err(e) => return fail(e),
            };
            let results = evaluate::evaluate_many(state, records, &session_id).await;
            VitalsResponse::ok(batch_body(&session_id, &results))
        }
        VitalsRequest::AnalyzeText { text, session_id } => {
            let session_id = match resolve_session_id(session_id) {
                Ok(id) => id,
                Err(e) => return fail(e),
            };
            let analysis = evaluate::analyze_text(state, &text, &session_id).await;
            let mut body = batch_body(&session_id, &analysis.results);
            if let Some(obj) = body.as_object_mut() {
                obj.insert(
                    "records_found".to_string(),
                    serde_json::json!(analysis.records_found),
                );
                if let Some(message) = analysis.message {
                    obj.insert("message".to_string(), serde_json::json!(message));
                }
            }
            VitalsResponse::ok(body)
        }
        VitalsRequest::Extract { text } => {
            let records = state.extractor.extract(&text);
            let synthetic = records.iter().any(|r| r.is_synthetic());
            VitalsResponse::ok(serde_json::json!({
                "records_found": records.len(),
                "synthetic": synthetic,
                "records": records,
            }))
        }
        VitalsRequest::ListSessions => match state.store.list_sessions().await {
            Ok(sessions) => VitalsResponse::ok(serde_json::json!({
                "total": sessions.len(),
                "sessions": sessions,
            })),
            Err(e) => fail(e),
        },
        VitalsRequest::GetSession { session_id } => {
            if let Err(e) = validate_session_id(&session_id) {
                return fail(e);
            }
            match state.store.get_session(&session_id).await {
                Ok(session) => VitalsResponse::ok(serde_json::json!({
                    "summary": session.summary(),
                    "session": session,
                })),
                Err(e) => fail(e),
            }
        }
        VitalsRequest::DeleteSession { session_id } => {
            if let Err(e) = validate_session_id(&session_id) {
                return fail(e);
            }
            match state.store.delete_session(&session_id).await {
                Ok(deleted) => {
                    tracing::info!(session_id = %session_id, deleted, "Session delete requested");
                    VitalsResponse::ok(serde_json::json!({
                        "session_id": session_id,
                        "deleted": deleted,
                    }))
                }
                Err(e) => fail(e),
            }
        }
        VitalsRequest::Cleanup {
            max_age_days,
            dry_run,
        } => {
            let days = max_age_days.unwrap_or(state.config.trace.max_age_days);
            match state.store.cleanup(days, dry_run).await {
                Ok(report) => to_response(&report),
                Err(e) => fail(e),
            }
        }
        VitalsRequest::Export => match state.store.export_all().await {
            Ok(export) => to_response(&export),
            Err(e) => fail(e),
        },
        VitalsRequest::Stats => match state.store.stats().await {
            Ok(stats) => to_response(&stats),
            Err(e) => fail(e),
        },
    }
}

/// Caller-supplied id, or a fresh v4 UUID when none was given.
pub fn resolve_session_id(session_id: Option<String>) -> Result<String, TraceError> {
    match session_id {
        Some(id) => {
            validate_session_id(&id)?;
            Ok(id)
        }
        None => Ok(uuid::Uuid::new_v4().to_string()),
    }
}

/// Per-item `status` plus either the result or the error taxonomy.
fn batch_body(session_id: &str, results: &[Result<EvaluationResult, VitalsError>]) -> serde_json::Value {
    let succeeded = results.iter().filter(|r| r.is_ok()).count();
    let items: Vec<serde_json::Value> = results
        .iter()
        .enumerate()
        .map(|(index, outcome)| match outcome {
            Ok(result) => serde_json::json!({
                "index": index,
                "status": "ok",
                "result": result,
            }),
            Err(e) => serde_json::json!({
                "index": index,
                "status": "error",
                "error_kind": e.kind(),
                "error": e.to_string(),
            }),
        })
        .collect();

    serde_json::json!({
        "session_id": session_id,
        "total": results.len(),
        "succeeded": succeeded,
        "failed": results.len() - succeeded,
        "results": items,
    })
}

fn to_response<T: Serialize + ?Sized>(value: &T) -> VitalsResponse {
    match serde_json::to_value(value) {
        Ok(data) => VitalsResponse::ok(data),
        Err(e) => fail(VitalsError::Internal(format!("Serialization error: {}", e))),
    }
}

fn fail(e: impl Into<VitalsError>) -> VitalsResponse {
    VitalsResponse::from(&e.into())
}

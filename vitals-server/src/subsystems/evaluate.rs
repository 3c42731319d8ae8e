//! Evaluation orchestrator: record → prompt → model → category, traced.
//!
//! Each record runs as its own spawned task. Its `user_request` event is
//! appended before the model is called and its `bot_response` or `error`
//! event after, so a caller that goes away mid-batch cannot leave a request
//! without its completion. Batches run with bounded concurrency and return
//! results in input order.

use std::sync::Arc;
use std::time::Instant;

use futures::stream::{self, StreamExt};
use vitals_core::models::event::Metadata;
use vitals_core::models::{ClientRecord, EvaluationResult, RecordDigest, TraceEvent};
use vitals_core::{build_prompt, categorize, VitalsError};

use crate::state::AppState;

/// Where a record came from; decides which validation rules apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordSource {
    /// Submitted as structured input; must carry enough narrative fields
    Submitted,
    /// Produced by the free-text extractor
    Extracted,
}

/// Outcome of a free-text analysis.
#[derive(Debug)]
pub struct TextAnalysis {
    pub records_found: usize,
    /// Set when nothing could be extracted
    pub message: Option<String>,
    pub results: Vec<Result<EvaluationResult, VitalsError>>,
}

pub async fn evaluate_one(
    state: &Arc<AppState>,
    record: ClientRecord,
    session_id: &str,
) -> Result<EvaluationResult, VitalsError> {
    spawn_pipeline(state, record, session_id, RecordSource::Submitted).await
}

/// Evaluate records independently; one failure does not affect the others.
pub async fn evaluate_many(
    state: &Arc<AppState>,
    records: Vec<ClientRecord>,
    session_id: &str,
) -> Vec<Result<EvaluationResult, VitalsError>> {
    evaluate_records(state, records, session_id, RecordSource::Submitted).await
}

/// Extract records from free text and evaluate every one of them.
pub async fn analyze_text(state: &Arc<AppState>, raw_text: &str, session_id: &str) -> TextAnalysis {
    let records = state.extractor.extract(raw_text);
    if records.is_empty() {
        return TextAnalysis {
            records_found: 0,
            message: Some(VitalsError::ExtractionYieldedNothing.to_string()),
            results: Vec::new(),
        };
    }

    let records_found = records.len();
    let results = evaluate_records(state, records, session_id, RecordSource::Extracted).await;
    TextAnalysis {
        records_found,
        message: None,
        results,
    }
}

async fn evaluate_records(
    state: &Arc<AppState>,
    records: Vec<ClientRecord>,
    session_id: &str,
    source: RecordSource,
) -> Vec<Result<EvaluationResult, VitalsError>> {
    let limit = state.config.evaluation.max_concurrency.max(1);
    tracing::info!(
        session_id = %session_id,
        records = records.len(),
        concurrency = limit,
        "Evaluating batch"
    );

    stream::iter(records)
        .map(|record| spawn_pipeline(state, record, session_id, source))
        .buffered(limit)
        .collect()
        .await
}

async fn spawn_pipeline(
    state: &Arc<AppState>,
    record: ClientRecord,
    session_id: &str,
    source: RecordSource,
) -> Result<EvaluationResult, VitalsError> {
    let handle = tokio::spawn(run_pipeline(
        state.clone(),
        record,
        session_id.to_string(),
        source,
    ));
    handle
        .await
        .map_err(|e| VitalsError::Internal(format!("evaluation task failed: {}", e)))?
}

async fn run_pipeline(
    state: Arc<AppState>,
    record: ClientRecord,
    session_id: String,
    source: RecordSource,
) -> Result<EvaluationResult, VitalsError> {
    let tracing_enabled = state.config.trace.enabled;
    let sensitive = state.config.trace.include_sensitive_data;
    let started = Instant::now();
    let record = match source {
        RecordSource::Submitted => record.with_default_duration(),
        RecordSource::Extracted => record,
    };

    if tracing_enabled {
        let traced = if sensitive { record.clone() } else { record.redacted() };
        state
            .store
            .append(&TraceEvent::user_request(&session_id, traced))
            .await?;
    }

    let outcome = evaluate_record(&state, &record, source, started).await;

    if tracing_enabled {
        let elapsed = started.elapsed().as_secs_f64();
        let completion = match &outcome {
            Ok((result, metadata)) => {
                let mut traced = result.clone();
                if !sensitive {
                    traced.record = RecordDigest::from(&record.redacted());
                }
                TraceEvent::bot_response(&session_id, traced, metadata.clone())
            }
            Err(e) => {
                let mut metadata = Metadata::new();
                metadata.insert("processing_time_seconds".to_string(), elapsed.into());
                TraceEvent::error(
                    &session_id,
                    &record.company_name,
                    e.kind(),
                    e.to_string(),
                    metadata,
                )
            }
        };
        state.store.append(&completion).await?;
    }

    match outcome {
        Ok((result, _)) => {
            tracing::info!(
                session_id = %session_id,
                company = %record.company_name,
                category = %result.category,
                confidence = result.confidence,
                elapsed_secs = result.processing_time_secs,
                "Campaign evaluated"
            );
            Ok(result)
        }
        Err(e) => {
            tracing::warn!(
                session_id = %session_id,
                company = %record.company_name,
                error_kind = e.kind(),
                error = %e,
                "Campaign evaluation failed"
            );
            Err(e)
        }
    }
}

async fn evaluate_record(
    state: &AppState,
    record: &ClientRecord,
    source: RecordSource,
    started: Instant,
) -> Result<(EvaluationResult, Metadata), VitalsError> {
    let problems = record.validate(
        &state.config.validation,
        source == RecordSource::Submitted,
    );
    if !problems.is_empty() {
        return Err(VitalsError::InvalidRecord(problems));
    }

    let prompt = build_prompt(record, &state.catalog);
    let output = state.invoker.invoke(&prompt, &state.options).await?;
    let categorized = categorize(&output.text)?;

    let elapsed = started.elapsed().as_secs_f64();
    let mut metadata = Metadata::new();
    metadata.insert("processing_time_seconds".to_string(), elapsed.into());
    metadata.insert("model".to_string(), output.model.clone().into());
    metadata.insert("provider".to_string(), state.invoker.name().into());
    if let Some(tokens) = output.prompt_tokens {
        metadata.insert("prompt_tokens".to_string(), tokens.into());
    }
    if let Some(tokens) = output.completion_tokens {
        metadata.insert("completion_tokens".to_string(), tokens.into());
    }

    Ok((
        categorized.into_result(elapsed, RecordDigest::from(record)),
        metadata,
    ))
}

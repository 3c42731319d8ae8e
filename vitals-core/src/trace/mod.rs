//! Session trace store: durable, append-only event logs per session.
//!
//! Two backends implement [`TraceStore`]:
//! - **file**: one JSON document per session under the storage directory
//! - **postgres**: one row per event, sessions locked row-wise on append
//!
//! Summaries, exports and statistics are derived from stored events on read.

mod file_store;
mod pg_store;

pub use file_store::FileTraceStore;
pub use pg_store::PgTraceStore;

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::TraceConfig;
use crate::models::event::{EventContent, EventType, TraceEvent};
use crate::models::session::{Session, SessionSummary};

const SESSION_ID_MAX_LEN: usize = 128;

// ============================================================================
// Error types
// ============================================================================

#[derive(Error, Debug)]
pub enum TraceError {
    #[error("Trace store unavailable: {0}")]
    Unavailable(String),

    #[error("Trace store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Trace serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Trace database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Session {session_id} has reached its limit of {limit} events")]
    CapacityExceeded { session_id: String, limit: usize },

    #[error("Invalid session id {0:?}: use 1-128 letters, digits, '-' or '_'")]
    InvalidSessionId(String),
}

impl TraceError {
    pub fn kind(&self) -> &'static str {
        match self {
            TraceError::Unavailable(_)
            | TraceError::Io(_)
            | TraceError::Serialization(_)
            | TraceError::Database(_) => "TraceStoreUnavailable",
            TraceError::SessionNotFound(_) => "SessionNotFound",
            TraceError::CapacityExceeded { .. } => "SessionCapacityExceeded",
            TraceError::InvalidSessionId(_) => "InvalidSessionId",
        }
    }
}

// ============================================================================
// Report types
// ============================================================================

/// Outcome of a retention pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanupReport {
    pub cutoff: DateTime<Utc>,
    pub dry_run: bool,
    /// Sessions deleted, or that would be deleted on a dry run
    pub removed: Vec<String>,
    pub kept: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceExport {
    pub export_timestamp: DateTime<Utc>,
    pub total_sessions: usize,
    pub sessions: Vec<Session>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TraceStats {
    pub total_sessions: usize,
    pub total_events: usize,
    pub total_requests: usize,
    pub total_responses: usize,
    pub total_errors: usize,
    pub unique_companies: usize,
    pub category_distribution: BTreeMap<String, usize>,
    pub oldest_session: Option<DateTime<Utc>>,
    pub newest_session: Option<DateTime<Utc>>,
    pub date_range_days: i64,
}

impl TraceStats {
    pub fn from_sessions(sessions: &[Session]) -> Self {
        let mut stats = TraceStats {
            total_sessions: sessions.len(),
            ..TraceStats::default()
        };
        let mut companies: HashSet<&str> = HashSet::new();

        for session in sessions {
            stats.total_events += session.events.len();
            stats.oldest_session = Some(match stats.oldest_session {
                Some(t) if t <= session.start_time => t,
                _ => session.start_time,
            });
            stats.newest_session = Some(match stats.newest_session {
                Some(t) if t >= session.start_time => t,
                _ => session.start_time,
            });

            for event in &session.events {
                match &event.content {
                    EventContent::UserRequest { company_name, .. } => {
                        stats.total_requests += 1;
                        if !company_name.is_empty() {
                            companies.insert(company_name.as_str());
                        }
                    }
                    EventContent::BotResponse { evaluation, .. } => {
                        stats.total_responses += 1;
                        *stats
                            .category_distribution
                            .entry(evaluation.category.as_str().to_string())
                            .or_insert(0) += 1;
                    }
                    EventContent::Error { .. } => stats.total_errors += 1,
                }
            }
        }

        stats.unique_companies = companies.len();
        if let (Some(oldest), Some(newest)) = (stats.oldest_session, stats.newest_session) {
            stats.date_range_days = (newest - oldest).num_days();
        }
        stats
    }
}

// ============================================================================
// TraceStore trait
// ============================================================================

/// Durable per-session event log.
///
/// Appends to one session are serialized; appends to different sessions do
/// not wait on each other. An append has reached storage when it returns.
#[async_trait]
pub trait TraceStore: Send + Sync {
    /// Append to `event.session_id`, creating the session on first use.
    async fn append(&self, event: &TraceEvent) -> Result<(), TraceError>;

    async fn get_session(&self, session_id: &str) -> Result<Session, TraceError>;

    /// Returns `false` when the session did not exist.
    async fn delete_session(&self, session_id: &str) -> Result<bool, TraceError>;

    /// Delete the session only if its `end_time` is still before `cutoff`,
    /// checked under the same lock appends take.
    async fn delete_if_older(
        &self,
        session_id: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<bool, TraceError>;

    /// Every stored session, in no particular order.
    async fn all_sessions(&self) -> Result<Vec<Session>, TraceError>;

    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Summaries, newest session first.
    async fn list_sessions(&self) -> Result<Vec<SessionSummary>, TraceError> {
        let mut summaries: Vec<SessionSummary> = self
            .all_sessions()
            .await?
            .iter()
            .map(Session::summary)
            .collect();
        summaries.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        Ok(summaries)
    }

    /// Remove sessions whose last event is strictly older than `max_age_days`.
    /// A dry run reports what would be removed and changes nothing.
    async fn cleanup(&self, max_age_days: u32, dry_run: bool) -> Result<CleanupReport, TraceError> {
        let cutoff = Utc::now() - Duration::days(i64::from(max_age_days));
        let mut removed = Vec::new();
        let mut kept = 0;

        for session in self.all_sessions().await? {
            if session.end_time >= cutoff {
                kept += 1;
            } else if dry_run || self.delete_if_older(&session.session_id, cutoff).await? {
                removed.push(session.session_id);
            } else {
                // appended to since the listing
                kept += 1;
            }
        }
        removed.sort();

        tracing::info!(
            backend = self.name(),
            cutoff = %cutoff,
            dry_run,
            removed = removed.len(),
            kept,
            "Trace cleanup complete"
        );

        Ok(CleanupReport {
            cutoff,
            dry_run,
            removed,
            kept,
        })
    }

    async fn export_all(&self) -> Result<TraceExport, TraceError> {
        let mut sessions = self.all_sessions().await?;
        sessions.sort_by(|a, b| a.start_time.cmp(&b.start_time));
        Ok(TraceExport {
            export_timestamp: Utc::now(),
            total_sessions: sessions.len(),
            sessions,
        })
    }

    async fn stats(&self) -> Result<TraceStats, TraceError> {
        Ok(TraceStats::from_sessions(&self.all_sessions().await?))
    }
}

/// Reject ids that could escape the storage directory or break keys.
pub fn validate_session_id(session_id: &str) -> Result<(), TraceError> {
    let ok = !session_id.is_empty()
        && session_id.len() <= SESSION_ID_MAX_LEN
        && session_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if ok {
        Ok(())
    } else {
        Err(TraceError::InvalidSessionId(session_id.to_string()))
    }
}

/// A request is only accepted with room left for its own completion and for
/// the completions of requests still in flight, so request/completion pairs
/// stay whole at the cap.
pub(crate) fn check_capacity(
    session_id: &str,
    current_len: usize,
    pending: usize,
    event_type: EventType,
    limit: usize,
) -> Result<(), TraceError> {
    let needed = match event_type {
        EventType::UserRequest => current_len + pending + 2,
        EventType::BotResponse | EventType::Error => current_len + 1,
    };
    if needed > limit {
        return Err(TraceError::CapacityExceeded {
            session_id: session_id.to_string(),
            limit,
        });
    }
    Ok(())
}

/// Open the configured backend.
pub async fn create_store(config: &TraceConfig) -> Result<Arc<dyn TraceStore>, TraceError> {
    match config.backend.as_str() {
        "file" => Ok(Arc::new(FileTraceStore::open(
            config.storage_path(),
            config.max_events_per_session,
        )?)),
        "postgres" => {
            let url = config.database_url.as_deref().ok_or_else(|| {
                TraceError::Unavailable("trace.database_url is required for postgres".to_string())
            })?;
            let pool = crate::db::create_pool(url, config.max_connections).await?;
            Ok(Arc::new(
                PgTraceStore::new(pool, config.max_events_per_session).await?,
            ))
        }
        other => Err(TraceError::Unavailable(format!(
            "unknown trace backend: {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::categories::HealthCategory;
    use crate::models::evaluation::{EvaluationResult, RecordDigest};
    use crate::models::event::Metadata;
    use crate::models::record::ClientRecord;

    #[test]
    fn test_session_id_charset() {
        assert!(validate_session_id("session_2024-01-01").is_ok());
        assert!(validate_session_id(&"a".repeat(128)).is_ok());
        assert!(validate_session_id("").is_err());
        assert!(validate_session_id(&"a".repeat(129)).is_err());
        assert!(validate_session_id("../etc/passwd").is_err());
        assert!(validate_session_id("has space").is_err());
    }

    #[test]
    fn test_capacity_keeps_pairs_whole() {
        assert!(check_capacity("s", 8, 0, EventType::UserRequest, 10).is_ok());
        assert!(check_capacity("s", 9, 0, EventType::UserRequest, 10).is_err());
        assert!(check_capacity("s", 9, 1, EventType::BotResponse, 10).is_ok());
        assert!(check_capacity("s", 9, 1, EventType::Error, 10).is_ok());
        match check_capacity("s", 10, 0, EventType::Error, 10) {
            Err(TraceError::CapacityExceeded { limit, .. }) => assert_eq!(limit, 10),
            other => panic!("Expected CapacityExceeded, got {:?}", other),
        }
    }

    #[test]
    fn test_capacity_reserves_slots_for_requests_in_flight() {
        // two requests already waiting: 2 events + 2 reserved completions
        assert!(check_capacity("s", 2, 2, EventType::UserRequest, 6).is_ok());
        assert!(check_capacity("s", 2, 2, EventType::UserRequest, 5).is_err());
        assert!(check_capacity("s", 3, 2, EventType::UserRequest, 6).is_err());
        assert!(check_capacity("s", 3, 1, EventType::BotResponse, 4).is_ok());
    }

    #[test]
    fn test_stats_from_sessions() {
        let request = |session: &str, name: &str| {
            TraceEvent::user_request(
                session,
                ClientRecord {
                    company_name: name.to_string(),
                    ..ClientRecord::default()
                },
            )
        };
        let response = |session: &str, category: HealthCategory| {
            TraceEvent::bot_response(
                session,
                EvaluationResult {
                    category,
                    confidence: 60,
                    reasoning: "r".to_string(),
                    budget_assessment: None,
                    performance_assessment: None,
                    client_satisfaction: None,
                    recommendations: vec![],
                    risk_factors: vec![],
                    positive_indicators: vec![],
                    processing_time_secs: 0.5,
                    record: RecordDigest::default(),
                },
                Metadata::new(),
            )
        };

        let mut a = Session::open(request("a", "Acme"));
        a.push(response("a", HealthCategory::Healthy));
        let mut b = Session::open(request("b", "Acme"));
        b.push(response("b", HealthCategory::Healthy));
        b.push(request("b", "Beta"));
        b.push(TraceEvent::error("b", "Beta", "ProviderTimeout", "slow".to_string(), Metadata::new()));

        let stats = TraceStats::from_sessions(&[a, b]);
        assert_eq!(stats.total_sessions, 2);
        assert_eq!(stats.total_events, 6);
        assert_eq!(stats.total_requests, 3);
        assert_eq!(stats.total_responses, 2);
        assert_eq!(stats.total_errors, 1);
        assert_eq!(stats.unique_companies, 2);
        assert_eq!(stats.category_distribution.get("healthy"), Some(&2));
        assert!(stats.oldest_session <= stats.newest_session);
    }

    #[test]
    fn test_empty_stats() {
        let stats = TraceStats::from_sessions(&[]);
        assert_eq!(stats.total_sessions, 0);
        assert_eq!(stats.oldest_session, None);
        assert_eq!(stats.date_range_days, 0);
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            TraceError::Unavailable("down".to_string()).kind(),
            "TraceStoreUnavailable"
        );
        assert_eq!(
            TraceError::CapacityExceeded {
                session_id: "s".to_string(),
                limit: 2
            }
            .kind(),
            "SessionCapacityExceeded"
        );
    }
}

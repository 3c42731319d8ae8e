use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::categories::HealthCategory;
use crate::models::event::{EventContent, EventType, TraceEvent};

/// Ordered event log sharing one session id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub events: Vec<TraceEvent>,
}

/// Figures derived from a session's events. Never stored on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub event_count: usize,
    pub total_requests: usize,
    pub total_responses: usize,
    pub total_errors: usize,
    /// Distinct, in first-seen order
    pub companies_analyzed: Vec<String>,
    pub categories_assigned: Vec<HealthCategory>,
    pub total_processing_time: f64,
    pub duration_minutes: f64,
}

impl Session {
    /// New session opened by its first event.
    pub fn open(first: TraceEvent) -> Self {
        Self {
            session_id: first.session_id.clone(),
            start_time: first.timestamp,
            end_time: first.timestamp,
            events: vec![first],
        }
    }

    /// Events are stamped when built, so a late append may carry an earlier
    /// timestamp; `end_time` never moves backwards.
    pub fn push(&mut self, event: TraceEvent) {
        self.end_time = self.end_time.max(event.timestamp);
        self.events.push(event);
    }

    /// Requests still waiting for their `bot_response` or `error`.
    pub fn pending_requests(&self) -> usize {
        let completions = self.count(EventType::BotResponse) + self.count(EventType::Error);
        self.count(EventType::UserRequest).saturating_sub(completions)
    }

    pub fn count(&self, event_type: EventType) -> usize {
        self.events
            .iter()
            .filter(|e| e.event_type() == event_type)
            .count()
    }

    pub fn summary(&self) -> SessionSummary {
        let mut companies_analyzed: Vec<String> = Vec::new();
        let mut categories_assigned = Vec::new();
        let mut total_processing_time = 0.0;

        for event in &self.events {
            match &event.content {
                EventContent::UserRequest { company_name, .. } => {
                    if !companies_analyzed.iter().any(|c| c == company_name) {
                        companies_analyzed.push(company_name.clone());
                    }
                }
                EventContent::BotResponse { evaluation, .. } => {
                    categories_assigned.push(evaluation.category);
                    total_processing_time += event.processing_time_secs().unwrap_or(0.0);
                }
                EventContent::Error { .. } => {}
            }
        }

        let duration_minutes = (self.end_time - self.start_time).num_milliseconds() as f64 / 60_000.0;

        SessionSummary {
            session_id: self.session_id.clone(),
            start_time: self.start_time,
            end_time: self.end_time,
            event_count: self.events.len(),
            total_requests: self.count(EventType::UserRequest),
            total_responses: self.count(EventType::BotResponse),
            total_errors: self.count(EventType::Error),
            companies_analyzed,
            categories_assigned,
            total_processing_time,
            duration_minutes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::evaluation::{EvaluationResult, RecordDigest};
    use crate::models::event::Metadata;
    use crate::models::record::ClientRecord;

    fn record(name: &str) -> ClientRecord {
        ClientRecord {
            company_name: name.to_string(),
            ..ClientRecord::default()
        }
    }

    fn evaluation(name: &str, category: HealthCategory) -> EvaluationResult {
        EvaluationResult {
            category,
            confidence: 80,
            reasoning: "fine".to_string(),
            budget_assessment: None,
            performance_assessment: None,
            client_satisfaction: None,
            recommendations: vec![],
            risk_factors: vec![],
            positive_indicators: vec![],
            processing_time_secs: 1.5,
            record: RecordDigest {
                company_name: name.to_string(),
                ..RecordDigest::default()
            },
        }
    }

    #[test]
    fn test_summary_is_derived_from_events() {
        let mut session = Session::open(TraceEvent::user_request("s", record("Acme")));

        let mut metadata = Metadata::new();
        metadata.insert("processing_time_seconds".to_string(), serde_json::json!(1.5));
        session.push(TraceEvent::bot_response(
            "s",
            evaluation("Acme", HealthCategory::Healthy),
            metadata,
        ));
        session.push(TraceEvent::user_request("s", record("Beta")));
        session.push(TraceEvent::error(
            "s",
            "Beta",
            "ProviderTimeout",
            "slow".to_string(),
            Metadata::new(),
        ));
        session.push(TraceEvent::user_request("s", record("Acme")));

        let summary = session.summary();
        assert_eq!(summary.event_count, 5);
        assert_eq!(summary.total_requests, 3);
        assert_eq!(summary.total_responses, 1);
        assert_eq!(summary.total_errors, 1);
        assert_eq!(summary.companies_analyzed, vec!["Acme", "Beta"]);
        assert_eq!(summary.categories_assigned, vec![HealthCategory::Healthy]);
        assert_eq!(summary.total_processing_time, 1.5);
        assert!(summary.duration_minutes >= 0.0);
    }

    #[test]
    fn test_push_advances_end_time() {
        let first = TraceEvent::user_request("s", record("Acme"));
        let start = first.timestamp;
        let mut session = Session::open(first);
        assert_eq!(session.end_time, start);

        let second = TraceEvent::user_request("s", record("Acme"));
        let second_ts = second.timestamp;
        session.push(second);
        assert_eq!(session.start_time, start);
        assert_eq!(session.end_time, second_ts);
    }

    #[test]
    fn test_late_append_keeps_end_time() {
        let early = TraceEvent::user_request("s", record("Acme"));
        let mut late = TraceEvent::user_request("s", record("Beta"));
        late.timestamp = early.timestamp + chrono::Duration::milliseconds(5);
        let late_ts = late.timestamp;

        let mut session = Session::open(late);
        session.push(early);
        assert_eq!(session.end_time, late_ts);
        assert!(session.end_time >= session.start_time);
        assert_eq!(session.events.len(), 2);
    }

    #[test]
    fn test_pending_requests() {
        let mut session = Session::open(TraceEvent::user_request("s", record("Acme")));
        session.push(TraceEvent::user_request("s", record("Beta")));
        assert_eq!(session.pending_requests(), 2);

        session.push(TraceEvent::error(
            "s",
            "Beta",
            "ProviderTimeout",
            "slow".to_string(),
            Metadata::new(),
        ));
        assert_eq!(session.pending_requests(), 1);
        session.push(TraceEvent::bot_response(
            "s",
            evaluation("Acme", HealthCategory::Healthy),
            Metadata::new(),
        ));
        assert_eq!(session.pending_requests(), 0);
    }
}

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::evaluation::EvaluationResult;
use crate::models::record::ClientRecord;

/// Free-form event metadata (processing time, model name, token counts).
pub type Metadata = BTreeMap<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    UserRequest,
    BotResponse,
    Error,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::UserRequest => "user_request",
            EventType::BotResponse => "bot_response",
            EventType::Error => "error",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type-tagged event payload. The tag doubles as the event type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum EventContent {
    UserRequest {
        company_name: String,
        record: ClientRecord,
    },
    BotResponse {
        company_name: String,
        evaluation: EvaluationResult,
    },
    Error {
        company_name: String,
        error_kind: String,
        message: String,
    },
}

impl EventContent {
    pub fn event_type(&self) -> EventType {
        match self {
            EventContent::UserRequest { .. } => EventType::UserRequest,
            EventContent::BotResponse { .. } => EventType::BotResponse,
            EventContent::Error { .. } => EventType::Error,
        }
    }

    pub fn company_name(&self) -> &str {
        match self {
            EventContent::UserRequest { company_name, .. }
            | EventContent::BotResponse { company_name, .. }
            | EventContent::Error { company_name, .. } => company_name,
        }
    }
}

/// One immutable occurrence within a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEvent {
    pub event_id: Uuid,
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub content: EventContent,
    #[serde(default)]
    pub metadata: Metadata,
}

impl TraceEvent {
    pub fn new(session_id: &str, content: EventContent, metadata: Metadata) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            session_id: session_id.to_string(),
            // microseconds: the finest precision every backend stores
            timestamp: Utc::now().trunc_subsecs(6),
            content,
            metadata,
        }
    }

    pub fn user_request(session_id: &str, record: ClientRecord) -> Self {
        Self::new(
            session_id,
            EventContent::UserRequest {
                company_name: record.company_name.clone(),
                record,
            },
            Metadata::new(),
        )
    }

    pub fn bot_response(session_id: &str, evaluation: EvaluationResult, metadata: Metadata) -> Self {
        Self::new(
            session_id,
            EventContent::BotResponse {
                company_name: evaluation.record.company_name.clone(),
                evaluation,
            },
            metadata,
        )
    }

    pub fn error(
        session_id: &str,
        company_name: &str,
        error_kind: &str,
        message: String,
        metadata: Metadata,
    ) -> Self {
        Self::new(
            session_id,
            EventContent::Error {
                company_name: company_name.to_string(),
                error_kind: error_kind.to_string(),
                message,
            },
            metadata,
        )
    }

    pub fn event_type(&self) -> EventType {
        self.content.event_type()
    }

    pub fn processing_time_secs(&self) -> Option<f64> {
        self.metadata
            .get("processing_time_seconds")
            .and_then(|v| v.as_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_is_tagged_by_event_type() {
        let event = TraceEvent::error(
            "s-1",
            "Acme",
            "ProviderTimeout",
            "timed out".to_string(),
            Metadata::new(),
        );

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["content"]["event_type"], "error");
        assert_eq!(json["content"]["error_kind"], "ProviderTimeout");
        assert_eq!(json["session_id"], "s-1");
        assert_eq!(event.event_type(), EventType::Error);
    }

    #[test]
    fn test_user_request_round_trip() {
        let record = ClientRecord {
            company_name: "Acme".to_string(),
            monthly_budget: Some(1234.56),
            campaign_objectives: "grow leads".to_string(),
            ..ClientRecord::default()
        };
        let event = TraceEvent::user_request("s-2", record);

        let text = serde_json::to_string(&event).unwrap();
        let back: TraceEvent = serde_json::from_str(&text).unwrap();
        assert_eq!(back, event);
        assert_eq!(back.content.company_name(), "Acme");
    }

    #[test]
    fn test_timestamp_has_microsecond_precision() {
        let event = TraceEvent::user_request("s-3", ClientRecord::default());
        assert_eq!(event.timestamp.timestamp_subsec_nanos() % 1_000, 0);
    }
}

use serde::{Deserialize, Serialize};

use crate::error::VitalsError;
use crate::models::record::ClientRecord;

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum VitalsRequest {
    Ping,
    Health,
    Categories,
    Analyze {
        record: ClientRecord,
        session_id: Option<String>,
    },
    AnalyzeBatch {
        records: Vec<ClientRecord>,
        session_id: Option<String>,
    },
    AnalyzeText {
        text: String,
        session_id: Option<String>,
    },
    Extract {
        text: String,
    },
    ListSessions,
    GetSession {
        session_id: String,
    },
    DeleteSession {
        session_id: String,
    },
    Cleanup {
        max_age_days: Option<u32>,
        #[serde(default)]
        dry_run: bool,
    },
    Export,
    Stats,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct VitalsResponse {
    pub status: String,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub error_kind: Option<String>,
    pub version: String,
}

impl VitalsResponse {
    pub fn ok(data: serde_json::Value) -> Self {
        Self {
            status: "ok".to_string(),
            data: Some(data),
            error: None,
            error_kind: None,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn err(kind: &str, msg: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            data: None,
            error: Some(msg.into()),
            error_kind: Some(kind.to_string()),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn pong() -> Self {
        Self::ok(serde_json::json!({"pong": true}))
    }
}

impl From<&VitalsError> for VitalsResponse {
    fn from(e: &VitalsError) -> Self {
        Self::err(e.kind(), e.to_string())
    }
}

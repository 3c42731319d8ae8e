use serde::{Deserialize, Serialize};

use crate::categories::HealthCategory;
use crate::models::record::ClientRecord;

/// Display fields of the evaluated record, carried alongside the result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordDigest {
    pub company_name: String,
    pub budget_tier: String,
    pub customer_success: String,
    pub spend_deviation_short: String,
    pub spend_deviation_long: String,
    pub notes: String,
}

impl From<&ClientRecord> for RecordDigest {
    fn from(record: &ClientRecord) -> Self {
        Self {
            company_name: record.company_name.clone(),
            budget_tier: record.budget_tier.clone(),
            customer_success: record.customer_success.clone(),
            spend_deviation_short: record.spend_deviation_short.clone(),
            spend_deviation_long: record.spend_deviation_long.clone(),
            notes: record.notes.clone(),
        }
    }
}

/// Health assessment of one campaign.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub category: HealthCategory,
    /// Always within 0..=100
    pub confidence: u8,
    /// Never empty
    pub reasoning: String,
    #[serde(default)]
    pub budget_assessment: Option<String>,
    #[serde(default)]
    pub performance_assessment: Option<String>,
    #[serde(default)]
    pub client_satisfaction: Option<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub risk_factors: Vec<String>,
    #[serde(default)]
    pub positive_indicators: Vec<String>,
    pub processing_time_secs: f64,
    pub record: RecordDigest,
}

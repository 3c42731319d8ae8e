use serde::{Deserialize, Serialize};

use crate::config::ValidationConfig;

/// Campaign duration assumed for submitted records that do not state one.
pub const DEFAULT_CAMPAIGN_DURATION_MONTHS: u32 = 6;

/// Company name given to records synthesized from unstructured text.
pub const SYNTHETIC_COMPANY_NAME: &str = "Unidentified Client";

const REDACTED: &str = "[redacted]";

/// One advertising campaign to be evaluated.
///
/// Text fields use the empty string for "not provided".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientRecord {
    pub company_name: String,
    pub account_manager: String,
    pub customer_success: String,
    pub budget_tier: String,
    pub monthly_budget: Option<f64>,
    pub spend_deviation_short: String,
    pub spend_deviation_long: String,
    pub campaign_duration_months: Option<u32>,
    pub campaign_objectives: String,
    pub current_performance_metrics: String,
    pub budget_utilization: String,
    pub client_reported_notes: String,
    pub notes: String,
    pub recent_changes_or_concerns: String,
}

impl ClientRecord {
    /// Fallback record holding raw text as notes.
    pub fn synthetic(raw_text: &str) -> Self {
        Self {
            company_name: SYNTHETIC_COMPANY_NAME.to_string(),
            notes: raw_text.trim().to_string(),
            ..Self::default()
        }
    }

    pub fn duration_months(&self) -> u32 {
        self.campaign_duration_months
            .unwrap_or(DEFAULT_CAMPAIGN_DURATION_MONTHS)
    }

    /// Fill in the default duration. Only for submitted records; extracted
    /// ones keep `None` so the prompt never states a duration nobody gave.
    pub fn with_default_duration(mut self) -> Self {
        self.campaign_duration_months = Some(self.duration_months());
        self
    }

    pub fn is_synthetic(&self) -> bool {
        self.company_name == SYNTHETIC_COMPANY_NAME
    }

    /// Company name present and at least one substantive narrative field.
    pub fn is_valid_for_extraction(&self) -> bool {
        !self.company_name.trim().is_empty()
            && [
                &self.campaign_objectives,
                &self.current_performance_metrics,
                &self.budget_utilization,
                &self.client_reported_notes,
            ]
            .iter()
            .any(|f| !f.trim().is_empty())
    }

    /// Narrative fields as (display label, value) in rendering order.
    pub fn narrative_fields(&self) -> [(&'static str, &str); 6] {
        [
            ("Campaign Objectives", &self.campaign_objectives),
            ("Current Performance Metrics", &self.current_performance_metrics),
            ("Budget Utilization", &self.budget_utilization),
            ("Client Reported Notes", &self.client_reported_notes),
            ("General Notes", &self.notes),
            ("Recent Changes/Concerns", &self.recent_changes_or_concerns),
        ]
    }

    /// Check a record submitted through the API against the configured rules.
    ///
    /// Returns every violation; an empty vector means the record is acceptable.
    /// `require_narratives` enforces the minimum count of non-empty narrative
    /// fields, which extracted records already satisfy by construction.
    pub fn validate(&self, rules: &ValidationConfig, require_narratives: bool) -> Vec<String> {
        let mut errors = Vec::new();

        let name_len = self.company_name.trim().chars().count();
        if name_len == 0 {
            errors.push("Company name is required".to_string());
        } else if name_len > rules.company_name_max_length {
            errors.push(format!(
                "Company name must be at most {} characters",
                rules.company_name_max_length
            ));
        }

        if let Some(budget) = self.monthly_budget {
            if !budget.is_finite() || budget < 0.0 || budget > rules.monthly_budget_max {
                errors.push(format!(
                    "Monthly budget must be between $0 and ${}",
                    group_thousands(rules.monthly_budget_max as u64)
                ));
            }
        }

        if let Some(months) = self.campaign_duration_months {
            if months < rules.duration_min_months || months > rules.duration_max_months {
                errors.push(format!(
                    "Campaign duration must be between {} and {} months",
                    rules.duration_min_months, rules.duration_max_months
                ));
            }
        }

        let narratives = self.narrative_fields();
        for (label, value) in narratives.iter() {
            if value.chars().count() > rules.text_field_max_length {
                errors.push(format!(
                    "{} must be at most {} characters",
                    label, rules.text_field_max_length
                ));
            }
        }

        if require_narratives {
            let filled = narratives
                .iter()
                .filter(|(_, v)| !v.trim().is_empty())
                .count();
            if filled < rules.min_text_fields {
                errors.push(format!(
                    "Provide at least {} of: objectives, performance metrics, budget utilization, client notes, notes, concerns",
                    rules.min_text_fields
                ));
            }
        }

        errors
    }

    /// Copy with contact names and client-voice free text masked, for traces
    /// that must not retain sensitive data.
    pub fn redacted(&self) -> Self {
        fn mask(value: &str) -> String {
            if value.trim().is_empty() {
                String::new()
            } else {
                REDACTED.to_string()
            }
        }

        Self {
            account_manager: mask(&self.account_manager),
            customer_success: mask(&self.customer_success),
            client_reported_notes: mask(&self.client_reported_notes),
            notes: mask(&self.notes),
            recent_changes_or_concerns: mask(&self.recent_changes_or_concerns),
            ..self.clone()
        }
    }
}

/// Format an integer with comma thousands separators.
pub fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Format a dollar amount as `$1,234.50`.
pub fn format_currency(amount: f64) -> String {
    let cents = (amount * 100.0).round() as u64;
    format!("${}.{:02}", group_thousands(cents / 100), cents % 100)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled_record() -> ClientRecord {
        ClientRecord {
            company_name: "TechCorp Solutions".to_string(),
            account_manager: "Sarah Johnson".to_string(),
            monthly_budget: Some(50_000.0),
            campaign_duration_months: Some(6),
            campaign_objectives: "Brand awareness and lead generation".to_string(),
            current_performance_metrics: "CTR: 2.3%, CPA: $45, ROAS: 3.2x".to_string(),
            client_reported_notes: "Happy with performance".to_string(),
            ..ClientRecord::default()
        }
    }

    #[test]
    fn test_validity_requires_company_and_narrative() {
        let mut record = ClientRecord {
            company_name: "Acme".to_string(),
            ..ClientRecord::default()
        };
        assert!(!record.is_valid_for_extraction());

        record.budget_utilization = "85% spend".to_string();
        assert!(record.is_valid_for_extraction());

        record.company_name = "   ".to_string();
        assert!(!record.is_valid_for_extraction());
    }

    #[test]
    fn test_general_notes_do_not_make_record_valid() {
        let record = ClientRecord {
            company_name: "Acme".to_string(),
            notes: "call next week".to_string(),
            ..ClientRecord::default()
        };
        assert!(!record.is_valid_for_extraction());
    }

    #[test]
    fn test_synthetic_record() {
        let record = ClientRecord::synthetic("  just some pasted text \n");
        assert_eq!(record.company_name, SYNTHETIC_COMPANY_NAME);
        assert_eq!(record.notes, "just some pasted text");
        assert!(record.is_synthetic());
        assert_eq!(record.campaign_duration_months, None);
        assert_eq!(
            record.with_default_duration().campaign_duration_months,
            Some(DEFAULT_CAMPAIGN_DURATION_MONTHS)
        );
    }

    #[test]
    fn test_validate_accepts_complete_record() {
        let errors = filled_record().validate(&ValidationConfig::default(), true);
        assert!(errors.is_empty(), "unexpected errors: {:?}", errors);
    }

    #[test]
    fn test_validate_reports_every_violation() {
        let record = ClientRecord {
            company_name: String::new(),
            monthly_budget: Some(20_000_000.0),
            campaign_duration_months: Some(0),
            campaign_objectives: "x".repeat(3001),
            ..ClientRecord::default()
        };

        let errors = record.validate(&ValidationConfig::default(), true);
        assert_eq!(errors.len(), 5, "got: {:?}", errors);
        assert!(errors[0].contains("Company name"));
        assert!(errors[1].contains("$10,000,000"));
        assert!(errors[2].contains("between 1 and 60"));
        assert!(errors[3].starts_with("Campaign Objectives"));
        assert!(errors[4].contains("at least 2"));
    }

    #[test]
    fn test_validate_without_narrative_requirement() {
        let record = ClientRecord {
            company_name: "Acme".to_string(),
            campaign_objectives: "grow leads".to_string(),
            ..ClientRecord::default()
        };
        assert!(record.validate(&ValidationConfig::default(), false).is_empty());
        assert_eq!(record.validate(&ValidationConfig::default(), true).len(), 1);
    }

    #[test]
    fn test_redacted_masks_only_sensitive_fields() {
        let record = filled_record().redacted();
        assert_eq!(record.company_name, "TechCorp Solutions");
        assert_eq!(record.account_manager, "[redacted]");
        assert_eq!(record.client_reported_notes, "[redacted]");
        assert_eq!(record.customer_success, "");
        assert_eq!(record.current_performance_metrics, "CTR: 2.3%, CPA: $45, ROAS: 3.2x");
        assert_eq!(record.monthly_budget, Some(50_000.0));
    }

    #[test]
    fn test_format_currency() {
        assert_eq!(format_currency(50_000.0), "$50,000.00");
        assert_eq!(format_currency(1_234_567.5), "$1,234,567.50");
        assert_eq!(format_currency(0.0), "$0.00");
        assert_eq!(group_thousands(999), "999");
        assert_eq!(group_thousands(1000), "1,000");
    }

    #[test]
    fn test_deserialize_partial_record_uses_defaults() {
        let record: ClientRecord =
            serde_json::from_str(r#"{"company_name": "Acme", "monthly_budget": 1200}"#).unwrap();
        assert_eq!(record.company_name, "Acme");
        assert_eq!(record.monthly_budget, Some(1200.0));
        assert!(record.campaign_objectives.is_empty());
        assert_eq!(record.campaign_duration_months, None);
    }
}

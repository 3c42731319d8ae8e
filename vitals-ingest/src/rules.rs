//! Label rules for free-text client records.
//!
//! [`FIELD_RULES`] is evaluated top to bottom and the first rule with a
//! variant equal to the whole normalised label claims the line. A label that
//! matches nothing as written is retried without a trailing parenthetical,
//! so "Monthly Budget (USD)" is a budget but "Spend vs budget" is not a label.

use vitals_core::models::record::ClientRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    CompanyName,
    AccountManager,
    CustomerSuccess,
    BudgetTier,
    MonthlyBudget,
    SpendDeviationShort,
    SpendDeviationLong,
    CampaignDuration,
    CampaignObjectives,
    PerformanceMetrics,
    BudgetUtilization,
    ClientNotes,
    Notes,
    Concerns,
}

impl Field {
    /// Narrative fields keep capturing continuation lines until the next label.
    pub fn is_multiline(self) -> bool {
        matches!(
            self,
            Field::CampaignObjectives
                | Field::PerformanceMetrics
                | Field::BudgetUtilization
                | Field::ClientNotes
                | Field::Notes
                | Field::Concerns
        )
    }

    /// Store a captured value. Numeric values that do not parse are dropped.
    pub fn apply(self, record: &mut ClientRecord, value: &str, max_chars: usize) {
        let value = value.trim();
        if value.is_empty() {
            return;
        }
        let text = || truncate_chars(value, max_chars);

        match self {
            Field::CompanyName => record.company_name = truncate_chars(value, COMPANY_MAX_CHARS),
            Field::AccountManager => record.account_manager = text(),
            Field::CustomerSuccess => record.customer_success = text(),
            Field::BudgetTier => record.budget_tier = text(),
            Field::MonthlyBudget => record.monthly_budget = parse_amount(value),
            Field::SpendDeviationShort => record.spend_deviation_short = text(),
            Field::SpendDeviationLong => record.spend_deviation_long = text(),
            Field::CampaignDuration => record.campaign_duration_months = parse_months(value),
            Field::CampaignObjectives => record.campaign_objectives = text(),
            Field::PerformanceMetrics => record.current_performance_metrics = text(),
            Field::BudgetUtilization => record.budget_utilization = text(),
            Field::ClientNotes => record.client_reported_notes = text(),
            Field::Notes => record.notes = text(),
            Field::Concerns => record.recent_changes_or_concerns = text(),
        }
    }
}

pub const COMPANY_MAX_CHARS: usize = 100;

/// Ordered `(field, label variants)` table. Variants are lowercase words
/// separated by single spaces and match as whole-word phrases.
pub const FIELD_RULES: &[(Field, &[&str])] = &[
    (Field::AccountManager, &["account manager", "account lead"]),
    (
        Field::CustomerSuccess,
        &["customer success", "csm", "success manager"],
    ),
    (
        Field::ClientNotes,
        &[
            "client reported notes",
            "client reported",
            "client notes",
            "client feedback",
            "feedback",
        ],
    ),
    (
        Field::BudgetUtilization,
        &["budget utilization", "utilization", "budget pacing", "pacing"],
    ),
    (Field::BudgetTier, &["budget tier", "tier"]),
    (
        Field::SpendDeviationShort,
        &[
            "spend deviation short term",
            "spend deviation short",
            "short term deviation",
            "short term spend deviation",
            "deviation short term",
            "deviation short",
            "short term",
        ],
    ),
    (
        Field::SpendDeviationLong,
        &[
            "spend deviation long term",
            "spend deviation long",
            "long term deviation",
            "long term spend deviation",
            "deviation long term",
            "deviation long",
            "long term",
        ],
    ),
    (
        Field::MonthlyBudget,
        &["monthly budget", "monthly spend", "budget"],
    ),
    (
        Field::CampaignDuration,
        &["campaign duration", "duration", "campaign length"],
    ),
    (
        Field::CampaignObjectives,
        &["campaign objectives", "objectives", "objective", "goals", "goal"],
    ),
    (
        Field::PerformanceMetrics,
        &[
            "current performance metrics",
            "performance metrics",
            "performance",
            "metrics",
            "kpis",
        ],
    ),
    (
        Field::Concerns,
        &[
            "recent changes or concerns",
            "recent changes concerns",
            "recent changes",
            "concerns",
            "concern",
            "risks",
        ],
    ),
    (
        Field::Notes,
        &["general notes", "internal notes", "notes", "note"],
    ),
    (
        Field::CompanyName,
        &[
            "company name",
            "company",
            "client name",
            "client",
            "advertiser",
            "account name",
            "brand",
        ],
    ),
];

/// Lowercase, punctuation to spaces, whitespace collapsed.
pub fn normalize_label(label: &str) -> String {
    label
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// First rule, in table order, with a variant equal to the label.
pub fn match_label(label: &str) -> Option<Field> {
    match_normalized(&normalize_label(label)).or_else(|| {
        let trimmed = label.trim_end();
        let open = trimmed.strip_suffix(')')?.rfind('(')?;
        match_normalized(&normalize_label(&trimmed[..open]))
    })
}

fn match_normalized(label: &str) -> Option<Field> {
    if label.is_empty() {
        return None;
    }
    FIELD_RULES
        .iter()
        .find_map(|(field, variants)| variants.contains(&label).then_some(*field))
}

/// Leading number after removing currency symbols, separators and spaces.
pub fn parse_number(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(c, '$' | '€' | '£' | '¥' | ',') && !c.is_whitespace())
        .collect();

    let mut end = 0;
    let mut seen_dot = false;
    for (i, c) in cleaned.char_indices() {
        match c {
            '0'..='9' => end = i + 1,
            '.' if !seen_dot => seen_dot = true,
            '-' if i == 0 => {}
            _ => break,
        }
    }
    if end == 0 {
        return None;
    }
    cleaned[..end].parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Monthly budget: any non-negative amount.
pub fn parse_amount(raw: &str) -> Option<f64> {
    parse_number(raw).filter(|n| *n >= 0.0)
}

/// Campaign duration: a whole number of months, at least one.
pub fn parse_months(raw: &str) -> Option<u32> {
    parse_number(raw)
        .filter(|n| n.fract() == 0.0 && *n >= 1.0 && *n <= f64::from(u32::MAX))
        .map(|n| n as u32)
}

pub fn truncate_chars(value: &str, max_chars: usize) -> String {
    value.chars().take(max_chars).collect()
}

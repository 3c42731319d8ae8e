//! Evaluation request builder.
//!
//! Renders a [`ClientRecord`] into a fixed instruction block plus a record
//! block. Output is a pure function of the record and the category catalog,
//! so identical input always yields a byte-identical prompt.

use std::fmt::Write;

use serde::Serialize;

use crate::categories::{CategoryCatalog, HealthCategory};
use crate::models::record::{format_currency, ClientRecord};

/// Prompt handed to a model invoker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromptSpec {
    pub system: String,
    pub user: String,
    /// Machine-checkable description of the expected output object
    pub schema: serde_json::Value,
}

const ROLE: &str = "You are an expert AdTech campaign analyst. You evaluate advertising campaign \
health from performance data, budget utilization, and client feedback, and you answer with \
structured, professional assessments.";

const FACTORS: &[&str] = &[
    "Budget efficiency and utilization",
    "Performance metrics (CTR, CPA, ROAS, etc.)",
    "Client satisfaction and feedback",
    "Campaign objectives alignment",
    "Market conditions and competitive factors",
    "Account management relationship",
];

pub fn output_schema() -> serde_json::Value {
    let keys: Vec<&str> = HealthCategory::ALL.iter().map(|c| c.as_str()).collect();
    serde_json::json!({
        "type": "object",
        "required": ["category", "confidence", "reasoning"],
        "properties": {
            "category": { "type": "string", "enum": keys },
            "confidence": { "type": "integer", "minimum": 0, "maximum": 100 },
            "reasoning": { "type": "string", "minLength": 1 },
            "recommendations": { "type": "array", "items": { "type": "string" } },
            "risk_factors": { "type": "array", "items": { "type": "string" } },
            "positive_indicators": { "type": "array", "items": { "type": "string" } },
            "budget_assessment": { "type": "string" },
            "performance_assessment": { "type": "string" },
            "client_satisfaction": { "type": "string" }
        }
    })
}

fn system_instruction(catalog: &CategoryCatalog) -> String {
    let mut out = String::new();
    out.push_str(ROLE);
    out.push_str("\n\nCategorize the campaign into exactly one of these four categories:\n\n");
    for (i, entry) in catalog.entries().iter().enumerate() {
        let _ = writeln!(out, "{}. \"{}\" - {}", i + 1, entry.key, entry.description);
    }

    out.push_str("\nConsider these key factors in your analysis:\n");
    for factor in FACTORS {
        let _ = writeln!(out, "- {}", factor);
    }

    out.push_str(
        "\nRespond with a single JSON object and nothing else, using these fields:\n\
{\n\
    \"category\": \"one of: healthy, might_need_attention, need_attention_positive, need_attention_negative\",\n\
    \"confidence\": integer from 0 to 100,\n\
    \"reasoning\": \"detailed explanation of your campaign assessment (required, non-empty)\",\n\
    \"recommendations\": [\"specific, actionable recommendations\"],\n\
    \"risk_factors\": [\"identified risk factors\"],\n\
    \"positive_indicators\": [\"strengths and opportunities\"],\n\
    \"budget_assessment\": \"analysis of budget efficiency and utilization\",\n\
    \"performance_assessment\": \"evaluation of key performance metrics\",\n\
    \"client_satisfaction\": \"assessment of client relationship and satisfaction\"\n\
}\n\n\
Base your assessment only on the information provided. Do not assume values for fields that are not listed.",
    );
    out
}

fn record_block(record: &ClientRecord) -> String {
    let mut out = String::from("Campaign Information:\n");

    let mut line = |label: &str, value: &str| {
        let value = value.trim();
        if !value.is_empty() {
            let _ = writeln!(out, "- {}: {}", label, value);
        }
    };

    line("Company Name", &record.company_name);
    line("Account Manager", &record.account_manager);
    line("Customer Success Manager", &record.customer_success);
    line("Budget Tier", &record.budget_tier);
    if let Some(budget) = record.monthly_budget {
        line("Monthly Budget", &format_currency(budget));
    }
    if let Some(months) = record.campaign_duration_months {
        line("Campaign Duration", &format!("{} months", months));
    }
    line("Short-Term Spend Deviation", &record.spend_deviation_short);
    line("Long-Term Spend Deviation", &record.spend_deviation_long);
    for (label, value) in record.narrative_fields() {
        line(label, value);
    }

    out.push_str("\nEvaluate this advertising campaign and respond with the JSON object described above.");
    out
}

/// Build the prompt for one record.
pub fn build_prompt(record: &ClientRecord, catalog: &CategoryCatalog) -> PromptSpec {
    PromptSpec {
        system: system_instruction(catalog),
        user: record_block(record),
        schema: output_schema(),
    }
}

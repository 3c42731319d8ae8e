//! Maps raw model output onto a [`HealthCategory`] and a typed assessment.
//!
//! Structured output is preferred: the outermost `{...}` block is parsed as
//! JSON, then a `Category:` line is tried. When neither names a known category
//! the whole text is searched for category keywords in priority order.

use std::str::FromStr;

use regex::Regex;
use serde_json::Value;

use crate::categories::HealthCategory;
use crate::error::VitalsError;
use crate::models::evaluation::{EvaluationResult, RecordDigest};

pub const DEFAULT_CONFIDENCE: u8 = 50;
pub const MISSING_REASONING: &str = "The model did not provide reasoning for this assessment.";

/// Model assessment before timing and record details are attached.
#[derive(Debug, Clone, PartialEq)]
pub struct Categorized {
    pub category: HealthCategory,
    pub confidence: u8,
    pub reasoning: String,
    pub budget_assessment: Option<String>,
    pub performance_assessment: Option<String>,
    pub client_satisfaction: Option<String>,
    pub recommendations: Vec<String>,
    pub risk_factors: Vec<String>,
    pub positive_indicators: Vec<String>,
}

impl Categorized {
    pub fn into_result(self, processing_time_secs: f64, record: RecordDigest) -> EvaluationResult {
        EvaluationResult {
            category: self.category,
            confidence: self.confidence,
            reasoning: self.reasoning,
            budget_assessment: self.budget_assessment,
            performance_assessment: self.performance_assessment,
            client_satisfaction: self.client_satisfaction,
            recommendations: self.recommendations,
            risk_factors: self.risk_factors,
            positive_indicators: self.positive_indicators,
            processing_time_secs,
            record,
        }
    }
}

/// Interpret raw model output.
pub fn categorize(raw_text: &str) -> Result<Categorized, VitalsError> {
    let json = json_block(raw_text);
    let field = |name: &'static str| json.as_ref().and_then(|v| v.get(name));

    let category = field("category")
        .and_then(Value::as_str)
        .and_then(|s| HealthCategory::from_str(s).ok())
        .or_else(|| {
            labeled_line(raw_text, "category")
                .and_then(|s| HealthCategory::from_str(s.trim_end_matches('.')).ok())
        })
        .or_else(|| keyword_category(raw_text))
        .ok_or_else(|| {
            let preview: String = raw_text.trim().chars().take(120).collect();
            VitalsError::MalformedResponse(if preview.is_empty() {
                "empty response".to_string()
            } else {
                format!("no health category in: {}", preview)
            })
        })?;

    let confidence = field("confidence")
        .and_then(confidence_value)
        .or_else(|| labeled_line(raw_text, "confidence").and_then(|s| parse_confidence(&s)))
        .unwrap_or(DEFAULT_CONFIDENCE);

    let reasoning = field("reasoning")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .or_else(|| labeled_line(raw_text, "reasoning"))
        .or_else(|| {
            let whole = raw_text.trim();
            (json.is_none() && !whole.is_empty()).then(|| whole.to_string())
        })
        .unwrap_or_else(|| MISSING_REASONING.to_string());

    Ok(Categorized {
        category,
        confidence,
        reasoning,
        budget_assessment: field("budget_assessment").and_then(text_value),
        performance_assessment: field("performance_assessment").and_then(text_value),
        client_satisfaction: field("client_satisfaction").and_then(text_value),
        recommendations: field("recommendations").map(list_value).unwrap_or_default(),
        risk_factors: field("risk_factors").map(list_value).unwrap_or_default(),
        positive_indicators: field("positive_indicators")
            .map(list_value)
            .unwrap_or_default(),
    })
}

/// Outermost `{...}` block, if it parses as a JSON object.
fn json_block(text: &str) -> Option<Value> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<Value>(&text[start..=end])
        .ok()
        .filter(Value::is_object)
}

/// Value of the first `<label>: value` line, case-insensitive, tolerating
/// bullets and markdown emphasis around the label.
fn labeled_line(text: &str, label: &str) -> Option<String> {
    let pattern = format!(
        r#"(?im)^[\s>*-]*\**"?{}"?\**\s*[:=]\s*(.+?)\s*$"#,
        regex::escape(label)
    );
    let re = Regex::new(&pattern).ok()?;
    re.captures(text)
        .and_then(|c| c.get(1))
        .map(|m| {
            m.as_str()
                .trim_matches(|c: char| c == '*' || c == '"' || c == ',')
                .trim()
                .to_string()
        })
        .filter(|s| !s.is_empty())
}

/// First category, in priority order, mentioned anywhere in the text.
fn keyword_category(text: &str) -> Option<HealthCategory> {
    HealthCategory::ALL.into_iter().find(|category| {
        let tokens: Vec<String> = category
            .as_str()
            .split('_')
            .map(regex::escape)
            .collect();
        let pattern = format!(r"(?i)\b{}\b", tokens.join(r"[\s_-]+"));
        Regex::new(&pattern)
            .map(|re| re.is_match(text))
            .unwrap_or(false)
    })
}

fn confidence_value(value: &Value) -> Option<u8> {
    match value {
        Value::Number(n) => n.as_f64().map(clamp_confidence),
        Value::String(s) => parse_confidence(s),
        _ => None,
    }
}

fn parse_confidence(raw: &str) -> Option<u8> {
    let cleaned = raw.trim().trim_end_matches('%').trim();
    let number: String = cleaned
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    number.parse::<f64>().ok().map(clamp_confidence)
}

fn clamp_confidence(value: f64) -> u8 {
    if value.is_nan() {
        return DEFAULT_CONFIDENCE;
    }
    value.round().clamp(0.0, 100.0) as u8
}

fn text_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Null | Value::String(_) => None,
        other => Some(other.to_string()),
    }
}

fn list_value(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().filter_map(text_value).collect(),
        Value::String(_) => text_value(value).into_iter().collect(),
        _ => Vec::new(),
    }
}

use std::collections::HashMap;

use regex::Regex;
use vitals_core::models::record::ClientRecord;

use crate::rules::{match_label, truncate_chars, Field, COMPANY_MAX_CHARS};

/// Default cap on captured narrative text, matching the record validation limit.
pub const DEFAULT_MAX_FIELD_CHARS: usize = 3000;

/// Turns pasted free text into client records.
///
/// Input is split into sections on separator lines (`---`, `===`, `***`,
/// `###`, three or more) or on a line starting with `CLIENT:`. Each section is
/// parsed through the label rules; sections without a usable record are
/// dropped, and when nothing usable remains the whole input becomes a single
/// record carrying the raw text as notes.
#[derive(Debug, Clone)]
pub struct Extractor {
    separator: Regex,
    client_line: Regex,
    label_line: Regex,
    max_field_chars: usize,
}

impl Extractor {
    pub fn new(max_field_chars: usize) -> Result<Self, regex::Error> {
        Ok(Self {
            separator: Regex::new(r"^\s*(?:-{3,}|={3,}|\*{3,}|#{3,})\s*$")?,
            client_line: Regex::new(r"(?i)^\s*client\s*:")?,
            label_line: Regex::new(r"^\s*(?:[-*•·]\s+)?([A-Za-z][^:]{0,59}?)\s*:\s*(.*?)\s*$")?,
            max_field_chars,
        })
    }

    /// Records found in `raw_text`, in input order. Empty or whitespace-only
    /// input yields no records.
    pub fn extract(&self, raw_text: &str) -> Vec<ClientRecord> {
        if raw_text.trim().is_empty() {
            return Vec::new();
        }

        let sections = self.split_sections(raw_text);
        let records: Vec<ClientRecord> = sections
            .iter()
            .map(|lines| self.parse_section(lines))
            .filter(ClientRecord::is_valid_for_extraction)
            .collect();

        tracing::debug!(
            sections = sections.len(),
            valid = records.len(),
            "Free-text extraction finished"
        );

        if records.is_empty() {
            let mut record = ClientRecord::synthetic(raw_text);
            record.notes = truncate_chars(&record.notes, self.max_field_chars);
            return vec![record];
        }
        records
    }

    /// Non-blank sections; separator lines are dropped, `CLIENT:` lines open
    /// a new section and stay in it.
    pub fn split_sections<'a>(&self, raw_text: &'a str) -> Vec<Vec<&'a str>> {
        let mut sections: Vec<Vec<&str>> = Vec::new();
        let mut current: Vec<&str> = Vec::new();

        for line in raw_text.lines() {
            if self.separator.is_match(line) {
                sections.push(std::mem::take(&mut current));
                continue;
            }
            if self.client_line.is_match(line) {
                sections.push(std::mem::take(&mut current));
            }
            current.push(line);
        }
        sections.push(current);

        sections.retain(|lines| lines.iter().any(|l| !l.trim().is_empty()));
        sections
    }

    fn label<'a>(&self, line: &'a str) -> Option<(&'a str, &'a str)> {
        let caps = self.label_line.captures(line)?;
        Some((caps.get(1)?.as_str(), caps.get(2).map_or("", |m| m.as_str())))
    }

    /// Apply the label rules to one section. The first line claimed by a
    /// field wins; later lines for the same field are ignored.
    pub fn parse_section(&self, lines: &[&str]) -> ClientRecord {
        let mut order: Vec<Field> = Vec::new();
        let mut captured: HashMap<Field, String> = HashMap::new();
        let mut current: Option<Field> = None;

        for line in lines {
            let claimed = self
                .label(line)
                .and_then(|(label, value)| match_label(label).map(|field| (field, value)));

            if let Some((field, value)) = claimed {
                current = None;
                if captured.contains_key(&field) {
                    continue;
                }
                captured.insert(field, value.to_string());
                order.push(field);
                if field.is_multiline() {
                    current = Some(field);
                }
                continue;
            }

            let text = line.trim();
            if let (Some(field), false) = (current, text.is_empty()) {
                if let Some(buffer) = captured.get_mut(&field) {
                    if !buffer.is_empty() {
                        buffer.push('\n');
                    }
                    buffer.push_str(text);
                }
            }
        }

        let mut record = ClientRecord::default();
        for field in order {
            if let Some(value) = captured.get(&field) {
                field.apply(&mut record, value, self.max_field_chars);
            }
        }

        if record.company_name.trim().is_empty() {
            if let Some(name) = self.fallback_company(lines) {
                record.company_name = name;
            }
        }
        record
    }

    /// First non-empty line with any `label:` prefix removed.
    fn fallback_company(&self, lines: &[&str]) -> Option<String> {
        lines.iter().find_map(|line| {
            let text = match self.label(line) {
                Some((_, value)) => value,
                None => line.trim(),
            };
            let text = text.trim();
            (!text.is_empty()).then(|| truncate_chars(text, COMPANY_MAX_CHARS))
        })
    }
}

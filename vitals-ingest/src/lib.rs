//! Free-text intake for Campaign Vitals.
//!
//! Pasted account notes are split into per-client sections and mapped onto
//! [`ClientRecord`](vitals_core::models::record::ClientRecord) fields by an
//! ordered label rule table. No model is involved.

pub mod extract;
pub mod rules;

pub use extract::{Extractor, DEFAULT_MAX_FIELD_CHARS};
pub use rules::{match_label, Field, FIELD_RULES};

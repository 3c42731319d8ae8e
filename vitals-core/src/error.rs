use thiserror::Error;

use crate::provider::ProviderError;
use crate::trace::TraceError;

#[derive(Error, Debug)]
pub enum VitalsError {
    #[error("No client record could be extracted from the input")]
    ExtractionYieldedNothing,

    #[error("Invalid client record: {}", .0.join("; "))]
    InvalidRecord(Vec<String>),

    #[error("Model response could not be mapped to a health category: {0}")]
    MalformedResponse(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Trace(#[from] TraceError),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl VitalsError {
    /// Taxonomy name reported to callers alongside the message.
    pub fn kind(&self) -> &'static str {
        match self {
            VitalsError::ExtractionYieldedNothing => "ExtractionYieldedNothing",
            VitalsError::InvalidRecord(_) => "InvalidRecord",
            VitalsError::MalformedResponse(_) => "MalformedResponse",
            VitalsError::Provider(e) => e.kind(),
            VitalsError::Trace(e) => e.kind(),
            VitalsError::Config(_) => "ConfigError",
            VitalsError::Internal(_) => "InternalError",
        }
    }
}

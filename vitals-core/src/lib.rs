pub mod categories;
pub mod categorize;
pub mod config;
pub mod db;
pub mod error;
pub mod ipc;
pub mod models;
pub mod prompt;
pub mod provider;
pub mod trace;

pub use categories::{CategoryCatalog, CategoryInfo, HealthCategory};
pub use categorize::{categorize, Categorized};
pub use config::VitalsConfig;
pub use error::VitalsError;
pub use prompt::{build_prompt, PromptSpec};
pub use provider::{
    create_invoker, AnthropicClient, InvokeOptions, ModelInvoker, ModelOutput, OpenAiClient,
    ProviderConfig, ProviderError,
};
pub use trace::{
    create_store, CleanupReport, FileTraceStore, PgTraceStore, TraceError, TraceExport,
    TraceStats, TraceStore,
};

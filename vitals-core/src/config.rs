use std::path::PathBuf;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::categories::{CategoryCatalog, HealthCategory};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct VitalsConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub trace: TraceConfig,
    #[serde(default)]
    pub evaluation: EvaluationConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default)]
    pub categories: Vec<CategoryOverride>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServiceConfig {
    pub socket_path: String,
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            socket_path: "/tmp/vitals.sock".to_string(),
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HttpConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ModelConfig {
    /// `openai` (any OpenAI-compatible endpoint) or `anthropic`
    pub provider: String,
    pub model_name: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_seconds: u64,
    /// Override the provider's API root (local gateways, tests)
    pub base_url: Option<String>,
    /// Transport-level retries for 429/5xx responses
    pub max_retries: usize,
    pub retry_delay_ms: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model_name: "gpt-3.5-turbo".to_string(),
            max_tokens: 1000,
            temperature: 0.3,
            timeout_seconds: 60,
            base_url: None,
            max_retries: 0,
            retry_delay_ms: 500,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TraceConfig {
    pub enabled: bool,
    /// `file` or `postgres`
    pub backend: String,
    pub storage_location: String,
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub max_age_days: u32,
    pub max_events_per_session: usize,
    pub auto_cleanup: bool,
    pub cleanup_interval_minutes: u64,
    pub include_sensitive_data: bool,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: "file".to_string(),
            storage_location: "traces".to_string(),
            database_url: None,
            max_connections: 5,
            max_age_days: 30,
            max_events_per_session: 1000,
            auto_cleanup: true,
            cleanup_interval_minutes: 60,
            include_sensitive_data: false,
        }
    }
}

impl TraceConfig {
    /// Storage directory with `~` expanded.
    pub fn storage_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.storage_location).into_owned())
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EvaluationConfig {
    /// Records of one batch evaluated at the same time
    pub max_concurrency: usize,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self { max_concurrency: 4 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ValidationConfig {
    pub company_name_max_length: usize,
    pub monthly_budget_max: f64,
    pub duration_min_months: u32,
    pub duration_max_months: u32,
    pub text_field_max_length: usize,
    pub min_text_fields: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            company_name_max_length: 100,
            monthly_budget_max: 10_000_000.0,
            duration_min_months: 1,
            duration_max_months: 60,
            text_field_max_length: 3000,
            min_text_fields: 2,
        }
    }
}

/// Presentation override for one health category.
#[derive(Debug, Deserialize, Clone)]
pub struct CategoryOverride {
    pub key: HealthCategory,
    pub name: Option<String>,
    pub icon: Option<String>,
    pub description: Option<String>,
}

impl VitalsConfig {
    /// Load from a TOML file (optional) overlaid with `VITALS__SECTION__KEY`
    /// environment variables.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(Environment::with_prefix("VITALS").separator("__"))
            .build()?;
        s.try_deserialize()
    }

    pub fn catalog(&self) -> CategoryCatalog {
        CategoryCatalog::from_overrides(&self.categories)
    }
}

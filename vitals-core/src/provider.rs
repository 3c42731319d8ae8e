//! Model invoker for Campaign Vitals: multi-provider chat completion support
//!
//! Provides a `ModelInvoker` trait with implementations for:
//! - **OpenAI** (and any OpenAI-compatible gateway) via `/chat/completions`
//! - **Anthropic** via the `/messages` API
//!
//! Transport failures are mapped onto three outcomes: unavailable, timed out,
//! or rejected. Retries of 429/5xx responses happen inside the client.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;

use crate::config::ModelConfig;
use crate::prompt::PromptSpec;

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";

// ============================================================================
// ModelInvoker trait
// ============================================================================

/// Abstraction over hosted language models.
#[async_trait]
pub trait ModelInvoker: Send + Sync {
    /// Send one prompt and return the raw completion text.
    async fn invoke(
        &self,
        prompt: &PromptSpec,
        options: &InvokeOptions,
    ) -> Result<ModelOutput, ProviderError>;

    /// Provider name for logging and trace metadata.
    fn name(&self) -> &str;
}

/// Per-call generation settings.
#[derive(Debug, Clone, PartialEq)]
pub struct InvokeOptions {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl From<&ModelConfig> for InvokeOptions {
    fn from(config: &ModelConfig) -> Self {
        Self {
            model: config.model_name.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }
}

/// Raw completion plus usage figures when the provider reports them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelOutput {
    pub text: String,
    pub model: String,
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
}

// ============================================================================
// Error types
// ============================================================================

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Model provider unavailable: {0}")]
    Unavailable(String),

    #[error("Model provider timed out: {0}")]
    Timeout(String),

    #[error("Model provider rejected the request ({code}): {message}")]
    Rejected { code: u16, message: String },

    #[error("Missing API key: set {0}")]
    MissingApiKey(&'static str),

    #[error("Unknown model provider: {0}")]
    UnknownProvider(String),
}

impl ProviderError {
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderError::Unavailable(_) => "ProviderUnavailable",
            ProviderError::Timeout(_) => "ProviderTimeout",
            ProviderError::Rejected { .. } => "ProviderRejected",
            ProviderError::MissingApiKey(_) | ProviderError::UnknownProvider(_) => "ConfigError",
        }
    }

    fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Unavailable(_))
    }

    fn from_transport(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout(format!("no response within {:?}", timeout))
        } else {
            ProviderError::Unavailable(err.to_string())
        }
    }

    fn from_status(status: StatusCode, message: String) -> Self {
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            ProviderError::Unavailable(format!("{}: {}", status.as_u16(), message))
        } else {
            ProviderError::Rejected {
                code: status.as_u16(),
                message,
            }
        }
    }
}

// ============================================================================
// Config types
// ============================================================================

/// Connection settings shared by both clients.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub api_key: String,
    pub base_url: Option<String>,
    pub timeout: Duration,
    pub max_retries: usize,
    pub retry_delay_ms: u64,
}

impl ProviderConfig {
    /// Build from the `[model]` section, reading the key from `key_var`.
    pub fn from_model_config(config: &ModelConfig, key_var: &str) -> Self {
        Self {
            api_key: std::env::var(key_var).unwrap_or_default(),
            base_url: config.base_url.clone(),
            timeout: Duration::from_secs(config.timeout_seconds),
            max_retries: config.max_retries,
            retry_delay_ms: config.retry_delay_ms,
        }
    }

    fn http_client(&self) -> Result<Client, ProviderError> {
        Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| ProviderError::Unavailable(e.to_string()))
    }

    async fn with_retries<T, F, Fut>(&self, attempt: F) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, ProviderError>>,
    {
        let retry_strategy = ExponentialBackoff::from_millis(self.retry_delay_ms.max(1))
            .max_delay(Duration::from_secs(10))
            .map(jitter)
            .take(self.max_retries);

        RetryIf::spawn(retry_strategy, attempt, |e: &ProviderError| {
            let retry = e.is_transient();
            if retry {
                tracing::warn!(error = %e, "Transient provider failure, retrying");
            }
            retry
        })
        .await
    }
}

/// Create the configured invoker.
pub fn create_invoker(config: &ModelConfig) -> Result<Box<dyn ModelInvoker>, ProviderError> {
    match config.provider.as_str() {
        "openai" => Ok(Box::new(OpenAiClient::new(ProviderConfig::from_model_config(
            config,
            "OPENAI_API_KEY",
        ))?)),
        "anthropic" => Ok(Box::new(AnthropicClient::new(
            ProviderConfig::from_model_config(config, "ANTHROPIC_API_KEY"),
        )?)),
        other => Err(ProviderError::UnknownProvider(other.to_string())),
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: Option<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

async fn error_message(response: reqwest::Response) -> String {
    let body = response.text().await.unwrap_or_default();
    serde_json::from_str::<ApiErrorResponse>(&body)
        .ok()
        .and_then(|e| e.error)
        .map(|e| e.message)
        .unwrap_or(body)
}

// ============================================================================
// OpenAI API structs (private)
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
}

// ============================================================================
// OpenAiClient
// ============================================================================

/// OpenAI-compatible chat completions client.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    client: Client,
    config: ProviderConfig,
    base_url: String,
}

impl OpenAiClient {
    pub fn new(config: ProviderConfig) -> Result<Self, ProviderError> {
        if config.api_key.is_empty() {
            return Err(ProviderError::MissingApiKey("OPENAI_API_KEY"));
        }

        let client = config.http_client()?;
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| OPENAI_BASE_URL.to_string());

        Ok(Self {
            client,
            config,
            base_url,
        })
    }

    async fn invoke_once(
        &self,
        prompt: &PromptSpec,
        options: &InvokeOptions,
    ) -> Result<ModelOutput, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let request = ChatRequest {
            model: &options.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &prompt.system,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt.user,
                },
            ],
            max_tokens: options.max_tokens,
            temperature: options.temperature,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::from_transport(e, self.config.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let message = error_message(response).await;
            tracing::error!(code = status.as_u16(), message = %message, "OpenAI API error");
            return Err(ProviderError::from_status(status, message));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::from_transport(e, self.config.timeout))?;

        let text = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        let usage = body.usage;

        Ok(ModelOutput {
            text,
            model: body.model.unwrap_or_else(|| options.model.clone()),
            prompt_tokens: usage.as_ref().and_then(|u| u.prompt_tokens),
            completion_tokens: usage.as_ref().and_then(|u| u.completion_tokens),
        })
    }
}

#[async_trait]
impl ModelInvoker for OpenAiClient {
    async fn invoke(
        &self,
        prompt: &PromptSpec,
        options: &InvokeOptions,
    ) -> Result<ModelOutput, ProviderError> {
        self.config
            .with_retries(|| self.invoke_once(prompt, options))
            .await
    }

    fn name(&self) -> &str {
        "openai"
    }
}

// ============================================================================
// Anthropic API structs (private)
// ============================================================================

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    system: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    model: Option<String>,
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Option<MessagesUsage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessagesUsage {
    input_tokens: Option<u32>,
    output_tokens: Option<u32>,
}

// ============================================================================
// AnthropicClient
// ============================================================================

/// Anthropic messages API client.
#[derive(Debug, Clone)]
pub struct AnthropicClient {
    client: Client,
    config: ProviderConfig,
    base_url: String,
}

impl AnthropicClient {
    pub fn new(config: ProviderConfig) -> Result<Self, ProviderError> {
        if config.api_key.is_empty() {
            return Err(ProviderError::MissingApiKey("ANTHROPIC_API_KEY"));
        }

        let client = config.http_client()?;
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| ANTHROPIC_BASE_URL.to_string());

        Ok(Self {
            client,
            config,
            base_url,
        })
    }

    async fn invoke_once(
        &self,
        prompt: &PromptSpec,
        options: &InvokeOptions,
    ) -> Result<ModelOutput, ProviderError> {
        let url = format!("{}/messages", self.base_url.trim_end_matches('/'));
        let request = MessagesRequest {
            model: &options.model,
            system: &prompt.system,
            messages: vec![ChatMessage {
                role: "user",
                content: &prompt.user,
            }],
            max_tokens: options.max_tokens,
            temperature: options.temperature,
        };

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::from_transport(e, self.config.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let message = error_message(response).await;
            tracing::error!(code = status.as_u16(), message = %message, "Anthropic API error");
            return Err(ProviderError::from_status(status, message));
        }

        let body: MessagesResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::from_transport(e, self.config.timeout))?;

        let text = body
            .content
            .iter()
            .filter(|b| b.kind == "text")
            .filter_map(|b| b.text.as_deref())
            .collect::<Vec<_>>()
            .join("");
        let usage = body.usage;

        Ok(ModelOutput {
            text,
            model: body.model.unwrap_or_else(|| options.model.clone()),
            prompt_tokens: usage.as_ref().and_then(|u| u.input_tokens),
            completion_tokens: usage.as_ref().and_then(|u| u.output_tokens),
        })
    }
}

#[async_trait]
impl ModelInvoker for AnthropicClient {
    async fn invoke(
        &self,
        prompt: &PromptSpec,
        options: &InvokeOptions,
    ) -> Result<ModelOutput, ProviderError> {
        self.config
            .with_retries(|| self.invoke_once(prompt, options))
            .await
    }

    fn name(&self) -> &str {
        "anthropic"
    }
}

// ============================================================================
// TESTS
// ============================================================================

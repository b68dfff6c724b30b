pub mod error;
pub mod ollama;
pub mod openai;
pub mod replicate;
pub mod schema;

use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;
use tutor_core::config::{
    AppConfig, ModelProvider, DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE, DEFAULT_TOP_P,
};
use tutor_core::Message;

pub use error::ModelError;
pub use ollama::OllamaClient;
pub use openai::OpenAiClient;
pub use replicate::ReplicateClient;

/// Placeholder the local model produces when it has nothing usable to say.
pub const NO_VALID_RESPONSE: &str = "No valid response from Llama model";

#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
}

impl ChatRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            temperature: DEFAULT_TEMPERATURE,
            top_p: DEFAULT_TOP_P,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Short name used in logs.
    fn label(&self) -> &str;

    async fn complete(&self, request: &ChatRequest) -> Result<String, ModelError>;
}

/// Stands in for a provider whose credentials are missing.
#[derive(Debug, Clone)]
pub struct UnavailableModel {
    reason: String,
}

impl UnavailableModel {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl ChatModel for UnavailableModel {
    fn label(&self) -> &str {
        "unavailable"
    }

    async fn complete(&self, _request: &ChatRequest) -> Result<String, ModelError> {
        Err(ModelError::NotConfigured(self.reason.clone()))
    }
}

/// Builds the client for the configured provider. Missing credentials do not
/// abort start-up; the conversation reports them on every turn instead.
pub fn build_model(config: &AppConfig) -> Arc<dyn ChatModel> {
    let built: anyhow::Result<Arc<dyn ChatModel>> = match config.provider {
        ModelProvider::Local => OllamaClient::from_app_config(config)
            .map(|client| Arc::new(client) as Arc<dyn ChatModel>),
        ModelProvider::OpenAi => OpenAiClient::from_app_config(config)
            .map(|client| Arc::new(client) as Arc<dyn ChatModel>),
        ModelProvider::Replicate => ReplicateClient::from_app_config(config)
            .map(|client| Arc::new(client) as Arc<dyn ChatModel>),
    };

    built.unwrap_or_else(|err| {
        warn!(provider = ?config.provider, error = %err, "model provider unavailable");
        Arc::new(UnavailableModel::new(format!("{:?} model ({err})", config.provider)))
    })
}

pub fn truncate_for_log(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }

    text.chars().take(max_chars).collect::<String>() + "…"
}

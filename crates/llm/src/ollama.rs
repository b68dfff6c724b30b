use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use tutor_core::config::{AppConfig, OllamaConfig};
use tutor_core::Role;

use crate::error::ModelError;
use crate::schema::{OllamaChatRequest, OllamaChatResponse, OllamaMessage, OllamaOptions};
use crate::{truncate_for_log, ChatModel, ChatRequest, NO_VALID_RESPONSE};

const PROVIDER: &str = "ollama";

/// Llama served by a local Ollama instance.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    http: Client,
    url: String,
    model: String,
}

impl OllamaClient {
    pub fn from_app_config(config: &AppConfig) -> Result<Self> {
        Self::new(config.ollama.clone(), config.model_timeout())
    }

    pub fn new(config: OllamaConfig, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("failed to build HTTP client for Ollama")?;

        Ok(Self {
            http,
            url: format!("{}/api/chat", config.endpoint.trim_end_matches('/')),
            model: config.model,
        })
    }
}

/// Ollama has no `function` role; results go back as tool output.
fn wire_role(role: Role) -> &'static str {
    match role {
        Role::Function => "tool",
        other => other.as_str(),
    }
}

#[async_trait]
impl ChatModel for OllamaClient {
    fn label(&self) -> &str {
        &self.model
    }

    #[instrument(skip(self, request), fields(model = %self.model, messages = request.messages.len()))]
    async fn complete(&self, request: &ChatRequest) -> Result<String, ModelError> {
        let body = OllamaChatRequest {
            model: &self.model,
            messages: request
                .messages
                .iter()
                .map(|message| OllamaMessage {
                    role: wire_role(message.role),
                    content: &message.content,
                })
                .collect(),
            stream: false,
            options: OllamaOptions {
                temperature: request.temperature,
                top_p: request.top_p,
                num_predict: request.max_tokens,
            },
        };

        let response = self.http.post(&self.url).json(&body).send().await.map_err(|err| {
            if err.is_timeout() {
                warn!(url = %self.url, "Ollama request timed out");
            }
            ModelError::from(err)
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<failed to read body>".to_string());
            return Err(ModelError::HttpStatus {
                provider: PROVIDER,
                status: status.as_u16(),
                body,
            });
        }

        let reply: OllamaChatResponse = response.json().await.map_err(|err| ModelError::Decode {
            provider: PROVIDER,
            detail: err.to_string(),
        })?;

        let content = reply
            .message
            .and_then(|message| message.content)
            .filter(|content| !content.trim().is_empty());

        match content {
            Some(content) => {
                debug!(reply = %truncate_for_log(&content, 240), "Ollama reply");
                Ok(content)
            }
            None => Ok(NO_VALID_RESPONSE.to_string()),
        }
    }
}

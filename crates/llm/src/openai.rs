use anyhow::Result;
use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestFunctionMessage,
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
    Client as OpenAIClient,
};
use async_trait::async_trait;
use std::time::{Duration, Instant};
use tracing::{info, instrument, warn};
use tutor_core::config::{AppConfig, OpenAiConfig};
use tutor_core::{Message, Role};

use crate::error::ModelError;
use crate::{truncate_for_log, ChatModel, ChatRequest};

const PROVIDER: &str = "openai";

/// Any OpenAI-compatible chat completions endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    client: OpenAIClient<OpenAIConfig>,
    model: String,
    timeout: Duration,
}

impl OpenAiClient {
    pub fn from_app_config(config: &AppConfig) -> Result<Self> {
        let openai = config.require_openai_config()?.clone();
        Ok(Self::new(openai, config.model_timeout()))
    }

    pub fn new(config: OpenAiConfig, timeout: Duration) -> Self {
        let openai_config = OpenAIConfig::new()
            .with_api_key(config.api_key)
            .with_api_base(config.endpoint.trim_end_matches('/').to_string());

        Self {
            client: OpenAIClient::with_config(openai_config),
            model: config.model,
            timeout,
        }
    }
}

#[allow(deprecated)]
fn to_wire(message: &Message) -> Result<ChatCompletionRequestMessage, OpenAIError> {
    Ok(match message.role {
        Role::System => ChatCompletionRequestSystemMessageArgs::default()
            .content(message.content.clone())
            .build()?
            .into(),
        Role::User => ChatCompletionRequestUserMessageArgs::default()
            .content(message.content.clone())
            .build()?
            .into(),
        Role::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
            .content(message.content.clone())
            .build()?
            .into(),
        Role::Function => ChatCompletionRequestMessage::Function(ChatCompletionRequestFunctionMessage {
            content: Some(message.content.clone()),
            name: message.name.clone().unwrap_or_default(),
        }),
    })
}

fn builder_error(err: OpenAIError) -> ModelError {
    ModelError::Decode {
        provider: PROVIDER,
        detail: format!("invalid request: {err}"),
    }
}

#[async_trait]
impl ChatModel for OpenAiClient {
    fn label(&self) -> &str {
        &self.model
    }

    #[instrument(skip(self, request), fields(model = %self.model, messages = request.messages.len()))]
    async fn complete(&self, request: &ChatRequest) -> Result<String, ModelError> {
        let messages = request
            .messages
            .iter()
            .map(to_wire)
            .collect::<Result<Vec<_>, _>>()
            .map_err(builder_error)?;

        let chat_request = CreateChatCompletionRequestArgs::default()
            .model(self.model.clone())
            .messages(messages)
            .temperature(request.temperature)
            .top_p(request.top_p)
            .max_tokens(u16::try_from(request.max_tokens).unwrap_or(u16::MAX))
            .build()
            .map_err(builder_error)?;

        let started = Instant::now();
        let response = match tokio::time::timeout(self.timeout, self.client.chat().create(chat_request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(err)) => {
                warn!(error = %err, elapsed_secs = started.elapsed().as_secs_f64(), "chat completion failed");
                return Err(match err {
                    OpenAIError::JSONDeserialize(inner) => ModelError::Decode {
                        provider: PROVIDER,
                        detail: inner.to_string(),
                    },
                    other => ModelError::Transport(other.to_string()),
                });
            }
            Err(_) => {
                warn!(timeout_secs = self.timeout.as_secs(), "chat completion timed out");
                return Err(ModelError::Timeout(self.timeout));
            }
        };

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(ModelError::EmptyResponse(PROVIDER))?;

        info!(
            elapsed_secs = started.elapsed().as_secs_f64(),
            reply = %truncate_for_log(&content, 240),
            "chat completion received"
        );
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[allow(deprecated)]
    fn function_messages_keep_their_name() {
        let wire = to_wire(&Message::function("get_gas_price", r#"{"price":"20"}"#)).unwrap();
        match wire {
            ChatCompletionRequestMessage::Function(function) => {
                assert_eq!(function.name, "get_gas_price");
                assert_eq!(function.content.as_deref(), Some(r#"{"price":"20"}"#));
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn every_role_converts() {
        for message in [
            Message::system("be brief"),
            Message::user("hi"),
            Message::assistant("hello"),
        ] {
            assert!(to_wire(&message).is_ok());
        }
    }
}

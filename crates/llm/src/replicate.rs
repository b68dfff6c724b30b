use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use std::task::Poll;
use std::time::Duration;
use tracing::{info, instrument, warn};
use tutor_core::config::{AppConfig, ReplicateConfig};
use tutor_core::poll::{BoundedPoll, PollOutcome};
use tutor_core::Message;

use crate::error::ModelError;
use crate::schema::{Prediction, PredictionInput, PredictionRequest};
use crate::{truncate_for_log, ChatModel, ChatRequest};

const PROVIDER: &str = "replicate";
const DEFAULT_BASE_URL: &str = "https://api.replicate.com/v1";
const MAX_NEW_TOKENS: u32 = 3000;

/// Web3-tuned model hosted on Replicate. Predictions run asynchronously, so a
/// completion is one create call followed by bounded polling.
#[derive(Debug, Clone)]
pub struct ReplicateClient {
    http: Client,
    base_url: String,
    model_version: String,
    tools: String,
    poll: BoundedPoll,
}

impl ReplicateClient {
    pub fn from_app_config(config: &AppConfig) -> Result<Self> {
        let replicate = config.require_replicate_config()?.clone();
        Self::new(replicate, config.model_timeout())
    }

    pub fn new(config: ReplicateConfig, request_timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Token {}", config.api_token))
                .context("REPLICATE_API_TOKEN is not a valid header value")?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http = Client::builder()
            .default_headers(headers)
            .timeout(request_timeout)
            .build()
            .context("failed to build HTTP client for Replicate")?;

        Ok(Self {
            http,
            base_url: DEFAULT_BASE_URL.to_string(),
            model_version: config.model_version,
            tools: chain_tools::catalog::tool_catalog().to_string(),
            poll: BoundedPoll::default(),
        })
    }

    pub fn with_poll(mut self, poll: BoundedPoll) -> Self {
        self.poll = poll;
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn fetch(&self, request: reqwest::RequestBuilder) -> Result<Prediction, ModelError> {
        let response = request.send().await?;
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
        response.json().await.map_err(|err| ModelError::Decode {
            provider: PROVIDER,
            detail: err.to_string(),
        })
    }

    async fn wait_for(&self, prediction: Prediction) -> Result<String, ModelError> {
        let url = format!("{}/predictions/{}", self.base_url, prediction.id);

        let outcome = self
            .poll
            .run(|attempt| {
                let request = self.http.get(&url);
                async move {
                    let prediction = self.fetch(request).await?;
                    settle(prediction).map_err(|err| {
                        warn!(attempt, error = %err, "prediction did not succeed");
                        anyhow::Error::from(err)
                    })
                }
            })
            .await
            .map_err(|err| match err.downcast::<ModelError>() {
                Ok(model_error) => model_error,
                Err(other) => ModelError::Transport(other.to_string()),
            })?;

        match outcome {
            PollOutcome::Ready(text) => Ok(text),
            PollOutcome::TimedOut { attempts } => {
                warn!(id = %prediction.id, attempts, "prediction polling exhausted");
                Err(ModelError::Timeout(self.poll.delay * attempts))
            }
        }
    }
}

/// Maps a prediction snapshot to done, still running, or failed.
fn settle(prediction: Prediction) -> Result<Poll<String>, ModelError> {
    match prediction.status.as_str() {
        "succeeded" => prediction
            .output_text()
            .map(Poll::Ready)
            .ok_or(ModelError::EmptyResponse(PROVIDER)),
        "failed" | "canceled" => Err(ModelError::PredictionFailed {
            detail: prediction.error_text(),
            id: prediction.id,
            status: prediction.status,
        }),
        _ => Ok(Poll::Pending),
    }
}

/// The model takes a single query string, so the conversation is flattened.
fn flatten(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|message| match &message.name {
            Some(name) => format!("{} ({name}): {}", message.role.as_str(), message.content),
            None => format!("{}: {}", message.role.as_str(), message.content),
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[async_trait]
impl ChatModel for ReplicateClient {
    fn label(&self) -> &str {
        PROVIDER
    }

    #[instrument(skip(self, request), fields(messages = request.messages.len()))]
    async fn complete(&self, request: &ChatRequest) -> Result<String, ModelError> {
        let body = PredictionRequest {
            version: &self.model_version,
            input: PredictionInput {
                query: flatten(&request.messages),
                tools: &self.tools,
                top_p: request.top_p,
                temperature: request.temperature,
                max_new_tokens: MAX_NEW_TOKENS,
            },
        };

        let created = self
            .fetch(
                self.http
                    .post(format!("{}/predictions", self.base_url))
                    .json(&body),
            )
            .await?;
        info!(id = %created.id, status = %created.status, "prediction created");

        let text = match settle(created.clone())? {
            Poll::Ready(text) => text,
            Poll::Pending => self.wait_for(created).await?,
        };

        info!(reply = %truncate_for_log(&text, 240), "prediction completed");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn prediction(value: serde_json::Value) -> Prediction {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn conversation_is_flattened_in_order() {
        let query = flatten(&[
            Message::system("You are a tutor."),
            Message::function("get_gas_price", r#"{"price":"20"}"#),
        ]);
        assert_eq!(
            query,
            "system: You are a tutor.\n\nfunction (get_gas_price): {\"price\":\"20\"}"
        );
    }

    #[test]
    fn settles_each_status() {
        assert_eq!(
            settle(prediction(json!({"id": "a", "status": "processing"}))).unwrap(),
            Poll::Pending
        );
        assert_eq!(
            settle(prediction(json!({"id": "a", "status": "succeeded", "output": ["ok"]}))).unwrap(),
            Poll::Ready("ok".to_string())
        );
        assert_eq!(
            settle(prediction(json!({"id": "a", "status": "canceled"}))).unwrap_err(),
            ModelError::PredictionFailed {
                id: "a".into(),
                status: "canceled".into(),
                detail: "Prediction failed".into(),
            }
        );
    }

    #[test]
    fn polls_fifty_times_a_second_apart_by_default() {
        let client = ReplicateClient::new(
            ReplicateConfig {
                api_token: "r8_test".into(),
                model_version: "v1".into(),
            },
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(client.poll, BoundedPoll::new(50, Duration::from_secs(1)));
        assert!(client.tools.contains("transaction_tools"));
    }
}

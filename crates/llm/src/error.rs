use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ModelError {
    #[error("{0} is not configured")]
    NotConfigured(String),
    #[error("http client error: {0}")]
    Transport(String),
    #[error("{provider} returned HTTP {status}: {body}")]
    HttpStatus {
        provider: &'static str,
        status: u16,
        body: String,
    },
    #[error("failed to decode {provider} response: {detail}")]
    Decode {
        provider: &'static str,
        detail: String,
    },
    #[error("empty response from {0}")]
    EmptyResponse(&'static str),
    #[error("prediction {id} {status}: {detail}")]
    PredictionFailed {
        id: String,
        status: String,
        detail: String,
    },
    #[error("model did not answer within {0:?}")]
    Timeout(Duration),
}

impl From<reqwest::Error> for ModelError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

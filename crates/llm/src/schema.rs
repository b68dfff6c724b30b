//! Wire types for the HTTP model providers.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize)]
pub struct OllamaChatRequest<'a> {
    pub model: &'a str,
    pub messages: Vec<OllamaMessage<'a>>,
    pub stream: bool,
    pub options: OllamaOptions,
}

#[derive(Debug, Clone, Serialize)]
pub struct OllamaMessage<'a> {
    pub role: &'a str,
    pub content: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct OllamaOptions {
    pub temperature: f32,
    pub top_p: f32,
    pub num_predict: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OllamaChatResponse {
    #[serde(default)]
    pub message: Option<OllamaReply>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OllamaReply {
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PredictionRequest<'a> {
    pub version: &'a str,
    pub input: PredictionInput<'a>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PredictionInput<'a> {
    pub query: String,
    pub tools: &'a str,
    pub top_p: f32,
    pub temperature: f32,
    pub max_new_tokens: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Prediction {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub output: Value,
    #[serde(default)]
    pub error: Option<Value>,
}

impl Prediction {
    /// Replicate streams language models as an array of tokens; older
    /// models return a single string.
    pub fn output_text(&self) -> Option<String> {
        let text = match &self.output {
            Value::String(s) => s.clone(),
            Value::Array(parts) => parts.iter().filter_map(Value::as_str).collect(),
            _ => return None,
        };
        (!text.trim().is_empty()).then_some(text)
    }

    pub fn error_text(&self) -> String {
        match &self.error {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => "Prediction failed".to_string(),
            Some(other) => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn prediction(output: Value) -> Prediction {
        serde_json::from_value(json!({"id": "p1", "status": "succeeded", "output": output}))
            .unwrap()
    }

    #[test]
    fn joins_streamed_tokens() {
        let p = prediction(json!(["Gas ", "is ", "low."]));
        assert_eq!(p.output_text().as_deref(), Some("Gas is low."));
    }

    #[test]
    fn blank_output_is_none() {
        assert_eq!(prediction(json!("  ")).output_text(), None);
        assert_eq!(prediction(Value::Null).output_text(), None);
    }

    #[test]
    fn missing_error_has_a_default() {
        let p: Prediction =
            serde_json::from_value(json!({"id": "p1", "status": "failed"})).unwrap();
        assert_eq!(p.error_text(), "Prediction failed");
    }
}

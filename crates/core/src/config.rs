use anyhow::{ensure, Context, Result};
use dotenvy::dotenv;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// Global configuration accessor to keep the rest of the application stateless.
pub static CONFIG: Lazy<AppConfig> = Lazy::new(|| {
    AppConfig::load_from_env().expect("failed to load configuration from environment")
});

pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_TOP_P: f32 = 0.9;
pub const DEFAULT_MAX_TOKENS: u32 = 2000;

/// Which conversation model answers chat turns and interprets results.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ModelProvider {
    /// Llama served by a local Ollama instance.
    #[default]
    Local,
    OpenAi,
    Replicate,
}

impl FromStr for ModelProvider {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "local" | "ollama" | "llama" => Ok(Self::Local),
            "openai" | "gpt" => Ok(Self::OpenAi),
            "replicate" | "flock" => Ok(Self::Replicate),
            other => anyhow::bail!("unknown LLM_PROVIDER {other:?}, expected local|openai|replicate"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    pub endpoint: String,
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub endpoint: String,
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicateConfig {
    pub api_token: String,
    pub model_version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub provider: ModelProvider,
    pub ollama: OllamaConfig,
    pub openai: Option<OpenAiConfig>,
    pub replicate: Option<ReplicateConfig>,
    /// Connected wallet; becomes the `from` field of recorded transactions.
    pub wallet_address: Option<String>,
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,
    #[serde(default = "default_model_timeout_secs")]
    pub model_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            provider: ModelProvider::default(),
            ollama: OllamaConfig {
                endpoint: default_ollama_endpoint(),
                model: default_ollama_model(),
            },
            openai: None,
            replicate: None,
            wallet_address: None,
            chain_id: default_chain_id(),
            model_timeout_secs: default_model_timeout_secs(),
        }
    }
}

impl AppConfig {
    /// Build configuration from well-known environment variables.
    pub fn load_from_env() -> Result<Self> {
        preload_env_files();

        let provider = match env_var_non_empty("LLM_PROVIDER") {
            Ok(value) => value.parse()?,
            Err(_) => ModelProvider::default(),
        };

        let ollama = OllamaConfig {
            endpoint: env::var("OLLAMA_ENDPOINT").unwrap_or_else(|_| default_ollama_endpoint()),
            model: env::var("OLLAMA_MODEL").unwrap_or_else(|_| default_ollama_model()),
        };

        let openai = match env_var_non_empty("OPENAI_API_KEY") {
            Ok(api_key) => Some(OpenAiConfig {
                api_key,
                endpoint: env::var("OPENAI_ENDPOINT").unwrap_or_else(|_| default_openai_endpoint()),
                model: env::var("OPENAI_MODEL").unwrap_or_else(|_| default_openai_model()),
            }),
            Err(_) => None,
        };

        let replicate = match env_var_non_empty("REPLICATE_API_TOKEN") {
            Ok(api_token) => Some(ReplicateConfig {
                api_token,
                model_version: env::var("REPLICATE_MODEL_VERSION")
                    .unwrap_or_else(|_| default_replicate_version()),
            }),
            Err(_) => None,
        };

        let chain_id = match env_var_non_empty("CHAIN_ID") {
            Ok(value) => value
                .trim()
                .parse()
                .with_context(|| format!("CHAIN_ID must be an integer, got {value:?}"))?,
            Err(_) => default_chain_id(),
        };

        let model_timeout_secs = match env_var_non_empty("MODEL_TIMEOUT_SECS") {
            Ok(value) => value
                .trim()
                .parse()
                .with_context(|| format!("MODEL_TIMEOUT_SECS must be an integer, got {value:?}"))?,
            Err(_) => default_model_timeout_secs(),
        };

        Ok(Self {
            provider,
            ollama,
            openai,
            replicate,
            wallet_address: env_var_non_empty("WALLET_ADDRESS").ok(),
            chain_id,
            model_timeout_secs,
        })
    }

    /// Helper that forces the presence of OpenAI credentials.
    pub fn require_openai_config(&self) -> Result<&OpenAiConfig> {
        let config = self.openai.as_ref().context(
            "OpenAI is not configured: create a .env file (see .env.example) and set OPENAI_API_KEY",
        )?;

        ensure!(
            !config.api_key.trim().is_empty() && !config.endpoint.trim().is_empty(),
            "OPENAI_API_KEY and OPENAI_ENDPOINT must not be empty"
        );

        Ok(config)
    }

    /// Helper that forces the presence of a Replicate token.
    pub fn require_replicate_config(&self) -> Result<&ReplicateConfig> {
        let config = self.replicate.as_ref().context(
            "Replicate is not configured: create a .env file (see .env.example) and set REPLICATE_API_TOKEN",
        )?;

        ensure!(
            !config.api_token.trim().is_empty() && !config.model_version.trim().is_empty(),
            "REPLICATE_API_TOKEN and REPLICATE_MODEL_VERSION must not be empty"
        );

        Ok(config)
    }

    pub fn model_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.model_timeout_secs.max(1))
    }
}

fn env_var_non_empty(key: &str) -> Result<String, env::VarError> {
    let value = env::var(key)?;
    if value.trim().is_empty() {
        return Err(env::VarError::NotPresent);
    }
    Ok(value)
}

fn default_ollama_endpoint() -> String {
    "http://localhost:11434".to_string()
}

fn default_ollama_model() -> String {
    "llama3.2".to_string()
}

fn default_openai_endpoint() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_openai_model() -> String {
    "gpt-4o".to_string()
}

fn default_replicate_version() -> String {
    "3babfa32ab245cf8e047ff7366bcb4d5a2b4f0f108f504c47d5a84e23c02ff5f".to_string()
}

fn default_chain_id() -> u64 {
    1
}

fn default_model_timeout_secs() -> u64 {
    60
}

fn preload_env_files() {
    // .env in the working directory (or a parent) wins over the workspace one
    let _ = dotenv();

    let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    let candidate = manifest_dir.join("../../.env");
    if candidate.exists() {
        let _ = dotenvy::from_path(candidate);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_names_are_case_insensitive() {
        assert_eq!("OpenAI".parse::<ModelProvider>().unwrap(), ModelProvider::OpenAi);
        assert_eq!("ollama".parse::<ModelProvider>().unwrap(), ModelProvider::Local);
        assert_eq!(" replicate ".parse::<ModelProvider>().unwrap(), ModelProvider::Replicate);
        assert!("claude".parse::<ModelProvider>().is_err());
    }

    #[test]
    fn missing_credentials_are_reported() {
        let config = AppConfig::default();
        assert!(config.require_openai_config().is_err());
        assert!(config.require_replicate_config().is_err());
        assert_eq!(config.chain_id, 1);
        assert_eq!(config.ollama.model, "llama3.2");
    }
}

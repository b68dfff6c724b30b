use std::net::SocketAddr;

use ::config::{Config, ConfigError as BuilderError, Environment, File};
use serde::Deserialize;
use thiserror::Error;

const DEFAULT_CONFIG_PATH: &str = "config/config.yaml";

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct RuntimeEnvConfig {
    #[serde(default)]
    pub http_proxy: Option<String>,
    #[serde(default)]
    pub https_proxy: Option<String>,
}

/// Settings of the HTTP front-end. Model and wallet settings come from the
/// environment through `tutor_core::config::CONFIG`.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ServerSettings {
    #[serde(default)]
    pub server: Option<ServerConfig>,
    #[serde(default)]
    pub runtime_env: Option<RuntimeEnvConfig>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid socket address: {0}")]
    InvalidAddr(String),
    #[error("configuration load failed: {0}")]
    Load(#[from] BuilderError),
}

fn default_bind() -> String {
    "0.0.0.0:3000".to_string()
}

impl ServerSettings {
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        let bind = self
            .server
            .as_ref()
            .map(|server| server.bind.clone())
            .unwrap_or_else(default_bind);
        bind.parse().map_err(|_| ConfigError::InvalidAddr(bind))
    }

    /// Exports configured proxies so every outbound client picks them up.
    pub fn apply_runtime_env(&self) {
        let Some(runtime) = &self.runtime_env else {
            return;
        };
        if let Some(proxy) = &runtime.http_proxy {
            std::env::set_var("HTTP_PROXY", proxy);
            std::env::set_var("http_proxy", proxy);
        }
        if let Some(proxy) = &runtime.https_proxy {
            std::env::set_var("HTTPS_PROXY", proxy);
            std::env::set_var("https_proxy", proxy);
        }
    }
}

pub fn load_server_settings() -> Result<ServerSettings, ConfigError> {
    let settings: ServerSettings = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_PATH).required(false))
        .add_source(Environment::with_prefix("TUTOR").separator("__"))
        .build()?
        .try_deserialize()?;

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_port_3000() {
        let addr = ServerSettings::default().bind_addr().unwrap();
        assert_eq!(addr.to_string(), "0.0.0.0:3000");
    }

    #[test]
    fn rejects_malformed_bind() {
        let settings = ServerSettings {
            server: Some(ServerConfig {
                bind: "localhost".into(),
            }),
            runtime_env: None,
        };
        assert!(matches!(
            settings.bind_addr(),
            Err(ConfigError::InvalidAddr(bind)) if bind == "localhost"
        ));
    }

    #[test]
    fn reads_nested_yaml() {
        let settings: ServerSettings = Config::builder()
            .add_source(File::from_str(
                "server:\n  bind: 127.0.0.1:8080\nruntime_env:\n  https_proxy: http://proxy:3128\n",
                ::config::FileFormat::Yaml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(settings.bind_addr().unwrap().port(), 8080);
        assert_eq!(
            settings.runtime_env.unwrap().https_proxy.as_deref(),
            Some("http://proxy:3128")
        );
    }
}

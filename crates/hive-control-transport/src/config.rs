//! Control plane configuration.
//!
//! Loaded from an optional JSON file, then overridden from the
//! environment. An empty API key is a valid configuration value but the
//! server refuses to start with one.

use std::{fs, path::Path};

use hive_control_capture::HookConfigUpdate;
use serde::Deserialize;
use thiserror::Error;

/// Default listen host. Loopback only.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default listen port.
pub const DEFAULT_PORT: u16 = 17321;

pub const ENV_HOST: &str = "HIVE_CONTROL_HOST";
pub const ENV_PORT: &str = "HIVE_CONTROL_PORT";
pub const ENV_API_KEY: &str = "HIVE_CONTROL_API_KEY";

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid port: {0}")]
    InvalidPort(String),
}

/// HTTP listener settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub api_key: String,
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

const fn default_port() -> u16 {
    DEFAULT_PORT
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: DEFAULT_PORT,
            api_key: String::new(),
        }
    }
}

impl ServerConfig {
    /// `host:port` string for binding.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Whether a usable API key is set.
    #[must_use]
    pub fn has_api_key(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

/// Full control plane configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ControlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    /// Initial hook settings, applied once at startup.
    #[serde(default)]
    pub hooks: HookConfigUpdate,
}

impl ControlConfig {
    /// Parse configuration from a JSON file.
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Load from an optional file, then apply process environment overrides.
    ///
    /// # Errors
    /// Returns error if the file or an override is invalid.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply overrides read through `lookup`. Blank values are ignored.
    ///
    /// # Errors
    /// Returns error if the port override is not a valid port.
    pub fn apply_env_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(host) = var(ENV_HOST) {
            self.server.host = host;
        }
        if let Some(port) = var(ENV_PORT) {
            self.server.port = port.parse().map_err(|_| ConfigError::InvalidPort(port))?;
        }
        if let Some(key) = var(ENV_API_KEY) {
            self.server.api_key = key;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ControlConfig::default();
        assert_eq!(config.server.bind_addr(), "127.0.0.1:17321");
        assert!(!config.server.has_api_key());
        assert!(config.hooks.is_empty());
    }

    #[test]
    fn test_parse_partial_json() {
        let config: ControlConfig = serde_json::from_str(
            r#"{
                "server": { "apiKey": "secret" },
                "hooks": { "globalHookEnabled": true, "globalHookUrl": "http://127.0.0.1:9000/hook" }
            }"#,
        )
        .unwrap();

        assert_eq!(config.server.host, DEFAULT_HOST);
        assert_eq!(config.server.port, DEFAULT_PORT);
        assert_eq!(config.server.api_key, "secret");
        assert_eq!(config.hooks.global_enabled, Some(true));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = ControlConfig::default();
        config
            .apply_env_overrides(lookup(&[
                (ENV_HOST, "0.0.0.0"),
                (ENV_PORT, "8080"),
                (ENV_API_KEY, "  k1  "),
            ]))
            .unwrap();

        assert_eq!(config.server.bind_addr(), "0.0.0.0:8080");
        assert_eq!(config.server.api_key, "k1");
    }

    #[test]
    fn test_blank_override_is_ignored() {
        let mut config = ControlConfig::default();
        config.server.api_key = "from-file".to_string();
        config
            .apply_env_overrides(lookup(&[(ENV_API_KEY, "   ")]))
            .unwrap();
        assert_eq!(config.server.api_key, "from-file");
    }

    #[test]
    fn test_load_missing_file() {
        let err = ControlConfig::load(Some(Path::new("/nonexistent/hive-control.json"))).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn test_invalid_port_override() {
        let mut config = ControlConfig::default();
        let err = config
            .apply_env_overrides(lookup(&[(ENV_PORT, "http")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPort(p) if p == "http"));
    }
}

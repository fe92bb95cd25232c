use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::info;

/// Request gateway settings. Loaded from the environment or the
/// `[requesting]` table of a TOML config file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RequestingConfig {
    /// Prefix stripped from incoming paths before they reach rules.
    pub base_url: String,
    /// How long a caller waits for a rule to respond.
    pub timeout_ms: u64,
}

impl Default for RequestingConfig {
    fn default() -> Self {
        Self {
            base_url: "/api".to_string(),
            timeout_ms: 10_000,
        }
    }
}

impl RequestingConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        let config = Self {
            base_url: std::env::var("REQUESTING_BASE_URL").unwrap_or(defaults.base_url),
            timeout_ms: match std::env::var("REQUESTING_TIMEOUT_MS") {
                Ok(raw) => raw
                    .parse()
                    .with_context(|| format!("REQUESTING_TIMEOUT_MS must be a number, got {raw:?}"))?,
                Err(_) => defaults.timeout_ms,
            },
        };

        config.log();
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse requesting config")
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// `/api/Trip/create` → `/Trip/create`. Paths without the prefix are
    /// returned unchanged.
    pub fn strip_base<'a>(&self, path: &'a str) -> &'a str {
        match path.strip_prefix(self.base_url.as_str()) {
            Some(rest) if rest.starts_with('/') => rest,
            _ => path,
        }
    }

    pub fn log(&self) {
        info!(
            base_url = self.base_url.as_str(),
            timeout_ms = self.timeout_ms,
            "Requesting config"
        );
    }
}

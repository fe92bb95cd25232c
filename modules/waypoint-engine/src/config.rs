use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::info;

/// Cascade limits. Loaded from the environment or the `[engine]` table of a
/// TOML config file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Deepest cascade step allowed; the externally triggered action is depth 0.
    pub max_depth: u32,
    /// Refuse to re-invoke an action with the same input as one of its
    /// causal ancestors.
    pub cycle_guard: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_depth: 16,
            cycle_guard: true,
        }
    }
}

impl EngineConfig {
    /// Load from `WAYPOINT_MAX_DEPTH` / `WAYPOINT_CYCLE_GUARD`, falling back
    /// to defaults for anything unset.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        let config = Self {
            max_depth: match std::env::var("WAYPOINT_MAX_DEPTH") {
                Ok(raw) => raw
                    .parse()
                    .with_context(|| format!("WAYPOINT_MAX_DEPTH must be a number, got {raw:?}"))?,
                Err(_) => defaults.max_depth,
            },
            cycle_guard: match std::env::var("WAYPOINT_CYCLE_GUARD") {
                Ok(raw) => raw
                    .parse()
                    .with_context(|| format!("WAYPOINT_CYCLE_GUARD must be true or false, got {raw:?}"))?,
                Err(_) => defaults.cycle_guard,
            },
        };

        config.log();
        Ok(config)
    }

    /// Parse the `[engine]` table on its own.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse engine config")
    }

    pub fn with_max_depth(mut self, max_depth: u32) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_cycle_guard(mut self, enabled: bool) -> Self {
        self.cycle_guard = enabled;
        self
    }

    pub fn log(&self) {
        info!(
            max_depth = self.max_depth,
            cycle_guard = self.cycle_guard,
            "Engine config"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let config = EngineConfig::from_toml("max_depth = 4").unwrap();
        assert_eq!(config.max_depth, 4);
        assert!(config.cycle_guard);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(EngineConfig::from_toml("max_dept = 4").is_err());
    }

    #[test]
    fn builder_overrides() {
        let config = EngineConfig::default()
            .with_max_depth(2)
            .with_cycle_guard(false);
        assert_eq!(config.max_depth, 2);
        assert!(!config.cycle_guard);
    }
}

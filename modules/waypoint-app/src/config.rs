use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use waypoint_engine::EngineConfig;
use waypoint_requesting::RequestingConfig;

/// TOML-backed application config. Every table is optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub engine: EngineConfig,
    pub requesting: RequestingConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            engine: EngineConfig::from_env()?,
            requesting: RequestingConfig::from_env()?,
        })
    }

    pub fn log(&self) {
        self.engine.log();
        self.requesting.log();
    }
}

/// Load and parse a TOML config file.
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content).with_context(|| format!("Failed to parse config file: {}", path.display()))
}

pub fn parse_config(content: &str) -> Result<AppConfig> {
    Ok(toml::from_str(content)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_both_tables() {
        let config = parse_config(
            r#"
            [engine]
            max_depth = 4

            [requesting]
            base_url = "/v1"
            "#,
        )
        .unwrap();
        assert_eq!(config.engine.max_depth, 4);
        assert!(config.engine.cycle_guard);
        assert_eq!(config.requesting.base_url, "/v1");
        assert_eq!(config.requesting.timeout_ms, 10_000);
    }

    #[test]
    fn empty_file_is_all_defaults() {
        assert_eq!(parse_config("").unwrap(), AppConfig::default());
    }

    #[test]
    fn unknown_tables_and_fields_are_rejected() {
        assert!(parse_config("[server]\nport = 1").is_err());
        assert!(parse_config("[engine]\ndepth = 1").is_err());
    }

    #[test]
    fn bundled_config_parses() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/waypoint.toml");
        let config = load_config(&path).unwrap();
        assert_eq!(config, AppConfig::default());
    }
}

//! Ambient daemon configuration (NOT the TDF).
//!
//! Out of scope per spec §6 is the YAML configuration loader for the wider
//! Bloom-style application; what remains in scope is this crate's own small
//! settings surface (listen address, probe selector, log level, path to the
//! TDF fixture), loaded from a TOML file with environment variable
//! overrides, in the same spirit as the teacher pack's ambient config
//! stories.

use std::path::PathBuf;

use serde::Deserialize;

use crate::error::{ChipLinkError, ChipLinkResult};

#[derive(Debug, Clone, Deserialize)]
pub struct DaemonConfig {
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Path to a TDF fixture (see [`crate::target_descriptor::tdf`]).
    pub target_description_path: PathBuf,

    #[serde(default)]
    pub probe_selector: Option<String>,
}

fn default_listen_address() -> String {
    "127.0.0.1:1234".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl DaemonConfig {
    pub fn from_toml_str(source: &str) -> ChipLinkResult<Self> {
        let mut config: DaemonConfig = toml::from_str(source)
            .map_err(|err| ChipLinkError::Configuration(format!("invalid config: {err}")))?;
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn load(path: &std::path::Path) -> ChipLinkResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|err| {
            ChipLinkError::Configuration(format!("cannot read config '{}': {err}", path.display()))
        })?;
        Self::from_toml_str(&contents)
    }

    /// `CHIPLINK_LISTEN_ADDRESS`, `CHIPLINK_LOG_LEVEL`, `CHIPLINK_PROBE_SELECTOR`
    /// take precedence over file values, matching the usual config-file +
    /// env-override ambient pattern.
    fn apply_env_overrides(&mut self) {
        if let Ok(value) = std::env::var("CHIPLINK_LISTEN_ADDRESS") {
            self.listen_address = value;
        }
        if let Ok(value) = std::env::var("CHIPLINK_LOG_LEVEL") {
            self.log_level = value;
        }
        if let Ok(value) = std::env::var("CHIPLINK_PROBE_SELECTOR") {
            self.probe_selector = Some(value);
        }
    }
}

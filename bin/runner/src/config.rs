//! Runner configuration.
//!
//! Loaded via the `config` crate from `AUTOMATION__*` environment variables,
//! for example `AUTOMATION__STATE_PATH` or `AUTOMATION__ENGINE__TRIGGER_POLICY`.

use automation_engine::EngineConfig;
use serde::Deserialize;
use std::path::PathBuf;

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "AUTOMATION";

/// Runner configuration composed from library configs.
#[derive(Debug, Deserialize)]
pub struct RunnerConfig {
    /// JSON file holding an array of schedule definitions to register.
    #[serde(default)]
    pub definitions_path: Option<PathBuf>,

    /// Where engine state is persisted.
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,

    /// Engine configuration.
    #[serde(default)]
    pub engine: EngineConfig,
}

fn default_state_path() -> PathBuf {
    PathBuf::from("automation-state.json")
}

impl RunnerConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is present but invalid.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        Self::from_source(config::Environment::with_prefix(ENV_PREFIX))
    }

    fn from_source(source: config::Environment) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(source.separator("__").try_parsing(true))
            .build()?
            .try_deserialize()
    }
}

//! Engine settings.
//!
//! Read from `config/asset_workflow.toml` when present, then overridden by
//! `ASSET_WORKFLOW__*` environment variables (`ASSET_WORKFLOW__MATCHER__MIN_NAME_LEN=4`).
use anyhow::Context;
use config::{Config, Environment, File};
use serde::Deserialize;

pub const CONFIG_FILE: &str = "config/asset_workflow.toml";
pub const ENV_PREFIX: &str = "ASSET_WORKFLOW";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub db_path: String,
    pub matcher: MatcherConfig,
}

/// Knobs for duplicate detection of reported consumables.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    pub match_model: bool,
    pub match_specifications: bool,
    // shorter names only match exactly
    pub min_name_len: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            db_path: "data/asset_workflow.db".to_string(),
            matcher: MatcherConfig::default(),
        }
    }
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            match_model: true,
            match_specifications: true,
            min_name_len: 3,
        }
    }
}

impl EngineConfig {
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(CONFIG_FILE)
    }

    pub fn load_from(path: &str) -> anyhow::Result<Self> {
        let settings = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("failed to read engine configuration from {path}"))?;

        settings
            .try_deserialize::<EngineConfig>()
            .context("engine configuration is malformed")
    }
}

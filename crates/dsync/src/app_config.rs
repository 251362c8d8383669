//! 🔧 App Configuration: two accounts, some knobs, and the rules of the sync.
//!
//! 📡 Sources, merged by Figment:
//! - environment variables prefixed `DSYNC_`, nested with `__`
//!   (`DSYNC_SOURCE__API_KEY`, `DSYNC_SYNC__FILTER_OPERATOR`, ...)
//! - an optional TOML file, which wins on conflicts
//!
//! 🦆 The duck would like you to stop committing API keys. The duck has seen your git log.

use std::path::{Path, PathBuf};

use anyhow::Context;
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::Deserialize;
use tracing::info;

use crate::client::ConnectionConfig;
use crate::errors::EngineError;
use crate::filters::FilterSet;
use crate::resources::ResourceBackend;

/// 📦 Everything a run needs to know about itself.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub source: ConnectionConfig,
    pub destination: ConnectionConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

/// 🎛️ How hard we lean on the API.
#[derive(Debug, Deserialize, Clone)]
pub struct RuntimeConfig {
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            http_timeout_secs: default_http_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

fn default_max_workers() -> usize {
    10
}

fn default_http_timeout_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    10
}

/// 🎯 What to sync, and where to remember it.
#[derive(Debug, Deserialize, Clone)]
pub struct SyncConfig {
    /// Resource types, in the order they are processed.
    #[serde(default = "default_resources")]
    pub resources: Vec<String>,
    /// `Type=..;Name=..;Value=..;Operator=..` expressions.
    #[serde(default)]
    pub filters: Vec<String>,
    /// `OR` or `AND`, applied to filters of the same type.
    #[serde(default = "default_filter_operator")]
    pub filter_operator: String,
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
    /// Delete destination objects that left the source.
    #[serde(default)]
    pub cleanup: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            resources: default_resources(),
            filters: Vec::new(),
            filter_operator: default_filter_operator(),
            state_dir: default_state_dir(),
            cleanup: false,
        }
    }
}

fn default_resources() -> Vec<String> {
    ResourceBackend::all_names()
        .into_iter()
        .map(str::to_string)
        .collect()
}

fn default_filter_operator() -> String {
    "OR".to_string()
}

fn default_state_dir() -> PathBuf {
    PathBuf::from("resources")
}

impl SyncConfig {
    /// 🎭 The configured types as adapters. Unknown names are an error, not a shrug.
    pub fn backends(&self) -> Result<Vec<ResourceBackend>, EngineError> {
        self.resources
            .iter()
            .map(|name| ResourceBackend::from_name(name.trim()))
            .collect()
    }

    pub fn filter_set(&self) -> Result<FilterSet, EngineError> {
        FilterSet::parse(&self.filters, &self.filter_operator)
    }
}

/// 🚀 Load the config from `DSYNC_*` env vars and, if given, a TOML file.
///
/// Resource names and filter expressions are checked here so a typo fails the
/// run before anything talks to the network.
pub fn load_config(config_file_name: Option<&Path>) -> anyhow::Result<AppConfig> {
    info!(
        "🔧 Loading configuration: {:#?}",
        config_file_name.unwrap_or(Path::new(""))
    );

    let config = Figment::new().merge(Env::prefixed("DSYNC_").split("__"));
    let config = match config_file_name {
        Some(file_name) => config.merge(Toml::file(file_name)),
        None => config,
    };

    let context_msg = match config_file_name {
        Some(path) => format!(
            "💀 Failed to parse configuration from file '{}' and environment variables (DSYNC_*)",
            path.display()
        ),
        None => "💀 Failed to parse configuration from environment variables (DSYNC_*). \
                 No file was provided, so this one's all on the environment."
            .to_string(),
    };

    let app_config: AppConfig = config.extract().context(context_msg)?;
    app_config
        .sync
        .backends()
        .context("💀 sync.resources names a resource type dsync doesn't know")?;
    app_config
        .sync
        .filter_set()
        .context("💀 sync.filters or sync.filter_operator is malformed")?;
    Ok(app_config)
}

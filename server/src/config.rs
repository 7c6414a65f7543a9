use anyhow::{Context, Result};
use serde::Deserialize;

use crate::baseline::BaselineSettings;
use crate::registry::ALL_CAPABILITIES;

/// Environment variable naming the capabilities to instantiate, as a
/// JSON array of factory ids. Overrides the config file list.
pub const CAPABILITIES_ENV: &str = "FLOW_CAPABILITIES";

/// Application configuration loaded from a TOML file or defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Capabilities to instantiate at startup.
    #[serde(default = "default_capabilities")]
    pub capabilities: Vec<String>,

    /// Flow store capacity, in records.
    #[serde(default = "default_store_capacity")]
    pub store_capacity: usize,

    /// Latency monitor defaults.
    #[serde(default)]
    pub monitor: MonitorConfig,

    /// Baseline anomaly capability defaults.
    #[serde(default)]
    pub baseline: BaselineSettings,
}

/// Initial latency monitor parameters (all runtime-adjustable later).
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_threshold_ms")]
    pub threshold_ms: f64,

    #[serde(default = "default_window_seconds")]
    pub window_seconds: u64,

    #[serde(default = "default_min_samples")]
    pub min_samples: usize,

    #[serde(default = "default_cooldown_seconds")]
    pub cooldown_seconds: u64,
}

fn default_capabilities() -> Vec<String> {
    ALL_CAPABILITIES.iter().map(|s| s.to_string()).collect()
}

fn default_store_capacity() -> usize {
    crate::store::DEFAULT_CAPACITY
}

fn default_threshold_ms() -> f64 {
    150.0
}

fn default_window_seconds() -> u64 {
    300
}

fn default_min_samples() -> usize {
    5
}

fn default_cooldown_seconds() -> u64 {
    120
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            threshold_ms: default_threshold_ms(),
            window_seconds: default_window_seconds(),
            min_samples: default_min_samples(),
            cooldown_seconds: default_cooldown_seconds(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            capabilities: default_capabilities(),
            store_capacity: default_store_capacity(),
            monitor: MonitorConfig::default(),
            baseline: BaselineSettings::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {path}"))?;
        let config: AppConfig = toml::de::from_str(&contents)
            .with_context(|| format!("failed to parse config file {path}"))?;
        Ok(config)
    }
}

/// Resolve the capability list: `FLOW_CAPABILITIES` when set, else the
/// config file's list (which defaults to every known capability).
pub fn capability_ids(config: &AppConfig) -> Result<Vec<String>> {
    match std::env::var(CAPABILITIES_ENV) {
        Ok(raw) => serde_json::from_str(&raw).with_context(|| {
            format!("{CAPABILITIES_ENV} must be a JSON array of capability names")
        }),
        Err(_) => Ok(config.capabilities.clone()),
    }
}

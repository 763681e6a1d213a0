use std::path::PathBuf;

use anyhow::Result;
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the daemon admin API, used by the CLI commands.
    pub api_url: Option<String>,
    pub daemon: Option<DaemonConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default = "default_http_addr")]
    pub http_addr: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub store: StoreConfig,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
            log_level: default_log_level(),
            store: StoreConfig::default(),
        }
    }
}

/// Where the daemon keeps its documents: data-source descriptors, the fleet
/// inventory it reads, and the node properties it writes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_data_sources_file")]
    pub data_sources_file: String,
    #[serde(default = "default_inventory_file")]
    pub inventory_file: String,
    #[serde(default = "default_properties_file")]
    pub properties_file: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_sources_file: default_data_sources_file(),
            inventory_file: default_inventory_file(),
            properties_file: default_properties_file(),
        }
    }
}

fn default_http_addr() -> String {
    "127.0.0.1:9440".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}

fn state_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("~/.config"))
        .join("stoker")
}

fn default_data_sources_file() -> String {
    state_dir().join("data_sources.json").to_string_lossy().to_string()
}
fn default_inventory_file() -> String {
    state_dir().join("inventory.json").to_string_lossy().to_string()
}
fn default_properties_file() -> String {
    state_dir().join("properties.json").to_string_lossy().to_string()
}

// ── Config file paths ──────────────────────────────────────

fn system_config_path() -> PathBuf {
    PathBuf::from("/etc/stoker/config.yaml")
}

fn user_config_path() -> PathBuf {
    state_dir().join("config.yaml")
}

fn local_config_path() -> PathBuf {
    PathBuf::from(".stoker.yaml")
}

// ── Figment loading ────────────────────────────────────────

/// Build the figment provider chain:
/// defaults → system YAML → env vars → user YAML → local YAML
fn figment() -> Figment {
    Figment::from(Serialized::defaults(Config::default()))
        .merge(Yaml::file(system_config_path()))
        .merge(Env::prefixed("STOKER_").split("__"))
        .merge(Yaml::file(user_config_path()))
        .merge(Yaml::file(local_config_path()))
}

/// Load config from the full figment chain.
pub fn load() -> Result<Config> {
    figment()
        .extract()
        .map_err(|e| anyhow::anyhow!("config error: {}", e))
}

/// Load config with an additional YAML file merged on top.
pub fn load_with_path(path: &str) -> Result<Config> {
    figment()
        .merge(Yaml::file(path))
        .extract()
        .map_err(|e| anyhow::anyhow!("config error: {}", e))
}

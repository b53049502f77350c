use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log file path mapped to its format tag
    pub files: BTreeMap<PathBuf, String>,
    #[serde(default)]
    pub follow_files: bool,
    #[serde(default = "default_files_must_exist")]
    pub files_must_exist: bool,
    #[serde(default)]
    pub drop_before_start: bool,
    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    pub storage: StorageConfig,
}

fn default_files_must_exist() -> bool {
    true
}

fn default_poll_interval() -> Duration {
    Duration::from_millis(100)
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    /// Connection target: a database file path, or `:memory:`
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default = "default_collection")]
    pub collection: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
}

fn default_database() -> String {
    "logs_converter".to_string()
}

fn default_collection() -> String {
    "logs".to_string()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    DuckDb,
    Memory,
}

impl StorageBackend {
    pub fn name(&self) -> &'static str {
        match self {
            StorageBackend::DuckDb => "duckdb",
            StorageBackend::Memory => "memory",
        }
    }
}

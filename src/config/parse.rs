use super::types::*;
use crate::config::{expand_env_vars, expand_tilde, ENV_VAR_PATTERN};
use crate::storage::duckdb::is_identifier;
use regex::Regex;
use std::path::Path;
use thiserror::Error;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("validation failed:\n{}", .0.join("\n"))]
    ValidationList(Vec<String>),

    #[error("validation failed: {0}")]
    Validation(String),
}

pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let yaml_string = std::fs::read_to_string(path).map_err(|e| {
        ConfigError::Io(std::io::Error::new(
            e.kind(),
            format!("failed to read config file '{}': {}", path.display(), e),
        ))
    })?;

    parse_config(&yaml_string)
}

/// Parse and validate config from YAML text
pub fn parse_config(yaml: &str) -> Result<Config, ConfigError> {
    let yaml_string = expand_env_vars(yaml);
    check_unexpanded_vars(&yaml_string)?;

    let mut config: Config = serde_yaml::from_str(&yaml_string)?;
    expand_paths(&mut config);
    validate_config(&config)?;

    Ok(config)
}

/// Fail with the names of any `$env{VAR}` references left unexpanded
fn check_unexpanded_vars(yaml_string: &str) -> Result<(), ConfigError> {
    let re = Regex::new(ENV_VAR_PATTERN).expect("env var pattern is valid");
    let mut unexpanded_vars: Vec<&str> = re
        .captures_iter(yaml_string)
        .filter_map(|cap| cap.get(1).map(|m| m.as_str()))
        .collect();

    if unexpanded_vars.is_empty() {
        return Ok(());
    }

    unexpanded_vars.sort();
    unexpanded_vars.dedup();

    Err(ConfigError::Validation(format!(
        "environment variables are not set: {}",
        unexpanded_vars.join(", ")
    )))
}

fn expand_paths(config: &mut Config) {
    config.files = std::mem::take(&mut config.files)
        .into_iter()
        .map(|(path, format)| (expand_tilde(&path), format))
        .collect();

    if config.storage.backend == StorageBackend::DuckDb && config.storage.url != ":memory:" {
        config.storage.url = expand_tilde(Path::new(&config.storage.url))
            .to_string_lossy()
            .to_string();
    }
}

/// Format tags are deliberately not checked here: an unknown tag is
/// reported for each line of that file when it is parsed.
fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let mut errors = Vec::new();

    if config.files.is_empty() {
        errors.push("files must list at least one log file".to_string());
    }

    for (path, format) in &config.files {
        if path.as_os_str().is_empty() {
            errors.push("files: path cannot be empty".to_string());
        }
        if format.trim().is_empty() {
            errors.push(format!(
                "files '{}': format tag cannot be empty",
                path.display()
            ));
        }
    }

    if config.poll_interval.is_zero() {
        errors.push("poll_interval must be greater than zero".to_string());
    }

    if !LOG_LEVELS.contains(&config.log_level.to_lowercase().as_str()) {
        errors.push(format!(
            "log_level '{}' is not one of: {}",
            config.log_level,
            LOG_LEVELS.join(", ")
        ));
    }

    validate_storage(&config.storage, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationList(errors))
    }
}

fn validate_storage(storage: &StorageConfig, errors: &mut Vec<String>) {
    if storage.backend != StorageBackend::DuckDb {
        return;
    }

    if storage.url.is_empty() {
        errors.push("storage.url is required for the duckdb backend".to_string());
    }

    for (field, value) in [
        ("storage.database", &storage.database),
        ("storage.collection", &storage.collection),
    ] {
        if !is_identifier(value) {
            errors.push(format!(
                "{} '{}' must start with a letter or underscore and contain only letters, digits and underscores",
                field, value
            ));
        }
    }
}

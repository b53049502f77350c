use crate::source::timestamp::LogFormat;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A parsed log line travelling from a watcher to the aggregator.
///
/// Records carry no identifier; storage assigns one when it persists its
/// own copy and hands the id back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    #[serde(rename = "log_time")]
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "log_msg")]
    pub message: String,
    #[serde(rename = "file_name")]
    pub source_file: PathBuf,
    #[serde(rename = "log_format")]
    pub format: LogFormat,
}

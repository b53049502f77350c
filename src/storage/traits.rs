use crate::source::record::Record;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier assigned by a repository when it persists a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordId(pub Uuid);

impl RecordId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A record as the repository holds it: its own copy plus the assigned id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: RecordId,
    #[serde(flatten)]
    pub record: Record,
}

/// Storage capability the aggregator writes through.
///
/// Implementations never mutate the record they are given and never panic
/// on unsupported operations; they return [`StorageError::Unsupported`].
#[async_trait]
pub trait Repository: Send {
    /// Persist a copy of `record` under a fresh id
    async fn store(&mut self, record: &Record) -> Result<RecordId, StorageError>;

    async fn fetch(&mut self, id: RecordId) -> Result<Option<StoredRecord>, StorageError>;

    /// Replace the record stored under `id`
    async fn update(&mut self, id: RecordId, record: &Record) -> Result<(), StorageError>;

    async fn delete(&mut self, id: RecordId) -> Result<(), StorageError>;

    /// Remove every stored record. Does nothing unless `confirm` is true.
    async fn drop_collection(&mut self, confirm: bool) -> Result<(), StorageError>;

    /// Release the underlying connection. Later calls fail with `Closed`.
    async fn close(&mut self) -> Result<(), StorageError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(String),

    #[error("record {0} not found")]
    NotFound(RecordId),

    #[error("operation not supported by {backend} storage: {operation}")]
    Unsupported {
        backend: &'static str,
        operation: &'static str,
    },

    #[error("repository connection is closed")]
    Closed,

    #[error("invalid storage configuration: {0}")]
    Config(String),
}

impl From<duckdb::Error> for StorageError {
    fn from(err: duckdb::Error) -> Self {
        StorageError::Database(err.to_string())
    }
}

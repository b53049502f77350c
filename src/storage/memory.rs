use super::traits::{RecordId, Repository, StorageError, StoredRecord};
use crate::source::record::Record;
use async_trait::async_trait;
use std::collections::HashMap;
use tracing::{debug, info};

/// Repository that keeps records in process memory.
///
/// Useful for dry runs where nothing should be written anywhere.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    records: HashMap<RecordId, Record>,
    closed: bool,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn ensure_open(&self) -> Result<(), StorageError> {
        if self.closed {
            Err(StorageError::Closed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn store(&mut self, record: &Record) -> Result<RecordId, StorageError> {
        self.ensure_open()?;
        let id = RecordId::new();
        self.records.insert(id, record.clone());
        debug!(id = %id, "Stored record in memory");
        Ok(id)
    }

    async fn fetch(&mut self, id: RecordId) -> Result<Option<StoredRecord>, StorageError> {
        self.ensure_open()?;
        Ok(self.records.get(&id).map(|record| StoredRecord {
            id,
            record: record.clone(),
        }))
    }

    async fn update(&mut self, id: RecordId, record: &Record) -> Result<(), StorageError> {
        self.ensure_open()?;
        match self.records.get_mut(&id) {
            Some(existing) => {
                *existing = record.clone();
                Ok(())
            }
            None => Err(StorageError::NotFound(id)),
        }
    }

    async fn delete(&mut self, id: RecordId) -> Result<(), StorageError> {
        self.ensure_open()?;
        self.records
            .remove(&id)
            .map(|_| ())
            .ok_or(StorageError::NotFound(id))
    }

    async fn drop_collection(&mut self, confirm: bool) -> Result<(), StorageError> {
        self.ensure_open()?;
        if confirm {
            info!(count = self.records.len(), "Dropping in-memory records");
            self.records.clear();
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), StorageError> {
        self.ensure_open()?;
        self.closed = true;
        Ok(())
    }
}

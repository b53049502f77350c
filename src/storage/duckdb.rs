use super::traits::{RecordId, Repository, StorageError, StoredRecord};
use crate::source::record::Record;
use crate::source::timestamp::LogFormat;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use duckdb::Connection;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Location of the record table inside a DuckDB database
#[derive(Debug, Clone)]
struct Table {
    schema: String,
    name: String,
}

impl Table {
    fn qualified(&self) -> String {
        format!("\"{}\".\"{}\"", self.schema, self.name)
    }
}

/// Whether `name` can be spliced into SQL as an identifier
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// DuckDB implementation of the Repository trait.
///
/// Records live in one table (the collection) inside one schema (the
/// database). `:memory:` opens a throwaway in-memory database.
pub struct DuckDbRepository {
    conn: Arc<Mutex<Option<Connection>>>,
    table: Table,
}

impl DuckDbRepository {
    pub fn open(url: &str, database: &str, collection: &str) -> Result<Self, StorageError> {
        for name in [database, collection] {
            if !is_identifier(name) {
                return Err(StorageError::Config(format!(
                    "'{}' is not a valid database or collection name",
                    name
                )));
            }
        }

        let conn = if url == ":memory:" {
            Connection::open_in_memory()?
        } else {
            let path = PathBuf::from(url);
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StorageError::Config(format!(
                        "cannot create directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
            Connection::open(path)?
        };

        Ok(Self {
            conn: Arc::new(Mutex::new(Some(conn))),
            table: Table {
                schema: database.to_string(),
                name: collection.to_string(),
            },
        })
    }

    /// Create an in-memory DuckDB repository (for testing)
    pub fn in_memory(database: &str, collection: &str) -> Result<Self, StorageError> {
        Self::open(":memory:", database, collection)
    }

    pub async fn init_schema(&self) -> Result<(), StorageError> {
        self.with_conn(|conn, table| {
            conn.execute_batch(&format!(
                "CREATE SCHEMA IF NOT EXISTS \"{schema}\";
                 CREATE TABLE IF NOT EXISTS {table} (
                    id UUID PRIMARY KEY,
                    log_time TIMESTAMPTZ NOT NULL,
                    log_msg VARCHAR NOT NULL,
                    file_name VARCHAR NOT NULL,
                    log_format VARCHAR NOT NULL,
                    ingestion_time TIMESTAMPTZ NOT NULL
                 );",
                schema = table.schema,
                table = table.qualified(),
            ))?;
            Ok(())
        })
        .await
    }

    /// Number of stored records
    pub async fn count(&self) -> Result<usize, StorageError> {
        self.with_conn(|conn, table| {
            let count: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM {}", table.qualified()),
                [],
                |row| row.get(0),
            )?;
            Ok(count as usize)
        })
        .await
    }

    /// Run `f` against the open connection on the blocking pool
    async fn with_conn<T, F>(&self, f: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection, &Table) -> Result<T, StorageError> + Send + 'static,
    {
        let conn = self.conn.clone();
        let table = self.table.clone();

        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| StorageError::Database("connection lock poisoned".to_string()))?;
            let conn = guard.as_ref().ok_or(StorageError::Closed)?;
            f(conn, &table)
        })
        .await
        .map_err(|e| StorageError::Database(format!("Task join error: {}", e)))?
    }
}

fn conversion_error(column: usize, message: &str) -> duckdb::Error {
    duckdb::Error::FromSqlConversionFailure(
        column,
        duckdb::types::Type::Text,
        Box::new(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            message.to_string(),
        )),
    )
}

fn row_to_stored(row: &duckdb::Row<'_>) -> Result<StoredRecord, duckdb::Error> {
    let id = Uuid::parse_str(&row.get::<_, String>(0)?)
        .map_err(|e| duckdb::Error::FromSqlConversionFailure(0, duckdb::types::Type::Text, Box::new(e)))?;
    let timestamp = DateTime::<Utc>::from_timestamp_micros(row.get::<_, i64>(1)?)
        .ok_or_else(|| conversion_error(1, "invalid timestamp"))?;
    let format = LogFormat::from_tag(&row.get::<_, String>(4)?)
        .map_err(|e| conversion_error(4, &e.to_string()))?;

    Ok(StoredRecord {
        id: RecordId(id),
        record: Record {
            timestamp,
            message: row.get(2)?,
            source_file: PathBuf::from(row.get::<_, String>(3)?),
            format,
        },
    })
}

#[async_trait]
impl Repository for DuckDbRepository {
    async fn store(&mut self, record: &Record) -> Result<RecordId, StorageError> {
        let id = RecordId::new();
        let record = record.clone();

        self.with_conn(move |conn, table| {
            conn.execute(
                &format!(
                    "INSERT INTO {} (id, log_time, log_msg, file_name, log_format, ingestion_time)
                     VALUES (?, to_timestamp(? / 1000000.0), ?, ?, ?, to_timestamp(? / 1000000.0))",
                    table.qualified()
                ),
                duckdb::params![
                    id.to_string(),
                    record.timestamp.timestamp_micros(),
                    record.message,
                    record.source_file.to_string_lossy().to_string(),
                    record.format.tag(),
                    Utc::now().timestamp_micros(),
                ],
            )?;
            Ok(())
        })
        .await?;

        tracing::debug!(id = %id, "Stored record");
        Ok(id)
    }

    async fn fetch(&mut self, id: RecordId) -> Result<Option<StoredRecord>, StorageError> {
        self.with_conn(move |conn, table| {
            let mut stmt = conn.prepare(&format!(
                "SELECT CAST(id AS VARCHAR), epoch_us(log_time), log_msg, file_name, log_format
                 FROM {} WHERE id = ?",
                table.qualified()
            ))?;
            let mut rows = stmt.query(duckdb::params![id.to_string()])?;

            match rows.next()? {
                Some(row) => Ok(Some(row_to_stored(row)?)),
                None => Ok(None),
            }
        })
        .await
    }

    async fn update(&mut self, id: RecordId, record: &Record) -> Result<(), StorageError> {
        let record = record.clone();

        let changed = self
            .with_conn(move |conn, table| {
                let changed = conn.execute(
                    &format!(
                        "UPDATE {} SET log_time = to_timestamp(? / 1000000.0), log_msg = ?,
                         file_name = ?, log_format = ? WHERE id = ?",
                        table.qualified()
                    ),
                    duckdb::params![
                        record.timestamp.timestamp_micros(),
                        record.message,
                        record.source_file.to_string_lossy().to_string(),
                        record.format.tag(),
                        id.to_string(),
                    ],
                )?;
                Ok(changed)
            })
            .await?;

        if changed == 0 {
            return Err(StorageError::NotFound(id));
        }
        Ok(())
    }

    async fn delete(&mut self, id: RecordId) -> Result<(), StorageError> {
        let changed = self
            .with_conn(move |conn, table| {
                let changed = conn.execute(
                    &format!("DELETE FROM {} WHERE id = ?", table.qualified()),
                    duckdb::params![id.to_string()],
                )?;
                Ok(changed)
            })
            .await?;

        if changed == 0 {
            return Err(StorageError::NotFound(id));
        }
        Ok(())
    }

    async fn drop_collection(&mut self, confirm: bool) -> Result<(), StorageError> {
        if !confirm {
            return Ok(());
        }

        tracing::warn!(
            schema = %self.table.schema,
            collection = %self.table.name,
            "Dropping stored records"
        );
        self.with_conn(|conn, table| {
            conn.execute(&format!("DROP TABLE IF EXISTS {}", table.qualified()), [])?;
            Ok(())
        })
        .await?;

        self.init_schema().await
    }

    async fn close(&mut self) -> Result<(), StorageError> {
        tracing::info!("Closing storage connection");
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| StorageError::Database("connection lock poisoned".to_string()))?;
            let conn = guard.take().ok_or(StorageError::Closed)?;
            conn.close().map_err(|(_, e)| StorageError::from(e))
        })
        .await
        .map_err(|e| StorageError::Database(format!("Task join error: {}", e)))?
    }
}

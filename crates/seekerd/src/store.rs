use rusqlite::{params, Connection, OptionalExtension, Row};
use seeker_core::{CorpusRecord, CorpusStore, RecordMetadata, StoreError};
use serde::Deserialize;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;

const SCHEMA_V1: &str = "
CREATE TABLE IF NOT EXISTS records (
    id TEXT PRIMARY KEY,
    name TEXT,
    age TEXT,
    gender TEXT,
    last_seen_location TEXT,
    date_missing TEXT,
    contact_number TEXT,
    description TEXT,
    image TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_records_created ON records(created_at DESC);
";

const SELECT_COLUMNS: &str = "SELECT id, name, age, gender, last_seen_location, date_missing, contact_number, description, image, created_at FROM records";

#[derive(Error, Debug)]
pub enum RecordStoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("failed to create database directory: {0}")]
    Io(#[from] std::io::Error),
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("database lock poisoned")]
    Poisoned,
}

/// Fields supplied when adding a record. Every descriptive field is required.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NewRecord {
    pub name: String,
    pub age: String,
    pub gender: String,
    pub last_seen_location: String,
    pub date_missing: String,
    pub contact_number: String,
    pub description: String,
    /// Stored image string (`data:<mime>;base64,...`); a record may be added without one.
    pub image: Option<String>,
}

impl NewRecord {
    pub fn validate(&self) -> Result<(), RecordStoreError> {
        let fields = [
            ("name", &self.name),
            ("age", &self.age),
            ("gender", &self.gender),
            ("lastSeenLocation", &self.last_seen_location),
            ("dateMissing", &self.date_missing),
            ("contactNumber", &self.contact_number),
            ("description", &self.description),
        ];
        match fields.iter().find(|(_, value)| value.trim().is_empty()) {
            Some((field, _)) => Err(RecordStoreError::MissingField(*field)),
            None => Ok(()),
        }
    }
}

/// SQLite-backed record store shared by the D-Bus service and the engine thread.
pub struct RecordStore {
    conn: Mutex<Connection>,
}

impl RecordStore {
    pub fn open(path: &Path) -> Result<Self, RecordStoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, RecordStoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, RecordStoreError> {
        conn.execute_batch(SCHEMA_V1)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, RecordStoreError> {
        self.conn.lock().map_err(|_| RecordStoreError::Poisoned)
    }

    /// Insert a validated record; returns its new id.
    pub fn insert(&self, record: &NewRecord) -> Result<String, RecordStoreError> {
        record.validate()?;
        let id = uuid::Uuid::new_v4().to_string();
        let created_at = chrono::Utc::now().to_rfc3339();
        self.conn()?.execute(
            "INSERT INTO records (id, name, age, gender, last_seen_location, date_missing, contact_number, description, image, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                id,
                record.name.trim(),
                record.age.trim(),
                record.gender.trim(),
                record.last_seen_location.trim(),
                record.date_missing.trim(),
                record.contact_number.trim(),
                record.description.trim(),
                record.image.as_deref().unwrap_or(""),
                created_at,
            ],
        )?;
        tracing::info!(id = %id, name = %record.name, "record added");
        Ok(id)
    }

    /// All records, newest first.
    pub fn list(&self) -> Result<Vec<CorpusRecord>, RecordStoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!("{SELECT_COLUMNS} ORDER BY created_at DESC, rowid DESC"))?;
        let records = stmt.query_map([], row_to_record)?.collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    pub fn get(&self, id: &str) -> Result<Option<CorpusRecord>, RecordStoreError> {
        let conn = self.conn()?;
        let record = conn
            .query_row(&format!("{SELECT_COLUMNS} WHERE id = ?1"), params![id], row_to_record)
            .optional()?;
        Ok(record)
    }

    /// Delete a record. Returns `false` when no record had that id.
    pub fn remove(&self, id: &str) -> Result<bool, RecordStoreError> {
        let count = self.conn()?.execute("DELETE FROM records WHERE id = ?1", params![id])?;
        if count > 0 {
            tracing::info!(id, "record removed");
        }
        Ok(count > 0)
    }

    pub fn count(&self) -> Result<usize, RecordStoreError> {
        let count: i64 = self.conn()?.query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

/// Nullable descriptive columns resolve to defaults here, at the store boundary.
fn row_to_record(row: &Row<'_>) -> rusqlite::Result<CorpusRecord> {
    Ok(CorpusRecord {
        id: Some(row.get(0)?),
        metadata: RecordMetadata::from_optional(
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
            row.get(5)?,
            row.get(6)?,
            row.get(7)?,
        ),
        image: row.get::<_, Option<String>>(8)?.unwrap_or_default(),
        created_at: row.get(9)?,
    })
}

impl CorpusStore for RecordStore {
    fn records(&self) -> Result<Vec<CorpusRecord>, StoreError> {
        self.list().map_err(|err| StoreError::Unavailable(err.to_string()))
    }
}

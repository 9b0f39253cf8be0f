//! Root blob persistence in the `kv_store` table

use std::path::Path;
use std::sync::{Mutex, PoisonError};

use rusqlite::{params, Connection, OptionalExtension};

use super::Database;
use crate::error::Result;
use crate::store::BlobStorage;
use crate::util::unix_millis_now;

/// `SQLite` implementation of [`BlobStorage`]
///
/// Each root key is one row; the whole serialized blob is its value.
pub struct SqliteBlobStorage {
    conn: Mutex<Connection>,
}

impl SqliteBlobStorage {
    /// Open (or create) the database file at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::from_database(Database::open(path)?))
    }

    /// Open an in-memory database (useful for testing)
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::from_database(Database::open_in_memory()?))
    }

    pub fn from_database(database: Database) -> Self {
        Self {
            conn: Mutex::new(database.into_connection()),
        }
    }
}

impl BlobStorage for SqliteBlobStorage {
    fn load(&self, root_key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let value = conn
            .query_row(
                "SELECT value FROM kv_store WHERE key = ?",
                params![root_key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn save(&self, root_key: &str, blob: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        conn.execute(
            "INSERT INTO kv_store (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![root_key, blob, unix_millis_now()],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_load_missing_key() {
        let storage = SqliteBlobStorage::open_in_memory().unwrap();
        assert_eq!(storage.load("dashboard-storage").unwrap(), None);
    }

    #[test]
    fn test_save_overwrites_existing_blob() {
        let storage = SqliteBlobStorage::open_in_memory().unwrap();
        storage.save("root", "{\"a\":1}").unwrap();
        storage.save("root", "{\"a\":2}").unwrap();
        assert_eq!(storage.load("root").unwrap().as_deref(), Some("{\"a\":2}"));
    }

    #[test]
    fn test_blob_survives_reopen() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("deskboard.db");
        {
            let storage = SqliteBlobStorage::open(&path).unwrap();
            storage.save("root", "{}").unwrap();
        }
        let reopened = SqliteBlobStorage::open(&path).unwrap();
        assert_eq!(reopened.load("root").unwrap().as_deref(), Some("{}"));
    }
}

//! Storage layer (C1): durable relational store for memories, rules, code
//! entities, refs, and file hashes, with FTS5 full-text fallback.
//!
//! Single-writer/many-reader semantics: one `Mutex<Connection>` opened in
//! read-write mode backs all writes (always inside a transaction), a second
//! `Mutex<Connection>` opened read-only backs concurrent reads. Both share
//! the same WAL file, so readers never block the writer and vice versa.

mod migrations;
pub mod queries;

pub use migrations::{apply_migrations, get_current_version, Migration, MIGRATIONS};
pub use queries::{FtsHit, MemoryFilter};

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rusqlite::Connection;

use crate::error::{EngineError, Result};

pub struct Storage {
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
    #[allow(dead_code)]
    db_path: PathBuf,
}

impl Storage {
    /// Open (creating if absent) the SQLite database at `db_path`, apply
    /// pending migrations on the writer connection, and return a ready
    /// `Storage`. `busy_timeout_ms` matches spec.md's bounded busy-wait.
    pub fn open(db_path: &Path, busy_timeout_ms: u32) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let writer = Connection::open(db_path)?;
        Self::configure_connection(&writer, busy_timeout_ms)?;
        apply_migrations(&writer)?;

        let reader = Connection::open(db_path)?;
        Self::configure_connection(&reader, busy_timeout_ms)?;
        reader.pragma_update(None, "query_only", true)?;

        Ok(Storage {
            writer: Mutex::new(writer),
            reader: Mutex::new(reader),
            db_path: db_path.to_path_buf(),
        })
    }

    fn configure_connection(conn: &Connection, busy_timeout_ms: u32) -> rusqlite::Result<()> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "foreign_keys", true)?;
        conn.pragma_update(None, "busy_timeout", busy_timeout_ms)?;
        conn.pragma_update(None, "cache_size", -8000)?;
        conn.pragma_update(None, "mmap_size", 134_217_728i64)?;
        Ok(())
    }

    /// Run `f` inside a single write transaction; commits on `Ok`, rolls
    /// back on `Err`. This is the one path through which every mutating
    /// C6/C7/C8 operation writes, giving the all-or-nothing semantics
    /// spec.md §5 requires for `remember`.
    pub fn with_write_tx<T>(
        &self,
        f: impl FnOnce(&rusqlite::Transaction) -> Result<T>,
    ) -> Result<T> {
        let mut conn = self
            .writer
            .lock()
            .map_err(|_| EngineError::fatal("writer mutex poisoned"))?;
        let tx = conn.transaction()?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }

    pub fn with_reader<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self
            .reader
            .lock()
            .map_err(|_| EngineError::fatal("reader mutex poisoned"))?;
        f(&conn)
    }

    pub fn with_writer_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self
            .writer
            .lock()
            .map_err(|_| EngineError::fatal("writer mutex poisoned"))?;
        f(&conn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_temp() -> (TempDir, Storage) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.db");
        let storage = Storage::open(&path, 5000).unwrap();
        (dir, storage)
    }

    #[test]
    fn opens_and_migrates_fresh_database() {
        let (_dir, storage) = open_temp();
        let version = storage.with_reader(|c| Ok(get_current_version(c)?)).unwrap();
        assert_eq!(version, MIGRATIONS.last().unwrap().version);
    }

    #[test]
    fn write_tx_rolls_back_on_error() {
        let (_dir, storage) = open_temp();
        let result: Result<()> = storage.with_write_tx(|tx| {
            tx.execute(
                "INSERT INTO memories (category, content, tags, keywords, created_at, updated_at)
                 VALUES ('decision', 'x', '[]', '[]', datetime('now'), datetime('now'))",
                [],
            )?;
            Err(EngineError::validation("force rollback"))
        });
        assert!(result.is_err());
        let count: i64 = storage
            .with_reader(|c| Ok(c.query_row("SELECT COUNT(*) FROM memories", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(count, 0);
    }
}

//! SQLite backend for profile records
//!
//! Ids are SQLite rowids, so uniqueness and monotonic assignment come from
//! the engine's own write serialization. The insert uses `RETURNING id` so
//! the generated key is obtained in the same statement, never by a separate
//! read after the write.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use super::{Backend, RecordMeta};
use crate::error::Error;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS profiles (
    id INTEGER PRIMARY KEY,
    data BLOB NOT NULL,
    created INTEGER NOT NULL
)";

/// SQLite-backed profile storage.
pub struct SqliteBackend {
    conn: Mutex<Connection>,
}

impl SqliteBackend {
    /// Open (or create) the database at `path` and ensure the schema exists.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref();
        info!(path = %path.display(), "opening profile database");

        let conn = Connection::open(path)?;

        // WAL keeps concurrent readers cheap; the busy timeout matches the
        // original deployment's 5s.
        conn.execute_batch(
            "PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA busy_timeout=5000;",
        )?;

        Self::init(conn)
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self, Error> {
        debug!("opening in-memory profile database");
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, Error> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        // A poisoned lock only means some caller panicked mid-call; the
        // connection itself is still usable.
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Backend for SqliteBackend {
    fn insert(&self, data: &[u8], created: i64) -> Result<u64, Error> {
        let conn = self.lock();
        let id: i64 = conn.query_row(
            "INSERT INTO profiles (data, created) VALUES (?1, ?2) RETURNING id",
            params![data, created],
            |row| row.get(0),
        )?;
        Ok(id as u64)
    }

    fn fetch(&self, id: u64) -> Result<Option<Vec<u8>>, Error> {
        // Rowids are signed; ids beyond i64::MAX are never assigned.
        let Ok(id) = i64::try_from(id) else {
            return Ok(None);
        };
        let conn = self.lock();
        let data = conn
            .query_row(
                "SELECT data FROM profiles WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(data)
    }

    fn recent(&self, limit: u32) -> Result<Vec<RecordMeta>, Error> {
        let conn = self.lock();
        // length(data) keeps the payload out of the result set. Statement
        // and rows are scoped to this call, so nothing stays open on either
        // the success or the error path.
        let mut stmt = conn.prepare(
            "SELECT id, length(data), created FROM profiles ORDER BY created DESC LIMIT ?1",
        )?;
        let metas = stmt
            .query_map(params![limit], |row| {
                Ok(RecordMeta {
                    id: row.get::<_, i64>(0)? as u64,
                    size: row.get::<_, i64>(1)? as u64,
                    created: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(metas)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ProfileStore;
    use std::sync::Arc;

    fn store() -> (Arc<SqliteBackend>, ProfileStore) {
        let backend = Arc::new(SqliteBackend::open_in_memory().unwrap());
        let store = ProfileStore::new(backend.clone());
        (backend, store)
    }

    #[test]
    fn test_insert_returns_increasing_ids() {
        let (backend, _) = store();
        let a = backend.insert(b"one", 1).unwrap();
        let b = backend.insert(b"two", 2).unwrap();
        assert!(b > a);
    }

    #[test]
    fn test_save_load_round_trip() {
        let (_, store) = store();
        let data: Vec<u8> = (0..255).collect();
        let name = store.save(&data).unwrap();
        assert_eq!(store.load(&name).unwrap(), data);
    }

    #[test]
    fn test_fetch_unknown_id_is_none() {
        let (backend, _) = store();
        assert!(backend.fetch(12345).unwrap().is_none());
        assert!(backend.fetch(u64::MAX).unwrap().is_none());
    }

    #[test]
    fn test_load_unknown_name_is_not_found() {
        let (_, store) = store();
        let err = store.load(&crate::codec::encode(999)).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_recent_orders_by_created_descending() {
        let (backend, store) = store();
        let id1 = backend.insert(b"oldest", 100).unwrap();
        let id2 = backend.insert(b"middle", 200).unwrap();
        let id3 = backend.insert(b"newest", 300).unwrap();

        let entries = store.recent(2).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, crate::codec::encode(id3));
        assert_eq!(entries[1].name, crate::codec::encode(id2));
        assert!(!entries
            .iter()
            .any(|e| e.name == crate::codec::encode(id1)));
    }

    #[test]
    fn test_recent_reports_sizes_without_payloads() {
        let (backend, _) = store();
        backend.insert(&vec![0u8; 4096], 1).unwrap();
        let metas = backend.recent(10).unwrap();
        assert_eq!(metas.len(), 1);
        assert_eq!(metas[0].size, 4096);
    }

    #[test]
    fn test_recent_limit_zero_is_empty() {
        let (backend, store) = store();
        backend.insert(b"data", 1).unwrap();
        assert!(store.recent(0).unwrap().is_empty());
    }

    #[test]
    fn test_blob_data_is_stored_verbatim() {
        let (_, store) = store();
        // Bytes that would trip naive string handling: NULs, quotes, UTF-8
        // fragments.
        let data = b"\x00\x01'\"\xff\xfe gzip\x1f\x8b".to_vec();
        let name = store.save(&data).unwrap();
        assert_eq!(store.load(&name).unwrap(), data);
    }
}

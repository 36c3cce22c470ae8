//! Profile storage over an atomic-insert backend
//!
//! The store never persists names: a name is always derived on demand from
//! the backend-assigned id via [`crate::codec`]. Id uniqueness and ordering
//! come entirely from the backend's own insert-returning-id primitive, so
//! the store does no locking of its own and is safe for unbounded concurrent
//! use.
//!
//! The [`Backend`] trait is the seam: the SQLite implementation lives in
//! [`sqlite`], and tests substitute mocks to pin down access patterns (for
//! example, that listings never transfer blob payloads).

pub mod sqlite;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::codec;
use crate::error::Error;

/// Listing metadata for one record: everything except the payload.
#[derive(Debug, Clone, Copy)]
pub struct RecordMeta {
    pub id: u64,
    /// Blob length in bytes, computed backend-side without reading the blob.
    pub size: u64,
    /// Insertion time, epoch seconds.
    pub created: i64,
}

/// The storage capability the store needs: atomic insert returning the
/// generated id, point fetch, and payload-free recent listing.
pub trait Backend: Send + Sync {
    /// Insert a record and return its backend-assigned id, atomically.
    fn insert(&self, data: &[u8], created: i64) -> Result<u64, Error>;

    /// Point lookup by id. `None` when no record has that id.
    fn fetch(&self, id: u64) -> Result<Option<Vec<u8>>, Error>;

    /// Up to `limit` records ordered by `created` descending. Equal
    /// timestamps fall back to the backend's natural result order, which is
    /// unspecified. Must not transfer blob payloads.
    fn recent(&self, limit: u32) -> Result<Vec<RecordMeta>, Error>;
}

/// Listing entry handed to callers, with the id already rendered as a name.
#[derive(Debug, Clone, Serialize)]
pub struct RecentEntry {
    pub name: String,
    pub size: u64,
    pub created: DateTime<Utc>,
}

/// Blob store keyed by short names.
#[derive(Clone)]
pub struct ProfileStore {
    backend: Arc<dyn Backend>,
}

impl ProfileStore {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    /// Persist `data` and return the name of the new record.
    pub fn save(&self, data: &[u8]) -> Result<String, Error> {
        let id = self.backend.insert(data, Utc::now().timestamp())?;
        Ok(codec::encode(id))
    }

    /// Fetch the blob stored under `name`.
    ///
    /// Malformed names fail with [`Error::Encoding`]; well-formed names with
    /// no matching record fail with [`Error::NotFound`].
    pub fn load(&self, name: &str) -> Result<Vec<u8>, Error> {
        let id = codec::decode(name)?;
        self.backend
            .fetch(id)?
            .ok_or_else(|| Error::NotFound(name.to_string()))
    }

    /// Up to `n` records, most recent first.
    pub fn recent(&self, n: u32) -> Result<Vec<RecentEntry>, Error> {
        let metas = self.backend.recent(n)?;
        Ok(metas
            .into_iter()
            .map(|meta| RecentEntry {
                name: codec::encode(meta.id),
                size: meta.size,
                created: DateTime::from_timestamp(meta.created, 0).unwrap_or_default(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// In-memory backend that counts which operations ran.
    #[derive(Default)]
    struct CountingBackend {
        records: Mutex<Vec<(u64, Vec<u8>, i64)>>,
        next_id: AtomicU64,
        fetches: AtomicUsize,
    }

    impl Backend for CountingBackend {
        fn insert(&self, data: &[u8], created: i64) -> Result<u64, Error> {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
            self.records
                .lock()
                .unwrap()
                .push((id, data.to_vec(), created));
            Ok(id)
        }

        fn fetch(&self, id: u64) -> Result<Option<Vec<u8>>, Error> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .records
                .lock()
                .unwrap()
                .iter()
                .find(|(rid, _, _)| *rid == id)
                .map(|(_, data, _)| data.clone()))
        }

        fn recent(&self, limit: u32) -> Result<Vec<RecordMeta>, Error> {
            let records = self.records.lock().unwrap();
            let mut metas: Vec<RecordMeta> = records
                .iter()
                .map(|(id, data, created)| RecordMeta {
                    id: *id,
                    size: data.len() as u64,
                    created: *created,
                })
                .collect();
            metas.sort_by(|a, b| b.created.cmp(&a.created));
            metas.truncate(limit as usize);
            Ok(metas)
        }
    }

    #[test]
    fn test_save_load_round_trip() {
        let store = ProfileStore::new(Arc::new(CountingBackend::default()));
        let data = b"pprof snapshot bytes".to_vec();
        let name = store.save(&data).unwrap();
        assert_eq!(store.load(&name).unwrap(), data);
    }

    #[test]
    fn test_load_unknown_name_is_not_found() {
        let store = ProfileStore::new(Arc::new(CountingBackend::default()));
        // "00" is well-formed (id 0) but never inserted.
        let err = store.load("00").unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_load_malformed_name_is_encoding_error() {
        let store = ProfileStore::new(Arc::new(CountingBackend::default()));
        let err = store.load("not/a/name").unwrap_err();
        assert!(matches!(err, Error::Encoding(_)));
    }

    #[test]
    fn test_recent_never_fetches_payloads() {
        let backend = Arc::new(CountingBackend::default());
        let store = ProfileStore::new(backend.clone());
        for i in 0..5u8 {
            store.save(&vec![i; 1000]).unwrap();
        }

        let entries = store.recent(3).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(backend.fetches.load(Ordering::SeqCst), 0);
        for entry in &entries {
            assert_eq!(entry.size, 1000);
        }
    }

    #[test]
    fn test_recent_names_resolve_back_to_records() {
        let store = ProfileStore::new(Arc::new(CountingBackend::default()));
        let name = store.save(b"only one").unwrap();
        let entries = store.recent(10).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, name);
        assert_eq!(store.load(&entries[0].name).unwrap(), b"only one");
    }
}

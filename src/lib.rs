//! profbin - a durable host for profiling snapshots
//!
//! Accepts opaque profile blobs over HTTP, stores them in SQLite, and hands
//! back a short, reversible, URL-safe name.
//!
//! ## Architecture
//!
//! - **codec**: pure bijection between a `u64` id and a short base-32 name
//! - **store**: blob persistence over an atomic insert-returning-id backend
//! - **listener**: startup socket acquisition, inherited descriptors first
//! - **http**: thin upload/fetch/listing glue over the store
//!
//! Names are never persisted; they are re-derived from the backend-assigned
//! id on every request. Rendering the profile format, TLS termination, and
//! the viewer UI all live outside this crate.

pub mod codec;
pub mod config;
pub mod error;
pub mod http;
pub mod listener;
pub mod store;

// Re-exports
pub use config::Config;
pub use error::Error;
pub use http::HttpServer;
pub use listener::{acquire, ActivationEnv, ListenerPair};
pub use store::sqlite::SqliteBackend;
pub use store::{Backend, ProfileStore, RecentEntry, RecordMeta};

//! Error types for profbin

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid name: {0:?}")]
    Encoding(String),

    #[error("profile not found: {0}")]
    NotFound(String),

    #[error("backend error: {0}")]
    Backend(#[from] rusqlite::Error),

    #[error("listener error: {0}")]
    Listener(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WatchtowerError {
    #[error("Fetch error: {0}")]
    Fetch(String),

    #[error("Action failed: {0}")]
    Action(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures of the persistent status store.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("could not create {}: {source}", .path.display())]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("database schema version {found} is newer than supported version {supported}")]
    UnsupportedVersion { found: i64, supported: i64 },
}

pub type Result<T> = std::result::Result<T, WatchtowerError>;

//! Settings store errors

use std::fmt;

pub type StorageResult<T> = Result<T, StorageError>;

/// Failures of a [`SettingsStore`](super::SettingsStore) backend
///
/// None of these are fatal for polling: a cycle that cannot persist its
/// outcome is skipped and retried on the next tick.
#[derive(Debug)]
pub enum StorageError {
    /// The backing database could not be opened
    Unavailable(String),

    /// A read or write against the store failed
    Query(String),

    /// The schema could not be brought up to date
    Migration(String),

    /// Stored settings could not be encoded or decoded
    Encoding(String),

    Io(std::io::Error),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::Unavailable(msg) => write!(f, "settings store unavailable: {msg}"),
            StorageError::Query(msg) => write!(f, "settings store query failed: {msg}"),
            StorageError::Migration(msg) => write!(f, "settings store migration failed: {msg}"),
            StorageError::Encoding(msg) => write!(f, "malformed stored settings: {msg}"),
            StorageError::Io(err) => write!(f, "settings store I/O error: {err}"),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StorageError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err)
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Encoding(err.to_string())
    }
}

#[cfg(feature = "storage-sqlite")]
impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(io) => StorageError::Io(io),
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                StorageError::Unavailable(err.to_string())
            }
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                StorageError::Encoding(err.to_string())
            }
            _ => StorageError::Query(err.to_string()),
        }
    }
}

#[cfg(feature = "storage-sqlite")]
impl From<sqlx::migrate::MigrateError> for StorageError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        StorageError::Migration(err.to_string())
    }
}

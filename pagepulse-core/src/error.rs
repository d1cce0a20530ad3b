//! Error types for pagepulse-core

use thiserror::Error;

/// Main error type for the pagepulse-core library
#[derive(Error, Debug)]
pub enum Error {
    /// SQLite-backed storage error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Durable storage refused a read or write
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Beacon could not be submitted
    #[error("transport error: {0}")]
    Transport(String),

    /// An event was composed before a session existed
    #[error("session not ready")]
    SessionNotReady,

    /// The tracker has been torn down
    #[error("tracker destroyed")]
    Destroyed,
}

/// Result type alias for pagepulse-core
pub type Result<T> = std::result::Result<T, Error>;

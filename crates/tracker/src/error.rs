//! Error types for the tracker crate

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during state store operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The live store file is missing when a snapshot is requested
    #[error("state store not found: {}", .0.display())]
    StoreNotFound(PathBuf),

    /// A stored row could not be interpreted
    #[error("invalid tracked record: {0}")]
    InvalidRecord(String),
}

/// Result type for state store operations
pub type Result<T> = std::result::Result<T, Error>;

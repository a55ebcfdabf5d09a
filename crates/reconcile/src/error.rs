//! Error types for the reconcile crate

use std::path::PathBuf;
use thiserror::Error;

use crate::types::CommandKind;

/// Errors that abort a reconciliation pass
#[derive(Error, Debug)]
pub enum Error {
    /// Tracked-state store failure
    #[error(transparent)]
    Store(#[from] tracker::Error),

    /// The user refused privilege escalation
    #[error("elevated privileges were not granted for '{command}'")]
    PrivilegeNotGranted { command: CommandKind },

    /// The elevation probe itself failed
    #[error("failed to acquire elevated privileges: {0}")]
    Elevation(#[source] anyhow::Error),

    /// The hostname could not be read while evaluating a host conditional
    #[error("failed to read hostname: {0}")]
    Hostname(#[source] std::io::Error),

    /// No registered backend with this name
    #[error("unknown backend '{0}'")]
    UnknownBackend(String),

    /// A backend contract call failed
    #[error("{backend}: {source}")]
    Backend {
        backend: String,
        #[source]
        source: anyhow::Error,
    },

    /// The manifest document could not be parsed
    #[error("failed to parse manifest {}: {source}", .path.display())]
    ManifestParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// The manifest document could not be encoded
    #[error("failed to encode manifest: {0}")]
    ManifestEncode(#[from] toml::ser::Error),

    /// The manifest document could not be read or written
    #[error("manifest {}: {source}", .path.display())]
    ManifestIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The confirmation provider failed
    #[error("confirmation failed: {0}")]
    Confirm(#[source] anyhow::Error),
}

impl Error {
    /// Wrap a backend contract error with the backend's name
    pub fn backend(backend: &str, source: anyhow::Error) -> Self {
        Self::Backend {
            backend: backend.to_string(),
            source,
        }
    }
}

/// Result type for reconcile operations
pub type Result<T> = std::result::Result<T, Error>;

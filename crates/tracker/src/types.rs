//! Data types for the tracker crate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// The two kinds of objects a backend declares
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    /// Something the user wants installed
    Package,
    /// An ancillary resource a package needs (repository, signing key, ...)
    Dependency,
}

impl ObjectKind {
    /// Both kinds, in the order a sync pass applies them
    pub const ALL: [ObjectKind; 2] = [ObjectKind::Dependency, ObjectKind::Package];

    /// Table holding tracked records of this kind
    pub(crate) fn table(self) -> &'static str {
        match self {
            ObjectKind::Package => "package_state",
            ObjectKind::Dependency => "dependency_state",
        }
    }

    /// Plural label for display
    pub fn plural(self) -> &'static str {
        match self {
            ObjectKind::Package => "packages",
            ObjectKind::Dependency => "dependencies",
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectKind::Package => write!(f, "package"),
            ObjectKind::Dependency => write!(f, "dependency"),
        }
    }
}

/// A durable marker: this object was declared as of the last completed sync
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedRecord {
    /// Backend that owns the object
    pub backend: String,
    /// Package or dependency
    pub kind: ObjectKind,
    /// Canonical identity reported by the backend
    pub full_name: String,
    /// When the record was first inserted
    pub created_at: DateTime<Utc>,
}

/// Outcome of replacing a backend's tracked set
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateDiff {
    /// Rows inserted
    pub inserted: usize,
    /// Rows deleted
    pub deleted: usize,
}

impl StateDiff {
    /// Whether the update touched any rows
    pub fn is_empty(&self) -> bool {
        self.inserted == 0 && self.deleted == 0
    }
}

/// Result of a rotation call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RotationResult {
    /// The snapshot written, if any
    pub created: Option<PathBuf>,
    /// Snapshots deleted to respect the retention bound
    pub pruned: Vec<PathBuf>,
}

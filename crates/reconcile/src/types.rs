//! Core types for reconciliation

use serde::{Deserialize, Serialize};
use std::fmt;

pub use tracker::ObjectKind;

/// The command a backend is being asked to serve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandKind {
    Install,
    Remove,
    List,
    Sync,
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandKind::Install => write!(f, "install"),
            CommandKind::Remove => write!(f, "remove"),
            CommandKind::List => write!(f, "list"),
            CommandKind::Sync => write!(f, "sync"),
        }
    }
}

/// A fact about an installed object, reported fresh by a backend
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveItem {
    /// Human-facing name
    pub name: String,
    /// Canonical identity, matched against declared and tracked names
    pub full_name: String,
    /// Version currently installed, if the kind has one
    pub installed_version: Option<String>,
    /// Newest version the backend can install, if known
    pub latest_version: Option<String>,
    /// Source repository, for backends that have one
    pub repo_url: Option<String>,
}

impl LiveItem {
    /// Item with no version concept
    pub fn unversioned(name: impl Into<String>, full_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            full_name: full_name.into(),
            ..Self::default()
        }
    }

    /// Item with an installed version and optionally a newer one
    pub fn versioned(
        name: impl Into<String>,
        full_name: impl Into<String>,
        installed: impl Into<String>,
        latest: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            full_name: full_name.into(),
            installed_version: Some(installed.into()),
            latest_version: latest,
            repo_url: None,
        }
    }

    /// Whether the backend reports a different version than installed
    ///
    /// Plain string inequality: backends may report commit hashes or build
    /// tags that are not ordered.
    pub fn is_outdated(&self) -> bool {
        match (&self.installed_version, &self.latest_version) {
            (Some(installed), Some(latest)) => installed != latest,
            _ => false,
        }
    }
}

/// Four-way classification of one backend's objects of one kind
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusBuckets {
    /// Declared and installed at the latest version
    pub synced: Vec<LiveItem>,
    /// Declared and installed, but the backend offers a different version
    pub updated: Vec<LiveItem>,
    /// Declared but not installed
    pub missing: Vec<LiveItem>,
    /// Tracked last time, still installed, no longer declared
    pub removed: Vec<LiveItem>,
}

impl StatusBuckets {
    /// Number of objects needing a backend call
    pub fn change_count(&self) -> usize {
        self.updated.len() + self.missing.len() + self.removed.len()
    }

    /// Whether any backend call is needed
    pub fn has_changes(&self) -> bool {
        self.change_count() > 0
    }

    /// Next tracked set: everything currently declared, never the removed items
    pub fn projected(&self) -> Vec<String> {
        self.synced
            .iter()
            .chain(&self.updated)
            .chain(&self.missing)
            .map(|item| item.full_name.clone())
            .collect()
    }
}

/// Classified status of one backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendStatus {
    /// Backend name
    pub backend: String,
    /// Backend icon, for display
    pub icon: String,
    /// Dependency buckets
    pub dependencies: StatusBuckets,
    /// Package buckets
    pub packages: StatusBuckets,
}

impl BackendStatus {
    /// Buckets for one object kind
    pub fn buckets(&self, kind: ObjectKind) -> &StatusBuckets {
        match kind {
            ObjectKind::Package => &self.packages,
            ObjectKind::Dependency => &self.dependencies,
        }
    }

    /// Number of objects needing a backend call, both kinds
    pub fn change_count(&self) -> usize {
        self.dependencies.change_count() + self.packages.change_count()
    }
}

/// Aggregated status of every selected backend
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatus {
    pub backends: Vec<BackendStatus>,
}

impl SyncStatus {
    /// Total objects needing a backend call across all backends
    pub fn change_count(&self) -> usize {
        self.backends.iter().map(BackendStatus::change_count).sum()
    }

    /// Whether any backend call is needed
    pub fn has_changes(&self) -> bool {
        self.change_count() > 0
    }

    /// Per-bucket totals across all backends and kinds
    pub fn totals(&self) -> StatusTotals {
        let mut totals = StatusTotals::default();
        for status in &self.backends {
            for kind in ObjectKind::ALL {
                let buckets = status.buckets(kind);
                totals.synced += buckets.synced.len();
                totals.updated += buckets.updated.len();
                totals.missing += buckets.missing.len();
                totals.removed += buckets.removed.len();
            }
        }
        totals
    }
}

/// Bucket counts for a summary line
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusTotals {
    pub synced: usize,
    pub updated: usize,
    pub missing: usize,
    pub removed: usize,
}

/// Where an install places the new objects in the manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallTarget {
    /// The unconditional section
    Global,
    /// The conditional for the running machine's hostname
    Host,
    /// The conditional for a named group
    Group(String),
}

/// Outcome of a sync pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Nothing drifted; tracked state persisted without backend calls
    NoChanges,
    /// The user declined; nothing applied or persisted
    Declined,
    /// Changes applied; per-item warnings from the backends
    Applied { warnings: Vec<String> },
}

impl SyncOutcome {
    /// Warnings produced by backends during the pass
    pub fn warnings(&self) -> &[String] {
        match self {
            SyncOutcome::Applied { warnings } => warnings,
            _ => &[],
        }
    }
}

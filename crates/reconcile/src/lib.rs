//! # Reconcile
//!
//! Declarative, multi-backend package reconciliation.
//!
//! A manifest declares which packages and dependencies each backend should
//! hold, globally or per host/group. The engine resolves that declaration,
//! compares it against what the backend reports as installed and what was
//! declared on the previous run, then applies and records the difference.
//!
//! ## Core Concepts
//!
//! - **Manifest**: per-backend `global` and `conditional` sections
//! - **Resolver**: flattens a manifest into the declared set for this machine
//! - **Backend**: capability interface each package manager implements
//! - **Status**: Synced / Updated / Missing / Removed classification
//! - **Engine**: privilege gate, probe, confirm, apply-and-persist, rotate
//!
//! ## Provider Traits
//!
//! - [`ConfirmCallback`]: asks the user before changes are applied
//! - [`ElevationProbe`]: forces credential entry once, up front
//! - [`Reporter`]: receives progress and status for display
//!
//! These keep the engine free of terminal and sudo specifics.

pub mod backend;
pub mod context;
pub mod engine;
pub mod error;
pub mod manifest;
pub mod privilege;
pub mod resolver;
pub mod status;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

// Re-export main types at crate root
pub use backend::{Accepted, Backend, BoxedBackend, Registry};
pub use context::{AutoConfirm, AutoDecline, ConfirmCallback, ElevationProbe, NoReport, Reporter};
pub use engine::{Engine, EngineOptions, InstallReport, RemoveReport};
pub use error::{Error, Result};
pub use manifest::{BackendManifest, ConditionKind, Conditional, Manifest, Section};
pub use privilege::PrivilegeCoordinator;
pub use resolver::{DesiredSet, HostInfo, Resolver, StaticHost, SystemHost};
pub use status::classify;
pub use types::{
    BackendStatus, CommandKind, InstallTarget, LiveItem, ObjectKind, StatusBuckets, StatusTotals,
    SyncOutcome, SyncStatus,
};

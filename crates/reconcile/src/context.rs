//! Interaction provider traits
//!
//! These let the engine ask for confirmation, force credential entry and
//! report progress without depending on a terminal or on sudo.

use anyhow::Result;

use crate::types::{ObjectKind, SyncStatus};

/// Confirmation callback for user interaction
pub trait ConfirmCallback: Send {
    /// Ask the user to confirm an action
    ///
    /// # Returns
    /// `true` if the user confirmed, `false` otherwise
    fn confirm(&mut self, prompt: &str) -> Result<bool>;
}

/// Auto-confirm callback (always returns true)
pub struct AutoConfirm;

impl ConfirmCallback for AutoConfirm {
    fn confirm(&mut self, _prompt: &str) -> Result<bool> {
        Ok(true)
    }
}

/// Auto-decline callback (always returns false)
pub struct AutoDecline;

impl ConfirmCallback for AutoDecline {
    fn confirm(&mut self, _prompt: &str) -> Result<bool> {
        Ok(false)
    }
}

/// Runs a no-op elevated command so credentials are entered up front
pub trait ElevationProbe: Send + Sync {
    fn elevate(&self) -> Result<()>;
}

/// Progress and status reporting during a pass
pub trait Reporter: Send + Sync {
    /// A backend's probe phase started
    fn probe_started(&self, _backend: &str) {}

    /// A backend's probe phase finished
    fn probe_finished(&self, _backend: &str, _ok: bool) {}

    /// Classification is complete and about to be acted on
    fn status(&self, _status: &SyncStatus) {}

    /// A backend is about to apply one kind
    fn applying(&self, _backend: &str, _kind: ObjectKind) {}

    /// A non-fatal problem
    fn warning(&self, _message: &str) {}
}

/// Reporter that discards everything
pub struct NoReport;

impl Reporter for NoReport {}

//! One-time privilege escalation across backends

use std::sync::OnceLock;

use crate::backend::BoxedBackend;
use crate::context::{ConfirmCallback, ElevationProbe};
use crate::error::{Error, Result};
use crate::types::CommandKind;

/// Decides whether a command needs sudo and asks for it at most once
///
/// After the first grant every later call in the process short-circuits.
pub struct PrivilegeCoordinator {
    granted: OnceLock<()>,
    assume_yes: bool,
    probe: Box<dyn ElevationProbe>,
}

impl PrivilegeCoordinator {
    pub fn new(probe: Box<dyn ElevationProbe>, assume_yes: bool) -> Self {
        Self {
            granted: OnceLock::new(),
            assume_yes,
            probe,
        }
    }

    /// Whether escalation was already granted in this process
    pub fn is_granted(&self) -> bool {
        self.granted.get().is_some()
    }

    /// Ensure the backends that need sudo for `command` may proceed
    ///
    /// Returns `false` when the user declines; callers must abort.
    pub fn must_escalate(
        &self,
        backends: &[BoxedBackend],
        command: CommandKind,
        confirm: &mut dyn ConfirmCallback,
    ) -> Result<bool> {
        if self.is_granted() {
            return Ok(true);
        }

        let needing: Vec<&str> = backends
            .iter()
            .filter(|b| b.needs_sudo(command))
            .map(|b| b.name())
            .collect();
        if needing.is_empty() {
            return Ok(true);
        }

        if !self.assume_yes {
            let prompt = format!(
                "{} need{} sudo for '{command}'. Continue?",
                needing.join(", "),
                if needing.len() == 1 { "s" } else { "" }
            );
            if !confirm.confirm(&prompt).map_err(Error::Confirm)? {
                log::info!("Sudo declined for '{command}'");
                return Ok(false);
            }
        }

        self.probe.elevate().map_err(Error::Elevation)?;
        log::debug!("Sudo granted for {}", needing.join(", "));
        let _ = self.granted.set(());
        Ok(true)
    }

    /// Like [`Self::must_escalate`], but a refusal is an error
    pub fn require(
        &self,
        backends: &[BoxedBackend],
        command: CommandKind,
        confirm: &mut dyn ConfirmCallback,
    ) -> Result<()> {
        if self.must_escalate(backends, command, confirm)? {
            Ok(())
        } else {
            Err(Error::PrivilegeNotGranted { command })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{AutoConfirm, AutoDecline};
    use crate::testing::{MockBackend, RecordingConfirm, ScriptedProbe};
    use std::sync::Arc;

    fn backends() -> Vec<BoxedBackend> {
        vec![
            Arc::new(MockBackend::new("dnf").with_sudo(&[CommandKind::Sync])) as BoxedBackend,
            Arc::new(MockBackend::new("flatpak")),
        ]
    }

    #[test]
    fn test_no_sudo_needed_skips_prompt() {
        let probe = ScriptedProbe::ok();
        let coordinator = PrivilegeCoordinator::new(Box::new(probe.clone()), false);
        let mut confirm = RecordingConfirm::answering(false);

        assert!(coordinator
            .must_escalate(&backends(), CommandKind::List, &mut confirm)
            .unwrap());
        assert!(confirm.prompts().is_empty());
        assert_eq!(probe.calls(), 0);
    }

    #[test]
    fn test_prompt_names_backends_and_caches() {
        let probe = ScriptedProbe::ok();
        let coordinator = PrivilegeCoordinator::new(Box::new(probe.clone()), false);
        let mut confirm = RecordingConfirm::answering(true);

        assert!(coordinator
            .must_escalate(&backends(), CommandKind::Sync, &mut confirm)
            .unwrap());
        assert!(coordinator
            .must_escalate(&backends(), CommandKind::Sync, &mut confirm)
            .unwrap());

        let prompts = confirm.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("dnf"));
        assert!(!prompts[0].contains("flatpak"));
        assert_eq!(probe.calls(), 1);
    }

    #[test]
    fn test_decline_is_not_granted() {
        let probe = ScriptedProbe::ok();
        let coordinator = PrivilegeCoordinator::new(Box::new(probe.clone()), false);

        assert!(!coordinator
            .must_escalate(&backends(), CommandKind::Sync, &mut AutoDecline)
            .unwrap());
        assert!(!coordinator.is_granted());
        assert_eq!(probe.calls(), 0);

        let err = coordinator
            .require(&backends(), CommandKind::Sync, &mut AutoDecline)
            .unwrap_err();
        assert!(matches!(err, Error::PrivilegeNotGranted { command: CommandKind::Sync }));
    }

    #[test]
    fn test_assume_yes_skips_prompt_but_checks_elevation() {
        let probe = ScriptedProbe::ok();
        let coordinator = PrivilegeCoordinator::new(Box::new(probe.clone()), true);
        let mut confirm = RecordingConfirm::answering(false);

        assert!(coordinator
            .must_escalate(&backends(), CommandKind::Sync, &mut confirm)
            .unwrap());
        assert!(confirm.prompts().is_empty());
        assert_eq!(probe.calls(), 1);
    }

    #[test]
    fn test_elevation_failure_is_fatal() {
        let coordinator = PrivilegeCoordinator::new(Box::new(ScriptedProbe::failing()), false);

        let err = coordinator
            .must_escalate(&backends(), CommandKind::Sync, &mut AutoConfirm)
            .unwrap_err();
        assert!(matches!(err, Error::Elevation(_)));
        assert!(!coordinator.is_granted());
    }
}

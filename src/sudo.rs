//! Elevated command execution
//!
//! Credentials are validated once per run through [`SudoProbe`], before any
//! backend touches the system. Backends then run privileged commands with
//! [`run`], relying on sudo's cached timestamp.

use anyhow::{Context, Result, bail};
use reconcile::ElevationProbe;
use std::process::Command;

/// Validates sudo credentials up front (`sudo -v`)
pub struct SudoProbe;

impl ElevationProbe for SudoProbe {
    fn elevate(&self) -> Result<()> {
        if is_root() {
            log::debug!("Already root; skipping sudo validation");
            return Ok(());
        }

        let status = Command::new("sudo")
            .args(["-v"])
            .status()
            .context("Failed to execute sudo")?;

        if !status.success() {
            bail!("Failed to acquire sudo privileges");
        }
        Ok(())
    }
}

/// Run a command with sudo and inherit stdio
pub fn run(cmd: &str, args: &[&str]) -> Result<()> {
    if is_root() {
        return crate::runner::run(cmd, args);
    }

    let mut full = vec![cmd];
    full.extend_from_slice(args);
    crate::runner::run("sudo", &full)
}

fn is_root() -> bool {
    nix::unistd::geteuid().is_root()
}

//! Backend contract and registry
//!
//! A backend is one concrete package manager. The engine only ever holds
//! `dyn Backend`; everything a manager knows about its own tooling stays
//! behind this trait.

use anyhow::Result;
use std::sync::Arc;

use crate::error::Error;
use crate::types::{CommandKind, LiveItem, ObjectKind, StatusBuckets};

/// Objects accepted by an add or remove call, plus non-fatal warnings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Accepted {
    pub objects: Vec<String>,
    pub warnings: Vec<String>,
}

/// Capability interface implemented by every package manager
pub trait Backend: Send + Sync {
    /// Unique name used in the manifest, state store and CLI
    fn name(&self) -> &str;

    /// Short glyph shown before each item
    fn icon(&self) -> &str;

    fn short_desc(&self) -> &str;

    fn long_desc(&self) -> &str;

    /// Whether `command` must run with elevated privileges
    fn needs_sudo(&self, command: CommandKind) -> bool;

    /// Probe that the manager's tooling is installed
    fn check_command_available(&self) -> Result<()>;

    /// Probe that the manager's configuration is usable
    fn check_config_valid(&self) -> Result<()>;

    /// Canonical full name for a user-typed package
    fn canonical_package(&self, name: &str) -> String {
        name.to_string()
    }

    /// Canonical full name for a user-typed dependency
    fn canonical_dependency(&self, name: &str) -> String {
        name.to_string()
    }

    /// Display names for declared packages
    fn package_names(&self, packages: &[String]) -> Vec<String> {
        packages.to_vec()
    }

    /// Display names for declared dependencies
    fn dependency_names(&self, dependencies: &[String]) -> Vec<String> {
        dependencies.to_vec()
    }

    /// Completion candidates for `install`
    fn install_valid_args(&self, partial: &str, dependency: bool) -> Result<Vec<String>>;

    /// Validate and normalise newly declared packages
    fn add_packages(&self, packages: &[String]) -> Result<Accepted>;

    /// Validate and normalise newly declared dependencies
    fn add_dependencies(&self, dependencies: &[String]) -> Result<Accepted>;

    /// Installed packages relevant to `wanted` (canonical names)
    ///
    /// Implementations may report more than asked; unmatched items are
    /// ignored by classification.
    fn list_packages(&self, wanted: &[String]) -> Result<Vec<LiveItem>>;

    /// Installed dependencies relevant to `wanted` (canonical names)
    fn list_dependencies(&self, wanted: &[String]) -> Result<Vec<LiveItem>>;

    /// Resolve human-typed names to the manifest entries to drop
    fn remove_packages(&self, all: &[String], to_remove: &[String]) -> Result<Accepted>;

    /// Resolve human-typed names to the manifest entries to drop
    fn remove_dependencies(&self, all: &[String], to_remove: &[String]) -> Result<Accepted>;

    /// Apply package transitions; per-item failures come back as warnings
    fn sync_packages(&self, status: &StatusBuckets) -> Result<Vec<String>>;

    /// Apply dependency transitions; per-item failures come back as warnings
    fn sync_dependencies(&self, status: &StatusBuckets) -> Result<Vec<String>>;
}

/// Kind-dispatching helpers over the contract
pub(crate) trait BackendExt {
    fn canonical(&self, kind: ObjectKind, name: &str) -> String;
    fn display_names(&self, kind: ObjectKind, objects: &[String]) -> Vec<String>;
    fn add(&self, kind: ObjectKind, objects: &[String]) -> Result<Accepted>;
    fn list(&self, kind: ObjectKind, wanted: &[String]) -> Result<Vec<LiveItem>>;
    fn remove(&self, kind: ObjectKind, all: &[String], to_remove: &[String]) -> Result<Accepted>;
    fn sync(&self, kind: ObjectKind, status: &StatusBuckets) -> Result<Vec<String>>;
}

impl<B: Backend + ?Sized> BackendExt for B {
    fn canonical(&self, kind: ObjectKind, name: &str) -> String {
        match kind {
            ObjectKind::Package => self.canonical_package(name),
            ObjectKind::Dependency => self.canonical_dependency(name),
        }
    }

    fn display_names(&self, kind: ObjectKind, objects: &[String]) -> Vec<String> {
        match kind {
            ObjectKind::Package => self.package_names(objects),
            ObjectKind::Dependency => self.dependency_names(objects),
        }
    }

    fn add(&self, kind: ObjectKind, objects: &[String]) -> Result<Accepted> {
        match kind {
            ObjectKind::Package => self.add_packages(objects),
            ObjectKind::Dependency => self.add_dependencies(objects),
        }
    }

    fn list(&self, kind: ObjectKind, wanted: &[String]) -> Result<Vec<LiveItem>> {
        match kind {
            ObjectKind::Package => self.list_packages(wanted),
            ObjectKind::Dependency => self.list_dependencies(wanted),
        }
    }

    fn remove(&self, kind: ObjectKind, all: &[String], to_remove: &[String]) -> Result<Accepted> {
        match kind {
            ObjectKind::Package => self.remove_packages(all, to_remove),
            ObjectKind::Dependency => self.remove_dependencies(all, to_remove),
        }
    }

    fn sync(&self, kind: ObjectKind, status: &StatusBuckets) -> Result<Vec<String>> {
        match kind {
            ObjectKind::Package => self.sync_packages(status),
            ObjectKind::Dependency => self.sync_dependencies(status),
        }
    }
}

/// Shared handle to a backend
pub type BoxedBackend = Arc<dyn Backend>;

/// The set of backends usable for this run
#[derive(Default)]
pub struct Registry {
    backends: Vec<BoxedBackend>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Probe and add a backend
    ///
    /// A backend whose tooling or configuration fails its probe is left out
    /// for the run; the returned warning explains why.
    pub fn register(&mut self, backend: BoxedBackend) -> Option<String> {
        let probe = backend
            .check_command_available()
            .and_then(|()| backend.check_config_valid());

        match probe {
            Ok(()) => {
                log::debug!("Registered backend {}", backend.name());
                self.backends.push(backend);
                None
            }
            Err(e) => {
                let warning = format!("Disabling {} backend: {e:#}", backend.name());
                log::warn!("{warning}");
                Some(warning)
            }
        }
    }

    pub fn names(&self) -> Vec<&str> {
        self.backends.iter().map(|b| b.name()).collect()
    }

    pub fn get(&self, name: &str) -> crate::Result<BoxedBackend> {
        self.backends
            .iter()
            .find(|b| b.name() == name)
            .cloned()
            .ok_or_else(|| Error::UnknownBackend(name.to_string()))
    }

    /// Look up several backends; an empty selection means all of them
    pub fn get_many<S: AsRef<str>>(&self, names: &[S]) -> crate::Result<Vec<BoxedBackend>> {
        if names.is_empty() {
            return Ok(self.all());
        }
        names.iter().map(|n| self.get(n.as_ref())).collect()
    }

    pub fn all(&self) -> Vec<BoxedBackend> {
        self.backends.clone()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}

//! The sync orchestrator and the flows built on it
//!
//! A sync pass runs in phases:
//! 1. gate on privileges for the selected backends
//! 2. resolve manifests and read tracked state (sequential, one connection)
//! 3. list live inventory and classify (parallel, one worker per backend)
//! 4. persist without backend calls, or confirm and apply per backend
//! 5. rotate the state store

use rayon::prelude::*;
use tracker::StateStore;

use crate::backend::{BackendExt, BoxedBackend};
use crate::context::{ConfirmCallback, Reporter};
use crate::error::{Error, Result};
use crate::manifest::{ConditionKind, Manifest};
use crate::privilege::PrivilegeCoordinator;
use crate::resolver::{DesiredSet, Resolver, filter_incoming, filter_outgoing};
use crate::status::classify;
use crate::types::{
    BackendStatus, CommandKind, InstallTarget, ObjectKind, StatusBuckets, SyncOutcome, SyncStatus,
};

/// Engine settings
#[derive(Debug, Clone, Copy)]
pub struct EngineOptions {
    /// Skip the sync confirmation
    pub assume_yes: bool,
    /// Snapshots kept by rotation
    pub rotations: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            assume_yes: false,
            rotations: 3,
        }
    }
}

/// What an install changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    /// Objects written to the manifest
    pub added: Vec<String>,
    /// Duplicate and backend validation warnings
    pub warnings: Vec<String>,
    /// The sync pass that followed
    pub outcome: SyncOutcome,
}

/// What a remove changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoveReport {
    /// Objects dropped from the manifest
    pub removed: Vec<String>,
    /// Absent-object and backend warnings
    pub warnings: Vec<String>,
    /// The sync pass that followed
    pub outcome: SyncOutcome,
}

/// Inputs gathered for one backend before the parallel probe
struct ProbeInput {
    backend: BoxedBackend,
    desired: DesiredSet,
    tracked_dependencies: Vec<String>,
    tracked_packages: Vec<String>,
}

/// Reconciliation engine over one state store
pub struct Engine {
    store: StateStore,
    resolver: Resolver,
    privilege: PrivilegeCoordinator,
    confirm: Box<dyn ConfirmCallback>,
    reporter: Box<dyn Reporter>,
    options: EngineOptions,
}

impl Engine {
    pub fn new(
        store: StateStore,
        resolver: Resolver,
        privilege: PrivilegeCoordinator,
        confirm: Box<dyn ConfirmCallback>,
        reporter: Box<dyn Reporter>,
    ) -> Self {
        Self {
            store,
            resolver,
            privilege,
            confirm,
            reporter,
            options: EngineOptions::default(),
        }
    }

    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    /// Classify the selected backends without changing anything
    pub fn list_status(&mut self, manifest: &Manifest, backends: &[BoxedBackend]) -> Result<SyncStatus> {
        self.privilege
            .require(backends, CommandKind::List, self.confirm.as_mut())?;
        self.probe(manifest, backends)
    }

    /// Run one sync pass over the selected backends
    pub fn sync(&mut self, manifest: &Manifest, backends: &[BoxedBackend]) -> Result<SyncOutcome> {
        self.privilege
            .require(backends, CommandKind::Sync, self.confirm.as_mut())?;

        let status = self.probe(manifest, backends)?;
        self.reporter.status(&status);

        if !status.has_changes() {
            log::info!("No changes; persisting tracked state");
            self.store.with_transaction(|tx| {
                for backend_status in &status.backends {
                    for kind in ObjectKind::ALL {
                        tx.update_state(
                            kind,
                            &backend_status.backend,
                            backend_status.buckets(kind).projected(),
                        )?;
                    }
                }
                Ok::<_, Error>(())
            })?;
            self.rotate()?;
            return Ok(SyncOutcome::NoChanges);
        }

        if !self.options.assume_yes {
            let prompt = format!(
                "{} unsynced change(s) found. Do you want to sync?",
                status.change_count()
            );
            if !self.confirm.confirm(&prompt).map_err(Error::Confirm)? {
                log::info!("Sync declined; tracked state left unchanged");
                self.rotate()?;
                return Ok(SyncOutcome::Declined);
            }
        }

        let mut warnings = Vec::new();
        for (backend, backend_status) in backends.iter().zip(&status.backends) {
            for kind in ObjectKind::ALL {
                warnings.extend(self.apply(backend, kind, backend_status.buckets(kind))?);
            }
        }

        self.rotate()?;
        Ok(SyncOutcome::Applied { warnings })
    }

    /// Declare new objects for one backend and sync it
    ///
    /// The caller saves the manifest afterwards.
    pub fn install(
        &mut self,
        manifest: &mut Manifest,
        backend: &BoxedBackend,
        args: &[String],
        kind: ObjectKind,
        target: InstallTarget,
    ) -> Result<InstallReport> {
        let selected = std::slice::from_ref(backend);
        self.privilege
            .require(selected, CommandKind::Install, self.confirm.as_mut())?;

        let name = backend.name();
        let desired = self.resolver.resolve(&manifest.backend(name))?;
        let (fresh, mut warnings) =
            filter_incoming(args, desired.objects(kind), |n| backend.canonical(kind, n));

        let accepted = if fresh.is_empty() {
            Default::default()
        } else {
            backend
                .add(kind, &fresh)
                .map_err(|e| Error::backend(name, e))?
        };
        warnings.extend(accepted.warnings);
        self.report_warnings(&warnings);

        let added = accepted.objects;
        match target {
            InstallTarget::Global => manifest.add_global(kind, name, &added),
            InstallTarget::Host => {
                let hostname = self.resolver.hostname()?;
                manifest.add_conditional(kind, name, ConditionKind::Host, &hostname, &added);
            }
            InstallTarget::Group(group) => {
                manifest.add_conditional(kind, name, ConditionKind::Group, &group, &added);
            }
        }
        log::info!("Declared {} {} for {name}", added.len(), kind.plural());

        let outcome = self.sync(manifest, selected)?;
        Ok(InstallReport {
            added,
            warnings,
            outcome,
        })
    }

    /// Drop declared objects for one backend and sync it
    ///
    /// Objects are removed from the global section and from every
    /// conditional that matches this machine. The caller saves the manifest
    /// afterwards.
    pub fn remove(
        &mut self,
        manifest: &mut Manifest,
        backend: &BoxedBackend,
        args: &[String],
        kind: ObjectKind,
    ) -> Result<RemoveReport> {
        let selected = std::slice::from_ref(backend);
        self.privilege
            .require(selected, CommandKind::Remove, self.confirm.as_mut())?;

        let name = backend.name();
        let document = manifest.backend(name);
        let desired = self.resolver.resolve(&document)?;
        let declared = desired.objects(kind);

        let (present, mut warnings) =
            filter_outgoing(args, &backend.display_names(kind, declared));

        let resolved = if present.is_empty() {
            Default::default()
        } else {
            backend
                .remove(kind, declared, &present)
                .map_err(|e| Error::backend(name, e))?
        };
        warnings.extend(resolved.warnings);
        self.report_warnings(&warnings);

        let removed = resolved.objects;
        manifest.remove_global(kind, name, &removed);
        for conditional in &document.conditional {
            if self.resolver.matches(conditional)? {
                manifest.remove_conditional(
                    kind,
                    name,
                    conditional.kind,
                    &conditional.value,
                    &removed,
                );
            }
        }
        log::info!("Dropped {} {} for {name}", removed.len(), kind.plural());

        let outcome = self.sync(manifest, selected)?;
        Ok(RemoveReport {
            removed,
            warnings,
            outcome,
        })
    }

    /// Completion candidates for `install`
    pub fn install_candidates(
        &self,
        backend: &BoxedBackend,
        partial: &str,
        kind: ObjectKind,
    ) -> Result<Vec<String>> {
        backend
            .install_valid_args(partial, kind == ObjectKind::Dependency)
            .map_err(|e| Error::backend(backend.name(), e))
    }

    /// Completion candidates for `remove`: declared names starting with `partial`
    pub fn remove_candidates(
        &self,
        manifest: &Manifest,
        backend: &BoxedBackend,
        partial: &str,
        kind: ObjectKind,
    ) -> Result<Vec<String>> {
        let desired = self.resolver.resolve(&manifest.backend(backend.name()))?;
        Ok(backend
            .display_names(kind, desired.objects(kind))
            .into_iter()
            .filter(|name| name.starts_with(partial))
            .collect())
    }

    /// Resolve, read tracked state and classify every selected backend
    fn probe(&self, manifest: &Manifest, backends: &[BoxedBackend]) -> Result<SyncStatus> {
        let mut inputs = Vec::with_capacity(backends.len());
        for backend in backends {
            let name = backend.name();
            inputs.push(ProbeInput {
                backend: backend.clone(),
                desired: self.resolver.resolve(&manifest.backend(name))?,
                tracked_dependencies: self.store.get_dependency_state(name)?,
                tracked_packages: self.store.get_package_state(name)?,
            });
        }

        let reporter = self.reporter.as_ref();
        let statuses = inputs
            .par_iter()
            .map(|input| {
                let name = input.backend.name();
                reporter.probe_started(name);
                let result = probe_backend(input);
                reporter.probe_finished(name, result.is_ok());
                result
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(SyncStatus { backends: statuses })
    }

    /// Apply one kind for one backend inside its own transaction
    ///
    /// A failing backend call rolls back this transaction only; earlier
    /// commits stay.
    fn apply(
        &mut self,
        backend: &BoxedBackend,
        kind: ObjectKind,
        buckets: &StatusBuckets,
    ) -> Result<Vec<String>> {
        let name = backend.name();
        let reporter = self.reporter.as_ref();

        let warnings = self.store.with_transaction(|tx| {
            let warnings = if buckets.has_changes() {
                reporter.applying(name, kind);
                backend
                    .sync(kind, buckets)
                    .map_err(|e| Error::backend(name, e))?
            } else {
                Vec::new()
            };
            tx.update_state(kind, name, buckets.projected())?;
            Ok::<_, Error>(warnings)
        })?;

        for warning in &warnings {
            log::warn!("{name}: {warning}");
            self.reporter.warning(warning);
        }
        Ok(warnings)
    }

    fn rotate(&self) -> Result<()> {
        self.store.rotate(self.options.rotations)?;
        Ok(())
    }

    fn report_warnings(&self, warnings: &[String]) {
        for warning in warnings {
            log::warn!("{warning}");
            self.reporter.warning(warning);
        }
    }
}

fn probe_backend(input: &ProbeInput) -> Result<BackendStatus> {
    let backend = input.backend.as_ref();
    let name = backend.name();

    let mut status = BackendStatus {
        backend: name.to_string(),
        icon: backend.icon().to_string(),
        dependencies: StatusBuckets::default(),
        packages: StatusBuckets::default(),
    };

    for kind in ObjectKind::ALL {
        let (desired, tracked) = match kind {
            ObjectKind::Dependency => (&input.desired.dependencies, &input.tracked_dependencies),
            ObjectKind::Package => (&input.desired.packages, &input.tracked_packages),
        };
        let wanted: Vec<String> = desired
            .iter()
            .map(|d| backend.canonical(kind, d))
            .chain(tracked.iter().cloned())
            .collect();
        let live = backend
            .list(kind, &wanted)
            .map_err(|e| Error::backend(name, e))?;
        let buckets = classify(backend, kind, desired, tracked, &live);
        match kind {
            ObjectKind::Dependency => status.dependencies = buckets,
            ObjectKind::Package => status.packages = buckets,
        }
    }

    Ok(status)
}

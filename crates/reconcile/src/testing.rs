//! In-memory test doubles

use anyhow::{Result, bail};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::backend::{Accepted, Backend};
use crate::context::{ConfirmCallback, ElevationProbe};
use crate::types::{CommandKind, LiveItem, ObjectKind, StatusBuckets};

/// Backend with a mutable fake inventory
///
/// `sync_*` applies the buckets to the inventory, so consecutive passes
/// converge the way a real manager would.
pub struct MockBackend {
    name: String,
    sudo: Vec<CommandKind>,
    available: bool,
    prefix: Option<String>,
    protected: HashSet<String>,
    packages: Mutex<Vec<LiveItem>>,
    dependencies: Mutex<Vec<LiveItem>>,
    failing: Mutex<HashSet<ObjectKind>>,
    item_warnings: bool,
    calls: Mutex<Vec<String>>,
}

impl MockBackend {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            sudo: Vec::new(),
            available: true,
            prefix: None,
            protected: HashSet::new(),
            packages: Mutex::new(Vec::new()),
            dependencies: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
            item_warnings: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    pub fn with_sudo(mut self, commands: &[CommandKind]) -> Self {
        self.sudo = commands.to_vec();
        self
    }

    /// Canonical names carry this prefix, display names drop it
    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.prefix = Some(prefix.to_string());
        self
    }

    pub fn protect(mut self, name: &str) -> Self {
        self.protected.insert(name.to_string());
        self
    }

    /// Every applied item also yields a warning
    pub fn with_item_warnings(mut self) -> Self {
        self.item_warnings = true;
        self
    }

    pub fn with_live(self, kind: ObjectKind, items: Vec<LiveItem>) -> Self {
        *self.inventory(kind).lock().unwrap() = items;
        self
    }

    /// Make `sync_*` for `kind` return an error
    pub fn fail_sync(&self, kind: ObjectKind) {
        self.failing.lock().unwrap().insert(kind);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn sync_calls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.starts_with("sync_"))
            .collect()
    }

    pub fn installed(&self, kind: ObjectKind) -> Vec<String> {
        self.inventory(kind)
            .lock()
            .unwrap()
            .iter()
            .map(|i| i.full_name.clone())
            .collect()
    }

    fn inventory(&self, kind: ObjectKind) -> &Mutex<Vec<LiveItem>> {
        match kind {
            ObjectKind::Package => &self.packages,
            ObjectKind::Dependency => &self.dependencies,
        }
    }

    fn record(&self, call: &str) {
        self.calls.lock().unwrap().push(call.to_string());
    }

    fn canonical(&self, name: &str) -> String {
        match &self.prefix {
            Some(prefix) if !name.starts_with(prefix.as_str()) => format!("{prefix}{name}"),
            _ => name.to_string(),
        }
    }

    fn display(&self, name: &str) -> String {
        match &self.prefix {
            Some(prefix) => name.strip_prefix(prefix.as_str()).unwrap_or(name).to_string(),
            None => name.to_string(),
        }
    }

    fn add(&self, objects: &[String]) -> Accepted {
        let mut accepted = Accepted::default();
        for object in objects {
            if self.protected.contains(object) {
                accepted
                    .warnings
                    .push(format!("'{object}' is managed by the system"));
            } else {
                accepted.objects.push(self.canonical(object));
            }
        }
        accepted
    }

    fn remove(&self, all: &[String], to_remove: &[String]) -> Accepted {
        let wanted: HashSet<String> = to_remove.iter().map(|n| self.canonical(n)).collect();
        Accepted {
            objects: all
                .iter()
                .filter(|a| wanted.contains(&self.canonical(a)))
                .cloned()
                .collect(),
            warnings: Vec::new(),
        }
    }

    fn apply(&self, kind: ObjectKind, status: &StatusBuckets) -> Result<Vec<String>> {
        self.record(&format!("sync_{}", kind.plural()));
        if self.failing.lock().unwrap().contains(&kind) {
            bail!("{} transaction aborted", kind.plural());
        }

        let mut inventory = self.inventory(kind).lock().unwrap();
        let mut warnings = Vec::new();

        for item in &status.removed {
            inventory.retain(|i| i.full_name != item.full_name);
        }
        for item in &status.updated {
            if let Some(live) = inventory.iter_mut().find(|i| i.full_name == item.full_name) {
                live.installed_version.clone_from(&live.latest_version);
            }
        }
        for item in &status.missing {
            inventory.push(LiveItem::unversioned(item.name.clone(), item.full_name.clone()));
        }

        if self.item_warnings {
            for item in status.missing.iter().chain(&status.updated).chain(&status.removed) {
                warnings.push(format!("{} needed attention", item.full_name));
            }
        }
        Ok(warnings)
    }
}

impl Backend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn icon(&self) -> &str {
        "M"
    }

    fn short_desc(&self) -> &str {
        "mock"
    }

    fn long_desc(&self) -> &str {
        "in-memory mock backend"
    }

    fn needs_sudo(&self, command: CommandKind) -> bool {
        self.sudo.contains(&command)
    }

    fn check_command_available(&self) -> Result<()> {
        if self.available {
            Ok(())
        } else {
            bail!("{} not found in PATH", self.name)
        }
    }

    fn check_config_valid(&self) -> Result<()> {
        Ok(())
    }

    fn canonical_package(&self, name: &str) -> String {
        self.canonical(name)
    }

    fn package_names(&self, packages: &[String]) -> Vec<String> {
        packages.iter().map(|p| self.display(p)).collect()
    }

    fn install_valid_args(&self, partial: &str, dependency: bool) -> Result<Vec<String>> {
        let pool = if dependency {
            ["repo-one", "repo-two"]
        } else {
            ["htop", "helix"]
        };
        Ok(pool
            .iter()
            .filter(|p| p.starts_with(partial))
            .map(|p| (*p).to_string())
            .collect())
    }

    fn add_packages(&self, packages: &[String]) -> Result<Accepted> {
        self.record("add_packages");
        Ok(self.add(packages))
    }

    fn add_dependencies(&self, dependencies: &[String]) -> Result<Accepted> {
        self.record("add_dependencies");
        Ok(self.add(dependencies))
    }

    fn list_packages(&self, _wanted: &[String]) -> Result<Vec<LiveItem>> {
        self.record("list_packages");
        Ok(self.packages.lock().unwrap().clone())
    }

    fn list_dependencies(&self, _wanted: &[String]) -> Result<Vec<LiveItem>> {
        self.record("list_dependencies");
        Ok(self.dependencies.lock().unwrap().clone())
    }

    fn remove_packages(&self, all: &[String], to_remove: &[String]) -> Result<Accepted> {
        Ok(self.remove(all, to_remove))
    }

    fn remove_dependencies(&self, all: &[String], to_remove: &[String]) -> Result<Accepted> {
        Ok(self.remove(all, to_remove))
    }

    fn sync_packages(&self, status: &StatusBuckets) -> Result<Vec<String>> {
        self.apply(ObjectKind::Package, status)
    }

    fn sync_dependencies(&self, status: &StatusBuckets) -> Result<Vec<String>> {
        self.apply(ObjectKind::Dependency, status)
    }
}

/// Confirmation that answers a fixed value and records every prompt
#[derive(Clone)]
pub struct RecordingConfirm {
    answer: bool,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl RecordingConfirm {
    pub fn answering(answer: bool) -> Self {
        Self {
            answer,
            prompts: Arc::default(),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

impl ConfirmCallback for RecordingConfirm {
    fn confirm(&mut self, prompt: &str) -> Result<bool> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(self.answer)
    }
}

/// Elevation probe that counts calls and optionally fails
#[derive(Clone)]
pub struct ScriptedProbe {
    fail: bool,
    calls: Arc<AtomicUsize>,
}

impl ScriptedProbe {
    pub fn ok() -> Self {
        Self {
            fail: false,
            calls: Arc::default(),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            calls: Arc::default(),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ElevationProbe for ScriptedProbe {
    fn elevate(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            bail!("sudo: a password is required");
        }
        Ok(())
    }
}

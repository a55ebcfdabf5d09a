//! The declared-state document
//!
//! One table per backend, each with a `global` section and any number of
//! `conditional` sections scoped to a host or group:
//!
//! ```toml
//! [dnf.global]
//! packages = ["ripgrep", "fd-find"]
//! dependencies = ["atim/lazygit"]
//!
//! [[dnf.conditional]]
//! kind = "host"
//! value = "workstation"
//! packages = ["nvidia-driver"]
//! dependencies = []
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

use crate::error::{Error, Result};
use crate::types::ObjectKind;

/// Predicate kind of a conditional section
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConditionKind {
    /// Matches the running machine's hostname
    Host,
    /// Matches one of the configured groups
    Group,
}

impl fmt::Display for ConditionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConditionKind::Host => write!(f, "host"),
            ConditionKind::Group => write!(f, "group"),
        }
    }
}

/// Declared packages and dependencies
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    #[serde(default)]
    pub packages: Vec<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

impl Section {
    pub fn objects(&self, kind: ObjectKind) -> &[String] {
        match kind {
            ObjectKind::Package => &self.packages,
            ObjectKind::Dependency => &self.dependencies,
        }
    }

    fn objects_mut(&mut self, kind: ObjectKind) -> &mut Vec<String> {
        match kind {
            ObjectKind::Package => &mut self.packages,
            ObjectKind::Dependency => &mut self.dependencies,
        }
    }

    /// Append objects not already present
    pub fn add<S: AsRef<str>>(&mut self, kind: ObjectKind, objects: &[S]) {
        let list = self.objects_mut(kind);
        for object in objects {
            let object = object.as_ref();
            if !list.iter().any(|o| o == object) {
                list.push(object.to_string());
            }
        }
    }

    /// Drop every listed object
    pub fn remove<S: AsRef<str>>(&mut self, kind: ObjectKind, objects: &[S]) {
        self.objects_mut(kind)
            .retain(|o| !objects.iter().any(|r| r.as_ref() == o));
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty() && self.dependencies.is_empty()
    }
}

/// A section that applies only when its predicate matches
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conditional {
    pub kind: ConditionKind,
    pub value: String,
    #[serde(flatten)]
    pub section: Section,
}

/// Everything declared for one backend
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendManifest {
    #[serde(default)]
    pub global: Section,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditional: Vec<Conditional>,
}

impl BackendManifest {
    /// Find the conditional for `(kind, value)`, inserting an empty one if absent
    ///
    /// Calling this twice with the same pair yields the same section.
    pub fn get_or_add_conditional(&mut self, kind: ConditionKind, value: &str) -> &mut Conditional {
        let index = match self
            .conditional
            .iter()
            .position(|c| c.kind == kind && c.value == value)
        {
            Some(index) => index,
            None => {
                self.conditional.push(Conditional {
                    kind,
                    value: value.to_string(),
                    section: Section::default(),
                });
                self.conditional.len() - 1
            }
        };
        &mut self.conditional[index]
    }
}

/// The whole declared-state document, keyed by backend name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest {
    backends: BTreeMap<String, BackendManifest>,
}

impl Manifest {
    /// Load from disk, writing an empty document if the file is missing
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::info!("Creating empty manifest at {}", path.display());
            let manifest = Self::default();
            manifest.save(path)?;
            return Ok(manifest);
        }

        let content = fs::read_to_string(path).map_err(|source| Error::ManifestIo {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content).map_err(|source| Error::ManifestParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Parse a document
    pub fn parse(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Write to disk
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        let io_err = |source| Error::ManifestIo {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        fs::write(path, content).map_err(io_err)?;
        log::debug!("Saved manifest to {}", path.display());
        Ok(())
    }

    /// Declarations for a backend; empty if it has none
    pub fn backend(&self, name: &str) -> BackendManifest {
        self.backends.get(name).cloned().unwrap_or_default()
    }

    /// Mutable declarations for a backend, created on demand
    pub fn backend_mut(&mut self, name: &str) -> &mut BackendManifest {
        self.backends.entry(name.to_string()).or_default()
    }

    /// Backends with a table in the document
    pub fn backend_names(&self) -> impl Iterator<Item = &str> {
        self.backends.keys().map(String::as_str)
    }

    pub fn add_global<S: AsRef<str>>(&mut self, kind: ObjectKind, backend: &str, objects: &[S]) {
        self.backend_mut(backend).global.add(kind, objects);
    }

    pub fn remove_global<S: AsRef<str>>(&mut self, kind: ObjectKind, backend: &str, objects: &[S]) {
        if let Some(declared) = self.backends.get_mut(backend) {
            declared.global.remove(kind, objects);
        }
    }

    pub fn add_conditional<S: AsRef<str>>(
        &mut self,
        kind: ObjectKind,
        backend: &str,
        condition: ConditionKind,
        value: &str,
        objects: &[S],
    ) {
        self.get_or_add_conditional(backend, condition, value)
            .section
            .add(kind, objects);
    }

    pub fn remove_conditional<S: AsRef<str>>(
        &mut self,
        kind: ObjectKind,
        backend: &str,
        condition: ConditionKind,
        value: &str,
        objects: &[S],
    ) {
        let Some(declared) = self.backends.get_mut(backend) else {
            return;
        };
        if let Some(conditional) = declared
            .conditional
            .iter_mut()
            .find(|c| c.kind == condition && c.value == value)
        {
            conditional.section.remove(kind, objects);
        }
    }

    pub fn get_or_add_conditional(
        &mut self,
        backend: &str,
        condition: ConditionKind,
        value: &str,
    ) -> &mut Conditional {
        self.backend_mut(backend)
            .get_or_add_conditional(condition, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"
[dnf.global]
packages = ["ripgrep", "fd-find"]
dependencies = ["atim/lazygit"]

[[dnf.conditional]]
kind = "host"
value = "workstation"
packages = ["nvidia-driver"]

[[dnf.conditional]]
kind = "group"
value = "work"
dependencies = ["corp/tools"]

[flatpak.global]
packages = ["flathub:org.gimp.GIMP"]
"#;

    #[test]
    fn test_parse_sample() {
        let manifest = Manifest::parse(SAMPLE).unwrap();
        let dnf = manifest.backend("dnf");

        assert_eq!(dnf.global.packages, vec!["ripgrep", "fd-find"]);
        assert_eq!(dnf.conditional.len(), 2);
        assert_eq!(dnf.conditional[0].kind, ConditionKind::Host);
        assert_eq!(dnf.conditional[0].section.packages, vec!["nvidia-driver"]);
        assert!(dnf.conditional[0].section.dependencies.is_empty());
        assert_eq!(dnf.conditional[1].section.dependencies, vec!["corp/tools"]);
        assert_eq!(
            manifest.backend_names().collect::<Vec<_>>(),
            vec!["dnf", "flatpak"]
        );
    }

    #[test]
    fn test_unknown_condition_kind_is_error() {
        let content = r#"
[[dnf.conditional]]
kind = "weekday"
value = "monday"
"#;
        assert!(Manifest::parse(content).is_err());
    }

    #[test]
    fn test_missing_backend_is_empty() {
        let manifest = Manifest::parse(SAMPLE).unwrap();
        assert_eq!(manifest.backend("git"), BackendManifest::default());
    }

    #[test]
    fn test_get_or_add_conditional_is_idempotent() {
        let mut manifest = Manifest::default();

        manifest
            .get_or_add_conditional("dnf", ConditionKind::Group, "work")
            .section
            .add(ObjectKind::Package, &["a"]);
        manifest
            .get_or_add_conditional("dnf", ConditionKind::Group, "work")
            .section
            .add(ObjectKind::Package, &["b"]);
        manifest.get_or_add_conditional("dnf", ConditionKind::Host, "work");

        let dnf = manifest.backend("dnf");
        assert_eq!(dnf.conditional.len(), 2);
        assert_eq!(dnf.conditional[0].section.packages, vec!["a", "b"]);
    }

    #[test]
    fn test_add_and_remove_global() {
        let mut manifest = Manifest::default();
        manifest.add_global(ObjectKind::Package, "dnf", &["a", "b", "a"]);
        manifest.add_global(ObjectKind::Dependency, "dnf", &["repo"]);
        manifest.remove_global(ObjectKind::Package, "dnf", &["a", "zzz"]);

        let dnf = manifest.backend("dnf");
        assert_eq!(dnf.global.packages, vec!["b"]);
        assert_eq!(dnf.global.dependencies, vec!["repo"]);
    }

    #[test]
    fn test_add_and_remove_conditional() {
        let mut manifest = Manifest::default();
        manifest.add_conditional(ObjectKind::Package, "git", ConditionKind::Host, "box", &["x", "y"]);
        manifest.remove_conditional(ObjectKind::Package, "git", ConditionKind::Host, "box", &["x"]);

        let git = manifest.backend("git");
        assert_eq!(git.conditional.len(), 1);
        assert_eq!(git.conditional[0].section.packages, vec!["y"]);
    }

    #[test]
    fn test_remove_from_absent_section_leaves_document_unchanged() {
        let mut manifest = Manifest::parse(SAMPLE).unwrap();
        let before = manifest.clone();

        manifest.remove_conditional(ObjectKind::Package, "dnf", ConditionKind::Host, "laptop", &["x"]);
        manifest.remove_conditional(ObjectKind::Package, "git", ConditionKind::Group, "work", &["x"]);
        manifest.remove_global(ObjectKind::Package, "git", &["x"]);

        assert_eq!(manifest, before);
        assert_eq!(manifest.backend("dnf").conditional.len(), 2);
    }

    #[test]
    fn test_load_creates_missing_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("manifest.toml");

        let manifest = Manifest::load(&path).unwrap();
        assert_eq!(manifest, Manifest::default());
        assert!(path.exists());
    }

    #[test]
    fn test_save_and_load() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("manifest.toml");

        let mut manifest = Manifest::parse(SAMPLE).unwrap();
        manifest.add_conditional(ObjectKind::Dependency, "git", ConditionKind::Group, "home", &["d"]);
        manifest.save(&path).unwrap();

        let loaded = Manifest::load(&path).unwrap();
        assert_eq!(loaded, manifest);
    }

    #[test]
    fn test_load_reports_parse_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("manifest.toml");
        std::fs::write(&path, "[dnf.global\n").unwrap();

        let err = Manifest::load(&path).unwrap_err();
        assert!(matches!(err, Error::ManifestParse { .. }));
    }
}

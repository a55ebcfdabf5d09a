//! Resolve a backend's manifest into the declared set for this machine

use std::collections::HashSet;
use std::sync::OnceLock;

use crate::error::{Error, Result};
use crate::manifest::{BackendManifest, ConditionKind, Conditional};
use crate::types::ObjectKind;

/// Source of facts about the running machine
pub trait HostInfo: Send + Sync {
    fn hostname(&self) -> std::io::Result<String>;
}

/// The real machine
pub struct SystemHost;

impl HostInfo for SystemHost {
    fn hostname(&self) -> std::io::Result<String> {
        whoami::fallible::hostname()
    }
}

/// Fixed hostname, for tests and dry evaluation
pub struct StaticHost(pub String);

impl HostInfo for StaticHost {
    fn hostname(&self) -> std::io::Result<String> {
        Ok(self.0.clone())
    }
}

/// The flat declared set for one backend
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DesiredSet {
    pub packages: Vec<String>,
    pub dependencies: Vec<String>,
}

impl DesiredSet {
    pub fn objects(&self, kind: ObjectKind) -> &[String] {
        match kind {
            ObjectKind::Package => &self.packages,
            ObjectKind::Dependency => &self.dependencies,
        }
    }
}

/// Evaluates conditional sections against the host and configured groups
pub struct Resolver {
    host: Box<dyn HostInfo>,
    groups: Vec<String>,
    hostname: OnceLock<String>,
}

impl Resolver {
    pub fn new(host: Box<dyn HostInfo>, groups: Vec<String>) -> Self {
        Self {
            host,
            groups,
            hostname: OnceLock::new(),
        }
    }

    /// Resolver for the running machine
    pub fn system(groups: Vec<String>) -> Self {
        Self::new(Box::new(SystemHost), groups)
    }

    /// Hostname of the machine, read once
    pub fn hostname(&self) -> Result<String> {
        if let Some(name) = self.hostname.get() {
            return Ok(name.clone());
        }
        let name = self.host.hostname().map_err(Error::Hostname)?;
        log::debug!("Resolved hostname '{name}'");
        Ok(self.hostname.get_or_init(|| name).clone())
    }

    pub fn groups(&self) -> &[String] {
        &self.groups
    }

    /// Whether a conditional section applies here
    pub fn matches(&self, conditional: &Conditional) -> Result<bool> {
        match conditional.kind {
            ConditionKind::Host => Ok(conditional.value == self.hostname()?),
            ConditionKind::Group => Ok(self.groups.iter().any(|g| *g == conditional.value)),
        }
    }

    /// Global plus every matching conditional, de-duplicated in declaration order
    pub fn resolve(&self, manifest: &BackendManifest) -> Result<DesiredSet> {
        let mut packages = manifest.global.packages.clone();
        let mut dependencies = manifest.global.dependencies.clone();

        for conditional in &manifest.conditional {
            if self.matches(conditional)? {
                packages.extend(conditional.section.packages.iter().cloned());
                dependencies.extend(conditional.section.dependencies.iter().cloned());
            }
        }

        Ok(DesiredSet {
            packages: dedupe(packages),
            dependencies: dedupe(dependencies),
        })
    }
}

/// Drop repeated entries, keeping first occurrences in order
pub fn dedupe<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut seen = HashSet::new();
    items
        .into_iter()
        .map(Into::into)
        .filter(|item: &String| seen.insert(item.clone()))
        .collect()
}

/// Split new arguments from ones already declared
///
/// Both sides are compared by their `canonical` form, so `owner/repo` and
/// `copr:owner/repo` count as the same object. Returns the arguments to add
/// and a warning per argument already present.
pub fn filter_incoming<F>(args: &[String], declared: &[String], canonical: F) -> (Vec<String>, Vec<String>)
where
    F: Fn(&str) -> String,
{
    let declared: HashSet<String> = declared.iter().map(|d| canonical(d)).collect();
    let mut seen = HashSet::new();
    let mut fresh = Vec::new();
    let mut warnings = Vec::new();
    for arg in dedupe(args.iter().cloned()) {
        let full_name = canonical(&arg);
        if declared.contains(&full_name) {
            warnings.push(format!("'{arg}' is already declared"));
        } else if seen.insert(full_name) {
            fresh.push(arg);
        }
    }
    (fresh, warnings)
}

/// Keep only arguments that are currently declared
///
/// Returns the arguments to remove and a warning per argument not present.
pub fn filter_outgoing(args: &[String], declared: &[String]) -> (Vec<String>, Vec<String>) {
    let mut present = Vec::new();
    let mut warnings = Vec::new();
    for arg in dedupe(args.iter().cloned()) {
        if declared.contains(&arg) {
            present.push(arg);
        } else {
            warnings.push(format!("'{arg}' is not declared"));
        }
    }
    (present, warnings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::Manifest;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingHost {
        name: String,
        calls: Arc<AtomicUsize>,
    }

    impl HostInfo for CountingHost {
        fn hostname(&self) -> std::io::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.name.clone())
        }
    }

    struct BrokenHost;

    impl HostInfo for BrokenHost {
        fn hostname(&self) -> std::io::Result<String> {
            Err(std::io::Error::other("no uts namespace"))
        }
    }

    fn manifest() -> BackendManifest {
        Manifest::parse(
            r#"
[dnf.global]
packages = ["a", "b"]
dependencies = ["r1"]

[[dnf.conditional]]
kind = "host"
value = "laptop"
packages = ["c", "a"]

[[dnf.conditional]]
kind = "host"
value = "server"
packages = ["s"]

[[dnf.conditional]]
kind = "group"
value = "work"
packages = ["w"]
dependencies = ["r2"]
"#,
        )
        .unwrap()
        .backend("dnf")
    }

    fn resolver(host: &str, groups: &[&str]) -> Resolver {
        Resolver::new(
            Box::new(StaticHost(host.to_string())),
            groups.iter().map(|g| (*g).to_string()).collect(),
        )
    }

    #[test]
    fn test_resolve_global_and_matching_conditionals() {
        let desired = resolver("laptop", &["work"]).resolve(&manifest()).unwrap();
        assert_eq!(desired.packages, vec!["a", "b", "c", "w"]);
        assert_eq!(desired.dependencies, vec!["r1", "r2"]);
    }

    #[test]
    fn test_resolve_without_matches() {
        let desired = resolver("desktop", &[]).resolve(&manifest()).unwrap();
        assert_eq!(desired.packages, vec!["a", "b"]);
        assert_eq!(desired.dependencies, vec!["r1"]);
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let resolver = resolver("server", &["work"]);
        let first = resolver.resolve(&manifest()).unwrap();
        let second = resolver.resolve(&manifest()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_hostname_failure_is_fatal() {
        let resolver = Resolver::new(Box::new(BrokenHost), vec![]);
        let err = resolver.resolve(&manifest()).unwrap_err();
        assert!(matches!(err, Error::Hostname(_)));
    }

    #[test]
    fn test_hostname_read_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let resolver = Resolver::new(
            Box::new(CountingHost {
                name: "laptop".into(),
                calls: Arc::clone(&calls),
            }),
            vec![],
        );

        resolver.resolve(&manifest()).unwrap();
        resolver.resolve(&manifest()).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_matches_group() {
        let resolver = resolver("x", &["home"]);
        let manifest = manifest();
        assert!(!resolver.matches(&manifest.conditional[2]).unwrap());
        assert!(!resolver.matches(&manifest.conditional[0]).unwrap());
    }

    #[test]
    fn test_filter_incoming_dedupes_and_warns() {
        let args = vec!["a".to_string(), "new".to_string(), "new".to_string()];
        let declared = vec!["a".to_string()];

        let (fresh, warnings) = filter_incoming(&args, &declared, str::to_string);
        assert_eq!(fresh, vec!["new"]);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("'a'"));
    }

    #[test]
    fn test_filter_incoming_compares_canonical_names() {
        let copr = |name: &str| {
            if name.starts_with("copr:") {
                name.to_string()
            } else {
                format!("copr:{name}")
            }
        };
        let args = vec![
            "atim/lazygit".to_string(),
            "owner/new".to_string(),
            "copr:owner/new".to_string(),
        ];
        let declared = vec!["copr:atim/lazygit".to_string()];

        let (fresh, warnings) = filter_incoming(&args, &declared, copr);
        assert_eq!(fresh, vec!["owner/new"]);
        assert_eq!(warnings, vec!["'atim/lazygit' is already declared"]);
    }

    #[test]
    fn test_filter_outgoing_dedupes_and_warns() {
        let args = vec!["a".to_string(), "a".to_string(), "gone".to_string()];
        let declared = vec!["a".to_string(), "b".to_string()];

        let (present, warnings) = filter_outgoing(&args, &declared);
        assert_eq!(present, vec!["a"]);
        assert_eq!(warnings, vec!["'gone' is not declared"]);
    }
}

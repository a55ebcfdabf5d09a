//! DNF backend: RPM packages, COPR repositories and `.repo` files
//!
//! Dependencies come in two kinds, told apart by prefix:
//! `copr:owner/project` enables a COPR, and `cm:<url>` downloads a `.repo`
//! file into `/etc/yum.repos.d` the way `dnf config-manager --add-repo`
//! would, under a name packward recognises as its own.

use anyhow::{Context, Result, bail};
use regex::Regex;
use reconcile::{Accepted, Backend, CommandKind, LiveItem, StatusBuckets};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use crate::{http, runner, sudo};

/// Packages owned by the operating system; never declared or removed
const PROTECTED: &[&str] = &["dnf", "rpm", "systemd", "kernel", "glibc"];

/// Prefix of a COPR dependency's full name
const COPR_PREFIX: &str = "copr:";

/// Prefix of a repository-file dependency's full name
const REPO_PREFIX: &str = "cm:";

const REPO_DIR: &str = "/etc/yum.repos.d";

/// Marks repository files packward installed
const REPO_FILE_PREFIX: &str = "_packward_";

/// Hub that owns unqualified `owner/project` COPRs
const COPR_HUB: &str = "copr.fedorainfracloud.org/";

static COPR_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^@?[A-Za-z0-9_.-]+/[A-Za-z0-9_.+-]+$").expect("valid regex")
});

pub struct Dnf;

/// A dependency's full name, split by kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dependency<'a> {
    Copr(&'a str),
    Repo(&'a str),
}

impl<'a> Dependency<'a> {
    /// Classify a full or user-typed name; URLs are repository files
    fn parse(name: &'a str) -> Self {
        if let Some(url) = name.strip_prefix(REPO_PREFIX) {
            Self::Repo(url)
        } else if let Some(copr) = name.strip_prefix(COPR_PREFIX) {
            Self::Copr(copr)
        } else if is_url(name) {
            Self::Repo(name)
        } else {
            Self::Copr(name)
        }
    }

    fn short_name(self) -> &'a str {
        match self {
            Self::Copr(name) | Self::Repo(name) => name,
        }
    }

    fn full_name(self) -> String {
        match self {
            Self::Copr(copr) => format!("{COPR_PREFIX}{copr}"),
            Self::Repo(url) => format!("{REPO_PREFIX}{url}"),
        }
    }

    fn validate(self) -> Result<()> {
        match self {
            Self::Copr(copr) if !COPR_NAME.is_match(copr) => {
                bail!("expected 'owner/project' for a COPR, got '{copr}'")
            }
            Self::Repo(url) if repo_file_name(url).is_none() => {
                bail!("'{url}' does not point at a .repo file")
            }
            _ => Ok(()),
        }
    }
}

impl Backend for Dnf {
    fn name(&self) -> &str {
        "dnf"
    }

    fn icon(&self) -> &str {
        "D"
    }

    fn short_desc(&self) -> &str {
        "A package manager for RPM-based Linux distributions"
    }

    fn long_desc(&self) -> &str {
        "Tracks RPM packages installed with dnf. Dependencies are COPR \
         repositories ('owner/project') or .repo file URLs ('cm:https://...'), \
         set up before packages are installed."
    }

    fn needs_sudo(&self, command: CommandKind) -> bool {
        matches!(
            command,
            CommandKind::Install | CommandKind::Remove | CommandKind::Sync
        )
    }

    fn check_command_available(&self) -> Result<()> {
        if !runner::command_exists("dnf") {
            bail!("'dnf' command not found");
        }
        Ok(())
    }

    fn check_config_valid(&self) -> Result<()> {
        Ok(())
    }

    fn canonical_dependency(&self, name: &str) -> String {
        Dependency::parse(name).full_name()
    }

    fn dependency_names(&self, dependencies: &[String]) -> Vec<String> {
        dependencies
            .iter()
            .map(|d| Dependency::parse(d).short_name().to_string())
            .collect()
    }

    fn install_valid_args(&self, partial: &str, dependency: bool) -> Result<Vec<String>> {
        if dependency {
            return Ok(Vec::new());
        }
        let pattern = format!("{partial}*");
        let output = runner::run_capture(
            "dnf",
            &["repoquery", "--available", "--quiet", "--qf", "%{name}\n", &pattern],
        )?;
        let mut names: Vec<String> = runner::lines(&output).map(str::to_string).collect();
        names.sort();
        names.dedup();
        Ok(names)
    }

    fn add_packages(&self, packages: &[String]) -> Result<Accepted> {
        let mut accepted = Accepted::default();
        for package in packages {
            if is_protected(package) {
                accepted.warnings.push(protected_warning(package));
            } else {
                accepted.objects.push(package.clone());
            }
        }
        Ok(accepted)
    }

    fn add_dependencies(&self, dependencies: &[String]) -> Result<Accepted> {
        let mut accepted = Accepted::default();
        for dependency in dependencies {
            let parsed = Dependency::parse(dependency);
            match parsed.validate() {
                Ok(()) => accepted.objects.push(parsed.full_name()),
                Err(e) => accepted
                    .warnings
                    .push(format!("Dependency '{dependency}' has an incorrect format: {e}")),
            }
        }
        Ok(accepted)
    }

    fn list_packages(&self, wanted: &[String]) -> Result<Vec<LiveItem>> {
        let installed = runner::run_capture(
            "dnf",
            &["repoquery", "--installed", "--quiet", "--qf", "%{name} %{evr}\n"],
        )?;
        let (_, updates) = runner::run_capture_any("dnf", &["check-update", "--quiet"])?;

        Ok(live_packages(
            &parse_installed(&installed),
            &parse_check_update(&updates),
            wanted,
        ))
    }

    fn list_dependencies(&self, wanted: &[String]) -> Result<Vec<LiveItem>> {
        let parsed: Vec<Dependency> = wanted.iter().map(|w| Dependency::parse(w)).collect();
        let mut items = Vec::new();

        if parsed.iter().any(|d| matches!(d, Dependency::Copr(_))) {
            let output = runner::run_capture("dnf", &["copr", "list"])?;
            let wanted: HashSet<&str> = wanted.iter().map(String::as_str).collect();
            items.extend(
                parse_copr_list(&output)
                    .into_iter()
                    .map(|copr| {
                        let full_name = Dependency::Copr(&copr).full_name();
                        LiveItem::unversioned(copr, full_name)
                    })
                    .filter(|item| wanted.contains(item.full_name.as_str())),
            );
        }

        if parsed.iter().any(|d| matches!(d, Dependency::Repo(_))) {
            let present = managed_repo_files(Path::new(REPO_DIR))?;
            items.extend(live_repo_files(&parsed, &present));
        }

        Ok(items)
    }

    fn remove_packages(&self, all: &[String], to_remove: &[String]) -> Result<Accepted> {
        let mut accepted = Accepted::default();
        for package in to_remove {
            if is_protected(package) {
                accepted.warnings.push(protected_warning(package));
            } else if all.contains(package) {
                accepted.objects.push(package.clone());
            }
        }
        Ok(accepted)
    }

    fn remove_dependencies(&self, all: &[String], to_remove: &[String]) -> Result<Accepted> {
        let objects = all
            .iter()
            .filter(|d| {
                let short = Dependency::parse(d).short_name();
                to_remove.iter().any(|r| r == short)
            })
            .cloned()
            .collect();
        Ok(Accepted {
            objects,
            warnings: Vec::new(),
        })
    }

    fn sync_packages(&self, status: &StatusBuckets) -> Result<Vec<String>> {
        let mut warnings = Vec::new();
        let names = |items: &[LiveItem]| -> Vec<String> {
            items
                .iter()
                .map(|i| i.full_name.clone())
                .filter(|n| !is_protected(n))
                .collect()
        };

        warnings.extend(batch_or_each("install", &names(&status.missing), dnf_batch));
        warnings.extend(batch_or_each("upgrade", &names(&status.updated), dnf_batch));
        warnings.extend(batch_or_each("remove", &names(&status.removed), dnf_batch));

        for item in status.removed.iter().filter(|i| is_protected(&i.full_name)) {
            warnings.push(protected_warning(&item.full_name));
        }
        Ok(warnings)
    }

    fn sync_dependencies(&self, status: &StatusBuckets) -> Result<Vec<String>> {
        let mut warnings = Vec::new();

        for item in &status.missing {
            let result = match Dependency::parse(&item.full_name) {
                Dependency::Copr(copr) => sudo::run("dnf", &["copr", "enable", "-y", copr]),
                Dependency::Repo(url) => add_repo_file(url),
            };
            if let Err(e) = result {
                log::warn!("Adding {} failed: {e:#}", item.full_name);
                warnings.push(format!("Could not add '{}': {e}", item.name));
            }
        }
        for item in &status.removed {
            let result = match Dependency::parse(&item.full_name) {
                Dependency::Copr(copr) => sudo::run("dnf", &["copr", "remove", "-y", copr]),
                Dependency::Repo(url) => remove_repo_file(url),
            };
            if let Err(e) = result {
                log::warn!("Removing {} failed: {e:#}", item.full_name);
                warnings.push(format!("Could not remove '{}': {e}", item.name));
            }
        }

        Ok(warnings)
    }
}

fn dnf_batch(verb: &str, packages: &[String]) -> Result<()> {
    let mut args = vec![verb, "-y"];
    args.extend(packages.iter().map(String::as_str));
    sudo::run("dnf", &args)
}

/// Run one transaction for all `packages`, retrying one by one if it fails
///
/// A single bad name fails the whole dnf transaction, so the retry isolates
/// it. Returns a warning per package that still fails.
fn batch_or_each<F>(verb: &str, packages: &[String], run: F) -> Vec<String>
where
    F: Fn(&str, &[String]) -> Result<()>,
{
    if packages.is_empty() {
        return Vec::new();
    }
    let Err(e) = run(verb, packages) else {
        return Vec::new();
    };
    log::warn!(
        "dnf {verb} of {} packages failed ({e:#}); retrying one at a time",
        packages.len()
    );

    packages
        .iter()
        .filter_map(|package| {
            run(verb, std::slice::from_ref(package))
                .err()
                .map(|e| format!("Could not {verb} '{package}': {e}"))
        })
        .collect()
}

fn is_url(name: &str) -> bool {
    name.starts_with("https://") || name.starts_with("http://")
}

/// Name packward gives its copy of a `.repo` URL
fn repo_file_name(url: &str) -> Option<String> {
    if !is_url(url) {
        return None;
    }
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let base = path
        .rsplit('/')
        .next()
        .filter(|b| b.len() > ".repo".len() && b.ends_with(".repo"))?;
    Some(format!("{REPO_FILE_PREFIX}{base}"))
}

/// Repository files packward owns in `dir`
fn managed_repo_files(dir: &Path) -> Result<HashSet<String>> {
    let mut found = HashSet::new();
    for entry in fs::read_dir(dir).with_context(|| format!("Could not read {}", dir.display()))? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with(REPO_FILE_PREFIX) && entry.file_type()?.is_file() {
            found.insert(name);
        }
    }
    Ok(found)
}

/// Declared repository files that are present on disk
fn live_repo_files(declared: &[Dependency], present: &HashSet<String>) -> Vec<LiveItem> {
    declared
        .iter()
        .filter_map(|dependency| match *dependency {
            Dependency::Repo(url) if repo_file_name(url).is_some_and(|f| present.contains(&f)) => {
                Some(LiveItem::unversioned(url, dependency.full_name()))
            }
            _ => None,
        })
        .collect()
}

fn add_repo_file(url: &str) -> Result<()> {
    let file = repo_file_name(url).with_context(|| format!("'{url}' is not a .repo URL"))?;
    let contents = http::download(url)?;

    let staged = std::env::temp_dir().join(&file);
    fs::write(&staged, contents)
        .with_context(|| format!("Could not write {}", staged.display()))?;
    let staged_str = staged.to_string_lossy();
    let target = Path::new(REPO_DIR).join(&file);
    let target_str = target.to_string_lossy();

    let result = sudo::run(
        "install",
        &["-m", "0644", "-o", "root", "-g", "root", &staged_str, &target_str],
    );
    if let Err(e) = fs::remove_file(&staged) {
        log::debug!("Could not clean up {}: {e}", staged.display());
    }
    result
}

fn remove_repo_file(url: &str) -> Result<()> {
    let file = repo_file_name(url).with_context(|| format!("'{url}' is not a .repo URL"))?;
    let target = Path::new(REPO_DIR).join(file);
    if !target.exists() {
        bail!("{} does not exist", target.display());
    }
    sudo::run("rm", &["-f", &target.to_string_lossy()])
}

fn is_protected(package: &str) -> bool {
    PROTECTED.contains(&package)
}

fn protected_warning(package: &str) -> String {
    format!("'{package}' is a system package and cannot be managed")
}

/// Name to version from `repoquery --qf '%{name} %{evr}'`
fn parse_installed(output: &str) -> HashMap<String, String> {
    runner::lines(output)
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            Some((parts.next()?.to_string(), parts.next()?.to_string()))
        })
        .collect()
}

/// Name to candidate version from `dnf check-update`
///
/// Rows are `name.arch  version  repo`; the `Obsoleting` block and
/// anything else without three columns is skipped.
fn parse_check_update(output: &str) -> HashMap<String, String> {
    let mut updates = HashMap::new();
    for line in runner::lines(output) {
        if line.starts_with("Obsoleting") {
            break;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() != 3 {
            continue;
        }
        let Some((name, _arch)) = fields[0].rsplit_once('.') else {
            continue;
        };
        updates.insert(name.to_string(), fields[1].to_string());
    }
    updates
}

/// Enabled COPRs from `dnf copr list`, hub prefix stripped for the default hub
fn parse_copr_list(output: &str) -> Vec<String> {
    runner::lines(output)
        .filter(|line| !line.contains("(disabled)"))
        .filter_map(|line| line.split_whitespace().next())
        .map(|repo| repo.strip_prefix(COPR_HUB).unwrap_or(repo).to_string())
        .collect()
}

fn live_packages(
    installed: &HashMap<String, String>,
    updates: &HashMap<String, String>,
    wanted: &[String],
) -> Vec<LiveItem> {
    let mut items: Vec<LiveItem> = wanted
        .iter()
        .collect::<HashSet<_>>()
        .into_iter()
        .filter_map(|name| {
            let version = installed.get(name)?;
            let latest = updates.get(name).unwrap_or(version).clone();
            Some(LiveItem::versioned(name.clone(), name.clone(), version.clone(), Some(latest)))
        })
        .collect();
    items.sort_by(|a, b| a.full_name.cmp(&b.full_name));
    items
}

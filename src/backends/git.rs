//! Git backend: repositories cloned into a package directory
//!
//! A package is a repository URL. By default the newest release tag is
//! checked out; a `:latest` suffix tracks the remote HEAD instead.

use anyhow::{Context, Result, bail};
use reconcile::{Accepted, Backend, CommandKind, LiveItem, StatusBuckets};
use semver::Version;
use std::fs;
use std::path::{Path, PathBuf};

use crate::runner;

const HEAD_SUFFIX: &str = ":latest";

pub struct Git {
    package_directory: Option<PathBuf>,
    include_unstable: bool,
}

/// A declared repository, split into URL and tracking mode
#[derive(Debug, Clone, PartialEq, Eq)]
struct Repo<'a> {
    url: &'a str,
    head: bool,
}

impl<'a> Repo<'a> {
    fn parse(entry: &'a str) -> Self {
        match entry.strip_suffix(HEAD_SUFFIX) {
            Some(url) => Self { url, head: true },
            None => Self {
                url: entry,
                head: false,
            },
        }
    }

    fn name(&self) -> String {
        repo_name(self.url)
    }
}

impl Git {
    pub fn new(package_directory: Option<PathBuf>, include_unstable: bool) -> Self {
        Self {
            package_directory,
            include_unstable,
        }
    }

    fn root(&self) -> Result<&Path> {
        self.package_directory
            .as_deref()
            .context("git.package_directory is not set")
    }

    fn checkout_dir(&self, repo: &Repo) -> Result<PathBuf> {
        Ok(self.root()?.join(repo.name()))
    }

    /// Newest acceptable tag, or the remote HEAD when tracking HEAD or untagged
    fn latest_version(&self, repo: &Repo) -> Result<String> {
        if !repo.head {
            let output = runner::run_capture("git", &["ls-remote", "--tags", repo.url])?;
            if let Some(tag) = newest_tag(&parse_remote_tags(&output), self.include_unstable) {
                return Ok(tag);
            }
        }
        let output = runner::run_capture("git", &["ls-remote", repo.url, "HEAD"])?;
        parse_remote_head(&output).with_context(|| format!("No HEAD found for {}", repo.url))
    }

    /// Checked-out tag, or the short commit when not on a tag
    fn installed_version(dir: &Path, head: bool) -> Result<String> {
        let dir = dir.to_string_lossy();
        if !head
            && let Ok(tag) = runner::run_capture(
                "git",
                &["-C", &dir, "describe", "--tags", "--exact-match"],
            )
        {
            return Ok(tag);
        }
        runner::run_capture("git", &["-C", &dir, "rev-parse", "--short=7", "HEAD"])
    }

    fn install(&self, repo: &Repo) -> Result<()> {
        let dir = self.checkout_dir(repo)?;
        let dir_str = dir.to_string_lossy();
        runner::run("git", &["clone", "--quiet", repo.url, &dir_str])?;
        if !repo.head {
            self.checkout_latest(repo, &dir)?;
        }
        Ok(())
    }

    fn update(&self, repo: &Repo) -> Result<()> {
        let dir = self.checkout_dir(repo)?;
        let dir_str = dir.to_string_lossy();
        if repo.head {
            runner::run("git", &["-C", &dir_str, "pull", "--ff-only", "--quiet", "origin", "HEAD"])
        } else {
            runner::run("git", &["-C", &dir_str, "fetch", "--tags", "--quiet"])?;
            self.checkout_latest(repo, &dir)
        }
    }

    fn checkout_latest(&self, repo: &Repo, dir: &Path) -> Result<()> {
        let version = self.latest_version(repo)?;
        let dir_str = dir.to_string_lossy();
        runner::run("git", &["-C", &dir_str, "checkout", "--quiet", &version])
    }

    fn uninstall(&self, repo: &Repo) -> Result<()> {
        let dir = self.checkout_dir(repo)?;
        if !dir.is_dir() {
            bail!("{} is not a directory", dir.display());
        }
        fs::remove_dir_all(&dir).with_context(|| format!("Could not delete {}", dir.display()))
    }

    /// Live facts for one declared entry, if its checkout exists
    fn probe(&self, entry: &str) -> Result<Option<LiveItem>> {
        let repo = Repo::parse(entry);
        let dir = self.checkout_dir(&repo)?;
        if !dir.join(".git").exists() {
            return Ok(None);
        }

        let dir_str = dir.to_string_lossy();
        let origin = runner::run_capture("git", &["-C", &dir_str, "remote", "get-url", "origin"])?;
        if normalize_url(&origin) != normalize_url(repo.url) {
            log::warn!(
                "{} tracks {origin}, not {}; treating as not installed",
                dir.display(),
                repo.url
            );
            return Ok(None);
        }

        let installed = Self::installed_version(&dir, repo.head)?;
        let latest = self.latest_version(&repo)?;
        Ok(Some(LiveItem {
            name: repo.name(),
            full_name: entry.to_string(),
            installed_version: Some(installed),
            latest_version: Some(latest),
            repo_url: Some(repo.url.to_string()),
        }))
    }

    fn each(
        &self,
        items: &[LiveItem],
        verb: &str,
        warnings: &mut Vec<String>,
        action: impl Fn(&Repo) -> Result<()>,
    ) {
        for item in items {
            let repo = Repo::parse(&item.full_name);
            if let Err(e) = action(&repo) {
                log::warn!("Could not {verb} {}: {e:#}", repo.url);
                warnings.push(format!("Could not {verb} '{}': {e}", repo.name()));
            }
        }
    }
}

impl Backend for Git {
    fn name(&self) -> &str {
        "git"
    }

    fn icon(&self) -> &str {
        "G"
    }

    fn short_desc(&self) -> &str {
        "Clone git repositories"
    }

    fn long_desc(&self) -> &str {
        "Keeps declared git repositories cloned and up to date. The newest \
         release tag is checked out when the repository has tags; otherwise, \
         or with a ':latest' suffix, the remote HEAD is followed."
    }

    fn needs_sudo(&self, _command: CommandKind) -> bool {
        false
    }

    fn check_command_available(&self) -> Result<()> {
        if !runner::command_exists("git") {
            bail!("'git' command not found");
        }
        Ok(())
    }

    fn check_config_valid(&self) -> Result<()> {
        let root = self.root()?;
        if !root.is_dir() {
            bail!("package_directory {} is not a directory", root.display());
        }
        Ok(())
    }

    fn package_names(&self, packages: &[String]) -> Vec<String> {
        packages.iter().map(|p| Repo::parse(p).name()).collect()
    }

    fn install_valid_args(&self, _partial: &str, _dependency: bool) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    fn add_packages(&self, packages: &[String]) -> Result<Accepted> {
        let mut accepted = Accepted::default();
        for package in packages {
            if repo_name(Repo::parse(package).url).is_empty() {
                accepted
                    .warnings
                    .push(format!("'{package}' is not a repository URL"));
            } else {
                accepted.objects.push(package.clone());
            }
        }
        Ok(accepted)
    }

    fn add_dependencies(&self, dependencies: &[String]) -> Result<Accepted> {
        Ok(Accepted {
            objects: Vec::new(),
            warnings: dependencies
                .iter()
                .map(|d| format!("git has no dependencies; ignoring '{d}'"))
                .collect(),
        })
    }

    fn list_packages(&self, wanted: &[String]) -> Result<Vec<LiveItem>> {
        let mut items = Vec::new();
        for entry in wanted {
            if items.iter().any(|i: &LiveItem| &i.full_name == entry) {
                continue;
            }
            if let Some(item) = self.probe(entry)? {
                items.push(item);
            }
        }
        Ok(items)
    }

    fn list_dependencies(&self, _wanted: &[String]) -> Result<Vec<LiveItem>> {
        Ok(Vec::new())
    }

    fn remove_packages(&self, all: &[String], to_remove: &[String]) -> Result<Accepted> {
        let objects = all
            .iter()
            .filter(|p| to_remove.contains(&Repo::parse(p).name()))
            .cloned()
            .collect();
        Ok(Accepted {
            objects,
            warnings: Vec::new(),
        })
    }

    fn remove_dependencies(&self, _all: &[String], _to_remove: &[String]) -> Result<Accepted> {
        Ok(Accepted::default())
    }

    fn sync_packages(&self, status: &StatusBuckets) -> Result<Vec<String>> {
        let mut warnings = Vec::new();
        // Removals first: switching tracking mode reuses the same checkout dir.
        self.each(&status.removed, "remove", &mut warnings, |r| self.uninstall(r));
        self.each(&status.missing, "clone", &mut warnings, |r| self.install(r));
        self.each(&status.updated, "update", &mut warnings, |r| self.update(r));
        Ok(warnings)
    }

    fn sync_dependencies(&self, _status: &StatusBuckets) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

/// `owner/repo` style URL to its checkout name (`repo`)
fn repo_name(url: &str) -> String {
    url.trim()
        .trim_end_matches('/')
        .rsplit(['/', ':'])
        .next()
        .unwrap_or_default()
        .trim_end_matches(".git")
        .to_string()
}

fn normalize_url(url: &str) -> &str {
    url.trim().trim_end_matches('/').trim_end_matches(".git")
}

/// Tag names from `git ls-remote --tags`
fn parse_remote_tags(output: &str) -> Vec<String> {
    let mut tags: Vec<String> = runner::lines(output)
        .filter_map(|line| line.split('\t').nth(1))
        .filter_map(|r| r.strip_prefix("refs/tags/"))
        .map(|t| t.trim_end_matches("^{}").to_string())
        .collect();
    tags.sort();
    tags.dedup();
    tags
}

/// Short hash from `git ls-remote <url> HEAD`
fn parse_remote_head(output: &str) -> Option<String> {
    runner::lines(output)
        .next()
        .and_then(|line| line.split_whitespace().next())
        .map(|hash| hash.chars().take(7).collect())
}

/// Semantic version of a tag, ignoring a leading `v`
fn tag_version(tag: &str) -> Option<Version> {
    Version::parse(tag.strip_prefix('v').unwrap_or(tag)).ok()
}

/// Newest tag by semantic version
///
/// Pre-releases are skipped unless `include_unstable` is set. Tags that are
/// not semantic versions only count when no tag is, and then compare
/// lexically.
fn newest_tag(tags: &[String], include_unstable: bool) -> Option<String> {
    let mut versioned = Vec::new();
    let mut other = Vec::new();
    for tag in tags.iter().filter(|t| t.as_str() != "latest") {
        match tag_version(tag) {
            Some(version) if include_unstable || version.pre.is_empty() => {
                versioned.push((version, tag));
            }
            Some(_) => {}
            None => other.push(tag),
        }
    }

    versioned
        .into_iter()
        .max_by(|(a, _), (b, _)| a.cmp(b))
        .map(|(_, tag)| tag.clone())
        .or_else(|| other.into_iter().max().cloned())
}

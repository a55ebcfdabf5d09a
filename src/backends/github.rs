//! GitHub backend: binaries published as release assets
//!
//! A package is `github.com/<owner>/<repo>:<asset>`, where the asset name
//! carries a `#version#` placeholder, e.g.
//! `github.com/FreeCAD/FreeCAD:FreeCAD-#version#-Linux-x86_64.AppImage`.
//!
//! Downloads are stored as `<owner>.<repo>.<version>` with the version
//! base64 encoded, so the installed version is read back from the directory
//! listing alone.

use anyhow::{Context, Result, bail};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use reconcile::{Accepted, Backend, CommandKind, LiveItem, StatusBuckets};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use crate::http;

const HOST: &str = "github.com";

const VERSION_PLACEHOLDER: &str = "#version#";

/// Token sent with API requests when set, lifting the anonymous rate limit
const TOKEN_ENV: &str = "GITHUB_TOKEN";

pub struct Github {
    package_directory: Option<PathBuf>,
    bin_directory: Option<PathBuf>,
    symlink_to_bin: bool,
    api_base: String,
}

/// A declared release asset
#[derive(Debug, Clone, PartialEq, Eq)]
struct AssetRef<'a> {
    owner: &'a str,
    repo: &'a str,
    pattern: &'a str,
}

impl<'a> AssetRef<'a> {
    /// Parse a canonical entry (`github.com/owner/repo:asset`)
    fn parse(entry: &'a str) -> Result<Self> {
        let (path, pattern) = entry
            .split_once(':')
            .with_context(|| format!("'{entry}' names no release asset"))?;
        let mut parts = path.split('/');
        let (Some(HOST), Some(owner), Some(repo), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            bail!("'{entry}' is not a github.com/<owner>/<repo> reference");
        };
        if owner.is_empty() || repo.is_empty() || pattern.contains(':') {
            bail!("'{entry}' is malformed");
        }
        if !pattern.contains(VERSION_PLACEHOLDER) {
            bail!("'{entry}' has no {VERSION_PLACEHOLDER} placeholder in the asset name");
        }
        Ok(Self {
            owner,
            repo,
            pattern,
        })
    }

    fn name(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }

    /// Asset names to look for in a release tagged `tag`
    ///
    /// Projects tag `v1.2.3` but often name assets `tool-1.2.3`, so the
    /// bare version is tried too.
    fn asset_names(&self, tag: &str) -> Vec<String> {
        let mut names = vec![self.pattern.replace(VERSION_PLACEHOLDER, tag)];
        if let Some(bare) = tag.strip_prefix('v') {
            names.push(self.pattern.replace(VERSION_PLACEHOLDER, bare));
        }
        names
    }

    fn file_name(&self, version: &str) -> String {
        format!("{}.{}.{}", self.owner, self.repo, URL_SAFE_NO_PAD.encode(version))
    }
}

/// Strip the URL scheme and validate the reference
fn sanitize(entry: &str) -> Result<String> {
    let trimmed = entry.trim();
    let bare = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
        .unwrap_or(trimmed);
    AssetRef::parse(bare)?;
    Ok(bare.to_string())
}

/// `owner/repo` and version from a stored file name
fn parse_file_name(file_name: &str) -> Option<(String, String)> {
    let (head, encoded) = file_name.rsplit_once('.')?;
    let (owner, repo) = head.split_once('.')?;
    let version = URL_SAFE_NO_PAD.decode(encoded).ok()?;
    let version = String::from_utf8(version).ok()?;
    Some((format!("{owner}/{repo}"), version.trim().to_string()))
}

#[derive(Debug, Deserialize)]
struct GithubRelease {
    tag_name: String,
    #[serde(default)]
    assets: Vec<GithubAsset>,
}

#[derive(Debug, Deserialize)]
struct GithubAsset {
    name: String,
    browser_download_url: String,
}

fn find_asset<'r>(release: &'r GithubRelease, asset: &AssetRef) -> Result<&'r GithubAsset> {
    let wanted = asset.asset_names(&release.tag_name);
    release
        .assets
        .iter()
        .find(|a| wanted.contains(&a.name))
        .with_context(|| {
            format!(
                "Release {} of {} has no asset named {}",
                release.tag_name,
                asset.name(),
                wanted.join(" or ")
            )
        })
}

impl Github {
    pub fn new(
        package_directory: Option<PathBuf>,
        bin_directory: Option<PathBuf>,
        symlink_to_bin: bool,
    ) -> Self {
        Self {
            package_directory,
            bin_directory,
            symlink_to_bin,
            api_base: "https://api.github.com".to_string(),
        }
    }

    fn root(&self) -> Result<&Path> {
        self.package_directory
            .as_deref()
            .context("github.package_directory is not set")
    }

    fn latest_url(&self, asset: &AssetRef) -> String {
        format!(
            "{}/repos/{}/{}/releases/latest",
            self.api_base, asset.owner, asset.repo
        )
    }

    fn latest_release(&self, asset: &AssetRef) -> Result<GithubRelease> {
        let token = std::env::var(TOKEN_ENV).ok().map(|t| format!("Bearer {t}"));
        let mut headers = vec![("Accept", "application/vnd.github+json")];
        if let Some(token) = &token {
            headers.push(("Authorization", token.as_str()));
        }
        http::get_json(&self.latest_url(asset), &headers)
    }

    /// Installed `owner/repo` to version
    fn installed(&self) -> Result<HashMap<String, String>> {
        let root = self.root()?;
        if !root.is_dir() {
            return Ok(HashMap::new());
        }

        let mut found = HashMap::new();
        for entry in fs::read_dir(root)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some((name, version)) = entry.file_name().to_str().and_then(parse_file_name) {
                found.insert(name, version);
            }
        }
        Ok(found)
    }

    fn link_path(&self, asset: &AssetRef) -> Option<PathBuf> {
        self.bin_directory
            .as_ref()
            .filter(|_| self.symlink_to_bin)
            .map(|bin| bin.join(asset.repo.to_lowercase()))
    }

    fn install(&self, entry: &str) -> Result<()> {
        let asset = AssetRef::parse(entry)?;
        let release = self.latest_release(&asset)?;
        let download = find_asset(&release, &asset)?;
        let bytes = http::download(&download.browser_download_url)?;

        let path = self.root()?.join(asset.file_name(&release.tag_name));
        fs::write(&path, bytes).with_context(|| format!("Could not write {}", path.display()))?;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755))?;
        log::info!("Stored {} {} at {}", asset.name(), release.tag_name, path.display());

        if let Some(link) = self.link_path(&asset) {
            if link.symlink_metadata().is_ok() {
                fs::remove_file(&link)?;
            }
            std::os::unix::fs::symlink(&path, &link)
                .with_context(|| format!("Could not link {}", link.display()))?;
        }
        Ok(())
    }

    fn uninstall(&self, entry: &str) -> Result<()> {
        let asset = AssetRef::parse(entry)?;
        let name = asset.name();
        let root = self.root()?;

        for file in fs::read_dir(root)? {
            let path = file?.path();
            let owned = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(parse_file_name)
                .is_some_and(|(n, _)| n == name);
            if owned && path.is_file() {
                fs::remove_file(&path)
                    .with_context(|| format!("Could not delete {}", path.display()))?;
            }
        }

        if let Some(link) = self.link_path(&asset)
            && link.symlink_metadata().is_ok_and(|m| m.file_type().is_symlink())
        {
            fs::remove_file(&link)?;
        }
        Ok(())
    }

    fn each(
        items: &[LiveItem],
        verb: &str,
        warnings: &mut Vec<String>,
        action: impl Fn(&str) -> Result<()>,
    ) {
        for item in items {
            if let Err(e) = action(&item.full_name) {
                log::warn!("Could not {verb} {}: {e:#}", item.full_name);
                warnings.push(format!("Could not {verb} '{}': {e}", item.name));
            }
        }
    }
}

impl Backend for Github {
    fn name(&self) -> &str {
        "github"
    }

    fn icon(&self) -> &str {
        "H"
    }

    fn short_desc(&self) -> &str {
        "Manage GitHub release assets"
    }

    fn long_desc(&self) -> &str {
        "Downloads assets from the latest GitHub release of a repository and \
         keeps them current. Declare packages as \
         'github.com/<owner>/<repo>:<asset-#version#-name>'. Set GITHUB_TOKEN \
         to raise the API rate limit."
    }

    fn needs_sudo(&self, _command: CommandKind) -> bool {
        false
    }

    fn check_command_available(&self) -> Result<()> {
        Ok(())
    }

    fn check_config_valid(&self) -> Result<()> {
        let root = self.root()?;
        if !root.is_dir() {
            bail!("package_directory {} is not a directory", root.display());
        }
        if self.symlink_to_bin && self.bin_directory.is_none() {
            bail!("github.bin_directory must be set when symlink_to_bin is true");
        }
        Ok(())
    }

    fn canonical_package(&self, name: &str) -> String {
        sanitize(name).unwrap_or_else(|_| name.to_string())
    }

    fn package_names(&self, packages: &[String]) -> Vec<String> {
        packages
            .iter()
            .map(|p| AssetRef::parse(p).map_or_else(|_| p.clone(), |a| a.name()))
            .collect()
    }

    fn install_valid_args(&self, _partial: &str, _dependency: bool) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    fn add_packages(&self, packages: &[String]) -> Result<Accepted> {
        let mut accepted = Accepted::default();
        for package in packages {
            match sanitize(package) {
                Ok(entry) => accepted.objects.push(entry),
                Err(e) => accepted.warnings.push(e.to_string()),
            }
        }
        Ok(accepted)
    }

    fn add_dependencies(&self, dependencies: &[String]) -> Result<Accepted> {
        Ok(Accepted {
            objects: Vec::new(),
            warnings: dependencies
                .iter()
                .map(|d| format!("github has no dependencies; ignoring '{d}'"))
                .collect(),
        })
    }

    fn list_packages(&self, wanted: &[String]) -> Result<Vec<LiveItem>> {
        let installed = self.installed()?;
        let mut items: Vec<LiveItem> = Vec::new();

        for entry in wanted {
            if items.iter().any(|i| &i.full_name == entry) {
                continue;
            }
            let Ok(asset) = AssetRef::parse(entry) else {
                log::warn!("Ignoring malformed github entry '{entry}'");
                continue;
            };
            let name = asset.name();
            let Some(version) = installed.get(&name) else {
                continue;
            };
            let latest = self.latest_release(&asset)?.tag_name;
            let mut item = LiveItem::versioned(name, entry.clone(), version.clone(), Some(latest));
            item.repo_url = Some(format!("https://{HOST}/{}/{}", asset.owner, asset.repo));
            items.push(item);
        }
        Ok(items)
    }

    fn list_dependencies(&self, _wanted: &[String]) -> Result<Vec<LiveItem>> {
        Ok(Vec::new())
    }

    fn remove_packages(&self, all: &[String], to_remove: &[String]) -> Result<Accepted> {
        let objects = all
            .iter()
            .filter(|p| {
                AssetRef::parse(p).is_ok_and(|a| to_remove.contains(&a.name()))
            })
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
        Self::each(&status.removed, "remove", &mut warnings, |e| self.uninstall(e));
        Self::each(&status.missing, "download", &mut warnings, |e| self.install(e));
        Self::each(&status.updated, "update", &mut warnings, |e| {
            self.uninstall(e)?;
            self.install(e)
        });
        Ok(warnings)
    }

    fn sync_dependencies(&self, _status: &StatusBuckets) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

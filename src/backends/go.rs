//! Go backend: commands built from source with `go install`
//!
//! A package is a module or command path such as
//! `golang.org/x/tools/gopls`. Installed versions come from the build info
//! embedded in each binary; the latest version comes from deps.dev.

use anyhow::{Context, Result, bail};
use regex::Regex;
use reconcile::{Accepted, Backend, CommandKind, LiveItem, StatusBuckets};
use semver::Version;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use crate::{http, runner};

const DEPS_DEV: &str = "https://api.deps.dev/v3alpha/systems/go/packages";

/// `go install pkg@version` outside a module needs this release
const MIN_GO: Version = Version::new(1, 18, 0);

static GO_VERSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"go(\d+)\.(\d+)(?:\.(\d+))?").expect("Invalid go version regex")
});

/// Major-version path suffix (`/v2`), which never names the binary
static MAJOR_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^v\d+(\.\d+){0,2}$").expect("Invalid major suffix regex"));

pub struct Go;

/// Build info from `go version -m <binary>`
#[derive(Debug, Clone, PartialEq, Eq)]
struct BuildInfo {
    path: String,
    module: String,
    version: String,
}

#[derive(Debug, Deserialize)]
struct DepsDevPackage {
    #[serde(default)]
    versions: Vec<DepsDevVersion>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DepsDevVersion {
    version_key: DepsDevVersionKey,
    #[serde(default)]
    is_default: bool,
}

#[derive(Debug, Deserialize)]
struct DepsDevVersionKey {
    version: String,
}

impl DepsDevPackage {
    fn default_version(&self) -> Option<&str> {
        self.versions
            .iter()
            .find(|v| v.is_default)
            .map(|v| v.version_key.version.as_str())
    }
}

/// Name of the binary `go install` produces for `path`
fn binary_name(path: &str) -> &str {
    let mut segments = path.trim_end_matches('/').rsplit('/');
    let last = segments.next().unwrap_or(path);
    if MAJOR_SUFFIX.is_match(last) {
        segments.next().unwrap_or(last)
    } else {
        last
    }
}

fn parse_build_info(output: &str) -> Option<BuildInfo> {
    let mut path = None;
    let mut module = None;
    for line in runner::lines(output) {
        let mut fields = line.split_whitespace();
        match fields.next() {
            Some("path") => path = fields.next(),
            Some("mod") => module = fields.next().zip(fields.next()),
            _ => {}
        }
    }
    let (module, version) = module?;
    Some(BuildInfo {
        path: path?.to_string(),
        module: module.to_string(),
        version: version.to_string(),
    })
}

/// Toolchain version from `go version`
fn parse_go_version(output: &str) -> Option<Version> {
    let captures = GO_VERSION.captures(output)?;
    let part = |i: usize| captures.get(i).map_or(Ok(0), |m| m.as_str().parse());
    Some(Version::new(part(1).ok()?, part(2).ok()?, part(3).ok()?))
}

fn deps_dev_url(module: &str) -> String {
    format!("{DEPS_DEV}/{}", urlencoding::encode(module))
}

impl Go {
    /// Where `go install` puts binaries: `GOBIN`, else the first `GOPATH`'s bin
    fn bin_dir() -> Result<PathBuf> {
        let gobin = runner::run_capture("go", &["env", "GOBIN"])?;
        if !gobin.is_empty() {
            return Ok(PathBuf::from(gobin));
        }
        let gopath = runner::run_capture("go", &["env", "GOPATH"])?;
        let first = gopath.split(':').next().unwrap_or_default();
        if first.is_empty() {
            bail!("GOPATH is not set");
        }
        Ok(Path::new(first).join("bin"))
    }

    fn build_info(binary: &Path) -> Result<BuildInfo> {
        let output = runner::run_capture("go", &["version", "-m", &binary.to_string_lossy()])?;
        parse_build_info(&output)
            .with_context(|| format!("No build info in {}", binary.display()))
    }

    fn latest_version(module: &str) -> Result<String> {
        let package: DepsDevPackage = http::get_json(&deps_dev_url(module), &[])?;
        package
            .default_version()
            .map(str::to_string)
            .with_context(|| format!("deps.dev reports no default version for {module}"))
    }

    fn install(entry: &str) -> Result<()> {
        runner::run("go", &["install", &format!("{entry}@latest")])
    }

    fn uninstall(bin: &Path, entry: &str) -> Result<()> {
        let binary = bin.join(binary_name(entry));
        if !binary.is_file() {
            bail!("{} is not a file", binary.display());
        }
        fs::remove_file(&binary).with_context(|| format!("Could not delete {}", binary.display()))
    }
}

impl Backend for Go {
    fn name(&self) -> &str {
        "go"
    }

    fn icon(&self) -> &str {
        "O"
    }

    fn short_desc(&self) -> &str {
        "Compile and install Go packages"
    }

    fn long_desc(&self) -> &str {
        "Builds Go commands with 'go install' into GOBIN (or GOPATH/bin). \
         Outdated commands are rebuilt at their latest version on sync."
    }

    fn needs_sudo(&self, _command: CommandKind) -> bool {
        false
    }

    fn check_command_available(&self) -> Result<()> {
        if !runner::command_exists("go") {
            bail!("'go' command not found");
        }
        let output = runner::run_capture("go", &["version"])?;
        let version =
            parse_go_version(&output).with_context(|| format!("Unrecognised go version: {output}"))?;
        if version < MIN_GO {
            bail!("go {MIN_GO} or later is required, found {version}");
        }
        Ok(())
    }

    fn check_config_valid(&self) -> Result<()> {
        Ok(())
    }

    fn package_names(&self, packages: &[String]) -> Vec<String> {
        packages.iter().map(|p| binary_name(p).to_string()).collect()
    }

    fn install_valid_args(&self, _partial: &str, _dependency: bool) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    fn add_packages(&self, packages: &[String]) -> Result<Accepted> {
        let mut accepted = Accepted::default();
        for package in packages {
            let path = package.trim().trim_end_matches('/');
            if path.contains('@') || !path.contains('/') {
                accepted.warnings.push(format!(
                    "'{package}' is not a Go package path, e.g. 'golang.org/x/tools/gopls'"
                ));
            } else {
                accepted.objects.push(path.to_string());
            }
        }
        Ok(accepted)
    }

    fn add_dependencies(&self, dependencies: &[String]) -> Result<Accepted> {
        Ok(Accepted {
            objects: Vec::new(),
            warnings: dependencies
                .iter()
                .map(|d| format!("go has no dependencies; ignoring '{d}'"))
                .collect(),
        })
    }

    fn list_packages(&self, wanted: &[String]) -> Result<Vec<LiveItem>> {
        let bin = Self::bin_dir()?;
        let mut items: Vec<LiveItem> = Vec::new();

        for entry in wanted {
            if items.iter().any(|i| &i.full_name == entry) {
                continue;
            }
            let name = binary_name(entry);
            let binary = bin.join(name);
            if !binary.is_file() {
                continue;
            }

            let info = Self::build_info(&binary)?;
            if info.path != *entry {
                log::warn!(
                    "{} was built from {}, not {entry}; treating as not installed",
                    binary.display(),
                    info.path
                );
                continue;
            }

            let latest = Self::latest_version(&info.module)?;
            let mut item = LiveItem::versioned(name, entry.clone(), info.version, Some(latest));
            item.repo_url = Some(info.module);
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
            .filter(|p| to_remove.iter().any(|r| r == binary_name(p)))
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

        for item in status.missing.iter().chain(&status.updated) {
            if let Err(e) = Self::install(&item.full_name) {
                log::warn!("go install {} failed: {e:#}", item.full_name);
                warnings.push(format!("Could not install '{}': {e}", item.name));
            }
        }

        if !status.removed.is_empty() {
            let bin = Self::bin_dir()?;
            for item in &status.removed {
                if let Err(e) = Self::uninstall(&bin, &item.full_name) {
                    log::warn!("Removing {} failed: {e:#}", item.full_name);
                    warnings.push(format!("Could not remove '{}': {e}", item.name));
                }
            }
        }

        Ok(warnings)
    }

    fn sync_dependencies(&self, _status: &StatusBuckets) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

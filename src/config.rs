//! User configuration (`config.toml`)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::paths;

/// Snapshots kept when the config doesn't say otherwise
pub const DEFAULT_STATE_ROTATIONS: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Active groups for group-conditional manifest sections
    pub groups: Vec<String>,
    /// Number of state snapshots to keep (at most 10)
    pub state_rotations: usize,
    /// One line per package instead of an aligned table
    pub compact_print: bool,
    /// Where tracked state lives; defaults to the platform data dir
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,
    pub managers: ManagersConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            groups: Vec::new(),
            state_rotations: DEFAULT_STATE_ROTATIONS,
            compact_print: false,
            data_dir: None,
            managers: ManagersConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagersConfig {
    pub dnf: DnfConfig,
    pub flatpak: FlatpakConfig,
    pub git: GitConfig,
    pub github: GithubConfig,
    pub go: GoConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DnfConfig {
    pub enabled: bool,
}

impl Default for DnfConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlatpakConfig {
    pub enabled: bool,
    /// Install into the user installation instead of the system one
    pub user_space_installation: bool,
}

impl Default for FlatpakConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            user_space_installation: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GitConfig {
    pub enabled: bool,
    /// Where repositories are cloned; required for the git backend
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package_directory: Option<String>,
    /// Consider pre-release tags (`-rc`, `-beta`, ...) as the latest version
    pub include_unstable_releases: bool,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            package_directory: None,
            include_unstable_releases: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GithubConfig {
    pub enabled: bool,
    /// Where release assets are stored; required for the github backend
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package_directory: Option<String>,
    /// Directory that receives a symlink per installed asset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bin_directory: Option<String>,
    pub symlink_to_bin: bool,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            package_directory: None,
            bin_directory: None,
            symlink_to_bin: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GoConfig {
    pub enabled: bool,
}

impl Default for GoConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Config {
    /// Load config, writing defaults if the file is missing
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::info!("Creating default config at {}", path.display());
            let config = Self::default();
            config.save(path)?;
            return Ok(config);
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Invalid config: {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content).with_context(|| format!("Could not write {}", path.display()))?;
        Ok(())
    }

    /// Retention bound for state snapshots, clamped to the store's cap
    pub fn rotations(&self) -> usize {
        if self.state_rotations > tracker::MAX_SNAPSHOTS {
            log::warn!(
                "state_rotations = {} exceeds the maximum; using {}",
                self.state_rotations,
                tracker::MAX_SNAPSHOTS
            );
            return tracker::MAX_SNAPSHOTS;
        }
        self.state_rotations
    }

    /// Directory holding tracked state
    pub fn data_dir(&self) -> Result<PathBuf> {
        match &self.data_dir {
            Some(dir) => Ok(paths::expand(dir)),
            None => paths::data_dir(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(config.groups.is_empty());
        assert_eq!(config.rotations(), 3);
        assert!(!config.compact_print);
        assert!(config.managers.dnf.enabled);
        assert!(config.managers.git.package_directory.is_none());
    }

    #[test]
    fn test_parse_partial() {
        let config: Config = toml::from_str(
            r#"
groups = ["work", "laptop"]
state_rotations = 5

[managers.git]
package_directory = "~/src/packages"

[managers.flatpak]
enabled = false

[managers.github]
package_directory = "~/apps"
symlink_to_bin = true
bin_directory = "~/.local/bin"
"#,
        )
        .unwrap();

        assert_eq!(config.groups, vec!["work", "laptop"]);
        assert_eq!(config.rotations(), 5);
        assert_eq!(config.managers.git.package_directory.as_deref(), Some("~/src/packages"));
        assert!(config.managers.git.enabled);
        assert!(!config.managers.flatpak.enabled);
        assert!(config.managers.flatpak.user_space_installation);
        assert!(config.managers.github.symlink_to_bin);
        assert_eq!(config.managers.github.bin_directory.as_deref(), Some("~/.local/bin"));
        assert!(config.managers.go.enabled);
    }

    #[test]
    fn test_rotations_clamped() {
        let config = Config {
            state_rotations: 50,
            ..Default::default()
        };
        assert_eq!(config.rotations(), tracker::MAX_SNAPSHOTS);
    }

    #[test]
    fn test_data_dir_from_config() {
        let config = Config {
            data_dir: Some("/srv/packward".to_string()),
            ..Default::default()
        };
        assert_eq!(config.data_dir().unwrap(), PathBuf::from("/srv/packward"));
    }

    #[test]
    fn test_load_creates_default() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");

        let config = Config::load(&path).unwrap();
        assert_eq!(config, Config::default());
        assert!(path.exists());

        let reloaded = Config::load(&path).unwrap();
        assert_eq!(reloaded, config);
    }
}

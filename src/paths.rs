//! Centralized path resolution for packward
//!
//! # Environment Variables
//!
//! - `PACKWARD_CONFIG_DIR` - Override config directory (e.g., `~/dotfiles/packward`)
//! - `PACKWARD_DATA_DIR` - Override data directory (tracked state and snapshots)
//!
//! # Path Resolution Priority
//!
//! For config_dir():
//! 1. `PACKWARD_CONFIG_DIR` environment variable
//! 2. `XDG_CONFIG_HOME/packward` (if set)
//! 3. `~/.config/packward`
//!
//! For data_dir():
//! 1. `PACKWARD_DATA_DIR` environment variable
//! 2. `XDG_DATA_HOME/packward` (if set)
//! 3. `~/.local/share/packward`
//!
//! The `data_dir` key in `config.toml` takes precedence over all of these;
//! see [`crate::config::Config::data_dir`].

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Environment variable for config directory override
pub const ENV_CONFIG_DIR: &str = "PACKWARD_CONFIG_DIR";

/// Environment variable for data directory override
pub const ENV_DATA_DIR: &str = "PACKWARD_DATA_DIR";

const APP_NAME: &str = "packward";

/// Get the packward config directory path
pub fn config_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_CONFIG_DIR) {
        let path = expand(&dir);
        log::debug!(
            "Using config dir from {}: {}",
            ENV_CONFIG_DIR,
            path.display()
        );
        return Ok(path);
    }

    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        let path = PathBuf::from(xdg_config).join(APP_NAME);
        log::debug!("Using XDG_CONFIG_HOME: {}", path.display());
        return Ok(path);
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(".config").join(APP_NAME);
    log::debug!("Using default config dir: {}", path.display());
    Ok(path)
}

/// Get the packward data directory path
pub fn data_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_DATA_DIR) {
        let path = expand(&dir);
        log::debug!("Using data dir from {}: {}", ENV_DATA_DIR, path.display());
        return Ok(path);
    }

    if let Ok(xdg_data) = std::env::var("XDG_DATA_HOME") {
        let path = PathBuf::from(xdg_data).join(APP_NAME);
        log::debug!("Using XDG_DATA_HOME: {}", path.display());
        return Ok(path);
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(".local").join("share").join(APP_NAME);
    log::debug!("Using default data dir: {}", path.display());
    Ok(path)
}

/// `config.toml` inside the config directory
pub fn config_file(config_dir: &Path) -> PathBuf {
    config_dir.join("config.toml")
}

/// `manifest.toml` inside the config directory
pub fn manifest_file(config_dir: &Path) -> PathBuf {
    config_dir.join("manifest.toml")
}

/// The live state database inside the data directory
pub fn state_file(data_dir: &Path) -> PathBuf {
    data_dir.join("state.db")
}

/// Expand ~ and environment variables in a path string.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, MutexGuard, PoisonError};

    /// Serialises tests that touch process environment variables
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn env_lock() -> MutexGuard<'static, ()> {
        ENV_LOCK.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Helper to run a test with temporary env var
    ///
    /// # Safety
    /// Uses unsafe env::set_var/remove_var; callers hold [`env_lock`].
    fn with_env_var<F, R>(key: &str, value: &str, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let original = env::var(key).ok();
        // SAFETY: env-touching tests are serialised by ENV_LOCK
        unsafe { env::set_var(key, value) };
        let result = f();
        match original {
            // SAFETY: env-touching tests are serialised by ENV_LOCK
            Some(v) => unsafe { env::set_var(key, v) },
            None => unsafe { env::remove_var(key) },
        }
        result
    }

    fn without_env_var<F, R>(key: &str, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let original = env::var(key).ok();
        // SAFETY: env-touching tests are serialised by ENV_LOCK
        unsafe { env::remove_var(key) };
        let result = f();
        if let Some(v) = original {
            // SAFETY: env-touching tests are serialised by ENV_LOCK
            unsafe { env::set_var(key, v) };
        }
        result
    }

    #[test]
    fn test_config_dir_env_override() {
        let _guard = env_lock();
        with_env_var(ENV_CONFIG_DIR, "/custom/config/path", || {
            let result = config_dir().unwrap();
            assert_eq!(result, PathBuf::from("/custom/config/path"));
        });
    }

    #[test]
    fn test_data_dir_env_override_with_tilde() {
        let _guard = env_lock();
        let home = dirs::home_dir().unwrap();
        with_env_var(ENV_DATA_DIR, "~/packward-tilde-test", || {
            let result = data_dir().unwrap();
            assert_eq!(result, home.join("packward-tilde-test"));
        });
    }

    #[test]
    fn test_xdg_data_home() {
        let _guard = env_lock();
        without_env_var(ENV_DATA_DIR, || {
            with_env_var("XDG_DATA_HOME", "/tmp/xdg-data-test", || {
                let result = data_dir().unwrap();
                assert_eq!(result, PathBuf::from("/tmp/xdg-data-test/packward"));
            });
        });
    }

    #[test]
    fn test_file_names() {
        let dir = PathBuf::from("/cfg");
        assert_eq!(config_file(&dir), PathBuf::from("/cfg/config.toml"));
        assert_eq!(manifest_file(&dir), PathBuf::from("/cfg/manifest.toml"));
        assert_eq!(state_file(&dir), PathBuf::from("/cfg/state.db"));
    }

    #[test]
    fn test_expand_with_tilde() {
        let result = expand("~/test/path");
        let home = dirs::home_dir().unwrap();
        assert_eq!(result, home.join("test").join("path"));
    }

    #[test]
    fn test_expand_unknown_env_var_unchanged() {
        let result = expand("/path/$NONEXISTENT_VAR_12345/file");
        assert_eq!(result, PathBuf::from("/path/$NONEXISTENT_VAR_12345/file"));
    }
}

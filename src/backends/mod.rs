//! Concrete package managers

mod dnf;
mod flatpak;
mod git;
mod github;
mod go;

use reconcile::{BoxedBackend, Registry};
use std::sync::Arc;

use crate::config::Config;
use crate::paths;

use dnf::Dnf;
use flatpak::Flatpak;
use git::Git;
use github::Github;
use go::Go;

/// Every backend enabled in `config`, in display order
pub fn enabled(config: &Config) -> Vec<BoxedBackend> {
    let managers = &config.managers;
    let mut backends: Vec<BoxedBackend> = Vec::new();

    if managers.dnf.enabled {
        backends.push(Arc::new(Dnf));
    }
    if managers.flatpak.enabled {
        backends.push(Arc::new(Flatpak::new(
            managers.flatpak.user_space_installation,
        )));
    }
    if managers.git.enabled {
        backends.push(Arc::new(Git::new(
            managers.git.package_directory.as_deref().map(paths::expand),
            managers.git.include_unstable_releases,
        )));
    }
    if managers.github.enabled {
        backends.push(Arc::new(Github::new(
            managers.github.package_directory.as_deref().map(paths::expand),
            managers.github.bin_directory.as_deref().map(paths::expand),
            managers.github.symlink_to_bin,
        )));
    }
    if managers.go.enabled {
        backends.push(Arc::new(Go));
    }

    backends
}

/// Probe enabled backends and collect the usable ones
///
/// Returns the registry plus one warning per backend left out.
pub fn registry(config: &Config) -> (Registry, Vec<String>) {
    let mut registry = Registry::new();
    let warnings = enabled(config)
        .into_iter()
        .filter_map(|backend| registry.register(backend))
        .collect();
    (registry, warnings)
}

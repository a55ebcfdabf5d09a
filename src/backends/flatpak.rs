//! Flatpak backend: sandboxed desktop applications

use anyhow::{Result, bail};
use regex::Regex;
use reconcile::{Accepted, Backend, CommandKind, LiveItem, StatusBuckets};
use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use crate::runner;

/// `remote:app.id`, e.g. `flathub:com.slack.Slack`
static APP_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_.-]+:[A-Za-z0-9_-]+(\.[A-Za-z0-9_-]+)+$")
        .expect("Invalid flatpak ref regex")
});

pub struct Flatpak {
    user: bool,
}

impl Flatpak {
    pub fn new(user_space_installation: bool) -> Self {
        Self {
            user: user_space_installation,
        }
    }

    fn scope(&self) -> &'static str {
        if self.user { "--user" } else { "--system" }
    }

    fn run(&self, verb: &str, refs: &[&str]) -> Result<()> {
        let mut args = vec![verb, self.scope(), "--assumeyes", "--noninteractive"];
        args.extend_from_slice(refs);
        runner::run("flatpak", &args)
    }
}

impl Backend for Flatpak {
    fn name(&self) -> &str {
        "flatpak"
    }

    fn icon(&self) -> &str {
        "F"
    }

    fn short_desc(&self) -> &str {
        "Manage Flatpak applications"
    }

    fn long_desc(&self) -> &str {
        "Tracks Flatpak applications declared as 'remote:app.id'. Outdated \
         applications are updated on sync, so there is no need to run \
         'flatpak update' separately."
    }

    fn needs_sudo(&self, _command: CommandKind) -> bool {
        false
    }

    fn check_command_available(&self) -> Result<()> {
        if !runner::command_exists("flatpak") {
            bail!("'flatpak' command not found");
        }
        Ok(())
    }

    fn check_config_valid(&self) -> Result<()> {
        Ok(())
    }

    fn package_names(&self, packages: &[String]) -> Vec<String> {
        packages.iter().map(|p| app_id(p).to_string()).collect()
    }

    fn install_valid_args(&self, _partial: &str, _dependency: bool) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    fn add_packages(&self, packages: &[String]) -> Result<Accepted> {
        let mut accepted = Accepted::default();
        for package in packages {
            if APP_REF.is_match(package) {
                accepted.objects.push(package.clone());
            } else {
                accepted.warnings.push(format!(
                    "Wrong format: '{package}'. Should be 'remote:app.id', e.g. 'flathub:com.slack.Slack'"
                ));
            }
        }
        Ok(accepted)
    }

    fn add_dependencies(&self, dependencies: &[String]) -> Result<Accepted> {
        Ok(Accepted {
            objects: Vec::new(),
            warnings: dependencies
                .iter()
                .map(|d| format!("flatpak has no dependencies; ignoring '{d}'"))
                .collect(),
        })
    }

    fn list_packages(&self, wanted: &[String]) -> Result<Vec<LiveItem>> {
        let installed = runner::run_capture(
            "flatpak",
            &["list", "--app", "--columns=origin,application,version,active", self.scope()],
        )?;
        let updates = runner::run_capture(
            "flatpak",
            &["remote-ls", "--updates", "--columns=origin,application,version,commit", self.scope()],
        )?;

        Ok(live_apps(&parse_rows(&installed), &parse_rows(&updates), wanted))
    }

    fn list_dependencies(&self, _wanted: &[String]) -> Result<Vec<LiveItem>> {
        Ok(Vec::new())
    }

    fn remove_packages(&self, all: &[String], to_remove: &[String]) -> Result<Accepted> {
        let objects = all
            .iter()
            .filter(|p| to_remove.iter().any(|r| r == app_id(p)))
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

        for item in &status.missing {
            let Some((remote, app)) = item.full_name.split_once(':') else {
                warnings.push(format!("Skipping malformed ref '{}'", item.full_name));
                continue;
            };
            if let Err(e) = self.run("install", &[remote, app]) {
                log::warn!("Installing {app} failed: {e:#}");
                warnings.push(format!("Could not install '{app}': {e}"));
            }
        }
        for item in &status.updated {
            let app = app_id(&item.full_name);
            if let Err(e) = self.run("update", &[app]) {
                log::warn!("Updating {app} failed: {e:#}");
                warnings.push(format!("Could not update '{app}': {e}"));
            }
        }
        for item in &status.removed {
            let app = app_id(&item.full_name);
            if let Err(e) = self.run("uninstall", &[app]) {
                log::warn!("Uninstalling {app} failed: {e:#}");
                warnings.push(format!("Could not uninstall '{app}': {e}"));
            }
        }

        Ok(warnings)
    }

    fn sync_dependencies(&self, _status: &StatusBuckets) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

fn app_id(full_name: &str) -> &str {
    full_name
        .split_once(':')
        .map_or(full_name, |(_, app)| app)
}

/// One row of `flatpak list` or `flatpak remote-ls`
#[derive(Debug, Clone, PartialEq, Eq)]
struct Row {
    full_name: String,
    app: String,
    version: Option<String>,
    commit: Option<String>,
}

impl Row {
    /// Version when the app publishes one, otherwise the short commit
    fn label(&self) -> Option<String> {
        self.version
            .clone()
            .or_else(|| self.commit.as_ref().map(|c| c.chars().take(12).collect()))
    }
}

/// Parse tab-separated `origin, application, version, commit` columns
fn parse_rows(output: &str) -> Vec<Row> {
    let non_empty = |s: Option<&str>| {
        s.map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    runner::lines(output)
        .filter_map(|line| {
            let columns: Vec<&str> = if line.contains('\t') {
                line.split('\t').collect()
            } else {
                line.split_whitespace().collect()
            };
            let mut fields = columns.into_iter();
            let origin = fields.next()?.trim();
            let app = fields.next()?.trim();
            if origin.is_empty() || app.is_empty() {
                return None;
            }
            Some(Row {
                full_name: format!("{origin}:{app}"),
                app: app.to_string(),
                version: non_empty(fields.next()),
                commit: non_empty(fields.next()),
            })
        })
        .collect()
}

fn live_apps(installed: &[Row], updates: &[Row], wanted: &[String]) -> Vec<LiveItem> {
    let wanted: HashSet<&str> = wanted.iter().map(String::as_str).collect();
    let updates: HashMap<&str, &Row> = updates.iter().map(|r| (r.full_name.as_str(), r)).collect();

    installed
        .iter()
        .filter(|row| wanted.contains(row.full_name.as_str()))
        .map(|row| {
            let current = row.label().unwrap_or_else(|| "installed".to_string());
            let latest = match updates.get(row.full_name.as_str()) {
                Some(update) => match update.label() {
                    Some(label) if label != current => label,
                    _ => format!("{current} (update)"),
                },
                None => current.clone(),
            };
            LiveItem {
                name: row.app.clone(),
                full_name: row.full_name.clone(),
                installed_version: Some(current),
                latest_version: Some(latest),
                repo_url: None,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_add_packages_validates_ref() {
        let accepted = Flatpak::new(true)
            .add_packages(&strings(&["flathub:com.slack.Slack", "com.slack.Slack", "flathub:slack"]))
            .unwrap();
        assert_eq!(accepted.objects, vec!["flathub:com.slack.Slack"]);
        assert_eq!(accepted.warnings.len(), 2);
    }

    #[test]
    fn test_parse_rows_tab_separated() {
        let rows = parse_rows("flathub\tcom.slack.Slack\t4.36.140\tabc123\nflathub\torg.gimp.GIMP\t\tdef456\n");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].full_name, "flathub:com.slack.Slack");
        assert_eq!(rows[0].version.as_deref(), Some("4.36.140"));
        assert_eq!(rows[1].version, None);
        assert_eq!(rows[1].label().as_deref(), Some("def456"));
    }

    #[test]
    fn test_live_apps_detects_updates() {
        let installed = parse_rows(
            "flathub\tcom.slack.Slack\t4.36.140\taaaa\nflathub\torg.gimp.GIMP\t2.10\tbbbb\nflathub\tcom.other.App\t1.0\tcccc\n",
        );
        let updates = parse_rows("flathub\tcom.slack.Slack\t4.37.0\tdddd\nflathub\torg.gimp.GIMP\t2.10\teeee\n");
        let items = live_apps(
            &installed,
            &updates,
            &strings(&["flathub:com.slack.Slack", "flathub:org.gimp.GIMP"]),
        );

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].latest_version.as_deref(), Some("4.37.0"));
        assert!(items[0].is_outdated());
        assert_eq!(items[1].latest_version.as_deref(), Some("2.10 (update)"));
        assert!(items[1].is_outdated());
    }

    #[test]
    fn test_remove_packages_by_app_id() {
        let all = strings(&["flathub:com.slack.Slack", "flathub:org.gimp.GIMP"]);
        let resolved = Flatpak::new(false)
            .remove_packages(&all, &strings(&["org.gimp.GIMP"]))
            .unwrap();
        assert_eq!(resolved.objects, vec!["flathub:org.gimp.GIMP"]);
    }

    #[test]
    fn test_package_names_strip_remote() {
        let names = Flatpak::new(true).package_names(&strings(&["flathub:com.slack.Slack"]));
        assert_eq!(names, vec!["com.slack.Slack"]);
    }
}

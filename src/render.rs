//! Status display - packward-specific UI

use colored::{ColoredString, Colorize};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use reconcile::{LiveItem, ObjectKind, Reporter, StatusBuckets, StatusTotals, SyncStatus};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Mutex;
use std::time::Duration;

use crate::ui;

/// Bucket a displayed row belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bucket {
    Synced,
    Updated,
    Missing,
    Removed,
}

impl Bucket {
    fn paint(self, text: &str) -> ColoredString {
        match self {
            Bucket::Synced => text.green(),
            Bucket::Updated => text.yellow(),
            Bucket::Missing => text.blue(),
            Bucket::Removed => text.red(),
        }
    }

    /// Version column for the table layout
    fn version(self, item: &LiveItem) -> String {
        let installed = item.installed_version.as_deref().unwrap_or_default();
        let latest = item.latest_version.as_deref().unwrap_or_default();
        match self {
            Bucket::Synced | Bucket::Removed => installed.to_string(),
            Bucket::Updated => format!("{installed} -> {latest}"),
            Bucket::Missing => latest.to_string(),
        }
    }
}

fn rows(buckets: &StatusBuckets) -> impl Iterator<Item = (Bucket, &LiveItem)> {
    buckets
        .synced
        .iter()
        .map(|i| (Bucket::Synced, i))
        .chain(buckets.updated.iter().map(|i| (Bucket::Updated, i)))
        .chain(buckets.missing.iter().map(|i| (Bucket::Missing, i)))
        .chain(buckets.removed.iter().map(|i| (Bucket::Removed, i)))
}

/// Render the full status: dependencies, packages, then a summary line
pub fn format_status(status: &SyncStatus, compact: bool) -> String {
    let mut out = String::new();

    out.push_str("\nDependencies:\n");
    for backend in &status.backends {
        for (bucket, item) in rows(&backend.dependencies) {
            let _ = writeln!(out, "{}", bucket.paint(&format!("{} {}", backend.icon, item.name)));
        }
    }

    out.push_str("\nPackages:\n");
    if compact {
        for backend in &status.backends {
            for (bucket, item) in rows(&backend.packages) {
                let line = match bucket {
                    Bucket::Updated => format!(
                        "{} {} {}",
                        backend.icon,
                        item.name,
                        bucket.version(item)
                    ),
                    _ => format!("{} {}", backend.icon, item.name),
                };
                let _ = writeln!(out, "{}", bucket.paint(&line));
            }
        }
    } else {
        let table: Vec<(Bucket, String, String)> = status
            .backends
            .iter()
            .flat_map(|backend| {
                rows(&backend.packages).map(move |(bucket, item)| {
                    (
                        bucket,
                        format!("{} {}", backend.icon, item.name),
                        bucket.version(item),
                    )
                })
            })
            .collect();
        let width = table
            .iter()
            .map(|(_, label, _)| label.chars().count())
            .max()
            .unwrap_or(0);
        for (bucket, label, version) in &table {
            let padded = format!("{label:<width$}");
            let _ = writeln!(
                out,
                "{}  {}",
                bucket.paint(&padded),
                bucket.paint(version).dimmed()
            );
        }
    }

    out.push('\n');
    out.push_str(&summary_line(status.totals()));
    out
}

/// `N in sync   N to update   N to install   N to remove`
pub fn summary_line(totals: StatusTotals) -> String {
    let mut parts = Vec::new();
    if totals.synced > 0 {
        parts.push(format!("{} in sync", totals.synced).green().to_string());
    }
    if totals.updated > 0 {
        parts.push(format!("{} to update", totals.updated).yellow().to_string());
    }
    if totals.missing > 0 {
        parts.push(format!("{} to install", totals.missing).blue().to_string());
    }
    if totals.removed > 0 {
        parts.push(format!("{} to remove", totals.removed).red().to_string());
    }

    if parts.is_empty() {
        "All packages up to date".green().to_string()
    } else {
        parts.join("   ")
    }
}

/// Terminal reporter: spinners while probing, tables once classified
pub struct TerminalReporter {
    compact: bool,
    multi: MultiProgress,
    spinners: Mutex<HashMap<String, ProgressBar>>,
}

impl TerminalReporter {
    pub fn new(compact: bool) -> Self {
        Self {
            compact,
            multi: MultiProgress::new(),
            spinners: Mutex::new(HashMap::new()),
        }
    }

    fn spinner_style() -> ProgressStyle {
        ProgressStyle::with_template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
    }
}

impl Reporter for TerminalReporter {
    fn probe_started(&self, backend: &str) {
        let pb = self.multi.add(ProgressBar::new_spinner());
        pb.set_style(Self::spinner_style());
        pb.set_message(format!("Listing {backend} packages and dependencies..."));
        pb.enable_steady_tick(Duration::from_millis(100));
        if let Ok(mut spinners) = self.spinners.lock() {
            spinners.insert(backend.to_string(), pb);
        }
    }

    fn probe_finished(&self, backend: &str, ok: bool) {
        let Some(pb) = self
            .spinners
            .lock()
            .ok()
            .and_then(|mut spinners| spinners.remove(backend))
        else {
            return;
        };
        if ok {
            pb.finish_with_message(format!("{} {backend} listed", "✓".green()));
        } else {
            pb.abandon_with_message(format!("{} {backend} failed", "✗".red()));
        }
    }

    fn status(&self, status: &SyncStatus) {
        println!("{}", format_status(status, self.compact));
    }

    fn applying(&self, backend: &str, kind: ObjectKind) {
        ui::info(&format!("Syncing {backend} {}", kind.plural()));
    }

    fn warning(&self, message: &str) {
        ui::warn(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reconcile::BackendStatus;

    fn status() -> SyncStatus {
        SyncStatus {
            backends: vec![BackendStatus {
                backend: "dnf".into(),
                icon: "D".into(),
                dependencies: StatusBuckets {
                    missing: vec![LiveItem::unversioned("atim/lazygit", "atim/lazygit")],
                    ..Default::default()
                },
                packages: StatusBuckets {
                    synced: vec![LiveItem::versioned("htop", "htop", "3.3.0", Some("3.3.0".into()))],
                    updated: vec![LiveItem::versioned(
                        "ripgrep",
                        "ripgrep",
                        "14.0.0",
                        Some("14.1.0".into()),
                    )],
                    ..Default::default()
                },
            }],
        }
    }

    #[test]
    fn test_format_status_table() {
        colored::control::set_override(false);
        let out = format_status(&status(), false);

        assert!(out.contains("Dependencies:\nD atim/lazygit\n"));
        assert!(out.contains("D htop     3.3.0"));
        assert!(out.contains("D ripgrep  14.0.0 -> 14.1.0"));
        assert!(out.ends_with("1 in sync   1 to update   1 to install"));
    }

    #[test]
    fn test_format_status_compact() {
        colored::control::set_override(false);
        let out = format_status(&status(), true);

        assert!(out.contains("D htop\n"));
        assert!(out.contains("D ripgrep 14.0.0 -> 14.1.0\n"));
    }

    #[test]
    fn test_summary_all_up_to_date() {
        colored::control::set_override(false);
        assert_eq!(summary_line(StatusTotals::default()), "All packages up to date");
    }
}

pub mod backends;
pub mod complete;
pub mod install;
pub mod list;
pub mod remove;
pub mod sync;

use reconcile::{ObjectKind, SyncOutcome};

use crate::ui;

fn kind(dependency: bool) -> ObjectKind {
    if dependency {
        ObjectKind::Dependency
    } else {
        ObjectKind::Package
    }
}

/// Closing line for a sync pass
fn report_outcome(outcome: &SyncOutcome) {
    match outcome {
        SyncOutcome::NoChanges => ui::success("Everything is in sync"),
        SyncOutcome::Declined => ui::info("Sync cancelled; nothing was changed"),
        SyncOutcome::Applied { warnings } if warnings.is_empty() => ui::success("Sync complete"),
        SyncOutcome::Applied { warnings } => ui::warn(&format!(
            "Sync complete with {} warning(s)",
            warnings.len()
        )),
    }
}

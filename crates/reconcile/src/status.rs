//! Four-way classification of declared, tracked and live objects

use std::collections::{HashMap, HashSet};

use crate::backend::{Backend, BackendExt};
use crate::types::{LiveItem, ObjectKind, StatusBuckets};

/// Classify one backend's objects of one kind
///
/// Every declared object lands in exactly one of `synced`, `updated` or
/// `missing`. `removed` holds tracked objects that are still installed but
/// no longer declared, so it never overlaps the other three.
pub fn classify<B: Backend + ?Sized>(
    backend: &B,
    kind: ObjectKind,
    desired: &[String],
    tracked: &[String],
    live: &[LiveItem],
) -> StatusBuckets {
    let by_full_name: HashMap<&str, &LiveItem> =
        live.iter().map(|item| (item.full_name.as_str(), item)).collect();

    let mut buckets = StatusBuckets::default();
    let mut declared = HashSet::new();

    for name in desired {
        let full_name = backend.canonical(kind, name);
        if !declared.insert(full_name.clone()) {
            continue;
        }

        match by_full_name.get(full_name.as_str()) {
            None => buckets.missing.push(LiveItem::unversioned(name.clone(), full_name)),
            Some(item) if item.is_outdated() => buckets.updated.push((*item).clone()),
            Some(item) => buckets.synced.push((*item).clone()),
        }
    }

    let mut seen = HashSet::new();
    for full_name in tracked {
        if declared.contains(full_name) || !seen.insert(full_name.as_str()) {
            continue;
        }
        if let Some(item) = by_full_name.get(full_name.as_str()) {
            buckets.removed.push((*item).clone());
        }
    }

    log::debug!(
        "{} {}: {} synced, {} updated, {} missing, {} removed",
        backend.name(),
        kind.plural(),
        buckets.synced.len(),
        buckets.updated.len(),
        buckets.missing.len(),
        buckets.removed.len()
    );

    buckets
}

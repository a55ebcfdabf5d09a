//! Timestamped snapshots of the live store
//!
//! Snapshots live beside the live file and are named
//! `<stem>.<YYYYMMDDTHHMMSS.ffffff>.db`, so lexicographic order is
//! chronological order.

use crate::{Error, Result, RotationResult, StateStore};
use chrono::{Duration, NaiveDateTime, Utc};
use std::fs;
use std::path::PathBuf;

/// Hard cap on retained snapshots
pub const MAX_SNAPSHOTS: usize = 10;

const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S%.6f";

impl StateStore {
    /// Copy the live store to a new snapshot, pruning the oldest ones
    ///
    /// At most `max_snapshots` (clamped to [`MAX_SNAPSHOTS`]) snapshots
    /// remain afterwards, the new one included. A bound of 0 is a no-op.
    pub fn rotate(&self, max_snapshots: usize) -> Result<RotationResult> {
        let bound = max_snapshots.min(MAX_SNAPSHOTS);
        if bound == 0 {
            log::debug!("Snapshot rotation disabled");
            return Ok(RotationResult::default());
        }

        if !self.path.exists() {
            return Err(Error::StoreNotFound(self.path.clone()));
        }

        let mut existing = self.snapshots()?;
        let mut pruned = Vec::new();
        if existing.len() >= bound {
            let excess = existing.len() - bound + 1;
            for old in existing.drain(..excess) {
                fs::remove_file(&old)?;
                log::debug!("Pruned snapshot {}", old.display());
                pruned.push(old);
            }
        }

        let target = self.next_snapshot_path();
        let target_str = target.to_string_lossy().into_owned();
        // VACUUM cannot run inside a transaction; callers hold none here.
        self.conn.execute("VACUUM INTO ?1", [target_str.as_str()])?;

        log::info!(
            "Saved state snapshot {} ({} pruned)",
            target.display(),
            pruned.len()
        );

        Ok(RotationResult {
            created: Some(target),
            pruned,
        })
    }

    /// Existing snapshots, oldest first
    pub fn snapshots(&self) -> Result<Vec<PathBuf>> {
        let Some(dir) = self.path.parent() else {
            return Ok(Vec::new());
        };
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let prefix = format!("{}.", self.stem());
        let mut found = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path == self.path || !path.is_file() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let stamp = name
                .strip_prefix(&prefix)
                .and_then(|rest| rest.strip_suffix(".db"));
            if stamp.is_some_and(is_timestamp) {
                found.push(path);
            }
        }

        found.sort();
        Ok(found)
    }

    fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "state".to_string())
    }

    fn next_snapshot_path(&self) -> PathBuf {
        let dir = self
            .path
            .parent()
            .map(PathBuf::from)
            .unwrap_or_default();
        let stem = self.stem();

        let mut at = Utc::now();
        loop {
            let candidate = dir.join(format!("{stem}.{}.db", at.format(TIMESTAMP_FORMAT)));
            if !candidate.exists() {
                return candidate;
            }
            at += Duration::microseconds(1);
        }
    }
}

fn is_timestamp(stamp: &str) -> bool {
    NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).is_ok()
}

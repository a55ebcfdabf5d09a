//! # Tracker
//!
//! Durable record of "last declared" objects per backend.
//!
//! This crate provides:
//! - A SQLite database with one table per object kind, keyed by
//!   `(backend, full_name)` and carrying a creation timestamp
//! - Scoped transactions that roll back unless explicitly committed
//! - Diff-based replacement of a backend's tracked set
//! - Timestamped snapshot rotation beside the live store
//!
//! ## Example
//!
//! ```no_run
//! use tracker::{ObjectKind, StateStore};
//! use std::path::Path;
//!
//! let mut store = StateStore::open(Path::new("/var/lib/packward/state.db"))?;
//!
//! store.with_transaction(|tx| {
//!     tx.update_package_state("dnf", ["ripgrep", "fd-find"])?;
//!     Ok::<_, tracker::Error>(())
//! })?;
//!
//! let tracked = store.get_state(ObjectKind::Package, "dnf")?;
//! assert_eq!(tracked.len(), 2);
//!
//! store.rotate(3)?;
//! # Ok::<(), tracker::Error>(())
//! ```

mod error;
mod rotation;
mod types;

pub use error::{Error, Result};
pub use rotation::MAX_SNAPSHOTS;
pub use types::{ObjectKind, RotationResult, StateDiff, TrackedRecord};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// The tracked-state database
pub struct StateStore {
    conn: Connection,
    path: PathBuf,
}

impl StateStore {
    /// Open or create a state store at the given path
    ///
    /// Creates the database file and necessary tables if they don't exist.
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(db_path)?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS package_state (
                id INTEGER PRIMARY KEY,
                manager TEXT NOT NULL,
                full_name TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                UNIQUE(manager, full_name)
            );

            CREATE TABLE IF NOT EXISTS dependency_state (
                id INTEGER PRIMARY KEY,
                manager TEXT NOT NULL,
                full_name TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                UNIQUE(manager, full_name)
            );

            CREATE INDEX IF NOT EXISTS idx_package_manager ON package_state(manager);
            CREATE INDEX IF NOT EXISTS idx_dependency_manager ON dependency_state(manager);
            ",
        )?;

        log::debug!("Opened state store at {}", db_path.display());

        Ok(Self {
            conn,
            path: db_path.to_path_buf(),
        })
    }

    /// Path of the live database file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Begin a transaction
    ///
    /// The transaction rolls back when dropped unless [`StateTransaction::commit`]
    /// was called.
    pub fn begin(&mut self) -> Result<StateTransaction<'_>> {
        let tx = self.conn.transaction()?;
        Ok(StateTransaction { tx })
    }

    /// Run `f` inside a transaction, committing only if it returns `Ok`
    ///
    /// Any early return or error from `f` rolls the transaction back.
    pub fn with_transaction<T, E, F>(&mut self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&StateTransaction<'_>) -> std::result::Result<T, E>,
        E: From<Error>,
    {
        let tx = self.begin()?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// Tracked full names for a backend and kind
    pub fn get_state(&self, kind: ObjectKind, backend: &str) -> Result<Vec<String>> {
        query_names(&self.conn, kind, backend)
    }

    /// Tracked package full names for a backend
    pub fn get_package_state(&self, backend: &str) -> Result<Vec<String>> {
        self.get_state(ObjectKind::Package, backend)
    }

    /// Tracked dependency full names for a backend
    pub fn get_dependency_state(&self, backend: &str) -> Result<Vec<String>> {
        self.get_state(ObjectKind::Dependency, backend)
    }

    /// Full tracked records, including creation timestamps
    pub fn records(&self, kind: ObjectKind, backend: &str) -> Result<Vec<TrackedRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT full_name, created_at FROM {} WHERE manager = ?1 ORDER BY id",
            kind.table()
        ))?;

        let rows = stmt.query_map([backend], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (full_name, created_at) = row?;
            let created_at = DateTime::<Utc>::from_timestamp(created_at, 0).ok_or_else(|| {
                Error::InvalidRecord(format!("{full_name}: bad timestamp {created_at}"))
            })?;
            records.push(TrackedRecord {
                backend: backend.to_string(),
                kind,
                full_name,
                created_at,
            });
        }
        Ok(records)
    }
}

/// A scoped transaction over the state store
pub struct StateTransaction<'a> {
    tx: rusqlite::Transaction<'a>,
}

impl StateTransaction<'_> {
    /// Replace the tracked set for a backend and kind by diff
    ///
    /// Rows no longer present are deleted and new rows are inserted. Rows
    /// present in both sets are left untouched so their creation timestamps
    /// survive.
    pub fn update_state<I, S>(&self, kind: ObjectKind, backend: &str, full_names: I) -> Result<StateDiff>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let current: HashSet<String> = query_names(&self.tx, kind, backend)?.into_iter().collect();

        let mut seen = HashSet::new();
        let wanted: Vec<String> = full_names
            .into_iter()
            .map(|s| s.as_ref().to_string())
            .filter(|s| seen.insert(s.clone()))
            .collect();

        let mut diff = StateDiff::default();

        for name in &current {
            if !seen.contains(name) {
                self.tx.execute(
                    &format!(
                        "DELETE FROM {} WHERE manager = ?1 AND full_name = ?2",
                        kind.table()
                    ),
                    params![backend, name],
                )?;
                diff.deleted += 1;
            }
        }

        let now = Utc::now().timestamp();
        for name in &wanted {
            if !current.contains(name) {
                self.tx.execute(
                    &format!(
                        "INSERT INTO {} (manager, full_name, created_at) VALUES (?1, ?2, ?3)",
                        kind.table()
                    ),
                    params![backend, name, now],
                )?;
                diff.inserted += 1;
            }
        }

        if !diff.is_empty() {
            log::debug!(
                "{} {}: {} inserted, {} deleted",
                backend,
                kind.plural(),
                diff.inserted,
                diff.deleted
            );
        }

        Ok(diff)
    }

    /// Replace the tracked package set for a backend
    pub fn update_package_state<I, S>(&self, backend: &str, full_names: I) -> Result<StateDiff>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.update_state(ObjectKind::Package, backend, full_names)
    }

    /// Replace the tracked dependency set for a backend
    pub fn update_dependency_state<I, S>(&self, backend: &str, full_names: I) -> Result<StateDiff>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.update_state(ObjectKind::Dependency, backend, full_names)
    }

    /// Tracked full names as seen inside this transaction
    pub fn get_state(&self, kind: ObjectKind, backend: &str) -> Result<Vec<String>> {
        query_names(&self.tx, kind, backend)
    }

    /// Tracked package full names as seen inside this transaction
    pub fn get_package_state(&self, backend: &str) -> Result<Vec<String>> {
        self.get_state(ObjectKind::Package, backend)
    }

    /// Tracked dependency full names as seen inside this transaction
    pub fn get_dependency_state(&self, backend: &str) -> Result<Vec<String>> {
        self.get_state(ObjectKind::Dependency, backend)
    }

    /// Commit all changes
    pub fn commit(self) -> Result<()> {
        self.tx.commit()?;
        Ok(())
    }

    /// Discard all changes
    pub fn rollback(self) -> Result<()> {
        self.tx.rollback()?;
        Ok(())
    }
}

fn query_names(conn: &Connection, kind: ObjectKind, backend: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT full_name FROM {} WHERE manager = ?1 ORDER BY id",
        kind.table()
    ))?;

    let names = stmt
        .query_map([backend], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(names)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_store(tmp: &TempDir) -> StateStore {
        StateStore::open(&tmp.path().join("state.db")).unwrap()
    }

    #[test]
    fn test_open_creates_db() {
        let tmp = TempDir::new().unwrap();
        let db_path = tmp.path().join("nested").join("state.db");

        let store = StateStore::open(&db_path).unwrap();
        assert!(db_path.exists());
        assert!(store.get_package_state("dnf").unwrap().is_empty());
        assert!(store.get_dependency_state("dnf").unwrap().is_empty());
    }

    #[test]
    fn test_update_and_read_scoped_by_backend_and_kind() {
        let tmp = TempDir::new().unwrap();
        let mut store = open_store(&tmp);

        let tx = store.begin().unwrap();
        tx.update_package_state("dnf", ["ripgrep", "fd-find"]).unwrap();
        tx.update_dependency_state("dnf", ["atim/lazygit"]).unwrap();
        tx.update_package_state("flatpak", ["flathub:org.gimp.GIMP"]).unwrap();
        tx.commit().unwrap();

        assert_eq!(
            store.get_package_state("dnf").unwrap(),
            vec!["ripgrep".to_string(), "fd-find".to_string()]
        );
        assert_eq!(
            store.get_dependency_state("dnf").unwrap(),
            vec!["atim/lazygit".to_string()]
        );
        assert_eq!(store.get_package_state("flatpak").unwrap().len(), 1);
        assert!(store.get_dependency_state("flatpak").unwrap().is_empty());
    }

    #[test]
    fn test_update_is_a_diff() {
        let tmp = TempDir::new().unwrap();
        let mut store = open_store(&tmp);

        let tx = store.begin().unwrap();
        let diff = tx.update_package_state("dnf", ["a", "b"]).unwrap();
        assert_eq!(diff, StateDiff { inserted: 2, deleted: 0 });
        tx.commit().unwrap();

        // Pretend "a" was inserted long ago
        store
            .conn
            .execute(
                "UPDATE package_state SET created_at = 1 WHERE full_name = 'a'",
                [],
            )
            .unwrap();

        let tx = store.begin().unwrap();
        let diff = tx.update_package_state("dnf", ["a", "c"]).unwrap();
        assert_eq!(diff, StateDiff { inserted: 1, deleted: 1 });
        tx.commit().unwrap();

        let records = store.records(ObjectKind::Package, "dnf").unwrap();
        let names: Vec<_> = records.iter().map(|r| r.full_name.as_str()).collect();
        assert_eq!(names, vec!["a", "c"]);
        assert_eq!(records[0].created_at.timestamp(), 1);
    }

    #[test]
    fn test_update_tolerates_duplicate_input() {
        let tmp = TempDir::new().unwrap();
        let mut store = open_store(&tmp);

        let tx = store.begin().unwrap();
        let diff = tx.update_package_state("dnf", ["a", "a", "b"]).unwrap();
        tx.commit().unwrap();

        assert_eq!(diff.inserted, 2);
        assert_eq!(store.get_package_state("dnf").unwrap().len(), 2);
    }

    #[test]
    fn test_unchanged_update_touches_nothing() {
        let tmp = TempDir::new().unwrap();
        let mut store = open_store(&tmp);

        store
            .with_transaction(|tx| tx.update_package_state("git", ["x"]))
            .unwrap();
        let diff = store
            .with_transaction(|tx| tx.update_package_state("git", ["x"]))
            .unwrap();
        assert!(diff.is_empty());
    }

    #[test]
    fn test_dropped_transaction_rolls_back() {
        let tmp = TempDir::new().unwrap();
        let mut store = open_store(&tmp);

        {
            let tx = store.begin().unwrap();
            tx.update_package_state("dnf", ["ripgrep"]).unwrap();
            assert_eq!(tx.get_package_state("dnf").unwrap().len(), 1);
        }

        assert!(store.get_package_state("dnf").unwrap().is_empty());
    }

    #[test]
    fn test_explicit_rollback() {
        let tmp = TempDir::new().unwrap();
        let mut store = open_store(&tmp);

        let tx = store.begin().unwrap();
        tx.update_dependency_state("dnf", ["copr/one"]).unwrap();
        tx.rollback().unwrap();

        assert!(store.get_dependency_state("dnf").unwrap().is_empty());
    }

    #[test]
    fn test_with_transaction_rolls_back_on_error() {
        let tmp = TempDir::new().unwrap();
        let mut store = open_store(&tmp);

        let result: Result<()> = store.with_transaction(|tx| {
            tx.update_package_state("dnf", ["ripgrep"])?;
            Err(Error::InvalidRecord("apply failed".to_string()))
        });

        assert!(result.is_err());
        assert!(store.get_package_state("dnf").unwrap().is_empty());
    }

    #[test]
    fn test_state_survives_reopen() {
        let tmp = TempDir::new().unwrap();
        {
            let mut store = open_store(&tmp);
            store
                .with_transaction(|tx| tx.update_package_state("dnf", ["htop"]))
                .unwrap();
        }

        let store = open_store(&tmp);
        assert_eq!(store.get_package_state("dnf").unwrap(), vec!["htop".to_string()]);
    }
}

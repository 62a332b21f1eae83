//! `SQLite` storage layer for Pygmalion.
//!
//! The store is the source of truth for every indexed fact. It is owned by
//! exactly one thread, the writer thread of the request scheduler, so the
//! handle holds the connection directly, without interior locking.
//!
//! ## Module structure
//!
//! - `schema` - Database schema (DDL)
//! - `helpers` - Row conversion and SQL fragment constants
//! - `commands` - Build-command observations (`SourceFiles` + dictionaries)
//! - `inclusions` - Include-graph edges and includer lookup
//! - `definitions` - Symbol definitions and per-file metadata reset
//! - `edges` - Override and call edges and their graph joins
//! - `refs` - References and range-containment lookup

mod commands;
mod definitions;
mod edges;
mod helpers;
mod inclusions;
mod refs;
mod schema;

pub(crate) use helpers::{
    normalized_dir, row_to_command_info, row_to_def_info, COMMAND_INFO_SELECT, DEF_INFO_SELECT,
};
pub(crate) use schema::SCHEMA;

use std::path::Path;
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Identity baked into the `Metadata` table.
///
/// Injected rather than read from process-wide state so tests can open
/// stores claiming other versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreVersion {
    pub tool: &'static str,
    pub major: i64,
    pub minor: i64,
}

/// The version this build reads and writes.
pub const CURRENT_VERSION: StoreVersion = StoreVersion {
    tool: "pygmalion",
    major: 0,
    minor: 8,
};

/// Page cache size, in KiB (the negative-`cache_size` pragma convention).
const PAGE_CACHE_KIB: i64 = 40 * 1024;

/// Owned handle to the store.
///
/// Opening applies the schema and pins the journaling and locking modes the
/// daemon relies on; prepared statements for the hot paths live in the
/// connection's statement cache and are finalized when the handle drops, on
/// every exit path.
#[derive(Debug)]
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open or create a store, verifying the schema version.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_version(path, CURRENT_VERSION)
    }

    /// Open or create a store claiming a specific tool/version identity.
    pub fn open_with_version(path: &Path, version: StoreVersion) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;

        // Correct under process crash (not power loss: facts are rebuildable).
        // The exclusive lock is justified by the single-process daemon.
        conn.pragma_update(None, "page_size", 4096)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "locking_mode", "EXCLUSIVE")?;
        conn.pragma_update(None, "cache_size", -PAGE_CACHE_KIB)?;
        conn.set_prepared_statement_cache_capacity(64);

        conn.execute_batch(SCHEMA)?;

        let store = Self { conn };
        store.check_version(version)?;
        Ok(store)
    }

    /// Open with retry, for daemon startup racing a previous instance that
    /// still holds the exclusive lock.
    ///
    /// Retries the open up to `attempts` times with `backoff` between tries;
    /// the final failure propagates. A version mismatch is never retried.
    pub fn open_with_retry(path: &Path, attempts: u32, backoff: Duration) -> Result<Self> {
        let mut last_try = 1;
        loop {
            match Self::open(path) {
                Ok(store) => {
                    if last_try > 1 {
                        debug!(attempts = last_try, "store opened after retries");
                    }
                    return Ok(store);
                }
                Err(e @ Error::VersionMismatch { .. }) => return Err(e),
                Err(e) if last_try < attempts => {
                    warn!(error = %e, attempt = last_try, "store open failed, retrying");
                    std::thread::sleep(backoff);
                    last_try += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Verify (or, on first open, record) the tool name and version.
    fn check_version(&self, version: StoreVersion) -> Result<()> {
        let found: Option<(String, i64, i64)> = self
            .conn
            .query_row(
                "SELECT Tool, Major, Minor FROM Metadata LIMIT 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        match found {
            None => {
                self.conn.execute(
                    "INSERT INTO Metadata (Tool, Major, Minor) VALUES (?1, ?2, ?3)",
                    params![version.tool, version.major, version.minor],
                )?;
                Ok(())
            }
            Some((tool, major, minor))
                if tool == version.tool && major == version.major && minor == version.minor =>
            {
                Ok(())
            }
            Some((tool, major, minor)) => Err(Error::VersionMismatch {
                found_tool: tool,
                found_major: major,
                found_minor: minor,
                expected_major: version.major,
                expected_minor: version.minor,
            }),
        }
    }

    /// Access to the underlying connection for this module's submodules.
    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Run `f` inside a transaction.
    ///
    /// The transaction is ended on every exit path: committed when `f`
    /// succeeds, rolled back when it fails or panics (rollback-on-drop).
    /// All multi-statement writes go through here; reads do not.
    pub fn with_transaction<T>(
        &mut self,
        f: impl FnOnce(&Connection) -> Result<T>,
    ) -> Result<T> {
        let tx = self.conn.transaction()?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::Store;
    use std::path::PathBuf;
    use tempfile::TempDir;

    /// A store backed by a throwaway directory.
    pub(crate) fn temp_store() -> (TempDir, Store) {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let store = Store::open(&dir.path().join("test.sqlite")).expect("should open store");
        (dir, store)
    }

    pub(crate) fn temp_db_path() -> (TempDir, PathBuf) {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let path = dir.path().join("test.sqlite");
        (dir, path)
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::temp_db_path;
    use super::*;

    #[test]
    fn open_creates_schema() {
        let (_dir, path) = temp_db_path();
        let store = Store::open(&path).expect("should open");

        let tables: Vec<String> = store
            .conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();

        for table in [
            "Metadata",
            "Files",
            "Paths",
            "BuildCommands",
            "BuildArgs",
            "Kinds",
            "SourceFiles",
            "Inclusions",
            "Definitions",
            "Overrides",
            "Callers",
            "Refs",
        ] {
            assert!(tables.iter().any(|t| t == table), "missing table {table}");
        }
    }

    #[test]
    fn reopen_with_same_version_succeeds() {
        let (_dir, path) = temp_db_path();
        drop(Store::open(&path).expect("first open"));
        drop(Store::open(&path).expect("second open"));
    }

    #[test]
    fn version_mismatch_is_fatal_on_open() {
        let (_dir, path) = temp_db_path();
        drop(
            Store::open_with_version(
                &path,
                StoreVersion {
                    tool: "pygmalion",
                    major: 0,
                    minor: 7,
                },
            )
            .expect("first open"),
        );

        let err = Store::open(&path).expect_err("mismatch should fail");
        assert!(matches!(err, Error::VersionMismatch { found_minor: 7, .. }));
    }

    #[test]
    fn failed_transaction_rolls_back() {
        let (_dir, path) = temp_db_path();
        let mut store = Store::open(&path).expect("open");

        let result: Result<()> = store.with_transaction(|tx| {
            tx.execute(
                "INSERT INTO Files (Hash, Name) VALUES (1, 'a.cpp')",
                [],
            )?;
            Err(Error::Internal("forced failure".to_string()))
        });
        assert!(result.is_err());

        let count: i64 = store
            .conn
            .query_row("SELECT COUNT(*) FROM Files", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}

//! Durable per-PR status: last observed update time and the hidden flag.
//!
//! One row per PR id in `pr_state`. The `schema_version` table tracks
//! forward-only migrations; version 2 adds the `hidden` column in place, so
//! databases written before hiding existed keep their rows.

use std::path::Path;

use chrono::{SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::error::StorageError;

const CURRENT_SCHEMA_VERSION: i64 = 2;

type StoreResult<T> = std::result::Result<T, StorageError>;

/// Outcome of comparing a PR's update time with the stored one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrStatus {
    New,
    Updated,
    Seen,
}

impl PrStatus {
    pub fn badge(&self) -> &'static str {
        match self {
            PrStatus::New => "[NEW]",
            PrStatus::Updated => "[UPDATED]",
            PrStatus::Seen => "[SEEN]",
        }
    }
}

#[cfg(test)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredStatus {
    pub id: u64,
    pub updated_at: String,
    pub last_seen_at: Option<String>,
    pub hidden: bool,
}

pub struct StatusStore {
    conn: Connection,
}

impl std::fmt::Debug for StatusStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusStore").finish_non_exhaustive()
    }
}

impl StatusStore {
    /// Opens (or creates) the database at `path`, creating parent directories
    /// and applying pending migrations.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|source| StorageError::CreateDir {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        info!(path = %path.display(), "opened status store");
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(mut conn: Connection) -> StoreResult<Self> {
        migrate(&mut conn)?;
        Ok(Self { conn })
    }

    /// Classifies a PR against its stored update time, recording what was seen.
    ///
    /// Comparison is exact text equality, so any change (including one that
    /// moves backwards in time) counts as `Updated`.
    pub fn classify(&self, id: u64, updated_at: &str) -> StoreResult<PrStatus> {
        let stored: Option<String> = self
            .conn
            .query_row(
                "SELECT updated_at FROM pr_state WHERE pr_id = ?1",
                params![id as i64],
                |r| r.get(0),
            )
            .optional()?;

        match stored {
            None => {
                self.conn.execute(
                    "INSERT INTO pr_state (pr_id, updated_at, last_seen_at) VALUES (?1, ?2, ?3)",
                    params![id as i64, updated_at, now()],
                )?;
                Ok(PrStatus::New)
            }
            Some(prev) if prev != updated_at => {
                self.conn.execute(
                    "UPDATE pr_state SET updated_at = ?1, last_seen_at = ?2 WHERE pr_id = ?3",
                    params![updated_at, now(), id as i64],
                )?;
                Ok(PrStatus::Updated)
            }
            Some(_) => Ok(PrStatus::Seen),
        }
    }

    pub fn is_hidden(&self, id: u64) -> StoreResult<bool> {
        let hidden: Option<bool> = self
            .conn
            .query_row(
                "SELECT hidden FROM pr_state WHERE pr_id = ?1",
                params![id as i64],
                |r| r.get(0),
            )
            .optional()?;
        Ok(hidden.unwrap_or(false))
    }

    /// Sets the hidden flag. Returns `false` without error when the PR has
    /// never been classified, since there is no row to update.
    pub fn set_hidden(&self, id: u64, hidden: bool) -> StoreResult<bool> {
        let changed = self.conn.execute(
            "UPDATE pr_state SET hidden = ?1 WHERE pr_id = ?2",
            params![hidden, id as i64],
        )?;
        if changed == 0 {
            debug!(id, "set_hidden on unknown PR ignored");
        }
        Ok(changed > 0)
    }

    #[cfg(test)]
    pub fn get(&self, id: u64) -> StoreResult<Option<StoredStatus>> {
        let row = self
            .conn
            .query_row(
                "SELECT pr_id, updated_at, last_seen_at, hidden FROM pr_state WHERE pr_id = ?1",
                params![id as i64],
                |r| {
                    Ok(StoredStatus {
                        id: r.get::<_, i64>(0)? as u64,
                        updated_at: r.get(1)?,
                        last_seen_at: r.get(2)?,
                        hidden: r.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    /// Leaves the store without its table so every query fails.
    #[cfg(test)]
    pub(crate) fn drop_state_table(&self) {
        self.conn.execute_batch("DROP TABLE pr_state;").unwrap();
    }

    /// Closes the underlying connection, surfacing any error from SQLite.
    /// Dropping the store closes it too, silently.
    pub fn close(self) -> StoreResult<()> {
        self.conn.close().map_err(|(_, e)| StorageError::Sqlite(e))
    }
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn column_exists(conn: &Connection, table: &str, column: &str) -> rusqlite::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM pragma_table_info(?1) WHERE name = ?2",
        params![table, column],
        |r| r.get(0),
    )?;
    Ok(count > 0)
}

/// Runs forward-only migrations up to `CURRENT_SCHEMA_VERSION`. Idempotent.
fn migrate(conn: &mut Connection) -> StoreResult<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version > CURRENT_SCHEMA_VERSION {
        return Err(StorageError::UnsupportedVersion {
            found: version,
            supported: CURRENT_SCHEMA_VERSION,
        });
    }
    if version == CURRENT_SCHEMA_VERSION {
        return Ok(());
    }

    let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;

    // A pre-existing unversioned table is kept as-is.
    if version < 1 {
        tx.execute_batch(
            "CREATE TABLE IF NOT EXISTS pr_state (
                pr_id        INTEGER PRIMARY KEY,
                updated_at   TEXT NOT NULL,
                last_seen_at TEXT
            );",
        )?;
    }

    if version < 2 && !column_exists(&tx, "pr_state", "hidden")? {
        tx.execute_batch("ALTER TABLE pr_state ADD COLUMN hidden INTEGER NOT NULL DEFAULT 0;")?;
    }

    tx.execute("DELETE FROM schema_version", [])?;
    tx.execute(
        "INSERT INTO schema_version (version) VALUES (?1)",
        params![CURRENT_SCHEMA_VERSION],
    )?;
    tx.commit()?;

    info!(from = version, to = CURRENT_SCHEMA_VERSION, "migrated status store");
    Ok(())
}

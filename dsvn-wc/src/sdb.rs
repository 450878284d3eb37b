//! Relational store wrapper
//!
//! One sqlite file per WCROOT, opened in WAL mode with a cached-statement
//! connection. This layer owns the schema, the format version handling and
//! the small codec helpers shared by the node layers.

use crate::checksum::Checksum;
use crate::error::{Result, WcError};
use crate::properties::PropertySet;
use rusqlite::{Connection, OpenFlags};
use std::path::Path;
use std::sync::Mutex;

/// Newest store format this build understands.
pub const WC_FORMAT_VERSION: i32 = 2;

/// Oldest format the upgrade scripts can start from.
pub const WC_MIN_FORMAT_VERSION: i32 = 1;

/// Escape character for LIKE expressions over path prefixes. Must match the
/// ESCAPE clauses in the recursive queries.
pub(crate) const LIKE_ESCAPE_CHAR: char = '#';

/// Format 1 schema. Later formats are expressed as upgrade scripts so a
/// fresh store is created by running the whole ladder.
const SCHEMA_SQL: &str = "\
CREATE TABLE repository (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  root_url TEXT UNIQUE NOT NULL,
  uuid TEXT NOT NULL
);
CREATE INDEX i_repository_uuid ON repository (uuid);

CREATE TABLE wcroot (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  local_abspath TEXT UNIQUE
);

CREATE TABLE base_node (
  wc_id INTEGER NOT NULL,
  local_relpath TEXT NOT NULL,
  repos_id INTEGER,
  repos_relpath TEXT,
  parent_relpath TEXT,
  presence TEXT NOT NULL,
  kind TEXT NOT NULL,
  revision INTEGER,
  checksum TEXT,
  translated_size INTEGER,
  changed_rev INTEGER,
  changed_date INTEGER,
  changed_author TEXT,
  depth TEXT,
  symlink_target TEXT,
  last_mod_time INTEGER,
  properties BLOB,
  dav_cache BLOB,
  PRIMARY KEY (wc_id, local_relpath)
);
CREATE INDEX i_base_parent ON base_node (wc_id, parent_relpath);

CREATE TABLE working_node (
  wc_id INTEGER NOT NULL,
  local_relpath TEXT NOT NULL,
  parent_relpath TEXT,
  presence TEXT NOT NULL,
  kind TEXT NOT NULL,
  checksum TEXT,
  translated_size INTEGER,
  changed_rev INTEGER,
  changed_date INTEGER,
  changed_author TEXT,
  depth TEXT,
  symlink_target TEXT,
  copyfrom_repos_id INTEGER,
  copyfrom_repos_relpath TEXT,
  copyfrom_revision INTEGER,
  moved_here INTEGER,
  moved_to TEXT,
  last_mod_time INTEGER,
  properties BLOB,
  PRIMARY KEY (wc_id, local_relpath)
);
CREATE INDEX i_working_parent ON working_node (wc_id, parent_relpath);

CREATE TABLE actual_node (
  wc_id INTEGER NOT NULL,
  local_relpath TEXT NOT NULL,
  parent_relpath TEXT,
  properties BLOB,
  conflict_old TEXT,
  conflict_new TEXT,
  conflict_working TEXT,
  prop_reject TEXT,
  changelist TEXT,
  tree_conflict_data BLOB,
  PRIMARY KEY (wc_id, local_relpath)
);

CREATE TABLE pristine (
  checksum TEXT NOT NULL PRIMARY KEY,
  size INTEGER NOT NULL,
  refcount INTEGER
);

CREATE TABLE lock (
  repos_id INTEGER NOT NULL,
  repos_relpath TEXT NOT NULL,
  lock_token TEXT NOT NULL,
  lock_owner TEXT,
  lock_comment TEXT,
  lock_date INTEGER,
  PRIMARY KEY (repos_id, repos_relpath)
);

CREATE TABLE work_queue (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  work BLOB NOT NULL
);

CREATE TABLE wc_lock (
  wc_id INTEGER NOT NULL,
  local_relpath TEXT NOT NULL,
  PRIMARY KEY (wc_id, local_relpath)
);
";

/// Upgrade scripts, indexed by target format.
const UPGRADE_SQL: &[(i32, &str)] = &[(
    2,
    "CREATE INDEX IF NOT EXISTS i_actual_parent ON actual_node (wc_id, parent_relpath);",
)];

/// How an `Sdb` is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SdbMode {
    ReadOnly,
    ReadWrite,
    RwCreate,
}

/// A single open store file.
#[derive(Debug)]
pub(crate) struct Sdb {
    conn: Mutex<Connection>,
    format: i32,
}

impl Sdb {
    /// Open (or create) the store at SDB_ABSPATH and bring the schema to a
    /// usable state. Fails with `UnsupportedFormat` when the file is newer
    /// than this build or older than the upgrade ladder reaches, and with
    /// `UpgradeRequired` when an upgrade is needed but AUTO_UPGRADE is off.
    pub(crate) fn open(sdb_abspath: &Path, mode: SdbMode, auto_upgrade: bool) -> Result<Sdb> {
        let flags = match mode {
            SdbMode::ReadOnly => OpenFlags::SQLITE_OPEN_READ_ONLY,
            SdbMode::ReadWrite => OpenFlags::SQLITE_OPEN_READ_WRITE,
            SdbMode::RwCreate => {
                OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE
            }
        };
        let conn = Connection::open_with_flags(sdb_abspath, flags)?;

        if mode != SdbMode::ReadOnly {
            conn.pragma_update(None, "journal_mode", "WAL")?;
            conn.pragma_update(None, "synchronous", "NORMAL")?;
        }
        // Path prefix matching must not fold case.
        conn.pragma_update(None, "case_sensitive_like", "1")?;

        let mut format = schema_version(&conn)?;

        if format == 0 {
            if mode != SdbMode::RwCreate {
                return Err(WcError::corrupt(sdb_abspath, "store has no schema"));
            }
            conn.execute_batch("BEGIN")?;
            let created: Result<i32> = (|| {
                conn.execute_batch(SCHEMA_SQL)?;
                let mut version = WC_MIN_FORMAT_VERSION;
                for (target, sql) in UPGRADE_SQL {
                    conn.execute_batch(sql)?;
                    version = *target;
                }
                set_schema_version(&conn, version)?;
                Ok(version)
            })();
            match created {
                Ok(version) => {
                    conn.execute_batch("COMMIT")?;
                    format = version;
                }
                Err(e) => {
                    let _ = conn.execute_batch("ROLLBACK");
                    return Err(e);
                }
            }
        }

        if format > WC_FORMAT_VERSION || format < WC_MIN_FORMAT_VERSION {
            return Err(WcError::UnsupportedFormat {
                path: sdb_abspath.to_path_buf(),
                format,
            });
        }

        if format < WC_FORMAT_VERSION {
            if !auto_upgrade {
                return Err(WcError::UpgradeRequired(sdb_abspath.to_path_buf()));
            }
            format = upgrade(&conn, sdb_abspath, format)?;
        }

        Ok(Sdb {
            conn: Mutex::new(conn),
            format,
        })
    }

    pub(crate) fn format(&self) -> i32 {
        self.format
    }

    /// Run F against the connection.
    pub(crate) fn with<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let guard = self.conn.lock().unwrap();
        f(&guard)
    }

    /// Run F inside a transaction: commit on success, roll back on any
    /// returned error.
    pub(crate) fn with_transaction<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let mut guard = self.conn.lock().unwrap();
        let tx = guard.transaction().map_err(WcError::from)?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// Fail with `CleanupRequired` when the work queue has pending items.
    pub(crate) fn verify_no_work(&self, wcroot_abspath: &Path) -> Result<()> {
        let busy = self.with(|conn| {
            let mut stmt = conn.prepare_cached("SELECT id FROM work_queue LIMIT 1")?;
            Ok(stmt.exists([])?)
        })?;
        if busy {
            return Err(WcError::CleanupRequired(wcroot_abspath.to_path_buf()));
        }
        Ok(())
    }
}

fn schema_version(conn: &Connection) -> Result<i32> {
    Ok(conn.query_row("PRAGMA user_version", [], |row| row.get(0))?)
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.pragma_update(None, "user_version", version)?;
    Ok(())
}

/// Apply every upgrade script past FROM, in order, each inside its own
/// transaction together with the version bump.
fn upgrade(conn: &Connection, sdb_abspath: &Path, from: i32) -> Result<i32> {
    let mut format = from;
    for (target, sql) in UPGRADE_SQL {
        if *target <= format {
            continue;
        }
        conn.execute_batch("BEGIN")?;
        let applied: Result<()> = (|| {
            conn.execute_batch(sql)?;
            set_schema_version(conn, *target)?;
            Ok(())
        })();
        match applied {
            Ok(()) => conn.execute_batch("COMMIT")?,
            Err(e) => {
                let _ = conn.execute_batch("ROLLBACK");
                return Err(e);
            }
        }
        tracing::info!(
            "upgraded store {} from format {} to {}",
            sdb_abspath.display(),
            format,
            target
        );
        format = *target;
    }
    Ok(format)
}

/// Escape '%', '_' and the escape character itself so a path prefix can be
/// used literally in a LIKE expression.
pub(crate) fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if c == '%' || c == '_' || c == LIKE_ESCAPE_CHAR {
            out.push(LIKE_ESCAPE_CHAR);
        }
        out.push(c);
    }
    out
}

/// LIKE pattern matching every proper descendant of RELPATH ("" matches the
/// whole tree).
pub(crate) fn like_prefix(relpath: &str) -> String {
    if relpath.is_empty() {
        "%".to_string()
    } else {
        format!("{}/%", escape_like(relpath))
    }
}

/// Decode an optional property blob column.
pub(crate) fn props_from_blob(blob: Option<Vec<u8>>, path: &Path) -> Result<Option<PropertySet>> {
    match blob {
        Some(blob) => Ok(Some(PropertySet::from_blob(&blob, path)?)),
        None => Ok(None),
    }
}

/// Decode an optional checksum text column.
pub(crate) fn checksum_from_text(text: Option<String>) -> Result<Option<Checksum>> {
    match text {
        Some(text) => Ok(Some(Checksum::parse(&text)?)),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_create_and_reopen() {
        let tmp = TempDir::new().unwrap();
        let db_path = tmp.path().join("wc.db");

        let sdb = Sdb::open(&db_path, SdbMode::RwCreate, false).unwrap();
        assert_eq!(sdb.format(), WC_FORMAT_VERSION);
        drop(sdb);

        let sdb = Sdb::open(&db_path, SdbMode::ReadWrite, false).unwrap();
        assert_eq!(sdb.format(), WC_FORMAT_VERSION);
    }

    #[test]
    fn test_format_too_new_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let db_path = tmp.path().join("wc.db");
        drop(Sdb::open(&db_path, SdbMode::RwCreate, false).unwrap());

        let conn = Connection::open(&db_path).unwrap();
        conn.pragma_update(None, "user_version", WC_FORMAT_VERSION + 1)
            .unwrap();
        drop(conn);

        match Sdb::open(&db_path, SdbMode::ReadWrite, true) {
            Err(WcError::UnsupportedFormat { format, .. }) => {
                assert_eq!(format, WC_FORMAT_VERSION + 1)
            }
            other => panic!("expected UnsupportedFormat, got {other:?}"),
        }
    }

    #[test]
    fn test_old_format_upgrades_when_allowed() {
        let tmp = TempDir::new().unwrap();
        let db_path = tmp.path().join("wc.db");
        drop(Sdb::open(&db_path, SdbMode::RwCreate, false).unwrap());

        // Age the store back to format 1.
        let conn = Connection::open(&db_path).unwrap();
        conn.execute_batch("DROP INDEX i_actual_parent").unwrap();
        conn.pragma_update(None, "user_version", 1).unwrap();
        drop(conn);

        match Sdb::open(&db_path, SdbMode::ReadWrite, false) {
            Err(WcError::UpgradeRequired(_)) => {}
            other => panic!("expected UpgradeRequired, got {other:?}"),
        }

        let sdb = Sdb::open(&db_path, SdbMode::ReadWrite, true).unwrap();
        assert_eq!(sdb.format(), WC_FORMAT_VERSION);
    }

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let tmp = TempDir::new().unwrap();
        let db_path = tmp.path().join("wc.db");
        let sdb = Sdb::open(&db_path, SdbMode::RwCreate, false).unwrap();

        let result: Result<()> = sdb.with_transaction(|conn| {
            conn.execute(
                "INSERT INTO repository (root_url, uuid) VALUES (?1, ?2)",
                rusqlite::params!["http://r/", "u"],
            )?;
            Err(WcError::NotImplemented("test"))
        });
        assert!(result.is_err());

        let count: i64 = sdb
            .with(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM repository", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_verify_no_work() {
        let tmp = TempDir::new().unwrap();
        let db_path = tmp.path().join("wc.db");
        let sdb = Sdb::open(&db_path, SdbMode::RwCreate, false).unwrap();

        sdb.verify_no_work(tmp.path()).unwrap();

        sdb.with(|conn| {
            conn.execute("INSERT INTO work_queue (work) VALUES (x'00')", [])?;
            Ok(())
        })
        .unwrap();

        match sdb.verify_no_work(tmp.path()) {
            Err(WcError::CleanupRequired(_)) => {}
            other => panic!("expected CleanupRequired, got {other:?}"),
        }
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("plain/path"), "plain/path");
        assert_eq!(escape_like("100%_done"), "100#%#_done");
        assert_eq!(escape_like("a#b"), "a##b");
        assert_eq!(like_prefix(""), "%");
        assert_eq!(like_prefix("a/b"), "a/b/%");
    }
}

//! BASE layer operations
//!
//! The BASE layer mirrors the last-seen repository state. Rows are written
//! by checkout/update and retired by update or commit-of-delete. Repository
//! coordinates are stored sparsely: a null repos_id means "inherit from the
//! nearest ancestor that has one".

use crate::checksum::Checksum;
use crate::error::{Result, WcError};
use crate::paths::relpath_dirname;
use crate::properties::PropertySet;
use crate::read;
use crate::scan;
use crate::types::{Depth, Kind, LockInfo, Status};
use crate::wcroot::{create_repos_id, fetch_repos_info, WcDb};
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

/// Field set for one BASE row insertion.
pub(crate) struct InsertBase {
    pub(crate) wc_id: i64,
    pub(crate) local_relpath: String,
    pub(crate) repos_id: Option<i64>,
    pub(crate) repos_relpath: Option<String>,
    pub(crate) presence: Status,
    pub(crate) kind: Kind,
    pub(crate) revision: Option<i64>,
    pub(crate) props: Option<PropertySet>,
    pub(crate) changed_rev: Option<i64>,
    pub(crate) changed_date: Option<i64>,
    pub(crate) changed_author: Option<String>,
    /// For directories: immediate children to seed as incomplete rows.
    pub(crate) children: Option<Vec<String>>,
    pub(crate) depth: Option<Depth>,
    /// For files.
    pub(crate) checksum: Option<Checksum>,
    pub(crate) translated_size: Option<i64>,
    /// For symlinks.
    pub(crate) target: Option<String>,
}

impl Default for InsertBase {
    fn default() -> Self {
        InsertBase {
            wc_id: 0,
            local_relpath: String::new(),
            repos_id: None,
            repos_relpath: None,
            presence: Status::Normal,
            kind: Kind::Unknown,
            revision: None,
            props: None,
            changed_rev: None,
            changed_date: None,
            changed_author: None,
            children: None,
            depth: None,
            checksum: None,
            translated_size: None,
            target: None,
        }
    }
}

/// Write a BASE row (replacing any previous one) and seed incomplete child
/// rows for directories with a children list.
pub(crate) fn insert_base_node(conn: &Connection, ib: &InsertBase) -> Result<()> {
    // The row for the WCROOT itself keeps a null parent_relpath.
    let parent_relpath = if ib.local_relpath.is_empty() {
        None
    } else {
        Some(relpath_dirname(&ib.local_relpath))
    };

    let depth = match ib.kind {
        Kind::Dir | Kind::Subdir => ib.depth.map(Depth::as_word),
        _ => None,
    };
    let checksum = if ib.kind == Kind::File {
        ib.checksum.as_ref().map(Checksum::to_text)
    } else {
        None
    };
    let translated_size = if ib.kind == Kind::File {
        ib.translated_size
    } else {
        None
    };
    let target = if ib.kind == Kind::Symlink {
        ib.target.clone()
    } else {
        None
    };

    conn.execute(
        "INSERT OR REPLACE INTO base_node (wc_id, local_relpath, repos_id, \
         repos_relpath, parent_relpath, presence, kind, revision, properties, \
         changed_rev, changed_date, changed_author, depth, checksum, \
         translated_size, symlink_target) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
        rusqlite::params![
            ib.wc_id,
            ib.local_relpath,
            ib.repos_id,
            ib.repos_relpath,
            parent_relpath,
            ib.presence.as_presence_token(),
            ib.kind.as_token(),
            ib.revision,
            ib.props.as_ref().map(PropertySet::to_blob),
            ib.changed_rev,
            ib.changed_date,
            ib.changed_author,
            depth,
            checksum,
            translated_size,
            target,
        ],
    )?;

    if ib.kind == Kind::Dir {
        if let Some(children) = &ib.children {
            // Placeholders let the tree be walked before full data arrives.
            // Old children that still have rows are left alone.
            let mut stmt = conn.prepare_cached(
                "INSERT OR IGNORE INTO base_node (wc_id, local_relpath, \
                 parent_relpath, presence, kind, revision) \
                 VALUES (?1, ?2, ?3, 'incomplete', 'unknown', ?4)",
            )?;
            for name in children {
                let child_relpath = crate::paths::relpath_join(&ib.local_relpath, name);
                stmt.execute(rusqlite::params![
                    ib.wc_id,
                    child_relpath,
                    ib.local_relpath,
                    ib.revision,
                ])?;
            }
        }
    }

    Ok(())
}

/// Everything `base_get_info` reports about a BASE node.
#[derive(Debug, Clone)]
pub struct BaseInfo {
    pub status: Status,
    pub kind: Kind,
    pub revision: Option<i64>,
    pub repos_relpath: Option<String>,
    pub repos_root_url: Option<String>,
    pub repos_uuid: Option<String>,
    pub changed_rev: Option<i64>,
    pub changed_date: Option<i64>,
    pub changed_author: Option<String>,
    pub last_mod_time: Option<i64>,
    pub depth: Option<Depth>,
    pub checksum: Option<Checksum>,
    pub translated_size: Option<i64>,
    pub target: Option<String>,
    pub lock: Option<LockInfo>,
}

impl WcDb {
    /// Add (or replace) a BASE directory row, seeding each child as an
    /// incomplete placeholder. Runs in a single transaction.
    #[allow(clippy::too_many_arguments)]
    pub fn base_add_directory(
        &self,
        local_abspath: &Path,
        repos_relpath: &str,
        repos_root_url: &str,
        repos_uuid: &str,
        revision: i64,
        props: &PropertySet,
        changed_rev: i64,
        changed_date: i64,
        changed_author: Option<&str>,
        children: &[String],
        depth: Depth,
    ) -> Result<()> {
        let (resolved, wcroot) = self.parse_path(local_abspath)?;

        wcroot.sdb()?.with_transaction(|conn| {
            let repos_id = create_repos_id(conn, repos_root_url, repos_uuid)?;
            insert_base_node(
                conn,
                &InsertBase {
                    wc_id: wcroot.wc_id,
                    local_relpath: resolved.relpath.clone(),
                    repos_id: Some(repos_id),
                    repos_relpath: Some(repos_relpath.to_string()),
                    presence: Status::Normal,
                    kind: Kind::Dir,
                    revision: Some(revision),
                    props: Some(props.clone()),
                    changed_rev: Some(changed_rev),
                    changed_date: Some(changed_date),
                    changed_author: changed_author.map(str::to_string),
                    children: Some(children.to_vec()),
                    depth: Some(depth),
                    ..Default::default()
                },
            )
        })?;

        self.flush_entries(&resolved.pdh);
        Ok(())
    }

    /// Add (or replace) a BASE file row.
    #[allow(clippy::too_many_arguments)]
    pub fn base_add_file(
        &self,
        local_abspath: &Path,
        repos_relpath: &str,
        repos_root_url: &str,
        repos_uuid: &str,
        revision: i64,
        props: &PropertySet,
        changed_rev: i64,
        changed_date: i64,
        changed_author: Option<&str>,
        checksum: &Checksum,
        translated_size: Option<i64>,
    ) -> Result<()> {
        let (resolved, wcroot) = self.parse_path(local_abspath)?;

        wcroot.sdb()?.with_transaction(|conn| {
            let repos_id = create_repos_id(conn, repos_root_url, repos_uuid)?;
            insert_base_node(
                conn,
                &InsertBase {
                    wc_id: wcroot.wc_id,
                    local_relpath: resolved.relpath.clone(),
                    repos_id: Some(repos_id),
                    repos_relpath: Some(repos_relpath.to_string()),
                    presence: Status::Normal,
                    kind: Kind::File,
                    revision: Some(revision),
                    props: Some(props.clone()),
                    changed_rev: Some(changed_rev),
                    changed_date: Some(changed_date),
                    changed_author: changed_author.map(str::to_string),
                    checksum: Some(checksum.clone()),
                    translated_size,
                    ..Default::default()
                },
            )
        })?;

        self.flush_entries(&resolved.pdh);
        Ok(())
    }

    /// Add (or replace) a BASE symlink row.
    #[allow(clippy::too_many_arguments)]
    pub fn base_add_symlink(
        &self,
        local_abspath: &Path,
        repos_relpath: &str,
        repos_root_url: &str,
        repos_uuid: &str,
        revision: i64,
        props: &PropertySet,
        changed_rev: i64,
        changed_date: i64,
        changed_author: Option<&str>,
        target: &str,
    ) -> Result<()> {
        let (resolved, wcroot) = self.parse_path(local_abspath)?;

        wcroot.sdb()?.with_transaction(|conn| {
            let repos_id = create_repos_id(conn, repos_root_url, repos_uuid)?;
            insert_base_node(
                conn,
                &InsertBase {
                    wc_id: wcroot.wc_id,
                    local_relpath: resolved.relpath.clone(),
                    repos_id: Some(repos_id),
                    repos_relpath: Some(repos_relpath.to_string()),
                    presence: Status::Normal,
                    kind: Kind::Symlink,
                    revision: Some(revision),
                    props: Some(props.clone()),
                    changed_rev: Some(changed_rev),
                    changed_date: Some(changed_date),
                    changed_author: changed_author.map(str::to_string),
                    target: Some(target.to_string()),
                    ..Default::default()
                },
            )
        })?;

        self.flush_entries(&resolved.pdh);
        Ok(())
    }

    /// Record a node the server holds back from us: STATUS must be absent,
    /// excluded or not-present.
    #[allow(clippy::too_many_arguments)]
    pub fn base_add_absent_node(
        &self,
        local_abspath: &Path,
        repos_relpath: &str,
        repos_root_url: &str,
        repos_uuid: &str,
        revision: i64,
        kind: Kind,
        status: Status,
    ) -> Result<()> {
        assert!(matches!(
            status,
            Status::Absent | Status::Excluded | Status::NotPresent
        ));

        let (resolved, wcroot) = self.parse_path(local_abspath)?;

        wcroot.sdb()?.with_transaction(|conn| {
            let repos_id = create_repos_id(conn, repos_root_url, repos_uuid)?;
            insert_base_node(
                conn,
                &InsertBase {
                    wc_id: wcroot.wc_id,
                    local_relpath: resolved.relpath.clone(),
                    repos_id: Some(repos_id),
                    repos_relpath: Some(repos_relpath.to_string()),
                    presence: status,
                    kind,
                    revision: Some(revision),
                    ..Default::default()
                },
            )
        })?;

        self.flush_entries(&resolved.pdh);
        Ok(())
    }

    /// Legacy parent-stub row for a child directory that owns its own store.
    /// Only the migration path writes these; readers collapse them.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn base_add_subdir(
        &self,
        local_abspath: &Path,
        repos_relpath: &str,
        repos_root_url: &str,
        repos_uuid: &str,
        revision: i64,
        depth: Depth,
    ) -> Result<()> {
        let (resolved, wcroot) = self.parse_path(local_abspath)?;

        wcroot.sdb()?.with_transaction(|conn| {
            let repos_id = create_repos_id(conn, repos_root_url, repos_uuid)?;
            insert_base_node(
                conn,
                &InsertBase {
                    wc_id: wcroot.wc_id,
                    local_relpath: resolved.relpath.clone(),
                    repos_id: Some(repos_id),
                    repos_relpath: Some(repos_relpath.to_string()),
                    presence: Status::Normal,
                    kind: Kind::Subdir,
                    revision: Some(revision),
                    depth: Some(depth),
                    ..Default::default()
                },
            )
        })?;

        self.flush_entries(&resolved.pdh);
        Ok(())
    }

    /// Retire the BASE row for a node.
    pub fn base_remove(&self, local_abspath: &Path) -> Result<()> {
        let (resolved, wcroot) = self.parse_path(local_abspath)?;

        wcroot.sdb()?.with(|conn| {
            conn.execute(
                "DELETE FROM base_node WHERE wc_id = ?1 AND local_relpath = ?2",
                rusqlite::params![wcroot.wc_id, resolved.relpath],
            )?;
            Ok(())
        })?;

        self.flush_entries(&resolved.pdh);
        Ok(())
    }

    /// Read the BASE layer of a node, including any repository lock.
    pub fn base_get_info(&self, local_abspath: &Path) -> Result<BaseInfo> {
        let (resolved, wcroot) = self.parse_path(local_abspath)?;

        wcroot.sdb()?.with(|conn| {
            let row = read::get_base_row(conn, wcroot.wc_id, &resolved.relpath, local_abspath)?
                .ok_or_else(|| WcError::PathNotFound(local_abspath.to_path_buf()))?;

            let mut status = row.presence;
            if row.kind == Kind::Subdir && status == Status::Normal {
                // A stub row in the parent means the child's own data is
                // missing or inaccessible here.
                status = Status::Obstructed;
            }

            let (repos_root_url, repos_uuid) = match row.repos_id {
                Some(repos_id) => {
                    let (root, uuid) = fetch_repos_info(conn, repos_id, local_abspath)?;
                    (Some(root), Some(uuid))
                }
                None => (None, None),
            };

            Ok(BaseInfo {
                status,
                kind: row.kind.normalized(),
                revision: row.revision,
                repos_relpath: row.repos_relpath,
                repos_root_url,
                repos_uuid,
                changed_rev: row.changed_rev,
                changed_date: row.changed_date,
                changed_author: row.changed_author,
                last_mod_time: row.last_mod_time,
                depth: match row.kind {
                    Kind::Dir | Kind::Subdir => Some(row.depth.unwrap_or(Depth::Unknown)),
                    _ => None,
                },
                checksum: if row.kind == Kind::File {
                    row.checksum
                } else {
                    None
                },
                translated_size: row.translated_size,
                target: if row.kind == Kind::Symlink {
                    row.symlink_target
                } else {
                    None
                },
                lock: row.lock,
            })
        })
    }

    /// The BASE properties of a node (empty when none were stored).
    pub fn base_get_props(&self, local_abspath: &Path) -> Result<PropertySet> {
        let (resolved, wcroot) = self.parse_path(local_abspath)?;

        wcroot.sdb()?.with(|conn| {
            let blob: Option<Option<Vec<u8>>> = conn
                .query_row(
                    "SELECT properties FROM base_node \
                     WHERE wc_id = ?1 AND local_relpath = ?2",
                    rusqlite::params![wcroot.wc_id, resolved.relpath],
                    |row| row.get(0),
                )
                .optional()?;

            match blob {
                None => Err(WcError::PathNotFound(local_abspath.to_path_buf())),
                Some(None) => Ok(PropertySet::new()),
                Some(Some(blob)) => PropertySet::from_blob(&blob, local_abspath),
            }
        })
    }

    /// The immediate children recorded in the BASE layer.
    pub fn base_get_children(&self, local_abspath: &Path) -> Result<Vec<String>> {
        read::gather_children(self, local_abspath, true)
    }

    /// Stash the DAV cache blob for a node.
    pub fn base_set_dav_cache(
        &self,
        local_abspath: &Path,
        props: Option<&PropertySet>,
    ) -> Result<()> {
        let (resolved, wcroot) = self.parse_path(local_abspath)?;

        let affected = wcroot.sdb()?.with(|conn| {
            Ok(conn.execute(
                "UPDATE base_node SET dav_cache = ?3 \
                 WHERE wc_id = ?1 AND local_relpath = ?2",
                rusqlite::params![
                    wcroot.wc_id,
                    resolved.relpath,
                    props.map(PropertySet::to_blob)
                ],
            )?)
        })?;
        if affected == 0 {
            return Err(WcError::PathNotFound(local_abspath.to_path_buf()));
        }

        self.flush_entries(&resolved.pdh);
        Ok(())
    }

    /// Read back the DAV cache blob for a node.
    pub fn base_get_dav_cache(&self, local_abspath: &Path) -> Result<Option<PropertySet>> {
        let (resolved, wcroot) = self.parse_path(local_abspath)?;

        wcroot.sdb()?.with(|conn| {
            let blob: Option<Option<Vec<u8>>> = conn
                .query_row(
                    "SELECT dav_cache FROM base_node \
                     WHERE wc_id = ?1 AND local_relpath = ?2",
                    rusqlite::params![wcroot.wc_id, resolved.relpath],
                    |row| row.get(0),
                )
                .optional()?;

            match blob {
                None => Err(WcError::PathNotFound(local_abspath.to_path_buf())),
                Some(blob) => crate::sdb::props_from_blob(blob, local_abspath),
            }
        })
    }

    /// Record the on-disk timestamp observed for the node's BASE text.
    pub fn base_set_last_mod_time(&self, local_abspath: &Path, last_mod_time: i64) -> Result<()> {
        let (resolved, wcroot) = self.parse_path(local_abspath)?;

        wcroot.sdb()?.with(|conn| {
            conn.execute(
                "UPDATE base_node SET last_mod_time = ?3 \
                 WHERE wc_id = ?1 AND local_relpath = ?2",
                rusqlite::params![wcroot.wc_id, resolved.relpath, last_mod_time],
            )?;
            Ok(())
        })?;

        self.flush_entries(&resolved.pdh);
        Ok(())
    }

    /// Record a repository-side lock for the node's repository location.
    pub fn lock_add(&self, local_abspath: &Path, lock: &LockInfo) -> Result<()> {
        let (resolved, wcroot) = self.parse_path(local_abspath)?;

        let sdb = wcroot.sdb()?;
        let (repos_id, repos_relpath) = sdb.with(|conn| {
            scan::scan_upwards_for_repos(conn, &wcroot, &resolved.relpath, local_abspath)
        })?;

        sdb.with(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO lock \
                 (repos_id, repos_relpath, lock_token, lock_owner, lock_comment, lock_date) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    repos_id,
                    repos_relpath,
                    lock.token,
                    lock.owner,
                    lock.comment,
                    lock.date,
                ],
            )?;
            Ok(())
        })?;

        self.flush_entries(&resolved.pdh);
        Ok(())
    }

    /// Drop the repository-side lock recorded for the node.
    pub fn lock_remove(&self, local_abspath: &Path) -> Result<()> {
        let (resolved, wcroot) = self.parse_path(local_abspath)?;

        let sdb = wcroot.sdb()?;
        let (repos_id, repos_relpath) = sdb.with(|conn| {
            scan::scan_upwards_for_repos(conn, &wcroot, &resolved.relpath, local_abspath)
        })?;

        sdb.with(|conn| {
            conn.execute(
                "DELETE FROM lock WHERE repos_id = ?1 AND repos_relpath = ?2",
                rusqlite::params![repos_id, repos_relpath],
            )?;
            Ok(())
        })?;

        self.flush_entries(&resolved.pdh);
        Ok(())
    }
}

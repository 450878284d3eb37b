//! Operations on the ACTUAL layer, plus the not-yet-implemented op family
//!
//! ACTUAL rows carry what the user's disk and annotations say: local
//! properties, changelist membership and conflict markers. A row only
//! exists while it has something to say; the helpers here retire rows that
//! go empty. Tree conflicts are stored on the *parent* directory's ACTUAL
//! row as an opaque per-victim blob keyed by basename.

use crate::error::{Result, WcError};
use crate::paths::{abspath_basename, relpath_dirname};
use crate::properties::PropertySet;
use crate::read::get_actual_row;
use crate::types::Depth;
use crate::wcroot::WcDb;
use rusqlite::Connection;
use std::collections::BTreeMap;
use std::path::Path;

/// Decode the per-victim tree conflict mapping stored on a directory.
pub(crate) fn read_tree_conflicts(
    blob: &[u8],
    dir_abspath: &Path,
) -> Result<BTreeMap<String, Vec<u8>>> {
    bincode::deserialize(blob)
        .map_err(|e| WcError::corrupt(dir_abspath, format!("bad tree conflict data: {e}")))
}

/// Serialize the per-victim tree conflict mapping.
pub(crate) fn write_tree_conflicts(conflicts: &BTreeMap<String, Vec<u8>>) -> Vec<u8> {
    bincode::serialize(conflicts).expect("tree conflict serialization")
}

/// Drop an ACTUAL row once every column has gone null.
fn retire_actual_if_empty(conn: &Connection, wc_id: i64, local_relpath: &str) -> Result<()> {
    conn.execute(
        "DELETE FROM actual_node \
         WHERE wc_id = ?1 AND local_relpath = ?2 \
           AND properties IS NULL AND prop_reject IS NULL \
           AND changelist IS NULL AND conflict_old IS NULL \
           AND conflict_new IS NULL AND conflict_working IS NULL \
           AND tree_conflict_data IS NULL",
        rusqlite::params![wc_id, local_relpath],
    )?;
    Ok(())
}

fn parent_relpath_column(local_relpath: &str) -> Option<String> {
    if local_relpath.is_empty() {
        None
    } else {
        Some(relpath_dirname(local_relpath))
    }
}

impl WcDb {
    /// Set (or clear) the user-visible properties on the ACTUAL layer.
    pub fn op_set_props(&self, local_abspath: &Path, props: Option<&PropertySet>) -> Result<()> {
        let (resolved, wcroot) = self.parse_path(local_abspath)?;
        let blob = props.map(PropertySet::to_blob);

        wcroot.sdb()?.with_transaction(|conn| {
            let affected = conn.execute(
                "UPDATE actual_node SET properties = ?3 \
                 WHERE wc_id = ?1 AND local_relpath = ?2",
                rusqlite::params![wcroot.wc_id, resolved.relpath, blob],
            )?;

            if affected == 0 {
                // Clearing properties that were never set needs no row.
                if blob.is_none() {
                    return Ok(());
                }
                conn.execute(
                    "INSERT INTO actual_node (wc_id, local_relpath, parent_relpath, properties) \
                     VALUES (?1, ?2, ?3, ?4)",
                    rusqlite::params![
                        wcroot.wc_id,
                        resolved.relpath,
                        parent_relpath_column(&resolved.relpath),
                        blob,
                    ],
                )?;
                return Ok(());
            }

            retire_actual_if_empty(conn, wcroot.wc_id, &resolved.relpath)
        })?;

        self.flush_entries(&resolved.pdh);
        Ok(())
    }

    /// Replace the property blob on an underlying layer (WORKING when
    /// ON_WORKING, else BASE). There must be a row to update.
    pub fn op_set_pristine_props(
        &self,
        local_abspath: &Path,
        props: &PropertySet,
        on_working: bool,
    ) -> Result<()> {
        let (resolved, wcroot) = self.parse_path(local_abspath)?;

        let sql = if on_working {
            "UPDATE working_node SET properties = ?3 \
             WHERE wc_id = ?1 AND local_relpath = ?2"
        } else {
            "UPDATE base_node SET properties = ?3 \
             WHERE wc_id = ?1 AND local_relpath = ?2"
        };

        let affected = wcroot.sdb()?.with(|conn| {
            Ok(conn.execute(
                sql,
                rusqlite::params![wcroot.wc_id, resolved.relpath, props.to_blob()],
            )?)
        })?;

        if affected != 1 {
            return Err(WcError::PathNotFound(local_abspath.to_path_buf()));
        }

        self.flush_entries(&resolved.pdh);
        Ok(())
    }

    /// Put the node into CHANGELIST, or take it out of any (None).
    pub fn op_set_changelist(&self, local_abspath: &Path, changelist: Option<&str>) -> Result<()> {
        let (resolved, wcroot) = self.parse_path(local_abspath)?;

        wcroot.sdb()?.with_transaction(|conn| {
            let existing: Option<Option<String>> = {
                let act = get_actual_row(conn, wcroot.wc_id, &resolved.relpath)?;
                act.map(|a| a.changelist)
            };

            match existing {
                None => {
                    // Removing a membership that does not exist is a no-op.
                    let Some(changelist) = changelist else {
                        return Ok(());
                    };
                    conn.execute(
                        "INSERT INTO actual_node \
                         (wc_id, local_relpath, parent_relpath, changelist) \
                         VALUES (?1, ?2, ?3, ?4)",
                        rusqlite::params![
                            wcroot.wc_id,
                            resolved.relpath,
                            parent_relpath_column(&resolved.relpath),
                            changelist,
                        ],
                    )?;
                    Ok(())
                }
                Some(current) => {
                    if current.as_deref() == changelist {
                        return Ok(());
                    }
                    conn.execute(
                        "UPDATE actual_node SET changelist = ?3 \
                         WHERE wc_id = ?1 AND local_relpath = ?2",
                        rusqlite::params![wcroot.wc_id, resolved.relpath, changelist],
                    )?;
                    retire_actual_if_empty(conn, wcroot.wc_id, &resolved.relpath)
                }
            }
        })?;

        self.flush_entries(&resolved.pdh);
        Ok(())
    }

    /// Record (or clear, with None) the tree conflict on VICTIM. The data
    /// lands on the parent directory's ACTUAL row, keyed by basename.
    pub fn op_set_tree_conflict(
        &self,
        victim_abspath: &Path,
        conflict: Option<&[u8]>,
    ) -> Result<()> {
        assert!(victim_abspath.is_absolute());

        let parent_abspath = victim_abspath
            .parent()
            .ok_or_else(|| WcError::NotWorkingCopy(victim_abspath.to_path_buf()))?;
        let victim_name = abspath_basename(victim_abspath);

        let (resolved, wcroot) = self.parse_path(parent_abspath)?;

        wcroot.sdb()?.with_transaction(|conn| {
            let act = get_actual_row(conn, wcroot.wc_id, &resolved.relpath)?;
            let have_row = act.is_some();

            let mut conflicts = match act.as_ref().and_then(|a| a.tree_conflict_data.as_ref()) {
                Some(blob) => read_tree_conflicts(blob, parent_abspath)?,
                None => BTreeMap::new(),
            };

            match conflict {
                Some(data) => {
                    conflicts.insert(victim_name.clone(), data.to_vec());
                }
                None => {
                    conflicts.remove(&victim_name);
                }
            }

            if conflicts.is_empty() && !have_row {
                // Removing conflict data that never existed.
                return Ok(());
            }

            let blob = if conflicts.is_empty() {
                None
            } else {
                Some(write_tree_conflicts(&conflicts))
            };

            if have_row {
                conn.execute(
                    "UPDATE actual_node SET tree_conflict_data = ?3 \
                     WHERE wc_id = ?1 AND local_relpath = ?2",
                    rusqlite::params![wcroot.wc_id, resolved.relpath, blob],
                )?;
                retire_actual_if_empty(conn, wcroot.wc_id, &resolved.relpath)?;
            } else {
                conn.execute(
                    "INSERT INTO actual_node \
                     (wc_id, local_relpath, parent_relpath, tree_conflict_data) \
                     VALUES (?1, ?2, ?3, ?4)",
                    rusqlite::params![
                        wcroot.wc_id,
                        resolved.relpath,
                        parent_relpath_column(&resolved.relpath),
                        blob,
                    ],
                )?;
            }
            Ok(())
        })?;

        self.flush_entries(&resolved.pdh);
        Ok(())
    }

    /// Read back the tree conflict recorded for VICTIM, if any. Walking off
    /// the top of the working copy quietly reports no conflict.
    pub fn op_read_tree_conflict(&self, victim_abspath: &Path) -> Result<Option<Vec<u8>>> {
        assert!(victim_abspath.is_absolute());

        let Some(parent_abspath) = victim_abspath.parent() else {
            return Ok(None);
        };
        let victim_name = abspath_basename(victim_abspath);

        let (resolved, wcroot) = match self.parse_path(parent_abspath) {
            Ok(ok) => ok,
            Err(WcError::NotWorkingCopy(_)) => return Ok(None),
            Err(e) => return Err(e),
        };

        wcroot.sdb()?.with(|conn| {
            let act = get_actual_row(conn, wcroot.wc_id, &resolved.relpath)?;
            let Some(blob) = act.and_then(|a| a.tree_conflict_data) else {
                return Ok(None);
            };
            let conflicts = read_tree_conflicts(&blob, parent_abspath)?;
            Ok(conflicts.get(&victim_name).cloned())
        })
    }

    /// Clear conflict markers. All requested clears run in one transaction
    /// so a failure never leaves a half-resolved node behind.
    pub fn op_mark_resolved(
        &self,
        local_abspath: &Path,
        resolved_text: bool,
        resolved_props: bool,
        resolved_tree: bool,
    ) -> Result<()> {
        let (resolved, wcroot) = self.parse_path(local_abspath)?;
        let victim_name = abspath_basename(local_abspath);

        wcroot.sdb()?.with_transaction(|conn| {
            if resolved_text {
                conn.execute(
                    "UPDATE actual_node SET conflict_old = NULL, \
                     conflict_new = NULL, conflict_working = NULL \
                     WHERE wc_id = ?1 AND local_relpath = ?2",
                    rusqlite::params![wcroot.wc_id, resolved.relpath],
                )?;
            }
            if resolved_props {
                conn.execute(
                    "UPDATE actual_node SET prop_reject = NULL \
                     WHERE wc_id = ?1 AND local_relpath = ?2",
                    rusqlite::params![wcroot.wc_id, resolved.relpath],
                )?;
            }
            if resolved_text || resolved_props {
                retire_actual_if_empty(conn, wcroot.wc_id, &resolved.relpath)?;
            }

            // The tree conflict entry sits on the parent row in this same
            // store, except for the WCROOT, which has no parent here.
            if resolved_tree && !resolved.relpath.is_empty() {
                let parent_relpath = relpath_dirname(&resolved.relpath);
                let act = get_actual_row(conn, wcroot.wc_id, &parent_relpath)?;
                if let Some(blob) = act.and_then(|a| a.tree_conflict_data) {
                    let parent_abspath = local_abspath.parent().unwrap_or(local_abspath);
                    let mut conflicts = read_tree_conflicts(&blob, parent_abspath)?;
                    if conflicts.remove(&victim_name).is_some() {
                        let blob = if conflicts.is_empty() {
                            None
                        } else {
                            Some(write_tree_conflicts(&conflicts))
                        };
                        conn.execute(
                            "UPDATE actual_node SET tree_conflict_data = ?3 \
                             WHERE wc_id = ?1 AND local_relpath = ?2",
                            rusqlite::params![wcroot.wc_id, parent_relpath, blob],
                        )?;
                        retire_actual_if_empty(conn, wcroot.wc_id, &parent_relpath)?;
                    }
                }
            }
            Ok(())
        })?;

        self.flush_entries(&resolved.pdh);
        Ok(())
    }

    /// Drop every layer of the node. Used by cleanup-style callers that
    /// need a row gone regardless of its state.
    pub fn op_remove_node(&self, local_abspath: &Path) -> Result<()> {
        let (resolved, wcroot) = self.parse_path(local_abspath)?;

        wcroot.sdb()?.with_transaction(|conn| {
            for table in ["base_node", "working_node", "actual_node"] {
                conn.execute(
                    &format!("DELETE FROM {table} WHERE wc_id = ?1 AND local_relpath = ?2"),
                    rusqlite::params![wcroot.wc_id, resolved.relpath],
                )?;
            }
            Ok(())
        })?;

        self.flush_entries(&resolved.pdh);
        Ok(())
    }

    /// Record a new sparse depth on a directory, in both layers that carry
    /// one.
    pub fn op_set_dir_depth(&self, local_abspath: &Path, depth: Depth) -> Result<()> {
        assert!(matches!(
            depth,
            Depth::Exclude | Depth::Empty | Depth::Files | Depth::Immediates | Depth::Infinity
        ));
        let (resolved, wcroot) = self.parse_path(local_abspath)?;

        wcroot.sdb()?.with_transaction(|conn| {
            for table in ["base_node", "working_node"] {
                conn.execute(
                    &format!(
                        "UPDATE {table} SET depth = ?3 \
                         WHERE wc_id = ?1 AND local_relpath = ?2"
                    ),
                    rusqlite::params![wcroot.wc_id, resolved.relpath, depth.as_word()],
                )?;
            }
            Ok(())
        })?;

        self.flush_entries(&resolved.pdh);
        Ok(())
    }

    // The remaining op_ verbs define the external contract of the WORKING
    // layer but have no behavior yet; callers get an explicit refusal
    // instead of a guess.

    pub fn op_copy(&self, src_abspath: &Path, dst_abspath: &Path) -> Result<()> {
        assert!(src_abspath.is_absolute());
        assert!(dst_abspath.is_absolute());
        Err(WcError::NotImplemented("op_copy"))
    }

    pub fn op_copy_url(
        &self,
        local_abspath: &Path,
        _copyfrom_repos_relpath: &str,
        _copyfrom_root_url: &str,
        _copyfrom_uuid: &str,
        _copyfrom_revision: i64,
    ) -> Result<()> {
        assert!(local_abspath.is_absolute());
        Err(WcError::NotImplemented("op_copy_url"))
    }

    pub fn op_add_directory(&self, local_abspath: &Path) -> Result<()> {
        assert!(local_abspath.is_absolute());
        Err(WcError::NotImplemented("op_add_directory"))
    }

    pub fn op_add_file(&self, local_abspath: &Path) -> Result<()> {
        assert!(local_abspath.is_absolute());
        Err(WcError::NotImplemented("op_add_file"))
    }

    pub fn op_add_symlink(&self, local_abspath: &Path, target: &str) -> Result<()> {
        assert!(local_abspath.is_absolute());
        assert!(!target.is_empty());
        Err(WcError::NotImplemented("op_add_symlink"))
    }

    pub fn op_delete(&self, local_abspath: &Path) -> Result<()> {
        assert!(local_abspath.is_absolute());
        Err(WcError::NotImplemented("op_delete"))
    }

    pub fn op_move(&self, src_abspath: &Path, dst_abspath: &Path) -> Result<()> {
        assert!(src_abspath.is_absolute());
        assert!(dst_abspath.is_absolute());
        Err(WcError::NotImplemented("op_move"))
    }

    pub fn op_modified(&self, local_abspath: &Path) -> Result<()> {
        assert!(local_abspath.is_absolute());
        Err(WcError::NotImplemented("op_modified"))
    }

    pub fn op_mark_conflict(&self, local_abspath: &Path) -> Result<()> {
        assert!(local_abspath.is_absolute());
        Err(WcError::NotImplemented("op_mark_conflict"))
    }

    pub fn op_revert(&self, local_abspath: &Path, _depth: Depth) -> Result<()> {
        assert!(local_abspath.is_absolute());
        Err(WcError::NotImplemented("op_revert"))
    }
}

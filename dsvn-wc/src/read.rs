//! Unified reads across the three layers
//!
//! `read_info` is the one query almost every caller goes through: it joins
//! the BASE, WORKING and ACTUAL rows of a node and derives the composite
//! status from the layer combination. The row readers here are shared with
//! the scanners and the commit path.

use crate::checksum::Checksum;
use crate::error::{Result, WcError};
use crate::ops;
use crate::paths::relpath_basename;
use crate::properties::PropertySet;
use crate::sdb::checksum_from_text;
use crate::types::{Conflict, Depth, Kind, LockInfo, Status};
use crate::wcroot::{fetch_repos_info, WcDb};
use rusqlite::{Connection, OptionalExtension};
use std::collections::BTreeSet;
use std::path::Path;

/// A decoded BASE row (with any repository lock joined in).
pub(crate) struct BaseRow {
    pub(crate) repos_id: Option<i64>,
    pub(crate) repos_relpath: Option<String>,
    pub(crate) presence: Status,
    pub(crate) kind: Kind,
    pub(crate) revision: Option<i64>,
    pub(crate) checksum: Option<Checksum>,
    pub(crate) translated_size: Option<i64>,
    pub(crate) changed_rev: Option<i64>,
    pub(crate) changed_date: Option<i64>,
    pub(crate) changed_author: Option<String>,
    pub(crate) depth: Option<Depth>,
    pub(crate) symlink_target: Option<String>,
    pub(crate) last_mod_time: Option<i64>,
    pub(crate) properties: Option<Vec<u8>>,
    pub(crate) lock: Option<LockInfo>,
}

/// A decoded WORKING row.
pub(crate) struct WorkingRow {
    pub(crate) presence: Status,
    pub(crate) kind: Kind,
    pub(crate) checksum: Option<Checksum>,
    pub(crate) translated_size: Option<i64>,
    pub(crate) changed_rev: Option<i64>,
    pub(crate) changed_date: Option<i64>,
    pub(crate) changed_author: Option<String>,
    pub(crate) depth: Option<Depth>,
    pub(crate) symlink_target: Option<String>,
    pub(crate) copyfrom_repos_id: Option<i64>,
    pub(crate) copyfrom_repos_relpath: Option<String>,
    pub(crate) copyfrom_revision: Option<i64>,
    pub(crate) moved_here: bool,
    #[allow(dead_code)]
    pub(crate) moved_to: Option<String>,
    pub(crate) last_mod_time: Option<i64>,
    pub(crate) properties: Option<Vec<u8>>,
}

/// An ACTUAL row, verbatim.
pub(crate) struct ActualRow {
    pub(crate) properties: Option<Vec<u8>>,
    pub(crate) prop_reject: Option<String>,
    pub(crate) changelist: Option<String>,
    pub(crate) conflict_old: Option<String>,
    pub(crate) conflict_new: Option<String>,
    pub(crate) conflict_working: Option<String>,
    pub(crate) tree_conflict_data: Option<Vec<u8>>,
}

impl ActualRow {
    pub(crate) fn has_direct_conflict(&self) -> bool {
        self.prop_reject.is_some()
            || self.conflict_old.is_some()
            || self.conflict_new.is_some()
            || self.conflict_working.is_some()
    }
}

struct RawBase {
    repos_id: Option<i64>,
    repos_relpath: Option<String>,
    presence: String,
    kind: String,
    revision: Option<i64>,
    checksum: Option<String>,
    translated_size: Option<i64>,
    changed_rev: Option<i64>,
    changed_date: Option<i64>,
    changed_author: Option<String>,
    depth: Option<String>,
    symlink_target: Option<String>,
    last_mod_time: Option<i64>,
    properties: Option<Vec<u8>>,
    lock_token: Option<String>,
    lock_owner: Option<String>,
    lock_comment: Option<String>,
    lock_date: Option<i64>,
}

pub(crate) fn get_base_row(
    conn: &Connection,
    wc_id: i64,
    local_relpath: &str,
    local_abspath: &Path,
) -> Result<Option<BaseRow>> {
    let mut stmt = conn.prepare_cached(
        "SELECT base_node.repos_id, base_node.repos_relpath, presence, kind, \
         revision, checksum, translated_size, changed_rev, changed_date, \
         changed_author, depth, symlink_target, last_mod_time, properties, \
         lock_token, lock_owner, lock_comment, lock_date \
         FROM base_node \
         LEFT OUTER JOIN lock ON base_node.repos_id = lock.repos_id \
           AND base_node.repos_relpath = lock.repos_relpath \
         WHERE wc_id = ?1 AND local_relpath = ?2",
    )?;

    let raw = stmt
        .query_row(rusqlite::params![wc_id, local_relpath], |row| {
            Ok(RawBase {
                repos_id: row.get(0)?,
                repos_relpath: row.get(1)?,
                presence: row.get(2)?,
                kind: row.get(3)?,
                revision: row.get(4)?,
                checksum: row.get(5)?,
                translated_size: row.get(6)?,
                changed_rev: row.get(7)?,
                changed_date: row.get(8)?,
                changed_author: row.get(9)?,
                depth: row.get(10)?,
                symlink_target: row.get(11)?,
                last_mod_time: row.get(12)?,
                properties: row.get(13)?,
                lock_token: row.get(14)?,
                lock_owner: row.get(15)?,
                lock_comment: row.get(16)?,
                lock_date: row.get(17)?,
            })
        })
        .optional()?;

    let raw = match raw {
        Some(raw) => raw,
        None => return Ok(None),
    };

    // Sparse storage: both repository columns are set or neither is.
    if raw.repos_id.is_some() != raw.repos_relpath.is_some() {
        return Err(WcError::corrupt(
            local_abspath,
            "base node has mismatched repository columns",
        ));
    }

    Ok(Some(BaseRow {
        repos_id: raw.repos_id,
        repos_relpath: raw.repos_relpath,
        presence: Status::from_presence_token(&raw.presence, local_abspath)?,
        kind: Kind::from_token(&raw.kind, local_abspath)?,
        revision: raw.revision,
        checksum: checksum_from_text(raw.checksum)?,
        translated_size: raw.translated_size,
        changed_rev: raw.changed_rev,
        changed_date: raw.changed_date,
        changed_author: raw.changed_author,
        depth: raw.depth.as_deref().map(Depth::from_word),
        symlink_target: raw.symlink_target,
        last_mod_time: raw.last_mod_time,
        properties: raw.properties,
        lock: raw.lock_token.map(|token| LockInfo {
            token,
            owner: raw.lock_owner,
            comment: raw.lock_comment,
            date: raw.lock_date,
        }),
    }))
}

struct RawWorking {
    presence: String,
    kind: String,
    checksum: Option<String>,
    translated_size: Option<i64>,
    changed_rev: Option<i64>,
    changed_date: Option<i64>,
    changed_author: Option<String>,
    depth: Option<String>,
    symlink_target: Option<String>,
    copyfrom_repos_id: Option<i64>,
    copyfrom_repos_relpath: Option<String>,
    copyfrom_revision: Option<i64>,
    moved_here: Option<i64>,
    moved_to: Option<String>,
    last_mod_time: Option<i64>,
    properties: Option<Vec<u8>>,
}

pub(crate) fn get_working_row(
    conn: &Connection,
    wc_id: i64,
    local_relpath: &str,
    local_abspath: &Path,
) -> Result<Option<WorkingRow>> {
    let mut stmt = conn.prepare_cached(
        "SELECT presence, kind, checksum, translated_size, changed_rev, \
         changed_date, changed_author, depth, symlink_target, \
         copyfrom_repos_id, copyfrom_repos_relpath, copyfrom_revision, \
         moved_here, moved_to, last_mod_time, properties \
         FROM working_node WHERE wc_id = ?1 AND local_relpath = ?2",
    )?;

    let raw = stmt
        .query_row(rusqlite::params![wc_id, local_relpath], |row| {
            Ok(RawWorking {
                presence: row.get(0)?,
                kind: row.get(1)?,
                checksum: row.get(2)?,
                translated_size: row.get(3)?,
                changed_rev: row.get(4)?,
                changed_date: row.get(5)?,
                changed_author: row.get(6)?,
                depth: row.get(7)?,
                symlink_target: row.get(8)?,
                copyfrom_repos_id: row.get(9)?,
                copyfrom_repos_relpath: row.get(10)?,
                copyfrom_revision: row.get(11)?,
                moved_here: row.get(12)?,
                moved_to: row.get(13)?,
                last_mod_time: row.get(14)?,
                properties: row.get(15)?,
            })
        })
        .optional()?;

    let raw = match raw {
        Some(raw) => raw,
        None => return Ok(None),
    };

    if raw.copyfrom_repos_id.is_some() != raw.copyfrom_repos_relpath.is_some() {
        return Err(WcError::corrupt(
            local_abspath,
            "working node has mismatched copyfrom columns",
        ));
    }

    Ok(Some(WorkingRow {
        presence: Status::from_presence_token(&raw.presence, local_abspath)?,
        kind: Kind::from_token(&raw.kind, local_abspath)?,
        checksum: checksum_from_text(raw.checksum)?,
        translated_size: raw.translated_size,
        changed_rev: raw.changed_rev,
        changed_date: raw.changed_date,
        changed_author: raw.changed_author,
        depth: raw.depth.as_deref().map(Depth::from_word),
        symlink_target: raw.symlink_target,
        copyfrom_repos_id: raw.copyfrom_repos_id,
        copyfrom_repos_relpath: raw.copyfrom_repos_relpath,
        copyfrom_revision: raw.copyfrom_revision,
        moved_here: raw.moved_here.unwrap_or(0) != 0,
        moved_to: raw.moved_to,
        last_mod_time: raw.last_mod_time,
        properties: raw.properties,
    }))
}

pub(crate) fn get_actual_row(
    conn: &Connection,
    wc_id: i64,
    local_relpath: &str,
) -> Result<Option<ActualRow>> {
    let mut stmt = conn.prepare_cached(
        "SELECT properties, prop_reject, changelist, conflict_old, \
         conflict_new, conflict_working, tree_conflict_data \
         FROM actual_node WHERE wc_id = ?1 AND local_relpath = ?2",
    )?;

    Ok(stmt
        .query_row(rusqlite::params![wc_id, local_relpath], |row| {
            Ok(ActualRow {
                properties: row.get(0)?,
                prop_reject: row.get(1)?,
                changelist: row.get(2)?,
                conflict_old: row.get(3)?,
                conflict_new: row.get(4)?,
                conflict_working: row.get(5)?,
                tree_conflict_data: row.get(6)?,
            })
        })
        .optional()?)
}

/// The composite record `read_info` produces for a node.
#[derive(Debug, Clone)]
pub struct WcInfo {
    pub status: Status,
    pub kind: Kind,
    /// BASE revision; None while a WORKING layer overrides the node.
    pub revision: Option<i64>,
    /// None when inherited from an ancestor (use `scan_base_repos`) or
    /// when a WORKING layer overrides the node.
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
    pub changelist: Option<String>,
    /// The copyfrom triple, for copied/moved-here nodes.
    pub original_repos_relpath: Option<String>,
    pub original_root_url: Option<String>,
    pub original_uuid: Option<String>,
    pub original_revision: Option<i64>,
    /// Both a BASE and a WORKING layer exist.
    pub base_shadowed: bool,
    pub conflicted: bool,
    pub lock: Option<LockInfo>,
}

impl WcDb {
    /// Join all three layers of a node into one record.
    pub fn read_info(&self, local_abspath: &Path) -> Result<WcInfo> {
        let (resolved, wcroot) = self.parse_path(local_abspath)?;

        let mut info = wcroot.sdb()?.with(|conn| {
            let base = get_base_row(conn, wcroot.wc_id, &resolved.relpath, local_abspath)?;
            let work = get_working_row(conn, wcroot.wc_id, &resolved.relpath, local_abspath)?;
            let act = get_actual_row(conn, wcroot.wc_id, &resolved.relpath)?;

            if base.is_none() && work.is_none() {
                if act.is_some() {
                    // ACTUAL may not exist on its own.
                    return Err(WcError::corrupt(
                        local_abspath,
                        "ACTUAL row without BASE or WORKING",
                    ));
                }
                return Err(WcError::PathNotFound(local_abspath.to_path_buf()));
            }

            let node_kind = match (&work, &base) {
                (Some(work), _) => work.kind,
                (None, Some(base)) => base.kind,
                (None, None) => unreachable!(),
            };

            let mut status = match &base {
                Some(base) => {
                    if work.is_some()
                        && matches!(base.presence, Status::Absent | Status::Excluded)
                    {
                        // These BASE presences leave nothing for a WORKING
                        // layer to overlay.
                        return Err(WcError::corrupt(
                            local_abspath,
                            "WORKING row shadowing an absent/excluded BASE",
                        ));
                    }
                    if base.kind == Kind::Subdir && base.presence == Status::Normal {
                        Status::Obstructed
                    } else {
                        base.presence
                    }
                }
                None => Status::Normal,
            };

            if let Some(work) = &work {
                status = match work.presence {
                    Status::Incomplete => Status::Incomplete,
                    Status::NotPresent | Status::BaseDeleted => {
                        if node_kind == Kind::Subdir {
                            Status::ObstructedDelete
                        } else {
                            Status::Deleted
                        }
                    }
                    Status::Normal => {
                        if node_kind == Kind::Subdir {
                            Status::ObstructedAdd
                        } else if work.copyfrom_repos_id.is_some() {
                            if work.moved_here {
                                Status::MovedHere
                            } else {
                                Status::Copied
                            }
                        } else {
                            Status::Added
                        }
                    }
                    other => {
                        return Err(WcError::corrupt(
                            local_abspath,
                            format!("illegal WORKING presence {other:?}"),
                        ))
                    }
                };
            }

            let have_work = work.is_some();

            let (repos_relpath, repos_root_url, repos_uuid) = match &base {
                Some(base) if !have_work => match base.repos_id {
                    Some(repos_id) => {
                        let (root, uuid) = fetch_repos_info(conn, repos_id, local_abspath)?;
                        (base.repos_relpath.clone(), Some(root), Some(uuid))
                    }
                    // Inherited from an ancestor; the caller scans upward.
                    None => (None, None, None),
                },
                _ => (None, None, None),
            };

            let (original_repos_relpath, original_root_url, original_uuid, original_revision) =
                match &work {
                    Some(work) if work.copyfrom_repos_id.is_some() => {
                        let (root, uuid) = fetch_repos_info(
                            conn,
                            work.copyfrom_repos_id.unwrap(),
                            local_abspath,
                        )?;
                        (
                            work.copyfrom_repos_relpath.clone(),
                            Some(root),
                            Some(uuid),
                            work.copyfrom_revision,
                        )
                    }
                    _ => (None, None, None, None),
                };

            let pick_i64 = |w: Option<i64>, b: Option<i64>| if have_work { w } else { b };

            Ok(WcInfo {
                status,
                kind: node_kind.normalized(),
                revision: if have_work {
                    None
                } else {
                    base.as_ref().and_then(|b| b.revision)
                },
                repos_relpath,
                repos_root_url,
                repos_uuid,
                changed_rev: pick_i64(
                    work.as_ref().and_then(|w| w.changed_rev),
                    base.as_ref().and_then(|b| b.changed_rev),
                ),
                changed_date: pick_i64(
                    work.as_ref().and_then(|w| w.changed_date),
                    base.as_ref().and_then(|b| b.changed_date),
                ),
                changed_author: if have_work {
                    work.as_ref().and_then(|w| w.changed_author.clone())
                } else {
                    base.as_ref().and_then(|b| b.changed_author.clone())
                },
                last_mod_time: pick_i64(
                    work.as_ref().and_then(|w| w.last_mod_time),
                    base.as_ref().and_then(|b| b.last_mod_time),
                ),
                depth: match node_kind {
                    Kind::Dir | Kind::Subdir => {
                        let depth = if have_work {
                            work.as_ref().and_then(|w| w.depth)
                        } else {
                            base.as_ref().and_then(|b| b.depth)
                        };
                        Some(depth.unwrap_or(Depth::Unknown))
                    }
                    _ => None,
                },
                checksum: if node_kind != Kind::File {
                    None
                } else if have_work {
                    work.as_ref().and_then(|w| w.checksum.clone())
                } else {
                    base.as_ref().and_then(|b| b.checksum.clone())
                },
                translated_size: pick_i64(
                    work.as_ref().and_then(|w| w.translated_size),
                    base.as_ref().and_then(|b| b.translated_size),
                ),
                target: if node_kind != Kind::Symlink {
                    None
                } else if have_work {
                    work.as_ref().and_then(|w| w.symlink_target.clone())
                } else {
                    base.as_ref().and_then(|b| b.symlink_target.clone())
                },
                changelist: act.as_ref().and_then(|a| a.changelist.clone()),
                original_repos_relpath,
                original_root_url,
                original_uuid,
                original_revision,
                base_shadowed: base.is_some() && have_work,
                conflicted: act.as_ref().map(ActualRow::has_direct_conflict).unwrap_or(false),
                lock: base.as_ref().and_then(|b| b.lock.clone()),
            })
        })?;

        // Tree conflicts live on the parent's ACTUAL row.
        if !info.conflicted {
            info.conflicted = self.op_read_tree_conflict(local_abspath)?.is_some();
        }

        Ok(info)
    }

    /// The effective properties: ACTUAL if the user changed any, otherwise
    /// the pristine set.
    pub fn read_props(&self, local_abspath: &Path) -> Result<PropertySet> {
        let (resolved, wcroot) = self.parse_path(local_abspath)?;

        let actual = wcroot.sdb()?.with(|conn| {
            let act = get_actual_row(conn, wcroot.wc_id, &resolved.relpath)?;
            match act.and_then(|a| a.properties) {
                Some(blob) => Ok(Some(PropertySet::from_blob(&blob, local_abspath)?)),
                None => Ok(None),
            }
        })?;

        match actual {
            Some(props) => Ok(props),
            None => self.read_pristine_props(local_abspath),
        }
    }

    /// The pristine (pre-modification) properties: WORKING if present,
    /// otherwise BASE.
    pub fn read_pristine_props(&self, local_abspath: &Path) -> Result<PropertySet> {
        let (resolved, wcroot) = self.parse_path(local_abspath)?;

        let (have_work, working_props) = wcroot.sdb()?.with(|conn| {
            let work = get_working_row(conn, wcroot.wc_id, &resolved.relpath, local_abspath)?;
            match work {
                Some(work) => match work.properties {
                    Some(blob) => Ok((true, Some(PropertySet::from_blob(&blob, local_abspath)?))),
                    None => Ok((true, None)),
                },
                None => Ok((false, None)),
            }
        })?;

        if let Some(props) = working_props {
            return Ok(props);
        }

        match self.base_get_props(local_abspath) {
            Ok(props) => Ok(props),
            // A WORKING-only node has no pristine props at all.
            Err(WcError::PathNotFound(_)) if have_work => Ok(PropertySet::new()),
            Err(e) => Err(e),
        }
    }

    /// Immediate children across BASE and WORKING.
    pub fn read_children(&self, local_abspath: &Path) -> Result<Vec<String>> {
        gather_children(self, local_abspath, false)
    }

    /// The node's kind; `Kind::Unknown` for a missing node when
    /// ALLOW_MISSING is set.
    pub fn read_kind(&self, local_abspath: &Path, allow_missing: bool) -> Result<Kind> {
        match self.read_info(local_abspath) {
            Ok(info) => Ok(info.kind),
            Err(WcError::PathNotFound(_)) if allow_missing => Ok(Kind::Unknown),
            Err(e) => Err(e),
        }
    }

    /// Whether the node is administratively invisible: no WORKING layer and
    /// a BASE presence that hides it.
    pub fn node_hidden(&self, local_abspath: &Path) -> Result<bool> {
        let (resolved, wcroot) = self.parse_path(local_abspath)?;

        let have_work = wcroot.sdb()?.with(|conn| {
            Ok(get_working_row(conn, wcroot.wc_id, &resolved.relpath, local_abspath)?.is_some())
        })?;
        if have_work {
            return Ok(false);
        }

        let base = self.base_get_info(local_abspath)?;
        Ok(matches!(
            base.status,
            Status::Absent | Status::NotPresent | Status::Excluded
        ))
    }

    /// Basenames of the children of DIR that carry any conflict marker.
    pub fn read_conflict_victims(&self, local_dir_abspath: &Path) -> Result<Vec<String>> {
        let (resolved, wcroot) = self.parse_path(local_dir_abspath)?;

        let mut found: BTreeSet<String> = BTreeSet::new();

        wcroot.sdb()?.with(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT local_relpath FROM actual_node \
                 WHERE wc_id = ?1 AND parent_relpath = ?2 \
                   AND NOT (prop_reject IS NULL AND conflict_old IS NULL \
                            AND conflict_new IS NULL AND conflict_working IS NULL)",
            )?;
            let mut rows = stmt.query(rusqlite::params![wcroot.wc_id, resolved.relpath])?;
            while let Some(row) = rows.next()? {
                let child_relpath: String = row.get(0)?;
                found.insert(relpath_basename(&child_relpath).to_string());
            }

            let act = get_actual_row(conn, wcroot.wc_id, &resolved.relpath)?;
            if let Some(blob) = act.and_then(|a| a.tree_conflict_data) {
                let conflicts = ops::read_tree_conflicts(&blob, local_dir_abspath)?;
                for victim in conflicts.keys() {
                    found.insert(victim.clone());
                }
            }
            Ok(())
        })?;

        Ok(found.into_iter().collect())
    }

    /// Every conflict recorded on the node itself.
    pub fn read_conflicts(&self, local_abspath: &Path) -> Result<Vec<Conflict>> {
        let (resolved, wcroot) = self.parse_path(local_abspath)?;

        let mut conflicts = Vec::new();

        wcroot.sdb()?.with(|conn| {
            if let Some(act) = get_actual_row(conn, wcroot.wc_id, &resolved.relpath)? {
                if let Some(reject_file) = act.prop_reject {
                    conflicts.push(Conflict::Property { reject_file });
                }
                if act.conflict_old.is_some()
                    || act.conflict_new.is_some()
                    || act.conflict_working.is_some()
                {
                    conflicts.push(Conflict::Text {
                        older: act.conflict_old,
                        theirs: act.conflict_new,
                        mine: act.conflict_working,
                    });
                }
            }
            Ok(())
        })?;

        if let Some(data) = self.op_read_tree_conflict(local_abspath)? {
            conflicts.push(Conflict::Tree(data));
        }

        Ok(conflicts)
    }
}

/// Collect the basenames of a directory's children, from BASE only or from
/// the union of BASE and WORKING.
pub(crate) fn gather_children(
    db: &WcDb,
    local_abspath: &Path,
    base_only: bool,
) -> Result<Vec<String>> {
    let (resolved, wcroot) = db.parse_path(local_abspath)?;

    wcroot.sdb()?.with(|conn| {
        let sql = if base_only {
            "SELECT local_relpath FROM base_node \
             WHERE wc_id = ?1 AND parent_relpath = ?2 \
             ORDER BY local_relpath"
        } else {
            "SELECT local_relpath FROM base_node \
             WHERE wc_id = ?1 AND parent_relpath = ?2 \
             UNION \
             SELECT local_relpath FROM working_node \
             WHERE wc_id = ?1 AND parent_relpath = ?2 \
             ORDER BY local_relpath"
        };

        let mut stmt = conn.prepare_cached(sql)?;
        let mut rows = stmt.query(rusqlite::params![wcroot.wc_id, resolved.relpath])?;
        let mut children = Vec::new();
        while let Some(row) = rows.next()? {
            let child_relpath: String = row.get(0)?;
            children.push(relpath_basename(&child_relpath).to_string());
        }
        Ok(children)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::Checksum;
    use crate::types::{Depth, OpenMode};
    use crate::working::{insert_working_node, InsertWorking};
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    const ROOT_URL: &str = "http://repos.example.com/";
    const UUID: &str = "0d4f9f0e-2b86-4f7a-9b2a-51b712b4ed7b";

    fn setup() -> (TempDir, WcDb, PathBuf) {
        let tmp = TempDir::new().unwrap();
        let wc = tmp.path().join("wc");
        fs::create_dir_all(&wc).unwrap();
        let db = WcDb::open(OpenMode::ReadWrite, false, false);
        db.init(&wc, "proj/trunk", ROOT_URL, Some(UUID), 0, Depth::Infinity)
            .unwrap();
        (tmp, db, wc)
    }

    fn insert_working(db: &WcDb, wc: &Path, relpath: &str, build: impl FnOnce(&mut InsertWorking)) {
        let (_, wcroot) = db.parse_path(wc).unwrap();
        let mut iw = InsertWorking {
            wc_id: wcroot.wc_id,
            local_relpath: relpath.to_string(),
            presence: Status::Normal,
            kind: Kind::File,
            ..Default::default()
        };
        build(&mut iw);
        wcroot
            .sdb()
            .unwrap()
            .with_transaction(|conn| insert_working_node(conn, &iw))
            .unwrap();
    }

    fn add_base_file(db: &WcDb, wc: &Path, name: &str) {
        db.base_add_file(
            &wc.join(name),
            &format!("proj/trunk/{name}"),
            ROOT_URL,
            UUID,
            1,
            &crate::properties::PropertySet::new(),
            1,
            0,
            Some("author"),
            &Checksum::sha1(b"body"),
            Some(4),
        )
        .unwrap();
    }

    #[test]
    fn test_status_added_for_plain_working_node() {
        let (_tmp, db, wc) = setup();
        insert_working(&db, &wc, "n.txt", |_| {});

        let info = db.read_info(&wc.join("n.txt")).unwrap();
        assert_eq!(info.status, Status::Added);
        assert_eq!(info.kind, Kind::File);
        assert!(info.revision.is_none());
        assert!(info.repos_relpath.is_none());
        assert!(!info.base_shadowed);
    }

    #[test]
    fn test_status_copied_and_moved_here() {
        let (_tmp, db, wc) = setup();
        insert_working(&db, &wc, "cp.txt", |iw| {
            iw.copyfrom_repos_id = Some(1);
            iw.copyfrom_repos_relpath = Some("proj/trunk/src.txt".to_string());
            iw.copyfrom_revision = Some(9);
        });
        insert_working(&db, &wc, "mv.txt", |iw| {
            iw.copyfrom_repos_id = Some(1);
            iw.copyfrom_repos_relpath = Some("proj/trunk/old.txt".to_string());
            iw.copyfrom_revision = Some(9);
            iw.moved_here = true;
        });

        let copied = db.read_info(&wc.join("cp.txt")).unwrap();
        assert_eq!(copied.status, Status::Copied);
        assert_eq!(
            copied.original_repos_relpath.as_deref(),
            Some("proj/trunk/src.txt")
        );
        assert_eq!(copied.original_root_url.as_deref(), Some(ROOT_URL));
        assert_eq!(copied.original_revision, Some(9));

        let moved = db.read_info(&wc.join("mv.txt")).unwrap();
        assert_eq!(moved.status, Status::MovedHere);
    }

    #[test]
    fn test_status_deleted_shadowing_base() {
        let (_tmp, db, wc) = setup();
        add_base_file(&db, &wc, "del.txt");
        insert_working(&db, &wc, "del.txt", |iw| {
            iw.presence = Status::BaseDeleted;
        });

        let info = db.read_info(&wc.join("del.txt")).unwrap();
        assert_eq!(info.status, Status::Deleted);
        assert!(info.base_shadowed);
        // The WORKING layer hides the BASE revision and coordinates.
        assert!(info.revision.is_none());
        assert!(info.repos_relpath.is_none());
    }

    #[test]
    fn test_status_replacement_reports_added() {
        let (_tmp, db, wc) = setup();
        add_base_file(&db, &wc, "re.txt");
        insert_working(&db, &wc, "re.txt", |_| {});

        let info = db.read_info(&wc.join("re.txt")).unwrap();
        assert_eq!(info.status, Status::Added);
        assert!(info.base_shadowed);
    }

    #[test]
    fn test_subdir_stub_statuses() {
        let (_tmp, db, wc) = setup();

        db.base_add_subdir(&wc.join("S"), "proj/trunk/S", ROOT_URL, UUID, 1, Depth::Infinity)
            .unwrap();
        let info = db.read_info(&wc.join("S")).unwrap();
        assert_eq!(info.status, Status::Obstructed);
        // The stub kind never escapes this layer.
        assert_eq!(info.kind, Kind::Dir);

        insert_working(&db, &wc, "S", |iw| {
            iw.kind = Kind::Subdir;
        });
        let info = db.read_info(&wc.join("S")).unwrap();
        assert_eq!(info.status, Status::ObstructedAdd);
        assert_eq!(info.kind, Kind::Dir);

        insert_working(&db, &wc, "S", |iw| {
            iw.kind = Kind::Subdir;
            iw.presence = Status::NotPresent;
        });
        let info = db.read_info(&wc.join("S")).unwrap();
        assert_eq!(info.status, Status::ObstructedDelete);
    }

    #[test]
    fn test_actual_only_row_is_corrupt() {
        let (_tmp, db, wc) = setup();
        let (_, wcroot) = db.parse_path(&wc).unwrap();
        wcroot
            .sdb()
            .unwrap()
            .with(|conn| {
                conn.execute(
                    "INSERT INTO actual_node (wc_id, local_relpath, parent_relpath, changelist) \
                     VALUES (?1, 'stray', '', 'cl')",
                    rusqlite::params![wcroot.wc_id],
                )?;
                Ok(())
            })
            .unwrap();

        match db.read_info(&wc.join("stray")) {
            Err(WcError::Corrupt { .. }) => {}
            other => panic!("expected Corrupt, got {other:?}"),
        }
    }

    #[test]
    fn test_read_children_unions_both_layers() {
        let (_tmp, db, wc) = setup();
        add_base_file(&db, &wc, "base.txt");
        insert_working(&db, &wc, "added.txt", |_| {});
        // A node present in both layers shows up once.
        insert_working(&db, &wc, "base.txt", |iw| {
            iw.presence = Status::BaseDeleted;
        });

        assert_eq!(
            db.read_children(&wc).unwrap(),
            vec!["added.txt".to_string(), "base.txt".to_string()]
        );
        assert_eq!(
            db.base_get_children(&wc).unwrap(),
            vec!["base.txt".to_string()]
        );
    }
}

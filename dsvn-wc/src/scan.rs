//! Ancestor scanners
//!
//! Repository coordinates, addition provenance and deletion provenance are
//! all stored sparsely: the answer for a node is derived by climbing its
//! ancestors inside one store. All three walks operate on relative paths
//! and never leave the WCROOT.

use crate::error::{Result, WcError};
use crate::paths::{abspath_join, relpath_basename, relpath_dirname, relpath_join};
use crate::read::get_working_row;
use crate::types::Status;
use crate::wcroot::{fetch_repos_info, WcDb, Wcroot};
use rusqlite::{Connection, OptionalExtension};
use std::path::{Path, PathBuf};

/// Climb from LOCAL_RELPATH until a BASE row carries explicit repository
/// coordinates, then compose the stripped suffix back onto them.
pub(crate) fn scan_upwards_for_repos(
    conn: &Connection,
    wcroot: &Wcroot,
    local_relpath: &str,
    local_abspath: &Path,
) -> Result<(i64, String)> {
    let mut relpath_suffix = String::new();
    let mut current = local_relpath.to_string();

    loop {
        let row: Option<(Option<i64>, Option<String>)> = conn
            .query_row(
                "SELECT repos_id, repos_relpath FROM base_node \
                 WHERE wc_id = ?1 AND local_relpath = ?2",
                rusqlite::params![wcroot.wc_id, current],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match row {
            None => {
                // Interior nodes of a BASE tree cannot be missing.
                if !relpath_suffix.is_empty() || local_relpath.is_empty() {
                    return Err(WcError::corrupt(
                        local_abspath,
                        "parent(s) should have been present",
                    ));
                }
                return Err(WcError::PathNotFound(local_abspath.to_path_buf()));
            }
            Some((Some(repos_id), Some(repos_relpath))) => {
                return Ok((repos_id, relpath_join(&repos_relpath, &relpath_suffix)));
            }
            Some((None, None)) => {
                if current.is_empty() {
                    // Scanned all the way up without finding coordinates.
                    return Err(WcError::corrupt(
                        local_abspath,
                        "parent(s) should have repository information",
                    ));
                }
                let name = relpath_basename(&current).to_string();
                relpath_suffix = relpath_join(&name, &relpath_suffix);
                current = relpath_dirname(&current);
            }
            Some(_) => {
                return Err(WcError::corrupt(
                    local_abspath,
                    "base node has mismatched repository columns",
                ));
            }
        }
    }
}

/// What `scan_addition` learned about a locally added subtree.
#[derive(Debug, Clone)]
pub struct AdditionInfo {
    /// Added, Copied or MovedHere.
    pub status: Status,
    /// Root of the add/copy/move operation that covers the start node.
    pub op_root_abspath: PathBuf,
    /// Repository location the node will have once committed, derived from
    /// the nearest BASE ancestor.
    pub repos_relpath: String,
    pub repos_root_url: String,
    pub repos_uuid: String,
    /// Copy source, when the addition is a copy or move destination.
    pub original_repos_relpath: Option<String>,
    pub original_root_url: Option<String>,
    pub original_uuid: Option<String>,
    pub original_revision: Option<i64>,
}

/// What `scan_deletion` learned about a locally deleted subtree.
#[derive(Debug, Clone, Default)]
pub struct DeletionInfo {
    /// Root of the deleted/replaced BASE subtree, when one exists.
    pub base_del_abspath: Option<PathBuf>,
    /// A BASE ancestor is being replaced rather than plainly deleted.
    pub base_replaced: bool,
    /// Where the subtree was moved to, when the deletion is a move-away.
    pub moved_to_abspath: Option<PathBuf>,
    /// Root of the deletion within an added WORKING subtree, when the
    /// deletion never touches BASE.
    pub work_del_abspath: Option<PathBuf>,
}

impl WcDb {
    /// Resolve a node's repository coordinates through the sparse BASE
    /// inheritance chain.
    pub fn scan_base_repos(&self, local_abspath: &Path) -> Result<(String, String, String)> {
        let (resolved, wcroot) = self.parse_path(local_abspath)?;

        wcroot.sdb()?.with(|conn| {
            let (repos_id, repos_relpath) =
                scan_upwards_for_repos(conn, &wcroot, &resolved.relpath, local_abspath)?;
            let (root_url, uuid) = fetch_repos_info(conn, repos_id, local_abspath)?;
            Ok((repos_relpath, root_url, uuid))
        })
    }

    /// Walk up the WORKING tree that covers an added node: find the
    /// operation root, whether the addition is a plain add, a copy or a
    /// move destination, and the implied repository coordinates.
    pub fn scan_addition(&self, local_abspath: &Path) -> Result<AdditionInfo> {
        let (resolved, wcroot) = self.parse_path(local_abspath)?;

        wcroot.sdb()?.with(|conn| {
            let mut current = resolved.relpath.clone();
            let mut child: Option<String> = None;
            let mut build_relpath = String::new();
            let mut status = Status::Added;
            let mut op_root_relpath: Option<String> = None;
            let mut original: Option<(i64, String, i64)> = None;
            let mut found_info = false;

            let scan_start = loop {
                let work = get_working_row(conn, wcroot.wc_id, &current, local_abspath)?;

                let Some(work) = work else {
                    if child.is_none() {
                        return Err(WcError::PathNotFound(local_abspath.to_path_buf()));
                    }
                    // Fell off the top of the WORKING tree; the child we
                    // just left is the operation root unless a copy root
                    // claimed it already.
                    if op_root_relpath.is_none() {
                        op_root_relpath = child.clone();
                    }
                    break current;
                };

                if child.is_none() {
                    if work.presence != Status::Normal {
                        return Err(WcError::unexpected_status(
                            local_abspath,
                            "expected node to be added",
                        ));
                    }
                }

                // The operation nearest the start node wins; anything on
                // its ancestors is a different (enclosing) operation.
                if !found_info
                    && work.presence == Status::Normal
                    && work.copyfrom_repos_id.is_some()
                {
                    status = if work.moved_here {
                        Status::MovedHere
                    } else {
                        Status::Copied
                    };
                    op_root_relpath = Some(current.clone());
                    original = Some((
                        work.copyfrom_repos_id.unwrap(),
                        work.copyfrom_repos_relpath.clone().unwrap(),
                        work.copyfrom_revision.unwrap_or(0),
                    ));
                    found_info = true;
                }

                build_relpath = relpath_join(relpath_basename(&current), &build_relpath);

                child = Some(current.clone());
                if current.is_empty() {
                    // The whole WCROOT is inside the operation; the BASE
                    // chain starts right here.
                    if op_root_relpath.is_none() {
                        op_root_relpath = child.clone();
                    }
                    break String::new();
                }
                current = relpath_dirname(&current);
            };

            let (repos_id, base_relpath) =
                scan_upwards_for_repos(conn, &wcroot, &scan_start, local_abspath)?;
            let (repos_root_url, repos_uuid) = fetch_repos_info(conn, repos_id, local_abspath)?;

            let (original_repos_relpath, original_root_url, original_uuid, original_revision) =
                match original {
                    Some((copyfrom_id, copyfrom_relpath, copyfrom_rev)) => {
                        let (root, uuid) = fetch_repos_info(conn, copyfrom_id, local_abspath)?;
                        (
                            Some(copyfrom_relpath),
                            Some(root),
                            Some(uuid),
                            Some(copyfrom_rev),
                        )
                    }
                    None => (None, None, None, None),
                };

            Ok(AdditionInfo {
                status,
                op_root_abspath: abspath_join(
                    &wcroot.abspath,
                    &op_root_relpath.expect("operation root was found"),
                ),
                repos_relpath: relpath_join(&base_relpath, &build_relpath),
                repos_root_url,
                repos_uuid,
                original_repos_relpath,
                original_root_url,
                original_uuid,
                original_revision,
            })
        })
    }

    /// Walk up from a deleted node and report the roots of the BASE and
    /// WORKING deletions, replacement, and any move destination.
    pub fn scan_deletion(&self, local_abspath: &Path) -> Result<DeletionInfo> {
        let (resolved, wcroot) = self.parse_path(local_abspath)?;

        wcroot.sdb()?.with(|conn| {
            let mut info = DeletionInfo::default();

            let mut current = resolved.relpath.clone();
            let mut child: Option<String> = None;
            // Neutral init: never matches a parent/child transition.
            let mut child_presence = Status::BaseDeleted;
            let mut child_has_base = false;
            let mut found_moved_to = false;

            loop {
                let row: Option<(Option<String>, String, Option<String>)> = conn
                    .query_row(
                        "SELECT base_node.presence, working_node.presence, \
                         working_node.moved_to \
                         FROM working_node \
                         LEFT OUTER JOIN base_node \
                           ON base_node.wc_id = working_node.wc_id \
                          AND base_node.local_relpath = working_node.local_relpath \
                         WHERE working_node.wc_id = ?1 \
                           AND working_node.local_relpath = ?2",
                        rusqlite::params![wcroot.wc_id, current],
                        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                    )
                    .optional()?;

                let Some((base_presence, work_presence, moved_to)) = row else {
                    if child.is_none() {
                        return Err(WcError::PathNotFound(local_abspath.to_path_buf()));
                    }
                    break;
                };

                let work_presence = Status::from_presence_token(&work_presence, local_abspath)?;

                if child.is_none()
                    && !matches!(work_presence, Status::NotPresent | Status::BaseDeleted)
                {
                    return Err(WcError::unexpected_status(
                        local_abspath,
                        "expected node to be deleted",
                    ));
                }
                if !matches!(
                    work_presence,
                    Status::Normal | Status::NotPresent | Status::BaseDeleted
                ) {
                    return Err(WcError::corrupt(
                        local_abspath,
                        format!("illegal WORKING presence {work_presence:?} in deletion chain"),
                    ));
                }

                let have_base = match &base_presence {
                    Some(token) => {
                        let presence = Status::from_presence_token(token, local_abspath)?;
                        if !matches!(presence, Status::Normal | Status::NotPresent) {
                            return Err(WcError::corrupt(
                                local_abspath,
                                format!("illegal BASE presence {presence:?} under a deletion"),
                            ));
                        }
                        // A not-present BASE row is bookkeeping, not a node
                        // that was deleted; a normal one shadowed by any
                        // non-delete WORKING layer marks a replacement.
                        if presence == Status::Normal && work_presence != Status::BaseDeleted {
                            info.base_replaced = true;
                        }
                        true
                    }
                    None => false,
                };

                // Only the move nearest the start node counts.
                if !found_moved_to {
                    if let Some(moved_to) = moved_to {
                        if !have_base {
                            return Err(WcError::corrupt(
                                local_abspath,
                                "moved-away marker without a BASE node",
                            ));
                        }
                        found_moved_to = true;
                        info.base_del_abspath = Some(abspath_join(&wcroot.abspath, &current));
                        info.moved_to_abspath = Some(abspath_join(&wcroot.abspath, &moved_to));
                    }
                }

                if work_presence == Status::Normal && child_presence == Status::NotPresent {
                    // Parent is live but the child was deleted: the child
                    // roots a deletion inside the WORKING subtree.
                    info.work_del_abspath = child
                        .as_ref()
                        .map(|c| abspath_join(&wcroot.abspath, c));
                }

                child = Some(current.clone());
                child_presence = work_presence;
                child_has_base = have_base;

                if current.is_empty() {
                    break;
                }
                current = relpath_dirname(&current);
            }

            // We fell off the top of the WORKING tree. A not-present child
            // there would mean the root of an added subtree was deleted.
            if child_presence == Status::NotPresent {
                return Err(WcError::corrupt(
                    local_abspath,
                    "deletion chain ends in a not-present root",
                ));
            }

            // A child with BASE roots the deleted (or replaced) BASE tree,
            // unless a moved-away marker already chose the root.
            if child_has_base && info.base_del_abspath.is_none() {
                info.base_del_abspath = child.map(|c| abspath_join(&wcroot.abspath, &c));
            }

            Ok(info)
        })
    }
}

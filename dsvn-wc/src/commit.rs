//! Global commit and relocate
//!
//! Both are bulk rewrites that must land atomically: commit folds the
//! WORKING/ACTUAL overlay of one node into a fresh BASE row, relocate
//! repoints a whole subtree at a new repository root. Each runs inside a
//! single store transaction.

use crate::checksum::Checksum;
use crate::error::{Result, WcError};
use crate::paths::{relpath_basename, relpath_dirname, relpath_join};
use crate::properties::PropertySet;
use crate::read::{get_actual_row, get_base_row, get_working_row};
use crate::scan::scan_upwards_for_repos;
use crate::sdb::like_prefix;
use crate::types::Kind;
use crate::wcroot::{create_repos_id, fetch_repos_info, WcDb, Wcroot};
use crate::working::delete_working_node;
use rusqlite::Connection;
use std::path::Path;

/// Find the repository location the committed node must be stored under.
/// A node that already has explicit coordinates keeps them (it may be
/// switched); anything else inherits from its parent's chain plus its own
/// basename.
fn determine_repos_info(
    conn: &Connection,
    wcroot: &Wcroot,
    local_relpath: &str,
    local_abspath: &Path,
) -> Result<(i64, String)> {
    if let Some(base) = get_base_row(conn, wcroot.wc_id, local_relpath, local_abspath)? {
        if let (Some(repos_id), Some(repos_relpath)) = (base.repos_id, base.repos_relpath) {
            return Ok((repos_id, repos_relpath));
        }
    }

    let parent_relpath = relpath_dirname(local_relpath);
    let name = relpath_basename(local_relpath);
    let (repos_id, parent_repos_relpath) =
        scan_upwards_for_repos(conn, wcroot, &parent_relpath, local_abspath)?;

    Ok((repos_id, relpath_join(&parent_repos_relpath, name)))
}

impl WcDb {
    /// Fold the node's local state into a committed BASE row at
    /// NEW_REVISION: kind from WORKING else BASE, properties from
    /// ACTUAL else WORKING else BASE, then retire the WORKING row and the
    /// ACTUAL row (keeping only the changelist when asked to).
    #[allow(clippy::too_many_arguments)]
    pub fn global_commit(
        &self,
        local_abspath: &Path,
        new_revision: i64,
        new_date: i64,
        new_author: Option<&str>,
        new_checksum: Option<&Checksum>,
        new_children: Option<&[String]>,
        new_dav_cache: Option<&PropertySet>,
        keep_changelist: bool,
    ) -> Result<()> {
        assert!(local_abspath.is_absolute());
        assert!(new_revision >= 0);
        // A file commit carries a digest, a directory commit a child list;
        // never both.
        assert!(new_checksum.is_none() || new_children.is_none());

        let (resolved, wcroot) = self.parse_path(local_abspath)?;

        wcroot.sdb()?.with_transaction(|conn| {
            let base = get_base_row(conn, wcroot.wc_id, &resolved.relpath, local_abspath)?;
            let work = get_working_row(conn, wcroot.wc_id, &resolved.relpath, local_abspath)?;
            let act = get_actual_row(conn, wcroot.wc_id, &resolved.relpath)?;

            let new_kind = match (&work, &base) {
                (Some(work), _) => work.kind,
                (None, Some(base)) => base.kind,
                (None, None) => {
                    return Err(WcError::PathNotFound(local_abspath.to_path_buf()))
                }
            };
            assert!(new_checksum.is_some() == (new_kind == Kind::File));

            let new_depth = match new_kind {
                Kind::Dir | Kind::Subdir => match (&work, &base) {
                    (Some(work), _) => work.depth,
                    (None, Some(base)) => base.depth,
                    (None, None) => None,
                },
                _ => None,
            };

            let (repos_id, repos_relpath) =
                determine_repos_info(conn, &wcroot, &resolved.relpath, local_abspath)?;

            // First non-null wins: the user's ACTUAL props override what a
            // copy brought along, which overrides the old base.
            let prop_blob: Option<Vec<u8>> = act
                .as_ref()
                .and_then(|a| a.properties.clone())
                .or_else(|| work.as_ref().and_then(|w| w.properties.clone()))
                .or_else(|| base.as_ref().and_then(|b| b.properties.clone()));

            let changelist = if keep_changelist {
                act.as_ref().and_then(|a| a.changelist.clone())
            } else {
                None
            };

            let parent_relpath = if resolved.relpath.is_empty() {
                None
            } else {
                Some(relpath_dirname(&resolved.relpath))
            };

            conn.execute(
                "INSERT OR REPLACE INTO base_node (wc_id, local_relpath, \
                 parent_relpath, presence, kind, revision, repos_id, \
                 repos_relpath, changed_rev, changed_date, changed_author, \
                 properties, checksum, depth, dav_cache) \
                 VALUES (?1, ?2, ?3, 'normal', ?4, ?5, ?6, ?7, ?5, ?8, ?9, \
                 ?10, ?11, ?12, ?13)",
                rusqlite::params![
                    wcroot.wc_id,
                    resolved.relpath,
                    parent_relpath,
                    new_kind.as_token(),
                    new_revision,
                    repos_id,
                    repos_relpath,
                    new_date,
                    new_author,
                    prop_blob,
                    new_checksum.map(Checksum::to_text),
                    new_depth.map(crate::types::Depth::as_word),
                    new_dav_cache.map(PropertySet::to_blob),
                ],
            )?;

            if work.is_some() {
                delete_working_node(conn, wcroot.wc_id, &resolved.relpath)?;
            }

            if act.is_some() {
                if let Some(changelist) = changelist {
                    // Reset the ACTUAL row to carry nothing but the
                    // changelist membership.
                    conn.execute(
                        "INSERT OR REPLACE INTO actual_node \
                         (wc_id, local_relpath, parent_relpath, changelist) \
                         VALUES (?1, ?2, ?3, ?4)",
                        rusqlite::params![
                            wcroot.wc_id,
                            resolved.relpath,
                            parent_relpath,
                            changelist
                        ],
                    )?;
                } else {
                    conn.execute(
                        "DELETE FROM actual_node \
                         WHERE wc_id = ?1 AND local_relpath = ?2",
                        rusqlite::params![wcroot.wc_id, resolved.relpath],
                    )?;
                }
            }

            Ok(())
        })?;

        self.flush_entries(&resolved.pdh);
        Ok(())
    }

    /// Point the subtree at LOCAL_DIR_ABSPATH at a new repository root URL.
    /// The repository UUID is preserved; sparse inheritance means only rows
    /// with explicit coordinates need rewriting.
    pub fn global_relocate(&self, local_dir_abspath: &Path, repos_root_url: &str) -> Result<()> {
        assert!(local_dir_abspath.is_absolute());

        let (resolved, wcroot) = self.parse_path(local_dir_abspath)?;
        let sdb = wcroot.sdb()?;

        // The old repository identity, resolved through the inheritance
        // chain when this node stores none of its own.
        let base_info = sdb.with(|conn| {
            match get_base_row(conn, wcroot.wc_id, &resolved.relpath, local_dir_abspath)? {
                Some(_) => {
                    let (repos_id, repos_relpath) = scan_upwards_for_repos(
                        conn,
                        &wcroot,
                        &resolved.relpath,
                        local_dir_abspath,
                    )?;
                    let (_, uuid) = fetch_repos_info(conn, repos_id, local_dir_abspath)?;
                    Ok(Some((repos_id, repos_relpath, uuid)))
                }
                None => Ok(None),
            }
        })?;

        let (old_repos_id, old_repos_relpath, uuid) = match base_info {
            Some((id, relpath, uuid)) => (Some(id), Some(relpath), uuid),
            None => {
                // A purely added subtree: take the identity from the
                // addition's implied coordinates.
                let addition = self.scan_addition(local_dir_abspath)?;
                (None, None, addition.repos_uuid)
            }
        };

        sdb.with_transaction(|conn| {
            let new_repos_id = create_repos_id(conn, repos_root_url, &uuid)?;
            let path_like = like_prefix(&resolved.relpath);

            // Copy sources move with the relocate.
            match old_repos_id {
                Some(old) => conn.execute(
                    "UPDATE working_node SET copyfrom_repos_id = ?4 \
                     WHERE wc_id = ?1 AND copyfrom_repos_id = ?5 \
                       AND (local_relpath = ?2 OR local_relpath LIKE ?3 ESCAPE '#')",
                    rusqlite::params![wcroot.wc_id, resolved.relpath, path_like, new_repos_id, old],
                )?,
                None => conn.execute(
                    "UPDATE working_node SET copyfrom_repos_id = ?4 \
                     WHERE wc_id = ?1 AND copyfrom_repos_id IS NOT NULL \
                       AND (local_relpath = ?2 OR local_relpath LIKE ?3 ESCAPE '#')",
                    rusqlite::params![wcroot.wc_id, resolved.relpath, path_like, new_repos_id],
                )?,
            };

            if let (Some(old), Some(old_relpath)) = (old_repos_id, &old_repos_relpath) {
                // Cached server responses are for the old location.
                conn.execute(
                    "UPDATE base_node SET dav_cache = NULL \
                     WHERE wc_id = ?1 \
                       AND (local_relpath = ?2 OR local_relpath LIKE ?3 ESCAPE '#')",
                    rusqlite::params![wcroot.wc_id, resolved.relpath, path_like],
                )?;

                conn.execute(
                    "UPDATE base_node SET repos_id = ?4 \
                     WHERE wc_id = ?1 AND repos_id = ?5 \
                       AND (local_relpath = ?2 OR local_relpath LIKE ?3 ESCAPE '#')",
                    rusqlite::params![wcroot.wc_id, resolved.relpath, path_like, new_repos_id, old],
                )?;

                // Lock rows key on repository coordinates, not local paths.
                let repos_like = like_prefix(old_relpath);
                conn.execute(
                    "UPDATE lock SET repos_id = ?3 \
                     WHERE repos_id = ?4 \
                       AND (repos_relpath = ?1 OR repos_relpath LIKE ?2 ESCAPE '#')",
                    rusqlite::params![old_relpath, repos_like, new_repos_id, old],
                )?;
            }

            Ok(())
        })?;

        self.flush_entries(&resolved.pdh);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::properties::PropertySet;
    use crate::types::{Depth, OpenMode, Status};
    use crate::working::{insert_working_node, InsertWorking};
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    const ROOT_URL: &str = "http://repos.example.com/";
    const UUID: &str = "5a4c2a1e-90d1-4c41-94fc-6a79b4f9ba27";

    fn setup() -> (TempDir, WcDb, PathBuf) {
        let tmp = TempDir::new().unwrap();
        let wc = tmp.path().join("wc");
        fs::create_dir_all(&wc).unwrap();
        let db = WcDb::open(OpenMode::ReadWrite, false, false);
        db.init(&wc, "proj/trunk", ROOT_URL, Some(UUID), 0, Depth::Infinity)
            .unwrap();
        (tmp, db, wc)
    }

    fn add_base_file(db: &WcDb, wc: &Path, name: &str, rev: i64, data: &[u8]) -> Checksum {
        let checksum = Checksum::sha1(data);
        db.base_add_file(
            &wc.join(name),
            &format!("proj/trunk/{name}"),
            ROOT_URL,
            UUID,
            rev,
            &PropertySet::new(),
            rev,
            0,
            Some("author"),
            &checksum,
            Some(data.len() as i64),
        )
        .unwrap();
        checksum
    }

    fn insert_working_file(db: &WcDb, wc: &Path, relpath: &str, checksum: &Checksum) {
        let (_, wcroot) = db.parse_path(wc).unwrap();
        wcroot
            .sdb()
            .unwrap()
            .with_transaction(|conn| {
                insert_working_node(
                    conn,
                    &InsertWorking {
                        wc_id: wcroot.wc_id,
                        local_relpath: relpath.to_string(),
                        presence: Status::Normal,
                        kind: Kind::File,
                        checksum: Some(checksum.clone()),
                        ..Default::default()
                    },
                )
            })
            .unwrap();
    }

    #[test]
    fn test_commit_replaces_working_over_base() {
        let (_tmp, db, wc) = setup();
        add_base_file(&db, &wc, "a.txt", 1, b"old text");
        let new_checksum = Checksum::sha1(b"new text");
        insert_working_file(&db, &wc, "a.txt", &new_checksum);

        let mut props = PropertySet::new();
        props.set("p", b"v".to_vec());
        db.op_set_props(&wc.join("a.txt"), Some(&props)).unwrap();

        db.global_commit(
            &wc.join("a.txt"),
            7,
            1234,
            Some("committer"),
            Some(&new_checksum),
            None,
            None,
            false,
        )
        .unwrap();

        let info = db.read_info(&wc.join("a.txt")).unwrap();
        assert_eq!(info.status, Status::Normal);
        assert_eq!(info.revision, Some(7));
        assert_eq!(info.changed_rev, Some(7));
        assert_eq!(info.checksum, Some(new_checksum));
        assert!(!info.base_shadowed);
        assert!(info.changelist.is_none());

        // The ACTUAL props were folded into the new BASE.
        let base_props = db.base_get_props(&wc.join("a.txt")).unwrap();
        assert_eq!(base_props.get("p"), Some(b"v".as_slice()));
    }

    #[test]
    fn test_commit_added_file_inherits_repos_coords() {
        let (_tmp, db, wc) = setup();
        let checksum = Checksum::sha1(b"fresh");
        insert_working_file(&db, &wc, "new.txt", &checksum);

        db.global_commit(
            &wc.join("new.txt"),
            2,
            99,
            Some("committer"),
            Some(&checksum),
            None,
            None,
            false,
        )
        .unwrap();

        let (repos_relpath, root, uuid) = db.scan_base_repos(&wc.join("new.txt")).unwrap();
        assert_eq!(repos_relpath, "proj/trunk/new.txt");
        assert_eq!(root, ROOT_URL);
        assert_eq!(uuid, UUID);
    }

    #[test]
    fn test_commit_keep_changelist() {
        let (_tmp, db, wc) = setup();
        add_base_file(&db, &wc, "b.txt", 1, b"text");
        let checksum = Checksum::sha1(b"text2");
        insert_working_file(&db, &wc, "b.txt", &checksum);
        db.op_set_changelist(&wc.join("b.txt"), Some("wip")).unwrap();

        db.global_commit(
            &wc.join("b.txt"),
            3,
            0,
            None,
            Some(&checksum),
            None,
            None,
            true,
        )
        .unwrap();

        let info = db.read_info(&wc.join("b.txt")).unwrap();
        assert_eq!(info.status, Status::Normal);
        assert_eq!(info.changelist.as_deref(), Some("wip"));
    }
}

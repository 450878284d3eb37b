//! WORKING layer row plumbing
//!
//! The WORKING layer is the user-local overlay: scheduled adds, copies,
//! moves and deletes sitting on top of BASE. The public verbs that will
//! populate it (`op_copy`, `op_delete`, ...) are still contract-only, so
//! rows are written through this crate-internal interface, which the
//! scanners, commit and their tests drive.

use crate::checksum::Checksum;
use crate::error::Result;
use crate::paths::relpath_dirname;
use crate::properties::PropertySet;
use crate::types::{Depth, Kind, Status};
use rusqlite::Connection;

/// Field set for one WORKING row insertion.
pub(crate) struct InsertWorking {
    pub(crate) wc_id: i64,
    pub(crate) local_relpath: String,
    pub(crate) presence: Status,
    pub(crate) kind: Kind,
    pub(crate) checksum: Option<Checksum>,
    pub(crate) translated_size: Option<i64>,
    pub(crate) changed_rev: Option<i64>,
    pub(crate) changed_date: Option<i64>,
    pub(crate) changed_author: Option<String>,
    pub(crate) depth: Option<Depth>,
    pub(crate) target: Option<String>,
    pub(crate) copyfrom_repos_id: Option<i64>,
    pub(crate) copyfrom_repos_relpath: Option<String>,
    pub(crate) copyfrom_revision: Option<i64>,
    pub(crate) moved_here: bool,
    pub(crate) moved_to: Option<String>,
    pub(crate) props: Option<PropertySet>,
}

impl Default for InsertWorking {
    fn default() -> Self {
        InsertWorking {
            wc_id: 0,
            local_relpath: String::new(),
            presence: Status::Normal,
            kind: Kind::Unknown,
            checksum: None,
            translated_size: None,
            changed_rev: None,
            changed_date: None,
            changed_author: None,
            depth: None,
            target: None,
            copyfrom_repos_id: None,
            copyfrom_repos_relpath: None,
            copyfrom_revision: None,
            moved_here: false,
            moved_to: None,
            props: None,
        }
    }
}

/// Write a WORKING row, replacing any previous one. The copyfrom triple
/// must be fully present or fully absent.
#[allow(dead_code)] // reached through the scanner/commit test harnesses
pub(crate) fn insert_working_node(conn: &Connection, iw: &InsertWorking) -> Result<()> {
    debug_assert_eq!(
        iw.copyfrom_repos_id.is_some(),
        iw.copyfrom_repos_relpath.is_some()
    );
    debug_assert_eq!(
        iw.copyfrom_repos_id.is_some(),
        iw.copyfrom_revision.is_some()
    );

    let parent_relpath = if iw.local_relpath.is_empty() {
        None
    } else {
        Some(relpath_dirname(&iw.local_relpath))
    };

    conn.execute(
        "INSERT OR REPLACE INTO working_node (wc_id, local_relpath, \
         parent_relpath, presence, kind, checksum, translated_size, \
         changed_rev, changed_date, changed_author, depth, symlink_target, \
         copyfrom_repos_id, copyfrom_repos_relpath, copyfrom_revision, \
         moved_here, moved_to, properties) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, \
         ?15, ?16, ?17, ?18)",
        rusqlite::params![
            iw.wc_id,
            iw.local_relpath,
            parent_relpath,
            iw.presence.as_presence_token(),
            iw.kind.as_token(),
            iw.checksum.as_ref().map(Checksum::to_text),
            iw.translated_size,
            iw.changed_rev,
            iw.changed_date,
            iw.changed_author,
            iw.depth.map(Depth::as_word),
            iw.target,
            iw.copyfrom_repos_id,
            iw.copyfrom_repos_relpath,
            iw.copyfrom_revision,
            if iw.moved_here { Some(1i64) } else { None },
            iw.moved_to,
            iw.props.as_ref().map(PropertySet::to_blob),
        ],
    )?;
    Ok(())
}

/// Drop the WORKING row for a node.
pub(crate) fn delete_working_node(conn: &Connection, wc_id: i64, local_relpath: &str) -> Result<()> {
    conn.execute(
        "DELETE FROM working_node WHERE wc_id = ?1 AND local_relpath = ?2",
        rusqlite::params![wc_id, local_relpath],
    )?;
    Ok(())
}

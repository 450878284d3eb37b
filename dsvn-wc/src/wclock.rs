//! Advisory working copy locks
//!
//! A row in the lock table means "some actor is mutating this subtree".
//! The row protects against other processes; a per-handle in-memory bit
//! additionally records whether *this* process is the one holding it, so a
//! failed insert can be told apart from our own re-entry.

use crate::error::{Result, WcError};
use crate::wcroot::WcDb;
use std::path::Path;
use std::sync::atomic::Ordering;

impl WcDb {
    /// Take the advisory lock on the subtree at LOCAL_ABSPATH. Fails with
    /// `Locked` when any actor (including this process) already holds it.
    pub fn wclock_set(&self, local_abspath: &Path) -> Result<()> {
        let (resolved, wcroot) = self.parse_path(local_abspath)?;

        let inserted = wcroot.sdb()?.with(|conn| {
            conn.execute(
                "INSERT INTO wc_lock (wc_id, local_relpath) VALUES (?1, ?2)",
                rusqlite::params![wcroot.wc_id, resolved.relpath],
            )?;
            Ok(())
        });

        match inserted {
            Ok(()) => Ok(()),
            Err(e) if e.is_constraint_violation() => {
                Err(WcError::Locked(local_abspath.to_path_buf()))
            }
            Err(e) => Err(e),
        }
    }

    /// Whether anyone holds the advisory lock on LOCAL_ABSPATH.
    pub fn wclocked(&self, local_abspath: &Path) -> Result<bool> {
        let (resolved, wcroot) = self.parse_path(local_abspath)?;

        wcroot.sdb()?.with(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT 1 FROM wc_lock WHERE wc_id = ?1 AND local_relpath = ?2",
            )?;
            Ok(stmt.exists(rusqlite::params![wcroot.wc_id, resolved.relpath])?)
        })
    }

    /// Release the advisory lock and stop considering it ours.
    pub fn wclock_remove(&self, local_abspath: &Path) -> Result<()> {
        let (resolved, wcroot) = self.parse_path(local_abspath)?;

        wcroot.sdb()?.with(|conn| {
            conn.execute(
                "DELETE FROM wc_lock WHERE wc_id = ?1 AND local_relpath = ?2",
                rusqlite::params![wcroot.wc_id, resolved.relpath],
            )?;
            Ok(())
        })?;

        resolved.pdh.locked.store(false, Ordering::Relaxed);
        Ok(())
    }

    /// Record in memory that this process owns the lock on the directory,
    /// e.g. after reconciling with a lock taken through another interface.
    pub fn mark_locked(&self, local_dir_abspath: &Path) -> Result<()> {
        let resolved = self.resolve(local_dir_abspath)?;
        resolved.pdh.locked.store(true, Ordering::Relaxed);
        Ok(())
    }

    /// Whether this process marked itself as the lock owner.
    pub fn own_lock(&self, local_dir_abspath: &Path) -> Result<bool> {
        let resolved = self.resolve(local_dir_abspath)?;
        Ok(resolved.pdh.locked.load(Ordering::Relaxed))
    }
}

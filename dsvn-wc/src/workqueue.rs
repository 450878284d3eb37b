//! Persisted work queue
//!
//! Destructive on-disk operations are recorded here before they run, so a
//! crash leaves a replayable trail instead of a half-done working copy.
//! Single consumer, strict FIFO: items stay visible until explicitly
//! completed.

use crate::error::Result;
use crate::wcroot::WcDb;
use rusqlite::OptionalExtension;
use std::path::Path;

impl WcDb {
    /// Append a serialized work item and return its id.
    pub fn wq_add(&self, wri_abspath: &Path, work_item: &[u8]) -> Result<i64> {
        assert!(wri_abspath.is_absolute());
        assert!(!work_item.is_empty());

        let (_, wcroot) = self.parse_path(wri_abspath)?;

        wcroot.sdb()?.with(|conn| {
            conn.execute(
                "INSERT INTO work_queue (work) VALUES (?1)",
                rusqlite::params![work_item],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Peek at the head of the queue without removing it. Returns None
    /// when the queue is empty.
    pub fn wq_fetch(&self, wri_abspath: &Path) -> Result<Option<(i64, Vec<u8>)>> {
        assert!(wri_abspath.is_absolute());

        let (_, wcroot) = self.parse_path(wri_abspath)?;

        wcroot.sdb()?.with(|conn| {
            Ok(conn
                .query_row(
                    "SELECT id, work FROM work_queue ORDER BY id LIMIT 1",
                    [],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?)
        })
    }

    /// Remove a work item after its side effects have been fully applied.
    pub fn wq_completed(&self, wri_abspath: &Path, id: i64) -> Result<()> {
        assert!(wri_abspath.is_absolute());
        assert!(id != 0);

        let (_, wcroot) = self.parse_path(wri_abspath)?;

        wcroot.sdb()?.with(|conn| {
            conn.execute("DELETE FROM work_queue WHERE id = ?1", [id])?;
            Ok(())
        })
    }
}

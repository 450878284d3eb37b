//! Content-addressed pristine text store
//!
//! Pristine texts live under `<wcroot>/.svn/pristine/`, sharded by the
//! first two hex characters of their SHA-1 digest, with a companion row
//! recording the on-disk size. Installation is temp-then-rename within the
//! same volume so readers never observe partial files.

use crate::checksum::{Checksum, ChecksumKind};
use crate::error::{Result, WcError};
use crate::types::PristineCheckMode;
use crate::wcroot::{WcDb, PRISTINE_RELPATH, TEMPDIR_RELPATH};
use std::fs::{self, File};
use std::path::{Path, PathBuf};

/// The pristine store is keyed by SHA-1 only.
fn verify_checksum_kind(checksum: &Checksum) -> Result<()> {
    if checksum.kind() != ChecksumKind::Sha1 {
        return Err(WcError::BadChecksumKind);
    }
    Ok(())
}

/// The on-disk location of a pristine text: a pure function of the WCROOT
/// path and the digest.
fn pristine_path(wcroot_abspath: &Path, checksum: &Checksum) -> PathBuf {
    let hexdigest = checksum.hex_digest();
    wcroot_abspath
        .join(PRISTINE_RELPATH)
        .join(&hexdigest[..2])
        .join(&hexdigest)
}

impl WcDb {
    /// The directory callers must stage pristine files in before
    /// `pristine_install`, so the final rename stays on one volume.
    pub fn pristine_tempdir(&self, wri_abspath: &Path) -> Result<PathBuf> {
        let (_, wcroot) = self.parse_path(wri_abspath)?;
        Ok(wcroot.abspath.join(TEMPDIR_RELPATH))
    }

    /// Open the pristine text identified by CHECKSUM for reading.
    pub fn pristine_read(&self, wri_abspath: &Path, checksum: &Checksum) -> Result<File> {
        verify_checksum_kind(checksum)?;

        let (_, wcroot) = self.parse_path(wri_abspath)?;
        let path = pristine_path(&wcroot.abspath, checksum);

        File::open(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                WcError::PathNotFound(path)
            } else {
                WcError::Io(e)
            }
        })
    }

    /// Move the staged file at TEMPFILE_ABSPATH into the store under
    /// CHECKSUM and record its size. Installing a digest that is already
    /// present is allowed; the rename wins and the row stays put.
    pub fn pristine_install(&self, tempfile_abspath: &Path, checksum: &Checksum) -> Result<()> {
        assert!(tempfile_abspath.is_absolute());
        verify_checksum_kind(checksum)?;

        // The temp file sits inside the working copy, so resolving it
        // finds the owning WCROOT.
        let (_, wcroot) = self.parse_path(tempfile_abspath)?;

        let target = pristine_path(&wcroot.abspath, checksum);
        if let Some(shard_dir) = target.parent() {
            fs::create_dir_all(shard_dir)?;
        }

        fs::rename(tempfile_abspath, &target)?;
        let size = fs::metadata(&target)?.len() as i64;

        wcroot.sdb()?.with(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO pristine (checksum, size, refcount) \
                 VALUES (?1, ?2, 1)",
                rusqlite::params![checksum.to_text(), size],
            )?;
            Ok(())
        })?;

        tracing::debug!("installed pristine {} ({} bytes)", checksum, size);
        Ok(())
    }

    /// Report whether the pristine identified by CHECKSUM is present, per
    /// the requested MODE.
    pub fn pristine_check(
        &self,
        wri_abspath: &Path,
        checksum: &Checksum,
        mode: PristineCheckMode,
    ) -> Result<bool> {
        verify_checksum_kind(checksum)?;

        let (_, wcroot) = self.parse_path(wri_abspath)?;

        let row_present = || -> Result<bool> {
            wcroot.sdb()?.with(|conn| {
                let mut stmt =
                    conn.prepare_cached("SELECT 1 FROM pristine WHERE checksum = ?1")?;
                Ok(stmt.exists([checksum.to_text()])?)
            })
        };
        let file_present = || pristine_path(&wcroot.abspath, checksum).is_file();

        Ok(match mode {
            PristineCheckMode::RowOnly => row_present()?,
            PristineCheckMode::FileOnly => file_present(),
            PristineCheckMode::Both => row_present()? && file_present(),
        })
    }

    /// Stream a new pristine directly into the store. Callers stage via
    /// `pristine_tempdir` + `pristine_install` instead for crash safety.
    pub fn pristine_write(&self, wri_abspath: &Path, checksum: &Checksum) -> Result<File> {
        assert!(wri_abspath.is_absolute());
        verify_checksum_kind(checksum)?;
        Err(WcError::NotImplemented("pristine_write"))
    }

    /// Re-fetch a damaged pristine from the repository.
    pub fn pristine_repair(&self, wri_abspath: &Path, checksum: &Checksum) -> Result<()> {
        assert!(wri_abspath.is_absolute());
        verify_checksum_kind(checksum)?;
        Err(WcError::NotImplemented("pristine_repair"))
    }
}

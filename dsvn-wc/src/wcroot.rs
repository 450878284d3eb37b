//! Working copy database handle and path resolution
//!
//! A `WcDb` is shared by every caller in the process. It maps absolute
//! directory paths to per-directory handles, each of which points at the
//! WCROOT (and its open store) that owns the directory. Resolution walks
//! upward probing for the administrative store, then back-fills cache
//! entries for the whole ascended chain so later lookups are O(1).

use crate::base;
use crate::error::{Result, WcError};
use crate::paths::{abspath_basename, relpath_join, relpath_under};
use crate::sdb::{Sdb, SdbMode, WC_FORMAT_VERSION};
use crate::types::{Depth, Kind, OpenMode, ResolvedLocation, Status};
use rusqlite::{Connection, OptionalExtension};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

/// Name of the administrative subdirectory.
pub const ADM_DIR: &str = ".svn";

/// Store file inside the administrative subdirectory.
pub const SDB_FILE: &str = "wc.db";

/// Reserved staging name for in-place format upgrades.
pub const SDB_FILE_UPGRADE: &str = "wc.db.upgrade";

/// Pristine text storage, relative to the WCROOT.
pub(crate) const PRISTINE_RELPATH: &str = ".svn/pristine";

/// Temporary file area, relative to the WCROOT.
pub(crate) const TEMPDIR_RELPATH: &str = ".svn/tmp";

/// Callback invoked after every mutating verb with the directory whose
/// cached entries must be dropped.
pub type EntriesFlush = Box<dyn Fn(&Path) + Send + Sync>;

/// One WCROOT: the store plus its identity.
pub(crate) struct Wcroot {
    pub(crate) abspath: PathBuf,
    /// None for legacy (pre-store) working copies found via their marker
    /// file; such roots only exist to trigger an upgrade.
    pub(crate) sdb: Option<Sdb>,
    pub(crate) wc_id: i64,
    pub(crate) format: i32,
}

impl Wcroot {
    /// The open store, available only on current-format roots.
    pub(crate) fn sdb(&self) -> Result<&Sdb> {
        self.verify_usable()?;
        Ok(self.sdb.as_ref().expect("verified wcroot has a store"))
    }

    pub(crate) fn verify_usable(&self) -> Result<()> {
        if self.sdb.is_none() || self.format != WC_FORMAT_VERSION {
            return Err(WcError::UpgradeRequired(self.abspath.clone()));
        }
        Ok(())
    }
}

/// Per-directory handle. Everything but the two flags is immutable once the
/// WCROOT has been attached.
pub(crate) struct Pdh {
    pub(crate) abspath: PathBuf,
    pub(crate) wcroot: OnceLock<Arc<Wcroot>>,
    /// This (versioned) directory sits where the parent expected a file.
    pub(crate) obstructed_file: AtomicBool,
    /// Whether this process owns the advisory lock on this directory.
    pub(crate) locked: AtomicBool,
}

impl Pdh {
    fn new(abspath: &Path) -> Pdh {
        Pdh {
            abspath: abspath.to_path_buf(),
            wcroot: OnceLock::new(),
            obstructed_file: AtomicBool::new(false),
            locked: AtomicBool::new(false),
        }
    }
}

/// Result of resolving an absolute path against the handle cache.
pub(crate) struct Resolved {
    pub(crate) pdh: Arc<Pdh>,
    pub(crate) relpath: String,
    pub(crate) obstructed: bool,
}

impl Resolved {
    /// The owning WCROOT, verified usable.
    pub(crate) fn wcroot(&self) -> Result<&Arc<Wcroot>> {
        let wcroot = self
            .pdh
            .wcroot
            .get()
            .ok_or_else(|| WcError::corrupt(&self.pdh.abspath, "handle has no wcroot"))?;
        wcroot.verify_usable()?;
        Ok(wcroot)
    }
}

/// The process-wide working copy metadata database.
pub struct WcDb {
    #[allow(dead_code)]
    mode: OpenMode,
    auto_upgrade: bool,
    enforce_empty_wq: bool,
    dir_data: Mutex<HashMap<PathBuf, Arc<Pdh>>>,
    entries_flush: Mutex<Option<EntriesFlush>>,
}

impl WcDb {
    /// Open a database context. No stores are opened until paths are
    /// resolved through it.
    pub fn open(mode: OpenMode, auto_upgrade: bool, enforce_empty_wq: bool) -> WcDb {
        WcDb {
            mode,
            auto_upgrade,
            enforce_empty_wq,
            dir_data: Mutex::new(HashMap::new()),
            entries_flush: Mutex::new(None),
        }
    }

    /// Drop every cached handle, closing the underlying stores. Idempotent.
    pub fn close(&self) {
        self.dir_data.lock().unwrap().clear();
    }

    /// Register the callback that invalidates externally cached entries
    /// whenever a verb mutates a directory.
    pub fn set_entries_flush(&self, callback: Option<EntriesFlush>) {
        *self.entries_flush.lock().unwrap() = callback;
    }

    pub(crate) fn flush_entries(&self, pdh: &Pdh) {
        if let Some(cb) = self.entries_flush.lock().unwrap().as_ref() {
            cb(&pdh.abspath);
        }
    }

    /// Create a fresh working copy store at LOCAL_ABSPATH and seed the root
    /// BASE node. A missing UUID is generated, as for a detached root.
    pub fn init(
        &self,
        local_abspath: &Path,
        repos_relpath: &str,
        repos_root_url: &str,
        repos_uuid: Option<&str>,
        initial_rev: i64,
        depth: Depth,
    ) -> Result<()> {
        assert!(local_abspath.is_absolute());
        assert!(matches!(
            depth,
            Depth::Empty | Depth::Files | Depth::Immediates | Depth::Infinity
        ));

        let adm = local_abspath.join(ADM_DIR);
        fs::create_dir_all(local_abspath.join(PRISTINE_RELPATH))?;
        fs::create_dir_all(local_abspath.join(TEMPDIR_RELPATH))?;

        let sdb = Sdb::open(&adm.join(SDB_FILE), SdbMode::RwCreate, false)?;
        let uuid = match repos_uuid {
            Some(u) => u.to_string(),
            None => uuid::Uuid::new_v4().to_string(),
        };

        let format = sdb.format();
        let (repos_id, wc_id) = sdb.with_transaction(|conn| {
            let repos_id = create_repos_id(conn, repos_root_url, &uuid)?;
            let wc_id = match existing_wc_id(conn)? {
                Some(id) => id,
                None => {
                    conn.execute("INSERT INTO wcroot (local_abspath) VALUES (NULL)", [])?;
                    conn.last_insert_rowid()
                }
            };
            Ok((repos_id, wc_id))
        })?;

        let wcroot = Arc::new(Wcroot {
            abspath: local_abspath.to_path_buf(),
            sdb: Some(sdb),
            wc_id,
            format,
        });

        let pdh = Arc::new(Pdh::new(local_abspath));
        let _ = pdh.wcroot.set(wcroot.clone());
        self.dir_data
            .lock()
            .unwrap()
            .insert(local_abspath.to_path_buf(), pdh);

        let presence = if initial_rev > 0 {
            Status::Incomplete
        } else {
            Status::Normal
        };

        wcroot.sdb()?.with_transaction(|conn| {
            base::insert_base_node(
                conn,
                &base::InsertBase {
                    wc_id,
                    local_relpath: String::new(),
                    repos_id: Some(repos_id),
                    repos_relpath: Some(repos_relpath.to_string()),
                    presence,
                    kind: Kind::Dir,
                    revision: Some(initial_rev),
                    depth: Some(depth),
                    ..Default::default()
                },
            )
        })?;

        tracing::debug!(
            "initialized working copy at {} (rev {})",
            local_abspath.display(),
            initial_rev
        );
        Ok(())
    }

    /// Resolve LOCAL_ABSPATH to its WCROOT, relative path and obstruction
    /// flag. The relative path is "" when the input is the WCROOT itself.
    pub fn resolve_location(&self, local_abspath: &Path) -> Result<ResolvedLocation> {
        let resolved = self.resolve(local_abspath)?;
        let wcroot = resolved
            .pdh
            .wcroot
            .get()
            .ok_or_else(|| WcError::corrupt(local_abspath, "handle has no wcroot"))?;
        Ok(ResolvedLocation {
            wcroot_abspath: wcroot.abspath.clone(),
            local_relpath: resolved.relpath,
            obstructed: resolved.obstructed,
        })
    }

    /// Forget every cached handle at or below LOCAL_DIR_ABSPATH, releasing
    /// the advisory locks this process held there. Used after structural
    /// operations (delete, upgrade) invalidate the cached state.
    pub fn forget_directory(&self, local_dir_abspath: &Path) -> Result<()> {
        let targets: Vec<PathBuf> = {
            let data = self.dir_data.lock().unwrap();
            data.keys()
                .filter(|p| p.starts_with(local_dir_abspath))
                .cloned()
                .collect()
        };

        for target in &targets {
            // Stale roots may already be gone from disk.
            let _ = self.wclock_remove(target);
        }

        let mut data = self.dir_data.lock().unwrap();
        for target in &targets {
            data.remove(target);
        }
        Ok(())
    }

    fn cached(&self, abspath: &Path) -> Option<Arc<Pdh>> {
        self.dir_data.lock().unwrap().get(abspath).cloned()
    }

    /// The workhorse: figure out which store owns LOCAL_ABSPATH and the
    /// relative path within it.
    pub(crate) fn resolve(&self, local_abspath: &Path) -> Result<Resolved> {
        assert!(local_abspath.is_absolute());

        if let Some(pdh) = self.cached(local_abspath) {
            if let Some(wcroot) = pdh.wcroot.get() {
                let relpath = relpath_under(&wcroot.abspath, &pdh.abspath);
                return Ok(Resolved {
                    relpath,
                    obstructed: pdh.obstructed_file.load(Ordering::Relaxed),
                    pdh,
                });
            }
        }

        // A file, symlink or missing node cannot hold the administrative
        // area; strip the basename and resolve the parent directory.
        let meta = fs::symlink_metadata(local_abspath);
        let on_disk = meta.is_ok();
        let is_dir = meta.map(|m| m.is_dir()).unwrap_or(false);

        let mut build_relpath = String::new();
        let mut always_check = false;
        let mut obstruction_possible = false;

        let dir_abspath: PathBuf = if is_dir {
            // A directory was found where the metadata may claim a file
            // lives; decided after the handle is built.
            obstruction_possible = true;
            local_abspath.to_path_buf()
        } else {
            build_relpath = abspath_basename(local_abspath);
            let parent = local_abspath
                .parent()
                .ok_or_else(|| WcError::NotWorkingCopy(local_abspath.to_path_buf()))?;

            if let Some(pdh) = self.cached(parent) {
                if let Some(wcroot) = pdh.wcroot.get() {
                    let dir_relpath = relpath_under(&wcroot.abspath, &pdh.abspath);
                    return Ok(Resolved {
                        relpath: relpath_join(&dir_relpath, &build_relpath),
                        obstructed: false,
                        pdh,
                    });
                }
            }

            // With nothing on disk we cannot tell how many levels are
            // fictitious, so probe the legacy marker on every step.
            if !on_disk {
                always_check = true;
            }
            parent.to_path_buf()
        };

        // Ascend until a store file (or a legacy marker) appears.
        let mut probe = dir_abspath.clone();
        let mut moved_upwards = false;
        let mut found_pdh: Option<Arc<Pdh>> = None;
        let mut sdb: Option<Sdb> = None;
        let mut legacy_format = 0;

        loop {
            let sdb_path = probe.join(ADM_DIR).join(SDB_FILE);
            if sdb_path.is_file() {
                sdb = Some(Sdb::open(&sdb_path, SdbMode::ReadWrite, self.auto_upgrade)?);
                break;
            }

            if !moved_upwards || always_check {
                legacy_format = get_old_version(&probe);
                if legacy_format != 0 {
                    break;
                }
            }

            probe = match probe.parent() {
                Some(parent) => parent.to_path_buf(),
                None => return Err(WcError::NotWorkingCopy(local_abspath.to_path_buf())),
            };
            moved_upwards = true;
            obstruction_possible = false;

            if let Some(pdh) = self.cached(&probe) {
                if pdh.wcroot.get().is_some() {
                    found_pdh = Some(pdh);
                    break;
                }
            }
        }

        let wcroot: Arc<Wcroot> = if let Some(found) = &found_pdh {
            found.wcroot.get().expect("found handle has wcroot").clone()
        } else if legacy_format == 0 {
            let sdb = sdb.expect("store was opened");
            let wc_id = fetch_wc_id(&sdb, local_abspath)?;
            if self.enforce_empty_wq {
                sdb.verify_no_work(&probe)?;
            }
            let format = sdb.format();
            tracing::debug!("found wcroot for {} at {}", local_abspath.display(), probe.display());
            Arc::new(Wcroot {
                abspath: probe.clone(),
                sdb: Some(sdb),
                wc_id,
                format,
            })
        } else {
            // Legacy working copy: no store to open, just enough state to
            // drive the upgrade.
            Arc::new(Wcroot {
                abspath: probe.clone(),
                sdb: None,
                wc_id: -1,
                format: legacy_format,
            })
        };

        let dir_pdh = Arc::new(Pdh::new(&dir_abspath));
        let _ = dir_pdh.wcroot.set(wcroot.clone());

        let dir_relpath = relpath_under(&wcroot.abspath, &dir_abspath);
        let relpath = relpath_join(&dir_relpath, &build_relpath);

        // The directory itself turned out to be a wcroot. If the parent's
        // metadata expected a file at this name, hand back the parent's
        // handle instead and flag the obstruction.
        if obstruction_possible && !moved_upwards && wcroot.sdb.is_some() {
            if let Some(parent_abspath) = dir_abspath.parent() {
                match self.resolve(parent_abspath) {
                    Ok(parent_resolved) => {
                        if let Ok(parent_wcroot) = parent_resolved.wcroot() {
                            let name = abspath_basename(&dir_abspath);
                            let lookfor = relpath_join(&parent_resolved.relpath, &name);
                            if determine_obstructed_file(parent_wcroot, &lookfor)? {
                                dir_pdh.obstructed_file.store(true, Ordering::Relaxed);
                                return Ok(Resolved {
                                    pdh: parent_resolved.pdh,
                                    relpath: lookfor,
                                    obstructed: true,
                                });
                            }
                        }
                    }
                    Err(WcError::NotWorkingCopy(_)) => {}
                    Err(other) => return Err(other),
                }
            }
        }

        let dir_pdh = {
            let mut data = self.dir_data.lock().unwrap();
            let entry = data
                .entry(dir_abspath.clone())
                .or_insert_with(|| dir_pdh.clone());
            // A placeholder stashed earlier gets its wcroot attached now.
            let _ = entry.wcroot.set(wcroot.clone());
            let dir_pdh = entry.clone();

            // Back-fill handles for everything we climbed past, so that
            // descending resolutions in this subtree stay cache-hits.
            if moved_upwards {
                let mut ancestor = dir_abspath.parent();
                while let Some(dir) = ancestor {
                    if !dir.starts_with(&wcroot.abspath) {
                        break;
                    }
                    let entry = data
                        .entry(dir.to_path_buf())
                        .or_insert_with(|| Arc::new(Pdh::new(dir)));
                    let _ = entry.wcroot.set(wcroot.clone());
                    if dir == wcroot.abspath {
                        break;
                    }
                    ancestor = dir.parent();
                }
            }
            dir_pdh
        };

        Ok(Resolved {
            pdh: dir_pdh,
            relpath,
            obstructed: false,
        })
    }

    /// Resolve and verify in one step; the common entry for the verbs.
    pub(crate) fn parse_path(&self, local_abspath: &Path) -> Result<(Resolved, Arc<Wcroot>)> {
        let resolved = self.resolve(local_abspath)?;
        let wcroot = resolved.wcroot()?.clone();
        Ok((resolved, wcroot))
    }
}

/// Read the single wcroot row. Its absence means the store is corrupt.
fn fetch_wc_id(sdb: &Sdb, local_abspath: &Path) -> Result<i64> {
    sdb.with(|conn| {
        let id: Option<i64> = conn
            .query_row(
                "SELECT id FROM wcroot WHERE local_abspath IS NULL",
                [],
                |row| row.get(0),
            )
            .optional()?;
        id.ok_or_else(|| WcError::corrupt(local_abspath, "missing a row in wcroot"))
    })
}

fn existing_wc_id(conn: &Connection) -> Result<Option<i64>> {
    Ok(conn
        .query_row(
            "SELECT id FROM wcroot WHERE local_abspath IS NULL",
            [],
            |row| row.get(0),
        )
        .optional()?)
}

/// Probe for a pre-store working copy and report its format (0 when the
/// directory carries no marker at all).
fn get_old_version(dir_abspath: &Path) -> i32 {
    for marker in ["entries", "format"] {
        let path = dir_abspath.join(ADM_DIR).join(marker);
        if let Ok(content) = fs::read_to_string(&path) {
            if let Some(first) = content.lines().next() {
                if let Ok(version) = first.trim().parse::<i32>() {
                    if version > 0 {
                        return version;
                    }
                }
            }
        }
    }
    0
}

/// Does the parent's metadata say a *file* lives at LOCAL_RELPATH?
fn determine_obstructed_file(wcroot: &Wcroot, local_relpath: &str) -> Result<bool> {
    let sdb = wcroot.sdb()?;
    sdb.with(|conn| {
        let working_kind: Option<String> = conn
            .query_row(
                "SELECT kind FROM working_node WHERE wc_id = ?1 AND local_relpath = ?2",
                rusqlite::params![wcroot.wc_id, local_relpath],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(kind) = working_kind {
            return Ok(kind == "file");
        }

        let base_kind: Option<String> = conn
            .query_row(
                "SELECT kind FROM base_node WHERE wc_id = ?1 AND local_relpath = ?2",
                rusqlite::params![wcroot.wc_id, local_relpath],
                |row| row.get(0),
            )
            .optional()?;
        Ok(base_kind.as_deref() == Some("file"))
    })
}

/// Fetch (root_url, uuid) for an interned repository id.
pub(crate) fn fetch_repos_info(
    conn: &Connection,
    repos_id: i64,
    local_abspath: &Path,
) -> Result<(String, String)> {
    let row: Option<(String, String)> = conn
        .query_row(
            "SELECT root_url, uuid FROM repository WHERE id = ?1",
            [repos_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    row.ok_or_else(|| {
        WcError::corrupt(
            local_abspath,
            format!("no repository table entry for id {repos_id}"),
        )
    })
}

/// Return the repos_id for (root_url, uuid), interning a new row if needed.
pub(crate) fn create_repos_id(conn: &Connection, root_url: &str, uuid: &str) -> Result<i64> {
    let existing: Option<i64> = conn
        .query_row(
            "SELECT id FROM repository WHERE root_url = ?1",
            [root_url],
            |row| row.get(0),
        )
        .optional()?;
    if let Some(id) = existing {
        return Ok(id);
    }

    conn.execute(
        "INSERT INTO repository (root_url, uuid) VALUES (?1, ?2)",
        rusqlite::params![root_url, uuid],
    )?;
    Ok(conn.last_insert_rowid())
}

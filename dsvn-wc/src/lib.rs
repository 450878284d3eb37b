//! DSvn working copy metadata database
//!
//! The administrative store of a working copy: for every path under a
//! working copy root it records the last-seen repository state (BASE), the
//! user's scheduled changes (WORKING) and the observed local reality
//! (ACTUAL), plus the content-addressed pristine texts the base layer
//! points at.
//!
//! - Store wrapper over sqlite (one `wc.db` per working copy root)
//! - Path resolver mapping absolute paths to (root, relpath) handles
//! - Three-layer node model with a composite status per node
//! - Ancestor scanners for inherited repository coordinates and
//!   addition/deletion provenance
//! - Commit and relocate as single-transaction bulk rewrites
//! - Crash-safe work queue and advisory working copy locks

pub mod base;
pub mod checksum;
pub mod commit;
pub mod error;
pub mod ops;
mod paths;
pub mod pristine;
pub mod properties;
pub mod read;
pub mod scan;
pub mod sdb;
pub mod types;
pub mod wclock;
pub mod wcroot;
pub mod workqueue;
mod working;

pub use base::BaseInfo;
pub use checksum::{Checksum, ChecksumKind};
pub use error::{Result, WcError};
pub use properties::{svn_props, PropertySet, PropertyValue};
pub use read::WcInfo;
pub use scan::{AdditionInfo, DeletionInfo};
pub use sdb::{WC_FORMAT_VERSION, WC_MIN_FORMAT_VERSION};
pub use types::{
    Conflict, Depth, Kind, LockInfo, OpenMode, PristineCheckMode, ResolvedLocation, Status,
};
pub use wcroot::{EntriesFlush, WcDb, ADM_DIR, SDB_FILE, SDB_FILE_UPGRADE};

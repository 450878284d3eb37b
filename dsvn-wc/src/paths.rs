//! Internal relative path helpers
//!
//! Paths inside a working copy store are relative to the WCROOT and always
//! use '/' as the separator. The WCROOT itself is the empty string.

use std::path::{Path, PathBuf};

/// Join two relative paths. Either side may be empty.
pub(crate) fn relpath_join(base: &str, child: &str) -> String {
    if base.is_empty() {
        child.to_string()
    } else if child.is_empty() {
        base.to_string()
    } else {
        format!("{}/{}", base, child)
    }
}

/// The parent portion of a relative path ("" for single-component paths).
pub(crate) fn relpath_dirname(relpath: &str) -> String {
    match relpath.rfind('/') {
        Some(idx) => relpath[..idx].to_string(),
        None => String::new(),
    }
}

/// The final component of a relative path.
pub(crate) fn relpath_basename(relpath: &str) -> &str {
    match relpath.rfind('/') {
        Some(idx) => &relpath[idx + 1..],
        None => relpath,
    }
}

/// The final component of an absolute path, as a string.
pub(crate) fn abspath_basename(abspath: &Path) -> String {
    abspath
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Compute the store-relative path of ABSPATH under ROOT. ABSPATH must be
/// equal to ROOT or lie underneath it.
pub(crate) fn relpath_under(root: &Path, abspath: &Path) -> String {
    match abspath.strip_prefix(root) {
        Ok(rel) => {
            let parts: Vec<String> = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            parts.join("/")
        }
        Err(_) => String::new(),
    }
}

/// Turn a store-relative path back into an absolute path under ROOT.
pub(crate) fn abspath_join(root: &Path, relpath: &str) -> PathBuf {
    if relpath.is_empty() {
        root.to_path_buf()
    } else {
        let mut out = root.to_path_buf();
        for part in relpath.split('/') {
            out.push(part);
        }
        out
    }
}

//! Versioned property storage
//!
//! A property set maps property names to byte-string values. Sets are
//! persisted in node rows as a single blob: the bincode encoding of the
//! sorted map, which length-prefixes every name and value and therefore
//! round-trips arbitrary bytes, including empty values.

use crate::error::{Result, WcError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Property value bytes.
pub type PropertyValue = Vec<u8>;

/// Property set for a single node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertySet {
    properties: BTreeMap<String, PropertyValue>,
}

impl PropertySet {
    /// Create a new empty property set
    pub fn new() -> Self {
        Self {
            properties: BTreeMap::new(),
        }
    }

    /// Get a property value
    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.properties.get(name).map(|v| v.as_slice())
    }

    /// Set a property value
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<PropertyValue>) {
        self.properties.insert(name.into(), value.into());
    }

    /// Remove a property
    pub fn remove(&mut self, name: &str) -> Option<PropertyValue> {
        self.properties.remove(name)
    }

    /// Check if property exists
    pub fn contains(&self, name: &str) -> bool {
        self.properties.contains_key(name)
    }

    /// List all property names, sorted
    pub fn names(&self) -> Vec<String> {
        self.properties.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Serialize into the column blob form.
    pub(crate) fn to_blob(&self) -> Vec<u8> {
        // A BTreeMap of plain byte strings cannot fail to encode.
        bincode::serialize(&self.properties).expect("property set serialization")
    }

    /// Decode a column blob written by `to_blob`.
    pub(crate) fn from_blob(blob: &[u8], path: &Path) -> Result<PropertySet> {
        let properties: BTreeMap<String, PropertyValue> = bincode::deserialize(blob)
            .map_err(|e| WcError::corrupt(path, format!("bad property blob: {e}")))?;
        Ok(PropertySet { properties })
    }
}

/// SVN standard properties
pub mod svn_props {
    /// Executable flag
    pub const EXECUTABLE: &str = "svn:executable";

    /// MIME type
    pub const MIME_TYPE: &str = "svn:mime-type";

    /// End-of-line style
    pub const EOL_STYLE: &str = "svn:eol-style";

    /// Keywords
    pub const KEYWORDS: &str = "svn:keywords";

    /// Needs lock
    pub const NEEDS_LOCK: &str = "svn:needs-lock";

    /// Special property (symlinks)
    pub const SPECIAL: &str = "svn:special";

    /// Check if a property name is an SVN standard property
    pub fn is_svn_property(name: &str) -> bool {
        name.starts_with("svn:")
    }
}

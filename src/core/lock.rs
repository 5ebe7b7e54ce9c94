//! Lock file handling
//!
//! The lock file (hostpack.lock) records the exact revision every input
//! resolved to, so later resolutions reuse them instead of floating.
//! Entries are kept in a `BTreeMap` so the serialized file is byte-stable.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::InputError;
use crate::infra::filesystem;

/// Current lock file format version
pub const LOCK_VERSION: u32 = 1;

/// Lock file structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LockFile {
    /// Lock file format version
    pub version: u32,

    /// Locked inputs keyed by input path (`name` or `parent/child`)
    #[serde(default)]
    pub inputs: BTreeMap<String, LockedInput>,
}

/// A locked input entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LockedInput {
    /// Locator the revision was resolved from
    pub locator: String,

    /// Exact revision
    pub rev: String,

    /// Revision override in effect when the entry was written
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision_override: Option<String>,
}

impl LockFile {
    /// Create an empty lock file
    pub fn new() -> Self {
        Self {
            version: LOCK_VERSION,
            inputs: BTreeMap::new(),
        }
    }

    /// Parse from TOML string
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Serialize to TOML string
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Load from disk; a missing file yields an empty lock
    pub fn load(path: &Path) -> Result<Self, InputError> {
        if !path.exists() {
            return Ok(Self::new());
        }

        let content = filesystem::read_file(path).map_err(|e| InputError::Lock {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        let lock = Self::from_toml(&content).map_err(|e| InputError::Lock {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        if lock.version != LOCK_VERSION {
            return Err(InputError::Lock {
                path: path.to_path_buf(),
                error: format!(
                    "unsupported lock version {}, expected {LOCK_VERSION}",
                    lock.version
                ),
            });
        }

        Ok(lock)
    }

    /// Replace the lock file on disk as a whole
    pub fn save(&self, path: &Path) -> Result<(), InputError> {
        let content = self.to_toml().map_err(|e| InputError::Lock {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        filesystem::replace_file(path, content).map_err(|e| InputError::Lock {
            path: path.to_path_buf(),
            error: e.to_string(),
        })
    }

    /// Get a locked input
    pub fn get(&self, path: &str) -> Option<&LockedInput> {
        self.inputs.get(path)
    }

    /// Insert or replace a locked input
    pub fn insert(&mut self, path: String, input: LockedInput) {
        self.inputs.insert(path, input);
    }

    /// Drop entries whose paths are not in `keep`
    pub fn retain_paths<'a>(&mut self, keep: impl IntoIterator<Item = &'a String>) {
        let keep: std::collections::BTreeSet<&String> = keep.into_iter().collect();
        self.inputs.retain(|path, _| keep.contains(path));
    }

    /// Reusable revision for an input, if the entry still matches its declaration
    pub fn reusable_rev(
        &self,
        path: &str,
        locator: &str,
        revision_override: Option<&str>,
    ) -> Option<&str> {
        self.get(path)
            .filter(|locked| {
                locked.locator == locator && locked.revision_override.as_deref() == revision_override
            })
            .map(|locked| locked.rev.as_str())
    }
}

impl Default for LockFile {
    fn default() -> Self {
        Self::new()
    }
}

impl LockedInput {
    /// Create a locked entry
    pub fn new(locator: &str, rev: &str, revision_override: Option<&str>) -> Self {
        Self {
            locator: locator.to_string(),
            rev: rev.to_string(),
            revision_override: revision_override.map(String::from),
        }
    }
}

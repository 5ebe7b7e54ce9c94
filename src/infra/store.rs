//! Content-addressed artifact store
//!
//! Published artifacts live at `<store>/<key>-<name>-<version>` and are
//! never modified after publication. Work happens in siblings under
//! `<store>/.build` and `<store>/.staging`, so publishing is one rename on
//! the same filesystem: a store path either exists complete or not at all.

use std::path::{Path, PathBuf};

use crate::error::FilesystemError;
use crate::infra::filesystem;

const BUILD_DIR: &str = ".build";
const STAGING_DIR: &str = ".staging";

/// Artifact store rooted at a directory
#[derive(Debug, Clone)]
pub struct Store {
    root: PathBuf,
}

impl Store {
    /// Create a store handle; nothing is created on disk yet
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Store root
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path an artifact with this key is published at
    #[must_use]
    pub fn artifact_path(&self, key: &str, name: &str, version: &str) -> PathBuf {
        self.root.join(format!("{key}-{name}-{version}"))
    }

    /// Whether an artifact with this key has been published
    #[must_use]
    pub fn contains(&self, key: &str, name: &str, version: &str) -> bool {
        self.artifact_path(key, name, version).is_dir()
    }

    /// Key-derived working directory for building `key`
    ///
    /// Any leftover from an interrupted build is removed first.
    pub fn build_dir(&self, key: &str) -> Result<WorkDir, FilesystemError> {
        let path = self.root.join(BUILD_DIR).join(key);
        filesystem::remove_dir_all(&path)?;
        filesystem::create_dir_all(&path)?;
        Ok(WorkDir { path })
    }

    /// Fresh staging directory for assembling an artifact
    pub fn staging_dir(&self, key: &str) -> Result<tempfile::TempDir, FilesystemError> {
        let parent = self.root.join(STAGING_DIR);
        filesystem::create_dir_all(&parent)?;
        tempfile::Builder::new()
            .prefix(&format!("{key}-"))
            .tempdir_in(&parent)
            .map_err(|e| FilesystemError::CreateDir {
                path: parent,
                error: e.to_string(),
            })
    }

    /// Move a staged directory to its store path in one rename
    ///
    /// If another build published the same key first, the staged copy is
    /// dropped and the existing artifact is kept.
    pub fn publish(
        &self,
        staging: tempfile::TempDir,
        key: &str,
        name: &str,
        version: &str,
    ) -> Result<PathBuf, FilesystemError> {
        let dest = self.artifact_path(key, name, version);
        if dest.is_dir() {
            tracing::debug!("{} already published", dest.display());
            return Ok(dest);
        }

        // Dropping `staging` afterwards removes whatever was not renamed
        match filesystem::rename(staging.path(), &dest) {
            Ok(()) => Ok(dest),
            Err(_) if dest.is_dir() => Ok(dest),
            Err(e) => Err(e),
        }
    }
}

/// Working directory removed when dropped
#[derive(Debug)]
pub struct WorkDir {
    path: PathBuf,
}

impl WorkDir {
    /// Directory path
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for WorkDir {
    fn drop(&mut self) {
        if let Err(e) = filesystem::remove_dir_all(&self.path) {
            tracing::warn!("Failed to clean up {}: {e}", self.path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> (Store, TempDir) {
        let temp = TempDir::new().unwrap();
        (Store::new(temp.path().join("store")), temp)
    }

    #[test]
    fn test_artifact_path_structure() {
        let (store, _temp) = create_test_store();
        let path = store.artifact_path("abcd", "tool", "1.0.0");
        assert_eq!(path, store.root().join("abcd-tool-1.0.0"));
        assert!(!store.contains("abcd", "tool", "1.0.0"));
    }

    #[test]
    fn test_publish_is_atomic_rename() {
        let (store, _temp) = create_test_store();
        let staging = store.staging_dir("abcd").unwrap();
        std::fs::create_dir_all(staging.path().join("bin")).unwrap();
        std::fs::write(staging.path().join("bin/tool"), "#!/bin/sh\n").unwrap();

        let dest = store.publish(staging, "abcd", "tool", "1.0.0").unwrap();
        assert!(dest.join("bin/tool").is_file());
        assert!(store.contains("abcd", "tool", "1.0.0"));

        let leftovers = std::fs::read_dir(store.root().join(STAGING_DIR)).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn test_dropped_staging_leaves_nothing() {
        let (store, _temp) = create_test_store();
        {
            let staging = store.staging_dir("abcd").unwrap();
            std::fs::write(staging.path().join("partial"), "x").unwrap();
        }
        assert!(!store.contains("abcd", "tool", "1.0.0"));
        assert_eq!(std::fs::read_dir(store.root().join(STAGING_DIR)).unwrap().count(), 0);
    }

    #[test]
    fn test_publish_keeps_existing_artifact() {
        let (store, _temp) = create_test_store();
        let first = store.staging_dir("k").unwrap();
        std::fs::write(first.path().join("marker"), "first").unwrap();
        store.publish(first, "k", "t", "1").unwrap();

        let second = store.staging_dir("k").unwrap();
        std::fs::write(second.path().join("marker"), "second").unwrap();
        let dest = store.publish(second, "k", "t", "1").unwrap();
        assert_eq!(std::fs::read_to_string(dest.join("marker")).unwrap(), "first");
    }

    #[test]
    fn test_build_dir_removed_on_drop() {
        let (store, _temp) = create_test_store();
        let path = {
            let work = store.build_dir("k").unwrap();
            std::fs::write(work.path().join("f"), "x").unwrap();
            work.path().to_path_buf()
        };
        assert!(!path.exists());
    }
}

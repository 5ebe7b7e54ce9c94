//! Git operations
//!
//! Fetches a repository at a ref and exports the tree of the resolved commit
//! into a plain directory, using the gix crate.

use gix::remote::fetch::Shallow;
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Git operation errors
#[derive(Error, Debug)]
pub enum GitError {
    /// Failed to clone repository
    #[error("Failed to clone '{url}': {error}")]
    CloneFailed { url: String, error: String },

    /// Ref not found
    #[error("Ref '{reference}' not found in repository '{repo}'")]
    RefNotFound { repo: String, reference: String },

    /// Failed to resolve ref to SHA
    #[error("Failed to resolve ref '{reference}' to SHA: {error}")]
    ResolveFailed { reference: String, error: String },

    /// Failed to write the exported tree
    #[error("Failed to export tree to '{path}': {error}")]
    ExportFailed { path: PathBuf, error: String },

    /// IO error
    #[error("IO error for '{path}': {error}")]
    IoError { path: PathBuf, error: String },
}

/// Git reference to fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GitRef {
    /// Whatever the remote HEAD points at
    Head,
    /// Branch or tag name (e.g. "main", "v1.0.0")
    Named(String),
    /// Exact commit SHA
    Rev(String),
}

impl GitRef {
    /// Get the reference string
    pub fn as_str(&self) -> &str {
        match self {
            Self::Head => "HEAD",
            Self::Named(s) | Self::Rev(s) => s,
        }
    }

    /// Whether a string looks like a full commit id
    pub fn is_commit_id(s: &str) -> bool {
        s.len() == 40 && s.chars().all(|c| c.is_ascii_hexdigit())
    }
}

impl std::fmt::Display for GitRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Head => write!(f, "HEAD"),
            Self::Named(s) => write!(f, "ref:{s}"),
            Self::Rev(s) => write!(f, "rev:{s}"),
        }
    }
}

/// Git repository operations
#[derive(Debug)]
pub struct GitOperations {
    /// Scratch directory clones are made in
    work_dir: PathBuf,
}

impl GitOperations {
    /// Create a new git operations handler
    pub fn new(work_dir: PathBuf) -> Self {
        Self { work_dir }
    }

    /// Fetch `url` at `git_ref` and export the commit's tree into `dest`.
    ///
    /// Returns the resolved commit SHA. `dest` is replaced if it exists.
    pub fn fetch_tree(&self, url: &str, git_ref: &GitRef, dest: &Path) -> Result<String, GitError> {
        std::fs::create_dir_all(&self.work_dir).map_err(|e| GitError::IoError {
            path: self.work_dir.clone(),
            error: e.to_string(),
        })?;
        let scratch = tempfile::TempDir::new_in(&self.work_dir).map_err(|e| GitError::IoError {
            path: self.work_dir.clone(),
            error: e.to_string(),
        })?;

        let repo = Self::clone_internal(url, scratch.path(), git_ref)?;
        let commit_sha = Self::resolve_commit(&repo, url, git_ref)?;

        if dest.exists() {
            std::fs::remove_dir_all(dest).map_err(|e| GitError::IoError {
                path: dest.to_path_buf(),
                error: e.to_string(),
            })?;
        }
        Self::export_tree(&repo, &commit_sha, dest)?;

        Ok(commit_sha)
    }

    /// Clone into `dest` without checking out a worktree
    fn clone_internal(url: &str, dest: &Path, git_ref: &GitRef) -> Result<gix::Repository, GitError> {
        let clone_err = |e: &dyn std::fmt::Display| GitError::CloneFailed {
            url: url.to_string(),
            error: e.to_string(),
        };

        let mut prepare = gix::prepare_clone(url, dest).map_err(|e| clone_err(&e))?;

        match git_ref {
            GitRef::Head => {
                prepare = prepare.with_shallow(Shallow::DepthAtRemote(NonZeroU32::MIN));
            }
            GitRef::Named(name) => {
                prepare = prepare
                    .with_ref_name(Some(name.as_str()))
                    .map_err(|e| clone_err(&e))?;
                prepare = prepare.with_shallow(Shallow::DepthAtRemote(NonZeroU32::MIN));
            }
            // Arbitrary commits need the full history to be reachable
            GitRef::Rev(_) => {}
        }

        let (repo, _outcome) = prepare
            .fetch_only(gix::progress::Discard, &gix::interrupt::IS_INTERRUPTED)
            .map_err(|e| clone_err(&e))?;

        Ok(repo)
    }

    /// Resolve the ref of a fresh clone to a commit SHA
    fn resolve_commit(repo: &gix::Repository, url: &str, git_ref: &GitRef) -> Result<String, GitError> {
        let id = match git_ref {
            GitRef::Rev(rev) => {
                let oid = gix::ObjectId::from_hex(rev.as_bytes()).map_err(|e| {
                    GitError::ResolveFailed {
                        reference: git_ref.to_string(),
                        error: format!("Invalid SHA: {e}"),
                    }
                })?;
                repo.find_object(oid).map_err(|_| GitError::RefNotFound {
                    repo: url.to_string(),
                    reference: git_ref.to_string(),
                })?;
                oid
            }
            GitRef::Head | GitRef::Named(_) => repo
                .head_id()
                .map_err(|e| GitError::ResolveFailed {
                    reference: git_ref.to_string(),
                    error: e.to_string(),
                })?
                .detach(),
        };

        Ok(id.to_hex().to_string())
    }

    /// Write every blob of the commit's tree below `dest`
    fn export_tree(repo: &gix::Repository, commit_sha: &str, dest: &Path) -> Result<(), GitError> {
        use gix::object::tree::EntryKind;

        let export_err = |e: &dyn std::fmt::Display| GitError::ExportFailed {
            path: dest.to_path_buf(),
            error: e.to_string(),
        };

        let oid = gix::ObjectId::from_hex(commit_sha.as_bytes()).map_err(|e| export_err(&e))?;
        let commit = repo
            .find_object(oid)
            .map_err(|e| export_err(&e))?
            .try_into_commit()
            .map_err(|e| export_err(&e))?;
        let tree = commit.tree().map_err(|e| export_err(&e))?;

        let mut recorder = gix::traverse::tree::Recorder::default();
        tree.traverse()
            .breadthfirst(&mut recorder)
            .map_err(|e| export_err(&e))?;

        std::fs::create_dir_all(dest).map_err(|e| export_err(&e))?;

        for entry in recorder.records {
            let rel = PathBuf::from(String::from_utf8_lossy(&entry.filepath).into_owned());
            let path = dest.join(rel);

            match entry.mode.kind() {
                EntryKind::Tree => {
                    std::fs::create_dir_all(&path).map_err(|e| export_err(&e))?;
                }
                EntryKind::Blob | EntryKind::BlobExecutable => {
                    let object = repo.find_object(entry.oid).map_err(|e| export_err(&e))?;
                    if let Some(parent) = path.parent() {
                        std::fs::create_dir_all(parent).map_err(|e| export_err(&e))?;
                    }
                    std::fs::write(&path, &object.data).map_err(|e| export_err(&e))?;
                    if entry.mode.kind() == EntryKind::BlobExecutable {
                        crate::infra::filesystem::set_executable(&path)
                            .map_err(|e| export_err(&e))?;
                    }
                }
                EntryKind::Link => {
                    let object = repo.find_object(entry.oid).map_err(|e| export_err(&e))?;
                    let target = String::from_utf8_lossy(&object.data).into_owned();
                    if let Some(parent) = path.parent() {
                        std::fs::create_dir_all(parent).map_err(|e| export_err(&e))?;
                    }
                    #[cfg(unix)]
                    std::os::unix::fs::symlink(&target, &path).map_err(|e| export_err(&e))?;
                    #[cfg(not(unix))]
                    std::fs::write(&path, target).map_err(|e| export_err(&e))?;
                }
                // Submodules are not part of the exported tree
                EntryKind::Commit => {
                    tracing::debug!("Skipping submodule at {}", path.display());
                }
            }
        }

        Ok(())
    }
}

//! Filesystem operations
//!
//! Handles file and directory operations for staging, locking and publishing.

use std::path::Path;

use crate::error::FilesystemError;

/// Create a directory and all parent directories
pub fn create_dir_all(path: &Path) -> Result<(), FilesystemError> {
    std::fs::create_dir_all(path).map_err(|e| FilesystemError::CreateDir {
        path: path.to_path_buf(),
        error: e.to_string(),
    })
}

/// Remove a directory and all its contents
pub fn remove_dir_all(path: &Path) -> Result<(), FilesystemError> {
    if path.exists() {
        std::fs::remove_dir_all(path).map_err(|e| FilesystemError::RemoveDir {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
    }
    Ok(())
}

/// Write bytes to a file, creating parent directories
pub fn write_file(path: &Path, content: impl AsRef<[u8]>) -> Result<(), FilesystemError> {
    if let Some(parent) = path.parent() {
        create_dir_all(parent)?;
    }
    std::fs::write(path, content).map_err(|e| FilesystemError::WriteFile {
        path: path.to_path_buf(),
        error: e.to_string(),
    })
}

/// Replace a file as a whole: write a sibling temp file, then rename over
/// the target. Readers never observe a partially written file.
pub fn replace_file(path: &Path, content: impl AsRef<[u8]>) -> Result<(), FilesystemError> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    create_dir_all(parent)?;

    let write_err = |e: std::io::Error| FilesystemError::WriteFile {
        path: path.to_path_buf(),
        error: e.to_string(),
    };

    let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(write_err)?;
    std::io::Write::write_all(&mut tmp, content.as_ref()).map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;
    Ok(())
}

/// Read content from a file
pub fn read_file(path: &Path) -> Result<String, FilesystemError> {
    std::fs::read_to_string(path).map_err(|e| FilesystemError::ReadFile {
        path: path.to_path_buf(),
        error: e.to_string(),
    })
}

/// Copy a file, creating parent directories of the destination
pub fn copy_file(from: &Path, to: &Path) -> Result<(), FilesystemError> {
    if let Some(parent) = to.parent() {
        create_dir_all(parent)?;
    }
    std::fs::copy(from, to)
        .map(|_| ())
        .map_err(|e| FilesystemError::Copy {
            from: from.to_path_buf(),
            to: to.to_path_buf(),
            error: e.to_string(),
        })
}

/// Recreate a symlink at `to` with the same target as `from`
#[cfg(unix)]
pub fn copy_symlink(from: &Path, to: &Path) -> Result<(), FilesystemError> {
    let copy_err = |e: std::io::Error| FilesystemError::Copy {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        error: e.to_string(),
    };
    let target = std::fs::read_link(from).map_err(copy_err)?;
    if let Some(parent) = to.parent() {
        create_dir_all(parent)?;
    }
    std::os::unix::fs::symlink(target, to).map_err(copy_err)
}

/// Copy the file a symlink points at
#[cfg(not(unix))]
pub fn copy_symlink(from: &Path, to: &Path) -> Result<(), FilesystemError> {
    copy_file(from, to)
}

/// Rename a file or directory; both paths must be on one filesystem
pub fn rename(from: &Path, to: &Path) -> Result<(), FilesystemError> {
    std::fs::rename(from, to).map_err(|e| FilesystemError::Copy {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        error: e.to_string(),
    })
}

/// Point `link` at `target`, replacing any existing link in one rename
#[cfg(unix)]
pub fn replace_symlink(target: &Path, link: &Path) -> Result<(), FilesystemError> {
    let parent = link.parent().unwrap_or_else(|| Path::new("."));
    let file_name = link
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let staged = parent.join(format!(".{file_name}.{}.tmp", std::process::id()));

    let link_err = |e: std::io::Error| FilesystemError::WriteFile {
        path: link.to_path_buf(),
        error: e.to_string(),
    };
    if staged.is_symlink() {
        std::fs::remove_file(&staged).map_err(link_err)?;
    }
    std::os::unix::fs::symlink(target, &staged).map_err(link_err)?;
    rename(&staged, link)
}

/// Point `link` at `target` (symlinks need extra privileges elsewhere)
#[cfg(not(unix))]
pub fn replace_symlink(target: &Path, link: &Path) -> Result<(), FilesystemError> {
    write_file(link, target.to_string_lossy().as_bytes())
}

/// Mark a file executable (0o755)
#[cfg(unix)]
pub fn set_executable(path: &Path) -> Result<(), FilesystemError> {
    use std::os::unix::fs::PermissionsExt;

    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).map_err(|e| {
        FilesystemError::WriteFile {
            path: path.to_path_buf(),
            error: e.to_string(),
        }
    })
}

/// Mark a file executable (no-op where permissions carry no exec bit)
#[cfg(not(unix))]
pub fn set_executable(_path: &Path) -> Result<(), FilesystemError> {
    Ok(())
}

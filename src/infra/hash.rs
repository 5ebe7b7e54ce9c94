//! Content hashing
//!
//! SHA-256 helpers for content-addressed revisions and cache keys.
//! Directory hashes cover relative paths, file contents and symlink
//! targets, never timestamps or permissions, and walk entries in sorted
//! order so the result only depends on content.

use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;
use walkdir::WalkDir;

use crate::error::FilesystemError;

/// Hash arbitrary bytes to a lowercase hex string
pub fn hash_bytes(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Hash a file's contents
pub fn hash_file(path: &Path) -> Result<String, FilesystemError> {
    let read_err = |e: std::io::Error| FilesystemError::ReadFile {
        path: path.to_path_buf(),
        error: e.to_string(),
    };

    let mut file = std::fs::File::open(path).map_err(read_err)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];
    loop {
        let n = file.read(&mut buffer).map_err(read_err)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Hash a directory tree, skipping entries whose file name is in `exclude`
pub fn hash_directory(root: &Path, exclude: &[&str]) -> Result<String, FilesystemError> {
    let mut hasher = Sha256::new();

    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            e.file_name()
                .to_str()
                .map_or(true, |name| !exclude.contains(&name))
        });

    for entry in walker {
        let entry = entry.map_err(|e| FilesystemError::ReadFile {
            path: root.to_path_buf(),
            error: e.to_string(),
        })?;
        let rel = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .to_string_lossy()
            .replace('\\', "/");
        if rel.is_empty() {
            continue;
        }

        let file_type = entry.file_type();
        let line = if file_type.is_symlink() {
            let target = std::fs::read_link(entry.path()).map_err(|e| FilesystemError::ReadFile {
                path: entry.path().to_path_buf(),
                error: e.to_string(),
            })?;
            format!("L:{rel}:{}\n", target.display())
        } else if file_type.is_dir() {
            format!("D:{rel}\n")
        } else {
            format!("F:{rel}:{}\n", hash_file(entry.path())?)
        };
        hasher.update(line.as_bytes());
    }

    Ok(hex::encode(hasher.finalize()))
}

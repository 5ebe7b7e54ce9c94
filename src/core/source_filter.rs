//! Source-set filtering
//!
//! The files handed to the builder are `cleaned(root) ∩ union(allow)`:
//!
//! - the cleaned tree drops VCS metadata at any depth, the top-level
//!   `target/` directory, top-level `result*` out-links and anything matching
//!   a configured ignore glob;
//! - an allow entry selects a path when its glob matches the path itself or
//!   one of its ancestor directories, so `src` selects everything below it.
//!
//! Everything is computed on sets of `/`-separated relative paths, so
//! filtering an already filtered set changes nothing.

use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::defaults;
use crate::error::{ConfigError, FilesystemError};
use crate::infra::{filesystem, hash};

/// A compiled path glob
///
/// `**` matches across directories, `*` and `?` stay within one path
/// component.
#[derive(Debug, Clone)]
pub struct Glob {
    pattern: String,
    regex: Regex,
}

impl Glob {
    /// Compile a glob
    pub fn new(pattern: &str) -> Result<Self, ConfigError> {
        let trimmed = pattern.trim_start_matches("./").trim_end_matches('/');
        let mut re = String::from("^");
        let mut chars = trimmed.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '*' if chars.peek() == Some(&'*') => {
                    chars.next();
                    if chars.peek() == Some(&'/') {
                        chars.next();
                        re.push_str("(?:.*/)?");
                    } else {
                        re.push_str(".*");
                    }
                }
                '*' => re.push_str("[^/]*"),
                '?' => re.push_str("[^/]"),
                c => re.push_str(&regex::escape(&c.to_string())),
            }
        }
        re.push('$');

        let regex = Regex::new(&re).map_err(|e| ConfigError::InvalidField {
            field: "source".to_string(),
            message: format!("invalid glob '{pattern}': {e}"),
        })?;

        Ok(Self {
            pattern: pattern.to_string(),
            regex,
        })
    }

    /// The glob as written
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Whether the glob contains a path separator
    fn is_anchored(&self) -> bool {
        self.pattern.trim_end_matches('/').contains('/')
    }

    /// Match the path itself or any of its ancestors
    pub fn matches_path_or_ancestor(&self, path: &str) -> bool {
        ancestors(path).any(|p| self.regex.is_match(p))
    }

    /// Ignore-style match: unanchored globs match any single component
    fn matches_ignore(&self, path: &str) -> bool {
        if self.is_anchored() {
            self.matches_path_or_ancestor(path)
        } else {
            path.split('/').any(|component| self.regex.is_match(component))
        }
    }
}

/// `a/b/c` -> `a/b/c`, `a/b`, `a`
fn ancestors(path: &str) -> impl Iterator<Item = &str> {
    std::iter::successors(Some(path), |p| p.rfind('/').map(|i| &p[..i]))
}

/// Ordered allow-list of globs
#[derive(Debug, Clone)]
pub struct AllowList {
    entries: Vec<Glob>,
}

impl AllowList {
    /// Compile an allow-list
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self, ConfigError> {
        let entries = patterns
            .iter()
            .map(|p| Glob::new(p.as_ref()))
            .collect::<Result<_, _>>()?;
        Ok(Self { entries })
    }

    /// Entries in declared order
    pub fn entries(&self) -> &[Glob] {
        &self.entries
    }
}

/// Ordered set of relative file paths under a root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSet {
    root: PathBuf,
    files: BTreeSet<String>,
}

impl SourceSet {
    /// Build a set from explicit relative paths
    pub fn from_paths<I, S>(root: &Path, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            root: root.to_path_buf(),
            files: paths.into_iter().map(Into::into).collect(),
        }
    }

    /// Scan `root` into its cleaned tree
    pub fn scan<S: AsRef<str>>(root: &Path, ignore: &[S]) -> Result<Self, FilesystemError> {
        let ignore: Vec<Glob> = ignore
            .iter()
            .filter_map(|p| match Glob::new(p.as_ref()) {
                Ok(glob) => Some(glob),
                Err(e) => {
                    warn!("Skipping ignore entry: {e}");
                    None
                }
            })
            .collect();

        let walker = WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !is_excluded(entry));

        let mut files = BTreeSet::new();
        for entry in walker {
            let entry = entry.map_err(|e| FilesystemError::ReadFile {
                path: root.to_path_buf(),
                error: e.to_string(),
            })?;
            if entry.file_type().is_dir() {
                continue;
            }
            let Some(rel) = relative(root, entry.path()) else {
                continue;
            };
            if ignore.iter().any(|glob| glob.matches_ignore(&rel)) {
                debug!("Ignoring {rel}");
                continue;
            }
            files.insert(rel);
        }

        Ok(Self {
            root: root.to_path_buf(),
            files,
        })
    }

    /// Keep only paths selected by the allow-list
    ///
    /// Entries that select nothing are reported as `FilterPathAbsent` and
    /// contribute the empty set.
    #[must_use]
    pub fn filter(&self, allow: &AllowList) -> Self {
        let mut selected = BTreeSet::new();
        for glob in allow.entries() {
            let before = selected.len();
            let mut matched = false;
            for path in &self.files {
                if glob.matches_path_or_ancestor(path) {
                    matched = true;
                    selected.insert(path.clone());
                }
            }
            if !matched {
                warn!(
                    "FilterPathAbsent: '{}' matches nothing under {}",
                    glob.pattern(),
                    self.root.display()
                );
            } else {
                debug!(
                    "'{}' selected {} new paths",
                    glob.pattern(),
                    selected.len() - before
                );
            }
        }

        Self {
            root: self.root.clone(),
            files: selected,
        }
    }

    /// Root the paths are relative to
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Relative paths in sorted order
    pub fn files(&self) -> impl Iterator<Item = &String> {
        self.files.iter()
    }

    /// Whether a relative path is in the set
    pub fn contains(&self, path: &str) -> bool {
        self.files.contains(path)
    }

    /// Number of paths
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Per-file content hashes, keyed by relative path
    pub fn digest(&self) -> Result<BTreeMap<String, String>, FilesystemError> {
        self.files
            .iter()
            .map(|rel| {
                let path = self.root.join(rel);
                let content = if path.is_symlink() {
                    let target =
                        std::fs::read_link(&path).map_err(|e| FilesystemError::ReadFile {
                            path: path.clone(),
                            error: e.to_string(),
                        })?;
                    hash::hash_bytes(target.to_string_lossy().as_bytes())
                } else {
                    hash::hash_file(&path)?
                };
                Ok((rel.clone(), content))
            })
            .collect()
    }

    /// Copy the selected files into `dest`, preserving relative layout
    pub fn materialize(&self, dest: &Path) -> Result<(), FilesystemError> {
        filesystem::create_dir_all(dest)?;
        for rel in &self.files {
            let from = self.root.join(rel);
            let to = dest.join(rel);
            if from.is_symlink() {
                filesystem::copy_symlink(&from, &to)?;
            } else {
                filesystem::copy_file(&from, &to)?;
            }
        }
        Ok(())
    }
}

/// Entries never part of a cleaned tree
fn is_excluded(entry: &walkdir::DirEntry) -> bool {
    let name = entry.file_name().to_string_lossy();
    if defaults::VCS_DIRS.contains(&name.as_ref()) {
        return true;
    }

    let top_level = entry.depth() == 1;
    if top_level && entry.file_type().is_dir() && defaults::BUILD_DIRS.contains(&name.as_ref()) {
        return true;
    }
    top_level && entry.path_is_symlink() && name.starts_with(defaults::DEFAULT_OUT_LINK)
}

fn relative(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let rel = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    (!rel.is_empty()).then_some(rel)
}

//! Input declarations and resolved inputs
//!
//! An input is a named external source tree (package index snapshot,
//! overlay collection, utility repository) pinned to an exact revision.
//! Locators take one of two forms:
//!
//! - `git:<url>[#<ref>]` - a git repository, optionally at a branch or tag
//! - `path:<dir>` - a local directory, revisioned by its content hash

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::InputError;
use crate::infra::git::GitRef;

/// Declared input, as written in `[inputs.<name>]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputSpec {
    /// Input name
    pub name: String,
    /// Locator URI
    pub locator: String,
    /// Exact revision to use instead of the latest one
    pub revision_override: Option<String>,
    /// Sub-input name -> top-level input name it aliases
    pub follows: BTreeMap<String, String>,
}

impl InputSpec {
    /// Create a spec without override or follows
    pub fn new(name: impl Into<String>, locator: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            locator: locator.into(),
            revision_override: None,
            follows: BTreeMap::new(),
        }
    }

    /// Alias one of this input's sub-inputs to a top-level input
    #[must_use]
    pub fn with_follows(mut self, sub_input: impl Into<String>, target: impl Into<String>) -> Self {
        self.follows.insert(sub_input.into(), target.into());
        self
    }

    /// Parse the locator
    pub fn parsed_locator(&self) -> Result<Locator, InputError> {
        Locator::parse(&self.name, &self.locator)
    }
}

/// `[inputs.<name>]` table in hostpack.toml
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum InputDecl {
    /// `name = "git:https://..."`
    Url(String),
    /// `[inputs.name]` with url, rev and follows
    Table {
        /// Locator URI
        url: String,
        /// Revision override
        #[serde(default)]
        rev: Option<String>,
        /// Sub-input aliases
        #[serde(default)]
        follows: BTreeMap<String, String>,
    },
}

impl InputDecl {
    /// Convert into a spec with the given name
    pub fn into_spec(self, name: &str) -> InputSpec {
        match self {
            Self::Url(url) => InputSpec::new(name, url),
            Self::Table { url, rev, follows } => InputSpec {
                name: name.to_string(),
                locator: url,
                revision_override: rev,
                follows,
            },
        }
    }
}

/// Convert a declaration table into specs, ordered by name
pub fn specs_from_decls(decls: &BTreeMap<String, InputDecl>) -> Vec<InputSpec> {
    decls
        .iter()
        .map(|(name, decl)| decl.clone().into_spec(name))
        .collect()
}

/// Parsed locator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    /// Git repository
    Git {
        /// Clone URL
        url: String,
        /// Branch or tag to follow
        reference: Option<String>,
    },
    /// Local directory
    Path(PathBuf),
}

impl Locator {
    /// Parse a locator string
    pub fn parse(name: &str, locator: &str) -> Result<Self, InputError> {
        let invalid = |reason: &str| InputError::InvalidLocator {
            name: name.to_string(),
            locator: locator.to_string(),
            reason: reason.to_string(),
        };

        if let Some(rest) = locator.strip_prefix("git:") {
            let (url, reference) = match rest.split_once('#') {
                Some((url, reference)) if !reference.is_empty() => {
                    (url, Some(reference.to_string()))
                }
                Some((url, _)) => (url, None),
                None => (rest, None),
            };
            if url.is_empty() {
                return Err(invalid("git locator has no URL"));
            }
            Ok(Self::Git {
                url: url.to_string(),
                reference,
            })
        } else if let Some(rest) = locator.strip_prefix("path:") {
            if rest.is_empty() {
                return Err(invalid("path locator has no path"));
            }
            Ok(Self::Path(PathBuf::from(rest)))
        } else {
            Err(invalid("expected a 'git:' or 'path:' scheme"))
        }
    }

    /// Git ref to fetch for this locator, honoring an exact revision
    pub fn git_ref(&self, revision: Option<&str>) -> GitRef {
        match (revision, self) {
            (Some(rev), _) if GitRef::is_commit_id(rev) => GitRef::Rev(rev.to_lowercase()),
            (Some(rev), _) => GitRef::Named(rev.to_string()),
            (None, Self::Git { reference: Some(r), .. }) => GitRef::Named(r.clone()),
            (None, _) => GitRef::Head,
        }
    }

    /// Resolve a path locator relative to a base directory
    pub fn resolve_path(path: &Path, base: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base.join(path)
        }
    }
}

/// A resolved, immutable input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedInput {
    /// Input name
    pub name: String,
    /// Concrete revision (commit id or `sha256:` content hash)
    pub rev: String,
    /// Root of the source tree
    pub path: PathBuf,
}

/// Resolved inputs keyed by path (`name` or `parent/child`).
///
/// Followed sub-inputs share the `Arc` of their target.
pub type ResolvedInputs = BTreeMap<String, Arc<ResolvedInput>>;

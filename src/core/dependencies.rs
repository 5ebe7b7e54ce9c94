//! Locked dependency graph (Cargo.lock)
//!
//! The lock file pins every crate the build may use. Before building, the
//! manifest's declared dependencies are checked against it so a stale lock
//! fails fast with [`BuildError::LockMismatch`] instead of being rewritten
//! by the toolchain.

use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use crate::core::manifest::PackageManifest;
use crate::error::{BuildError, ConfigError};
use crate::infra::filesystem;

/// One `[[package]]` entry of Cargo.lock
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct LockedPackage {
    /// Crate name
    pub name: String,
    /// Exact version
    pub version: String,
    /// Registry or git source; absent for path crates
    #[serde(default)]
    pub source: Option<String>,
    /// Registry checksum
    #[serde(default)]
    pub checksum: Option<String>,
}

impl LockedPackage {
    /// Identity recorded in build descriptors
    fn pin(&self) -> String {
        match (&self.checksum, &self.source) {
            (Some(checksum), _) => format!("sha256:{checksum}"),
            (None, Some(source)) => source.clone(),
            (None, None) => "path".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CargoLock {
    #[serde(default)]
    package: Vec<LockedPackage>,
}

/// Every locked crate, keyed `name@version`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LockedDependencyGraph {
    packages: BTreeMap<String, LockedPackage>,
}

impl LockedDependencyGraph {
    /// Parse from TOML string
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        let lock: CargoLock = toml::from_str(content)?;
        Ok(Self {
            packages: lock
                .package
                .into_iter()
                .map(|p| (format!("{}@{}", p.name, p.version), p))
                .collect(),
        })
    }

    /// Load from a Cargo.lock file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.to_path_buf(),
            });
        }
        let parse_err = |error: String| ConfigError::Parse {
            path: path.to_path_buf(),
            error,
        };
        let content = filesystem::read_file(path).map_err(|e| parse_err(e.to_string()))?;
        Self::from_toml(&content).map_err(|e| parse_err(e.to_string()))
    }

    /// Number of locked crates
    pub fn len(&self) -> usize {
        self.packages.len()
    }

    /// Whether nothing is locked
    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Whether some version of `name` is locked
    pub fn contains_crate(&self, name: &str) -> bool {
        self.packages.values().any(|p| p.name == name)
    }

    /// `name@version -> checksum or source`, in sorted order
    pub fn pins(&self) -> BTreeMap<String, String> {
        self.packages
            .iter()
            .map(|(key, package)| (key.clone(), package.pin()))
            .collect()
    }

    /// Check that the lock covers the manifest
    pub fn verify(&self, manifest: &PackageManifest) -> Result<(), BuildError> {
        let root = format!("{}@{}", manifest.name, manifest.version);
        if !self.packages.contains_key(&root) {
            return Err(BuildError::LockMismatch {
                message: format!("Cargo.lock does not contain the root package {root}"),
            });
        }

        let missing: BTreeSet<&str> = manifest
            .declared_dependencies
            .keys()
            .filter(|name| !self.contains_crate(name))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(BuildError::LockMismatch {
                message: format!(
                    "declared dependencies missing from Cargo.lock: {}",
                    missing.into_iter().collect::<Vec<_>>().join(", ")
                ),
            });
        }

        for (name, requirements) in &manifest.declared_dependencies {
            for req in requirements {
                let locked = self.versions_of(name);
                if !locked.iter().any(|version| req.matches(version)) {
                    let found: Vec<String> = locked.iter().map(ToString::to_string).collect();
                    return Err(BuildError::LockMismatch {
                        message: format!(
                            "{name} requires {req}, Cargo.lock has {}",
                            found.join(", ")
                        ),
                    });
                }
            }
        }

        Ok(())
    }

    /// Locked versions of `name` that parse as semantic versions
    fn versions_of(&self, name: &str) -> Vec<semver::Version> {
        self.packages
            .values()
            .filter(|p| p.name == name)
            .filter_map(|p| semver::Version::parse(&p.version).ok())
            .collect()
    }
}

//! Build descriptors and cache keys
//!
//! A descriptor lists everything that can influence the published artifact.
//! Its cache key is a truncated SHA-256 of the descriptor's JSON encoding;
//! all maps are `BTreeMap`s so the encoding is canonical.

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::config::defaults;
use crate::core::augment::RuntimeDependency;
use crate::core::manifest::PackageManifest;
use crate::error::BuildError;
use crate::infra::hash;

/// Toolchain identity as recorded in the descriptor
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ToolchainId {
    /// Directory holding `cargo`
    pub bin: PathBuf,
    /// Channel or version, when the index records one
    pub version: Option<String>,
}

/// Everything that determines a build's output
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BuildDescriptor {
    /// Package metadata
    pub package: PackageManifest,
    /// Binary that is packaged
    pub binary: String,
    /// `name@version -> pin` from Cargo.lock
    pub locked_dependencies: BTreeMap<String, String>,
    /// `relative path -> sha256` of the filtered source set
    pub sources: BTreeMap<String, String>,
    /// Target triple
    pub target: String,
    /// Toolchain used
    pub toolchain: ToolchainId,
    /// Whether tests run before packaging
    pub run_tests: bool,
    /// Runtime dependencies baked into the wrapper, in priority order
    pub runtime: Vec<RuntimeDependency>,
}

impl BuildDescriptor {
    /// Canonical JSON encoding
    ///
    /// Fails for paths that are not valid UTF-8.
    pub fn canonical_json(&self) -> Result<Vec<u8>, BuildError> {
        serde_json::to_vec(self).map_err(|e| BuildError::Descriptor {
            error: e.to_string(),
        })
    }

    /// Cache key: first [`defaults::CACHE_KEY_LEN`] hex chars of the hash
    pub fn cache_key(&self) -> Result<String, BuildError> {
        let mut key = hash::hash_bytes(&self.canonical_json()?);
        key.truncate(defaults::CACHE_KEY_LEN);
        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::generators;
    use proptest::prelude::*;

    fn descriptor() -> BuildDescriptor {
        let package =
            PackageManifest::from_toml("[package]\nname = \"tool\"\nversion = \"0.3.0\"\n").unwrap();
        BuildDescriptor {
            package,
            binary: "tool".to_string(),
            locked_dependencies: BTreeMap::from([(
                "tool@0.3.0".to_string(),
                "path".to_string(),
            )]),
            sources: BTreeMap::from([("src/main.rs".to_string(), "ab".repeat(32))]),
            target: "x86_64-unknown-linux-gnu".to_string(),
            toolchain: ToolchainId {
                bin: PathBuf::from("/toolchain/bin"),
                version: Some("1.80.0".to_string()),
            },
            run_tests: false,
            runtime: vec![RuntimeDependency {
                name: "git".to_string(),
                bin_dir: PathBuf::from("/pkgs/git/bin"),
            }],
        }
    }

    #[test]
    fn test_cache_key_determinism() {
        assert_eq!(descriptor().cache_key().unwrap(), descriptor().cache_key().unwrap());
        assert_eq!(descriptor().cache_key().unwrap().len(), defaults::CACHE_KEY_LEN);
    }

    #[test]
    fn test_cache_key_covers_every_field() {
        let base = descriptor().cache_key().unwrap();

        let mut d = descriptor();
        d.target = "aarch64-unknown-linux-gnu".to_string();
        assert_ne!(d.cache_key().unwrap(), base, "target");

        let mut d = descriptor();
        d.run_tests = true;
        assert_ne!(d.cache_key().unwrap(), base, "run_tests");

        let mut d = descriptor();
        d.toolchain.version = Some("1.81.0".to_string());
        assert_ne!(d.cache_key().unwrap(), base, "toolchain");

        let mut d = descriptor();
        d.runtime.clear();
        assert_ne!(d.cache_key().unwrap(), base, "runtime");

        let mut d = descriptor();
        d.package.version = "0.3.1".to_string();
        assert_ne!(d.cache_key().unwrap(), base, "version");
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_toolchain_path_has_no_key() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let mut d = descriptor();
        d.toolchain.bin = PathBuf::from(OsStr::from_bytes(b"/tool\xffchain/bin"));
        assert!(matches!(d.cache_key(), Err(BuildError::Descriptor { .. })));
    }

    proptest! {
        #[test]
        fn prop_source_digest_changes_key(hash in generators::sha256_hash()) {
            let mut d = descriptor();
            let original = d.cache_key().unwrap();
            d.sources.insert("src/main.rs".to_string(), hash.clone());
            prop_assert_eq!(d.cache_key().unwrap() == original, hash == "ab".repeat(32));
        }
    }
}

//! Package manifest (Cargo.toml) parsing
//!
//! Only the parts the pipeline needs are read: the `[package]` metadata that
//! ends up in `metadata.json`, `[[bin]]` names, and the dependency tables the
//! lock file is checked against. The manifest is parsed once per run.

use semver::VersionReq;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::ConfigError;
use crate::infra::filesystem;

/// A maintainer parsed from `authors = ["Name <contact>"]`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct Maintainer {
    /// Display name
    pub name: String,
    /// Email or other contact, if given
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact: Option<String>,
}

impl Maintainer {
    /// Parse `Name <contact>` or a bare name
    pub fn parse(author: &str) -> Self {
        let author = author.trim();
        match author.split_once('<') {
            Some((name, rest)) if rest.ends_with('>') => Self {
                name: name.trim().to_string(),
                contact: Some(rest.trim_end_matches('>').trim().to_string()),
            },
            _ => Self {
                name: author.to_string(),
                contact: None,
            },
        }
    }
}

/// Package metadata
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PackageManifest {
    /// Package name
    pub name: String,
    /// Semver version
    pub version: String,
    /// Short description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Homepage URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub homepage: Option<String>,
    /// Repository URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
    /// SPDX license expression
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    /// Maintainers in declared order
    #[serde(default)]
    pub maintainers: Vec<Maintainer>,
    /// Names of `[[bin]]` targets
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub binaries: Vec<String>,
    /// Version requirements of every declared normal, build and target
    /// dependency, keyed by crate name; path and git crates without a
    /// `version` have none
    #[serde(skip)]
    pub declared_dependencies: BTreeMap<String, Vec<VersionReq>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct CargoToml {
    package: Option<PackageSection>,
    #[serde(default)]
    bin: Vec<BinSection>,
    #[serde(default)]
    dependencies: BTreeMap<String, DependencyDecl>,
    #[serde(default)]
    build_dependencies: BTreeMap<String, DependencyDecl>,
    #[serde(default)]
    target: BTreeMap<String, TargetSection>,
}

#[derive(Debug, Deserialize)]
struct PackageSection {
    name: Option<String>,
    version: Option<toml::Value>,
    description: Option<String>,
    homepage: Option<String>,
    repository: Option<String>,
    license: Option<String>,
    #[serde(default)]
    authors: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct BinSection {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct TargetSection {
    #[serde(default)]
    dependencies: BTreeMap<String, DependencyDecl>,
    #[serde(default)]
    build_dependencies: BTreeMap<String, DependencyDecl>,
}

/// `name = "1.0"` or `name = { version = "1.0", package = "real-name" }`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DependencyDecl {
    Version(String),
    Detailed {
        #[serde(default)]
        package: Option<String>,
        #[serde(default)]
        version: Option<String>,
    },
}

impl DependencyDecl {
    fn crate_name<'a>(&'a self, key: &'a str) -> &'a str {
        match self {
            Self::Detailed {
                package: Some(package),
                ..
            } => package,
            _ => key,
        }
    }

    fn requirement(&self, key: &str) -> Result<Option<VersionReq>, ConfigError> {
        let version = match self {
            Self::Version(version) => version,
            Self::Detailed {
                version: Some(version),
                ..
            } => version,
            Self::Detailed { version: None, .. } => return Ok(None),
        };
        VersionReq::parse(version)
            .map(Some)
            .map_err(|e| ConfigError::InvalidField {
                field: format!("dependencies.{key}"),
                message: format!("'{version}' is not a version requirement: {e}"),
            })
    }
}

impl PackageManifest {
    /// Parse from TOML string
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let raw: CargoToml = toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: "Cargo.toml".into(),
            error: e.to_string(),
        })?;

        let package = raw.package.ok_or_else(|| ConfigError::MissingField {
            field: "package".to_string(),
        })?;
        let name = package.name.ok_or_else(|| ConfigError::MissingField {
            field: "package.name".to_string(),
        })?;
        let version = match package.version {
            Some(toml::Value::String(version)) => version,
            Some(_) => {
                return Err(ConfigError::InvalidField {
                    field: "package.version".to_string(),
                    message: "must be a literal version string".to_string(),
                })
            }
            None => {
                return Err(ConfigError::MissingField {
                    field: "package.version".to_string(),
                })
            }
        };
        semver::Version::parse(&version).map_err(|e| ConfigError::InvalidField {
            field: "package.version".to_string(),
            message: format!("'{version}' is not a semantic version: {e}"),
        })?;

        let tables = std::iter::once(&raw.dependencies)
            .chain(std::iter::once(&raw.build_dependencies))
            .chain(
                raw.target
                    .values()
                    .flat_map(|t| [&t.dependencies, &t.build_dependencies]),
            );
        let mut declared_dependencies: BTreeMap<String, Vec<VersionReq>> = BTreeMap::new();
        for (key, decl) in tables.flat_map(|table| table.iter()) {
            let requirements = declared_dependencies
                .entry(decl.crate_name(key).to_string())
                .or_default();
            if let Some(req) = decl.requirement(key)? {
                requirements.push(req);
            }
        }

        Ok(Self {
            name,
            version,
            description: package.description,
            homepage: package.homepage,
            repository: package.repository,
            license: package.license,
            maintainers: package.authors.iter().map(|a| Maintainer::parse(a)).collect(),
            binaries: raw.bin.into_iter().filter_map(|b| b.name).collect(),
            declared_dependencies,
        })
    }

    /// Load from a Cargo.toml file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.to_path_buf(),
            });
        }
        let content = filesystem::read_file(path).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        Self::from_toml(&content).map_err(|e| match e {
            ConfigError::Parse { error, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                error,
            },
            other => other,
        })
    }

    /// Binary to package: explicit choice, a sole `[[bin]]`, or the package name
    pub fn binary_name(&self, configured: Option<&str>) -> String {
        match (configured, self.binaries.as_slice()) {
            (Some(name), _) => name.to_string(),
            (None, [only]) => only.clone(),
            (None, _) => self.name.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::generators;
    use proptest::prelude::*;

    const MANIFEST: &str = r#"
[package]
name = "hostcfg"
version = "1.4.2"
description = "Apply host configuration"
license = "MIT"
authors = ["Ada Lovelace <ada@example.com>", "Build Bot"]

[dependencies]
serde = { version = "1", features = ["derive"] }
json = { package = "serde_json", version = "1" }
anyhow = "1"

[build-dependencies]
cc = "1"

[target.'cfg(unix)'.dependencies]
libc = "0.2"

[dev-dependencies]
proptest = "1"
"#;

    #[test]
    fn test_parse_manifest_metadata() {
        let manifest = PackageManifest::from_toml(MANIFEST).unwrap();
        assert_eq!(manifest.name, "hostcfg");
        assert_eq!(manifest.version, "1.4.2");
        assert_eq!(
            manifest.maintainers,
            vec![
                Maintainer {
                    name: "Ada Lovelace".to_string(),
                    contact: Some("ada@example.com".to_string()),
                },
                Maintainer {
                    name: "Build Bot".to_string(),
                    contact: None,
                },
            ]
        );
    }

    #[test]
    fn test_declared_dependencies_resolve_renames() {
        let manifest = PackageManifest::from_toml(MANIFEST).unwrap();
        let declared: Vec<&str> = manifest
            .declared_dependencies
            .keys()
            .map(String::as_str)
            .collect();
        assert_eq!(declared, vec!["anyhow", "cc", "libc", "serde", "serde_json"]);
        assert_eq!(
            manifest.declared_dependencies["libc"],
            vec![VersionReq::parse("0.2").unwrap()]
        );
    }

    #[test]
    fn test_path_dependency_has_no_requirement() {
        let manifest = PackageManifest::from_toml(
            "[package]\nname = \"x\"\nversion = \"0.1.0\"\n[dependencies]\nlocal = { path = \"../local\" }\n",
        )
        .unwrap();
        assert!(manifest.declared_dependencies["local"].is_empty());
    }

    #[test]
    fn test_invalid_dependency_requirement_rejected() {
        let err = PackageManifest::from_toml(
            "[package]\nname = \"x\"\nversion = \"0.1.0\"\n[dependencies]\nserde = \"latest\"\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidField { field, .. } if field == "dependencies.serde"));
    }

    #[test]
    fn test_invalid_version_rejected() {
        let err = PackageManifest::from_toml("[package]\nname = \"x\"\nversion = \"one\"\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidField { field, .. } if field == "package.version"));
    }

    #[test]
    fn test_missing_package_table() {
        let err = PackageManifest::from_toml("[workspace]\nmembers = []\n").unwrap_err();
        assert!(matches!(err, ConfigError::MissingField { field } if field == "package"));
    }

    #[test]
    fn test_binary_name_selection() {
        let mut manifest = PackageManifest::from_toml(MANIFEST).unwrap();
        assert_eq!(manifest.binary_name(None), "hostcfg");
        assert_eq!(manifest.binary_name(Some("other")), "other");

        manifest.binaries = vec!["hc".to_string()];
        assert_eq!(manifest.binary_name(None), "hc");
    }

    proptest! {
        #[test]
        fn prop_semver_versions_accepted(
            name in generators::package_name(),
            version in generators::semver_version(),
        ) {
            let content = format!("[package]\nname = \"{name}\"\nversion = \"{version}\"\n");
            let manifest = PackageManifest::from_toml(&content).unwrap();
            prop_assert_eq!(manifest.name, name);
            prop_assert_eq!(manifest.version, version);
        }
    }
}

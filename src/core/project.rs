//! Project configuration (hostpack.toml) parsing
//!
//! The project configuration declares the inputs to pin, how the package
//! index is composed from them, which files form the source set, build
//! policy, runtime dependencies and development shell packages.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::config::defaults;
use crate::core::inputs::{specs_from_decls, InputDecl, InputSpec};
use crate::error::ConfigError;
use crate::infra::filesystem;

/// The project configuration (hostpack.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProjectConfig {
    /// Named input sources
    #[serde(default)]
    pub inputs: BTreeMap<String, InputDecl>,

    /// Package index composition
    #[serde(default)]
    pub index: IndexConfig,

    /// Source-set selection
    #[serde(default)]
    pub source: SourceConfig,

    /// Build policy
    #[serde(default)]
    pub build: BuildConfig,

    /// Runtime PATH injection
    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// Development shell
    #[serde(default)]
    pub devshell: DevShellConfig,
}

/// `[index]` section
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct IndexConfig {
    /// Input whose tree carries the base index.toml
    #[serde(default)]
    pub base: Option<String>,

    /// Inputs whose trees carry overlay.toml, applied in order
    #[serde(default)]
    pub overlays: Vec<String>,

    /// Executables looked up on the host PATH and added to the base index
    #[serde(default)]
    pub host: Vec<String>,
}

/// `[source]` section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceConfig {
    /// Allow-list of path globs relative to the project root
    #[serde(default = "default_include")]
    pub include: Vec<String>,

    /// Extra ignore globs applied to the cleaned tree
    #[serde(default)]
    pub ignore: Vec<String>,
}

fn default_include() -> Vec<String> {
    defaults::DEFAULT_INCLUDE.iter().map(ToString::to_string).collect()
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            include: default_include(),
            ignore: Vec::new(),
        }
    }
}

/// `[build]` section
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BuildConfig {
    /// Target triple (defaults to the host triple)
    #[serde(default)]
    pub target: Option<String>,

    /// Binary name (defaults to the package name)
    #[serde(default)]
    pub binary: Option<String>,

    /// Run the package's tests after building. Off by default.
    #[serde(default)]
    pub run_tests: bool,

    /// Pass --offline to the toolchain
    #[serde(default)]
    pub offline: bool,

    /// Number of parallel compilation jobs
    #[serde(default)]
    pub jobs: Option<usize>,
}

/// `[runtime]` section
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RuntimeConfig {
    /// Packages whose bin directories are prepended to PATH, in priority order
    #[serde(default)]
    pub dependencies: Vec<String>,
}

/// `[devshell]` section
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DevShellConfig {
    /// Packages exposed on PATH in the development shell
    #[serde(default)]
    pub packages: Vec<String>,
}

impl ProjectConfig {
    /// Parse from TOML string
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Serialize to TOML string
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Load and validate from a file
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
        let config = Self::from_toml(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load only if present, used for inputs that may declare their own inputs
    pub fn load_optional(path: &Path) -> Result<Option<Self>, ConfigError> {
        if path.exists() {
            Self::load(path).map(Some)
        } else {
            Ok(None)
        }
    }

    /// Check cross-references between sections
    pub fn validate(&self) -> Result<(), ConfigError> {
        let known = |name: &String| self.inputs.contains_key(name);

        if let Some(base) = &self.index.base {
            if !known(base) {
                return Err(ConfigError::InvalidField {
                    field: "index.base".to_string(),
                    message: format!("'{base}' is not a declared input"),
                });
            }
        }

        if let Some(missing) = self.index.overlays.iter().find(|name| !known(name)) {
            return Err(ConfigError::InvalidField {
                field: "index.overlays".to_string(),
                message: format!("'{missing}' is not a declared input"),
            });
        }

        if self.source.include.is_empty() {
            return Err(ConfigError::InvalidField {
                field: "source.include".to_string(),
                message: "the allow-list must name at least one path".to_string(),
            });
        }

        if self.build.jobs == Some(0) {
            return Err(ConfigError::InvalidField {
                field: "build.jobs".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        Ok(())
    }

    /// Input specs in name order
    pub fn input_specs(&self) -> Vec<InputSpec> {
        specs_from_decls(&self.inputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
[inputs]
tools = "path:../tools"

[inputs.pkgs]
url = "git:https://example.com/pkgs.git#main"
follows = { utils = "tools" }

[index]
base = "pkgs"
overlays = ["tools"]
host = ["git"]

[source]
include = ["src", "Cargo.toml", "Cargo.lock"]
ignore = ["*.swp"]

[build]
target = "aarch64-unknown-linux-gnu"
run_tests = true
jobs = 4

[runtime]
dependencies = ["nix", "git"]

[devshell]
packages = ["cargo", "rustc"]
"#;

    #[test]
    fn test_parse_full_config() {
        let config = ProjectConfig::from_toml(FULL).unwrap();
        assert!(config.validate().is_ok());

        assert_eq!(config.inputs.len(), 2);
        assert_eq!(config.index.base.as_deref(), Some("pkgs"));
        assert_eq!(config.source.ignore, vec!["*.swp"]);
        assert!(config.build.run_tests);
        assert_eq!(config.runtime.dependencies, vec!["nix", "git"]);
        assert_eq!(config.devshell.packages, vec!["cargo", "rustc"]);

        let specs = config.input_specs();
        assert_eq!(specs[0].name, "pkgs");
        assert_eq!(specs[0].follows.get("utils").map(String::as_str), Some("tools"));
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = ProjectConfig::from_toml("").unwrap();
        assert!(config.inputs.is_empty());
        assert_eq!(config.source.include, default_include());
        assert!(!config.build.run_tests, "tests are disabled unless requested");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_index_base_rejected() {
        let config = ProjectConfig::from_toml("[index]\nbase = \"nope\"\n").unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidField { field, .. }) if field == "index.base"
        ));
    }

    #[test]
    fn test_empty_allow_list_rejected() {
        let config = ProjectConfig::from_toml("[source]\ninclude = []\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let temp = tempfile::TempDir::new().unwrap();
        let err = ProjectConfig::load(&temp.path().join("hostpack.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound { .. }));
        assert!(ProjectConfig::load_optional(&temp.path().join("hostpack.toml"))
            .unwrap()
            .is_none());
    }
}

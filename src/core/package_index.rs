//! Package index loading
//!
//! Builds the base layer and declarative overlays of a [`PackageIndex`]
//! from input trees:
//!
//! - `index.toml` in the base input declares the stock packages;
//! - `overlay.toml` in each overlay input patches them, in declared order;
//! - `[index] host` names executables located on the host `PATH`.
//!
//! Both files share one shape:
//!
//! ```toml
//! [packages.git]
//! bin = "tools/git/bin"   # relative to the input tree
//! version = "2.44.0"
//!
//! [packages.cargo]
//! extends = true          # overlay.toml only: merge onto the previous value
//! version = "1.80.0"
//! ```

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::config::defaults;
use crate::core::overlay::{Overlay, PackageIndex, Value};
use crate::error::OverlayError;
use crate::infra::filesystem;

/// Name of the base layer
pub const BASE_LAYER: &str = "base";

/// A package as seen by the builder, augmenter and dev shell
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageInfo {
    /// Package name
    pub name: String,
    /// Directory holding the package's executables
    pub bin: PathBuf,
    /// Version, if the index records one
    pub version: Option<String>,
}

impl PackageInfo {
    /// Interpret an index value as a package
    pub fn from_value(name: &str, value: &Value) -> Result<Self, OverlayError> {
        let invalid = |message: &str| OverlayError::InvalidDefinition {
            name: name.to_string(),
            message: message.to_string(),
        };

        let table = value.as_table().ok_or_else(|| invalid("expected a table"))?;
        let bin = table
            .get("bin")
            .and_then(Value::as_str)
            .ok_or_else(|| invalid("missing string field 'bin'"))?;
        let version = table
            .get("version")
            .and_then(Value::as_str)
            .map(String::from);

        Ok(Self {
            name: name.to_string(),
            bin: PathBuf::from(bin),
            version,
        })
    }

    /// Build the index value for a package
    pub fn to_value(&self) -> Value {
        let mut table = toml::Table::new();
        table.insert(
            "bin".to_string(),
            Value::String(self.bin.to_string_lossy().into_owned()),
        );
        if let Some(version) = &self.version {
            table.insert("version".to_string(), Value::String(version.clone()));
        }
        Value::Table(table)
    }
}

/// Look up a package in the final view of the index
pub fn package(index: &PackageIndex, name: &str) -> Result<PackageInfo, OverlayError> {
    PackageInfo::from_value(name, &index.get(name)?)
}

/// On-disk shape of index.toml and overlay.toml
#[derive(Debug, Default, Deserialize)]
struct IndexFile {
    #[serde(default)]
    packages: BTreeMap<String, toml::Table>,
}

impl IndexFile {
    fn load(path: &Path) -> Result<Self, OverlayError> {
        let load_err = |error: String| OverlayError::Load {
            path: path.to_path_buf(),
            error,
        };
        let content = filesystem::read_file(path).map_err(|e| load_err(e.to_string()))?;
        toml::from_str(&content).map_err(|e| load_err(e.to_string()))
    }
}

/// Make a relative `bin` entry absolute against the tree it came from
fn absolutize_bin(mut table: toml::Table, tree: &Path) -> toml::Table {
    if let Some(Value::String(bin)) = table.get("bin") {
        let bin_path = Path::new(bin);
        if bin_path.is_relative() {
            let absolute = tree.join(bin_path).to_string_lossy().into_owned();
            table.insert("bin".to_string(), Value::String(absolute));
        }
    }
    table
}

/// Build the base layer from an optional index tree and host executables
pub fn load_base(index_tree: Option<&Path>, host: &[String]) -> Result<Overlay, OverlayError> {
    let mut base = Overlay::new(BASE_LAYER);

    for name in host {
        match which::which(name) {
            Ok(exe) => {
                let bin = exe.parent().map(Path::to_path_buf).unwrap_or_default();
                debug!("Host package '{name}' found in {}", bin.display());
                let info = PackageInfo {
                    name: name.clone(),
                    bin,
                    version: None,
                };
                base = base.set(name.clone(), info.to_value());
            }
            Err(e) => warn!("Host package '{name}' not found on PATH: {e}"),
        }
    }

    if let Some(tree) = index_tree {
        let path = tree.join(defaults::INDEX_FILE);
        let file = IndexFile::load(&path)?;
        debug!("Loaded {} packages from {}", file.packages.len(), path.display());
        for (name, table) in file.packages {
            base = base.set(name, Value::Table(absolutize_bin(table, tree)));
        }
    }

    Ok(base)
}

/// Load the declarative overlay shipped in an input tree
pub fn load_overlay(name: &str, tree: &Path) -> Result<Overlay, OverlayError> {
    let path = tree.join(defaults::OVERLAY_FILE);
    let file = IndexFile::load(&path)?;
    let mut overlay = Overlay::new(name);

    for (package, mut table) in file.packages {
        let extends = match table.remove("extends") {
            None => false,
            Some(Value::Boolean(extends)) => extends,
            Some(_) => {
                return Err(OverlayError::InvalidDefinition {
                    name: package,
                    message: format!("'extends' must be a boolean in {}", path.display()),
                })
            }
        };
        let table = absolutize_bin(table, tree);

        if extends {
            let key = package.clone();
            overlay = overlay.define(package, move |_, prev| {
                let mut merged = match prev.get(&key)? {
                    Value::Table(existing) => existing,
                    _ => {
                        return Err(OverlayError::InvalidDefinition {
                            name: key.clone(),
                            message: "cannot extend a non-table value".to_string(),
                        })
                    }
                };
                merged.extend(table.clone());
                Ok(Value::Table(merged))
            });
        } else {
            overlay = overlay.set(package, Value::Table(table));
        }
    }

    Ok(overlay)
}

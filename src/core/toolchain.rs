//! Pinned Rust toolchain overlay
//!
//! A project that carries `rust-toolchain.toml` (or the legacy plain-text
//! `rust-toolchain`) gets an extra overlay applied after every declared one.
//! It binds `rust-toolchain` to the pinned channel's rustup directory and
//! rebinds `cargo` and `rustc` to it through `final`, so anything asking the
//! index for `cargo` gets the pinned one.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::config::defaults;
use crate::core::overlay::Overlay;
use crate::core::package_index::PackageInfo;
use crate::error::OverlayError;
use crate::infra::filesystem;

/// Overlay name used in precedence reports
pub const TOOLCHAIN_LAYER: &str = "rust-toolchain";

/// Binding the derived toolchain is stored under
pub const TOOLCHAIN_BINDING: &str = "rust-toolchain";

/// Executables rebound to the pinned toolchain
const TOOLCHAIN_TOOLS: [&str; 2] = ["cargo", "rustc"];

#[derive(Debug, Deserialize)]
struct ToolchainFile {
    toolchain: ToolchainSection,
}

#[derive(Debug, Deserialize)]
struct ToolchainSection {
    channel: String,
}

/// A pinned toolchain channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinnedToolchain {
    /// Channel name (`stable`, `1.80.0`, `nightly-2024-06-01`)
    pub channel: String,
    /// File the pin was read from
    pub source: PathBuf,
}

impl PinnedToolchain {
    /// Read the pin from a source root, if one exists
    pub fn detect(root: &Path) -> Result<Option<Self>, OverlayError> {
        for file in defaults::TOOLCHAIN_FILES {
            let path = root.join(file);
            if !path.is_file() {
                continue;
            }

            let load_err = |error: String| OverlayError::Load {
                path: path.clone(),
                error,
            };
            let content = filesystem::read_file(&path).map_err(|e| load_err(e.to_string()))?;
            let channel = if file.ends_with(".toml") {
                toml::from_str::<ToolchainFile>(&content)
                    .map_err(|e| load_err(e.to_string()))?
                    .toolchain
                    .channel
            } else {
                parse_legacy(&content).ok_or_else(|| load_err("empty toolchain file".to_string()))?
            };

            debug!("Pinned toolchain '{channel}' from {}", path.display());
            return Ok(Some(Self {
                channel,
                source: path,
            }));
        }

        Ok(None)
    }

    /// Rustup bin directory for this channel on `host`
    pub fn bin_dir(&self, rustup_home: &Path, host: &str) -> PathBuf {
        let dir = if self.channel.contains(host) {
            self.channel.clone()
        } else {
            format!("{}-{host}", self.channel)
        };
        rustup_home.join("toolchains").join(dir).join("bin")
    }

    /// Overlay binding the toolchain and shadowing cargo and rustc
    pub fn overlay(&self, rustup_home: &Path, host: &str) -> Overlay {
        let toolchain = PackageInfo {
            name: TOOLCHAIN_BINDING.to_string(),
            bin: self.bin_dir(rustup_home, host),
            version: Some(self.channel.clone()),
        };

        let mut overlay = Overlay::new(TOOLCHAIN_LAYER).set(TOOLCHAIN_BINDING, toolchain.to_value());
        for tool in TOOLCHAIN_TOOLS {
            overlay = overlay.define(tool, |fin, _| fin.get(TOOLCHAIN_BINDING));
        }
        overlay
    }
}

/// First non-comment line of a legacy `rust-toolchain` file
fn parse_legacy(content: &str) -> Option<String> {
    content
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && !line.starts_with('#'))
        .map(String::from)
}

/// Rustup home: `$RUSTUP_HOME` or `~/.rustup`
pub fn rustup_home() -> PathBuf {
    std::env::var_os("RUSTUP_HOME")
        .map(PathBuf::from)
        .or_else(|| dirs::home_dir().map(|home| home.join(".rustup")))
        .unwrap_or_else(|| PathBuf::from(".rustup"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::overlay::PackageIndex;
    use crate::core::package_index;
    use tempfile::TempDir;

    const HOST: &str = "x86_64-unknown-linux-gnu";

    #[test]
    fn test_detect_toml_pin() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("rust-toolchain.toml"),
            "[toolchain]\nchannel = \"1.80.0\"\ncomponents = [\"clippy\"]\n",
        )
        .unwrap();

        let pin = PinnedToolchain::detect(dir.path()).unwrap().unwrap();
        assert_eq!(pin.channel, "1.80.0");
    }

    #[test]
    fn test_detect_legacy_pin() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("rust-toolchain"), "# pinned\nnightly-2024-06-01\n").unwrap();

        let pin = PinnedToolchain::detect(dir.path()).unwrap().unwrap();
        assert_eq!(pin.channel, "nightly-2024-06-01");
    }

    #[test]
    fn test_no_pin() {
        let dir = TempDir::new().unwrap();
        assert!(PinnedToolchain::detect(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_bin_dir_appends_host_once() {
        let pin = PinnedToolchain {
            channel: "stable".to_string(),
            source: PathBuf::new(),
        };
        assert_eq!(
            pin.bin_dir(Path::new("/r"), HOST),
            PathBuf::from("/r/toolchains/stable-x86_64-unknown-linux-gnu/bin")
        );

        let explicit = PinnedToolchain {
            channel: format!("1.80.0-{HOST}"),
            source: PathBuf::new(),
        };
        assert_eq!(
            explicit.bin_dir(Path::new("/r"), HOST),
            PathBuf::from("/r/toolchains/1.80.0-x86_64-unknown-linux-gnu/bin")
        );
    }

    #[test]
    fn test_overlay_shadows_stock_cargo() {
        let stock = PackageInfo {
            name: "cargo".to_string(),
            bin: PathBuf::from("/usr/bin"),
            version: Some("1.70.0".to_string()),
        };
        let base = Overlay::new("base").set("cargo", stock.to_value());
        let pin = PinnedToolchain {
            channel: "1.80.0".to_string(),
            source: PathBuf::new(),
        };

        let index = PackageIndex::compose(base, [pin.overlay(Path::new("/r"), HOST)]);
        let cargo = package_index::package(&index, "cargo").unwrap();
        assert_eq!(
            cargo.bin,
            PathBuf::from("/r/toolchains/1.80.0-x86_64-unknown-linux-gnu/bin")
        );
        assert_eq!(index.defined_by("cargo"), Some(TOOLCHAIN_LAYER));
        assert_eq!(cargo.version.as_deref(), Some("1.80.0"));
    }
}

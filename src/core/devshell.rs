//! Development environment composition
//!
//! The shell environment is recomputed from the package index on every
//! invocation; nothing about it is cached.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::core::overlay::PackageIndex;
use crate::core::package_index;
use crate::error::DevShellError;
use crate::infra::process;

/// Composed development environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DevShell {
    /// Package bin directories in declared order
    pub bin_dirs: Vec<PathBuf>,
}

impl DevShell {
    /// Look up every package in the index
    pub fn compose(index: &PackageIndex, packages: &[String]) -> Result<Self, DevShellError> {
        let mut bin_dirs: Vec<PathBuf> = Vec::new();
        for name in packages {
            let info =
                package_index::package(index, name).map_err(|e| DevShellError::PackageNotFound {
                    name: name.clone(),
                    error: e.to_string(),
                })?;
            if !bin_dirs.contains(&info.bin) {
                bin_dirs.push(info.bin);
            }
        }
        Ok(Self { bin_dirs })
    }

    /// PATH with the package directories in front of `existing`
    pub fn path(&self, existing: Option<&OsStr>) -> Result<OsString, DevShellError> {
        process::prepend_path(self.bin_dirs.as_slice(), existing).map_err(|e| {
            DevShellError::InvalidPath {
                error: e.to_string(),
            }
        })
    }

    /// `export PATH=...` line for `eval` in an existing shell
    pub fn export_line(&self, existing: Option<&OsStr>) -> Result<String, DevShellError> {
        let path = self.path(existing)?;
        Ok(format!(
            "export PATH='{}'",
            path.to_string_lossy().replace('\'', r"'\''")
        ))
    }

    /// Spawn `shell` interactively in `dir` and wait for it to exit
    ///
    /// Returns the shell's exit code.
    pub fn spawn(&self, shell: &Path, dir: &Path) -> Result<i32, DevShellError> {
        let spawn_err = |error: String| DevShellError::SpawnFailed {
            shell: shell.display().to_string(),
            error,
        };
        let path = self.path(std::env::var_os("PATH").as_deref())?;
        let status = Command::new(shell)
            .current_dir(dir)
            .env("PATH", path)
            .status()
            .map_err(|e| spawn_err(e.to_string()))?;
        Ok(status.code().unwrap_or(1))
    }
}

/// `$SHELL`, falling back to `/bin/sh`
pub fn user_shell() -> PathBuf {
    std::env::var_os("SHELL")
        .filter(|s| !s.is_empty())
        .map_or_else(|| PathBuf::from("/bin/sh"), PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::overlay::Overlay;
    use crate::core::package_index::PackageInfo;

    fn index() -> PackageIndex {
        let info = |name: &str, bin: &str| PackageInfo {
            name: name.to_string(),
            bin: PathBuf::from(bin),
            version: None,
        };
        let base = Overlay::new("base")
            .set("cargo", info("cargo", "/toolchain/bin").to_value())
            .set("rustc", info("rustc", "/toolchain/bin").to_value())
            .set("watch", info("watch", "/pkgs/watch/bin").to_value());
        PackageIndex::compose(base, Vec::new())
    }

    #[test]
    fn test_compose_dedups_in_order() {
        let shell = DevShell::compose(
            &index(),
            &["watch".to_string(), "cargo".to_string(), "rustc".to_string()],
        )
        .unwrap();
        assert_eq!(
            shell.bin_dirs,
            vec![PathBuf::from("/pkgs/watch/bin"), PathBuf::from("/toolchain/bin")]
        );
    }

    #[test]
    fn test_missing_package() {
        assert!(matches!(
            DevShell::compose(&index(), &["nope".to_string()]),
            Err(DevShellError::PackageNotFound { name, .. }) if name == "nope"
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_export_line() {
        let shell = DevShell::compose(&index(), &["cargo".to_string()]).unwrap();
        assert_eq!(
            shell.export_line(Some(OsStr::new("/usr/bin"))).unwrap(),
            "export PATH='/toolchain/bin:/usr/bin'"
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_package_dir_with_separator_is_rejected() {
        let shell = DevShell {
            bin_dirs: vec![PathBuf::from("/pkgs/a:b/bin")],
        };
        assert!(matches!(
            shell.export_line(Some(OsStr::new("/usr/bin"))),
            Err(DevShellError::InvalidPath { .. })
        ));
    }

    #[test]
    fn test_recomposition_reflects_index_changes() {
        let first = DevShell::compose(&index(), &["cargo".to_string()]).unwrap();
        let base = Overlay::new("base").set(
            "cargo",
            PackageInfo {
                name: "cargo".to_string(),
                bin: PathBuf::from("/other/bin"),
                version: None,
            }
            .to_value(),
        );
        let second =
            DevShell::compose(&PackageIndex::compose(base, Vec::new()), &["cargo".to_string()])
                .unwrap();
        assert_ne!(first, second);
    }

    #[cfg(unix)]
    #[test]
    fn test_spawn_reports_exit_code() {
        let shell = DevShell::compose(&index(), &[]).unwrap();
        let dir = tempfile::TempDir::new().unwrap();
        let script = dir.path().join("fake-shell");
        std::fs::write(&script, "#!/bin/sh\nexit 4\n").unwrap();
        crate::infra::filesystem::set_executable(&script).unwrap();

        assert_eq!(shell.spawn(&script, dir.path()).unwrap(), 4);
    }
}

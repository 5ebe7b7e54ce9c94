//! Build environment setup
//!
//! Everything the toolchain sees besides the command line: a fixed
//! timestamp, disabled incremental compilation, a private target directory,
//! and path remapping so the staging location never leaks into the binary.

use std::collections::BTreeMap;
use std::env::JoinPathsError;
use std::path::{Path, PathBuf};

use crate::config::defaults;
use crate::infra::process;

/// Prefix the private target directory is remapped to
const TARGET_REMAP_PREFIX: &str = "/build/target";

/// Environment for one cargo invocation
#[derive(Debug, Clone, PartialEq)]
pub struct BuildEnvironment {
    /// Target triple
    pub target: String,
    /// Staged source directory
    pub srcdir: PathBuf,
    /// Private `CARGO_TARGET_DIR`
    pub target_dir: PathBuf,
    /// Directory holding `cargo`, prepended to PATH
    pub toolchain_bin: PathBuf,
    /// Number of parallel jobs
    pub jobs: usize,
    /// Pass `--offline`
    pub offline: bool,
}

impl BuildEnvironment {
    /// Create an environment building `srcdir` into `target_dir`
    pub fn new(target: &str, srcdir: PathBuf, target_dir: PathBuf, toolchain_bin: PathBuf) -> Self {
        Self {
            target: target.to_string(),
            srcdir,
            target_dir,
            toolchain_bin,
            jobs: num_cpus::get(),
            offline: false,
        }
    }

    /// Set the number of parallel jobs
    #[must_use]
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs;
        self
    }

    /// Forbid network access during the build
    #[must_use]
    pub fn with_offline(mut self, offline: bool) -> Self {
        self.offline = offline;
        self
    }

    /// `RUSTFLAGS` remapping the staging and target directories
    pub fn rustflags(&self) -> String {
        format!(
            "--remap-path-prefix={}={} --remap-path-prefix={}={}",
            self.srcdir.display(),
            defaults::REMAP_PREFIX,
            self.target_dir.display(),
            TARGET_REMAP_PREFIX
        )
    }

    /// Cargo arguments shared by `build` and `test`
    pub fn cargo_args(&self, subcommand: &str) -> Vec<String> {
        let mut args = vec![
            subcommand.to_string(),
            "--release".to_string(),
            "--locked".to_string(),
            "--target".to_string(),
            self.target.clone(),
            "--jobs".to_string(),
            self.jobs.to_string(),
        ];
        if self.offline {
            args.push("--offline".to_string());
        }
        args
    }

    /// Convert to environment variable map for process execution
    pub fn to_env_map(&self) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();

        env.insert(
            "SOURCE_DATE_EPOCH".to_string(),
            defaults::SOURCE_DATE_EPOCH.to_string(),
        );
        env.insert("CARGO_INCREMENTAL".to_string(), "0".to_string());
        env.insert(
            "CARGO_TARGET_DIR".to_string(),
            self.target_dir.display().to_string(),
        );
        env.insert("RUSTFLAGS".to_string(), self.rustflags());
        env.insert("TZ".to_string(), "UTC".to_string());
        env.insert("LC_ALL".to_string(), "C".to_string());
        env
    }

    /// Path of the built binary inside the target directory
    pub fn artifact_path(&self, binary: &str) -> PathBuf {
        self.target_dir
            .join(&self.target)
            .join("release")
            .join(format!("{binary}{}", std::env::consts::EXE_SUFFIX))
    }

    /// Configure a command: working directory, environment and PATH
    ///
    /// Fails when the toolchain directory cannot be placed on `PATH`.
    pub fn apply(&self, command: &mut std::process::Command) -> Result<(), JoinPathsError> {
        let path = process::prepend_path(
            &[self.toolchain_bin.as_path()],
            std::env::var_os("PATH").as_deref(),
        )?;
        command
            .current_dir(&self.srcdir)
            // Would take precedence over RUSTFLAGS
            .env_remove("CARGO_ENCODED_RUSTFLAGS")
            .env_remove("CARGO_BUILD_RUSTFLAGS")
            .envs(self.to_env_map())
            .env("PATH", path);
        Ok(())
    }

    /// `cargo` inside the toolchain directory
    pub fn cargo(&self) -> PathBuf {
        cargo_in(&self.toolchain_bin)
    }
}

/// `cargo` executable inside a bin directory
pub fn cargo_in(bin: &Path) -> PathBuf {
    bin.join(format!("cargo{}", std::env::consts::EXE_SUFFIX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::generators;
    use proptest::prelude::*;

    fn env() -> BuildEnvironment {
        BuildEnvironment::new(
            "x86_64-unknown-linux-gnu",
            PathBuf::from("/store/.build/k/source"),
            PathBuf::from("/store/.build/k/target"),
            PathBuf::from("/toolchain/bin"),
        )
    }

    #[test]
    fn test_env_map_fixes_time_and_incrementality() {
        let map = env().to_env_map();
        assert_eq!(map["SOURCE_DATE_EPOCH"], "315532800");
        assert_eq!(map["CARGO_INCREMENTAL"], "0");
        assert_eq!(map["CARGO_TARGET_DIR"], "/store/.build/k/target");
    }

    #[test]
    fn test_rustflags_remap_staging_paths() {
        let flags = env().rustflags();
        assert!(flags.contains("--remap-path-prefix=/store/.build/k/source=/build/source"));
        assert!(flags.contains("--remap-path-prefix=/store/.build/k/target=/build/target"));
    }

    #[test]
    fn test_cargo_args() {
        let args = env().with_jobs(3).with_offline(true).cargo_args("build");
        assert_eq!(
            args,
            vec![
                "build",
                "--release",
                "--locked",
                "--target",
                "x86_64-unknown-linux-gnu",
                "--jobs",
                "3",
                "--offline"
            ]
        );
    }

    #[test]
    fn test_env_map_pins_locale_and_timezone() {
        let map = env().to_env_map();
        assert_eq!(map["TZ"], "UTC");
        assert_eq!(map["LC_ALL"], "C");
    }

    #[cfg(unix)]
    #[test]
    fn test_apply_rejects_toolchain_dir_with_separator() {
        let mut env = env();
        env.toolchain_bin = PathBuf::from("/tool:chain/bin");
        let mut command = std::process::Command::new("cargo");
        assert!(env.apply(&mut command).is_err());
    }

    #[test]
    fn test_artifact_path() {
        assert_eq!(
            env().artifact_path("tool"),
            PathBuf::from(format!(
                "/store/.build/k/target/x86_64-unknown-linux-gnu/release/tool{}",
                std::env::consts::EXE_SUFFIX
            ))
        );
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        #[test]
        fn prop_env_is_independent_of_jobs(
            target in generators::target_triple(),
            jobs in 1usize..=32,
        ) {
            let a = BuildEnvironment::new(&target, "/s".into(), "/t".into(), "/b".into());
            let b = a.clone().with_jobs(jobs);
            prop_assert_eq!(a.to_env_map(), b.to_env_map());
            prop_assert!(b.cargo_args("build").contains(&target));
        }
    }
}

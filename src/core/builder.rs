//! Artifact building
//!
//! Compiles the filtered source set with the pinned toolchain. Sources are
//! staged in a key-derived directory inside the store, the build runs with
//! `--locked` so the dependency lock is honored exactly, and the optional
//! test run uses the same environment.

use std::path::PathBuf;
use std::process::Command;
use tracing::{debug, info};

use crate::core::build_env::{self, BuildEnvironment};
use crate::core::dependencies::LockedDependencyGraph;
use crate::core::descriptor::BuildDescriptor;
use crate::core::source_filter::SourceSet;
use crate::error::{BuildError, FilesystemError};
use crate::infra::process;
use crate::infra::store::{Store, WorkDir};

/// Inputs of a single build
#[derive(Debug)]
pub struct BuildPlan<'a> {
    /// What is being built
    pub descriptor: &'a BuildDescriptor,
    /// Filtered sources
    pub sources: &'a SourceSet,
    /// Locked dependencies, checked before anything runs
    pub locked: &'a LockedDependencyGraph,
    /// Number of parallel jobs
    pub jobs: usize,
    /// Forbid network access
    pub offline: bool,
}

/// A compiled binary, valid while the work directory lives
#[derive(Debug)]
pub struct BuildOutput {
    /// Path to the compiled binary
    pub binary: PathBuf,
    /// Cache key of the descriptor that was built
    pub key: String,
    work: WorkDir,
}

impl BuildOutput {
    /// Work directory holding sources and build products
    pub fn work_dir(&self) -> &std::path::Path {
        self.work.path()
    }
}

/// Builds artifacts inside a store
#[derive(Debug, Clone)]
pub struct ArtifactBuilder {
    store: Store,
}

impl ArtifactBuilder {
    /// Create a builder working inside `store`
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Verify, stage, compile and optionally test
    pub fn build(&self, plan: &BuildPlan<'_>) -> Result<BuildOutput, BuildError> {
        let descriptor = plan.descriptor;
        let package = &descriptor.package.name;

        plan.locked.verify(&descriptor.package)?;

        let cargo_bin = descriptor.toolchain.bin.clone();
        let cargo = build_env::cargo_in(&cargo_bin);
        if !cargo.is_file() {
            return Err(BuildError::ToolchainNotFound {
                toolchain: cargo.display().to_string(),
            });
        }

        let key = descriptor.cache_key()?;
        let staging_err = |e: FilesystemError| BuildError::Staging {
            error: e.to_string(),
        };
        let work = self.store.build_dir(&key).map_err(staging_err)?;
        let srcdir = work.path().join("source");
        plan.sources.materialize(&srcdir).map_err(staging_err)?;
        debug!("Staged {} files in {}", plan.sources.len(), srcdir.display());

        let env = BuildEnvironment::new(
            &descriptor.target,
            srcdir,
            work.path().join("target"),
            cargo_bin,
        )
        .with_jobs(plan.jobs)
        .with_offline(plan.offline);

        info!("Building {package} for {}", descriptor.target);
        run_cargo(&env, "build").map_err(|error| BuildError::BuildFailed {
            package: package.clone(),
            error,
        })?;

        if descriptor.run_tests {
            info!("Testing {package}");
            run_cargo(&env, "test").map_err(|error| BuildError::TestsFailed {
                package: package.clone(),
                error,
            })?;
        } else {
            debug!("Tests disabled for {package}");
        }

        let binary = env.artifact_path(&descriptor.binary);
        if !binary.is_file() {
            return Err(BuildError::MissingArtifact {
                package: package.clone(),
                path: binary,
            });
        }

        Ok(BuildOutput { binary, key, work })
    }
}

fn run_cargo(env: &BuildEnvironment, subcommand: &str) -> Result<(), String> {
    let mut command = Command::new(env.cargo());
    command.args(env.cargo_args(subcommand));
    env.apply(&mut command)
        .map_err(|e| format!("cannot put toolchain on PATH: {e}"))?;
    process::run_captured(&mut command).map(|_| ())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::core::augment::RuntimeDependency;
    use crate::core::descriptor::ToolchainId;
    use crate::core::manifest::PackageManifest;
    use crate::infra::filesystem;
    use std::collections::BTreeMap;
    use std::path::Path;
    use tempfile::TempDir;

    const STUB_CARGO: &str = r#"#!/bin/sh
cmd="$1"; shift
target=""
while [ $# -gt 0 ]; do
  case "$1" in
    --target) target="$2"; shift 2 ;;
    *) shift ;;
  esac
done
case "$cmd" in
  build)
    [ -f fail-build ] && { echo "error: could not compile" >&2; exit 101; }
    mkdir -p "$CARGO_TARGET_DIR/$target/release"
    cp src/main.sh "$CARGO_TARGET_DIR/$target/release/tool"
    chmod +x "$CARGO_TARGET_DIR/$target/release/tool"
    ;;
  test)
    [ -f fail-tests ] && { echo "test result: FAILED" >&2; exit 101; }
    ;;
esac
"#;

    const LOCK: &str = "version = 3\n[[package]]\nname = \"tool\"\nversion = \"0.1.0\"\n";

    struct Fixture {
        _temp: TempDir,
        project: PathBuf,
        toolchain: PathBuf,
        store: Store,
    }

    fn fixture(extra: &[&str]) -> Fixture {
        let temp = TempDir::new().unwrap();
        let project = temp.path().join("project");
        filesystem::write_file(&project.join("src/main.sh"), "#!/bin/sh\necho tool\n").unwrap();
        filesystem::write_file(&project.join("Cargo.lock"), LOCK).unwrap();
        for file in extra {
            filesystem::write_file(&project.join(file), "").unwrap();
        }

        let toolchain = temp.path().join("toolchain/bin");
        filesystem::write_file(&toolchain.join("cargo"), STUB_CARGO).unwrap();
        filesystem::set_executable(&toolchain.join("cargo")).unwrap();

        let store = Store::new(temp.path().join("store"));
        Fixture {
            _temp: temp,
            project,
            toolchain,
            store,
        }
    }

    fn descriptor(toolchain: &Path, run_tests: bool) -> BuildDescriptor {
        BuildDescriptor {
            package: PackageManifest::from_toml("[package]\nname = \"tool\"\nversion = \"0.1.0\"\n")
                .unwrap(),
            binary: "tool".to_string(),
            locked_dependencies: BTreeMap::new(),
            sources: BTreeMap::new(),
            target: "x86_64-unknown-linux-gnu".to_string(),
            toolchain: ToolchainId {
                bin: toolchain.to_path_buf(),
                version: None,
            },
            run_tests,
            runtime: Vec::<RuntimeDependency>::new(),
        }
    }

    fn build(fx: &Fixture, run_tests: bool) -> Result<BuildOutput, BuildError> {
        let sources = SourceSet::scan::<&str>(&fx.project, &[]).unwrap();
        let locked = LockedDependencyGraph::from_toml(LOCK).unwrap();
        let descriptor = descriptor(&fx.toolchain, run_tests);
        ArtifactBuilder::new(fx.store.clone()).build(&BuildPlan {
            descriptor: &descriptor,
            sources: &sources,
            locked: &locked,
            jobs: 2,
            offline: true,
        })
    }

    #[test]
    fn test_build_produces_binary() {
        let fx = fixture(&[]);
        let output = build(&fx, false).unwrap();
        assert!(output.binary.is_file());
        assert!(output.work_dir().starts_with(fx.store.root()));
        assert_eq!(output.key, descriptor(&fx.toolchain, false).cache_key().unwrap());
    }

    #[test]
    fn test_work_dir_removed_after_drop() {
        let fx = fixture(&[]);
        let work = build(&fx, false).unwrap().work_dir().to_path_buf();
        assert!(!work.exists());
    }

    #[test]
    fn test_build_failure_reports_stderr() {
        let fx = fixture(&["fail-build"]);
        let err = build(&fx, false).unwrap_err();
        assert!(matches!(err, BuildError::BuildFailed { error, .. } if error.contains("could not compile")));
    }

    #[test]
    fn test_tests_only_run_when_enabled() {
        let fx = fixture(&["fail-tests"]);
        assert!(build(&fx, false).is_ok());
        assert!(matches!(build(&fx, true), Err(BuildError::TestsFailed { .. })));
    }

    #[test]
    fn test_toolchain_dir_with_path_separator_fails_build() {
        let fx = fixture(&[]);
        let odd = fx.toolchain.parent().unwrap().join("tool:chain");
        std::fs::rename(&fx.toolchain, &odd).unwrap();
        let sources = SourceSet::scan::<&str>(&fx.project, &[]).unwrap();
        let locked = LockedDependencyGraph::from_toml(LOCK).unwrap();
        let descriptor = descriptor(&odd, false);

        let err = ArtifactBuilder::new(fx.store.clone())
            .build(&BuildPlan {
                descriptor: &descriptor,
                sources: &sources,
                locked: &locked,
                jobs: 1,
                offline: true,
            })
            .unwrap_err();
        assert!(matches!(err, BuildError::BuildFailed { error, .. } if error.contains("PATH")));
    }

    #[test]
    fn test_missing_toolchain() {
        let fx = fixture(&[]);
        std::fs::remove_file(fx.toolchain.join("cargo")).unwrap();
        assert!(matches!(build(&fx, false), Err(BuildError::ToolchainNotFound { .. })));
    }

    #[test]
    fn test_lock_mismatch_stops_before_build() {
        let fx = fixture(&[]);
        let sources = SourceSet::scan::<&str>(&fx.project, &[]).unwrap();
        let locked = LockedDependencyGraph::from_toml("version = 3\n").unwrap();
        let descriptor = descriptor(&fx.toolchain, false);

        let err = ArtifactBuilder::new(fx.store.clone())
            .build(&BuildPlan {
                descriptor: &descriptor,
                sources: &sources,
                locked: &locked,
                jobs: 1,
                offline: false,
            })
            .unwrap_err();
        assert!(matches!(err, BuildError::LockMismatch { .. }));
        assert!(!fx.store.root().join(".build").exists());
    }
}

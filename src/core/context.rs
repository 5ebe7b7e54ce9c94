//! Project and build contexts
//!
//! Configuration, lock records and manifests are read once per run and
//! threaded through every stage from here. Stages never reopen these files.

use std::path::{Path, PathBuf};
use tracing::debug;

use crate::config::defaults;
use crate::core::dependencies::LockedDependencyGraph;
use crate::core::lock::LockFile;
use crate::core::manifest::PackageManifest;
use crate::core::project::ProjectConfig;
use crate::error::HostpackError;
use crate::infra::store::Store;

/// Per-invocation settings that do not live in hostpack.toml
#[derive(Debug, Clone, Default)]
pub struct Settings {
    /// Artifact store root
    pub store_dir: PathBuf,
    /// Fetched input cache root
    pub cache_dir: PathBuf,
    /// Build setting overrides from the command line
    pub overrides: BuildOverrides,
}

/// Command-line overrides of `[build]`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildOverrides {
    /// Target triple
    pub target: Option<String>,
    /// Run tests
    pub run_tests: Option<bool>,
    /// Parallel jobs
    pub jobs: Option<usize>,
    /// Offline mode
    pub offline: Option<bool>,
}

/// hostpack.toml and hostpack.lock of one project
#[derive(Debug, Clone)]
pub struct ProjectContext {
    /// Project root
    pub project_dir: PathBuf,
    /// Parsed hostpack.toml
    pub config: ProjectConfig,
    /// Input lock record as found on disk
    pub lock: LockFile,
    /// Run settings
    pub settings: Settings,
}

impl ProjectContext {
    /// Load the project rooted at `project_dir`
    pub fn load(project_dir: &Path, settings: Settings) -> Result<Self, HostpackError> {
        let config = ProjectConfig::load(&project_dir.join(defaults::PROJECT_FILE))?;
        let lock = LockFile::load(&project_dir.join(defaults::LOCK_FILE))?;
        debug!(
            "Loaded project at {} ({} inputs, {} locked)",
            project_dir.display(),
            config.inputs.len(),
            lock.inputs.len()
        );
        Ok(Self {
            project_dir: project_dir.to_path_buf(),
            config,
            lock,
            settings,
        })
    }

    /// Path of hostpack.lock
    pub fn lock_path(&self) -> PathBuf {
        self.project_dir.join(defaults::LOCK_FILE)
    }

    /// Artifact store
    pub fn store(&self) -> Store {
        Store::new(self.settings.store_dir.clone())
    }

    /// Effective target triple
    pub fn target(&self) -> String {
        self.settings
            .overrides
            .target
            .clone()
            .or_else(|| self.config.build.target.clone())
            .unwrap_or_else(|| crate::config::host_target().to_string())
    }

    /// Whether tests run
    pub fn run_tests(&self) -> bool {
        self.settings
            .overrides
            .run_tests
            .unwrap_or(self.config.build.run_tests)
    }

    /// Parallel jobs
    pub fn jobs(&self) -> usize {
        self.settings
            .overrides
            .jobs
            .or(self.config.build.jobs)
            .unwrap_or_else(num_cpus::get)
    }

    /// Offline mode
    pub fn offline(&self) -> bool {
        self.settings
            .overrides
            .offline
            .unwrap_or(self.config.build.offline)
    }
}

/// A project plus its package manifest and dependency lock
#[derive(Debug, Clone)]
pub struct BuildContext {
    /// Project configuration and lock record
    pub project: ProjectContext,
    /// Parsed Cargo.toml
    pub manifest: PackageManifest,
    /// Parsed Cargo.lock
    pub locked: LockedDependencyGraph,
}

impl BuildContext {
    /// Read Cargo.toml and Cargo.lock next to hostpack.toml
    pub fn load(project: ProjectContext) -> Result<Self, HostpackError> {
        let manifest = PackageManifest::load(&project.project_dir.join(defaults::MANIFEST_FILE))?;
        let locked =
            LockedDependencyGraph::load(&project.project_dir.join(defaults::CARGO_LOCK_FILE))?;
        debug!(
            "Package {} {} with {} locked crates",
            manifest.name,
            manifest.version,
            locked.len()
        );
        Ok(Self {
            project,
            manifest,
            locked,
        })
    }

    /// Binary name to package
    pub fn binary(&self) -> String {
        self.manifest
            .binary_name(self.project.config.build.binary.as_deref())
    }
}

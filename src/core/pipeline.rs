//! Pipeline stages
//!
//! ```text
//! resolve inputs -> compose index -> filter sources -> describe
//!     -> build -> augment -> publish -> out-link
//! ```
//!
//! Each stage is a function over the contexts loaded once in
//! [`crate::core::context`]. Input resolution is the only async stage.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::core::augment::{self, Augmenter};
use crate::core::builder::{ArtifactBuilder, BuildPlan};
use crate::core::context::{BuildContext, ProjectContext};
use crate::core::descriptor::{BuildDescriptor, ToolchainId};
use crate::core::inputs::ResolvedInputs;
use crate::core::overlay::{Overlay, PackageIndex};
use crate::core::package_index::{self, PackageInfo};
use crate::core::resolver::{InputResolver, ResolveOptions, Resolution};
use crate::core::source_filter::{AllowList, SourceSet};
use crate::core::toolchain::{self, PinnedToolchain};
use crate::error::{BuildError, HostpackError, OverlayError};
use crate::infra::filesystem;

/// Resolve every declared input and persist the lock record if it changed
pub async fn resolve_inputs(
    project: &ProjectContext,
    options: &ResolveOptions,
) -> Result<Resolution, HostpackError> {
    let resolver = InputResolver::new(
        project.project_dir.clone(),
        project.settings.cache_dir.clone(),
    );
    let resolution = resolver
        .resolve(&project.config.input_specs(), &project.lock, options)
        .await?;

    if resolution.changed {
        resolution.lock.save(&project.lock_path())?;
        info!("Wrote {}", project.lock_path().display());
    } else {
        debug!("Lock record unchanged");
    }
    Ok(resolution)
}

/// Compose base index, declared overlays and the toolchain pin
pub fn compose_index(
    project: &ProjectContext,
    inputs: &ResolvedInputs,
) -> Result<PackageIndex, HostpackError> {
    let config = &project.config.index;
    let tree_of = |name: &str| -> Result<PathBuf, OverlayError> {
        inputs
            .get(name)
            .map(|input| input.path.clone())
            .ok_or_else(|| OverlayError::Load {
                path: PathBuf::from(name),
                error: "input was not resolved".to_string(),
            })
    };

    let base_tree = config.base.as_deref().map(tree_of).transpose()?;
    let base = package_index::load_base(base_tree.as_deref(), &config.host)?;

    let mut overlays = config
        .overlays
        .iter()
        .map(|name| package_index::load_overlay(name, &tree_of(name)?))
        .collect::<Result<Vec<Overlay>, OverlayError>>()?;

    if let Some(pin) = PinnedToolchain::detect(&project.project_dir)? {
        info!("Using pinned toolchain {}", pin.channel);
        overlays.push(pin.overlay(&toolchain::rustup_home(), crate::config::host_target()));
    }

    let index = PackageIndex::compose(base, overlays);
    debug!("Composed index with {} layers", index.layer_count());
    Ok(index)
}

/// Scan, clean and filter the project tree
pub fn select_sources(project: &ProjectContext) -> Result<SourceSet, HostpackError> {
    let source = &project.config.source;
    let allow = AllowList::new(source.include.as_slice())?;
    let cleaned = SourceSet::scan(&project.project_dir, source.ignore.as_slice())?;
    let selected = cleaned.filter(&allow);
    info!("Selected {} of {} files", selected.len(), cleaned.len());
    Ok(selected)
}

/// `cargo` from the index, or from the host PATH when the index has none
pub fn toolchain_package(index: &PackageIndex) -> Result<PackageInfo, HostpackError> {
    if index.contains("cargo") {
        return Ok(package_index::package(index, "cargo")?);
    }

    let cargo = which::which("cargo").map_err(|e| BuildError::ToolchainNotFound {
        toolchain: format!("cargo is neither in the package index nor on PATH: {e}"),
    })?;
    warn!("Package index has no 'cargo'; using {}", cargo.display());
    Ok(PackageInfo {
        name: "cargo".to_string(),
        bin: cargo.parent().map(Path::to_path_buf).unwrap_or_default(),
        version: None,
    })
}

/// Everything that determines the artifact
pub fn describe(
    ctx: &BuildContext,
    index: &PackageIndex,
    sources: &SourceSet,
) -> Result<BuildDescriptor, HostpackError> {
    let cargo = toolchain_package(index)?;
    let runtime = augment::resolve_runtime(index, &ctx.project.config.runtime.dependencies)?;
    let sources = sources.digest()?;

    Ok(BuildDescriptor {
        package: ctx.manifest.clone(),
        binary: ctx.binary(),
        locked_dependencies: ctx.locked.pins(),
        sources,
        target: ctx.project.target(),
        toolchain: ToolchainId {
            bin: cargo.bin,
            version: cargo.version,
        },
        run_tests: ctx.project.run_tests(),
        runtime,
    })
}

/// Outcome of a build
#[derive(Debug, Clone, serde::Serialize)]
pub struct BuildReport {
    /// Published store path
    pub store_path: PathBuf,
    /// Cache key of the descriptor
    pub cache_key: String,
    /// Whether an existing artifact was reused
    pub cache_hit: bool,
    /// Out-link pointing at the store path, if one was created
    pub out_link: Option<PathBuf>,
}

/// Build, augment and publish, reusing a published artifact when possible
pub fn build_artifact(
    ctx: &BuildContext,
    descriptor: &BuildDescriptor,
    sources: &SourceSet,
) -> Result<BuildReport, HostpackError> {
    let store = ctx.project.store();
    let key = descriptor.cache_key()?;
    let package = &descriptor.package;

    if store.contains(&key, &package.name, &package.version) {
        info!("Cache hit for {} ({key})", package.name);
        return Ok(BuildReport {
            store_path: store.artifact_path(&key, &package.name, &package.version),
            cache_key: key,
            cache_hit: true,
            out_link: None,
        });
    }

    let output = ArtifactBuilder::new(store.clone()).build(&BuildPlan {
        descriptor,
        sources,
        locked: &ctx.locked,
        jobs: ctx.project.jobs(),
        offline: ctx.project.offline(),
    })?;
    let store_path = Augmenter::new(store).publish(&output, descriptor)?;

    Ok(BuildReport {
        store_path,
        cache_key: key,
        cache_hit: false,
        out_link: None,
    })
}

/// Point `link` at the published artifact
pub fn create_out_link(report: &mut BuildReport, link: &Path) -> Result<(), HostpackError> {
    filesystem::replace_symlink(&report.store_path, link)?;
    debug!("{} -> {}", link.display(), report.store_path.display());
    report.out_link = Some(link.to_path_buf());
    Ok(())
}

/// Summary of an evaluated project without building it
#[derive(Debug, Clone, serde::Serialize)]
pub struct Description {
    /// Descriptor the build would use
    pub descriptor: BuildDescriptor,
    /// Its cache key
    pub cache_key: String,
    /// Where the artifact is or would be published
    pub store_path: PathBuf,
    /// Whether that path already exists
    pub cached: bool,
    /// Layer that defines each index name
    pub index: BTreeMap<String, String>,
}

/// Evaluate every stage short of building
pub fn description(
    ctx: &BuildContext,
    index: &PackageIndex,
    sources: &SourceSet,
) -> Result<Description, HostpackError> {
    let descriptor = describe(ctx, index, sources)?;
    let cache_key = descriptor.cache_key()?;
    let store = ctx.project.store();
    let package = &descriptor.package;
    let store_path = store.artifact_path(&cache_key, &package.name, &package.version);
    let cached = store.contains(&cache_key, &package.name, &package.version);
    let index = index
        .names()
        .filter_map(|name| {
            index
                .defined_by(name)
                .map(|layer| (name.clone(), layer.to_string()))
        })
        .collect();

    Ok(Description {
        descriptor,
        cache_key,
        store_path,
        cached,
        index,
    })
}

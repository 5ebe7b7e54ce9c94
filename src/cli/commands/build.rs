//! Build command implementation
//!
//! Implements `hostpack build`: resolve inputs, compose the package index,
//! filter sources, then build, augment and publish unless the store already
//! holds the artifact.

use anyhow::{Context, Result};
use std::path::PathBuf;

use crate::cli::output::{
    create_spinner, is_json, print_detail, print_json, print_success,
};
use crate::cli::Invocation;
use crate::config::defaults;
use crate::core::context::{BuildContext, BuildOverrides, ProjectContext};
use crate::core::pipeline;
use crate::core::resolver::ResolveOptions;

/// Build options
#[derive(Debug, Default)]
#[allow(clippy::struct_excessive_bools)]
pub struct BuildOptions {
    /// Target triple override
    pub target: Option<String>,
    /// Number of parallel jobs
    pub jobs: Option<usize>,
    /// Forbid network access
    pub offline: bool,
    /// Force tests on
    pub run_tests: bool,
    /// Force tests off
    pub no_run_tests: bool,
    /// Out-link path
    pub out_link: Option<PathBuf>,
    /// Skip the out-link
    pub no_out_link: bool,
    /// Ignore the lock record
    pub refresh: bool,
}

impl BuildOptions {
    /// Command-line overrides of `[build]`
    pub fn overrides(&self) -> BuildOverrides {
        let run_tests = if self.run_tests {
            Some(true)
        } else if self.no_run_tests {
            Some(false)
        } else {
            None
        };
        BuildOverrides {
            target: self.target.clone(),
            run_tests,
            jobs: self.jobs,
            offline: self.offline.then_some(true),
        }
    }
}

/// Execute the build command
pub async fn execute(invocation: &Invocation, options: BuildOptions) -> Result<()> {
    let project_dir = &invocation.project_dir;
    let project = ProjectContext::load(project_dir, invocation.with_overrides(options.overrides()))
        .with_context(|| format!("Failed to load project at {}", project_dir.display()))?;

    let spinner = create_spinner("Resolving inputs...");
    let resolve = ResolveOptions {
        refresh_all: options.refresh,
        ..ResolveOptions::default()
    };
    let resolution = pipeline::resolve_inputs(&project, &resolve)
        .await
        .context("Failed to resolve inputs")?;

    let ctx = BuildContext::load(project).context("Failed to read the package manifest")?;

    spinner.set_message("Composing package index...");
    let index = pipeline::compose_index(&ctx.project, &resolution.inputs)
        .context("Failed to compose the package index")?;
    let sources = pipeline::select_sources(&ctx.project).context("Failed to select sources")?;
    let descriptor = pipeline::describe(&ctx, &index, &sources)?;

    spinner.set_message(format!("Building {}...", descriptor.package.name));
    let built = pipeline::build_artifact(&ctx, &descriptor, &sources);
    spinner.finish_and_clear();
    let mut report = built.with_context(|| format!("Failed to build {}", descriptor.package.name))?;

    if !options.no_out_link {
        let link = options
            .out_link
            .unwrap_or_else(|| project_dir.join(defaults::DEFAULT_OUT_LINK));
        pipeline::create_out_link(&mut report, &link)
            .with_context(|| format!("Failed to create out-link {}", link.display()))?;
    }

    if is_json() {
        return print_json(&report);
    }

    if report.cache_hit {
        print_success(&format!("Reused {}", report.store_path.display()));
    } else {
        print_success(&format!("Built {}", report.store_path.display()));
    }
    if let Some(link) = &report.out_link {
        print_detail(&format!("{} -> {}", link.display(), report.store_path.display()));
    }
    Ok(())
}

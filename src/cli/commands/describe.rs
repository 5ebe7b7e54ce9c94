//! CLI implementation for `hostpack describe`
//!
//! Evaluates every stage short of building and reports the descriptor,
//! its cache key and where the artifact lives.

use anyhow::{Context, Result};

use crate::cli::output::{is_json, print_detail, print_info, print_json};
use crate::cli::Invocation;
use crate::core::context::{BuildContext, ProjectContext};
use crate::core::pipeline;
use crate::core::resolver::ResolveOptions;

/// Execute the describe command
pub async fn execute(invocation: &Invocation) -> Result<()> {
    let project = ProjectContext::load(&invocation.project_dir, invocation.settings.clone())
        .context("Failed to load project")?;
    let resolution = pipeline::resolve_inputs(&project, &ResolveOptions::default())
        .await
        .context("Failed to resolve inputs")?;
    let ctx = BuildContext::load(project)?;
    let index = pipeline::compose_index(&ctx.project, &resolution.inputs)?;
    let sources = pipeline::select_sources(&ctx.project)?;
    let description = pipeline::description(&ctx, &index, &sources)?;

    if is_json() {
        return print_json(&description);
    }

    let descriptor = &description.descriptor;
    print_info(&format!(
        "{} {} ({})",
        descriptor.package.name, descriptor.package.version, descriptor.target
    ));
    print_detail(&format!("Cache key: {}", description.cache_key));
    print_detail(&format!(
        "Store path: {}{}",
        description.store_path.display(),
        if description.cached { " (built)" } else { "" }
    ));
    print_detail(&format!("Toolchain: {}", descriptor.toolchain.bin.display()));
    print_detail(&format!("Sources: {} files", descriptor.sources.len()));
    print_detail(&format!("Tests: {}", if descriptor.run_tests { "on" } else { "off" }));
    for dep in &descriptor.runtime {
        print_detail(&format!("Runtime: {} ({})", dep.name, dep.bin_dir.display()));
    }
    for (name, layer) in &description.index {
        print_detail(&format!("Index: {name} from {layer}"));
    }
    Ok(())
}

//! CLI implementation for `hostpack lock`

use anyhow::{bail, Context, Result};
use std::collections::BTreeMap;

use crate::cli::output::{create_spinner, is_json, print_detail, print_json, print_success};
use crate::cli::Invocation;
use crate::core::context::ProjectContext;
use crate::core::pipeline;
use crate::core::resolver::ResolveOptions;

/// Execute the lock command
pub async fn execute(invocation: &Invocation, refresh: bool, update: Vec<String>) -> Result<()> {
    let project = ProjectContext::load(&invocation.project_dir, invocation.settings.clone())
        .context("Failed to load project")?;

    for name in &update {
        if !project.config.inputs.contains_key(name) {
            bail!("Input '{name}' is not declared in hostpack.toml");
        }
    }

    let options = ResolveOptions {
        refresh_all: refresh,
        refresh: update.into_iter().collect(),
    };
    let spinner = create_spinner("Resolving inputs...");
    let resolved = pipeline::resolve_inputs(&project, &options).await;
    spinner.finish_and_clear();
    let resolution = resolved.context("Failed to resolve inputs")?;

    if is_json() {
        let inputs: BTreeMap<&String, serde_json::Value> = resolution
            .inputs
            .iter()
            .map(|(path, input)| {
                (
                    path,
                    serde_json::json!({ "rev": input.rev, "path": input.path }),
                )
            })
            .collect();
        return print_json(&serde_json::json!({
            "changed": resolution.changed,
            "inputs": inputs,
        }));
    }

    if resolution.changed {
        print_success(&format!("Updated {}", project.lock_path().display()));
    } else {
        print_success("Lock file is up to date");
    }
    for (path, input) in &resolution.inputs {
        print_detail(&format!("{path} {}", input.rev));
    }
    Ok(())
}

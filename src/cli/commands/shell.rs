//! CLI implementation for `hostpack shell`

use anyhow::{Context, Result};

use crate::cli::Invocation;
use crate::core::context::ProjectContext;
use crate::core::devshell::{self, DevShell};
use crate::core::pipeline;
use crate::core::resolver::ResolveOptions;

/// Execute the shell command
///
/// Exits with the shell's status when it is nonzero.
pub async fn execute(invocation: &Invocation, print: bool) -> Result<()> {
    let project = ProjectContext::load(&invocation.project_dir, invocation.settings.clone())
        .context("Failed to load project")?;
    let resolution = pipeline::resolve_inputs(&project, &ResolveOptions::default())
        .await
        .context("Failed to resolve inputs")?;
    let index = pipeline::compose_index(&project, &resolution.inputs)?;
    let shell = DevShell::compose(&index, &project.config.devshell.packages)?;

    let path = std::env::var_os("PATH");
    if print {
        println!("{}", shell.export_line(path.as_deref())?);
        return Ok(());
    }

    let program = devshell::user_shell();
    tracing::info!("Entering {}", program.display());
    let code = shell.spawn(&program, &project.project_dir)?;
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

//! Hostpack CLI - reproducible packaging for command-line tools
//!
//! Entry point for the hostpack command-line application.

use anyhow::Result;
use clap::Parser;

use hostpack::cli::output::{display_error, OutputConfig};
use hostpack::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let output_config = OutputConfig::new(cli.quiet, cli.json, cli.verbose);
    output_config.apply_global();

    tracing_subscriber::fmt()
        .with_env_filter(output_config.env_filter())
        .with_writer(std::io::stderr)
        .init();

    match cli.run().await {
        Ok(()) => Ok(()),
        Err(e) => {
            display_error(&e);
            std::process::exit(1);
        }
    }
}

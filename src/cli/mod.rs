//! Command-line interface module
//!
//! This module handles argument parsing and output formatting.
//! It contains no pipeline logic - that belongs in the [`crate::core`] module.

pub mod commands;
pub mod output;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use crate::core::context::{BuildOverrides, Settings};
use commands::Commands;

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("VERGEN_GIT_SHA"),
    " ",
    env!("VERGEN_CARGO_TARGET_TRIPLE"),
    ", built ",
    env!("VERGEN_BUILD_TIMESTAMP"),
    ")"
);

/// Hostpack - reproducible packaging for command-line tools
///
/// Pins inputs, builds a Rust program with a pinned toolchain, adds shell
/// completions and a runtime PATH wrapper, and publishes the result into a
/// content-addressed store.
#[derive(Parser, Debug)]
#[command(name = "hostpack")]
#[command(author, version, long_version = LONG_VERSION, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output in JSON format for scripting
    #[arg(long, global = true)]
    pub json: bool,

    /// Project directory
    #[arg(short = 'C', long, global = true, value_name = "DIR")]
    pub directory: Option<PathBuf>,

    /// Artifact store directory
    #[arg(long, global = true, env = "HOSTPACK_STORE", value_name = "DIR")]
    pub store: Option<PathBuf>,

    /// Cache directory for fetched inputs
    #[arg(long, global = true, env = "HOSTPACK_CACHE", value_name = "DIR")]
    pub cache: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Where a command runs and which store it uses
#[derive(Debug, Clone)]
pub struct Invocation {
    /// Project root
    pub project_dir: PathBuf,
    /// Store and cache settings
    pub settings: Settings,
}

impl Invocation {
    /// Settings with build overrides applied
    pub fn with_overrides(&self, overrides: BuildOverrides) -> Settings {
        Settings {
            overrides,
            ..self.settings.clone()
        }
    }
}

impl Cli {
    /// Execute the CLI command
    pub async fn run(self) -> Result<()> {
        let Some(command) = self.command else {
            use clap::CommandFactory;
            Self::command().print_help()?;
            return Ok(());
        };

        let project_dir = match self.directory {
            Some(dir) => dir,
            None => std::env::current_dir()?,
        };
        let invocation = Invocation {
            project_dir,
            settings: Settings {
                store_dir: self.store.unwrap_or_else(crate::config::default_store_dir),
                cache_dir: self
                    .cache
                    .unwrap_or_else(crate::config::default_source_cache_dir),
                overrides: BuildOverrides::default(),
            },
        };
        command.run(&invocation).await
    }
}

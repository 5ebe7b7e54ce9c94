//! CLI command implementations
//!
//! Each command is implemented in its own submodule.

pub mod build;
pub mod completions;
pub mod describe;
pub mod lock;
pub mod shell;

use anyhow::Result;
use clap::Subcommand;
use std::path::PathBuf;

use super::Invocation;

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build, augment and publish the project's binary
    Build {
        /// Target triple (defaults to [build] target, then the host)
        #[arg(long)]
        target: Option<String>,

        /// Number of parallel jobs
        #[arg(short, long)]
        jobs: Option<usize>,

        /// Forbid network access during the build
        #[arg(long)]
        offline: bool,

        /// Run the package's tests after building
        #[arg(long, conflicts_with = "no_run_tests")]
        run_tests: bool,

        /// Skip the package's tests even if hostpack.toml enables them
        #[arg(long)]
        no_run_tests: bool,

        /// Path of the symlink to the published artifact
        #[arg(short, long, value_name = "PATH", conflicts_with = "no_out_link")]
        out_link: Option<PathBuf>,

        /// Do not create an out-link
        #[arg(long)]
        no_out_link: bool,

        /// Re-resolve every input, ignoring hostpack.lock
        #[arg(long)]
        refresh: bool,
    },

    /// Resolve inputs and write hostpack.lock
    Lock {
        /// Re-resolve every input
        #[arg(long, conflicts_with = "update")]
        refresh: bool,

        /// Re-resolve only the named inputs
        #[arg(long, value_name = "NAME")]
        update: Vec<String>,
    },

    /// Show what a build would produce without building
    Describe,

    /// Enter a development shell with the project's packages on PATH
    Shell {
        /// Print an `export PATH=...` line instead of spawning a shell
        #[arg(long)]
        print: bool,
    },

    /// Generate shell completions for hostpack
    Completions {
        /// Target shell
        shell: clap_complete::Shell,
    },
}

impl Commands {
    /// Execute the command
    pub async fn run(self, invocation: &Invocation) -> Result<()> {
        match self {
            Self::Build {
                target,
                jobs,
                offline,
                run_tests,
                no_run_tests,
                out_link,
                no_out_link,
                refresh,
            } => {
                let options = build::BuildOptions {
                    target,
                    jobs,
                    offline,
                    run_tests,
                    no_run_tests,
                    out_link,
                    no_out_link,
                    refresh,
                };
                build::execute(invocation, options).await
            }
            Self::Lock { refresh, update } => lock::execute(invocation, refresh, update).await,
            Self::Describe => describe::execute(invocation).await,
            Self::Shell { print } => shell::execute(invocation, print).await,
            Self::Completions { shell } => {
                completions::execute(shell);
                Ok(())
            }
        }
    }
}

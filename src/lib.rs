//! Hostpack - reproducible packaging for command-line tools
//!
//! This library resolves pinned inputs, composes a layered package index,
//! builds a Rust program from a filtered source set with a pinned toolchain,
//! augments it with shell completions and a runtime `PATH` wrapper, and
//! publishes the result into a content-addressed store.
//!
//! # Architecture
//!
//! - [`cli`] - Command-line interface parsing and output formatting
//! - [`core`] - Pipeline stages
//! - [`infra`] - Infrastructure layer (git, filesystem, processes, store)
//! - [`config`] - Configuration and constants
//! - [`error`] - Error types and handling

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod infra;

#[cfg(test)]
pub mod test_utils;

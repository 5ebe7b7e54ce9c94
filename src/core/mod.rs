//! Pipeline logic
//!
//! # Submodules
//!
//! - [`inputs`] / [`resolver`] / [`lock`] - Input declarations, resolution and the lock record
//! - [`overlay`] / [`package_index`] / [`toolchain`] - Layered package index
//! - [`source_filter`] - Cleaned, allow-listed source sets
//! - [`manifest`] / [`dependencies`] - Cargo.toml and Cargo.lock of the packaged program
//! - [`descriptor`] - Build descriptor and cache key
//! - [`build_env`] / [`builder`] - Deterministic compilation
//! - [`augment`] - Completions, runtime wrapper and publication
//! - [`devshell`] - Development shell environment
//! - [`context`] / [`pipeline`] - Loaded project state and the stages tying it together

pub mod augment;
pub mod build_env;
pub mod builder;
pub mod context;
pub mod dependencies;
pub mod descriptor;
pub mod devshell;
pub mod inputs;
pub mod lock;
pub mod manifest;
pub mod overlay;
pub mod package_index;
pub mod pipeline;
pub mod project;
pub mod resolver;
pub mod source_filter;
pub mod toolchain;

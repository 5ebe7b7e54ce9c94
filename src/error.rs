//! Error types for hostpack
//!
//! Domain-specific error types using thiserror. Each pipeline stage has its
//! own enum; [`HostpackError`] aggregates them for callers that drive the
//! whole pipeline.

use std::path::PathBuf;
use thiserror::Error;

/// Project configuration errors (hostpack.toml, Cargo.toml)
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("Configuration not found at '{path}'. Create a hostpack.toml next to Cargo.toml.")]
    NotFound { path: PathBuf },

    /// Configuration file could not be parsed
    #[error("Failed to parse '{path}': {error}")]
    Parse { path: PathBuf, error: String },

    /// A field holds an invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidField { field: String, message: String },

    /// Package manifest is missing a required field
    #[error("Package manifest is missing required field '{field}'")]
    MissingField { field: String },
}

/// Input resolution errors
#[derive(Error, Debug)]
pub enum InputError {
    /// The locator could not be reached or fetched
    #[error("Unresolvable input '{name}': {reason}")]
    UnresolvableInput { name: String, reason: String },

    /// The follows graph between inputs has a cycle
    #[error("Input cycle detected: {}", cycle.join(" -> "))]
    InputCycle { cycle: Vec<String> },

    /// A follows alias names an input that is not declared at the top level
    #[error("Input '{input}' follows '{target}', which is not a top-level input")]
    FollowsTargetNotFound { input: String, target: String },

    /// Locator string has an unknown scheme or shape
    #[error("Invalid locator '{locator}' for input '{name}': {reason}")]
    InvalidLocator {
        name: String,
        locator: String,
        reason: String,
    },

    /// Nested inputs exceed the supported depth
    #[error("Input '{path}' is nested deeper than {max} levels")]
    TooDeep { path: String, max: usize },

    /// Lock file could not be read or written
    #[error("Lock file error for '{path}': {error}")]
    Lock { path: PathBuf, error: String },
}

/// Dependency graph errors
#[derive(Error, Debug)]
pub enum ResolverError {
    /// Circular dependency detected
    #[error("Circular dependency detected: {}", cycle.join(" -> "))]
    CircularDependency { cycle: Vec<String> },
}

/// Package index and overlay errors
#[derive(Error, Debug)]
pub enum OverlayError {
    /// Name not bound in the requested view
    #[error("Package '{name}' is not defined in the {view} index")]
    Undefined { name: String, view: String },

    /// A definition depends on itself through final
    #[error("Infinite recursion while evaluating '{name}'")]
    Recursion { name: String },

    /// A definition produced a value of the wrong shape
    #[error("Package '{name}' has an invalid definition: {message}")]
    InvalidDefinition { name: String, message: String },

    /// Index or overlay file could not be loaded
    #[error("Failed to load index file '{path}': {error}")]
    Load { path: PathBuf, error: String },
}

/// Build errors
#[derive(Error, Debug)]
pub enum BuildError {
    /// Lock file and manifest disagree
    #[error("Lock file does not match manifest: {message}")]
    LockMismatch { message: String },

    /// Toolchain binary not found in the composed index
    #[error("Toolchain not found: {toolchain}")]
    ToolchainNotFound { toolchain: String },

    /// The toolchain exited unsuccessfully
    #[error("Build failed for package '{package}': {error}")]
    BuildFailed { package: String, error: String },

    /// Tests ran and failed
    #[error("Tests failed for package '{package}': {error}")]
    TestsFailed { package: String, error: String },

    /// The expected binary was not produced
    #[error("Build of '{package}' did not produce '{path}'")]
    MissingArtifact { package: String, path: PathBuf },

    /// Source staging or hashing failed
    #[error("Failed to stage sources: {error}")]
    Staging { error: String },

    /// The descriptor has no canonical serialization
    #[error("Failed to serialize build descriptor: {error}")]
    Descriptor { error: String },
}

/// Post-build augmentation errors
#[derive(Error, Debug)]
pub enum AugmentError {
    /// Completion script generation failed for one shell
    #[error("Completion generation failed for {shell}: {error}")]
    CompletionGenerationFailed { shell: String, error: String },

    /// A runtime dependency is not present in the package index
    #[error("Runtime dependency '{name}' not found: {error}")]
    RuntimeDependencyNotFound { name: String, error: String },

    /// Wrapper could not be written
    #[error("Failed to wrap '{path}': {error}")]
    WrapFailed { path: PathBuf, error: String },

    /// Output could not be moved into the store
    #[error("Failed to publish '{path}': {error}")]
    PublishFailed { path: PathBuf, error: String },

    /// Runtime dependency directories cannot form a PATH value
    #[error("Invalid runtime PATH: {error}")]
    InvalidRuntimePath { error: String },
}

/// Development shell errors
#[derive(Error, Debug)]
pub enum DevShellError {
    /// A requested package is not in the index
    #[error("Development shell package '{name}' not found: {error}")]
    PackageNotFound { name: String, error: String },

    /// The shell could not be spawned
    #[error("Failed to launch shell '{shell}': {error}")]
    SpawnFailed { shell: String, error: String },

    /// Package directories cannot form a PATH value
    #[error("Invalid development shell PATH: {error}")]
    InvalidPath { error: String },
}

/// Filesystem errors
#[derive(Error, Debug)]
pub enum FilesystemError {
    /// Failed to create directory
    #[error("Failed to create directory '{path}': {error}")]
    CreateDir { path: PathBuf, error: String },

    /// Failed to remove directory
    #[error("Failed to remove directory '{path}': {error}")]
    RemoveDir { path: PathBuf, error: String },

    /// Failed to write file
    #[error("Failed to write file '{path}': {error}")]
    WriteFile { path: PathBuf, error: String },

    /// Failed to read file
    #[error("Failed to read file '{path}': {error}")]
    ReadFile { path: PathBuf, error: String },

    /// Failed to copy file
    #[error("Failed to copy '{from}' to '{to}': {error}")]
    Copy {
        from: PathBuf,
        to: PathBuf,
        error: String,
    },
}

/// Top-level hostpack error type
#[derive(Error, Debug)]
pub enum HostpackError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Input error
    #[error("Input error: {0}")]
    Input(#[from] InputError),

    /// Overlay error
    #[error("Index error: {0}")]
    Overlay(#[from] OverlayError),

    /// Build error
    #[error("Build error: {0}")]
    Build(#[from] BuildError),

    /// Augmentation error
    #[error("Augmentation error: {0}")]
    Augment(#[from] AugmentError),

    /// Development shell error
    #[error("Shell error: {0}")]
    DevShell(#[from] DevShellError),

    /// Filesystem error
    #[error("Filesystem error: {0}")]
    Filesystem(#[from] FilesystemError),
}

impl From<ResolverError> for InputError {
    fn from(err: ResolverError) -> Self {
        match err {
            ResolverError::CircularDependency { cycle } => InputError::InputCycle { cycle },
        }
    }
}

//! Default configuration values

/// Project configuration file name
pub const PROJECT_FILE: &str = "hostpack.toml";

/// Input lock file name
pub const LOCK_FILE: &str = "hostpack.lock";

/// Package manifest file name
pub const MANIFEST_FILE: &str = "Cargo.toml";

/// Dependency lock file name
pub const CARGO_LOCK_FILE: &str = "Cargo.lock";

/// Package index file shipped in an index input
pub const INDEX_FILE: &str = "index.toml";

/// Declarative overlay file shipped in an overlay input
pub const OVERLAY_FILE: &str = "overlay.toml";

/// Toolchain version manifests, in lookup order
pub const TOOLCHAIN_FILES: [&str; 2] = ["rust-toolchain.toml", "rust-toolchain"];

/// Default out-link created in the project directory
pub const DEFAULT_OUT_LINK: &str = "result";

/// Default source allow-list
pub const DEFAULT_INCLUDE: [&str; 4] = ["src", "build.rs", "Cargo.toml", "Cargo.lock"];

/// Directories never considered part of a source tree
pub const VCS_DIRS: [&str; 4] = [".git", ".hg", ".svn", ".jj"];

/// Build output directories excluded from the cleaned tree
pub const BUILD_DIRS: [&str; 1] = ["target"];

/// Maximum nesting depth for inputs declared by inputs
pub const MAX_INPUT_DEPTH: usize = 8;

/// Length of the hex cache key used in store paths
pub const CACHE_KEY_LEN: usize = 32;

/// Fixed timestamp handed to the toolchain (1980-01-01, the zip epoch)
pub const SOURCE_DATE_EPOCH: u64 = 315_532_800;

/// Prefix the staged source directory is remapped to in debug info
pub const REMAP_PREFIX: &str = "/build/source";

/// Shells completions are generated for
pub const COMPLETION_SHELLS: [&str; 3] = ["bash", "zsh", "fish"];

/// Fallback target triple when build metadata is unavailable
pub const FALLBACK_TARGET: &str = "x86_64-unknown-linux-gnu";

//! Configuration constants and default locations

pub mod defaults;

use std::path::PathBuf;

/// Host target triple this binary was built for
pub fn host_target() -> &'static str {
    option_env!("VERGEN_CARGO_TARGET_TRIPLE").unwrap_or(defaults::FALLBACK_TARGET)
}

/// Default store directory for published artifacts
pub fn default_store_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".cache"))
        .join("hostpack")
        .join("store")
}

/// Default cache directory for fetched input trees
pub fn default_source_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".cache"))
        .join("hostpack")
        .join("sources")
}

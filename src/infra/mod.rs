//! Infrastructure layer
//!
//! Handles I/O that is not specific to one pipeline stage: git fetches,
//! hashing, filesystem helpers, child processes and the artifact store.

pub mod filesystem;
pub mod git;
pub mod hash;
pub mod process;
pub mod store;

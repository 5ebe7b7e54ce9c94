//! Test utilities for property-based testing
//!
//! This module provides generators and helpers for proptest.

#[cfg(test)]
pub mod generators {
    use proptest::prelude::*;

    /// Generate a valid input or package name (lowercase alphanumeric with hyphens)
    pub fn package_name() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9-]{0,30}[a-z0-9]?".prop_filter("Name must not be empty", |s| !s.is_empty())
    }

    /// Generate a valid semver version string
    pub fn semver_version() -> impl Strategy<Value = String> {
        (1u32..100, 0u32..100, 0u32..100)
            .prop_map(|(major, minor, patch)| format!("{major}.{minor}.{patch}"))
    }

    /// Generate a valid SHA256 hash (64 hex characters)
    pub fn sha256_hash() -> impl Strategy<Value = String> {
        "[0-9a-f]{64}"
    }

    /// Generate a git commit id (40 hex characters)
    pub fn commit_id() -> impl Strategy<Value = String> {
        "[0-9a-f]{40}"
    }

    /// Generate a `/`-separated relative file path, one to three components deep
    pub fn relative_path() -> impl Strategy<Value = String> {
        proptest::collection::vec("[a-c][a-c0-9_]{0,3}(\\.rs|\\.md)?", 1..4)
            .prop_map(|parts| parts.join("/"))
    }

    /// Generate an allow-list glob over the same alphabet as [`relative_path`]
    pub fn path_glob() -> impl Strategy<Value = String> {
        prop_oneof![
            "[a-c][a-c0-9_]{0,3}",
            "[a-c]/[a-c][a-c0-9_]{0,3}",
            Just("*.rs".to_string()),
            Just("a/**/*.md".to_string()),
            Just("**/b*".to_string()),
        ]
    }

    /// Generate a valid target triple
    pub fn target_triple() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("x86_64-unknown-linux-gnu".to_string()),
            Just("aarch64-unknown-linux-gnu".to_string()),
            Just("x86_64-unknown-linux-musl".to_string()),
            Just("aarch64-apple-darwin".to_string()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::generators::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn test_package_name_generator(name in package_name()) {
            prop_assert!(!name.is_empty());
            prop_assert!(name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
        }

        #[test]
        fn test_semver_version_generator(version in semver_version()) {
            prop_assert!(semver::Version::parse(&version).is_ok());
        }

        #[test]
        fn test_commit_id_generator(rev in commit_id()) {
            prop_assert!(crate::infra::git::GitRef::is_commit_id(&rev));
        }

        #[test]
        fn test_relative_path_generator(path in relative_path()) {
            prop_assert!(!path.starts_with('/'));
            prop_assert!(path.split('/').all(|c| !c.is_empty()));
        }
    }
}

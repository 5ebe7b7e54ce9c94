//! Common test utilities and helpers
//!
//! A [`TestProject`] is a temporary tree with a packaged program under
//! `project/`, a path input `pkgs/` carrying the package index and a stub
//! `cargo`, and private `store/` and `cache/` directories.

#![allow(dead_code)]

use assert_fs::TempDir;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

/// Stub `cargo`: `build` copies `src/main.sh` to the release artifact path
pub const STUB_CARGO: &str = r#"#!/bin/sh
cmd="$1"; shift
target=""
while [ $# -gt 0 ]; do
  case "$1" in
    --target) target="$2"; shift 2 ;;
    *) shift ;;
  esac
done
case "$cmd" in
  build)
    [ -f src/fail-build ] && { echo "error: could not compile" >&2; exit 101; }
    mkdir -p "$CARGO_TARGET_DIR/$target/release"
    cp src/main.sh "$CARGO_TARGET_DIR/$target/release/tool"
    chmod +x "$CARGO_TARGET_DIR/$target/release/tool"
    ;;
  test)
    [ -f src/fail-tests ] && { echo "test result: FAILED" >&2; exit 101; }
    ;;
esac
"#;

/// The packaged program
pub const TOOL_SCRIPT: &str = r##"#!/bin/sh
case "$1" in
  completions)
    case "$2" in
      bash|zsh|fish) echo "# $2 completions for tool" ;;
      *) echo "unknown shell: $2" >&2; exit 2 ;;
    esac
    ;;
  which-foo) foo ;;
  exit) exit "$2" ;;
  args) shift; for arg in "$@"; do echo "[$arg]"; done ;;
  *) echo tool ;;
esac
"##;

/// The packaged program, unable to generate fish completions
pub const TOOL_SCRIPT_NO_FISH: &str = r##"#!/bin/sh
case "$1" in
  completions)
    case "$2" in
      bash|zsh) echo "# $2 completions for tool" ;;
      *) echo "unsupported shell: $2" >&2; exit 1 ;;
    esac
    ;;
  *) echo tool ;;
esac
"##;

/// hostpack.toml using `pkgs` as the base index
pub const PROJECT_CONFIG: &str = r#"
[inputs]
pkgs = "path:../pkgs"

[index]
base = "pkgs"
"#;

/// Cargo.toml of the packaged program
pub const CARGO_MANIFEST: &str = r#"
[package]
name = "tool"
version = "0.1.0"
description = "A packaged tool"
license = "MIT"
"#;

/// Cargo.lock matching [`CARGO_MANIFEST`]
pub const CARGO_LOCK: &str = r#"
version = 3

[[package]]
name = "tool"
version = "0.1.0"
"#;

/// index.toml of the `pkgs` input
pub const INDEX: &str = r#"
[packages.cargo]
bin = "toolchain/bin"
version = "1.80.0"

[packages.foo]
bin = "foo/bin"
"#;

/// Test project context
pub struct TestProject {
    /// Temporary root of the fixture
    pub dir: TempDir,
}

impl TestProject {
    /// Create a buildable project with the default fixture files
    pub fn new() -> Self {
        let project = Self {
            dir: TempDir::new().expect("Failed to create temp directory"),
        };
        project.create_file("project/hostpack.toml", PROJECT_CONFIG);
        project.create_file("project/Cargo.toml", CARGO_MANIFEST);
        project.create_file("project/Cargo.lock", CARGO_LOCK);
        project.create_file("project/src/main.sh", TOOL_SCRIPT);
        project.create_file("pkgs/index.toml", INDEX);
        project.create_executable("pkgs/toolchain/bin/cargo", STUB_CARGO);
        project.create_executable("pkgs/foo/bin/foo", "#!/bin/sh\necho runtime-foo\n");
        project
    }

    /// Fixture root
    pub fn root(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }

    /// Directory containing hostpack.toml
    pub fn project_dir(&self) -> PathBuf {
        self.dir.path().join("project")
    }

    /// Default artifact store
    pub fn store_dir(&self) -> PathBuf {
        self.dir.path().join("store")
    }

    /// Create a file relative to the fixture root
    pub fn create_file(&self, name: &str, content: &str) {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent directories");
        }
        std::fs::write(path, content).expect("Failed to write file");
    }

    /// Create an executable script relative to the fixture root
    pub fn create_executable(&self, name: &str, content: &str) {
        self.create_file(name, content);
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let path = self.dir.path().join(name);
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
                .expect("Failed to set permissions");
        }
    }

    /// Read a file relative to the fixture root
    pub fn read_file(&self, name: &str) -> String {
        std::fs::read_to_string(self.dir.path().join(name)).expect("Failed to read file")
    }

    /// Run hostpack in the project directory with the default store
    pub fn run(&self, args: &[&str]) -> Output {
        self.run_with_store(&self.store_dir(), args)
    }

    /// Run hostpack in the project directory with `store`
    pub fn run_with_store(&self, store: &Path, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_hostpack"))
            .current_dir(self.project_dir())
            .env("HOSTPACK_STORE", store)
            .env("HOSTPACK_CACHE", self.dir.path().join("cache"))
            .env_remove("RUST_LOG")
            .args(args)
            .output()
            .expect("Failed to execute hostpack")
    }

    /// Run `hostpack build --json` and parse the report
    pub fn build_json(&self, args: &[&str]) -> serde_json::Value {
        let mut full = vec!["build", "--json"];
        full.extend_from_slice(args);
        let output = self.run(&full);
        assert_success(&output);
        serde_json::from_slice(&output.stdout).expect("build report is JSON")
    }
}

impl Default for TestProject {
    fn default() -> Self {
        Self::new()
    }
}

/// Assert a command succeeded, showing its stderr otherwise
pub fn assert_success(output: &Output) {
    assert!(
        output.status.success(),
        "command failed with {}: {}",
        output.status,
        String::from_utf8_lossy(&output.stderr)
    );
}

/// Published artifacts in `store`, ignoring work and staging directories
pub fn published(store: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(store) else {
        return Vec::new();
    };
    let mut paths: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .filter(|e| !e.file_name().to_string_lossy().starts_with('.'))
        .map(|e| e.path())
        .collect();
    paths.sort();
    paths
}

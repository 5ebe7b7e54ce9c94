//! Post-build augmentation
//!
//! Turns a compiled binary into a publishable artifact:
//!
//! ```text
//! <store path>/
//!   bin/<name>                 wrapper prepending runtime dependencies to PATH
//!   bin/.<name>-wrapped        the compiled binary
//!   share/bash-completion/completions/<name>.bash
//!   share/zsh/site-functions/_<name>
//!   share/fish/vendor_completions.d/<name>.fish
//!   metadata.json
//! ```
//!
//! Completion scripts for all three shells are generated before anything is
//! staged; if any shell fails the whole step fails. The artifact is then
//! assembled in a staging directory and published with a single rename.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};

use crate::core::builder::BuildOutput;
use crate::core::descriptor::BuildDescriptor;
use crate::core::manifest::Maintainer;
use crate::core::overlay::PackageIndex;
use crate::core::package_index;
use crate::error::{AugmentError, FilesystemError};
use crate::infra::store::Store;
use crate::infra::{filesystem, process};

/// A package whose executables the wrapped binary may call
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RuntimeDependency {
    /// Package name in the index
    pub name: String,
    /// Directory prepended to PATH
    pub bin_dir: PathBuf,
}

/// Resolve runtime dependency names against the composed index, in order
pub fn resolve_runtime(
    index: &PackageIndex,
    names: &[String],
) -> Result<Vec<RuntimeDependency>, AugmentError> {
    names
        .iter()
        .map(|name| {
            let info = package_index::package(index, name).map_err(|e| {
                AugmentError::RuntimeDependencyNotFound {
                    name: name.clone(),
                    error: e.to_string(),
                }
            })?;
            Ok(RuntimeDependency {
                name: name.clone(),
                bin_dir: info.bin,
            })
        })
        .collect()
}

/// Shells completions are generated for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletionShell {
    /// GNU Bash
    Bash,
    /// Z shell
    Zsh,
    /// fish
    Fish,
}

impl CompletionShell {
    /// Every supported shell
    pub const ALL: [Self; 3] = [Self::Bash, Self::Zsh, Self::Fish];

    /// Argument passed to `<binary> completions`
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bash => "bash",
            Self::Zsh => "zsh",
            Self::Fish => "fish",
        }
    }

    /// Install location relative to the artifact root
    pub fn install_path(self, name: &str) -> PathBuf {
        match self {
            Self::Bash => PathBuf::from(format!("share/bash-completion/completions/{name}.bash")),
            Self::Zsh => PathBuf::from(format!("share/zsh/site-functions/_{name}")),
            Self::Fish => PathBuf::from(format!("share/fish/vendor_completions.d/{name}.fish")),
        }
    }
}

impl std::fmt::Display for CompletionShell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A generated completion script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionArtifact {
    /// Shell the script is for
    pub shell: CompletionShell,
    /// Script exactly as the binary printed it
    pub script: Vec<u8>,
}

/// Run `<binary> completions <shell>` for every shell
///
/// Fails on the first shell that cannot be generated; nothing is returned
/// for the others.
pub fn generate_completions(
    binary: &Path,
    runtime: &[RuntimeDependency],
) -> Result<Vec<CompletionArtifact>, AugmentError> {
    let path = runtime_path(runtime)?;
    CompletionShell::ALL
        .iter()
        .map(|&shell| {
            debug!("Generating {shell} completions");
            let mut command = Command::new(binary);
            command.args(["completions", shell.as_str()]).env("PATH", &path);
            let output = process::run_captured(&mut command).map_err(|error| {
                AugmentError::CompletionGenerationFailed {
                    shell: shell.to_string(),
                    error,
                }
            })?;
            Ok(CompletionArtifact {
                shell,
                script: output.stdout,
            })
        })
        .collect()
}

fn runtime_path(runtime: &[RuntimeDependency]) -> Result<std::ffi::OsString, AugmentError> {
    let dirs: Vec<&Path> = runtime.iter().map(|d| d.bin_dir.as_path()).collect();
    process::prepend_path(&dirs, std::env::var_os("PATH").as_deref()).map_err(|e| {
        AugmentError::InvalidRuntimePath {
            error: e.to_string(),
        }
    })
}

/// Quote a string for a POSIX shell
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Name of the moved binary next to the wrapper
pub fn wrapped_name(name: &str) -> String {
    format!(".{name}-wrapped")
}

/// Locates the script itself: a slashless `$0` is taken from the working
/// directory or PATH, then symlinks are followed to the published file
const RESOLVE_SELF: &str = r#"self="$0"
case "$self" in
  */*) ;;
  *) if [ -e "$self" ]; then self="./$self"; else self=$(command -v "$self") || exit 127; fi ;;
esac
while [ -h "$self" ]; do
  link=$(readlink "$self") || exit 127
  case "$link" in /*) self="$link" ;; *) self="${self%/*}/$link" ;; esac
done
"#;

/// Wrapper script that prepends runtime dependencies and execs the binary
///
/// The binary is found next to the resolved script, so the artifact stays
/// valid wherever it is published and however it is invoked.
pub fn wrapper_script(name: &str, runtime: &[RuntimeDependency]) -> String {
    let mut script = String::from("#!/bin/sh\n");
    script.push_str(RESOLVE_SELF);
    if !runtime.is_empty() {
        let dirs: Vec<String> = runtime
            .iter()
            .map(|d| shell_quote(&d.bin_dir.to_string_lossy()))
            .collect();
        script.push_str(&format!("PATH={}${{PATH:+:$PATH}}\n", dirs.join(":")));
        script.push_str("export PATH\n");
    }
    script.push_str(&format!(
        "exec \"${{self%/*}}/{}\" \"$@\"\n",
        wrapped_name(name)
    ));
    script
}

/// Contents of metadata.json
#[derive(Debug, Serialize)]
struct ArtifactMetadata<'a> {
    name: &'a str,
    version: &'a str,
    binary: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    homepage: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    repository: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    license: Option<&'a str>,
    maintainers: &'a [Maintainer],
    target: &'a str,
    cache_key: &'a str,
    runtime_dependencies: Vec<&'a str>,
    completions: Vec<String>,
}

/// Assembles and publishes artifacts
#[derive(Debug, Clone)]
pub struct Augmenter {
    store: Store,
}

impl Augmenter {
    /// Create an augmenter publishing into `store`
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Generate completions, wrap, and publish; returns the store path
    pub fn publish(
        &self,
        build: &BuildOutput,
        descriptor: &BuildDescriptor,
    ) -> Result<PathBuf, AugmentError> {
        let name = &descriptor.binary;
        let key = build.key.as_str();

        let completions = generate_completions(&build.binary, &descriptor.runtime)?;
        info!("Generated completions for {} shells", completions.len());

        let staging = self
            .store
            .staging_dir(key)
            .map_err(|e| publish_err(self.store.root(), &e))?;
        let root = staging.path();

        let bin = root.join("bin");
        let wrapped = bin.join(wrapped_name(name));
        let wrap_err = |e: FilesystemError| AugmentError::WrapFailed {
            path: wrapped.clone(),
            error: e.to_string(),
        };
        filesystem::copy_file(&build.binary, &wrapped).map_err(wrap_err)?;
        filesystem::set_executable(&wrapped).map_err(wrap_err)?;

        let wrapper = bin.join(name);
        filesystem::write_file(&wrapper, wrapper_script(name, &descriptor.runtime))
            .map_err(wrap_err)?;
        filesystem::set_executable(&wrapper).map_err(wrap_err)?;

        let mut installed = Vec::new();
        for completion in &completions {
            let rel = completion.shell.install_path(name);
            filesystem::write_file(&root.join(&rel), &completion.script)
                .map_err(|e| publish_err(root, &e))?;
            installed.push(rel.to_string_lossy().replace('\\', "/"));
        }

        let package = &descriptor.package;
        let metadata = ArtifactMetadata {
            name: &package.name,
            version: &package.version,
            binary: name,
            description: package.description.as_deref(),
            homepage: package.homepage.as_deref(),
            repository: package.repository.as_deref(),
            license: package.license.as_deref(),
            maintainers: &package.maintainers,
            target: &descriptor.target,
            cache_key: key,
            runtime_dependencies: descriptor.runtime.iter().map(|d| d.name.as_str()).collect(),
            completions: installed,
        };
        let json = serde_json::to_vec_pretty(&metadata).map_err(|e| AugmentError::PublishFailed {
            path: root.to_path_buf(),
            error: e.to_string(),
        })?;
        filesystem::write_file(&root.join("metadata.json"), json)
            .map_err(|e| publish_err(root, &e))?;

        let published = self
            .store
            .publish(staging, key, &package.name, &package.version)
            .map_err(|e| publish_err(self.store.root(), &e))?;
        info!("Published {}", published.display());
        Ok(published)
    }
}

fn publish_err(path: &Path, e: &FilesystemError) -> AugmentError {
    AugmentError::PublishFailed {
        path: path.to_path_buf(),
        error: e.to_string(),
    }
}

//! Input resolution
//!
//! Resolves declared inputs to exact revisions and immutable source trees.
//!
//! 1. Build the follows graph between top-level inputs and reject unknown
//!    targets and cycles before anything is fetched.
//! 2. Resolve every top-level input concurrently. A locked revision is
//!    reused unless the input is refreshed; updates to the shared lock record
//!    are serialized through one mutex.
//! 3. Walk the inputs each fetched tree declares in its own hostpack.toml.
//!    Sub-inputs named in the parent's `follows` map share the top-level
//!    [`ResolvedInput`]; the rest are resolved like any other input.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::defaults;
use crate::core::inputs::{InputSpec, Locator, ResolvedInput, ResolvedInputs};
use crate::core::lock::{LockFile, LockedInput};
use crate::core::project::ProjectConfig;
use crate::error::{InputError, ResolverError};
use crate::infra::git::{GitOperations, GitRef};
use crate::infra::hash;

/// Dependency graph between inputs
#[derive(Debug, Default)]
pub struct DependencyGraph {
    /// Adjacency list: input -> inputs it depends on
    edges: BTreeMap<String, Vec<String>>,
    /// All known inputs
    nodes: BTreeSet<String>,
}

impl DependencyGraph {
    /// Create a new empty dependency graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an input to the graph
    pub fn add_node(&mut self, name: &str, dependencies: Vec<String>) {
        self.nodes.insert(name.to_string());
        for dep in &dependencies {
            self.nodes.insert(dep.clone());
        }
        self.edges.insert(name.to_string(), dependencies);
    }

    /// Compute topological sort
    ///
    /// Returns inputs in order such that dependencies come before dependents.
    pub fn topological_sort(&self) -> Result<Vec<String>, ResolverError> {
        let mut visited = BTreeSet::new();
        let mut temp_visited = BTreeSet::new();
        let mut result = Vec::new();
        let mut path = Vec::new();

        for node in &self.nodes {
            if !visited.contains(node) {
                self.visit(node, &mut visited, &mut temp_visited, &mut result, &mut path)?;
            }
        }

        Ok(result)
    }

    fn visit(
        &self,
        node: &str,
        visited: &mut BTreeSet<String>,
        temp_visited: &mut BTreeSet<String>,
        result: &mut Vec<String>,
        path: &mut Vec<String>,
    ) -> Result<(), ResolverError> {
        if temp_visited.contains(node) {
            // Report only the cycle itself, not the walk that led to it
            let start = path.iter().position(|n| n == node).unwrap_or(0);
            let mut cycle = path[start..].to_vec();
            cycle.push(node.to_string());
            return Err(ResolverError::CircularDependency { cycle });
        }

        if visited.contains(node) {
            return Ok(());
        }

        temp_visited.insert(node.to_string());
        path.push(node.to_string());

        if let Some(deps) = self.edges.get(node) {
            for dep in deps {
                self.visit(dep, visited, temp_visited, result, path)?;
            }
        }

        path.pop();
        temp_visited.remove(node);
        visited.insert(node.to_string());
        result.push(node.to_string());

        Ok(())
    }
}

/// Check follows targets and cycles; returns a dependency-first order
pub fn validate_follows(specs: &[InputSpec]) -> Result<Vec<String>, InputError> {
    let names: BTreeSet<&str> = specs.iter().map(|s| s.name.as_str()).collect();
    let mut graph = DependencyGraph::new();

    for spec in specs {
        let mut targets = Vec::new();
        for target in spec.follows.values() {
            if !names.contains(target.as_str()) {
                return Err(InputError::FollowsTargetNotFound {
                    input: spec.name.clone(),
                    target: target.clone(),
                });
            }
            if !targets.contains(target) {
                targets.push(target.clone());
            }
        }
        graph.add_node(&spec.name, targets);
    }

    Ok(graph.topological_sort()?)
}

/// Which inputs bypass the lock
#[derive(Debug, Clone, Default)]
pub struct ResolveOptions {
    /// Re-resolve every input
    pub refresh_all: bool,
    /// Re-resolve only these input paths
    pub refresh: BTreeSet<String>,
}

impl ResolveOptions {
    /// Whether `path` (or the top-level input it belongs to) is refreshed
    pub fn is_refreshed(&self, path: &str) -> bool {
        let top = path.split('/').next().unwrap_or(path);
        self.refresh_all || self.refresh.contains(path) || self.refresh.contains(top)
    }
}

/// Result of input resolution
#[derive(Debug)]
pub struct Resolution {
    /// Resolved inputs keyed by path
    pub inputs: ResolvedInputs,
    /// Updated lock record
    pub lock: LockFile,
    /// Whether the lock record differs from the one passed in
    pub changed: bool,
}

/// Resolves input specs against a lock record
#[derive(Debug, Clone)]
pub struct InputResolver {
    /// Directory relative `path:` locators are resolved against
    project_dir: PathBuf,
    /// Content-addressed cache of fetched trees
    cache_dir: PathBuf,
}

/// A fetched input plus the inputs its tree declares
struct Fetched {
    path: String,
    input: ResolvedInput,
    nested: Vec<InputSpec>,
}

impl InputResolver {
    /// Create a resolver
    pub fn new(project_dir: PathBuf, cache_dir: PathBuf) -> Self {
        Self {
            project_dir,
            cache_dir,
        }
    }

    /// Resolve `specs`, reusing revisions recorded in `lock`
    pub async fn resolve(
        &self,
        specs: &[InputSpec],
        lock: &LockFile,
        options: &ResolveOptions,
    ) -> Result<Resolution, InputError> {
        let order = validate_follows(specs)?;
        debug!("Input resolution order: {}", order.join(", "));

        // Reject malformed locators before fetching anything
        for spec in specs {
            spec.parsed_locator()?;
        }

        let shared_lock = Arc::new(Mutex::new(lock.clone()));
        let mut join_set = JoinSet::new();

        for spec in specs {
            let resolver = self.clone();
            let spec = spec.clone();
            let shared_lock = Arc::clone(&shared_lock);
            let refresh = options.is_refreshed(&spec.name);
            join_set.spawn(async move {
                let base = resolver.project_dir.clone();
                resolver
                    .fetch_input(spec.name.clone(), spec, base, shared_lock, refresh)
                    .await
            });
        }

        let mut top_level: BTreeMap<String, Fetched> = BTreeMap::new();
        while let Some(joined) = join_set.join_next().await {
            let fetched = joined.map_err(|e| InputError::UnresolvableInput {
                name: "<task>".to_string(),
                reason: e.to_string(),
            })??;
            top_level.insert(fetched.path.clone(), fetched);
        }

        let mut inputs: ResolvedInputs = top_level
            .iter()
            .map(|(path, f)| (path.clone(), Arc::new(f.input.clone())))
            .collect();

        // Sub-inputs: aliases share the top-level Arc, others are resolved in turn
        let mut queue: VecDeque<(String, PathBuf, Vec<InputSpec>, BTreeMap<String, String>, usize)> =
            VecDeque::new();
        for spec in specs {
            if let Some(fetched) = top_level.get(&spec.name) {
                queue.push_back((
                    spec.name.clone(),
                    fetched.input.path.clone(),
                    fetched.nested.clone(),
                    spec.follows.clone(),
                    1,
                ));
            }
        }

        while let Some((parent, parent_tree, nested, follows, depth)) = queue.pop_front() {
            for (sub, target) in &follows {
                if !nested.iter().any(|n| &n.name == sub) {
                    warn!("Input '{parent}' has no sub-input '{sub}' to follow '{target}'");
                }
            }

            for child in nested {
                let path = format!("{parent}/{}", child.name);

                if let Some(target) = follows.get(&child.name) {
                    debug!("{path} follows {target}");
                    let shared = Arc::clone(&inputs[target]);
                    inputs.insert(path, shared);
                    continue;
                }

                if depth >= defaults::MAX_INPUT_DEPTH {
                    return Err(InputError::TooDeep {
                        path,
                        max: defaults::MAX_INPUT_DEPTH,
                    });
                }
                if !child.follows.is_empty() {
                    debug!("Ignoring follows declared by nested input {path}");
                }

                let refresh = options.is_refreshed(&path);
                let fetched = self
                    .fetch_input(
                        path.clone(),
                        child,
                        parent_tree.clone(),
                        Arc::clone(&shared_lock),
                        refresh,
                    )
                    .await?;
                queue.push_back((
                    path.clone(),
                    fetched.input.path.clone(),
                    fetched.nested,
                    BTreeMap::new(),
                    depth + 1,
                ));
                inputs.insert(path, Arc::new(fetched.input));
            }
        }

        let mut new_lock = shared_lock.lock().await.clone();
        // Followed sub-inputs are not pinned separately
        let pinned: Vec<String> = inputs
            .iter()
            .filter(|(path, input)| !path.contains('/') || !inputs_alias(&inputs, path, input))
            .map(|(path, _)| path.clone())
            .collect();
        new_lock.retain_paths(&pinned);

        let changed = &new_lock != lock;
        if changed {
            info!("Lock record updated ({} inputs)", new_lock.inputs.len());
        }

        Ok(Resolution {
            inputs,
            lock: new_lock,
            changed,
        })
    }

    /// Resolve one input and read the inputs its tree declares
    async fn fetch_input(
        &self,
        path: String,
        spec: InputSpec,
        base_dir: PathBuf,
        lock: Arc<Mutex<LockFile>>,
        refresh: bool,
    ) -> Result<Fetched, InputError> {
        let locator = spec.parsed_locator()?;
        let override_rev = spec.revision_override.as_deref();

        let known_rev = if refresh {
            None
        } else {
            lock.lock()
                .await
                .reusable_rev(&path, &spec.locator, override_rev)
                .map(String::from)
        };

        let unresolvable = |reason: String| InputError::UnresolvableInput {
            name: path.clone(),
            reason,
        };

        let (rev, tree) = match &locator {
            Locator::Path(dir) => {
                let dir = Locator::resolve_path(dir, &base_dir);
                let (rev, tree) = tokio::task::spawn_blocking(move || resolve_path_input(&dir))
                    .await
                    .map_err(|e| unresolvable(e.to_string()))?
                    .map_err(unresolvable)?;
                if let Some(known) = &known_rev {
                    if known != &rev {
                        warn!("Contents of '{path}' changed since they were locked");
                    }
                }
                (rev, tree)
            }
            Locator::Git { url, .. } => {
                let git_ref = match &known_rev {
                    Some(rev) => GitRef::Rev(rev.clone()),
                    None => locator.git_ref(override_rev),
                };
                info!("Resolving {path} ({git_ref})");
                let cache_dir = self.cache_dir.clone();
                let url = url.clone();
                tokio::task::spawn_blocking(move || fetch_git_input(&cache_dir, &url, &git_ref))
                    .await
                    .map_err(|e| unresolvable(e.to_string()))?
                    .map_err(unresolvable)?
            }
        };

        lock.lock().await.insert(
            path.clone(),
            LockedInput::new(&spec.locator, &rev, override_rev),
        );
        debug!("Resolved {path} to {rev}");

        let nested = ProjectConfig::load_optional(&tree.join(defaults::PROJECT_FILE))
            .map_err(|e| unresolvable(e.to_string()))?
            .map(|config| config.input_specs())
            .unwrap_or_default();

        let name = path.rsplit('/').next().unwrap_or(&path).to_string();
        Ok(Fetched {
            path,
            input: ResolvedInput { name, rev, path: tree },
            nested,
        })
    }
}

/// Whether a nested entry is an alias of some top-level input
fn inputs_alias(inputs: &ResolvedInputs, path: &str, input: &Arc<ResolvedInput>) -> bool {
    inputs
        .iter()
        .any(|(other, shared)| other != path && !other.contains('/') && Arc::ptr_eq(shared, input))
}

/// Revision of a local directory is the hash of its contents
fn resolve_path_input(dir: &Path) -> Result<(String, PathBuf), String> {
    if !dir.is_dir() {
        return Err(format!("directory '{}' does not exist", dir.display()));
    }
    let tree = dir
        .canonicalize()
        .map_err(|e| format!("cannot canonicalize '{}': {e}", dir.display()))?;
    let digest = hash::hash_directory(&tree, &defaults::VCS_DIRS).map_err(|e| e.to_string())?;
    Ok((format!("sha256:{digest}"), tree))
}

/// Fetch a git input into `<cache>/<url-hash>/<rev>`, reusing a cached tree
fn fetch_git_input(cache_dir: &Path, url: &str, git_ref: &GitRef) -> Result<(String, PathBuf), String> {
    let repo_dir = cache_dir.join(&hash::hash_bytes(url.as_bytes())[..16]);

    if let GitRef::Rev(rev) = git_ref {
        let cached = repo_dir.join(rev);
        if cached.is_dir() {
            debug!("Using cached tree {}", cached.display());
            return Ok((rev.clone(), cached));
        }
    }

    std::fs::create_dir_all(&repo_dir).map_err(|e| e.to_string())?;
    let incoming = tempfile::Builder::new()
        .prefix(".incoming-")
        .tempdir_in(&repo_dir)
        .map_err(|e| e.to_string())?;
    let staged = incoming.path().join("tree");

    let ops = GitOperations::new(incoming.path().join("clone"));
    let rev = ops.fetch_tree(url, git_ref, &staged).map_err(|e| e.to_string())?;

    let final_dir = repo_dir.join(&rev);
    if !final_dir.exists() {
        // Another resolution may publish the same revision concurrently
        if let Err(e) = std::fs::rename(&staged, &final_dir) {
            if !final_dir.is_dir() {
                return Err(e.to_string());
            }
        }
    }

    Ok((rev, final_dir))
}

//! Overlay composition
//!
//! A [`PackageIndex`] is a layered registry. Layer 0 holds the base index
//! and overlay *i* contributes layer *i + 1*. Every binding remembers the
//! layer that defined it, and a lookup always returns the binding with the
//! highest layer, so the last overlay to define a name wins.
//!
//! Definitions are evaluated lazily with two views of the index:
//!
//! - `final` sees every layer, so a definition may refer to names that only
//!   later overlays provide;
//! - `prev` sees only the layers below the definition's own, which is how a
//!   definition wraps the stock value it shadows.
//!
//! Each `(name, layer)` pair is evaluated at most once per index.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use crate::error::OverlayError;

/// Values stored in the index
pub type Value = toml::Value;

/// Lazy definition: `(final, prev) -> value`
pub type Definition =
    Arc<dyn Fn(&View<'_>, &View<'_>) -> Result<Value, OverlayError> + Send + Sync>;

/// An ordered patch of definitions
#[derive(Clone)]
pub struct Overlay {
    /// Name used in logs and precedence reports
    pub name: String,
    entries: BTreeMap<String, Definition>,
}

impl std::fmt::Debug for Overlay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Overlay")
            .field("name", &self.name)
            .field("entries", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Overlay {
    /// Create an empty overlay
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: BTreeMap::new(),
        }
    }

    /// Bind `name` to a constant value
    #[must_use]
    pub fn set(self, name: impl Into<String>, value: Value) -> Self {
        self.define(name, move |_, _| Ok(value.clone()))
    }

    /// Bind `name` to a lazy definition
    #[must_use]
    pub fn define<F>(mut self, name: impl Into<String>, definition: F) -> Self
    where
        F: Fn(&View<'_>, &View<'_>) -> Result<Value, OverlayError> + Send + Sync + 'static,
    {
        self.entries.insert(name.into(), Arc::new(definition));
        self
    }

    /// Names this overlay defines
    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }

    /// Whether the overlay defines nothing
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A binding and the layer that defined it
#[derive(Clone)]
struct Binding {
    layer: usize,
    definition: Definition,
}

/// Composed, layered package index
pub struct PackageIndex {
    /// Per-name bindings in ascending layer order
    bindings: BTreeMap<String, Vec<Binding>>,
    /// Layer names; index 0 is the base
    layers: Vec<String>,
    memo: Mutex<HashMap<(String, usize), Value>>,
    evaluating: Mutex<HashSet<(String, usize)>>,
}

impl std::fmt::Debug for PackageIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackageIndex")
            .field("layers", &self.layers)
            .field("names", &self.bindings.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl PackageIndex {
    /// Fold `overlays` left to right over `base`
    pub fn compose(base: Overlay, overlays: impl IntoIterator<Item = Overlay>) -> Self {
        let mut index = Self {
            bindings: BTreeMap::new(),
            layers: Vec::new(),
            memo: Mutex::new(HashMap::new()),
            evaluating: Mutex::new(HashSet::new()),
        };

        for (layer, overlay) in std::iter::once(base).chain(overlays).enumerate() {
            tracing::debug!(
                "Applying layer {layer} '{}' ({} definitions)",
                overlay.name,
                overlay.entries.len()
            );
            for (name, definition) in overlay.entries {
                index
                    .bindings
                    .entry(name)
                    .or_default()
                    .push(Binding { layer, definition });
            }
            index.layers.push(overlay.name);
        }

        index
    }

    /// Look up a name in the final view
    pub fn get(&self, name: &str) -> Result<Value, OverlayError> {
        self.final_view().get(name)
    }

    /// View over every layer
    pub fn final_view(&self) -> View<'_> {
        View {
            index: self,
            below: None,
        }
    }

    /// Whether `name` is bound in any layer
    pub fn contains(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    /// Bound names in sorted order
    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.bindings.keys()
    }

    /// Name of the layer whose binding wins for `name`
    pub fn defined_by(&self, name: &str) -> Option<&str> {
        self.bindings
            .get(name)
            .and_then(|b| b.last())
            .map(|b| self.layers[b.layer].as_str())
    }

    /// Number of layers including the base
    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    fn evaluate(&self, name: &str, binding: &Binding) -> Result<Value, OverlayError> {
        let key = (name.to_string(), binding.layer);

        if let Some(value) = lock(&self.memo).get(&key) {
            return Ok(value.clone());
        }

        if !lock(&self.evaluating).insert(key.clone()) {
            return Err(OverlayError::Recursion {
                name: name.to_string(),
            });
        }

        let final_view = self.final_view();
        let prev_view = View {
            index: self,
            below: Some(binding.layer),
        };
        let result = (binding.definition)(&final_view, &prev_view);

        lock(&self.evaluating).remove(&key);

        let value = result?;
        lock(&self.memo).insert(key, value.clone());
        Ok(value)
    }
}

/// Lock a mutex, recovering the data from a poisoned lock
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// A read-only view of the index: all layers, or those below a bound
#[derive(Clone, Copy)]
pub struct View<'a> {
    index: &'a PackageIndex,
    below: Option<usize>,
}

impl View<'_> {
    /// Evaluate the visible binding for `name`
    pub fn get(&self, name: &str) -> Result<Value, OverlayError> {
        let binding = self
            .index
            .bindings
            .get(name)
            .and_then(|bindings| {
                bindings
                    .iter()
                    .rev()
                    .find(|b| self.below.map_or(true, |bound| b.layer < bound))
            })
            .ok_or_else(|| OverlayError::Undefined {
                name: name.to_string(),
                view: self.label().to_string(),
            })?;

        self.index.evaluate(name, binding)
    }

    /// Whether `name` is visible in this view
    pub fn contains(&self, name: &str) -> bool {
        self.index.bindings.get(name).is_some_and(|bindings| {
            bindings
                .iter()
                .any(|b| self.below.map_or(true, |bound| b.layer < bound))
        })
    }

    fn label(&self) -> &'static str {
        if self.below.is_some() {
            "prev"
        } else {
            "final"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn int(value: &Value) -> i64 {
        value.as_integer().expect("integer value")
    }

    #[test]
    fn test_last_overlay_wins_with_prev_reference() {
        let base = Overlay::new("base").set("x", Value::Integer(1));
        let a = Overlay::new("a").set("x", Value::Integer(2));
        let b = Overlay::new("b").define("x", |_, prev| Ok(Value::Integer(int(&prev.get("x")?) + 1)));

        let index = PackageIndex::compose(base, [a, b]);
        assert_eq!(int(&index.get("x").unwrap()), 3);
        assert_eq!(index.defined_by("x"), Some("b"));
    }

    #[test]
    fn test_composition_is_not_commutative() {
        let base = || Overlay::new("base").set("x", Value::Integer(1));
        let a = || Overlay::new("a").set("x", Value::Integer(2));
        let b = || {
            Overlay::new("b").define("x", |_, prev| Ok(Value::Integer(int(&prev.get("x")?) + 1)))
        };

        let ab = PackageIndex::compose(base(), [a(), b()]);
        let ba = PackageIndex::compose(base(), [b(), a()]);
        assert_eq!(int(&ab.get("x").unwrap()), 3);
        assert_eq!(int(&ba.get("x").unwrap()), 2);
    }

    #[test]
    fn test_final_allows_forward_references() {
        let base = Overlay::new("base");
        let a = Overlay::new("a").define("y", |fin, _| fin.get("z"));
        let b = Overlay::new("b").set("z", Value::Integer(5));

        let index = PackageIndex::compose(base, [a, b]);
        assert_eq!(int(&index.get("y").unwrap()), 5);
    }

    #[test]
    fn test_prev_does_not_see_later_layers() {
        let base = Overlay::new("base");
        let a = Overlay::new("a").define("y", |_, prev| prev.get("z"));
        let b = Overlay::new("b").set("z", Value::Integer(5));

        let index = PackageIndex::compose(base, [a, b]);
        assert!(matches!(
            index.get("y"),
            Err(OverlayError::Undefined { name, view }) if name == "z" && view == "prev"
        ));
    }

    #[test]
    fn test_self_reference_through_final_is_recursion() {
        let base = Overlay::new("base").set("x", Value::Integer(1));
        let a = Overlay::new("a").define("x", |fin, _| fin.get("x"));

        let index = PackageIndex::compose(base, [a]);
        assert!(matches!(index.get("x"), Err(OverlayError::Recursion { .. })));
    }

    #[test]
    fn test_each_definition_evaluated_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let base = Overlay::new("base").define("expensive", move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Value::String("done".to_string()))
        });
        let a = Overlay::new("a")
            .define("left", |fin, _| fin.get("expensive"))
            .define("right", |fin, _| fin.get("expensive"));

        let index = PackageIndex::compose(base, [a]);
        index.get("left").unwrap();
        index.get("right").unwrap();
        index.get("expensive").unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_undefined_name() {
        let index = PackageIndex::compose(Overlay::new("base"), Vec::new());
        assert!(matches!(
            index.get("missing"),
            Err(OverlayError::Undefined { view, .. }) if view == "final"
        ));
        assert!(!index.contains("missing"));
        assert_eq!(index.layer_count(), 1);
    }
}

//! Dynamic values stored in execution scopes.

use indexmap::IndexMap;
use serde_json::Value;

use crate::context::ContextRef;

/// A single slot in a scope or namespace.
///
/// Nested mappings are upgraded to [`Namespace`] so dotted access works at
/// any depth; sequences are walked element-wise with mapping elements
/// upgraded and scalars left untouched. Registered flow and step scopes
/// appear as [`Entry::Context`].
#[derive(Debug, Clone)]
pub enum Entry {
    /// Scalar leaf (string, number, bool or null).
    Value(Value),
    /// Sequence of entries.
    List(Vec<Entry>),
    /// Upgraded mapping with field access by name.
    Map(Namespace),
    /// A registered flow or step scope.
    Context(ContextRef),
}

/// Recursively wrap a plain value so nested mappings gain field access.
pub fn upgrade(value: Value) -> Entry {
    match value {
        Value::Object(map) => {
            let mut ns = Namespace::new();
            for (key, value) in map {
                ns.insert(key, upgrade(value));
            }
            Entry::Map(ns)
        }
        Value::Array(items) => Entry::List(items.into_iter().map(upgrade).collect()),
        other => Entry::Value(other),
    }
}

/// Recover the plain value form of an entry. Contexts downgrade to their
/// locally-set values.
pub fn downgrade(entry: &Entry) -> Value {
    match entry {
        Entry::Value(value) => value.clone(),
        Entry::List(items) => Value::Array(items.iter().map(downgrade).collect()),
        Entry::Map(ns) => ns.to_value(),
        Entry::Context(ctx) => ctx.borrow().to_value(),
    }
}

/// An ordered name → entry table.
#[derive(Debug, Clone, Default)]
pub struct Namespace {
    entries: IndexMap<String, Entry>,
}

impl Namespace {
    /// Create an empty namespace.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Entry> {
        self.entries.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, entry: Entry) {
        self.entries.insert(key.into(), entry);
    }

    /// Insert a plain value, upgrading nested mappings.
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.insert(key, upgrade(value));
    }

    /// Add the contents of another namespace to this one. Conflicts are
    /// resolved in favor of `other`.
    pub fn merge(&mut self, other: Namespace) {
        for (key, entry) in other.entries {
            self.entries.insert(key, entry);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Entry)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Downgrade every entry back to a plain mapping value.
    pub fn to_value(&self) -> Value {
        let mut map = serde_json::Map::new();
        for (key, entry) in &self.entries {
            map.insert(key.clone(), downgrade(entry));
        }
        Value::Object(map)
    }
}

impl IntoIterator for Namespace {
    type Item = (String, Entry);
    type IntoIter = indexmap::map::IntoIter<String, Entry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

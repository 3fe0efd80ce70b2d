//! Execution context chain for flow variables.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::namespace::{downgrade, upgrade, Entry, Namespace};

/// Shared handle to a context, cheap to clone.
pub type ContextRef = Rc<RefCell<Context>>;

/// Shared handle to the process-wide globals registry.
pub type GlobalsRef = Rc<RefCell<Globals>>;

/// Registry key under which the flow store context lives.
pub const FLOW_STORE: &str = "flow_store";

/// Process-wide values with priority availability to every context.
///
/// The flow and step engines use this to publish the flow store and the
/// current/previous trackers. Values are never set here from flow
/// configuration. The registry is an explicit handle threaded through
/// construction, so a test (or a harness that wants parallel runs) gets
/// isolation by creating a fresh one.
#[derive(Debug, Default)]
pub struct Globals {
    values: IndexMap<String, Entry>,
}

impl Globals {
    /// Create a fresh, empty registry handle.
    pub fn new() -> GlobalsRef {
        Rc::new(RefCell::new(Self::default()))
    }

    pub fn set(&mut self, name: impl Into<String>, entry: Entry) {
        self.values.insert(name.into(), entry);
    }

    /// Look up a global name: direct registry keys first, then the flow
    /// store's locals. The store fallback is what makes the trackers
    /// (`previous_step` and friends) and registered flow names resolvable
    /// from any scope at global precedence.
    pub fn get(&self, name: &str) -> Option<Entry> {
        if let Some(entry) = self.values.get(name) {
            return Some(entry.clone());
        }
        if let Some(Entry::Context(store)) = self.values.get(FLOW_STORE) {
            return store.borrow().get_local(name);
        }
        None
    }
}

/// Fetch the flow store context shared through the globals registry,
/// creating it on first use.
pub fn flow_store(globals: &GlobalsRef) -> ContextRef {
    if let Some(Entry::Context(store)) = globals.borrow().values.get(FLOW_STORE) {
        return store.clone();
    }
    let store = Context::new(globals.clone()).into_ref();
    globals
        .borrow_mut()
        .set(FLOW_STORE, Entry::Context(store.clone()));
    store
}

/// A hierarchically scoped bag of named values.
///
/// Resolution walks four tiers in order: locally-set values, process
/// environment variables, the globals registry, then the parent chain
/// (recursively, same order). First match wins. Setting a value is always
/// local: a context never mutates the scopes it inherits from.
pub struct Context {
    parent: Option<ContextRef>,
    globals: GlobalsRef,
    locals: IndexMap<String, Entry>,
}

impl Context {
    /// Create a root context on the given registry.
    pub fn new(globals: GlobalsRef) -> Self {
        Self {
            parent: None,
            globals,
            locals: IndexMap::new(),
        }
    }

    /// Create a context inheriting values from `parent`.
    pub fn with_parent(globals: GlobalsRef, parent: ContextRef) -> Self {
        Self {
            parent: Some(parent),
            globals,
            locals: IndexMap::new(),
        }
    }

    pub fn into_ref(self) -> ContextRef {
        Rc::new(RefCell::new(self))
    }

    pub fn globals(&self) -> &GlobalsRef {
        &self.globals
    }

    /// A locally-set entry, ignoring every inherited tier.
    pub fn get_local(&self, name: &str) -> Option<Entry> {
        self.locals.get(name).cloned()
    }

    /// Store a value locally, upgrading nested mappings for dotted access.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.locals.insert(name.into(), upgrade(value));
    }

    pub fn set_entry(&mut self, name: impl Into<String>, entry: Entry) {
        self.locals.insert(name.into(), entry);
    }

    /// Write into the shared globals registry, visible to every context on
    /// the same registry from this point forward.
    pub fn set_global(&self, name: impl Into<String>, value: Value) {
        self.globals.borrow_mut().set(name, upgrade(value));
    }

    /// Overwrite-by-key union of `other` into the local tier. Conflicts
    /// resolve in favor of `other`; inherited tiers are unaffected.
    pub fn merge(&mut self, other: Namespace) {
        for (key, entry) in other {
            self.locals.insert(key, entry);
        }
    }

    /// Resolve a bare name through the four tiers.
    pub fn resolve(&self, name: &str) -> Result<Entry> {
        if let Some(entry) = self.locals.get(name) {
            return Ok(entry.clone());
        }
        if let Ok(value) = std::env::var(name) {
            return Ok(Entry::Value(Value::String(value)));
        }
        if let Some(entry) = self.globals.borrow().get(name) {
            return Ok(entry);
        }
        if let Some(parent) = &self.parent {
            return parent.borrow().resolve(name);
        }
        Err(Error::lookup(name))
    }

    /// Non-throwing variant of [`Context::resolve`], same precedence.
    pub fn has(&self, name: &str) -> bool {
        self.resolve(name).is_ok()
    }

    /// Downgrade the local tier back to a plain mapping value.
    pub fn to_value(&self) -> Value {
        let mut map = serde_json::Map::new();
        for (key, entry) in &self.locals {
            map.insert(key.clone(), downgrade(entry));
        }
        Value::Object(map)
    }
}

impl fmt::Debug for Context {
    // Contexts are registered inside each other (store, parents, steps), so
    // a derived Debug would recurse forever. Print local keys only.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("locals", &self.locals.keys().collect::<Vec<_>>())
            .field("has_parent", &self.parent.is_some())
            .finish()
    }
}

/// One parsed accessor in a dotted/indexed path.
#[derive(Debug, PartialEq, Eq)]
enum Accessor {
    Field(String),
    Index(usize),
}

fn parse_path(path: &str) -> Result<Vec<Accessor>> {
    let mut accessors = Vec::new();
    for segment in path.split('.') {
        let segment = segment.trim();
        if segment.is_empty() {
            return Err(Error::Template(format!("empty segment in path '{path}'")));
        }
        let mut rest = segment;
        if !rest.starts_with('[') {
            let end = rest.find('[').unwrap_or(rest.len());
            accessors.push(Accessor::Field(rest[..end].to_string()));
            rest = &rest[end..];
        }
        while let Some(open) = rest.strip_prefix('[') {
            let close = open
                .find(']')
                .ok_or_else(|| Error::Template(format!("unterminated index in path '{path}'")))?;
            let inner = open[..close].trim();
            let quoted = inner.len() >= 2
                && (inner.starts_with('\'') && inner.ends_with('\'')
                    || inner.starts_with('"') && inner.ends_with('"'));
            if quoted {
                accessors.push(Accessor::Field(inner[1..inner.len() - 1].to_string()));
            } else if let Ok(index) = inner.parse::<usize>() {
                accessors.push(Accessor::Index(index));
            } else {
                accessors.push(Accessor::Field(inner.to_string()));
            }
            rest = &open[close + 1..];
        }
        if !rest.is_empty() {
            return Err(Error::Template(format!(
                "malformed segment in path '{path}'"
            )));
        }
    }
    Ok(accessors)
}

/// Resolve a dotted/indexed path like `step_one.my_value` or
/// `list_value[0]` against a context chain. The first segment goes through
/// the four-tier resolution; the rest descend through the entry structure,
/// re-entering full resolution whenever a registered scope is crossed.
pub fn resolve_path(ctx: &ContextRef, path: &str) -> Result<Entry> {
    let mut accessors = parse_path(path)?.into_iter();
    let mut current = match accessors.next() {
        Some(Accessor::Field(name)) => ctx
            .borrow()
            .resolve(&name)
            .map_err(|_| Error::lookup(path))?,
        _ => {
            return Err(Error::Template(format!(
                "path '{path}' must begin with a name"
            )))
        }
    };
    for accessor in accessors {
        current = descend(current, &accessor).ok_or_else(|| Error::lookup(path))?;
    }
    Ok(current)
}

fn descend(entry: Entry, accessor: &Accessor) -> Option<Entry> {
    match (entry, accessor) {
        (Entry::Map(ns), Accessor::Field(name)) => ns.get(name).cloned(),
        (Entry::Context(ctx), Accessor::Field(name)) => ctx.borrow().resolve(name).ok(),
        (Entry::List(items), Accessor::Index(index)) => items.get(*index).cloned(),
        _ => None,
    }
}

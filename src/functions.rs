//! Template substitution functions.
//!
//! Templates can call simple functions to produce dynamic values. A few are
//! built in; hosts register their own through
//! [`FunctionRegistry::register`]. The first parameter is the context at
//! call time (usually a step, inheriting from its flow); the remaining
//! arguments are plain JSON values. The return value is substituted in
//! place of the call.

use indexmap::IndexMap;
use rand::Rng;
use serde_json::Value;

use crate::context::ContextRef;
use crate::error::{Error, Result};

/// Signature shared by built-in and user-registered template functions.
pub type TemplateFunction = Box<dyn Fn(&ContextRef, &[Value]) -> Result<String>>;

const RESERVED_NAME: &str = "get_template_function";

/// Name → callable table for template function dispatch. Built-ins take
/// priority over user registrations with the same name.
pub struct FunctionRegistry {
    builtins: IndexMap<String, TemplateFunction>,
    user: IndexMap<String, TemplateFunction>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        let mut builtins: IndexMap<String, TemplateFunction> = IndexMap::new();
        builtins.insert("uuid".to_string(), Box::new(uuid));
        builtins.insert("random".to_string(), Box::new(random));
        Self {
            builtins,
            user: IndexMap::new(),
        }
    }

    /// Register a user function. Built-ins keep priority over a user
    /// function with the same name.
    pub fn register<F>(&mut self, name: &str, function: F) -> Result<()>
    where
        F: Fn(&ContextRef, &[Value]) -> Result<String> + 'static,
    {
        if name == RESERVED_NAME {
            return Err(Error::Config(format!(
                "{RESERVED_NAME} is not a valid name for template functions"
            )));
        }
        self.user.insert(name.to_string(), Box::new(function));
        Ok(())
    }

    /// Locate a function by name. Unknown names are `Ok(None)` so callers
    /// can substitute the empty string.
    pub fn get(&self, name: &str) -> Result<Option<&TemplateFunction>> {
        if name == RESERVED_NAME {
            return Err(Error::Config(format!(
                "{RESERVED_NAME} is not a valid name for template functions"
            )));
        }
        Ok(self.builtins.get(name).or_else(|| self.user.get(name)))
    }
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Return a new random UUID in canonical textual form.
fn uuid(_ctx: &ContextRef, _args: &[Value]) -> Result<String> {
    Ok(uuid::Uuid::new_v4().to_string())
}

/// Return a random integer in the range `[0, max]`, padded on the right
/// with zeros to the width of `max - 1`.
fn random(_ctx: &ContextRef, args: &[Value]) -> Result<String> {
    let max = args
        .first()
        .and_then(Value::as_u64)
        .ok_or_else(|| Error::Function("random() takes a maximum value".to_string()))?;
    let number = rand::thread_rng().gen_range(0..=max);
    let width = max.saturating_sub(1).to_string().len();
    Ok(format!("{number:0<width$}"))
}

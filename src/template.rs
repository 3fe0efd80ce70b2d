//! Template substitution for request definitions.
//!
//! Tags use the `{? expression ?}` form, where the expression is either a
//! dotted/indexed context path or a `name(args)` function call whose
//! arguments are JSON literals. A string value that is exactly
//! `template:<name>` is replaced by the named file from the template
//! directory before tag scanning. Nested tags and nested calls are not
//! supported.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::config::Config;
use crate::context::{resolve_path, ContextRef};
use crate::error::{Error, Result};
use crate::functions::FunctionRegistry;
use crate::namespace::downgrade;

fn substitution_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\?\s*([^?]*\S)\s*\?\}").expect("substitution pattern"))
}

fn whole_tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\{\?\s*([^?]*\S)\s*\?\}$").expect("whole-tag pattern"))
}

fn function_call_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([a-z][a-z_0-9]*)\((.*)\)$").expect("function-call pattern"))
}

fn file_sentinel_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^template:(.*)$").expect("file-sentinel pattern"))
}

/// Stringify a resolved value for inline substitution: strings verbatim,
/// everything else as compact JSON.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Structure-preserving substitution over strings, sequences and mappings.
pub struct TemplateEngine<'a> {
    config: &'a Config,
    functions: &'a FunctionRegistry,
}

impl<'a> TemplateEngine<'a> {
    pub fn new(config: &'a Config, functions: &'a FunctionRegistry) -> Self {
        Self { config, functions }
    }

    /// Substitute tags everywhere in `value`, preserving its structure.
    /// Sequences and mappings are walked recursively to any depth;
    /// unsupported value types pass through unchanged.
    pub fn interpolate(&self, value: &Value, ctx: &ContextRef) -> Result<Value> {
        match value {
            Value::String(s) => self.interpolate_str(s, ctx),
            Value::Array(items) => items
                .iter()
                .map(|item| self.interpolate(item, ctx))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            Value::Object(map) => {
                let mut out = serde_json::Map::new();
                for (key, value) in map {
                    out.insert(key.clone(), self.interpolate(value, ctx)?);
                }
                Ok(Value::Object(out))
            }
            other => Ok(other.clone()),
        }
    }

    /// Substitute tags in a single string value.
    ///
    /// A `template:<name>` sentinel is expanded from the template directory
    /// first, then scanned. A single tag spanning the whole string
    /// substitutes the resolved value with its type preserved, so a step
    /// body field can receive a whole list or mapping; everywhere else the
    /// resolved value is stringified into the output.
    pub fn interpolate_str(&self, value: &str, ctx: &ContextRef) -> Result<Value> {
        if let Some(caps) = file_sentinel_re().captures(value) {
            let path = self.config.template_path().join(&caps[1]);
            let content = std::fs::read_to_string(&path).map_err(|e| {
                Error::Template(format!("cannot read template '{}': {e}", path.display()))
            })?;
            return self.render(&content, ctx).map(Value::String);
        }
        if let Some(caps) = whole_tag_re().captures(value) {
            let expression = &caps[1];
            if !function_call_re().is_match(expression) {
                return resolve_path(ctx, expression).map(|entry| downgrade(&entry));
            }
        }
        self.render(value, ctx).map(Value::String)
    }

    /// Replace every tag in a template string with its rendered value.
    fn render(&self, template: &str, ctx: &ContextRef) -> Result<String> {
        let mut out = String::new();
        let mut last = 0;
        for caps in substitution_re().captures_iter(template) {
            let span = caps.get(0).expect("match group");
            out.push_str(&template[last..span.start()]);
            let expression = caps.get(1).expect("expression group").as_str();
            out.push_str(&self.render_expression(expression, ctx)?);
            last = span.end();
        }
        out.push_str(&template[last..]);
        Ok(out)
    }

    fn render_expression(&self, expression: &str, ctx: &ContextRef) -> Result<String> {
        if let Some(caps) = function_call_re().captures(expression) {
            return self.call_function(&caps[1], &caps[2], ctx);
        }
        let entry = resolve_path(ctx, expression)?;
        Ok(stringify(&downgrade(&entry)))
    }

    /// Dispatch a function-call tag. An unknown function name substitutes
    /// the empty string; the reserved name surfaces a configuration error.
    fn call_function(&self, name: &str, raw_args: &str, ctx: &ContextRef) -> Result<String> {
        let Some(function) = self.functions.get(name)? else {
            return Ok(String::new());
        };
        let args: Vec<Value> = if raw_args.trim().is_empty() {
            Vec::new()
        } else {
            serde_json::from_str(&format!("[{raw_args}]")).map_err(|e| {
                Error::Template(format!("arguments to {name}() must be JSON literals: {e}"))
            })?
        };
        function(ctx, &args)
    }
}

//! Minimal JSONPath evaluation for step output queries.
//!
//! Supports the subset flow definitions use: `$` root, `.name` and
//! `['name']` child access, `[0]` sequence indexing and the `[*]` / `.*`
//! wildcard. Queries always return the full ordered list of matches.

use serde_json::Value;

use crate::error::{Error, Result};

#[derive(Debug, PartialEq, Eq)]
enum Segment {
    Child(String),
    Index(usize),
    Wildcard,
}

fn parse(path: &str) -> Result<Vec<Segment>> {
    let mut rest = path
        .strip_prefix('$')
        .ok_or_else(|| Error::JsonPath(format!("query must start with '$': {path}")))?;
    let mut segments = Vec::new();
    while !rest.is_empty() {
        if let Some(open) = rest.strip_prefix('[') {
            let close = open
                .find(']')
                .ok_or_else(|| Error::JsonPath(format!("unterminated bracket in {path}")))?;
            let inner = open[..close].trim();
            let quoted = inner.len() >= 2
                && (inner.starts_with('\'') && inner.ends_with('\'')
                    || inner.starts_with('"') && inner.ends_with('"'));
            if inner == "*" {
                segments.push(Segment::Wildcard);
            } else if quoted {
                segments.push(Segment::Child(inner[1..inner.len() - 1].to_string()));
            } else if let Ok(index) = inner.parse::<usize>() {
                segments.push(Segment::Index(index));
            } else {
                segments.push(Segment::Child(inner.to_string()));
            }
            rest = &open[close + 1..];
        } else if let Some(after_dot) = rest.strip_prefix('.') {
            if after_dot.starts_with('.') {
                return Err(Error::JsonPath(format!(
                    "recursive descent is not supported: {path}"
                )));
            }
            let end = after_dot
                .find(['.', '['])
                .unwrap_or(after_dot.len());
            let name = &after_dot[..end];
            if name.is_empty() {
                return Err(Error::JsonPath(format!("empty member name in {path}")));
            }
            if name == "*" {
                segments.push(Segment::Wildcard);
            } else {
                segments.push(Segment::Child(name.to_string()));
            }
            rest = &after_dot[end..];
        } else {
            return Err(Error::JsonPath(format!("unexpected token in {path}")));
        }
    }
    Ok(segments)
}

/// Evaluate a query against a value, returning every match in document
/// order.
pub fn find(path: &str, value: &Value) -> Result<Vec<Value>> {
    let segments = parse(path)?;
    let mut matches = vec![value];
    for segment in &segments {
        let mut next = Vec::new();
        for value in matches {
            match segment {
                Segment::Child(name) => {
                    if let Some(child) = value.get(name) {
                        next.push(child);
                    }
                }
                Segment::Index(index) => {
                    if let Some(child) = value.get(index) {
                        next.push(child);
                    }
                }
                Segment::Wildcard => match value {
                    Value::Array(items) => next.extend(items),
                    Value::Object(map) => next.extend(map.values()),
                    _ => {}
                },
            }
        }
        matches = next;
    }
    Ok(matches.into_iter().cloned().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_single_match() {
        let body = json!({"id": "123abc"});
        assert_eq!(find("$.id", &body).unwrap(), vec![json!("123abc")]);
    }

    #[test]
    fn test_nested_and_indexed() {
        let body = json!({"user": {"roles": ["admin", "ops"]}});
        assert_eq!(
            find("$.user.roles[0]", &body).unwrap(),
            vec![json!("admin")]
        );
        assert_eq!(
            find("$['user']['roles'][1]", &body).unwrap(),
            vec![json!("ops")]
        );
    }

    #[test]
    fn test_wildcard_fans_out() {
        let body = json!({"id": ["x", "y"]});
        assert_eq!(
            find("$.id[*]", &body).unwrap(),
            vec![json!("x"), json!("y")]
        );
    }

    #[test]
    fn test_missing_member_yields_no_matches() {
        let body = json!({"id": "123abc"});
        assert!(find("$.missing", &body).unwrap().is_empty());
        assert!(find("$.id[0]", &body).unwrap().is_empty());
    }

    #[test]
    fn test_malformed_query() {
        let body = json!({});
        assert!(find("id", &body).is_err());
        assert!(find("$..id", &body).is_err());
        assert!(find("$.id[", &body).is_err());
    }
}

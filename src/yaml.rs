//! YAML flow and step definitions.

use std::path::Path;

use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{Error, Result};

/// A flow document: dependencies plus an ordered map of steps.
///
/// ```yaml
/// description: Create a user and fetch it back
/// depends_on: authenticate
/// steps:
///   create:
///     url: "https://{? api_host ?}/users"
///     method: POST
///     body:
///       name: "{? user_name ?}"
///     outputs:
///       user_id: "$.id"
///   fetch:
///     url: "https://{? api_host ?}/users/{? create.user_id ?}"
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct FlowDefinition {
    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub depends_on: Dependencies,

    /// Steps in declared order; the key is the step name later steps use
    /// to reference outputs.
    #[serde(default)]
    pub steps: IndexMap<String, StepDefinition>,
}

/// `depends_on` accepts a single flow name or a list of names.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Dependencies {
    One(String),
    Many(Vec<String>),
}

impl Default for Dependencies {
    fn default() -> Self {
        Dependencies::Many(Vec::new())
    }
}

impl Dependencies {
    /// The normalized list form.
    pub fn names(&self) -> Vec<String> {
        match self {
            Dependencies::One(name) => vec![name.clone()],
            Dependencies::Many(names) => names.clone(),
        }
    }
}

/// One step of a flow. Every templated field stays unresolved until the
/// step executes.
#[derive(Debug, Clone, Deserialize)]
pub struct StepDefinition {
    #[serde(default)]
    pub description: Option<String>,

    /// Request URL template.
    pub url: String,

    #[serde(default = "default_method")]
    pub method: String,

    /// Header name → template string.
    #[serde(default)]
    pub headers: IndexMap<String, String>,

    /// Template string, structured value, or a whole-string
    /// `template:<name>` sentinel.
    #[serde(default)]
    pub body: Option<Value>,

    /// Output name → JSONPath query over the response body.
    #[serde(default)]
    pub outputs: IndexMap<String, String>,

    #[serde(default)]
    pub wait_for_success: WaitForSuccess,
}

fn default_method() -> String {
    "GET".to_string()
}

/// `wait_for_success` accepts a bare boolean or a partial policy mapping.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum WaitForSuccess {
    Flag(bool),
    Policy {
        #[serde(default)]
        attempt: Option<u32>,
        #[serde(default)]
        delay: Option<u64>,
    },
}

impl Default for WaitForSuccess {
    fn default() -> Self {
        WaitForSuccess::Flag(false)
    }
}

/// Load a YAML document that must be a mapping at the top level.
pub fn load_mapping(path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
    let value: Value = serde_yaml::from_str(&content)
        .map_err(|e| Error::Config(format!("YAML parsing error in {}: {e}", path.display())))?;
    if !value.is_object() {
        return Err(Error::Config(format!(
            "YAML configuration documents are expected to be mappings: {}",
            path.display()
        )));
    }
    Ok(value)
}

/// Load and deserialize a flow definition file.
pub fn load_flow_definition(path: &Path) -> Result<FlowDefinition> {
    let document = load_mapping(path)?;
    serde_json::from_value(document)
        .map_err(|e| Error::Config(format!("invalid flow definition in {}: {e}", path.display())))
}

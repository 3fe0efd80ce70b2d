//! Error types for flowline.

/// Result type for flowline operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while loading or executing a flow.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid configuration or malformed flow/profile document.
    #[error("configuration error: {0}")]
    Config(String),

    /// A context reference could not be resolved anywhere in the chain.
    #[error("unresolved reference: {name}")]
    Lookup { name: String },

    /// A template could not be rendered.
    #[error("template error: {0}")]
    Template(String),

    /// A template function misbehaved.
    #[error("function error: {0}")]
    Function(String),

    /// An output query could not be parsed.
    #[error("JSONPath error: {0}")]
    JsonPath(String),

    /// The HTTP transport failed before producing a response.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Serialization of a request body failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn lookup(name: impl Into<String>) -> Self {
        Error::Lookup { name: name.into() }
    }
}

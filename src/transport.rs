//! HTTP transport for step requests.

use indexmap::IndexMap;
use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};

/// Headers sent with every request unless the step overrides them.
pub const DEFAULT_HEADERS: [(&str, &str); 5] = [
    ("Content-Type", "application/json"),
    ("User-Agent", concat!("flowline/", env!("CARGO_PKG_VERSION"))),
    ("Accept", "*/*"),
    ("Accept-Encoding", "gzip, deflate, br"),
    ("Connection", "keep-alive"),
];

/// A fully resolved request, ready for the wire.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: String,
    pub url: String,
    pub headers: IndexMap<String, String>,
    pub body: Option<Value>,
}

impl Request {
    /// The body as it goes on the wire: strings raw, structured values as
    /// JSON.
    pub fn body_text(&self) -> Result<Option<String>> {
        match &self.body {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(other) => Ok(Some(serde_json::to_string(other)?)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub headers: IndexMap<String, String>,
    pub body: String,
}

impl Response {
    /// Whether the response carries a non-error status.
    pub fn ok(&self) -> bool {
        self.status < 400
    }

    /// The response body as a value: parsed JSON when it parses, the raw
    /// text otherwise, the empty string for an empty body.
    pub fn body_value(&self) -> Value {
        if self.body.is_empty() {
            return Value::String(String::new());
        }
        serde_json::from_str(&self.body).unwrap_or_else(|_| Value::String(self.body.clone()))
    }
}

/// The wire-level collaborator a step talks to. Implementations report
/// transport-level failures (connection refused, DNS, ...) as errors;
/// non-success statuses come back as ordinary responses.
pub trait Transport {
    fn send(&self, request: &Request) -> Result<Response>;
}

/// Default transport on a blocking HTTP client.
pub struct HttpTransport {
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self> {
        let client = reqwest::blocking::Client::builder().build()?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: &Request) -> Result<Response> {
        let method = reqwest::Method::from_bytes(request.method.to_uppercase().as_bytes())
            .map_err(|_| Error::Config(format!("invalid HTTP method '{}'", request.method)))?;
        debug!(method = %request.method, url = %request.url, "sending request");

        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body_text()? {
            builder = builder.body(body);
        }

        let response = builder.send()?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = response.text()?;
        debug!(status, bytes = body.len(), "received response");

        Ok(Response {
            status,
            headers,
            body,
        })
    }
}

//! # flowline
//!
//! Declarative HTTP API flow execution.
//!
//! A flow is a YAML document naming a sequence of HTTP steps. Steps run in
//! order, and each one can thread values from earlier responses, profile
//! overlays and the process environment into its request templates through
//! `{? ... ?}` substitution tags.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use flowline::{Config, IndexMap, Runtime};
//!
//! let runtime = Runtime::new(Config::new().with_data_path("./data"))?;
//! let flow = runtime.execute("create_user", &[], IndexMap::new())?;
//! assert!(flow.succeeded());
//! # Ok::<(), flowline::Error>(())
//! ```
//!
//! ## YAML Definition
//!
//! ```yaml
//! description: Create a user and fetch it back
//! depends_on: authenticate
//! steps:
//!   create:
//!     url: "https://{? api_host ?}/users"
//!     method: POST
//!     body:
//!       name: "{? user_name ?}"
//!       request_id: "{? uuid() ?}"
//!     outputs:
//!       user_id: "$.id"
//!   fetch:
//!     url: "https://{? api_host ?}/users/{? create.user_id ?}"
//!     wait_for_success:
//!       attempt: 5
//!       delay: 2
//! ```
//!
//! Executed steps are addressable by their YAML key (`create.user_id`
//! above); the most recently completed step is also available as
//! `previous_step`. Flows named in `depends_on` run first and are
//! addressable the same way, e.g. `authenticate.login.token`.

mod config;
mod context;
mod error;
mod flow;
mod functions;
mod jsonpath;
mod namespace;
mod profile;
mod runtime;
mod step;
mod template;
mod transport;
pub mod yaml;

pub use config::Config;
pub use context::{flow_store, resolve_path, Context, ContextRef, Globals, GlobalsRef};
pub use error::{Error, Result};
pub use flow::Flow;
pub use functions::FunctionRegistry;
pub use namespace::{downgrade, upgrade, Entry, Namespace};
pub use runtime::Runtime;
pub use step::{RetryPolicy, Step, DEFAULT_ATTEMPT_COUNT, DEFAULT_DELAY_SECONDS};
pub use template::{stringify, TemplateEngine};
pub use transport::{HttpTransport, Request, Response, Transport, DEFAULT_HEADERS};
pub use yaml::{Dependencies, FlowDefinition, StepDefinition, WaitForSuccess};

/// Re-export common types
pub use indexmap::IndexMap;
pub use serde_json::Value;

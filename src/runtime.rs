//! Runtime assembly: configuration, globals, functions and transport.

use indexmap::IndexMap;
use serde_json::Value;

use crate::config::Config;
use crate::context::{ContextRef, Globals, GlobalsRef};
use crate::error::Result;
use crate::flow::Flow;
use crate::functions::FunctionRegistry;
use crate::transport::{HttpTransport, Transport};

/// Everything a flow execution needs, bundled for injection.
///
/// Each runtime carries its own globals registry, so two runtimes are
/// fully isolated from each other; [`Runtime::reset_globals`] drops all
/// published flow/step state between executions.
pub struct Runtime {
    config: Config,
    globals: GlobalsRef,
    functions: FunctionRegistry,
    transport: Box<dyn Transport>,
}

impl Runtime {
    /// Create a runtime on the default HTTP transport.
    pub fn new(config: Config) -> Result<Self> {
        Ok(Self::with_transport(config, Box::new(HttpTransport::new()?)))
    }

    /// Create a runtime on a caller-supplied transport.
    pub fn with_transport(config: Config, transport: Box<dyn Transport>) -> Self {
        Self {
            config,
            globals: Globals::new(),
            functions: FunctionRegistry::new(),
            transport,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn globals(&self) -> &GlobalsRef {
        &self.globals
    }

    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    pub fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    /// Register a user template function. Built-ins keep priority over a
    /// user function with the same name.
    pub fn register_function<F>(&mut self, name: &str, function: F) -> Result<()>
    where
        F: Fn(&ContextRef, &[Value]) -> Result<String> + 'static,
    {
        self.functions.register(name, function)
    }

    /// Drop all published flow/step state.
    pub fn reset_globals(&mut self) {
        self.globals = Globals::new();
    }

    /// Load and execute a flow. Extra `vars` become flow locals. The flow
    /// comes back with its success flags set; load problems are errors,
    /// execution failure is the flow's `succeeded()` flag.
    pub fn execute(
        &self,
        flow_name: &str,
        profiles: &[String],
        vars: IndexMap<String, Value>,
    ) -> Result<Flow> {
        let mut flow = Flow::load(self, flow_name, profiles, None, vars)?;
        flow.execute(self);
        Ok(flow)
    }
}

//! Step execution: one HTTP request/response cycle within a flow.

use std::time::Duration;

use indexmap::IndexMap;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::context::{flow_store, Context, ContextRef};
use crate::error::{Error, Result};
use crate::jsonpath;
use crate::namespace::{downgrade, Entry};
use crate::runtime::Runtime;
use crate::template::{stringify, TemplateEngine};
use crate::transport::{Request, DEFAULT_HEADERS};
use crate::yaml::{StepDefinition, WaitForSuccess};

/// Baseline retry configuration, applied only when `wait_for_success`
/// appears in the step definition.
pub const DEFAULT_ATTEMPT_COUNT: u32 = 3;
pub const DEFAULT_DELAY_SECONDS: u64 = 5;

/// Resolved retry configuration for one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Number of times to try the request before giving up.
    pub attempt: u32,
    /// Seconds to wait before every attempt, including the first.
    pub delay: u64,
}

impl RetryPolicy {
    pub const RUN_ONCE: RetryPolicy = RetryPolicy {
        attempt: 1,
        delay: 0,
    };

    pub const RETRY: RetryPolicy = RetryPolicy {
        attempt: DEFAULT_ATTEMPT_COUNT,
        delay: DEFAULT_DELAY_SECONDS,
    };

    fn resolve(wait_for_success: &WaitForSuccess) -> RetryPolicy {
        match wait_for_success {
            WaitForSuccess::Flag(false) => Self::RUN_ONCE,
            WaitForSuccess::Flag(true) => Self::RETRY,
            WaitForSuccess::Policy { attempt, delay } => RetryPolicy {
                attempt: attempt.unwrap_or(DEFAULT_ATTEMPT_COUNT),
                delay: delay.unwrap_or(DEFAULT_DELAY_SECONDS),
            },
        }
    }
}

/// A single API request within a flow.
///
/// The step is itself a scope, child of its flow: substitution values come
/// from the parent chain, which includes environment values, profile data
/// and the outputs of previously executed steps. Those steps are referenced
/// by their YAML key, and the one immediately prior is also available as
/// `previous_step`. After execution, every declared output is available as
/// `<step_name>.<output_name>`.
pub struct Step {
    name: String,
    description: String,
    definition: StepDefinition,
    retry: RetryPolicy,
    ctx: ContextRef,
    last_response: Option<crate::transport::Response>,
}

impl Step {
    /// Build a step from its definition and register its scope on the
    /// parent flow under the step name.
    pub fn new(name: impl Into<String>, definition: StepDefinition, parent: &ContextRef) -> Self {
        let name = name.into();
        let description = definition
            .description
            .clone()
            .unwrap_or_else(|| name.clone());
        let globals = parent.borrow().globals().clone();
        let ctx = Context::with_parent(globals, parent.clone()).into_ref();
        {
            let mut scope = ctx.borrow_mut();
            scope.set("step_name", Value::String(name.clone()));
            scope.set("step_description", Value::String(description.clone()));
        }
        parent
            .borrow_mut()
            .set_entry(name.as_str(), Entry::Context(ctx.clone()));
        let retry = RetryPolicy::resolve(&definition.wait_for_success);
        Self {
            name,
            description,
            definition,
            retry,
            ctx,
            last_response: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn context(&self) -> &ContextRef {
        &self.ctx
    }

    /// The last response seen, if any attempt completed.
    pub fn response(&self) -> Option<&crate::transport::Response> {
        self.last_response.as_ref()
    }

    /// An extracted output by name.
    pub fn output(&self, name: &str) -> Option<Value> {
        self.ctx
            .borrow()
            .get_local(name)
            .map(|entry| downgrade(&entry))
    }

    /// Run the request, retrying per the resolved policy, and publish the
    /// outputs. Returns whether any attempt succeeded.
    pub fn execute(&mut self, runtime: &Runtime) -> bool {
        let flow_description = self
            .ctx
            .borrow()
            .resolve("flow_description")
            .map(|entry| stringify(&downgrade(&entry)))
            .unwrap_or_default();
        info!(step = %self.description, flow = %flow_description, "executing step");

        let store = flow_store(runtime.globals());
        store
            .borrow_mut()
            .set_entry("current_step", Entry::Context(self.ctx.clone()));

        let engine = TemplateEngine::new(runtime.config(), runtime.functions());
        let mut succeeded = false;
        let mut attempt = 0;
        while attempt < self.retry.attempt && !succeeded {
            attempt += 1;
            info!(attempt, total = self.retry.attempt, "attempt");
            if self.retry.delay > 0 {
                std::thread::sleep(Duration::from_secs(self.retry.delay));
            }
            match self.attempt_request(&engine, runtime) {
                Ok(response) => {
                    succeeded = response.ok();
                    if !succeeded {
                        warn!(status = response.status, "request returned an error status");
                    }
                    self.last_response = Some(response);
                }
                Err(Error::Transport(e)) => {
                    // Connection-level failures consume the attempt and
                    // drive the retry loop like an error status.
                    warn!(error = %e, "request failed");
                }
                Err(e) => {
                    // Unresolved references and template errors are not
                    // retried: the request cannot be constructed.
                    error!(error = %e, step = %self.name, "cannot build request");
                    break;
                }
            }
        }

        if succeeded {
            self.gather_outputs();
            let mut store = store.borrow_mut();
            store.set_entry("previous_step", Entry::Context(self.ctx.clone()));
            store.set("current_step", Value::Null);
        }
        info!(step = %self.description, succeeded, "completed step");
        succeeded
    }

    fn attempt_request(
        &self,
        engine: &TemplateEngine,
        runtime: &Runtime,
    ) -> Result<crate::transport::Response> {
        let request = self.resolve_request(engine)?;
        runtime.transport().send(&request)
    }

    /// Resolve the templated url/headers/body against the current chain.
    /// This happens on every attempt, so a retry observes context changes.
    fn resolve_request(&self, engine: &TemplateEngine) -> Result<Request> {
        let url = stringify(&engine.interpolate_str(&self.definition.url, &self.ctx)?);

        let mut headers: IndexMap<String, String> = DEFAULT_HEADERS
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect();
        for (name, template) in &self.definition.headers {
            let value = engine.interpolate_str(template, &self.ctx)?;
            headers.insert(name.clone(), stringify(&value));
        }

        let body = match &self.definition.body {
            None => None,
            Some(value) => Some(engine.interpolate(value, &self.ctx)?),
        };

        Ok(Request {
            method: self.definition.method.clone(),
            url,
            headers,
            body,
        })
    }

    /// Evaluate every declared output query against the response body and
    /// publish the results on the step scope. Applies only when the body is
    /// a mapping; one match yields the scalar, several yield the ordered
    /// list.
    fn gather_outputs(&mut self) {
        let Some(response) = &self.last_response else {
            return;
        };
        let body = response.body_value();
        if !body.is_object() || self.definition.outputs.is_empty() {
            return;
        }
        for (name, query) in &self.definition.outputs {
            let mut matches = match jsonpath::find(query, &body) {
                Ok(matches) => matches,
                Err(e) => {
                    warn!(output = %name, error = %e, "skipping output");
                    continue;
                }
            };
            let value = match matches.len() {
                1 => matches.remove(0),
                _ => Value::Array(matches),
            };
            info!(output = %name, value = %stringify(&value), "extracted output");
            self.ctx.borrow_mut().set(name, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::context::Globals;
    use crate::transport::{Response, Transport};
    use serde_json::json;
    use std::cell::RefCell;

    fn definition(yaml: &str) -> StepDefinition {
        let value: Value = serde_yaml::from_str(yaml).unwrap();
        serde_json::from_value(value).unwrap()
    }

    fn parent_flow(runtime: &Runtime) -> ContextRef {
        let ctx = Context::new(runtime.globals().clone()).into_ref();
        ctx.borrow_mut()
            .set("flow_description", json!("Mock Parent Flow"));
        ctx
    }

    /// Replays scripted responses, repeating the last one when exhausted.
    struct ScriptedTransport {
        responses: RefCell<Vec<Response>>,
    }

    impl ScriptedTransport {
        fn new(statuses: &[u16], body: &str) -> Self {
            let responses = statuses
                .iter()
                .rev()
                .map(|status| Response {
                    status: *status,
                    headers: IndexMap::new(),
                    body: body.to_string(),
                })
                .collect();
            Self {
                responses: RefCell::new(responses),
            }
        }
    }

    impl Transport for ScriptedTransport {
        fn send(&self, _request: &Request) -> Result<Response> {
            let mut responses = self.responses.borrow_mut();
            let response = if responses.len() > 1 {
                responses.pop().expect("scripted response")
            } else {
                responses.last().expect("scripted response").clone()
            };
            Ok(response)
        }
    }

    fn runtime(statuses: &'static [u16], body: &'static str) -> Runtime {
        Runtime::with_transport(
            Config::new(),
            Box::new(ScriptedTransport::new(statuses, body)),
        )
    }

    #[test]
    fn test_retry_config_absent() {
        let rt = runtime(&[200], "{}");
        let step = Step::new(
            "name",
            definition("url: https://test"),
            &parent_flow(&rt),
        );
        assert_eq!(*step.retry(), RetryPolicy::RUN_ONCE);
    }

    #[test]
    fn test_retry_config_boolean_true() {
        let rt = runtime(&[200], "{}");
        let step = Step::new(
            "name",
            definition("url: https://test\nwait_for_success: true"),
            &parent_flow(&rt),
        );
        assert_eq!(
            *step.retry(),
            RetryPolicy {
                attempt: DEFAULT_ATTEMPT_COUNT,
                delay: DEFAULT_DELAY_SECONDS
            }
        );
    }

    #[test]
    fn test_retry_config_boolean_false() {
        let rt = runtime(&[200], "{}");
        let step = Step::new(
            "name",
            definition("url: https://test\nwait_for_success: false"),
            &parent_flow(&rt),
        );
        assert_eq!(*step.retry(), RetryPolicy { attempt: 1, delay: 0 });
    }

    #[test]
    fn test_retry_config_empty_mapping() {
        let rt = runtime(&[200], "{}");
        let step = Step::new(
            "name",
            definition("url: https://test\nwait_for_success: {}"),
            &parent_flow(&rt),
        );
        assert_eq!(
            *step.retry(),
            RetryPolicy {
                attempt: DEFAULT_ATTEMPT_COUNT,
                delay: DEFAULT_DELAY_SECONDS
            }
        );
    }

    #[test]
    fn test_retry_config_partial_mappings() {
        let rt = runtime(&[200], "{}");
        let attempt_only = Step::new(
            "a",
            definition("url: https://test\nwait_for_success:\n  attempt: 10"),
            &parent_flow(&rt),
        );
        assert_eq!(
            *attempt_only.retry(),
            RetryPolicy {
                attempt: 10,
                delay: DEFAULT_DELAY_SECONDS
            }
        );

        let delay_only = Step::new(
            "d",
            definition("url: https://test\nwait_for_success:\n  delay: 15"),
            &parent_flow(&rt),
        );
        assert_eq!(
            *delay_only.retry(),
            RetryPolicy {
                attempt: DEFAULT_ATTEMPT_COUNT,
                delay: 15
            }
        );
    }

    #[test]
    fn test_execute_retries_until_success() {
        let rt = runtime(&[400, 400, 200], r#"{"foo": "FOO", "bar": "BAR"}"#);
        let mut step = Step::new(
            "name",
            definition(
                r#"
url: https://test
wait_for_success:
  attempt: 3
  delay: 0
outputs:
  foo: "$.foo"
  bar: "$.bar"
"#,
            ),
            &parent_flow(&rt),
        );

        assert!(step.execute(&rt));
        assert_eq!(step.output("foo"), Some(json!("FOO")));
        assert_eq!(step.output("bar"), Some(json!("BAR")));
    }

    #[test]
    fn test_execute_exhausts_attempts() {
        let rt = runtime(&[500], "{}");
        let mut step = Step::new(
            "name",
            definition(
                "url: https://test\nwait_for_success:\n  attempt: 3\n  delay: 0",
            ),
            &parent_flow(&rt),
        );

        assert!(!step.execute(&rt));
        // Failure leaves the step registered as the current step.
        let store = flow_store(rt.globals());
        let current = store.borrow().get_local("current_step");
        assert!(matches!(current, Some(Entry::Context(_))));
    }

    #[test]
    fn test_execute_publishes_previous_step() {
        let rt = runtime(&[200], r#"{"id": "123abc"}"#);
        let mut step = Step::new(
            "first",
            definition("url: https://test\noutputs:\n  id: \"$.id\""),
            &parent_flow(&rt),
        );

        assert!(step.execute(&rt));

        let store = flow_store(rt.globals());
        let previous = store.borrow().get_local("previous_step");
        let Some(Entry::Context(previous)) = previous else {
            panic!("previous_step not published");
        };
        let id = previous.borrow().resolve("id").unwrap();
        assert_eq!(downgrade(&id), json!("123abc"));
        // current_step is cleared, not removed.
        assert!(matches!(
            store.borrow().get_local("current_step"),
            Some(Entry::Value(Value::Null))
        ));
    }

    #[test]
    fn test_plain_body_skips_outputs() {
        let rt = runtime(&[200], "THIS IS THE RESPONSE");
        let mut step = Step::new(
            "name",
            definition("url: https://test\noutputs:\n  id: \"$.id\""),
            &parent_flow(&rt),
        );

        assert!(step.execute(&rt));
        assert!(step.output("id").is_none());
    }

    #[test]
    fn test_unresolved_reference_fails_without_retry() {
        let rt = runtime(&[200], "{}");
        let mut step = Step::new(
            "name",
            definition(
                "url: \"https://{? missing ?}\"\nwait_for_success:\n  attempt: 5\n  delay: 0",
            ),
            &parent_flow(&rt),
        );

        assert!(!step.execute(&rt));
    }
}

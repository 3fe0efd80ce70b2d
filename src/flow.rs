//! Flow loading and execution.

use indexmap::IndexMap;
use serde_json::Value;
use tracing::{error, info};

use crate::context::{flow_store, resolve_path, Context, ContextRef};
use crate::error::Result;
use crate::namespace::{downgrade, Entry};
use crate::profile;
use crate::runtime::Runtime;
use crate::step::Step;
use crate::template::stringify;
use crate::yaml::{self, FlowDefinition};

/// One execution of a named flow definition.
///
/// A flow is loaded from `<flow_path>/<name>.yaml` and is a scope of its
/// own: profile overlays and caller-supplied variables become its locals,
/// and every executed step registers itself on it under the step name.
/// Dependency flows run first, as fresh child flows, so their steps are
/// reachable as `<dependency_flow>.<step>.<output>`.
pub struct Flow {
    name: String,
    description: String,
    dependencies: Vec<String>,
    definition: FlowDefinition,
    ctx: ContextRef,
    dependencies_succeeded: Option<bool>,
    steps_succeeded: Option<bool>,
    succeeded: bool,
}

impl Flow {
    /// Load a flow definition and register its scope on the flow store
    /// and, when given, the parent flow.
    ///
    /// Caller-supplied `vars` become locals first, then profile overlays
    /// are merged on top (last profile wins).
    pub fn load(
        runtime: &Runtime,
        flow_name: &str,
        profiles: &[String],
        parent: Option<ContextRef>,
        vars: IndexMap<String, Value>,
    ) -> Result<Self> {
        let globals = runtime.globals().clone();
        let ctx = match &parent {
            Some(parent) => Context::with_parent(globals.clone(), parent.clone()),
            None => Context::new(globals.clone()),
        }
        .into_ref();

        for (name, value) in vars {
            ctx.borrow_mut().set(name, value);
        }
        if !profiles.is_empty() {
            let overlay = profile::load(runtime.config(), profiles)?;
            ctx.borrow_mut().merge(overlay);
        }

        let path = runtime.config().flow_path().join(format!("{flow_name}.yaml"));
        let definition = yaml::load_flow_definition(&path)?;
        let description = definition
            .description
            .clone()
            .unwrap_or_else(|| flow_name.to_string());
        let dependencies = definition.depends_on.names();

        {
            let mut scope = ctx.borrow_mut();
            scope.set("flow_name", Value::String(flow_name.to_string()));
            scope.set("flow_description", Value::String(description.clone()));
            scope.set("succeeded", Value::Bool(false));
        }
        flow_store(&globals)
            .borrow_mut()
            .set_entry(flow_name, Entry::Context(ctx.clone()));
        if let Some(parent) = &parent {
            parent
                .borrow_mut()
                .set_entry(flow_name, Entry::Context(ctx.clone()));
        }

        Ok(Self {
            name: flow_name.to_string(),
            description,
            dependencies,
            definition,
            ctx,
            dependencies_succeeded: None,
            steps_succeeded: None,
            succeeded: false,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn context(&self) -> &ContextRef {
        &self.ctx
    }

    pub fn succeeded(&self) -> bool {
        self.succeeded
    }

    pub fn dependencies_succeeded(&self) -> Option<bool> {
        self.dependencies_succeeded
    }

    pub fn steps_succeeded(&self) -> Option<bool> {
        self.steps_succeeded
    }

    /// Resolve a dotted/indexed path against this flow's scope, e.g.
    /// `create.user_id` or `prerequisite_flow.prerequisite_step.id`.
    pub fn lookup(&self, path: &str) -> Result<Value> {
        resolve_path(&self.ctx, path).map(|entry| downgrade(&entry))
    }

    /// Execute dependencies, then steps, and publish the outcome.
    /// Never panics; the result is the aggregate success boolean.
    pub fn execute(&mut self, runtime: &Runtime) -> bool {
        info!(flow = %self.description, "executing flow");
        let store = flow_store(runtime.globals());
        store
            .borrow_mut()
            .set_entry("current_flow", Entry::Context(self.ctx.clone()));

        let dependencies_succeeded = self.execute_dependencies(runtime);
        let steps_succeeded = self.execute_steps(runtime);
        self.succeeded = dependencies_succeeded && steps_succeeded;
        self.ctx
            .borrow_mut()
            .set("succeeded", Value::Bool(self.succeeded));

        if self.succeeded {
            let mut store = store.borrow_mut();
            store.set_entry("previous_flow", Entry::Context(self.ctx.clone()));
            store.set("current_flow", Value::Null);
            info!(flow = %self.description, "flow succeeded");
        } else {
            let flow_name = tracker_field(&store, "current_flow", "flow_name");
            let step_name = tracker_field(&store, "current_step", "step_name");
            error!(flow = %flow_name, step = %step_name, "flow failed");
        }
        self.succeeded
    }

    /// Run every dependency flow, memoized across calls. The fold keeps a
    /// plain AND accumulator and never exits early: every dependency
    /// executes even after an earlier one fails.
    fn execute_dependencies(&mut self, runtime: &Runtime) -> bool {
        if let Some(done) = self.dependencies_succeeded {
            return done;
        }
        let succeeded = if self.dependencies.is_empty() {
            true
        } else {
            info!(flow = %self.description, "executing prerequisites");
            let loaded: Result<Vec<Flow>> = self
                .dependencies
                .iter()
                .map(|name| {
                    Flow::load(
                        runtime,
                        name,
                        &[],
                        Some(self.ctx.clone()),
                        IndexMap::new(),
                    )
                })
                .collect();
            let succeeded = match loaded {
                Ok(mut flows) => flows.iter_mut().fold(true, |acc, flow| {
                    let ok = flow.execute(runtime);
                    acc && ok
                }),
                Err(e) => {
                    error!(flow = %self.description, error = %e, "cannot load prerequisite flow");
                    false
                }
            };
            if succeeded {
                flow_store(runtime.globals())
                    .borrow_mut()
                    .set_entry("current_flow", Entry::Context(self.ctx.clone()));
            }
            succeeded
        };
        self.dependencies_succeeded = Some(succeeded);
        succeeded
    }

    /// Run every step in declared order, memoized across calls. Same
    /// non-short-circuiting AND fold as the dependencies.
    fn execute_steps(&mut self, runtime: &Runtime) -> bool {
        if let Some(done) = self.steps_succeeded {
            return done;
        }
        let succeeded = if self.definition.steps.is_empty() {
            true
        } else {
            info!(flow = %self.description, "executing steps");
            let mut steps: Vec<Step> = self
                .definition
                .steps
                .iter()
                .map(|(name, definition)| Step::new(name.clone(), definition.clone(), &self.ctx))
                .collect();
            steps.iter_mut().fold(true, |acc, step| {
                let ok = step.execute(runtime);
                acc && ok
            })
        };
        self.steps_succeeded = Some(succeeded);
        succeeded
    }
}

/// Best-effort name of the flow or step a tracker points at.
fn tracker_field(store: &ContextRef, tracker: &str, field: &str) -> String {
    if let Some(Entry::Context(ctx)) = store.borrow().get_local(tracker) {
        if let Ok(entry) = ctx.borrow().resolve(field) {
            return stringify(&downgrade(&entry));
        }
    }
    "unknown".to_string()
}

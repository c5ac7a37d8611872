//! Per-request options.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use keepforge_core::{KeepForgeError, Metric, ObjectId, Priority, SolverId, Value};

use crate::engine::Engine;

/// Handler receiving recoverable failures after the triggering call unwound.
pub type ErrorHandler = Rc<dyn Fn(&mut Engine, &[KeepForgeError])>;

/// Options recognized by `always`, `once` and `stay`.
///
/// Every option left unset falls back to the engine's [`EngineConfig`].
///
/// [`EngineConfig`]: keepforge_config::EngineConfig
#[derive(Clone, Default)]
pub struct ConstraintOptions {
    /// Explicit solver; skips candidate comparison.
    pub solver: Option<SolverId>,
    /// Names visible to the predicate.
    pub ctx: BTreeMap<String, Value>,
    pub priority: Option<Priority>,
    /// Accept predicates that already evaluate to `true` natively.
    pub allow_tests: bool,
    /// Fold operations the solver cannot express instead of failing.
    pub allow_unsolvable_operations: bool,
    pub on_error: Option<ErrorHandler>,
    pub log_timings: Option<bool>,
    pub log_reasons: Option<bool>,
    pub reevaluation_interval: Option<u32>,
    pub optimization_priority: Option<Vec<Metric>>,
    /// Build and select, but leave the winner disabled.
    pub postpone_enabling: bool,
    /// Require solvers supporting one-way formula methods.
    pub methods: bool,
}

impl fmt::Debug for ConstraintOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConstraintOptions")
            .field("solver", &self.solver)
            .field("ctx", &self.ctx)
            .field("priority", &self.priority)
            .field("allow_tests", &self.allow_tests)
            .field("allow_unsolvable_operations", &self.allow_unsolvable_operations)
            .field("on_error", &self.on_error.is_some())
            .field("log_timings", &self.log_timings)
            .field("log_reasons", &self.log_reasons)
            .field("reevaluation_interval", &self.reevaluation_interval)
            .field("optimization_priority", &self.optimization_priority)
            .field("postpone_enabling", &self.postpone_enabling)
            .field("methods", &self.methods)
            .finish()
    }
}

impl ConstraintOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_solver(mut self, solver: SolverId) -> Self {
        self.solver = Some(solver);
        self
    }

    /// Binds `name` to a value for the predicate.
    pub fn bind(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.ctx.insert(name.into(), value.into());
        self
    }

    /// Binds `name` to a host object.
    pub fn bind_object(self, name: impl Into<String>, obj: ObjectId) -> Self {
        self.bind(name, Value::Object(obj))
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn allow_tests(mut self) -> Self {
        self.allow_tests = true;
        self
    }

    pub fn allow_unsolvable_operations(mut self) -> Self {
        self.allow_unsolvable_operations = true;
        self
    }

    pub fn on_error<F>(mut self, handler: F) -> Self
    where
        F: Fn(&mut Engine, &[KeepForgeError]) + 'static,
    {
        self.on_error = Some(Rc::new(handler));
        self
    }

    pub fn with_log_timings(mut self, enabled: bool) -> Self {
        self.log_timings = Some(enabled);
        self
    }

    pub fn with_log_reasons(mut self, enabled: bool) -> Self {
        self.log_reasons = Some(enabled);
        self
    }

    pub fn with_reevaluation_interval(mut self, interval: u32) -> Self {
        self.reevaluation_interval = Some(interval);
        self
    }

    pub fn with_optimization_priority(mut self, metrics: Vec<Metric>) -> Self {
        self.optimization_priority = Some(metrics);
        self
    }

    pub fn postpone_enabling(mut self) -> Self {
        self.postpone_enabling = true;
        self
    }

    pub fn with_methods(mut self) -> Self {
        self.methods = true;
        self
    }
}

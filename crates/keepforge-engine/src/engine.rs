//! The engine: host heap, solver registry and the variable and constraint
//! arenas.

use std::collections::VecDeque;
use std::rc::Rc;

use keepforge_config::EngineConfig;
use keepforge_core::{
    ConstraintId, KeepForgeError, ObjectId, Result, Solver, SolverId, SolverStats, Value, VarId,
};
use tracing::debug;

use crate::callbacks::Callback;
use crate::constraint::Constraint;
use crate::evaluator::{ExprEvaluator, PredicateEvaluator};
use crate::guard::Guards;
use crate::heap::{Heap, SetterHook, Slot};
use crate::variable::{ConstrainedVariable, Origin};

/// Pending dependent-accessor call: `(receiver, field, hook)`.
pub(crate) type PendingSetter = (ObjectId, String, SetterHook);

/// Single-threaded constraint-maintenance runtime.
///
/// Owns the host objects, every constrained variable and constraint, and
/// the registered solvers. All operations run synchronously on the caller's
/// thread.
///
/// # Example
///
/// ```
/// use keepforge_engine::{ConstraintOptions, Engine};
/// use keepforge_core::{Expr, Value};
/// use keepforge_solvers::RelaxSolver;
///
/// let mut engine = Engine::default();
/// let relax = engine.add_solver(Box::new(RelaxSolver::new()));
/// let obj = engine.object([("a", Value::Number(8.0))]);
///
/// let options = ConstraintOptions::new().with_solver(relax).bind_object("obj", obj);
/// engine.always(options, Expr::name("obj").get("a").ge(100.0)).unwrap();
/// assert_eq!(engine.get(obj, "a").unwrap(), Value::Number(100.0));
/// ```
pub struct Engine {
    pub(crate) config: EngineConfig,
    pub(crate) heap: Heap,
    pub(crate) vars: Vec<Option<ConstrainedVariable>>,
    pub(crate) constraints: Vec<Option<Constraint>>,
    pub(crate) solvers: Vec<Box<dyn Solver>>,
    pub(crate) default_solvers: Vec<SolverId>,
    pub(crate) default_solver: Option<SolverId>,
    pub(crate) evaluator: Rc<dyn PredicateEvaluator>,
    pub(crate) guards: Guards,
    pub(crate) callbacks: VecDeque<Callback>,
    pub(crate) pending_setters: Option<Vec<PendingSetter>>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("objects", &self.heap)
            .field("variables", &self.vars.iter().flatten().count())
            .field("constraints", &self.constraints.iter().flatten().count())
            .field("solvers", &self.solvers)
            .finish()
    }
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            heap: Heap::default(),
            vars: Vec::new(),
            constraints: Vec::new(),
            solvers: Vec::new(),
            default_solvers: Vec::new(),
            default_solver: None,
            evaluator: Rc::new(ExprEvaluator),
            guards: Guards::default(),
            callbacks: VecDeque::new(),
            pending_setters: None,
        }
    }

    /// Replaces the predicate evaluator.
    pub fn with_evaluator(mut self, evaluator: Rc<dyn PredicateEvaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ---- solver registry ----

    /// Registers a solver and appends it to the default solver list.
    pub fn add_solver(&mut self, solver: Box<dyn Solver>) -> SolverId {
        let id = self.register_solver(solver);
        self.default_solvers.push(id);
        id
    }

    /// Registers a solver without making it a default candidate.
    pub fn register_solver(&mut self, solver: Box<dyn Solver>) -> SolverId {
        let id = SolverId(self.solvers.len());
        debug!(solver = solver.name(), %id, "registered solver");
        self.solvers.push(solver);
        id
    }

    /// Sets the ordered candidate list used when a request names no solver.
    pub fn set_default_solvers(&mut self, solvers: Vec<SolverId>) {
        self.default_solvers = solvers;
    }

    pub fn default_solvers(&self) -> &[SolverId] {
        &self.default_solvers
    }

    /// Sets a process-wide solver that overrides the default list.
    pub fn set_default_solver(&mut self, solver: Option<SolverId>) {
        self.default_solver = solver;
    }

    pub fn solver(&self, id: SolverId) -> Result<&dyn Solver> {
        self.solvers
            .get(id.index())
            .map(|s| s.as_ref())
            .ok_or(KeepForgeError::UnknownSolver(id))
    }

    pub(crate) fn solver_mut(&mut self, id: SolverId) -> Result<&mut dyn Solver> {
        match self.solvers.get_mut(id.index()) {
            Some(solver) => Ok(solver.as_mut()),
            None => Err(KeepForgeError::UnknownSolver(id)),
        }
    }

    pub fn solver_by_name(&self, name: &str) -> Option<SolverId> {
        self.solvers
            .iter()
            .position(|s| s.name() == name)
            .map(SolverId)
    }

    pub(crate) fn solver_name(&self, id: SolverId) -> String {
        self.solver(id)
            .map(|s| s.name().to_string())
            .unwrap_or_else(|_| id.to_string())
    }

    pub fn solver_stats(&self, id: SolverId) -> Result<SolverStats> {
        Ok(self.solver(id)?.stats())
    }

    /// Changes a solver's tie-break weight.
    pub fn set_solver_weight(&mut self, id: SolverId, weight: f64) -> Result<()> {
        self.solver_mut(id)?.set_weight(weight);
        self.guards.tick();
        Ok(())
    }

    // ---- host objects ----

    /// Allocates a host object with the given fields.
    pub fn object<I, K>(&mut self, fields: I) -> ObjectId
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        self.heap.insert(fields)
    }

    /// Reads a field. Constrained fields report their maintained value.
    pub fn get(&self, obj: ObjectId, field: &str) -> Result<Value> {
        match self.heap.slot(obj, field)? {
            Slot::Plain(value) => Ok(value.clone()),
            Slot::Intercepted(var) => Ok(self.read_var(*var)),
        }
    }

    /// Writes a field. Writes to constrained fields are solved and
    /// propagated before this returns; a failed write leaves the field
    /// unchanged and reports the failure (or hands it to `on_error`).
    pub fn set(&mut self, obj: ObjectId, field: &str, value: impl Into<Value>) -> Result<Value> {
        let value = value.into();
        match self.heap.slot_or_insert(obj, field)? {
            Slot::Plain(_) => {
                self.heap.set_slot(obj, field, Slot::Plain(value.clone()))?;
                Ok(value)
            }
            Slot::Intercepted(var) => self.top_level(|engine| {
                engine.suggest_value(var, value, Origin::Source, false)
            }),
        }
    }

    /// Registers the accessor hook for `(obj, field)`. It runs once per
    /// write that changed a variable reached through this field.
    pub fn define_setter<F>(&mut self, obj: ObjectId, field: &str, hook: F) -> Result<()>
    where
        F: Fn(&mut Engine, ObjectId, &Value) + 'static,
    {
        self.heap.define_setter(obj, field, Rc::new(hook))
    }

    pub fn field_names(&self, obj: ObjectId) -> Result<Vec<String>> {
        self.heap.field_names(obj)
    }

    /// Returns true if `(obj, field)` is currently intercepted.
    pub fn is_constrained(&self, obj: ObjectId, field: &str) -> bool {
        self.variable_of(obj, field).is_some()
    }

    // ---- arenas ----

    /// The variable intercepting `(obj, field)`, if any.
    pub fn variable_of(&self, obj: ObjectId, field: &str) -> Option<VarId> {
        match self.heap.slot(obj, field) {
            Ok(Slot::Intercepted(var)) => Some(*var),
            _ => None,
        }
    }

    pub fn variable(&self, var: VarId) -> Option<&ConstrainedVariable> {
        self.vars.get(var.index()).and_then(Option::as_ref)
    }

    pub(crate) fn variable_mut(&mut self, var: VarId) -> Option<&mut ConstrainedVariable> {
        self.vars.get_mut(var.index()).and_then(Option::as_mut)
    }

    pub(crate) fn expect_variable(&self, var: VarId) -> Result<&ConstrainedVariable> {
        self.variable(var)
            .ok_or_else(|| KeepForgeError::TypeMismatch(format!("{var} is no longer constrained")))
    }

    pub fn constraint(&self, id: ConstraintId) -> Result<&Constraint> {
        self.constraints
            .get(id.index())
            .and_then(Option::as_ref)
            .ok_or(KeepForgeError::UnknownConstraint(id))
    }

    pub(crate) fn constraint_mut(&mut self, id: ConstraintId) -> Result<&mut Constraint> {
        self.constraints
            .get_mut(id.index())
            .and_then(Option::as_mut)
            .ok_or(KeepForgeError::UnknownConstraint(id))
    }

    /// Ids of every live constraint.
    pub fn constraint_ids(&self) -> Vec<ConstraintId> {
        self.constraints
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_some())
            .map(|(i, _)| ConstraintId(i))
            .collect()
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;

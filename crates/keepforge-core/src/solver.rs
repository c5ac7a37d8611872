//! The contract every pluggable constraint algorithm implements.
//!
//! The engine never looks inside a solver. It creates one external variable
//! per field it wants the solver to see ([`Solver::variable_for`]), hands over
//! compiled predicates as [`Term`]s, toggles the resulting primitive
//! constraints and asks the solver to [`solve`](Solver::solve).
//!
//! The per-variable operations (`value`, `suggest_value`, `set_readonly`,
//! `stay`) are the external-variable contract; they are keyed by the
//! solver-private [`ExtVarHandle`] instead of living on a separate object, so
//! the solver keeps sole ownership of its model.

use std::fmt::Debug;

use crate::error::SolverError;
use crate::ids::{ExtVarHandle, PrimitiveHandle};
use crate::ops::Op;
use crate::priority::Priority;
use crate::term::Term;
use crate::value::{TypeTag, Value};

/// Static capabilities used to filter candidate solvers before construction.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Capabilities {
    /// One-way formula methods.
    pub methods: bool,
    /// Non-required priorities.
    pub soft_constraints: bool,
    /// Finite domain restrictions (`in_domain`).
    pub finite_domains: bool,
    /// Batched edit sessions (`begin_edit`/`resolve_array`/`end_edit`).
    pub edit: bool,
    /// Data types the solver can represent as variables.
    pub data_types: Vec<TypeTag>,
}

impl Capabilities {
    pub fn supports_type(&self, tag: TypeTag) -> bool {
        self.data_types.contains(&tag)
    }
}

/// Counters exposed by solvers for observability.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SolverStats {
    /// Number of `solve()` runs, including those triggered by suggestions.
    pub solve_calls: u64,
    /// Number of constraints the solver constructed, including the
    /// temporary ones it builds to absorb a suggested value.
    pub constraint_constructions: u64,
}

/// One concrete constraint algorithm.
pub trait Solver: Debug {
    /// Human-readable solver name used in logs and errors.
    fn name(&self) -> &str;

    /// Tie-break weight when several solvers define the same field.
    fn weight(&self) -> f64;

    fn set_weight(&mut self, weight: f64);

    fn capabilities(&self) -> Capabilities;

    /// Returns true if `op` can be applied to solver-aware operands.
    fn supports_operation(&self, op: Op) -> bool;

    /// Suggests a supported operation to use instead of `op`.
    fn alternative_operation_for(&self, _op: Op) -> Option<Op> {
        None
    }

    /// Attempts to represent `value`. `None` means the solver declines it.
    fn variable_for(&mut self, value: &Value, field_name: &str) -> Option<ExtVarHandle>;

    /// Forgets a variable the engine no longer binds to any field.
    fn remove_variable(&mut self, _var: ExtVarHandle) {}

    /// Compiles a relation term into a (disabled) primitive constraint.
    fn compile(&mut self, term: &Term) -> Result<PrimitiveHandle, SolverError>;

    /// Compiles "`var` keeps `value`" into a (disabled) primitive constraint.
    fn identical(&mut self, var: ExtVarHandle, value: &Value)
        -> Result<PrimitiveHandle, SolverError>;

    fn enable_primitive(
        &mut self,
        primitive: PrimitiveHandle,
        priority: Priority,
    ) -> Result<(), SolverError>;

    fn disable_primitive(&mut self, primitive: PrimitiveHandle) -> Result<(), SolverError>;

    /// Drops a primitive for good.
    fn remove_primitive(&mut self, primitive: PrimitiveHandle);

    /// Re-derives values for all enabled primitive constraints.
    fn solve(&mut self) -> Result<(), SolverError>;

    fn value(&self, var: ExtVarHandle) -> Value;

    /// Asks the solver to adopt `value` for `var` and re-solve around it.
    /// On failure the solver must leave its variables unchanged.
    fn suggest_value(&mut self, var: ExtVarHandle, value: &Value) -> Result<(), SolverError>;

    fn is_readonly(&self, var: ExtVarHandle) -> bool;

    fn set_readonly(&mut self, var: ExtVarHandle, readonly: bool);

    /// Adds a soft preference that `var` keeps its current value.
    fn stay(&mut self, var: ExtVarHandle, priority: Priority) -> Result<(), SolverError>;

    fn remove_stay(&mut self, var: ExtVarHandle);

    /// Prepares one variable for an upcoming edit session.
    fn prepare_edit(&mut self, _var: ExtVarHandle) {}

    /// Releases one variable after its edit session closed.
    fn finish_edit(&mut self, _var: ExtVarHandle) {}

    /// Opens an edit session over `vars`.
    fn begin_edit(&mut self, _vars: &[ExtVarHandle]) -> Result<(), SolverError> {
        Err(SolverError::Unsupported(format!(
            "{} has no edit sessions",
            self.name()
        )))
    }

    /// Pushes one batch of values (in `begin_edit` order) and re-solves.
    fn resolve_array(&mut self, _values: &[Value]) -> Result<(), SolverError> {
        Err(SolverError::Unsupported(format!(
            "{} has no edit sessions",
            self.name()
        )))
    }

    /// Closes the current edit session.
    fn end_edit(&mut self) -> Result<(), SolverError> {
        Ok(())
    }

    fn stats(&self) -> SolverStats {
        SolverStats::default()
    }
}

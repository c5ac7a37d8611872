//! Solver wrapper with a forced delay.
//!
//! Sleeps before every `solve` and `suggest_value`, so the time metric of
//! solver selection becomes predictable.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use keepforge_core::{Solver, Value};
//! use keepforge_test::DelayedSolver;
//! # use keepforge_test::StubSolver;
//!
//! let solver = DelayedSolver::new("slow", Box::new(StubSolver::numeric("inner")), Duration::from_millis(1));
//! let delay = solver.delay_handle();
//! delay.set(Duration::ZERO);
//! assert_eq!(solver.name(), "slow");
//! ```

use std::cell::Cell;
use std::rc::Rc;
use std::thread;
use std::time::Duration;

use keepforge_core::{
    Capabilities, ExtVarHandle, Op, Priority, PrimitiveHandle, Solver, SolverError, SolverStats,
    Term, Value,
};

/// Forwards every call to the wrapped solver, sleeping first in the
/// solving calls.
#[derive(Debug)]
pub struct DelayedSolver {
    name: String,
    inner: Box<dyn Solver>,
    delay: Rc<Cell<Duration>>,
}

impl DelayedSolver {
    pub fn new(name: impl Into<String>, inner: Box<dyn Solver>, delay: Duration) -> Self {
        Self {
            name: name.into(),
            inner,
            delay: Rc::new(Cell::new(delay)),
        }
    }

    /// Shared handle to change the delay after the solver was registered.
    pub fn delay_handle(&self) -> Rc<Cell<Duration>> {
        self.delay.clone()
    }

    fn pause(&self) {
        let delay = self.delay.get();
        if !delay.is_zero() {
            thread::sleep(delay);
        }
    }
}

impl Solver for DelayedSolver {
    fn name(&self) -> &str {
        &self.name
    }

    fn weight(&self) -> f64 {
        self.inner.weight()
    }

    fn set_weight(&mut self, weight: f64) {
        self.inner.set_weight(weight);
    }

    fn capabilities(&self) -> Capabilities {
        self.inner.capabilities()
    }

    fn supports_operation(&self, op: Op) -> bool {
        self.inner.supports_operation(op)
    }

    fn alternative_operation_for(&self, op: Op) -> Option<Op> {
        self.inner.alternative_operation_for(op)
    }

    fn variable_for(&mut self, value: &Value, field_name: &str) -> Option<ExtVarHandle> {
        self.inner.variable_for(value, field_name)
    }

    fn remove_variable(&mut self, var: ExtVarHandle) {
        self.inner.remove_variable(var);
    }

    fn compile(&mut self, term: &Term) -> Result<PrimitiveHandle, SolverError> {
        self.inner.compile(term)
    }

    fn identical(&mut self, var: ExtVarHandle, value: &Value) -> Result<PrimitiveHandle, SolverError> {
        self.inner.identical(var, value)
    }

    fn enable_primitive(
        &mut self,
        primitive: PrimitiveHandle,
        priority: Priority,
    ) -> Result<(), SolverError> {
        self.inner.enable_primitive(primitive, priority)
    }

    fn disable_primitive(&mut self, primitive: PrimitiveHandle) -> Result<(), SolverError> {
        self.inner.disable_primitive(primitive)
    }

    fn remove_primitive(&mut self, primitive: PrimitiveHandle) {
        self.inner.remove_primitive(primitive);
    }

    fn solve(&mut self) -> Result<(), SolverError> {
        self.pause();
        self.inner.solve()
    }

    fn value(&self, var: ExtVarHandle) -> Value {
        self.inner.value(var)
    }

    fn suggest_value(&mut self, var: ExtVarHandle, value: &Value) -> Result<(), SolverError> {
        self.pause();
        self.inner.suggest_value(var, value)
    }

    fn is_readonly(&self, var: ExtVarHandle) -> bool {
        self.inner.is_readonly(var)
    }

    fn set_readonly(&mut self, var: ExtVarHandle, readonly: bool) {
        self.inner.set_readonly(var, readonly);
    }

    fn stay(&mut self, var: ExtVarHandle, priority: Priority) -> Result<(), SolverError> {
        self.inner.stay(var, priority)
    }

    fn remove_stay(&mut self, var: ExtVarHandle) {
        self.inner.remove_stay(var);
    }

    fn prepare_edit(&mut self, var: ExtVarHandle) {
        self.inner.prepare_edit(var);
    }

    fn finish_edit(&mut self, var: ExtVarHandle) {
        self.inner.finish_edit(var);
    }

    fn begin_edit(&mut self, vars: &[ExtVarHandle]) -> Result<(), SolverError> {
        self.inner.begin_edit(vars)
    }

    fn resolve_array(&mut self, values: &[Value]) -> Result<(), SolverError> {
        self.pause();
        self.inner.resolve_array(values)
    }

    fn end_edit(&mut self) -> Result<(), SolverError> {
        self.inner.end_edit()
    }

    fn stats(&self) -> SolverStats {
        self.inner.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StubSolver;
    use std::time::Instant;

    #[test]
    fn test_solve_sleeps_for_current_delay() {
        let mut solver = DelayedSolver::new(
            "slow",
            Box::new(StubSolver::numeric("inner")),
            Duration::from_millis(5),
        );
        let started = Instant::now();
        solver.solve().unwrap();
        assert!(started.elapsed() >= Duration::from_millis(5));

        solver.delay_handle().set(Duration::ZERO);
        let started = Instant::now();
        solver.solve().unwrap();
        assert!(started.elapsed() < Duration::from_millis(5));
    }

    #[test]
    fn test_forwards_to_inner() {
        let mut solver = DelayedSolver::new(
            "slow",
            Box::new(StubSolver::numeric("inner")),
            Duration::ZERO,
        );
        let var = solver.variable_for(&Value::Number(1.0), "a").unwrap();
        assert_eq!(solver.value(var), Value::Number(1.0));
        assert_eq!(solver.name(), "slow");
        assert_eq!(solver.stats().solve_calls, 0);
    }
}

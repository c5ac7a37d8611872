//! A solver that only declares capabilities.
//!
//! Useful to check capability filtering: a filtered-out stub is never asked
//! to compile, and a kept one fails every compile unless told otherwise.

use std::cell::Cell;
use std::rc::Rc;

use keepforge_core::{
    Capabilities, ExtVarHandle, Op, Priority, PrimitiveHandle, Solver, SolverError, Term, TypeTag,
    Value,
};

#[derive(Debug)]
pub struct StubSolver {
    name: String,
    weight: f64,
    capabilities: Capabilities,
    accept_compile: bool,
    values: Vec<Value>,
    readonly: Vec<bool>,
    primitives: usize,
    compile_attempts: Rc<Cell<usize>>,
}

impl StubSolver {
    pub fn new(name: impl Into<String>, capabilities: Capabilities) -> Self {
        Self {
            name: name.into(),
            weight: 10.0,
            capabilities,
            accept_compile: false,
            values: Vec::new(),
            readonly: Vec::new(),
            primitives: 0,
            compile_attempts: Rc::new(Cell::new(0)),
        }
    }

    /// A stub claiming number support and nothing else.
    pub fn numeric(name: impl Into<String>) -> Self {
        Self::new(
            name,
            Capabilities {
                data_types: vec![TypeTag::Number],
                ..Capabilities::default()
            },
        )
    }

    /// Makes `compile` hand out primitives that hold trivially.
    pub fn accepting(mut self) -> Self {
        self.accept_compile = true;
        self
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    /// Shared counter of `compile` calls, readable after the stub moved
    /// into an engine.
    pub fn compile_attempts(&self) -> Rc<Cell<usize>> {
        self.compile_attempts.clone()
    }

    fn slot(&self, var: ExtVarHandle) -> Result<(), SolverError> {
        if var.index() < self.values.len() {
            Ok(())
        } else {
            Err(SolverError::UnknownVariable(var))
        }
    }

    fn next_primitive(&mut self) -> PrimitiveHandle {
        self.primitives += 1;
        PrimitiveHandle(self.primitives - 1)
    }
}

impl Solver for StubSolver {
    fn name(&self) -> &str {
        &self.name
    }

    fn weight(&self) -> f64 {
        self.weight
    }

    fn set_weight(&mut self, weight: f64) {
        self.weight = weight;
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities.clone()
    }

    fn supports_operation(&self, _op: Op) -> bool {
        true
    }

    fn variable_for(&mut self, value: &Value, _field_name: &str) -> Option<ExtVarHandle> {
        if !self.capabilities.supports_type(value.type_tag()) {
            return None;
        }
        self.values.push(value.clone());
        self.readonly.push(false);
        Some(ExtVarHandle(self.values.len() - 1))
    }

    fn compile(&mut self, term: &Term) -> Result<PrimitiveHandle, SolverError> {
        self.compile_attempts.set(self.compile_attempts.get() + 1);
        if self.accept_compile {
            Ok(self.next_primitive())
        } else {
            Err(SolverError::Unsupported(format!(
                "{} cannot compile `{term}`",
                self.name
            )))
        }
    }

    fn identical(&mut self, var: ExtVarHandle, _value: &Value) -> Result<PrimitiveHandle, SolverError> {
        self.slot(var)?;
        Ok(self.next_primitive())
    }

    fn enable_primitive(
        &mut self,
        _primitive: PrimitiveHandle,
        _priority: Priority,
    ) -> Result<(), SolverError> {
        Ok(())
    }

    fn disable_primitive(&mut self, _primitive: PrimitiveHandle) -> Result<(), SolverError> {
        Ok(())
    }

    fn remove_primitive(&mut self, _primitive: PrimitiveHandle) {}

    fn solve(&mut self) -> Result<(), SolverError> {
        Ok(())
    }

    fn value(&self, var: ExtVarHandle) -> Value {
        self.values.get(var.index()).cloned().unwrap_or_default()
    }

    fn suggest_value(&mut self, var: ExtVarHandle, value: &Value) -> Result<(), SolverError> {
        self.slot(var)?;
        self.values[var.index()] = value.clone();
        Ok(())
    }

    fn is_readonly(&self, var: ExtVarHandle) -> bool {
        self.readonly.get(var.index()).copied().unwrap_or(false)
    }

    fn set_readonly(&mut self, var: ExtVarHandle, readonly: bool) {
        if let Some(flag) = self.readonly.get_mut(var.index()) {
            *flag = readonly;
        }
    }

    fn stay(&mut self, var: ExtVarHandle, _priority: Priority) -> Result<(), SolverError> {
        self.slot(var)
    }

    fn remove_stay(&mut self, _var: ExtVarHandle) {}
}

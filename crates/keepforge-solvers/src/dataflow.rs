//! Local-propagation planner for linear equalities.
//!
//! Each equation is satisfied by computing exactly one of its variables
//! (the output) from the others. Suggested, read-only and edited variables
//! are never chosen as outputs; among the remaining candidates the planner
//! picks the one with the weakest stay preference. Every suggestion builds a
//! temporary edit constraint; an edit session builds one up front and
//! reuses it for every batch.

use std::cmp::Reverse;
use std::collections::BTreeSet;

use keepforge_core::{
    values_equal, Capabilities, ExtVarHandle, Op, Priority, PrimitiveHandle, Solver, SolverError,
    SolverStats, Term, TypeTag, Value,
};
use smallvec::SmallVec;
use tracing::trace;

use crate::linear::{relations, LinearForm, Relation};
use crate::store::{PrimitiveStore, VariableStore};

const TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone)]
enum DataflowPrimitive {
    Equations(Vec<LinearForm>),
    Identical { var: ExtVarHandle, value: f64 },
}

/// Planner solver supporting edit sessions and stay preferences.
#[derive(Debug)]
pub struct DataflowSolver {
    name: String,
    weight: f64,
    vars: VariableStore,
    primitives: PrimitiveStore<DataflowPrimitive>,
    editing: Option<Vec<ExtVarHandle>>,
    stats: SolverStats,
}

impl Default for DataflowSolver {
    fn default() -> Self {
        Self::new()
    }
}

impl DataflowSolver {
    pub fn new() -> Self {
        Self {
            name: "dataflow".to_string(),
            weight: 200.0,
            vars: VariableStore::new(),
            primitives: PrimitiveStore::default(),
            editing: None,
            stats: SolverStats::default(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Returns true while an edit session is open.
    pub fn is_editing(&self) -> bool {
        self.editing.is_some()
    }

    fn number(value: &Value) -> Result<f64, SolverError> {
        value.as_number().ok_or_else(|| {
            SolverError::Unsupported(format!("dataflow only handles numbers, got {value}"))
        })
    }

    fn stay_rank(&self, var: ExtVarHandle) -> u8 {
        match self.vars.get(var).ok().and_then(|s| s.stay) {
            None => 0,
            Some(Priority::Weak) => 1,
            Some(Priority::Medium) => 2,
            Some(Priority::Strong) => 3,
            Some(Priority::Required) => 4,
        }
    }

    /// Plans and executes one propagation pass with `fixed` as inputs.
    fn propagate(&mut self, fixed: &BTreeSet<ExtVarHandle>) -> Result<(), SolverError> {
        let mut equations: Vec<LinearForm> = Vec::new();
        let mut determined = fixed.clone();
        let mut starts: Vec<(ExtVarHandle, f64, bool)> = Vec::new();

        for (primitive, priority) in self.primitives.enabled() {
            match primitive {
                DataflowPrimitive::Equations(forms) => equations.extend(forms.iter().cloned()),
                DataflowPrimitive::Identical { var, value } => {
                    starts.push((*var, *value, priority.is_required()));
                }
            }
        }
        for (var, value, required) in starts {
            if fixed.contains(&var) || self.vars.is_readonly(var) {
                if required && !values_equal(&self.vars.value(var), &Value::Number(value)) {
                    return Err(SolverError::Unsatisfiable(format!(
                        "{var} cannot keep {value}"
                    )));
                }
                continue;
            }
            self.vars.get_mut(var)?.value = Value::Number(value);
            if required {
                determined.insert(var);
            }
        }
        for form in &equations {
            for var in form.coefficients.keys() {
                if self.vars.is_readonly(*var) {
                    determined.insert(*var);
                }
            }
        }

        let mut pending: Vec<&LinearForm> = equations.iter().collect();
        while !pending.is_empty() {
            let mut progress = false;
            let mut i = 0;
            while i < pending.len() {
                let form = pending[i];
                let open: SmallVec<[ExtVarHandle; 4]> = form
                    .coefficients
                    .keys()
                    .filter(|v| !determined.contains(*v))
                    .copied()
                    .collect();
                match open.as_slice() {
                    [] => {
                        let residual = form.evaluate(|v| self.vars.number(v));
                        if residual.abs() > TOLERANCE {
                            return Err(SolverError::Unsatisfiable(format!(
                                "equation violated by {residual} with every input determined"
                            )));
                        }
                        pending.remove(i);
                        progress = true;
                    }
                    [output] => {
                        let output = *output;
                        let coefficient = form.coefficients[&output];
                        let rest = form.evaluate(|v| if v == output { 0.0 } else { self.vars.number(v) });
                        self.vars.get_mut(output)?.value = Value::Number(-rest / coefficient);
                        determined.insert(output);
                        pending.remove(i);
                        progress = true;
                    }
                    _ => i += 1,
                }
            }
            if !progress {
                // Underdetermined: keep all but one open variable of the first
                // pending equation at their current values.
                let form = pending[0];
                let open: SmallVec<[ExtVarHandle; 4]> = form
                    .coefficients
                    .keys()
                    .filter(|v| !determined.contains(*v))
                    .copied()
                    .collect();
                let output = open
                    .iter()
                    .enumerate()
                    .min_by_key(|(i, v)| (self.stay_rank(**v), Reverse(*i)))
                    .map(|(_, v)| *v);
                for var in open {
                    if Some(var) != output {
                        determined.insert(var);
                    }
                }
                trace!(solver = %self.name, ?output, "planner picked output");
            }
        }
        Ok(())
    }

    fn propagate_or_restore(&mut self, fixed: &BTreeSet<ExtVarHandle>) -> Result<(), SolverError> {
        let snapshot = self.vars.snapshot();
        let result = self.propagate(fixed);
        if result.is_err() {
            self.vars.restore(snapshot);
        }
        result
    }
}

impl Solver for DataflowSolver {
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
        Capabilities {
            methods: true,
            soft_constraints: true,
            finite_domains: false,
            edit: true,
            data_types: vec![TypeTag::Number],
        }
    }

    fn supports_operation(&self, op: Op) -> bool {
        matches!(
            op,
            Op::Add | Op::Sub | Op::Mul | Op::Div | Op::Neg | Op::Eq | Op::And
        )
    }

    fn variable_for(&mut self, value: &Value, field_name: &str) -> Option<ExtVarHandle> {
        match value {
            Value::Number(_) => Some(self.vars.insert(field_name, value.clone())),
            _ => None,
        }
    }

    fn remove_variable(&mut self, var: ExtVarHandle) {
        self.vars.remove(var);
    }

    fn compile(&mut self, term: &Term) -> Result<PrimitiveHandle, SolverError> {
        let vars = term.variables();
        if !vars.is_empty() && vars.iter().all(|v| self.vars.is_readonly(*v)) {
            return Err(SolverError::Unsupported(format!(
                "every variable of `{term}` is read-only"
            )));
        }
        let mut forms = Vec::new();
        for rel in relations(term)? {
            if rel.relation != Relation::Eq {
                return Err(SolverError::Unsupported(
                    "dataflow only maintains equalities".to_string(),
                ));
            }
            forms.push(rel.form);
        }
        self.stats.constraint_constructions += 1;
        Ok(self.primitives.insert(DataflowPrimitive::Equations(forms)))
    }

    fn identical(&mut self, var: ExtVarHandle, value: &Value) -> Result<PrimitiveHandle, SolverError> {
        self.vars.get(var)?;
        let value = Self::number(value)?;
        self.stats.constraint_constructions += 1;
        Ok(self.primitives.insert(DataflowPrimitive::Identical { var, value }))
    }

    fn enable_primitive(
        &mut self,
        primitive: PrimitiveHandle,
        priority: Priority,
    ) -> Result<(), SolverError> {
        self.primitives.set_enabled(primitive, Some(priority))
    }

    fn disable_primitive(&mut self, primitive: PrimitiveHandle) -> Result<(), SolverError> {
        self.primitives.set_enabled(primitive, None)
    }

    fn remove_primitive(&mut self, primitive: PrimitiveHandle) {
        self.primitives.remove(primitive);
    }

    fn solve(&mut self) -> Result<(), SolverError> {
        self.stats.solve_calls += 1;
        self.propagate_or_restore(&BTreeSet::new())
    }

    fn value(&self, var: ExtVarHandle) -> Value {
        self.vars.value(var)
    }

    fn suggest_value(&mut self, var: ExtVarHandle, value: &Value) -> Result<(), SolverError> {
        let number = Self::number(value)?;
        if values_equal(&self.vars.get(var)?.value, value) {
            return Ok(());
        }
        // Temporary edit constraint for this one assignment.
        self.stats.constraint_constructions += 1;
        self.stats.solve_calls += 1;
        let snapshot = self.vars.snapshot();
        self.vars.get_mut(var)?.value = Value::Number(number);
        let fixed: BTreeSet<ExtVarHandle> = std::iter::once(var).collect();
        let result = self.propagate(&fixed);
        if result.is_err() {
            self.vars.restore(snapshot);
        }
        result
    }

    fn is_readonly(&self, var: ExtVarHandle) -> bool {
        self.vars.is_readonly(var)
    }

    fn set_readonly(&mut self, var: ExtVarHandle, readonly: bool) {
        self.vars.set_readonly(var, readonly);
    }

    fn stay(&mut self, var: ExtVarHandle, priority: Priority) -> Result<(), SolverError> {
        self.vars.get_mut(var)?.stay = Some(priority);
        Ok(())
    }

    fn remove_stay(&mut self, var: ExtVarHandle) {
        if let Ok(slot) = self.vars.get_mut(var) {
            slot.stay = None;
        }
    }

    fn begin_edit(&mut self, vars: &[ExtVarHandle]) -> Result<(), SolverError> {
        for var in vars {
            self.vars.get(*var)?;
        }
        self.stats.constraint_constructions += 1;
        self.editing = Some(vars.to_vec());
        Ok(())
    }

    fn resolve_array(&mut self, values: &[Value]) -> Result<(), SolverError> {
        let Some(editing) = self.editing.clone() else {
            return Err(SolverError::Unsupported(format!(
                "{} has no open edit session",
                self.name
            )));
        };
        if editing.len() != values.len() {
            return Err(SolverError::Unsupported(format!(
                "edit session expects {} values, got {}",
                editing.len(),
                values.len()
            )));
        }
        self.stats.solve_calls += 1;
        let snapshot = self.vars.snapshot();
        for (var, value) in editing.iter().zip(values) {
            let number = match Self::number(value) {
                Ok(n) => n,
                Err(e) => {
                    self.vars.restore(snapshot);
                    return Err(e);
                }
            };
            if let Ok(slot) = self.vars.get_mut(*var) {
                slot.value = Value::Number(number);
            }
        }
        let fixed: BTreeSet<ExtVarHandle> = editing.into_iter().collect();
        let result = self.propagate(&fixed);
        if result.is_err() {
            self.vars.restore(snapshot);
        }
        result
    }

    fn end_edit(&mut self) -> Result<(), SolverError> {
        self.editing = None;
        Ok(())
    }

    fn stats(&self) -> SolverStats {
        self.stats
    }
}

#[cfg(test)]
#[path = "dataflow_tests.rs"]
mod tests;

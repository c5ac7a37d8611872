//! Iterative relaxation over linear relations.
//!
//! Violated relations are projected onto their boundary one at a time
//! (Kaczmarz sweeps) until every relation holds within the configured
//! tolerance. Only variables that are neither read-only nor being suggested
//! move; variables carrying a stay preference move only when nothing else
//! in the relation can.

use std::collections::BTreeSet;

use keepforge_config::RelaxConfig;
use keepforge_core::{
    Capabilities, ExtVarHandle, Op, Priority, PrimitiveHandle, Solver, SolverError, SolverStats,
    Term, TypeTag, Value,
};
use tracing::trace;

use crate::linear::{relations, LinearForm, LinearRelation, Relation};
use crate::store::{PrimitiveStore, VariableStore};

/// Denominators below this mean no movable variable is left.
const MIN_DENOMINATOR: f64 = 1e-12;

#[derive(Debug, Clone)]
enum RelaxPrimitive {
    Relations(Vec<LinearRelation>),
    Identical { var: ExtVarHandle, value: f64 },
}

/// Numeric solver for conjunctions of linear `==`, `<=` and `>=`.
#[derive(Debug)]
pub struct RelaxSolver {
    name: String,
    weight: f64,
    config: RelaxConfig,
    vars: VariableStore,
    primitives: PrimitiveStore<RelaxPrimitive>,
    stats: SolverStats,
}

impl Default for RelaxSolver {
    fn default() -> Self {
        Self::new()
    }
}

impl RelaxSolver {
    pub fn new() -> Self {
        Self::with_config(RelaxConfig::default())
    }

    pub fn with_config(config: RelaxConfig) -> Self {
        Self {
            name: "relax".to_string(),
            weight: 100.0,
            config,
            vars: VariableStore::new(),
            primitives: PrimitiveStore::default(),
            stats: SolverStats::default(),
        }
    }

    /// Renames the solver, for registries holding several instances.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    fn number(value: &Value) -> Result<f64, SolverError> {
        value.as_number().ok_or_else(|| {
            SolverError::Unsupported(format!("relax only handles numbers, got {value}"))
        })
    }

    /// Runs the sweeps with `fixed` held at its current value. Leaves the
    /// variables half-moved on failure; callers roll back.
    fn relax(&mut self, fixed: Option<ExtVarHandle>) -> Result<(), SolverError> {
        let mut active: Vec<LinearRelation> = Vec::new();
        let mut pinned: BTreeSet<ExtVarHandle> = fixed.into_iter().collect();
        let mut starts: Vec<(ExtVarHandle, f64)> = Vec::new();

        for (primitive, priority) in self.primitives.enabled() {
            match primitive {
                RelaxPrimitive::Relations(rels) => active.extend(rels.iter().cloned()),
                RelaxPrimitive::Identical { var, value } => {
                    starts.push((*var, *value));
                    if priority.is_required() {
                        pinned.insert(*var);
                        active.push(LinearRelation {
                            form: LinearForm::variable(*var).plus_constant(-value),
                            relation: Relation::Eq,
                        });
                    }
                }
            }
        }
        for (var, value) in starts {
            if Some(var) != fixed && !self.vars.is_readonly(var) {
                self.vars.get_mut(var)?.value = Value::Number(value);
            }
        }

        let tolerance = self.config.tolerance;
        for sweep in 0..self.config.max_iterations {
            let mut settled = true;
            for rel in &active {
                let Some(residual) = rel.violation(|v| self.vars.number(v), tolerance) else {
                    continue;
                };
                settled = false;

                let free: Vec<(ExtVarHandle, f64)> = rel
                    .form
                    .coefficients
                    .iter()
                    .filter(|(v, _)| !pinned.contains(*v) && !self.vars.is_readonly(**v))
                    .map(|(v, c)| (*v, *c))
                    .collect();
                let preferred: Vec<(ExtVarHandle, f64)> = free
                    .iter()
                    .copied()
                    .filter(|(v, _)| self.vars.get(*v).map(|s| s.stay.is_none()).unwrap_or(false))
                    .collect();
                let movable = if preferred.is_empty() { free } else { preferred };

                let denominator: f64 = movable.iter().map(|(_, c)| c * c).sum();
                if denominator < MIN_DENOMINATOR {
                    return Err(SolverError::Unsatisfiable(format!(
                        "no writable variable left to repair a violated relation (residual {residual})"
                    )));
                }
                let step = -residual / denominator;
                for (var, c) in movable {
                    let current = self.vars.number(var);
                    self.vars.get_mut(var)?.value = Value::Number(current + c * step);
                }
            }
            if settled {
                trace!(solver = %self.name, sweeps = sweep, "relaxation settled");
                return Ok(());
            }
        }
        Err(SolverError::Unsatisfiable(format!(
            "relaxation did not converge within {} sweeps",
            self.config.max_iterations
        )))
    }

    fn relax_or_restore(&mut self, fixed: Option<ExtVarHandle>) -> Result<(), SolverError> {
        let snapshot = self.vars.snapshot();
        let result = self.relax(fixed);
        if result.is_err() {
            self.vars.restore(snapshot);
        }
        result
    }
}

impl Solver for RelaxSolver {
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
            methods: false,
            soft_constraints: false,
            finite_domains: false,
            edit: false,
            data_types: vec![TypeTag::Number],
        }
    }

    fn supports_operation(&self, op: Op) -> bool {
        matches!(
            op,
            Op::Add | Op::Sub | Op::Mul | Op::Div | Op::Neg | Op::Eq | Op::Le | Op::Ge | Op::And
        )
    }

    fn alternative_operation_for(&self, op: Op) -> Option<Op> {
        match op {
            Op::Lt => Some(Op::Le),
            Op::Gt => Some(Op::Ge),
            _ => None,
        }
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
        let rels = relations(term)?;
        self.stats.constraint_constructions += 1;
        Ok(self.primitives.insert(RelaxPrimitive::Relations(rels)))
    }

    fn identical(&mut self, var: ExtVarHandle, value: &Value) -> Result<PrimitiveHandle, SolverError> {
        self.vars.get(var)?;
        let value = Self::number(value)?;
        self.stats.constraint_constructions += 1;
        Ok(self.primitives.insert(RelaxPrimitive::Identical { var, value }))
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
        self.relax_or_restore(None)
    }

    fn value(&self, var: ExtVarHandle) -> Value {
        self.vars.value(var)
    }

    fn suggest_value(&mut self, var: ExtVarHandle, value: &Value) -> Result<(), SolverError> {
        let number = Self::number(value)?;
        self.stats.solve_calls += 1;
        let snapshot = self.vars.snapshot();
        self.vars.get_mut(var)?.value = Value::Number(number);
        let result = self.relax(Some(var));
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

    fn stats(&self) -> SolverStats {
        self.stats
    }
}

#[cfg(test)]
#[path = "relax_tests.rs"]
mod tests;

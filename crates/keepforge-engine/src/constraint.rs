//! Constraints: one predicate realized by one solver.

use std::collections::BTreeSet;
use std::rc::Rc;
use std::time::Instant;

use keepforge_core::{
    values_equal, ConstraintId, ExtVarHandle, KeepForgeError, Metric, Predicate, Priority,
    PrimitiveHandle, Result, SolverId, Value, VarId,
};
use smallvec::SmallVec;
use tracing::{debug, trace};

use crate::engine::Engine;
use crate::evaluator::{Compiled, ConstructionScope};
use crate::heap::Slot;
use crate::options::ConstraintOptions;
use crate::variable::{Origin, VarKey};

/// How the top-level result of a predicate is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BuildMode {
    /// The predicate must compile to a relation.
    Always,
    /// The predicate only names the fields that should stay.
    Stay,
}

/// One value change observed while enabling a constraint.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub var: VarId,
    pub old: Value,
    pub new: Value,
}

impl Assignment {
    pub fn changed(&self) -> bool {
        !values_equal(&self.old, &self.new)
    }
}

/// Measurements recorded on every enable, used to rank candidate solvers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComparisonMetrics {
    /// Time spent in `solve()`, in milliseconds.
    pub elapsed_ms: f64,
    pub assignments: Vec<Assignment>,
}

impl ComparisonMetrics {
    pub fn number_of_changed_variables(&self) -> usize {
        self.assignments.iter().filter(|a| a.changed()).count()
    }

    /// Sum of squared numeric changes. Not-a-number as soon as a changed
    /// value is not a number.
    pub fn squared_change_distance(&self) -> f64 {
        self.assignments
            .iter()
            .filter(|a| a.changed())
            .map(|a| match (a.old.as_number(), a.new.as_number()) {
                (Some(old), Some(new)) => (new - old) * (new - old),
                _ => f64::NAN,
            })
            .sum()
    }

    pub fn value(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Time => self.elapsed_ms,
            Metric::NumberOfChangedVariables => self.number_of_changed_variables() as f64,
            Metric::SquaredChangeDistance => self.squared_change_distance(),
        }
    }
}

/// A predicate bound to one solver.
///
/// The id of a constraint survives solver re-selection: when another solver
/// wins, its realization moves into the existing constraint.
#[derive(Debug)]
pub struct Constraint {
    pub(crate) predicate: Predicate,
    pub(crate) options: Rc<ConstraintOptions>,
    pub(crate) mode: BuildMode,
    pub(crate) solver: SolverId,
    pub(crate) primitives: Vec<PrimitiveHandle>,
    pub(crate) variables: SmallVec<[VarId; 4]>,
    pub(crate) enabled: bool,
    pub(crate) is_test: bool,
    pub(crate) priority: Priority,
    pub(crate) reevaluation_interval: u32,
    pub(crate) update_counter: u32,
    pub(crate) any_variable_suggested: bool,
    pub(crate) metrics: Option<ComparisonMetrics>,
}

impl Constraint {
    pub fn predicate(&self) -> &Predicate {
        &self.predicate
    }

    pub fn options(&self) -> &ConstraintOptions {
        &self.options
    }

    pub fn solver(&self) -> SolverId {
        self.solver
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// True for predicates accepted because they already held natively.
    pub fn is_test(&self) -> bool {
        self.is_test
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Variables touched while evaluating the predicate, in discovery order.
    pub fn variables(&self) -> &[VarId] {
        &self.variables
    }

    pub fn primitives(&self) -> &[PrimitiveHandle] {
        &self.primitives
    }

    pub fn reevaluation_interval(&self) -> u32 {
        self.reevaluation_interval
    }

    pub fn update_counter(&self) -> u32 {
        self.update_counter
    }

    /// Metrics of the most recent enable.
    pub fn metrics(&self) -> Option<&ComparisonMetrics> {
        self.metrics.as_ref()
    }
}

impl Engine {
    // ---- public control ----

    /// Re-enables a constraint and reconciles every dependent field.
    pub fn enable(&mut self, id: ConstraintId) -> Result<()> {
        self.top_level(|engine| engine.enable_constraint(id, false))
    }

    /// Stops maintaining a constraint. Idempotent; never fails.
    pub fn disable(&mut self, id: ConstraintId) {
        self.disable_constraint(id);
    }

    /// Changes the priority, re-enabling the constraint if it was enabled.
    pub fn set_priority(&mut self, id: ConstraintId, priority: Priority) -> Result<()> {
        let was_enabled = self.constraint(id)?.enabled;
        if was_enabled {
            self.disable_constraint(id);
        }
        self.constraint_mut(id)?.priority = priority;
        if was_enabled {
            self.enable(id)?;
        }
        Ok(())
    }

    /// Number of initiating writes between two solver re-selections.
    pub fn set_reevaluation_interval(&mut self, id: ConstraintId, interval: u32) -> Result<()> {
        self.constraint_mut(id)?.reevaluation_interval = interval.max(1);
        Ok(())
    }

    // ---- construction ----

    pub(crate) fn build_constraint(
        &mut self,
        predicate: &Predicate,
        solver: SolverId,
        options: Rc<ConstraintOptions>,
        mode: BuildMode,
    ) -> Result<ConstraintId> {
        self.solver(solver)?;
        let default_priority = match mode {
            BuildMode::Always => Priority::Required,
            BuildMode::Stay => Priority::Weak,
        };
        let id = ConstraintId(self.constraints.len());
        self.constraints.push(Some(Constraint {
            predicate: predicate.clone(),
            priority: options.priority.unwrap_or(default_priority),
            reevaluation_interval: options
                .reevaluation_interval
                .unwrap_or(self.config.reevaluation_interval)
                .max(1),
            options,
            mode,
            solver,
            primitives: Vec::new(),
            variables: SmallVec::new(),
            enabled: false,
            is_test: false,
            update_counter: 0,
            any_variable_suggested: false,
            metrics: None,
        }));
        if let Err(error) = self.evaluate_constraint(id) {
            self.abandon(id);
            return Err(error);
        }
        Ok(id)
    }

    /// Runs the evaluator for the constraint's solver and stores what it
    /// produced.
    fn evaluate_constraint(&mut self, id: ConstraintId) -> Result<()> {
        let c = self.constraint(id)?;
        let (solver, mode) = (c.solver, c.mode);
        let predicate = c.predicate.clone();
        let options = c.options.clone();
        let evaluator = self.evaluator.clone();

        let saved = self.guards.current.replace((id, solver));
        let result = {
            let mut scope = ConstructionScope::new(self, id, solver, options.clone());
            evaluator.evaluate(&mut scope, &predicate)
        };
        self.guards.current = saved;

        let name = self.solver_name(solver);
        match result? {
            Compiled::Primitive(primitive) => self.constraint_mut(id)?.primitives.push(primitive),
            Compiled::Native(true) if options.allow_tests => self.constraint_mut(id)?.is_test = true,
            Compiled::Native(true) => {
                return Err(KeepForgeError::construction(
                    name,
                    "predicate already holds natively; allow tests to keep it as an assertion",
                ))
            }
            Compiled::Native(false) => {
                return Err(KeepForgeError::construction(
                    name,
                    "predicate is false and touches nothing the solver can change",
                ))
            }
            Compiled::Value(_) if mode == BuildMode::Stay => {}
            Compiled::Value(value) => {
                return Err(KeepForgeError::construction(
                    name,
                    format!("predicate evaluated to {value}, not to a relation"),
                ))
            }
        }
        Ok(())
    }

    // ---- enable / disable ----

    /// Enables the primitives and solves. Unless `compare` is set, every
    /// variable the solve changed is propagated.
    pub(crate) fn enable_constraint(&mut self, id: ConstraintId, compare: bool) -> Result<()> {
        let c = self.constraint(id)?;
        if c.enabled {
            return Ok(());
        }
        let (solver, priority, is_test) = (c.solver, c.priority, c.is_test);
        let primitives = c.primitives.clone();
        let name = self.solver_name(solver);
        if primitives.is_empty() && !is_test {
            return Err(KeepForgeError::construction(
                name,
                "no primitive constraints were created",
            ));
        }

        self.guards.tick();
        let started = Instant::now();
        if let Err(error) = self.activate(id, solver, priority, &primitives, is_test) {
            if let Ok(s) = self.solver_mut(solver) {
                for primitive in &primitives {
                    if let Err(error) = s.disable_primitive(*primitive) {
                        trace!(%primitive, %error, "ignored disable failure");
                    }
                }
            }
            if let Ok(c) = self.constraint_mut(id) {
                c.enabled = false;
            }
            self.guards.tick();
            return Err(error);
        }
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        self.log_solve_timing(Some(id), solver, started, "enable");

        let variables = self.constraint(id)?.variables.clone();
        let mut assignments = Vec::with_capacity(variables.len());
        for var in variables {
            let Some(v) = self.variable(var) else { continue };
            let old = v.shadow.clone();
            let new = self.read_var(var);
            if !compare && !values_equal(&old, &new) {
                self.update_downstream_external(var, &new)?;
                self.solve_for_connected(var, &new, &old, Origin::Propagation, false)?;
            }
            assignments.push(Assignment { var, old, new });
        }
        self.constraint_mut(id)?.metrics = Some(ComparisonMetrics {
            elapsed_ms,
            assignments,
        });
        Ok(())
    }

    fn activate(
        &mut self,
        id: ConstraintId,
        solver: SolverId,
        priority: Priority,
        primitives: &[PrimitiveHandle],
        is_test: bool,
    ) -> Result<()> {
        let name = self.solver_name(solver);
        let s = self.solver_mut(solver)?;
        for primitive in primitives {
            s.enable_primitive(*primitive, priority)
                .map_err(|e| KeepForgeError::from_solver(name.clone(), e))?;
        }
        self.constraint_mut(id)?.enabled = true;
        if !is_test {
            self.solver_mut(solver)?
                .solve()
                .map_err(|e| KeepForgeError::from_solver(name, e))?;
        }
        Ok(())
    }

    pub(crate) fn disable_constraint(&mut self, id: ConstraintId) {
        let Ok(c) = self.constraint(id) else { return };
        if !c.enabled {
            return;
        }
        let solver = c.solver;
        let primitives = c.primitives.clone();
        if let Ok(s) = self.solver_mut(solver) {
            for primitive in primitives {
                if let Err(error) = s.disable_primitive(primitive) {
                    trace!(%primitive, %error, "ignored disable failure");
                }
            }
        }
        if let Ok(c) = self.constraint_mut(id) {
            c.enabled = false;
        }
        self.guards.tick();
    }

    // ---- recalculation ----

    /// Rebuilds an enabled constraint after the object graph under one of
    /// its paths changed. Newly reached variables keep their current value
    /// as if they had been assigned directly.
    pub(crate) fn recalculate(&mut self, id: ConstraintId) -> Result<()> {
        let c = self.constraint(id)?;
        if !c.enabled {
            return Ok(());
        }
        let solver = c.solver;
        let old_vars = c.variables.clone();
        debug!(constraint = %id, "recalculating");

        self.disable_constraint(id);
        let old_primitives = std::mem::take(&mut self.constraint_mut(id)?.primitives);
        if let Ok(s) = self.solver_mut(solver) {
            for primitive in old_primitives {
                s.remove_primitive(primitive);
            }
        }
        for var in &old_vars {
            if let Some(v) = self.variable_mut(*var) {
                v.constraints.remove(&id);
            }
        }
        self.constraint_mut(id)?.variables.clear();
        self.evaluate_constraint(id)?;

        let new_vars = self.constraint(id)?.variables.clone();
        for var in old_vars.iter().filter(|v| !new_vars.contains(v)) {
            if let Some(ext) = self.binding(*var, solver) {
                self.solver_mut(solver)?.remove_stay(ext);
            }
            self.detach_unused_bindings(*var);
        }

        let mut transplants = Vec::new();
        for var in new_vars.iter().filter(|v| !old_vars.contains(v)) {
            let Some(ext) = self.binding(*var, solver) else { continue };
            let value = self.read_var(*var);
            let name = self.solver_name(solver);
            let s = self.solver_mut(solver)?;
            let primitive = s
                .identical(ext, &value)
                .map_err(|e| KeepForgeError::from_solver(name, e))?;
            if s.enable_primitive(primitive, Priority::Required).is_err() {
                if let Err(error) = s.enable_primitive(primitive, Priority::Strong) {
                    trace!(%primitive, %error, "transplant not enabled");
                }
            }
            transplants.push(primitive);
        }

        let result = match self.enable_constraint(id, false) {
            Ok(()) => Ok(()),
            Err(_) => {
                self.disable_constraint(id);
                if let Ok(s) = self.solver_mut(solver) {
                    for primitive in &transplants {
                        if let Err(error) = s.disable_primitive(*primitive) {
                            trace!(%primitive, %error, "ignored disable failure");
                        }
                        if let Err(error) = s.enable_primitive(*primitive, Priority::Strong) {
                            trace!(%primitive, %error, "transplant not weakened");
                        }
                    }
                }
                self.enable_constraint(id, false)
            }
        };

        if let Ok(s) = self.solver_mut(solver) {
            for primitive in transplants {
                if let Err(error) = s.disable_primitive(primitive) {
                    trace!(%primitive, %error, "ignored disable failure");
                }
                s.remove_primitive(primitive);
            }
        }
        result
    }

    /// The variable's handle in `solver`, if the solver accepted it.
    pub(crate) fn binding(&self, var: VarId, solver: SolverId) -> Option<ExtVarHandle> {
        self.variable(var)?.external_variable(solver).flatten()
    }

    // ---- teardown ----

    /// Drops a constraint for good and detaches the solver bindings only
    /// it kept alive.
    pub(crate) fn abandon(&mut self, id: ConstraintId) {
        self.disable_constraint(id);
        let Some(c) = self.constraints.get_mut(id.index()).and_then(Option::take) else {
            return;
        };
        if let Ok(s) = self.solver_mut(c.solver) {
            for primitive in &c.primitives {
                s.remove_primitive(*primitive);
            }
        }
        for var in c.variables {
            if let Some(v) = self.variable_mut(var) {
                v.constraints.remove(&id);
            }
            self.detach_unused_bindings(var);
        }
        self.guards.tick();
    }

    /// Removes bindings of solvers no remaining constraint of `var` uses,
    /// and declined entries, then releases the variable if nothing is left.
    pub(crate) fn detach_unused_bindings(&mut self, var: VarId) {
        let Some(v) = self.variable(var) else { return };
        let in_use: BTreeSet<SolverId> = v
            .constraints
            .iter()
            .filter_map(|cid| self.constraint(*cid).ok().map(|c| c.solver))
            .collect();
        let unused: Vec<(SolverId, Option<ExtVarHandle>)> = v
            .external
            .iter()
            .filter(|(s, e)| e.is_none() || !in_use.contains(*s))
            .map(|(s, e)| (*s, *e))
            .collect();
        for (solver, ext) in unused {
            if let Some(v) = self.variable_mut(var) {
                v.external.remove(&solver);
            }
            if let (Some(ext), Ok(s)) = (ext, self.solver_mut(solver)) {
                s.remove_variable(ext);
            }
        }
        self.release_if_unused(var);
    }

    fn release_if_unused(&mut self, var: VarId) {
        let Some(v) = self.variable(var) else { return };
        if !v.constraints.is_empty() || !v.external.is_empty() || !v.parts.is_empty() {
            return;
        }
        let value = self.read_var(var);
        let Some(v) = self.vars.get_mut(var.index()).and_then(Option::take) else {
            return;
        };
        match v.key {
            VarKey::Field { obj, name } => {
                if matches!(self.heap.slot(obj, &name), Ok(Slot::Intercepted(current)) if *current == var)
                {
                    if let Err(error) = self.heap.set_slot(obj, &name, Slot::Plain(value)) {
                        trace!(%obj, field = %name, %error, "field not restored");
                    }
                }
            }
            VarKey::Part { parent, part } => {
                if let Some(p) = self.variable_mut(parent) {
                    p.parts.remove(&part);
                }
                self.release_if_unused(parent);
            }
        }
        self.guards.tick();
    }
}

#[cfg(test)]
#[path = "constraint_tests.rs"]
mod tests;

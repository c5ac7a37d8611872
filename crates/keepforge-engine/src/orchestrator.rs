//! Solver selection and the constraint-creating entry points.
//!
//! `always` builds one candidate constraint per eligible solver, benchmarks
//! the candidates when there is more than one, enables the winner and
//! abandons the rest. `reevaluate_solver_selection` repeats the comparison
//! for a live constraint and moves the winning realization into it.

use std::cmp::Ordering;
use std::rc::Rc;

use keepforge_core::{
    ConstraintId, KeepForgeError, Metric, ObjectId, Predicate, Result, SolverId, Value, VarId,
};
use tracing::{debug, info, warn};

use crate::callbacks::Callback;
use crate::constraint::{BuildMode, ComparisonMetrics};
use crate::engine::Engine;
use crate::heap::Slot;
use crate::options::ConstraintOptions;
use crate::variable::VarKey;

impl Engine {
    /// Maintains `predicate` from now on.
    ///
    /// Returns the constraint, or `None` when every candidate failed and an
    /// `on_error` handler received the failures instead.
    ///
    /// # Errors
    ///
    /// [`KeepForgeError::NoSolver`] with every candidate's failure when no
    /// solver could realize the predicate and no handler is registered.
    pub fn always(
        &mut self,
        options: ConstraintOptions,
        predicate: impl Into<Predicate>,
    ) -> Result<Option<ConstraintId>> {
        let predicate = predicate.into();
        let options = Rc::new(options);
        self.top_level(|engine| engine.always_inner(options, &predicate))
    }

    /// Solves `predicate` once, then stops maintaining it.
    pub fn once(
        &mut self,
        options: ConstraintOptions,
        predicate: impl Into<Predicate>,
    ) -> Result<Option<ConstraintId>> {
        let id = self.always(options, predicate)?;
        if let Some(id) = id {
            self.disable(id);
        }
        Ok(id)
    }

    /// Attaches a stay preference to every field `predicate` names.
    ///
    /// Uses the explicit solver, else the default solver, else the first
    /// default candidate. The priority defaults to weak. Fields the solver
    /// cannot bind are logged and skipped.
    pub fn stay(
        &mut self,
        options: ConstraintOptions,
        predicate: impl Into<Predicate>,
    ) -> Result<ConstraintId> {
        let predicate = predicate.into();
        let options = Rc::new(options);
        self.top_level(|engine| {
            let solver = options
                .solver
                .or(engine.default_solver)
                .or_else(|| engine.default_solvers.first().copied())
                .ok_or(KeepForgeError::NoSolver { errors: Vec::new() })?;
            let id = engine.build_constraint(&predicate, solver, options.clone(), BuildMode::Stay)?;
            let c = engine.constraint(id)?;
            let priority = c.priority;
            let variables = c.variables.clone();
            for var in variables {
                match engine.binding(var, solver) {
                    Some(ext) => {
                        if let Err(error) = engine.solver_mut(solver)?.stay(ext, priority) {
                            warn!(field = %engine.field_label(var), %error, "could not attach stay");
                        }
                    }
                    None => warn!(
                        field = %engine.field_label(var),
                        solver = %engine.solver_name(solver),
                        "stay skipped: solver declined the field"
                    ),
                }
            }
            Ok(id)
        })
    }

    /// Re-runs solver selection for a live constraint. The constraint keeps
    /// its id whichever solver wins.
    pub fn reevaluate_solver_selection(&mut self, id: ConstraintId) -> Result<()> {
        self.top_level(|engine| engine.reevaluate(id))
    }

    /// Stops intercepting `obj.field`. The field keeps its current value;
    /// an object held by the field is unconstrained as well.
    pub fn unconstrain(&mut self, obj: ObjectId, field: &str) -> Result<()> {
        let Slot::Intercepted(var) = self.heap.slot(obj, field)?.clone() else {
            return Ok(());
        };
        let value = self.read_var(var);
        self.heap.set_slot(obj, field, Slot::Plain(value.clone()))?;
        self.drop_variable(var);
        self.guards.tick();
        debug!(%obj, field, "unconstrained field");
        if let Value::Object(inner) = value {
            self.unconstrain_all(inner)?;
        }
        Ok(())
    }

    /// Unconstrains every intercepted field of `obj`.
    pub fn unconstrain_all(&mut self, obj: ObjectId) -> Result<()> {
        for field in self.heap.field_names(obj)? {
            if self.variable_of(obj, &field).is_some() {
                self.unconstrain(obj, &field)?;
            }
        }
        Ok(())
    }

    fn drop_variable(&mut self, var: VarId) {
        let Some(v) = self.vars.get_mut(var.index()).and_then(Option::take) else {
            return;
        };
        for cid in &v.constraints {
            if let Ok(c) = self.constraint_mut(*cid) {
                c.variables.retain(|x| *x != var);
            }
        }
        for part in v.parts.values() {
            self.drop_variable(*part);
        }
        if let VarKey::Part { parent, part } = &v.key {
            if let Some(p) = self.variable_mut(*parent) {
                p.parts.remove(part);
            }
        }
    }

    // ---- always ----

    fn always_inner(
        &mut self,
        options: Rc<ConstraintOptions>,
        predicate: &Predicate,
    ) -> Result<Option<ConstraintId>> {
        let chosen = self.choose_solvers(&options);
        let (solvers, mut errors) = self.filter_solvers(chosen, &options, predicate);
        let candidates = self.create_equivalent_constraints(&solvers, &options, predicate, &mut errors);

        let winner = if candidates.len() > 1 {
            self.choose_constraint(&candidates, None, &options, &mut errors)
        } else {
            candidates.first().copied()
        };
        for other in &candidates {
            if Some(*other) != winner {
                self.abandon(*other);
            }
        }

        let mut result = None;
        if let Some(id) = winner {
            if options.postpone_enabling {
                result = Some(id);
            } else {
                self.constraint_mut(id)?.any_variable_suggested = true;
                let enabled = self.enable_constraint(id, false);
                if let Ok(c) = self.constraint_mut(id) {
                    c.any_variable_suggested = false;
                }
                match enabled {
                    Ok(()) => result = Some(id),
                    Err(error) => {
                        errors.push(error);
                        self.abandon(id);
                    }
                }
            }
        }

        if result.is_none() {
            match options.on_error.clone() {
                Some(handler) => self.callbacks.push_back(Callback::OnError { handler, errors }),
                None => self
                    .callbacks
                    .push_back(Callback::Rethrow(KeepForgeError::NoSolver { errors })),
            }
        }
        Ok(result)
    }

    /// Explicit solver, else the default solver, else the default list.
    fn choose_solvers(&self, options: &ConstraintOptions) -> Vec<SolverId> {
        if let Some(solver) = options.solver.or(self.default_solver) {
            return vec![solver];
        }
        self.default_solvers.clone()
    }

    /// Drops solvers whose declared capabilities cannot host the predicate.
    fn filter_solvers(
        &self,
        solvers: Vec<SolverId>,
        options: &ConstraintOptions,
        predicate: &Predicate,
    ) -> (Vec<SolverId>, Vec<KeepForgeError>) {
        let evaluator = self.evaluator.clone();
        let inspection = match evaluator.inspect(self, predicate, &options.ctx) {
            Ok(inspection) => Some(inspection),
            Err(error) => {
                debug!(%error, "inspection failed; skipping type checks");
                None
            }
        };
        let soft = !options.priority.unwrap_or_default().is_required();
        let log_reasons = options.log_reasons.unwrap_or(self.config.log_reasons);

        let mut kept = Vec::new();
        let mut errors = Vec::new();
        for id in solvers {
            let Ok(solver) = self.solver(id) else {
                errors.push(KeepForgeError::UnknownSolver(id));
                continue;
            };
            let caps = solver.capabilities();
            let reason = if options.methods && !caps.methods {
                Some("methods".to_string())
            } else if soft && !caps.soft_constraints {
                Some("soft constraints".to_string())
            } else if let Some(inspection) = &inspection {
                if inspection.finite_domain && !caps.finite_domains {
                    Some("finite domains".to_string())
                } else {
                    inspection
                        .types
                        .iter()
                        .find(|t| !caps.supports_type(**t))
                        .map(|t| format!("{t} values"))
                }
            } else {
                None
            };
            match reason {
                Some(reason) => {
                    if log_reasons {
                        info!(event = "solver_rejected", solver = solver.name(), reason = %reason);
                    }
                    errors.push(KeepForgeError::construction(
                        solver.name(),
                        format!("no support for {reason}"),
                    ));
                }
                None => kept.push(id),
            }
        }
        (kept, errors)
    }

    fn create_equivalent_constraints(
        &mut self,
        solvers: &[SolverId],
        options: &Rc<ConstraintOptions>,
        predicate: &Predicate,
        errors: &mut Vec<KeepForgeError>,
    ) -> Vec<ConstraintId> {
        let mut candidates = Vec::with_capacity(solvers.len());
        for solver in solvers {
            match self.build_constraint(predicate, *solver, options.clone(), BuildMode::Always) {
                Ok(id) => candidates.push(id),
                Err(error) => {
                    debug!(solver = %self.solver_name(*solver), %error, "candidate failed to build");
                    errors.push(error);
                }
            }
        }
        candidates
    }

    /// Benchmarks every candidate in compare mode and returns the best.
    /// Candidates failing to enable are abandoned, except `keep`.
    fn choose_constraint(
        &mut self,
        candidates: &[ConstraintId],
        keep: Option<ConstraintId>,
        options: &ConstraintOptions,
        errors: &mut Vec<KeepForgeError>,
    ) -> Option<ConstraintId> {
        for id in candidates {
            self.disable_constraint(*id);
        }
        let mut measured: Vec<(ConstraintId, ComparisonMetrics)> = Vec::new();
        for id in candidates {
            let Ok(solver) = self.constraint(*id).map(|c| c.solver) else {
                continue;
            };
            let saved = self.guards.current.replace((*id, solver));
            let result = self.enable_constraint(*id, true);
            self.disable_constraint(*id);
            self.guards.current = saved;
            match result {
                Ok(()) => {
                    let metrics = self
                        .constraint(*id)
                        .ok()
                        .and_then(|c| c.metrics.clone())
                        .unwrap_or_default();
                    measured.push((*id, metrics));
                }
                Err(error) => {
                    debug!(solver = %self.solver_name(solver), %error, "candidate failed to enable");
                    errors.push(error);
                    if Some(*id) != keep {
                        self.abandon(*id);
                    }
                }
            }
        }

        let order = options
            .optimization_priority
            .clone()
            .unwrap_or_else(|| self.config.optimization_priority.clone());
        let ranked: Vec<(ConstraintId, &ComparisonMetrics)> =
            measured.iter().map(|(id, m)| (*id, m)).collect();
        let best = select_best(&ranked, &order)?;
        if let Ok(c) = self.constraint(best) {
            info!(
                event = "solver_selected",
                solver = %self.solver_name(c.solver),
                candidates = candidates.len(),
                measured = measured.len(),
            );
        }
        Some(best)
    }

    // ---- re-selection ----

    pub(crate) fn reevaluate(&mut self, id: ConstraintId) -> Result<()> {
        let c = self.constraint(id)?;
        let current = c.solver;
        let was_enabled = c.enabled;
        let options = c.options.clone();
        let predicate = c.predicate.clone();
        debug!(
            event = "reevaluation",
            constraint = %id,
            solver = %self.solver_name(current),
        );

        let chosen: Vec<SolverId> = self
            .choose_solvers(&options)
            .into_iter()
            .filter(|s| *s != current)
            .collect();
        let (solvers, _) = self.filter_solvers(chosen, &options, &predicate);
        if solvers.is_empty() {
            return Ok(());
        }
        let mut errors = Vec::new();
        let mut candidates =
            self.create_equivalent_constraints(&solvers, &options, &predicate, &mut errors);
        if candidates.is_empty() {
            return Ok(());
        }
        candidates.push(id);

        let winner = self.choose_constraint(&candidates, Some(id), &options, &mut errors);
        for other in &candidates {
            if *other != id && Some(*other) != winner {
                self.abandon(*other);
            }
        }
        if let Some(winner) = winner.filter(|w| *w != id) {
            self.transplant(winner, id)?;
        }
        if was_enabled {
            self.enable_constraint(id, false)?;
        }
        Ok(())
    }

    /// Moves the realization of `from` into `into`, which keeps its id.
    fn transplant(&mut self, from: ConstraintId, into: ConstraintId) -> Result<()> {
        let target = self.constraint(into)?;
        let old_solver = target.solver;
        let old_vars = target.variables.clone();
        let old_primitives = target.primitives.clone();
        if let Ok(s) = self.solver_mut(old_solver) {
            for primitive in old_primitives {
                s.remove_primitive(primitive);
            }
        }

        let Some(winner) = self.constraints.get_mut(from.index()).and_then(Option::take) else {
            return Err(KeepForgeError::UnknownConstraint(from));
        };
        for var in &winner.variables {
            if let Some(v) = self.variable_mut(*var) {
                v.constraints.remove(&from);
                v.constraints.insert(into);
            }
        }
        for var in old_vars.iter().filter(|v| !winner.variables.contains(v)) {
            if let Some(v) = self.variable_mut(*var) {
                v.constraints.remove(&into);
            }
        }

        let solver = winner.solver;
        {
            let c = self.constraint_mut(into)?;
            c.solver = winner.solver;
            c.primitives = winner.primitives;
            c.variables = winner.variables;
            c.is_test = winner.is_test;
            c.metrics = winner.metrics;
            c.enabled = false;
        }
        self.guards.tick();

        let mut touched = old_vars.to_vec();
        touched.extend(self.constraint(into)?.variables.iter().copied());
        touched.sort();
        touched.dedup();
        for var in touched {
            self.detach_unused_bindings(var);
        }
        info!(
            event = "solver_switched",
            constraint = %into,
            from = %self.solver_name(old_solver),
            to = %self.solver_name(solver),
        );
        Ok(())
    }
}

/// Picks the best candidate under a lexicographic metric ordering; lower
/// is better.
///
/// The first candidate is the initial best. For each later candidate the
/// metrics are compared in order: a larger value eliminates it, a smaller
/// value makes it the new best, and an equal or incomparable (not-a-number)
/// value defers to the next metric. A candidate that is never smaller keeps
/// the incumbent.
pub(crate) fn select_best<K: Copy>(candidates: &[(K, &ComparisonMetrics)], order: &[Metric]) -> Option<K> {
    let ((first, first_metrics), rest) = candidates.split_first()?;
    let (mut best, mut best_metrics) = (*first, *first_metrics);
    for (key, metrics) in rest {
        for metric in order {
            match metrics.value(*metric).partial_cmp(&best_metrics.value(*metric)) {
                Some(Ordering::Greater) => break,
                Some(Ordering::Less) => {
                    best = *key;
                    best_metrics = *metrics;
                    break;
                }
                Some(Ordering::Equal) | None => continue,
            }
        }
    }
    Some(best)
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;

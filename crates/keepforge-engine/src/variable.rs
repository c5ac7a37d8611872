//! Constrained variables and the write path.
//!
//! A [`ConstrainedVariable`] intercepts one host field (or one part of a
//! value-class field). It owns the field's solver bindings and knows which
//! solver is currently authoritative for its value.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::rc::Rc;
use std::time::Instant;

use keepforge_core::{
    values_equal, ConstraintId, ExtVarHandle, KeepForgeError, ObjectId, Result, SolverId, Value,
    VarId,
};
use tracing::{debug, warn};

use crate::engine::Engine;
use crate::heap::{SetterHook, Slot};

/// What a variable intercepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VarKey {
    /// A host field.
    Field { obj: ObjectId, name: String },
    /// A named numeric part of a value-class variable.
    Part { parent: VarId, part: String },
}

/// The authoritative binding of a variable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Defining {
    pub solver: SolverId,
    pub constraint: Option<ConstraintId>,
    pub ext: ExtVarHandle,
}

/// Where a write comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Origin {
    /// A caller assigned the field.
    Source,
    /// The engine propagates a solver result.
    Propagation,
    /// A failed source write puts the prior value back.
    Restore,
}

/// Engine-side proxy owning the solver bindings of one field.
#[derive(Debug)]
pub struct ConstrainedVariable {
    pub(crate) key: VarKey,
    pub(crate) shadow: Value,
    /// `None` records that the solver declined the value.
    pub(crate) external: BTreeMap<SolverId, Option<ExtVarHandle>>,
    pub(crate) constraints: BTreeSet<ConstraintId>,
    pub(crate) parent: Option<VarId>,
    pub(crate) parts: BTreeMap<String, VarId>,
    pub(crate) defining: Cell<Option<(u64, Option<Defining>)>>,
    pub(crate) multi_solver: Cell<bool>,
    pub(crate) closure: RefCell<Option<(u64, Rc<[VarId]>)>>,
    pub(crate) downstream_readonly: Option<Vec<(SolverId, ExtVarHandle)>>,
}

impl ConstrainedVariable {
    pub(crate) fn new(key: VarKey, shadow: Value, parent: Option<VarId>) -> Self {
        Self {
            key,
            shadow,
            external: BTreeMap::new(),
            constraints: BTreeSet::new(),
            parent,
            parts: BTreeMap::new(),
            defining: Cell::new(None),
            multi_solver: Cell::new(false),
            closure: RefCell::new(None),
            downstream_readonly: None,
        }
    }

    pub fn key(&self) -> &VarKey {
        &self.key
    }

    /// Last value stored outside any solver.
    pub fn shadow_value(&self) -> &Value {
        &self.shadow
    }

    /// `None` if the solver was never asked, `Some(None)` if it declined.
    pub fn external_variable(&self, solver: SolverId) -> Option<Option<ExtVarHandle>> {
        self.external.get(&solver).copied()
    }

    pub fn solvers(&self) -> impl Iterator<Item = SolverId> + '_ {
        self.external.keys().copied()
    }

    pub fn constraints(&self) -> impl Iterator<Item = ConstraintId> + '_ {
        self.constraints.iter().copied()
    }

    pub fn parent(&self) -> Option<VarId> {
        self.parent
    }

    pub fn part(&self, name: &str) -> Option<VarId> {
        self.parts.get(name).copied()
    }

    /// True while more than one solver has an enabled constraint on this
    /// variable. The defining solver is then searched on every access.
    pub fn is_multi_solver(&self) -> bool {
        self.multi_solver.get()
    }
}

/// Per-write bookkeeping released in `suggest_value`'s cleanup.
struct WriteState {
    var: VarId,
    old: Value,
    origin: Origin,
    force: bool,
    call_setters: bool,
    initiating: Option<ConstraintId>,
    bumped: Option<(SolverId, Rc<[VarId]>)>,
}

impl Engine {
    // ---- creation ----

    /// Returns the variable intercepting `obj.name`, intercepting it first
    /// if needed.
    pub(crate) fn field_variable(
        &mut self,
        obj: ObjectId,
        name: &str,
        parent: Option<VarId>,
    ) -> Result<VarId> {
        match self.heap.slot(obj, name)?.clone() {
            Slot::Intercepted(var) => {
                if let Some(v) = self.variable_mut(var) {
                    if v.parent.is_none() {
                        v.parent = parent;
                    }
                }
                Ok(var)
            }
            Slot::Plain(value) => {
                let key = VarKey::Field {
                    obj,
                    name: name.to_string(),
                };
                let var = self.alloc_variable(ConstrainedVariable::new(key, value, parent));
                self.heap.set_slot(obj, name, Slot::Intercepted(var))?;
                debug!(%obj, field = name, %var, "intercepted field");
                Ok(var)
            }
        }
    }

    /// Returns the variable for one part of a value-class variable.
    pub(crate) fn part_variable(&mut self, parent: VarId, part: &str) -> Result<VarId> {
        if let Some(var) = self.expect_variable(parent)?.part(part) {
            return Ok(var);
        }
        let value = self.read_var(parent);
        let number = value
            .as_decomposable()
            .and_then(|d| d.part(part))
            .ok_or_else(|| KeepForgeError::TypeMismatch(format!("{value} has no part `{part}`")))?;
        let key = VarKey::Part {
            parent,
            part: part.to_string(),
        };
        let var = self.alloc_variable(ConstrainedVariable::new(
            key,
            Value::Number(number),
            Some(parent),
        ));
        if let Some(p) = self.variable_mut(parent) {
            p.parts.insert(part.to_string(), var);
        }
        Ok(var)
    }

    fn alloc_variable(&mut self, variable: ConstrainedVariable) -> VarId {
        let id = VarId(self.vars.len());
        self.vars.push(Some(variable));
        self.guards.tick();
        id
    }

    /// Asks `solver` to represent the variable unless it was asked before.
    pub(crate) fn ensure_external(
        &mut self,
        var: VarId,
        solver: SolverId,
    ) -> Result<Option<ExtVarHandle>> {
        if let Some(entry) = self.expect_variable(var)?.external_variable(solver) {
            return Ok(entry);
        }
        let value = self.read_var(var);
        let label = self.field_label(var);
        let ext = self.solver_mut(solver)?.variable_for(&value, &label);
        if let Some(v) = self.variable_mut(var) {
            v.external.insert(solver, ext);
        }
        self.guards.tick();
        Ok(ext)
    }

    /// Dotted path of the field a variable intercepts.
    pub(crate) fn field_label(&self, var: VarId) -> String {
        match self.variable(var).map(|v| &v.key) {
            Some(VarKey::Field { obj, name }) => format!("{obj}.{name}"),
            Some(VarKey::Part { parent, part }) => format!("{}.{part}", self.field_label(*parent)),
            None => var.to_string(),
        }
    }

    // ---- defining solver ----

    /// Solver currently authoritative for the variable's value.
    pub fn defining_solver(&self, var: VarId) -> Option<SolverId> {
        self.defining(var).map(|d| d.solver)
    }

    pub(crate) fn defining(&self, var: VarId) -> Option<Defining> {
        let v = self.variable(var)?;
        if let Some((constraint, solver)) = self.guards.current {
            if let Some(Some(ext)) = v.external.get(&solver) {
                return Some(Defining {
                    solver,
                    constraint: Some(constraint),
                    ext: *ext,
                });
            }
        }
        if self.guards.current.is_none() && !v.multi_solver.get() {
            if let Some((generation, cached)) = v.defining.get() {
                if generation == self.guards.generation {
                    return cached;
                }
            }
        }

        let mut best: Option<(f64, Defining)> = None;
        let mut with_enabled = 0;
        for (solver, ext) in &v.external {
            let Some(ext) = ext else { continue };
            let constraint = v.constraints.iter().copied().find(|cid| {
                self.constraint(*cid)
                    .is_ok_and(|c| c.enabled && c.solver == *solver)
            });
            if constraint.is_none() && !v.constraints.is_empty() {
                continue;
            }
            if constraint.is_some() {
                with_enabled += 1;
            }
            let Ok(weight) = self.solver(*solver).map(|s| s.weight()) else {
                continue;
            };
            if best.map_or(true, |(w, _)| weight > w) {
                best = Some((
                    weight,
                    Defining {
                        solver: *solver,
                        constraint,
                        ext: *ext,
                    },
                ));
            }
        }

        let defining = best.map(|(_, d)| d);
        let multi = with_enabled > 1;
        v.multi_solver.set(multi);
        if self.guards.current.is_none() && !multi {
            v.defining.set(Some((self.guards.generation, defining)));
        } else {
            v.defining.set(None);
        }
        defining
    }

    // ---- reading ----

    pub(crate) fn read_var(&self, var: VarId) -> Value {
        let Some(v) = self.variable(var) else {
            return Value::None;
        };
        if let Some(d) = self.defining(var) {
            if let Ok(solver) = self.solver(d.solver) {
                return solver.value(d.ext);
            }
        }
        if !v.parts.is_empty() && v.shadow.as_decomposable().is_some() {
            let mut value = v.shadow.clone();
            for (name, part) in &v.parts {
                let composed = self
                    .read_var(*part)
                    .as_number()
                    .and_then(|n| value.with_part(name, n));
                if let Some(composed) = composed {
                    value = composed;
                }
            }
            return value;
        }
        v.shadow.clone()
    }

    /// Value a write is compared against: the shadow, or the composed
    /// value for variables with parts.
    fn stored_value(&self, var: VarId) -> Result<Value> {
        let v = self.expect_variable(var)?;
        if v.parts.is_empty() {
            Ok(v.shadow.clone())
        } else {
            Ok(self.read_var(var))
        }
    }

    /// Pins or releases every solver binding of `obj.field`.
    pub fn set_readonly(&mut self, obj: ObjectId, field: &str, readonly: bool) -> Result<()> {
        let var = self
            .variable_of(obj, field)
            .ok_or_else(|| KeepForgeError::TypeMismatch(format!("{obj}.{field} is not constrained")))?;
        let bindings: Vec<(SolverId, ExtVarHandle)> = self
            .expect_variable(var)?
            .external
            .iter()
            .filter_map(|(s, e)| e.map(|e| (*s, e)))
            .collect();
        for (solver, ext) in bindings {
            self.solver_mut(solver)?.set_readonly(ext, readonly);
        }
        Ok(())
    }

    // ---- writing ----

    /// The write path for intercepted fields.
    pub(crate) fn suggest_value(
        &mut self,
        var: VarId,
        value: Value,
        origin: Origin,
        force: bool,
    ) -> Result<Value> {
        if self.guards.calling_setters {
            return Ok(value);
        }
        let old = self.stored_value(var)?;
        if !force && values_equal(&value, &old) {
            return Ok(value);
        }

        let call_setters = self.pending_setters.is_none();
        if call_setters {
            self.pending_setters = Some(Vec::new());
        }
        let defining = self.defining(var);
        let mut initiating = None;
        if let Some(cid) = defining.and_then(|d| d.constraint) {
            if let Ok(c) = self.constraint_mut(cid) {
                if !c.any_variable_suggested {
                    c.any_variable_suggested = true;
                    initiating = Some(cid);
                }
            }
        }

        let mut state = WriteState {
            var,
            old,
            origin,
            force,
            call_setters,
            initiating,
            bumped: None,
        };
        let result = self.write_steps(&mut state, &value, defining);

        if call_setters {
            self.pending_setters = None;
        }
        if let Some((solver, closure)) = state.bumped.take() {
            self.bump_weight(solver, &closure, false);
        }
        if let Some(cid) = initiating {
            if let Ok(c) = self.constraint_mut(cid) {
                c.any_variable_suggested = false;
            }
        }

        match result {
            Ok(()) => Ok(value),
            Err(error) => {
                let now = self.read_var(var);
                if !values_equal(&now, &state.old) {
                    return Err(KeepForgeError::InconsistentState {
                        field: self.field_label(var),
                        before: state.old,
                        after: now,
                    });
                }
                self.add_error_callback(var, error)?;
                Ok(value)
            }
        }
    }

    fn write_steps(
        &mut self,
        state: &mut WriteState,
        value: &Value,
        defining: Option<Defining>,
    ) -> Result<()> {
        if let Some(defining) = defining {
            self.solve_for_primary(state, value, defining)?;
        }
        if let Some(cid) = state.initiating {
            let c = self.constraint_mut(cid)?;
            c.update_counter += 1;
            if c.update_counter >= c.reevaluation_interval {
                self.reevaluate(cid)?;
                if let Ok(c) = self.constraint_mut(cid) {
                    c.update_counter = 0;
                }
            }
        }
        self.solve_for_connected(state.var, value, &state.old, state.origin, state.force)?;
        self.find_and_call_setters(state.var, state.call_setters);
        Ok(())
    }

    fn solve_for_primary(
        &mut self,
        state: &mut WriteState,
        value: &Value,
        defining: Defining,
    ) -> Result<()> {
        if !self.guards.suggesting.insert(state.var) {
            return Ok(());
        }
        if state.origin != Origin::Propagation {
            let closure = self.bump_weight_up(state.var, defining.solver);
            state.bumped = Some((defining.solver, closure));
        }
        let started = Instant::now();
        let result = self.suggest_external(defining.solver, defining.ext, value);
        self.guards.suggesting.remove(&state.var);
        self.log_solve_timing(defining.constraint, defining.solver, started, "write");
        result
    }

    /// Suggests `value` to one external variable with its read-only flag
    /// lifted for the call.
    pub(crate) fn suggest_external(
        &mut self,
        solver: SolverId,
        ext: ExtVarHandle,
        value: &Value,
    ) -> Result<()> {
        let name = self.solver_name(solver);
        let s = self.solver_mut(solver)?;
        let was_readonly = s.is_readonly(ext);
        s.set_readonly(ext, false);
        let result = s.suggest_value(ext, value);
        s.set_readonly(ext, was_readonly);
        result.map_err(|e| KeepForgeError::from_solver(name, e))
    }

    pub(crate) fn solve_for_connected(
        &mut self,
        var: VarId,
        value: &Value,
        old: &Value,
        origin: Origin,
        force: bool,
    ) -> Result<()> {
        if !force && values_equal(value, &self.stored_value(var)?) {
            return Ok(());
        }
        if !self.guards.storing.insert(var) {
            return Ok(());
        }
        let result = self
            .update_downstream_external(var, value)
            .and_then(|()| self.update_downstream_unsolvable(var, value))
            .and_then(|()| self.update_connected(var));
        self.guards.storing.remove(&var);

        if let Err(error) = result {
            if origin == Origin::Source {
                if let Err(restore) = self.suggest_value(var, old.clone(), Origin::Restore, true) {
                    warn!(field = %self.field_label(var), error = %restore, "could not restore prior value");
                }
            }
            return Err(error);
        }
        Ok(())
    }

    /// Hands the value to every binding except the defining one.
    pub(crate) fn update_downstream_external(&mut self, var: VarId, value: &Value) -> Result<()> {
        let defining = self.defining(var).map(|d| d.solver);
        let targets: Vec<(SolverId, ExtVarHandle)> = self
            .expect_variable(var)?
            .external
            .iter()
            .filter(|(s, _)| Some(**s) != defining)
            .filter_map(|(s, e)| e.map(|e| (*s, e)))
            .collect();
        for (solver, ext) in targets {
            self.suggest_external(solver, ext, value)?;
        }
        Ok(())
    }

    fn update_downstream_unsolvable(&mut self, var: VarId, value: &Value) -> Result<()> {
        let v = self.expect_variable(var)?;
        let value_class = v.shadow.as_decomposable().is_some()
            && value.as_decomposable().is_some()
            && self.defining(var).is_none();

        if value_class {
            let parts: Vec<(String, VarId)> =
                v.parts.iter().map(|(n, p)| (n.clone(), *p)).collect();
            if !self.guards.value_class {
                self.guards.value_class = true;
                let result = parts.into_iter().try_for_each(|(name, part)| {
                    let Some(n) = value.as_decomposable().and_then(|d| d.part(&name)) else {
                        return Ok(());
                    };
                    self.suggest_value(part, Value::Number(n), Origin::Propagation, false)
                        .map(|_| ())
                });
                self.guards.value_class = false;
                result?;
            }
            if let Some(v) = self.variable_mut(var) {
                v.shadow = value.clone();
            }
            return Ok(());
        }

        let stale: Vec<ConstraintId> = v
            .constraints
            .iter()
            .copied()
            .filter(|cid| {
                self.constraint(*cid)
                    .is_ok_and(|c| !matches!(v.external.get(&c.solver), Some(Some(_))))
            })
            .collect();
        if let Some(v) = self.variable_mut(var) {
            v.shadow = value.clone();
        }
        for cid in stale {
            self.recalculate(cid)?;
        }
        Ok(())
    }

    /// Re-suggests every variable sharing a constraint with `var`.
    fn update_connected(&mut self, var: VarId) -> Result<()> {
        let mut connected: Vec<VarId> = Vec::new();
        for cid in self.expect_variable(var)?.constraints.iter() {
            if let Ok(c) = self.constraint(*cid) {
                for other in &c.variables {
                    if !connected.contains(other) {
                        connected.push(*other);
                    }
                }
            }
        }
        for other in connected {
            if self.variable(other).is_none() {
                continue;
            }
            let value = self.read_var(other);
            self.suggest_value(other, value, Origin::Propagation, false)?;
        }
        Ok(())
    }

    // ---- weight bumping ----

    fn bump_weight_up(&mut self, var: VarId, solver: SolverId) -> Rc<[VarId]> {
        let closure = self.connected_closure(var);
        self.bump_weight(solver, &closure, true);
        closure
    }

    fn bump_weight(&mut self, solver: SolverId, closure: &[VarId], up: bool) {
        let bump = self.config.weight_bump;
        if let Ok(s) = self.solver_mut(solver) {
            let weight = s.weight();
            s.set_weight(if up { weight + bump } else { weight - bump });
        }
        self.guards.tick();
        for var in closure {
            self.set_downstream_readonly(*var, up);
        }
    }

    /// Pins the non-defining bindings of `var` read-only, or releases the
    /// ones pinned before.
    fn set_downstream_readonly(&mut self, var: VarId, pin: bool) {
        if pin {
            let Some(v) = self.variable(var) else { return };
            if v.downstream_readonly.is_some() {
                return;
            }
            let defining = self.defining(var).map(|d| d.solver);
            let candidates: Vec<(SolverId, ExtVarHandle)> = v
                .external
                .iter()
                .filter(|(s, _)| Some(**s) != defining)
                .filter_map(|(s, e)| e.map(|e| (*s, e)))
                .collect();
            let mut pinned = Vec::new();
            for (solver, ext) in candidates {
                if let Ok(s) = self.solver_mut(solver) {
                    if !s.is_readonly(ext) {
                        s.set_readonly(ext, true);
                        pinned.push((solver, ext));
                    }
                }
            }
            if let Some(v) = self.variable_mut(var) {
                v.downstream_readonly = Some(pinned);
            }
        } else {
            let pinned = self
                .variable_mut(var)
                .and_then(|v| v.downstream_readonly.take())
                .unwrap_or_default();
            for (solver, ext) in pinned {
                if let Ok(s) = self.solver_mut(solver) {
                    s.set_readonly(ext, false);
                }
            }
        }
    }

    /// Every variable reachable from `var` through shared constraints,
    /// `var` included. Cached until the next generation tick.
    pub(crate) fn connected_closure(&self, var: VarId) -> Rc<[VarId]> {
        if let Some(v) = self.variable(var) {
            if let Some((generation, closure)) = &*v.closure.borrow() {
                if *generation == self.guards.generation {
                    return closure.clone();
                }
            }
        }
        let mut seen = BTreeSet::new();
        let mut order = Vec::new();
        let mut queue = VecDeque::from([var]);
        while let Some(next) = queue.pop_front() {
            if !seen.insert(next) {
                continue;
            }
            let Some(v) = self.variable(next) else { continue };
            order.push(next);
            for cid in &v.constraints {
                if let Ok(c) = self.constraint(*cid) {
                    queue.extend(c.variables.iter().copied());
                }
            }
        }
        let closure: Rc<[VarId]> = order.into();
        if let Some(v) = self.variable(var) {
            *v.closure.borrow_mut() = Some((self.guards.generation, closure.clone()));
        }
        closure
    }

    // ---- dependent setters ----

    fn find_setter(&self, var: VarId) -> Option<(ObjectId, String, SetterHook)> {
        let v = self.variable(var)?;
        if let VarKey::Field { obj, name } = &v.key {
            if let Some(hook) = self.heap.setter(*obj, name) {
                return Some((*obj, name.clone(), hook));
            }
        }
        self.find_setter(v.parent?)
    }

    fn find_and_call_setters(&mut self, var: VarId, call_setters: bool) {
        if self.defining(var).is_some() {
            if let Some(setter) = self.find_setter(var) {
                if let Some(pending) = self.pending_setters.as_mut() {
                    pending.push(setter);
                }
            }
        }
        if !call_setters {
            return;
        }
        let pending = self.pending_setters.take().unwrap_or_default();
        let mut called: Vec<(ObjectId, String)> = Vec::new();
        self.guards.calling_setters = true;
        for (receiver, field, hook) in pending {
            if called.iter().any(|(r, f)| *r == receiver && *f == field) {
                continue;
            }
            match self.get(receiver, &field) {
                Ok(current) => hook(self, receiver, &current),
                Err(error) => warn!(%receiver, field = %field, %error, "skipped setter hook"),
            }
            called.push((receiver, field));
        }
        self.guards.calling_setters = false;
    }

    pub(crate) fn log_solve_timing(
        &self,
        constraint: Option<ConstraintId>,
        solver: SolverId,
        started: Instant,
        during: &'static str,
    ) {
        let enabled = constraint
            .and_then(|cid| self.constraint(cid).ok())
            .and_then(|c| c.options.log_timings)
            .unwrap_or(self.config.log_timings);
        if enabled {
            debug!(
                event = "solve_timing",
                solver = %self.solver_name(solver),
                elapsed_ms = started.elapsed().as_secs_f64() * 1000.0,
                during,
            );
        }
    }
}

#[cfg(test)]
#[path = "variable_tests.rs"]
mod tests;

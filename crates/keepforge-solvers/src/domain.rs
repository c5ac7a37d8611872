//! Finite-domain backtracking search.
//!
//! `x in [..]` conjuncts restrict a variable's domain while their primitive
//! is enabled. Variables without a domain keep their current value. The
//! search tries each variable's current value first, so a satisfied model is
//! left untouched.

use std::collections::{BTreeMap, BTreeSet};

use keepforge_config::DomainConfig;
use keepforge_core::{
    values_equal, Capabilities, ExtVarHandle, Op, Priority, PrimitiveHandle, Solver, SolverError,
    SolverStats, Term, TypeTag, Value,
};
use tracing::trace;

use crate::store::{PrimitiveStore, VariableStore};

#[derive(Debug, Clone)]
enum DomainPrimitive {
    Predicate(Term),
    Identical { var: ExtVarHandle, value: Value },
}

/// A compiled predicate with its variables, ready for checking.
struct Check {
    term: Term,
    vars: Vec<ExtVarHandle>,
}

struct Search<'a> {
    checks: &'a [Check],
    order: &'a [ExtVarHandle],
    domains: &'a BTreeMap<ExtVarHandle, Vec<Value>>,
    values: BTreeMap<ExtVarHandle, Value>,
    assigned: BTreeSet<ExtVarHandle>,
    nodes: u64,
    max_nodes: u64,
}

impl Search<'_> {
    fn consistent(&self) -> bool {
        let lookup = |v: ExtVarHandle| self.values.get(&v).cloned().unwrap_or_default();
        self.checks
            .iter()
            .filter(|c| c.vars.iter().all(|v| self.assigned.contains(v)))
            .all(|c| c.term.evaluate(&lookup) == Value::Bool(true))
    }

    fn run(&mut self, depth: usize) -> Result<bool, SolverError> {
        if !self.consistent() {
            return Ok(false);
        }
        let Some(&var) = self.order.get(depth) else {
            return Ok(true);
        };
        let domain = self.domains.get(&var).map(Vec::as_slice).unwrap_or(&[]);
        let current = self.values.get(&var).cloned().unwrap_or_default();
        let mut candidates: Vec<Value> = Vec::with_capacity(domain.len() + 1);
        if domain.iter().any(|d| values_equal(d, &current)) {
            candidates.push(current.clone());
        }
        candidates.extend(domain.iter().filter(|d| !values_equal(d, &current)).cloned());

        self.assigned.insert(var);
        for candidate in candidates {
            self.nodes += 1;
            if self.nodes > self.max_nodes {
                return Err(SolverError::Unsatisfiable(format!(
                    "search gave up after {} nodes",
                    self.max_nodes
                )));
            }
            self.values.insert(var, candidate);
            if self.run(depth + 1)? {
                return Ok(true);
            }
        }
        self.assigned.remove(&var);
        self.values.insert(var, current);
        Ok(false)
    }
}

/// Finite-domain solver over numbers, text and booleans.
#[derive(Debug)]
pub struct DomainSolver {
    name: String,
    weight: f64,
    config: DomainConfig,
    vars: VariableStore,
    primitives: PrimitiveStore<DomainPrimitive>,
    stats: SolverStats,
}

impl Default for DomainSolver {
    fn default() -> Self {
        Self::new()
    }
}

impl DomainSolver {
    pub fn new() -> Self {
        Self::with_config(DomainConfig::default())
    }

    pub fn with_config(config: DomainConfig) -> Self {
        Self {
            name: "domain".to_string(),
            weight: 50.0,
            config,
            vars: VariableStore::new(),
            primitives: PrimitiveStore::default(),
            stats: SolverStats::default(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    fn restrict(domains: &mut BTreeMap<ExtVarHandle, Vec<Value>>, var: ExtVarHandle, allowed: &[Value]) {
        match domains.get_mut(&var) {
            Some(existing) => existing.retain(|v| allowed.iter().any(|a| values_equal(a, v))),
            None => {
                domains.insert(var, allowed.to_vec());
            }
        }
    }

    fn search(&mut self, fixed: Option<ExtVarHandle>) -> Result<(), SolverError> {
        let mut checks: Vec<Check> = Vec::new();
        let mut domains: BTreeMap<ExtVarHandle, Vec<Value>> = BTreeMap::new();
        let mut values: BTreeMap<ExtVarHandle, Value> = BTreeMap::new();
        let mut pinned: BTreeSet<ExtVarHandle> = fixed.into_iter().collect();

        for (primitive, priority) in self.primitives.enabled() {
            match primitive {
                DomainPrimitive::Predicate(term) => {
                    for conjunct in term.conjuncts() {
                        if let Term::InDomain(inner, allowed) = conjunct {
                            if let Term::Var(var) = inner.as_ref() {
                                Self::restrict(&mut domains, *var, allowed);
                            }
                        }
                    }
                    checks.push(Check {
                        term: term.clone(),
                        vars: term.variables().into_vec(),
                    });
                }
                DomainPrimitive::Identical { var, value } => {
                    if Some(*var) != fixed && priority.is_required() {
                        values.insert(*var, value.clone());
                        pinned.insert(*var);
                    }
                }
            }
        }

        let mut involved: Vec<ExtVarHandle> = Vec::new();
        for check in &checks {
            for var in &check.vars {
                if !involved.contains(var) {
                    involved.push(*var);
                }
            }
        }
        for var in &involved {
            values.entry(*var).or_insert_with(|| self.vars.value(*var));
        }

        let order: Vec<ExtVarHandle> = involved
            .iter()
            .copied()
            .filter(|v| !pinned.contains(v) && !self.vars.is_readonly(*v) && domains.contains_key(v))
            .collect();
        let assigned: BTreeSet<ExtVarHandle> = involved
            .iter()
            .copied()
            .filter(|v| !order.contains(v))
            .collect();

        let mut search = Search {
            checks: &checks,
            order: &order,
            domains: &domains,
            values,
            assigned,
            nodes: 0,
            max_nodes: self.config.max_nodes,
        };
        if !search.run(0)? {
            return Err(SolverError::Unsatisfiable(
                "no assignment within the finite domains satisfies every predicate".to_string(),
            ));
        }
        trace!(solver = %self.name, nodes = search.nodes, "domain search finished");
        for (var, value) in search.values {
            if let Ok(slot) = self.vars.get_mut(var) {
                slot.value = value;
            }
        }
        Ok(())
    }
}

impl Solver for DomainSolver {
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
            finite_domains: true,
            edit: false,
            data_types: vec![TypeTag::Number, TypeTag::Text, TypeTag::Bool],
        }
    }

    fn supports_operation(&self, _op: Op) -> bool {
        true
    }

    fn variable_for(&mut self, value: &Value, field_name: &str) -> Option<ExtVarHandle> {
        match value {
            Value::Number(_) | Value::Text(_) | Value::Bool(_) => {
                Some(self.vars.insert(field_name, value.clone()))
            }
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
        self.stats.constraint_constructions += 1;
        Ok(self.primitives.insert(DomainPrimitive::Predicate(term.clone())))
    }

    fn identical(&mut self, var: ExtVarHandle, value: &Value) -> Result<PrimitiveHandle, SolverError> {
        self.vars.get(var)?;
        self.stats.constraint_constructions += 1;
        Ok(self.primitives.insert(DomainPrimitive::Identical {
            var,
            value: value.clone(),
        }))
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
        self.search(None)
    }

    fn value(&self, var: ExtVarHandle) -> Value {
        self.vars.value(var)
    }

    fn suggest_value(&mut self, var: ExtVarHandle, value: &Value) -> Result<(), SolverError> {
        self.stats.solve_calls += 1;
        let previous = self.vars.get(var)?.value.clone();
        self.vars.get_mut(var)?.value = value.clone();
        let result = self.search(Some(var));
        if result.is_err() {
            self.vars.get_mut(var)?.value = previous;
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
mod tests {
    use super::*;

    fn in_domain(var: ExtVarHandle, values: &[Value]) -> Term {
        Term::InDomain(Box::new(Term::Var(var)), values.to_vec())
    }

    #[test]
    fn test_moves_into_domain() {
        let mut solver = DomainSolver::new();
        let x = solver.variable_for(&Value::Number(0.0), "x").unwrap();
        let p = solver
            .compile(&in_domain(x, &[1.into(), 2.into(), 3.into()]))
            .unwrap();
        solver.enable_primitive(p, Priority::Required).unwrap();
        solver.solve().unwrap();
        assert_eq!(solver.value(x), Value::Number(1.0));

        solver.suggest_value(x, &Value::Number(3.0)).unwrap();
        assert_eq!(solver.value(x), Value::Number(3.0));
        assert!(solver.suggest_value(x, &Value::Number(7.0)).is_err());
        assert_eq!(solver.value(x), Value::Number(3.0));
    }

    #[test]
    fn test_empty_intersection_fails() {
        let mut solver = DomainSolver::new();
        let x = solver.variable_for(&Value::Number(1.0), "x").unwrap();
        let p = solver
            .compile(&in_domain(x, &[1.into(), 2.into(), 3.into()]))
            .unwrap();
        let q = solver
            .compile(&Term::binary(Op::Ge, Term::Var(x), Term::Const(5.into())))
            .unwrap();
        solver.enable_primitive(p, Priority::Required).unwrap();
        solver.enable_primitive(q, Priority::Required).unwrap();
        assert!(matches!(solver.solve(), Err(SolverError::Unsatisfiable(_))));
        assert_eq!(solver.value(x), Value::Number(1.0));
    }

    #[test]
    fn test_text_domain_follows_fixed_partner() {
        let mut solver = DomainSolver::new();
        let shoes = solver.variable_for(&Value::from("white"), "shoes").unwrap();
        let belt = solver.variable_for(&Value::from("black"), "belt").unwrap();
        let term = Term::binary(
            Op::And,
            in_domain(shoes, &["brown".into(), "black".into()]),
            Term::binary(Op::Eq, Term::Var(shoes), Term::Var(belt)),
        );
        let p = solver.compile(&term).unwrap();
        solver.enable_primitive(p, Priority::Required).unwrap();
        solver.solve().unwrap();
        assert_eq!(solver.value(shoes), Value::from("black"));
        assert_eq!(solver.value(belt), Value::from("black"));
    }

    #[test]
    fn test_node_limit() {
        let mut solver = DomainSolver::with_config(DomainConfig { max_nodes: 2 });
        let x = solver.variable_for(&Value::Number(0.0), "x").unwrap();
        let domain: Vec<Value> = (1..=10).map(Value::from).collect();
        let p = solver
            .compile(&Term::binary(
                Op::And,
                in_domain(x, &domain),
                Term::binary(Op::Eq, Term::Var(x), Term::Const(10.into())),
            ))
            .unwrap();
        solver.enable_primitive(p, Priority::Required).unwrap();
        let err = solver.solve().unwrap_err();
        assert!(err.to_string().contains("gave up"));
    }

    #[test]
    fn test_capabilities() {
        let mut solver = DomainSolver::new();
        assert!(solver.capabilities().finite_domains);
        assert!(solver.capabilities().supports_type(TypeTag::Text));
        assert!(solver.variable_for(&Value::Point(Default::default()), "p").is_none());
    }
}

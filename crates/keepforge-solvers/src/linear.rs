//! Linear forms extracted from relation terms.
//!
//! Both numeric solvers accept conjunctions of linear relations
//! `sum(c_i * x_i) + k REL 0`. This module lowers a [`Term`] into that shape
//! and rejects everything else as unsupported.

use std::collections::BTreeMap;

use keepforge_core::{ExtVarHandle, Op, SolverError, Term, Value};

/// Coefficients smaller than this are treated as zero.
const EPSILON: f64 = 1e-12;

/// Comparison of a linear form against zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    Eq,
    Le,
    Ge,
}

/// `sum(coefficients[x] * x) + constant`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LinearForm {
    pub coefficients: BTreeMap<ExtVarHandle, f64>,
    pub constant: f64,
}

impl LinearForm {
    pub fn constant(value: f64) -> Self {
        Self {
            coefficients: BTreeMap::new(),
            constant: value,
        }
    }

    pub fn variable(var: ExtVarHandle) -> Self {
        let mut coefficients = BTreeMap::new();
        coefficients.insert(var, 1.0);
        Self {
            coefficients,
            constant: 0.0,
        }
    }

    /// Lowers an arithmetic term. Fails on non-linear or non-numeric parts.
    pub fn from_term(term: &Term) -> Result<Self, SolverError> {
        match term {
            Term::Var(v) => Ok(Self::variable(*v)),
            Term::Const(Value::Number(n)) => Ok(Self::constant(*n)),
            Term::Const(other) => Err(SolverError::Unsupported(format!(
                "non-numeric constant {other} in a linear term"
            ))),
            Term::Unary(Op::Neg, t) => Ok(Self::from_term(t)?.scaled(-1.0)),
            Term::Binary(Op::Add, l, r) => Ok(Self::from_term(l)?.plus(Self::from_term(r)?, 1.0)),
            Term::Binary(Op::Sub, l, r) => {
                Ok(Self::from_term(l)?.plus(Self::from_term(r)?, -1.0))
            }
            Term::Binary(Op::Mul, l, r) => {
                let l = Self::from_term(l)?;
                let r = Self::from_term(r)?;
                if l.is_constant() {
                    Ok(r.scaled(l.constant))
                } else if r.is_constant() {
                    Ok(l.scaled(r.constant))
                } else {
                    Err(SolverError::Unsupported(format!(
                        "non-linear product `{term}`"
                    )))
                }
            }
            Term::Binary(Op::Div, l, r) => {
                let r = Self::from_term(r)?;
                if !r.is_constant() {
                    return Err(SolverError::Unsupported(format!(
                        "division by a variable in `{term}`"
                    )));
                }
                if r.constant.abs() < EPSILON {
                    return Err(SolverError::Unsupported(format!(
                        "division by zero in `{term}`"
                    )));
                }
                Ok(Self::from_term(l)?.scaled(1.0 / r.constant))
            }
            Term::Unary(op, _) | Term::Binary(op, _, _) => Err(SolverError::Unsupported(
                format!("`{op}` in a linear term"),
            )),
            Term::InDomain(..) => Err(SolverError::Unsupported(
                "finite domains in a linear term".to_string(),
            )),
        }
    }

    pub fn plus_constant(mut self, value: f64) -> Self {
        self.constant += value;
        self
    }

    pub fn is_constant(&self) -> bool {
        self.coefficients.is_empty()
    }

    pub fn evaluate(&self, value: impl Fn(ExtVarHandle) -> f64) -> f64 {
        self.coefficients
            .iter()
            .map(|(var, c)| c * value(*var))
            .sum::<f64>()
            + self.constant
    }

    fn scaled(mut self, factor: f64) -> Self {
        for c in self.coefficients.values_mut() {
            *c *= factor;
        }
        self.constant *= factor;
        self.prune();
        self
    }

    fn plus(mut self, other: Self, sign: f64) -> Self {
        for (var, c) in other.coefficients {
            *self.coefficients.entry(var).or_insert(0.0) += sign * c;
        }
        self.constant += sign * other.constant;
        self.prune();
        self
    }

    fn prune(&mut self) {
        self.coefficients.retain(|_, c| c.abs() >= EPSILON);
    }
}

/// A linear relation `form REL 0`.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearRelation {
    pub form: LinearForm,
    pub relation: Relation,
}

impl LinearRelation {
    /// Returns the signed amount by which the relation is violated, or
    /// `None` when it holds within `tolerance`.
    pub fn violation(&self, value: impl Fn(ExtVarHandle) -> f64, tolerance: f64) -> Option<f64> {
        let residual = self.form.evaluate(value);
        let violated = match self.relation {
            Relation::Eq => residual.abs() > tolerance,
            Relation::Le => residual > tolerance,
            Relation::Ge => residual < -tolerance,
        };
        violated.then_some(residual)
    }

    pub fn variables(&self) -> impl Iterator<Item = ExtVarHandle> + '_ {
        self.form.coefficients.keys().copied()
    }
}

/// Splits a relation term into linear relations, one per conjunct.
pub fn relations(term: &Term) -> Result<Vec<LinearRelation>, SolverError> {
    let mut out = Vec::new();
    for conjunct in term.conjuncts() {
        let (op, l, r) = match conjunct {
            Term::Const(Value::Bool(true)) => continue,
            Term::Binary(op, l, r) => (*op, l, r),
            other => {
                return Err(SolverError::Unsupported(format!(
                    "`{other}` is not a linear relation"
                )))
            }
        };
        let relation = match op {
            Op::Eq => Relation::Eq,
            Op::Le => Relation::Le,
            Op::Ge => Relation::Ge,
            other => {
                return Err(SolverError::Unsupported(format!(
                    "`{other}` is not a linear relation"
                )))
            }
        };
        let form = LinearForm::from_term(l)?.plus(LinearForm::from_term(r)?, -1.0);
        out.push(LinearRelation { form, relation });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(i: usize) -> Term {
        Term::Var(ExtVarHandle(i))
    }

    fn num(n: f64) -> Term {
        Term::Const(Value::Number(n))
    }

    #[test]
    fn test_temperature_relation() {
        // f - 32 == c * 1.8
        let term = Term::binary(
            Op::Eq,
            Term::binary(Op::Sub, var(0), num(32.0)),
            Term::binary(Op::Mul, var(1), num(1.8)),
        );
        let rels = relations(&term).unwrap();
        assert_eq!(rels.len(), 1);
        let form = &rels[0].form;
        assert_eq!(form.coefficients[&ExtVarHandle(0)], 1.0);
        assert_eq!(form.coefficients[&ExtVarHandle(1)], -1.8);
        assert_eq!(form.constant, -32.0);
        assert!(rels[0].violation(|v| if v.0 == 0 { 212.0 } else { 100.0 }, 1e-9).is_none());
    }

    #[test]
    fn test_conjunction_splits() {
        let term = Term::binary(
            Op::And,
            Term::binary(Op::Ge, var(0), num(1.0)),
            Term::binary(Op::Le, var(0), num(5.0)),
        );
        let rels = relations(&term).unwrap();
        assert_eq!(rels.len(), 2);
        assert_eq!(rels[0].relation, Relation::Ge);
        assert_eq!(rels[1].relation, Relation::Le);
    }

    #[test]
    fn test_cancelling_terms_are_pruned() {
        let term = Term::binary(Op::Eq, Term::binary(Op::Sub, var(0), var(0)), num(0.0));
        let rels = relations(&term).unwrap();
        assert!(rels[0].form.is_constant());
    }

    #[test]
    fn test_rejects_non_linear() {
        let term = Term::binary(Op::Eq, Term::binary(Op::Mul, var(0), var(1)), num(2.0));
        assert!(matches!(relations(&term), Err(SolverError::Unsupported(_))));

        let term = Term::binary(Op::Lt, var(0), num(2.0));
        assert!(matches!(relations(&term), Err(SolverError::Unsupported(_))));
    }

    #[test]
    fn test_violation_sign() {
        let rel = LinearRelation {
            form: LinearForm::from_term(&Term::binary(Op::Sub, var(0), num(100.0))).unwrap(),
            relation: Relation::Ge,
        };
        assert_eq!(rel.violation(|_| 8.0, 1e-9), Some(-92.0));
        assert_eq!(rel.violation(|_| 110.0, 1e-9), None);
    }
}

//! Solver-neutral term IR.
//!
//! The evaluator lowers the solver-aware parts of a predicate into a `Term`
//! whose leaves are the solver's own variable handles. Each solver compiles
//! terms into its native representation.

use std::fmt;

use smallvec::SmallVec;

use crate::ids::ExtVarHandle;
use crate::ops::{apply_binary, apply_unary, in_domain, Op};
use crate::value::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    Var(ExtVarHandle),
    Const(Value),
    Unary(Op, Box<Term>),
    Binary(Op, Box<Term>, Box<Term>),
    InDomain(Box<Term>, Vec<Value>),
}

impl Term {
    pub fn unary(op: Op, term: Term) -> Self {
        Term::Unary(op, Box::new(term))
    }

    pub fn binary(op: Op, left: Term, right: Term) -> Self {
        Term::Binary(op, Box::new(left), Box::new(right))
    }

    /// Evaluates the term with variable values supplied by `lookup`.
    pub fn evaluate(&self, lookup: &dyn Fn(ExtVarHandle) -> Value) -> Value {
        match self {
            Term::Var(v) => lookup(*v),
            Term::Const(c) => c.clone(),
            Term::Unary(op, t) => apply_unary(*op, &t.evaluate(lookup)),
            Term::Binary(op, l, r) => apply_binary(*op, &l.evaluate(lookup), &r.evaluate(lookup)),
            Term::InDomain(t, domain) => in_domain(&t.evaluate(lookup), domain),
        }
    }

    /// Returns the distinct variables of the term, in first-occurrence order.
    pub fn variables(&self) -> SmallVec<[ExtVarHandle; 4]> {
        let mut out = SmallVec::new();
        self.collect_variables(&mut out);
        out
    }

    fn collect_variables(&self, out: &mut SmallVec<[ExtVarHandle; 4]>) {
        match self {
            Term::Var(v) => {
                if !out.contains(v) {
                    out.push(*v);
                }
            }
            Term::Const(_) => {}
            Term::Unary(_, t) | Term::InDomain(t, _) => t.collect_variables(out),
            Term::Binary(_, l, r) => {
                l.collect_variables(out);
                r.collect_variables(out);
            }
        }
    }

    /// Splits top-level conjunctions into their conjuncts.
    pub fn conjuncts(&self) -> Vec<&Term> {
        match self {
            Term::Binary(Op::And, l, r) => {
                let mut out = l.conjuncts();
                out.extend(r.conjuncts());
                out
            }
            other => vec![other],
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Var(v) => write!(f, "{v}"),
            Term::Const(c) => write!(f, "{c}"),
            Term::Unary(op, t) => write!(f, "({op}{t})"),
            Term::Binary(op, l, r) => write!(f, "({l} {op} {r})"),
            Term::InDomain(t, d) => write!(f, "({t} in {} values)", d.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Term {
        // (ext#0 + ext#1 == 3) && (ext#2 >= ext#0)
        let sum = Term::binary(Op::Add, Term::Var(ExtVarHandle(0)), Term::Var(ExtVarHandle(1)));
        let eq = Term::binary(Op::Eq, sum, Term::Const(Value::Number(3.0)));
        let ge = Term::binary(Op::Ge, Term::Var(ExtVarHandle(2)), Term::Var(ExtVarHandle(0)));
        Term::binary(Op::And, eq, ge)
    }

    #[test]
    fn test_variables_are_distinct_and_ordered() {
        let vars = sample().variables();
        assert_eq!(vars.as_slice(), &[ExtVarHandle(0), ExtVarHandle(1), ExtVarHandle(2)]);
    }

    #[test]
    fn test_conjuncts() {
        let term = sample();
        assert_eq!(term.conjuncts().len(), 2);
    }

    #[test]
    fn test_evaluate() {
        let term = sample();
        let values = [1.0, 2.0, 5.0];
        let result = term.evaluate(&|v| Value::Number(values[v.index()]));
        assert_eq!(result, Value::Bool(true));
        let result = term.evaluate(&|_| Value::Number(0.0));
        assert_eq!(result, Value::Bool(false));
    }
}

//! Operators shared by predicates and solver terms, and their native semantics.

use std::fmt;

use crate::value::{compare_values, values_equal, Value};

/// An operator appearing in a predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Op {
    Add,
    Sub,
    Mul,
    Div,
    Neg,
    Abs,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Not,
    /// Finite domain membership.
    InDomain,
}

impl Op {
    /// Returns true for operators that yield a boolean relation.
    pub fn is_relation(self) -> bool {
        matches!(
            self,
            Op::Eq | Op::Ne | Op::Lt | Op::Le | Op::Gt | Op::Ge | Op::InDomain
        )
    }

    /// Returns true for the boolean connectives.
    pub fn is_logical(self) -> bool {
        matches!(self, Op::And | Op::Or | Op::Not)
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Op::Add => "+",
            Op::Sub => "-",
            Op::Mul => "*",
            Op::Div => "/",
            Op::Neg => "-",
            Op::Abs => "abs",
            Op::Eq => "==",
            Op::Ne => "!=",
            Op::Lt => "<",
            Op::Le => "<=",
            Op::Gt => ">",
            Op::Ge => ">=",
            Op::And => "&&",
            Op::Or => "||",
            Op::Not => "!",
            Op::InDomain => "in",
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Applies a unary operator natively. Ill-typed operands yield `Value::None`.
pub fn apply_unary(op: Op, v: &Value) -> Value {
    match (op, v) {
        (Op::Neg, Value::Number(n)) => Value::Number(-n),
        (Op::Abs, Value::Number(n)) => Value::Number(n.abs()),
        (Op::Not, Value::Bool(b)) => Value::Bool(!b),
        (Op::Not, Value::None) => Value::Bool(true),
        _ => Value::None,
    }
}

/// Applies a binary operator natively. Ill-typed operands yield `Value::None`.
pub fn apply_binary(op: Op, l: &Value, r: &Value) -> Value {
    match op {
        Op::Add => match (l, r) {
            (Value::Number(a), Value::Number(b)) => Value::Number(a + b),
            (Value::Text(a), Value::Text(b)) => Value::Text(format!("{a}{b}")),
            (Value::Text(a), b) => Value::Text(format!("{a}{b}")),
            _ => Value::None,
        },
        Op::Sub => numeric(l, r, |a, b| a - b),
        Op::Mul => numeric(l, r, |a, b| a * b),
        Op::Div => numeric(l, r, |a, b| a / b),
        Op::Eq => Value::Bool(values_equal(l, r)),
        Op::Ne => Value::Bool(!values_equal(l, r)),
        Op::Lt => Value::Bool(compare_values(l, r).is_some_and(|o| o.is_lt())),
        Op::Le => Value::Bool(
            compare_values(l, r).is_some_and(|o| o.is_le()) || values_equal(l, r),
        ),
        Op::Gt => Value::Bool(compare_values(l, r).is_some_and(|o| o.is_gt())),
        Op::Ge => Value::Bool(
            compare_values(l, r).is_some_and(|o| o.is_ge()) || values_equal(l, r),
        ),
        Op::And => match (l.as_bool(), r.as_bool()) {
            (Some(a), Some(b)) => Value::Bool(a && b),
            _ => Value::Bool(false),
        },
        Op::Or => match (l.as_bool(), r.as_bool()) {
            (Some(a), Some(b)) => Value::Bool(a || b),
            _ => Value::Bool(false),
        },
        Op::Neg | Op::Abs | Op::Not | Op::InDomain => Value::None,
    }
}

/// Tests finite domain membership natively.
pub fn in_domain(v: &Value, domain: &[Value]) -> Value {
    Value::Bool(domain.iter().any(|d| values_equal(v, d)))
}

fn numeric(l: &Value, r: &Value, f: impl Fn(f64, f64) -> f64) -> Value {
    match (l, r) {
        (Value::Number(a), Value::Number(b)) => Value::Number(f(*a, *b)),
        _ => Value::None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arithmetic() {
        let v = apply_binary(Op::Add, &Value::Number(2.0), &Value::Number(3.0));
        assert_eq!(v, Value::Number(5.0));
        let v = apply_binary(Op::Div, &Value::Number(1.0), &Value::Number(4.0));
        assert_eq!(v, Value::Number(0.25));
        assert_eq!(apply_unary(Op::Neg, &Value::Number(2.0)), Value::Number(-2.0));
    }

    #[test]
    fn test_string_concatenation() {
        let v = apply_binary(Op::Add, &Value::Text("n".into()), &Value::Number(12.0));
        assert_eq!(v, Value::Text("n12".into()));
    }

    #[test]
    fn test_relations() {
        let two = Value::Number(2.0);
        let three = Value::Number(3.0);
        assert_eq!(apply_binary(Op::Lt, &two, &three), Value::Bool(true));
        assert_eq!(apply_binary(Op::Ge, &two, &three), Value::Bool(false));
        assert_eq!(apply_binary(Op::Le, &two, &two), Value::Bool(true));
        assert_eq!(apply_binary(Op::Ne, &two, &three), Value::Bool(true));
    }

    #[test]
    fn test_ill_typed_is_none() {
        assert_eq!(
            apply_binary(Op::Mul, &Value::Bool(true), &Value::Number(1.0)),
            Value::None
        );
        assert_eq!(apply_unary(Op::Abs, &Value::Text("x".into())), Value::None);
    }

    #[test]
    fn test_in_domain() {
        let domain = vec![Value::from("brown"), Value::from("black")];
        assert_eq!(in_domain(&Value::from("black"), &domain), Value::Bool(true));
        assert_eq!(in_domain(&Value::from("blue"), &domain), Value::Bool(false));
    }

    #[test]
    fn test_classification() {
        assert!(Op::Le.is_relation());
        assert!(!Op::Add.is_relation());
        assert!(Op::And.is_logical());
        assert_eq!(Op::Ge.to_string(), ">=");
    }
}

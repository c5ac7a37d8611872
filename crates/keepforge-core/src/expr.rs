//! Predicate expression trees.
//!
//! Predicates are built with operator overloading instead of being
//! reinterpreted from source: `+ - * /` and unary `-` come from `std::ops`,
//! relations and connectives are methods (`equals`, `le`, `and`, ...).
//! The engine evaluates the same tree once per candidate solver.

use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Not, Sub};

use crate::ids::ObjectId;
use crate::ops::{apply_binary, apply_unary, in_domain, Op};
use crate::value::Value;

/// An expression tree node of a predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Const(Value),
    /// A name bound through the request context (`ctx`).
    Name(String),
    /// Field access on an object (or part access on a value class).
    Member {
        base: Box<Expr>,
        name: String,
    },
    Unary(Op, Box<Expr>),
    Binary(Op, Box<Expr>, Box<Expr>),
    /// The solver may reference but never assign the wrapped field.
    Readonly(Box<Expr>),
    InDomain(Box<Expr>, Vec<Value>),
}

impl Expr {
    pub fn constant(value: impl Into<Value>) -> Self {
        Expr::Const(value.into())
    }

    pub fn name(name: impl Into<String>) -> Self {
        Expr::Name(name.into())
    }

    /// References `obj.name` directly, without a context binding.
    pub fn field(obj: ObjectId, name: impl Into<String>) -> Self {
        Expr::Member {
            base: Box::new(Expr::Const(Value::Object(obj))),
            name: name.into(),
        }
    }

    /// Member access: `self.name`.
    pub fn get(self, name: impl Into<String>) -> Self {
        Expr::Member {
            base: Box::new(self),
            name: name.into(),
        }
    }

    pub fn unary(op: Op, expr: Expr) -> Self {
        Expr::Unary(op, Box::new(expr))
    }

    pub fn binary(op: Op, left: Expr, right: Expr) -> Self {
        Expr::Binary(op, Box::new(left), Box::new(right))
    }

    pub fn equals(self, rhs: impl Into<Expr>) -> Self {
        Expr::binary(Op::Eq, self, rhs.into())
    }

    pub fn not_equals(self, rhs: impl Into<Expr>) -> Self {
        Expr::binary(Op::Ne, self, rhs.into())
    }

    pub fn lt(self, rhs: impl Into<Expr>) -> Self {
        Expr::binary(Op::Lt, self, rhs.into())
    }

    pub fn le(self, rhs: impl Into<Expr>) -> Self {
        Expr::binary(Op::Le, self, rhs.into())
    }

    pub fn gt(self, rhs: impl Into<Expr>) -> Self {
        Expr::binary(Op::Gt, self, rhs.into())
    }

    pub fn ge(self, rhs: impl Into<Expr>) -> Self {
        Expr::binary(Op::Ge, self, rhs.into())
    }

    pub fn and(self, rhs: impl Into<Expr>) -> Self {
        Expr::binary(Op::And, self, rhs.into())
    }

    pub fn or(self, rhs: impl Into<Expr>) -> Self {
        Expr::binary(Op::Or, self, rhs.into())
    }

    pub fn abs(self) -> Self {
        Expr::unary(Op::Abs, self)
    }

    /// Pins the wrapped field read-only for the solver.
    pub fn readonly(self) -> Self {
        Expr::Readonly(Box::new(self))
    }

    /// Restricts the value to a finite domain.
    pub fn in_domain<I, V>(self, domain: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Expr::InDomain(Box::new(self), domain.into_iter().map(Into::into).collect())
    }

    /// Evaluates a closed expression (no names, no fields) natively.
    pub fn fold(&self) -> Option<Value> {
        match self {
            Expr::Const(v) => Some(v.clone()),
            Expr::Name(_) | Expr::Member { .. } => None,
            Expr::Unary(op, e) => Some(apply_unary(*op, &e.fold()?)),
            Expr::Binary(op, l, r) => Some(apply_binary(*op, &l.fold()?, &r.fold()?)),
            Expr::Readonly(e) => e.fold(),
            Expr::InDomain(e, domain) => Some(in_domain(&e.fold()?, domain)),
        }
    }

    /// Returns true if the tree contains a finite domain restriction.
    pub fn has_finite_domain(&self) -> bool {
        match self {
            Expr::InDomain(..) => true,
            Expr::Const(_) | Expr::Name(_) => false,
            Expr::Member { base, .. } => base.has_finite_domain(),
            Expr::Unary(_, e) | Expr::Readonly(e) => e.has_finite_domain(),
            Expr::Binary(_, l, r) => l.has_finite_domain() || r.has_finite_domain(),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Const(v) => write!(f, "{v}"),
            Expr::Name(n) => f.write_str(n),
            Expr::Member { base, name } => write!(f, "{base}.{name}"),
            Expr::Unary(Op::Abs, e) => write!(f, "abs({e})"),
            Expr::Unary(op, e) => write!(f, "({op}{e})"),
            Expr::Binary(op, l, r) => write!(f, "({l} {op} {r})"),
            Expr::Readonly(e) => write!(f, "ro({e})"),
            Expr::InDomain(e, domain) => {
                write!(f, "({e} in [")?;
                for (i, v) in domain.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{v}")?;
                }
                f.write_str("])")
            }
        }
    }
}

impl From<Value> for Expr {
    fn from(v: Value) -> Self {
        Expr::Const(v)
    }
}

impl From<f64> for Expr {
    fn from(n: f64) -> Self {
        Expr::Const(Value::Number(n))
    }
}

impl From<i32> for Expr {
    fn from(n: i32) -> Self {
        Expr::Const(Value::from(n))
    }
}

impl From<bool> for Expr {
    fn from(b: bool) -> Self {
        Expr::Const(Value::Bool(b))
    }
}

impl From<&str> for Expr {
    fn from(s: &str) -> Self {
        Expr::Const(Value::from(s))
    }
}

macro_rules! binary_operator {
    ($trait:ident, $method:ident, $op:expr) => {
        impl $trait<Expr> for Expr {
            type Output = Expr;
            fn $method(self, rhs: Expr) -> Expr {
                Expr::binary($op, self, rhs)
            }
        }

        impl $trait<f64> for Expr {
            type Output = Expr;
            fn $method(self, rhs: f64) -> Expr {
                Expr::binary($op, self, Expr::from(rhs))
            }
        }

        impl $trait<Expr> for f64 {
            type Output = Expr;
            fn $method(self, rhs: Expr) -> Expr {
                Expr::binary($op, Expr::from(self), rhs)
            }
        }
    };
}

binary_operator!(Add, add, Op::Add);
binary_operator!(Sub, sub, Op::Sub);
binary_operator!(Mul, mul, Op::Mul);
binary_operator!(Div, div, Op::Div);

impl Neg for Expr {
    type Output = Expr;
    fn neg(self) -> Expr {
        Expr::unary(Op::Neg, self)
    }
}

impl Not for Expr {
    type Output = Expr;
    fn not(self) -> Expr {
        Expr::unary(Op::Not, self)
    }
}

/// An invariant to maintain. Opaque to the engine; interpreted by a
/// `PredicateEvaluator`.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    expr: Expr,
}

impl Predicate {
    pub fn new(expr: Expr) -> Self {
        Self { expr }
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }
}

impl From<Expr> for Predicate {
    fn from(expr: Expr) -> Self {
        Self::new(expr)
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.expr)
    }
}

//! KeepForge Core - values, predicates and the solver contract
//!
//! This crate provides the fundamental abstractions shared by the engine and
//! by every pluggable solver:
//! - [`Value`] and the value classes ([`Point`], [`Color`]) that decompose into parts
//! - The predicate DSL ([`Expr`], [`Predicate`]) built with operator overloading
//! - The solver-neutral term IR ([`Term`]) handed to solvers for compilation
//! - The [`Solver`] trait every constraint algorithm implements
//! - The error taxonomy ([`KeepForgeError`])
//!
//! # Example
//!
//! ```
//! use keepforge_core::{Expr, Value};
//!
//! // obj.a + obj.b == 3
//! let predicate = (Expr::name("obj").get("a") + Expr::name("obj").get("b")).equals(3.0);
//! assert_eq!(predicate.to_string(), "((obj.a + obj.b) == 3)");
//!
//! // Constant sub-expressions fold natively.
//! assert_eq!(Expr::from(2.0).fold(), Some(Value::Number(2.0)));
//! ```

pub mod error;
pub mod expr;
pub mod ids;
pub mod metric;
pub mod ops;
pub mod priority;
pub mod solver;
pub mod term;
pub mod value;


pub use error::{KeepForgeError, Result, SolverError};
pub use expr::{Expr, Predicate};
pub use ids::{ConstraintId, ExtVarHandle, ObjectId, PrimitiveHandle, SolverId, VarId};
pub use metric::Metric;
pub use ops::Op;
pub use priority::Priority;
pub use solver::{Capabilities, Solver, SolverStats};
pub use term::Term;
pub use value::{compare_values, values_equal, Color, Decomposable, Point, TypeTag, Value};

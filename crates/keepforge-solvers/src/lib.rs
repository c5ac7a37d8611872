//! Reference solvers for the KeepForge constraint runtime.
//!
//! Three small algorithms with deliberately different capability profiles,
//! so the engine's solver selection has something to choose between:
//!
//! | Solver            | Weight | Relations              | Data types          | Edit | Soft |
//! |-------------------|--------|------------------------|---------------------|------|------|
//! | [`DataflowSolver`]| 200    | linear `==`            | numbers             | yes  | yes  |
//! | [`RelaxSolver`]   | 100    | linear `==` `<=` `>=`  | numbers             | no   | no   |
//! | [`DomainSolver`]  | 50     | anything, by search    | numbers, text, bool | no   | no   |
//!
//! # Example
//!
//! ```
//! use keepforge_core::{Op, Priority, Solver, Term, Value};
//! use keepforge_solvers::RelaxSolver;
//!
//! let mut solver = RelaxSolver::new();
//! let a = solver.variable_for(&Value::Number(8.0), "a").unwrap();
//! let at_least = Term::binary(Op::Ge, Term::Var(a), Term::Const(Value::Number(100.0)));
//! let p = solver.compile(&at_least).unwrap();
//! solver.enable_primitive(p, Priority::Required).unwrap();
//! solver.solve().unwrap();
//! assert_eq!(solver.value(a), Value::Number(100.0));
//! ```

pub mod dataflow;
pub mod domain;
pub mod linear;
pub mod relax;
mod store;

pub use dataflow::DataflowSolver;
pub use domain::DomainSolver;
pub use relax::RelaxSolver;

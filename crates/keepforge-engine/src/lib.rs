//! KeepForge Engine - multi-solver constraint maintenance
//!
//! The engine keeps declared invariants over host fields true as the fields
//! change. Each request is realized once per eligible [`Solver`], the
//! candidates are benchmarked, and the best one is kept:
//!
//! - [`Engine::always`] / [`Engine::once`] / [`Engine::stay`] register predicates
//! - [`Engine::set`] is the write path: suggest to the defining solver,
//!   propagate to every connected field, restore on failure
//! - [`Engine::edit`] opens an [`EditSession`] for rapid batched assignment
//! - [`Engine::reevaluate_solver_selection`] re-runs the benchmark; it also
//!   runs automatically every `reevaluation_interval` writes
//!
//! Host objects live in the engine's heap and are addressed by
//! [`ObjectId`](keepforge_core::ObjectId).
//!
//! [`Solver`]: keepforge_core::Solver

mod callbacks;
pub mod constraint;
pub mod edit;
pub mod engine;
pub mod evaluator;
mod guard;
pub mod heap;
pub mod options;
pub mod orchestrator;
pub mod variable;

pub use constraint::{Assignment, ComparisonMetrics, Constraint};
pub use edit::EditSession;
pub use engine::Engine;
pub use evaluator::{Compiled, ConstructionScope, ExprEvaluator, Inspection, PredicateEvaluator};
pub use heap::SetterHook;
pub use options::{ConstraintOptions, ErrorHandler};
pub use variable::{ConstrainedVariable, VarKey};

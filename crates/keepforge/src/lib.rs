//! KeepForge - multi-solver constraint maintenance
//!
//! Declare relations over fields of host objects once; the engine keeps
//! them true across later writes, delegating each relation to whichever
//! registered solver handles it best.
//!
//! # Example
//!
//! ```rust
//! use keepforge::prelude::*;
//!
//! let mut engine = keepforge::engine_with_config(EngineConfig::default());
//! let obj = engine.object([("a", Value::from(2.0)), ("b", Value::from(3.0))]);
//!
//! let sum = (Expr::field(obj, "a") + Expr::field(obj, "b")).equals(3.0);
//! engine.always(ConstraintOptions::new(), sum).unwrap();
//!
//! engine.set(obj, "a", 10.0).unwrap();
//! assert_eq!(engine.get(obj, "b").unwrap(), Value::Number(-7.0));
//! ```

pub use keepforge_config::{ConfigError, DomainConfig, EngineConfig, RelaxConfig};
pub use keepforge_core::{
    Capabilities, Color, ConstraintId, Decomposable, Expr, KeepForgeError, Metric, ObjectId, Op,
    Point, Predicate, Priority, Result, Solver, SolverError, SolverId, SolverStats, TypeTag, Value,
    VarId,
};
pub use keepforge_engine::{
    ComparisonMetrics, ConstrainedVariable, Constraint, ConstraintOptions, EditSession, Engine,
    ErrorHandler,
};
pub use keepforge_solvers::{DataflowSolver, DomainSolver, RelaxSolver};

mod runtime;
pub use runtime::{engine, engine_with_config};

/// Extension points for custom solvers and predicate front ends.
pub mod ext {
    pub use keepforge_core::{ExtVarHandle, PrimitiveHandle, Term};
    pub use keepforge_engine::{
        Compiled, ConstructionScope, ExprEvaluator, Inspection, PredicateEvaluator,
    };
}

pub mod prelude {
    pub use super::{engine, engine_with_config};
    pub use super::{ConstraintOptions, EditSession, Engine, EngineConfig};
    pub use super::{Expr, Metric, ObjectId, Point, Priority, Value};
    pub use super::{DataflowSolver, DomainSolver, RelaxSolver};
}

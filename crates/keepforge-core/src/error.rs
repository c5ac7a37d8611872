//! Error types for KeepForge

use thiserror::Error;

use crate::ids::{ConstraintId, ExtVarHandle, ObjectId, PrimitiveHandle, SolverId};
use crate::ops::Op;
use crate::value::Value;

/// Error returned by solver implementations.
///
/// The engine attaches the solver name and converts it into a
/// [`KeepForgeError`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SolverError {
    /// No assignment satisfies the enabled constraints.
    #[error("unsatisfiable: {0}")]
    Unsatisfiable(String),

    /// The solver cannot represent the requested construct.
    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("unknown variable {0}")]
    UnknownVariable(ExtVarHandle),

    #[error("unknown primitive constraint {0}")]
    UnknownPrimitive(PrimitiveHandle),
}

/// Main error type for KeepForge operations
#[derive(Debug, Clone, Error)]
pub enum KeepForgeError {
    /// Evaluating or compiling the predicate for one solver failed.
    #[error("{solver} could not construct the constraint: {reason}")]
    Construction { solver: String, reason: String },

    /// The solver found no value satisfying an enabled constraint.
    #[error("{solver} could not satisfy the constraint: {reason}")]
    Unsatisfiable { solver: String, reason: String },

    /// An operator was applied to a solver-aware value the solver cannot express.
    #[error("{solver} does not support `{op}`{}", .hint.map(|h| format!(" (try `{h}`)")).unwrap_or_default())]
    UnsolvableOperation {
        op: Op,
        solver: String,
        hint: Option<Op>,
    },

    /// A write failed but left the field changed anyway.
    #[error("solving failed, but {field} changed from {before} to {after}")]
    InconsistentState {
        field: String,
        before: Value,
        after: Value,
    },

    /// Every candidate solver failed for a request.
    #[error("no solver available ({} candidate error(s))", .errors.len())]
    NoSolver { errors: Vec<KeepForgeError> },

    /// Any other solver failure, with the solver name attached.
    #[error("{solver}: {source}")]
    Solver {
        solver: String,
        #[source]
        source: SolverError,
    },

    #[error("cannot edit {field}: {reason}")]
    NotEditable { field: String, reason: String },

    #[error("unknown object {0}")]
    UnknownObject(ObjectId),

    #[error("{object} has no field `{field}`")]
    UnknownField { object: ObjectId, field: String },

    #[error("unknown constraint {0}")]
    UnknownConstraint(ConstraintId),

    #[error("unknown solver {0}")]
    UnknownSolver(SolverId),

    #[error("name `{0}` is not bound in the request context")]
    UnboundName(String),

    #[error("type mismatch: {0}")]
    TypeMismatch(String),
}

impl KeepForgeError {
    /// Attaches a solver name to a solver error.
    ///
    /// `Unsatisfiable` keeps its class so the engine can route it to
    /// error handlers.
    pub fn from_solver(solver: impl Into<String>, error: SolverError) -> Self {
        let solver = solver.into();
        match error {
            SolverError::Unsatisfiable(reason) => KeepForgeError::Unsatisfiable { solver, reason },
            source => KeepForgeError::Solver { solver, source },
        }
    }

    /// Builds a construction failure from any displayable reason.
    pub fn construction(solver: impl Into<String>, reason: impl ToString) -> Self {
        KeepForgeError::Construction {
            solver: solver.into(),
            reason: reason.to_string(),
        }
    }

    pub fn is_unsatisfiable(&self) -> bool {
        matches!(self, KeepForgeError::Unsatisfiable { .. })
    }

    pub fn is_inconsistent_state(&self) -> bool {
        matches!(self, KeepForgeError::InconsistentState { .. })
    }
}

/// Result type alias for KeepForge operations
pub type Result<T> = std::result::Result<T, KeepForgeError>;

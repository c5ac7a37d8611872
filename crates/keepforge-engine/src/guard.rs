//! Recursion guards and the enabled-constraints generation counter.
//!
//! The propagation graph may contain cycles. These flags bound reentrancy;
//! they live in the engine instead of process-wide statics.

use std::collections::BTreeSet;

use keepforge_core::{ConstraintId, SolverId, VarId};

#[derive(Debug, Default)]
pub(crate) struct Guards {
    /// Variables whose defining solver is currently absorbing a suggestion.
    pub suggesting: BTreeSet<VarId>,
    /// Variables currently propagating to their connected variables.
    pub storing: BTreeSet<VarId>,
    /// Set while a value-class write decomposes into its parts.
    pub value_class: bool,
    /// Set while dependent setter hooks run.
    pub calling_setters: bool,
    pub processing_callbacks: bool,
    /// Depth of public entry points; callbacks drain at depth zero.
    pub nested: u32,
    /// Ticked whenever the set of enabled constraints or the external
    /// variable tables change.
    pub generation: u64,
    /// Constraint under construction or being compared.
    pub current: Option<(ConstraintId, SolverId)>,
}

impl Guards {
    pub fn tick(&mut self) {
        self.generation = self.generation.wrapping_add(1);
    }
}

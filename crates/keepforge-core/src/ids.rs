//! Typed handles.
//!
//! Everything the engine owns lives in arenas and is addressed by one of
//! these copyable ids. Solvers hand out their own handles
//! ([`ExtVarHandle`], [`PrimitiveHandle`]) which are only meaningful to the
//! solver that issued them.

use std::fmt;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        pub struct $name(pub usize);

        impl $name {
            /// Returns the raw index.
            #[inline]
            pub fn index(self) -> usize {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }
    };
}

id_type!(
    /// Identity of a host object in the engine heap.
    ObjectId,
    "obj"
);
id_type!(
    /// Identity of a constrained variable.
    VarId,
    "var"
);
id_type!(
    /// Identity of a constraint. Stable across solver re-selection.
    ConstraintId,
    "constraint"
);
id_type!(
    /// Identity of a solver in the engine's registry.
    SolverId,
    "solver"
);
id_type!(
    /// A solver-private handle for one field's value inside that solver.
    ExtVarHandle,
    "ext"
);
id_type!(
    /// A solver-native compiled constraint that can be enabled and disabled.
    PrimitiveHandle,
    "prim"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_prefixes() {
        assert_eq!(ObjectId(3).to_string(), "obj#3");
        assert_eq!(SolverId(0).to_string(), "solver#0");
        assert_eq!(PrimitiveHandle(12).to_string(), "prim#12");
    }

    #[test]
    fn test_ordering_follows_index() {
        assert!(VarId(1) < VarId(2));
        assert_eq!(ConstraintId(7).index(), 7);
    }
}

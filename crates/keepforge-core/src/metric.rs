//! Solver comparison metrics.

use std::fmt;

/// A metric recorded when a constraint is enabled, used to rank candidate
/// solvers. Lower is better for every metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Metric {
    /// Wall-clock time spent in `solve()`, in milliseconds.
    Time,
    /// Number of constrained variables whose value changed.
    NumberOfChangedVariables,
    /// Sum of squared numeric changes; not-a-number if a non-numeric value changed.
    SquaredChangeDistance,
}

impl Metric {
    /// The ordering used when a request does not specify one.
    pub fn default_priority() -> Vec<Metric> {
        vec![Metric::Time, Metric::NumberOfChangedVariables]
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Metric::Time => "time",
            Metric::NumberOfChangedVariables => "number_of_changed_variables",
            Metric::SquaredChangeDistance => "squared_change_distance",
        };
        f.write_str(name)
    }
}

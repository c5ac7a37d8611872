//! Field lists for host objects.

use keepforge_core::Value;

/// Numeric fields for `Engine::object`.
///
/// ```
/// use keepforge_core::Value;
/// use keepforge_test::numbers;
///
/// let fields = numbers(&[("a", 2.0), ("b", 3.0)]);
/// assert_eq!(fields[1], ("b".to_string(), Value::Number(3.0)));
/// ```
pub fn numbers(fields: &[(&str, f64)]) -> Vec<(String, Value)> {
    fields
        .iter()
        .map(|(name, n)| (name.to_string(), Value::Number(*n)))
        .collect()
}

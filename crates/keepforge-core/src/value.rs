//! Host values and value classes.

use std::cmp::Ordering;
use std::fmt;

use crate::ids::ObjectId;

/// A value stored in a host field.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Value {
    #[default]
    None,
    Number(f64),
    Bool(bool),
    Text(String),
    Point(Point),
    Color(Color),
    /// Reference to another host object, enabling nested paths like `a.b.c`.
    Object(ObjectId),
}

/// Coarse data type of a value, used for solver capability filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum TypeTag {
    None,
    Number,
    Bool,
    Text,
    Point,
    Color,
    Object,
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TypeTag::None => "none",
            TypeTag::Number => "number",
            TypeTag::Bool => "bool",
            TypeTag::Text => "text",
            TypeTag::Point => "point",
            TypeTag::Color => "color",
            TypeTag::Object => "object",
        };
        f.write_str(name)
    }
}

impl Value {
    pub fn type_tag(&self) -> TypeTag {
        match self {
            Value::None => TypeTag::None,
            Value::Number(_) => TypeTag::Number,
            Value::Bool(_) => TypeTag::Bool,
            Value::Text(_) => TypeTag::Text,
            Value::Point(_) => TypeTag::Point,
            Value::Color(_) => TypeTag::Color,
            Value::Object(_) => TypeTag::Object,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<ObjectId> {
        match self {
            Value::Object(id) => Some(*id),
            _ => None,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    /// Returns the value-class view of this value, if it has one.
    pub fn as_decomposable(&self) -> Option<&dyn Decomposable> {
        match self {
            Value::Point(p) => Some(p),
            Value::Color(c) => Some(c),
            _ => None,
        }
    }

    /// Returns a copy with one named part replaced, for value classes.
    pub fn with_part(&self, part: &str, value: f64) -> Option<Value> {
        match self {
            Value::Point(p) => p.with_part(part, value).map(Value::Point),
            Value::Color(c) => c.with_part(part, value).map(Value::Color),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => f.write_str("none"),
            Value::Number(n) => write!(f, "{n}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Text(s) => write!(f, "{s:?}"),
            Value::Point(p) => write!(f, "pt({}, {})", p.x, p.y),
            Value::Color(c) => write!(f, "rgba({}, {}, {}, {})", c.r, c.g, c.b, c.a),
            Value::Object(id) => write!(f, "{id}"),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<Point> for Value {
    fn from(p: Point) -> Self {
        Value::Point(p)
    }
}

impl From<Color> for Value {
    fn from(c: Color) -> Self {
        Value::Color(c)
    }
}

impl From<ObjectId> for Value {
    fn from(id: ObjectId) -> Self {
        Value::Object(id)
    }
}

/// A structured value that the engine decomposes into independently
/// constrainable numeric parts.
pub trait Decomposable {
    /// Names of the parts, in a stable order.
    fn part_names(&self) -> &'static [&'static str];

    /// Returns the named part.
    fn part(&self, name: &str) -> Option<f64>;
}

/// A 2D point value class.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    fn with_part(&self, part: &str, value: f64) -> Option<Point> {
        match part {
            "x" => Some(Point { x: value, ..*self }),
            "y" => Some(Point { y: value, ..*self }),
            _ => None,
        }
    }
}

impl Decomposable for Point {
    fn part_names(&self) -> &'static [&'static str] {
        &["x", "y"]
    }

    fn part(&self, name: &str) -> Option<f64> {
        match name {
            "x" => Some(self.x),
            "y" => Some(self.y),
            _ => None,
        }
    }
}

/// An RGBA color value class.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Color {
    pub r: f64,
    pub g: f64,
    pub b: f64,
    pub a: f64,
}

impl Color {
    pub const fn rgb(r: f64, g: f64, b: f64) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    fn with_part(&self, part: &str, value: f64) -> Option<Color> {
        match part {
            "r" => Some(Color { r: value, ..*self }),
            "g" => Some(Color { g: value, ..*self }),
            "b" => Some(Color { b: value, ..*self }),
            "a" => Some(Color { a: value, ..*self }),
            _ => None,
        }
    }
}

impl Decomposable for Color {
    fn part_names(&self) -> &'static [&'static str] {
        &["r", "g", "b", "a"]
    }

    fn part(&self, name: &str) -> Option<f64> {
        match name {
            "r" => Some(self.r),
            "g" => Some(self.g),
            "b" => Some(self.b),
            "a" => Some(self.a),
            _ => None,
        }
    }
}

/// Checks if two values are equal, with tolerance for numbers.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => (x - y).abs() < 1e-9,
        (Value::Point(p), Value::Point(q)) => (p.x - q.x).abs() < 1e-9 && (p.y - q.y).abs() < 1e-9,
        _ => a == b,
    }
}

/// Compares two values. Returns `None` for incomparable pairs.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.partial_cmp(y),
        (Value::Text(x), Value::Text(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_tags() {
        assert_eq!(Value::from(1.5).type_tag(), TypeTag::Number);
        assert_eq!(Value::from("a").type_tag(), TypeTag::Text);
        assert_eq!(Value::from(Point::new(1.0, 2.0)).type_tag(), TypeTag::Point);
        assert_eq!(TypeTag::Text.to_string(), "text");
    }

    #[test]
    fn test_point_parts() {
        let v = Value::Point(Point::new(1.0, 2.0));
        let parts = v.as_decomposable().unwrap();
        assert_eq!(parts.part_names(), &["x", "y"]);
        assert_eq!(parts.part("y"), Some(2.0));
        assert_eq!(v.with_part("x", 5.0), Some(Value::Point(Point::new(5.0, 2.0))));
        assert_eq!(v.with_part("z", 5.0), None);
    }

    #[test]
    fn test_color_parts() {
        let v = Value::Color(Color::rgb(0.1, 0.2, 0.3));
        assert_eq!(v.as_decomposable().unwrap().part("a"), Some(1.0));
        assert!(Value::Number(1.0).as_decomposable().is_none());
    }

    #[test]
    fn test_values_equal_tolerance() {
        assert!(values_equal(&Value::Number(1.0), &Value::Number(1.0 + 1e-12)));
        assert!(!values_equal(&Value::Number(1.0), &Value::Number(1.1)));
        assert!(!values_equal(&Value::Number(1.0), &Value::Text("1".into())));
    }

    #[test]
    fn test_compare_values() {
        assert_eq!(
            compare_values(&Value::Number(1.0), &Value::Number(2.0)),
            Some(Ordering::Less)
        );
        assert_eq!(compare_values(&Value::Number(f64::NAN), &Value::Number(2.0)), None);
        assert_eq!(compare_values(&Value::Bool(true), &Value::Number(2.0)), None);
    }
}

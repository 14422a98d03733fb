//! The payload variant carried by [`crate::AnyData`].
//!
//! Cloning a `Value` never deep-copies bulk storage: strings, byte buffers,
//! point vectors and arrays are all `Arc`-backed. `memory_footprint` is a
//! byte estimate used by bounded input buffers to enforce memory caps; it is
//! deliberately approximate (shared payloads are counted in full on every
//! holder, which over-estimates and therefore errs on the safe side).

use crate::array::ArrayData;
use crate::geometry::{Interval, Point};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// One histogram bin: an interval and its population.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bin {
    pub interval: Interval,
    pub value: f64,
}

impl Bin {
    pub const fn new(interval: Interval, value: f64) -> Self {
        Self { interval, value }
    }
}

/// Opaque extension payload for registered user types.
pub trait OpaquePayload: Any + Send + Sync {
    /// Stable type name used by archive dispatch.
    fn type_name(&self) -> &'static str;
    fn byte_estimate(&self) -> usize;
    fn as_any(&self) -> &dyn Any;
}

/// The variant flowing on pipeline edges.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Empty,
    Bool(bool),
    I64(i64),
    F64(f64),
    Str(Arc<str>),
    Bytes(Arc<[u8]>),
    Array(ArrayData),
    PointVec(Arc<Vec<Point>>),
    Bins(Arc<Vec<Bin>>),
    Opaque(Arc<dyn OpaquePayload>),
}

impl Value {
    pub fn str(s: impl AsRef<str>) -> Self {
        Value::Str(Arc::from(s.as_ref()))
    }

    pub fn bytes(b: impl Into<Vec<u8>>) -> Self {
        Value::Bytes(b.into().into())
    }

    pub fn points(p: Vec<Point>) -> Self {
        Value::PointVec(Arc::new(p))
    }

    pub fn bins(b: Vec<Bin>) -> Self {
        Value::Bins(Arc::new(b))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Value::Empty)
    }

    /// Stable type tag used for dispatch and diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Empty => "empty",
            Value::Bool(_) => "bool",
            Value::I64(_) => "i64",
            Value::F64(_) => "f64",
            Value::Str(_) => "str",
            Value::Bytes(_) => "bytes",
            Value::Array(_) => "array",
            Value::PointVec(_) => "points",
            Value::Bins(_) => "bins",
            Value::Opaque(p) => p.type_name(),
        }
    }

    /// Byte estimate for bounded-buffer accounting.
    pub fn memory_footprint(&self) -> usize {
        const BASE: usize = std::mem::size_of::<Value>();
        BASE + match self {
            Value::Empty | Value::Bool(_) | Value::I64(_) | Value::F64(_) => 0,
            Value::Str(s) => s.len(),
            Value::Bytes(b) => b.len(),
            Value::Array(a) => a.byte_len(),
            Value::PointVec(p) => p.len() * std::mem::size_of::<Point>(),
            Value::Bins(b) => b.len() * std::mem::size_of::<Bin>(),
            Value::Opaque(p) => p.byte_estimate(),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::I64(v) => Some(*v as f64),
            Value::F64(v) => Some(*v),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::I64(v) => Some(*v),
            Value::F64(v) => Some(*v as i64),
            Value::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::I64(v) => Some(*v != 0),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&ArrayData> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_points(&self) -> Option<&Arc<Vec<Point>>> {
        match self {
            Value::PointVec(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_bins(&self) -> Option<&Arc<Vec<Bin>>> {
        match self {
            Value::Bins(b) => Some(b),
            _ => None,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Empty => write!(f, "Empty"),
            Value::Bool(v) => write!(f, "Bool({v})"),
            Value::I64(v) => write!(f, "I64({v})"),
            Value::F64(v) => write!(f, "F64({v})"),
            Value::Str(s) => write!(f, "Str({s:?})"),
            Value::Bytes(b) => write!(f, "Bytes(len={})", b.len()),
            Value::Array(a) => write!(f, "Array({:?} {}x{})", a.data_type(), a.width(), a.height()),
            Value::PointVec(p) => write!(f, "PointVec(len={})", p.len()),
            Value::Bins(b) => write!(f, "Bins(len={})", b.len()),
            Value::Opaque(p) => write!(f, "Opaque({})", p.type_name()),
        }
    }
}

// Equality is shallow where payloads are shared: two array values compare by
// pointer identity, which is the only cheap comparison that makes sense at
// buffer granularity. Scalar and string variants compare by value.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Empty, Value::Empty) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::I64(a), Value::I64(b)) => a == b,
            (Value::F64(a), Value::F64(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::PointVec(a), Value::PointVec(b)) => Arc::ptr_eq(a, b) || a == b,
            (Value::Bins(a), Value::Bins(b)) => Arc::ptr_eq(a, b) || a == b,
            (Value::Array(a), Value::Array(b)) => {
                a.width() == b.width() && a.height() == b.height() && a.shares_storage(b)
            }
            (Value::Opaque(a), Value::Opaque(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::I64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::F64(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::str(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v.into())
    }
}

impl From<ArrayData> for Value {
    fn from(v: ArrayData) -> Self {
        Value::Array(v)
    }
}

impl From<Vec<Point>> for Value {
    fn from(v: Vec<Point>) -> Self {
        Value::points(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::Array2;

    #[test]
    fn footprint_scales_with_payload() {
        let small = Value::F64(1.0);
        let big = Value::Array(ArrayData::F64(Array2::filled(100, 100, 0.0)));
        assert!(big.memory_footprint() >= 100 * 100 * 8);
        assert!(small.memory_footprint() < big.memory_footprint());
    }

    #[test]
    fn clone_shares_storage() {
        let pts = Value::points(vec![Point::new(1.0, 2.0); 1000]);
        let cloned = pts.clone();
        match (&pts, &cloned) {
            (Value::PointVec(a), Value::PointVec(b)) => assert!(Arc::ptr_eq(a, b)),
            _ => unreachable!(),
        }
    }

    #[test]
    fn numeric_coercions() {
        assert_eq!(Value::I64(5).as_f64(), Some(5.0));
        assert_eq!(Value::F64(2.5).as_i64(), Some(2));
        assert_eq!(Value::Bool(true).as_f64(), Some(1.0));
        assert_eq!(Value::str("x").as_f64(), None);
    }

    #[test]
    fn type_names_are_stable() {
        assert_eq!(Value::Empty.type_name(), "empty");
        assert_eq!(Value::points(vec![]).type_name(), "points");
    }
}

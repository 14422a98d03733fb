//! `AnyData`: the timestamped unit of exchange.

use crate::attrs::Attributes;
use crate::time::{INVALID_TIME, is_valid_time};
use crate::value::Value;

/// A value flowing on a pipeline edge: payload + timestamp + source id +
/// attributes. Construction, copy and destruction are cheap; the payload is
/// shared, the attribute map clones its (small) entries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnyData {
    value: Value,
    time: i64,
    source: u64,
    attributes: Attributes,
}

impl AnyData {
    pub fn new(value: impl Into<Value>, time: i64) -> Self {
        Self {
            value: value.into(),
            time,
            source: 0,
            attributes: Attributes::new(),
        }
    }

    /// A payload with no timestamp.
    pub fn untimed(value: impl Into<Value>) -> Self {
        Self::new(value, INVALID_TIME)
    }

    pub fn with_source(mut self, source: u64) -> Self {
        self.source = source;
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.set(name, value);
        self
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }

    pub fn set_value(&mut self, value: impl Into<Value>) {
        self.value = value.into();
    }

    pub fn time(&self) -> i64 {
        self.time
    }

    pub fn set_time(&mut self, time: i64) {
        self.time = time;
    }

    pub fn has_time(&self) -> bool {
        is_valid_time(self.time)
    }

    /// Identifier of the producing output, 0 when unset.
    pub fn source(&self) -> u64 {
        self.source
    }

    pub fn set_source(&mut self, source: u64) {
        self.source = source;
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn attributes_mut(&mut self) -> &mut Attributes {
        &mut self.attributes
    }

    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.attributes.set(name, value);
    }

    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// Merge attributes from `other`, incoming values winning on collision.
    pub fn merge_attributes(&mut self, other: &Attributes) {
        self.attributes.merge(other);
    }

    /// Byte estimate used for bounded-buffer memory accounting.
    pub fn memory_footprint(&self) -> usize {
        std::mem::size_of::<AnyData>() + self.value.memory_footprint()
            + self.attributes.byte_estimate()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point;

    #[test]
    fn untimed_has_no_time() {
        let d = AnyData::untimed(Value::F64(1.0));
        assert!(!d.has_time());
        assert_eq!(d.time(), INVALID_TIME);
    }

    #[test]
    fn builder_attributes() {
        let d = AnyData::new(Value::F64(0.5), 10)
            .with_source(42)
            .with_attribute("Name", "cos");
        assert_eq!(d.source(), 42);
        assert_eq!(d.attributes().get_str("Name"), Some("cos"));
    }

    #[test]
    fn footprint_includes_attributes() {
        let plain = AnyData::new(Value::points(vec![Point::new(0.0, 0.0); 64]), 0);
        let tagged = plain.clone().with_attribute("comment", "x".repeat(4096));
        assert!(tagged.memory_footprint() > plain.memory_footprint() + 4000);
    }
}

//! String-keyed attribute map attached to every [`crate::AnyData`].
//!
//! Attributes carry side-band metadata along edges: display names, axis
//! units, style-sheet strings, acquisition parameters. Keys are plain
//! strings; the well-known ones used by display formatting are exposed as
//! constants so call sites don't scatter literals.

use crate::value::Value;
use ahash::AHashMap;

/// Display name of the flowing data (drives plot titles).
pub const ATTR_NAME: &str = "Name";
/// Style-sheet text applied to the receiving plot item.
pub const ATTR_STYLESHEET: &str = "stylesheet";
pub const ATTR_X_UNIT: &str = "XUnit";
pub const ATTR_Y_UNIT: &str = "YUnit";
pub const ATTR_Z_UNIT: &str = "ZUnit";

/// Prefix marking a "source property": setting one on a node propagates it
/// backwards to every ancestor in the graph.
pub const SOURCE_PROPERTY_PREFIX: &str = "__source_";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Attributes {
    map: AHashMap<String, Value>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.map.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.map.get(name)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.map.get(name).and_then(|v| v.as_str())
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.map.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.map.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.map.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Merge `other` into `self`; on key collision the incoming value wins.
    pub fn merge(&mut self, other: &Attributes) {
        for (k, v) in other.map.iter() {
            self.map.insert(k.clone(), v.clone());
        }
    }

    pub fn byte_estimate(&self) -> usize {
        self.map
            .iter()
            .map(|(k, v)| k.len() + v.memory_footprint())
            .sum()
    }
}

impl FromIterator<(String, Value)> for Attributes {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            map: iter.into_iter().collect(),
        }
    }
}

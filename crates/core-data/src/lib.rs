//! Core data model: the unit of exchange flowing on pipeline edges.
//!
//! `AnyData` couples a cheap-to-clone [`Value`] payload with a timestamp, a
//! source identifier and a string-keyed attribute map. Everything here is
//! leaf-level: no knowledge of nodes, ports or scheduling. Payload variants
//! share their storage (`Arc`), so copying an `AnyData` across threads is a
//! pointer bump, never a deep copy.

pub mod any;
pub mod array;
pub mod attrs;
pub mod geometry;
pub mod time;
pub mod value;

pub use any::AnyData;
pub use array::{Array2, ArrayData, DataType, Rgba};
pub use attrs::Attributes;
pub use geometry::{Interval, Point, Rect, Transform};
pub use time::{INVALID_TIME, is_valid_time};
pub use value::{Bin, Value};

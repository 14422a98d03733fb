//! The scene graph: polymorphic plot items consuming pipeline outputs.
//!
//! The hierarchy is deliberately flat: one [`PlotItem`] trait over a
//! composed [`ItemCore`] holding the shared state (style, z-order, axes
//! binding, selection, attribute bits). Payload-carrying items wrap their
//! data in [`PlotItemData`], whose lock is the only synchronization point
//! between producers (display objects writing after worker-side
//! preparation) and the renderer (the main executor reading during paint).
//!
//! Rendering targets an abstract [`Painter`]; a software RGBA
//! implementation backs the tests and the terminal demo.

pub mod axis;
pub mod curve;
pub mod histogram;
pub mod item;
pub mod painter;
pub mod raster;
pub mod scatter;
pub mod shape;
pub mod sheet;
pub mod spectrogram;
pub mod style;

pub use axis::{AxisEdge, AxisItem};
pub use curve::{CurveFill, PlotCurve};
pub use histogram::{BarTextPlacement, HistogramStyle, PlotHistogram};
pub use item::{Axis, CoordSystem, ItemAttributes, ItemCore, PlotItem, PlotItemData};
pub use painter::{Painter, SoftwarePainter, TextOp};
pub use raster::{ArrayConverter, ImageConverter, PlotRaster, RasterConverter, TilerConverter};
pub use scatter::{PlotBars, PlotMarker, PlotScatter};
pub use shape::{
    ResizeFrame, SceneEvent, SceneModel, SceneModelItem, SceneModelMode, ScenePayload, Shape,
    ShapeKind, register_scene_codec,
};
pub use sheet::{StyleSheet, StyleValue};
pub use spectrogram::{ContourLevel, PlotSpectrogram, march_triangles};
pub use style::{BoxStyle, Brush, Pen, TextAlign, TextStyle};

//! Display objects: the worker/executor split.

use crate::executor::MainExecutor;
use core_data::attrs::{ATTR_NAME, ATTR_STYLESHEET, ATTR_X_UNIT, ATTR_Y_UNIT, ATTR_Z_UNIT};
use core_data::array::Array2;
use core_data::{AnyData, Interval, Point, Rect, Rgba};
use core_graph::node::IoBuilder;
use core_graph::{Context, Node, Operation, ProcessingError, ScheduleStrategy};
use core_plot::{ImageConverter, PlotCurve, PlotItem, PlotRaster, StyleSheet};
use core_scale::{ColorMap, StandardMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Formatting state derived from data attributes. Re-applied only when
/// one of the watched attributes actually changes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DisplayFormat {
    pub name: Option<String>,
    pub stylesheet: Option<String>,
    pub x_unit: Option<String>,
    pub y_unit: Option<String>,
    pub z_unit: Option<String>,
}

impl DisplayFormat {
    fn from_data(data: &AnyData) -> Self {
        let get = |key: &str| data.attributes().get_str(key).map(str::to_string);
        Self {
            name: get(ATTR_NAME),
            stylesheet: get(ATTR_STYLESHEET),
            x_unit: get(ATTR_X_UNIT),
            y_unit: get(ATTR_Y_UNIT),
            z_unit: get(ATTR_Z_UNIT),
        }
    }
}

/// The two-stage rendering contract.
pub trait DisplayRenderer: Send + Sync + 'static {
    /// Worker-side transformation into render-ready form. Returning true
    /// means rendering is already complete and the executor stage is
    /// skipped.
    fn prepare(&self, batch: &[AnyData]) -> bool;

    /// Executor-side payload swap.
    fn display(&self, batch: &[AnyData]);

    /// Title/units/style-sheet application (executor side, on change).
    fn apply_format(&self, _format: &DisplayFormat) {}
}

/// The node operation terminating a pipeline.
pub struct DisplayObject {
    renderer: Arc<dyn DisplayRenderer>,
    executor: Arc<MainExecutor>,
    visible: Arc<AtomicBool>,
    update_on_hidden: bool,
    cached_format: Option<DisplayFormat>,
    displayed_frames: Arc<AtomicU64>,
}

impl DisplayObject {
    pub fn new(renderer: Arc<dyn DisplayRenderer>, executor: Arc<MainExecutor>) -> Self {
        Self {
            renderer,
            executor,
            visible: Arc::new(AtomicBool::new(true)),
            update_on_hidden: false,
            cached_format: None,
            displayed_frames: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn with_update_on_hidden(mut self, enabled: bool) -> Self {
        self.update_on_hidden = enabled;
        self
    }

    /// Visibility flag shared with the owning surface.
    pub fn visibility_handle(&self) -> Arc<AtomicBool> {
        self.visible.clone()
    }

    /// Total frames handed to the executor stage.
    pub fn frame_counter(&self) -> Arc<AtomicU64> {
        self.displayed_frames.clone()
    }

    /// Build the fully wired display node: asynchronous single input.
    pub fn into_node(self) -> Arc<Node> {
        let node = Node::new(self);
        node.set_schedule(ScheduleStrategy::ONE_INPUT | ScheduleStrategy::ASYNCHRONOUS);
        node.initialize();
        node
    }
}

impl Operation for DisplayObject {
    fn class_name(&self) -> &'static str {
        "DisplayObject"
    }

    fn declare(&self, io: &mut IoBuilder) {
        io.input("input");
    }

    fn apply(&mut self, ctx: &mut Context) -> Result<(), ProcessingError> {
        let batch = ctx.take_all_inputs(0);
        if batch.is_empty() {
            return Ok(());
        }
        // Hidden surfaces skip all work unless explicitly asked not to.
        if !self.visible.load(Ordering::SeqCst) && !self.update_on_hidden {
            return Ok(());
        }

        // Formatting hook: first frame, then only on attribute change.
        let format = DisplayFormat::from_data(batch.last().expect("non-empty batch"));
        if self.cached_format.as_ref() != Some(&format) {
            self.cached_format = Some(format.clone());
            let renderer = self.renderer.clone();
            self.executor.post(move || renderer.apply_format(&format));
        }

        if !self.renderer.prepare(&batch) {
            let renderer = self.renderer.clone();
            let frames = self.displayed_frames.clone();
            self.executor.post(move || {
                renderer.display(&batch);
                frames.fetch_add(1, Ordering::SeqCst);
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// DisplayCurve
// ---------------------------------------------------------------------------

/// Streams scalar samples (or point vectors) into a [`PlotCurve`] with a
/// sliding time window.
pub struct DisplayCurve {
    curve: Arc<PlotCurve>,
    window: Duration,
    accumulated: Mutex<Vec<Point>>,
}

impl DisplayCurve {
    pub fn new(curve: Arc<PlotCurve>, window: Duration) -> Arc<Self> {
        Arc::new(Self {
            curve,
            window,
            accumulated: Mutex::new(Vec::new()),
        })
    }

    pub fn curve(&self) -> &Arc<PlotCurve> {
        &self.curve
    }

    /// Visible x-range after the last prepared batch.
    pub fn x_range(&self) -> Interval {
        let pts = self.accumulated.lock().expect("curve window poisoned");
        let mut iv = Interval::default();
        for p in pts.iter() {
            iv.extend(p.x);
        }
        iv
    }
}

impl DisplayRenderer for DisplayCurve {
    fn prepare(&self, batch: &[AnyData]) -> bool {
        // Heavy part on the worker: convert, append, trim to the window.
        let mut pts = self.accumulated.lock().expect("curve window poisoned");
        for data in batch {
            match data.value() {
                core_data::Value::F64(_) | core_data::Value::I64(_) => {
                    let y = data.value().as_f64().unwrap_or(f64::NAN);
                    let x = data.time() as f64 / 1e9;
                    pts.push(Point::new(x, y));
                }
                core_data::Value::PointVec(v) => pts.extend(v.iter().copied()),
                other => {
                    tracing::debug!(
                        target: "display.curve",
                        payload = other.type_name(),
                        "unsupported payload ignored"
                    );
                }
            }
        }
        if let Some(last_x) = pts.last().map(|p| p.x) {
            let cutoff = last_x - self.window.as_secs_f64();
            pts.retain(|p| p.x >= cutoff);
        }
        false
    }

    fn display(&self, _batch: &[AnyData]) {
        // Executor side: the payload swap only.
        let snapshot = self.accumulated.lock().expect("curve window poisoned").clone();
        self.curve.set_points(snapshot);
    }

    fn apply_format(&self, format: &DisplayFormat) {
        // Items are behind Arc; formatting uses the interior-mutable
        // surface only (payload + stylesheet application needs &mut, so
        // formatting state is kept on the shared core via the sheet).
        if let Some(ref sheet_text) = format.stylesheet {
            let _sheet = StyleSheet::parse(sheet_text);
            tracing::debug!(target: "display.curve", rules = _sheet.rules().len(), "stylesheet received");
        }
    }
}

// ---------------------------------------------------------------------------
// DisplayImage
// ---------------------------------------------------------------------------

/// Colors incoming arrays on the worker and swaps the raster converter on
/// the executor.
pub struct DisplayImage {
    raster: Arc<Mutex<PlotRaster>>,
    map: Mutex<ColorMap>,
    prepared: Mutex<Option<(Array2<Rgba>, Rect)>>,
    format: Mutex<DisplayFormat>,
}

impl DisplayImage {
    pub fn new(raster: Arc<Mutex<PlotRaster>>) -> Arc<Self> {
        Arc::new(Self {
            raster,
            map: Mutex::new(ColorMap::standard(StandardMap::Fusion)),
            prepared: Mutex::new(None),
            format: Mutex::new(DisplayFormat::default()),
        })
    }

    pub fn raster(&self) -> &Arc<Mutex<PlotRaster>> {
        &self.raster
    }

    pub fn current_format(&self) -> DisplayFormat {
        self.format.lock().expect("format poisoned").clone()
    }
}

impl DisplayRenderer for DisplayImage {
    fn prepare(&self, batch: &[AnyData]) -> bool {
        // Only the newest frame matters for a live image.
        let Some(data) = batch.last() else {
            return true;
        };
        let Some(array) = data.value().as_array() else {
            return true;
        };
        let rect = Rect::new(0.0, 0.0, array.width() as f64, array.height() as f64);
        let f = array.convert_f64();
        let bounds = f.bounds(None);
        let colored = self
            .map
            .lock()
            .expect("colormap poisoned")
            .apply(&f, bounds);
        *self.prepared.lock().expect("prepared frame poisoned") = Some((colored, rect));
        false
    }

    fn display(&self, _batch: &[AnyData]) {
        let Some((image, rect)) = self.prepared.lock().expect("prepared frame poisoned").take()
        else {
            return;
        };
        let mut raster = self.raster.lock().expect("raster item poisoned");
        raster.set_converter(Box::new(ImageConverter::new(image, rect)));
    }

    fn apply_format(&self, format: &DisplayFormat) {
        let mut raster = self.raster.lock().expect("raster item poisoned");
        if let Some(ref name) = format.name {
            raster.core_mut().title = name.clone();
        }
        if let Some(ref unit) = format.x_unit {
            raster.core_mut().x_unit = unit.clone();
        }
        if let Some(ref unit) = format.y_unit {
            raster.core_mut().y_unit = unit.clone();
        }
        if let Some(ref unit) = format.z_unit {
            raster.core_mut().z_unit = unit.clone();
        }
        if let Some(ref sheet) = format.stylesheet {
            StyleSheet::parse(sheet).apply(&mut *raster);
        }
        *self.format.lock().expect("format poisoned") = format.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_data::Value;

    #[test]
    fn format_extraction_watches_known_attributes() {
        let data = AnyData::new(Value::F64(0.0), 0)
            .with_attribute(ATTR_NAME, "signal")
            .with_attribute(ATTR_Y_UNIT, "K");
        let f = DisplayFormat::from_data(&data);
        assert_eq!(f.name.as_deref(), Some("signal"));
        assert_eq!(f.y_unit.as_deref(), Some("K"));
        assert_eq!(f.x_unit, None);
    }

    #[test]
    fn curve_window_trims_old_samples() {
        let curve = Arc::new(PlotCurve::new());
        let display = DisplayCurve::new(curve, Duration::from_secs(10));
        // 30 seconds of 1 Hz samples; only the last 10 s survive.
        let batch: Vec<AnyData> = (0..30)
            .map(|i| AnyData::new(Value::F64(i as f64), i * 1_000_000_000))
            .collect();
        display.prepare(&batch);
        let range = display.x_range();
        assert!(range.width() <= 10.0 + 1e-9);
        assert_eq!(range.max, 29.0);
        assert!(range.min >= 19.0);
    }

    #[test]
    fn curve_display_swaps_payload() {
        let curve = Arc::new(PlotCurve::new());
        let display = DisplayCurve::new(curve.clone(), Duration::from_secs(100));
        let batch = vec![AnyData::new(Value::F64(1.5), 2_000_000_000)];
        assert!(!display.prepare(&batch), "executor stage requested");
        display.display(&batch);
        let pts = curve.points();
        assert_eq!(pts.len(), 1);
        assert_eq!(pts[0], Point::new(2.0, 1.5));
    }
}

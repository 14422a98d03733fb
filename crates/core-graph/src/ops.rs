//! Built-in operations.
//!
//! Sources (signal generator, frame playback), elementary transforms
//! (scaling) and extraction stages (histogram, statistics) used by the
//! demo pipelines and the test suites. Each registers a node-type info via
//! [`register_builtin_infos`] so archives can re-instantiate them by class
//! name.

use crate::error::{ErrorCode, ProcessingError};
use crate::node::{Context, IoBuilder, Node, Operation};
use crate::registry::{NodeInfo, registry};
use core_data::value::Bin;
use core_data::{AnyData, ArrayData, Interval, Point, Value};
use std::time::Instant;

type InlineFn = dyn FnMut(&AnyData) -> Result<AnyData, ProcessingError> + Send + 'static;

/// Closure-backed 1-in/1-out operation; the workhorse of unit tests and
/// quick inline stages.
pub struct Inline {
    name: &'static str,
    f: Box<InlineFn>,
}

impl Inline {
    pub fn single(
        name: &'static str,
        f: impl FnMut(&AnyData) -> Result<AnyData, ProcessingError> + Send + 'static,
    ) -> Self {
        Self {
            name,
            f: Box::new(f),
        }
    }
}

impl Operation for Inline {
    fn class_name(&self) -> &'static str {
        self.name
    }

    fn declare(&self, io: &mut IoBuilder) {
        io.input("input");
        io.output("output");
    }

    fn apply(&mut self, ctx: &mut Context) -> Result<(), ProcessingError> {
        if let Some(data) = ctx.take_input(0) {
            let out = (self.f)(&data)?;
            ctx.send(0, out);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// SignalGenerator
// ---------------------------------------------------------------------------

/// Periodic scalar source: `amplitude * f(2*pi*frequency*t)`, timestamped
/// in nanoseconds since the generator started. One update produces one
/// sample; drive it with a timer or `reload()`.
pub struct SignalGenerator {
    start: Option<Instant>,
    shape: Shape,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    Cosine,
    Sine,
    Ramp,
}

impl SignalGenerator {
    pub fn cosine() -> Self {
        Self {
            start: None,
            shape: Shape::Cosine,
        }
    }

    pub fn sine() -> Self {
        Self {
            start: None,
            shape: Shape::Sine,
        }
    }
}

impl Operation for SignalGenerator {
    fn class_name(&self) -> &'static str {
        "SignalGenerator"
    }

    fn declare(&self, io: &mut IoBuilder) {
        io.output("output");
        io.property("amplitude", 1.0f64);
        io.property("frequency", 1.0f64);
    }

    fn apply(&mut self, ctx: &mut Context) -> Result<(), ProcessingError> {
        let start = *self.start.get_or_insert_with(Instant::now);
        let t = start.elapsed().as_secs_f64();
        let amplitude = ctx.property_f64("amplitude").unwrap_or(1.0);
        let frequency = ctx.property_f64("frequency").unwrap_or(1.0);
        let phase = 2.0 * std::f64::consts::PI * frequency * t;
        let v = match self.shape {
            Shape::Cosine => amplitude * phase.cos(),
            Shape::Sine => amplitude * phase.sin(),
            Shape::Ramp => amplitude * (t - t.floor()),
        };
        let data = AnyData::new(Value::F64(v), (t * 1e9) as i64)
            .with_attribute("Name", match self.shape {
                Shape::Cosine => "cosine",
                Shape::Sine => "sine",
                Shape::Ramp => "ramp",
            })
            .with_attribute("XUnit", "s");
        ctx.send(0, data);
        Ok(())
    }

    fn reset(&mut self) {
        self.start = None;
    }

    fn initialize_processing(&mut self, param: &str) {
        self.shape = match param {
            "sine" => Shape::Sine,
            "ramp" => Shape::Ramp,
            _ => Shape::Cosine,
        };
    }
}

// ---------------------------------------------------------------------------
// Playback
// ---------------------------------------------------------------------------

/// Replays a fixed sequence of frames, one per update, looping. Stands in
/// for temporal devices (movie readers) in demos and tests.
pub struct Playback {
    frames: Vec<AnyData>,
    cursor: usize,
    looped: bool,
}

impl Playback {
    pub fn new(frames: Vec<AnyData>, looped: bool) -> Self {
        Self {
            frames,
            cursor: 0,
            looped,
        }
    }
}

impl Operation for Playback {
    fn class_name(&self) -> &'static str {
        "Playback"
    }

    fn declare(&self, io: &mut IoBuilder) {
        io.output("output");
    }

    fn apply(&mut self, ctx: &mut Context) -> Result<(), ProcessingError> {
        if self.frames.is_empty() {
            return Err(ProcessingError::new(
                "playback has no frames",
                ErrorCode::DeviceNotOpen,
            ));
        }
        if self.cursor >= self.frames.len() {
            if !self.looped {
                return Ok(());
            }
            self.cursor = 0;
        }
        let frame = self.frames[self.cursor].clone();
        self.cursor += 1;
        ctx.send(0, frame);
        Ok(())
    }

    fn reset(&mut self) {
        self.cursor = 0;
    }
}

// ---------------------------------------------------------------------------
// Scaling
// ---------------------------------------------------------------------------

/// `y = factor * x + offset` over scalars, point vectors (y component) and
/// f64 arrays.
pub struct Scaling;

impl Operation for Scaling {
    fn class_name(&self) -> &'static str {
        "Scaling"
    }

    fn declare(&self, io: &mut IoBuilder) {
        io.input("input");
        io.output("output");
        io.property("factor", 1.0f64);
        io.property("offset", 0.0f64);
    }

    fn apply(&mut self, ctx: &mut Context) -> Result<(), ProcessingError> {
        let Some(data) = ctx.take_input(0) else {
            return Ok(());
        };
        let factor = ctx.property_f64("factor").unwrap_or(1.0);
        let offset = ctx.property_f64("offset").unwrap_or(0.0);
        let value = match data.value() {
            Value::F64(v) => Value::F64(factor * v + offset),
            Value::I64(v) => Value::F64(factor * *v as f64 + offset),
            Value::PointVec(pts) => Value::points(
                pts.iter()
                    .map(|p| Point::new(p.x, factor * p.y + offset))
                    .collect(),
            ),
            Value::Array(a) => {
                let f = a.convert_f64();
                let scaled: Vec<f64> = f.as_slice().iter().map(|v| factor * v + offset).collect();
                Value::Array(ArrayData::F64(core_data::Array2::from_vec(
                    f.width(),
                    f.height(),
                    scaled,
                )))
            }
            other => {
                return Err(ProcessingError::new(
                    format!("scaling cannot process {:?}", other.type_name()),
                    ErrorCode::WrongInput,
                ));
            }
        };
        let mut out = data.clone();
        out.set_value(value);
        ctx.send(0, out);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ExtractHistogram
// ---------------------------------------------------------------------------

/// Bins the samples of an incoming array into a histogram. An optional
/// polygonal region of interest restricts the sampled area.
pub struct ExtractHistogram {
    roi: Option<Vec<Point>>,
}

impl ExtractHistogram {
    pub fn new() -> Self {
        Self { roi: None }
    }

    pub fn set_roi(&mut self, roi: Option<Vec<Point>>) {
        self.roi = roi;
    }
}

impl Default for ExtractHistogram {
    fn default() -> Self {
        Self::new()
    }
}

/// Even-odd rule point-in-polygon test.
fn inside_polygon(poly: &[Point], x: f64, y: f64) -> bool {
    let mut inside = false;
    let n = poly.len();
    if n < 3 {
        return false;
    }
    let mut j = n - 1;
    for i in 0..n {
        let (pi, pj) = (poly[i], poly[j]);
        if ((pi.y > y) != (pj.y > y))
            && (x < (pj.x - pi.x) * (y - pi.y) / (pj.y - pi.y) + pi.x)
        {
            inside = !inside;
        }
        j = i;
    }
    inside
}

impl Operation for ExtractHistogram {
    fn class_name(&self) -> &'static str {
        "ExtractHistogram"
    }

    fn declare(&self, io: &mut IoBuilder) {
        io.input("input");
        io.output("output");
        io.property("bins", 20i64);
    }

    fn apply(&mut self, ctx: &mut Context) -> Result<(), ProcessingError> {
        let Some(data) = ctx.take_input(0) else {
            return Ok(());
        };
        let Some(array) = data.value().as_array() else {
            return Err(ProcessingError::new(
                format!("histogram extraction needs an array, got {}", data.value().type_name()),
                ErrorCode::WrongInput,
            ));
        };
        let bins = ctx.property_i64("bins").unwrap_or(20).max(1) as usize;
        let f = array.convert_f64();
        let mut samples: Vec<f64> = Vec::new();
        for y in 0..f.height() {
            for x in 0..f.width() {
                if let Some(ref roi) = self.roi {
                    if !inside_polygon(roi, x as f64, y as f64) {
                        continue;
                    }
                }
                let v = f.get(x, y).unwrap_or(f64::NAN);
                if !v.is_nan() {
                    samples.push(v);
                }
            }
        }
        let mut out = data.clone();
        out.set_value(Value::bins(histogram(&samples, bins)));
        ctx.send(0, out);
        Ok(())
    }

    fn as_any_mut(&mut self) -> Option<&mut dyn std::any::Any> {
        Some(self)
    }
}

fn histogram(samples: &[f64], bins: usize) -> Vec<Bin> {
    let mut bounds = Interval::default();
    for s in samples {
        bounds.extend(*s);
    }
    if !bounds.is_valid() {
        return Vec::new();
    }
    let width = bounds.width();
    // Degenerate data: a single bin holding everything.
    if width <= 0.0 {
        return vec![Bin::new(
            Interval::new(bounds.min, bounds.min),
            samples.len() as f64,
        )];
    }
    let step = width / bins as f64;
    let mut counts = vec![0u64; bins];
    for s in samples {
        let idx = (((s - bounds.min) / step) as usize).min(bins - 1);
        counts[idx] += 1;
    }
    counts
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let lo = bounds.min + i as f64 * step;
            Bin::new(Interval::new(lo, lo + step), *c as f64)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// ExtractStatistics
// ---------------------------------------------------------------------------

/// Minimum, maximum, mean and standard deviation of an array payload,
/// published on four scalar outputs.
pub struct ExtractStatistics;

impl Operation for ExtractStatistics {
    fn class_name(&self) -> &'static str {
        "ExtractStatistics"
    }

    fn declare(&self, io: &mut IoBuilder) {
        io.input("input");
        io.output("min");
        io.output("max");
        io.output("mean");
        io.output("std");
    }

    fn apply(&mut self, ctx: &mut Context) -> Result<(), ProcessingError> {
        let Some(data) = ctx.take_input(0) else {
            return Ok(());
        };
        let Some(array) = data.value().as_array() else {
            return Err(ProcessingError::new(
                format!("statistics need an array, got {}", data.value().type_name()),
                ErrorCode::WrongInput,
            ));
        };
        let f = array.convert_f64();
        let mut count = 0usize;
        let mut sum = 0.0;
        let mut sum_sq = 0.0;
        let mut bounds = Interval::default();
        for v in f.as_slice() {
            if v.is_nan() {
                continue;
            }
            count += 1;
            sum += v;
            sum_sq += v * v;
            bounds.extend(*v);
        }
        if count == 0 {
            return Err(ProcessingError::wrong_input("array holds no finite samples"));
        }
        let mean = sum / count as f64;
        let variance = (sum_sq / count as f64 - mean * mean).max(0.0);
        let t = data.time();
        ctx.send(0, AnyData::new(Value::F64(bounds.min), t));
        ctx.send(1, AnyData::new(Value::F64(bounds.max), t));
        ctx.send(2, AnyData::new(Value::F64(mean), t));
        ctx.send(3, AnyData::new(Value::F64(variance.sqrt()), t));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Registration
// ---------------------------------------------------------------------------

/// Install the built-in node-type infos. Idempotent per process via the
/// registry's init-function mechanism.
pub fn register_builtin_infos() {
    let reg = registry();
    reg.register_init(|| {
        let reg = registry();
        reg.register_info(NodeInfo {
            class_name: "SignalGenerator",
            display_name: "Cosine generator".to_string(),
            category: "sources".to_string(),
            icon: "wave".to_string(),
            init_param: "cosine".to_string(),
            factory: || Node::new(SignalGenerator::cosine()),
        });
        reg.register_info(NodeInfo {
            class_name: "SignalGenerator",
            display_name: "Sine generator".to_string(),
            category: "sources".to_string(),
            icon: "wave".to_string(),
            init_param: "sine".to_string(),
            factory: || Node::new(SignalGenerator::cosine()),
        });
        reg.register_info(NodeInfo {
            class_name: "Scaling",
            display_name: "Scaling".to_string(),
            category: "transforms".to_string(),
            icon: "scale".to_string(),
            init_param: String::new(),
            factory: || Node::new(Scaling),
        });
        reg.register_info(NodeInfo {
            class_name: "ExtractHistogram",
            display_name: "Histogram".to_string(),
            category: "extraction".to_string(),
            icon: "histogram".to_string(),
            init_param: String::new(),
            factory: || Node::new(ExtractHistogram::new()),
        });
        reg.register_info(NodeInfo {
            class_name: "ExtractStatistics",
            display_name: "Statistics".to_string(),
            category: "extraction".to_string(),
            icon: "sigma".to_string(),
            init_param: String::new(),
            factory: || Node::new(ExtractStatistics),
        });
        reg.register_info(NodeInfo {
            class_name: "Playback",
            display_name: "Playback".to_string(),
            category: "sources".to_string(),
            icon: "film".to_string(),
            init_param: String::new(),
            factory: || Node::new(Playback::new(Vec::new(), true)),
        });
    });
    reg.run_initializers();
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_data::Array2;

    #[test]
    fn histogram_bins_cover_range() {
        let samples = [0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 5.0, 5.0];
        let bins = histogram(&samples, 5);
        assert_eq!(bins.len(), 5);
        let total: f64 = bins.iter().map(|b| b.value).sum();
        assert_eq!(total, samples.len() as f64);
        assert_eq!(bins.first().unwrap().interval.min, 0.0);
        assert_eq!(bins.last().unwrap().interval.max, 5.0);
    }

    #[test]
    fn histogram_degenerate_single_value() {
        let bins = histogram(&[2.0, 2.0, 2.0], 10);
        assert_eq!(bins.len(), 1);
        assert_eq!(bins[0].value, 3.0);
    }

    #[test]
    fn polygon_containment() {
        let square = vec![
            Point::new(0.0, 0.0),
            Point::new(4.0, 0.0),
            Point::new(4.0, 4.0),
            Point::new(0.0, 4.0),
        ];
        assert!(inside_polygon(&square, 2.0, 2.0));
        assert!(!inside_polygon(&square, 5.0, 2.0));
        assert!(!inside_polygon(&square, -1.0, -1.0));
    }

    #[test]
    fn statistics_pipeline() {
        let node = Node::new(ExtractStatistics);
        node.initialize();
        let array = ArrayData::F64(Array2::from_vec(2, 2, vec![1.0, 2.0, 3.0, 4.0]));
        node.set_input_data(0, AnyData::new(Value::Array(array), 5));
        node.update(true);
        let min = node.output_at(0).unwrap().data();
        let max = node.output_at(1).unwrap().data();
        let mean = node.output_at(2).unwrap().data();
        assert_eq!(min.value().as_f64(), Some(1.0));
        assert_eq!(max.value().as_f64(), Some(4.0));
        assert_eq!(mean.value().as_f64(), Some(2.5));
        assert_eq!(min.time(), 5);
    }

    #[test]
    fn scaling_points_preserves_x() {
        let node = Node::new(Scaling);
        node.initialize();
        node.property_named("factor").unwrap().set_data(AnyData::untimed(2.0f64));
        node.property_named("offset").unwrap().set_data(AnyData::untimed(1.0f64));
        let pts = vec![Point::new(1.0, 10.0), Point::new(2.0, 20.0)];
        node.set_input_data(0, AnyData::new(Value::points(pts), 0));
        node.update(true);
        let out = node.output_at(0).unwrap().data();
        let pts = out.value().as_points().unwrap();
        assert_eq!(pts[0], Point::new(1.0, 21.0));
        assert_eq!(pts[1], Point::new(2.0, 41.0));
    }
}

//! Curves: million-point polylines with sub-curve splitting and a
//! horizontal-run fast path.
//!
//! The payload is an ordered point sequence; a NaN x-value acts as a
//! separator splitting the sequence into sub-curves rendered
//! independently. A sub-curve whose x is non-decreasing is *continuous*:
//! when several samples land on the same pixel column the renderer
//! collapses each run into a (min, max) envelope pair, bounding the
//! polyline cost by the pixel width instead of the sample count. An
//! optional fill closes each sub-curve to a baseline; in multi-curve fill
//! mode the area between consecutive sub-curves is filled instead. A
//! function mode renders `y = f(x)` sampled over the visible interval
//! instead of a stored vector.

use crate::item::{Axis, CoordSystem, ItemCore, PlotItem, PlotItemData};
use crate::painter::Painter;
use crate::sheet::StyleValue;
use crate::style::Brush;
use core_data::{Interval, Point, Rect};
use std::sync::Arc;

/// Fill behavior.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum CurveFill {
    #[default]
    None,
    /// Close each sub-curve down to `y = baseline`.
    Baseline(f64),
    /// Fill between consecutive sub-curves.
    MultiCurves,
}

#[derive(Clone)]
enum CurveSource {
    Points(Arc<Vec<Point>>),
    Function(Arc<dyn Fn(f64) -> f64 + Send + Sync>),
}

impl Default for CurveSource {
    fn default() -> Self {
        CurveSource::Points(Arc::new(Vec::new()))
    }
}

pub struct PlotCurve {
    core: ItemCore,
    data: PlotItemData<CurveSource>,
    fill: CurveFill,
    fill_brush: Brush,
    /// Samples per pixel for function mode.
    function_density: f64,
}

impl Default for PlotCurve {
    fn default() -> Self {
        Self::new()
    }
}

impl PlotCurve {
    pub fn new() -> Self {
        Self {
            core: ItemCore::new("PlotCurve"),
            data: PlotItemData::new(CurveSource::default()),
            fill: CurveFill::None,
            fill_brush: Brush::NONE,
            function_density: 1.0,
        }
    }

    pub fn data(&self) -> &PlotItemData<CurveSource> {
        &self.data
    }

    /// Replace the point payload (NaN x separates sub-curves).
    pub fn set_points(&self, points: Vec<Point>) -> u64 {
        self.data.set_raw_data(CurveSource::Points(Arc::new(points)))
    }

    pub fn set_function(&self, f: impl Fn(f64) -> f64 + Send + Sync + 'static) -> u64 {
        self.data.set_raw_data(CurveSource::Function(Arc::new(f)))
    }

    pub fn points(&self) -> Arc<Vec<Point>> {
        match self.data.read() {
            CurveSource::Points(p) => p,
            CurveSource::Function(_) => Arc::new(Vec::new()),
        }
    }

    pub fn fill(&self) -> CurveFill {
        self.fill
    }

    pub fn set_fill(&mut self, fill: CurveFill, brush: Brush) {
        self.fill = fill;
        self.fill_brush = brush;
    }

    fn draw_sub_curve(
        &self,
        painter: &mut dyn Painter,
        cs: &CoordSystem,
        sub: &[Point],
        previous: Option<&[Point]>,
    ) {
        if sub.len() < 2 {
            return;
        }
        let pixels: Vec<Point> = if is_continuous(sub) {
            envelope(sub, cs)
        } else {
            sub.iter().map(|p| cs.to_pixel(*p)).collect()
        };

        match self.fill {
            CurveFill::Baseline(baseline) => {
                if self.fill_brush.visible {
                    let mut poly = pixels.clone();
                    let y = cs.to_pixel(Point::new(0.0, baseline)).y;
                    poly.push(Point::new(pixels.last().unwrap().x, y));
                    poly.push(Point::new(pixels.first().unwrap().x, y));
                    painter.fill_polygon(&poly, &self.fill_brush);
                }
            }
            CurveFill::MultiCurves => {
                if let (true, Some(prev)) = (self.fill_brush.visible, previous) {
                    let mut poly = pixels.clone();
                    poly.extend(prev.iter().rev().map(|p| cs.to_pixel(*p)));
                    painter.fill_polygon(&poly, &self.fill_brush);
                }
            }
            CurveFill::None => {}
        }

        painter.draw_polyline(&pixels, &self.core.pen);
    }
}

/// x non-decreasing over the whole sub-curve.
pub(crate) fn is_continuous(points: &[Point]) -> bool {
    points.windows(2).all(|w| w[1].x >= w[0].x)
}

/// Collapse pixel-column runs into (min, max) envelope pairs.
pub(crate) fn envelope(points: &[Point], cs: &CoordSystem) -> Vec<Point> {
    let mut out: Vec<Point> = Vec::new();
    let mut run_col = f64::NAN;
    let mut run_min = f64::INFINITY;
    let mut run_max = f64::NEG_INFINITY;
    let mut run_len = 0usize;

    let mut flush = |col: f64, min: f64, max: f64, len: usize, out: &mut Vec<Point>| {
        if len == 0 {
            return;
        }
        if len == 1 || (max - min).abs() < 0.5 {
            out.push(Point::new(col, min));
        } else {
            out.push(Point::new(col, min));
            out.push(Point::new(col, max));
        }
    };

    for p in points {
        let px = cs.to_pixel(*p);
        let col = px.x.round();
        if col != run_col && !run_col.is_nan() {
            flush(run_col, run_min, run_max, run_len, &mut out);
            run_min = f64::INFINITY;
            run_max = f64::NEG_INFINITY;
            run_len = 0;
        }
        run_col = col;
        run_min = run_min.min(px.y);
        run_max = run_max.max(px.y);
        run_len += 1;
    }
    flush(run_col, run_min, run_max, run_len, &mut out);
    out
}

/// Split on NaN-x separators; empty runs disappear.
pub(crate) fn split_sub_curves(points: &[Point]) -> Vec<&[Point]> {
    let mut out = Vec::new();
    let mut start = 0usize;
    for (i, p) in points.iter().enumerate() {
        if p.x.is_nan() {
            if i > start {
                out.push(&points[start..i]);
            }
            start = i + 1;
        }
    }
    if start < points.len() {
        out.push(&points[start..]);
    }
    out
}

impl PlotItem for PlotCurve {
    fn core(&self) -> &ItemCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ItemCore {
        &mut self.core
    }

    fn bounding_rect(&self) -> Rect {
        match self.data.read() {
            CurveSource::Points(points) => {
                let mut xi = Interval::default();
                let mut yi = Interval::default();
                for p in points.iter() {
                    if p.x.is_nan() {
                        continue;
                    }
                    xi.extend(p.x);
                    yi.extend(p.y);
                }
                if !xi.is_valid() {
                    return Rect::default();
                }
                Rect::new(xi.min, yi.min, xi.width(), yi.width())
            }
            CurveSource::Function(_) => Rect::default(),
        }
    }

    fn plot_interval(&self, axis: Axis) -> Interval {
        let r = self.bounding_rect();
        match axis {
            Axis::X => r.x_interval(),
            Axis::Y => r.y_interval(),
            Axis::Z => Interval::default(),
        }
    }

    fn draw(&mut self, painter: &mut dyn Painter, cs: &CoordSystem) {
        if !self.core.visible {
            return;
        }
        match self.data.read() {
            CurveSource::Points(points) => {
                let subs = split_sub_curves(&points);
                let mut previous: Option<&[Point]> = None;
                for sub in &subs {
                    self.draw_sub_curve(painter, cs, sub, previous);
                    previous = Some(sub);
                }
            }
            CurveSource::Function(f) => {
                let xi = cs.x.interval();
                if !xi.is_valid() || cs.rect.width <= 0.0 {
                    return;
                }
                let samples = ((cs.rect.width * self.function_density) as usize).max(2);
                let pts: Vec<Point> = (0..samples)
                    .map(|i| {
                        let x = xi.min + xi.width() * i as f64 / (samples - 1) as f64;
                        cs.to_pixel(Point::new(x, f(x)))
                    })
                    .collect();
                painter.draw_polyline(&pts, &self.core.pen);
            }
        }
    }

    fn set_item_property(&mut self, name: &str, value: &StyleValue, index: Option<usize>) -> bool {
        match name {
            "fill-baseline" => {
                if let Some(n) = value.as_number() {
                    self.fill = CurveFill::Baseline(n);
                    return true;
                }
                false
            }
            "fill-color" => {
                if let Some(c) = value.as_color() {
                    self.fill_brush = Brush::solid(c);
                    return true;
                }
                false
            }
            _ => {
                let _ = index;
                self.core.set_core_property(name, value)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::painter::SoftwarePainter;
    use core_scale::Scale;

    fn cs(width: f64, height: f64, xi: Interval, yi: Interval) -> CoordSystem {
        let mut x = Scale::new();
        x.set_interval(xi);
        let mut y = Scale::new();
        y.set_interval(yi);
        CoordSystem::new(x, y, Rect::new(0.0, 0.0, width, height))
    }

    #[test]
    fn nan_separators_split_sub_curves() {
        let pts = vec![
            Point::new(0.0, 0.0),
            Point::new(1.0, 1.0),
            Point::new(f64::NAN, 0.0),
            Point::new(2.0, 2.0),
            Point::new(3.0, 3.0),
        ];
        let subs = split_sub_curves(&pts);
        assert_eq!(subs.len(), 2);
        assert_eq!(subs[0].len(), 2);
        assert_eq!(subs[1].len(), 2);
    }

    #[test]
    fn all_nan_renders_zero_sub_curves() {
        let pts = vec![Point::new(f64::NAN, 0.0); 5];
        assert!(split_sub_curves(&pts).is_empty());
        let mut curve = PlotCurve::new();
        curve.set_points(pts);
        let mut p = SoftwarePainter::new(32, 32);
        let cs = cs(32.0, 32.0, Interval::new(0.0, 1.0), Interval::new(0.0, 1.0));
        curve.draw(&mut p, &cs);
        assert_eq!(p.op_count(), 0, "no draw calls, no error");
    }

    #[test]
    fn continuity_detection() {
        assert!(is_continuous(&[
            Point::new(0.0, 5.0),
            Point::new(1.0, 2.0),
            Point::new(1.0, 9.0),
        ]));
        assert!(!is_continuous(&[Point::new(1.0, 0.0), Point::new(0.0, 0.0)]));
    }

    #[test]
    fn envelope_bounds_point_count_by_columns() {
        // 10_000 samples collapsed onto ~100 pixel columns.
        let pts: Vec<Point> = (0..10_000)
            .map(|i| {
                let x = i as f64 / 100.0;
                Point::new(x, (i % 17) as f64)
            })
            .collect();
        let cs = cs(
            100.0,
            50.0,
            Interval::new(0.0, 100.0),
            Interval::new(0.0, 17.0),
        );
        let env = envelope(&pts, &cs);
        assert!(
            env.len() <= 2 * 102,
            "envelope pairs bounded by pixel columns, got {}",
            env.len()
        );
    }

    #[test]
    fn curve_draws_polyline() {
        let mut curve = PlotCurve::new();
        curve.set_points(vec![Point::new(0.0, 0.0), Point::new(1.0, 1.0)]);
        let mut p = SoftwarePainter::new(64, 64);
        let cs = cs(64.0, 64.0, Interval::new(0.0, 1.0), Interval::new(0.0, 1.0));
        curve.draw(&mut p, &cs);
        assert_eq!(p.op_count(), 1);
    }

    #[test]
    fn function_mode_samples_visible_interval() {
        let mut curve = PlotCurve::new();
        curve.set_function(|x| x * x);
        let mut p = SoftwarePainter::new(64, 64);
        let cs = cs(64.0, 64.0, Interval::new(0.0, 2.0), Interval::new(0.0, 4.0));
        curve.draw(&mut p, &cs);
        assert_eq!(p.op_count(), 1, "one polyline from sampled function");
    }

    #[test]
    fn baseline_fill_adds_polygon() {
        let mut curve = PlotCurve::new();
        curve.set_points(vec![
            Point::new(0.0, 1.0),
            Point::new(0.5, 2.0),
            Point::new(1.0, 1.0),
        ]);
        curve.set_fill(
            CurveFill::Baseline(0.0),
            Brush::solid(core_data::Rgba::opaque(0, 255, 0)),
        );
        let mut p = SoftwarePainter::new(64, 64);
        let cs = cs(64.0, 64.0, Interval::new(0.0, 1.0), Interval::new(0.0, 2.0));
        curve.draw(&mut p, &cs);
        assert_eq!(p.op_count(), 2, "fill polygon + polyline");
    }

    #[test]
    fn bounding_rect_ignores_separators() {
        let curve = PlotCurve::new();
        curve.set_points(vec![
            Point::new(0.0, -1.0),
            Point::new(f64::NAN, 1000.0),
            Point::new(2.0, 3.0),
        ]);
        let r = curve.bounding_rect();
        assert_eq!(r, Rect::new(0.0, -1.0, 2.0, 4.0));
    }
}

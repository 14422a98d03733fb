//! Thin payload-specific variants: scatter, marker, bars.
//!
//! All three share the curve's contract — set payload, mark dirty via the
//! data slot's revision, draw from the snapshot.

use crate::item::{CoordSystem, ItemCore, PlotItem, PlotItemData};
use crate::painter::Painter;
use crate::sheet::StyleValue;
use crate::style::Brush;
use core_data::{Interval, Point, Rect};
use std::sync::Arc;

/// Point cloud with a square symbol of fixed pixel size.
pub struct PlotScatter {
    core: ItemCore,
    data: PlotItemData<Arc<Vec<Point>>>,
    symbol_size: f64,
}

impl Default for PlotScatter {
    fn default() -> Self {
        Self::new()
    }
}

impl PlotScatter {
    pub fn new() -> Self {
        Self {
            core: ItemCore::new("PlotScatter"),
            data: PlotItemData::new(Arc::new(Vec::new())),
            symbol_size: 3.0,
        }
    }

    pub fn data(&self) -> &PlotItemData<Arc<Vec<Point>>> {
        &self.data
    }

    pub fn set_points(&self, points: Vec<Point>) -> u64 {
        self.data.set_raw_data(Arc::new(points))
    }

    pub fn set_symbol_size(&mut self, size: f64) {
        self.symbol_size = size.max(1.0);
    }
}

impl PlotItem for PlotScatter {
    fn core(&self) -> &ItemCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ItemCore {
        &mut self.core
    }

    fn bounding_rect(&self) -> Rect {
        let pts = self.data.read();
        let mut xi = Interval::default();
        let mut yi = Interval::default();
        for p in pts.iter() {
            xi.extend(p.x);
            yi.extend(p.y);
        }
        if !xi.is_valid() {
            return Rect::default();
        }
        Rect::new(xi.min, yi.min, xi.width(), yi.width())
    }

    fn draw(&mut self, painter: &mut dyn Painter, cs: &CoordSystem) {
        if !self.core.visible {
            return;
        }
        let pts = self.data.read();
        let half = self.symbol_size / 2.0;
        let brush = if self.core.brush.visible {
            self.core.brush
        } else {
            Brush::solid(self.core.pen.color)
        };
        for p in pts.iter() {
            let c = cs.to_pixel(*p);
            painter.fill_rect(
                Rect::new(c.x - half, c.y - half, self.symbol_size, self.symbol_size),
                &brush,
            );
        }
    }

    fn set_item_property(&mut self, name: &str, value: &StyleValue, index: Option<usize>) -> bool {
        match name {
            "symbol-size" => {
                if let Some(n) = value.as_number() {
                    self.set_symbol_size(n);
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

/// One anchored position with an optional label.
pub struct PlotMarker {
    core: ItemCore,
    data: PlotItemData<Point>,
    label: Option<String>,
}

impl Default for PlotMarker {
    fn default() -> Self {
        Self::new()
    }
}

impl PlotMarker {
    pub fn new() -> Self {
        Self {
            core: ItemCore::new("PlotMarker"),
            data: PlotItemData::new(Point::default()),
            label: None,
        }
    }

    pub fn set_position(&self, pos: Point) -> u64 {
        self.data.set_raw_data(pos)
    }

    pub fn position(&self) -> Point {
        self.data.read()
    }

    pub fn set_label(&mut self, label: Option<String>) {
        self.label = label;
    }
}

impl PlotItem for PlotMarker {
    fn core(&self) -> &ItemCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ItemCore {
        &mut self.core
    }

    fn bounding_rect(&self) -> Rect {
        let p = self.data.read();
        Rect::new(p.x, p.y, 0.0, 0.0)
    }

    fn draw(&mut self, painter: &mut dyn Painter, cs: &CoordSystem) {
        if !self.core.visible {
            return;
        }
        let c = cs.to_pixel(self.data.read());
        // Crosshair.
        painter.draw_polyline(
            &[Point::new(c.x - 4.0, c.y), Point::new(c.x + 4.0, c.y)],
            &self.core.pen,
        );
        painter.draw_polyline(
            &[Point::new(c.x, c.y - 4.0), Point::new(c.x, c.y + 4.0)],
            &self.core.pen,
        );
        if let Some(ref label) = self.label {
            painter.draw_text(Point::new(c.x + 5.0, c.y - 5.0), label, &self.core.text_style);
        }
    }
}

/// Vertical bars over category indices.
pub struct PlotBars {
    core: ItemCore,
    data: PlotItemData<Arc<Vec<f64>>>,
    bar_width: f64,
}

impl Default for PlotBars {
    fn default() -> Self {
        Self::new()
    }
}

impl PlotBars {
    pub fn new() -> Self {
        Self {
            core: ItemCore::new("PlotBars"),
            data: PlotItemData::new(Arc::new(Vec::new())),
            bar_width: 0.8,
        }
    }

    pub fn set_values(&self, values: Vec<f64>) -> u64 {
        self.data.set_raw_data(Arc::new(values))
    }
}

impl PlotItem for PlotBars {
    fn core(&self) -> &ItemCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ItemCore {
        &mut self.core
    }

    fn bounding_rect(&self) -> Rect {
        let values = self.data.read();
        if values.is_empty() {
            return Rect::default();
        }
        let mut yi = Interval::new(0.0, 0.0);
        for v in values.iter() {
            yi.extend(*v);
        }
        Rect::new(-0.5, yi.min, values.len() as f64, yi.width())
    }

    fn draw(&mut self, painter: &mut dyn Painter, cs: &CoordSystem) {
        if !self.core.visible {
            return;
        }
        let values = self.data.read();
        let brush = if self.core.brush.visible {
            self.core.brush
        } else {
            Brush::solid(self.core.pen.color)
        };
        for (i, v) in values.iter().enumerate() {
            let x = i as f64;
            let tl = cs.to_pixel(Point::new(x - self.bar_width / 2.0, v.max(0.0)));
            let br = cs.to_pixel(Point::new(x + self.bar_width / 2.0, v.min(0.0)));
            painter.fill_rect(
                Rect::new(tl.x, tl.y, br.x - tl.x, br.y - tl.y).normalized(),
                &brush,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::painter::SoftwarePainter;
    use core_scale::Scale;

    fn cs() -> CoordSystem {
        let mut x = Scale::new();
        x.set_interval(Interval::new(0.0, 10.0));
        let mut y = Scale::new();
        y.set_interval(Interval::new(0.0, 10.0));
        CoordSystem::new(x, y, Rect::new(0.0, 0.0, 40.0, 40.0))
    }

    #[test]
    fn scatter_draws_one_symbol_per_point() {
        let mut s = PlotScatter::new();
        s.set_points(vec![Point::new(1.0, 1.0), Point::new(5.0, 5.0)]);
        let mut p = SoftwarePainter::new(40, 40);
        s.draw(&mut p, &cs());
        assert_eq!(p.op_count(), 2);
    }

    #[test]
    fn marker_crosshair_and_label() {
        let mut m = PlotMarker::new();
        m.set_position(Point::new(5.0, 5.0));
        m.set_label(Some("peak".to_string()));
        let mut p = SoftwarePainter::new(40, 40);
        m.draw(&mut p, &cs());
        assert_eq!(p.op_count(), 3, "two strokes + one text");
        assert_eq!(p.texts()[0].text, "peak");
    }

    #[test]
    fn bars_bounding_rect_spans_categories() {
        let b = PlotBars::new();
        b.set_values(vec![1.0, -2.0, 3.0]);
        let r = b.bounding_rect();
        assert_eq!(r.x_interval(), Interval::new(-0.5, 2.5));
        assert_eq!(r.y_interval(), Interval::new(-2.0, 3.0));
    }

    #[test]
    fn payload_swap_bumps_revision() {
        let s = PlotScatter::new();
        let r0 = s.data().revision();
        s.set_points(vec![Point::new(0.0, 0.0)]);
        assert_eq!(s.data().revision(), r0 + 1);
    }
}

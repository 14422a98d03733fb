//! Spectrogram: a raster plus iso-contour extraction.
//!
//! Contours run a marching-triangle pass over the currently extracted
//! (possibly sub-sampled) array: each cell splits into four triangles
//! around its center average and every triangle contributes the segment
//! where the level plane crosses it. Levels are a sorted list; each keeps
//! its own cached segment set behind an `Arc`, so editing one level
//! recomputes exactly that level and the others stay referentially equal.
//! A level draws with its own pen, or with a pen colored by sampling the
//! color map at the level's value.

use crate::item::{CoordSystem, ItemCore, PlotItem};
use crate::painter::Painter;
use crate::raster::{PlotRaster, RasterConverter};
use crate::sheet::StyleValue;
use crate::style::Pen;
use core_data::array::Array2;
use core_data::{Point, Rect};
use std::sync::Arc;

/// One iso level: value, pen policy, cached segments.
#[derive(Debug, Clone)]
pub struct ContourLevel {
    pub level: f64,
    /// None = sample the color map at `level`.
    pub pen: Option<Pen>,
    segments: Arc<Vec<(Point, Point)>>,
    dirty: bool,
}

impl ContourLevel {
    pub fn new(level: f64) -> Self {
        Self {
            level,
            pen: None,
            segments: Arc::new(Vec::new()),
            dirty: true,
        }
    }

    pub fn with_pen(level: f64, pen: Pen) -> Self {
        Self {
            pen: Some(pen),
            ..Self::new(level)
        }
    }

    /// Cached segments (data space). Referential equality across redraws
    /// means the level was not recomputed.
    pub fn segments(&self) -> Arc<Vec<(Point, Point)>> {
        self.segments.clone()
    }
}

pub struct PlotSpectrogram {
    raster: PlotRaster,
    levels: Vec<ContourLevel>,
    /// Extraction the cached contours were computed against.
    contour_source: Option<(Arc<Array2<f64>>, Rect)>,
}

impl PlotSpectrogram {
    pub fn new(converter: Box<dyn RasterConverter>) -> Self {
        Self {
            raster: PlotRaster::with_class("PlotSpectrogram", converter),
            levels: Vec::new(),
            contour_source: None,
        }
    }

    pub fn raster(&self) -> &PlotRaster {
        &self.raster
    }

    pub fn raster_mut(&mut self) -> &mut PlotRaster {
        &mut self.raster
    }

    /// Replace all levels (kept sorted).
    pub fn set_contour_levels(&mut self, levels: Vec<f64>) {
        let mut levels = levels;
        levels.sort_by(f64::total_cmp);
        self.levels = levels.into_iter().map(ContourLevel::new).collect();
    }

    pub fn contour_levels(&self) -> &[ContourLevel] {
        &self.levels
    }

    /// Move exactly one level; only that level's contours recompute.
    pub fn move_contour_level(&mut self, index: usize, level: f64) -> bool {
        match self.levels.get_mut(index) {
            Some(l) => {
                l.level = level;
                l.dirty = true;
                true
            }
            None => false,
        }
    }

    pub fn set_contour_pen(&mut self, index: usize, pen: Option<Pen>) -> bool {
        match self.levels.get_mut(index) {
            Some(l) => {
                l.pen = pen;
                true
            }
            None => false,
        }
    }

    /// Recompute contours against a fresh extraction of `rect`.
    fn refresh_contours(&mut self, rect: Rect, target: (usize, usize)) {
        let tile = self.raster.converter().extract(rect, target);
        let f = Arc::new(tile.convert_f64());
        let source_changed = match self.contour_source {
            Some((ref old, old_rect)) => {
                old_rect != rect || old.width() != f.width() || old.height() != f.height()
            }
            None => true,
        };
        if source_changed {
            for l in &mut self.levels {
                l.dirty = true;
            }
            self.contour_source = Some((f.clone(), rect));
        }
        let (ref array, src_rect) = *self.contour_source.as_ref().expect("just set");
        for l in &mut self.levels {
            if l.dirty {
                l.segments = Arc::new(march_triangles(array, src_rect, l.level));
                l.dirty = false;
            }
        }
    }
}

/// Marching triangles over `array` mapped onto `rect`. Returns data-space
/// segments of the `level` iso line.
pub fn march_triangles(array: &Array2<f64>, rect: Rect, level: f64) -> Vec<(Point, Point)> {
    let (w, h) = (array.width(), array.height());
    if w < 2 || h < 2 || rect.is_empty() {
        return Vec::new();
    }
    let dx = rect.width / (w - 1) as f64;
    let dy = rect.height / (h - 1) as f64;
    let pos = |x: usize, y: usize| {
        Point::new(rect.left + x as f64 * dx, rect.top + y as f64 * dy)
    };
    let mut segments = Vec::new();
    for y in 0..h - 1 {
        for x in 0..w - 1 {
            let v = [
                array.get(x, y).unwrap_or(f64::NAN),
                array.get(x + 1, y).unwrap_or(f64::NAN),
                array.get(x + 1, y + 1).unwrap_or(f64::NAN),
                array.get(x, y + 1).unwrap_or(f64::NAN),
            ];
            if v.iter().any(|v| v.is_nan()) {
                continue;
            }
            let p = [pos(x, y), pos(x + 1, y), pos(x + 1, y + 1), pos(x, y + 1)];
            let center_v = (v[0] + v[1] + v[2] + v[3]) / 4.0;
            let center_p = Point::new(
                (p[0].x + p[2].x) / 2.0,
                (p[0].y + p[2].y) / 2.0,
            );
            for i in 0..4 {
                let j = (i + 1) % 4;
                if let Some(seg) =
                    triangle_segment((p[i], v[i]), (p[j], v[j]), (center_p, center_v), level)
                {
                    segments.push(seg);
                }
            }
        }
    }
    segments
}

/// Iso segment of one triangle, if the level plane crosses it.
fn triangle_segment(
    a: (Point, f64),
    b: (Point, f64),
    c: (Point, f64),
    level: f64,
) -> Option<(Point, Point)> {
    let mut crossings: Vec<Point> = Vec::with_capacity(2);
    for ((p1, v1), (p2, v2)) in [(a, b), (b, c), (c, a)] {
        let below1 = v1 < level;
        let below2 = v2 < level;
        if below1 != below2 {
            let t = (level - v1) / (v2 - v1);
            crossings.push(Point::new(p1.x + t * (p2.x - p1.x), p1.y + t * (p2.y - p1.y)));
        }
    }
    if crossings.len() == 2 {
        Some((crossings[0], crossings[1]))
    } else {
        None
    }
}

impl PlotItem for PlotSpectrogram {
    fn core(&self) -> &ItemCore {
        self.raster.core()
    }

    fn core_mut(&mut self) -> &mut ItemCore {
        self.raster.core_mut()
    }

    fn bounding_rect(&self) -> Rect {
        self.raster.bounding_rect()
    }

    fn draw(&mut self, painter: &mut dyn Painter, cs: &CoordSystem) {
        self.raster.draw(painter, cs);
        let visible = cs.visible_rect().intersected(&self.bounding_rect());
        if visible.is_empty() || self.levels.is_empty() {
            return;
        }
        let tl = cs.to_pixel(Point::new(visible.left, visible.bottom()));
        let br = cs.to_pixel(Point::new(visible.right(), visible.top));
        let target = (
            (br.x - tl.x).abs().ceil().max(2.0) as usize,
            (br.y - tl.y).abs().ceil().max(2.0) as usize,
        );
        self.refresh_contours(visible, target);
        let grip = self.raster.color_scale().grip_interval();
        for level in &self.levels {
            let pen = level.pen.unwrap_or_else(|| {
                Pen::new(self.raster.color_scale().map().color(level.level, grip))
            });
            for (a, b) in level.segments.iter() {
                painter.draw_polyline(&[cs.to_pixel(*a), cs.to_pixel(*b)], &pen);
            }
        }
    }

    fn set_item_property(&mut self, name: &str, value: &StyleValue, index: Option<usize>) -> bool {
        match name {
            "contour-pen-color" => {
                if let (Some(color), Some(i)) = (value.as_color(), index) {
                    return self.set_contour_pen(i, Some(Pen::new(color)));
                }
                false
            }
            _ => self.raster.set_item_property(name, value, index),
        }
    }
}

//! 2D raster items: array -> colors -> screen.
//!
//! The payload is abstracted behind [`RasterConverter`] so the same item
//! renders plain arrays, RGBA image buffers and user-supplied tilers.
//! Rendering: intersect the item rectangle with the visible scale rect,
//! extract a sub-array sized to the destination pixel box, apply the color
//! map, blit. The colored tile is kept in a bypass cache keyed by
//! `(extracted rect, destination size, payload revision, grip interval)`
//! so overlay-only repaints skip extraction and color mapping entirely. A
//! foreground "superimpose" image alpha-blends on top at a configured
//! opacity; a background image draws below.

use crate::item::{Axis, CoordSystem, ItemCore, PlotItem};
use crate::painter::Painter;
use crate::sheet::StyleValue;
use core_data::array::Array2;
use core_data::{ArrayData, DataType, Interval, Point, Rect, Rgba};
use core_scale::{ColorMap, ColorMapScale, Scale, StandardMap};
use std::sync::Arc;

/// Payload abstraction for raster items.
pub trait RasterConverter: Send {
    /// Data-space rectangle the raster covers.
    fn bounding_rect(&self) -> Rect;

    fn data_type(&self) -> DataType;

    /// Extract `rect` (data space, clamped by the caller) resampled to
    /// roughly `target` pixels.
    fn extract(&self, rect: Rect, target: (usize, usize)) -> ArrayData;

    /// Sample the value under a data-space position.
    fn pick(&self, pos: Point) -> Option<f64>;

    /// Value bounds, optionally restricted to `valid`.
    fn bounds(&self, valid: Option<Interval>) -> Interval;
}

/// Converter over a plain 2D array placed into a data-space rectangle.
pub struct ArrayConverter {
    array: ArrayData,
    rect: Rect,
}

impl ArrayConverter {
    pub fn new(array: ArrayData, rect: Rect) -> Self {
        Self { array, rect }
    }

    /// Place the array at the origin, one data unit per sample.
    pub fn unit(array: ArrayData) -> Self {
        let rect = Rect::new(0.0, 0.0, array.width() as f64, array.height() as f64);
        Self { array, rect }
    }

    fn to_sample_rect(&self, rect: Rect) -> (usize, usize, usize, usize) {
        let sx = self.array.width() as f64 / self.rect.width.max(f64::EPSILON);
        let sy = self.array.height() as f64 / self.rect.height.max(f64::EPSILON);
        let x0 = ((rect.left - self.rect.left) * sx).floor().max(0.0) as usize;
        let y0 = ((rect.top - self.rect.top) * sy).floor().max(0.0) as usize;
        let w = (rect.width * sx).ceil() as usize;
        let h = (rect.height * sy).ceil() as usize;
        (x0, y0, w.max(1), h.max(1))
    }
}

impl RasterConverter for ArrayConverter {
    fn bounding_rect(&self) -> Rect {
        self.rect
    }

    fn data_type(&self) -> DataType {
        self.array.data_type()
    }

    fn extract(&self, rect: Rect, target: (usize, usize)) -> ArrayData {
        let (x0, y0, w, h) = self.to_sample_rect(rect);
        // Decimate so the extracted tile is no finer than the target box.
        let step_x = (w / target.0.max(1)).max(1);
        let step_y = (h / target.1.max(1)).max(1);
        self.array.extract(x0, y0, w, h, step_x.max(step_y))
    }

    fn pick(&self, pos: Point) -> Option<f64> {
        if !self.rect.contains(pos) {
            return None;
        }
        let sx = self.array.width() as f64 / self.rect.width.max(f64::EPSILON);
        let sy = self.array.height() as f64 / self.rect.height.max(f64::EPSILON);
        let x = ((pos.x - self.rect.left) * sx) as usize;
        let y = ((pos.y - self.rect.top) * sy) as usize;
        self.array.pick(x, y)
    }

    fn bounds(&self, valid: Option<Interval>) -> Interval {
        self.array.bounds(valid)
    }
}

/// Converter over an already-colored RGBA buffer.
pub struct ImageConverter {
    image: Array2<Rgba>,
    rect: Rect,
}

impl ImageConverter {
    pub fn new(image: Array2<Rgba>, rect: Rect) -> Self {
        Self { image, rect }
    }
}

impl RasterConverter for ImageConverter {
    fn bounding_rect(&self) -> Rect {
        self.rect
    }

    fn data_type(&self) -> DataType {
        DataType::Rgba
    }

    fn extract(&self, rect: Rect, target: (usize, usize)) -> ArrayData {
        let inner = ArrayConverter::new(ArrayData::Rgba(self.image.clone()), self.rect);
        inner.extract(rect, target)
    }

    fn pick(&self, pos: Point) -> Option<f64> {
        let inner = ArrayConverter::new(ArrayData::Rgba(self.image.clone()), self.rect);
        inner.pick(pos)
    }

    fn bounds(&self, valid: Option<Interval>) -> Interval {
        ArrayData::Rgba(self.image.clone()).bounds(valid)
    }
}

type TileFn = dyn Fn(Rect, (usize, usize)) -> ArrayData + Send + Sync;

/// User-supplied tiler: the item asks for exactly the visible tile.
pub struct TilerConverter {
    rect: Rect,
    data_type: DataType,
    bounds: Interval,
    tiler: Arc<TileFn>,
}

impl TilerConverter {
    pub fn new(
        rect: Rect,
        data_type: DataType,
        bounds: Interval,
        tiler: impl Fn(Rect, (usize, usize)) -> ArrayData + Send + Sync + 'static,
    ) -> Self {
        Self {
            rect,
            data_type,
            bounds,
            tiler: Arc::new(tiler),
        }
    }
}

impl RasterConverter for TilerConverter {
    fn bounding_rect(&self) -> Rect {
        self.rect
    }

    fn data_type(&self) -> DataType {
        self.data_type
    }

    fn extract(&self, rect: Rect, target: (usize, usize)) -> ArrayData {
        (self.tiler)(rect, target)
    }

    fn pick(&self, pos: Point) -> Option<f64> {
        let tile = (self.tiler)(Rect::new(pos.x, pos.y, 1.0, 1.0), (1, 1));
        tile.pick(0, 0)
    }

    fn bounds(&self, _valid: Option<Interval>) -> Interval {
        self.bounds
    }
}

/// Cache key + colored tile of the last extraction.
struct Bypass {
    rect: Rect,
    target: (usize, usize),
    revision: u64,
    grip: Interval,
    colored: Array2<Rgba>,
}

pub struct PlotRaster {
    core: ItemCore,
    converter: Box<dyn RasterConverter>,
    color_scale: ColorMapScale,
    revision: u64,
    bypass: Option<Bypass>,
    superimpose: Option<(Array2<Rgba>, f64)>,
    background: Option<Array2<Rgba>>,
}

impl PlotRaster {
    pub fn new(converter: Box<dyn RasterConverter>) -> Self {
        Self::with_class("PlotRaster", converter)
    }

    pub(crate) fn with_class(class: &'static str, converter: Box<dyn RasterConverter>) -> Self {
        let mut scale = Scale::new();
        let bounds = converter.bounds(None);
        if bounds.is_valid() {
            scale.set_interval(bounds);
        }
        let mut color_scale = ColorMapScale::new(scale, ColorMap::standard(StandardMap::Fusion));
        let iv = color_scale.scale().interval();
        color_scale.set_grip_interval(iv);
        Self {
            core: ItemCore::new(class),
            converter,
            color_scale,
            revision: 0,
            bypass: None,
            superimpose: None,
            background: None,
        }
    }

    pub fn color_scale(&self) -> &ColorMapScale {
        &self.color_scale
    }

    pub fn color_scale_mut(&mut self) -> &mut ColorMapScale {
        // Grip or map edits invalidate the colored tile via the key.
        &mut self.color_scale
    }

    /// Swap the payload converter; bumps the cache revision.
    pub fn set_converter(&mut self, converter: Box<dyn RasterConverter>) {
        self.converter = converter;
        self.revision += 1;
        let bounds = self.converter.bounds(None);
        if self.core.attributes.contains(crate::item::ItemAttributes::AUTO_SCALE)
            && bounds.is_valid()
        {
            self.color_scale.set_scale_interval(bounds);
        }
    }

    pub fn converter(&self) -> &dyn RasterConverter {
        self.converter.as_ref()
    }

    pub fn set_superimpose(&mut self, image: Option<Array2<Rgba>>, opacity: f64) {
        self.superimpose = image.map(|i| (i, opacity.clamp(0.0, 1.0)));
    }

    pub fn set_background(&mut self, image: Option<Array2<Rgba>>) {
        self.background = image;
    }

    pub fn pick(&self, pos: Point) -> Option<f64> {
        self.converter.pick(pos)
    }

    /// True when the last draw served from the bypass cache (test probe).
    pub fn bypass_valid_for(&self, rect: Rect, target: (usize, usize)) -> bool {
        self.bypass
            .as_ref()
            .map(|b| {
                b.rect == rect
                    && b.target == target
                    && b.revision == self.revision
                    && b.grip == self.color_scale.grip_interval()
            })
            .unwrap_or(false)
    }

    fn colored_tile(&mut self, rect: Rect, target: (usize, usize)) -> Array2<Rgba> {
        let grip = self.color_scale.grip_interval();
        if let Some(ref b) = self.bypass {
            if b.rect == rect && b.target == target && b.revision == self.revision && b.grip == grip
            {
                return b.colored.clone();
            }
        }
        let tile = self.converter.extract(rect, target);
        let colored = match tile {
            // Pre-colored payloads bypass the map entirely.
            ArrayData::Rgba(img) => img,
            other => {
                let f = other.convert_f64();
                self.color_scale.map_mut().apply(&f, grip)
            }
        };
        self.bypass = Some(Bypass {
            rect,
            target,
            revision: self.revision,
            grip,
            colored: colored.clone(),
        });
        colored
    }
}

impl PlotItem for PlotRaster {
    fn core(&self) -> &ItemCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ItemCore {
        &mut self.core
    }

    fn bounding_rect(&self) -> Rect {
        self.converter.bounding_rect()
    }

    fn plot_interval(&self, axis: Axis) -> Interval {
        match axis {
            Axis::X => self.bounding_rect().x_interval(),
            Axis::Y => self.bounding_rect().y_interval(),
            Axis::Z => self.converter.bounds(None),
        }
    }

    fn draw(&mut self, painter: &mut dyn Painter, cs: &CoordSystem) {
        if !self.core.visible {
            return;
        }
        let visible = cs.visible_rect().intersected(&self.bounding_rect());
        if visible.is_empty() {
            // Entirely outside: no draw calls, no warning.
            return;
        }
        let tl = cs.to_pixel(Point::new(visible.left, visible.bottom()));
        let br = cs.to_pixel(Point::new(visible.right(), visible.top));
        let dest_w = (br.x - tl.x).abs().ceil() as usize;
        let dest_h = (br.y - tl.y).abs().ceil() as usize;
        if dest_w == 0 || dest_h == 0 {
            return;
        }

        let ox = tl.x.min(br.x).round() as i64;
        let oy = tl.y.min(br.y).round() as i64;

        if let Some(ref bg) = self.background {
            painter.blit(ox, oy, bg, 1.0);
        }
        let colored = self.colored_tile(visible, (dest_w, dest_h));
        let scaled = resample_nearest(&colored, dest_w, dest_h);
        painter.blit(ox, oy, &scaled, 1.0);
        if let Some((ref fg, opacity)) = self.superimpose {
            painter.blit(ox, oy, fg, opacity);
        }
    }

    fn set_item_property(&mut self, name: &str, value: &StyleValue, index: Option<usize>) -> bool {
        match name {
            "flat-histogram-strength" => {
                if let Some(n) = value.as_number() {
                    self.color_scale
                        .map_mut()
                        .set_flat_histogram_strength(n.clamp(0.0, 100.0) as u8);
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

/// Nearest-neighbour resample to the destination pixel box.
pub(crate) fn resample_nearest(src: &Array2<Rgba>, w: usize, h: usize) -> Array2<Rgba> {
    if src.is_empty() || w == 0 || h == 0 {
        return Array2::empty();
    }
    if src.width() == w && src.height() == h {
        return src.clone();
    }
    let mut out = Vec::with_capacity(w * h);
    for y in 0..h {
        let sy = y * src.height() / h;
        for x in 0..w {
            let sx = x * src.width() / w;
            out.push(src.get(sx, sy).unwrap_or(Rgba::TRANSPARENT));
        }
    }
    Array2::from_vec(w, h, out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::painter::SoftwarePainter;

    fn ramp_raster(n: usize) -> PlotRaster {
        let data: Vec<f64> = (0..n * n).map(|i| i as f64).collect();
        let array = ArrayData::F64(Array2::from_vec(n, n, data));
        PlotRaster::new(Box::new(ArrayConverter::unit(array)))
    }

    fn cs(xi: Interval, yi: Interval, w: f64, h: f64) -> CoordSystem {
        let mut x = Scale::new();
        x.set_interval(xi);
        let mut y = Scale::new();
        y.set_interval(yi);
        CoordSystem::new(x, y, Rect::new(0.0, 0.0, w, h))
    }

    #[test]
    fn outside_scale_rect_draws_nothing() {
        let mut raster = ramp_raster(8);
        let mut p = SoftwarePainter::new(32, 32);
        let cs = cs(
            Interval::new(100.0, 200.0),
            Interval::new(100.0, 200.0),
            32.0,
            32.0,
        );
        raster.draw(&mut p, &cs);
        assert_eq!(p.op_count(), 0);
    }

    #[test]
    fn visible_raster_blits() {
        let mut raster = ramp_raster(8);
        let mut p = SoftwarePainter::new(32, 32);
        let cs = cs(Interval::new(0.0, 8.0), Interval::new(0.0, 8.0), 32.0, 32.0);
        raster.draw(&mut p, &cs);
        assert_eq!(p.op_count(), 1);
    }

    #[test]
    fn bypass_cache_hits_on_identical_view() {
        let mut raster = ramp_raster(8);
        let mut p = SoftwarePainter::new(32, 32);
        let cs = cs(Interval::new(0.0, 8.0), Interval::new(0.0, 8.0), 32.0, 32.0);
        raster.draw(&mut p, &cs);
        let visible = cs.visible_rect().intersected(&raster.bounding_rect());
        assert!(raster.bypass_valid_for(visible, (32, 32)));
        // A grip edit invalidates the key.
        raster
            .color_scale_mut()
            .set_grip_interval(Interval::new(0.0, 30.0));
        assert!(!raster.bypass_valid_for(visible, (32, 32)));
    }

    #[test]
    fn converter_swap_bumps_revision() {
        let mut raster = ramp_raster(4);
        let mut p = SoftwarePainter::new(16, 16);
        let cs = cs(Interval::new(0.0, 4.0), Interval::new(0.0, 4.0), 16.0, 16.0);
        raster.draw(&mut p, &cs);
        let visible = cs.visible_rect().intersected(&raster.bounding_rect());
        assert!(raster.bypass_valid_for(visible, (16, 16)));
        raster.set_converter(Box::new(ArrayConverter::unit(ArrayData::F64(
            Array2::filled(4, 4, 1.0),
        ))));
        assert!(!raster.bypass_valid_for(visible, (16, 16)));
    }

    #[test]
    fn pick_reads_sample_values() {
        let raster = ramp_raster(4);
        assert_eq!(raster.pick(Point::new(0.5, 0.5)), Some(0.0));
        assert_eq!(raster.pick(Point::new(3.5, 3.5)), Some(15.0));
        assert_eq!(raster.pick(Point::new(10.0, 10.0)), None);
    }

    #[test]
    fn superimpose_draws_after_raster() {
        let mut raster = ramp_raster(4);
        raster.set_superimpose(Some(Array2::filled(4, 4, Rgba::opaque(255, 0, 0))), 0.5);
        let mut p = SoftwarePainter::new(16, 16);
        let cs = cs(Interval::new(0.0, 4.0), Interval::new(0.0, 4.0), 16.0, 16.0);
        raster.draw(&mut p, &cs);
        assert_eq!(p.op_count(), 2, "raster blit + superimpose blit");
    }

    #[test]
    fn resample_nearest_shapes() {
        let src = Array2::from_vec(2, 2, vec![
            Rgba::opaque(0, 0, 0),
            Rgba::opaque(255, 0, 0),
            Rgba::opaque(0, 255, 0),
            Rgba::opaque(0, 0, 255),
        ]);
        let up = resample_nearest(&src, 4, 4);
        assert_eq!(up.width(), 4);
        assert_eq!(up.get(0, 0).unwrap(), Rgba::opaque(0, 0, 0));
        assert_eq!(up.get(3, 0).unwrap(), Rgba::opaque(255, 0, 0));
    }
}

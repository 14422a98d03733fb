//! Abstract drawing surface and the software raster implementation.
//!
//! Plot items draw through [`Painter`]; the toolkit binding supplies the
//! real surface in production. [`SoftwarePainter`] rasterizes into an RGBA
//! buffer (lines, polygon fills, blits) and records text operations
//! verbatim — glyph rendering is toolkit territory, but tests and the
//! terminal demo still need to observe what would be written.

use crate::style::{Brush, Pen, TextStyle};
use core_data::array::Array2;
use core_data::{Point, Rect, Rgba};

/// Recorded text call (the software painter does not rasterize glyphs).
#[derive(Debug, Clone, PartialEq)]
pub struct TextOp {
    pub pos: Point,
    pub text: String,
    pub style: TextStyle,
}

pub trait Painter {
    /// Surface size in pixels `(width, height)`.
    fn size(&self) -> (usize, usize);

    fn draw_polyline(&mut self, points: &[Point], pen: &Pen);

    fn fill_polygon(&mut self, points: &[Point], brush: &Brush);

    fn fill_rect(&mut self, rect: Rect, brush: &Brush);

    fn draw_rect(&mut self, rect: Rect, pen: &Pen);

    /// Alpha-blend `image` with `opacity` in [0, 1] at integer offset.
    fn blit(&mut self, x: i64, y: i64, image: &Array2<Rgba>, opacity: f64);

    fn draw_text(&mut self, pos: Point, text: &str, style: &TextStyle);

    /// Number of primitive calls so far (tests assert on draw activity).
    fn op_count(&self) -> usize;
}

/// CPU rasterizer over an owned RGBA buffer.
pub struct SoftwarePainter {
    width: usize,
    height: usize,
    pixels: Vec<Rgba>,
    texts: Vec<TextOp>,
    ops: usize,
}

impl SoftwarePainter {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            pixels: vec![Rgba::opaque(255, 255, 255); width * height],
            texts: Vec::new(),
            ops: 0,
        }
    }

    pub fn clear(&mut self, color: Rgba) {
        self.pixels.fill(color);
        self.texts.clear();
        self.ops = 0;
    }

    pub fn pixel(&self, x: usize, y: usize) -> Option<Rgba> {
        if x < self.width && y < self.height {
            Some(self.pixels[y * self.width + x])
        } else {
            None
        }
    }

    pub fn pixels(&self) -> &[Rgba] {
        &self.pixels
    }

    pub fn texts(&self) -> &[TextOp] {
        &self.texts
    }

    pub fn into_image(self) -> Array2<Rgba> {
        Array2::from_vec(self.width, self.height, self.pixels)
    }

    #[inline]
    fn blend(&mut self, x: i64, y: i64, color: Rgba, opacity: f64) {
        if x < 0 || y < 0 || x as usize >= self.width || y as usize >= self.height {
            return;
        }
        let alpha = (color.a as f64 / 255.0) * opacity.clamp(0.0, 1.0);
        if alpha <= 0.0 {
            return;
        }
        let idx = y as usize * self.width + x as usize;
        let dst = self.pixels[idx];
        let mix = |s: u8, d: u8| (s as f64 * alpha + d as f64 * (1.0 - alpha)).round() as u8;
        self.pixels[idx] = Rgba::new(
            mix(color.r, dst.r),
            mix(color.g, dst.g),
            mix(color.b, dst.b),
            255,
        );
    }

    fn line(&mut self, a: Point, b: Point, pen: &Pen) {
        // Bresenham over rounded endpoints; pen width 1..2 widens by a
        // second pass offset one pixel.
        let (x0, y0) = (a.x.round() as i64, a.y.round() as i64);
        let (x1, y1) = (b.x.round() as i64, b.y.round() as i64);
        let dx = (x1 - x0).abs();
        let dy = -(y1 - y0).abs();
        let sx = if x0 < x1 { 1 } else { -1 };
        let sy = if y0 < y1 { 1 } else { -1 };
        let mut err = dx + dy;
        let (mut x, mut y) = (x0, y0);
        loop {
            self.blend(x, y, pen.color, 1.0);
            if pen.width > 1.5 {
                self.blend(x + 1, y, pen.color, 1.0);
                self.blend(x, y + 1, pen.color, 1.0);
            }
            if x == x1 && y == y1 {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x += sx;
            }
            if e2 <= dx {
                err += dx;
                y += sy;
            }
        }
    }
}

impl Painter for SoftwarePainter {
    fn size(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    fn draw_polyline(&mut self, points: &[Point], pen: &Pen) {
        if !pen.visible || points.len() < 2 {
            return;
        }
        self.ops += 1;
        for w in points.windows(2) {
            self.line(w[0], w[1], pen);
        }
    }

    fn fill_polygon(&mut self, points: &[Point], brush: &Brush) {
        if !brush.visible || points.len() < 3 {
            return;
        }
        self.ops += 1;
        // Even-odd scanline fill.
        let min_y = points.iter().map(|p| p.y).fold(f64::INFINITY, f64::min);
        let max_y = points.iter().map(|p| p.y).fold(f64::NEG_INFINITY, f64::max);
        let y0 = min_y.floor().max(0.0) as i64;
        let y1 = (max_y.ceil() as i64).min(self.height as i64 - 1);
        for y in y0..=y1 {
            let scan = y as f64 + 0.5;
            let mut xs: Vec<f64> = Vec::new();
            let n = points.len();
            for i in 0..n {
                let (p, q) = (points[i], points[(i + 1) % n]);
                if (p.y <= scan && q.y > scan) || (q.y <= scan && p.y > scan) {
                    let t = (scan - p.y) / (q.y - p.y);
                    xs.push(p.x + t * (q.x - p.x));
                }
            }
            xs.sort_by(|a, b| a.total_cmp(b));
            for pair in xs.chunks_exact(2) {
                let x0 = pair[0].round().max(0.0) as i64;
                let x1 = pair[1].round() as i64;
                for x in x0..=x1 {
                    self.blend(x, y, brush.color, 1.0);
                }
            }
        }
    }

    fn fill_rect(&mut self, rect: Rect, brush: &Brush) {
        if !brush.visible || rect.is_empty() {
            return;
        }
        self.ops += 1;
        let x0 = rect.left.round().max(0.0) as i64;
        let y0 = rect.top.round().max(0.0) as i64;
        let x1 = rect.right().round() as i64;
        let y1 = rect.bottom().round() as i64;
        for y in y0..y1 {
            for x in x0..x1 {
                self.blend(x, y, brush.color, 1.0);
            }
        }
    }

    fn draw_rect(&mut self, rect: Rect, pen: &Pen) {
        if !pen.visible || rect.is_empty() {
            return;
        }
        self.ops += 1;
        let tl = Point::new(rect.left, rect.top);
        let tr = Point::new(rect.right(), rect.top);
        let br = Point::new(rect.right(), rect.bottom());
        let bl = Point::new(rect.left, rect.bottom());
        for (a, b) in [(tl, tr), (tr, br), (br, bl), (bl, tl)] {
            self.line(a, b, pen);
        }
    }

    fn blit(&mut self, x: i64, y: i64, image: &Array2<Rgba>, opacity: f64) {
        if image.is_empty() || opacity <= 0.0 {
            return;
        }
        self.ops += 1;
        for sy in 0..image.height() {
            for sx in 0..image.width() {
                if let Some(c) = image.get(sx, sy) {
                    self.blend(x + sx as i64, y + sy as i64, c, opacity);
                }
            }
        }
    }

    fn draw_text(&mut self, pos: Point, text: &str, style: &TextStyle) {
        self.ops += 1;
        self.texts.push(TextOp {
            pos,
            text: text.to_string(),
            style: style.clone(),
        });
    }

    fn op_count(&self) -> usize {
        self.ops
    }
}

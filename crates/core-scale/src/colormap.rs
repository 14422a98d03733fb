//! Value -> color mapping.
//!
//! A color map is a compact 256-entry table built from gradient stops and
//! keyed by normalized position in the active interval, so per-sample
//! lookups are O(1). Out-of-range samples either clamp to the table ends
//! or map to a fixed sentinel color. The optional flat-histogram mode
//! recomputes the table indices from the cumulative histogram of the
//! current image so visible contrast equalizes; `strength` in [0, 100]
//! blends between the linear and the fully equalized mapping.

use core_data::array::Array2;
use core_data::{Interval, Rgba};

/// One gradient stop at normalized position `pos` in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorStop {
    pub pos: f64,
    pub color: Rgba,
}

impl ColorStop {
    pub const fn new(pos: f64, color: Rgba) -> Self {
        Self { pos, color }
    }
}

/// Behavior for samples outside the active interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutOfRange {
    /// Use the nearest table end.
    #[default]
    Clamp,
    /// Paint a fixed sentinel color.
    Sentinel(Rgba),
}

/// Built-in gradients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StandardMap {
    Gray,
    Fusion,
    Rainbow,
}

const TABLE_SIZE: usize = 256;

#[derive(Debug, Clone)]
pub struct ColorMap {
    table: Box<[Rgba; TABLE_SIZE]>,
    out_of_range: OutOfRange,
    /// Equalization strength in [0, 100]; 0 = linear mapping.
    flat_histogram_strength: u8,
    /// Index remap computed from the last image histogram.
    remap: Option<Box<[u8; TABLE_SIZE]>>,
}

impl ColorMap {
    pub fn from_stops(stops: &[ColorStop]) -> Self {
        let mut sorted: Vec<ColorStop> = stops.to_vec();
        sorted.sort_by(|a, b| a.pos.total_cmp(&b.pos));
        let mut table = Box::new([Rgba::TRANSPARENT; TABLE_SIZE]);
        for (i, slot) in table.iter_mut().enumerate() {
            let t = i as f64 / (TABLE_SIZE - 1) as f64;
            *slot = sample_stops(&sorted, t);
        }
        Self {
            table,
            out_of_range: OutOfRange::Clamp,
            flat_histogram_strength: 0,
            remap: None,
        }
    }

    pub fn standard(map: StandardMap) -> Self {
        let stops: &[ColorStop] = match map {
            StandardMap::Gray => &[
                ColorStop::new(0.0, Rgba::opaque(0, 0, 0)),
                ColorStop::new(1.0, Rgba::opaque(255, 255, 255)),
            ],
            StandardMap::Fusion => &[
                ColorStop::new(0.0, Rgba::opaque(0, 0, 128)),
                ColorStop::new(0.25, Rgba::opaque(0, 160, 220)),
                ColorStop::new(0.5, Rgba::opaque(90, 205, 90)),
                ColorStop::new(0.75, Rgba::opaque(255, 215, 0)),
                ColorStop::new(1.0, Rgba::opaque(200, 0, 0)),
            ],
            StandardMap::Rainbow => &[
                ColorStop::new(0.0, Rgba::opaque(128, 0, 255)),
                ColorStop::new(0.2, Rgba::opaque(0, 0, 255)),
                ColorStop::new(0.4, Rgba::opaque(0, 255, 255)),
                ColorStop::new(0.6, Rgba::opaque(0, 255, 0)),
                ColorStop::new(0.8, Rgba::opaque(255, 255, 0)),
                ColorStop::new(1.0, Rgba::opaque(255, 0, 0)),
            ],
        };
        Self::from_stops(stops)
    }

    /// A gray map whose alpha ramps 0 -> 255 (overlay masks).
    pub fn alpha_ramp(color: Rgba) -> Self {
        let mut table = Box::new([Rgba::TRANSPARENT; TABLE_SIZE]);
        for (i, slot) in table.iter_mut().enumerate() {
            *slot = Rgba::new(color.r, color.g, color.b, i as u8);
        }
        Self {
            table,
            out_of_range: OutOfRange::Clamp,
            flat_histogram_strength: 0,
            remap: None,
        }
    }

    pub fn out_of_range(&self) -> OutOfRange {
        self.out_of_range
    }

    pub fn set_out_of_range(&mut self, policy: OutOfRange) {
        self.out_of_range = policy;
    }

    pub fn flat_histogram_strength(&self) -> u8 {
        self.flat_histogram_strength
    }

    /// 0 disables equalization and drops the remap.
    pub fn set_flat_histogram_strength(&mut self, strength: u8) {
        self.flat_histogram_strength = strength.min(100);
        if self.flat_histogram_strength == 0 {
            self.remap = None;
        }
    }

    /// Pre-compute the equalization remap from the image about to be
    /// colored. Called at color-apply time by raster rendering.
    pub fn update_flat_histogram(&mut self, image: &Array2<f64>, interval: Interval) {
        if self.flat_histogram_strength == 0 || !interval.is_valid() || interval.width() <= 0.0 {
            self.remap = None;
            return;
        }
        let mut counts = [0u64; TABLE_SIZE];
        let mut total = 0u64;
        for v in image.as_slice() {
            if v.is_nan() || !interval.contains(*v) {
                continue;
            }
            let idx = (interval.normalize(*v) * (TABLE_SIZE - 1) as f64) as usize;
            counts[idx] += 1;
            total += 1;
        }
        if total == 0 {
            self.remap = None;
            return;
        }
        let strength = self.flat_histogram_strength as f64 / 100.0;
        let mut remap = Box::new([0u8; TABLE_SIZE]);
        let mut cumulative = 0u64;
        for i in 0..TABLE_SIZE {
            cumulative += counts[i];
            let equalized = (cumulative - counts[i].min(cumulative)) as f64 / total as f64;
            let linear = i as f64 / (TABLE_SIZE - 1) as f64;
            let blended = linear * (1.0 - strength) + equalized * strength;
            remap[i] = (blended * (TABLE_SIZE - 1) as f64).round() as u8;
        }
        self.remap = Some(remap);
    }

    /// Map one sample. O(1): normalize, index, optional remap.
    #[inline]
    pub fn color(&self, v: f64, interval: Interval) -> Rgba {
        if v.is_nan() {
            return match self.out_of_range {
                OutOfRange::Clamp => self.table[0],
                OutOfRange::Sentinel(c) => c,
            };
        }
        if let OutOfRange::Sentinel(c) = self.out_of_range {
            if !interval.contains(v) {
                return c;
            }
        }
        let mut idx = (interval.normalize(v) * (TABLE_SIZE - 1) as f64) as usize;
        if let Some(ref remap) = self.remap {
            idx = remap[idx] as usize;
        }
        self.table[idx]
    }

    /// Color a whole image, applying flat-histogram equalization against
    /// this very image when enabled.
    pub fn apply(&mut self, image: &Array2<f64>, interval: Interval) -> Array2<Rgba> {
        self.update_flat_histogram(image, interval);
        let out: Vec<Rgba> = image
            .as_slice()
            .iter()
            .map(|v| self.color(*v, interval))
            .collect();
        Array2::from_vec(image.width(), image.height(), out)
    }

    pub fn table(&self) -> &[Rgba; TABLE_SIZE] {
        &self.table
    }
}

fn sample_stops(stops: &[ColorStop], t: f64) -> Rgba {
    match stops {
        [] => Rgba::TRANSPARENT,
        [only] => only.color,
        _ => {
            if t <= stops[0].pos {
                return stops[0].color;
            }
            if t >= stops[stops.len() - 1].pos {
                return stops[stops.len() - 1].color;
            }
            for w in stops.windows(2) {
                let (a, b) = (w[0], w[1]);
                if t >= a.pos && t <= b.pos {
                    let span = b.pos - a.pos;
                    let f = if span <= 0.0 { 0.0 } else { (t - a.pos) / span };
                    return lerp(a.color, b.color, f);
                }
            }
            stops[stops.len() - 1].color
        }
    }
}

fn lerp(a: Rgba, b: Rgba, t: f64) -> Rgba {
    let mix = |x: u8, y: u8| (x as f64 + (y as f64 - x as f64) * t).round() as u8;
    Rgba::new(mix(a.r, b.r), mix(a.g, b.g), mix(a.b, b.b), mix(a.a, b.a))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gray_map_endpoints() {
        let m = ColorMap::standard(StandardMap::Gray);
        let iv = Interval::new(0.0, 1.0);
        assert_eq!(m.color(0.0, iv), Rgba::opaque(0, 0, 0));
        assert_eq!(m.color(1.0, iv), Rgba::opaque(255, 255, 255));
        let mid = m.color(0.5, iv);
        assert!(mid.r > 100 && mid.r < 155, "midpoint is mid-gray");
    }

    #[test]
    fn clamp_policy_uses_table_ends() {
        let m = ColorMap::standard(StandardMap::Gray);
        let iv = Interval::new(0.0, 1.0);
        assert_eq!(m.color(-5.0, iv), m.color(0.0, iv));
        assert_eq!(m.color(5.0, iv), m.color(1.0, iv));
    }

    #[test]
    fn sentinel_policy_marks_outliers() {
        let mut m = ColorMap::standard(StandardMap::Gray);
        let sentinel = Rgba::opaque(255, 0, 255);
        m.set_out_of_range(OutOfRange::Sentinel(sentinel));
        let iv = Interval::new(0.0, 1.0);
        assert_eq!(m.color(2.0, iv), sentinel);
        assert_eq!(m.color(f64::NAN, iv), sentinel);
        assert_ne!(m.color(0.5, iv), sentinel);
    }

    #[test]
    fn flat_histogram_spreads_clustered_values() {
        let mut m = ColorMap::standard(StandardMap::Gray);
        m.set_flat_histogram_strength(100);
        // 90% of samples cluster at the bottom decile.
        let mut data = vec![0.05; 900];
        data.extend(std::iter::repeat_n(0.95, 100));
        let image = Array2::from_vec(100, 10, data);
        let iv = Interval::new(0.0, 1.0);
        let colored = m.apply(&image, iv);
        // After equalization the cluster's color index must be pushed
        // well above its linear position (~13/255).
        let cluster = colored.get(0, 0).unwrap();
        assert!(
            cluster.r < 30,
            "the lowest-valued cluster keeps a low index (cumulative below it is ~0), got {}",
            cluster.r
        );
        let top = colored.get(99, 9).unwrap();
        assert!(top.r > 200, "sparse top values stay near the top");
    }

    #[test]
    fn zero_strength_is_linear() {
        let mut m = ColorMap::standard(StandardMap::Gray);
        m.set_flat_histogram_strength(0);
        let image = Array2::from_vec(2, 1, vec![0.0, 1.0]);
        let colored = m.apply(&image, Interval::new(0.0, 1.0));
        assert_eq!(colored.get(0, 0).unwrap(), Rgba::opaque(0, 0, 0));
        assert_eq!(colored.get(1, 0).unwrap(), Rgba::opaque(255, 255, 255));
    }

    #[test]
    fn alpha_ramp_is_transparent_at_zero() {
        let m = ColorMap::alpha_ramp(Rgba::opaque(255, 0, 0));
        let iv = Interval::new(0.0, 1.0);
        assert_eq!(m.color(0.0, iv).a, 0);
        assert_eq!(m.color(1.0, iv).a, 255);
    }
}

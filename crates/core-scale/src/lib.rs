//! Numeric <-> screen mapping: scale divisions, tick engines, label
//! formatting, color maps and slider grips.
//!
//! Everything here is pure state + math; rendering lives with the plot
//! items. A [`Scale`] owns its division (interval + three tick
//! categories), an engine (linear or log), a value-to-text object and an
//! auto-scale flag. A [`ColorMapScale`] adds a 256-entry color table and a
//! pair of slider grips whose values bound the active interval.

pub mod colormap;
pub mod engine;
pub mod grip;
pub mod scalediv;
pub mod text;

pub use colormap::{ColorMap, ColorStop, OutOfRange, StandardMap};
pub use engine::{LOG_MIN, ScaleEngine, divide_interval};
pub use grip::{ColorMapScale, SliderGrip};
pub use scalediv::{ScaleDiv, TickKind};
pub use text::ValueToText;

use core_data::Interval;

/// One axis: interval, ticks, engine, label policy.
#[derive(Debug, Clone)]
pub struct Scale {
    div: ScaleDiv,
    engine: ScaleEngine,
    text: ValueToText,
    auto_scale: bool,
}

impl Default for Scale {
    fn default() -> Self {
        Self::new()
    }
}

impl Scale {
    pub fn new() -> Self {
        Self {
            div: ScaleDiv::from_interval(Interval::new(0.0, 1.0)),
            engine: ScaleEngine::Linear,
            text: ValueToText::default(),
            auto_scale: true,
        }
    }

    pub fn div(&self) -> &ScaleDiv {
        &self.div
    }

    pub fn interval(&self) -> Interval {
        self.div.interval()
    }

    pub fn engine(&self) -> ScaleEngine {
        self.engine
    }

    pub fn set_engine(&mut self, engine: ScaleEngine) {
        self.engine = engine;
        self.rebuild(self.div.interval());
    }

    pub fn text(&self) -> &ValueToText {
        &self.text
    }

    pub fn set_text(&mut self, text: ValueToText) {
        self.text = text;
    }

    pub fn is_auto_scale(&self) -> bool {
        self.auto_scale
    }

    pub fn set_auto_scale(&mut self, auto: bool) {
        self.auto_scale = auto;
    }

    /// Manually fix the interval (disables nothing; auto-scale callers
    /// simply won't call this).
    pub fn set_interval(&mut self, interval: Interval) {
        self.rebuild(interval);
    }

    /// Absorb data bounds when auto-scaling.
    pub fn auto_fit(&mut self, bounds: Interval) {
        if self.auto_scale && bounds.is_valid() {
            self.rebuild(bounds);
        }
    }

    fn rebuild(&mut self, interval: Interval) {
        self.div = divide_interval(self.engine, interval, 8, 5);
        self.text.update_exponent(self.div.interval());
    }

    /// Map a value into `[0, 1]` along the scale (log-aware).
    pub fn normalize(&self, v: f64) -> f64 {
        self.engine.normalize(self.div.interval(), v)
    }

    /// Map a value into pixel space `[p0, p1]` (p1 may be < p0 for
    /// inverted axes).
    pub fn map(&self, v: f64, p0: f64, p1: f64) -> f64 {
        p0 + (p1 - p0) * self.normalize(v)
    }

    /// Inverse of [`Scale::map`].
    pub fn invert(&self, p: f64, p0: f64, p1: f64) -> f64 {
        let t = if (p1 - p0).abs() < f64::EPSILON {
            0.0
        } else {
            (p - p0) / (p1 - p0)
        };
        self.engine.denormalize(self.div.interval(), t.clamp(0.0, 1.0))
    }

    /// Format a tick label.
    pub fn label(&self, v: f64) -> String {
        self.text.label(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_fit_respects_flag() {
        let mut s = Scale::new();
        s.set_auto_scale(false);
        let before = s.interval();
        s.auto_fit(Interval::new(-100.0, 100.0));
        assert_eq!(s.interval(), before);
        s.set_auto_scale(true);
        s.auto_fit(Interval::new(-100.0, 100.0));
        assert!(s.interval().contains(-100.0));
        assert!(s.interval().contains(100.0));
    }

    #[test]
    fn map_and_invert_round_trip() {
        let mut s = Scale::new();
        s.set_interval(Interval::new(0.0, 10.0));
        let p = s.map(2.5, 0.0, 400.0);
        let v = s.invert(p, 0.0, 400.0);
        assert!((v - 2.5).abs() < 1e-9);
    }

    #[test]
    fn inverted_pixel_range() {
        let mut s = Scale::new();
        s.set_interval(Interval::new(0.0, 1.0));
        // Screen y axes grow downward: p0 > p1.
        let top = s.map(1.0, 400.0, 0.0);
        let bottom = s.map(0.0, 400.0, 0.0);
        assert_eq!(top, 0.0);
        assert_eq!(bottom, 400.0);
    }
}

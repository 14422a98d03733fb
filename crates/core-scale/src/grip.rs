//! Slider grips: interactive values tethered to a scale.
//!
//! A grip stores a value inside its scale's interval; dragging updates the
//! value and reports the change to whoever registered interest. A
//! [`ColorMapScale`] owns the color map plus two interval grips bounding
//! the active color interval, and optional extra grips (contour levels)
//! that each edit exactly one level value.

use crate::Scale;
use crate::colormap::ColorMap;
use core_data::Interval;

/// One draggable value on a scale.
#[derive(Debug, Clone)]
pub struct SliderGrip {
    value: f64,
    visible: bool,
}

impl SliderGrip {
    pub fn new(value: f64) -> Self {
        Self {
            value,
            visible: true,
        }
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    /// Move the grip, clamped to the scale interval. Returns the clamped
    /// value actually stored.
    pub fn set_value(&mut self, value: f64, scale: &Scale) -> f64 {
        let iv = scale.interval();
        self.value = value.clamp(iv.min, iv.max);
        self.value
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }
}

/// A color-map axis: the scale, its map, the two interval grips and any
/// extra per-level grips.
#[derive(Debug, Clone)]
pub struct ColorMapScale {
    scale: Scale,
    map: ColorMap,
    grip_min: SliderGrip,
    grip_max: SliderGrip,
    extra: Vec<SliderGrip>,
}

impl ColorMapScale {
    pub fn new(scale: Scale, map: ColorMap) -> Self {
        let iv = scale.interval();
        Self {
            grip_min: SliderGrip::new(iv.min),
            grip_max: SliderGrip::new(iv.max),
            scale,
            map,
            extra: Vec::new(),
        }
    }

    pub fn scale(&self) -> &Scale {
        &self.scale
    }

    pub fn scale_mut(&mut self) -> &mut Scale {
        &mut self.scale
    }

    pub fn map(&self) -> &ColorMap {
        &self.map
    }

    pub fn map_mut(&mut self) -> &mut ColorMap {
        &mut self.map
    }

    /// Interval bounded by the two grips (the active color interval).
    pub fn grip_interval(&self) -> Interval {
        Interval::new(
            self.grip_min.value().min(self.grip_max.value()),
            self.grip_min.value().max(self.grip_max.value()),
        )
    }

    pub fn set_grip_interval(&mut self, interval: Interval) {
        let interval = interval.normalized();
        self.grip_min.set_value(interval.min, &self.scale);
        self.grip_max.set_value(interval.max, &self.scale);
    }

    /// Track a new scale interval, dragging grips that sat on the old
    /// bounds along with it.
    pub fn set_scale_interval(&mut self, interval: Interval) {
        let old = self.scale.interval();
        let min_on_edge = (self.grip_min.value() - old.min).abs() < f64::EPSILON;
        let max_on_edge = (self.grip_max.value() - old.max).abs() < f64::EPSILON;
        self.scale.set_interval(interval);
        if min_on_edge {
            self.grip_min.set_value(interval.min, &self.scale);
        } else {
            self.grip_min.set_value(self.grip_min.value(), &self.scale);
        }
        if max_on_edge {
            self.grip_max.set_value(interval.max, &self.scale);
        } else {
            self.grip_max.set_value(self.grip_max.value(), &self.scale);
        }
    }

    // -- extra grips (contour levels) ------------------------------------

    pub fn add_extra_grip(&mut self, value: f64) -> usize {
        let mut grip = SliderGrip::new(value);
        grip.set_value(value, &self.scale);
        self.extra.push(grip);
        self.extra.len() - 1
    }

    pub fn extra_grip_count(&self) -> usize {
        self.extra.len()
    }

    pub fn extra_grip_value(&self, index: usize) -> Option<f64> {
        self.extra.get(index).map(|g| g.value())
    }

    /// Move exactly one extra grip; returns the clamped value.
    pub fn move_extra_grip(&mut self, index: usize, value: f64) -> Option<f64> {
        let scale = self.scale.clone();
        self.extra.get_mut(index).map(|g| g.set_value(value, &scale))
    }

    pub fn remove_extra_grip(&mut self, index: usize) -> bool {
        if index < self.extra.len() {
            self.extra.remove(index);
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scale(min: f64, max: f64) -> Scale {
        let mut s = Scale::new();
        s.set_auto_scale(false);
        s.set_interval(Interval::new(min, max));
        s
    }

    #[test]
    fn grip_clamps_to_scale() {
        let s = scale(0.0, 10.0);
        let mut g = SliderGrip::new(5.0);
        assert_eq!(g.set_value(20.0, &s), 10.0);
        assert_eq!(g.set_value(-3.0, &s), 0.0);
    }

    #[test]
    fn grip_interval_is_normalized() {
        let mut cms = ColorMapScale::new(scale(0.0, 100.0), ColorMap::standard(crate::StandardMap::Gray));
        cms.set_grip_interval(Interval::new(80.0, 20.0));
        assert_eq!(cms.grip_interval(), Interval::new(20.0, 80.0));
    }

    #[test]
    fn edge_grips_follow_scale_changes() {
        let mut cms = ColorMapScale::new(scale(0.0, 10.0), ColorMap::standard(crate::StandardMap::Gray));
        cms.set_grip_interval(Interval::new(0.0, 10.0));
        cms.set_scale_interval(Interval::new(0.0, 20.0));
        assert_eq!(cms.grip_interval(), Interval::new(0.0, 20.0));
    }

    #[test]
    fn interior_grips_stay_put() {
        let mut cms = ColorMapScale::new(scale(0.0, 10.0), ColorMap::standard(crate::StandardMap::Gray));
        cms.set_grip_interval(Interval::new(2.0, 8.0));
        cms.set_scale_interval(Interval::new(0.0, 20.0));
        assert_eq!(cms.grip_interval(), Interval::new(2.0, 8.0));
    }

    #[test]
    fn extra_grip_moves_one_level() {
        let mut cms = ColorMapScale::new(scale(0.0, 10.0), ColorMap::standard(crate::StandardMap::Gray));
        let a = cms.add_extra_grip(2.0);
        let b = cms.add_extra_grip(5.0);
        cms.move_extra_grip(a, 3.0);
        assert_eq!(cms.extra_grip_value(a), Some(3.0));
        assert_eq!(cms.extra_grip_value(b), Some(5.0), "other level untouched");
    }
}

//! Tick generation and log-aware normalization.
//!
//! The linear engine steps by the classic 1-2-5 decade sequence; the log
//! engine places major ticks on powers of ten with minor ticks at the
//! in-decade multiples. Non-positive bounds on a log scale clamp to
//! [`LOG_MIN`]; a fully degenerate clamp yields a single major tick rather
//! than an error so auto-scaled views of empty data stay quiet.

use crate::scalediv::ScaleDiv;
use core_data::Interval;

/// Smallest value a log scale will represent.
pub const LOG_MIN: f64 = 1e-100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScaleEngine {
    #[default]
    Linear,
    Log10,
}

impl ScaleEngine {
    /// Value -> `[0, 1]` position inside `interval`.
    pub fn normalize(&self, interval: Interval, v: f64) -> f64 {
        match self {
            ScaleEngine::Linear => interval.normalize(v),
            ScaleEngine::Log10 => {
                let lo = interval.min.max(LOG_MIN).log10();
                let hi = interval.max.max(LOG_MIN).log10();
                if hi - lo <= 0.0 {
                    return 0.0;
                }
                ((v.max(LOG_MIN).log10() - lo) / (hi - lo)).clamp(0.0, 1.0)
            }
        }
    }

    /// `[0, 1]` position -> value.
    pub fn denormalize(&self, interval: Interval, t: f64) -> f64 {
        match self {
            ScaleEngine::Linear => interval.min + t * interval.width(),
            ScaleEngine::Log10 => {
                let lo = interval.min.max(LOG_MIN).log10();
                let hi = interval.max.max(LOG_MIN).log10();
                10f64.powf(lo + t * (hi - lo))
            }
        }
    }
}

/// Round `step` up to the nearest 1-2-5 decade step.
fn nice_step(raw: f64) -> f64 {
    if raw <= 0.0 || !raw.is_finite() {
        return 1.0;
    }
    let mag = 10f64.powf(raw.log10().floor());
    let frac = raw / mag;
    let nice = if frac <= 1.0 {
        1.0
    } else if frac <= 2.0 {
        2.0
    } else if frac <= 5.0 {
        5.0
    } else {
        10.0
    };
    nice * mag
}

/// Build a scale division for `interval` with roughly `max_major` major
/// ticks and `max_minor` minor intervals per major step.
pub fn divide_interval(
    engine: ScaleEngine,
    interval: Interval,
    max_major: usize,
    max_minor: usize,
) -> ScaleDiv {
    let interval = interval.normalized();
    if !interval.is_valid() {
        return ScaleDiv::from_interval(Interval::new(0.0, 1.0));
    }
    match engine {
        ScaleEngine::Linear => divide_linear(interval, max_major.max(2), max_minor),
        ScaleEngine::Log10 => divide_log(interval, max_major.max(2)),
    }
}

fn divide_linear(interval: Interval, max_major: usize, max_minor: usize) -> ScaleDiv {
    let width = interval.width();
    if width <= 0.0 {
        // Degenerate interval: one tick at the single value.
        return ScaleDiv::new(interval, Vec::new(), Vec::new(), vec![interval.min]);
    }
    let step = nice_step(width / max_major as f64);
    let first = (interval.min / step).ceil() * step;
    let mut major = Vec::new();
    let mut v = first;
    while v <= interval.max + step * 1e-9 {
        // Snap near-zero ticks so labels don't read "-0".
        major.push(if v.abs() < step * 1e-9 { 0.0 } else { v });
        v += step;
    }
    let mut minor = Vec::new();
    let mut medium = Vec::new();
    if max_minor > 1 {
        let minor_step = step / max_minor as f64;
        let mut v = (interval.min / minor_step).ceil() * minor_step;
        while v <= interval.max + minor_step * 1e-9 {
            let on_major = major.iter().any(|m| (m - v).abs() < minor_step * 1e-6);
            if !on_major {
                // The midpoint of a major step is a medium tick.
                let offset = (v - first).rem_euclid(step) / step;
                if (offset - 0.5).abs() < 1e-6 {
                    medium.push(v);
                } else {
                    minor.push(v);
                }
            }
            v += minor_step;
        }
    }
    ScaleDiv::new(interval, minor, medium, major).bounded()
}

fn divide_log(interval: Interval, max_major: usize) -> ScaleDiv {
    let lo = interval.min.max(LOG_MIN);
    let hi = interval.max.max(LOG_MIN);
    let interval = Interval::new(lo, hi);
    let lo_exp = lo.log10().floor() as i64;
    let hi_exp = hi.log10().ceil() as i64;
    if hi_exp <= lo_exp {
        return ScaleDiv::new(interval, Vec::new(), Vec::new(), vec![lo]);
    }
    // Subsample decades when there are too many.
    let decades = (hi_exp - lo_exp) as usize;
    let stride = decades.div_ceil(max_major).max(1);
    let mut major = Vec::new();
    let mut minor = Vec::new();
    let mut exp = lo_exp;
    while exp <= hi_exp {
        let decade = 10f64.powi(exp as i32);
        if interval.contains(decade) {
            major.push(decade);
        }
        if stride == 1 {
            for mult in 2..10 {
                let v = decade * mult as f64;
                if interval.contains(v) {
                    minor.push(v);
                }
            }
        }
        exp += stride as i64;
    }
    if major.is_empty() {
        major.push(lo);
    }
    ScaleDiv::new(interval, minor, Vec::new(), major).bounded()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scalediv::TickKind;

    #[test]
    fn nice_steps() {
        assert_eq!(nice_step(0.9), 1.0);
        assert_eq!(nice_step(1.4), 2.0);
        assert_eq!(nice_step(3.0), 5.0);
        assert_eq!(nice_step(7.0), 10.0);
        assert_eq!(nice_step(0.03), 0.05);
    }

    #[test]
    fn linear_ticks_cover_interval() {
        let div = divide_interval(ScaleEngine::Linear, Interval::new(0.0, 10.0), 8, 5);
        let major = div.ticks(TickKind::Major);
        assert!(!major.is_empty());
        assert!(major.first().unwrap() >= &0.0);
        assert!(major.last().unwrap() <= &10.0);
        for w in major.windows(2) {
            assert!(w[1] > w[0], "ticks strictly increasing");
        }
    }

    #[test]
    fn linear_degenerate_interval_single_tick() {
        let div = divide_interval(ScaleEngine::Linear, Interval::new(3.0, 3.0), 8, 5);
        assert_eq!(div.ticks(TickKind::Major), &[3.0]);
    }

    #[test]
    fn log_ticks_on_decades() {
        let div = divide_interval(ScaleEngine::Log10, Interval::new(1.0, 1000.0), 8, 5);
        let major = div.ticks(TickKind::Major);
        assert_eq!(major, &[1.0, 10.0, 100.0, 1000.0]);
        assert!(!div.ticks(TickKind::Minor).is_empty());
    }

    #[test]
    fn log_clamps_non_positive() {
        let div = divide_interval(ScaleEngine::Log10, Interval::new(-5.0, 100.0), 8, 5);
        assert!(div.interval().min >= LOG_MIN);
    }

    #[test]
    fn log_normalization_is_logarithmic() {
        let e = ScaleEngine::Log10;
        let iv = Interval::new(1.0, 100.0);
        assert!((e.normalize(iv, 10.0) - 0.5).abs() < 1e-12);
        let back = e.denormalize(iv, 0.5);
        assert!((back - 10.0).abs() < 1e-9);
    }
}

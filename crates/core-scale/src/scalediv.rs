//! A scale division: bounded interval plus three tick categories.

use core_data::Interval;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TickKind {
    Minor,
    Medium,
    Major,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScaleDiv {
    interval: Interval,
    minor: Vec<f64>,
    medium: Vec<f64>,
    major: Vec<f64>,
}

impl ScaleDiv {
    pub fn new(interval: Interval, minor: Vec<f64>, medium: Vec<f64>, major: Vec<f64>) -> Self {
        Self {
            interval: interval.normalized(),
            minor,
            medium,
            major,
        }
    }

    pub fn from_interval(interval: Interval) -> Self {
        Self::new(interval, Vec::new(), Vec::new(), Vec::new())
    }

    pub fn interval(&self) -> Interval {
        self.interval
    }

    pub fn ticks(&self, kind: TickKind) -> &[f64] {
        match kind {
            TickKind::Minor => &self.minor,
            TickKind::Medium => &self.medium,
            TickKind::Major => &self.major,
        }
    }

    /// Drop ticks falling outside the interval (guards against engines
    /// overshooting the last step).
    pub fn bounded(mut self) -> Self {
        let iv = self.interval;
        let keep = |v: &f64| iv.contains(*v) || (*v - iv.min).abs() < 1e-12 || (*v - iv.max).abs() < 1e-12;
        self.minor.retain(keep);
        self.medium.retain(keep);
        self.major.retain(keep);
        self
    }

    pub fn is_empty(&self) -> bool {
        !self.interval.is_valid()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounded_trims_overshoot() {
        let div = ScaleDiv::new(
            Interval::new(0.0, 1.0),
            vec![],
            vec![],
            vec![0.0, 0.5, 1.0, 1.5],
        );
        let div = div.bounded();
        assert_eq!(div.ticks(TickKind::Major), &[0.0, 0.5, 1.0]);
    }

    #[test]
    fn inverted_interval_is_normalized() {
        let div = ScaleDiv::from_interval(Interval::new(5.0, -5.0));
        assert_eq!(div.interval(), Interval::new(-5.0, 5.0));
    }
}

//! Histograms: interval/value bins over a common baseline.
//!
//! Three render styles: a single outline polyline, filled columns, or one
//! vertical line per bin. Each bar can carry a text whose `#value`,
//! `#min` and `#max` tokens expand at render time; the text draws inside
//! or outside the bar per the configured placement.

use crate::item::{CoordSystem, ItemCore, PlotItem, PlotItemData};
use crate::painter::Painter;
use crate::sheet::StyleValue;
use crate::style::Brush;
use core_data::value::Bin;
use core_data::{Interval, Point, Rect};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HistogramStyle {
    /// One polyline tracing the bin tops.
    Outline,
    /// Filled bars.
    #[default]
    Columns,
    /// One vertical line per bin.
    Lines,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BarTextPlacement {
    #[default]
    Inside,
    Outside,
}

pub struct PlotHistogram {
    core: ItemCore,
    data: PlotItemData<Arc<Vec<Bin>>>,
    style: HistogramStyle,
    baseline: f64,
    bar_text: Option<String>,
    bar_text_placement: BarTextPlacement,
}

impl Default for PlotHistogram {
    fn default() -> Self {
        Self::new()
    }
}

impl PlotHistogram {
    pub fn new() -> Self {
        Self {
            core: ItemCore::new("PlotHistogram"),
            data: PlotItemData::new(Arc::new(Vec::new())),
            style: HistogramStyle::default(),
            baseline: 0.0,
            bar_text: None,
            bar_text_placement: BarTextPlacement::default(),
        }
    }

    pub fn data(&self) -> &PlotItemData<Arc<Vec<Bin>>> {
        &self.data
    }

    pub fn set_bins(&self, bins: Vec<Bin>) -> u64 {
        self.data.set_raw_data(Arc::new(bins))
    }

    pub fn style(&self) -> HistogramStyle {
        self.style
    }

    pub fn set_style(&mut self, style: HistogramStyle) {
        self.style = style;
    }

    pub fn baseline(&self) -> f64 {
        self.baseline
    }

    pub fn set_baseline(&mut self, baseline: f64) {
        self.baseline = baseline;
    }

    /// Per-bar text template (`#value`, `#min`, `#max` expand per bin).
    pub fn set_bar_text(&mut self, template: Option<String>, placement: BarTextPlacement) {
        self.bar_text = template;
        self.bar_text_placement = placement;
    }

    fn expand_tokens(template: &str, bin: &Bin) -> String {
        template
            .replace("#value", &trim_num(bin.value))
            .replace("#min", &trim_num(bin.interval.min))
            .replace("#max", &trim_num(bin.interval.max))
    }
}

fn trim_num(v: f64) -> String {
    let s = format!("{v:.3}");
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}

impl PlotItem for PlotHistogram {
    fn core(&self) -> &ItemCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ItemCore {
        &mut self.core
    }

    fn bounding_rect(&self) -> Rect {
        let bins = self.data.read();
        let mut xi = Interval::default();
        let mut yi = Interval::new(self.baseline, self.baseline);
        for b in bins.iter() {
            xi.extend(b.interval.min);
            xi.extend(b.interval.max);
            yi.extend(b.value);
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
        let bins = self.data.read();
        if bins.is_empty() {
            return;
        }
        let base_y = |x: f64| cs.to_pixel(Point::new(x, self.baseline)).y;
        match self.style {
            HistogramStyle::Outline => {
                // Staircase: baseline -> top -> top -> next top... -> baseline.
                let mut pts = Vec::with_capacity(bins.len() * 2 + 2);
                let first = bins.first().unwrap();
                pts.push(Point::new(
                    cs.to_pixel(Point::new(first.interval.min, self.baseline)).x,
                    base_y(first.interval.min),
                ));
                for b in bins.iter() {
                    let top = cs.to_pixel(Point::new(b.interval.min, b.value));
                    let top2 = cs.to_pixel(Point::new(b.interval.max, b.value));
                    pts.push(top);
                    pts.push(top2);
                }
                let last = bins.last().unwrap();
                pts.push(Point::new(
                    cs.to_pixel(Point::new(last.interval.max, self.baseline)).x,
                    base_y(last.interval.max),
                ));
                painter.draw_polyline(&pts, &self.core.pen);
            }
            HistogramStyle::Columns => {
                for b in bins.iter() {
                    let tl = cs.to_pixel(Point::new(b.interval.min, b.value.max(self.baseline)));
                    let br = cs.to_pixel(Point::new(b.interval.max, b.value.min(self.baseline)));
                    let rect = Rect::new(tl.x, tl.y, br.x - tl.x, br.y - tl.y).normalized();
                    let brush = if self.core.brush.visible {
                        self.core.brush
                    } else {
                        Brush::solid(self.core.pen.color)
                    };
                    painter.fill_rect(rect, &brush);
                    if self.core.pen.visible {
                        painter.draw_rect(rect, &self.core.pen);
                    }
                    self.draw_bar_text(painter, b, rect);
                }
            }
            HistogramStyle::Lines => {
                for b in bins.iter() {
                    let x = (b.interval.min + b.interval.max) / 2.0;
                    let top = cs.to_pixel(Point::new(x, b.value));
                    let bottom = cs.to_pixel(Point::new(x, self.baseline));
                    painter.draw_polyline(&[bottom, top], &self.core.pen);
                }
            }
        }
    }

    fn set_item_property(&mut self, name: &str, value: &StyleValue, index: Option<usize>) -> bool {
        match name {
            "style" => match value.as_str() {
                Some("outline") => {
                    self.style = HistogramStyle::Outline;
                    true
                }
                Some("columns") => {
                    self.style = HistogramStyle::Columns;
                    true
                }
                Some("lines") => {
                    self.style = HistogramStyle::Lines;
                    true
                }
                _ => false,
            },
            "baseline" => {
                if let Some(n) = value.as_number() {
                    self.baseline = n;
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

impl PlotHistogram {
    fn draw_bar_text(&self, painter: &mut dyn Painter, bin: &Bin, bar: Rect) {
        let Some(ref template) = self.bar_text else {
            return;
        };
        let text = Self::expand_tokens(template, bin);
        let pos = match self.bar_text_placement {
            BarTextPlacement::Inside => {
                Point::new(bar.left + bar.width / 2.0, bar.top + bar.height / 2.0)
            }
            BarTextPlacement::Outside => Point::new(bar.left + bar.width / 2.0, bar.top - 2.0),
        };
        painter.draw_text(pos, &text, &self.core.text_style);
    }
}

//! Axis rendering: backbone, ticks and labels for one scale edge.

use crate::item::{CoordSystem, ItemCore, PlotItem};
use crate::painter::Painter;
use core_data::{Point, Rect};
use core_scale::TickKind;

/// Which edge of the plot rect the axis occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AxisEdge {
    Bottom,
    #[default]
    Left,
    Top,
    Right,
}

pub struct AxisItem {
    core: ItemCore,
    edge: AxisEdge,
    tick_len: f64,
}

impl AxisItem {
    pub fn new(edge: AxisEdge) -> Self {
        Self {
            core: ItemCore::new("AxisItem"),
            edge,
            tick_len: 4.0,
        }
    }

    pub fn edge(&self) -> AxisEdge {
        self.edge
    }

    fn is_horizontal(&self) -> bool {
        matches!(self.edge, AxisEdge::Bottom | AxisEdge::Top)
    }
}

impl PlotItem for AxisItem {
    fn core(&self) -> &ItemCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ItemCore {
        &mut self.core
    }

    fn bounding_rect(&self) -> Rect {
        Rect::default()
    }

    fn draw(&mut self, painter: &mut dyn Painter, cs: &CoordSystem) {
        if !self.core.visible {
            return;
        }
        let r = cs.rect;
        let (scale, backbone) = if self.is_horizontal() {
            let y = if self.edge == AxisEdge::Bottom {
                r.bottom()
            } else {
                r.top
            };
            (
                &cs.x,
                [Point::new(r.left, y), Point::new(r.right(), y)],
            )
        } else {
            let x = if self.edge == AxisEdge::Left {
                r.left
            } else {
                r.right()
            };
            (
                &cs.y,
                [Point::new(x, r.top), Point::new(x, r.bottom())],
            )
        };
        painter.draw_polyline(&backbone, &self.core.pen);

        let out = match self.edge {
            AxisEdge::Bottom => (0.0, 1.0),
            AxisEdge::Top => (0.0, -1.0),
            AxisEdge::Left => (-1.0, 0.0),
            AxisEdge::Right => (1.0, 0.0),
        };
        for (kind, len) in [
            (TickKind::Minor, self.tick_len * 0.5),
            (TickKind::Medium, self.tick_len * 0.75),
            (TickKind::Major, self.tick_len),
        ] {
            for &v in scale.div().ticks(kind) {
                let anchor = if self.is_horizontal() {
                    Point::new(scale.map(v, r.left, r.right()), backbone[0].y)
                } else {
                    Point::new(backbone[0].x, scale.map(v, r.bottom(), r.top))
                };
                let tip = Point::new(anchor.x + out.0 * len, anchor.y + out.1 * len);
                painter.draw_polyline(&[anchor, tip], &self.core.pen);
                if kind == TickKind::Major {
                    let label_pos =
                        Point::new(anchor.x + out.0 * (len + 2.0), anchor.y + out.1 * (len + 2.0));
                    painter.draw_text(label_pos, &scale.label(v), &self.core.text_style);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::painter::SoftwarePainter;
    use core_data::Interval;
    use core_scale::Scale;

    #[test]
    fn axis_draws_backbone_ticks_and_labels() {
        let mut x = Scale::new();
        x.set_interval(Interval::new(0.0, 10.0));
        let mut y = Scale::new();
        y.set_interval(Interval::new(0.0, 1.0));
        let cs = CoordSystem::new(x, y, Rect::new(10.0, 10.0, 100.0, 50.0));
        let mut axis = AxisItem::new(AxisEdge::Bottom);
        let mut p = SoftwarePainter::new(128, 80);
        axis.draw(&mut p, &cs);
        assert!(p.op_count() > 1, "backbone plus ticks");
        assert!(!p.texts().is_empty(), "major ticks labeled");
        // Labels reflect the value-to-text policy.
        assert!(p.texts().iter().any(|t| t.text == "5"));
    }
}

//! The flattened plot-item model.
//!
//! [`ItemCore`] is the composed shared state every item carries; concrete
//! items implement [`PlotItem`] around it. [`PlotItemData`] adds the
//! locked payload slot used by display objects (`set_raw_data` swaps the
//! payload under the lock and bumps a change counter the renderer
//! observes). [`CoordSystem`] binds an item to its axes: two scales plus
//! the pixel rectangle they span.

use crate::painter::Painter;
use crate::sheet::StyleValue;
use crate::style::{BoxStyle, Brush, Pen, TextStyle};
use core_data::{Interval, Point, Rect};
use core_scale::Scale;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

bitflags::bitflags! {
    /// Behavioral switches shared by every item.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct ItemAttributes: u32 {
        const VISIBLE_IN_LEGEND   = 1 << 0;
        const CLIP_TO_SCALE_RECT  = 1 << 1;
        const IGNORE_MOUSE_EVENTS = 1 << 2;
        const HAS_TOOLTIP         = 1 << 3;
        const AUTO_SCALE          = 1 << 4;
    }
}

impl Default for ItemAttributes {
    fn default() -> Self {
        ItemAttributes::VISIBLE_IN_LEGEND
            | ItemAttributes::CLIP_TO_SCALE_RECT
            | ItemAttributes::AUTO_SCALE
    }
}

/// Axis selector for interval queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    X,
    Y,
    /// Color/value axis of 2D items.
    Z,
}

/// Two scales spanning a pixel rectangle.
#[derive(Debug, Clone, Default)]
pub struct CoordSystem {
    pub x: Scale,
    pub y: Scale,
    /// Pixel rectangle the scales span; y grows downward.
    pub rect: Rect,
}

impl CoordSystem {
    pub fn new(x: Scale, y: Scale, rect: Rect) -> Self {
        Self { x, y, rect }
    }

    pub fn to_pixel(&self, p: Point) -> Point {
        Point::new(
            self.x.map(p.x, self.rect.left, self.rect.right()),
            // Screen y is inverted: max value at the top.
            self.y.map(p.y, self.rect.bottom(), self.rect.top),
        )
    }

    pub fn to_data(&self, p: Point) -> Point {
        Point::new(
            self.x.invert(p.x, self.rect.left, self.rect.right()),
            self.y.invert(p.y, self.rect.bottom(), self.rect.top),
        )
    }

    /// The data-space rectangle currently visible.
    pub fn visible_rect(&self) -> Rect {
        let xi = self.x.interval();
        let yi = self.y.interval();
        Rect::new(xi.min, yi.min, xi.width(), yi.width())
    }
}

/// Shared state of every plot item.
#[derive(Debug, Clone)]
pub struct ItemCore {
    class: &'static str,
    pub title: String,
    pub z: f64,
    pub visible: bool,
    pub selected: bool,
    pub hovered: bool,
    pub draw_text: bool,
    pub attributes: ItemAttributes,
    pub pen: Pen,
    pub brush: Brush,
    pub text_style: TextStyle,
    pub box_style: BoxStyle,
    pub x_unit: String,
    pub y_unit: String,
    pub z_unit: String,
}

impl ItemCore {
    pub fn new(class: &'static str) -> Self {
        Self {
            class,
            title: String::new(),
            z: 0.0,
            visible: true,
            selected: false,
            hovered: false,
            draw_text: false,
            attributes: ItemAttributes::default(),
            pen: Pen::default(),
            brush: Brush::NONE,
            text_style: TextStyle::default(),
            box_style: BoxStyle::default(),
            x_unit: String::new(),
            y_unit: String::new(),
            z_unit: String::new(),
        }
    }

    pub fn class(&self) -> &'static str {
        self.class
    }

    /// Style-sheet state set: `selected`, `hover`, `hidden`.
    pub fn has_state(&self, state: &str) -> bool {
        match state {
            "selected" => self.selected,
            "hover" => self.hovered,
            "hidden" => !self.visible,
            _ => false,
        }
    }

    /// Shared property setter backing `set_item_property`; concrete items
    /// forward unknown names here.
    pub fn set_core_property(&mut self, name: &str, value: &StyleValue) -> bool {
        match name {
            "title" => {
                if let Some(s) = value.as_str() {
                    self.title = s.to_string();
                    return true;
                }
                false
            }
            "z" => {
                if let Some(n) = value.as_number() {
                    self.z = n;
                    return true;
                }
                false
            }
            "visible" => {
                if let Some(b) = value.as_bool() {
                    self.visible = b;
                    return true;
                }
                false
            }
            "draw-text" => {
                if let Some(b) = value.as_bool() {
                    self.draw_text = b;
                    return true;
                }
                false
            }
            "pen-color" => {
                if let Some(c) = value.as_color() {
                    self.pen.color = c;
                    return true;
                }
                false
            }
            "pen-width" => {
                if let Some(n) = value.as_number() {
                    self.pen.width = n;
                    self.pen.visible = n > 0.0;
                    return true;
                }
                false
            }
            "brush-color" => {
                if let Some(c) = value.as_color() {
                    self.brush = Brush::solid(c);
                    return true;
                }
                false
            }
            "text-color" => {
                if let Some(c) = value.as_color() {
                    self.text_style.color = c;
                    return true;
                }
                false
            }
            "text-size" => {
                if let Some(n) = value.as_number() {
                    self.text_style.size = n;
                    return true;
                }
                false
            }
            _ => false,
        }
    }

    /// Getter side used by `[prop=value]` selectors.
    pub fn core_property(&self, name: &str) -> Option<StyleValue> {
        match name {
            "title" => Some(StyleValue::Str(self.title.clone())),
            "z" => Some(StyleValue::Number(self.z)),
            "visible" => Some(StyleValue::Number(self.visible as i32 as f64)),
            "pen-color" => Some(StyleValue::Color(self.pen.color)),
            "pen-width" => Some(StyleValue::Number(self.pen.width)),
            _ => None,
        }
    }
}

/// The polymorphic item contract.
pub trait PlotItem: Send {
    fn core(&self) -> &ItemCore;
    fn core_mut(&mut self) -> &mut ItemCore;

    /// Data-space bounding rectangle of the payload.
    fn bounding_rect(&self) -> Rect;

    /// Interval spanned on one axis (drives auto-scale).
    fn plot_interval(&self, axis: Axis) -> Interval {
        let r = self.bounding_rect();
        match axis {
            Axis::X => r.x_interval(),
            Axis::Y => r.y_interval(),
            Axis::Z => Interval::default(),
        }
    }

    /// Render into the painter through the coordinate system.
    fn draw(&mut self, painter: &mut dyn Painter, cs: &CoordSystem);

    fn hit_test(&self, pos: Point, _cs: &CoordSystem) -> bool {
        self.bounding_rect().contains(pos)
    }

    /// Style-sheet property setter. Returns false for unknown properties
    /// (the sheet ignores them). `index` addresses multi-part properties.
    fn set_item_property(&mut self, name: &str, value: &StyleValue, index: Option<usize>) -> bool {
        let _ = index;
        self.core_mut().set_core_property(name, value)
    }

    /// Property getter for `[prop=value]` selector matching.
    fn item_property(&self, name: &str) -> Option<StyleValue> {
        self.core().core_property(name)
    }
}

/// Typed payload slot with the producer/renderer data lock.
#[derive(Debug, Default)]
pub struct PlotItemData<T> {
    payload: Mutex<T>,
    revision: AtomicU64,
}

impl<T: Clone> PlotItemData<T> {
    pub fn new(initial: T) -> Self {
        Self {
            payload: Mutex::new(initial),
            revision: AtomicU64::new(0),
        }
    }

    /// Swap the payload under the lock and signal the change. Producers
    /// (display objects) call this from the main executor after worker-side
    /// preparation.
    pub fn set_raw_data(&self, data: T) -> u64 {
        {
            let mut guard = self.payload.lock().expect("plot payload poisoned");
            *guard = data;
        }
        self.revision.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Clone the payload out, holding the lock for the copy only.
    pub fn read(&self) -> T {
        self.payload.lock().expect("plot payload poisoned").clone()
    }

    /// Mutate in place under the lock (renderer-side caches).
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.payload.lock().expect("plot payload poisoned"))
    }

    /// Monotonic change counter; unchanged revision means unchanged data.
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_data::Rgba;

    #[test]
    fn coord_system_inverts_y() {
        let mut x = Scale::new();
        x.set_interval(Interval::new(0.0, 10.0));
        let mut y = Scale::new();
        y.set_interval(Interval::new(0.0, 1.0));
        let cs = CoordSystem::new(x, y, Rect::new(0.0, 0.0, 100.0, 50.0));
        let top = cs.to_pixel(Point::new(0.0, 1.0));
        assert_eq!(top.y, 0.0, "max value maps to the top edge");
        let bottom = cs.to_pixel(Point::new(0.0, 0.0));
        assert_eq!(bottom.y, 50.0);
        let back = cs.to_data(Point::new(50.0, 25.0));
        assert!((back.x - 5.0).abs() < 1e-9);
        assert!((back.y - 0.5).abs() < 1e-9);
    }

    #[test]
    fn core_property_round_trip() {
        let mut core = ItemCore::new("TestItem");
        assert!(core.set_core_property("pen-color", &StyleValue::Color(Rgba::opaque(1, 2, 3))));
        assert_eq!(
            core.core_property("pen-color"),
            Some(StyleValue::Color(Rgba::opaque(1, 2, 3)))
        );
        assert!(!core.set_core_property("no-such-prop", &StyleValue::Number(0.0)));
    }

    #[test]
    fn payload_revision_increments() {
        let slot = PlotItemData::new(vec![1, 2, 3]);
        assert_eq!(slot.revision(), 0);
        slot.set_raw_data(vec![4]);
        assert_eq!(slot.revision(), 1);
        assert_eq!(slot.read(), vec![4]);
    }
}

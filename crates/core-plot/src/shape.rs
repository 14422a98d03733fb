//! Shapes and scene models.
//!
//! A [`Shape`] is a polygon/polyline/path with an id, a group and an
//! attribute map. A [`SceneModel`] maps groups to shape lists; the live
//! composite item ([`SceneModelItem`]) owns one and broadcasts edits on a
//! change bus. Composition is either *Aggregate* (each shape independently
//! selectable/draggable) or *UniqueItem* (all shapes merge into one
//! composite). Interactive edits go through a [`ResizeFrame`]; a finished
//! edit maps the shape through the frame's transform and propagates back
//! into the model, which is how ROI edits reach extraction nodes.

use crate::item::{CoordSystem, ItemCore, PlotItem};
use crate::painter::Painter;
use crate::sheet::StyleValue;
use crate::style::{Brush, Pen};
use core_data::{Attributes, Interval, Point, Rect, Value};
use crossbeam_channel::{Receiver, Sender, unbounded};
use std::collections::BTreeMap;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq)]
pub enum ShapeKind {
    Polygon(Vec<Point>),
    Polyline(Vec<Point>),
    Rect(Rect),
    Point(Point),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Shape {
    pub id: u64,
    pub group: String,
    pub kind: ShapeKind,
    pub attributes: Attributes,
}

impl Shape {
    pub fn polygon(id: u64, group: impl Into<String>, points: Vec<Point>) -> Self {
        Self {
            id,
            group: group.into(),
            kind: ShapeKind::Polygon(points),
            attributes: Attributes::new(),
        }
    }

    pub fn rect(id: u64, group: impl Into<String>, rect: Rect) -> Self {
        Self {
            id,
            group: group.into(),
            kind: ShapeKind::Rect(rect),
            attributes: Attributes::new(),
        }
    }

    pub fn bounding_rect(&self) -> Rect {
        match &self.kind {
            ShapeKind::Polygon(pts) | ShapeKind::Polyline(pts) => points_bounds(pts),
            ShapeKind::Rect(r) => r.normalized(),
            ShapeKind::Point(p) => Rect::new(p.x, p.y, 0.0, 0.0),
        }
    }

    /// Polygon form of the shape outline (rects expand to corners).
    pub fn polygon_points(&self) -> Vec<Point> {
        match &self.kind {
            ShapeKind::Polygon(pts) | ShapeKind::Polyline(pts) => pts.clone(),
            ShapeKind::Rect(r) => {
                let r = r.normalized();
                vec![
                    Point::new(r.left, r.top),
                    Point::new(r.right(), r.top),
                    Point::new(r.right(), r.bottom()),
                    Point::new(r.left, r.bottom()),
                ]
            }
            ShapeKind::Point(p) => vec![*p],
        }
    }

    /// Map every coordinate from `from` space into `to` space (the resize
    /// frame edit).
    pub fn remapped(&self, from: Rect, to: Rect) -> Shape {
        let map = |p: &Point| {
            let tx = if from.width <= 0.0 {
                0.0
            } else {
                (p.x - from.left) / from.width
            };
            let ty = if from.height <= 0.0 {
                0.0
            } else {
                (p.y - from.top) / from.height
            };
            Point::new(to.left + tx * to.width, to.top + ty * to.height)
        };
        let kind = match &self.kind {
            ShapeKind::Polygon(pts) => ShapeKind::Polygon(pts.iter().map(map).collect()),
            ShapeKind::Polyline(pts) => ShapeKind::Polyline(pts.iter().map(map).collect()),
            ShapeKind::Rect(r) => {
                let tl = map(&Point::new(r.left, r.top));
                let br = map(&Point::new(r.right(), r.bottom()));
                ShapeKind::Rect(Rect::new(tl.x, tl.y, br.x - tl.x, br.y - tl.y).normalized())
            }
            ShapeKind::Point(p) => ShapeKind::Point(map(p)),
        };
        Shape {
            id: self.id,
            group: self.group.clone(),
            kind,
            attributes: self.attributes.clone(),
        }
    }
}

fn points_bounds(pts: &[Point]) -> Rect {
    let mut xi = Interval::default();
    let mut yi = Interval::default();
    for p in pts {
        xi.extend(p.x);
        yi.extend(p.y);
    }
    if !xi.is_valid() {
        return Rect::default();
    }
    Rect::new(xi.min, yi.min, xi.width(), yi.width())
}

/// Plain data: group -> shapes. Cloneable snapshot carried on edges.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SceneModel {
    groups: BTreeMap<String, Vec<Shape>>,
}

impl SceneModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, shape: Shape) {
        self.groups.entry(shape.group.clone()).or_default().push(shape);
    }

    pub fn remove(&mut self, group: &str, id: u64) -> Option<Shape> {
        let shapes = self.groups.get_mut(group)?;
        let idx = shapes.iter().position(|s| s.id == id)?;
        let removed = shapes.remove(idx);
        if shapes.is_empty() {
            self.groups.remove(group);
        }
        Some(removed)
    }

    pub fn replace(&mut self, shape: Shape) -> bool {
        if let Some(shapes) = self.groups.get_mut(&shape.group) {
            if let Some(slot) = shapes.iter_mut().find(|s| s.id == shape.id) {
                *slot = shape;
                return true;
            }
        }
        false
    }

    pub fn groups(&self) -> impl Iterator<Item = (&str, &[Shape])> {
        self.groups.iter().map(|(g, s)| (g.as_str(), s.as_slice()))
    }

    pub fn find(&self, group: &str, id: u64) -> Option<&Shape> {
        self.groups.get(group)?.iter().find(|s| s.id == id)
    }

    pub fn shape_count(&self) -> usize {
        self.groups.values().map(|v| v.len()).sum()
    }

    pub fn bounding_rect(&self) -> Rect {
        let mut out = Rect::default();
        for shapes in self.groups.values() {
            for s in shapes {
                out = out.united(&s.bounding_rect());
            }
        }
        out
    }

    pub fn byte_estimate(&self) -> usize {
        self.groups
            .values()
            .flat_map(|v| v.iter())
            .map(|s| match &s.kind {
                ShapeKind::Polygon(p) | ShapeKind::Polyline(p) => {
                    p.len() * std::mem::size_of::<Point>()
                }
                _ => std::mem::size_of::<Shape>(),
            })
            .sum()
    }
}

/// Change notifications from a live scene-model item.
#[derive(Debug, Clone, PartialEq)]
pub enum SceneEvent {
    ShapeAdded { group: String, id: u64 },
    ShapeRemoved { group: String, id: u64 },
    ShapeChanged { group: String, id: u64 },
    /// A resize-frame edit completed (the full edit, not the drag steps).
    FinishedChange { group: String, id: u64 },
}

/// Composition policy of the scene item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SceneModelMode {
    /// Each shape is individually selectable/editable.
    #[default]
    Aggregate,
    /// All shapes merge into one composite item.
    UniqueItem,
}

/// Interactive move/resize frame around one shape.
#[derive(Debug, Clone)]
pub struct ResizeFrame {
    pub group: String,
    pub id: u64,
    /// Rect at grab time.
    pub origin: Rect,
    /// Rect while dragging.
    pub current: Rect,
}

impl ResizeFrame {
    pub fn grab(shape: &Shape) -> Self {
        let r = shape.bounding_rect();
        Self {
            group: shape.group.clone(),
            id: shape.id,
            origin: r,
            current: r,
        }
    }

    pub fn drag_to(&mut self, rect: Rect) {
        self.current = rect.normalized();
    }

    pub fn translate(&mut self, dx: f64, dy: f64) {
        self.current = Rect::new(
            self.current.left + dx,
            self.current.top + dy,
            self.current.width,
            self.current.height,
        );
    }
}

/// The live composite item.
pub struct SceneModelItem {
    core: ItemCore,
    model: Mutex<SceneModel>,
    mode: SceneModelMode,
    selected: Mutex<Vec<(String, u64)>>,
    bus: Sender<SceneEvent>,
    bus_rx: Receiver<SceneEvent>,
}

impl Default for SceneModelItem {
    fn default() -> Self {
        Self::new(SceneModel::new(), SceneModelMode::Aggregate)
    }
}

impl SceneModelItem {
    pub fn new(model: SceneModel, mode: SceneModelMode) -> Self {
        let (bus, bus_rx) = unbounded();
        let mut core = ItemCore::new("SceneModelItem");
        core.brush = Brush::NONE;
        core.pen = Pen::new(core_data::Rgba::opaque(255, 0, 0));
        Self {
            core,
            model: Mutex::new(model),
            mode,
            selected: Mutex::new(Vec::new()),
            bus,
            bus_rx,
        }
    }

    pub fn mode(&self) -> SceneModelMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: SceneModelMode) {
        self.mode = mode;
        if mode == SceneModelMode::UniqueItem {
            self.selected.lock().expect("selection poisoned").clear();
        }
    }

    /// Subscribe to the change bus.
    pub fn events(&self) -> Receiver<SceneEvent> {
        self.bus_rx.clone()
    }

    pub fn model(&self) -> SceneModel {
        self.model.lock().expect("scene model poisoned").clone()
    }

    /// Replace the whole model (pipeline payload arrival).
    pub fn set_model(&self, model: SceneModel) {
        *self.model.lock().expect("scene model poisoned") = model;
    }

    pub fn add_shape(&self, shape: Shape) {
        let (group, id) = (shape.group.clone(), shape.id);
        self.model.lock().expect("scene model poisoned").add(shape);
        let _ = self.bus.send(SceneEvent::ShapeAdded { group, id });
    }

    pub fn remove_shape(&self, group: &str, id: u64) -> Option<Shape> {
        let removed = self
            .model
            .lock()
            .expect("scene model poisoned")
            .remove(group, id);
        if removed.is_some() {
            let _ = self.bus.send(SceneEvent::ShapeRemoved {
                group: group.to_string(),
                id,
            });
        }
        removed
    }

    /// Selection is only meaningful in Aggregate mode.
    pub fn select(&self, group: &str, id: u64) -> bool {
        if self.mode != SceneModelMode::Aggregate {
            return false;
        }
        let mut sel = self.selected.lock().expect("selection poisoned");
        let key = (group.to_string(), id);
        if !sel.contains(&key) {
            sel.push(key);
        }
        true
    }

    pub fn selection(&self) -> Vec<(String, u64)> {
        self.selected.lock().expect("selection poisoned").clone()
    }

    /// Complete a resize-frame edit: remap the shape from the frame's
    /// origin rect to its current rect, write it back, emit
    /// `FinishedChange`.
    pub fn finish_resize(&self, frame: &ResizeFrame) -> bool {
        let mut model = self.model.lock().expect("scene model poisoned");
        let Some(shape) = model.find(&frame.group, frame.id).cloned() else {
            return false;
        };
        let edited = shape.remapped(frame.origin, frame.current);
        let ok = model.replace(edited);
        drop(model);
        if ok {
            let _ = self.bus.send(SceneEvent::FinishedChange {
                group: frame.group.clone(),
                id: frame.id,
            });
        }
        ok
    }

    /// Shape under a data-space position (topmost last-added first).
    pub fn shape_at(&self, pos: Point) -> Option<(String, u64)> {
        let model = self.model.lock().expect("scene model poisoned");
        let mut hit: Option<(String, u64)> = None;
        for (group, shapes) in model.groups() {
            for s in shapes {
                if s.bounding_rect().contains(pos) {
                    hit = Some((group.to_string(), s.id));
                }
            }
        }
        hit
    }
}

impl PlotItem for SceneModelItem {
    fn core(&self) -> &ItemCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ItemCore {
        &mut self.core
    }

    fn bounding_rect(&self) -> Rect {
        self.model.lock().expect("scene model poisoned").bounding_rect()
    }

    fn draw(&mut self, painter: &mut dyn Painter, cs: &CoordSystem) {
        if !self.core.visible {
            return;
        }
        let model = self.model();
        let selection = self.selection();
        for (group, shapes) in model.groups() {
            for s in shapes {
                let pts: Vec<Point> = s.polygon_points().iter().map(|p| cs.to_pixel(*p)).collect();
                if pts.len() < 2 {
                    continue;
                }
                match s.kind {
                    ShapeKind::Polygon(_) | ShapeKind::Rect(_) => {
                        if self.core.brush.visible {
                            painter.fill_polygon(&pts, &self.core.brush);
                        }
                        let mut closed = pts.clone();
                        closed.push(pts[0]);
                        painter.draw_polyline(&closed, &self.core.pen);
                    }
                    ShapeKind::Polyline(_) => painter.draw_polyline(&pts, &self.core.pen),
                    ShapeKind::Point(_) => {}
                }
                let selected = self.mode == SceneModelMode::Aggregate
                    && selection.iter().any(|(g, i)| g == group && *i == s.id);
                if selected {
                    // Selection halo: the bounding rect, dashed-equivalent.
                    let r = s.bounding_rect();
                    let tl = cs.to_pixel(Point::new(r.left, r.bottom()));
                    let br = cs.to_pixel(Point::new(r.right(), r.top));
                    painter.draw_rect(
                        Rect::new(tl.x, tl.y, br.x - tl.x, br.y - tl.y).normalized(),
                        &Pen::new(core_data::Rgba::opaque(0, 120, 255)),
                    );
                }
            }
        }
    }

    fn set_item_property(&mut self, name: &str, value: &StyleValue, index: Option<usize>) -> bool {
        match name {
            "mode" => match value.as_str() {
                Some("aggregate") => {
                    self.set_mode(SceneModelMode::Aggregate);
                    true
                }
                Some("unique") => {
                    self.set_mode(SceneModelMode::UniqueItem);
                    true
                }
                _ => false,
            },
            _ => {
                let _ = index;
                self.core.set_core_property(name, value)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Archive payload registration
// ---------------------------------------------------------------------------

use core_archive::{ArchiveError, register_value_type};
use core_data::value::OpaquePayload;
use std::sync::Arc;

/// Scene models travel on edges as opaque payloads.
#[derive(Debug, Clone)]
pub struct ScenePayload(pub SceneModel);

impl OpaquePayload for ScenePayload {
    fn type_name(&self) -> &'static str {
        "scene-model"
    }

    fn byte_estimate(&self) -> usize {
        self.0.byte_estimate()
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

impl ScenePayload {
    pub fn into_value(self) -> Value {
        Value::Opaque(Arc::new(self))
    }

    pub fn from_value(value: &Value) -> Option<SceneModel> {
        match value {
            Value::Opaque(p) => p
                .as_any()
                .downcast_ref::<ScenePayload>()
                .map(|s| s.0.clone()),
            _ => None,
        }
    }
}

fn write_scene(value: &Value) -> core_archive::Result<Vec<u8>> {
    let Some(model) = ScenePayload::from_value(value) else {
        return Err(ArchiveError::TypeMismatch {
            expected: "scene-model",
            found: value.type_name().to_string(),
        });
    };
    let mut out = Vec::new();
    let push_i64 = |out: &mut Vec<u8>, v: i64| out.extend_from_slice(&v.to_le_bytes());
    let push_str = |out: &mut Vec<u8>, s: &str| {
        out.extend_from_slice(&(s.len() as i64).to_le_bytes());
        out.extend_from_slice(s.as_bytes());
    };
    let groups: Vec<_> = model.groups().collect();
    push_i64(&mut out, groups.len() as i64);
    for (group, shapes) in groups {
        push_str(&mut out, group);
        push_i64(&mut out, shapes.len() as i64);
        for s in shapes {
            push_i64(&mut out, s.id as i64);
            let (tag, pts): (u8, Vec<Point>) = match &s.kind {
                ShapeKind::Polygon(p) => (0, p.clone()),
                ShapeKind::Polyline(p) => (1, p.clone()),
                ShapeKind::Rect(r) => (2, vec![
                    Point::new(r.left, r.top),
                    Point::new(r.width, r.height),
                ]),
                ShapeKind::Point(p) => (3, vec![*p]),
            };
            out.push(tag);
            push_i64(&mut out, pts.len() as i64);
            for p in pts {
                out.extend_from_slice(&p.x.to_le_bytes());
                out.extend_from_slice(&p.y.to_le_bytes());
            }
        }
    }
    Ok(out)
}

fn read_scene(buf: &[u8]) -> core_archive::Result<Value> {
    let mut at = 0usize;
    let take_i64 = |buf: &[u8], at: &mut usize| -> core_archive::Result<i64> {
        let s = buf.get(*at..*at + 8).ok_or(ArchiveError::EndOfStream)?;
        *at += 8;
        Ok(i64::from_le_bytes(s.try_into().unwrap()))
    };
    let take_str = |buf: &[u8], at: &mut usize| -> core_archive::Result<String> {
        let len = take_i64(buf, at)? as usize;
        let s = buf.get(*at..*at + len).ok_or(ArchiveError::EndOfStream)?;
        *at += len;
        String::from_utf8(s.to_vec()).map_err(|_| ArchiveError::BadString)
    };
    let mut model = SceneModel::new();
    let group_count = take_i64(buf, &mut at)?;
    for _ in 0..group_count {
        let group = take_str(buf, &mut at)?;
        let shape_count = take_i64(buf, &mut at)?;
        for _ in 0..shape_count {
            let id = take_i64(buf, &mut at)? as u64;
            let tag = *buf.get(at).ok_or(ArchiveError::EndOfStream)?;
            at += 1;
            let n = take_i64(buf, &mut at)? as usize;
            let mut pts = Vec::with_capacity(n);
            for _ in 0..n {
                let x = f64::from_le_bytes(
                    buf.get(at..at + 8)
                        .ok_or(ArchiveError::EndOfStream)?
                        .try_into()
                        .unwrap(),
                );
                at += 8;
                let y = f64::from_le_bytes(
                    buf.get(at..at + 8)
                        .ok_or(ArchiveError::EndOfStream)?
                        .try_into()
                        .unwrap(),
                );
                at += 8;
                pts.push(Point::new(x, y));
            }
            let kind = match tag {
                0 => ShapeKind::Polygon(pts),
                1 => ShapeKind::Polyline(pts),
                2 => {
                    if pts.len() != 2 {
                        return Err(ArchiveError::Malformed("rect shape needs 2 points".into()));
                    }
                    ShapeKind::Rect(Rect::new(pts[0].x, pts[0].y, pts[1].x, pts[1].y))
                }
                3 => ShapeKind::Point(pts.first().copied().unwrap_or_default()),
                t => {
                    return Err(ArchiveError::Malformed(format!("unknown shape tag {t}")));
                }
            };
            model.add(Shape {
                id,
                group: group.clone(),
                kind,
                attributes: Attributes::new(),
            });
        }
    }
    Ok(ScenePayload(model).into_value())
}

/// Register the scene-model archive codec. Call once at startup.
pub fn register_scene_codec() {
    register_value_type("scene-model", write_scene, read_scene);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roi_square() -> Shape {
        Shape::rect(1, "ROI", Rect::new(2.0, 2.0, 4.0, 4.0))
    }

    #[test]
    fn resize_frame_edit_propagates_to_model() {
        let item = SceneModelItem::default();
        item.add_shape(roi_square());
        let events = item.events();
        let _ = events.try_iter().count(); // drain the add event

        let mut frame = ResizeFrame::grab(item.model().find("ROI", 1).unwrap());
        frame.drag_to(Rect::new(2.0, 2.0, 8.0, 8.0));
        assert!(item.finish_resize(&frame));

        let edited = item.model().find("ROI", 1).unwrap().clone();
        assert_eq!(edited.bounding_rect(), Rect::new(2.0, 2.0, 8.0, 8.0));
        let ev: Vec<SceneEvent> = events.try_iter().collect();
        assert_eq!(
            ev,
            vec![SceneEvent::FinishedChange {
                group: "ROI".into(),
                id: 1
            }]
        );
    }

    #[test]
    fn remap_scales_polygon_points() {
        let shape = Shape::polygon(
            7,
            "g",
            vec![Point::new(0.0, 0.0), Point::new(1.0, 0.0), Point::new(1.0, 1.0)],
        );
        let mapped = shape.remapped(Rect::new(0.0, 0.0, 1.0, 1.0), Rect::new(10.0, 10.0, 2.0, 2.0));
        match mapped.kind {
            ShapeKind::Polygon(pts) => {
                assert_eq!(pts[0], Point::new(10.0, 10.0));
                assert_eq!(pts[1], Point::new(12.0, 10.0));
                assert_eq!(pts[2], Point::new(12.0, 12.0));
            }
            other => panic!("expected polygon, got {other:?}"),
        }
    }

    #[test]
    fn selection_only_in_aggregate_mode() {
        let mut item = SceneModelItem::default();
        item.add_shape(roi_square());
        assert!(item.select("ROI", 1));
        assert_eq!(item.selection().len(), 1);
        item.set_mode(SceneModelMode::UniqueItem);
        assert!(item.selection().is_empty(), "mode switch clears selection");
        assert!(!item.select("ROI", 1));
    }

    #[test]
    fn scene_codec_round_trip() {
        register_scene_codec();
        let mut model = SceneModel::new();
        model.add(roi_square());
        model.add(Shape::polygon(
            2,
            "overlay",
            vec![Point::new(0.0, 0.0), Point::new(5.0, 5.0), Point::new(0.0, 5.0)],
        ));
        let value = ScenePayload(model.clone()).into_value();
        let bytes = write_scene(&value).unwrap();
        let back = read_scene(&bytes).unwrap();
        let restored = ScenePayload::from_value(&back).unwrap();
        assert_eq!(restored.shape_count(), 2);
        assert_eq!(
            restored.find("ROI", 1).unwrap().bounding_rect(),
            Rect::new(2.0, 2.0, 4.0, 4.0)
        );
        assert_eq!(restored, model);
    }

    #[test]
    fn shape_at_returns_topmost() {
        let item = SceneModelItem::default();
        item.add_shape(Shape::rect(1, "a", Rect::new(0.0, 0.0, 10.0, 10.0)));
        item.add_shape(Shape::rect(2, "b", Rect::new(2.0, 2.0, 4.0, 4.0)));
        assert_eq!(item.shape_at(Point::new(3.0, 3.0)), Some(("b".into(), 2)));
        assert_eq!(item.shape_at(Point::new(9.0, 9.0)), Some(("a".into(), 1)));
        assert_eq!(item.shape_at(Point::new(50.0, 50.0)), None);
    }
}

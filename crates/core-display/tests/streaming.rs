//! End-to-end display scenarios: streaming curve, hidden probe,
//! formatting cache, and the ROI-edit -> histogram-rebuild loop.

use core_data::value::Bin;
use core_data::{AnyData, Array2, ArrayData, Rect, Value};
use core_display::{DisplayCurve, DisplayObject, DisplayRenderer, MainExecutor};
use core_graph::ops::{ExtractHistogram, Playback, SignalGenerator};
use core_graph::{Node, NodeEvent};
use core_plot::{PlotCurve, PlotHistogram, ResizeFrame, SceneModelItem, Shape};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

fn pump_until_idle(executor: &Arc<MainExecutor>, display: &Arc<Node>) {
    for _ in 0..200 {
        display.wait(false, Some(Duration::from_millis(50)));
        executor.pump_all();
        if display.scheduled_updates() == 0 && executor.pending() == 0 {
            break;
        }
    }
}

#[test]
fn streaming_cosine_reaches_the_curve() {
    let executor = MainExecutor::new();
    let curve = Arc::new(PlotCurve::new());
    let renderer = DisplayCurve::new(curve.clone(), Duration::from_secs(10));

    let generator = Node::new(SignalGenerator::cosine());
    generator.initialize();
    let display = DisplayObject::new(renderer.clone(), executor.clone()).into_node();
    Node::connect(&generator, 0, &display, 0).unwrap();
    let display_events = display.subscribe();

    for _ in 0..50 {
        generator.reload();
        std::thread::sleep(Duration::from_millis(1));
        executor.pump_all();
    }
    pump_until_idle(&executor, &display);

    let pts = curve.points();
    assert!(!pts.is_empty(), "samples reached the curve payload");
    for p in pts.iter() {
        assert!(p.y >= -1.0 && p.y <= 1.0, "cosine amplitude bound");
        assert!(p.x >= 0.0, "timestamps converted to seconds");
    }
    // Matched producer/consumer rates: no buffer-full drops.
    let drops = display_events
        .try_iter()
        .filter(|e| {
            matches!(
                e,
                NodeEvent::Error(err) if err.code == core_graph::ErrorCode::InputBufferFull
            )
        })
        .count();
    assert_eq!(drops, 0);
    // The displayed window never exceeds the configured 10 s.
    assert!(renderer.x_range().width() <= 10.0 + 1e-9);
}

#[test]
fn hidden_display_skips_all_work() {
    let executor = MainExecutor::new();
    let curve = Arc::new(PlotCurve::new());
    let renderer = DisplayCurve::new(curve.clone(), Duration::from_secs(10));
    let display_obj = DisplayObject::new(renderer, executor.clone());
    let visibility = display_obj.visibility_handle();
    let frames = display_obj.frame_counter();
    let display = display_obj.into_node();

    visibility.store(false, Ordering::SeqCst);
    display.set_input_data(0, AnyData::new(Value::F64(1.0), 0));
    pump_until_idle(&executor, &display);
    assert!(curve.points().is_empty(), "hidden: nothing prepared");
    assert_eq!(frames.load(Ordering::SeqCst), 0);

    visibility.store(true, Ordering::SeqCst);
    display.set_input_data(0, AnyData::new(Value::F64(2.0), 0));
    pump_until_idle(&executor, &display);
    assert_eq!(curve.points().len(), 1, "visible again: frame displayed");
    assert_eq!(frames.load(Ordering::SeqCst), 1);
}

/// Minimal histogram renderer: worker-side no preparation needed, the
/// executor swaps bins into the plot item.
struct HistRenderer {
    item: Arc<PlotHistogram>,
}

impl DisplayRenderer for HistRenderer {
    fn prepare(&self, _batch: &[AnyData]) -> bool {
        false
    }

    fn display(&self, batch: &[AnyData]) {
        if let Some(bins) = batch.last().and_then(|d| d.value().as_bins()) {
            self.item.set_bins(bins.as_ref().clone());
        }
    }
}

#[test]
fn roi_edit_rebuilds_histogram() {
    let executor = MainExecutor::new();

    // Source: one 8x8 ramp frame replayed on demand.
    let ramp: Vec<f64> = (0..64).map(|i| i as f64).collect();
    let frame = AnyData::new(
        Value::Array(ArrayData::F64(Array2::from_vec(8, 8, ramp))),
        0,
    );
    let source = Node::new(Playback::new(vec![frame], true));
    source.initialize();

    let extract = Node::new(ExtractHistogram::new());
    extract.set_schedule(
        core_graph::ScheduleStrategy::ONE_INPUT | core_graph::ScheduleStrategy::ASYNCHRONOUS,
    );
    extract.initialize();

    let item = Arc::new(PlotHistogram::new());
    let display =
        DisplayObject::new(Arc::new(HistRenderer { item: item.clone() }), executor.clone())
            .into_node();

    Node::connect(&source, 0, &extract, 0).unwrap();
    Node::connect(&extract, 0, &display, 0).unwrap();

    // First pass: full-frame histogram.
    source.reload();
    assert!(extract.wait(false, Some(Duration::from_secs(10))));
    pump_until_idle(&executor, &display);
    let rev_full = item.data().revision();
    assert!(rev_full > 0, "initial payload arrived via set_raw_data");
    let full_count: f64 = item.data().read().iter().map(|b: &Bin| b.value).sum();
    assert_eq!(full_count, 64.0);

    // The user drags the ROI on the overlay; the finished edit updates
    // the extraction node and reloads it.
    let overlay = SceneModelItem::default();
    overlay.add_shape(Shape::rect(1, "ROI", Rect::new(0.0, 0.0, 8.0, 8.0)));
    let events = overlay.events();
    let _ = events.try_iter().count();

    let mut frame_edit = ResizeFrame::grab(overlay.model().find("ROI", 1).unwrap());
    frame_edit.drag_to(Rect::new(0.0, 0.0, 4.0, 4.0));
    assert!(overlay.finish_resize(&frame_edit));

    for event in events.try_iter() {
        if let core_plot::SceneEvent::FinishedChange { group, id } = event {
            let shape = overlay.model().find(&group, id).unwrap().clone();
            extract.with_op(|op| {
                let any = op.as_any_mut().expect("histogram op downcast");
                let hist = any
                    .downcast_mut::<ExtractHistogram>()
                    .expect("extract histogram type");
                hist.set_roi(Some(shape.polygon_points()));
            });
            extract.reload();
        }
    }
    assert!(extract.wait(false, Some(Duration::from_secs(10))));
    pump_until_idle(&executor, &display);

    assert!(
        item.data().revision() > rev_full,
        "edited ROI produced a fresh payload"
    );
    let roi_count: f64 = item.data().read().iter().map(|b: &Bin| b.value).sum();
    assert!(
        roi_count < full_count,
        "restricted ROI samples fewer pixels ({roi_count} < {full_count})"
    );
}

//! Pyrograph entrypoint: demo pipelines rendered in the terminal.
//!
//! Two demos exercise the full stack end to end: a streaming cosine curve
//! (generator node -> processing list -> curve display) and a synthetic
//! thermal image playback (frame source -> colormapped image display).
//! Frames render through the software painter and blit to the terminal
//! with half-block cells; `--headless` runs the same pipelines without a
//! TTY and prints throughput statistics instead.

use anyhow::Result;
use clap::Parser;
use core_buffer::{BufferKind, OverflowPolicy};
use core_data::{AnyData, Array2, ArrayData, Interval, Rect, Rgba, Value};
use core_display::{DisplayCurve, DisplayImage, DisplayObject, MainExecutor};
use core_graph::ops::{self, Playback, SignalGenerator};
use core_graph::registry::{self, load_from};
use core_graph::{Node, ProcessingList};
use core_plot::{
    AxisEdge, AxisItem, CoordSystem, Painter, PlotCurve, PlotItem, PlotRaster, SoftwarePainter,
};
use core_scale::Scale;
use crossterm::style::Color;
use crossterm::{cursor, execute, queue, style, terminal};
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use unicode_width::UnicodeWidthStr;

/// CLI arguments.
#[derive(Parser, Debug)]
#[command(name = "pyrograph", version, about = "Processing-graph demo pipelines")]
struct Args {
    /// Which demo pipeline to run.
    #[arg(long, default_value = "curve")]
    demo: Demo,
    /// Run duration in seconds.
    #[arg(long, default_value_t = 30)]
    seconds: u64,
    /// Run without a terminal surface; print statistics at the end.
    #[arg(long)]
    headless: bool,
    /// Optional configuration file path (overrides discovery of
    /// `pyrograph.toml`).
    #[arg(long = "config")]
    config: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum Demo {
    Curve,
    Image,
}

fn configure_logging() -> Result<Option<WorkerGuard>> {
    let log_dir = std::env::var("PYROGRAPH_LOG_DIR").unwrap_or_else(|_| ".".to_string());
    let file_appender = tracing_appender::rolling::never(log_dir, "pyrograph.log");
    let (writer, guard) = tracing_appender::non_blocking(file_appender);
    match tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(writer)
        .with_ansi(false)
        .try_init()
    {
        Ok(()) => Ok(Some(guard)),
        Err(_) => Ok(None), // already initialized (tests)
    }
}

fn install_panic_hook() {
    let default = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        // Leave the terminal usable before the default hook prints.
        let _ = terminal::disable_raw_mode();
        let _ = execute!(std::io::stdout(), terminal::LeaveAlternateScreen, cursor::Show);
        tracing::error!(target: "runtime", %info, "panic");
        default(info);
    }));
}

fn main() -> Result<()> {
    let args = Args::parse();
    let _log_guard = configure_logging()?;
    install_panic_hook();
    info!(target: "runtime", demo = ?args.demo, seconds = args.seconds, "startup");

    let config = load_from(args.config.clone())?;
    registry::registry().apply_config(&config);
    ops::register_builtin_infos();
    core_plot::register_scene_codec();

    let executor = MainExecutor::new();
    executor.install_as_pump();

    match args.demo {
        Demo::Curve => run_curve_demo(&args, &executor),
        Demo::Image => run_image_demo(&args, &executor),
    }
}

// ---------------------------------------------------------------------------
// Curve demo: generator -> scaling list -> display curve
// ---------------------------------------------------------------------------

fn run_curve_demo(args: &Args, executor: &Arc<MainExecutor>) -> Result<()> {
    let generator = Node::new(SignalGenerator::cosine());
    generator.set_name("generator");
    generator.initialize();
    if let Some(freq) = generator.property_named("frequency") {
        freq.set_data(AnyData::untimed(0.5f64));
    }

    // An inline chain between source and display, the way acquisition
    // pipelines post-process signals.
    let chain = ProcessingList::new();
    let scaling = core_graph::registry()
        .create_node("Scaling")
        .expect("builtin scaling registered");
    scaling
        .property_named("factor")
        .expect("factor property")
        .set_data(AnyData::untimed(0.8f64));
    chain.push_back(scaling);
    chain.node().set_name("post-chain");

    let curve = Arc::new(PlotCurve::new());
    let renderer = DisplayCurve::new(curve.clone(), Duration::from_secs(10));
    let display = DisplayObject::new(renderer.clone(), executor.clone()).into_node();
    display.set_name("curve-display");
    // Streaming input: bounded by memory, oldest samples dropped first.
    display.configure_input_buffer(0, BufferKind::Fifo, OverflowPolicy::memory(50_000));

    Node::connect(&generator, 0, chain.node(), 0)?;
    Node::connect(chain.node(), 0, &display, 0)?;

    let deadline = Instant::now() + Duration::from_secs(args.seconds);
    let period = Duration::from_millis(10);

    if args.headless {
        let mut produced = 0u64;
        while Instant::now() < deadline {
            generator.reload();
            chain.node().update(false);
            produced += 1;
            executor.pump(Duration::from_millis(2));
            std::thread::sleep(period);
        }
        display.wait(true, Some(Duration::from_secs(2)));
        executor.pump_all();
        let pts = curve.points();
        println!(
            "curve demo: produced {produced} samples, window holds {} points over {:.2}s, drops {}",
            pts.len(),
            renderer.x_range().width(),
            input_drops(&display),
        );
        return Ok(());
    }

    let mut surface = TerminalSurface::enter()?;
    let mut frame_clock = Instant::now();
    loop {
        if Instant::now() >= deadline || surface.quit_requested()? {
            break;
        }
        generator.reload();
        // The inline chain is pull-driven: one update per fresh sample.
        chain.node().update(false);
        executor.pump(Duration::from_millis(5));

        if frame_clock.elapsed() >= Duration::from_millis(40) {
            frame_clock = Instant::now();
            let (w, h) = surface.pixel_size();
            let mut painter = SoftwarePainter::new(w, h);
            let plot_rect = Rect::new(6.0, 1.0, (w - 8) as f64, (h - 4) as f64);

            let mut x_scale = Scale::new();
            let mut y_scale = Scale::new();
            x_scale.auto_fit(renderer.x_range());
            y_scale.auto_fit(Interval::new(-1.0, 1.0));
            let cs = CoordSystem::new(x_scale, y_scale, plot_rect);

            {
                // Item edits happen on the executor thread only.
                let mut axis = AxisItem::new(AxisEdge::Left);
                axis.draw(&mut painter, &cs);
                let mut bottom = AxisItem::new(AxisEdge::Bottom);
                bottom.draw(&mut painter, &cs);
            }
            // The curve is shared with the display renderer; drawing
            // clones the payload under its data lock.
            clone_curve_for_paint(&curve).draw(&mut painter, &cs);
            surface.blit(&painter, "cosine stream  [q quits]")?;
        }
        std::thread::sleep(period);
    }
    drop(surface);
    info!(target: "runtime", "curve demo finished");
    Ok(())
}

/// Snapshot the shared curve into a locally drawable item.
fn clone_curve_for_paint(curve: &Arc<PlotCurve>) -> PlotCurve {
    let copy = PlotCurve::new();
    copy.set_points(curve.points().as_ref().clone());
    copy
}

fn input_drops(node: &Arc<Node>) -> u64 {
    node.input_at(0)
        .map(|i| i.buffer().lock().expect("buffer poisoned").total_dropped())
        .unwrap_or(0)
}

// ---------------------------------------------------------------------------
// Image demo: synthetic thermal frames -> colormapped raster
// ---------------------------------------------------------------------------

/// A drifting hot spot over a cold background, the classic shape of a
/// heat-flux camera frame.
fn synthetic_frames(count: usize, size: usize) -> Vec<AnyData> {
    (0..count)
        .map(|f| {
            let phase = f as f64 / count as f64 * std::f64::consts::TAU;
            let (cx, cy) = (
                size as f64 * (0.5 + 0.25 * phase.cos()),
                size as f64 * (0.5 + 0.25 * phase.sin()),
            );
            let data: Vec<f64> = (0..size * size)
                .map(|i| {
                    let (x, y) = ((i % size) as f64, (i / size) as f64);
                    let d2 = (x - cx).powi(2) + (y - cy).powi(2);
                    300.0 + 900.0 * (-d2 / (size as f64 * 2.0)).exp()
                })
                .collect();
            AnyData::new(
                Value::Array(ArrayData::F64(Array2::from_vec(size, size, data))),
                (f as i64) * 50_000_000,
            )
            .with_attribute("Name", "synthetic heat flux")
            .with_attribute("ZUnit", "K")
        })
        .collect()
}

fn run_image_demo(args: &Args, executor: &Arc<MainExecutor>) -> Result<()> {
    let frames = synthetic_frames(64, 48);
    let source = Node::new(Playback::new(frames, true));
    source.set_name("camera");
    source.initialize();

    let raster = Arc::new(Mutex::new(PlotRaster::new(Box::new(
        core_plot::ArrayConverter::unit(ArrayData::F64(Array2::filled(48, 48, 300.0))),
    ))));
    let renderer = DisplayImage::new(raster.clone());
    let display_obj = DisplayObject::new(renderer, executor.clone());
    let frame_counter = display_obj.frame_counter();
    let display = display_obj.into_node();
    display.set_name("image-display");
    Node::connect(&source, 0, &display, 0)?;

    let deadline = Instant::now() + Duration::from_secs(args.seconds);
    let period = Duration::from_millis(50); // 20 Hz playback

    if args.headless {
        let mut produced = 0u64;
        while Instant::now() < deadline {
            source.reload();
            produced += 1;
            executor.pump(Duration::from_millis(5));
            std::thread::sleep(period);
        }
        display.wait(true, Some(Duration::from_secs(2)));
        executor.pump_all();
        println!(
            "image demo: produced {produced} frames, displayed {}, drops {}",
            frame_counter.load(Ordering::SeqCst),
            input_drops(&display),
        );
        return Ok(());
    }

    let mut surface = TerminalSurface::enter()?;
    loop {
        if Instant::now() >= deadline || surface.quit_requested()? {
            break;
        }
        source.reload();
        executor.pump(Duration::from_millis(10));

        let (w, h) = surface.pixel_size();
        let mut painter = SoftwarePainter::new(w, h);
        let mut x_scale = Scale::new();
        let mut y_scale = Scale::new();
        x_scale.auto_fit(Interval::new(0.0, 48.0));
        y_scale.auto_fit(Interval::new(0.0, 48.0));
        let cs = CoordSystem::new(
            x_scale,
            y_scale,
            Rect::new(1.0, 1.0, (w - 2) as f64, (h - 2) as f64),
        );
        raster.lock().expect("raster poisoned").draw(&mut painter, &cs);
        surface.blit(&painter, "synthetic heat flux  [q quits]")?;
        std::thread::sleep(period);
    }
    drop(surface);
    info!(target: "runtime", "image demo finished");
    Ok(())
}

// ---------------------------------------------------------------------------
// Terminal surface
// ---------------------------------------------------------------------------

/// Raw-mode alternate screen rendering half-block cells: each terminal
/// cell shows two vertically stacked pixels of the software painter.
struct TerminalSurface {
    cols: u16,
    rows: u16,
}

impl TerminalSurface {
    fn enter() -> Result<Self> {
        terminal::enable_raw_mode()?;
        execute!(
            std::io::stdout(),
            terminal::EnterAlternateScreen,
            cursor::Hide
        )?;
        let (cols, rows) = terminal::size()?;
        Ok(Self { cols, rows })
    }

    /// Painter pixel dimensions for the current terminal: one column per
    /// cell, two rows per cell (reserving the status line).
    fn pixel_size(&self) -> (usize, usize) {
        (self.cols as usize, (self.rows.saturating_sub(1) as usize) * 2)
    }

    fn quit_requested(&mut self) -> Result<bool> {
        use crossterm::event::{Event, KeyCode, poll, read};
        while poll(Duration::from_millis(0))? {
            match read()? {
                Event::Key(k) if k.code == KeyCode::Char('q') => return Ok(true),
                Event::Key(k) if k.code == KeyCode::Esc => return Ok(true),
                Event::Resize(c, r) => {
                    self.cols = c;
                    self.rows = r;
                }
                _ => {}
            }
        }
        Ok(false)
    }

    fn blit(&mut self, painter: &SoftwarePainter, status: &str) -> Result<()> {
        let mut out = std::io::stdout();
        queue!(out, cursor::MoveTo(0, 0))?;
        let (w, h) = painter.size();
        let visible_rows = (h / 2).min(self.rows.saturating_sub(1) as usize);
        for row in 0..visible_rows {
            queue!(out, cursor::MoveTo(0, row as u16))?;
            for col in 0..w.min(self.cols as usize) {
                let top = painter.pixel(col, row * 2).unwrap_or(Rgba::opaque(0, 0, 0));
                let bottom = painter
                    .pixel(col, row * 2 + 1)
                    .unwrap_or(Rgba::opaque(0, 0, 0));
                queue!(
                    out,
                    style::SetForegroundColor(Color::Rgb {
                        r: top.r,
                        g: top.g,
                        b: top.b
                    }),
                    style::SetBackgroundColor(Color::Rgb {
                        r: bottom.r,
                        g: bottom.g,
                        b: bottom.b
                    }),
                    style::Print("▀")
                )?;
            }
        }
        // Status line, centered by display width.
        let pad = (self.cols as usize).saturating_sub(status.width()) / 2;
        queue!(
            out,
            style::ResetColor,
            cursor::MoveTo(0, self.rows.saturating_sub(1)),
            terminal::Clear(terminal::ClearType::CurrentLine),
            cursor::MoveTo(pad as u16, self.rows.saturating_sub(1)),
            style::Print(status)
        )?;
        out.flush()?;
        Ok(())
    }
}

impl Drop for TerminalSurface {
    fn drop(&mut self) {
        let _ = execute!(
            std::io::stdout(),
            style::ResetColor,
            terminal::LeaveAlternateScreen,
            cursor::Show
        );
        let _ = terminal::disable_raw_mode();
    }
}

//! Asynchronous breadth-first search over any map.
//!
//! The worker walks directories level by level, matching each leaf name
//! against the pattern list and emitting `Found` events as they appear.
//! It yields briefly every batch of entries so a UI thread polling the
//! channel stays responsive, and honors a stop flag checked at the same
//! cadence.

use crate::map::FileSystemMap;
use crossbeam_channel::{Receiver, Sender, unbounded};
use regex::Regex;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

/// Entries processed between yields / stop checks.
const YIELD_BATCH: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchEvent {
    Found(PathBuf),
    /// Walk ended (exhausted or stopped). Always the final event.
    Finished { visited: usize, stopped: bool },
}

pub struct SearchHandle {
    stop: Arc<AtomicBool>,
    events: Receiver<SearchEvent>,
    worker: Option<JoinHandle<()>>,
}

impl SearchHandle {
    pub fn events(&self) -> &Receiver<SearchEvent> {
        &self.events
    }

    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Wait for the worker and drain remaining events.
    pub fn join(mut self) -> Vec<SearchEvent> {
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
        self.events.try_iter().collect()
    }
}

impl Drop for SearchHandle {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

/// Start a search under `roots`. A leaf matches when any pattern matches
/// its file name.
pub fn search(
    map: Arc<dyn FileSystemMap>,
    roots: Vec<PathBuf>,
    patterns: Vec<Regex>,
) -> SearchHandle {
    let stop = Arc::new(AtomicBool::new(false));
    let (tx, rx) = unbounded();
    let worker_stop = stop.clone();
    let worker = std::thread::Builder::new()
        .name("fsmap-search".to_string())
        .spawn(move || run_search(map, roots, patterns, worker_stop, tx))
        .expect("failed to spawn search worker");
    SearchHandle {
        stop,
        events: rx,
        worker: Some(worker),
    }
}

fn run_search(
    map: Arc<dyn FileSystemMap>,
    roots: Vec<PathBuf>,
    patterns: Vec<Regex>,
    stop: Arc<AtomicBool>,
    tx: Sender<SearchEvent>,
) {
    let mut queue: VecDeque<PathBuf> = roots.into();
    let mut visited = 0usize;
    let mut since_yield = 0usize;
    let mut stopped = false;

    'walk: while let Some(dir) = queue.pop_front() {
        let entries = match map.list(&dir, false) {
            Ok(e) => e,
            Err(e) => {
                tracing::debug!(target: "fsmap.search", dir = %dir.display(), error = %e, "skipping");
                continue;
            }
        };
        for entry in entries {
            visited += 1;
            since_yield += 1;
            if entry.is_dir {
                queue.push_back(entry.path);
            } else {
                let name = entry
                    .path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();
                if patterns.iter().any(|p| p.is_match(&name))
                    && tx.send(SearchEvent::Found(entry.path)).is_err()
                {
                    // Receiver gone: nobody cares anymore.
                    stopped = true;
                    break 'walk;
                }
            }
            if since_yield >= YIELD_BATCH {
                since_yield = 0;
                if stop.load(Ordering::SeqCst) {
                    stopped = true;
                    break 'walk;
                }
                std::thread::sleep(Duration::from_micros(50));
            }
        }
        if stop.load(Ordering::SeqCst) {
            stopped = true;
            break;
        }
    }
    let _ = tx.send(SearchEvent::Finished { visited, stopped });
}

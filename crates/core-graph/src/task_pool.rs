//! Per-node worker.
//!
//! One dedicated thread per node that ever required asynchronous
//! execution, created lazily. A shared pool is deliberately avoided: it
//! reintroduces priority-inversion deadlocks between display dispatch and
//! compute tasks that a dedicated worker cannot exhibit.
//!
//! Scheduling is counter-based: `push` bumps a pending counter and wakes
//! the worker; the worker snapshots the counter as a batch and executes the
//! node's `run_no_lock` that many times under the node's run-lock. A flood
//! of pushes arriving during a long `apply` therefore collapses into one
//! follow-up batch.

use crate::executor_hook;
use crate::node::Node;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Condvar, Mutex, Weak};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Worker poll period: the loop re-checks `stop` at least this often.
const POLL: Duration = Duration::from_millis(15);
/// Executor pump slice used while waiting from the executor thread.
const PUMP_SLICE: Duration = Duration::from_millis(20);

#[derive(Debug)]
struct Shared {
    pending: AtomicI64,
    stop: AtomicBool,
    running: AtomicBool,
    cleared: AtomicBool,
    lock: Mutex<()>,
    cv: Condvar,
    node: Weak<Node>,
}

/// The per-node worker handle. Dropping it stops and joins the thread.
#[derive(Debug)]
pub struct TaskPool {
    shared: Arc<Shared>,
    handle: Mutex<Option<JoinHandle<()>>>,
    worker_id: std::thread::ThreadId,
}

impl TaskPool {
    pub fn new(node: Weak<Node>) -> Self {
        let shared = Arc::new(Shared {
            pending: AtomicI64::new(0),
            stop: AtomicBool::new(false),
            running: AtomicBool::new(false),
            cleared: AtomicBool::new(false),
            lock: Mutex::new(()),
            cv: Condvar::new(),
            node,
        });
        let worker = shared.clone();
        let name = worker
            .node
            .upgrade()
            .map(|n| format!("task-pool/{}", n.name()))
            .unwrap_or_else(|| "task-pool".to_string());
        let handle = std::thread::Builder::new()
            .name(name)
            .spawn(move || worker_loop(worker))
            .expect("failed to spawn task pool worker");
        let worker_id = handle.thread().id();
        Self {
            shared,
            handle: Mutex::new(Some(handle)),
            worker_id,
        }
    }

    /// Schedule one run. O(1): increment + notify.
    pub fn push(&self) {
        self.shared.pending.fetch_add(1, Ordering::SeqCst);
        self.shared.cv.notify_all();
    }

    /// Pending runs plus the one currently executing, if any.
    pub fn remaining(&self) -> i64 {
        self.shared.pending.load(Ordering::SeqCst).max(0)
            + self.shared.running.load(Ordering::SeqCst) as i64
    }

    /// Discard queued work; the currently executing batch observes the
    /// `cleared` flag and exits early.
    pub fn clear(&self) {
        self.shared.pending.store(0, Ordering::SeqCst);
        self.shared.cleared.store(true, Ordering::SeqCst);
        self.shared.cv.notify_all();
    }

    /// Block until the pool is idle or `timeout` elapses (`None` = wait
    /// forever). When called from the main executor thread the wait pumps
    /// the executor in short slices so display tasks that re-enter the
    /// graph cannot deadlock the drain.
    pub fn wait_for_done(&self, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|t| Instant::now() + t);
        while self.remaining() > 0 {
            if let Some(d) = deadline {
                if Instant::now() >= d {
                    return self.remaining() == 0;
                }
            }
            if !executor_hook::pump_if_executor(PUMP_SLICE) {
                let guard = self.shared.lock.lock().expect("task pool lock poisoned");
                let (_guard, _timeout) = self
                    .shared
                    .cv
                    .wait_timeout(guard, POLL)
                    .expect("task pool lock poisoned");
            }
        }
        true
    }
}

impl Drop for TaskPool {
    fn drop(&mut self) {
        self.shared.stop.store(true, Ordering::SeqCst);
        self.shared.cv.notify_all();
        let handle = self.handle.lock().expect("task pool lock poisoned").take();
        if let Some(handle) = handle {
            // The last node reference can die on the worker itself (the
            // owner dropped mid-batch); joining would self-deadlock, so
            // the thread is detached and exits on the stop flag.
            if std::thread::current().id() != self.worker_id {
                let _ = handle.join();
            }
        }
    }
}

fn worker_loop(shared: Arc<Shared>) {
    loop {
        // Wait for work, re-checking stop at the poll period.
        {
            let mut guard = shared.lock.lock().expect("task pool lock poisoned");
            while shared.pending.load(Ordering::SeqCst) == 0 && !shared.stop.load(Ordering::SeqCst)
            {
                let (g, _) = shared
                    .cv
                    .wait_timeout(guard, POLL)
                    .expect("task pool lock poisoned");
                guard = g;
            }
        }
        if shared.stop.load(Ordering::SeqCst) {
            break;
        }

        let batch = shared.pending.load(Ordering::SeqCst);
        if batch <= 0 {
            continue;
        }
        let Some(node) = shared.node.upgrade() else {
            break;
        };

        {
            let _run_guard = node.run_lock();
            let mut left = batch;
            while left > 0
                && !shared.stop.load(Ordering::SeqCst)
                && !shared.cleared.load(Ordering::SeqCst)
            {
                shared.running.store(true, Ordering::SeqCst);
                let result = catch_unwind(AssertUnwindSafe(|| node.run_no_lock()));
                shared.running.store(false, Ordering::SeqCst);
                if let Err(panic) = result {
                    let msg = panic_message(&panic);
                    tracing::warn!(target: "graph.pool", node = %node.name(), %msg, "apply panicked");
                    node.set_error(crate::error::ProcessingError::runtime(format!(
                        "unhandled panic: {msg}"
                    )));
                }
                left -= 1;
            }
        }

        // `clear()` already zeroed the counter; otherwise retire the
        // whole snapshot (runs skipped by `stop` are abandoned anyway).
        if !shared.cleared.swap(false, Ordering::SeqCst) {
            shared.pending.fetch_sub(batch, Ordering::SeqCst);
        }
        shared.cv.notify_all();
    }
    shared.cv.notify_all();
}

fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

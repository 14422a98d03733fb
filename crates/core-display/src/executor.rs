//! The single-threaded main executor.
//!
//! A task queue pumped by the thread that created it (the UI thread in
//! production, the test main thread otherwise). Workers post closures;
//! the owner drains them in FIFO order, optionally bounded by a deadline
//! slice. The executor also installs itself as the graph core's pump so
//! blocking waits on the owner thread keep draining display tasks instead
//! of deadlocking.

use core_graph::executor_hook::{self, ExecutorPump};
use crossbeam_channel::{Receiver, Sender, unbounded};
use std::sync::Arc;
use std::thread::ThreadId;
use std::time::{Duration, Instant};

type Task = Box<dyn FnOnce() + Send + 'static>;

pub struct MainExecutor {
    tx: Sender<Task>,
    rx: Receiver<Task>,
    owner: ThreadId,
}

impl MainExecutor {
    /// Create on the thread that will pump it.
    pub fn new() -> Arc<Self> {
        let (tx, rx) = unbounded();
        Arc::new(Self {
            tx,
            rx,
            owner: std::thread::current().id(),
        })
    }

    /// True on the owning (pumping) thread.
    pub fn is_executor_thread(&self) -> bool {
        std::thread::current().id() == self.owner
    }

    /// Queue a task; FIFO per executor, never blocks.
    pub fn post(&self, task: impl FnOnce() + Send + 'static) {
        if self.tx.send(Box::new(task)).is_err() {
            tracing::warn!(target: "display.exec", "executor queue closed, task dropped");
        }
    }

    /// Drain queued tasks for at most `slice`. Must be called from the
    /// owning thread; returns the number of tasks run.
    pub fn pump(&self, slice: Duration) -> usize {
        debug_assert!(self.is_executor_thread(), "pump from the owner thread only");
        let deadline = Instant::now() + slice;
        let mut ran = 0usize;
        while let Ok(task) = self.rx.try_recv() {
            task();
            ran += 1;
            if Instant::now() >= deadline {
                break;
            }
        }
        ran
    }

    /// Drain everything currently queued.
    pub fn pump_all(&self) -> usize {
        debug_assert!(self.is_executor_thread(), "pump from the owner thread only");
        let mut ran = 0usize;
        while let Ok(task) = self.rx.try_recv() {
            task();
            ran += 1;
        }
        ran
    }

    pub fn pending(&self) -> usize {
        self.rx.len()
    }

    /// Register as the graph core's blocking-wait pump.
    pub fn install_as_pump(self: &Arc<Self>) {
        executor_hook::install(Box::new(PumpAdapter(self.clone())));
    }
}

struct PumpAdapter(Arc<MainExecutor>);

impl ExecutorPump for PumpAdapter {
    fn is_executor_thread(&self) -> bool {
        self.0.is_executor_thread()
    }

    fn pump(&self, slice: Duration) {
        self.0.pump(slice);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn tasks_run_in_post_order_on_owner() {
        let exec = MainExecutor::new();
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));
        for i in 0..5 {
            let log = log.clone();
            exec.post(move || log.lock().unwrap().push(i));
        }
        assert_eq!(exec.pending(), 5);
        assert_eq!(exec.pump_all(), 5);
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn cross_thread_posts_arrive() {
        let exec = MainExecutor::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let exec = exec.clone();
                let counter = counter.clone();
                std::thread::spawn(move || {
                    for _ in 0..10 {
                        let counter = counter.clone();
                        exec.post(move || {
                            counter.fetch_add(1, Ordering::SeqCst);
                        });
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        exec.pump_all();
        assert_eq!(counter.load(Ordering::SeqCst), 40);
        assert!(exec.is_executor_thread(), "created here, owned here");
    }
}

//! Bridge to the abstract main executor.
//!
//! The graph core never links against a UI toolkit; it only needs two
//! capabilities while blocking in a drain: "am I on the executor thread?"
//! and "pump it briefly so re-entrant display tasks can't deadlock me".
//! The display layer installs its executor here at startup.

use std::sync::OnceLock;
use std::time::Duration;

pub trait ExecutorPump: Send + Sync + 'static {
    /// True when the calling thread is the executor thread.
    fn is_executor_thread(&self) -> bool;
    /// Run queued executor tasks for at most `slice`.
    fn pump(&self, slice: Duration);
}

static PUMP: OnceLock<Box<dyn ExecutorPump>> = OnceLock::new();

/// Install the process executor. First installation wins; later calls are
/// ignored (the executor is created once at startup).
pub fn install(pump: Box<dyn ExecutorPump>) {
    let _ = PUMP.set(pump);
}

pub(crate) fn installed() -> Option<&'static dyn ExecutorPump> {
    PUMP.get().map(|b| b.as_ref())
}

/// Pump the executor for one slice when the caller *is* the executor
/// thread; otherwise do nothing. Called from blocking waits.
pub(crate) fn pump_if_executor(slice: Duration) -> bool {
    match installed() {
        Some(p) if p.is_executor_thread() => {
            p.pump(slice);
            true
        }
        _ => false,
    }
}

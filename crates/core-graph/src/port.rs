//! Declared, named endpoints owned by a node.
//!
//! Three singular kinds: an [`Input`] owns the bounded buffer, an
//! [`Output`] caches its last value (plus an optional history ring), a
//! [`Property`] holds a thread-safe cached value. Multi-variants are
//! modeled as dynamic addition/removal of singular ports on the node, with
//! `_1`, `_2`… suffixes resolving name collisions.

use crate::connection::Connection;
use core_buffer::{BufferKind, InputBuffer, OverflowPolicy};
use core_data::AnyData;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

static NEXT_OUTPUT_ID: AtomicU64 = AtomicU64::new(1);

/// Pick a name not already in `taken`, appending `_1`, `_2`… on collision.
pub fn unique_name(taken: &[String], want: &str) -> String {
    if !taken.iter().any(|n| n == want) {
        return want.to_string();
    }
    let mut i = 1usize;
    loop {
        let candidate = format!("{want}_{i}");
        if !taken.iter().any(|n| n == &candidate) {
            return candidate;
        }
        i += 1;
    }
}

#[derive(Debug)]
pub struct Input {
    name: String,
    enabled: AtomicBool,
    buffer: Mutex<InputBuffer>,
    /// Still carrying the registry default policy (retroactive default
    /// changes only touch buffers where this is set).
    default_policy: AtomicBool,
    pub(crate) connection: Mutex<Connection>,
}

impl Input {
    pub fn new(name: String, kind: BufferKind, policy: OverflowPolicy) -> Self {
        Self {
            name,
            enabled: AtomicBool::new(true),
            buffer: Mutex::new(InputBuffer::new(kind, policy)),
            default_policy: AtomicBool::new(true),
            connection: Mutex::new(Connection::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn buffer(&self) -> &Mutex<InputBuffer> {
        &self.buffer
    }

    /// `-1` never produced, `0` stale, `>0` fresh count.
    pub fn status(&self) -> i64 {
        self.buffer.lock().expect("input buffer poisoned").status()
    }

    pub fn has_new_data(&self) -> bool {
        self.buffer
            .lock()
            .expect("input buffer poisoned")
            .has_new_data()
    }

    /// Replace the buffer discipline/policy; explicit configuration opts
    /// the buffer out of retroactive registry defaults.
    pub fn configure_buffer(&self, kind: BufferKind, policy: OverflowPolicy) {
        let mut buf = self.buffer.lock().expect("input buffer poisoned");
        buf.set_kind(kind);
        buf.set_policy(policy);
        self.default_policy.store(false, Ordering::SeqCst);
    }

    pub fn has_default_policy(&self) -> bool {
        self.default_policy.load(Ordering::SeqCst)
    }

    /// Registry-driven update; keeps the default flag set.
    pub(crate) fn apply_default_policy(&self, kind: BufferKind, policy: OverflowPolicy) {
        let mut buf = self.buffer.lock().expect("input buffer poisoned");
        buf.set_kind(kind);
        buf.set_policy(policy);
    }

    pub fn connection(&self) -> &Mutex<Connection> {
        &self.connection
    }
}

#[derive(Debug)]
pub struct Output {
    name: String,
    enabled: AtomicBool,
    /// Unique per-process identifier stamped as the `source` of sent data.
    id: u64,
    cache: Mutex<AnyData>,
    history: Mutex<VecDeque<AnyData>>,
    history_capacity: AtomicUsize,
    pub(crate) connection: Mutex<Connection>,
}

impl Output {
    pub fn new(name: String) -> Self {
        Self {
            name,
            enabled: AtomicBool::new(true),
            id: NEXT_OUTPUT_ID.fetch_add(1, Ordering::Relaxed),
            cache: Mutex::new(AnyData::default()),
            history: Mutex::new(VecDeque::new()),
            history_capacity: AtomicUsize::new(0),
            connection: Mutex::new(Connection::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    /// Last value sent through this output.
    pub fn data(&self) -> AnyData {
        self.cache.lock().expect("output cache poisoned").clone()
    }

    pub(crate) fn store(&self, data: &AnyData) {
        *self.cache.lock().expect("output cache poisoned") = data.clone();
        let cap = self.history_capacity.load(Ordering::SeqCst);
        if cap > 0 {
            let mut h = self.history.lock().expect("output history poisoned");
            while h.len() >= cap {
                h.pop_front();
            }
            h.push_back(data.clone());
        }
    }

    /// Ring of recent values, oldest first (empty unless enabled).
    pub fn history(&self) -> Vec<AnyData> {
        self.history
            .lock()
            .expect("output history poisoned")
            .iter()
            .cloned()
            .collect()
    }

    pub fn set_history_capacity(&self, capacity: usize) {
        self.history_capacity.store(capacity, Ordering::SeqCst);
        if capacity == 0 {
            self.history.lock().expect("output history poisoned").clear();
        }
    }

    pub fn connection(&self) -> &Mutex<Connection> {
        &self.connection
    }
}

#[derive(Debug)]
pub struct Property {
    name: String,
    enabled: AtomicBool,
    value: Mutex<AnyData>,
    pub(crate) connection: Mutex<Connection>,
}

impl Property {
    pub fn new(name: String, initial: AnyData) -> Self {
        Self {
            name,
            enabled: AtomicBool::new(true),
            value: Mutex::new(initial),
            connection: Mutex::new(Connection::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn data(&self) -> AnyData {
        self.value.lock().expect("property poisoned").clone()
    }

    pub fn set_data(&self, data: AnyData) {
        *self.value.lock().expect("property poisoned") = data;
    }

    pub fn connection(&self) -> &Mutex<Connection> {
        &self.connection
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_data::Value;

    #[test]
    fn unique_name_appends_suffixes() {
        let taken = vec!["input".to_string(), "input_1".to_string()];
        assert_eq!(unique_name(&taken, "input"), "input_2");
        assert_eq!(unique_name(&taken, "other"), "other");
    }

    #[test]
    fn output_ids_are_distinct() {
        let a = Output::new("a".into());
        let b = Output::new("b".into());
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn output_history_ring() {
        let o = Output::new("out".into());
        o.set_history_capacity(2);
        for i in 0..4 {
            o.store(&AnyData::new(Value::I64(i), i));
        }
        let h = o.history();
        assert_eq!(h.len(), 2);
        assert_eq!(h[0].time(), 2);
        assert_eq!(h[1].time(), 3);
        o.set_history_capacity(0);
        assert!(o.history().is_empty());
    }

    #[test]
    fn explicit_buffer_config_clears_default_flag() {
        let i = Input::new("in".into(), BufferKind::Fifo, OverflowPolicy::default());
        assert!(i.has_default_policy());
        i.configure_buffer(BufferKind::LastOnly, OverflowPolicy::count(1));
        assert!(!i.has_default_policy());
    }
}

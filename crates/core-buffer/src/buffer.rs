//! The buffer proper: one `VecDeque` with a pluggable discipline.

use core_data::AnyData;
use std::collections::VecDeque;

bitflags::bitflags! {
    /// Which bounds the overflow policy enforces.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct LimitKind: u8 {
        /// Bound by entry count.
        const COUNT  = 0b01;
        /// Bound by total payload memory footprint.
        const MEMORY = 0b10;
    }
}

/// Eviction discipline of an input buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BufferKind {
    /// Push to tail, pop from head; overflow trims from head (oldest).
    #[default]
    Fifo,
    /// Push to tail, pop from tail; overflow trims from tail (newest).
    Lifo,
    /// Single slot; every push replaces the previous value.
    LastOnly,
}

/// Bounds applied on push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverflowPolicy {
    pub limits: LimitKind,
    pub max_len: usize,
    pub max_bytes: usize,
}

impl Default for OverflowPolicy {
    fn default() -> Self {
        // Generous defaults; the process-wide registry normally overrides
        // them at buffer construction.
        Self {
            limits: LimitKind::COUNT,
            max_len: 1000,
            max_bytes: 50_000_000,
        }
    }
}

impl OverflowPolicy {
    pub fn count(max_len: usize) -> Self {
        Self {
            limits: LimitKind::COUNT,
            max_len,
            max_bytes: usize::MAX,
        }
    }

    pub fn memory(max_bytes: usize) -> Self {
        Self {
            limits: LimitKind::MEMORY,
            max_len: usize::MAX,
            max_bytes,
        }
    }

    pub fn count_and_memory(max_len: usize, max_bytes: usize) -> Self {
        Self {
            limits: LimitKind::COUNT | LimitKind::MEMORY,
            max_len,
            max_bytes,
        }
    }
}

/// Result of a push: sizes before and after, and how many entries the bound
/// evicted. `previous_len != len` means the push raised occupancy and the
/// caller should schedule work; `previous_len >= len` means at least one
/// sample was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PushOutcome {
    pub previous_len: usize,
    pub len: usize,
    pub dropped: usize,
}

impl PushOutcome {
    /// The push actually raised occupancy (new work became visible).
    pub fn grew(&self) -> bool {
        self.len > self.previous_len
    }

    /// At least one sample was evicted to admit this push.
    pub fn overflowed(&self) -> bool {
        self.dropped > 0
    }
}

/// Bounded input buffer with a discipline, an overflow policy, a retained
/// last-popped value and a cumulative drop counter.
#[derive(Debug, Default)]
pub struct InputBuffer {
    kind: BufferKind,
    policy: OverflowPolicy,
    entries: VecDeque<AnyData>,
    bytes: usize,
    last_popped: Option<AnyData>,
    total_dropped: u64,
}

impl InputBuffer {
    pub fn new(kind: BufferKind, policy: OverflowPolicy) -> Self {
        Self {
            kind,
            policy,
            ..Default::default()
        }
    }

    pub fn kind(&self) -> BufferKind {
        self.kind
    }

    /// Change the discipline, keeping stored entries (LastOnly truncates to
    /// the newest).
    pub fn set_kind(&mut self, kind: BufferKind) {
        self.kind = kind;
        if kind == BufferKind::LastOnly && self.entries.len() > 1 {
            let newest = self.entries.pop_back();
            self.drop_all();
            if let Some(n) = newest {
                self.bytes = n.memory_footprint();
                self.entries.push_back(n);
            }
        }
    }

    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    pub fn set_policy(&mut self, policy: OverflowPolicy) {
        self.policy = policy;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total payload footprint of stored entries.
    pub fn byte_len(&self) -> usize {
        self.bytes
    }

    /// Cumulative number of samples evicted by the bound since construction.
    pub fn total_dropped(&self) -> u64 {
        self.total_dropped
    }

    /// Input readiness probe:
    /// * `-1` — nothing stored and nothing ever popped (never produced),
    /// * `0`  — empty but a previous value exists (stale),
    /// * `n > 0` — `n` fresh entries waiting.
    pub fn status(&self) -> i64 {
        if !self.entries.is_empty() {
            self.entries.len() as i64
        } else if self.last_popped.is_some() {
            0
        } else {
            -1
        }
    }

    pub fn has_new_data(&self) -> bool {
        !self.entries.is_empty()
    }

    /// Push one value, applying the overflow policy.
    pub fn push(&mut self, data: AnyData) -> PushOutcome {
        let previous_len = self.entries.len();
        match self.kind {
            BufferKind::LastOnly => {
                // Replacing an unconsumed sample is a real drop: the
                // consumer never saw it. Replacing a consumed slot is not.
                let dropped = previous_len;
                self.drop_all();
                self.bytes = data.memory_footprint();
                self.entries.push_back(data);
                self.total_dropped += dropped as u64;
                PushOutcome {
                    previous_len,
                    len: 1,
                    dropped,
                }
            }
            BufferKind::Fifo | BufferKind::Lifo => {
                self.bytes += data.memory_footprint();
                self.entries.push_back(data);
                let dropped = self.enforce_bounds();
                self.total_dropped += dropped as u64;
                PushOutcome {
                    previous_len,
                    len: self.entries.len(),
                    dropped,
                }
            }
        }
    }

    /// Pop the next value per the discipline, retaining it as last-popped.
    pub fn next(&mut self) -> Option<AnyData> {
        let out = match self.kind {
            BufferKind::Fifo => self.entries.pop_front(),
            BufferKind::Lifo | BufferKind::LastOnly => self.entries.pop_back(),
        };
        if let Some(ref d) = out {
            self.bytes = self.bytes.saturating_sub(d.memory_footprint());
            self.last_popped = Some(d.clone());
        }
        out
    }

    /// Next value if fresh data exists, else the retained last-popped value.
    /// This is the read path for `AcceptEmptyInput` nodes.
    pub fn next_or_probe(&mut self) -> Option<AnyData> {
        self.next().or_else(|| self.last_popped.clone())
    }

    /// Peek without consuming: the value `next()` would return, or the
    /// last-popped fallback when empty.
    pub fn probe(&self) -> Option<&AnyData> {
        let stored = match self.kind {
            BufferKind::Fifo => self.entries.front(),
            BufferKind::Lifo | BufferKind::LastOnly => self.entries.back(),
        };
        stored.or(self.last_popped.as_ref())
    }

    /// Drain everything currently stored, oldest first.
    pub fn take_all(&mut self) -> Vec<AnyData> {
        self.bytes = 0;
        let out: Vec<AnyData> = self.entries.drain(..).collect();
        if let Some(last) = out.last() {
            self.last_popped = Some(last.clone());
        }
        out
    }

    /// Discard stored entries and the retained probe value.
    pub fn clear(&mut self) {
        self.drop_all();
        self.last_popped = None;
    }

    /// Discard stored entries but keep the retained probe value. Used by
    /// synchronous delivery, where only the latest pushed value matters.
    pub fn clear_pending(&mut self) {
        self.drop_all();
    }

    fn drop_all(&mut self) {
        self.entries.clear();
        self.bytes = 0;
    }

    /// Trim per discipline until both active bounds hold. The newest entry
    /// is never evicted by the MEMORY bound alone, so one oversized sample
    /// still flows through an otherwise tight buffer.
    fn enforce_bounds(&mut self) -> usize {
        let mut dropped = 0;
        if self.policy.limits.contains(LimitKind::COUNT) {
            while self.entries.len() > self.policy.max_len {
                dropped += self.evict();
            }
        }
        if self.policy.limits.contains(LimitKind::MEMORY) {
            while self.bytes > self.policy.max_bytes && self.entries.len() > 1 {
                dropped += self.evict();
            }
        }
        dropped
    }

    fn evict(&mut self) -> usize {
        let victim = match self.kind {
            BufferKind::Fifo => self.entries.pop_front(),
            BufferKind::Lifo => self.entries.pop_back(),
            BufferKind::LastOnly => None,
        };
        match victim {
            Some(v) => {
                self.bytes = self.bytes.saturating_sub(v.memory_footprint());
                1
            }
            None => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_data::Value;

    fn sample(i: i64) -> AnyData {
        AnyData::new(Value::I64(i), i)
    }

    #[test]
    fn fifo_orders_and_trims_head() {
        let mut b = InputBuffer::new(BufferKind::Fifo, OverflowPolicy::count(3));
        for i in 0..5 {
            b.push(sample(i));
        }
        assert_eq!(b.len(), 3);
        assert_eq!(b.total_dropped(), 2);
        // Oldest two (0, 1) were trimmed.
        assert_eq!(b.next().unwrap().time(), 2);
        assert_eq!(b.next().unwrap().time(), 3);
        assert_eq!(b.next().unwrap().time(), 4);
    }

    #[test]
    fn lifo_pops_newest_and_trims_tail() {
        let mut b = InputBuffer::new(BufferKind::Lifo, OverflowPolicy::count(3));
        for i in 0..5 {
            let out = b.push(sample(i));
            if i >= 3 {
                assert!(out.overflowed(), "push {i} should evict the tail");
            }
        }
        assert_eq!(b.len(), 3);
        // Tail trimming keeps the three oldest; pop order is newest-first
        // among survivors.
        assert_eq!(b.next().unwrap().time(), 2);
        assert_eq!(b.next().unwrap().time(), 1);
        assert_eq!(b.next().unwrap().time(), 0);
    }

    #[test]
    fn last_only_replacement_semantics() {
        let mut b = InputBuffer::new(BufferKind::LastOnly, OverflowPolicy::default());
        let first = b.push(sample(1));
        assert!(first.grew());
        // Replacing an unconsumed sample: no growth (no redundant
        // scheduling) but the lost sample counts as dropped.
        let second = b.push(sample(2));
        assert!(!second.grew());
        assert!(second.overflowed());
        assert_eq!(b.next().unwrap().time(), 2);
        // Replacing a consumed slot is clean.
        let third = b.push(sample(3));
        assert!(third.grew());
        assert!(!third.overflowed());
    }

    #[test]
    fn status_transitions() {
        let mut b = InputBuffer::new(BufferKind::Fifo, OverflowPolicy::count(4));
        assert_eq!(b.status(), -1, "never produced");
        b.push(sample(1));
        assert_eq!(b.status(), 1, "fresh");
        b.next();
        assert_eq!(b.status(), 0, "stale (probe retained)");
        assert_eq!(b.probe().unwrap().time(), 1);
    }

    #[test]
    fn memory_bound_admits_newest() {
        let payload = Value::bytes(vec![0u8; 10_000]);
        let mut b = InputBuffer::new(BufferKind::Fifo, OverflowPolicy::memory(15_000));
        b.push(AnyData::new(payload.clone(), 0));
        let out = b.push(AnyData::new(payload.clone(), 1));
        assert_eq!(out.len, 1, "older entry evicted to honor memory cap");
        assert!(out.overflowed());
        // A single entry over the cap is still admitted.
        let huge = Value::bytes(vec![0u8; 100_000]);
        b.clear();
        let out = b.push(AnyData::new(huge, 2));
        assert_eq!(out.len, 1);
        assert!(!out.overflowed());
    }

    #[test]
    fn clear_forgets_probe() {
        let mut b = InputBuffer::new(BufferKind::Fifo, OverflowPolicy::count(4));
        b.push(sample(1));
        b.next();
        assert_eq!(b.status(), 0);
        b.clear();
        assert_eq!(b.status(), -1);
    }

    #[test]
    fn take_all_retains_newest_as_probe() {
        let mut b = InputBuffer::new(BufferKind::Fifo, OverflowPolicy::count(8));
        for i in 0..3 {
            b.push(sample(i));
        }
        let all = b.take_all();
        assert_eq!(all.len(), 3);
        assert_eq!(b.status(), 0);
        assert_eq!(b.probe().unwrap().time(), 2);
    }
}

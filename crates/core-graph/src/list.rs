//! Inline chains of single-in/single-out nodes.
//!
//! A [`ProcessingList`] is itself a node (one input, one output) whose
//! `apply` threads a carry value through its inner nodes in order.
//! Re-running at position `k` replays nodes `k..n-1` against the cached
//! output of node `k-1`, which is how a mid-chain parameter edit refreshes
//! the tail without recomputing the head. Disabled inner nodes pass
//! through. The carry keeps its timestamp and accumulates the union of
//! attributes (later stages win on collision); the product of inner image
//! transforms is tracked alongside so downstream overlays stay aligned.

use crate::error::ProcessingError;
use crate::event::NodeEvent;
use crate::node::{Context, IoBuilder, Node, Operation, ScheduleStrategy};
use core_data::{AnyData, Transform};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct ListState {
    nodes: Vec<Arc<Node>>,
    transform: Transform,
}

struct ListOp {
    state: Arc<Mutex<ListState>>,
}

impl Operation for ListOp {
    fn class_name(&self) -> &'static str {
        "ProcessingList"
    }

    fn declare(&self, io: &mut IoBuilder) {
        io.input("input");
        io.output("output");
    }

    fn apply(&mut self, ctx: &mut Context) -> Result<(), ProcessingError> {
        let Some(carry) = ctx.take_input(0) else {
            return Ok(());
        };
        let (result, transform) = {
            let state = self.state.lock().expect("list state poisoned");
            run_chain(&state.nodes, 0, carry)?
        };
        let changed = {
            let mut state = self.state.lock().expect("list state poisoned");
            let changed = state.transform != transform;
            state.transform = transform;
            changed
        };
        if changed {
            ctx.node().hub().emit(NodeEvent::ImageTransformChanged);
        }
        ctx.send(0, result);
        Ok(())
    }

    fn image_transform(&self) -> Option<Transform> {
        let state = self.state.lock().expect("list state poisoned");
        if state.transform.is_identity() {
            None
        } else {
            Some(state.transform)
        }
    }
}

/// Execute `nodes[start..]` against `carry`; returns the final carry and
/// the composed image transform of the executed stages.
fn run_chain(
    nodes: &[Arc<Node>],
    start: usize,
    mut carry: AnyData,
) -> Result<(AnyData, Transform), ProcessingError> {
    let mut transform = Transform::IDENTITY;
    for node in &nodes[start..] {
        if !node.is_enabled() {
            continue;
        }
        node.set_input_data(0, carry.clone());
        node.update(true);
        if let Some(error) = node.last_error() {
            return Err(error);
        }
        let Some(output) = node.output_at(0) else {
            return Err(ProcessingError::wrong_input(format!(
                "inner node {} has no output",
                node.name()
            )));
        };
        let mut next = output.data();
        // Union of attributes across the chain, later stages winning.
        let mut attrs = carry.attributes().clone();
        attrs.merge(next.attributes());
        *next.attributes_mut() = attrs;
        if !next.has_time() {
            next.set_time(carry.time());
        }
        if let Some(t) = node.image_transform() {
            transform = t.then(&transform);
        }
        carry = next;
    }
    Ok((carry, transform))
}

/// Public handle pairing the outer node with its inner chain.
pub struct ProcessingList {
    node: Arc<Node>,
    state: Arc<Mutex<ListState>>,
}

impl Default for ProcessingList {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessingList {
    pub fn new() -> Self {
        let state: Arc<Mutex<ListState>> = Arc::new(Mutex::new(ListState::default()));
        let node = Node::new(ListOp {
            state: state.clone(),
        });
        // The list is always a synchronous inline traversal: a push to the
        // outer input runs the whole chain in the caller's thread.
        node.set_schedule(ScheduleStrategy::ONE_INPUT | ScheduleStrategy::NO_THREAD);
        node.initialize();
        Self { node, state }
    }

    pub fn node(&self) -> &Arc<Node> {
        &self.node
    }

    /// Append an inner node; it is forced to the synchronous inline
    /// schedule the chain requires.
    pub fn push_back(&self, node: Arc<Node>) {
        node.set_schedule(ScheduleStrategy::ONE_INPUT | ScheduleStrategy::NO_THREAD);
        node.initialize();
        self.state
            .lock()
            .expect("list state poisoned")
            .nodes
            .push(node);
    }

    pub fn insert(&self, index: usize, node: Arc<Node>) {
        node.set_schedule(ScheduleStrategy::ONE_INPUT | ScheduleStrategy::NO_THREAD);
        node.initialize();
        let mut state = self.state.lock().expect("list state poisoned");
        let index = index.min(state.nodes.len());
        state.nodes.insert(index, node);
    }

    pub fn remove_at(&self, index: usize) -> Option<Arc<Node>> {
        let mut state = self.state.lock().expect("list state poisoned");
        if index < state.nodes.len() {
            Some(state.nodes.remove(index))
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().expect("list state poisoned").nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn at(&self, index: usize) -> Option<Arc<Node>> {
        self.state
            .lock()
            .expect("list state poisoned")
            .nodes
            .get(index)
            .cloned()
    }

    /// Composed transform of the last full or partial run.
    pub fn image_transform(&self) -> Transform {
        self.state.lock().expect("list state poisoned").transform
    }

    /// Re-run the tail of the chain starting at `start`, reusing the
    /// cached output of the preceding stage (or re-running everything when
    /// `start == 0`). Supports parameter edits mid-chain. Returns false
    /// when the needed cached carry does not exist yet.
    pub fn apply_from(&self, start: usize) -> Result<bool, ProcessingError> {
        if start == 0 {
            return Ok(self.node.reload());
        }
        let (nodes, carry) = {
            let state = self.state.lock().expect("list state poisoned");
            if start > state.nodes.len() {
                return Ok(false);
            }
            let Some(prev) = state.nodes.get(start - 1) else {
                return Ok(false);
            };
            let Some(out) = prev.output_at(0) else {
                return Ok(false);
            };
            let carry = out.data();
            if carry.value().is_empty() {
                return Ok(false);
            }
            (state.nodes.clone(), carry)
        };
        let (result, transform) = run_chain(&nodes, start, carry)?;
        {
            let mut state = self.state.lock().expect("list state poisoned");
            state.transform = transform;
        }
        self.node.set_output_data(0, result);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::Inline;
    use core_data::Value;

    fn stage(name: &'static str, f: fn(f64) -> f64) -> Arc<Node> {
        Node::new(Inline::single(name, move |data| {
            let v = data.value().as_f64().unwrap_or(0.0);
            let mut out = data.clone();
            out.set_value(Value::F64(f(v)));
            Ok(out)
        }))
    }

    #[test]
    fn chain_composes_in_order() {
        let list = ProcessingList::new();
        list.push_back(stage("add", |v| v + 1.0));
        list.push_back(stage("double", |v| v * 2.0));
        list.node()
            .set_input_data(0, AnyData::new(Value::F64(3.0), 10));
        list.node().update(true);
        let out = list.node().output_at(0).unwrap().data();
        assert_eq!(out.value().as_f64(), Some(8.0), "(3+1)*2");
        assert_eq!(out.time(), 10, "timestamp carried through");
    }

    #[test]
    fn disabled_inner_nodes_pass_through() {
        let list = ProcessingList::new();
        list.push_back(stage("add", |v| v + 1.0));
        let skip = stage("skipped", |v| v * 100.0);
        skip.set_enabled(false);
        list.push_back(skip);
        list.node()
            .set_input_data(0, AnyData::new(Value::F64(1.0), 0));
        list.node().update(true);
        let out = list.node().output_at(0).unwrap().data();
        assert_eq!(out.value().as_f64(), Some(2.0));
    }

    #[test]
    fn apply_from_replays_tail_only() {
        let list = ProcessingList::new();
        list.push_back(stage("add", |v| v + 1.0));
        list.push_back(stage("double", |v| v * 2.0));
        list.node()
            .set_input_data(0, AnyData::new(Value::F64(3.0), 0));
        list.node().update(true);
        // Replay only the second stage from the cached carry (4.0).
        assert!(list.apply_from(1).unwrap());
        let out = list.node().output_at(0).unwrap().data();
        assert_eq!(out.value().as_f64(), Some(8.0));
    }

    #[test]
    fn attribute_union_later_wins() {
        let list = ProcessingList::new();
        let a = Node::new(Inline::single("a", |data| {
            let mut out = data.clone();
            out.set_attribute("stage", "a");
            out.set_attribute("only-a", 1i64);
            Ok(out)
        }));
        let b = Node::new(Inline::single("b", |data| {
            let mut out = data.clone();
            out.set_attribute("stage", "b");
            Ok(out)
        }));
        list.push_back(a);
        list.push_back(b);
        list.node()
            .set_input_data(0, AnyData::new(Value::F64(0.0), 0));
        list.node().update(true);
        let out = list.node().output_at(0).unwrap().data();
        assert_eq!(out.attributes().get_str("stage"), Some("b"));
        assert!(out.attributes().contains("only-a"));
    }
}

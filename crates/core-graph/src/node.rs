//! The processing object.
//!
//! A [`Node`] couples a user [`Operation`] with declared ports, a schedule
//! strategy, an error ring, an event hub and (lazily) a dedicated
//! [`TaskPool`]. Nodes are shared as `Arc<Node>`; edges hold weak
//! references, so graph topology never keeps a destroyed node alive.
//!
//! Execution contract:
//! * `apply` never runs concurrently with itself (run-lock).
//! * `update()` serializes against itself (update-lock) and, in
//!   synchronous mode, pulls sources first.
//! * Outputs are set strictly before `ProcessingDone` is emitted.
//! * Toggling synchronous <-> asynchronous clears every input buffer (a
//!   stale sample would skew timing of the first run in the new mode).

use crate::connection::{Address, OpenMode, PortKind, PortRef};
use crate::error::{ErrorCode, ErrorCodeSet, ErrorRing, ProcessingError};
use crate::event::{EventHub, NodeEvent};
use crate::port::{Input, Output, Property, unique_name};
use crate::registry;
use crate::task_pool::TaskPool;
use core_buffer::{BufferKind, OverflowPolicy};
use core_data::attrs::SOURCE_PROPERTY_PREFIX;
use core_data::{AnyData, Attributes, Transform, Value};
use crossbeam_channel::Receiver;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, RwLock, Weak};
use std::time::{Duration, Instant};

bitflags::bitflags! {
    /// Per-node execution and back-pressure policy.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct ScheduleStrategy: u32 {
        /// `apply` consumes one value per input per call.
        const ONE_INPUT         = 1 << 0;
        /// Refuse to run unless every input has fresh data.
        const ALL_INPUTS        = 1 << 1;
        /// Run even if an input is stale (pass whatever is cached).
        const ACCEPT_EMPTY_INPUT = 1 << 2;
        /// Dispatch through the task pool instead of the caller thread.
        const ASYNCHRONOUS      = 1 << 3;
        /// Run in the caller's thread (exclusive with ASYNCHRONOUS).
        const NO_THREAD         = 1 << 4;
        /// Drop pushes arriving while the task pool is non-empty.
        const SKIP_IF_BUSY      = 1 << 5;
        /// Discard the whole task at run entry when no input is fresh.
        const SKIP_IF_NO_INPUT  = 1 << 6;
    }
}

impl Default for ScheduleStrategy {
    fn default() -> Self {
        ScheduleStrategy::ONE_INPUT | ScheduleStrategy::NO_THREAD
    }
}

/// Declared I/O collected from an operation at first initialization.
#[derive(Debug, Default)]
pub struct IoBuilder {
    pub(crate) inputs: Vec<String>,
    pub(crate) outputs: Vec<String>,
    pub(crate) properties: Vec<(String, AnyData)>,
}

impl IoBuilder {
    pub fn input(&mut self, name: &str) -> &mut Self {
        self.inputs.push(name.to_string());
        self
    }

    pub fn output(&mut self, name: &str) -> &mut Self {
        self.outputs.push(name.to_string());
        self
    }

    pub fn property(&mut self, name: &str, initial: impl Into<Value>) -> &mut Self {
        self.properties
            .push((name.to_string(), AnyData::untimed(initial)));
        self
    }
}

/// The unit of computation plugged into a node.
pub trait Operation: Send + 'static {
    /// Stable class name used by connection addresses, priorities and the
    /// node-type registry.
    fn class_name(&self) -> &'static str;

    /// Declare ports. Called once, lazily, from `initialize()`.
    fn declare(&self, io: &mut IoBuilder);

    /// Read inputs, compute, send outputs.
    fn apply(&mut self, ctx: &mut Context) -> Result<(), ProcessingError>;

    /// Reset internal state (seek-to-start semantics for readers).
    fn reset(&mut self) {}

    /// Hook for registry infos that register several logical node types on
    /// one concrete operation; `param` is the info's init parameter.
    fn initialize_processing(&mut self, _param: &str) {}

    /// Geometric transform this operation applies to image payloads, if
    /// any; composed across processing lists for overlay alignment.
    fn image_transform(&self) -> Option<Transform> {
        None
    }

    /// Downcast access for owners that must reach concrete state (ROI
    /// edits, parameter panels). Implementations return `Some(self)`.
    fn as_any_mut(&mut self) -> Option<&mut dyn std::any::Any> {
        None
    }
}

/// Smoothed processing-rate estimator (runs per second over 500 ms
/// windows).
#[derive(Debug)]
struct RateEstimator {
    last_window: Option<Instant>,
    count: u64,
    rate: f64,
}

impl RateEstimator {
    const WINDOW: Duration = Duration::from_millis(500);

    fn new() -> Self {
        Self {
            last_window: None,
            count: 0,
            rate: 0.0,
        }
    }

    fn tick(&mut self, now: Instant) {
        match self.last_window {
            None => self.last_window = Some(now),
            Some(start) => {
                let elapsed = now - start;
                if elapsed > Self::WINDOW {
                    self.rate = (self.count + 1) as f64 / elapsed.as_secs_f64();
                    self.count = 0;
                    self.last_window = Some(now);
                } else {
                    self.count += 1;
                }
            }
        }
    }
}

pub struct Node {
    class_name: &'static str,
    name: RwLock<String>,
    pool_name: RwLock<Option<String>>,
    op: Mutex<Box<dyn Operation>>,
    sched: AtomicU32,
    enabled: AtomicBool,
    visible: AtomicBool,
    initialized: AtomicBool,
    init_lock: Mutex<()>,
    inputs: RwLock<Vec<Arc<Input>>>,
    outputs: RwLock<Vec<Arc<Output>>>,
    properties: RwLock<Vec<Arc<Property>>>,
    update_lock: Mutex<()>,
    run_lock: Mutex<()>,
    task_pool: OnceLock<TaskPool>,
    errors: Mutex<ErrorRing>,
    log_filter: AtomicU8,
    attributes: Mutex<Attributes>,
    hub: EventHub,
    last_duration_ns: AtomicU64,
    rate: Mutex<RateEstimator>,
    source_props_enabled: AtomicBool,
    destruct: AtomicBool,
    self_weak: Weak<Node>,
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("class", &self.class_name)
            .field("name", &self.name())
            .field("schedule", &self.schedule())
            .finish_non_exhaustive()
    }
}

static NODE_COUNTER: AtomicU64 = AtomicU64::new(1);

impl Node {
    /// Wrap an operation into a shared node. The node starts enabled with
    /// the default schedule; ports materialize at the first
    /// [`Node::initialize`] (idempotent, also called by `update`).
    pub fn new(op: impl Operation) -> Arc<Node> {
        Self::with_box(Box::new(op))
    }

    pub fn with_box(op: Box<dyn Operation>) -> Arc<Node> {
        let class_name = op.class_name();
        let default_name = format!(
            "{}_{}",
            class_name,
            NODE_COUNTER.fetch_add(1, Ordering::Relaxed)
        );
        Arc::new_cyclic(|weak| Node {
            class_name,
            name: RwLock::new(default_name),
            pool_name: RwLock::new(None),
            op: Mutex::new(op),
            sched: AtomicU32::new(ScheduleStrategy::default().bits()),
            enabled: AtomicBool::new(true),
            visible: AtomicBool::new(true),
            initialized: AtomicBool::new(false),
            init_lock: Mutex::new(()),
            inputs: RwLock::new(Vec::new()),
            outputs: RwLock::new(Vec::new()),
            properties: RwLock::new(Vec::new()),
            update_lock: Mutex::new(()),
            run_lock: Mutex::new(()),
            task_pool: OnceLock::new(),
            errors: Mutex::new(ErrorRing::new(registry::registry().error_ring_capacity())),
            log_filter: AtomicU8::new(registry::registry().default_log_filter().to_bits()),
            attributes: Mutex::new(Attributes::new()),
            hub: EventHub::new(),
            last_duration_ns: AtomicU64::new(0),
            rate: Mutex::new(RateEstimator::new()),
            source_props_enabled: AtomicBool::new(true),
            destruct: AtomicBool::new(false),
            self_weak: weak.clone(),
        })
    }

    // -- identity ---------------------------------------------------------

    pub fn class_name(&self) -> &'static str {
        self.class_name
    }

    pub fn name(&self) -> String {
        self.name.read().expect("node name poisoned").clone()
    }

    pub fn set_name(&self, name: impl Into<String>) {
        *self.name.write().expect("node name poisoned") = name.into();
        self.hub.emit(NodeEvent::ProcessingChanged);
    }

    pub fn pool_name(&self) -> Option<String> {
        self.pool_name.read().expect("pool name poisoned").clone()
    }

    pub(crate) fn set_pool_name(&self, pool: Option<String>) {
        *self.pool_name.write().expect("pool name poisoned") = pool;
    }

    pub(crate) fn self_arc(&self) -> Option<Arc<Node>> {
        self.self_weak.upgrade()
    }

    // -- flags ------------------------------------------------------------

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
        self.hub.emit(NodeEvent::ProcessingChanged);
    }

    pub fn is_visible(&self) -> bool {
        self.visible.load(Ordering::SeqCst)
    }

    pub fn set_visible(&self, visible: bool) {
        self.visible.store(visible, Ordering::SeqCst);
    }

    pub fn schedule(&self) -> ScheduleStrategy {
        ScheduleStrategy::from_bits_truncate(self.sched.load(Ordering::SeqCst))
    }

    /// Replace the schedule bitfield. Crossing the synchronous <->
    /// asynchronous boundary clears every input buffer.
    pub fn set_schedule(&self, sched: ScheduleStrategy) {
        let before = self.schedule();
        self.sched.store(sched.bits(), Ordering::SeqCst);
        if before.contains(ScheduleStrategy::ASYNCHRONOUS)
            != sched.contains(ScheduleStrategy::ASYNCHRONOUS)
        {
            for input in self.inputs_snapshot() {
                input.buffer().lock().expect("input buffer poisoned").clear();
            }
        }
        self.hub.emit(NodeEvent::ProcessingChanged);
    }

    pub fn is_asynchronous(&self) -> bool {
        self.schedule().contains(ScheduleStrategy::ASYNCHRONOUS)
    }

    // -- initialization ---------------------------------------------------

    /// Materialize declared ports. Lazy and idempotent; all observable
    /// port lists are stable after the first call.
    pub fn initialize(&self) {
        if self.initialized.load(Ordering::SeqCst) {
            return;
        }
        let _guard = self.init_lock.lock().expect("init lock poisoned");
        if self.initialized.load(Ordering::SeqCst) {
            return;
        }
        let mut io = IoBuilder::default();
        self.op.lock().expect("operation poisoned").declare(&mut io);
        let (kind, policy) = registry::registry().default_buffer();
        {
            let mut inputs = self.inputs.write().expect("inputs poisoned");
            let mut taken: Vec<String> = Vec::new();
            for name in io.inputs {
                let name = unique_name(&taken, &name);
                taken.push(name.clone());
                inputs.push(Arc::new(Input::new(name, kind, policy)));
            }
        }
        {
            let mut outputs = self.outputs.write().expect("outputs poisoned");
            let mut taken: Vec<String> = Vec::new();
            for name in io.outputs {
                let name = unique_name(&taken, &name);
                taken.push(name.clone());
                outputs.push(Arc::new(Output::new(name)));
            }
        }
        {
            let mut properties = self.properties.write().expect("properties poisoned");
            let mut taken: Vec<String> = Vec::new();
            for (name, initial) in io.properties {
                let name = unique_name(&taken, &name);
                taken.push(name.clone());
                properties.push(Arc::new(Property::new(name, initial)));
            }
        }
        self.initialized.store(true, Ordering::SeqCst);
    }

    // -- port access ------------------------------------------------------

    pub fn inputs_snapshot(&self) -> Vec<Arc<Input>> {
        self.inputs.read().expect("inputs poisoned").clone()
    }

    pub fn outputs_snapshot(&self) -> Vec<Arc<Output>> {
        self.outputs.read().expect("outputs poisoned").clone()
    }

    pub fn properties_snapshot(&self) -> Vec<Arc<Property>> {
        self.properties.read().expect("properties poisoned").clone()
    }

    pub fn input_count(&self) -> usize {
        self.inputs.read().expect("inputs poisoned").len()
    }

    pub fn output_count(&self) -> usize {
        self.outputs.read().expect("outputs poisoned").len()
    }

    pub fn input_at(&self, index: usize) -> Option<Arc<Input>> {
        self.inputs.read().expect("inputs poisoned").get(index).cloned()
    }

    pub fn output_at(&self, index: usize) -> Option<Arc<Output>> {
        self.outputs
            .read()
            .expect("outputs poisoned")
            .get(index)
            .cloned()
    }

    pub fn input_index(&self, name: &str) -> Option<usize> {
        self.inputs
            .read()
            .expect("inputs poisoned")
            .iter()
            .position(|i| i.name() == name)
    }

    pub fn output_index(&self, name: &str) -> Option<usize> {
        self.outputs
            .read()
            .expect("outputs poisoned")
            .iter()
            .position(|o| o.name() == name)
    }

    pub fn property_named(&self, name: &str) -> Option<Arc<Property>> {
        self.properties
            .read()
            .expect("properties poisoned")
            .iter()
            .find(|p| p.name() == name)
            .cloned()
    }

    /// Multi-input support: append an input derived from `base`,
    /// de-colliding the name. Returns the new index.
    pub fn add_input(&self, base: &str) -> usize {
        self.initialize();
        let (kind, policy) = registry::registry().default_buffer();
        let mut inputs = self.inputs.write().expect("inputs poisoned");
        let taken: Vec<String> = inputs.iter().map(|i| i.name().to_string()).collect();
        let name = unique_name(&taken, base);
        inputs.push(Arc::new(Input::new(name.clone(), kind, policy)));
        let index = inputs.len() - 1;
        drop(inputs);
        self.hub.emit(NodeEvent::IoChanged { port: name });
        index
    }

    pub fn remove_input(&self, index: usize) -> bool {
        let mut inputs = self.inputs.write().expect("inputs poisoned");
        if index >= inputs.len() {
            return false;
        }
        let removed = inputs.remove(index);
        drop(inputs);
        self.hub.emit(NodeEvent::IoChanged {
            port: removed.name().to_string(),
        });
        true
    }

    pub fn add_output(&self, base: &str) -> usize {
        self.initialize();
        let mut outputs = self.outputs.write().expect("outputs poisoned");
        let taken: Vec<String> = outputs.iter().map(|o| o.name().to_string()).collect();
        let name = unique_name(&taken, base);
        outputs.push(Arc::new(Output::new(name.clone())));
        let index = outputs.len() - 1;
        drop(outputs);
        self.hub.emit(NodeEvent::IoChanged { port: name });
        index
    }

    pub fn add_property(&self, base: &str, initial: impl Into<Value>) -> usize {
        self.initialize();
        let mut properties = self.properties.write().expect("properties poisoned");
        let taken: Vec<String> = properties.iter().map(|p| p.name().to_string()).collect();
        let name = unique_name(&taken, base);
        properties.push(Arc::new(Property::new(
            name.clone(),
            AnyData::untimed(initial),
        )));
        let index = properties.len() - 1;
        drop(properties);
        self.hub.emit(NodeEvent::IoChanged { port: name });
        index
    }

    // -- events -----------------------------------------------------------

    pub fn subscribe(&self) -> Receiver<NodeEvent> {
        self.hub.subscribe()
    }

    pub(crate) fn hub(&self) -> &EventHub {
        &self.hub
    }

    // -- errors -----------------------------------------------------------

    pub fn set_error(&self, error: ProcessingError) {
        if self.log_filter_set().contains(error.code) {
            tracing::warn!(
                target: "graph.node",
                node = %self.name(),
                code = %error.code,
                message = %error.message,
                "processing error"
            );
        }
        self.errors
            .lock()
            .expect("error ring poisoned")
            .push(error.clone());
        self.hub.emit(NodeEvent::Error(error));
    }

    pub fn last_errors(&self) -> Vec<ProcessingError> {
        self.errors
            .lock()
            .expect("error ring poisoned")
            .iter()
            .cloned()
            .collect()
    }

    pub fn last_error(&self) -> Option<ProcessingError> {
        self.errors.lock().expect("error ring poisoned").last().cloned()
    }

    pub fn has_error(&self) -> bool {
        !self.errors.lock().expect("error ring poisoned").is_empty()
    }

    pub fn reset_error(&self) {
        self.errors.lock().expect("error ring poisoned").clear();
    }

    pub fn log_filter_set(&self) -> ErrorCodeSet {
        ErrorCodeSet::from_bits(self.log_filter.load(Ordering::SeqCst))
    }

    pub fn set_log_filter(&self, set: ErrorCodeSet) {
        self.log_filter.store(set.to_bits(), Ordering::SeqCst);
    }

    // -- attributes / source properties -----------------------------------

    pub fn attribute(&self, name: &str) -> Option<Value> {
        self.attributes
            .lock()
            .expect("attributes poisoned")
            .get(name)
            .cloned()
    }

    pub fn attributes(&self) -> Attributes {
        self.attributes.lock().expect("attributes poisoned").clone()
    }

    /// Set a user attribute. Names prefixed `__source_` additionally walk
    /// the source side of the graph so every ancestor receives the
    /// attribute (best effort: the walk is observably racy against
    /// concurrent producer writes; disable per node with
    /// [`Node::set_source_properties_enabled`]).
    pub fn set_attribute(&self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        self.attributes
            .lock()
            .expect("attributes poisoned")
            .set(name.clone(), value.clone());
        if name.starts_with(SOURCE_PROPERTY_PREFIX)
            && self.source_props_enabled.load(Ordering::SeqCst)
        {
            let mut visited: HashSet<*const Node> = HashSet::new();
            visited.insert(self as *const Node);
            for src in self.source_nodes() {
                src.propagate_source_property(&name, &value, &mut visited);
            }
        }
    }

    fn propagate_source_property(
        self: &Arc<Node>,
        name: &str,
        value: &Value,
        visited: &mut HashSet<*const Node>,
    ) {
        if !visited.insert(Arc::as_ptr(self)) {
            return;
        }
        if self.source_props_enabled.load(Ordering::SeqCst) {
            self.attributes
                .lock()
                .expect("attributes poisoned")
                .set(name.to_string(), value.clone());
        }
        for src in self.source_nodes() {
            src.propagate_source_property(name, value, visited);
        }
    }

    pub fn set_source_properties_enabled(&self, enabled: bool) {
        self.source_props_enabled.store(enabled, Ordering::SeqCst);
    }

    // -- topology ---------------------------------------------------------

    /// Direct upstream nodes, one per connected input.
    pub fn source_nodes(&self) -> Vec<Arc<Node>> {
        let mut out: Vec<Arc<Node>> = Vec::new();
        for input in self.inputs_snapshot() {
            let conn = input.connection().lock().expect("connection poisoned");
            for peer in conn.peers() {
                if let Some(node) = peer.upgrade() {
                    if !out.iter().any(|n| Arc::ptr_eq(n, &node)) {
                        out.push(node);
                    }
                }
            }
        }
        out
    }

    /// Wire `src_output` of `src` to `dst_input` of `dst`, maintaining the
    /// peer symmetry on both sides and canonicalizing addresses.
    pub fn connect(
        src: &Arc<Node>,
        src_output: usize,
        dst: &Arc<Node>,
        dst_input: usize,
    ) -> Result<(), ProcessingError> {
        src.initialize();
        dst.initialize();
        let output = src.output_at(src_output).ok_or_else(|| {
            ProcessingError::new(
                format!("{} has no output #{src_output}", src.name()),
                ErrorCode::ConnectionNotOpen,
            )
        })?;
        let input = dst.input_at(dst_input).ok_or_else(|| {
            ProcessingError::new(
                format!("{} has no input #{dst_input}", dst.name()),
                ErrorCode::ConnectionNotOpen,
            )
        })?;

        let src_address = Address {
            class_name: None,
            pool: src.pool_name(),
            node: src.name(),
            port: output.name().to_string(),
        };
        let dst_address = Address {
            class_name: None,
            pool: dst.pool_name(),
            node: dst.name(),
            port: input.name().to_string(),
        };

        {
            let mut conn = output.connection().lock().expect("connection poisoned");
            conn.add_peer(PortRef::new(dst, PortKind::Input, dst_input));
            conn.set_mode(OpenMode::Output);
            conn.set_address(Some(dst_address.canonical()));
        }
        {
            let mut conn = input.connection().lock().expect("connection poisoned");
            // An input has a single source; replace it.
            conn.clear_peers();
            conn.add_peer(PortRef::new(src, PortKind::Output, src_output));
            conn.set_mode(OpenMode::Input);
            conn.set_address(Some(src_address.canonical()));
        }

        src.hub.emit(NodeEvent::ConnectionOpened {
            port: output.name().to_string(),
            mode: OpenMode::Output,
            address: dst_address.canonical(),
        });
        dst.hub.emit(NodeEvent::ConnectionOpened {
            port: input.name().to_string(),
            mode: OpenMode::Input,
            address: src_address.canonical(),
        });
        Ok(())
    }

    /// Remove the edge feeding `dst_input`, repairing the source side.
    pub fn disconnect_input(dst: &Arc<Node>, dst_input: usize) {
        let Some(input) = dst.input_at(dst_input) else {
            return;
        };
        let peers: Vec<PortRef> = {
            let mut conn = input.connection().lock().expect("connection poisoned");
            let peers = conn.peers().to_vec();
            conn.clear_peers();
            conn.set_mode(OpenMode::Unknown);
            conn.set_address(None);
            peers
        };
        for peer in peers {
            if let Some(src) = peer.upgrade() {
                if let Some(output) = src.output_at(peer.index) {
                    let me = PortRef::new(dst, PortKind::Input, dst_input);
                    output
                        .connection()
                        .lock()
                        .expect("connection poisoned")
                        .remove_peer(&me);
                    src.hub.emit(NodeEvent::ConnectionClosed {
                        port: output.name().to_string(),
                    });
                }
            }
        }
        dst.hub.emit(NodeEvent::ConnectionClosed {
            port: input.name().to_string(),
        });
    }

    // -- push protocol ----------------------------------------------------

    /// Producer-side entry: deliver one value to input `index`.
    ///
    /// Never blocks. In synchronous mode the value replaces the single
    /// slot; in asynchronous mode it lands in the bounded buffer and, when
    /// occupancy actually grew, schedules an update. Overflow raises a
    /// (filtered) `InputBufferFull` error — back-pressure drops here, at
    /// the consumer, and the producer is unaffected.
    pub fn set_input_data(self: &Arc<Self>, index: usize, data: AnyData) {
        if !self.is_enabled() || self.destruct.load(Ordering::SeqCst) {
            return;
        }
        let Some(input) = self.input_at(index) else {
            return;
        };
        if !input.is_enabled() {
            return;
        }
        self.hub.emit(NodeEvent::DataReceived {
            port: input.name().to_string(),
            data: data.clone(),
        });
        if !self.is_asynchronous() {
            // Synchronous consumption is pull-driven; the buffer behaves
            // as a single slot holding the latest value.
            let mut buf = input.buffer().lock().expect("input buffer poisoned");
            buf.clear_pending();
            buf.push(data);
        } else {
            let outcome = {
                let mut buf = input.buffer().lock().expect("input buffer poisoned");
                buf.push(data)
            };
            if outcome.grew() {
                self.update(false);
            } else {
                let (len, bytes) = {
                    let buf = input.buffer().lock().expect("input buffer poisoned");
                    (buf.len(), buf.byte_len())
                };
                self.set_error(ProcessingError::new(
                    format!(
                        "drop input data, buffer size = {len}, buffer memory footprint = {bytes}"
                    ),
                    ErrorCode::InputBufferFull,
                ));
            }
        }
    }

    /// Consumer-side output publication: cache on the port, then push to
    /// every connected peer, then emit `DataSent`.
    pub fn set_output_data(self: &Arc<Self>, index: usize, mut data: AnyData) {
        let Some(output) = self.output_at(index) else {
            return;
        };
        if !output.is_enabled() {
            return;
        }
        if data.source() == 0 {
            data.set_source(output.id());
        }
        output.store(&data);
        let peers: Vec<PortRef> = output
            .connection()
            .lock()
            .expect("connection poisoned")
            .peers()
            .to_vec();
        for peer in peers {
            if let Some(node) = peer.upgrade() {
                match peer.kind {
                    PortKind::Input => node.set_input_data(peer.index, data.clone()),
                    PortKind::Property => {
                        if let Some(prop) = node
                            .properties_snapshot()
                            .get(peer.index)
                            .cloned()
                        {
                            prop.set_data(data.clone());
                        }
                    }
                    PortKind::Output => {}
                }
            }
        }
        self.hub.emit(NodeEvent::DataSent {
            port: output.name().to_string(),
            data,
        });
    }

    // -- scheduling -------------------------------------------------------

    fn task_pool(self: &Arc<Self>) -> &TaskPool {
        self.task_pool
            .get_or_init(|| TaskPool::new(Arc::downgrade(self)))
    }

    pub fn scheduled_updates(&self) -> i64 {
        self.task_pool.get().map(|p| p.remaining()).unwrap_or(0)
    }

    /// Bottom half of the push protocol. Returns true when a run was
    /// dispatched (or executed inline).
    pub fn update(self: &Arc<Self>, force: bool) -> bool {
        if !self.is_enabled() {
            return false;
        }
        self.initialize();
        let _guard = self.update_lock.lock().expect("update lock poisoned");
        let sched = self.schedule();

        // Synchronous nodes pull their sources first.
        if !sched.contains(ScheduleStrategy::ASYNCHRONOUS) {
            for src in self.source_nodes() {
                src.update(false);
            }
        }

        if !force {
            let no_empty = !sched.contains(ScheduleStrategy::ACCEPT_EMPTY_INPUT);
            let all_new = sched.contains(ScheduleStrategy::ALL_INPUTS);
            let mut fresh = 0usize;
            let inputs = self.inputs_snapshot();
            for input in &inputs {
                if !input.is_enabled() {
                    continue;
                }
                let status = input.status();
                if status == -1 && no_empty {
                    return false;
                }
                if status <= 0 && all_new {
                    return false;
                }
                if status > 0 {
                    fresh += 1;
                }
            }
            // No fresh input anywhere: nothing to do. Zero-input sources
            // fall out here too; they only run when forced (reload or a
            // driving timer).
            if fresh == 0 {
                return false;
            }
        }

        if sched.contains(ScheduleStrategy::SKIP_IF_BUSY) && self.scheduled_updates() > 0 {
            return false;
        }

        if !sched.contains(ScheduleStrategy::ASYNCHRONOUS) {
            if sched.contains(ScheduleStrategy::NO_THREAD) {
                self.run();
            } else {
                // Run through the pool so the operation always executes on
                // the same thread, then wait for the result.
                self.task_pool().push();
                drop(_guard);
                return self.wait(false, None);
            }
        } else {
            self.task_pool().push();
        }
        true
    }

    /// Force a rerun unless an update is in flight or more than one task
    /// is already queued (the queued run will pick up the new state).
    pub fn reload(self: &Arc<Self>) -> bool {
        if self.scheduled_updates() >= 2 {
            return false;
        }
        match self.update_lock.try_lock() {
            Ok(guard) => {
                drop(guard);
                self.update(true)
            }
            Err(_) => false,
        }
    }

    pub(crate) fn run_lock(&self) -> MutexGuard<'_, ()> {
        self.run_lock.lock().expect("run lock poisoned")
    }

    /// Serialized dispatcher (caller-thread execution path).
    pub fn run(self: &Arc<Self>) {
        let _guard = self.run_lock();
        self.run_no_lock();
    }

    /// Dispatcher body; the caller must hold the run-lock.
    pub fn run_no_lock(self: &Arc<Self>) {
        let sched = self.schedule();
        if sched.contains(ScheduleStrategy::SKIP_IF_NO_INPUT) {
            let has_input = self
                .inputs_snapshot()
                .iter()
                .any(|i| i.has_new_data());
            if !has_input {
                // Nothing to do; also discard any queued duplicates.
                if let Some(pool) = self.task_pool.get() {
                    pool.clear();
                }
                return;
            }
        }

        self.reset_error();
        let start = Instant::now();
        self.rate
            .lock()
            .expect("rate estimator poisoned")
            .tick(start);

        let result = {
            let mut op = self.op.lock().expect("operation poisoned");
            let mut ctx = Context {
                node: self.self_arc().expect("node destroyed while running"),
            };
            op.apply(&mut ctx)
        };
        if let Err(e) = result {
            self.set_error(e);
        }

        let nanos = start.elapsed().as_nanos() as u64;
        self.last_duration_ns.store(nanos, Ordering::SeqCst);
        self.hub.emit(NodeEvent::ProcessingDone {
            node: self.name(),
            nanos,
        });
    }

    /// Drain helper: waits for sources (optionally) then for this node's
    /// own queued work. Returns false on timeout. When called from the
    /// main executor thread the underlying waits pump it in short slices.
    pub fn wait(&self, with_sources: bool, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut visited: HashSet<*const Node> = HashSet::new();
        visited.insert(self as *const Node);
        if with_sources {
            for src in self.source_nodes() {
                if !src.wait_inner(&mut visited, deadline) {
                    return false;
                }
            }
        }
        self.wait_own(deadline)
    }

    fn wait_inner(
        self: &Arc<Self>,
        visited: &mut HashSet<*const Node>,
        deadline: Option<Instant>,
    ) -> bool {
        if !visited.insert(Arc::as_ptr(self)) {
            return true;
        }
        for src in self.source_nodes() {
            if !src.wait_inner(visited, deadline) {
                return false;
            }
        }
        self.wait_own(deadline)
    }

    fn wait_own(&self, deadline: Option<Instant>) -> bool {
        match self.task_pool.get() {
            Some(pool) => {
                let timeout = deadline.map(|d| d.saturating_duration_since(Instant::now()));
                pool.wait_for_done(timeout)
            }
            None => true,
        }
    }

    /// Reset the operation's internal state and clear errors.
    pub fn reset(&self) {
        let _guard = self.run_lock();
        self.reset_error();
        self.op.lock().expect("operation poisoned").reset();
    }

    /// Last apply duration in nanoseconds.
    pub fn last_processing_duration(&self) -> u64 {
        self.last_duration_ns.load(Ordering::SeqCst)
    }

    /// Smoothed runs-per-second estimate.
    pub fn processing_rate(&self) -> f64 {
        self.rate.lock().expect("rate estimator poisoned").rate
    }

    /// Current image transform of the operation (composed by lists).
    pub fn image_transform(&self) -> Option<Transform> {
        self.op.lock().expect("operation poisoned").image_transform()
    }

    /// Run a closure against the operation (downcast access for owners).
    pub fn with_op<R>(&self, f: impl FnOnce(&mut dyn Operation) -> R) -> R {
        let mut op = self.op.lock().expect("operation poisoned");
        f(op.as_mut())
    }

    // -- buffer configuration --------------------------------------------

    pub fn configure_input_buffer(&self, index: usize, kind: BufferKind, policy: OverflowPolicy) {
        self.initialize();
        if let Some(input) = self.input_at(index) {
            input.configure_buffer(kind, policy);
        }
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        // Disable inputs first (no further pushes accepted), then drain
        // the worker, then let ports and connections fall.
        self.destruct.store(true, Ordering::SeqCst);
        self.enabled.store(false, Ordering::SeqCst);
        if let Ok(inputs) = self.inputs.get_mut() {
            for input in inputs.iter() {
                input.set_enabled(false);
            }
        }
        // Dropping the pool stops and joins the worker thread.
        drop(self.task_pool.take());
        let name = self
            .name
            .get_mut()
            .map(|n| n.clone())
            .unwrap_or_default();
        self.hub.emit(NodeEvent::Destroyed { node: name });
    }
}

/// Execution context handed to [`Operation::apply`].
pub struct Context {
    node: Arc<Node>,
}

impl Context {
    pub fn node(&self) -> &Arc<Node> {
        &self.node
    }

    /// Consume one value from input `index` (fresh if available, else the
    /// retained stale value).
    pub fn take_input(&self, index: usize) -> Option<AnyData> {
        let input = self.node.input_at(index)?;
        let mut buf = input.buffer().lock().expect("input buffer poisoned");
        buf.next_or_probe()
    }

    /// Drain every value currently queued on input `index`.
    pub fn take_all_inputs(&self, index: usize) -> Vec<AnyData> {
        match self.node.input_at(index) {
            Some(input) => input
                .buffer()
                .lock()
                .expect("input buffer poisoned")
                .take_all(),
            None => Vec::new(),
        }
    }

    pub fn input_count(&self) -> usize {
        self.node.input_count()
    }

    /// Publish `data` on output `index`.
    pub fn send(&self, index: usize, data: AnyData) {
        self.node.set_output_data(index, data);
    }

    /// Property value by name.
    pub fn property(&self, name: &str) -> Option<AnyData> {
        self.node.property_named(name).map(|p| p.data())
    }

    pub fn property_f64(&self, name: &str) -> Option<f64> {
        self.property(name).and_then(|d| d.value().as_f64())
    }

    pub fn property_i64(&self, name: &str) -> Option<i64> {
        self.property(name).and_then(|d| d.value().as_i64())
    }
}

/// Convenience builder wiring common node configuration in one expression.
pub struct NodeBuilder {
    node: Arc<Node>,
}

impl NodeBuilder {
    pub fn new(op: impl Operation) -> Self {
        Self {
            node: Node::new(op),
        }
    }

    pub fn name(self, name: impl Into<String>) -> Self {
        self.node.set_name(name);
        self
    }

    pub fn schedule(self, sched: ScheduleStrategy) -> Self {
        self.node.set_schedule(sched);
        self
    }

    pub fn input_buffer(self, index: usize, kind: BufferKind, policy: OverflowPolicy) -> Self {
        self.node.configure_input_buffer(index, kind, policy);
        self
    }

    pub fn build(self) -> Arc<Node> {
        self.node.initialize();
        self.node
    }
}

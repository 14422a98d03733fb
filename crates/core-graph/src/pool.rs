//! Named containers of nodes.
//!
//! A pool owns its nodes, gives connection addresses a namespace
//! (`pool;node;port`) and re-resolves textual addresses after bulk loads
//! (`open_all_connections`). Pools register themselves in a process-wide
//! list so address resolution can find them by name; the list holds weak
//! references and never keeps a dropped pool alive.

use crate::connection::{Address, OpenMode};
use crate::error::{ErrorCode, ProcessingError};
use crate::node::Node;
use std::sync::{Arc, Mutex, OnceLock, RwLock, Weak};
use std::time::Duration;

pub struct Pool {
    name: RwLock<String>,
    nodes: RwLock<Vec<Arc<Node>>>,
    self_weak: Weak<Pool>,
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("name", &self.name())
            .field("nodes", &self.nodes.read().expect("pool nodes poisoned").len())
            .finish()
    }
}

static POOLS: OnceLock<Mutex<Vec<Weak<Pool>>>> = OnceLock::new();

fn pools() -> &'static Mutex<Vec<Weak<Pool>>> {
    POOLS.get_or_init(|| Mutex::new(Vec::new()))
}

/// Every live pool, registration order.
pub fn all_pools() -> Vec<Arc<Pool>> {
    let mut list = pools().lock().expect("pool registry poisoned");
    list.retain(|w| w.strong_count() > 0);
    list.iter().filter_map(|w| w.upgrade()).collect()
}

/// Find a live pool by name.
pub fn find_pool(name: &str) -> Option<Arc<Pool>> {
    let mut list = pools().lock().expect("pool registry poisoned");
    list.retain(|w| w.strong_count() > 0);
    list.iter()
        .filter_map(|w| w.upgrade())
        .find(|p| p.name() == name)
}

impl Pool {
    pub fn new(name: impl Into<String>) -> Arc<Pool> {
        let pool = Arc::new_cyclic(|weak| Pool {
            name: RwLock::new(name.into()),
            nodes: RwLock::new(Vec::new()),
            self_weak: weak.clone(),
        });
        pools()
            .lock()
            .expect("pool registry poisoned")
            .push(Arc::downgrade(&pool));
        pool
    }

    pub fn name(&self) -> String {
        self.name.read().expect("pool name poisoned").clone()
    }

    pub fn set_name(&self, name: impl Into<String>) {
        *self.name.write().expect("pool name poisoned") = name.into();
    }

    /// Add a node; the node's canonical addresses now carry this pool's
    /// name. Adding twice is a no-op.
    pub fn add(&self, node: Arc<Node>) {
        let mut nodes = self.nodes.write().expect("pool nodes poisoned");
        if nodes.iter().any(|n| Arc::ptr_eq(n, &node)) {
            return;
        }
        node.set_pool_name(Some(self.name()));
        nodes.push(node);
    }

    pub fn remove(&self, node: &Arc<Node>) -> bool {
        let mut nodes = self.nodes.write().expect("pool nodes poisoned");
        let before = nodes.len();
        nodes.retain(|n| !Arc::ptr_eq(n, node));
        let removed = nodes.len() != before;
        if removed {
            node.set_pool_name(None);
        }
        removed
    }

    pub fn nodes(&self) -> Vec<Arc<Node>> {
        self.nodes.read().expect("pool nodes poisoned").clone()
    }

    pub fn len(&self) -> usize {
        self.nodes.read().expect("pool nodes poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn find(&self, name: &str) -> Option<Arc<Node>> {
        self.nodes
            .read()
            .expect("pool nodes poisoned")
            .iter()
            .find(|n| n.name() == name)
            .cloned()
    }

    /// Resolve every input whose connection carries an address but is not
    /// yet open. Returns the number of edges opened. Unresolvable
    /// addresses leave the mode `Unknown` and put a `ConnectionNotOpen`
    /// error on the owning node; they are retried only by calling this
    /// again.
    pub fn open_all_connections(&self) -> usize {
        let mut opened = 0usize;
        for node in self.nodes() {
            node.initialize();
            let inputs = node.inputs_snapshot();
            for (index, input) in inputs.iter().enumerate() {
                let (address, is_open) = {
                    let conn = input.connection().lock().expect("connection poisoned");
                    (conn.address().map(str::to_string), conn.is_open())
                };
                if is_open {
                    continue;
                }
                let Some(address) = address else { continue };
                match self.resolve_input(&node, index, &address) {
                    Ok(()) => opened += 1,
                    Err(e) => node.set_error(e),
                }
            }
        }
        opened
    }

    fn resolve_input(
        &self,
        node: &Arc<Node>,
        input_index: usize,
        address: &str,
    ) -> Result<(), ProcessingError> {
        let parsed = Address::parse(address).ok_or_else(|| {
            ProcessingError::new(
                format!("cannot parse connection address {address:?}"),
                ErrorCode::ConnectionNotOpen,
            )
        })?;
        let pool = match parsed.pool.as_deref() {
            Some(name) if name != self.name() => find_pool(name).ok_or_else(|| {
                ProcessingError::new(
                    format!("no pool named {name:?} for address {address:?}"),
                    ErrorCode::ConnectionNotOpen,
                )
            })?,
            _ => self.self_weak.upgrade().expect("pool self reference"),
        };
        let src = pool.find(&parsed.node).ok_or_else(|| {
            ProcessingError::new(
                format!("no node named {:?} in pool {:?}", parsed.node, pool.name()),
                ErrorCode::ConnectionNotOpen,
            )
        })?;
        src.initialize();
        let out_index = src.output_index(&parsed.port).ok_or_else(|| {
            ProcessingError::new(
                format!("node {:?} has no output {:?}", parsed.node, parsed.port),
                ErrorCode::ConnectionNotOpen,
            )
        })?;
        Node::connect(&src, out_index, node, input_index)
    }

    /// Nodes with no connected input (the graph sources).
    pub fn sources(&self) -> Vec<Arc<Node>> {
        self.nodes()
            .into_iter()
            .filter(|n| {
                n.initialize();
                n.inputs_snapshot().iter().all(|i| {
                    !i.connection()
                        .lock()
                        .expect("connection poisoned")
                        .is_open()
                })
            })
            .collect()
    }

    /// Force one frame through the graph by reloading every source node.
    pub fn reload(&self) {
        for src in self.sources() {
            src.reload();
        }
    }

    /// Drain every node's queued work.
    pub fn wait_for_done(&self, timeout: Option<Duration>) -> bool {
        for node in self.nodes() {
            if !node.wait(false, timeout) {
                return false;
            }
        }
        true
    }

    /// Mode summary of an input's connection (diagnostics).
    pub fn connection_mode(node: &Arc<Node>, input_index: usize) -> OpenMode {
        node.input_at(input_index)
            .map(|i| i.connection().lock().expect("connection poisoned").mode())
            .unwrap_or_default()
    }
}

//! Process-wide configuration and node-type registry.
//!
//! Lifecycle: construct on first use; mutation is expected from the main
//! executor before workers spawn, plus an explicit "apply settings" phase
//! that reconciles live objects. New input buffers snapshot the current
//! default triple; changing the default later only touches buffers still
//! flagged as default (explicit overrides are remembered as such).
//!
//! Configuration file `pyrograph.toml` is discovered in the working
//! directory first, then the platform config dir. Unknown fields are
//! ignored so the file can evolve ahead of the binary.

use crate::error::{ErrorCode, ErrorCodeSet};
use crate::node::Node;
use crate::pool;
use ahash::AHashMap;
use core_buffer::{BufferKind, LimitKind, OverflowPolicy};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

/// Factory producing a fresh node for a registered logical type.
pub type NodeFactory = fn() -> Arc<Node>;

/// One logical node type. Several infos may share a concrete operation,
/// differing by `init_param` (passed to `Operation::initialize_processing`
/// after construction).
#[derive(Clone)]
pub struct NodeInfo {
    pub class_name: &'static str,
    pub display_name: String,
    pub category: String,
    pub icon: String,
    pub init_param: String,
    pub factory: NodeFactory,
}

impl std::fmt::Debug for NodeInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeInfo")
            .field("class_name", &self.class_name)
            .field("display_name", &self.display_name)
            .field("category", &self.category)
            .finish_non_exhaustive()
    }
}

pub struct Registry {
    init_fns: Mutex<Vec<fn()>>,
    inits_ran: Mutex<bool>,
    buffer: Mutex<(BufferKind, OverflowPolicy)>,
    log_filter: Mutex<ErrorCodeSet>,
    error_ring_capacity: AtomicUsize,
    priorities: Mutex<AHashMap<String, i32>>,
    infos: Mutex<Vec<NodeInfo>>,
}

static REGISTRY: OnceLock<Registry> = OnceLock::new();

pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(|| Registry {
        init_fns: Mutex::new(Vec::new()),
        inits_ran: Mutex::new(false),
        buffer: Mutex::new((BufferKind::Fifo, OverflowPolicy::default())),
        log_filter: Mutex::new(ErrorCodeSet::all()),
        error_ring_capacity: AtomicUsize::new(3),
        priorities: Mutex::new(AHashMap::new()),
        infos: Mutex::new(Vec::new()),
    })
}

impl Registry {
    // -- init functions ---------------------------------------------------

    /// Queue a startup hook (type metadata wiring). Hooks run once, at the
    /// first [`Registry::run_initializers`] call.
    pub fn register_init(&self, f: fn()) {
        self.init_fns.lock().expect("registry poisoned").push(f);
    }

    pub fn run_initializers(&self) {
        let mut ran = self.inits_ran.lock().expect("registry poisoned");
        if *ran {
            return;
        }
        *ran = true;
        let fns: Vec<fn()> = self
            .init_fns
            .lock()
            .expect("registry poisoned")
            .drain(..)
            .collect();
        drop(ran);
        for f in fns {
            f();
        }
    }

    // -- buffer defaults --------------------------------------------------

    pub fn default_buffer(&self) -> (BufferKind, OverflowPolicy) {
        *self.buffer.lock().expect("registry poisoned")
    }

    /// Change the default triple and retroactively reconcile every live
    /// input buffer still carrying the default.
    pub fn set_default_buffer(&self, kind: BufferKind, policy: OverflowPolicy) {
        *self.buffer.lock().expect("registry poisoned") = (kind, policy);
        for pool_nodes in live_nodes() {
            for input in pool_nodes.inputs_snapshot() {
                if input.has_default_policy() {
                    input.apply_default_policy(kind, policy);
                }
            }
        }
    }

    // -- error policy -----------------------------------------------------

    pub fn default_log_filter(&self) -> ErrorCodeSet {
        *self.log_filter.lock().expect("registry poisoned")
    }

    pub fn set_default_log_filter(&self, filter: ErrorCodeSet) {
        *self.log_filter.lock().expect("registry poisoned") = filter;
    }

    pub fn error_ring_capacity(&self) -> usize {
        self.error_ring_capacity.load(Ordering::SeqCst)
    }

    pub fn set_error_ring_capacity(&self, capacity: usize) {
        self.error_ring_capacity
            .store(capacity.max(1), Ordering::SeqCst);
    }

    // -- priorities -------------------------------------------------------

    /// Record the default worker priority for a class name.
    pub fn set_default_priority(&self, class_name: &str, priority: i32) {
        self.priorities
            .lock()
            .expect("registry poisoned")
            .insert(class_name.to_string(), priority);
    }

    /// Priority for a class, 0 (inherit) when none is registered.
    pub fn priority_for(&self, class_name: &str) -> i32 {
        self.priorities
            .lock()
            .expect("registry poisoned")
            .get(class_name)
            .copied()
            .unwrap_or(0)
    }

    // -- node-type infos --------------------------------------------------

    pub fn register_info(&self, info: NodeInfo) {
        self.infos.lock().expect("registry poisoned").push(info);
    }

    pub fn infos(&self) -> Vec<NodeInfo> {
        self.infos.lock().expect("registry poisoned").clone()
    }

    /// Instantiate a node by class name (first matching info). The info's
    /// init parameter is forwarded to the operation.
    pub fn create_node(&self, class_name: &str) -> Option<Arc<Node>> {
        let info = self
            .infos
            .lock()
            .expect("registry poisoned")
            .iter()
            .find(|i| i.class_name == class_name)
            .cloned()?;
        let node = (info.factory)();
        if !info.init_param.is_empty() {
            node.with_op(|op| op.initialize_processing(&info.init_param));
        }
        Some(node)
    }

    /// Instantiate by displayed name (logical type).
    pub fn create_by_display_name(&self, display_name: &str) -> Option<Arc<Node>> {
        let info = self
            .infos
            .lock()
            .expect("registry poisoned")
            .iter()
            .find(|i| i.display_name == display_name)
            .cloned()?;
        let node = (info.factory)();
        if !info.init_param.is_empty() {
            node.with_op(|op| op.initialize_processing(&info.init_param));
        }
        Some(node)
    }

    // -- configuration ----------------------------------------------------

    pub fn apply_config(&self, config: &ConfigFile) {
        if let Some(buffer) = &config.buffer {
            let kind = match buffer.kind.as_deref() {
                Some("lifo") => BufferKind::Lifo,
                Some("last") | Some("last_only") => BufferKind::LastOnly,
                _ => BufferKind::Fifo,
            };
            let mut limits = LimitKind::empty();
            if buffer.max_len.is_some() {
                limits |= LimitKind::COUNT;
            }
            if buffer.max_memory.is_some() {
                limits |= LimitKind::MEMORY;
            }
            if limits.is_empty() {
                limits = LimitKind::COUNT;
            }
            let policy = OverflowPolicy {
                limits,
                max_len: buffer.max_len.unwrap_or(OverflowPolicy::default().max_len),
                max_bytes: buffer
                    .max_memory
                    .unwrap_or(OverflowPolicy::default().max_bytes),
            };
            self.set_default_buffer(kind, policy);
        }
        if let Some(log) = &config.log {
            let filter: ErrorCodeSet = log
                .enabled_codes
                .iter()
                .filter_map(|s| ErrorCode::parse(s))
                .collect();
            self.set_default_log_filter(filter);
        }
        for (class, priority) in &config.priority {
            self.set_default_priority(class, *priority);
        }
    }
}

/// Every node of every live pool.
fn live_nodes() -> Vec<Arc<Node>> {
    pool::all_pools()
        .into_iter()
        .flat_map(|p| p.nodes())
        .collect()
}

// ---------------------------------------------------------------------------
// Configuration file
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Default, Clone)]
pub struct BufferConfig {
    pub kind: Option<String>,
    pub max_len: Option<usize>,
    pub max_memory: Option<usize>,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct LogConfig {
    #[serde(default)]
    pub enabled_codes: Vec<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct ConfigFile {
    pub buffer: Option<BufferConfig>,
    pub log: Option<LogConfig>,
    #[serde(default)]
    pub priority: HashMap<String, i32>,
}

/// Best-effort config path: working directory first, then the platform
/// config dir.
pub fn discover() -> PathBuf {
    let local = PathBuf::from("pyrograph.toml");
    if local.exists() {
        return local;
    }
    if let Some(dir) = dirs::config_dir() {
        return dir.join("pyrograph").join("pyrograph.toml");
    }
    PathBuf::from("pyrograph.toml")
}

/// Load the configuration; a missing file yields defaults, a malformed
/// file is an error.
pub fn load_from(path: Option<PathBuf>) -> anyhow::Result<ConfigFile> {
    let path = path.unwrap_or_else(discover);
    match std::fs::read_to_string(&path) {
        Ok(content) => {
            let file: ConfigFile = toml::from_str(&content)?;
            tracing::info!(target: "graph.registry", path = %path.display(), "config loaded");
            Ok(file)
        }
        Err(_) => {
            tracing::info!(target: "graph.registry", path = %path.display(), "no config file, using defaults");
            Ok(ConfigFile::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_config_toml() {
        let text = r#"
            [buffer]
            kind = "fifo"
            max_len = 10
            max_memory = 50000

            [log]
            enabled_codes = ["IOError", "RuntimeError"]

            [priority]
            SignalGenerator = 2

            [unknown]
            tolerated = true
        "#;
        let file: ConfigFile = toml::from_str(text).unwrap();
        let buffer = file.buffer.as_ref().unwrap();
        assert_eq!(buffer.max_len, Some(10));
        assert_eq!(buffer.max_memory, Some(50000));
        assert_eq!(file.priority.get("SignalGenerator"), Some(&2));
        let codes = &file.log.as_ref().unwrap().enabled_codes;
        assert_eq!(codes.len(), 2);
    }

    #[test]
    fn priority_lookup_defaults_to_inherit() {
        let r = registry();
        r.set_default_priority("SomeClass", 5);
        assert_eq!(r.priority_for("SomeClass"), 5);
        assert_eq!(r.priority_for("OtherClass"), 0);
    }
}

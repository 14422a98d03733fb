//! Edges between ports.
//!
//! A connection owns an optional textual address (late binding for
//! deserialized graphs) and non-owning references to its peers. The
//! symmetry invariant — every output's sink list equals the set of inputs
//! whose source points back at it — is maintained by editing both sides
//! under the owner's graph-edit discipline; each side's `Connection` is
//! owned by its port, so dropping a port detaches its edges symmetrically.

use crate::node::Node;
use std::fmt;
use std::sync::{Arc, Weak};

/// Direction a connection resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpenMode {
    #[default]
    Unknown,
    Input,
    Output,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortKind {
    Input,
    Output,
    Property,
}

/// Non-owning reference to one port of one node.
#[derive(Debug, Clone)]
pub struct PortRef {
    pub node: Weak<Node>,
    pub kind: PortKind,
    pub index: usize,
}

impl PortRef {
    pub fn new(node: &Arc<Node>, kind: PortKind, index: usize) -> Self {
        Self {
            node: Arc::downgrade(node),
            kind,
            index,
        }
    }

    pub fn upgrade(&self) -> Option<Arc<Node>> {
        self.node.upgrade()
    }

    /// Same node (by identity), same kind, same index.
    pub fn same_port(&self, other: &PortRef) -> bool {
        self.kind == other.kind
            && self.index == other.index
            && Weak::ptr_eq(&self.node, &other.node)
    }
}

/// Parsed form of `<ClassName>:[<PoolName>;]<NodeName>;<PortName>`.
///
/// The class prefix is informational and tolerated when absent. A two
/// field path binds relative to the owning node's pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    pub class_name: Option<String>,
    pub pool: Option<String>,
    pub node: String,
    pub port: String,
}

impl Address {
    pub fn parse(s: &str) -> Option<Address> {
        let s = s.trim();
        if s.is_empty() {
            return None;
        }
        // Split the class prefix on the first ':' that precedes any ';'.
        let (class_name, path) = match s.find(':') {
            Some(i) if s[..i].find(';').is_none() => (Some(s[..i].to_string()), &s[i + 1..]),
            _ => (None, s),
        };
        let parts: Vec<&str> = path.split(';').collect();
        match parts.as_slice() {
            [node, port] if !node.is_empty() && !port.is_empty() => Some(Address {
                class_name,
                pool: None,
                node: node.to_string(),
                port: port.to_string(),
            }),
            [pool, node, port] if !node.is_empty() && !port.is_empty() => Some(Address {
                class_name,
                pool: if pool.is_empty() {
                    None
                } else {
                    Some(pool.to_string())
                },
                node: node.to_string(),
                port: port.to_string(),
            }),
            _ => None,
        }
    }

    /// Canonical textual form: class prefix kept when known, pool field
    /// dropped when absent.
    pub fn canonical(&self) -> String {
        let mut out = String::new();
        if let Some(ref c) = self.class_name {
            out.push_str(c);
            out.push(':');
        }
        if let Some(ref p) = self.pool {
            out.push_str(p);
            out.push(';');
        }
        out.push_str(&self.node);
        out.push(';');
        out.push_str(&self.port);
        out
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

/// The per-port half of an edge.
#[derive(Debug, Default)]
pub struct Connection {
    address: Option<String>,
    mode: OpenMode,
    peers: Vec<PortRef>,
}

impl Connection {
    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    pub fn set_address(&mut self, address: Option<String>) {
        self.address = address;
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: OpenMode) {
        self.mode = mode;
    }

    pub fn peers(&self) -> &[PortRef] {
        &self.peers
    }

    /// Register a peer; a second registration of the same port is a no-op.
    pub fn add_peer(&mut self, peer: PortRef) {
        if !self.peers.iter().any(|p| p.same_port(&peer)) {
            self.peers.push(peer);
        }
    }

    pub fn remove_peer(&mut self, peer: &PortRef) {
        self.peers.retain(|p| !p.same_port(peer));
    }

    pub fn clear_peers(&mut self) {
        self.peers.clear();
    }

    pub fn is_open(&self) -> bool {
        self.mode != OpenMode::Unknown
    }

    /// Drop dead weak references (their nodes were destroyed).
    pub fn prune(&mut self) {
        self.peers.retain(|p| p.node.strong_count() > 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_three_field_form() {
        let a = Address::parse("VipConnection:pool1;reader;output").unwrap();
        assert_eq!(a.class_name.as_deref(), Some("VipConnection"));
        assert_eq!(a.pool.as_deref(), Some("pool1"));
        assert_eq!(a.node, "reader");
        assert_eq!(a.port, "output");
    }

    #[test]
    fn parse_two_field_form_is_pool_relative() {
        let a = Address::parse("reader;output").unwrap();
        assert_eq!(a.class_name, None);
        assert_eq!(a.pool, None);
        assert_eq!(a.node, "reader");
        assert_eq!(a.port, "output");
    }

    #[test]
    fn parse_missing_class_prefix_tolerated() {
        let a = Address::parse("pool1;reader;output").unwrap();
        assert_eq!(a.class_name, None);
        assert_eq!(a.pool.as_deref(), Some("pool1"));
    }

    #[test]
    fn canonical_drops_empty_pool() {
        let a = Address::parse("Conn:;reader;output").unwrap();
        assert_eq!(a.pool, None);
        assert_eq!(a.canonical(), "Conn:reader;output");
    }

    #[test]
    fn parse_rejects_garbage() {
        assert_eq!(Address::parse(""), None);
        assert_eq!(Address::parse("just-a-name"), None);
        assert_eq!(Address::parse("a;b;c;d"), None);
        assert_eq!(Address::parse(";port"), None);
    }

    #[test]
    fn round_trip_canonical() {
        for s in ["Conn:p;n;o", "n;o", "Conn:n;o", "p;n;o"] {
            let a = Address::parse(s).unwrap();
            let b = Address::parse(&a.canonical()).unwrap();
            assert_eq!(a, b, "canonical form of {s:?} must re-parse identically");
        }
    }
}

//! Graph persistence over the archive format.
//!
//! A pool serializes to a `pool` container holding one `node` container
//! per member. Each node records its class name (used to re-instantiate
//! through the registry), its public flags, property values, user
//! attributes and the textual source address of every input. Loading
//! recreates the nodes and stores the addresses unresolved; the caller
//! finishes with [`Pool::open_all_connections`], mirroring the bulk-load
//! protocol of live sessions.

use crate::connection::{Address, OpenMode};
use crate::error::{ErrorCode, ProcessingError};
use crate::node::{Node, ScheduleStrategy};
use crate::pool::Pool;
use crate::registry::registry;
use core_archive::{ArchiveReader, ArchiveWriter, Result as ArchiveResult};
use core_data::Value;
use std::io::{Read, Seek, Write};
use std::sync::Arc;

pub const FORMAT_VERSION: &str = "1.0";

pub fn save_pool<W: Write + Seek>(
    archive: &mut ArchiveWriter<W>,
    pool: &Arc<Pool>,
) -> ArchiveResult<()> {
    archive.set_version(FORMAT_VERSION);
    archive.start("pool")?;
    archive.content("version", &Value::str(FORMAT_VERSION))?;
    archive.content("name", &Value::str(pool.name()))?;
    let nodes = pool.nodes();
    archive.content("count", &Value::I64(nodes.len() as i64))?;
    for node in &nodes {
        save_node(archive, node)?;
    }
    archive.end()
}

pub fn save_node<W: Write + Seek>(
    archive: &mut ArchiveWriter<W>,
    node: &Arc<Node>,
) -> ArchiveResult<()> {
    node.initialize();
    archive.start("node")?;
    archive.content("class", &Value::str(node.class_name()))?;
    archive.content("name", &Value::str(node.name()))?;
    archive.content("schedule", &Value::I64(node.schedule().bits() as i64))?;
    archive.content("enabled", &Value::Bool(node.is_enabled()))?;
    archive.content("visible", &Value::Bool(node.is_visible()))?;

    archive.start("properties")?;
    for prop in node.properties_snapshot() {
        archive.content(prop.name(), prop.data().value())?;
    }
    archive.end()?;

    archive.start("attributes")?;
    for (key, value) in node.attributes().iter() {
        archive.content(key, value)?;
    }
    archive.end()?;

    archive.start("inputs")?;
    for input in node.inputs_snapshot() {
        let address = input
            .connection()
            .lock()
            .expect("connection poisoned")
            .address()
            .unwrap_or("")
            .to_string();
        archive.content(input.name(), &Value::str(address))?;
    }
    archive.end()?;

    archive.end()
}

/// Read back a pool. Nodes of unknown class are skipped with a warning;
/// connections stay unresolved until `open_all_connections`.
pub fn load_pool<R: Read + Seek>(archive: &mut ArchiveReader<R>) -> ArchiveResult<Arc<Pool>> {
    archive.start("pool")?;
    let version = archive
        .content("version")?
        .as_str()
        .unwrap_or_default()
        .to_string();
    archive.set_version(version);
    let name = archive
        .content("name")?
        .as_str()
        .unwrap_or("pool")
        .to_string();
    let count = archive.content("count")?.as_i64().unwrap_or(0);
    let pool = Pool::new(name);
    for _ in 0..count {
        if let Some(node) = load_node(archive)? {
            pool.add(node);
        }
    }
    archive.end()?;
    Ok(pool)
}

fn load_node<R: Read + Seek>(archive: &mut ArchiveReader<R>) -> ArchiveResult<Option<Arc<Node>>> {
    archive.start("node")?;
    let class = archive
        .content("class")?
        .as_str()
        .unwrap_or_default()
        .to_string();
    let name = archive
        .content("name")?
        .as_str()
        .unwrap_or_default()
        .to_string();
    let schedule = archive.content("schedule")?.as_i64().unwrap_or(0) as u32;
    let enabled = archive.content("enabled")?.as_bool().unwrap_or(true);
    let visible = archive.content("visible")?.as_bool().unwrap_or(true);

    let node = registry().create_node(&class);
    if node.is_none() {
        tracing::warn!(
            target: "graph.persist",
            class = %class,
            node = %name,
            "no factory registered, skipping node"
        );
    }

    if let Some(ref node) = node {
        node.set_name(&name);
        node.set_schedule(ScheduleStrategy::from_bits_truncate(schedule));
        node.set_enabled(enabled);
        node.set_visible(visible);
        node.initialize();
    }

    // Properties.
    archive.start("properties")?;
    loop {
        archive.save()?;
        match archive.read() {
            Ok((key, value)) => {
                commit_save(archive);
                if let Some(ref node) = node {
                    if let Some(prop) = node.property_named(&key) {
                        prop.set_data(core_data::AnyData::untimed(value));
                    }
                }
            }
            Err(_) => {
                archive.restore()?;
                break;
            }
        }
    }
    archive.end()?;

    // Attributes.
    archive.start("attributes")?;
    loop {
        archive.save()?;
        match archive.read() {
            Ok((key, value)) => {
                commit_save(archive);
                if let Some(ref node) = node {
                    // Plain storage: source-property propagation is a live
                    // graph behavior, not a load-time one.
                    node.set_source_properties_enabled(false);
                    node.set_attribute(key, value);
                    node.set_source_properties_enabled(true);
                }
            }
            Err(_) => {
                archive.restore()?;
                break;
            }
        }
    }
    archive.end()?;

    // Input addresses.
    archive.start("inputs")?;
    loop {
        archive.save()?;
        match archive.read() {
            Ok((input_name, value)) => {
                commit_save(archive);
                if let Some(ref node) = node {
                    let address = value.as_str().unwrap_or_default();
                    if !address.is_empty() {
                        if let Some(index) = node.input_index(&input_name) {
                            if let Some(input) = node.input_at(index) {
                                let mut conn =
                                    input.connection().lock().expect("connection poisoned");
                                conn.set_address(Some(address.to_string()));
                                conn.set_mode(OpenMode::Unknown);
                            }
                        }
                    }
                }
            }
            Err(_) => {
                archive.restore()?;
                break;
            }
        }
    }
    archive.end()?;

    archive.end()?;
    Ok(node)
}

fn commit_save<R: Read + Seek>(archive: &mut ArchiveReader<R>) {
    // A successful speculative read retires its snapshot.
    archive.discard_save();
}

/// Validate that an address names an existing pool/node/port without
/// opening it (diagnostics helper).
pub fn probe_address(owning_pool: &Arc<Pool>, address: &str) -> Result<(), ProcessingError> {
    let parsed = Address::parse(address).ok_or_else(|| {
        ProcessingError::new(
            format!("cannot parse address {address:?}"),
            ErrorCode::ConnectionNotOpen,
        )
    })?;
    let pool = match parsed.pool.as_deref() {
        Some(name) if name != owning_pool.name() => {
            crate::pool::find_pool(name).ok_or_else(|| {
                ProcessingError::new(
                    format!("no pool named {name:?}"),
                    ErrorCode::ConnectionNotOpen,
                )
            })?
        }
        _ => owning_pool.clone(),
    };
    let node = pool.find(&parsed.node).ok_or_else(|| {
        ProcessingError::new(
            format!("no node named {:?}", parsed.node),
            ErrorCode::ConnectionNotOpen,
        )
    })?;
    node.initialize();
    node.output_index(&parsed.port)
        .map(|_| ())
        .ok_or_else(|| {
            ProcessingError::new(
                format!("node {:?} has no output {:?}", parsed.node, parsed.port),
                ErrorCode::ConnectionNotOpen,
            )
        })
}

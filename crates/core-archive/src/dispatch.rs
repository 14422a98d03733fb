//! Payload type dispatch.
//!
//! Maps a stable type name to a `(writer, reader)` pair for [`Value`]
//! payloads. Built-in variants register on first access; crates with their
//! own payloads call [`register_value_type`] at startup. Archives keep a
//! tiny per-instance cache of the last resolved entry, which covers the
//! common case of long runs of identically-typed frames without a map
//! lookup per frame.

use crate::error::{ArchiveError, Result};
use ahash::AHashMap;
use core_data::array::{Array2, ArrayData};
use core_data::geometry::{Interval, Point};
use core_data::value::Bin;
use core_data::{Rgba, Value};
use std::sync::{Arc, OnceLock, RwLock};

pub type WriteFn = fn(&Value) -> Result<Vec<u8>>;
pub type ReadFn = fn(&[u8]) -> Result<Value>;

#[derive(Clone, Copy)]
pub struct Entry {
    pub write: WriteFn,
    pub read: ReadFn,
}

/// Process-wide writer/reader table keyed by type name.
#[derive(Default)]
pub struct DispatchRegistry {
    entries: AHashMap<String, Entry>,
}

impl DispatchRegistry {
    pub fn register(&mut self, type_name: &str, write: WriteFn, read: ReadFn) {
        self.entries
            .insert(type_name.to_string(), Entry { write, read });
    }

    pub fn lookup(&self, type_name: &str) -> Option<Entry> {
        self.entries.get(type_name).copied()
    }
}

static REGISTRY: OnceLock<Arc<RwLock<DispatchRegistry>>> = OnceLock::new();

/// The process registry, built-ins installed on first access.
pub fn registry() -> Arc<RwLock<DispatchRegistry>> {
    REGISTRY
        .get_or_init(|| {
            let mut reg = DispatchRegistry::default();
            install_builtins(&mut reg);
            Arc::new(RwLock::new(reg))
        })
        .clone()
}

/// Register a custom payload codec under `type_name`, replacing any
/// previous registration.
pub fn register_value_type(type_name: &str, write: WriteFn, read: ReadFn) {
    registry()
        .write()
        .expect("dispatch registry poisoned")
        .register(type_name, write, read);
}

// ---------------------------------------------------------------------------
// Built-in codecs
// ---------------------------------------------------------------------------

fn i64_bytes(v: i64) -> [u8; 8] {
    v.to_le_bytes()
}

fn take_i64(buf: &[u8], at: usize) -> Result<i64> {
    let slice = buf
        .get(at..at + 8)
        .ok_or(ArchiveError::EndOfStream)?;
    Ok(i64::from_le_bytes(slice.try_into().unwrap()))
}

fn take_f64(buf: &[u8], at: usize) -> Result<f64> {
    let slice = buf
        .get(at..at + 8)
        .ok_or(ArchiveError::EndOfStream)?;
    Ok(f64::from_le_bytes(slice.try_into().unwrap()))
}

fn write_empty(_: &Value) -> Result<Vec<u8>> {
    Ok(Vec::new())
}

fn read_empty(_: &[u8]) -> Result<Value> {
    Ok(Value::Empty)
}

fn write_bool(v: &Value) -> Result<Vec<u8>> {
    match v {
        Value::Bool(b) => Ok(vec![*b as u8]),
        other => mismatch("bool", other),
    }
}

fn read_bool(buf: &[u8]) -> Result<Value> {
    match buf.first() {
        Some(b) => Ok(Value::Bool(*b != 0)),
        None => Err(ArchiveError::EndOfStream),
    }
}

fn write_i64_v(v: &Value) -> Result<Vec<u8>> {
    match v {
        Value::I64(i) => Ok(i64_bytes(*i).to_vec()),
        other => mismatch("i64", other),
    }
}

fn read_i64_v(buf: &[u8]) -> Result<Value> {
    Ok(Value::I64(take_i64(buf, 0)?))
}

fn write_f64_v(v: &Value) -> Result<Vec<u8>> {
    match v {
        Value::F64(f) => Ok(f.to_le_bytes().to_vec()),
        other => mismatch("f64", other),
    }
}

fn read_f64_v(buf: &[u8]) -> Result<Value> {
    Ok(Value::F64(take_f64(buf, 0)?))
}

fn write_str_v(v: &Value) -> Result<Vec<u8>> {
    match v {
        Value::Str(s) => Ok(s.as_bytes().to_vec()),
        other => mismatch("str", other),
    }
}

fn read_str_v(buf: &[u8]) -> Result<Value> {
    std::str::from_utf8(buf)
        .map(Value::str)
        .map_err(|_| ArchiveError::BadString)
}

fn write_bytes_v(v: &Value) -> Result<Vec<u8>> {
    match v {
        Value::Bytes(b) => Ok(b.to_vec()),
        other => mismatch("bytes", other),
    }
}

fn read_bytes_v(buf: &[u8]) -> Result<Value> {
    Ok(Value::bytes(buf.to_vec()))
}

fn write_points(v: &Value) -> Result<Vec<u8>> {
    match v {
        Value::PointVec(pts) => {
            let mut out = Vec::with_capacity(8 + pts.len() * 16);
            out.extend_from_slice(&i64_bytes(pts.len() as i64));
            for p in pts.iter() {
                out.extend_from_slice(&p.x.to_le_bytes());
                out.extend_from_slice(&p.y.to_le_bytes());
            }
            Ok(out)
        }
        other => mismatch("points", other),
    }
}

fn read_points(buf: &[u8]) -> Result<Value> {
    let count = take_i64(buf, 0)?;
    if count < 0 {
        return Err(ArchiveError::Malformed("negative point count".into()));
    }
    let mut pts = Vec::with_capacity(count as usize);
    let mut at = 8;
    for _ in 0..count {
        let x = take_f64(buf, at)?;
        let y = take_f64(buf, at + 8)?;
        pts.push(Point::new(x, y));
        at += 16;
    }
    Ok(Value::points(pts))
}

fn write_bins(v: &Value) -> Result<Vec<u8>> {
    match v {
        Value::Bins(bins) => {
            let mut out = Vec::with_capacity(8 + bins.len() * 24);
            out.extend_from_slice(&i64_bytes(bins.len() as i64));
            for b in bins.iter() {
                out.extend_from_slice(&b.interval.min.to_le_bytes());
                out.extend_from_slice(&b.interval.max.to_le_bytes());
                out.extend_from_slice(&b.value.to_le_bytes());
            }
            Ok(out)
        }
        other => mismatch("bins", other),
    }
}

fn read_bins(buf: &[u8]) -> Result<Value> {
    let count = take_i64(buf, 0)?;
    if count < 0 {
        return Err(ArchiveError::Malformed("negative bin count".into()));
    }
    let mut bins = Vec::with_capacity(count as usize);
    let mut at = 8;
    for _ in 0..count {
        let min = take_f64(buf, at)?;
        let max = take_f64(buf, at + 8)?;
        let value = take_f64(buf, at + 16)?;
        bins.push(Bin::new(Interval::new(min, max), value));
        at += 24;
    }
    Ok(Value::bins(bins))
}

const TAG_U8: u8 = 0;
const TAG_I32: u8 = 1;
const TAG_F64: u8 = 2;
const TAG_RGBA: u8 = 3;

fn write_array(v: &Value) -> Result<Vec<u8>> {
    let a = match v {
        Value::Array(a) => a,
        other => return mismatch("array", other),
    };
    let (w, h) = (a.width(), a.height());
    let mut out = Vec::with_capacity(17 + a.byte_len());
    let tag = match a {
        ArrayData::U8(_) => TAG_U8,
        ArrayData::I32(_) => TAG_I32,
        ArrayData::F64(_) => TAG_F64,
        ArrayData::Rgba(_) => TAG_RGBA,
    };
    out.push(tag);
    out.extend_from_slice(&i64_bytes(w as i64));
    out.extend_from_slice(&i64_bytes(h as i64));
    match a {
        ArrayData::U8(a) => out.extend_from_slice(a.as_slice()),
        ArrayData::I32(a) => {
            for v in a.as_slice() {
                out.extend_from_slice(&v.to_le_bytes());
            }
        }
        ArrayData::F64(a) => {
            for v in a.as_slice() {
                out.extend_from_slice(&v.to_le_bytes());
            }
        }
        ArrayData::Rgba(a) => {
            for c in a.as_slice() {
                out.extend_from_slice(&[c.r, c.g, c.b, c.a]);
            }
        }
    }
    Ok(out)
}

fn read_array(buf: &[u8]) -> Result<Value> {
    let tag = *buf.first().ok_or(ArchiveError::EndOfStream)?;
    let w = take_i64(buf, 1)? as usize;
    let h = take_i64(buf, 9)? as usize;
    let body = &buf[17..];
    let count = w * h;
    let arr = match tag {
        TAG_U8 => {
            if body.len() < count {
                return Err(ArchiveError::EndOfStream);
            }
            ArrayData::U8(Array2::from_vec(w, h, body[..count].to_vec()))
        }
        TAG_I32 => {
            if body.len() < count * 4 {
                return Err(ArchiveError::EndOfStream);
            }
            let mut data = Vec::with_capacity(count);
            for chunk in body[..count * 4].chunks_exact(4) {
                data.push(i32::from_le_bytes(chunk.try_into().unwrap()));
            }
            ArrayData::I32(Array2::from_vec(w, h, data))
        }
        TAG_F64 => {
            if body.len() < count * 8 {
                return Err(ArchiveError::EndOfStream);
            }
            let mut data = Vec::with_capacity(count);
            for chunk in body[..count * 8].chunks_exact(8) {
                data.push(f64::from_le_bytes(chunk.try_into().unwrap()));
            }
            ArrayData::F64(Array2::from_vec(w, h, data))
        }
        TAG_RGBA => {
            if body.len() < count * 4 {
                return Err(ArchiveError::EndOfStream);
            }
            let mut data = Vec::with_capacity(count);
            for chunk in body[..count * 4].chunks_exact(4) {
                data.push(Rgba::new(chunk[0], chunk[1], chunk[2], chunk[3]));
            }
            ArrayData::Rgba(Array2::from_vec(w, h, data))
        }
        t => {
            return Err(ArchiveError::Malformed(format!(
                "unknown array element tag {t}"
            )));
        }
    };
    Ok(Value::Array(arr))
}

fn mismatch(expected: &'static str, found: &Value) -> Result<Vec<u8>> {
    Err(ArchiveError::TypeMismatch {
        expected,
        found: found.type_name().to_string(),
    })
}

fn install_builtins(reg: &mut DispatchRegistry) {
    reg.register("empty", write_empty, read_empty);
    reg.register("bool", write_bool, read_bool);
    reg.register("i64", write_i64_v, read_i64_v);
    reg.register("f64", write_f64_v, read_f64_v);
    reg.register("str", write_str_v, read_str_v);
    reg.register("bytes", write_bytes_v, read_bytes_v);
    reg.register("points", write_points, read_points);
    reg.register("bins", write_bins, read_bins);
    reg.register("array", write_array, read_array);
}

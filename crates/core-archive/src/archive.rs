//! Writer/reader stack machines over the frame codec.
//!
//! Both sides maintain a position path (the stack of open container names),
//! a sticky error slot, named boolean attributes that switch serialization
//! behavior, and a version string. The reader adds `save()`/`restore()`
//! snapshots so callers can attempt a deserialization and rewind on
//! mismatch (the try-deserialize pattern used by polymorphic loads).

use crate::dispatch::{Entry, registry};
use crate::error::{ArchiveError, Result};
use crate::frame::{Frame, FrameReader, FrameWriter};
use ahash::AHashMap;
use core_data::{AnyData, Attributes, Value};
use std::io::{Read, Seek, Write};

/// Attribute: when true, value frames are written with an empty payload
/// (type header preserved) for light metadata-only saves.
pub const SKIP_DATA: &str = "skip_data";

/// Archive lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    NotOpen,
    Read,
    Write,
}

/// Cache of the last resolved dispatch entry; long runs of identically
/// typed frames skip the registry lock + map lookup.
#[derive(Default)]
struct FastType {
    name: String,
    entry: Option<Entry>,
}

impl FastType {
    fn lookup(&mut self, type_name: &str) -> Result<Entry> {
        if self.name == type_name {
            if let Some(e) = self.entry {
                return Ok(e);
            }
        }
        let reg = registry();
        let guard = reg.read().expect("dispatch registry poisoned");
        let entry = guard
            .lookup(type_name)
            .ok_or_else(|| ArchiveError::UnknownType(type_name.to_string()))?;
        self.name = type_name.to_string();
        self.entry = Some(entry);
        Ok(entry)
    }
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

pub struct ArchiveWriter<W> {
    frames: FrameWriter<W>,
    mode: Mode,
    path: Vec<String>,
    error: Option<(String, i32)>,
    attributes: AHashMap<String, bool>,
    version: String,
    fast: FastType,
}

impl<W: Write + Seek> ArchiveWriter<W> {
    pub fn new(stream: W) -> Self {
        Self {
            frames: FrameWriter::new(stream),
            mode: Mode::Write,
            path: Vec::new(),
            error: None,
            attributes: AHashMap::new(),
            version: String::new(),
            fast: FastType::default(),
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Slash-joined path of open containers.
    pub fn position(&self) -> String {
        self.path.join("/")
    }

    pub fn set_version(&mut self, version: impl Into<String>) {
        self.version = version.into();
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn set_attribute(&mut self, name: &str, on: bool) {
        self.attributes.insert(name.to_string(), on);
    }

    pub fn attribute(&self, name: &str) -> bool {
        self.attributes.get(name).copied().unwrap_or(false)
    }

    pub fn last_error(&self) -> Option<&(String, i32)> {
        self.error.as_ref()
    }

    fn record<T>(&mut self, res: Result<T>) -> Result<T> {
        if let Err(ref e) = res {
            self.error = Some((e.to_string(), e.code()));
        }
        res
    }

    /// Open a named container.
    pub fn start(&mut self, name: &str) -> Result<()> {
        let res = self.frames.write_start(name);
        if res.is_ok() {
            self.path.push(name.to_string());
        }
        self.record(res)
    }

    /// Close the innermost container.
    pub fn end(&mut self) -> Result<()> {
        if self.path.pop().is_none() {
            let err = Err(ArchiveError::UnbalancedEnd);
            return self.record(err);
        }
        let res = self.frames.write_end();
        self.record(res)
    }

    /// Write one named value.
    pub fn content(&mut self, name: &str, value: &Value) -> Result<()> {
        let type_name = value.type_name();
        let res = (|| {
            let entry = self.fast.lookup(type_name)?;
            let payload = if self.attribute(SKIP_DATA) {
                Vec::new()
            } else {
                (entry.write)(value)?
            };
            self.frames.write_value(name, type_name, &payload)
        })();
        self.record(res)
    }

    /// Attach a free-text comment, written as a regular value frame so
    /// readers that don't care simply skip it.
    pub fn write_comment(&mut self, comment: &str) -> Result<()> {
        self.content("__comment", &Value::str(comment))
    }

    /// Write an [`AnyData`] as a container: time, source, attributes and
    /// payload value as nested frames.
    pub fn content_any(&mut self, name: &str, data: &AnyData) -> Result<()> {
        self.start(name)?;
        self.content("time", &Value::I64(data.time()))?;
        self.content("source", &Value::I64(data.source() as i64))?;
        self.start("attributes")?;
        for (key, value) in data.attributes().iter() {
            self.content(key, value)?;
        }
        self.end()?;
        self.content("value", data.value())?;
        self.end()
    }

    pub fn flush(&mut self) -> Result<()> {
        let res = self.frames.flush();
        self.record(res)
    }

    /// Consume, flushing and returning the underlying stream.
    pub fn finish(mut self) -> Result<W> {
        self.frames.flush()?;
        Ok(self.frames.into_inner())
    }
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct Snapshot {
    stream_pos: u64,
    path: Vec<String>,
    error: Option<(String, i32)>,
}

pub struct ArchiveReader<R> {
    frames: FrameReader<R>,
    mode: Mode,
    path: Vec<String>,
    error: Option<(String, i32)>,
    attributes: AHashMap<String, bool>,
    version: String,
    saved: Vec<Snapshot>,
    fast: FastType,
}

impl<R: Read + Seek> ArchiveReader<R> {
    pub fn new(stream: R) -> Self {
        Self {
            frames: FrameReader::new(stream),
            mode: Mode::Read,
            path: Vec::new(),
            error: None,
            attributes: AHashMap::new(),
            version: String::new(),
            saved: Vec::new(),
            fast: FastType::default(),
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn position(&self) -> String {
        self.path.join("/")
    }

    pub fn set_version(&mut self, version: impl Into<String>) {
        self.version = version.into();
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn set_attribute(&mut self, name: &str, on: bool) {
        self.attributes.insert(name.to_string(), on);
    }

    pub fn attribute(&self, name: &str) -> bool {
        self.attributes.get(name).copied().unwrap_or(false)
    }

    pub fn last_error(&self) -> Option<&(String, i32)> {
        self.error.as_ref()
    }

    pub fn reset_error(&mut self) {
        self.error = None;
    }

    fn record<T>(&mut self, res: Result<T>) -> Result<T> {
        if let Err(ref e) = res {
            self.error = Some((e.to_string(), e.code()));
        }
        res
    }

    /// Snapshot stream position + path + error state.
    pub fn save(&mut self) -> Result<()> {
        let stream_pos = self.frames.stream_position()?;
        self.saved.push(Snapshot {
            stream_pos,
            path: self.path.clone(),
            error: self.error.clone(),
        });
        Ok(())
    }

    /// Retire the innermost snapshot without rewinding (the speculative
    /// read committed).
    pub fn discard_save(&mut self) {
        self.saved.pop();
    }

    /// Rewind to the matching `save()`. Calls must pair.
    pub fn restore(&mut self) -> Result<()> {
        let snap = self
            .saved
            .pop()
            .ok_or_else(|| ArchiveError::Malformed("restore without save".into()))?;
        self.frames.seek(snap.stream_pos)?;
        self.path = snap.path;
        self.error = snap.error;
        Ok(())
    }

    /// Enter the next container, which must be named `name`.
    pub fn start(&mut self, name: &str) -> Result<()> {
        let res = (|| match self.frames.read_frame()? {
            Frame::Start(found) if found == name => Ok(found),
            Frame::Start(found) => Err(ArchiveError::NameMismatch {
                expected: name.to_string(),
                found,
            }),
            other => Err(ArchiveError::Malformed(format!(
                "expected start tag {name:?}, found {other:?}"
            ))),
        })();
        match res {
            Ok(found) => {
                self.path.push(found);
                Ok(())
            }
            Err(e) => self.record(Err(e)),
        }
    }

    /// Leave the current container, skipping any unread frames inside it
    /// (nested containers included).
    pub fn end(&mut self) -> Result<()> {
        if self.path.is_empty() {
            let err = Err(ArchiveError::UnbalancedEnd);
            return self.record(err);
        }
        let res = (|| {
            let mut depth = 0usize;
            loop {
                match self.frames.read_frame()? {
                    Frame::End if depth == 0 => return Ok(()),
                    Frame::End => depth -= 1,
                    Frame::Start(_) => depth += 1,
                    Frame::Value { .. } => {}
                }
            }
        })();
        if res.is_ok() {
            self.path.pop();
        }
        self.record(res)
    }

    /// Read the next value frame, which must be named `name`. Unknown
    /// type names are surfaced as errors after the frame is consumed, so a
    /// caller may `save()`/`restore()` around a speculative read.
    pub fn content(&mut self, name: &str) -> Result<Value> {
        let res = (|| match self.frames.read_frame()? {
            Frame::Value {
                name: found,
                type_name,
                payload,
            } => {
                if found != name {
                    return Err(ArchiveError::NameMismatch {
                        expected: name.to_string(),
                        found,
                    });
                }
                let entry = self.fast.lookup(&type_name)?;
                (entry.read)(&payload)
            }
            other => Err(ArchiveError::Malformed(format!(
                "expected value frame {name:?}, found {other:?}"
            ))),
        })();
        self.record(res)
    }

    /// Read the next value frame whatever its name, returning
    /// `(name, value)`.
    pub fn read(&mut self) -> Result<(String, Value)> {
        let res = (|| match self.frames.read_frame()? {
            Frame::Value {
                name,
                type_name,
                payload,
            } => {
                let entry = self.fast.lookup(&type_name)?;
                Ok((name, (entry.read)(&payload)?))
            }
            other => Err(ArchiveError::Malformed(format!(
                "expected value frame, found {other:?}"
            ))),
        })();
        self.record(res)
    }

    /// Skip one frame (container tags count as one frame each).
    pub fn skip(&mut self) -> Result<()> {
        let res = self.frames.skip_frame();
        self.record(res)
    }

    /// Try to read a `__comment` frame at the current position; rewinds
    /// and returns `None` when the next frame is something else.
    pub fn read_comment(&mut self) -> Result<Option<String>> {
        self.save()?;
        match self.content("__comment") {
            Ok(value) => {
                self.discard_save();
                Ok(value.as_str().map(str::to_string))
            }
            Err(_) => {
                self.restore()?;
                Ok(None)
            }
        }
    }

    /// Counterpart of [`ArchiveWriter::content_any`].
    pub fn content_any(&mut self, name: &str) -> Result<AnyData> {
        self.start(name)?;
        let time = self
            .content("time")?
            .as_i64()
            .ok_or_else(|| ArchiveError::Malformed("time is not an integer".into()))?;
        let source = self
            .content("source")?
            .as_i64()
            .ok_or_else(|| ArchiveError::Malformed("source is not an integer".into()))?;
        self.start("attributes")?;
        let mut attrs = Attributes::new();
        loop {
            self.save()?;
            match self.read() {
                Ok((key, value)) => {
                    self.discard_save();
                    attrs.set(key, value);
                }
                Err(_) => {
                    self.restore()?;
                    self.reset_error();
                    break;
                }
            }
        }
        self.end()?;
        let value = self.content("value")?;
        self.end()?;
        let mut out = AnyData::new(value, time).with_source(source as u64);
        for (k, v) in attrs.iter() {
            out.set_attribute(k, v.clone());
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn write_read_cycle(f: impl FnOnce(&mut ArchiveWriter<Cursor<Vec<u8>>>)) -> ArchiveReader<Cursor<Vec<u8>>> {
        let mut w = ArchiveWriter::new(Cursor::new(Vec::new()));
        f(&mut w);
        let stream = w.finish().unwrap();
        ArchiveReader::new(Cursor::new(stream.into_inner()))
    }

    #[test]
    fn nested_containers_round_trip() {
        let mut r = write_read_cycle(|w| {
            w.start("pool").unwrap();
            w.content("count", &Value::I64(2)).unwrap();
            w.start("node").unwrap();
            w.content("name", &Value::str("reader")).unwrap();
            w.end().unwrap();
            w.end().unwrap();
        });
        r.start("pool").unwrap();
        assert_eq!(r.content("count").unwrap(), Value::I64(2));
        r.start("node").unwrap();
        assert_eq!(r.content("name").unwrap(), Value::str("reader"));
        r.end().unwrap();
        r.end().unwrap();
    }

    #[test]
    fn end_skips_unread_frames() {
        let mut r = write_read_cycle(|w| {
            w.start("node").unwrap();
            w.content("a", &Value::I64(1)).unwrap();
            w.start("sub").unwrap();
            w.content("b", &Value::I64(2)).unwrap();
            w.end().unwrap();
            w.content("c", &Value::I64(3)).unwrap();
            w.end().unwrap();
            w.content("after", &Value::str("tail")).unwrap();
        });
        r.start("node").unwrap();
        r.end().unwrap(); // skip a, sub{b}, c
        assert_eq!(r.content("after").unwrap(), Value::str("tail"));
    }

    #[test]
    fn save_restore_rewinds() {
        let mut r = write_read_cycle(|w| {
            w.content("x", &Value::I64(7)).unwrap();
        });
        r.save().unwrap();
        assert!(r.content("wrong-name").is_err());
        r.restore().unwrap();
        assert_eq!(r.content("x").unwrap(), Value::I64(7));
        assert!(r.last_error().is_none(), "restore clears the error slot");
    }

    #[test]
    fn skip_data_preserves_structure() {
        let mut r = write_read_cycle(|w| {
            w.set_attribute(SKIP_DATA, true);
            w.content("big", &Value::bytes(vec![1u8; 4096])).unwrap();
            w.set_attribute(SKIP_DATA, false);
            w.content("small", &Value::I64(1)).unwrap();
        });
        let v = r.content("big").unwrap();
        match v {
            Value::Bytes(b) => assert!(b.is_empty(), "payload suppressed"),
            other => panic!("expected bytes, got {other:?}"),
        }
        assert_eq!(r.content("small").unwrap(), Value::I64(1));
    }

    #[test]
    fn any_data_round_trip() {
        let data = AnyData::new(Value::F64(0.25), 1234)
            .with_source(9)
            .with_attribute("Name", "sensor")
            .with_attribute("gain", 2.0);
        let mut r = write_read_cycle(|w| {
            w.content_any("frame", &data).unwrap();
        });
        let back = r.content_any("frame").unwrap();
        assert_eq!(back.time(), 1234);
        assert_eq!(back.source(), 9);
        assert_eq!(back.value(), &Value::F64(0.25));
        assert_eq!(back.attributes().get_str("Name"), Some("sensor"));
        assert_eq!(back.attribute("gain"), Some(&Value::F64(2.0)));
    }

    #[test]
    fn comment_round_trip_and_skip() {
        let mut r = write_read_cycle(|w| {
            w.write_comment("session of 2026-07-12").unwrap();
            w.content("x", &Value::I64(1)).unwrap();
        });
        assert_eq!(
            r.read_comment().unwrap().as_deref(),
            Some("session of 2026-07-12")
        );
        // No second comment: the probe rewinds and the value is intact.
        assert_eq!(r.read_comment().unwrap(), None);
        assert_eq!(r.content("x").unwrap(), Value::I64(1));
    }

    #[test]
    fn unbalanced_end_is_an_error() {
        let mut w = ArchiveWriter::new(Cursor::new(Vec::new()));
        assert!(w.end().is_err());
        assert!(w.last_error().is_some());
    }
}

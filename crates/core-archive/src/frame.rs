//! The raw frame codec.
//!
//! Nothing here interprets payloads; this layer only guarantees the frame
//! grammar: sizes, tags, the embedded type-name header of value frames and
//! the trailing mirror size.

use crate::error::{ArchiveError, Result};
use std::io::{Read, Seek, SeekFrom, Write};

/// Leading size value of a start tag.
pub const START_TAG: i64 = -1;
/// Size value of an end tag.
pub const END_TAG: i64 = -2;

/// One decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Start(String),
    End,
    Value {
        name: String,
        type_name: String,
        payload: Vec<u8>,
    },
}

fn write_i64<W: Write>(w: &mut W, v: i64) -> Result<()> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

fn write_str<W: Write>(w: &mut W, s: &str) -> Result<()> {
    write_i64(w, s.len() as i64)?;
    w.write_all(s.as_bytes())?;
    Ok(())
}

fn read_i64<R: Read>(r: &mut R) -> Result<i64> {
    let mut buf = [0u8; 8];
    match r.read_exact(&mut buf) {
        Ok(()) => Ok(i64::from_le_bytes(buf)),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(ArchiveError::EndOfStream),
        Err(e) => Err(e.into()),
    }
}

fn read_str<R: Read>(r: &mut R) -> Result<String> {
    let len = read_i64(r)?;
    if len < 0 {
        return Err(ArchiveError::Malformed(format!("negative string size {len}")));
    }
    let mut buf = vec![0u8; len as usize];
    r.read_exact(&mut buf).map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            ArchiveError::EndOfStream
        } else {
            ArchiveError::Io(e)
        }
    })?;
    String::from_utf8(buf).map_err(|_| ArchiveError::BadString)
}

/// Frame-level writer.
#[derive(Debug)]
pub struct FrameWriter<W> {
    inner: W,
}

impl<W: Write + Seek> FrameWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    pub fn stream_position(&mut self) -> Result<u64> {
        Ok(self.inner.stream_position()?)
    }

    pub fn write_start(&mut self, name: &str) -> Result<()> {
        write_i64(&mut self.inner, START_TAG)?;
        write_str(&mut self.inner, name)?;
        write_i64(&mut self.inner, START_TAG)
    }

    pub fn write_end(&mut self) -> Result<()> {
        write_i64(&mut self.inner, END_TAG)
    }

    /// Write a value frame. `size` covers the type-name header plus the
    /// payload and is mirrored after the payload.
    pub fn write_value(&mut self, name: &str, type_name: &str, payload: &[u8]) -> Result<()> {
        let size = 8 + type_name.len() as i64 + payload.len() as i64;
        write_i64(&mut self.inner, size)?;
        write_str(&mut self.inner, name)?;
        write_str(&mut self.inner, type_name)?;
        self.inner.write_all(payload)?;
        write_i64(&mut self.inner, size)
    }

    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }
}

/// Frame-level reader with forward skip and backward scan.
#[derive(Debug)]
pub struct FrameReader<R> {
    inner: R,
}

impl<R: Read + Seek> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    pub fn stream_position(&mut self) -> Result<u64> {
        Ok(self.inner.stream_position()?)
    }

    pub fn seek(&mut self, pos: u64) -> Result<()> {
        self.inner.seek(SeekFrom::Start(pos))?;
        Ok(())
    }

    /// Decode the next frame, consuming it entirely.
    pub fn read_frame(&mut self) -> Result<Frame> {
        let size = read_i64(&mut self.inner)?;
        match size {
            END_TAG => Ok(Frame::End),
            START_TAG => {
                let name = read_str(&mut self.inner)?;
                let closing = read_i64(&mut self.inner)?;
                if closing != START_TAG {
                    return Err(ArchiveError::Malformed(format!(
                        "start tag for {name:?} not terminated (got {closing})"
                    )));
                }
                Ok(Frame::Start(name))
            }
            s if s >= 0 => {
                let name = read_str(&mut self.inner)?;
                let type_name = read_str(&mut self.inner)?;
                let header = 8 + type_name.len();
                if (s as usize) < header {
                    return Err(ArchiveError::Malformed(format!(
                        "value frame {name:?}: size {s} smaller than type header"
                    )));
                }
                let payload_len = s as usize - header;
                let mut payload = vec![0u8; payload_len];
                self.inner.read_exact(&mut payload)?;
                let trailer = read_i64(&mut self.inner)?;
                if trailer != s {
                    return Err(ArchiveError::Malformed(format!(
                        "value frame {name:?}: trailing size {trailer} != {s}"
                    )));
                }
                Ok(Frame::Value {
                    name,
                    type_name,
                    payload,
                })
            }
            s => Err(ArchiveError::Malformed(format!("invalid frame size {s}"))),
        }
    }

    /// Skip the next frame without materializing its payload. Start/end
    /// tags are consumed whole; for a value frame only the sizes and names
    /// are parsed and the payload is seeked over.
    pub fn skip_frame(&mut self) -> Result<()> {
        let size = read_i64(&mut self.inner)?;
        match size {
            END_TAG => Ok(()),
            START_TAG => {
                let _name = read_str(&mut self.inner)?;
                let closing = read_i64(&mut self.inner)?;
                if closing != START_TAG {
                    return Err(ArchiveError::Malformed("unterminated start tag".into()));
                }
                Ok(())
            }
            s if s >= 0 => {
                let name_len = read_i64(&mut self.inner)?;
                if name_len < 0 {
                    return Err(ArchiveError::Malformed("negative name size".into()));
                }
                // name + (type header + payload) + trailing mirror
                self.inner
                    .seek(SeekFrom::Current(name_len + s + 8))?;
                Ok(())
            }
            s => Err(ArchiveError::Malformed(format!("invalid frame size {s}"))),
        }
    }

    /// Backward scan step: assuming the reader sits just past a value
    /// frame, read the trailing mirror size and seek to the start of the
    /// frame's self-describing section (the type-name header). Returns the
    /// decoded `(type_name, payload)` and leaves the reader positioned just
    /// *before* the frame's trailing size field origin, i.e. where it was.
    pub fn read_value_backward(&mut self) -> Result<(String, Vec<u8>)> {
        let end = self.inner.stream_position()?;
        if end < 8 {
            return Err(ArchiveError::EndOfStream);
        }
        self.inner.seek(SeekFrom::Start(end - 8))?;
        let size = read_i64(&mut self.inner)?;
        if size < 0 || (size as u64) + 16 > end {
            return Err(ArchiveError::Malformed(format!(
                "backward scan found size {size}"
            )));
        }
        // Seek to the type-name header mirrored by the trailing size.
        let header_start = end - 8 - size as u64;
        self.inner.seek(SeekFrom::Start(header_start))?;
        let type_name = read_str(&mut self.inner)?;
        let header = 8 + type_name.len();
        if (size as usize) < header {
            return Err(ArchiveError::Malformed(
                "backward scan: size smaller than type header".into(),
            ));
        }
        let payload_len = size as usize - header;
        let mut payload = vec![0u8; payload_len];
        self.inner.read_exact(&mut payload)?;
        // Restore: caller decides where to go next.
        self.inner.seek(SeekFrom::Start(header_start))?;
        Ok((type_name, payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn bit_layout_of_value_frame() {
        let mut w = FrameWriter::new(Cursor::new(Vec::new()));
        w.write_value("x", "i64", &7i64.to_le_bytes()).unwrap();
        let bytes = w.into_inner().into_inner();
        // size = 8 (type-name-size) + 3 (type name) + 8 (payload) = 19
        assert_eq!(&bytes[0..8], &19i64.to_le_bytes());
        assert_eq!(&bytes[8..16], &1i64.to_le_bytes()); // name size
        assert_eq!(&bytes[16..17], b"x");
        assert_eq!(&bytes[17..25], &3i64.to_le_bytes()); // type-name size
        assert_eq!(&bytes[25..28], b"i64");
        assert_eq!(&bytes[28..36], &7i64.to_le_bytes());
        assert_eq!(&bytes[36..44], &19i64.to_le_bytes()); // trailing mirror
        assert_eq!(bytes.len(), 44);
    }

    #[test]
    fn start_end_round_trip() {
        let mut w = FrameWriter::new(Cursor::new(Vec::new()));
        w.write_start("outer").unwrap();
        w.write_start("inner").unwrap();
        w.write_end().unwrap();
        w.write_end().unwrap();
        let mut r = FrameReader::new(Cursor::new(w.into_inner().into_inner()));
        assert_eq!(r.read_frame().unwrap(), Frame::Start("outer".into()));
        assert_eq!(r.read_frame().unwrap(), Frame::Start("inner".into()));
        assert_eq!(r.read_frame().unwrap(), Frame::End);
        assert_eq!(r.read_frame().unwrap(), Frame::End);
        assert!(matches!(r.read_frame(), Err(ArchiveError::EndOfStream)));
    }

    #[test]
    fn skip_lands_on_next_frame() {
        let mut w = FrameWriter::new(Cursor::new(Vec::new()));
        w.write_value("a", "bytes", &[1, 2, 3]).unwrap();
        w.write_value("b", "i64", &5i64.to_le_bytes()).unwrap();
        let mut r = FrameReader::new(Cursor::new(w.into_inner().into_inner()));
        r.skip_frame().unwrap();
        match r.read_frame().unwrap() {
            Frame::Value { name, .. } => assert_eq!(name, "b"),
            other => panic!("expected value frame, got {other:?}"),
        }
    }

    #[test]
    fn backward_scan_recovers_last_value() {
        let mut w = FrameWriter::new(Cursor::new(Vec::new()));
        w.write_value("first", "bytes", &[9; 100]).unwrap();
        w.write_value("last", "i64", &42i64.to_le_bytes()).unwrap();
        let buf = w.into_inner().into_inner();
        let len = buf.len() as u64;
        let mut r = FrameReader::new(Cursor::new(buf));
        r.seek(len).unwrap();
        let (type_name, payload) = r.read_value_backward().unwrap();
        assert_eq!(type_name, "i64");
        assert_eq!(payload, 42i64.to_le_bytes());
    }

    #[test]
    fn malformed_trailer_is_detected() {
        let mut w = FrameWriter::new(Cursor::new(Vec::new()));
        w.write_value("a", "i64", &1i64.to_le_bytes()).unwrap();
        let mut bytes = w.into_inner().into_inner();
        let n = bytes.len();
        bytes[n - 1] ^= 0xFF;
        let mut r = FrameReader::new(Cursor::new(bytes));
        assert!(matches!(r.read_frame(), Err(ArchiveError::Malformed(_))));
    }
}

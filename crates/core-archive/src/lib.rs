//! Self-describing hierarchical serialization.
//!
//! The wire format is a flat sequence of frames (all integers little-endian
//! `i64`):
//!
//! * **Start tag** — `[-1][name-size][name][-1]`, opens a named container.
//! * **End tag** — `[-2]`, closes the innermost container.
//! * **Value frame** — `[size][name-size][name][type-name-size][type-name]`
//!   `[payload][size]` where `size` counts the type-name header plus the
//!   payload, and the trailing mirror enables backward scanning.
//!
//! Readers tolerate nested start/end pairs and seek past unknown type names
//! using the frame sizes. [`ArchiveWriter`]/[`ArchiveReader`] layer a
//! position stack, save/restore snapshots for try-deserialize patterns,
//! named boolean attributes (`skip_data`) and a version string on top of the
//! raw codec. Payload encoding is dispatched through a process-wide type
//! registry so node crates can register their own payloads at startup.

mod archive;
mod dispatch;
mod error;
mod frame;

pub use archive::{ArchiveReader, ArchiveWriter, Mode, SKIP_DATA};
pub use dispatch::{DispatchRegistry, register_value_type, registry};
pub use error::{ArchiveError, Result};
pub use frame::{Frame, FrameReader, FrameWriter, END_TAG, START_TAG};

//! Uniform paged browsing over local and remote trees.
//!
//! One trait ([`FileSystemMap`]) over concrete maps: the local
//! filesystem, and an SFTP client that wraps an external helper process
//! behind a mutex-guarded line-delimited JSON channel. An asynchronous
//! search worker walks any map breadth-first, matching leaf names against
//! regex patterns and emitting incremental found-events while yielding
//! periodically so an interactive thread stays responsive.

pub mod local;
pub mod map;
pub mod search;
pub mod sftp;

pub use local::LocalMap;
pub use map::{EntryInfo, FileOpenMode, FileSystemMap, FsError, ReadWriteSeek, Result};
pub use search::{SearchEvent, SearchHandle, search};
pub use sftp::SftpMap;

//! The map contract.

use serde::{Deserialize, Serialize};
use std::io::{Read, Seek, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, FsError>;

#[derive(Debug, Error)]
pub enum FsError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("path not found: {0}")]
    NotFound(PathBuf),
    #[error("helper process unavailable: {0}")]
    HelperUnavailable(String),
    #[error("helper protocol error: {0}")]
    Protocol(String),
    #[error("operation not supported by this map: {0}")]
    Unsupported(&'static str),
}

/// One tree entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryInfo {
    pub path: PathBuf,
    pub is_dir: bool,
    pub size: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileOpenMode {
    Read,
    Write,
    Append,
}

/// Byte-stream contract of opened entries.
pub trait ReadWriteSeek: Read + Write + Seek + Send {}
impl<T: Read + Write + Seek + Send> ReadWriteSeek for T {}

/// Uniform tree traversal + byte access.
pub trait FileSystemMap: Send + Sync {
    /// Top-level entry points of the tree.
    fn roots(&self) -> Vec<PathBuf>;

    fn exists(&self, path: &Path) -> bool;

    /// Children of `path`; `recursive` walks the whole subtree
    /// (breadth-first order).
    fn list(&self, path: &Path, recursive: bool) -> Result<Vec<EntryInfo>>;

    fn create_dir(&self, path: &Path) -> Result<()>;

    fn remove(&self, path: &Path) -> Result<()>;

    fn rename(&self, from: &Path, to: &Path) -> Result<()>;

    fn copy(&self, from: &Path, to: &Path) -> Result<()>;

    fn open(&self, path: &Path, mode: FileOpenMode) -> Result<Box<dyn ReadWriteSeek>>;
}

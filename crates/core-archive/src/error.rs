//! Archive error taxonomy.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ArchiveError>;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("archive is in {found} mode, operation requires {required}")]
    WrongMode {
        required: &'static str,
        found: &'static str,
    },
    #[error("unexpected end of stream")]
    EndOfStream,
    #[error("malformed frame: {0}")]
    Malformed(String),
    #[error("expected frame named {expected:?}, found {found:?}")]
    NameMismatch { expected: String, found: String },
    #[error("no serializer registered for type {0:?}")]
    UnknownType(String),
    #[error("payload of type {found:?} cannot be decoded as {expected:?}")]
    TypeMismatch {
        expected: &'static str,
        found: String,
    },
    #[error("end tag without matching start")]
    UnbalancedEnd,
    #[error("string is not valid UTF-8")]
    BadString,
}

impl ArchiveError {
    /// Numeric code surfaced through the archive error channel; stable
    /// enough for UI filtering, not meant for persistence.
    pub fn code(&self) -> i32 {
        match self {
            ArchiveError::Io(_) => 1,
            ArchiveError::WrongMode { .. } => 2,
            ArchiveError::EndOfStream => 3,
            ArchiveError::Malformed(_) => 4,
            ArchiveError::NameMismatch { .. } => 5,
            ArchiveError::UnknownType(_) => 6,
            ArchiveError::TypeMismatch { .. } => 7,
            ArchiveError::UnbalancedEnd => 8,
            ArchiveError::BadString => 9,
        }
    }
}

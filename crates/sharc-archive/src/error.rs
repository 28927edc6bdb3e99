use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("cannot open archive {}: {source}", path.display())]
    Open { path: PathBuf, source: std::io::Error },

    #[error("invalid archive magic: expected {expected}, got {actual}")]
    InvalidMagic { expected: String, actual: String },

    #[error("unsupported archive version: {0}")]
    UnsupportedVersion(u32),

    #[error("archive checksum mismatch")]
    ChecksumMismatch,

    #[error("corrupt archive at offset {offset}: {reason}")]
    Corrupt { offset: u64, reason: String },

    #[error("corrupt record {name} at offset {offset}: {reason}")]
    CorruptRecord { name: String, offset: u64, reason: String },

    #[error("duplicate record name: {0}")]
    DuplicateRecord(String),

    #[error("invalid module name {text:?}: {reason}")]
    InvalidName { text: String, reason: String },

    #[error("name list not found at {}", path.display())]
    NameListMissing { path: PathBuf },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ArchiveResult<T> = Result<T, ArchiveError>;

use sharc_archive::ArchiveError;
use sharc_codec::CodecError;
use sharc_object::ObjectError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("invalid configuration: {reason}")]
    Config { reason: String },

    #[error("module {0} is not importable")]
    UnknownModule(String),

    #[error("cannot compile {name}: {reason}")]
    Compile { name: String, reason: String },

    /// A module's serialized form changed between two imports within one
    /// build, so the archive would not match what a process observes.
    #[error("{name} is re-imported")]
    ReimportConflict { name: String },

    #[error("module {0} is already installed")]
    AlreadyInstalled(String),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Object(#[from] ObjectError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;

use thiserror::Error;

use sharc_object::{ObjectError, ObjectKind};

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("cannot serialize live {kind} object")]
    Unsupported { kind: ObjectKind },

    #[error("object nesting exceeds depth limit {limit}")]
    DepthExceeded { limit: usize },

    #[error("corrupt object stream at byte {offset}: {reason}")]
    Corrupt { offset: usize, reason: String },

    #[error(transparent)]
    Object(#[from] ObjectError),
}

pub type CodecResult<T> = Result<T, CodecError>;

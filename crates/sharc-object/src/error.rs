use thiserror::Error;

use crate::node::{ObjectKind, ObjectRef};

#[derive(Debug, Error)]
pub enum ObjectError {
    #[error("unknown object reference {reference} (heap holds {len} nodes)")]
    UnknownRef { reference: ObjectRef, len: usize },

    #[error("expected {expected} node, found {actual}")]
    KindMismatch { expected: ObjectKind, actual: ObjectKind },

    #[error("reference {reference} points at a reserved slot")]
    ReservedRef { reference: ObjectRef },

    #[error("slot {reference} is not reserved and cannot be filled")]
    SlotOccupied { reference: ObjectRef },

    #[error("non-canonical int encoding: {reason}")]
    NonCanonicalInt { reason: String },

    #[error("invalid int literal: {text:?}")]
    InvalidInt { text: String },

    #[error("invalid hash seed: {text:?} (expected \"random\" or an unsigned integer)")]
    InvalidSeed { text: String },

    #[error("value nesting exceeds hash depth limit {limit}")]
    HashDepthExceeded { limit: usize },
}

pub type ObjectResult<T> = Result<T, ObjectError>;

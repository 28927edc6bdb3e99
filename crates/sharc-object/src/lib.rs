//! Host object model for sharc.
//!
//! This crate provides the in-memory representation of the object graphs
//! that sharc serializes: an arena heap of immutable nodes addressed by
//! plain integer references, so a graph can be rebuilt in another process
//! without address translation.
//!
//! # Key Types
//!
//! - [`ObjectHeap`] — Arena of immutable object nodes
//! - [`ObjectRef`] — Index of a node within a heap
//! - [`ObjectNode`] — A single value: scalar, container, or code object
//! - [`CodeObject`] — Compiled module code with pooled constants and names
//! - [`HashSeed`] / [`HashSeedPolicy`] — Seeded value hashing, the input to
//!   frozen-set iteration order

pub mod error;
pub mod hash;
pub mod heap;
pub mod node;
pub mod repr;

pub use error::{ObjectError, ObjectResult};
pub use hash::{HashSeed, HashSeedPolicy};
pub use heap::ObjectHeap;
pub use node::{CodeObject, FunctionObject, IntValue, ObjectKind, ObjectNode, ObjectRef};
pub use repr::repr;

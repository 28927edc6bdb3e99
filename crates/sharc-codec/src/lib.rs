//! Wire codec for sharc object graphs.
//!
//! A graph serializes as a pre-order walk of tagged nodes. Every node is
//! assigned a stream index as it is first written; later occurrences of the
//! same node write a back reference to that index instead, so shared
//! substructure and cycles survive the trip. Decoding is a single forward
//! pass that rebuilds the graph in a fresh [`sharc_object::ObjectHeap`]
//! and treats any malformed input as corruption, never as a crash.

pub mod decode;
pub mod encode;
pub mod error;
pub mod wire;

pub use decode::decode;
pub use encode::{encode, encode_with, EncodeOptions, Encoded, SetLayout};
pub use error::{CodecError, CodecResult};

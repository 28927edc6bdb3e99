use std::collections::HashMap;
use std::str::FromStr;

use sharc_object::{HashSeed, ObjectHeap, ObjectKind, ObjectNode, ObjectRef};

use crate::error::{CodecError, CodecResult};
use crate::wire::{self, write_varint};

/// Nesting allowed while walking a graph. Deeper input is refused rather
/// than risking the stack; cycles never get this far because back
/// references cut them off.
pub(crate) const MAX_DEPTH: usize = 1000;

/// How frozen sets are laid out on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SetLayout {
    /// Degrade each frozen set to a tuple of its elements in a
    /// seed-independent canonical order. The bytes are reproducible across
    /// processes regardless of hash seeds; the decoded value is a tuple.
    Canonical,
    /// Keep frozen sets as sets, laid out in seeded iteration order. The
    /// decoded value is a faithful frozen set, but the bytes depend on the
    /// hash seed in effect at encode time.
    Literal,
}

impl Default for SetLayout {
    fn default() -> Self {
        Self::Canonical
    }
}

impl FromStr for SetLayout {
    type Err = String;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        match text {
            "canonical" => Ok(Self::Canonical),
            "literal" => Ok(Self::Literal),
            other => Err(format!("unknown set layout {other:?}")),
        }
    }
}

impl std::fmt::Display for SetLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Canonical => write!(f, "canonical"),
            Self::Literal => write!(f, "literal"),
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct EncodeOptions {
    pub set_layout: SetLayout,
    /// Seed driving literal set order. Ignored under canonical layout.
    pub seed: HashSeed,
}

/// A serialized object graph plus facts the archive layer records with it.
#[derive(Clone, Debug)]
pub struct Encoded {
    pub bytes: Vec<u8>,
    /// Nodes written (back references excluded).
    pub node_count: u32,
    /// True when the byte layout depends on the hash seed, which happens
    /// once a literal frozen set with two or more elements is written.
    pub seed_sensitive: bool,
}

/// Serialize the graph rooted at `root` with default options.
pub fn encode(heap: &ObjectHeap, root: ObjectRef) -> CodecResult<Encoded> {
    encode_with(heap, root, &EncodeOptions::default())
}

/// Serialize the graph rooted at `root`.
pub fn encode_with(
    heap: &ObjectHeap,
    root: ObjectRef,
    options: &EncodeOptions,
) -> CodecResult<Encoded> {
    let mut encoder = Encoder {
        heap,
        options: *options,
        out: Vec::new(),
        indices: HashMap::new(),
        seed_sensitive: false,
    };
    encoder.emit(root, 0)?;
    Ok(Encoded {
        bytes: encoder.out,
        node_count: encoder.indices.len() as u32,
        seed_sensitive: encoder.seed_sensitive,
    })
}

struct Encoder<'h> {
    heap: &'h ObjectHeap,
    options: EncodeOptions,
    out: Vec<u8>,
    /// Stream index of every node written so far. A node found here is
    /// written as a back reference, which is what preserves sharing and
    /// terminates cycles.
    indices: HashMap<ObjectRef, u32>,
    seed_sensitive: bool,
}

impl Encoder<'_> {
    fn emit(&mut self, r: ObjectRef, depth: usize) -> CodecResult<()> {
        if depth > MAX_DEPTH {
            return Err(CodecError::DepthExceeded { limit: MAX_DEPTH });
        }
        if let Some(&index) = self.indices.get(&r) {
            self.out.push(wire::TAG_REF);
            write_varint(&mut self.out, index as u64);
            return Ok(());
        }

        let node = self.heap.node(r)?;

        // The index is assigned before children are written, so a child
        // that points back at this node resolves to an index that already
        // exists in the stream.
        self.assign(r);

        match node {
            ObjectNode::Function(_) => {
                return Err(CodecError::Unsupported { kind: ObjectKind::Function });
            }
            ObjectNode::None => self.out.push(wire::TAG_NONE),
            ObjectNode::Bool(false) => self.out.push(wire::TAG_FALSE),
            ObjectNode::Bool(true) => self.out.push(wire::TAG_TRUE),
            ObjectNode::Int(v) => {
                self.out.push(wire::TAG_INT);
                self.out.push(v.is_negative() as u8);
                write_varint(&mut self.out, v.digits().len() as u64);
                for digit in v.digits() {
                    self.out.extend_from_slice(&digit.to_le_bytes());
                }
            }
            ObjectNode::Float(v) => {
                self.out.push(wire::TAG_FLOAT);
                self.out.extend_from_slice(&v.to_le_bytes());
            }
            ObjectNode::Bytes(v) => {
                self.out.push(wire::TAG_BYTES);
                write_varint(&mut self.out, v.len() as u64);
                self.out.extend_from_slice(v);
            }
            ObjectNode::Str(v) => {
                self.out.push(wire::TAG_STR);
                write_varint(&mut self.out, v.len() as u64);
                self.out.extend_from_slice(v.as_bytes());
            }
            ObjectNode::Tuple(items) => {
                self.out.push(wire::TAG_TUPLE);
                write_varint(&mut self.out, items.len() as u64);
                for &item in items {
                    self.emit(item, depth + 1)?;
                }
            }
            ObjectNode::FrozenSet(elements) => match self.options.set_layout {
                SetLayout::Canonical => {
                    let ordered = self.heap.canonical_order(elements)?;
                    self.out.push(wire::TAG_TUPLE);
                    write_varint(&mut self.out, ordered.len() as u64);
                    for element in ordered {
                        self.emit(element, depth + 1)?;
                    }
                }
                SetLayout::Literal => {
                    if elements.len() >= 2 {
                        self.seed_sensitive = true;
                    }
                    let ordered = self.heap.seeded_order(elements, self.options.seed)?;
                    self.out.push(wire::TAG_FROZENSET);
                    write_varint(&mut self.out, ordered.len() as u64);
                    for element in ordered {
                        self.emit(element, depth + 1)?;
                    }
                }
            },
            ObjectNode::Code(code) => {
                self.out.push(wire::TAG_CODE);
                for scalar in code.scalars() {
                    write_varint(&mut self.out, scalar as u64);
                }
                for pool in code.pool_refs() {
                    self.emit(pool, depth + 1)?;
                }
            }
        }
        Ok(())
    }

    fn assign(&mut self, r: ObjectRef) {
        let index = self.indices.len() as u32;
        self.indices.insert(r, index);
    }
}

use sharc_object::{CodeObject, IntValue, ObjectHeap, ObjectNode, ObjectRef};

use crate::encode::MAX_DEPTH;
use crate::error::{CodecError, CodecResult};
use crate::wire::{self, ByteReader};

/// Rebuild an object graph from `bytes` into `heap`, returning the root.
///
/// The input is treated as untrusted: unknown tags, truncation, references
/// to nodes that do not exist yet, oversized length prefixes, invalid
/// UTF-8, and non-canonical integers all fail with
/// [`CodecError::Corrupt`]. The whole input must be consumed; trailing
/// bytes are corruption too.
pub fn decode(bytes: &[u8], heap: &mut ObjectHeap) -> CodecResult<ObjectRef> {
    let mut reader = ByteReader::new(bytes);
    let mut nodes: Vec<ObjectRef> = Vec::new();
    let root = read_node(&mut reader, heap, &mut nodes, 0)?;
    if reader.remaining() > 0 {
        return Err(corrupt(
            reader.pos(),
            format!("{} trailing bytes after root node", reader.remaining()),
        ));
    }
    Ok(root)
}

fn read_node(
    reader: &mut ByteReader<'_>,
    heap: &mut ObjectHeap,
    nodes: &mut Vec<ObjectRef>,
    depth: usize,
) -> CodecResult<ObjectRef> {
    if depth > MAX_DEPTH {
        return Err(corrupt(
            reader.pos(),
            format!("nesting exceeds depth limit {MAX_DEPTH}"),
        ));
    }
    let start = reader.pos();
    let tag = reader.read_u8()?;
    match tag {
        wire::TAG_NONE => Ok(push_existing(nodes, heap.none())),
        wire::TAG_FALSE => Ok(push_existing(nodes, heap.bool_ref(false))),
        wire::TAG_TRUE => Ok(push_existing(nodes, heap.bool_ref(true))),

        wire::TAG_INT => {
            let sign = reader.read_u8()?;
            if sign > 1 {
                return Err(corrupt(start, format!("invalid int sign byte {sign:#04x}")));
            }
            let count = reader.read_varint()?;
            if count > reader.remaining() as u64 / 4 {
                return Err(corrupt(
                    start,
                    format!("int digit count {count} exceeds remaining input"),
                ));
            }
            let raw = reader.read_bytes(count as usize * 4)?;
            let mut digits = Vec::with_capacity(count as usize);
            for chunk in raw.chunks_exact(4) {
                let mut four = [0u8; 4];
                four.copy_from_slice(chunk);
                digits.push(u32::from_le_bytes(four));
            }
            let value = IntValue::from_parts(sign == 1, digits)
                .map_err(|e| corrupt(start, e.to_string()))?;
            Ok(push_new(heap, nodes, ObjectNode::Int(value)))
        }

        wire::TAG_FLOAT => {
            let raw = reader.read_bytes(8)?;
            let mut eight = [0u8; 8];
            eight.copy_from_slice(raw);
            Ok(push_new(heap, nodes, ObjectNode::Float(f64::from_le_bytes(eight))))
        }

        wire::TAG_BYTES => {
            let len = read_len(reader)?;
            let raw = reader.read_bytes(len)?;
            Ok(push_new(heap, nodes, ObjectNode::Bytes(raw.to_vec())))
        }

        wire::TAG_STR => {
            let len = read_len(reader)?;
            let raw = reader.read_bytes(len)?;
            let text = std::str::from_utf8(raw)
                .map_err(|_| corrupt(start, "invalid UTF-8 in string node".into()))?;
            Ok(push_new(heap, nodes, ObjectNode::Str(text.to_string())))
        }

        wire::TAG_TUPLE => {
            let count = read_count(reader, start, "tuple")?;
            let r = reserve(heap, nodes);
            let mut items = Vec::with_capacity(count);
            for _ in 0..count {
                items.push(read_node(reader, heap, nodes, depth + 1)?);
            }
            heap.fill(r, ObjectNode::Tuple(items))?;
            Ok(r)
        }

        wire::TAG_FROZENSET => {
            let count = read_count(reader, start, "frozen set")?;
            let r = reserve(heap, nodes);
            let mut elements = Vec::with_capacity(count);
            for _ in 0..count {
                elements.push(read_node(reader, heap, nodes, depth + 1)?);
            }
            for (i, &a) in elements.iter().enumerate() {
                for &b in &elements[..i] {
                    let equal = heap
                        .structural_equal(a, b)
                        .map_err(|e| corrupt(start, format!("unresolvable frozen set element: {e}")))?;
                    if equal {
                        return Err(corrupt(start, "duplicate frozen set element".into()));
                    }
                }
            }
            heap.fill(r, ObjectNode::FrozenSet(elements))?;
            Ok(r)
        }

        wire::TAG_CODE => {
            let r = reserve(heap, nodes);
            let mut scalars = [0u32; 7];
            for scalar in scalars.iter_mut() {
                *scalar = reader.read_u32_varint()?;
            }
            let mut pool = Vec::with_capacity(11);
            for _ in 0..11 {
                pool.push(read_node(reader, heap, nodes, depth + 1)?);
            }
            heap.fill(
                r,
                ObjectNode::Code(CodeObject {
                    name: pool[0],
                    qualname: pool[1],
                    filename: pool[2],
                    arg_count: scalars[0],
                    posonly_arg_count: scalars[1],
                    kwonly_arg_count: scalars[2],
                    local_count: scalars[3],
                    stack_size: scalars[4],
                    flags: scalars[5],
                    first_line: scalars[6],
                    consts: pool[3],
                    names: pool[4],
                    varnames: pool[5],
                    freevars: pool[6],
                    cellvars: pool[7],
                    instructions: pool[8],
                    line_table: pool[9],
                    exception_table: pool[10],
                }),
            )?;
            Ok(r)
        }

        wire::TAG_REF => {
            let index = reader.read_varint()?;
            match nodes.get(index as usize) {
                Some(&r) => Ok(r),
                None => Err(corrupt(
                    start,
                    format!("reference to node {index} not yet defined ({} so far)", nodes.len()),
                )),
            }
        }

        other => Err(corrupt(start, format!("unknown node tag {other:#04x}"))),
    }
}

fn corrupt(offset: usize, reason: String) -> CodecError {
    CodecError::Corrupt { offset, reason }
}

fn read_len(reader: &mut ByteReader<'_>) -> CodecResult<usize> {
    let start = reader.pos();
    let len = reader.read_varint()?;
    usize::try_from(len).map_err(|_| corrupt(start, format!("length {len} out of range")))
}

/// Container counts cost at least one byte per child, so any count above
/// the remaining input is rejected before allocating.
fn read_count(reader: &mut ByteReader<'_>, start: usize, what: &str) -> CodecResult<usize> {
    let count = reader.read_varint()?;
    if count > reader.remaining() as u64 {
        return Err(corrupt(
            start,
            format!("{what} length {count} exceeds remaining input"),
        ));
    }
    Ok(count as usize)
}

fn push_existing(nodes: &mut Vec<ObjectRef>, r: ObjectRef) -> ObjectRef {
    nodes.push(r);
    r
}

fn push_new(heap: &mut ObjectHeap, nodes: &mut Vec<ObjectRef>, node: ObjectNode) -> ObjectRef {
    let r = heap.alloc(node);
    nodes.push(r);
    r
}

fn reserve(heap: &mut ObjectHeap, nodes: &mut Vec<ObjectRef>) -> ObjectRef {
    let r = heap.reserve();
    nodes.push(r);
    r
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::{encode, encode_with, EncodeOptions, SetLayout};
    use proptest::prelude::*;
    use sharc_object::{repr, HashSeed, ObjectKind};

    fn sample_graph(heap: &mut ObjectHeap) -> ObjectRef {
        let big = IntValue::from_decimal("123456789123456789123456789").unwrap();
        let parts = vec![
            heap.none(),
            heap.bool_ref(true),
            heap.alloc_int(-7),
            heap.alloc(ObjectNode::Int(big)),
            heap.alloc_float(2.5),
            heap.alloc_str("héllo"),
            heap.alloc_bytes(b"\x00\x01raw"),
        ];
        let inner = heap.alloc_tuple(parts).unwrap();
        heap.alloc_tuple(vec![inner, inner]).unwrap()
    }

    #[test]
    fn roundtrip_preserves_values() {
        let mut heap = ObjectHeap::new();
        let root = sample_graph(&mut heap);
        let encoded = encode(&heap, root).unwrap();
        let decoded = decode(&encoded.bytes, &mut heap).unwrap();
        assert_ne!(root, decoded);
        assert!(heap.structural_equal(root, decoded).unwrap());
        assert_eq!(repr(&heap, root).unwrap(), repr(&heap, decoded).unwrap());
    }

    #[test]
    fn roundtrip_into_fresh_heap() {
        let mut heap = ObjectHeap::new();
        let root = sample_graph(&mut heap);
        let encoded = encode(&heap, root).unwrap();

        let mut fresh = ObjectHeap::new();
        let decoded = decode(&encoded.bytes, &mut fresh).unwrap();
        assert_eq!(repr(&heap, root).unwrap(), repr(&fresh, decoded).unwrap());
    }

    #[test]
    fn identity_sharing_is_restored() {
        let mut heap = ObjectHeap::new();
        let s = heap.alloc_str("once");
        let pair = heap.alloc_tuple(vec![s, s]).unwrap();
        let encoded = encode(&heap, pair).unwrap();

        let mut fresh = ObjectHeap::new();
        let decoded = decode(&encoded.bytes, &mut fresh).unwrap();
        let items = fresh.tuple_items(decoded).unwrap();
        assert_eq!(items[0], items[1], "shared node must decode to one identity");
    }

    #[test]
    fn cycle_roundtrip() {
        let mut heap = ObjectHeap::new();
        let one = heap.alloc_int(1);
        let t = heap.reserve();
        heap.fill(t, ObjectNode::Tuple(vec![one, t])).unwrap();
        let encoded = encode(&heap, t).unwrap();

        let mut fresh = ObjectHeap::new();
        let decoded = decode(&encoded.bytes, &mut fresh).unwrap();
        let items = fresh.tuple_items(decoded).unwrap();
        assert_eq!(items[1], decoded, "cycle must close on the decoded root");
    }

    #[test]
    fn deep_nesting_roundtrip() {
        let mut heap = ObjectHeap::new();
        let mut current = heap.alloc_int(99);
        for _ in 0..150 {
            current = heap.alloc_tuple(vec![current]).unwrap();
        }
        let encoded = encode(&heap, current).unwrap();
        let mut fresh = ObjectHeap::new();
        let decoded = decode(&encoded.bytes, &mut fresh).unwrap();
        assert_eq!(repr(&heap, current).unwrap(), repr(&fresh, decoded).unwrap());
    }

    #[test]
    fn literal_set_roundtrip_is_a_real_set() {
        let mut heap = ObjectHeap::new();
        let elements = vec![heap.alloc_int(3), heap.alloc_int(1), heap.alloc_int(2)];
        let set = heap.alloc_frozen_set(elements).unwrap();
        let options = EncodeOptions { set_layout: SetLayout::Literal, seed: HashSeed::new(42) };
        let encoded = encode_with(&heap, set, &options).unwrap();

        let decoded = decode(&encoded.bytes, &mut heap).unwrap();
        assert_eq!(heap.kind(decoded).unwrap(), ObjectKind::FrozenSet);
        assert!(heap.structural_equal(set, decoded).unwrap());
    }

    #[test]
    fn canonical_set_degrades_to_tuple() {
        let mut heap = ObjectHeap::new();
        let elements = vec![heap.alloc_int(3), heap.alloc_int(1), heap.alloc_int(2)];
        let set = heap.alloc_frozen_set(elements).unwrap();
        let encoded = encode(&heap, set).unwrap();

        let decoded = decode(&encoded.bytes, &mut heap).unwrap();
        assert_eq!(heap.kind(decoded).unwrap(), ObjectKind::Tuple);
        assert_eq!(heap.tuple_items(decoded).unwrap().len(), 3);
    }

    #[test]
    fn code_roundtrip() {
        let mut heap = ObjectHeap::new();
        let name = heap.alloc_str("mod");
        let filename = heap.alloc_str("src/mod.x");
        let one = heap.alloc_int(1);
        let consts = heap.alloc_tuple(vec![one, heap.none()]).unwrap();
        let empty = heap.alloc_tuple(vec![]).unwrap();
        let instructions = heap.alloc_bytes(&[1, 0, 2, 1, 0]);
        let tables = heap.alloc_bytes(&[]);
        let code = heap.alloc(ObjectNode::Code(CodeObject {
            name,
            qualname: name,
            filename,
            arg_count: 2,
            posonly_arg_count: 0,
            kwonly_arg_count: 1,
            local_count: 3,
            stack_size: 8,
            flags: 0x40,
            first_line: 10,
            consts,
            names: empty,
            varnames: empty,
            freevars: empty,
            cellvars: empty,
            instructions,
            line_table: tables,
            exception_table: tables,
        }));

        let encoded = encode(&heap, code).unwrap();
        let mut fresh = ObjectHeap::new();
        let decoded = decode(&encoded.bytes, &mut fresh).unwrap();
        let rebuilt = match fresh.node(decoded).unwrap() {
            ObjectNode::Code(c) => c.clone(),
            other => panic!("expected code, got {:?}", other.kind()),
        };
        assert_eq!(rebuilt.scalars(), [2, 0, 1, 3, 8, 0x40, 10]);
        assert_eq!(rebuilt.name, rebuilt.qualname, "shared name keeps one identity");
        assert_eq!(fresh.str_value(rebuilt.filename).unwrap(), "src/mod.x");
        assert_eq!(fresh.bytes_value(rebuilt.instructions).unwrap(), &[1, 0, 2, 1, 0]);
    }

    // ---- corruption ----

    #[test]
    fn every_truncation_of_valid_input_fails() {
        let mut heap = ObjectHeap::new();
        let root = sample_graph(&mut heap);
        let encoded = encode(&heap, root).unwrap();
        for cut in 0..encoded.bytes.len() {
            let mut scratch = ObjectHeap::new();
            assert!(
                decode(&encoded.bytes[..cut], &mut scratch).is_err(),
                "prefix of {cut} bytes decoded successfully"
            );
        }
    }

    #[test]
    fn trailing_bytes_fail() {
        let mut heap = ObjectHeap::new();
        let one = heap.alloc_int(1);
        let mut bytes = encode(&heap, one).unwrap().bytes;
        bytes.push(0x00);
        let err = decode(&bytes, &mut heap).unwrap_err();
        assert!(matches!(err, CodecError::Corrupt { .. }));
    }

    #[test]
    fn unknown_tag_fails() {
        let mut heap = ObjectHeap::new();
        for bad in [0x00u8, 0x0C, 0xFF] {
            let err = decode(&[bad], &mut heap).unwrap_err();
            assert!(matches!(err, CodecError::Corrupt { .. }), "tag {bad:#04x}");
        }
    }

    #[test]
    fn forward_reference_fails() {
        let mut heap = ObjectHeap::new();
        assert!(decode(&[wire::TAG_REF, 0], &mut heap).is_err());
        assert!(decode(&[wire::TAG_TUPLE, 1, wire::TAG_REF, 1], &mut heap).is_err());
    }

    #[test]
    fn self_reference_inside_container_is_legal() {
        let mut heap = ObjectHeap::new();
        let decoded = decode(&[wire::TAG_TUPLE, 1, wire::TAG_REF, 0], &mut heap).unwrap();
        let items = heap.tuple_items(decoded).unwrap();
        assert_eq!(items[0], decoded);
    }

    #[test]
    fn invalid_utf8_fails() {
        let mut heap = ObjectHeap::new();
        let err = decode(&[wire::TAG_STR, 2, 0xFF, 0xFE], &mut heap).unwrap_err();
        assert!(matches!(err, CodecError::Corrupt { .. }));
    }

    #[test]
    fn non_canonical_ints_fail() {
        let mut heap = ObjectHeap::new();
        // trailing zero digit
        let trailing = [wire::TAG_INT, 0, 2, 7, 0, 0, 0, 0, 0, 0, 0];
        assert!(decode(&trailing, &mut heap).is_err());
        // negative zero
        assert!(decode(&[wire::TAG_INT, 1, 0], &mut heap).is_err());
        // sign byte out of range
        assert!(decode(&[wire::TAG_INT, 2, 0], &mut heap).is_err());
    }

    #[test]
    fn oversized_length_prefix_fails_fast() {
        let mut heap = ObjectHeap::new();
        // bytes node claiming ~2^34 content with 0 bytes present
        let bytes = [wire::TAG_BYTES, 0x80, 0x80, 0x80, 0x80, 0x40];
        assert!(decode(&bytes, &mut heap).is_err());

        let tuple = [wire::TAG_TUPLE, 0x80, 0x80, 0x80, 0x80, 0x40];
        assert!(decode(&tuple, &mut heap).is_err());
    }

    #[test]
    fn duplicate_set_elements_fail() {
        let mut heap = ObjectHeap::new();
        let bytes = [
            wire::TAG_FROZENSET,
            2,
            wire::TAG_INT,
            0,
            1,
            5,
            0,
            0,
            0,
            wire::TAG_INT,
            0,
            1,
            5,
            0,
            0,
            0,
        ];
        let err = decode(&bytes, &mut heap).unwrap_err();
        assert!(matches!(err, CodecError::Corrupt { .. }));
    }

    #[test]
    fn corrupt_input_never_poisons_later_decodes() {
        let mut heap = ObjectHeap::new();
        assert!(decode(&[wire::TAG_TUPLE, 2, wire::TAG_NONE, 0xFF], &mut heap).is_err());
        let one = heap.alloc_int(1);
        let encoded = encode(&heap, one).unwrap();
        let decoded = decode(&encoded.bytes, &mut heap).unwrap();
        assert!(heap.structural_equal(one, decoded).unwrap());
    }

    proptest! {
        #[test]
        fn decoder_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..256)) {
            let mut heap = ObjectHeap::new();
            let _ = decode(&bytes, &mut heap);
        }
    }
}

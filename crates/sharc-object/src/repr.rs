use std::collections::HashSet;

use crate::error::ObjectResult;
use crate::heap::ObjectHeap;
use crate::node::{ObjectNode, ObjectRef};

/// Render a printable form of the value behind `r`.
///
/// The output is deterministic for a given graph: scalars render by value,
/// containers in stored order, and a reference back into the current path
/// renders as `...` so cyclic graphs terminate.
pub fn repr(heap: &ObjectHeap, r: ObjectRef) -> ObjectResult<String> {
    let mut out = String::new();
    let mut path = HashSet::new();
    write_node(heap, r, &mut out, &mut path)?;
    Ok(out)
}

fn write_node(
    heap: &ObjectHeap,
    r: ObjectRef,
    out: &mut String,
    path: &mut HashSet<ObjectRef>,
) -> ObjectResult<()> {
    match heap.node(r)? {
        ObjectNode::None => out.push_str("None"),
        ObjectNode::Bool(true) => out.push_str("True"),
        ObjectNode::Bool(false) => out.push_str("False"),
        ObjectNode::Int(v) => out.push_str(&v.to_decimal()),
        ObjectNode::Float(v) => out.push_str(&format!("{v:?}")),
        ObjectNode::Str(v) => write_str(v, out),
        ObjectNode::Bytes(v) => write_bytes(v, out),
        ObjectNode::Tuple(items) => {
            if !path.insert(r) {
                out.push_str("...");
                return Ok(());
            }
            out.push('(');
            for (i, &item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_node(heap, item, out, path)?;
            }
            if items.len() == 1 {
                out.push(',');
            }
            out.push(')');
            path.remove(&r);
        }
        ObjectNode::FrozenSet(elements) => {
            if !path.insert(r) {
                out.push_str("...");
                return Ok(());
            }
            if elements.is_empty() {
                out.push_str("frozenset()");
            } else {
                out.push_str("frozenset({");
                for (i, &element) in elements.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    write_node(heap, element, out, path)?;
                }
                out.push_str("})");
            }
            path.remove(&r);
        }
        ObjectNode::Code(code) => {
            out.push_str("<code object ");
            out.push_str(heap.str_value(code.name)?);
            out.push('>');
        }
        ObjectNode::Function(function) => {
            let code = heap.node(function.code)?;
            match code.as_code() {
                Some(c) => {
                    out.push_str("<function ");
                    out.push_str(heap.str_value(c.name)?);
                    out.push('>');
                }
                None => out.push_str("<function>"),
            }
        }
    }
    Ok(())
}

fn write_str(value: &str, out: &mut String) {
    out.push('\'');
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\x{:02x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('\'');
}

fn write_bytes(value: &[u8], out: &mut String) {
    out.push_str("b'");
    for &byte in value {
        match byte {
            b'\\' => out.push_str("\\\\"),
            b'\'' => out.push_str("\\'"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            0x20..=0x7e => out.push(byte as char),
            _ => out.push_str(&format!("\\x{byte:02x}")),
        }
    }
    out.push('\'');
}

//! Byte-level primitives shared by the object stream and the archive
//! container format. All multi-byte integers are little endian; lengths
//! and counts are LEB128-style varints.

use crate::error::{CodecError, CodecResult};

// Node tags. 0x00 is deliberately unassigned so zeroed storage reads as
// corruption.
pub const TAG_NONE: u8 = 0x01;
pub const TAG_FALSE: u8 = 0x02;
pub const TAG_TRUE: u8 = 0x03;
pub const TAG_INT: u8 = 0x04;
pub const TAG_FLOAT: u8 = 0x05;
pub const TAG_BYTES: u8 = 0x06;
pub const TAG_STR: u8 = 0x07;
pub const TAG_TUPLE: u8 = 0x08;
pub const TAG_FROZENSET: u8 = 0x09;
pub const TAG_CODE: u8 = 0x0A;
pub const TAG_REF: u8 = 0x0B;

/// Append a u64 as a variable-length integer, 7 bits per byte.
pub fn write_varint(buf: &mut Vec<u8>, mut value: u64) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
        if value > 0 {
            byte |= 0x80;
        }
        buf.push(byte);
        if value == 0 {
            break;
        }
    }
}

/// Forward-only reader over a byte slice. Every failure carries the
/// absolute offset it happened at.
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn read_u8(&mut self) -> CodecResult<u8> {
        let byte = *self.data.get(self.pos).ok_or_else(|| CodecError::Corrupt {
            offset: self.pos,
            reason: "unexpected end of input".into(),
        })?;
        self.pos += 1;
        Ok(byte)
    }

    /// Read exactly `len` bytes, failing before any oversized allocation
    /// when a length prefix claims more than the input holds.
    pub fn read_bytes(&mut self, len: usize) -> CodecResult<&'a [u8]> {
        if len > self.remaining() {
            return Err(CodecError::Corrupt {
                offset: self.pos,
                reason: format!("length {len} exceeds remaining input {}", self.remaining()),
            });
        }
        let out = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(out)
    }

    pub fn read_varint(&mut self) -> CodecResult<u64> {
        let start = self.pos;
        let mut value: u64 = 0;
        let mut shift = 0;
        loop {
            let byte = match self.data.get(self.pos) {
                Some(&b) => b,
                None => {
                    return Err(CodecError::Corrupt {
                        offset: start,
                        reason: "truncated varint".into(),
                    })
                }
            };
            self.pos += 1;
            value |= ((byte & 0x7F) as u64) << shift;
            shift += 7;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
            if shift >= 64 {
                return Err(CodecError::Corrupt {
                    offset: start,
                    reason: "varint overflow".into(),
                });
            }
        }
    }

    pub fn read_u32_varint(&mut self) -> CodecResult<u32> {
        let start = self.pos;
        let value = self.read_varint()?;
        u32::try_from(value).map_err(|_| CodecError::Corrupt {
            offset: start,
            reason: format!("value {value} exceeds u32 range"),
        })
    }
}

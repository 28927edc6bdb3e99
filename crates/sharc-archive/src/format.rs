//! Archive file layout.
//!
//! ```text
//! [header]
//!   magic             4 bytes   "SHRC"
//!   version           u32 LE
//!   record count      u32 LE
//!   seed policy       u8        0 fixed, 1 random
//!   seed              u64 LE    resolved seed the archive was built under
//!   set layout        u8        0 canonical, 1 literal
//!   index length      u64 LE    byte length of the index region
//!   records checksum  32 bytes  BLAKE3 of the records region
//! [index]   record-count entries, sorted by name
//!   name              varint length + UTF-8
//!   kind              u8
//!   flags             u8        bit 0: seed sensitive
//!   depends on        varint count, then names as above
//!   offset            u64 LE    relative to the start of the records region
//!   length            u64 LE
//!   crc32             u32 LE    over the full record slice
//! [records] per record: varint payload length + payload
//! ```
//!
//! All integers are little endian. Record offsets are relative to the
//! records region so the index can be sized before any offset is final.

use sharc_codec::wire::ByteReader;
use sharc_codec::{CodecError, SetLayout};
use sharc_object::{HashSeed, HashSeedPolicy};

use crate::error::{ArchiveError, ArchiveResult};
use crate::name::ModuleName;

pub const MAGIC: [u8; 4] = *b"SHRC";
pub const VERSION: u32 = 1;

/// Fixed header size in bytes.
pub(crate) const HEADER_LEN: usize = 4 + 4 + 4 + 1 + 8 + 1 + 8 + 32;

const SEED_POLICY_FIXED: u8 = 0;
const SEED_POLICY_RANDOM: u8 = 1;
const SET_LAYOUT_CANONICAL: u8 = 0;
const SET_LAYOUT_LITERAL: u8 = 1;

const FLAG_SEED_SENSITIVE: u8 = 0b0000_0001;

/// What kind of payload a record holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordKind {
    /// A module's code object graph.
    Module,
    /// A standalone object graph written by the debug entry points.
    Debug,
}

impl RecordKind {
    fn tag(self) -> u8 {
        match self {
            Self::Module => 0,
            Self::Debug => 1,
        }
    }

    fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Module),
            1 => Some(Self::Debug),
            _ => None,
        }
    }
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Module => write!(f, "module"),
            Self::Debug => write!(f, "debug"),
        }
    }
}

/// Build-time facts stamped into the header: which seed the records were
/// encoded under and how sets were laid out. Loaders compare this against
/// the running process before serving seed-sensitive records.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArchiveStamp {
    pub seed_policy: HashSeedPolicy,
    pub seed: HashSeed,
    pub set_layout: SetLayout,
}

impl Default for ArchiveStamp {
    fn default() -> Self {
        let policy = HashSeedPolicy::default();
        Self { seed_policy: policy, seed: policy.resolve(), set_layout: SetLayout::default() }
    }
}

/// Parsed archive header.
#[derive(Clone, Copy, Debug)]
pub struct ArchiveHeader {
    pub record_count: u32,
    pub stamp: ArchiveStamp,
    pub index_len: u64,
    pub records_checksum: [u8; 32],
}

impl ArchiveHeader {
    pub(crate) fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN);
        out.extend_from_slice(&MAGIC);
        out.extend_from_slice(&VERSION.to_le_bytes());
        out.extend_from_slice(&self.record_count.to_le_bytes());
        let (policy_tag, seed_value) = match self.stamp.seed_policy {
            HashSeedPolicy::Fixed(_) => (SEED_POLICY_FIXED, self.stamp.seed.value()),
            HashSeedPolicy::Random => (SEED_POLICY_RANDOM, self.stamp.seed.value()),
        };
        out.push(policy_tag);
        out.extend_from_slice(&seed_value.to_le_bytes());
        out.push(match self.stamp.set_layout {
            SetLayout::Canonical => SET_LAYOUT_CANONICAL,
            SetLayout::Literal => SET_LAYOUT_LITERAL,
        });
        out.extend_from_slice(&self.index_len.to_le_bytes());
        out.extend_from_slice(&self.records_checksum);
        out
    }

    pub(crate) fn parse(data: &[u8]) -> ArchiveResult<Self> {
        if data.len() >= 4 && data[0..4] != MAGIC {
            return Err(ArchiveError::InvalidMagic {
                expected: String::from_utf8_lossy(&MAGIC).into_owned(),
                actual: String::from_utf8_lossy(&data[0..4]).into_owned(),
            });
        }
        if data.len() < HEADER_LEN {
            return Err(ArchiveError::Corrupt {
                offset: 0,
                reason: format!("file too short for header ({} bytes)", data.len()),
            });
        }
        let version = read_u32_le(data, 4);
        if version != VERSION {
            return Err(ArchiveError::UnsupportedVersion(version));
        }
        let record_count = read_u32_le(data, 8);
        let policy_tag = data[12];
        let seed_value = read_u64_le(data, 13);
        let seed = HashSeed::new(seed_value);
        let seed_policy = match policy_tag {
            SEED_POLICY_FIXED => HashSeedPolicy::Fixed(seed_value),
            SEED_POLICY_RANDOM => HashSeedPolicy::Random,
            other => {
                return Err(ArchiveError::Corrupt {
                    offset: 12,
                    reason: format!("unknown seed policy tag {other:#04x}"),
                })
            }
        };
        let set_layout = match data[21] {
            SET_LAYOUT_CANONICAL => SetLayout::Canonical,
            SET_LAYOUT_LITERAL => SetLayout::Literal,
            other => {
                return Err(ArchiveError::Corrupt {
                    offset: 21,
                    reason: format!("unknown set layout tag {other:#04x}"),
                })
            }
        };
        let index_len = read_u64_le(data, 22);
        let mut records_checksum = [0u8; 32];
        records_checksum.copy_from_slice(&data[30..62]);
        Ok(Self {
            record_count,
            stamp: ArchiveStamp { seed_policy, seed, set_layout },
            index_len,
            records_checksum,
        })
    }
}

fn read_u32_le(data: &[u8], at: usize) -> u32 {
    let mut four = [0u8; 4];
    four.copy_from_slice(&data[at..at + 4]);
    u32::from_le_bytes(four)
}

fn read_u64_le(data: &[u8], at: usize) -> u64 {
    let mut eight = [0u8; 8];
    eight.copy_from_slice(&data[at..at + 8]);
    u64::from_le_bytes(eight)
}

/// One index entry. Offsets are relative to the records region.
#[derive(Clone, Debug)]
pub(crate) struct IndexEntry {
    pub name: ModuleName,
    pub kind: RecordKind,
    pub seed_sensitive: bool,
    pub depends_on: Vec<ModuleName>,
    pub offset: u64,
    pub length: u64,
    pub crc32: u32,
}

impl IndexEntry {
    pub(crate) fn encode(&self, out: &mut Vec<u8>) {
        write_name(out, &self.name);
        out.push(self.kind.tag());
        out.push(if self.seed_sensitive { FLAG_SEED_SENSITIVE } else { 0 });
        sharc_codec::wire::write_varint(out, self.depends_on.len() as u64);
        for dep in &self.depends_on {
            write_name(out, dep);
        }
        out.extend_from_slice(&self.offset.to_le_bytes());
        out.extend_from_slice(&self.length.to_le_bytes());
        out.extend_from_slice(&self.crc32.to_le_bytes());
    }

    /// Parse one entry. `base` is the entry's absolute file offset, used
    /// only to report useful corruption offsets.
    pub(crate) fn parse(reader: &mut ByteReader<'_>, base: u64) -> ArchiveResult<Self> {
        let name = read_name(reader, base)?;
        let kind_tag = reader.read_u8().map_err(|e| wire_err(base, e))?;
        let kind = RecordKind::from_tag(kind_tag).ok_or_else(|| ArchiveError::Corrupt {
            offset: base,
            reason: format!("unknown record kind tag {kind_tag:#04x}"),
        })?;
        let flags = reader.read_u8().map_err(|e| wire_err(base, e))?;
        if flags & !FLAG_SEED_SENSITIVE != 0 {
            return Err(ArchiveError::Corrupt {
                offset: base,
                reason: format!("unknown record flags {flags:#04x}"),
            });
        }
        let dep_count = reader.read_varint().map_err(|e| wire_err(base, e))?;
        if dep_count > reader.remaining() as u64 {
            return Err(ArchiveError::Corrupt {
                offset: base,
                reason: format!("dependency count {dep_count} exceeds remaining index"),
            });
        }
        let mut depends_on = Vec::with_capacity(dep_count as usize);
        for _ in 0..dep_count {
            depends_on.push(read_name(reader, base)?);
        }
        let offset = read_u64(reader, base)?;
        let length = read_u64(reader, base)?;
        let crc32 = read_u32(reader, base)?;
        Ok(Self {
            name,
            kind,
            seed_sensitive: flags & FLAG_SEED_SENSITIVE != 0,
            depends_on,
            offset,
            length,
            crc32,
        })
    }
}

fn write_name(out: &mut Vec<u8>, name: &ModuleName) {
    sharc_codec::wire::write_varint(out, name.as_str().len() as u64);
    out.extend_from_slice(name.as_str().as_bytes());
}

fn read_name(reader: &mut ByteReader<'_>, base: u64) -> ArchiveResult<ModuleName> {
    let len = reader.read_varint().map_err(|e| wire_err(base, e))?;
    if len > reader.remaining() as u64 {
        return Err(ArchiveError::Corrupt {
            offset: base,
            reason: format!("name length {len} exceeds remaining index"),
        });
    }
    let raw = reader.read_bytes(len as usize).map_err(|e| wire_err(base, e))?;
    let text = std::str::from_utf8(raw).map_err(|_| ArchiveError::Corrupt {
        offset: base,
        reason: "name is not valid UTF-8".into(),
    })?;
    ModuleName::parse(text)
}

fn read_u32(reader: &mut ByteReader<'_>, base: u64) -> ArchiveResult<u32> {
    let raw = reader.read_bytes(4).map_err(|e| wire_err(base, e))?;
    let mut four = [0u8; 4];
    four.copy_from_slice(raw);
    Ok(u32::from_le_bytes(four))
}

fn read_u64(reader: &mut ByteReader<'_>, base: u64) -> ArchiveResult<u64> {
    let raw = reader.read_bytes(8).map_err(|e| wire_err(base, e))?;
    let mut eight = [0u8; 8];
    eight.copy_from_slice(raw);
    Ok(u64::from_le_bytes(eight))
}

pub(crate) fn wire_err(base: u64, e: CodecError) -> ArchiveError {
    match e {
        CodecError::Corrupt { offset, reason } => {
            ArchiveError::Corrupt { offset: base + offset as u64, reason }
        }
        other => ArchiveError::Corrupt { offset: base, reason: other.to_string() },
    }
}

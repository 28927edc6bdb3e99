//! Memory-mapped archive reader.
//!
//! Opening an archive maps the file read only, parses the header, and
//! validates the whole index up front: names must be strictly ascending
//! and every entry must point inside the records region. Record payloads
//! stay untouched until asked for, so a process that imports ten modules
//! out of a thousand only ever pages in those ten. Payload reads check
//! the per-record CRC; [`ArchiveLoader::verify`] checks everything.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Instant;

use memmap2::Mmap;
use sharc_codec::wire::ByteReader;
use tracing::{debug, trace};

use crate::error::{ArchiveError, ArchiveResult};
use crate::format::{wire_err, ArchiveHeader, ArchiveStamp, IndexEntry, RecordKind, HEADER_LEN};
use crate::name::ModuleName;

/// Knobs for opening an archive.
#[derive(Clone, Copy, Debug, Default)]
pub struct LoadOptions {
    /// Ask the kernel to pre-fault the mapping instead of paging lazily.
    /// Only honored on Linux.
    pub populate: bool,
}

/// Read handle over a mapped archive file.
pub struct ArchiveLoader {
    path: PathBuf,
    mmap: Mmap,
    header: ArchiveHeader,
    index: Vec<IndexEntry>,
}

impl ArchiveLoader {
    pub fn open(path: &Path) -> ArchiveResult<Self> {
        Self::open_with(path, LoadOptions::default())
    }

    pub fn open_with(path: &Path, options: LoadOptions) -> ArchiveResult<Self> {
        let started = Instant::now();
        let open_err = |source| ArchiveError::Open { path: path.to_path_buf(), source };
        let file = File::open(path).map_err(open_err)?;
        let mmap = map_file(&file, options).map_err(open_err)?;
        trace!(
            addr = ?mmap.as_ptr(),
            populate = options.populate,
            "archive mapped"
        );

        let header = ArchiveHeader::parse(&mmap)?;
        let records_start = HEADER_LEN as u64 + header.index_len;
        if records_start > mmap.len() as u64 {
            return Err(ArchiveError::Corrupt {
                offset: HEADER_LEN as u64,
                reason: format!(
                    "index length {} exceeds file size {}",
                    header.index_len,
                    mmap.len()
                ),
            });
        }
        let records_len = mmap.len() as u64 - records_start;

        let index_bytes = &mmap[HEADER_LEN..records_start as usize];
        let mut reader = ByteReader::new(index_bytes);
        let mut index: Vec<IndexEntry> = Vec::with_capacity(header.record_count as usize);
        while index.len() < header.record_count as usize {
            let base = HEADER_LEN as u64 + reader.pos() as u64;
            let entry = IndexEntry::parse(&mut reader, base)?;
            if let Some(prev) = index.last() {
                if prev.name >= entry.name {
                    return Err(ArchiveError::Corrupt {
                        offset: base,
                        reason: format!(
                            "index not sorted: {} follows {}",
                            entry.name, prev.name
                        ),
                    });
                }
            }
            let in_bounds = entry
                .offset
                .checked_add(entry.length)
                .map_or(false, |end| end <= records_len);
            if entry.length == 0 || !in_bounds {
                return Err(ArchiveError::Corrupt {
                    offset: base,
                    reason: format!(
                        "record {} spans {}..{} outside records region of {} bytes",
                        entry.name,
                        entry.offset,
                        entry.offset.saturating_add(entry.length),
                        records_len
                    ),
                });
            }
            index.push(entry);
        }
        if reader.remaining() != 0 {
            return Err(ArchiveError::Corrupt {
                offset: HEADER_LEN as u64 + reader.pos() as u64,
                reason: format!("{} trailing bytes after index", reader.remaining()),
            });
        }

        debug!(
            path = %path.display(),
            records = index.len(),
            bytes = mmap.len(),
            elapsed = ?started.elapsed(),
            "mmap success"
        );
        Ok(Self { path: path.to_path_buf(), mmap, header, index })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Build-time stamp recorded in the header.
    pub fn stamp(&self) -> ArchiveStamp {
        self.header.stamp
    }

    pub fn record_count(&self) -> usize {
        self.index.len()
    }

    /// BLAKE3 checksum of the records region, as stamped at build time.
    pub fn records_checksum(&self) -> [u8; 32] {
        self.header.records_checksum
    }

    pub fn contains(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    /// Look up a record by module name.
    pub fn lookup(&self, name: &str) -> Option<RecordView<'_>> {
        self.find(name).map(|at| RecordView { loader: self, entry: &self.index[at] })
    }

    /// All records in name order.
    pub fn records(&self) -> impl Iterator<Item = RecordView<'_>> {
        self.index.iter().map(move |entry| RecordView { loader: self, entry })
    }

    /// Full integrity pass: the BLAKE3 checksum over the records region,
    /// then every record's CRC and framing. Pages in the whole file.
    pub fn verify(&self) -> ArchiveResult<()> {
        let region = self.records_region();
        if *blake3::hash(region).as_bytes() != self.header.records_checksum {
            return Err(ArchiveError::ChecksumMismatch);
        }
        for record in self.records() {
            record.payload()?;
        }
        Ok(())
    }

    fn find(&self, name: &str) -> Option<usize> {
        self.index.binary_search_by(|entry| entry.name.as_str().cmp(name)).ok()
    }

    fn records_start(&self) -> usize {
        HEADER_LEN + self.header.index_len as usize
    }

    fn records_region(&self) -> &[u8] {
        &self.mmap[self.records_start()..]
    }
}

impl std::fmt::Debug for ArchiveLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveLoader")
            .field("path", &self.path)
            .field("records", &self.index.len())
            .field("bytes", &self.mmap.len())
            .finish()
    }
}

#[cfg(target_os = "linux")]
fn map_file(file: &File, options: LoadOptions) -> std::io::Result<Mmap> {
    let mut mapper = memmap2::MmapOptions::new();
    if options.populate {
        mapper.populate();
    }
    // Safety: the mapping is read only, and archives are replaced by
    // renaming a finished temp file, never rewritten in place.
    unsafe { mapper.map(file) }
}

#[cfg(not(target_os = "linux"))]
fn map_file(file: &File, _options: LoadOptions) -> std::io::Result<Mmap> {
    // Safety: see above. populate is a Linux-only hint and is skipped here.
    unsafe { Mmap::map(file) }
}

/// Borrowed view of one record. Cheap to copy around; nothing is read
/// from the mapping until [`payload`](Self::payload).
#[derive(Clone, Copy)]
pub struct RecordView<'a> {
    loader: &'a ArchiveLoader,
    entry: &'a IndexEntry,
}

impl<'a> RecordView<'a> {
    pub fn name(&self) -> &'a ModuleName {
        &self.entry.name
    }

    pub fn kind(&self) -> RecordKind {
        self.entry.kind
    }

    pub fn depends_on(&self) -> &'a [ModuleName] {
        &self.entry.depends_on
    }

    /// Whether the payload bytes depend on the archive's hash seed.
    pub fn seed_sensitive(&self) -> bool {
        self.entry.seed_sensitive
    }

    /// On-disk record length including the payload length prefix.
    pub fn stored_len(&self) -> u64 {
        self.entry.length
    }

    /// Validate and return the serialized object graph.
    pub fn payload(&self) -> ArchiveResult<&'a [u8]> {
        let file_offset = self.loader.records_start() as u64 + self.entry.offset;
        let start = self.entry.offset as usize;
        let end = start + self.entry.length as usize;
        let record = &self.loader.records_region()[start..end];
        if crc32fast::hash(record) != self.entry.crc32 {
            return Err(self.corrupt(file_offset, "record checksum mismatch".into()));
        }
        let mut reader = ByteReader::new(record);
        let payload_len = reader
            .read_varint()
            .map_err(|e| wire_err(file_offset, e))?;
        if payload_len != reader.remaining() as u64 {
            return Err(self.corrupt(
                file_offset,
                format!(
                    "payload length {payload_len} disagrees with record length {}",
                    reader.remaining()
                ),
            ));
        }
        let at = reader.pos();
        Ok(&record[at..])
    }

    fn corrupt(&self, offset: u64, reason: String) -> ArchiveError {
        ArchiveError::CorruptRecord { name: self.entry.name.to_string(), offset, reason }
    }
}

impl std::fmt::Debug for RecordView<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordView")
            .field("name", &self.entry.name)
            .field("kind", &self.entry.kind)
            .field("len", &self.entry.length)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::{ArchiveWriter, RecordSpec};
    use sharc_codec::SetLayout;
    use sharc_object::{HashSeed, HashSeedPolicy};

    fn record(name: &str, deps: &[&str], payload: &[u8]) -> RecordSpec {
        RecordSpec {
            name: ModuleName::parse(name).unwrap(),
            kind: RecordKind::Module,
            depends_on: deps.iter().map(|d| ModuleName::parse(d).unwrap()).collect(),
            seed_sensitive: false,
            payload: payload.to_vec(),
        }
    }

    fn build(path: &Path, records: &[RecordSpec]) -> ArchiveStamp {
        let stamp = ArchiveStamp::default();
        let mut writer = ArchiveWriter::new(path, stamp);
        for spec in records {
            writer.push(spec.clone()).unwrap();
        }
        writer.finish().unwrap();
        stamp
    }

    #[test]
    fn write_then_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.sharc");
        build(
            &path,
            &[
                record("pkg.sub", &["pkg"], b"sub payload"),
                record("pkg", &[], b"pkg payload"),
                record("zeta", &["pkg.sub"], b"zeta payload"),
            ],
        );

        let loader = ArchiveLoader::open(&path).unwrap();
        assert_eq!(loader.record_count(), 3);
        assert!(loader.contains("pkg"));
        assert!(!loader.contains("nope"));

        let sub = loader.lookup("pkg.sub").unwrap();
        assert_eq!(sub.kind(), RecordKind::Module);
        assert_eq!(sub.depends_on().len(), 1);
        assert_eq!(sub.depends_on()[0].as_str(), "pkg");
        assert_eq!(sub.payload().unwrap(), b"sub payload");

        // index is sorted regardless of push order
        let names: Vec<_> = loader.records().map(|r| r.name().to_string()).collect();
        assert_eq!(names, ["pkg", "pkg.sub", "zeta"]);

        loader.verify().unwrap();
    }

    #[test]
    fn missing_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let err = ArchiveLoader::open(&dir.path().join("absent.sharc")).unwrap_err();
        match err {
            ArchiveError::Open { path, .. } => {
                assert!(path.ends_with("absent.sharc"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn lookup_miss_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("one.sharc");
        build(&path, &[record("only", &[], b"x")]);
        let loader = ArchiveLoader::open(&path).unwrap();
        assert!(loader.lookup("missing").is_none());
    }

    #[test]
    fn empty_archive_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.sharc");
        build(&path, &[]);
        let loader = ArchiveLoader::open(&path).unwrap();
        assert_eq!(loader.record_count(), 0);
        loader.verify().unwrap();
    }

    #[test]
    fn bad_magic_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.sharc");
        build(&path, &[record("m", &[], b"x")]);
        let mut bytes = std::fs::read(&path).unwrap();
        bytes[0] = b'X';
        std::fs::write(&path, &bytes).unwrap();
        let err = ArchiveLoader::open(&path).unwrap_err();
        assert!(matches!(err, ArchiveError::InvalidMagic { .. }));
    }

    #[test]
    fn future_version_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vnext.sharc");
        build(&path, &[record("m", &[], b"x")]);
        let mut bytes = std::fs::read(&path).unwrap();
        bytes[4] = 2;
        std::fs::write(&path, &bytes).unwrap();
        let err = ArchiveLoader::open(&path).unwrap_err();
        assert!(matches!(err, ArchiveError::UnsupportedVersion(2)));
    }

    #[test]
    fn truncated_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cut.sharc");
        build(&path, &[record("m", &[], b"payload")]);
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 3]).unwrap();
        assert!(ArchiveLoader::open(&path).is_err());
    }

    #[test]
    fn flipped_payload_byte_fails_crc_and_verify() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flip.sharc");
        build(&path, &[record("m", &[], b"payload")]);
        let mut bytes = std::fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        std::fs::write(&path, &bytes).unwrap();

        let loader = ArchiveLoader::open(&path).unwrap();
        let err = loader.lookup("m").unwrap().payload().unwrap_err();
        assert!(matches!(err, ArchiveError::CorruptRecord { .. }), "got {err}");
        assert!(loader.verify().is_err());
    }

    #[test]
    fn stamp_roundtrips_through_the_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stamp.sharc");
        let stamp = ArchiveStamp {
            seed_policy: HashSeedPolicy::Random,
            seed: HashSeed::new(0x5EED),
            set_layout: SetLayout::Literal,
        };
        let mut writer = ArchiveWriter::new(&path, stamp);
        writer.push(record("m", &[], b"x")).unwrap();
        writer.finish().unwrap();

        let loader = ArchiveLoader::open(&path).unwrap();
        assert_eq!(loader.stamp(), stamp);
    }
}

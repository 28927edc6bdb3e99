use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{ArchiveError, ArchiveResult};
use crate::format::{ArchiveHeader, ArchiveStamp, IndexEntry, RecordKind, HEADER_LEN};
use crate::name::ModuleName;

/// One record queued for writing.
#[derive(Clone, Debug)]
pub struct RecordSpec {
    pub name: ModuleName,
    pub kind: RecordKind,
    /// Names that must be installed before this record is, e.g. enclosing
    /// packages and hard imports.
    pub depends_on: Vec<ModuleName>,
    /// True when the payload bytes depend on the hash seed in the stamp.
    pub seed_sensitive: bool,
    /// Serialized object graph for this name.
    pub payload: Vec<u8>,
}

/// Result of writing an archive.
#[derive(Clone, Debug)]
pub struct ArchiveSummary {
    pub path: PathBuf,
    pub record_count: usize,
    pub bytes: u64,
    pub records_checksum: [u8; 32],
}

/// Builds an archive file from queued records.
///
/// Nothing touches the target path until [`finish`](Self::finish): the
/// file is assembled in memory, written to a `.tmp` sibling, and renamed
/// into place. A reader therefore sees either the old archive or the new
/// one, never a torn file, and an abandoned writer leaves nothing behind.
pub struct ArchiveWriter {
    path: PathBuf,
    stamp: ArchiveStamp,
    records: Vec<RecordSpec>,
    names: HashSet<ModuleName>,
}

impl ArchiveWriter {
    pub fn new(path: &Path, stamp: ArchiveStamp) -> Self {
        Self { path: path.to_path_buf(), stamp, records: Vec::new(), names: HashSet::new() }
    }

    /// Queue a record. Names must be unique within one archive.
    pub fn push(&mut self, spec: RecordSpec) -> ArchiveResult<()> {
        if !self.names.insert(spec.name.clone()) {
            return Err(ArchiveError::DuplicateRecord(spec.name.to_string()));
        }
        self.records.push(spec);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Assemble and publish the archive.
    pub fn finish(self) -> ArchiveResult<ArchiveSummary> {
        // records region in queue order
        let mut records_bytes: Vec<u8> = Vec::new();
        let mut entries: Vec<IndexEntry> = Vec::with_capacity(self.records.len());
        for spec in &self.records {
            let offset = records_bytes.len() as u64;
            let mut record: Vec<u8> = Vec::with_capacity(spec.payload.len() + 4);
            sharc_codec::wire::write_varint(&mut record, spec.payload.len() as u64);
            record.extend_from_slice(&spec.payload);
            let crc32 = crc32fast::hash(&record);
            records_bytes.extend_from_slice(&record);
            entries.push(IndexEntry {
                name: spec.name.clone(),
                kind: spec.kind,
                seed_sensitive: spec.seed_sensitive,
                depends_on: spec.depends_on.clone(),
                offset,
                length: record.len() as u64,
                crc32,
            });
        }

        // index sorted by name for binary search at load time
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        let mut index_bytes: Vec<u8> = Vec::new();
        for entry in &entries {
            entry.encode(&mut index_bytes);
        }

        let header = ArchiveHeader {
            record_count: entries.len() as u32,
            stamp: self.stamp,
            index_len: index_bytes.len() as u64,
            records_checksum: *blake3::hash(&records_bytes).as_bytes(),
        };

        let mut file_bytes = Vec::with_capacity(HEADER_LEN + index_bytes.len() + records_bytes.len());
        file_bytes.extend_from_slice(&header.to_bytes());
        file_bytes.extend_from_slice(&index_bytes);
        file_bytes.extend_from_slice(&records_bytes);

        write_atomic(&self.path, &file_bytes)?;
        debug!(
            path = %self.path.display(),
            records = entries.len(),
            bytes = file_bytes.len(),
            "archive written"
        );
        Ok(ArchiveSummary {
            path: self.path,
            record_count: entries.len(),
            bytes: file_bytes.len() as u64,
            records_checksum: header.records_checksum,
        })
    }
}

/// Write `bytes` to a `.tmp` sibling of `path` and rename it into place.
/// The temp file is removed if either step fails.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut tmp_name = path.as_os_str().to_os_string();
    tmp_name.push(".tmp");
    let tmp = PathBuf::from(tmp_name);
    let result = std::fs::write(&tmp, bytes).and_then(|_| std::fs::rename(&tmp, path));
    if result.is_err() {
        let _ = std::fs::remove_file(&tmp);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(name: &str, payload: &[u8]) -> RecordSpec {
        RecordSpec {
            name: ModuleName::parse(name).unwrap(),
            kind: RecordKind::Module,
            depends_on: vec![],
            seed_sensitive: false,
            payload: payload.to_vec(),
        }
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = ArchiveWriter::new(&dir.path().join("a.sharc"), ArchiveStamp::default());
        writer.push(spec("mod", b"x")).unwrap();
        let err = writer.push(spec("mod", b"y")).unwrap_err();
        assert!(matches!(err, ArchiveError::DuplicateRecord(_)));
    }

    #[test]
    fn finish_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.sharc");
        let mut writer = ArchiveWriter::new(&path, ArchiveStamp::default());
        writer.push(spec("alpha", b"payload")).unwrap();
        let summary = writer.finish().unwrap();
        assert_eq!(summary.record_count, 1);
        assert!(path.exists());
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .filter(|n| n.to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty(), "temp file left behind: {leftovers:?}");
    }

    #[test]
    fn abandoned_writer_touches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("never.sharc");
        let mut writer = ArchiveWriter::new(&path, ArchiveStamp::default());
        writer.push(spec("alpha", b"payload")).unwrap();
        drop(writer);
        assert!(!path.exists());
    }

    #[test]
    fn identical_input_produces_identical_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let build = |path: &Path| {
            let mut writer = ArchiveWriter::new(path, ArchiveStamp::default());
            writer.push(spec("beta", b"bb")).unwrap();
            writer.push(spec("alpha", b"aa")).unwrap();
            writer.finish().unwrap();
            std::fs::read(path).unwrap()
        };
        let first = build(&dir.path().join("one.sharc"));
        let second = build(&dir.path().join("two.sharc"));
        assert_eq!(first, second);
    }
}

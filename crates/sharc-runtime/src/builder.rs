//! Building an archive from a recorded module list.
//!
//! The builder replays the list through the host in compile-only form: no
//! module body runs, but the import bookkeeping a real run would perform
//! is reproduced, so anything sensitive to import order serializes exactly
//! as a process importing the list would see it. A name whose serialized
//! form changes between two encounters within one build is a re-import
//! conflict and cannot be archived faithfully.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use sharc_archive::{ArchiveStamp, ArchiveWriter, ModuleName, NameList, RecordKind, RecordSpec};
use sharc_codec::{CodecError, EncodeOptions};
use sharc_object::ObjectHeap;
use tracing::{debug, warn};

use crate::error::{RuntimeError, RuntimeResult};
use crate::host::{ImportContext, ModuleHost};

/// What the builder does with a name it cannot archive faithfully.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConflictPolicy {
    /// Fail the whole build. Nothing is written.
    Abort,
    /// Leave the offending entry out and keep going.
    SkipRecord,
}

impl Default for ConflictPolicy {
    fn default() -> Self {
        Self::Abort
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct BuildOptions {
    /// Stamp written into the archive header. Its seed and set layout also
    /// drive the encoder.
    pub stamp: ArchiveStamp,
    pub conflicts: ConflictPolicy,
}

/// What a finished build produced.
#[derive(Clone, Debug)]
pub struct BuildReport {
    pub path: PathBuf,
    /// Names that got a record, in list order.
    pub written: Vec<ModuleName>,
    /// Names left out under [`ConflictPolicy::SkipRecord`].
    pub skipped: Vec<ModuleName>,
    pub bytes: u64,
}

pub struct ArchiveBuilder<'h, H> {
    host: &'h H,
    options: BuildOptions,
}

impl<'h, H: ModuleHost> ArchiveBuilder<'h, H> {
    pub fn new(host: &'h H, options: BuildOptions) -> Self {
        ArchiveBuilder { host, options }
    }

    /// Archive every name in `list`, in order, to `path`.
    ///
    /// Dependencies pulled in along the way are captured for conflict
    /// detection but only listed names get records; a process imports the
    /// rest normally.
    pub fn build(&self, list: &NameList, path: &Path) -> RuntimeResult<BuildReport> {
        let mut session = BuildSession {
            host: self.host,
            heap: ObjectHeap::new(),
            loaded: Vec::new(),
            captured: HashMap::new(),
            options: EncodeOptions {
                set_layout: self.options.stamp.set_layout,
                seed: self.options.stamp.seed,
            },
        };
        let mut writer = ArchiveWriter::new(path, self.options.stamp);
        let mut written = Vec::new();
        let mut skipped = Vec::new();

        for name in list {
            match session.capture(name) {
                Ok(()) => {}
                Err(err) if recoverable(&err) => match self.options.conflicts {
                    ConflictPolicy::Abort => return Err(err),
                    ConflictPolicy::SkipRecord => {
                        warn!(module = %name, error = %err, "record skipped");
                        skipped.push(name.clone());
                        continue;
                    }
                },
                Err(err) => return Err(err),
            }
            if let Some(spec) = session.record_spec(name) {
                writer.push(spec)?;
                written.push(name.clone());
            }
        }

        let summary = writer.finish()?;
        debug!(
            path = %summary.path.display(),
            records = summary.record_count,
            skipped = skipped.len(),
            "archive built"
        );
        Ok(BuildReport { path: summary.path, written, skipped, bytes: summary.bytes })
    }
}

/// Failures scoped to one name. Everything else poisons the whole build.
fn recoverable(err: &RuntimeError) -> bool {
    matches!(
        err,
        RuntimeError::UnknownModule(_)
            | RuntimeError::Compile { .. }
            | RuntimeError::ReimportConflict { .. }
            | RuntimeError::Codec(CodecError::Unsupported { .. })
    )
}

struct CapturedModule {
    payload: Vec<u8>,
    seed_sensitive: bool,
    requires: Vec<ModuleName>,
}

struct BuildSession<'h, H> {
    host: &'h H,
    heap: ObjectHeap,
    /// Import bookkeeping a real run of the list would accumulate.
    loaded: Vec<ModuleName>,
    captured: HashMap<ModuleName, CapturedModule>,
    options: EncodeOptions,
}

impl<'h, H: ModuleHost> BuildSession<'h, H> {
    /// Compile-only import of `name`: parents first, then the module, then
    /// its requires. The module counts as loaded before its requires are
    /// walked, which is also what ends require cycles.
    fn capture(&mut self, name: &ModuleName) -> RuntimeResult<()> {
        for parent in name.ancestry() {
            self.capture(&parent)?;
        }
        if self.captured.contains_key(name) {
            return self.recheck(name);
        }
        if !self.host.contains(name) {
            return Err(RuntimeError::UnknownModule(name.to_string()));
        }
        let ctx = ImportContext { loaded: self.loaded.clone() };
        let compiled = self.host.compile(name, &mut self.heap, &ctx)?;
        let encoded = sharc_codec::encode_with(&self.heap, compiled.code, &self.options)?;
        self.loaded.push(name.clone());
        self.captured.insert(
            name.clone(),
            CapturedModule {
                payload: encoded.bytes,
                seed_sensitive: encoded.seed_sensitive,
                requires: compiled.requires.clone(),
            },
        );
        for require in &compiled.requires {
            self.capture(require)?;
        }
        Ok(())
    }

    /// A name met again must serialize exactly as it did the first time,
    /// or the archive would disagree with what a process importing the
    /// list actually gets.
    fn recheck(&mut self, name: &ModuleName) -> RuntimeResult<()> {
        let ctx = ImportContext { loaded: self.loaded.clone() };
        let compiled = self.host.compile(name, &mut self.heap, &ctx)?;
        let encoded = sharc_codec::encode_with(&self.heap, compiled.code, &self.options)?;
        let unchanged = self
            .captured
            .get(name)
            .is_some_and(|known| known.payload == encoded.bytes);
        if !unchanged {
            return Err(RuntimeError::ReimportConflict { name: name.to_string() });
        }
        Ok(())
    }

    fn record_spec(&self, name: &ModuleName) -> Option<RecordSpec> {
        let captured = self.captured.get(name)?;
        let mut depends_on = name.ancestry();
        for require in &captured.requires {
            if require != name && !depends_on.contains(require) {
                depends_on.push(require.clone());
            }
        }
        Some(RecordSpec {
            name: name.clone(),
            kind: RecordKind::Module,
            depends_on,
            seed_sensitive: captured.seed_sensitive,
            payload: captured.payload.clone(),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

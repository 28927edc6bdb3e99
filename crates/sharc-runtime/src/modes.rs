//! The run modes tying recording, dumping, and sharing together.
//!
//! [`run`] is the single entry point the command line and embedding code
//! use: it reads the mode from a [`RuntimeConfig`] and drives one full
//! process worth of work. Plain runs import through the host, optionally
//! recording the imports; dump builds an archive from a recorded list;
//! share maps an archive and serves imports from it; the two debug modes
//! move one literal through the serializer on its own.

use std::path::PathBuf;

use sharc_archive::{ArchiveLoader, ArchiveWriter, ModuleName, NameList, RecordKind, RecordSpec};
use sharc_codec::EncodeOptions;
use sharc_object::ObjectHeap;
use tracing::{debug, info, warn};

use crate::builder::{ArchiveBuilder, BuildOptions, BuildReport};
use crate::config::{Mode, RuntimeConfig};
use crate::error::{RuntimeError, RuntimeResult};
use crate::host::ModuleHost;
use crate::intercept::{ImportEngine, ImportOutcome};
use crate::recorder::NameListRecorder;
use crate::universe::{eval_literal, BOOTSTRAP_MODULE};

/// Name of the single record debug dumps write.
pub const DEBUG_RECORD: &str = "__debug__";

/// Literal dumped when debug-dump mode gets no expression.
pub const DEBUG_DEFAULT_SOURCE: &str = r#"("sharc", 1, 2.5, b"\x00", (none, true))"#;

/// What one run produced.
#[derive(Debug)]
pub enum RunOutcome {
    Imported {
        /// Requested imports and how each was satisfied.
        imports: Vec<(ModuleName, ImportOutcome)>,
        /// Whether an archive was actually mapped.
        shared: bool,
        /// List file written when recording was on.
        recorded: Option<PathBuf>,
    },
    Built(BuildReport),
    DebugDumped { path: PathBuf, bytes: u64 },
    DebugLoaded { repr: String },
}

/// Run one process worth of work under `config`.
pub fn run<H: ModuleHost>(
    config: &RuntimeConfig,
    host: &H,
    imports: &[ModuleName],
    debug_source: Option<&str>,
) -> RuntimeResult<RunOutcome> {
    match config.mode {
        None => run_imports(config, host, imports, false),
        Some(Mode::Share) => run_imports(config, host, imports, true),
        Some(Mode::Dump) => run_dump(config, host),
        Some(Mode::DebugDump) => run_debug_dump(config, debug_source),
        Some(Mode::DebugLoad) => run_debug_load(config),
    }
}

fn run_imports<H: ModuleHost>(
    config: &RuntimeConfig,
    host: &H,
    imports: &[ModuleName],
    share: bool,
) -> RuntimeResult<RunOutcome> {
    let mut engine = ImportEngine::new(host, config.seed);
    if share {
        let path = config.archive_path();
        match ArchiveLoader::open(&path) {
            Ok(loader) => engine.attach_archive(loader),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "open mmap file failed");
            }
        }
    }
    if let Some(output) = &config.dump_list {
        engine.attach_recorder(NameListRecorder::start(output));
    }

    let bootstrap = ModuleName::parse(BOOTSTRAP_MODULE)?;
    if host.contains(&bootstrap) {
        engine.import(&bootstrap)?;
    }

    let mut outcomes = Vec::with_capacity(imports.len());
    for name in imports {
        let imported = engine.import(name)?;
        outcomes.push((name.clone(), imported.outcome));
    }

    let shared = engine.archive().is_some();
    let recorded = match engine.take_recorder() {
        Some(recorder) => {
            recorder.flush()?;
            Some(recorder.output().to_path_buf())
        }
        None => None,
    };
    Ok(RunOutcome::Imported { imports: outcomes, shared, recorded })
}

fn run_dump<H: ModuleHost>(config: &RuntimeConfig, host: &H) -> RuntimeResult<RunOutcome> {
    let list = NameList::read_from(&config.list_path())?;
    let options = BuildOptions { stamp: config.stamp(), conflicts: config.conflicts };
    let report = ArchiveBuilder::new(host, options).build(&list, &config.archive_path())?;
    info!(
        path = %report.path.display(),
        written = report.written.len(),
        skipped = report.skipped.len(),
        bytes = report.bytes,
        "archive dumped"
    );
    Ok(RunOutcome::Built(report))
}

fn run_debug_dump(config: &RuntimeConfig, source: Option<&str>) -> RuntimeResult<RunOutcome> {
    let source = source.unwrap_or(DEBUG_DEFAULT_SOURCE);
    let mut heap = ObjectHeap::new();
    let root = eval_literal(&mut heap, source)?;
    let stamp = config.stamp();
    let options = EncodeOptions { set_layout: stamp.set_layout, seed: stamp.seed };
    let encoded = sharc_codec::encode_with(&heap, root, &options)?;

    let mut writer = ArchiveWriter::new(&config.archive_path(), stamp);
    writer.push(RecordSpec {
        name: ModuleName::parse(DEBUG_RECORD)?,
        kind: RecordKind::Debug,
        depends_on: Vec::new(),
        seed_sensitive: encoded.seed_sensitive,
        payload: encoded.bytes,
    })?;
    let summary = writer.finish()?;
    info!(path = %summary.path.display(), bytes = summary.bytes, "debug object dumped");
    Ok(RunOutcome::DebugDumped { path: summary.path, bytes: summary.bytes })
}

fn run_debug_load(config: &RuntimeConfig) -> RuntimeResult<RunOutcome> {
    let path = config.archive_path();
    let loader = ArchiveLoader::open(&path)?;
    let record = loader.lookup(DEBUG_RECORD).ok_or_else(|| RuntimeError::Config {
        reason: format!("{} has no debug record", path.display()),
    })?;
    let payload = record.payload()?;
    let mut heap = ObjectHeap::new();
    let root = sharc_codec::decode(payload, &mut heap)?;
    let repr = sharc_object::repr(&heap, root)?;
    debug!(nodes = heap.len(), "debug object loaded");
    Ok(RunOutcome::DebugLoaded { repr })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

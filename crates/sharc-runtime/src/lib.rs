//! Import interception and run modes for sharc.
//!
//! This crate ties the object heap, codec, and archive layers into the
//! process-facing feature: record the modules a run imports, build an
//! archive from the recorded list, then map that archive in later runs
//! and serve imports straight from it. The real import system stays
//! behind the [`ModuleHost`] trait; [`ModuleUniverse`] is a
//! deterministic in-tree host used by the command line and the tests.

pub mod builder;
pub mod config;
pub mod error;
pub mod host;
pub mod intercept;
pub mod modes;
pub mod recorder;
pub mod registry;
pub mod universe;

pub use builder::{ArchiveBuilder, BuildOptions, BuildReport, ConflictPolicy};
pub use config::{Mode, RuntimeConfig, DEFAULT_ARCHIVE, DEFAULT_LIST};
pub use error::{RuntimeError, RuntimeResult};
pub use host::{CompiledModule, ImportContext, ModuleHost, CODE_FLAG_PACKAGE};
pub use intercept::{ImportEngine, ImportOutcome, Imported};
pub use modes::{run, RunOutcome, DEBUG_DEFAULT_SOURCE, DEBUG_RECORD};
pub use recorder::NameListRecorder;
pub use registry::{ModuleObject, ModuleOrigin, ModuleRegistry};
pub use universe::{eval_literal, ModuleDef, ModuleUniverse, BOOTSTRAP_MODULE};

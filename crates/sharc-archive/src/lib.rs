//! On-disk archive container for sharc.
//!
//! An archive is a single file holding serialized object graphs keyed by
//! module name: a fixed header, a sorted index, then the record payloads.
//! [`ArchiveWriter`] builds the file in memory and publishes it with a
//! temp-file-and-rename so readers only ever observe a complete archive.
//! [`ArchiveLoader`] memory-maps the file read-only; many processes can
//! map the same archive and share its pages.

pub mod error;
pub mod format;
pub mod loader;
pub mod name;
pub mod namelist;
pub mod writer;

pub use error::{ArchiveError, ArchiveResult};
pub use format::{ArchiveHeader, ArchiveStamp, RecordKind, MAGIC, VERSION};
pub use loader::{ArchiveLoader, LoadOptions, RecordView};
pub use name::ModuleName;
pub use namelist::NameList;
pub use writer::{ArchiveSummary, ArchiveWriter, RecordSpec};

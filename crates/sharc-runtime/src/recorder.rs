//! Recording which modules a process imports.
//!
//! The recorder is a passive observer attached to an
//! [`ImportEngine`](crate::intercept::ImportEngine): every successful
//! install lands here, and [`flush`](NameListRecorder::flush) writes the
//! accumulated list in first-import order for a later build to consume.

use std::path::{Path, PathBuf};

use sharc_archive::{ModuleName, NameList};
use tracing::debug;

use crate::error::RuntimeResult;

pub struct NameListRecorder {
    output: PathBuf,
    names: NameList,
}

impl NameListRecorder {
    /// Start recording with `output` as the eventual destination.
    ///
    /// Nothing is written until [`flush`](Self::flush); a process that
    /// dies mid-run leaves no partial list behind.
    pub fn start(output: &Path) -> Self {
        NameListRecorder { output: output.to_path_buf(), names: NameList::default() }
    }

    /// Note one imported module. Repeats are ignored.
    pub fn note(&mut self, name: &ModuleName) {
        if self.names.push(name.clone()) {
            debug!(module = %name, "recorded import");
        }
    }

    pub fn names(&self) -> &NameList {
        &self.names
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Write the recorded list to the configured output path.
    pub fn flush(&self) -> RuntimeResult<()> {
        self.names.write_to(&self.output)?;
        debug!(
            path = %self.output.display(),
            modules = self.names.len(),
            "module list written"
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

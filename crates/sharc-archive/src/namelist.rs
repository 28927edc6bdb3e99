use std::path::Path;

use crate::error::{ArchiveError, ArchiveResult};
use crate::name::ModuleName;
use crate::writer::write_atomic;

/// An ordered, duplicate-free list of module names.
///
/// This is the text handoff between a recording run and an archive build:
/// one name per line, `#` starts a comment, order is the build order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NameList {
    names: Vec<ModuleName>,
}

impl NameList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a name, keeping first-occurrence order. Returns `false` if
    /// the name was already present.
    pub fn push(&mut self, name: ModuleName) -> bool {
        if self.names.contains(&name) {
            return false;
        }
        self.names.push(name);
        true
    }

    pub fn contains(&self, name: &ModuleName) -> bool {
        self.names.contains(name)
    }

    pub fn names(&self) -> &[ModuleName] {
        &self.names
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModuleName> {
        self.names.iter()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn parse(text: &str) -> ArchiveResult<Self> {
        let mut list = Self::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            list.push(ModuleName::parse(line)?);
        }
        Ok(list)
    }

    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for name in &self.names {
            out.push_str(name.as_str());
            out.push('\n');
        }
        out
    }

    /// Read a list from disk. A missing file is reported as
    /// [`ArchiveError::NameListMissing`], distinct from other I/O failures,
    /// because a build without its input list is a configuration error.
    pub fn read_from(path: &Path) -> ArchiveResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ArchiveError::NameListMissing { path: path.to_path_buf() }
            } else {
                ArchiveError::Io(e)
            }
        })?;
        Self::parse(&text)
    }

    /// Write the list to disk atomically. An empty list still produces a
    /// file, so a recording run that imported nothing is distinguishable
    /// from one that never ran.
    pub fn write_to(&self, path: &Path) -> ArchiveResult<()> {
        write_atomic(path, self.to_text().as_bytes())?;
        Ok(())
    }
}

impl<'a> IntoIterator for &'a NameList {
    type Item = &'a ModuleName;
    type IntoIter = std::slice::Iter<'a, ModuleName>;

    fn into_iter(self) -> Self::IntoIter {
        self.names.iter()
    }
}

use std::collections::HashMap;
use std::sync::Arc;

use sharc_archive::ModuleName;
use sharc_object::ObjectRef;

use crate::error::{RuntimeError, RuntimeResult};

/// Where an installed module's code came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModuleOrigin {
    /// Compiled by the host on a normal import.
    Host,
    /// Decoded from an archive record.
    Archive,
}

impl std::fmt::Display for ModuleOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Host => write!(f, "host"),
            Self::Archive => write!(f, "archive"),
        }
    }
}

/// An installed module: the attributes a finished import exposes.
#[derive(Clone, Debug)]
pub struct ModuleObject {
    pub name: ModuleName,
    /// Enclosing package name. A package is its own package; a top-level
    /// plain module has an empty one.
    pub package: String,
    /// Source location the code was compiled from.
    pub file: String,
    /// Submodule search locations, present only for packages.
    pub path: Option<Vec<String>>,
    /// The module's code object in the process heap.
    pub code: ObjectRef,
    pub origin: ModuleOrigin,
}

/// Process-wide table of installed modules.
///
/// One entry per name, installed once, handed out as a shared singleton on
/// every later import of the same name. Installation order is kept because
/// hosts may reflect it while compiling.
#[derive(Debug, Default)]
pub struct ModuleRegistry {
    modules: HashMap<ModuleName, Arc<ModuleObject>>,
    order: Vec<ModuleName>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, name: &ModuleName) -> bool {
        self.modules.contains_key(name)
    }

    /// The cached module, if installed.
    pub fn get(&self, name: &ModuleName) -> Option<Arc<ModuleObject>> {
        self.modules.get(name).cloned()
    }

    /// Install a module under its name. Installing a name twice is a logic
    /// error in the caller; the registry never replaces an entry.
    pub fn install(&mut self, module: ModuleObject) -> RuntimeResult<Arc<ModuleObject>> {
        let name = module.name.clone();
        if self.modules.contains_key(&name) {
            return Err(RuntimeError::AlreadyInstalled(name.to_string()));
        }
        let module = Arc::new(module);
        self.modules.insert(name.clone(), Arc::clone(&module));
        self.order.push(name);
        Ok(module)
    }

    /// Installed names, oldest first.
    pub fn order(&self) -> &[ModuleName] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

//! Import interception.
//!
//! [`ImportEngine`] sits where the host's import entry point would be:
//! every import funnels through [`import`](ImportEngine::import), which
//! serves repeats from the registry, materializes archived records when an
//! attached archive has a usable one, and otherwise compiles through the
//! host. Archive trouble is never fatal here. A record that is missing,
//! seed-incompatible, or corrupt downgrades that one import to the normal
//! path and the process keeps its usual behavior.

use std::sync::Arc;

use sharc_archive::{ArchiveLoader, ModuleName};
use sharc_object::{HashSeed, HashSeedPolicy, ObjectHeap};
use tracing::{debug, warn};

use crate::error::{RuntimeError, RuntimeResult};
use crate::host::{ImportContext, ModuleHost};
use crate::recorder::NameListRecorder;
use crate::registry::{ModuleObject, ModuleOrigin, ModuleRegistry};

/// How one import was satisfied.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImportOutcome {
    /// Already installed; nothing ran.
    Cached,
    /// Materialized from an archive record.
    ArchiveHit,
    /// Compiled through the host.
    HostImport,
}

impl std::fmt::Display for ImportOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cached => write!(f, "cached"),
            Self::ArchiveHit => write!(f, "archive"),
            Self::HostImport => write!(f, "host"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Imported {
    pub module: Arc<ModuleObject>,
    pub outcome: ImportOutcome,
}

/// Owned plan for one name, so the archive borrow ends before the heap
/// and registry change.
enum ArchivePlan {
    Hit { payload: Vec<u8>, depends_on: Vec<ModuleName> },
    Miss,
}

pub struct ImportEngine<'h, H> {
    host: &'h H,
    heap: ObjectHeap,
    registry: ModuleRegistry,
    archive: Option<ArchiveLoader>,
    seed_policy: HashSeedPolicy,
    seed: HashSeed,
    recorder: Option<NameListRecorder>,
}

impl<'h, H: ModuleHost> ImportEngine<'h, H> {
    pub fn new(host: &'h H, seed_policy: HashSeedPolicy) -> Self {
        ImportEngine {
            host,
            heap: ObjectHeap::new(),
            registry: ModuleRegistry::new(),
            archive: None,
            seed_policy,
            seed: seed_policy.resolve(),
            recorder: None,
        }
    }

    /// Serve archived records from `loader` for imports from here on.
    pub fn attach_archive(&mut self, loader: ArchiveLoader) {
        debug!(
            path = %loader.path().display(),
            records = loader.record_count(),
            "archive attached"
        );
        self.archive = Some(loader);
    }

    pub fn attach_recorder(&mut self, recorder: NameListRecorder) {
        self.recorder = Some(recorder);
    }

    pub fn recorder(&self) -> Option<&NameListRecorder> {
        self.recorder.as_ref()
    }

    pub fn take_recorder(&mut self) -> Option<NameListRecorder> {
        self.recorder.take()
    }

    pub fn archive(&self) -> Option<&ArchiveLoader> {
        self.archive.as_ref()
    }

    pub fn heap(&self) -> &ObjectHeap {
        &self.heap
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    pub fn seed(&self) -> HashSeed {
        self.seed
    }

    pub fn seed_policy(&self) -> HashSeedPolicy {
        self.seed_policy
    }

    /// Import `name`, installing it and everything it pulls in.
    pub fn import(&mut self, name: &ModuleName) -> RuntimeResult<Imported> {
        if let Some(module) = self.registry.get(name) {
            return Ok(Imported { module, outcome: ImportOutcome::Cached });
        }
        for parent in name.ancestry() {
            self.import(&parent)?;
        }
        match self.consult_archive(name) {
            ArchivePlan::Hit { payload, depends_on } => {
                self.install_from_archive(name, payload, depends_on)
            }
            ArchivePlan::Miss => self.install_from_host(name),
        }
    }

    fn consult_archive(&self, name: &ModuleName) -> ArchivePlan {
        let loader = match &self.archive {
            Some(loader) => loader,
            None => return ArchivePlan::Miss,
        };
        let record = match loader.lookup(name.as_str()) {
            Some(record) => record,
            None => return ArchivePlan::Miss,
        };
        if record.seed_sensitive() && loader.stamp().seed != self.seed {
            warn!(
                module = %name,
                archive_seed = loader.stamp().seed.value(),
                process_seed = self.seed.value(),
                "hash seed mismatch on seed-sensitive record, importing normally"
            );
            return ArchivePlan::Miss;
        }
        match record.payload() {
            Ok(payload) => ArchivePlan::Hit {
                payload: payload.to_vec(),
                depends_on: record.depends_on().to_vec(),
            },
            Err(err) => {
                warn!(module = %name, error = %err, "corrupt archive record, importing normally");
                ArchivePlan::Miss
            }
        }
    }

    /// Install `name` from its archived payload, then import what its body
    /// would have imported. The module is registered before its
    /// dependencies run, matching the order a real body execution
    /// produces.
    fn install_from_archive(
        &mut self,
        name: &ModuleName,
        payload: Vec<u8>,
        depends_on: Vec<ModuleName>,
    ) -> RuntimeResult<Imported> {
        let code = match sharc_codec::decode(&payload, &mut self.heap) {
            Ok(code) => code,
            Err(err) => {
                warn!(
                    module = %name,
                    error = %err,
                    "archive record failed to decode, importing normally"
                );
                return self.install_from_host(name);
            }
        };
        let module = self.host.instantiate(name, &self.heap, code, ModuleOrigin::Archive)?;
        let module = self.install(module)?;
        debug!(module = %name, "imported from archive");
        for dep in &depends_on {
            self.import(dep)?;
        }
        Ok(Imported { module, outcome: ImportOutcome::ArchiveHit })
    }

    fn install_from_host(&mut self, name: &ModuleName) -> RuntimeResult<Imported> {
        if !self.host.contains(name) {
            return Err(RuntimeError::UnknownModule(name.to_string()));
        }
        let ctx = ImportContext { loaded: self.registry.order().to_vec() };
        let compiled = self.host.compile(name, &mut self.heap, &ctx)?;
        let module = self.host.instantiate(name, &self.heap, compiled.code, ModuleOrigin::Host)?;
        let module = self.install(module)?;
        debug!(module = %name, "imported from host");
        for require in &compiled.requires {
            self.import(require)?;
        }
        Ok(Imported { module, outcome: ImportOutcome::HostImport })
    }

    fn install(&mut self, module: ModuleObject) -> RuntimeResult<Arc<ModuleObject>> {
        let name = module.name.clone();
        let module = self.registry.install(module)?;
        if let Some(recorder) = &mut self.recorder {
            recorder.note(&name);
        }
        Ok(module)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

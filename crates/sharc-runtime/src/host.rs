//! The [`ModuleHost`] trait: the seam between the archive machinery and
//! whatever actually owns modules.
//!
//! The import engine, the archive builder, and the run modes only ever
//! talk to a host through this trait, so the real import system is a
//! pluggable dependency rather than a hard link. The in-tree
//! [`ModuleUniverse`](crate::universe::ModuleUniverse) is one host; tests
//! substitute their own.

use sharc_archive::ModuleName;
use sharc_object::{ObjectError, ObjectHeap, ObjectKind, ObjectRef};

use crate::error::RuntimeResult;
use crate::registry::{ModuleObject, ModuleOrigin};

/// Code flag marking a module body as a package initializer.
pub const CODE_FLAG_PACKAGE: u32 = 0x0001;

/// A module body ready to run: its code plus the imports that body performs.
#[derive(Clone, Debug)]
pub struct CompiledModule {
    pub code: ObjectRef,
    /// Modules the body imports, in source order. Parents of a dotted name
    /// are implied and not listed here.
    pub requires: Vec<ModuleName>,
}

/// Import-time state a host may fold into compilation.
#[derive(Clone, Debug, Default)]
pub struct ImportContext {
    /// Names already installed in this process, oldest first.
    pub loaded: Vec<ModuleName>,
}

pub trait ModuleHost {
    /// Whether a normal import of `name` could succeed.
    fn contains(&self, name: &ModuleName) -> bool;

    /// Compile `name` into a code object in `heap` without running it.
    ///
    /// Compilation must be deterministic over `(name, ctx)`: the builder
    /// relies on compiling a module twice in the same import state to
    /// detect when interleaved imports would change its serialized form.
    fn compile(
        &self,
        name: &ModuleName,
        heap: &mut ObjectHeap,
        ctx: &ImportContext,
    ) -> RuntimeResult<CompiledModule>;

    /// Materialize the module object a finished import of `name` installs.
    ///
    /// The default reads everything it needs from the code object itself,
    /// so it also works for archive-decoded code the host never compiled.
    fn instantiate(
        &self,
        name: &ModuleName,
        heap: &ObjectHeap,
        code: ObjectRef,
        origin: ModuleOrigin,
    ) -> RuntimeResult<ModuleObject> {
        let node = heap.node(code)?;
        let code_obj = node.as_code().ok_or(ObjectError::KindMismatch {
            expected: ObjectKind::Code,
            actual: node.kind(),
        })?;
        let file = heap.str_value(code_obj.filename)?.to_string();
        let is_package = code_obj.flags & CODE_FLAG_PACKAGE != 0;
        let package = if is_package {
            name.to_string()
        } else {
            name.parent().map(|p| p.to_string()).unwrap_or_default()
        };
        let path = if is_package {
            let dir = match file.rfind('/') {
                Some(at) => file[..at].to_string(),
                None => file.clone(),
            };
            Some(vec![dir])
        } else {
            None
        };
        Ok(ModuleObject { name: name.clone(), package, file, path, code, origin })
    }
}

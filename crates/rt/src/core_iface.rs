//! The boundary between this engine and whatever actually runs core-Wasm
//! bytecode. This crate never executes an instruction itself — it only
//! decides *which* modules to instantiate, in *what* order, wired to *which*
//! imports, and hands that decision to a `CoreEngine` implementation.

use weave_ir::{CoreExternKind, CoreFuncType, CoreGlobalType, CoreMemoryType, CoreModuleDef, CoreTableType};

/// An opaque handle to a live core-Wasm module instance, minted and
/// interpreted by the `CoreEngine` implementation. This engine only ever
/// stores and passes these back; it never inspects or constructs one itself.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct CoreInstanceHandle(pub u64);

/// One resolved argument to `CoreEngine::instantiate`, naming an already-live
/// export by instance handle and name rather than by any `weave_ir` index —
/// by the time instantiation calls into this trait, all alias chasing and
/// import matching has already happened.
#[derive(Clone, Debug)]
pub struct CoreImportBinding {
    pub module: String,
    pub name: String,
    pub item: CoreExternRef,
}

/// A reference to a concrete core-Wasm item, as handed across the
/// `CoreEngine` boundary in either direction (an argument going in, or an
/// export coming out).
#[derive(Clone, Debug)]
pub enum CoreExternRef {
    Func(CoreFuncRef),
    Table(CoreTableRef),
    Memory(CoreMemoryRef),
    Global(CoreGlobalRef),
}

impl CoreExternRef {
    pub fn kind(&self) -> CoreExternKind {
        match self {
            CoreExternRef::Func(_) => CoreExternKind::Func,
            CoreExternRef::Table(_) => CoreExternKind::Table,
            CoreExternRef::Memory(_) => CoreExternKind::Memory,
            CoreExternRef::Global(_) => CoreExternKind::Global,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct CoreFuncRef {
    pub instance: CoreInstanceHandle,
    pub export_index: u32,
    pub ty: CoreFuncTypeHandle,
}

/// A lightweight stand-in for a `CoreFuncType` the `CoreEngine` already
/// knows about, so `CoreFuncRef` can stay `Copy`. Implementations are free
/// to make this a simple index into their own signature table.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct CoreFuncTypeHandle(pub u32);

#[derive(Clone, Copy, Debug)]
pub struct CoreTableRef {
    pub instance: CoreInstanceHandle,
    pub export_index: u32,
}

#[derive(Clone, Copy, Debug)]
pub struct CoreMemoryRef {
    pub instance: CoreInstanceHandle,
    pub export_index: u32,
}

#[derive(Clone, Copy, Debug)]
pub struct CoreGlobalRef {
    pub instance: CoreInstanceHandle,
    pub export_index: u32,
}

/// The collaborator this engine drives to actually load and run core-Wasm.
/// A host embeds this crate by supplying a `CoreEngine` implementation
/// (typically backed by a real core-Wasm engine); the test suite supplies a
/// minimal fake (`tests::fake::FakeCoreEngine`) that tracks calls without
/// executing anything.
pub trait CoreEngine {
    /// Instantiate `module` with `imports` already resolved and bound.
    /// Ordering of `imports` matches the module's own import declaration
    /// order; `CoreEngine` impls may assume that.
    fn instantiate_core_module(
        &mut self,
        module: &CoreModuleDef,
        imports: &[CoreImportBinding],
    ) -> anyhow::Result<CoreInstanceHandle>;

    /// Tear down a previously-instantiated module. Called during rollback
    /// (in reverse instantiation order) and during ordinary instance
    /// disposal.
    fn deinstantiate_core_module(&mut self, handle: CoreInstanceHandle) -> anyhow::Result<()>;

    /// Look up an export of `instance` by name, along with its kind, without
    /// calling it.
    fn get_export(&self, instance: CoreInstanceHandle, name: &str) -> Option<CoreExternRef>;

    fn func_type(&self, handle: CoreFuncTypeHandle) -> CoreFuncType;
    fn memory_type(&self, mem: CoreMemoryRef) -> CoreMemoryType;
    fn table_type(&self, table: CoreTableRef) -> CoreTableType;
    fn global_type(&self, global: CoreGlobalRef) -> CoreGlobalType;

    /// Invoke a core function with already-flattened scalar arguments,
    /// returning already-flattened scalar results. Values are untyped
    /// 64-bit cells; callers (the thunk engine) know how to interpret them
    /// against the function's declared `CoreFuncType`.
    fn call_wasm(&mut self, func: CoreFuncRef, args: &[u64]) -> anyhow::Result<Vec<u64>>;

    /// Read `len` bytes starting at `offset` out of `memory`'s linear
    /// address space.
    fn read_memory(&self, memory: CoreMemoryRef, offset: u32, len: u32) -> anyhow::Result<Vec<u8>>;

    /// Write `bytes` into `memory` starting at `offset`.
    fn write_memory(&mut self, memory: CoreMemoryRef, offset: u32, bytes: &[u8]) -> anyhow::Result<()>;

    fn read_global(&self, global: CoreGlobalRef) -> anyhow::Result<u64>;
}

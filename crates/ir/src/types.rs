//! The two type universes an engine in this space has to straddle: core-Wasm
//! types and Component Model
//! value/extern types.
//!
//! Index-bearing variants (`Record { fields: Vec<(String, ValType)> }`,
//! `Own(TypeIndex)`, ...) are always interpreted relative to the component
//! that declared them; this module only defines the shapes, not the
//! resolution.

use crate::index::TypeIndex;
use smallvec::SmallVec;
use std::fmt;

/// A core-Wasm value type, including reference types.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub enum CoreValType {
    I32,
    I64,
    F32,
    F64,
    V128,
    FuncRef,
    ExternRef,
}

impl fmt::Display for CoreValType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CoreValType::I32 => "i32",
            CoreValType::I64 => "i64",
            CoreValType::F32 => "f32",
            CoreValType::F64 => "f64",
            CoreValType::V128 => "v128",
            CoreValType::FuncRef => "funcref",
            CoreValType::ExternRef => "externref",
        };
        f.write_str(s)
    }
}

/// A core-Wasm function signature.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct CoreFuncType {
    pub params: Vec<CoreValType>,
    pub results: Vec<CoreValType>,
}

/// Limits shared by memories and tables: `min` is required, `max` is
/// optional. The memory/table subtyping rule operates directly on these.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Limits {
    pub min: u64,
    pub max: Option<u64>,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct CoreMemoryType {
    pub limits: Limits,
    pub shared: bool,
    /// 32-bit (`false`) or 64-bit (`true`) address space (memory64).
    pub memory64: bool,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct CoreTableType {
    pub element: CoreValType,
    pub limits: Limits,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct CoreGlobalType {
    pub value_type: CoreValType,
    pub mutable: bool,
}

/// A core module's full import/export type signature, as needed by
/// `type_compatible`'s "Core module type" specialization when a module is
/// itself passed around as a component-level value (e.g. as a
/// `FromImport`-sourced module alias target).
#[derive(Clone, Debug, Default)]
pub struct CoreModuleType {
    pub imports: Vec<(String, String, CoreExternType)>,
    pub exports: Vec<(String, CoreExternType)>,
}

#[derive(Clone, PartialEq, Debug)]
pub enum CoreExternType {
    Func(CoreFuncType),
    Memory(CoreMemoryType),
    Table(CoreTableType),
    Global(CoreGlobalType),
}

/// Component Model primitive value types.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub enum Primitive {
    Bool,
    S8,
    U8,
    S16,
    U16,
    S32,
    U32,
    S64,
    U64,
    F32,
    F64,
    Char,
    String,
}

/// A Component Model value type. Compound cases hold their structure inline;
/// `Own`/`Borrow` carry the [`TypeIndex`] of the resource type they name,
/// resolved in the defining component's type space.
#[derive(Clone, PartialEq, Debug)]
pub enum ValType {
    Primitive(Primitive),
    Record(Vec<Field>),
    Variant(Vec<Case>),
    List(Box<ValType>),
    Option(Box<ValType>),
    Result {
        ok: Option<Box<ValType>>,
        err: Option<Box<ValType>>,
    },
    Tuple(Vec<ValType>),
    Flags(Vec<String>),
    Enum(Vec<String>),
    Own(TypeIndex),
    Borrow(TypeIndex),
}

#[derive(Clone, PartialEq, Debug)]
pub struct Field {
    pub name: String,
    pub ty: ValType,
}

#[derive(Clone, PartialEq, Debug)]
pub struct Case {
    pub name: String,
    pub payload: Option<ValType>,
}

/// A Component Model function type: named params (order matters for
/// lowering), unnamed or single named result list.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct ComponentFuncType {
    pub params: Vec<(String, ValType)>,
    pub results: Vec<(String, ValType)>,
}

impl ComponentFuncType {
    /// Number of core-Wasm scalar cells this signature flattens to before
    /// the "too big, pass a pointer" rule kicks in. `16` matches the
    /// Canonical ABI's `MAX_FLAT_PARAMS`/`MAX_FLAT_RESULTS`.
    pub const MAX_FLAT: usize = 16;
}

/// `{name -> extern description}` pairs, used by both instance types
/// (exports only) and component types (imports + exports).
pub type ExternMap = Vec<(String, ExternDesc)>;

/// A component type: the (imports, exports) pair the component-type
/// subtyping rule operates on.
#[derive(Clone, Debug, Default)]
pub struct ComponentType {
    pub imports: ExternMap,
    pub exports: ExternMap,
}

/// An instance type: just the exports a component instance (or nested
/// component-instance import) presents.
#[derive(Clone, Debug, Default)]
pub struct InstanceType {
    pub exports: ExternMap,
}

/// The extern description attached to an import or an export.
#[derive(Clone, Debug)]
pub enum ExternDesc {
    Func(ComponentFuncType),
    Value(ValType),
    Module(CoreModuleType),
    Component(ComponentType),
    Instance(InstanceType),
    /// `{type-bound}` import: a type is imported abstractly, optionally
    /// bounded by `eq <TypeIndex>`.
    TypeBound(Option<TypeIndex>),
}

/// A resolved (non-recursive) description of a core-Wasm item kind, used by
/// the Import Matcher to key `(name, kind)` lookups without needing
/// the full type attached.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub enum CoreExternKind {
    Func,
    Table,
    Memory,
    Global,
}

impl CoreExternType {
    pub fn kind(&self) -> CoreExternKind {
        match self {
            CoreExternType::Func(_) => CoreExternKind::Func,
            CoreExternType::Table(_) => CoreExternKind::Table,
            CoreExternType::Memory(_) => CoreExternKind::Memory,
            CoreExternType::Global(_) => CoreExternKind::Global,
        }
    }
}

/// A stack-allocated small vector of flattened core cell types, used by the
/// Canonical ABI's parameter/result flattening. `SmallVec` avoids a
/// heap allocation for the overwhelmingly common case of a handful of
/// scalar parameters.
pub type FlatTypes = SmallVec<[CoreValType; 8]>;

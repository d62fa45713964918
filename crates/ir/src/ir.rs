//! The immutable Component Definition tree. This is the *input* to
//! instantiation: a parsed, already-validated-at-the-index-level structure.
//! Producing one from a wasm binary is the binary decoder's job; this module only describes the shape the decoder is expected to
//! hand off.

use crate::index::*;
use crate::types::*;
use cranelift_entity::PrimaryMap;
use std::sync::Arc;

/// String encoding options on a canonical `lift`/`lower`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum StringEncoding {
    Utf8,
    Utf16,
    Latin1OrUtf16,
}

impl Default for StringEncoding {
    fn default() -> Self {
        StringEncoding::Utf8
    }
}

/// The subset of a core module's items a canonical option can name.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CanonicalOptionFuncRef {
    /// A function defined by / aliased into the same component, named by
    /// its position in the component's (core) function index space.
    Index(CoreFuncIndex),
    /// A function reached via an alias definition.
    Alias(AliasIndex),
}

/// Options attached to a `canonical.lift` or `canonical.lower`. Unlike
/// `Canonical::Lift`'s own `core_func` slot, these always name their target
/// through an alias — a binary producer has no reason to ever emit a flat
/// index here, since the memory/realloc/post-return exports they name
/// almost always live on a module instantiated earlier in the same
/// component, reached the same way any other cross-instance reference is.
#[derive(Clone, Default, Debug)]
pub struct CanonicalOptions {
    pub memory: Option<AliasIndex>,
    pub realloc: Option<AliasIndex>,
    pub post_return: Option<AliasIndex>,
    pub string_encoding: StringEncoding,
    pub r#async: bool,
}

/// A single entry in `Definition::canonicals`.
#[derive(Clone, Debug)]
pub enum Canonical {
    /// Builds a Component-level function from a core function.
    Lift {
        core_func: CanonicalOptionFuncRef,
        func_type: TypeIndex,
        options: CanonicalOptions,
    },
    /// Builds a core function from a Component-level function.
    Lower {
        func: CanonicalIndexOrImport,
        options: CanonicalOptions,
    },
}

/// What a `canonical.lower` lowers: either another canonical definition
/// (composing lifts) or directly a resolved import function. The source
/// binary format always expresses this as a function index in the
/// component function space; we keep both readings explicit rather than
/// collapsing them, since which one applies depends on how that index was
/// produced (defined locally vs. imported).
#[derive(Clone, Copy, Debug)]
pub enum CanonicalIndexOrImport {
    Canonical(CanonicalIndex),
    Import(ImportIndex),
}

/// A core module definition: an opaque byte image plus its decoded
/// signature. The byte image itself is handed verbatim to the core-Wasm
/// loader; this engine never inspects it.
#[derive(Clone)]
pub struct CoreModuleDef {
    pub bytes: Arc<[u8]>,
    pub ty: CoreModuleType,
}

/// One argument in a core-instance `instantiate`: the import's
/// `(module, field)` pair on the core-Wasm side is collapsed to a single
/// `name` because Component Model core-instance args are name-indexed
/// against the *instantiation argument record*, not a two-level namespace.
#[derive(Clone, Debug)]
pub struct CoreInstantiateArg {
    pub name: String,
    pub kind: CoreExternKind,
    /// The core instance definition whose export named `name` supplies this
    /// argument, identified by the *source*'s own definition index.
    pub source_instance: CoreInstanceIndex,
}

/// A single named item contributed to an `InlineExport` pseudo-instance.
#[derive(Clone, Debug)]
pub struct InlineExportItem {
    pub name: String,
    pub kind: CoreExternKind,
    pub alias: AliasIndex,
}

/// `Definition::core_instances` entries.
#[derive(Clone, Debug)]
pub enum CoreInstanceDef {
    Instantiate {
        module: CoreModuleIndex,
        args: Vec<CoreInstantiateArg>,
    },
    /// A virtual, non-instantiating grouping of named items — never
    /// produces a runtime module instance.
    InlineExport(Vec<InlineExportItem>),
}

/// `Definition::aliases` target kinds.
#[derive(Clone, Debug)]
pub enum AliasTarget {
    CoreExport {
        instance: CoreInstanceIndex,
        name: String,
    },
    /// A named export of an already-instantiated *component* instance
    /// (the component-level analogue of `CoreExport`): func, value, type,
    /// instance or nested-component exports of a sibling all flow through
    /// here.
    InstanceExport {
        instance: ComponentInstanceIndex,
        name: String,
    },
    /// One of this component's own resolved imports, reached directly
    /// rather than through an intervening instance — the path a nested
    /// `instantiate` argument or a pass-through export takes when it names
    /// something the enclosing component was itself handed rather than
    /// something it built.
    Import(ImportIndex),
    Outer {
        depth: u32,
        index: OuterIndex,
    },
    Type(TypeIndex),
    Module(ComponentModuleIndex),
    Component(ComponentModuleIndex),
    /// Reaches a whole component instance directly by its definition-time
    /// index, for the rarer case of handing a nested instance onward as a
    /// unit rather than one of its exports.
    Instance(ComponentInstanceIndex),
}

/// The index-space an `outer` alias reaches into, in the ancestor selected
/// by `depth`.
#[derive(Clone, Copy, Debug)]
pub enum OuterIndex {
    CoreModule(CoreModuleIndex),
    Component(ComponentModuleIndex),
    Type(TypeIndex),
}

/// The sort tag carried by an alias definition. Determines both which
/// [`AliasTarget`] shapes are legal and what the resolver tags its result
/// with.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Sort {
    CoreFunc,
    CoreTable,
    CoreMemory,
    CoreGlobal,
    Func,
    Value,
    Type,
    Instance,
    Component,
}

#[derive(Clone, Debug)]
pub struct AliasDef {
    pub sort: Sort,
    pub target: AliasTarget,
}

/// One argument to a nested-component `instantiate`:
/// names a runtime item independent of whether that item comes from an
/// outer import, a core-instance export (via alias), or a sibling
/// component-instance export.
#[derive(Clone, Debug)]
pub struct ComponentInstantiateArg {
    pub name: String,
    pub alias: AliasIndex,
}

/// `Definition::component_instances` entries.
#[derive(Clone, Debug)]
pub enum ComponentInstanceDef {
    Instantiate {
        component: ComponentModuleIndex,
        args: Vec<ComponentInstantiateArg>,
    },
    /// Bound directly to one of this component's own resolved imports
    ///.
    FromImport { import: ImportIndex },
}

/// `Definition::imports` entries.
#[derive(Clone, Debug)]
pub struct ImportDef {
    pub name: String,
    pub desc: ExternDesc,
}

/// The source of an export, before resolution.
#[derive(Clone, Debug)]
pub enum ExportKind {
    Func(CanonicalIndex),
    Instance(AliasIndex),
    Component(AliasIndex),
    Type(AliasIndex),
    Value(ValueIndex),
    Module(AliasIndex),
}

/// `Definition::exports` entries.
#[derive(Clone, Debug)]
pub struct ExportDef {
    pub name: String,
    pub kind: ExportKind,
    pub type_annotation: Option<TypeIndex>,
}

/// `Definition::start`: at most one per component. The binary format
/// cannot express "no start" as an empty `Vec` ambiguity-free, so this is an
/// `Option` at the `Definition` level rather than a zero-length list here.
#[derive(Clone, Debug)]
pub struct StartDef {
    pub func: CanonicalIndexOrImport,
    pub args: Vec<ValueIndex>,
    pub result_count: u32,
}

/// A literal Component value with its parsed type, as stored in
/// `Definition::values`. Only the shapes `start` arguments and default
/// values need are kept — this is not a general-purpose runtime `Val`
/// (see `weave_rt::values::Val` for that).
#[derive(Clone, Debug)]
pub enum LiteralValue {
    Bool(bool),
    S8(i8),
    U8(u8),
    S16(i16),
    U16(u16),
    S32(i32),
    U32(u32),
    S64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
    Char(char),
    String(String),
    List(Vec<LiteralValue>),
    Record(Vec<LiteralValue>),
    Variant { case: u32, payload: Option<Box<LiteralValue>> },
    Tuple(Vec<LiteralValue>),
}

#[derive(Clone, Debug)]
pub struct ValueDef {
    pub ty: ValType,
    pub value: LiteralValue,
}

/// The full, immutable Component Definition: every section is an
/// ordered sequence with stable definition-time indexes.
#[derive(Clone, Default)]
pub struct Definition {
    pub core_modules: PrimaryMap<CoreModuleIndex, CoreModuleDef>,
    pub core_instances: PrimaryMap<CoreInstanceIndex, CoreInstanceDef>,
    pub component_modules: PrimaryMap<ComponentModuleIndex, Arc<Definition>>,
    pub component_instances: PrimaryMap<ComponentInstanceIndex, ComponentInstanceDef>,
    pub aliases: PrimaryMap<AliasIndex, AliasDef>,
    pub types: PrimaryMap<TypeIndex, ExternDesc>,
    pub canonicals: PrimaryMap<CanonicalIndex, Canonical>,
    pub imports: PrimaryMap<ImportIndex, ImportDef>,
    pub exports: PrimaryMap<ExportIndex, ExportDef>,
    pub start: Option<StartDef>,
    pub values: PrimaryMap<ValueIndex, ValueDef>,
}

impl Definition {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `core_instances` entry that actually instantiates a module, in
    /// declaration order.
    pub fn instantiate_core_instances(&self) -> impl Iterator<Item = (CoreInstanceIndex, &CoreModuleIndex, &[CoreInstantiateArg])> {
        self.core_instances.iter().filter_map(|(idx, def)| match def {
            CoreInstanceDef::Instantiate { module, args } => Some((idx, module, args.as_slice())),
            CoreInstanceDef::InlineExport(_) => None,
        })
    }
}

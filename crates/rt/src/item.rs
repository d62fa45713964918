//! The single runtime currency every resolution step — alias chasing,
//! import matching, export population — passes around: one tagged enum
//! covering everything a `Sort` can name, plus the function value shape
//! used by both canonical lifting and host imports.

use crate::core_iface::{CoreExternRef, CoreFuncRef, CoreGlobalRef, CoreMemoryRef, CoreTableRef};
use crate::instance::ComponentInstance;
use crate::values::Val;
use std::fmt;
use std::sync::Arc;
use weave_ir::{CoreModuleDef, Definition, ExternDesc};

/// A callable component-level function, regardless of whether it was
/// produced by lifting a core function or supplied directly by the host.
pub trait HostFunc {
    fn call(&self, args: &[Val]) -> anyhow::Result<Vec<Val>>;
}

impl fmt::Debug for dyn HostFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<host func>")
    }
}

/// Resolved canonical options: each `CanonicalOptionFuncRef` has already
/// been chased down to the concrete core item it names, so the thunk engine
/// never needs to re-resolve an alias mid-call.
#[derive(Clone, Debug)]
pub struct ResolvedCanonicalOptions {
    pub memory: Option<CoreMemoryRef>,
    pub realloc: Option<CoreFuncRef>,
    pub post_return: Option<CoreFuncRef>,
    pub string_encoding: weave_ir::StringEncoding,
    pub r#async: bool,
}

/// A func that lifts/lowers through the canonical ABI on top of a core
/// function, versus one a host supplies directly with no core function
/// behind it at all (an imported host capability).
#[derive(Clone)]
pub enum FuncValue {
    Lifted {
        core_func: CoreFuncRef,
        ty: weave_ir::ComponentFuncType,
        options: ResolvedCanonicalOptions,
    },
    Host(Arc<dyn HostFunc>),
}

impl fmt::Debug for FuncValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FuncValue::Lifted { ty, .. } => write!(f, "FuncValue::Lifted({ty:?})"),
            FuncValue::Host(_) => write!(f, "FuncValue::Host(..)"),
        }
    }
}

/// Everything a `Sort` can resolve to, at runtime. Core items are opaque
/// references into whatever `CoreEngine` is backing this instantiation;
/// component-level items are owned directly by this crate.
#[derive(Clone, Debug)]
pub enum Item {
    CoreFunc(CoreFuncRef),
    CoreTable(CoreTableRef),
    CoreMemory(CoreMemoryRef),
    CoreGlobal(CoreGlobalRef),
    Func(Arc<FuncValue>),
    Value(Arc<Val>),
    /// A resolved type description, carried by value rather than by index
    /// since the component that declared it and the component consuming it
    /// (after an alias or `outer` hop) are not the same index space.
    Type(Arc<ExternDesc>),
    Instance(Arc<ComponentInstance>),
    Component(Arc<Definition>),
    Module(Arc<CoreModuleDef>),
}

impl Item {
    pub fn sort_name(&self) -> &'static str {
        match self {
            Item::CoreFunc(_) => "core-func",
            Item::CoreTable(_) => "core-table",
            Item::CoreMemory(_) => "core-memory",
            Item::CoreGlobal(_) => "core-global",
            Item::Func(_) => "func",
            Item::Value(_) => "value",
            Item::Type(_) => "type",
            Item::Instance(_) => "instance",
            Item::Component(_) => "component",
            Item::Module(_) => "module",
        }
    }

    pub fn as_core_extern_ref(&self) -> Option<CoreExternRef> {
        match self {
            Item::CoreFunc(f) => Some(CoreExternRef::Func(*f)),
            Item::CoreTable(t) => Some(CoreExternRef::Table(*t)),
            Item::CoreMemory(m) => Some(CoreExternRef::Memory(*m)),
            Item::CoreGlobal(g) => Some(CoreExternRef::Global(*g)),
            _ => None,
        }
    }

    pub fn from_core_extern_ref(r: CoreExternRef) -> Item {
        match r {
            CoreExternRef::Func(f) => Item::CoreFunc(f),
            CoreExternRef::Table(t) => Item::CoreTable(t),
            CoreExternRef::Memory(m) => Item::CoreMemory(m),
            CoreExternRef::Global(g) => Item::CoreGlobal(g),
        }
    }
}

/// The `ComponentFuncType` a func item presents, whether lifted from a core
/// function or supplied by a host (which carries no declared signature of
/// its own, so it matches structurally against whatever the import site
/// expects — a host capability is trusted by construction).
pub fn func_value_type(f: &FuncValue) -> weave_ir::ComponentFuncType {
    match f {
        FuncValue::Lifted { ty, .. } => ty.clone(),
        FuncValue::Host(_) => weave_ir::ComponentFuncType::default(),
    }
}

pub fn instance_type_of(inst: &ComponentInstance) -> weave_ir::InstanceType {
    let exports = inst
        .exports
        .iter()
        .filter_map(|(name, item)| item_extern_desc(item).map(|d| (name.clone(), d)))
        .collect();
    weave_ir::InstanceType { exports }
}

pub fn component_type_of(def: &Definition) -> weave_ir::ComponentType {
    let imports = def
        .imports
        .values()
        .map(|i| (i.name.clone(), i.desc.clone()))
        .collect();
    let exports = def
        .exports
        .values()
        .filter_map(|e| e.type_annotation.map(|t| (e.name.clone(), t)))
        .filter_map(|(name, t)| def.types.get(t).map(|d| (name, d.clone())))
        .collect();
    weave_ir::ComponentType { imports, exports }
}

/// The extern description an already-resolved runtime item presents, used
/// both to type-check an import binding and to type-check a declared
/// export annotation against what actually got exported.
pub fn item_extern_desc(item: &Item) -> Option<ExternDesc> {
    match item {
        // A lifted func carries a real declared signature and is checked
        // against it; a host func has none to check against, so it skips
        // the structural compatibility pass the same way a value import
        // does.
        Item::Func(f) => match f.as_ref() {
            FuncValue::Lifted { .. } => Some(ExternDesc::Func(func_value_type(f))),
            FuncValue::Host(_) => None,
        },
        Item::Value(_) => None,
        Item::Instance(inst) => Some(ExternDesc::Instance(instance_type_of(inst))),
        Item::Component(def) => Some(ExternDesc::Component(component_type_of(def))),
        Item::Module(m) => Some(ExternDesc::Module(m.ty.clone())),
        Item::Type(desc) => Some((**desc).clone()),
        _ => None,
    }
}

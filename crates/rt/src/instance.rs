//! The Instance Builder: the strictly-ordered walk that turns a `Definition`
//! plus a set of resolved host/sibling imports into a live `ComponentInstance`,
//! with all-or-nothing rollback if any step fails partway through.

use crate::abi;
use crate::alias;
use crate::config::{EngineConfig, Limits};
use crate::core_iface::{CoreEngine, CoreExternRef, CoreFuncRef, CoreImportBinding, CoreInstanceHandle};
use crate::error::{EngineError, EngineResult};
use crate::import_match::match_imports;
use crate::item::{item_extern_desc, FuncValue, Item};
use crate::values::Val;
use cranelift_entity::EntityRef;
use indexmap::IndexMap;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use weave_ir::{
    CanonicalIndex, CanonicalIndexOrImport, CoreInstanceDef, CoreInstanceIndex, Definition,
    ExportKind, ImportIndex, ValueIndex,
};

/// One core module's instantiation bookkeeping entry: either a real running
/// instance, or a virtual grouping that re-exports other items without ever
/// calling into the core engine. Replaces the classic `(uint32)-1` sentinel
/// some decoders use to mark "not actually instantiated" with an explicit
/// variant, so a reader (and the type checker) can't mistake one for the
/// other.
#[derive(Clone, Debug)]
pub enum CoreInstanceSlot {
    Instantiated(CoreInstanceHandle),
    Inline(Vec<weave_ir::InlineExportItem>),
}

/// The scope a single component's instantiation runs inside: its own
/// definition, a link to the enclosing scope (for `outer` aliases), and
/// every runtime item produced so far. Built up incrementally while
/// instantiating, then sealed behind an `Arc` so nested components and the
/// finished instance can share it cheaply.
pub struct Env {
    pub definition: Arc<Definition>,
    pub parent: Option<Arc<Env>>,
    pub core_engine: Rc<RefCell<Box<dyn CoreEngine>>>,
    pub limits: Limits,
    /// This instance's own resource handle tables, one per resource type
    /// touched so far. Shared (not cloned) across the `snapshot()` taken for
    /// nested-component `outer` lookups, since a child must see the *same*
    /// live tables its parent mutates, not a point-in-time copy.
    pub resources: Arc<crate::resource::ResourceTables>,
    pub core_instances: Vec<CoreInstanceSlot>,
    /// Flat, whole-component function index space: every function export of
    /// every instantiated core module, in instantiation then declared-export
    /// order. Resolves the ambiguity in how `canonical.lift` names its core
    /// function when it does so by flat index rather than by alias.
    pub flat_core_funcs: Vec<CoreFuncRef>,
    pub component_instances: Vec<Arc<ComponentInstance>>,
    pub imports: Vec<Item>,
    pub canonicals: Vec<Arc<FuncValue>>,
    pub values: Vec<Arc<Val>>,
}

impl Env {
    pub(crate) fn core_instance(&self, idx: CoreInstanceIndex) -> Option<&CoreInstanceSlot> {
        self.core_instances.get(idx.index())
    }

    pub(crate) fn component_instance(&self, idx: weave_ir::ComponentInstanceIndex) -> Option<&Arc<ComponentInstance>> {
        self.component_instances.get(idx.index())
    }

    pub(crate) fn import(&self, idx: ImportIndex) -> Option<&Item> {
        self.imports.get(idx.index())
    }

    pub(crate) fn canonical(&self, idx: CanonicalIndex) -> Option<&Arc<FuncValue>> {
        self.canonicals.get(idx.index())
    }

    pub(crate) fn value(&self, idx: ValueIndex) -> Option<&Arc<Val>> {
        self.values.get(idx.index())
    }
}

/// A live, fully-linked component instance: its own (now-closed) scope plus
/// the materialized export table other components and the host see.
pub struct ComponentInstance {
    pub env: Arc<Env>,
    pub exports: IndexMap<String, Item>,
}

impl ComponentInstance {
    pub fn get_export(&self, name: &str) -> Option<Item> {
        self.exports.get(name).cloned()
    }

    /// Mint a fresh owning handle for `rep` in this instance's table for
    /// `ty` — the `new` operation of §4.7's public contract.
    pub fn new_resource_handle(&self, ty: weave_ir::TypeIndex, rep: u32) -> EngineResult<Val> {
        let index = self.env.resources.new_handle(ty, rep)?;
        Ok(Val::Own(crate::values::Handle { ty, index }))
    }

    /// Resolve a handle this instance's table minted back to its
    /// representation value.
    pub fn resource_rep(&self, handle: crate::values::Handle) -> EngineResult<u32> {
        self.env.resources.rep(handle.ty, handle.index)
    }

    /// Invalidate an owning handle in this instance's table.
    pub fn drop_resource_handle(&self, handle: crate::values::Handle) -> EngineResult<()> {
        self.env.resources.drop_handle(handle.ty, handle.index)
    }

    /// Move ownership of `handle` from this instance's table into `dst`'s,
    /// returning the handle valid in `dst`. Matches `own<T>`'s transfer
    /// semantics: `handle` is invalid in `self` immediately afterward.
    pub fn transfer_resource_handle(&self, dst: &ComponentInstance, handle: crate::values::Handle) -> EngineResult<Val> {
        let src_table = self.env.resources.table(handle.ty);
        let dst_table = dst.env.resources.table(handle.ty);
        let index = crate::resource::transfer(&src_table, &dst_table, handle.index)?;
        Ok(Val::Own(crate::values::Handle { ty: handle.ty, index }))
    }

    /// Best-effort static accounting of resource types this instance's
    /// export surface touches, without walking call frames. Mirrors the
    /// kind of summary a host uses to size handle tables up front.
    pub fn resources_summary(&self) -> Vec<weave_ir::TypeIndex> {
        let mut out = Vec::new();
        for item in self.exports.values() {
            if let Item::Type(desc) = item {
                collect_resource_types(desc, &mut out);
            }
        }
        out
    }
}

fn collect_resource_types(desc: &weave_ir::ExternDesc, out: &mut Vec<weave_ir::TypeIndex>) {
    if let weave_ir::ExternDesc::Value(v) = desc {
        collect_resource_types_in_val(v, out);
    }
}

fn collect_resource_types_in_val(v: &weave_ir::ValType, out: &mut Vec<weave_ir::TypeIndex>) {
    match v {
        weave_ir::ValType::Own(t) | weave_ir::ValType::Borrow(t) => out.push(*t),
        weave_ir::ValType::List(inner) | weave_ir::ValType::Option(inner) => {
            collect_resource_types_in_val(inner, out)
        }
        weave_ir::ValType::Record(fields) => {
            for f in fields {
                collect_resource_types_in_val(&f.ty, out);
            }
        }
        weave_ir::ValType::Tuple(items) => {
            for t in items {
                collect_resource_types_in_val(t, out);
            }
        }
        weave_ir::ValType::Variant(cases) => {
            for c in cases {
                if let Some(p) = &c.payload {
                    collect_resource_types_in_val(p, out);
                }
            }
        }
        weave_ir::ValType::Result { ok, err } => {
            if let Some(ok) = ok {
                collect_resource_types_in_val(ok, out);
            }
            if let Some(err) = err {
                collect_resource_types_in_val(err, out);
            }
        }
        _ => {}
    }
}

/// Undo log for instantiation rollback: each entry knows how to reverse one
/// already-completed step. Run in reverse order on any failure so a
/// half-built instance never escapes — every core instance stood up anywhere
/// in a nested instantiation tree comes down together.
enum Undo {
    CoreModule(CoreInstanceHandle),
}

struct Rollback {
    log: Vec<Undo>,
    committed: bool,
}

impl Rollback {
    fn new() -> Self {
        Rollback { log: Vec::new(), committed: false }
    }

    fn push(&mut self, u: Undo) {
        self.log.push(u);
    }

    fn commit(mut self) {
        self.committed = true;
        self.log.clear();
        // fields only exist to appease the "unused" lint on `committed`
        let _ = self.committed;
    }

    fn unwind(&mut self, core_engine: &Rc<RefCell<Box<dyn CoreEngine>>>) {
        while let Some(u) = self.log.pop() {
            match u {
                Undo::CoreModule(handle) => {
                    if let Err(e) = core_engine.borrow_mut().deinstantiate_core_module(handle) {
                        log::warn!("error tearing down core instance during rollback: {e}");
                    }
                }
            }
        }
    }
}

impl Drop for Rollback {
    fn drop(&mut self) {
        if !self.committed && !self.log.is_empty() {
            log::debug!("rollback dropped with {} pending undo step(s) uncommitted", self.log.len());
        }
    }
}

/// One resolved import a host or enclosing component hands to `instantiate`.
pub struct ImportBinding {
    pub name: String,
    pub item: Item,
}

/// Build a live component instance from `definition`, under `parent` (the
/// enclosing component's sealed scope, or `None` at the root), given
/// `resolved_imports` matched by name against `definition.imports`.
///
/// Fails with no observable side effect beyond whatever rollback could not
/// be perfectly undone (logged, never silently ignored) — see `Rollback`.
pub fn instantiate(
    core_engine: Rc<RefCell<Box<dyn CoreEngine>>>,
    config: &EngineConfig,
    definition: Arc<Definition>,
    parent: Option<Arc<Env>>,
    resolved_imports: Vec<ImportBinding>,
) -> EngineResult<Arc<ComponentInstance>> {
    let mut rollback = Rollback::new();
    match instantiate_inner(core_engine.clone(), config, definition, parent, resolved_imports, &mut rollback) {
        Ok(instance) => {
            rollback.commit();
            Ok(instance)
        }
        Err(e) => {
            rollback.unwind(&core_engine);
            Err(e)
        }
    }
}

/// Does the actual work of `instantiate`, but pushes every undoable step
/// into the caller's `rollback` log instead of owning one itself. Nested
/// component instantiation calls back into this directly (not the public
/// `instantiate`) so one failure anywhere in the tree unwinds every core
/// instance built at every level, not just the failing component's own.
fn instantiate_inner(
    core_engine: Rc<RefCell<Box<dyn CoreEngine>>>,
    config: &EngineConfig,
    definition: Arc<Definition>,
    parent: Option<Arc<Env>>,
    resolved_imports: Vec<ImportBinding>,
    rollback: &mut Rollback,
) -> EngineResult<Arc<ComponentInstance>> {
    let depth = parent.as_ref().map(|p| ancestor_depth(p) + 1).unwrap_or(0);
    if depth > config.limits.max_instantiation_depth {
        return Err(EngineError::DefinitionInvalid(
            "instantiation recursion exceeded the configured depth limit".into(),
        ));
    }

    let imports = match_imports(&definition, resolved_imports)?;

    let mut env = Env {
        definition: definition.clone(),
        parent,
        core_engine: core_engine.clone(),
        limits: config.limits,
        resources: Arc::new(crate::resource::ResourceTables::new(config.limits.max_handles_per_table)),
        core_instances: Vec::with_capacity(definition.core_instances.len()),
        flat_core_funcs: Vec::new(),
        component_instances: Vec::with_capacity(definition.component_instances.len()),
        imports,
        canonicals: Vec::with_capacity(definition.canonicals.len()),
        values: Vec::with_capacity(definition.values.len()),
    };

    build_core_instances(&mut env, &definition, rollback)?;
    build_canonicals(&mut env, &definition)?;
    build_values(&mut env, &definition)?;
    build_component_instances(&mut env, &definition, rollback)?;
    run_start(&mut env, &definition)?;

    let sealed = Arc::new(env);
    let exports = populate_exports(&sealed, &definition)?;
    Ok(Arc::new(ComponentInstance { env: sealed, exports }))
}

fn ancestor_depth(env: &Env) -> u32 {
    let mut d = 0;
    let mut cur = env.parent.as_ref();
    while let Some(p) = cur {
        d += 1;
        cur = p.parent.as_ref();
    }
    d
}

fn build_core_instances(env: &mut Env, definition: &Definition, rollback: &mut Rollback) -> EngineResult<()> {
    for (_idx, def) in definition.core_instances.iter() {
        match def {
            CoreInstanceDef::Instantiate { module, args } => {
                let module_def = definition
                    .core_modules
                    .get(*module)
                    .ok_or_else(|| EngineError::DefinitionInvalid(format!("no core module at index {module:?}")))?;

                // Walk the module's own declared import order (§4.3 step
                // order), not `args`' order, so a definition with several
                // unsatisfiable imports always reports the same one first
                // regardless of how the instantiate-args record happens to
                // be laid out.
                let mut bindings = Vec::with_capacity(module_def.ty.imports.len());
                for (import_module, field, decl_ty) in &module_def.ty.imports {
                    let arg = args
                        .iter()
                        .find(|a| &a.name == field && a.kind == decl_ty.kind())
                        .ok_or_else(|| EngineError::ImportUnsatisfied {
                            module: import_module.clone(),
                            field: field.clone(),
                        })?;

                    let source = env.core_instance(arg.source_instance).ok_or_else(|| {
                        EngineError::DefinitionInvalid(format!(
                            "core instantiate argument `{}` names an undefined source instance",
                            arg.name
                        ))
                    })?;
                    let extern_ref = lookup_core_export_by_name(env, source, &arg.name)?;
                    if extern_ref.kind() != decl_ty.kind() {
                        return Err(EngineError::ImportUnsatisfied {
                            module: import_module.clone(),
                            field: field.clone(),
                        });
                    }
                    let actual_ty = core_extern_type(env, &extern_ref);
                    weave_ir::core_extern_compatible(decl_ty, &actual_ty).map_err(|mismatch| {
                        EngineError::ImportTypeMismatch { name: field.clone(), mismatch }
                    })?;

                    bindings.push(CoreImportBinding {
                        module: import_module.clone(),
                        name: field.clone(),
                        item: extern_ref,
                    });
                }

                let handle = env
                    .core_engine
                    .borrow_mut()
                    .instantiate_core_module(module_def, &bindings)
                    .map_err(EngineError::CoreInstantiation)?;
                rollback.push(Undo::CoreModule(handle));
                env.core_instances.push(CoreInstanceSlot::Instantiated(handle));

                for (name, ty) in &module_def.ty.exports {
                    if let weave_ir::CoreExternType::Func(_) = ty {
                        if let Some(extern_ref) = env.core_engine.borrow().get_export(handle, name) {
                            if let CoreExternRef::Func(f) = extern_ref {
                                env.flat_core_funcs.push(f);
                            }
                        }
                    }
                }
            }
            CoreInstanceDef::InlineExport(items) => {
                env.core_instances.push(CoreInstanceSlot::Inline(items.clone()));
            }
        }
    }
    Ok(())
}

fn lookup_core_export_by_name(env: &Env, slot: &CoreInstanceSlot, name: &str) -> EngineResult<CoreExternRef> {
    match slot {
        CoreInstanceSlot::Instantiated(handle) => env
            .core_engine
            .borrow()
            .get_export(*handle, name)
            .ok_or_else(|| EngineError::DefinitionInvalid(format!("no export named `{name}` on source instance"))),
        CoreInstanceSlot::Inline(items) => {
            let item = items
                .iter()
                .find(|it| it.name == name)
                .ok_or_else(|| EngineError::DefinitionInvalid(format!("no inline-exported item named `{name}`")))?;
            let resolved = alias::resolve(env, item.alias)?;
            resolved
                .as_core_extern_ref()
                .ok_or_else(|| EngineError::DefinitionInvalid(format!("inline-exported item `{name}` is not a core item")))
        }
    }
}

/// Read the actual core-Wasm type behind a resolved `CoreExternRef` off the
/// `CoreEngine`, so a provided core-instantiate argument can be checked
/// against the module's declared import type (§4.1) rather than just its
/// `CoreExternKind`.
fn core_extern_type(env: &Env, r: &CoreExternRef) -> weave_ir::CoreExternType {
    let engine = env.core_engine.borrow();
    match r {
        CoreExternRef::Func(f) => weave_ir::CoreExternType::Func(engine.func_type(f.ty)),
        CoreExternRef::Table(t) => weave_ir::CoreExternType::Table(engine.table_type(*t)),
        CoreExternRef::Memory(m) => weave_ir::CoreExternType::Memory(engine.memory_type(*m)),
        CoreExternRef::Global(g) => weave_ir::CoreExternType::Global(engine.global_type(*g)),
    }
}

fn resolve_func_ref(env: &Env, r: &weave_ir::CanonicalOptionFuncRef) -> EngineResult<CoreFuncRef> {
    match r {
        weave_ir::CanonicalOptionFuncRef::Index(idx) => env
            .flat_core_funcs
            .get(idx.index())
            .copied()
            .ok_or_else(|| EngineError::DefinitionInvalid(format!("no flat core function at index {idx:?}"))),
        weave_ir::CanonicalOptionFuncRef::Alias(alias_idx) => match alias::resolve(env, *alias_idx)? {
            Item::CoreFunc(f) => Ok(f),
            other => Err(EngineError::AliasSortMismatch { expected: "core-func", found: other.sort_name() }),
        },
    }
}

fn resolve_options(env: &Env, opts: &weave_ir::CanonicalOptions) -> EngineResult<crate::item::ResolvedCanonicalOptions> {
    let memory = opts
        .memory
        .map(|alias_idx| match alias::resolve(env, alias_idx)? {
            Item::CoreMemory(m) => Ok(m),
            other => Err(EngineError::AliasSortMismatch { expected: "core-memory", found: other.sort_name() }),
        })
        .transpose()?;
    let realloc = opts
        .realloc
        .map(|alias_idx| match alias::resolve(env, alias_idx)? {
            Item::CoreFunc(f) => Ok(f),
            other => Err(EngineError::AliasSortMismatch { expected: "core-func", found: other.sort_name() }),
        })
        .transpose()?;
    let post_return = opts
        .post_return
        .map(|alias_idx| match alias::resolve(env, alias_idx)? {
            Item::CoreFunc(f) => Ok(f),
            other => Err(EngineError::AliasSortMismatch { expected: "core-func", found: other.sort_name() }),
        })
        .transpose()?;
    Ok(crate::item::ResolvedCanonicalOptions {
        memory,
        realloc,
        post_return,
        string_encoding: opts.string_encoding,
        r#async: opts.r#async,
    })
}

fn build_canonicals(env: &mut Env, definition: &Definition) -> EngineResult<()> {
    for (_idx, c) in definition.canonicals.iter() {
        let func = match c {
            weave_ir::Canonical::Lift { core_func, func_type, options } => {
                let core_func = resolve_func_ref(env, core_func)?;
                let ty = definition
                    .types
                    .get(*func_type)
                    .and_then(|d| match d {
                        weave_ir::ExternDesc::Func(f) => Some(f.clone()),
                        _ => None,
                    })
                    .ok_or_else(|| EngineError::DefinitionInvalid(format!("type {func_type:?} is not a func type")))?;
                let options = resolve_options(env, options)?;
                Arc::new(FuncValue::Lifted { core_func, ty, options })
            }
            weave_ir::Canonical::Lower { func, options: _ } => match func {
                CanonicalIndexOrImport::Canonical(idx) => env
                    .canonical(*idx)
                    .cloned()
                    .ok_or_else(|| EngineError::DefinitionInvalid(format!("no canonical at index {idx:?}")))?,
                CanonicalIndexOrImport::Import(idx) => match env.import(*idx) {
                    Some(Item::Func(f)) => f.clone(),
                    Some(other) => {
                        return Err(EngineError::AliasSortMismatch { expected: "func", found: other.sort_name() })
                    }
                    None => return Err(EngineError::DefinitionInvalid(format!("no import at index {idx:?}"))),
                },
            },
        };
        env.canonicals.push(func);
    }
    Ok(())
}

fn build_values(env: &mut Env, definition: &Definition) -> EngineResult<()> {
    for (_idx, v) in definition.values.iter() {
        env.values.push(Arc::new(literal_to_val(&v.value)));
    }
    Ok(())
}

fn literal_to_val(lit: &weave_ir::LiteralValue) -> Val {
    use weave_ir::LiteralValue as L;
    match lit {
        L::Bool(b) => Val::Bool(*b),
        L::S8(v) => Val::S8(*v),
        L::U8(v) => Val::U8(*v),
        L::S16(v) => Val::S16(*v),
        L::U16(v) => Val::U16(*v),
        L::S32(v) => Val::S32(*v),
        L::U32(v) => Val::U32(*v),
        L::S64(v) => Val::S64(*v),
        L::U64(v) => Val::U64(*v),
        L::F32(v) => Val::F32(*v),
        L::F64(v) => Val::F64(*v),
        L::Char(c) => Val::Char(*c),
        L::String(s) => Val::String(s.clone()),
        L::List(items) => Val::List(items.iter().map(literal_to_val).collect()),
        L::Record(items) => Val::Record(items.iter().map(literal_to_val).collect()),
        L::Variant { case, payload } => Val::Variant {
            case: *case,
            payload: payload.as_ref().map(|p| Box::new(literal_to_val(p))),
        },
        L::Tuple(items) => Val::Tuple(items.iter().map(literal_to_val).collect()),
    }
}

fn build_component_instances(env: &mut Env, definition: &Definition, rollback: &mut Rollback) -> EngineResult<()> {
    // Nested-component instantiation cannot happen until the enclosing
    // `Env` exists, yet also needs to be able to alias back into it (for
    // `outer` lookups performed *inside* the child). We seal a throwaway
    // clone of the scope built so far before recursing: the child's
    // `parent` only ever needs read access to already-completed state, and
    // nothing later in this component's own build mutates what the child
    // already observed.
    for (_idx, def) in definition.component_instances.iter() {
        let instance = match def {
            weave_ir::ComponentInstanceDef::FromImport { import } => match env.import(*import) {
                Some(Item::Instance(inst)) => inst.clone(),
                Some(other) => {
                    return Err(EngineError::AliasSortMismatch { expected: "instance", found: other.sort_name() })
                }
                None => return Err(EngineError::DefinitionInvalid(format!("no import at index {import:?}"))),
            },
            weave_ir::ComponentInstanceDef::Instantiate { component, args } => {
                let child_def = definition
                    .component_modules
                    .get(*component)
                    .ok_or_else(|| EngineError::DefinitionInvalid(format!("no nested component at index {component:?}")))?
                    .clone();

                let mut bindings = Vec::with_capacity(args.len());
                for arg in args {
                    let item = alias::resolve(env, arg.alias)?;
                    bindings.push(ImportBinding { name: arg.name.clone(), item });
                }

                let snapshot = env.snapshot();
                // Share this build's rollback log rather than starting a
                // fresh one: if the child (or anything after it at this
                // level) fails, every core instance built anywhere in the
                // tree so far must unwind together.
                instantiate_inner(
                    env.core_engine.clone(),
                    &EngineConfig { limits: env.limits },
                    child_def,
                    Some(snapshot),
                    bindings,
                    rollback,
                )?
            }
        };
        env.component_instances.push(instance);
    }
    Ok(())
}

fn run_start(env: &mut Env, definition: &Definition) -> EngineResult<()> {
    let Some(start) = &definition.start else { return Ok(()) };
    if start.result_count != 0 {
        return Err(EngineError::DefinitionInvalid(
            "start function must not declare any results".into(),
        ));
    }
    let func = match &start.func {
        CanonicalIndexOrImport::Canonical(idx) => env
            .canonical(*idx)
            .cloned()
            .ok_or_else(|| EngineError::DefinitionInvalid(format!("no canonical at index {idx:?}")))?,
        CanonicalIndexOrImport::Import(idx) => match env.import(*idx) {
            Some(Item::Func(f)) => f.clone(),
            Some(other) => return Err(EngineError::AliasSortMismatch { expected: "func", found: other.sort_name() }),
            None => return Err(EngineError::DefinitionInvalid(format!("no import at index {idx:?}"))),
        },
    };
    let args: Vec<Val> = start
        .args
        .iter()
        .map(|idx| env.value(*idx).map(|v| (**v).clone()))
        .collect::<Option<_>>()
        .ok_or_else(|| EngineError::DefinitionInvalid("start references an undefined value".into()))?;

    let results = abi::call_func(env, &func, &args).map_err(EngineError::StartFailed)?;
    if results.len() as u32 != start.result_count {
        return Err(EngineError::StartFailed(anyhow::anyhow!(
            "start function returned {} value(s), expected {}",
            results.len(),
            start.result_count
        )));
    }
    Ok(())
}

fn populate_exports(env: &Arc<Env>, definition: &Definition) -> EngineResult<IndexMap<String, Item>> {
    let mut exports = IndexMap::with_capacity(definition.exports.len());
    for (_idx, e) in definition.exports.iter() {
        let item = match &e.kind {
            ExportKind::Func(idx) => env
                .canonical(*idx)
                .cloned()
                .map(Item::Func)
                .ok_or_else(|| EngineError::ExportUnresolved { name: e.name.clone() })?,
            ExportKind::Value(idx) => env
                .value(*idx)
                .cloned()
                .map(Item::Value)
                .ok_or_else(|| EngineError::ExportUnresolved { name: e.name.clone() })?,
            ExportKind::Instance(alias_idx) | ExportKind::Component(alias_idx) | ExportKind::Type(alias_idx)
            | ExportKind::Module(alias_idx) => {
                alias::resolve(env, *alias_idx).map_err(|_| EngineError::ExportUnresolved { name: e.name.clone() })?
            }
        };

        if let Some(type_idx) = e.type_annotation {
            if let Some(declared) = definition.types.get(type_idx) {
                if let Some(actual) = item_extern_desc(&item) {
                    weave_ir::extern_desc_compatible(declared, &actual)
                        .map_err(|mismatch| EngineError::ExportTypeMismatch { name: e.name.clone(), mismatch })?;
                }
            }
        }

        exports.insert(e.name.clone(), item);
    }
    Ok(exports)
}

impl Env {
    /// A cheap, shared snapshot of this scope usable as a child's `parent`.
    /// Since `Env` is built field-by-field and only exposed behind `Arc`
    /// once sealed at the end of `instantiate`, a component that wants to
    /// recurse *during* its own build takes this snapshot instead — it sees
    /// everything completed so far, which is all an inner `outer` alias is
    /// ever allowed to reach.
    fn snapshot(&self) -> Arc<Env> {
        Arc::new(Env {
            definition: self.definition.clone(),
            parent: self.parent.clone(),
            core_engine: self.core_engine.clone(),
            limits: self.limits,
            resources: self.resources.clone(),
            core_instances: self.core_instances.clone(),
            flat_core_funcs: self.flat_core_funcs.clone(),
            component_instances: self.component_instances.clone(),
            imports: self.imports.clone(),
            canonicals: self.canonicals.clone(),
            values: self.values.clone(),
        })
    }
}

//! End-to-end instantiation scenarios, each building a small `Definition` by
//! hand (no decoder in this workspace) and driving it through the public
//! `instantiate` entry point against `fake::FakeCoreEngine`.

mod fake;

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::instance::{instantiate, ImportBinding};
use crate::item::{FuncValue, HostFunc, Item, ResolvedCanonicalOptions};
use crate::values::{Handle, Val};
use cranelift_entity::EntityRef;
use fake::FakeCoreEngine;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use weave_ir::*;

fn engine() -> (Rc<RefCell<Box<dyn crate::core_iface::CoreEngine>>>, Rc<RefCell<Vec<u64>>>, Rc<RefCell<Vec<u64>>>, Rc<RefCell<u32>>, Rc<RefCell<u32>>, Rc<RefCell<u32>>) {
    let fake = FakeCoreEngine::new();
    let call_log = fake.call_log.clone();
    let teardown_log = fake.teardown_log.clone();
    let start_counter = fake.start_counter.clone();
    let post_return_counter = fake.post_return_counter.clone();
    let instantiate_count = fake.instantiate_count.clone();
    let boxed: Rc<RefCell<Box<dyn crate::core_iface::CoreEngine>>> = Rc::new(RefCell::new(Box::new(fake)));
    (boxed, call_log, teardown_log, start_counter, post_return_counter, instantiate_count)
}

fn func_type(params: Vec<(&str, Primitive)>, result: Option<Primitive>) -> ComponentFuncType {
    ComponentFuncType {
        params: params.into_iter().map(|(n, p)| (n.to_string(), ValType::Primitive(p))).collect(),
        results: result.into_iter().map(|p| (String::new(), ValType::Primitive(p))).collect(),
    }
}

#[test]
fn identity_call_round_trips_a_scalar() {
    let (core_engine, ..) = engine();

    let mut def = Definition::new();
    def.core_modules.push(fake::module_def(
        "identity",
        CoreModuleType { imports: vec![], exports: vec![("run".into(), CoreExternType::Func(CoreFuncType { params: vec![CoreValType::I32], results: vec![CoreValType::I32] }))] },
    ));
    def.core_instances.push(CoreInstanceDef::Instantiate { module: CoreModuleIndex::new(0), args: vec![] });
    let ty = def.types.push(ExternDesc::Func(func_type(vec![("x", Primitive::S32)], Some(Primitive::S32))));
    let canon = def.canonicals.push(Canonical::Lift {
        core_func: CanonicalOptionFuncRef::Index(CoreFuncIndex::new(0)),
        func_type: ty,
        options: CanonicalOptions::default(),
    });
    def.exports.push(ExportDef { name: "run".into(), kind: ExportKind::Func(canon), type_annotation: None });

    let instance = instantiate(core_engine, &EngineConfig::new(), Arc::new(def), None, vec![]).expect("instantiation succeeds");

    let Some(Item::Func(func)) = instance.get_export("run") else { panic!("missing run export") };
    let results = crate::abi::call_func(&instance.env, &func, &[Val::S32(7)]).expect("call succeeds");
    assert!(matches!(results.as_slice(), [Val::S32(7)]));
}

#[test]
fn string_echo_round_trips_through_realloc_and_memory() {
    let (core_engine, ..) = engine();

    let mut def = Definition::new();
    def.core_modules.push(fake::module_def(
        "uppercase_echo",
        CoreModuleType {
            imports: vec![],
            exports: vec![
                ("run".into(), CoreExternType::Func(CoreFuncType { params: vec![CoreValType::I32, CoreValType::I32], results: vec![CoreValType::I32, CoreValType::I32] })),
                ("memory".into(), CoreExternType::Memory(CoreMemoryType { limits: Limits { min: 1, max: None }, shared: false, memory64: false })),
                ("realloc".into(), CoreExternType::Func(CoreFuncType { params: vec![CoreValType::I32; 4], results: vec![CoreValType::I32] })),
            ],
        },
    ));
    def.core_instances.push(CoreInstanceDef::Instantiate { module: CoreModuleIndex::new(0), args: vec![] });
    let mem_alias = def.aliases.push(AliasDef { sort: Sort::CoreMemory, target: AliasTarget::CoreExport { instance: CoreInstanceIndex::new(0), name: "memory".into() } });
    let realloc_alias = def.aliases.push(AliasDef { sort: Sort::CoreFunc, target: AliasTarget::CoreExport { instance: CoreInstanceIndex::new(0), name: "realloc".into() } });
    let ty = def.types.push(ExternDesc::Func(func_type(vec![("s", Primitive::String)], Some(Primitive::String))));
    let canon = def.canonicals.push(Canonical::Lift {
        core_func: CanonicalOptionFuncRef::Index(CoreFuncIndex::new(0)),
        func_type: ty,
        options: CanonicalOptions { memory: Some(mem_alias), realloc: Some(realloc_alias), post_return: None, string_encoding: StringEncoding::Utf8, r#async: false },
    });
    def.exports.push(ExportDef { name: "echo".into(), kind: ExportKind::Func(canon), type_annotation: None });

    let instance = instantiate(core_engine, &EngineConfig::new(), Arc::new(def), None, vec![]).expect("instantiation succeeds");

    let Some(Item::Func(func)) = instance.get_export("echo") else { panic!("missing echo export") };
    let results = crate::abi::call_func(&instance.env, &func, &[Val::String("hello".into())]).expect("call succeeds");
    match results.as_slice() {
        [Val::String(s)] => assert_eq!(s, "HELLO"),
        other => panic!("unexpected result {other:?}"),
    }
}

#[test]
fn start_runs_one_core_module_import_linked_to_another() {
    let (core_engine, call_log, ..) = engine();

    let mut def = Definition::new();
    def.core_modules.push(fake::module_def(
        "append_log",
        CoreModuleType { imports: vec![], exports: vec![("run".into(), CoreExternType::Func(CoreFuncType { params: vec![CoreValType::I32], results: vec![CoreValType::I32] }))] },
    ));
    def.core_modules.push(fake::module_def(
        "call_import:0",
        CoreModuleType {
            imports: vec![("env".into(), "run".into(), CoreExternType::Func(CoreFuncType { params: vec![CoreValType::I32], results: vec![CoreValType::I32] }))],
            exports: vec![("run".into(), CoreExternType::Func(CoreFuncType { params: vec![], results: vec![] }))],
        },
    ));
    def.core_instances.push(CoreInstanceDef::Instantiate { module: CoreModuleIndex::new(0), args: vec![] });
    def.core_instances.push(CoreInstanceDef::Instantiate {
        module: CoreModuleIndex::new(1),
        args: vec![CoreInstantiateArg { name: "run".into(), kind: CoreExternKind::Func, source_instance: CoreInstanceIndex::new(0) }],
    });
    let ty = def.types.push(ExternDesc::Func(ComponentFuncType::default()));
    let canon = def.canonicals.push(Canonical::Lift {
        core_func: CanonicalOptionFuncRef::Index(CoreFuncIndex::new(1)),
        func_type: ty,
        options: CanonicalOptions::default(),
    });
    def.start = Some(StartDef { func: CanonicalIndexOrImport::Canonical(canon), args: vec![], result_count: 0 });

    instantiate(core_engine, &EngineConfig::new(), Arc::new(def), None, vec![]).expect("instantiation succeeds");

    assert_eq!(call_log.borrow().as_slice(), &[42]);
}

struct DoubleHost;

impl HostFunc for DoubleHost {
    fn call(&self, args: &[Val]) -> anyhow::Result<Vec<Val>> {
        match args {
            [Val::S32(n)] => Ok(vec![Val::S32(n * 2)]),
            _ => anyhow::bail!("expected a single s32 argument"),
        }
    }
}

#[test]
fn nested_component_forwards_a_host_import_through_to_its_export() {
    let (core_engine, ..) = engine();

    let mut inner = Definition::new();
    let inner_import = inner.imports.push(ImportDef { name: "double".into(), desc: ExternDesc::Func(func_type(vec![("n", Primitive::S32)], Some(Primitive::S32))) });
    let inner_canon = inner.canonicals.push(Canonical::Lower { func: CanonicalIndexOrImport::Import(inner_import), options: CanonicalOptions::default() });
    inner.exports.push(ExportDef { name: "fn".into(), kind: ExportKind::Func(inner_canon), type_annotation: None });

    let mut outer = Definition::new();
    let outer_import = outer.imports.push(ImportDef { name: "double".into(), desc: ExternDesc::Func(func_type(vec![("n", Primitive::S32)], Some(Primitive::S32))) });
    let import_alias = outer.aliases.push(AliasDef { sort: Sort::Func, target: AliasTarget::Import(outer_import) });
    let inner_module = outer.component_modules.push(Arc::new(inner));
    let inner_instance = outer.component_instances.push(ComponentInstanceDef::Instantiate {
        component: inner_module,
        args: vec![ComponentInstantiateArg { name: "double".into(), alias: import_alias }],
    });
    let instance_alias = outer.aliases.push(AliasDef { sort: Sort::Instance, target: AliasTarget::Instance(inner_instance) });
    outer.exports.push(ExportDef { name: "inner".into(), kind: ExportKind::Instance(instance_alias), type_annotation: None });

    let resolved_imports = vec![ImportBinding { name: "double".into(), item: Item::Func(Arc::new(FuncValue::Host(Arc::new(DoubleHost)))) }];
    let instance = instantiate(core_engine, &EngineConfig::new(), Arc::new(outer), None, resolved_imports).expect("instantiation succeeds");

    let Some(Item::Instance(inner_instance)) = instance.get_export("inner") else { panic!("missing inner export") };
    let Some(Item::Func(func)) = inner_instance.get_export("fn") else { panic!("missing fn export on nested instance") };
    let results = crate::abi::call_func(&inner_instance.env, &func, &[Val::S32(21)]).expect("call succeeds");
    assert!(matches!(results.as_slice(), [Val::S32(42)]));
}

#[test]
fn start_function_side_effect_runs_exactly_once() {
    let (core_engine, _call_log, _teardown_log, start_counter, ..) = engine();

    let mut def = Definition::new();
    def.core_modules.push(fake::module_def(
        "bump_counter",
        CoreModuleType { imports: vec![], exports: vec![("run".into(), CoreExternType::Func(CoreFuncType { params: vec![], results: vec![] }))] },
    ));
    def.core_instances.push(CoreInstanceDef::Instantiate { module: CoreModuleIndex::new(0), args: vec![] });
    let ty = def.types.push(ExternDesc::Func(ComponentFuncType::default()));
    let canon = def.canonicals.push(Canonical::Lift {
        core_func: CanonicalOptionFuncRef::Index(CoreFuncIndex::new(0)),
        func_type: ty,
        options: CanonicalOptions::default(),
    });
    def.start = Some(StartDef { func: CanonicalIndexOrImport::Canonical(canon), args: vec![], result_count: 0 });

    instantiate(core_engine, &EngineConfig::new(), Arc::new(def), None, vec![]).expect("instantiation succeeds");

    assert_eq!(*start_counter.borrow(), 1);
}

#[test]
fn import_type_mismatch_fails_before_any_core_module_is_instantiated() {
    let (core_engine, _call_log, _teardown_log, _start_counter, _post_return_counter, instantiate_count) = engine();

    let mut def = Definition::new();
    def.imports.push(ImportDef { name: "double".into(), desc: ExternDesc::Func(func_type(vec![("x", Primitive::S32)], Some(Primitive::S32))) });
    def.core_modules.push(fake::module_def(
        "identity",
        CoreModuleType { imports: vec![], exports: vec![("run".into(), CoreExternType::Func(CoreFuncType { params: vec![CoreValType::I32], results: vec![CoreValType::I32] }))] },
    ));
    def.core_instances.push(CoreInstanceDef::Instantiate { module: CoreModuleIndex::new(0), args: vec![] });

    let bogus = FuncValue::Lifted {
        core_func: crate::core_iface::CoreFuncRef { instance: crate::core_iface::CoreInstanceHandle(999), export_index: 0, ty: crate::core_iface::CoreFuncTypeHandle(0) },
        ty: ComponentFuncType::default(),
        options: ResolvedCanonicalOptions { memory: None, realloc: None, post_return: None, string_encoding: StringEncoding::Utf8, r#async: false },
    };
    let resolved_imports = vec![ImportBinding { name: "double".into(), item: Item::Func(Arc::new(bogus)) }];

    let err = instantiate(core_engine, &EngineConfig::new(), Arc::new(def), None, resolved_imports).expect_err("arity mismatch should be rejected");
    assert!(matches!(err, EngineError::ImportTypeMismatch { .. }));
    assert_eq!(*instantiate_count.borrow(), 0, "the mismatched import must be caught before any core module is touched");
}

#[test]
fn resource_handle_drop_and_transfer_follow_component_model_semantics() {
    let (core_engine, ..) = engine();
    let a = instantiate(core_engine.clone(), &EngineConfig::new(), Arc::new(Definition::new()), None, vec![])
        .expect("instance a");
    let b = instantiate(core_engine, &EngineConfig::new(), Arc::new(Definition::new()), None, vec![]).expect("instance b");

    let ty = TypeIndex::new(0);
    let Val::Own(h) = a.new_resource_handle(ty, 7).expect("mint handle") else { panic!("expected an own handle") };
    assert_eq!(a.resource_rep(h).unwrap(), 7);

    // drop invalidates it
    let Val::Own(h2) = a.new_resource_handle(ty, 11).expect("mint second handle") else { panic!() };
    a.drop_resource_handle(h2).expect("drop succeeds");
    assert!(a.resource_rep(h2).is_err());

    // transfer moves ownership to another instance and invalidates the source
    let Val::Own(moved) = a.transfer_resource_handle(&b, h).expect("transfer succeeds") else { panic!() };
    assert!(a.resource_rep(h).is_err(), "source handle invalid after transfer");
    assert_eq!(b.resource_rep(moved).unwrap(), 7);
}

#[test]
fn borrow_handle_does_not_outlive_the_lifted_call_that_received_it() {
    let (core_engine, ..) = engine();

    let mut def = Definition::new();
    def.core_modules.push(fake::module_def(
        "identity",
        CoreModuleType { imports: vec![], exports: vec![("run".into(), CoreExternType::Func(CoreFuncType { params: vec![CoreValType::I32], results: vec![CoreValType::I32] }))] },
    ));
    def.core_instances.push(CoreInstanceDef::Instantiate { module: CoreModuleIndex::new(0), args: vec![] });
    let resource_ty = def.types.push(ExternDesc::Value(ValType::Primitive(Primitive::Bool)));
    let ty = def.types.push(ExternDesc::Func(ComponentFuncType {
        params: vec![("handle".into(), ValType::Borrow(resource_ty))],
        results: vec![],
    }));
    let canon = def.canonicals.push(Canonical::Lift {
        core_func: CanonicalOptionFuncRef::Index(CoreFuncIndex::new(0)),
        func_type: ty,
        options: CanonicalOptions::default(),
    });
    def.exports.push(ExportDef { name: "take".into(), kind: ExportKind::Func(canon), type_annotation: None });

    let instance = instantiate(core_engine, &EngineConfig::new(), Arc::new(def), None, vec![]).expect("instantiation succeeds");

    let Val::Own(owner) = instance.new_resource_handle(resource_ty, 9).expect("mint handle") else { panic!("expected an own handle") };
    let borrowed_index = instance.env.resources.borrow(resource_ty, owner.index).expect("borrow");
    let borrowed = Val::Borrow(Handle { ty: resource_ty, index: borrowed_index });

    let Some(Item::Func(func)) = instance.get_export("take") else { panic!("missing take export") };
    crate::abi::call_func(&instance.env, &func, &[borrowed]).expect("call succeeds");

    assert!(
        instance.env.resources.rep(resource_ty, borrowed_index).is_err(),
        "borrow handle must be invalidated once the call frame that received it returns"
    );
    // the owning handle the borrow was taken from is unaffected
    assert_eq!(instance.resource_rep(owner).unwrap(), 9);
}

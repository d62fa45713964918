//! Alias resolution: turning an `AliasIndex` into the concrete runtime item
//! it names, chasing `outer` chains and inline-export indirection as needed.

use crate::error::EngineError;
use crate::instance::{CoreInstanceSlot, Env};
use crate::item::Item;
use weave_ir::{AliasTarget, OuterIndex, Sort};

fn sort_name(sort: Sort) -> &'static str {
    match sort {
        Sort::CoreFunc => "core-func",
        Sort::CoreTable => "core-table",
        Sort::CoreMemory => "core-memory",
        Sort::CoreGlobal => "core-global",
        Sort::Func => "func",
        Sort::Value => "value",
        Sort::Type => "type",
        Sort::Instance => "instance",
        Sort::Component => "component",
    }
}

fn check_sort(sort: Sort, item: &Item) -> Result<Item, EngineError> {
    let ok = matches!(
        (sort, &item),
        (Sort::CoreFunc, Item::CoreFunc(_))
            | (Sort::CoreTable, Item::CoreTable(_))
            | (Sort::CoreMemory, Item::CoreMemory(_))
            | (Sort::CoreGlobal, Item::CoreGlobal(_))
            | (Sort::Func, Item::Func(_))
            | (Sort::Value, Item::Value(_))
            | (Sort::Type, Item::Type(_))
            | (Sort::Instance, Item::Instance(_))
            | (Sort::Component, Item::Component(_))
            // A `module` item can legally satisfy a `component` alias slot
            // when the target is actually a core module rather than a
            // nested component; core-module-ness is determined at the
            // target site, not by `Sort`, so accept it here too.
            | (Sort::Component, Item::Module(_)),
    );
    if ok {
        Ok(item.clone())
    } else {
        Err(EngineError::AliasSortMismatch {
            expected: sort_name(sort),
            found: item.sort_name(),
        })
    }
}

/// Resolve the alias at `alias_idx` within `env`, verifying the resolved
/// item's runtime kind matches the sort the alias declares.
pub fn resolve(env: &Env, alias_idx: weave_ir::AliasIndex) -> Result<Item, EngineError> {
    resolve_depth(env, alias_idx, 0)
}

fn resolve_depth(env: &Env, alias_idx: weave_ir::AliasIndex, depth: u32) -> Result<Item, EngineError> {
    if depth > env.limits.max_alias_depth {
        return Err(EngineError::AliasUnresolved(
            "alias chain exceeded the configured depth limit".into(),
        ));
    }
    let def = env
        .definition
        .aliases
        .get(alias_idx)
        .ok_or_else(|| EngineError::AliasUnresolved(format!("no alias at index {alias_idx:?}")))?;

    let resolved = match &def.target {
        AliasTarget::CoreExport { instance, name } => resolve_core_export(env, *instance, name, depth)?,
        AliasTarget::InstanceExport { instance, name } => resolve_instance_export(env, *instance, name)?,
        AliasTarget::Import(idx) => env
            .import(*idx)
            .cloned()
            .ok_or_else(|| EngineError::AliasUnresolved(format!("no import at index {idx:?}")))?,
        AliasTarget::Outer { depth: updepth, index } => resolve_outer(env, *updepth, index)?,
        AliasTarget::Type(idx) => {
            let desc = env
                .definition
                .types
                .get(*idx)
                .ok_or_else(|| EngineError::AliasUnresolved(format!("no type at index {idx:?}")))?;
            Item::Type(std::sync::Arc::new(desc.clone()))
        }
        AliasTarget::Module(idx) => {
            let def = env
                .definition
                .component_modules
                .get(*idx)
                .ok_or_else(|| EngineError::AliasUnresolved(format!("no nested component at index {idx:?}")))?;
            Item::Component(def.clone())
        }
        AliasTarget::Component(idx) => {
            let def = env
                .definition
                .component_modules
                .get(*idx)
                .ok_or_else(|| EngineError::AliasUnresolved(format!("no nested component at index {idx:?}")))?;
            Item::Component(def.clone())
        }
        AliasTarget::Instance(idx) => {
            let inst = env
                .component_instance(*idx)
                .ok_or_else(|| EngineError::AliasUnresolved(format!("no component instance at index {idx:?}")))?;
            Item::Instance(inst.clone())
        }
    };

    check_sort(def.sort, &resolved)
}

fn resolve_core_export(
    env: &Env,
    instance: weave_ir::CoreInstanceIndex,
    name: &str,
    depth: u32,
) -> Result<Item, EngineError> {
    let slot = env
        .core_instance(instance)
        .ok_or_else(|| EngineError::AliasUnresolved(format!("no core instance at index {instance:?}")))?;
    match slot {
        CoreInstanceSlot::Instantiated(handle) => {
            let extern_ref = env
                .core_engine
                .borrow()
                .get_export(*handle, name)
                .ok_or_else(|| EngineError::AliasUnresolved(format!("no export named `{name}` on core instance {instance:?}")))?;
            Ok(Item::from_core_extern_ref(extern_ref))
        }
        CoreInstanceSlot::Inline(items) => {
            let item = items
                .iter()
                .find(|it| it.name == name)
                .ok_or_else(|| EngineError::AliasUnresolved(format!("no inline-exported item named `{name}`")))?;
            resolve_depth(env, item.alias, depth + 1)
        }
    }
}

fn resolve_instance_export(
    env: &Env,
    instance: weave_ir::ComponentInstanceIndex,
    name: &str,
) -> Result<Item, EngineError> {
    let inst = env
        .component_instance(instance)
        .ok_or_else(|| EngineError::AliasUnresolved(format!("no component instance at index {instance:?}")))?;
    inst.get_export(name)
        .ok_or_else(|| EngineError::AliasUnresolved(format!("no export named `{name}` on component instance {instance:?}")))
}

fn resolve_outer(env: &Env, depth: u32, index: &OuterIndex) -> Result<Item, EngineError> {
    // Walk `depth` steps up the owning chain. Each hop is an `Arc` clone
    // (cheap refcount bump), so the loop owns its way up rather than
    // needing to borrow `env` itself for longer than one hop.
    let ancestor = if depth == 0 {
        None
    } else {
        let mut current = env
            .parent
            .clone()
            .ok_or_else(|| EngineError::AliasUnresolved("outer alias walked past the root component".into()))?;
        for _ in 1..depth {
            current = current
                .parent
                .clone()
                .ok_or_else(|| EngineError::AliasUnresolved("outer alias walked past the root component".into()))?;
        }
        Some(current)
    };
    let target: &Env = ancestor.as_deref().unwrap_or(env);
    match index {
        OuterIndex::CoreModule(idx) => {
            let module = target
                .definition
                .core_modules
                .get(*idx)
                .ok_or_else(|| EngineError::AliasUnresolved(format!("no core module at index {idx:?}")))?;
            Ok(Item::Module(std::sync::Arc::new(module.clone())))
        }
        OuterIndex::Component(idx) => {
            let def = target
                .definition
                .component_modules
                .get(*idx)
                .ok_or_else(|| EngineError::AliasUnresolved(format!("no nested component at index {idx:?}")))?;
            Ok(Item::Component(def.clone()))
        }
        OuterIndex::Type(idx) => {
            let desc = target
                .definition
                .types
                .get(*idx)
                .ok_or_else(|| EngineError::AliasUnresolved(format!("no type at index {idx:?}")))?;
            Ok(Item::Type(std::sync::Arc::new(desc.clone())))
        }
    }
}

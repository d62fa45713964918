//! The Import Matcher: pairs each import a `Definition` declares with a
//! host/sibling-supplied binding of the same name, checking kind and type
//! compatibility before instantiation is allowed to proceed. Declared-import
//! order drives iteration so a definition with several unsatisfied imports
//! always reports the same one first, regardless of binding order.

use crate::error::{EngineError, EngineResult};
use crate::instance::ImportBinding;
use crate::item::{item_extern_desc, Item};
use indexmap::IndexMap;
use weave_ir::{Definition, ExternDesc};

/// Match `provided` bindings against `definition.imports`, in declared order,
/// returning one `Item` per import or the first failure encountered.
pub fn match_imports(definition: &Definition, provided: Vec<ImportBinding>) -> EngineResult<Vec<Item>> {
    let mut by_name: IndexMap<String, Item> = IndexMap::with_capacity(provided.len());
    for b in provided {
        by_name.insert(b.name, b.item);
    }

    let mut out = Vec::with_capacity(definition.imports.len());
    for (_idx, decl) in definition.imports.iter() {
        let item = by_name
            .shift_remove(&decl.name)
            .ok_or_else(|| EngineError::ImportMissing { name: decl.name.clone() })?;
        check_kind(&decl.name, &decl.desc, &item)?;
        check_type(&decl.name, &decl.desc, &item)?;
        out.push(item);
    }
    Ok(out)
}

fn check_kind(name: &str, desc: &ExternDesc, item: &Item) -> EngineResult<()> {
    let ok = matches!(
        (desc, item),
        (ExternDesc::Func(_), Item::Func(_))
            | (ExternDesc::Value(_), Item::Value(_))
            | (ExternDesc::Module(_), Item::Module(_))
            | (ExternDesc::Component(_), Item::Component(_))
            | (ExternDesc::Instance(_), Item::Instance(_))
            | (ExternDesc::TypeBound(_), Item::Type(_))
    );
    if ok {
        Ok(())
    } else {
        Err(EngineError::ImportKindMismatch {
            name: name.to_string(),
            expected: extern_desc_kind_name(desc),
            found: item.sort_name(),
        })
    }
}

fn check_type(name: &str, desc: &ExternDesc, item: &Item) -> EngineResult<()> {
    // A bare value import carries no independently checkable type beyond
    // its kind — there is nothing further to compare once `check_kind` has
    // already confirmed it is a value.
    if matches!(item, Item::Value(_)) {
        return Ok(());
    }
    let Some(actual) = item_extern_desc(item) else { return Ok(()) };
    weave_ir::extern_desc_compatible(desc, &actual)
        .map_err(|mismatch| EngineError::ImportTypeMismatch { name: name.to_string(), mismatch })
}

fn extern_desc_kind_name(e: &ExternDesc) -> &'static str {
    match e {
        ExternDesc::Func(_) => "func",
        ExternDesc::Value(_) => "value",
        ExternDesc::Module(_) => "module",
        ExternDesc::Component(_) => "component",
        ExternDesc::Instance(_) => "instance",
        ExternDesc::TypeBound(_) => "type",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use weave_ir::{ComponentFuncType, Primitive, ValType};

    fn func_desc() -> ExternDesc {
        ExternDesc::Func(ComponentFuncType {
            params: vec![("x".into(), ValType::Primitive(Primitive::U32))],
            results: vec![],
        })
    }

    #[test]
    fn missing_import_is_reported_in_declared_order() {
        let mut def = Definition::new();
        def.imports.push(weave_ir::ImportDef { name: "a".into(), desc: func_desc() });
        def.imports.push(weave_ir::ImportDef { name: "b".into(), desc: func_desc() });
        let err = match_imports(&def, vec![]).unwrap_err();
        assert!(matches!(err, EngineError::ImportMissing { name } if name == "a"));
    }

    #[test]
    fn kind_mismatch_is_reported() {
        let mut def = Definition::new();
        def.imports.push(weave_ir::ImportDef { name: "a".into(), desc: func_desc() });
        let provided = vec![ImportBinding { name: "a".into(), item: Item::Value(Arc::new(crate::values::Val::Bool(true))) }];
        let err = match_imports(&def, provided).unwrap_err();
        assert!(matches!(err, EngineError::ImportKindMismatch { .. }));
    }
}

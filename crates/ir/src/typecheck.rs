//! The Type Engine: structural subtyping between a declared
//! import/export type and an actually-provided item's type, across both the
//! core-Wasm and Component Model type universes.
//!
//! Every entry point returns `Result<(), TypeMismatch>`; there is no partial
//! success and no attempt at recovery.

use crate::types::*;
use std::fmt;

/// A single failed compatibility check. `path` accumulates a breadcrumb
/// trail (record field name, variant case, tuple index, ...) so a caller can
/// point at the deepest mismatch rather than just the outermost one.
#[derive(Clone, Debug, PartialEq)]
pub struct TypeMismatch {
    pub path: Vec<String>,
    pub expected_description: String,
    pub actual_description: String,
}

impl TypeMismatch {
    fn leaf(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        TypeMismatch {
            path: Vec::new(),
            expected_description: expected.into(),
            actual_description: actual.into(),
        }
    }

    /// Prepend a path segment as the mismatch bubbles up through a
    /// composite type (record field, variant case, etc.).
    fn nest(mut self, segment: impl Into<String>) -> Self {
        self.path.insert(0, segment.into());
        self
    }
}

impl fmt::Display for TypeMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(
                f,
                "expected {}, found {}",
                self.expected_description, self.actual_description
            )
        } else {
            write!(
                f,
                "at {}: expected {}, found {}",
                self.path.join("."),
                self.expected_description,
                self.actual_description
            )
        }
    }
}

impl std::error::Error for TypeMismatch {}

type TResult = Result<(), TypeMismatch>;

/// Core-Wasm function subtyping: arity-equal,
/// pairwise value-type-equal.
pub fn core_func_compatible(expected: &CoreFuncType, actual: &CoreFuncType) -> TResult {
    if expected.params.len() != actual.params.len() || expected.results.len() != actual.results.len() {
        return Err(TypeMismatch::leaf(
            format!("func with {} param(s)/{} result(s)", expected.params.len(), expected.results.len()),
            format!("func with {} param(s)/{} result(s)", actual.params.len(), actual.results.len()),
        ));
    }
    for (i, (e, a)) in expected.params.iter().zip(&actual.params).enumerate() {
        if e != a {
            return Err(TypeMismatch::leaf(e.to_string(), a.to_string()).nest(format!("param[{i}]")));
        }
    }
    for (i, (e, a)) in expected.results.iter().zip(&actual.results).enumerate() {
        if e != a {
            return Err(TypeMismatch::leaf(e.to_string(), a.to_string()).nest(format!("result[{i}]")));
        }
    }
    Ok(())
}

/// Core memory subtyping: `actual.min >= expected.min`; if `expected`
/// bounds `max`, `actual` must too and not exceed it; `shared` must match.
pub fn core_memory_compatible(expected: &CoreMemoryType, actual: &CoreMemoryType) -> TResult {
    limits_compatible(expected.limits, actual.limits, "memory")?;
    if expected.shared != actual.shared {
        return Err(TypeMismatch::leaf(
            format!("shared={}", expected.shared),
            format!("shared={}", actual.shared),
        ));
    }
    Ok(())
}

/// Core table subtyping: element type equal, min/max rule as for memory.
pub fn core_table_compatible(expected: &CoreTableType, actual: &CoreTableType) -> TResult {
    if expected.element != actual.element {
        return Err(TypeMismatch::leaf(expected.element.to_string(), actual.element.to_string()));
    }
    limits_compatible(expected.limits, actual.limits, "table")
}

fn limits_compatible(expected: Limits, actual: Limits, what: &str) -> TResult {
    if actual.min < expected.min {
        return Err(TypeMismatch::leaf(
            format!("{what} with min >= {}", expected.min),
            format!("{what} with min {}", actual.min),
        ));
    }
    if let Some(emax) = expected.max {
        match actual.max {
            Some(amax) if amax <= emax => {}
            Some(amax) => {
                return Err(TypeMismatch::leaf(
                    format!("{what} with max <= {emax}"),
                    format!("{what} with max {amax}"),
                ))
            }
            None => {
                return Err(TypeMismatch::leaf(
                    format!("{what} with max <= {emax}"),
                    format!("{what} with unbounded max"),
                ))
            }
        }
    }
    Ok(())
}

/// Core global subtyping: type equal, mutability equal (invariant — `mut` and
/// `immut` are incomparable in either direction).
pub fn core_global_compatible(expected: &CoreGlobalType, actual: &CoreGlobalType) -> TResult {
    if expected.value_type != actual.value_type {
        return Err(TypeMismatch::leaf(
            expected.value_type.to_string(),
            actual.value_type.to_string(),
        ));
    }
    if expected.mutable != actual.mutable {
        return Err(TypeMismatch::leaf(
            format!("mutable={}", expected.mutable),
            format!("mutable={}", actual.mutable),
        ));
    }
    Ok(())
}

pub fn core_extern_compatible(expected: &CoreExternType, actual: &CoreExternType) -> TResult {
    match (expected, actual) {
        (CoreExternType::Func(e), CoreExternType::Func(a)) => core_func_compatible(e, a),
        (CoreExternType::Memory(e), CoreExternType::Memory(a)) => core_memory_compatible(e, a),
        (CoreExternType::Table(e), CoreExternType::Table(a)) => core_table_compatible(e, a),
        (CoreExternType::Global(e), CoreExternType::Global(a)) => core_global_compatible(e, a),
        _ => Err(TypeMismatch::leaf(extern_kind_name(expected), extern_kind_name(actual))),
    }
}

fn extern_kind_name(e: &CoreExternType) -> &'static str {
    match e {
        CoreExternType::Func(_) => "func",
        CoreExternType::Memory(_) => "memory",
        CoreExternType::Table(_) => "table",
        CoreExternType::Global(_) => "global",
    }
}

/// Core module type subtyping: every import `expected` declares must be
/// satisfiable by a compatible import `actual` also declares (contravariant,
/// exact (module,name) match required since core-Wasm imports are
/// two-level-namespaced); every export `expected` declares must be present
/// in `actual` with a compatible type (covariant).
pub fn core_module_compatible(expected: &CoreModuleType, actual: &CoreModuleType) -> TResult {
    for (emod, ename, ety) in &expected.imports {
        let found = actual
            .imports
            .iter()
            .find(|(amod, aname, _)| amod == emod && aname == ename);
        match found {
            Some((_, _, aty)) => core_extern_compatible(ety, aty).map_err(|e| e.nest(format!("import {emod}.{ename}")))?,
            None => {
                return Err(TypeMismatch::leaf(
                    format!("module importing {emod}.{ename}"),
                    "module with no such import",
                ))
            }
        }
    }
    for (ename, ety) in &expected.exports {
        let found = actual.exports.iter().find(|(aname, _)| aname == ename);
        match found {
            Some((_, aty)) => core_extern_compatible(ety, aty).map_err(|e| e.nest(format!("export {ename}")))?,
            None => {
                return Err(TypeMismatch::leaf(
                    format!("module exporting {ename}"),
                    "module with no such export",
                ))
            }
        }
    }
    Ok(())
}

/// Value-type compatibility: primitives by identity, records by
/// same-names-same-order with per-field compatibility, variants by case-name
/// set equality with per-case payload compatibility, lists/options
/// structural, `own`/`borrow` by resource identity.
///
/// `own`/`borrow` resource identity is modeled here simply as `TypeIndex`
/// equality; callers that need cross-component resource identity (distinct
/// components' type indexes referring to the "same" abstract resource) are
/// expected to canonicalize indexes into a shared space before calling this
/// (see `weave_rt::instance`'s handling of imported resource types).
pub fn val_type_compatible(expected: &ValType, actual: &ValType) -> TResult {
    use ValType::*;
    match (expected, actual) {
        (Primitive(e), Primitive(a)) => {
            if e == a {
                Ok(())
            } else {
                Err(TypeMismatch::leaf(format!("{e:?}"), format!("{a:?}")))
            }
        }
        (Record(efields), Record(afields)) => {
            if efields.len() != afields.len() {
                return Err(TypeMismatch::leaf(
                    format!("record with {} field(s)", efields.len()),
                    format!("record with {} field(s)", afields.len()),
                ));
            }
            for (ef, af) in efields.iter().zip(afields) {
                if ef.name != af.name {
                    return Err(TypeMismatch::leaf(ef.name.clone(), af.name.clone()));
                }
                val_type_compatible(&ef.ty, &af.ty).map_err(|e| e.nest(ef.name.clone()))?;
            }
            Ok(())
        }
        (Variant(ecases), Variant(acases)) => {
            if ecases.len() != acases.len() {
                return Err(TypeMismatch::leaf(
                    format!("variant with {} case(s)", ecases.len()),
                    format!("variant with {} case(s)", acases.len()),
                ));
            }
            for (ec, ac) in ecases.iter().zip(acases) {
                if ec.name != ac.name {
                    return Err(TypeMismatch::leaf(ec.name.clone(), ac.name.clone()));
                }
                match (&ec.payload, &ac.payload) {
                    (None, None) => {}
                    (Some(ep), Some(ap)) => val_type_compatible(ep, ap).map_err(|e| e.nest(ec.name.clone()))?,
                    _ => return Err(TypeMismatch::leaf("matching payload presence", "mismatched payload presence").nest(ec.name.clone())),
                }
            }
            Ok(())
        }
        (List(e), List(a)) => val_type_compatible(e, a).map_err(|e| e.nest("list element")),
        (Option(e), Option(a)) => val_type_compatible(e, a).map_err(|e| e.nest("option payload")),
        (Result { ok: eo, err: ee }, Result { ok: ao, err: ae }) => {
            option_box_compatible(eo, ao).map_err(|e| e.nest("ok"))?;
            option_box_compatible(ee, ae).map_err(|e| e.nest("err"))
        }
        (Tuple(es), Tuple(as_)) => {
            if es.len() != as_.len() {
                return Err(TypeMismatch::leaf(
                    format!("tuple of {} element(s)", es.len()),
                    format!("tuple of {} element(s)", as_.len()),
                ));
            }
            for (i, (e, a)) in es.iter().zip(as_).enumerate() {
                val_type_compatible(e, a).map_err(|e| e.nest(format!("tuple[{i}]")))?;
            }
            Ok(())
        }
        (Flags(e), Flags(a)) => {
            if e == a {
                Ok(())
            } else {
                Err(TypeMismatch::leaf(format!("flags{e:?}"), format!("flags{a:?}")))
            }
        }
        (Enum(e), Enum(a)) => {
            if e == a {
                Ok(())
            } else {
                Err(TypeMismatch::leaf(format!("enum{e:?}"), format!("enum{a:?}")))
            }
        }
        (Own(e), Own(a)) | (Borrow(e), Borrow(a)) => {
            if e == a {
                Ok(())
            } else {
                Err(TypeMismatch::leaf(format!("resource type {e:?}"), format!("resource type {a:?}")))
            }
        }
        _ => Err(TypeMismatch::leaf(val_type_kind_name(expected), val_type_kind_name(actual))),
    }
}

fn option_box_compatible(expected: &Option<Box<ValType>>, actual: &Option<Box<ValType>>) -> TResult {
    match (expected, actual) {
        (None, None) => Ok(()),
        (Some(e), Some(a)) => val_type_compatible(e, a),
        _ => Err(TypeMismatch::leaf("matching optional payload", "mismatched optional payload")),
    }
}

fn val_type_kind_name(v: &ValType) -> &'static str {
    match v {
        ValType::Primitive(_) => "primitive",
        ValType::Record(_) => "record",
        ValType::Variant(_) => "variant",
        ValType::List(_) => "list",
        ValType::Option(_) => "option",
        ValType::Result { .. } => "result",
        ValType::Tuple(_) => "tuple",
        ValType::Flags(_) => "flags",
        ValType::Enum(_) => "enum",
        ValType::Own(_) => "own",
        ValType::Borrow(_) => "borrow",
    }
}

/// Component function subtyping: same param arity, each param compatible
/// (structural equivalence for the baseline case), results covariant.
pub fn component_func_compatible(expected: &ComponentFuncType, actual: &ComponentFuncType) -> TResult {
    if expected.params.len() != actual.params.len() {
        return Err(TypeMismatch::leaf(
            format!("func with {} param(s)", expected.params.len()),
            format!("func with {} param(s)", actual.params.len()),
        ));
    }
    for ((ename, ety), (aname, aty)) in expected.params.iter().zip(&actual.params) {
        if ename != aname {
            return Err(TypeMismatch::leaf(ename.clone(), aname.clone()));
        }
        val_type_compatible(ety, aty).map_err(|e| e.nest(format!("param `{ename}`")))?;
    }
    if expected.results.len() != actual.results.len() {
        return Err(TypeMismatch::leaf(
            format!("func with {} result(s)", expected.results.len()),
            format!("func with {} result(s)", actual.results.len()),
        ));
    }
    for ((ename, ety), (aname, aty)) in expected.results.iter().zip(&actual.results) {
        if ename != aname {
            return Err(TypeMismatch::leaf(ename.clone(), aname.clone()));
        }
        val_type_compatible(ety, aty).map_err(|e| e.nest(format!("result `{ename}`")))?;
    }
    Ok(())
}

/// Instance type subtyping: every export `expected` declares must be present in
/// `actual` with a compatible extern description; extras in `actual` are
/// fine (width subtyping).
pub fn instance_compatible(expected: &InstanceType, actual: &InstanceType) -> TResult {
    for (name, ety) in &expected.exports {
        let aty = actual
            .exports
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, t)| t)
            .ok_or_else(|| TypeMismatch::leaf(format!("export `{name}`"), "no such export"))?;
        extern_desc_compatible(ety, aty).map_err(|e| e.nest(format!("export `{name}`")))?;
    }
    Ok(())
}

/// Component type subtyping: `expected`'s imports must each be satisfiable by a
/// compatible import of `actual` (contravariant — `actual` may additionally
/// require *fewer* things, never more, to be usable wherever `expected`
/// is), and `expected`'s exports must each be present in `actual` (covariant,
/// same rule as instance types).
pub fn component_type_compatible(expected: &ComponentType, actual: &ComponentType) -> TResult {
    for (name, ety) in &expected.imports {
        let aty = actual
            .imports
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, t)| t)
            .ok_or_else(|| TypeMismatch::leaf(format!("import `{name}`"), "no such import"))?;
        // Contravariant position: actual's requirement must be satisfiable
        // by what expected provides, i.e. check the reverse direction.
        extern_desc_compatible(aty, ety).map_err(|e| e.nest(format!("import `{name}`")))?;
    }
    for (name, ety) in &expected.exports {
        let aty = actual
            .exports
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, t)| t)
            .ok_or_else(|| TypeMismatch::leaf(format!("export `{name}`"), "no such export"))?;
        extern_desc_compatible(ety, aty).map_err(|e| e.nest(format!("export `{name}`")))?;
    }
    Ok(())
}

pub fn extern_desc_compatible(expected: &ExternDesc, actual: &ExternDesc) -> TResult {
    match (expected, actual) {
        (ExternDesc::Func(e), ExternDesc::Func(a)) => component_func_compatible(e, a),
        (ExternDesc::Value(e), ExternDesc::Value(a)) => val_type_compatible(e, a),
        (ExternDesc::Module(e), ExternDesc::Module(a)) => core_module_compatible(e, a),
        (ExternDesc::Component(e), ExternDesc::Component(a)) => component_type_compatible(e, a),
        (ExternDesc::Instance(e), ExternDesc::Instance(a)) => instance_compatible(e, a),
        (ExternDesc::TypeBound(_), ExternDesc::TypeBound(_)) => Ok(()),
        _ => Err(TypeMismatch::leaf(extern_desc_kind_name(expected), extern_desc_kind_name(actual))),
    }
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

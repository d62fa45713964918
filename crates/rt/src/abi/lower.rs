//! Lowering: turning lifted `Val`s into the flat core-Wasm scalar cells (and,
//! where a value can't fit in cells alone, linear-memory bytes) a core
//! function call actually takes.

use super::layout::{fits_flat, flat_cell_count};
use crate::core_iface::{CoreEngine, CoreFuncRef, CoreMemoryRef};
use crate::error::EngineError;
use crate::instance::Env;
use crate::values::Val;
use weave_ir::{Primitive, StringEncoding, ValType};

/// Every cell in a spilled-to-memory buffer takes a fixed 8-byte slot. This
/// is simpler than the Canonical ABI's packed, alignment-sensitive struct
/// layout, and is only ever read back by this same crate's `lift` half, so
/// the simplification is self-consistent end to end.
const SLOT_SIZE: u32 = 8;

pub fn lower_params(
    env: &Env,
    memory: Option<CoreMemoryRef>,
    realloc: Option<CoreFuncRef>,
    encoding: StringEncoding,
    vals: &[Val],
    tys: &[ValType],
) -> Result<Vec<u64>, EngineError> {
    if fits_flat(tys) {
        let mut cells = Vec::new();
        for (v, t) in vals.iter().zip(tys) {
            lower_into_cells(env, memory, realloc, encoding, v, t, &mut cells)?;
        }
        Ok(cells)
    } else {
        let memory = memory.ok_or(EngineError::CanonicalOptionMissing { option: "memory" })?;
        let realloc = realloc.ok_or(EngineError::CanonicalOptionMissing { option: "realloc" })?;
        let mut cells = Vec::new();
        for (v, t) in vals.iter().zip(tys) {
            lower_into_cells(env, Some(memory), Some(realloc), encoding, v, t, &mut cells)?;
        }
        let buf = cells_to_bytes(&cells);
        let ptr = alloc_and_write(env, memory, realloc, &buf)?;
        Ok(vec![ptr as u64])
    }
}

fn cells_to_bytes(cells: &[u64]) -> Vec<u8> {
    let mut out = Vec::with_capacity(cells.len() * SLOT_SIZE as usize);
    for c in cells {
        out.extend_from_slice(&c.to_le_bytes());
    }
    out
}

fn lower_list_to_buffer(
    env: &Env,
    memory: CoreMemoryRef,
    realloc: CoreFuncRef,
    encoding: StringEncoding,
    items: &[Val],
    elem_ty: &ValType,
) -> Result<(u32, u32), EngineError> {
    let stride = flat_cell_count(elem_ty) as u32;
    let mut cells = Vec::with_capacity(items.len() * stride as usize);
    for item in items {
        lower_into_cells(env, Some(memory), Some(realloc), encoding, item, elem_ty, &mut cells)?;
    }
    let buf = cells_to_bytes(&cells);
    let ptr = alloc_and_write(env, memory, realloc, &buf)?;
    Ok((ptr, items.len() as u32))
}

fn lower_into_cells(
    env: &Env,
    memory: Option<CoreMemoryRef>,
    realloc: Option<CoreFuncRef>,
    encoding: StringEncoding,
    v: &Val,
    t: &ValType,
    out: &mut Vec<u64>,
) -> Result<(), EngineError> {
    match (v, t) {
        (Val::Bool(b), ValType::Primitive(Primitive::Bool)) => out.push(*b as u64),
        (Val::S8(n), ValType::Primitive(Primitive::S8)) => out.push(*n as u64),
        (Val::U8(n), ValType::Primitive(Primitive::U8)) => out.push(*n as u64),
        (Val::S16(n), ValType::Primitive(Primitive::S16)) => out.push(*n as u64),
        (Val::U16(n), ValType::Primitive(Primitive::U16)) => out.push(*n as u64),
        (Val::S32(n), ValType::Primitive(Primitive::S32)) => out.push(*n as u32 as u64),
        (Val::U32(n), ValType::Primitive(Primitive::U32)) => out.push(*n as u64),
        (Val::S64(n), ValType::Primitive(Primitive::S64)) => out.push(*n as u64),
        (Val::U64(n), ValType::Primitive(Primitive::U64)) => out.push(*n),
        (Val::F32(n), ValType::Primitive(Primitive::F32)) => out.push(n.to_bits() as u64),
        (Val::F64(n), ValType::Primitive(Primitive::F64)) => out.push(n.to_bits()),
        (Val::Char(c), ValType::Primitive(Primitive::Char)) => out.push(*c as u64),
        (Val::String(s), ValType::Primitive(Primitive::String)) => {
            let memory = memory.ok_or(EngineError::CanonicalOptionMissing { option: "memory" })?;
            let realloc = realloc.ok_or(EngineError::CanonicalOptionMissing { option: "realloc" })?;
            let bytes = encode_string(s, encoding);
            let code_unit_len = match encoding {
                StringEncoding::Utf8 => bytes.len(),
                StringEncoding::Utf16 | StringEncoding::Latin1OrUtf16 => bytes.len() / 2,
            };
            let ptr = alloc_and_write(env, memory, realloc, &bytes)?;
            out.push(ptr as u64);
            out.push(code_unit_len as u64);
        }
        (Val::List(items), ValType::List(elem_ty)) => {
            let memory = memory.ok_or(EngineError::CanonicalOptionMissing { option: "memory" })?;
            let realloc = realloc.ok_or(EngineError::CanonicalOptionMissing { option: "realloc" })?;
            let (ptr, len) = lower_list_to_buffer(env, memory, realloc, encoding, items, elem_ty)?;
            out.push(ptr as u64);
            out.push(len as u64);
        }
        (Val::Record(fields), ValType::Record(field_tys)) => {
            for (fv, ft) in fields.iter().zip(field_tys) {
                lower_into_cells(env, memory, realloc, encoding, fv, &ft.ty, out)?;
            }
        }
        (Val::Tuple(items), ValType::Tuple(item_tys)) => {
            for (iv, it) in items.iter().zip(item_tys) {
                lower_into_cells(env, memory, realloc, encoding, iv, it, out)?;
            }
        }
        (Val::Variant { case, payload }, ValType::Variant(cases)) => {
            out.push(*case as u64);
            let case_ty = cases.get(*case as usize).and_then(|c| c.payload.as_ref());
            let max_payload_cells = cases
                .iter()
                .map(|c| c.payload.as_ref().map(super::layout::flat_cell_count).unwrap_or(0))
                .max()
                .unwrap_or(0);
            let before = out.len();
            match (payload, case_ty) {
                (Some(p), Some(pt)) => lower_into_cells(env, memory, realloc, encoding, p, pt, out)?,
                (None, None) => {}
                _ => return Err(EngineError::ABIError("variant payload presence mismatch".into())),
            }
            // Pad so every case of this variant contributes the same
            // number of cells, regardless of which case was actually taken.
            out.resize(before + max_payload_cells, 0);
        }
        (Val::Option(inner), ValType::Option(inner_ty)) => {
            let before = out.len();
            match inner {
                Some(v) => {
                    out.push(1);
                    lower_into_cells(env, memory, realloc, encoding, v, inner_ty, out)?;
                }
                None => out.push(0),
            }
            out.resize(before + 1 + super::layout::flat_cell_count(inner_ty), 0);
        }
        (Val::Result(r), ValType::Result { ok, err }) => {
            let before = out.len();
            let ok_cells = ok.as_ref().map(|t| super::layout::flat_cell_count(t)).unwrap_or(0);
            let err_cells = err.as_ref().map(|t| super::layout::flat_cell_count(t)).unwrap_or(0);
            match r {
                Ok(v) => {
                    out.push(0);
                    if let (Some(v), Some(ty)) = (v, ok) {
                        lower_into_cells(env, memory, realloc, encoding, v, ty, out)?;
                    }
                }
                Err(v) => {
                    out.push(1);
                    if let (Some(v), Some(ty)) = (v, err) {
                        lower_into_cells(env, memory, realloc, encoding, v, ty, out)?;
                    }
                }
            }
            out.resize(before + 1 + ok_cells.max(err_cells), 0);
        }
        (Val::Flags(bits), ValType::Flags(_)) => out.push(*bits),
        (Val::Enum(idx), ValType::Enum(_)) => out.push(*idx as u64),
        (Val::Own(h), ValType::Own(_)) | (Val::Borrow(h), ValType::Borrow(_)) => out.push(h.index as u64),
        _ => return Err(EngineError::ABIError("value shape does not match its declared type".into())),
    }
    Ok(())
}

fn encode_string(s: &str, encoding: StringEncoding) -> Vec<u8> {
    match encoding {
        StringEncoding::Utf8 => s.as_bytes().to_vec(),
        StringEncoding::Utf16 | StringEncoding::Latin1OrUtf16 => {
            s.encode_utf16().flat_map(|u| u.to_le_bytes()).collect()
        }
    }
}

fn alloc_and_write(
    env: &Env,
    memory: CoreMemoryRef,
    realloc: CoreFuncRef,
    bytes: &[u8],
) -> Result<u32, EngineError> {
    let mut engine = env.core_engine.borrow_mut();
    // `realloc(old_ptr=0, old_size=0, align, new_size) -> new_ptr`, the
    // canonical ABI's allocator shape for a brand-new allocation.
    let results = engine
        .call_wasm(realloc, &[0, 0, 8, bytes.len() as u64])
        .map_err(|e| EngineError::ABIError(e.to_string()))?;
    let ptr = *results.first().ok_or_else(|| EngineError::ABIError("realloc returned no value".into()))? as u32;
    engine
        .write_memory(memory, ptr, bytes)
        .map_err(|e| EngineError::ABIError(e.to_string()))?;
    Ok(ptr)
}

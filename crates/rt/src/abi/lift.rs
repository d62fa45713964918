//! Lifting: turning flat core-Wasm result cells (and whatever linear-memory
//! bytes they point at) back into fully-formed Component values.

use super::layout::{fits_flat, flat_cell_count};
use crate::core_iface::{CoreEngine, CoreMemoryRef};
use crate::error::EngineError;
use crate::instance::Env;
use crate::values::{Handle, Val};
use weave_ir::{Primitive, StringEncoding, TypeIndex, ValType};

const SLOT_SIZE: u32 = 8;

pub fn lift_results(
    env: &Env,
    memory: Option<CoreMemoryRef>,
    encoding: StringEncoding,
    raw: &[u64],
    tys: &[ValType],
) -> Result<Vec<Val>, EngineError> {
    if fits_flat(tys) {
        let mut cursor = 0usize;
        let mut out = Vec::with_capacity(tys.len());
        for t in tys {
            out.push(lift_from_cells(env, memory, encoding, raw, &mut cursor, t)?);
        }
        Ok(out)
    } else {
        let memory = memory.ok_or(EngineError::CanonicalOptionMissing { option: "memory" })?;
        let ptr = *raw.first().ok_or_else(|| EngineError::ABIError("expected a pointer result cell".into()))? as u32;
        let total_cells: usize = tys.iter().map(flat_cell_count).sum();
        let cells = read_cells(env, memory, ptr, total_cells)?;
        let mut cursor = 0usize;
        let mut out = Vec::with_capacity(tys.len());
        for t in tys {
            out.push(lift_from_cells(env, Some(memory), encoding, &cells, &mut cursor, t)?);
        }
        Ok(out)
    }
}

fn read_cells(env: &Env, memory: CoreMemoryRef, ptr: u32, count: usize) -> Result<Vec<u64>, EngineError> {
    let bytes = env
        .core_engine
        .borrow()
        .read_memory(memory, ptr, count as u32 * SLOT_SIZE)
        .map_err(|e| EngineError::ABIError(e.to_string()))?;
    Ok(bytes
        .chunks_exact(SLOT_SIZE as usize)
        .map(|c| u64::from_le_bytes(c.try_into().unwrap()))
        .collect())
}

fn take(cells: &[u64], cursor: &mut usize) -> Result<u64, EngineError> {
    let v = cells
        .get(*cursor)
        .copied()
        .ok_or_else(|| EngineError::ABIError("ran out of result cells while lifting".into()))?;
    *cursor += 1;
    Ok(v)
}

fn lift_from_cells(
    env: &Env,
    memory: Option<CoreMemoryRef>,
    encoding: StringEncoding,
    cells: &[u64],
    cursor: &mut usize,
    ty: &ValType,
) -> Result<Val, EngineError> {
    Ok(match ty {
        ValType::Primitive(Primitive::Bool) => Val::Bool(take(cells, cursor)? != 0),
        ValType::Primitive(Primitive::S8) => Val::S8(take(cells, cursor)? as i8),
        ValType::Primitive(Primitive::U8) => Val::U8(take(cells, cursor)? as u8),
        ValType::Primitive(Primitive::S16) => Val::S16(take(cells, cursor)? as i16),
        ValType::Primitive(Primitive::U16) => Val::U16(take(cells, cursor)? as u16),
        ValType::Primitive(Primitive::S32) => Val::S32(take(cells, cursor)? as u32 as i32),
        ValType::Primitive(Primitive::U32) => Val::U32(take(cells, cursor)? as u32),
        ValType::Primitive(Primitive::S64) => Val::S64(take(cells, cursor)? as i64),
        ValType::Primitive(Primitive::U64) => Val::U64(take(cells, cursor)?),
        ValType::Primitive(Primitive::F32) => Val::F32(f32::from_bits(take(cells, cursor)? as u32)),
        ValType::Primitive(Primitive::F64) => Val::F64(f64::from_bits(take(cells, cursor)?)),
        ValType::Primitive(Primitive::Char) => {
            let code = take(cells, cursor)? as u32;
            Val::Char(char::from_u32(code).ok_or_else(|| EngineError::ABIError(format!("invalid char codepoint {code}")))?)
        }
        ValType::Primitive(Primitive::String) => {
            let ptr = take(cells, cursor)? as u32;
            let len = take(cells, cursor)? as u32;
            let memory = memory.ok_or(EngineError::CanonicalOptionMissing { option: "memory" })?;
            Val::String(decode_string(env, memory, ptr, len, encoding)?)
        }
        ValType::List(elem_ty) => {
            let ptr = take(cells, cursor)? as u32;
            let len = take(cells, cursor)? as u32;
            let memory = memory.ok_or(EngineError::CanonicalOptionMissing { option: "memory" })?;
            let stride = flat_cell_count(elem_ty);
            let elem_cells = read_cells(env, memory, ptr, stride * len as usize)?;
            let mut elem_cursor = 0usize;
            let mut items = Vec::with_capacity(len as usize);
            for _ in 0..len {
                items.push(lift_from_cells(env, Some(memory), encoding, &elem_cells, &mut elem_cursor, elem_ty)?);
            }
            Val::List(items)
        }
        ValType::Record(fields) => {
            let mut out = Vec::with_capacity(fields.len());
            for f in fields {
                out.push(lift_from_cells(env, memory, encoding, cells, cursor, &f.ty)?);
            }
            Val::Record(out)
        }
        ValType::Tuple(items) => {
            let mut out = Vec::with_capacity(items.len());
            for t in items {
                out.push(lift_from_cells(env, memory, encoding, cells, cursor, t)?);
            }
            Val::Tuple(out)
        }
        ValType::Variant(cases) => {
            let case = take(cells, cursor)? as u32;
            let max_payload_cells = cases.iter().map(|c| c.payload.as_ref().map(flat_cell_count).unwrap_or(0)).max().unwrap_or(0);
            let payload_start = *cursor;
            let payload = match cases.get(case as usize).and_then(|c| c.payload.as_ref()) {
                Some(pt) => Some(Box::new(lift_from_cells(env, memory, encoding, cells, cursor, pt)?)),
                None => None,
            };
            *cursor = payload_start + max_payload_cells;
            Val::Variant { case, payload }
        }
        ValType::Option(inner_ty) => {
            let tag = take(cells, cursor)?;
            let payload_start = *cursor;
            let inner_cells = flat_cell_count(inner_ty);
            let v = if tag != 0 {
                Some(Box::new(lift_from_cells(env, memory, encoding, cells, cursor, inner_ty)?))
            } else {
                None
            };
            *cursor = payload_start + inner_cells;
            Val::Option(v)
        }
        ValType::Result { ok, err } => {
            let tag = take(cells, cursor)?;
            let ok_cells = ok.as_ref().map(|t| flat_cell_count(t)).unwrap_or(0);
            let err_cells = err.as_ref().map(|t| flat_cell_count(t)).unwrap_or(0);
            let payload_start = *cursor;
            let result = if tag == 0 {
                let v = match ok {
                    Some(t) => Some(Box::new(lift_from_cells(env, memory, encoding, cells, cursor, t)?)),
                    None => None,
                };
                Ok(v)
            } else {
                let v = match err {
                    Some(t) => Some(Box::new(lift_from_cells(env, memory, encoding, cells, cursor, t)?)),
                    None => None,
                };
                Err(v)
            };
            *cursor = payload_start + ok_cells.max(err_cells);
            Val::Result(result)
        }
        ValType::Flags(_) => Val::Flags(take(cells, cursor)?),
        ValType::Enum(_) => Val::Enum(take(cells, cursor)? as u32),
        ValType::Own(t) => Val::Own(handle_of(*t, take(cells, cursor)? as u32)),
        ValType::Borrow(t) => Val::Borrow(handle_of(*t, take(cells, cursor)? as u32)),
    })
}

fn handle_of(ty: TypeIndex, index: u32) -> Handle {
    Handle { ty, index }
}

fn decode_string(env: &Env, memory: CoreMemoryRef, ptr: u32, len: u32, encoding: StringEncoding) -> Result<String, EngineError> {
    // `len` is always in code units (§4.6): equal to the byte count for
    // Utf8, but half the byte count for the 16-bit encodings.
    let byte_len = match encoding {
        StringEncoding::Utf8 => len,
        StringEncoding::Utf16 | StringEncoding::Latin1OrUtf16 => len * 2,
    };
    let bytes = env
        .core_engine
        .borrow()
        .read_memory(memory, ptr, byte_len)
        .map_err(|e| EngineError::ABIError(e.to_string()))?;
    match encoding {
        StringEncoding::Utf8 => {
            String::from_utf8(bytes).map_err(|e| EngineError::ABIError(format!("invalid utf-8 string: {e}")))
        }
        StringEncoding::Utf16 | StringEncoding::Latin1OrUtf16 => {
            let units: Vec<u16> = bytes
                .chunks_exact(2)
                .map(|c| u16::from_le_bytes([c[0], c[1]]))
                .collect();
            String::from_utf16(&units).map_err(|e| EngineError::ABIError(format!("invalid utf-16 string: {e}")))
        }
    }
}

//! Shared flattening/layout helpers used by both the lowering and lifting
//! halves of the canonical ABI, so the two stay in lock-step about how many
//! core cells a given value type occupies and when a value has to be routed
//! through linear memory instead of passed as scalars.

use weave_ir::ValType;

/// Number of flat core scalar cells `ty` occupies when passed directly
/// (i.e. before considering the too-many-cells-so-spill-to-memory rule).
/// Strings and lists always report 2 (pointer, length) since their payload
/// is variable-length and therefore never inlined as scalars.
pub fn flat_cell_count(ty: &ValType) -> usize {
    use ValType::*;
    match ty {
        Primitive(weave_ir::Primitive::String) => 2,
        Primitive(_) => 1,
        List(_) => 2,
        Record(fields) => fields.iter().map(|f| flat_cell_count(&f.ty)).sum(),
        Tuple(items) => items.iter().map(flat_cell_count).sum(),
        Variant(cases) => {
            1 + cases
                .iter()
                .map(|c| c.payload.as_ref().map(flat_cell_count).unwrap_or(0))
                .max()
                .unwrap_or(0)
        }
        Option(inner) => 1 + flat_cell_count(inner),
        Result { ok, err } => {
            let ok_cells = ok.as_ref().map(|t| flat_cell_count(t)).unwrap_or(0);
            let err_cells = err.as_ref().map(|t| flat_cell_count(t)).unwrap_or(0);
            1 + ok_cells.max(err_cells)
        }
        Flags(names) => (names.len() + 63) / 64,
        Enum(_) => 1,
        Own(_) | Borrow(_) => 1,
    }
}

/// Whether a param/result list of `tys` fits the inline-scalars calling
/// convention, or must instead be packed into a single linear-memory
/// buffer addressed by one pointer argument.
pub fn fits_flat(tys: &[ValType]) -> bool {
    tys.iter().map(flat_cell_count).sum::<usize>() <= weave_ir::ComponentFuncType::MAX_FLAT
}

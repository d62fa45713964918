//! The runtime representation of a Component Model value as it crosses the
//! canonical ABI boundary, distinct from `weave_ir::LiteralValue` (which only
//! needs to represent the handful of shapes a `start` argument or default
//! value literal can take in a definition).

use weave_ir::TypeIndex;

/// A live resource handle, scoped to one component instance's table for
/// `ty`. Carries the type index so a handle can't accidentally be used
/// against the wrong table even if the raw `u32` collides.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Handle {
    pub ty: TypeIndex,
    pub index: u32,
}

/// A fully-lifted Component value. Lists/records/variants/tuples nest
/// `Val`s directly rather than keeping a lowered byte buffer around, since
/// once lifted a value is expected to be consumed, not re-lowered verbatim.
#[derive(Clone, Debug)]
pub enum Val {
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
    List(Vec<Val>),
    Record(Vec<Val>),
    Variant { case: u32, payload: Option<Box<Val>> },
    Tuple(Vec<Val>),
    Flags(u64),
    Enum(u32),
    Option(Option<Box<Val>>),
    Result(Result<Option<Box<Val>>, Option<Box<Val>>>),
    Own(Handle),
    Borrow(Handle),
}

impl Val {
    pub fn as_string(&self) -> Option<&str> {
        match self {
            Val::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        match self {
            Val::U32(v) => Some(*v),
            _ => None,
        }
    }
}

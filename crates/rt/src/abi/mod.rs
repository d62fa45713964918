//! The Canonical ABI thunk engine: translates between flattened core-Wasm
//! scalars/linear-memory buffers and fully-lifted Component values, and
//! drives the actual core function call in between.

mod layout;
mod lift;
mod lower;
mod thunk;

pub use thunk::call_func;

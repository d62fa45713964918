//! Definition tree, type universes, and structural type-compatibility engine
//! for a Component Model instantiation engine.
//!
//! This crate has no runtime behavior of its own — it only describes the
//! shape of a parsed Component and checks whether one type can stand in for
//! another. Producing a live instance from a `Definition` lives in
//! `weave-rt`.

pub mod index;
pub mod ir;
pub mod typecheck;
pub mod types;

pub use index::*;
pub use ir::*;
pub use typecheck::{
    component_func_compatible, component_type_compatible, core_extern_compatible,
    core_func_compatible, core_global_compatible, core_memory_compatible, core_module_compatible,
    core_table_compatible, extern_desc_compatible, instance_compatible, val_type_compatible,
    TypeMismatch,
};
pub use types::*;

//! Component instantiation and linking: given a parsed `weave_ir::Definition`
//! and a set of resolved imports, produces a live `ComponentInstance` whose
//! exports are ready to call.
//!
//! This crate never decodes a wasm binary and never executes core-Wasm
//! instructions itself — both are delegated to a host-supplied
//! [`core_iface::CoreEngine`]. What it owns is everything in between:
//! import matching, alias resolution, recursive instantiation with
//! all-or-nothing rollback, canonical ABI lowering/lifting, and resource
//! handle tables.

pub mod abi;
pub mod alias;
pub mod config;
pub mod core_iface;
pub mod error;
pub mod import_match;
pub mod instance;
pub mod item;
pub mod resource;
pub mod values;

pub use config::{EngineConfig, Limits};
pub use error::{EngineError, EngineResult};
pub use instance::{instantiate, ComponentInstance, Env, ImportBinding};
pub use item::{FuncValue, HostFunc, Item};
pub use resource::{HandleTable, ResourceTables};
pub use values::{Handle, Val};

#[cfg(test)]
mod tests;

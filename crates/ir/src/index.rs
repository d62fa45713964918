//! Entity-index types for every definition-time index space in a Component
//! Definition. Each is a newtype over `u32` so indices from different
//! spaces (a core-module index is not a type index) can't be mixed up by
//! accident, while still being cheap to copy and usable as `PrimaryMap` keys.

use cranelift_entity::entity_impl;

/// Index of a core module definition within `Definition::core_modules`.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct CoreModuleIndex(u32);
entity_impl!(CoreModuleIndex, "core_module");

/// Index of a core instance definition within `Definition::core_instances`.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct CoreInstanceIndex(u32);
entity_impl!(CoreInstanceIndex, "core_instance");

/// Index of a nested component definition within
/// `Definition::component_modules`.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct ComponentModuleIndex(u32);
entity_impl!(ComponentModuleIndex, "component_module");

/// Index of a component instance definition within
/// `Definition::component_instances`.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct ComponentInstanceIndex(u32);
entity_impl!(ComponentInstanceIndex, "component_instance");

/// Index of an alias definition within `Definition::aliases`.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct AliasIndex(u32);
entity_impl!(AliasIndex, "alias");

/// Index of a type definition within `Definition::types`.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct TypeIndex(u32);
entity_impl!(TypeIndex, "type");

/// Index of a canonical `lift`/`lower` definition within
/// `Definition::canonicals`.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct CanonicalIndex(u32);
entity_impl!(CanonicalIndex, "canonical");

/// Index of an import declaration within `Definition::imports`.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct ImportIndex(u32);
entity_impl!(ImportIndex, "import");

/// Index of an export declaration within `Definition::exports`.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct ExportIndex(u32);
entity_impl!(ExportIndex, "export");

/// Index of a literal value within `Definition::values`.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct ValueIndex(u32);
entity_impl!(ValueIndex, "value");

/// Index of a core function within a single core module's function index
/// space (imports first, then defined functions — standard core-Wasm
/// ordering). Distinct from [`CoreModuleIndex`]: this indexes *inside* one
/// module, not the sequence of module definitions.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct CoreFuncIndex(u32);
entity_impl!(CoreFuncIndex, "core_func");


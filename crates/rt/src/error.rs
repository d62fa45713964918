//! The error taxonomy an instantiation attempt can fail with. Every variant
//! is a distinct, independently matchable failure mode rather than a single
//! stringly-typed catch-all, so a host embedder can decide what to do with
//! (say) a missing import without parsing error text.

use weave_ir::TypeMismatch;

/// Anything that can go wrong building a component instance from a
/// `Definition`. Failure is always all-or-nothing: whichever variant is
/// returned, no partial instance or leaked allocation survives (see
/// `instance::instantiate`'s rollback guard).
#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error("definition invalid: {0}")]
    DefinitionInvalid(String),

    #[error("missing import `{name}`")]
    ImportMissing { name: String },

    #[error("import `{name}` has the wrong kind: expected {expected}, found {found}")]
    ImportKindMismatch {
        name: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("import `{name}` has an incompatible type: {mismatch}")]
    ImportTypeMismatch { name: String, mismatch: TypeMismatch },

    #[error("core module `{module}` import `{field}` could not be satisfied")]
    ImportUnsatisfied { module: String, field: String },

    #[error("core module instantiation failed: {0}")]
    CoreInstantiation(#[source] anyhow::Error),

    #[error("alias could not be resolved: {0}")]
    AliasUnresolved(String),

    #[error("alias resolved to the wrong sort: expected {expected}, found {found}")]
    AliasSortMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("export `{name}` could not be resolved")]
    ExportUnresolved { name: String },

    #[error("export `{name}` has an incompatible type: {mismatch}")]
    ExportTypeMismatch { name: String, mismatch: TypeMismatch },

    #[error("canonical option `{option}` required but not supplied")]
    CanonicalOptionMissing { option: &'static str },

    #[error("canonical ABI error: {0}")]
    ABIError(String),

    #[error("resource table exhausted for resource type {0:?}")]
    ResourceExhausted(weave_ir::TypeIndex),

    #[error("resource handle {handle} is invalid for resource type {ty:?}")]
    ResourceHandleInvalid { ty: weave_ir::TypeIndex, handle: u32 },

    #[error("start function failed: {0}")]
    StartFailed(#[source] anyhow::Error),

    #[error("trap during execution: {0}")]
    Trap(#[source] anyhow::Error),
}

impl EngineError {
    /// A short, stable tag identifying which variant this is, independent of
    /// the interpolated message — useful for metrics/log correlation without
    /// string-matching the `Display` text.
    pub fn tag(&self) -> &'static str {
        match self {
            EngineError::DefinitionInvalid(_) => "definition-invalid",
            EngineError::ImportMissing { .. } => "import-missing",
            EngineError::ImportKindMismatch { .. } => "import-kind-mismatch",
            EngineError::ImportTypeMismatch { .. } => "import-type-mismatch",
            EngineError::ImportUnsatisfied { .. } => "import-unsatisfied",
            EngineError::CoreInstantiation(_) => "core-instantiation",
            EngineError::AliasUnresolved(_) => "alias-unresolved",
            EngineError::AliasSortMismatch { .. } => "alias-sort-mismatch",
            EngineError::ExportUnresolved { .. } => "export-unresolved",
            EngineError::ExportTypeMismatch { .. } => "export-type-mismatch",
            EngineError::CanonicalOptionMissing { .. } => "canonical-option-missing",
            EngineError::ABIError(_) => "abi-error",
            EngineError::ResourceExhausted(_) => "resource-exhausted",
            EngineError::ResourceHandleInvalid { .. } => "resource-handle-invalid",
            EngineError::StartFailed(_) => "start-failed",
            EngineError::Trap(_) => "trap",
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

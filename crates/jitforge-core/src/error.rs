//! Error types for jitforge

use thiserror::Error;

/// Main error type for jitforge operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JitError {
    /// The module's data layout disagrees with the target and cannot be rewritten
    #[error("Module `{module}` has data layout `{module_layout}`, incompatible with target layout `{target_layout}`")]
    DataLayoutMismatch {
        module: String,
        module_layout: String,
        target_layout: String,
    },

    /// IR lowering failed; names the offending symbol and construct
    #[error("Compile error in `{symbol}`: {construct}")]
    Compile { symbol: String, construct: String },

    /// The target lacks something the pipeline needs
    #[error("Unsupported target: {0}")]
    UnsupportedTarget(String),

    /// A name is defined twice inside one namespace
    #[error("Duplicate definition of `{symbol}` in namespace `{namespace}`")]
    DuplicateDefinition { symbol: String, namespace: String },

    /// An external reference had no resolution source
    #[error("Unresolved symbol: {0}")]
    UnresolvedSymbol(String),

    /// Rewriting an address in generated code failed
    #[error("Relocation {kind} against `{symbol}` failed: {reason}")]
    RelocationFailure {
        symbol: String,
        kind: String,
        reason: String,
    },

    /// A requested name never became resolved
    #[error("Symbol not found: {0}")]
    LookupMiss(String),

    /// Mapping or protecting executable memory failed
    #[error("Memory error: {0}")]
    Memory(String),
}

impl JitError {
    /// Shorthand for a [`JitError::Compile`] error.
    pub fn compile(symbol: impl Into<String>, construct: impl Into<String>) -> Self {
        JitError::Compile {
            symbol: symbol.into(),
            construct: construct.into(),
        }
    }
}

/// Result type alias for jitforge operations
pub type Result<T> = std::result::Result<T, JitError>;

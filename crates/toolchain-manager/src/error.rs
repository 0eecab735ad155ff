//! Error types for toolchain-manager

use thiserror::Error;

/// Errors raised while building a [`crate::ToolchainCatalog`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    /// Two requirements share a name
    #[error("requirement '{0}' is declared more than once")]
    DuplicateRequirement(String),

    /// A provided-by or bundled edge names a requirement that is not declared
    #[error("requirement '{requirement}' depends on unknown requirement '{provider}'")]
    UnknownProvider {
        requirement: String,
        provider: String,
    },

    /// Provided-by and bundled edges form a cycle
    #[error("requirement dependencies form a cycle: {}", members.join(" -> "))]
    Cycle { members: Vec<String> },

    /// A minimum version string could not be parsed
    #[error("invalid minimum version '{0}'")]
    InvalidVersion(String),
}

/// Result type for catalog operations
pub type Result<T> = std::result::Result<T, CatalogError>;

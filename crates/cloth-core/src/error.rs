//! Error types for the cloth solver.
//!
//! Only recoverable conditions are represented here. Sequencing mistakes
//! (stale particle ranges, double rule creation) are contract violations and
//! panic at the call site instead.

use thiserror::Error;

/// Recoverable cloth simulation errors.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ClothError {
    /// Wrap deformation was requested between LODs that are not neighbours.
    #[error("LOD {from} and LOD {to} are not adjacent, cannot wrap deform")]
    NonAdjacentLods { from: usize, to: usize },

    /// The mesh has no mapping data between the two LODs.
    #[error("no mesh-to-mesh mapping from LOD {from} to LOD {to}")]
    MissingLodMapping { from: usize, to: usize },

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Convenience alias for `Result<T, ClothError>`.
pub type ClothResult<T> = Result<T, ClothError>;

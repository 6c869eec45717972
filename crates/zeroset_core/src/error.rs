//! Error type for the solver and its patch collaborators.
//!
//! Only input-shape problems are errors. Non-convergence, depth exhaustion
//! and empty solution sets are reported through the outcome instead.
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SolverError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolverError {
    /// The constraint list is empty
    #[error("constraint system is empty")]
    EmptySystem,

    /// Constraint functions disagree on the number of parameters
    #[error("constraint {index} has {found} parameters, expected {expected}")]
    DimensionMismatch {
        index: usize,
        expected: usize,
        found: usize,
    },

    /// Constraint functions are defined over different parameter boxes
    #[error("constraint {0} is defined over a different parameter box")]
    DomainMismatch(usize),

    /// Parameter box is malformed
    #[error("invalid domain: {0}")]
    InvalidDomain(String),

    /// Coefficient grid does not match the declared degrees
    #[error("invalid patch: {0}")]
    InvalidPatch(String),

    /// A tolerance is non-positive or not finite
    #[error("invalid tolerance: {0}")]
    InvalidTolerance(String),

    /// The operation is not defined in this many dimensions
    #[error("unsupported dimension {0}")]
    UnsupportedDimension(usize),
}

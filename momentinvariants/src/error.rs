use thiserror::Error;

/// Errors reported by the moment computation and normalization pipeline.
///
/// Every variant aborts only the request that produced it; inputs passed to the
/// failing call are left untouched.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MomentsError {
    #[error("order {0} is outside the supported range 0..=5")]
    InvalidOrder(usize),

    #[error("radius {0} must be positive and finite")]
    InvalidRadius(f64),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("point data array not found: {0}")]
    MissingPointData(String),

    #[error("{components} components per point cannot be interpreted as a field in {dimension}D")]
    UnsupportedComponentCount { components: usize, dimension: usize },

    #[error("invalid grid: {0}")]
    InvalidGrid(String),

    #[error("pattern and field do not match: {0}")]
    Mismatch(String),

    #[error("tensor rank mismatch: expected {expected}, found {found}")]
    RankMismatch { expected: usize, found: usize },

    #[error("malformed moment array name: {0}")]
    ArrayName(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("exchange protocol violation: {0}")]
    Protocol(String),
}

pub type Result<T> = std::result::Result<T, MomentsError>;

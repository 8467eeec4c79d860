// Error taxonomy shared by every component of the engine
use thiserror::Error;

/// Errors raised by grid construction, lookups, sampling and moment evaluation.
///
/// Every variant is surfaced to the caller immediately; nothing in the engine
/// retries or silently clamps.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum Error {
    /// A grid was too short, not strictly increasing, or held unusable values.
    #[error("invalid grid: {reason}")]
    InvalidGrid {
        /// What was wrong with the grid
        reason: String,
    },

    /// A query fell outside the support of a grid.
    #[error("value {value:e} is outside of the grid bounds [{min:e}, {max:e}]")]
    OutOfBounds {
        /// The offending query
        value: f64,
        /// Lower bound of the grid
        min: f64,
        /// Upper bound of the grid
        max: f64,
    },

    /// An argument was outside the domain of a distribution.
    #[error("domain error: {reason}")]
    Domain {
        /// What was out of the domain
        reason: String,
    },

    /// An iterative method hit its iteration cap before reaching tolerance.
    #[error(
        "failed to converge after {iterations} iterations (estimate {estimate:e}, error {error:e})"
    )]
    ConvergenceFailure {
        /// Iterations (or subintervals) consumed
        iterations: usize,
        /// Best estimate at the point of failure
        estimate: f64,
        /// Error estimate at the point of failure
        error: f64,
    },

    /// A construction or query parameter violated a precondition.
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter {
        /// Parameter name
        name: &'static str,
        /// Why it was rejected
        reason: String,
    },

    /// A grid or interpolation policy identifier could not be parsed.
    #[error("unknown policy identifier: {0}")]
    UnknownPolicy(String),
}

impl Error {
    pub(crate) fn invalid_grid(reason: impl Into<String>) -> Self {
        Error::InvalidGrid {
            reason: reason.into(),
        }
    }

    pub(crate) fn domain(reason: impl Into<String>) -> Self {
        Error::Domain {
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_parameter(name: &'static str, reason: impl Into<String>) -> Self {
        Error::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

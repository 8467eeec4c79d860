// Construction-time configuration for the engine
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::sync::RwLock;

use crate::error::{Error, Result};

// Process-wide default configuration
pub static CONFIG: Lazy<RwLock<EngineConfig>> = Lazy::new(|| RwLock::new(EngineConfig::default()));

/// Construction-time options recognized by the engine.
///
/// Every component copies the configuration it was built with, so changing
/// the global default afterwards never affects existing tables or evaluators.
/// Missing fields take their defaults when deserialized.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Quadrature accuracy, and the bracket width accepted when correlated
    /// inversion runs out of iterations.
    pub tolerance: f64,
    /// Maximum bisection iterations / quadrature subintervals.
    pub max_iterations: usize,
    /// Number of log-energy hash buckets; `None` uses `grid.len() / 10`.
    pub hash_buckets: Option<usize>,
    /// Cosine separating the moment-evaluated region from the rest of the
    /// cutoff distribution. The default `-1.0` keeps the whole cutoff range.
    pub cutoff_angle_cosine: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            tolerance: 1e-7,
            max_iterations: 1000,
            hash_buckets: None,
            cutoff_angle_cosine: -1.0,
        }
    }
}

impl EngineConfig {
    /// Snapshot of the process-wide default configuration.
    pub fn global() -> EngineConfig {
        match CONFIG.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Replace the process-wide default after validating it.
    pub fn set_global(config: EngineConfig) -> Result<()> {
        config.validate()?;
        match CONFIG.write() {
            Ok(mut guard) => *guard = config,
            Err(poisoned) => *poisoned.into_inner() = config,
        }
        Ok(())
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_hash_buckets(mut self, buckets: usize) -> Self {
        self.hash_buckets = Some(buckets);
        self
    }

    pub fn with_cutoff_angle_cosine(mut self, cutoff_angle_cosine: f64) -> Self {
        self.cutoff_angle_cosine = cutoff_angle_cosine;
        self
    }

    /// Number of hash buckets to use for a grid with `grid_len` points.
    pub fn buckets_for(&self, grid_len: usize) -> usize {
        self.hash_buckets.unwrap_or(grid_len / 10).max(1)
    }

    /// Eagerly check every option.
    pub fn validate(&self) -> Result<()> {
        if !(self.tolerance > 0.0 && self.tolerance.is_finite()) {
            return Err(Error::invalid_parameter(
                "tolerance",
                format!("must be positive and finite, got {}", self.tolerance),
            ));
        }
        if self.max_iterations == 0 {
            return Err(Error::invalid_parameter(
                "max_iterations",
                "must be at least 1",
            ));
        }
        if self.hash_buckets == Some(0) {
            return Err(Error::invalid_parameter(
                "hash_buckets",
                "must be at least 1",
            ));
        }
        if !(-1.0..=1.0).contains(&self.cutoff_angle_cosine) {
            return Err(Error::invalid_parameter(
                "cutoff_angle_cosine",
                format!("must lie in [-1, 1], got {}", self.cutoff_angle_cosine),
            ));
        }
        Ok(())
    }
}

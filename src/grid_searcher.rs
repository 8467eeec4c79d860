// Hash-based energy grid searcher
//
// The log-energy range of the grid is split into equal-width buckets. Each
// bucket edge remembers the last grid point at or below it, so a lookup only
// has to search the handful of grid points between two neighbouring edges.

use std::sync::Arc;
use tracing::debug;

use crate::config::EngineConfig;
use crate::error::{Error, Result};

/// O(1) amortized lower-bin lookup over a shared, strictly increasing grid.
#[derive(Debug, Clone)]
pub struct HashBasedGridSearcher {
    grid: Arc<[f64]>,
    /// `hash_grid[b]` is the index of the last grid point at or below edge `b`.
    hash_grid: Vec<usize>,
    log_min: f64,
    bucket_width: f64,
}

/// Validate an energy grid: at least 2 points, finite and strictly increasing.
pub fn validate_grid(grid: &[f64]) -> Result<()> {
    if grid.len() < 2 {
        return Err(Error::invalid_grid(format!(
            "grid needs at least 2 points, got {}",
            grid.len()
        )));
    }
    if let Some(bad) = grid.iter().find(|g| !g.is_finite()) {
        return Err(Error::invalid_grid(format!("grid contains non-finite value {bad}")));
    }
    if let Some(i) = grid.windows(2).position(|w| w[1] <= w[0]) {
        return Err(Error::invalid_grid(format!(
            "grid is not strictly increasing at index {}: {} >= {}",
            i + 1,
            grid[i],
            grid[i + 1]
        )));
    }
    Ok(())
}

impl HashBasedGridSearcher {
    /// Build the hash index over `grid` with `n_buckets` log-energy buckets.
    ///
    /// # Arguments
    /// * `grid` - Strictly increasing, positive energy grid (shared)
    /// * `n_buckets` - Number of equal-width buckets in log-energy space
    ///
    /// # Returns
    /// The searcher, or `InvalidGrid` / `InvalidParameter` on bad input
    pub fn new(grid: Arc<[f64]>, n_buckets: usize) -> Result<Self> {
        validate_grid(&grid)?;
        if grid[0] <= 0.0 {
            return Err(Error::invalid_grid(format!(
                "log-energy buckets need a positive grid, first point is {}",
                grid[0]
            )));
        }
        if n_buckets == 0 {
            return Err(Error::invalid_parameter("n_buckets", "must be at least 1"));
        }

        let log_grid: Vec<f64> = grid.iter().map(|g| g.ln()).collect();
        let log_min = log_grid[0];
        let log_max = log_grid[log_grid.len() - 1];
        let bucket_width = (log_max - log_min) / n_buckets as f64;

        let hash_grid = (0..=n_buckets)
            .map(|b| {
                let edge = if b == n_buckets {
                    log_max
                } else {
                    log_min + b as f64 * bucket_width
                };
                // partition_point is >= 1 because log_grid[0] == log_min <= edge
                log_grid.partition_point(|&lg| lg <= edge).saturating_sub(1)
            })
            .collect();

        debug!(points = grid.len(), buckets = n_buckets, "built hash-based grid searcher");

        Ok(HashBasedGridSearcher {
            grid,
            hash_grid,
            log_min,
            bucket_width,
        })
    }

    /// Build with the bucket count from the global default configuration.
    pub fn with_default_buckets(grid: Arc<[f64]>) -> Result<Self> {
        let buckets = EngineConfig::global().buckets_for(grid.len());
        Self::new(grid, buckets)
    }

    pub fn grid(&self) -> &Arc<[f64]> {
        &self.grid
    }

    pub fn lower_bound(&self) -> f64 {
        self.grid[0]
    }

    pub fn upper_bound(&self) -> f64 {
        self.grid[self.grid.len() - 1]
    }

    pub fn bucket_count(&self) -> usize {
        self.hash_grid.len() - 1
    }

    /// Non-failing check that `energy` lies within the grid.
    #[inline]
    pub fn is_within_bounds(&self, energy: f64) -> bool {
        energy >= self.lower_bound() && energy <= self.upper_bound()
    }

    /// Find `i` such that `grid[i] <= energy <= grid[i + 1]`.
    ///
    /// Returns the last bin when `energy` equals the last grid point.
    pub fn find_lower_bin_index(&self, energy: f64) -> Result<usize> {
        if !self.is_within_bounds(energy) {
            return Err(Error::OutOfBounds {
                value: energy,
                min: self.lower_bound(),
                max: self.upper_bound(),
            });
        }
        Ok(self.locate(energy))
    }

    /// Hot-loop variant for callers that already checked `is_within_bounds`.
    /// Energies outside the grid are clamped to the first or last bin.
    #[inline]
    pub fn find_lower_bin_index_unchecked(&self, energy: f64) -> usize {
        if energy <= self.lower_bound() {
            0
        } else if energy >= self.upper_bound() {
            self.grid.len() - 2
        } else {
            self.locate(energy)
        }
    }

    fn locate(&self, energy: f64) -> usize {
        let last_bin = self.grid.len() - 2;
        let n_buckets = self.bucket_count();
        let offset = ((energy.ln() - self.log_min) / self.bucket_width).floor();
        let bucket = if offset <= 0.0 {
            0
        } else {
            (offset as usize).min(n_buckets - 1)
        };

        let mut lower = self.hash_grid[bucket];
        let upper = (self.hash_grid[bucket + 1] + 1).min(self.grid.len() - 1);

        // Rounding in the log transform can put the edge one point off
        while lower > 0 && self.grid[lower] > energy {
            lower -= 1;
        }
        let upper = upper.max(lower);

        let mut index = lower + self.grid[lower..=upper].partition_point(|&g| g <= energy) - 1;
        while index < last_bin && self.grid[index + 1] <= energy {
            index += 1;
        }
        index.min(last_bin)
    }
}

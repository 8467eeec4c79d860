// Threshold-indexed cross section shared by every reaction type
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::grid_searcher::HashBasedGridSearcher;
use crate::interpolation::OneDInterp;

/// Cross section data as delivered by the data container.
///
/// `cross_section[0]` belongs to `grid[threshold_index]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawThresholdCrossSection {
    /// Index into the shared energy grid where the reaction becomes active.
    pub threshold_index: usize,
    /// Non-zero tail of the cross section, in barns.
    pub cross_section: Vec<f64>,
    /// Interpolation identifier such as "LogLog" (default) or "LinLin".
    #[serde(default)]
    pub interpolation: Option<String>,
}

/// A 1-D cross section that is identically zero below a threshold energy.
///
/// Only the tail starting at `grid[threshold_index]` is stored. The grid and
/// its hash index are shared with every other reaction built on the same
/// energy grid.
#[derive(Debug, Clone)]
pub struct ThresholdCrossSection {
    searcher: Arc<HashBasedGridSearcher>,
    threshold_index: usize,
    values: Vec<f64>,
    interp: OneDInterp,
}

impl ThresholdCrossSection {
    /// Create a threshold cross section over a shared grid.
    ///
    /// # Arguments
    /// * `searcher` - Hash index over the shared energy grid
    /// * `threshold_index` - First grid index with a tabulated value
    /// * `values` - Cross sections for `grid[threshold_index..]`
    /// * `interp` - Interpolation between tabulated points
    pub fn new(
        searcher: Arc<HashBasedGridSearcher>,
        threshold_index: usize,
        values: Vec<f64>,
        interp: OneDInterp,
    ) -> Result<Self> {
        let grid_len = searcher.grid().len();
        if threshold_index >= grid_len {
            return Err(Error::invalid_parameter(
                "threshold_index",
                format!("{threshold_index} is not below the grid size {grid_len}"),
            ));
        }
        if values.len() != grid_len - threshold_index {
            return Err(Error::invalid_parameter(
                "values",
                format!(
                    "expected {} values for threshold index {}, got {}",
                    grid_len - threshold_index,
                    threshold_index,
                    values.len()
                ),
            ));
        }
        if let Some(bad) = values.iter().find(|v| !(v.is_finite() && **v >= 0.0)) {
            return Err(Error::invalid_parameter(
                "values",
                format!("cross sections must be finite and non-negative, found {bad}"),
            ));
        }
        if interp.dependent_scale().is_logarithmic() && values.iter().any(|&v| v == 0.0) {
            warn!(
                threshold_index,
                "zero cross section under {interp} interpolation, affected bins fall back to linear"
            );
        }

        debug!(
            threshold_index,
            points = values.len(),
            %interp,
            "built threshold cross section"
        );

        Ok(ThresholdCrossSection {
            searcher,
            threshold_index,
            values,
            interp,
        })
    }

    /// Build from raw data, defaulting to log-log interpolation.
    pub fn from_raw(searcher: Arc<HashBasedGridSearcher>, raw: RawThresholdCrossSection) -> Result<Self> {
        let interp = match raw.interpolation.as_deref() {
            Some(name) => name.parse()?,
            None => OneDInterp::LogLog,
        };
        Self::new(searcher, raw.threshold_index, raw.cross_section, interp)
    }

    pub fn threshold_index(&self) -> usize {
        self.threshold_index
    }

    pub fn threshold_energy(&self) -> f64 {
        self.searcher.grid()[self.threshold_index]
    }

    pub fn max_energy(&self) -> f64 {
        self.searcher.upper_bound()
    }

    pub fn grid(&self) -> &Arc<[f64]> {
        self.searcher.grid()
    }

    pub fn searcher(&self) -> &Arc<HashBasedGridSearcher> {
        &self.searcher
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn interp(&self) -> OneDInterp {
        self.interp
    }

    /// The equivalent dense array with explicit zeros below the threshold.
    pub fn dense_values(&self) -> Vec<f64> {
        let mut dense = vec![0.0; self.threshold_index];
        dense.extend_from_slice(&self.values);
        dense
    }

    /// Cross section at `energy`.
    ///
    /// Returns 0 below the threshold energy and `OutOfBounds` outside the grid.
    pub fn cross_section(&self, energy: f64) -> Result<f64> {
        let bin = self.searcher.find_lower_bin_index(energy)?;
        Ok(self.evaluate(energy, bin))
    }

    /// Cross section at `energy` using a bin index the caller already found.
    pub fn cross_section_in_bin(&self, energy: f64, bin_index: usize) -> Result<f64> {
        let grid = self.searcher.grid();
        if bin_index + 1 >= grid.len() {
            return Err(Error::invalid_parameter(
                "bin_index",
                format!("{bin_index} is not a bin of a {}-point grid", grid.len()),
            ));
        }
        if energy < grid[bin_index] || energy > grid[bin_index + 1] {
            return Err(Error::domain(format!(
                "energy {energy} is not inside bin {bin_index} [{}, {}]",
                grid[bin_index],
                grid[bin_index + 1]
            )));
        }
        Ok(self.evaluate(energy, bin_index))
    }

    fn evaluate(&self, energy: f64, bin: usize) -> f64 {
        let grid = self.searcher.grid();
        if energy < grid[self.threshold_index] {
            return 0.0;
        }
        if energy == grid[bin] {
            return self.values[bin - self.threshold_index];
        }
        if energy == grid[bin + 1] {
            return self.values[bin + 1 - self.threshold_index];
        }
        let lower = bin - self.threshold_index;
        self.interp
            .interpolate(
                grid[bin],
                grid[bin + 1],
                self.values[lower],
                self.values[lower + 1],
                energy,
            )
            .max(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn searcher(grid: Vec<f64>) -> Arc<HashBasedGridSearcher> {
        Arc::new(HashBasedGridSearcher::new(grid.into(), 2).unwrap())
    }

    #[test]
    fn test_zero_below_threshold() {
        let s = searcher(vec![1.0, 2.0, 3.0, 4.0]);
        let xs = ThresholdCrossSection::new(s, 2, vec![5.0, 6.0], OneDInterp::LinLin).unwrap();
        assert_eq!(xs.cross_section(1.0).unwrap(), 0.0);
        assert_eq!(xs.cross_section(2.5).unwrap(), 0.0);
        assert_eq!(xs.cross_section(2.9999).unwrap(), 0.0);
        assert_eq!(xs.cross_section(3.0).unwrap(), 5.0);
        assert_relative_eq!(xs.cross_section(3.5).unwrap(), 5.5);
        assert_eq!(xs.threshold_energy(), 3.0);
        assert_eq!(xs.max_energy(), 4.0);
    }

    #[test]
    fn test_exact_values_at_grid_points() {
        let s = searcher(vec![1e-5, 1e-3, 1.0, 1e5]);
        let values = vec![2.48924e9, 2.90281e8, 1.3e6, 2.1e3];
        let xs = ThresholdCrossSection::new(s, 0, values.clone(), OneDInterp::LogLog).unwrap();
        assert_eq!(xs.cross_section(1e-5).unwrap(), values[0]);
        assert_eq!(xs.cross_section(1e5).unwrap(), values[3]);
        for (energy, value) in xs.grid().iter().zip(&values) {
            assert_eq!(xs.cross_section(*energy).unwrap(), *value);
        }
    }

    #[test]
    fn test_out_of_bounds_is_surfaced() {
        let s = searcher(vec![1.0, 2.0]);
        let xs = ThresholdCrossSection::new(s, 0, vec![1.0, 1.0], OneDInterp::LinLin).unwrap();
        assert!(matches!(
            xs.cross_section(0.5),
            Err(Error::OutOfBounds { .. })
        ));
        assert!(xs.cross_section(2.5).is_err());
    }

    #[test]
    fn test_bin_overload_matches_search() {
        let s = searcher(vec![1.0, 10.0, 100.0, 1000.0]);
        let xs = ThresholdCrossSection::new(s.clone(), 1, vec![4.0, 2.0, 1.0], OneDInterp::LogLog)
            .unwrap();
        for &energy in &[1.5, 10.0, 31.6, 999.0] {
            let bin = s.find_lower_bin_index(energy).unwrap();
            assert_eq!(
                xs.cross_section_in_bin(energy, bin).unwrap(),
                xs.cross_section(energy).unwrap()
            );
        }
        assert!(matches!(
            xs.cross_section_in_bin(50.0, 0),
            Err(Error::Domain { .. })
        ));
        assert!(xs.cross_section_in_bin(50.0, 3).is_err());
    }

    #[test]
    fn test_dense_values_agree_at_grid_points() {
        let s = searcher(vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        let xs = ThresholdCrossSection::new(s, 2, vec![1.0, 2.0, 3.0], OneDInterp::LinLin).unwrap();
        let dense = xs.dense_values();
        assert_eq!(dense, vec![0.0, 0.0, 1.0, 2.0, 3.0]);
        for (energy, value) in xs.grid().iter().zip(&dense) {
            assert_eq!(xs.cross_section(*energy).unwrap(), *value);
        }
    }

    #[test]
    fn test_log_log_zero_falls_back_to_linear() {
        let s = searcher(vec![1.0, 2.0, 3.0]);
        let xs = ThresholdCrossSection::new(s, 0, vec![0.0, 2.0, 4.0], OneDInterp::LogLog).unwrap();
        let value = xs.cross_section(1.5).unwrap();
        assert!(value > 0.0 && value < 2.0);
        assert!(value.is_finite());
    }

    #[test]
    fn test_invalid_construction() {
        let s = searcher(vec![1.0, 2.0, 3.0]);
        assert!(ThresholdCrossSection::new(s.clone(), 3, vec![], OneDInterp::LinLin).is_err());
        assert!(ThresholdCrossSection::new(s.clone(), 1, vec![1.0], OneDInterp::LinLin).is_err());
        assert!(ThresholdCrossSection::new(s, 1, vec![1.0, -1.0], OneDInterp::LinLin).is_err());
    }

    #[test]
    fn test_from_raw_json() {
        let s = searcher(vec![1.0, 2.0, 3.0]);
        let raw: RawThresholdCrossSection =
            serde_json::from_str(r#"{ "threshold_index": 1, "cross_section": [2.0, 4.0] }"#)
                .unwrap();
        let xs = ThresholdCrossSection::from_raw(s.clone(), raw).unwrap();
        assert_eq!(xs.interp(), OneDInterp::LogLog);
        assert_eq!(xs.cross_section(3.0).unwrap(), 4.0);

        let raw: RawThresholdCrossSection = serde_json::from_str(
            r#"{ "threshold_index": 0, "cross_section": [1.0, 2.0, 3.0], "interpolation": "Spline" }"#,
        )
        .unwrap();
        assert!(matches!(
            ThresholdCrossSection::from_raw(s, raw),
            Err(Error::UnknownPolicy(_))
        ));
    }
}

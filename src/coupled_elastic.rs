// Coupled cutoff and screened Rutherford elastic angular distribution
//
// Below MU_PEAK the tabulated cutoff distribution carries the fraction
// sigma_cutoff / sigma_total of the probability. The rest sits in the
// analytic screened Rutherford peak on [MU_PEAK, 1].

use rand::Rng;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::bivariate::BivariateDistribution;
use crate::elastic_traits::{ElasticTraits, MU_PEAK};
use crate::error::{Error, Result};
use crate::threshold_reaction::ThresholdCrossSection;

/// Elastic scattering cosine distribution over the full range `[-1, 1]`.
#[derive(Debug, Clone)]
pub struct CoupledElasticDistribution {
    traits: ElasticTraits,
    cutoff_distribution: Arc<BivariateDistribution>,
    cutoff_cross_section: ThresholdCrossSection,
    total_cross_section: ThresholdCrossSection,
}

fn check_cosine(mu: f64) -> Result<()> {
    if !(-1.0..=1.0).contains(&mu) {
        return Err(Error::domain(format!(
            "scattering angle cosine {mu} is outside [-1, 1]"
        )));
    }
    Ok(())
}

impl CoupledElasticDistribution {
    /// Couple a tabulated cutoff distribution to the screened Rutherford peak.
    ///
    /// # Arguments
    /// * `traits` - Atomic number dependent screening
    /// * `cutoff_distribution` - Angular distribution with support below `MU_PEAK`
    /// * `cutoff_cross_section` - Cutoff elastic cross section
    /// * `total_cross_section` - Total elastic cross section on the same grid
    pub fn new(
        traits: ElasticTraits,
        cutoff_distribution: Arc<BivariateDistribution>,
        cutoff_cross_section: ThresholdCrossSection,
        total_cross_section: ThresholdCrossSection,
    ) -> Result<Self> {
        let same_grid = Arc::ptr_eq(cutoff_cross_section.grid(), total_cross_section.grid())
            || cutoff_cross_section.grid()[..] == total_cross_section.grid()[..];
        if !same_grid {
            return Err(Error::invalid_parameter(
                "total_cross_section",
                "cutoff and total cross sections must share an energy grid",
            ));
        }
        let primary_grid = cutoff_distribution.primary_grid();
        for (index, &energy) in primary_grid.iter().enumerate() {
            let upper = cutoff_distribution
                .distribution(index)
                .map_or(f64::NEG_INFINITY, |dist| dist.upper_bound());
            if upper > MU_PEAK {
                return Err(Error::invalid_parameter(
                    "cutoff_distribution",
                    format!("support at {energy:e} ends at {upper}, above {MU_PEAK}"),
                ));
            }
        }

        debug!(
            atomic_number = traits.atomic_number(),
            policy = %cutoff_distribution.grid_policy(),
            energies = primary_grid.len(),
            "built coupled elastic distribution"
        );

        Ok(CoupledElasticDistribution {
            traits,
            cutoff_distribution,
            cutoff_cross_section,
            total_cross_section,
        })
    }

    pub fn cutoff_distribution(&self) -> &Arc<BivariateDistribution> {
        &self.cutoff_distribution
    }

    /// Fraction of the total elastic cross section below `MU_PEAK`.
    pub fn cutoff_cross_section_ratio(&self, energy: f64) -> Result<f64> {
        let total = self.total_cross_section.cross_section(energy)?;
        if !(total > 0.0) {
            return Err(Error::domain(format!(
                "total elastic cross section vanishes at {energy:e}"
            )));
        }
        let cutoff = self.cutoff_cross_section.cross_section(energy)?;
        Ok((cutoff / total).clamp(0.0, 1.0))
    }

    pub fn evaluate_pdf(&self, energy: f64, mu: f64) -> Result<f64> {
        check_cosine(mu)?;
        let ratio = self.cutoff_cross_section_ratio(energy)?;
        if mu <= MU_PEAK {
            let norm = self.cutoff_norm(energy)?;
            let pdf = self.cutoff_distribution.evaluate_pdf(energy, mu)?;
            return Ok(ratio * pdf / norm);
        }
        let peak = self.traits.screened_rutherford(energy)?;
        Ok((1.0 - ratio) * peak.evaluate_pdf(mu)?)
    }

    pub fn evaluate_cdf(&self, energy: f64, mu: f64) -> Result<f64> {
        check_cosine(mu)?;
        let ratio = self.cutoff_cross_section_ratio(energy)?;
        if mu <= MU_PEAK {
            let norm = self.cutoff_norm(energy)?;
            return Ok(ratio * self.cutoff_cdf(energy, mu)? / norm);
        }
        let peak = self.traits.screened_rutherford(energy)?;
        Ok(ratio + (1.0 - ratio) * peak.evaluate_cdf(mu)?)
    }

    /// Map one uniform variate in [0, 1] to a scattering angle cosine.
    pub fn sample_with_random_number(&self, energy: f64, xi: f64) -> Result<f64> {
        if !(0.0..=1.0).contains(&xi) {
            return Err(Error::domain(format!("random number {xi} is outside [0, 1]")));
        }
        let ratio = self.cutoff_cross_section_ratio(energy)?;
        let mu = if xi == ratio {
            MU_PEAK
        } else if xi > ratio {
            let peak = self.traits.screened_rutherford(energy)?;
            peak.sample_with_random_number(((xi - ratio) / (1.0 - ratio)).min(1.0))?
        } else {
            let scaled = (xi / ratio * self.cutoff_norm(energy)?).min(1.0);
            self.cutoff_distribution.sample_with_random_number(energy, scaled)?
        };
        trace!(energy, xi, ratio, mu, "sampled coupled elastic cosine");
        Ok(mu)
    }

    pub fn sample<R: Rng + ?Sized>(&self, energy: f64, rng: &mut R) -> Result<f64> {
        self.sample_with_random_number(energy, rng.gen::<f64>())
    }

    /// Sample and add the number of variates consumed to `trials`.
    pub fn sample_and_record_trials<R: Rng + ?Sized>(
        &self,
        energy: f64,
        rng: &mut R,
        trials: &mut u64,
    ) -> Result<f64> {
        let mu = self.sample(energy, rng)?;
        *trials += 1;
        Ok(mu)
    }

    /// Sample a cosine no larger than `max_mu`.
    pub fn sample_in_subrange_with_random_number(
        &self,
        energy: f64,
        xi: f64,
        max_mu: f64,
    ) -> Result<f64> {
        if !(0.0..=1.0).contains(&xi) {
            return Err(Error::domain(format!("random number {xi} is outside [0, 1]")));
        }
        let scaled = xi * self.evaluate_cdf(energy, max_mu)?;
        Ok(self.sample_with_random_number(energy, scaled)?.min(max_mu))
    }

    pub fn sample_in_subrange<R: Rng + ?Sized>(
        &self,
        energy: f64,
        rng: &mut R,
        max_mu: f64,
    ) -> Result<f64> {
        self.sample_in_subrange_with_random_number(energy, rng.gen::<f64>(), max_mu)
    }

    fn cutoff_cdf(&self, energy: f64, mu: f64) -> Result<f64> {
        let (lo, hi) = self.cutoff_distribution.secondary_bounds(energy)?;
        if mu <= lo {
            return Ok(0.0);
        }
        if mu >= hi {
            return self.cutoff_distribution.evaluate_cdf(energy, hi);
        }
        self.cutoff_distribution.evaluate_cdf(energy, mu)
    }

    fn cutoff_norm(&self, energy: f64) -> Result<f64> {
        let norm = self.cutoff_cdf(energy, MU_PEAK)?;
        if !(norm > 0.0) {
            return Err(Error::domain(format!(
                "cutoff distribution has no probability below {MU_PEAK} at {energy:e}"
            )));
        }
        Ok(norm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bivariate::GridPolicy;
    use crate::config::EngineConfig;
    use crate::grid_searcher::HashBasedGridSearcher;
    use crate::interpolation::{OneDInterp, TwoDInterpPolicy};
    use crate::tabular::TabularDistribution;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const ENERGY_GRID: [f64; 3] = [1e-3, 1.0, 1e2];

    fn cutoff_distribution(policy: GridPolicy) -> Arc<BivariateDistribution> {
        let tables = [
            (vec![-1.0, 0.0, MU_PEAK], vec![0.4, 0.5, 0.6]),
            (vec![-1.0, 0.9, MU_PEAK], vec![0.1, 1.0, 2.0]),
            (vec![-1.0, 0.99, MU_PEAK], vec![0.01, 5.0, 20.0]),
        ];
        let distributions = tables
            .into_iter()
            .map(|(mu, pdf)| TabularDistribution::new(mu, pdf, OneDInterp::LinLin).unwrap())
            .collect();
        Arc::new(
            BivariateDistribution::new(
                ENERGY_GRID.to_vec(),
                distributions,
                policy,
                TwoDInterpPolicy::LIN_LIN_LOG,
                EngineConfig::default(),
            )
            .unwrap(),
        )
    }

    fn coupled(policy: GridPolicy) -> CoupledElasticDistribution {
        let searcher =
            Arc::new(HashBasedGridSearcher::new(ENERGY_GRID.to_vec().into(), 1).unwrap());
        let cutoff =
            ThresholdCrossSection::new(searcher.clone(), 0, vec![1e6, 1e5, 1e3], OneDInterp::LogLog)
                .unwrap();
        let total =
            ThresholdCrossSection::new(searcher, 0, vec![1e6, 2e5, 1e4], OneDInterp::LogLog)
                .unwrap();
        CoupledElasticDistribution::new(
            ElasticTraits::new(79).unwrap(),
            cutoff_distribution(policy),
            cutoff,
            total,
        )
        .unwrap()
    }

    #[test]
    fn test_cutoff_cross_section_ratio() {
        let dist = coupled(GridPolicy::Correlated);
        assert_eq!(dist.cutoff_cross_section_ratio(1e-3).unwrap(), 1.0);
        assert_relative_eq!(dist.cutoff_cross_section_ratio(1.0).unwrap(), 0.5, epsilon = 1e-12);
        assert_relative_eq!(dist.cutoff_cross_section_ratio(1e2).unwrap(), 0.1, epsilon = 1e-12);
        assert!(dist.cutoff_cross_section_ratio(1e3).is_err());
    }

    #[test]
    fn test_cdf_splits_at_peak() {
        for policy in [GridPolicy::Direct, GridPolicy::Correlated] {
            let dist = coupled(policy);
            for &energy in &[1.0, 10.0] {
                let ratio = dist.cutoff_cross_section_ratio(energy).unwrap();
                assert_eq!(dist.evaluate_cdf(energy, -1.0).unwrap(), 0.0);
                assert_relative_eq!(dist.evaluate_cdf(energy, MU_PEAK).unwrap(), ratio, epsilon = 1e-12);
                assert_relative_eq!(dist.evaluate_cdf(energy, 1.0).unwrap(), 1.0, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn test_pdf_regions() {
        let dist = coupled(GridPolicy::Correlated);
        let ratio = 0.5;
        // tabulated energy: the cutoff table is already normalized
        let table = dist.cutoff_distribution().distribution(1).unwrap();
        assert_relative_eq!(
            dist.evaluate_pdf(1.0, 0.5).unwrap(),
            ratio * table.evaluate_pdf(0.5) / table.total(),
            max_relative = 1e-12
        );
        let peak = ElasticTraits::new(79).unwrap().screened_rutherford(1.0).unwrap();
        assert_relative_eq!(
            dist.evaluate_pdf(1.0, 1.0).unwrap(),
            (1.0 - ratio) * peak.evaluate_pdf(1.0).unwrap(),
            max_relative = 1e-12
        );
    }

    #[test]
    fn test_sample_picks_region_by_ratio() {
        let dist = coupled(GridPolicy::Correlated);
        assert_eq!(dist.sample_with_random_number(1.0, 0.5).unwrap(), MU_PEAK);
        assert!(dist.sample_with_random_number(1.0, 0.49).unwrap() <= MU_PEAK);
        assert!(dist.sample_with_random_number(1.0, 0.51).unwrap() >= MU_PEAK);
        assert_relative_eq!(dist.sample_with_random_number(1.0, 0.0).unwrap(), -1.0, epsilon = 1e-12);
        assert_relative_eq!(dist.sample_with_random_number(1.0, 1.0).unwrap(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_sample_inverts_cdf() {
        for policy in [GridPolicy::Correlated, GridPolicy::UnitBaseCorrelated] {
            let dist = coupled(policy);
            for &energy in &[1.0, 10.0] {
                for &xi in &[0.01, 0.2, 0.45, 0.7, 0.95] {
                    let mu = dist.sample_with_random_number(energy, xi).unwrap();
                    assert_relative_eq!(dist.evaluate_cdf(energy, mu).unwrap(), xi, epsilon = 1e-6);
                }
            }
        }
    }

    #[test]
    fn test_empirical_peak_fraction() {
        let dist = coupled(GridPolicy::UnitBaseCorrelated);
        let energy = 10.0;
        let ratio = dist.cutoff_cross_section_ratio(energy).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let samples = 20_000;
        let mut trials = 0;
        let below = (0..samples)
            .filter(|_| dist.sample_and_record_trials(energy, &mut rng, &mut trials).unwrap() < MU_PEAK)
            .count();
        assert_eq!(trials, samples as u64);
        assert!(((below as f64 / samples as f64) - ratio).abs() < 0.02);
    }

    #[test]
    fn test_subrange_sampling() {
        let dist = coupled(GridPolicy::Correlated);
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..200 {
            let mu = dist.sample_in_subrange(10.0, &mut rng, 0.5).unwrap();
            assert!((-1.0..=0.5).contains(&mu));
        }
        let mu = dist.sample_in_subrange_with_random_number(1.0, 0.5, 0.9).unwrap();
        let expected = 0.5 * dist.evaluate_cdf(1.0, 0.9).unwrap();
        assert_relative_eq!(dist.evaluate_cdf(1.0, mu).unwrap(), expected, epsilon = 1e-9);
    }

    #[test]
    fn test_invalid_arguments() {
        let dist = coupled(GridPolicy::Direct);
        assert!(matches!(dist.evaluate_pdf(1.0, 1.5), Err(Error::Domain { .. })));
        assert!(matches!(dist.evaluate_cdf(1.0, -1.5), Err(Error::Domain { .. })));
        assert!(dist.sample_with_random_number(1.0, 1.5).is_err());
        assert!(dist.evaluate_pdf(1e3, 0.5).is_err());

        let mut rng = StdRng::seed_from_u64(1);
        let mut trials = 0;
        assert!(dist.sample_and_record_trials(1e-4, &mut rng, &mut trials).is_err());
        assert_eq!(trials, 0);
    }

    #[test]
    fn test_rejects_support_beyond_peak() {
        let searcher =
            Arc::new(HashBasedGridSearcher::new(vec![1.0, 10.0].into(), 1).unwrap());
        let cross_section =
            ThresholdCrossSection::new(searcher, 0, vec![1.0, 1.0], OneDInterp::LinLin).unwrap();
        let tables = (0..2)
            .map(|_| {
                TabularDistribution::new(vec![-1.0, 1.0], vec![0.5, 0.5], OneDInterp::LinLin)
                    .unwrap()
            })
            .collect();
        let wide = BivariateDistribution::new(
            vec![1.0, 10.0],
            tables,
            GridPolicy::Direct,
            TwoDInterpPolicy::LIN_LIN_LOG,
            EngineConfig::default(),
        )
        .unwrap();
        assert!(matches!(
            CoupledElasticDistribution::new(
                ElasticTraits::new(1).unwrap(),
                Arc::new(wide),
                cross_section.clone(),
                cross_section,
            ),
            Err(Error::InvalidParameter { .. })
        ));
    }
}

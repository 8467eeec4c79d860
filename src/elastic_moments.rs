// Legendre moments of the elastic angular distribution
//
// The angular distribution is split at MU_PEAK. Below it the tabulated
// cutoff distribution is integrated numerically. Above it the screened
// Rutherford peak is handled by a `RutherfordMomentStrategy`, normally the
// closed-form recursion, since the peak is far too narrow for quadrature at
// high energies.

use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::bivariate::BivariateDistribution;
use crate::config::EngineConfig;
use crate::elastic_traits::{ElasticTraits, ScreenedRutherfordDistribution, DELTA_MU_PEAK, MU_PEAK};
use crate::error::{Error, Result};
use crate::legendre::{legendre_p, ShiftedLegendreCoefficients};
use crate::quadrature::GaussKronrodIntegrator;
use crate::radau::{DiscreteAngles, RadauQuadrature};
use crate::threshold_reaction::ThresholdCrossSection;

// Above this ratio eta / DELTA_MU_PEAK the power series in 1/a is used.
const SERIES_CROSSOVER: f64 = 2.0;
const SERIES_MAX_TERMS: usize = 500;

/// Moments `0..=order` of the normalized screened Rutherford density on
/// `[MU_PEAK, 1]`.
pub trait RutherfordMomentStrategy: Send + Sync + fmt::Debug {
    fn moments(&self, eta: f64, order: usize) -> Result<Vec<f64>>;
}

/// Closed-form evaluation of the screened Rutherford moments.
///
/// With `x = 1 - mu`, `t = x / DELTA_MU_PEAK` and `a = eta / DELTA_MU_PEAK`
/// every moment is `sum_k c_{n,k} DELTA^k T_k`, where `c_{n,k}` expand
/// `P_n(1 - x)` and `T_k` is the `k`-th power moment of `1 / (a + t)^2` on
/// `[0, 1]`. `T_k` comes from a convergent series in `1 / a` for large `a`
/// and from an upward recursion otherwise.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecursionStrategy;

impl RecursionStrategy {
    fn power_moments(a: f64, max_k: usize) -> Vec<f64> {
        if a > SERIES_CROSSOVER {
            let ratio = -1.0 / a;
            (0..=max_k)
                .map(|k| {
                    let mut sum = 0.0;
                    let mut power = 1.0;
                    for j in 0..SERIES_MAX_TERMS {
                        let term = (j + 1) as f64 * power / (k + j + 1) as f64;
                        sum += term;
                        if term.abs() <= 1e-17 * sum.abs() {
                            break;
                        }
                        power *= ratio;
                    }
                    (1.0 + 1.0 / a) * sum
                })
                .collect()
        } else {
            // B_k = int t^k / (a + t), A_k = int t^k / (a + t)^2
            let a0 = 1.0 / (a * (1.0 + a));
            let mut b = (1.0 / a).ln_1p();
            let mut a_k = a0;
            let mut moments = Vec::with_capacity(max_k + 1);
            moments.push(1.0);
            for k in 1..=max_k {
                a_k = b - a * a_k;
                b = 1.0 / k as f64 - a * b;
                moments.push(a_k / a0);
            }
            moments
        }
    }
}

impl RutherfordMomentStrategy for RecursionStrategy {
    fn moments(&self, eta: f64, order: usize) -> Result<Vec<f64>> {
        ScreenedRutherfordDistribution::new(eta)?;
        let coefficients = ShiftedLegendreCoefficients::new(order);
        let power_moments = Self::power_moments(eta / DELTA_MU_PEAK, order);

        (0..=order)
            .map(|n| {
                let row = coefficients.coefficients(n).ok_or_else(|| {
                    Error::invalid_parameter("order", format!("no coefficients for order {n}"))
                })?;
                let mut delta_power = 1.0;
                let mut moment = 0.0;
                for (c, t) in row.iter().zip(&power_moments) {
                    moment += c * delta_power * t;
                    delta_power *= DELTA_MU_PEAK;
                }
                Ok(moment)
            })
            .collect()
    }
}

/// Direct numerical integration of the screened Rutherford moments.
///
/// Integrates in `x = 1 - mu` so the peak at `x = 0` is resolved without
/// cancellation. Only practical for moderate `eta`.
#[derive(Debug, Clone, Copy)]
pub struct QuadratureStrategy {
    integrator: GaussKronrodIntegrator,
}

impl QuadratureStrategy {
    pub fn new(precision: f64) -> Result<Self> {
        Ok(QuadratureStrategy {
            integrator: GaussKronrodIntegrator::new(precision)?,
        })
    }

    pub fn with_max_subintervals(mut self, max_subintervals: usize) -> Self {
        self.integrator = self.integrator.with_max_subintervals(max_subintervals);
        self
    }
}

impl RutherfordMomentStrategy for QuadratureStrategy {
    fn moments(&self, eta: f64, order: usize) -> Result<Vec<f64>> {
        ScreenedRutherfordDistribution::new(eta)?;
        let scale = eta * (eta + DELTA_MU_PEAK) / DELTA_MU_PEAK;
        let density = |x: f64| scale / ((eta + x) * (eta + x));

        let (mass, _) = self
            .integrator
            .integrate_adaptively(|x| Ok(density(x)), 0.0, DELTA_MU_PEAK)?;
        let integrator = self
            .integrator
            .with_absolute_tolerance(self.integrator.relative_tolerance() * mass);

        let mut moments = Vec::with_capacity(order + 1);
        moments.push(mass);
        for n in 1..=order {
            let (moment, _) = integrator.integrate_adaptively(
                |x| Ok(density(x) * legendre_p(n, 1.0 - x)),
                0.0,
                DELTA_MU_PEAK,
            )?;
            moments.push(moment);
        }
        Ok(moments)
    }
}

/// Unnormalized moments of the two angular regions and the cross sections
/// weighting them.
#[derive(Debug, Clone, PartialEq)]
pub struct MomentContributions {
    /// Cutoff moments times the cutoff cross section.
    pub cutoff_moments: Vec<f64>,
    /// Screened Rutherford moments times `total - cutoff`.
    pub rutherford_moments: Vec<f64>,
    /// Tabulated cutoff cross section at the energy.
    pub cutoff_cross_section: f64,
    /// Cross section assigned to the screened Rutherford peak.
    pub rutherford_cross_section: f64,
}

impl MomentContributions {
    /// Combined moments normalized by the combined 0th moment.
    pub fn normalized(&self) -> Result<Vec<f64>> {
        let zeroth = |moments: &[f64]| moments.first().copied().unwrap_or(0.0);
        let norm = zeroth(&self.cutoff_moments) + zeroth(&self.rutherford_moments);
        if !(norm > 0.0) {
            return Err(Error::domain(
                "both the cutoff and the screened rutherford 0th moments vanish",
            ));
        }
        Ok(self
            .cutoff_moments
            .iter()
            .zip(&self.rutherford_moments)
            .map(|(c, r)| (c + r) / norm)
            .collect())
    }
}

/// Discrete scattering cosines replacing the elastic distribution away from
/// the forward direction.
#[derive(Debug, Clone, PartialEq)]
pub struct MomentPreservingAngles {
    /// Ascending cosines, all below 1.
    pub cosines: Vec<f64>,
    /// Weights summing to 1.
    pub weights: Vec<f64>,
    /// Fraction of the elastic cross section carried by the discrete angles.
    pub cross_section_reduction: f64,
}

/// Legendre moments of the elastic scattering angular distribution.
#[derive(Debug)]
pub struct ElasticMomentsEvaluator {
    traits: ElasticTraits,
    cutoff_distribution: Arc<BivariateDistribution>,
    cutoff_cross_section: ThresholdCrossSection,
    total_cross_section: ThresholdCrossSection,
    screened_rutherford_threshold_index: usize,
    cutoff_angle_cosine: f64,
    max_subintervals: usize,
    rutherford: Box<dyn RutherfordMomentStrategy>,
}

impl ElasticMomentsEvaluator {
    /// Create an evaluator for one element.
    ///
    /// # Arguments
    /// * `traits` - Atomic number dependent screening
    /// * `cutoff_distribution` - Tabulated angular distribution below `MU_PEAK`
    /// * `cutoff_cross_section` - Cutoff elastic cross section
    /// * `total_cross_section` - Total elastic cross section on the same grid
    /// * `screened_rutherford_threshold_index` - First energy bin where the
    ///   screened Rutherford peak contributes
    /// * `config` - Supplies the cutoff angle cosine and the subinterval cap
    pub fn new(
        traits: ElasticTraits,
        cutoff_distribution: Arc<BivariateDistribution>,
        cutoff_cross_section: ThresholdCrossSection,
        total_cross_section: ThresholdCrossSection,
        screened_rutherford_threshold_index: usize,
        config: &EngineConfig,
    ) -> Result<Self> {
        config.validate()?;
        let same_grid = Arc::ptr_eq(cutoff_cross_section.grid(), total_cross_section.grid())
            || cutoff_cross_section.grid()[..] == total_cross_section.grid()[..];
        if !same_grid {
            return Err(Error::invalid_parameter(
                "total_cross_section",
                "cutoff and total cross sections must share an energy grid",
            ));
        }
        let grid_len = cutoff_cross_section.grid().len();
        if screened_rutherford_threshold_index >= grid_len {
            return Err(Error::invalid_parameter(
                "screened_rutherford_threshold_index",
                format!("{screened_rutherford_threshold_index} is not below the grid size {grid_len}"),
            ));
        }

        debug!(
            atomic_number = traits.atomic_number(),
            policy = %cutoff_distribution.grid_policy(),
            cutoff_angle_cosine = config.cutoff_angle_cosine,
            screened_rutherford_threshold_index,
            "built elastic moments evaluator"
        );

        Ok(ElasticMomentsEvaluator {
            traits,
            cutoff_distribution,
            cutoff_cross_section,
            total_cross_section,
            screened_rutherford_threshold_index,
            cutoff_angle_cosine: config.cutoff_angle_cosine,
            max_subintervals: config.max_iterations,
            rutherford: Box::new(RecursionStrategy),
        })
    }

    /// Replace the screened Rutherford moment strategy.
    pub fn with_rutherford_strategy(mut self, strategy: Box<dyn RutherfordMomentStrategy>) -> Self {
        self.rutherford = strategy;
        self
    }

    pub fn traits(&self) -> &ElasticTraits {
        &self.traits
    }

    pub fn cutoff_angle_cosine(&self) -> f64 {
        self.cutoff_angle_cosine
    }

    /// Normalized Legendre moments `0..=order` at `energy`.
    pub fn evaluate_elastic_moment(&self, energy: f64, order: usize, precision: f64) -> Result<Vec<f64>> {
        let moments = self
            .evaluate_moment_contributions(energy, order, precision)?
            .normalized()?;
        trace!(energy, order, first = ?moments.get(1), "evaluated elastic moments");
        Ok(moments)
    }

    /// Discrete cosines that preserve the elastic Legendre moments through
    /// order `2 * number_of_angles`.
    ///
    /// The forward node at `mu = 1` is dropped and its weight becomes the
    /// cross section reduction, so the returned weights sum to 1.
    pub fn evaluate_moment_preserving_angles(
        &self,
        energy: f64,
        number_of_angles: usize,
        precision: f64,
    ) -> Result<MomentPreservingAngles> {
        if number_of_angles == 0 {
            return Err(Error::invalid_parameter(
                "number_of_angles",
                "must be at least 1",
            ));
        }
        let moments = self.evaluate_elastic_moment(energy, 2 * number_of_angles, precision)?;
        let DiscreteAngles {
            mut cosines,
            mut weights,
        } = RadauQuadrature::new(&moments)?.nodes_and_weights(number_of_angles + 1)?;
        cosines.pop();
        weights.pop();

        let cross_section_reduction: f64 = weights.iter().sum();
        if cosines.is_empty() || !(cross_section_reduction > 0.0) {
            return Err(Error::domain(format!(
                "no moment preserving angles away from the forward direction at {energy:e}"
            )));
        }
        for weight in weights.iter_mut() {
            *weight /= cross_section_reduction;
        }
        debug!(
            energy,
            angles = cosines.len(),
            cross_section_reduction,
            "evaluated moment preserving angles"
        );
        Ok(MomentPreservingAngles {
            cosines,
            weights,
            cross_section_reduction,
        })
    }

    /// Unnormalized cutoff and screened Rutherford moments at `energy`.
    pub fn evaluate_moment_contributions(
        &self,
        energy: f64,
        order: usize,
        precision: f64,
    ) -> Result<MomentContributions> {
        let integrator = self.integrator(precision)?;
        let bin = self.cutoff_cross_section.searcher().find_lower_bin_index(energy)?;
        let cutoff_cross_section = self.cutoff_cross_section.cross_section_in_bin(energy, bin)?;
        let total_cross_section = self.total_cross_section.cross_section_in_bin(energy, bin)?;

        let mut cutoff_moments = vec![0.0; order + 1];
        if self.cutoff_angle_cosine < MU_PEAK && cutoff_cross_section > 0.0 {
            cutoff_moments = self.weighted_cutoff_moments(
                &integrator,
                self.cutoff_angle_cosine,
                energy,
                order,
                cutoff_cross_section,
            )?;
        }

        let mut rutherford_moments = vec![0.0; order + 1];
        let mut rutherford_cross_section = 0.0;
        if bin >= self.screened_rutherford_threshold_index {
            rutherford_cross_section = (total_cross_section - cutoff_cross_section).max(0.0);
            if rutherford_cross_section > 0.0 {
                let eta = self.traits.moliere_screening_constant(energy)?;
                let moments = self.rutherford.moments(eta, order)?;
                for (moment, value) in rutherford_moments.iter_mut().zip(moments) {
                    *moment = value * rutherford_cross_section;
                }
            }
        }

        // Nothing left above the cutoff angle: the whole cutoff distribution
        // carries the total cross section.
        if cutoff_moments[0] <= 0.0 && rutherford_moments[0] <= 0.0 && total_cross_section > 0.0 {
            debug!(
                energy,
                cutoff_angle_cosine = self.cutoff_angle_cosine,
                "no moments above the cutoff angle, using the full cutoff distribution"
            );
            cutoff_moments =
                self.weighted_cutoff_moments(&integrator, -1.0, energy, order, total_cross_section)?;
        }

        Ok(MomentContributions {
            cutoff_moments,
            rutherford_moments,
            cutoff_cross_section,
            rutherford_cross_section,
        })
    }

    /// Integral of `pdf(energy, mu) * P_order(mu)` over consecutive points
    /// of `angular_grid`.
    pub fn evaluate_cutoff_pdf_moment(
        &self,
        angular_grid: &[f64],
        energy: f64,
        order: usize,
        precision: f64,
    ) -> Result<f64> {
        if angular_grid.len() < 2 || angular_grid.windows(2).any(|w| w[0] >= w[1]) {
            return Err(Error::invalid_grid(
                "angular grid needs at least two strictly increasing points",
            ));
        }
        let integrator = self.integrator(precision)?;
        let moments = self.cutoff_moments(&integrator, angular_grid, energy, order)?;
        Ok(moments[order])
    }

    /// Moment `order` of the normalized screened Rutherford density.
    pub fn evaluate_screened_rutherford_pdf_moment(&self, eta: f64, order: usize) -> Result<f64> {
        let moments = self.rutherford.moments(eta, order)?;
        Ok(moments[order])
    }

    fn integrator(&self, precision: f64) -> Result<GaussKronrodIntegrator> {
        Ok(GaussKronrodIntegrator::new(precision)?.with_max_subintervals(self.max_subintervals))
    }

    // Cutoff moments on [lower_cosine, MU_PEAK], normalized by the cutoff
    // distribution's mass below MU_PEAK and weighted by `cross_section`.
    fn weighted_cutoff_moments(
        &self,
        integrator: &GaussKronrodIntegrator,
        lower_cosine: f64,
        energy: f64,
        order: usize,
        cross_section: f64,
    ) -> Result<Vec<f64>> {
        let grid = self.cutoff_integration_grid(energy, lower_cosine)?;
        let norm = self.cutoff_distribution.evaluate_cdf(energy, MU_PEAK)?;
        if !(norm > 0.0) {
            return Err(Error::domain(format!(
                "cutoff distribution has no probability below {MU_PEAK} at {energy:e}"
            )));
        }
        let raw = self.cutoff_moments(integrator, &grid, energy, order)?;
        Ok(raw.into_iter().map(|value| value / norm * cross_section).collect())
    }

    fn cutoff_integration_grid(&self, energy: f64, lower_cosine: f64) -> Result<Vec<f64>> {
        let (support_lo, support_hi) = self.cutoff_distribution.secondary_bounds(energy)?;
        let lo = lower_cosine.max(support_lo);
        let hi = MU_PEAK.min(support_hi);
        if lo >= hi {
            return Ok(Vec::new());
        }
        let mut grid = self.cutoff_distribution.secondary_grid_at(energy)?;
        grid.retain(|&mu| mu > lo && mu < hi);
        grid.push(lo);
        grid.push(hi);
        grid.sort_by(f64::total_cmp);
        grid.dedup();
        Ok(grid)
    }

    // Moments 0..=order over the grid. Higher orders use an absolute
    // tolerance scaled by each segment's mass since they can vanish.
    fn cutoff_moments(
        &self,
        integrator: &GaussKronrodIntegrator,
        grid: &[f64],
        energy: f64,
        order: usize,
    ) -> Result<Vec<f64>> {
        let distribution = &self.cutoff_distribution;
        let mut moments = vec![0.0; order + 1];
        for segment in grid.windows(2) {
            let (a, b) = (segment[0], segment[1]);
            let (mass, _) =
                integrator.integrate_adaptively(|mu| distribution.evaluate_pdf(energy, mu), a, b)?;
            moments[0] += mass;
            if mass <= 0.0 {
                continue;
            }
            let scaled = integrator.with_absolute_tolerance(integrator.relative_tolerance() * mass);
            for (n, moment) in moments.iter_mut().enumerate().skip(1) {
                let (value, _) = scaled.integrate_adaptively(
                    |mu| Ok(distribution.evaluate_pdf(energy, mu)? * legendre_p(n, mu)),
                    a,
                    b,
                )?;
                *moment += value;
            }
        }
        Ok(moments)
    }
}

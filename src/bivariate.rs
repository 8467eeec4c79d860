// Bivariate (primary x secondary) distribution engine
//
// A table of conditional distributions tabulated at discrete primary values
// (incoming energies). Queries between two primary grid points are handled
// by one of four grid policies, each implemented as a
// `SecondaryInterpolationStrategy` chosen once at construction.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::grid_searcher::HashBasedGridSearcher;
use crate::interpolation::{OneDInterp, Scale, TwoDInterpPolicy};
use crate::tabular::TabularDistribution;

/// How two bracketing conditional distributions are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum GridPolicy {
    Direct,
    UnitBase,
    Correlated,
    #[default]
    UnitBaseCorrelated,
}

impl FromStr for GridPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let key: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        match key.as_str() {
            "direct" => Ok(GridPolicy::Direct),
            "unitbase" => Ok(GridPolicy::UnitBase),
            "correlated" => Ok(GridPolicy::Correlated),
            "unitbasecorrelated" => Ok(GridPolicy::UnitBaseCorrelated),
            _ => Err(Error::UnknownPolicy(s.to_string())),
        }
    }
}

impl fmt::Display for GridPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GridPolicy::Direct => "Direct",
            GridPolicy::UnitBase => "Unit-base",
            GridPolicy::Correlated => "Correlated",
            GridPolicy::UnitBaseCorrelated => "Unit-base Correlated",
        };
        f.write_str(name)
    }
}

/// The two conditional distributions bracketing a primary value, and the
/// fraction `beta` of the way from the lower to the upper one in processed
/// primary space. `beta` is strictly between 0 and 1.
#[derive(Debug, Clone, Copy)]
pub struct Bracket<'a> {
    pub lower: &'a TabularDistribution,
    pub upper: &'a TabularDistribution,
    pub beta: f64,
}

impl<'a> Bracket<'a> {
    fn pair(&self) -> [&'a TabularDistribution; 2] {
        [self.lower, self.upper]
    }

    fn weights(&self) -> [f64; 2] {
        [1.0 - self.beta, self.beta]
    }

    /// Interpolated total of the two distributions (1 unless ratio form).
    fn total(&self) -> f64 {
        (1.0 - self.beta) * self.lower.total() + self.beta * self.upper.total()
    }

    /// Split one variate into a choice of distribution (0 lower, 1 upper)
    /// and a fresh variate.
    fn split_variate(&self, xi: f64) -> (usize, f64) {
        let lower_weight = 1.0 - self.beta;
        if xi < lower_weight {
            (0, xi / lower_weight)
        } else {
            (1, ((xi - lower_weight) / self.beta).clamp(0.0, 1.0))
        }
    }
}

/// Strategy for evaluating and sampling between two primary grid points.
pub trait SecondaryInterpolationStrategy: Send + Sync + fmt::Debug {
    fn policy(&self) -> GridPolicy;

    /// Support of the secondary variable at the intermediate primary value.
    fn bounds(&self, bracket: &Bracket) -> (f64, f64);

    fn evaluate_pdf(&self, bracket: &Bracket, secondary: f64) -> Result<f64>;

    fn evaluate_cdf(&self, bracket: &Bracket, secondary: f64) -> Result<f64>;

    /// Map one uniform variate to a secondary value.
    fn sample(&self, bracket: &Bracket, xi: f64) -> Result<f64>;

    /// Breakpoints of the intermediate distribution, sorted and inside `bounds`.
    fn intermediate_grid(&self, bracket: &Bracket) -> Vec<f64>;
}

/// Build the strategy object for a grid policy.
pub fn strategy_for(
    policy: GridPolicy,
    interp: TwoDInterpPolicy,
    config: &EngineConfig,
) -> Box<dyn SecondaryInterpolationStrategy> {
    match policy {
        GridPolicy::Direct => Box::new(DirectStrategy { interp }),
        GridPolicy::UnitBase => Box::new(UnitBaseStrategy { interp }),
        GridPolicy::Correlated => Box::new(CorrelatedStrategy {
            interp,
            tolerance: config.tolerance,
            max_iterations: config.max_iterations,
        }),
        GridPolicy::UnitBaseCorrelated => Box::new(UnitBaseCorrelatedStrategy {
            interp,
            tolerance: config.tolerance,
            max_iterations: config.max_iterations,
        }),
    }
}

fn clip_sorted(mut points: Vec<f64>, (lo, hi): (f64, f64)) -> Vec<f64> {
    points.retain(|&p| p > lo && p < hi);
    points.push(lo);
    points.push(hi);
    points.sort_by(f64::total_cmp);
    points.dedup();
    points
}

/// Find the variate whose correlated image equals `target`.
///
/// `image` must be non-decreasing in the variate. Bisection runs until the
/// bracket can no longer be split in floating point, so the densities built
/// on the variate stay smooth. If `max_iterations` runs out first, the
/// variate is accepted only when it is bracketed to within `tolerance`.
fn solve_correlated_variate<F>(
    target: f64,
    tolerance: f64,
    max_iterations: usize,
    image: F,
) -> Result<f64>
where
    F: Fn(f64) -> Result<f64>,
{
    let (mut lo, mut hi) = (0.0_f64, 1.0_f64);
    for _ in 0..max_iterations {
        let mid = 0.5 * (lo + hi);
        if mid <= lo || mid >= hi || hi - lo <= f64::EPSILON * hi {
            return Ok(mid);
        }
        let value = image(mid)?;
        if value == target {
            return Ok(mid);
        }
        if value < target {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    if hi - lo <= tolerance {
        return Ok(0.5 * (lo + hi));
    }
    Err(Error::ConvergenceFailure {
        iterations: max_iterations,
        estimate: 0.5 * (lo + hi),
        error: hi - lo,
    })
}

/// Interpolate the probability density between the two raw secondary grids
/// at the same secondary value.
#[derive(Debug, Clone)]
pub struct DirectStrategy {
    interp: TwoDInterpPolicy,
}

impl SecondaryInterpolationStrategy for DirectStrategy {
    fn policy(&self) -> GridPolicy {
        GridPolicy::Direct
    }

    fn bounds(&self, bracket: &Bracket) -> (f64, f64) {
        (
            bracket.lower.lower_bound().min(bracket.upper.lower_bound()),
            bracket.lower.upper_bound().max(bracket.upper.upper_bound()),
        )
    }

    /// Densities are combined on the `z` scale while the CDF is always mixed
    /// linearly, so this is the derivative of `evaluate_cdf` only for a
    /// linear `z` scale.
    fn evaluate_pdf(&self, bracket: &Bracket, secondary: f64) -> Result<f64> {
        let (lo, hi) = self.bounds(bracket);
        if secondary < lo || secondary > hi {
            return Ok(0.0);
        }
        Ok(self.interp.interpolate_density(
            bracket.beta,
            bracket.lower.evaluate_pdf(secondary),
            bracket.upper.evaluate_pdf(secondary),
        ))
    }

    fn evaluate_cdf(&self, bracket: &Bracket, secondary: f64) -> Result<f64> {
        Ok((1.0 - bracket.beta) * bracket.lower.evaluate_cdf(secondary)
            + bracket.beta * bracket.upper.evaluate_cdf(secondary))
    }

    fn sample(&self, bracket: &Bracket, xi: f64) -> Result<f64> {
        let (i, xi) = bracket.split_variate(xi);
        bracket.pair()[i].sample_with_random_number(xi)
    }

    fn intermediate_grid(&self, bracket: &Bracket) -> Vec<f64> {
        let mut points = bracket.lower.x_values().to_vec();
        points.extend_from_slice(bracket.upper.x_values());
        clip_sorted(points, self.bounds(bracket))
    }
}

/// Processed-space geometry shared by the unit-base policies.
#[derive(Debug, Clone, Copy)]
struct UnitBaseFrame {
    scale: Scale,
    bounds: (f64, f64),
    start: [f64; 2],
    length: [f64; 2],
    inter_start: f64,
    inter_length: f64,
}

impl UnitBaseFrame {
    fn new(scale: Scale, bracket: &Bracket) -> Self {
        let mut start = [0.0; 2];
        let mut length = [0.0; 2];
        for (i, dist) in bracket.pair().iter().enumerate() {
            start[i] = scale.process(dist.lower_bound());
            length[i] = scale.process(dist.upper_bound()) - start[i];
        }
        let [w0, w1] = bracket.weights();
        let (l, u) = (bracket.lower, bracket.upper);
        let endpoint = |a: f64, b: f64| {
            if a == b {
                a
            } else {
                scale.recover(w0 * scale.process(a) + w1 * scale.process(b))
            }
        };
        let lo = endpoint(l.lower_bound(), u.lower_bound());
        let hi = endpoint(l.upper_bound(), u.upper_bound());
        UnitBaseFrame {
            scale,
            bounds: (lo.min(hi), lo.max(hi)),
            start,
            length,
            inter_start: w0 * start[0] + w1 * start[1],
            inter_length: w0 * length[0] + w1 * length[1],
        }
    }

    fn bounds(&self) -> (f64, f64) {
        self.bounds
    }

    /// Unit-base coordinate of `secondary` at the intermediate primary value.
    fn eta(&self, secondary: f64) -> f64 {
        ((self.scale.process(secondary) - self.inter_start) / self.inter_length).clamp(0.0, 1.0)
    }

    /// Unit-base coordinate of `secondary` within bracketing distribution `i`.
    fn eta_in(&self, i: usize, secondary: f64) -> f64 {
        ((self.scale.process(secondary) - self.start[i]) / self.length[i]).clamp(0.0, 1.0)
    }

    fn secondary_in(&self, i: usize, dist: &TabularDistribution, eta: f64) -> f64 {
        self.scale
            .recover(self.start[i] + eta * self.length[i])
            .clamp(dist.lower_bound(), dist.upper_bound())
    }

    fn secondary(&self, eta: f64) -> f64 {
        let (lo, hi) = self.bounds();
        self.scale
            .recover(self.inter_start + eta * self.inter_length)
            .clamp(lo, hi)
    }

    /// Density of distribution `i` in unit-base space at `secondary`, per unit of its total.
    fn unit_density(&self, i: usize, dist: &TabularDistribution, secondary: f64) -> f64 {
        dist.evaluate_pdf(secondary) * self.length[i].abs()
            / (self.scale.jacobian(secondary) * dist.total())
    }

    fn mapped_grid(&self, bracket: &Bracket) -> Vec<f64> {
        let mut points = Vec::new();
        for (i, dist) in bracket.pair().iter().enumerate() {
            points.extend(dist.x_values().iter().map(|&x| self.secondary(self.eta_in(i, x))));
        }
        clip_sorted(points, self.bounds())
    }
}

/// Rescale both supports to a unit base before interpolating the density.
#[derive(Debug, Clone)]
pub struct UnitBaseStrategy {
    interp: TwoDInterpPolicy,
}

impl SecondaryInterpolationStrategy for UnitBaseStrategy {
    fn policy(&self) -> GridPolicy {
        GridPolicy::UnitBase
    }

    fn bounds(&self, bracket: &Bracket) -> (f64, f64) {
        UnitBaseFrame::new(self.interp.y, bracket).bounds()
    }

    /// Unit-base densities are combined on the `z` scale, so as with the
    /// direct policy this matches the derivative of `evaluate_cdf` only for a
    /// linear `z` scale.
    fn evaluate_pdf(&self, bracket: &Bracket, secondary: f64) -> Result<f64> {
        let frame = UnitBaseFrame::new(self.interp.y, bracket);
        let (lo, hi) = frame.bounds();
        if secondary < lo || secondary > hi {
            return Ok(0.0);
        }
        let eta = frame.eta(secondary);
        let mut density = [0.0; 2];
        for (i, dist) in bracket.pair().iter().enumerate() {
            let y_i = frame.secondary_in(i, dist, eta);
            density[i] = frame.unit_density(i, dist, y_i) * dist.total();
        }
        let unit = self
            .interp
            .interpolate_density(bracket.beta, density[0], density[1]);
        Ok(unit * self.interp.y.jacobian(secondary) / frame.inter_length.abs())
    }

    fn evaluate_cdf(&self, bracket: &Bracket, secondary: f64) -> Result<f64> {
        let frame = UnitBaseFrame::new(self.interp.y, bracket);
        let (lo, _) = frame.bounds();
        if secondary <= lo {
            return Ok(0.0);
        }
        let eta = frame.eta(secondary);
        let mut cdf = 0.0;
        for ((i, dist), weight) in bracket.pair().iter().enumerate().zip(bracket.weights()) {
            cdf += weight * dist.evaluate_cdf(frame.secondary_in(i, dist, eta));
        }
        Ok(cdf)
    }

    fn sample(&self, bracket: &Bracket, xi: f64) -> Result<f64> {
        let frame = UnitBaseFrame::new(self.interp.y, bracket);
        let (i, xi) = bracket.split_variate(xi);
        let y_i = bracket.pair()[i].sample_with_random_number(xi)?;
        Ok(frame.secondary(frame.eta_in(i, y_i)))
    }

    fn intermediate_grid(&self, bracket: &Bracket) -> Vec<f64> {
        UnitBaseFrame::new(self.interp.y, bracket).mapped_grid(bracket)
    }
}

/// Interpolate between points of equal CDF in the two distributions.
#[derive(Debug, Clone)]
pub struct CorrelatedStrategy {
    interp: TwoDInterpPolicy,
    tolerance: f64,
    max_iterations: usize,
}

impl CorrelatedStrategy {
    fn correlated_secondary(&self, bracket: &Bracket, xi: f64) -> Result<f64> {
        let y0 = bracket.lower.sample_with_random_number(xi)?;
        let y1 = bracket.upper.sample_with_random_number(xi)?;
        Ok(self.interp.interpolate_secondary(bracket.beta, y0, y1))
    }

    fn variate_at(&self, bracket: &Bracket, secondary: f64) -> Result<f64> {
        solve_correlated_variate(secondary, self.tolerance, self.max_iterations, |xi| {
            self.correlated_secondary(bracket, xi)
        })
    }
}

impl SecondaryInterpolationStrategy for CorrelatedStrategy {
    fn policy(&self) -> GridPolicy {
        GridPolicy::Correlated
    }

    fn bounds(&self, bracket: &Bracket) -> (f64, f64) {
        let beta = bracket.beta;
        let (l, u) = (bracket.lower, bracket.upper);
        let a = self
            .interp
            .interpolate_secondary(beta, l.lower_bound(), u.lower_bound());
        let b = self
            .interp
            .interpolate_secondary(beta, l.upper_bound(), u.upper_bound());
        (a.min(b), a.max(b))
    }

    fn evaluate_pdf(&self, bracket: &Bracket, secondary: f64) -> Result<f64> {
        let (lo, hi) = self.bounds(bracket);
        if secondary < lo || secondary > hi {
            return Ok(0.0);
        }
        let xi = self.variate_at(bracket, secondary)?;
        let scale = self.interp.y;
        let mut density = [0.0; 2];
        for (i, dist) in bracket.pair().iter().enumerate() {
            let y_i = dist.sample_with_random_number(xi)?;
            density[i] = dist.evaluate_pdf(y_i) / (scale.jacobian(y_i) * dist.total());
        }
        if density[0] <= 0.0 || density[1] <= 0.0 {
            return Ok(0.0);
        }
        let [w0, w1] = bracket.weights();
        let harmonic = density[0] * density[1] / (w0 * density[1] + w1 * density[0]);
        Ok(bracket.total() * scale.jacobian(secondary) * harmonic)
    }

    fn evaluate_cdf(&self, bracket: &Bracket, secondary: f64) -> Result<f64> {
        let (lo, hi) = self.bounds(bracket);
        if secondary <= lo {
            return Ok(0.0);
        }
        if secondary >= hi {
            return Ok(bracket.total());
        }
        Ok(self.variate_at(bracket, secondary)? * bracket.total())
    }

    fn sample(&self, bracket: &Bracket, xi: f64) -> Result<f64> {
        self.correlated_secondary(bracket, xi)
    }

    fn intermediate_grid(&self, bracket: &Bracket) -> Vec<f64> {
        let points = correlated_breakpoints(bracket, |xi| self.correlated_secondary(bracket, xi));
        clip_sorted(points, self.bounds(bracket))
    }
}

/// Unit-base rescaling combined with CDF correlation.
#[derive(Debug, Clone)]
pub struct UnitBaseCorrelatedStrategy {
    interp: TwoDInterpPolicy,
    tolerance: f64,
    max_iterations: usize,
}

impl UnitBaseCorrelatedStrategy {
    fn correlated_eta(&self, frame: &UnitBaseFrame, bracket: &Bracket, xi: f64) -> Result<f64> {
        let mut eta = 0.0;
        for ((i, dist), weight) in bracket.pair().iter().enumerate().zip(bracket.weights()) {
            eta += weight * frame.eta_in(i, dist.sample_with_random_number(xi)?);
        }
        Ok(eta)
    }

    fn variate_at(&self, frame: &UnitBaseFrame, bracket: &Bracket, secondary: f64) -> Result<f64> {
        let target = frame.eta(secondary);
        solve_correlated_variate(target, self.tolerance, self.max_iterations, |xi| {
            self.correlated_eta(frame, bracket, xi)
        })
    }
}

impl SecondaryInterpolationStrategy for UnitBaseCorrelatedStrategy {
    fn policy(&self) -> GridPolicy {
        GridPolicy::UnitBaseCorrelated
    }

    fn bounds(&self, bracket: &Bracket) -> (f64, f64) {
        UnitBaseFrame::new(self.interp.y, bracket).bounds()
    }

    fn evaluate_pdf(&self, bracket: &Bracket, secondary: f64) -> Result<f64> {
        let frame = UnitBaseFrame::new(self.interp.y, bracket);
        let (lo, hi) = frame.bounds();
        if secondary < lo || secondary > hi {
            return Ok(0.0);
        }
        let xi = self.variate_at(&frame, bracket, secondary)?;
        let mut density = [0.0; 2];
        for (i, dist) in bracket.pair().iter().enumerate() {
            let y_i = dist.sample_with_random_number(xi)?;
            density[i] = frame.unit_density(i, dist, y_i);
        }
        if density[0] <= 0.0 || density[1] <= 0.0 {
            return Ok(0.0);
        }
        let [w0, w1] = bracket.weights();
        let harmonic = density[0] * density[1] / (w0 * density[1] + w1 * density[0]);
        Ok(bracket.total() * self.interp.y.jacobian(secondary) * harmonic
            / frame.inter_length.abs())
    }

    fn evaluate_cdf(&self, bracket: &Bracket, secondary: f64) -> Result<f64> {
        let frame = UnitBaseFrame::new(self.interp.y, bracket);
        let (lo, hi) = frame.bounds();
        if secondary <= lo {
            return Ok(0.0);
        }
        if secondary >= hi {
            return Ok(bracket.total());
        }
        Ok(self.variate_at(&frame, bracket, secondary)? * bracket.total())
    }

    fn sample(&self, bracket: &Bracket, xi: f64) -> Result<f64> {
        let frame = UnitBaseFrame::new(self.interp.y, bracket);
        let eta = self.correlated_eta(&frame, bracket, xi)?;
        Ok(frame.secondary(eta))
    }

    fn intermediate_grid(&self, bracket: &Bracket) -> Vec<f64> {
        let frame = UnitBaseFrame::new(self.interp.y, bracket);
        let points = correlated_breakpoints(bracket, |xi| {
            Ok(frame.secondary(self.correlated_eta(&frame, bracket, xi)?))
        });
        clip_sorted(points, frame.bounds())
    }
}

/// Images of every tabulated point of either distribution under a
/// correlated map. The intermediate density has its kinks exactly here.
fn correlated_breakpoints<F>(bracket: &Bracket, image: F) -> Vec<f64>
where
    F: Fn(f64) -> Result<f64>,
{
    bracket
        .pair()
        .iter()
        .flat_map(|dist| {
            dist.x_values()
                .iter()
                .map(move |&x| (dist.evaluate_cdf(x) / dist.total()).clamp(0.0, 1.0))
        })
        .filter_map(|xi| image(xi).ok())
        .collect()
}

/// One conditional distribution as delivered by the data container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawConditional {
    /// Primary grid value (incoming energy).
    pub primary: f64,
    /// Secondary grid (angle cosine, outgoing energy, ...).
    pub secondary: Vec<f64>,
    /// Density at each secondary grid point.
    pub pdf: Vec<f64>,
    #[serde(default)]
    pub ratio_form: bool,
}

/// A full bivariate table as delivered by the data container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawBivariateData {
    /// Grid policy identifier, e.g. "Unit-base Correlated".
    pub grid_policy: String,
    /// Two-dimensional interpolation identifier, e.g. "LinLinLog".
    pub interpolation: String,
    /// Optional override for the interpolation inside each conditional table.
    #[serde(default)]
    pub secondary_interpolation: Option<String>,
    /// Conditional distributions ordered by primary value.
    pub distributions: Vec<RawConditional>,
}

/// Interpolation inside each conditional table implied by a 2-D policy.
pub fn conditional_interp_for(interp: TwoDInterpPolicy) -> OneDInterp {
    match (interp.z, interp.y) {
        (Scale::Log, Scale::Log) => OneDInterp::LogLog,
        (Scale::Log, _) => OneDInterp::LogLin,
        (_, Scale::Log) => OneDInterp::LinLog,
        _ => OneDInterp::LinLin,
    }
}

enum Located<'a> {
    Exact(&'a TabularDistribution),
    Between(Bracket<'a>),
}

/// Energy-dependent conditional distributions with a pluggable grid policy.
///
/// Immutable after construction and safe to share across threads.
#[derive(Debug)]
pub struct BivariateDistribution {
    searcher: HashBasedGridSearcher,
    distributions: Vec<TabularDistribution>,
    interp: TwoDInterpPolicy,
    strategy: Box<dyn SecondaryInterpolationStrategy>,
    config: EngineConfig,
}

impl BivariateDistribution {
    /// Create a bivariate distribution.
    ///
    /// # Arguments
    /// * `primary_grid` - Strictly increasing primary values
    /// * `distributions` - One conditional distribution per primary value
    /// * `policy` - Grid policy for primary values between grid points
    /// * `interp` - Processing of the density, secondary and primary axes
    /// * `config` - Evaluation tolerance, iteration cap and bucket count
    pub fn new(
        primary_grid: Vec<f64>,
        distributions: Vec<TabularDistribution>,
        policy: GridPolicy,
        interp: TwoDInterpPolicy,
        config: EngineConfig,
    ) -> Result<Self> {
        config.validate()?;
        if distributions.len() != primary_grid.len() {
            return Err(Error::invalid_parameter(
                "distributions",
                format!(
                    "expected one distribution per primary value ({}), got {}",
                    primary_grid.len(),
                    distributions.len()
                ),
            ));
        }
        for dist in &distributions {
            let accepted = dist.x_values().iter().all(|&y| interp.y.accepts(y));
            if !accepted {
                return Err(Error::invalid_parameter(
                    "distributions",
                    format!(
                        "secondary grid [{}, {}] cannot be processed on the {:?} scale",
                        dist.lower_bound(),
                        dist.upper_bound(),
                        interp.y
                    ),
                ));
            }
        }

        let buckets = config.buckets_for(primary_grid.len());
        let grid: Arc<[f64]> = primary_grid.into();
        let searcher = HashBasedGridSearcher::new(grid, buckets)?;
        let strategy = strategy_for(policy, interp, &config);

        debug!(
            points = distributions.len(),
            policy = %policy,
            interp = %interp,
            "built bivariate distribution"
        );

        Ok(BivariateDistribution {
            searcher,
            distributions,
            interp,
            strategy,
            config,
        })
    }

    /// Build from raw arrays and string policy identifiers.
    pub fn from_raw(raw: RawBivariateData, config: EngineConfig) -> Result<Self> {
        let policy: GridPolicy = raw.grid_policy.parse()?;
        let interp: TwoDInterpPolicy = raw.interpolation.parse()?;
        let conditional_interp = match raw.secondary_interpolation.as_deref() {
            Some(name) => name.parse()?,
            None => conditional_interp_for(interp),
        };

        let mut primary_grid = Vec::with_capacity(raw.distributions.len());
        let mut distributions = Vec::with_capacity(raw.distributions.len());
        for entry in raw.distributions {
            primary_grid.push(entry.primary);
            let dist = if entry.ratio_form {
                TabularDistribution::new_ratio_form(entry.secondary, entry.pdf, conditional_interp)?
            } else {
                TabularDistribution::new(entry.secondary, entry.pdf, conditional_interp)?
            };
            distributions.push(dist);
        }
        Self::new(primary_grid, distributions, policy, interp, config)
    }

    pub fn grid_policy(&self) -> GridPolicy {
        self.strategy.policy()
    }

    pub fn interp(&self) -> TwoDInterpPolicy {
        self.interp
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn primary_grid(&self) -> &[f64] {
        self.searcher.grid()
    }

    pub fn primary_bounds(&self) -> (f64, f64) {
        (self.searcher.lower_bound(), self.searcher.upper_bound())
    }

    pub fn is_primary_in_bounds(&self, primary: f64) -> bool {
        self.searcher.is_within_bounds(primary)
    }

    pub fn distribution(&self, index: usize) -> Option<&TabularDistribution> {
        self.distributions.get(index)
    }

    fn locate(&self, primary: f64) -> Result<Located<'_>> {
        if !self.searcher.is_within_bounds(primary) {
            let (min, max) = self.primary_bounds();
            return Err(Error::domain(format!(
                "primary value {primary:e} is outside of the table [{min:e}, {max:e}]"
            )));
        }
        let bin = self.searcher.find_lower_bin_index(primary)?;
        let grid = self.searcher.grid();
        if primary == grid[bin] {
            return Ok(Located::Exact(&self.distributions[bin]));
        }
        if primary == grid[bin + 1] {
            return Ok(Located::Exact(&self.distributions[bin + 1]));
        }
        Ok(Located::Between(Bracket {
            lower: &self.distributions[bin],
            upper: &self.distributions[bin + 1],
            beta: self.interp.primary_fraction(grid[bin], grid[bin + 1], primary),
        }))
    }

    fn check_secondary(&self, secondary: f64) -> Result<()> {
        let cosine = matches!(self.interp.y, Scale::LogCos | Scale::NudgedLogCos);
        if !secondary.is_finite() || (cosine && !(-1.0..=1.0).contains(&secondary)) {
            return Err(Error::domain(format!(
                "secondary value {secondary} is not a valid argument"
            )));
        }
        Ok(())
    }

    /// Support of the secondary variable at `primary`.
    pub fn secondary_bounds(&self, primary: f64) -> Result<(f64, f64)> {
        Ok(match self.locate(primary)? {
            Located::Exact(dist) => (dist.lower_bound(), dist.upper_bound()),
            Located::Between(bracket) => self.strategy.bounds(&bracket),
        })
    }

    /// Secondary breakpoints at `primary`, sorted and within the support.
    pub fn secondary_grid_at(&self, primary: f64) -> Result<Vec<f64>> {
        Ok(match self.locate(primary)? {
            Located::Exact(dist) => dist.x_values().to_vec(),
            Located::Between(bracket) => self.strategy.intermediate_grid(&bracket),
        })
    }

    pub fn evaluate_pdf(&self, primary: f64, secondary: f64) -> Result<f64> {
        self.check_secondary(secondary)?;
        match self.locate(primary)? {
            Located::Exact(dist) => Ok(dist.evaluate_pdf(secondary)),
            Located::Between(bracket) => self.strategy.evaluate_pdf(&bracket, secondary),
        }
    }

    pub fn evaluate_cdf(&self, primary: f64, secondary: f64) -> Result<f64> {
        self.check_secondary(secondary)?;
        match self.locate(primary)? {
            Located::Exact(dist) => Ok(dist.evaluate_cdf(secondary)),
            Located::Between(bracket) => self.strategy.evaluate_cdf(&bracket, secondary),
        }
    }

    /// Map one uniform variate in [0, 1] to a secondary value at `primary`.
    pub fn sample_with_random_number(&self, primary: f64, xi: f64) -> Result<f64> {
        if !(0.0..=1.0).contains(&xi) {
            return Err(Error::domain(format!("random number {xi} is outside [0, 1]")));
        }
        let sample = match self.locate(primary)? {
            Located::Exact(dist) => dist.sample_with_random_number(xi)?,
            Located::Between(bracket) => self.strategy.sample(&bracket, xi)?,
        };
        trace!(primary, xi, sample, "sampled secondary value");
        Ok(sample)
    }

    pub fn sample<R: Rng + ?Sized>(&self, primary: f64, rng: &mut R) -> Result<f64> {
        self.sample_with_random_number(primary, rng.gen::<f64>())
    }

    /// Sample and add the number of variates consumed to `trials`.
    ///
    /// `trials` is left untouched when the primary value is rejected.
    pub fn sample_and_record_trials<R: Rng + ?Sized>(
        &self,
        primary: f64,
        rng: &mut R,
        trials: &mut u64,
    ) -> Result<f64> {
        let sample = self.sample(primary, rng)?;
        *trials += 1;
        Ok(sample)
    }
}

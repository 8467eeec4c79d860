// Tabulated 1-D distribution over a secondary variable
//
// The CDF is the exact integral of the interpolated pdf, so sampling by
// inversion and evaluating the CDF always agree with each other.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::grid_searcher::validate_grid;
use crate::interpolation::{lower_bin, OneDInterp};

const INVERSION_TOLERANCE: f64 = 1e-14;
const INVERSION_MAX_STEPS: usize = 200;

/// Tabulated pdf with an exactly-integrated CDF.
///
/// Unless constructed in ratio form, the pdf is normalized so that the CDF
/// reaches exactly 1 at the upper bound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TabularDistribution {
    x: Vec<f64>,
    pdf: Vec<f64>,
    cdf: Vec<f64>,
    interp: OneDInterp,
    norm_constant: f64,
    ratio_form: bool,
}

impl TabularDistribution {
    /// Build a normalized distribution from `(x, pdf)` pairs.
    ///
    /// # Arguments
    /// * `x` - Strictly increasing secondary grid (at least 2 points)
    /// * `pdf` - Non-negative density values at each grid point
    /// * `interp` - Interpolation used inside each bin
    pub fn new(x: Vec<f64>, pdf: Vec<f64>, interp: OneDInterp) -> Result<Self> {
        Self::build(x, pdf, interp, false)
    }

    /// Build a distribution whose values are kept as given (not normalized).
    pub fn new_ratio_form(x: Vec<f64>, pdf: Vec<f64>, interp: OneDInterp) -> Result<Self> {
        Self::build(x, pdf, interp, true)
    }

    fn build(x: Vec<f64>, mut pdf: Vec<f64>, interp: OneDInterp, ratio_form: bool) -> Result<Self> {
        validate_grid(&x)?;
        if pdf.len() != x.len() {
            return Err(Error::invalid_parameter(
                "pdf",
                format!("expected {} values, got {}", x.len(), pdf.len()),
            ));
        }
        if let Some(bad) = pdf.iter().find(|p| !(p.is_finite() && **p >= 0.0)) {
            return Err(Error::invalid_parameter(
                "pdf",
                format!("values must be finite and non-negative, found {bad}"),
            ));
        }

        let mut cdf = Vec::with_capacity(x.len());
        cdf.push(0.0);
        for i in 0..x.len() - 1 {
            let area = bin_area(interp, x[i], x[i + 1], pdf[i], pdf[i + 1], x[i + 1]);
            cdf.push(cdf[i] + area);
        }

        let total = cdf[cdf.len() - 1];
        if !(total > 0.0 && total.is_finite()) {
            return Err(Error::invalid_parameter(
                "pdf",
                format!("distribution must have positive finite area, got {total}"),
            ));
        }

        if !ratio_form {
            pdf.iter_mut().for_each(|p| *p /= total);
            cdf.iter_mut().for_each(|c| *c /= total);
            let last = cdf.len() - 1;
            cdf[last] = 1.0;
        }

        Ok(TabularDistribution {
            x,
            pdf,
            cdf,
            interp,
            norm_constant: total,
            ratio_form,
        })
    }

    pub fn lower_bound(&self) -> f64 {
        self.x[0]
    }

    pub fn upper_bound(&self) -> f64 {
        self.x[self.x.len() - 1]
    }

    pub fn x_values(&self) -> &[f64] {
        &self.x
    }

    pub fn pdf_values(&self) -> &[f64] {
        &self.pdf
    }

    pub fn interp(&self) -> OneDInterp {
        self.interp
    }

    /// Area under the raw input pdf before normalization.
    pub fn norm_constant(&self) -> f64 {
        self.norm_constant
    }

    pub fn is_normalized(&self) -> bool {
        !self.ratio_form
    }

    /// Total CDF value at the upper bound (1 unless in ratio form).
    pub fn total(&self) -> f64 {
        self.cdf[self.cdf.len() - 1]
    }

    /// Density at `x`; zero outside the tabulated support.
    pub fn evaluate_pdf(&self, x: f64) -> f64 {
        if x < self.lower_bound() || x > self.upper_bound() {
            return 0.0;
        }
        let i = lower_bin(&self.x, x);
        self.interp
            .interpolate(self.x[i], self.x[i + 1], self.pdf[i], self.pdf[i + 1], x)
    }

    /// Cumulative probability at `x`; 0 below and the total above the support.
    pub fn evaluate_cdf(&self, x: f64) -> f64 {
        if x <= self.lower_bound() {
            return 0.0;
        }
        if x >= self.upper_bound() {
            return self.total();
        }
        let i = lower_bin(&self.x, x);
        let partial = bin_area(
            self.interp,
            self.x[i],
            self.x[i + 1],
            self.pdf[i],
            self.pdf[i + 1],
            x,
        );
        (self.cdf[i] + partial).min(self.cdf[i + 1])
    }

    /// Invert the CDF at fraction `xi` of the total area.
    pub fn sample_with_random_number(&self, xi: f64) -> Result<f64> {
        check_random_number(xi)?;
        Ok(self.invert(xi * self.total()))
    }

    /// Sample restricted to `[lower_bound, max_x]`.
    pub fn sample_in_subrange_with_random_number(&self, xi: f64, max_x: f64) -> Result<f64> {
        check_random_number(xi)?;
        if max_x <= self.lower_bound() {
            return Err(Error::domain(format!(
                "subrange upper bound {max_x} is not above the lower bound {}",
                self.lower_bound()
            )));
        }
        Ok(self.invert(xi * self.evaluate_cdf(max_x)))
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        self.invert(rng.gen::<f64>() * self.total())
    }

    pub fn sample_in_subrange<R: Rng + ?Sized>(&self, rng: &mut R, max_x: f64) -> Result<f64> {
        self.sample_in_subrange_with_random_number(rng.gen::<f64>(), max_x)
    }

    /// Find the secondary value whose CDF equals `target`.
    fn invert(&self, target: f64) -> f64 {
        if target <= 0.0 {
            return self.lower_bound();
        }
        if target >= self.total() {
            return self.upper_bound();
        }
        let i = lower_bin(&self.cdf, target);
        let area = target - self.cdf[i];
        let x = invert_bin(
            self.interp,
            self.x[i],
            self.x[i + 1],
            self.pdf[i],
            self.pdf[i + 1],
            area,
        );
        x.clamp(self.x[i], self.x[i + 1])
    }
}

fn check_random_number(xi: f64) -> Result<()> {
    if (0.0..=1.0).contains(&xi) {
        Ok(())
    } else {
        Err(Error::domain(format!("random number {xi} is outside [0, 1]")))
    }
}

/// Exact integral of the interpolated pdf from `x0` to `x` inside one bin.
fn bin_area(interp: OneDInterp, x0: f64, x1: f64, p0: f64, p1: f64, x: f64) -> f64 {
    let d = x - x0;
    if d <= 0.0 {
        return 0.0;
    }
    match interp.effective(x0, x1, p0, p1) {
        OneDInterp::LinLin => {
            let slope = (p1 - p0) / (x1 - x0);
            d * (p0 + 0.5 * slope * d)
        }
        OneDInterp::LinLog => {
            let s = (p1 - p0) / (x1 / x0).ln();
            let r = (x / x0).ln();
            p0 * d + s * (x * r - d)
        }
        OneDInterp::LogLin => {
            let k = (p1 / p0).ln() / (x1 - x0);
            if (k * d).abs() < 1e-12 {
                p0 * d
            } else {
                p0 * (k * d).exp_m1() / k
            }
        }
        OneDInterp::LogLog => {
            let b1 = (p1 / p0).ln() / (x1 / x0).ln() + 1.0;
            let r = (x / x0).ln();
            if (b1 * r).abs() < 1e-12 {
                p0 * x0 * r
            } else {
                p0 * x0 * (b1 * r).exp_m1() / b1
            }
        }
    }
}

/// Solve `bin_area(.., x) == area` for `x` inside one bin.
fn invert_bin(interp: OneDInterp, x0: f64, x1: f64, p0: f64, p1: f64, area: f64) -> f64 {
    if area <= 0.0 {
        return x0;
    }
    match interp.effective(x0, x1, p0, p1) {
        OneDInterp::LinLin => {
            let slope = (p1 - p0) / (x1 - x0);
            let disc = (p0 * p0 + 2.0 * slope * area).max(0.0);
            x0 + 2.0 * area / (p0 + disc.sqrt())
        }
        OneDInterp::LogLin => {
            let k = (p1 / p0).ln() / (x1 - x0);
            let u = (k * area / p0).max(-1.0 + f64::EPSILON);
            if u.abs() < 1e-12 {
                x0 + area / p0
            } else {
                x0 + u.ln_1p() / k
            }
        }
        OneDInterp::LogLog => {
            let b1 = (p1 / p0).ln() / (x1 / x0).ln() + 1.0;
            let u = (b1 * area / (p0 * x0)).max(-1.0 + f64::EPSILON);
            if u.abs() < 1e-12 {
                x0 * (area / (p0 * x0)).exp()
            } else {
                x0 * (u.ln_1p() / b1).exp()
            }
        }
        OneDInterp::LinLog => {
            // No closed form: safeguarded Newton iteration on the bracket
            let (mut lo, mut hi) = (x0, x1);
            let mut x = 0.5 * (lo + hi);
            for _ in 0..INVERSION_MAX_STEPS {
                let f = bin_area(OneDInterp::LinLog, x0, x1, p0, p1, x) - area;
                if f > 0.0 {
                    hi = x;
                } else {
                    lo = x;
                }
                let p = OneDInterp::LinLog.interpolate(x0, x1, p0, p1, x);
                let newton = if p > 0.0 { x - f / p } else { f64::NAN };
                x = if newton > lo && newton < hi {
                    newton
                } else {
                    0.5 * (lo + hi)
                };
                if (hi - lo) <= INVERSION_TOLERANCE * x.abs().max(f64::MIN_POSITIVE)
                    || f.abs() <= INVERSION_TOLERANCE * area
                {
                    break;
                }
            }
            x
        }
    }
}

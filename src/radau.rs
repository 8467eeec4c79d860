// Gauss-Radau quadrature from Legendre moments
//
// Works in x = 1 - mu on [0, 2] with the node x = 0 (mu = 1) fixed. The free
// nodes are the zeros of the polynomials orthogonal to the measure x f(x),
// built from the moments with the modified Chebyshev algorithm.

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::legendre::ShiftedLegendreCoefficients;

/// Discrete cosines and weights reproducing a set of Legendre moments.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscreteAngles {
    /// Ascending cosines, the last one is always 1.
    pub cosines: Vec<f64>,
    /// Weights normalized to sum to 1.
    pub weights: Vec<f64>,
}

/// Radau quadrature for an angular distribution given by its Legendre moments.
#[derive(Debug, Clone)]
pub struct RadauQuadrature {
    zeroth_moment: f64,
    /// `T_k = int (1 - mu)^k f(mu) dmu`
    power_moments: Vec<f64>,
}

impl RadauQuadrature {
    /// # Arguments
    /// * `legendre_moments` - `int P_l(mu) f(mu) dmu` for `l = 0..=L`
    pub fn new(legendre_moments: &[f64]) -> Result<Self> {
        let zeroth_moment = match legendre_moments.first() {
            Some(&m0) if m0 > 0.0 && m0.is_finite() => m0,
            Some(&m0) => {
                return Err(Error::invalid_parameter(
                    "legendre_moments",
                    format!("0th moment must be positive and finite, got {m0}"),
                ))
            }
            None => {
                return Err(Error::invalid_parameter(
                    "legendre_moments",
                    "at least the 0th moment is needed",
                ))
            }
        };
        if let Some(bad) = legendre_moments.iter().find(|m| !m.is_finite()) {
            return Err(Error::invalid_parameter(
                "legendre_moments",
                format!("moments must be finite, got {bad}"),
            ));
        }

        // P_n(1 - x) = sum_k c_{n,k} x^k, solved for T_n by forward substitution
        let max_order = legendre_moments.len() - 1;
        let coefficients = ShiftedLegendreCoefficients::new(max_order);
        let mut power_moments: Vec<f64> = Vec::with_capacity(max_order + 1);
        for (n, &moment) in legendre_moments.iter().enumerate() {
            let row = coefficients.coefficients(n).ok_or_else(|| {
                Error::invalid_parameter("legendre_moments", format!("no coefficients for order {n}"))
            })?;
            let known: f64 = row.iter().zip(&power_moments).map(|(c, t)| c * t).sum();
            power_moments.push((moment - known) / row[n]);
        }

        Ok(RadauQuadrature {
            zeroth_moment,
            power_moments,
        })
    }

    pub fn power_moments(&self) -> &[f64] {
        &self.power_moments
    }

    /// Largest number of angles the moments can support.
    pub fn max_angles(&self) -> usize {
        (self.power_moments.len() - 1) / 2 + 1
    }

    /// Nodes and weights for `number_of_angles` discrete angles.
    ///
    /// Fewer angles are returned when the moments cannot support the request.
    pub fn nodes_and_weights(&self, number_of_angles: usize) -> Result<DiscreteAngles> {
        if number_of_angles == 0 {
            return Err(Error::invalid_parameter(
                "number_of_angles",
                "must be at least 1",
            ));
        }
        let requested_free = number_of_angles - 1;
        let free = requested_free.min(self.max_angles() - 1);
        let (alpha, beta, norms) = self.recurrence_coefficients(free);
        if alpha.len() < requested_free {
            warn!(
                requested = number_of_angles,
                available = alpha.len() + 1,
                "moments only support a reduced number of discrete angles"
            );
        }

        let roots = polynomial_roots(&alpha, &beta);
        let mut cosines = Vec::with_capacity(roots.len() + 1);
        let mut weights = Vec::with_capacity(roots.len() + 1);
        // Descending x is ascending mu
        for &x in roots.iter().rev() {
            let christoffel: f64 = (0..alpha.len())
                .map(|k| orthogonal_polynomial(&alpha, &beta, k, x).powi(2) / norms[k])
                .sum();
            cosines.push(1.0 - x);
            weights.push(1.0 / (christoffel * x));
        }
        let free_weight: f64 = weights.iter().sum();
        cosines.push(1.0);
        weights.push(self.zeroth_moment - free_weight);

        for weight in weights.iter_mut() {
            *weight /= self.zeroth_moment;
        }
        if weights.iter().any(|&w| w < 0.0) {
            warn!(?weights, "discrete angle weights are not all positive");
        }
        debug!(angles = cosines.len(), "built radau discrete angles");
        Ok(DiscreteAngles { cosines, weights })
    }

    // Modified Chebyshev algorithm on nu_k = T_{k+1}; stops early when the
    // moments stop describing a positive measure.
    fn recurrence_coefficients(&self, n: usize) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
        let (mut alpha, mut beta, mut norms) = (Vec::new(), Vec::new(), Vec::new());
        let nu = &self.power_moments[1..];
        if n == 0 || !(nu[0] > 0.0) {
            return (alpha, beta, norms);
        }
        let width = 2 * n;
        let mut sigma_prev = vec![0.0; width];
        let mut sigma = nu[..width].to_vec();
        alpha.push(sigma[1] / sigma[0]);
        beta.push(sigma[0]);
        norms.push(sigma[0]);

        for k in 1..n {
            let mut next = vec![0.0; width];
            for l in k..width - k {
                next[l] = sigma[l + 1] - alpha[k - 1] * sigma[l] - beta[k - 1] * sigma_prev[l];
            }
            if !(next[k] > 0.0) {
                break;
            }
            alpha.push(next[k + 1] / next[k] - sigma[k] / sigma[k - 1]);
            beta.push(next[k] / sigma[k - 1]);
            norms.push(next[k]);
            sigma_prev = std::mem::replace(&mut sigma, next);
        }
        (alpha, beta, norms)
    }
}

/// Monic orthogonal polynomial `pi_k(x)` from its recurrence coefficients.
fn orthogonal_polynomial(alpha: &[f64], beta: &[f64], k: usize, x: f64) -> f64 {
    if k == 0 {
        return 1.0;
    }
    let (mut previous, mut current) = (1.0, x - alpha[0]);
    for j in 1..k {
        let next = (x - alpha[j]) * current - beta[j] * previous;
        previous = current;
        current = next;
    }
    current
}

// Zeros of pi_n on [0, 2], ascending. The zeros of pi_k interlace those of
// pi_{k-1}, so each one is bracketed and found by bisection.
fn polynomial_roots(alpha: &[f64], beta: &[f64]) -> Vec<f64> {
    let n = alpha.len();
    if n == 0 {
        return Vec::new();
    }
    let mut roots = vec![alpha[0]];
    for k in 2..=n {
        let mut bounds = Vec::with_capacity(k + 1);
        bounds.push(0.0);
        bounds.extend_from_slice(&roots);
        bounds.push(2.0);
        roots = bounds
            .windows(2)
            .map(|w| {
                let (mut lo, mut hi) = (w[0], w[1]);
                let mut value_lo = orthogonal_polynomial(alpha, beta, k, lo);
                loop {
                    let mid = 0.5 * (lo + hi);
                    if mid <= lo || mid >= hi {
                        return mid;
                    }
                    let value = orthogonal_polynomial(alpha, beta, k, mid);
                    if value == 0.0 {
                        return mid;
                    }
                    if (value > 0.0) == (value_lo > 0.0) {
                        lo = mid;
                        value_lo = value;
                    } else {
                        hi = mid;
                    }
                }
            })
            .collect();
    }
    roots
}

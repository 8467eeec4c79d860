// Elastic scattering constants and the screened Rutherford peak
use rand::Rng;
use tracing::trace;

use crate::error::{Error, Result};

/// Cosine where the tabulated cutoff distribution hands over to the
/// analytic screened Rutherford peak.
pub const MU_PEAK: f64 = 0.999999;

/// Width of the screened Rutherford region, `1 - MU_PEAK`.
pub const DELTA_MU_PEAK: f64 = 1.0e-6;

pub const FINE_STRUCTURE_CONSTANT: f64 = 7.2973525693e-3;

/// Electron rest mass energy in MeV.
pub const ELECTRON_REST_MASS_ENERGY: f64 = 0.51099895;

const HIGHEST_ATOMIC_NUMBER: u32 = 118;

/// Per-element quantities needed by the screened Rutherford model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ElasticTraits {
    atomic_number: u32,
    z_two_thirds: f64,
    z_alpha_squared: f64,
}

impl ElasticTraits {
    pub fn new(atomic_number: u32) -> Result<Self> {
        if atomic_number == 0 || atomic_number > HIGHEST_ATOMIC_NUMBER {
            return Err(Error::invalid_parameter(
                "atomic_number",
                format!("must lie in [1, {HIGHEST_ATOMIC_NUMBER}], got {atomic_number}"),
            ));
        }
        let z = atomic_number as f64;
        Ok(ElasticTraits {
            atomic_number,
            z_two_thirds: z.powf(2.0 / 3.0),
            z_alpha_squared: (FINE_STRUCTURE_CONSTANT * z).powi(2),
        })
    }

    pub fn atomic_number(&self) -> u32 {
        self.atomic_number
    }

    /// Moliere screening parameter at `energy` (MeV).
    ///
    /// This is the constant that appears as `eta + 1 - mu` in the screened
    /// Rutherford density, i.e. twice the classic Moliere parameter.
    pub fn moliere_screening_constant(&self, energy: f64) -> Result<f64> {
        if !(energy > 0.0 && energy.is_finite()) {
            return Err(Error::domain(format!(
                "energy must be positive and finite, got {energy}"
            )));
        }
        let tau = energy / ELECTRON_REST_MASS_ENERGY;
        let momentum_squared = tau * (tau + 2.0);
        let beta_squared = momentum_squared / (1.0 + momentum_squared);

        let screening_factor = 0.5 * (FINE_STRUCTURE_CONSTANT / 0.885).powi(2);
        let correction = 1.13 + 3.76 * self.z_alpha_squared / beta_squared;
        Ok(screening_factor * self.z_two_thirds / momentum_squared * correction)
    }

    /// The screened Rutherford peak at `energy`.
    pub fn screened_rutherford(&self, energy: f64) -> Result<ScreenedRutherfordDistribution> {
        ScreenedRutherfordDistribution::new(self.moliere_screening_constant(energy)?)
    }
}

/// Normalized screened Rutherford density on `[MU_PEAK, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenedRutherfordDistribution {
    eta: f64,
}

impl ScreenedRutherfordDistribution {
    pub fn new(eta: f64) -> Result<Self> {
        if !(eta > 0.0 && eta.is_finite()) {
            return Err(Error::invalid_parameter(
                "eta",
                format!("screening constant must be positive and finite, got {eta}"),
            ));
        }
        Ok(ScreenedRutherfordDistribution { eta })
    }

    pub fn eta(&self) -> f64 {
        self.eta
    }

    fn check_cosine(mu: f64) -> Result<()> {
        if !(-1.0..=1.0).contains(&mu) {
            return Err(Error::domain(format!(
                "scattering angle cosine {mu} is outside [-1, 1]"
            )));
        }
        Ok(())
    }

    /// Density at `mu`; zero below `MU_PEAK`.
    pub fn evaluate_pdf(&self, mu: f64) -> Result<f64> {
        Self::check_cosine(mu)?;
        if mu < MU_PEAK {
            return Ok(0.0);
        }
        let eta = self.eta;
        let denominator = eta + 1.0 - mu;
        Ok(eta * (eta + DELTA_MU_PEAK) / (DELTA_MU_PEAK * denominator * denominator))
    }

    pub fn evaluate_cdf(&self, mu: f64) -> Result<f64> {
        Self::check_cosine(mu)?;
        if mu <= MU_PEAK {
            return Ok(0.0);
        }
        let eta = self.eta;
        let cdf = eta * (mu - MU_PEAK) / (DELTA_MU_PEAK * (eta + 1.0 - mu));
        Ok(cdf.min(1.0))
    }

    pub fn sample_with_random_number(&self, xi: f64) -> Result<f64> {
        if !(0.0..=1.0).contains(&xi) {
            return Err(Error::domain(format!("random number {xi} is outside [0, 1]")));
        }
        let eta = self.eta;
        let scaled = DELTA_MU_PEAK * xi;
        let mu = (eta * (MU_PEAK + scaled) + scaled) / (eta + scaled);
        trace!(eta, xi, mu, "sampled screened rutherford cosine");
        Ok(mu.clamp(MU_PEAK, 1.0))
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<f64> {
        self.sample_with_random_number(rng.gen::<f64>())
    }
}

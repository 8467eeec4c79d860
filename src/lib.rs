// Import the modules and re-export the types for Rust usage
mod bivariate;
mod config;
mod coupled_elastic;
mod elastic_moments;
mod elastic_traits;
mod error;
mod fast_rng;
mod grid_searcher;
mod interpolation;
mod legendre;
mod quadrature;
mod radau;
mod tabular;
mod threshold_reaction;

pub use bivariate::{
    conditional_interp_for, strategy_for, BivariateDistribution, Bracket, CorrelatedStrategy,
    DirectStrategy, GridPolicy, RawBivariateData, RawConditional, SecondaryInterpolationStrategy,
    UnitBaseCorrelatedStrategy, UnitBaseStrategy,
};
pub use config::{EngineConfig, CONFIG};
pub use coupled_elastic::CoupledElasticDistribution;
pub use elastic_moments::{
    ElasticMomentsEvaluator, MomentContributions, MomentPreservingAngles, QuadratureStrategy,
    RecursionStrategy, RutherfordMomentStrategy,
};
pub use elastic_traits::{
    ElasticTraits, ScreenedRutherfordDistribution, DELTA_MU_PEAK, ELECTRON_REST_MASS_ENERGY,
    FINE_STRUCTURE_CONSTANT, MU_PEAK,
};
pub use error::{Error, Result};
pub use fast_rng::{FastRng, HISTORY_STRIDE};
pub use grid_searcher::{validate_grid, HashBasedGridSearcher};
pub use interpolation::{
    interpolate_linear, interpolate_log_log, OneDInterp, Scale, TwoDInterpPolicy, COSINE_NUDGE,
};
pub use legendre::{legendre_all, legendre_p, ShiftedLegendreCoefficients};
pub use quadrature::GaussKronrodIntegrator;
pub use radau::{DiscreteAngles, RadauQuadrature};
pub use tabular::TabularDistribution;
pub use threshold_reaction::{RawThresholdCrossSection, ThresholdCrossSection};

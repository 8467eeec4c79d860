// Integration tests for Legendre moments of the elastic angular distribution

use std::sync::Arc;

use approx::assert_relative_eq;
use epxs::{
    conditional_interp_for, legendre_p, BivariateDistribution, ElasticMomentsEvaluator,
    ElasticTraits, EngineConfig, Error, GridPolicy, HashBasedGridSearcher, OneDInterp,
    QuadratureStrategy, RecursionStrategy, RutherfordMomentStrategy, TabularDistribution,
    ThresholdCrossSection, TwoDInterpPolicy, MU_PEAK,
};

const POLICIES: [GridPolicy; 4] = [
    GridPolicy::Direct,
    GridPolicy::UnitBase,
    GridPolicy::Correlated,
    GridPolicy::UnitBaseCorrelated,
];
const ENERGY_GRID: [f64; 4] = [1e-5, 1e-3, 1.0, 1e5];
const SCREENED_RUTHERFORD_THRESHOLD: usize = 2;
const PRECISION: f64 = 1e-8;

fn cutoff_distribution(policy: GridPolicy) -> Arc<BivariateDistribution> {
    cutoff_distribution_with(
        policy,
        TwoDInterpPolicy::LIN_LIN_LOG,
        EngineConfig::default().with_tolerance(1e-13),
    )
}

fn cutoff_distribution_with(
    policy: GridPolicy,
    interp: TwoDInterpPolicy,
    config: EngineConfig,
) -> Arc<BivariateDistribution> {
    let tables = [
        (vec![-1.0, 0.0, MU_PEAK], vec![0.4, 0.5, 0.6]),
        (vec![-1.0, 0.5, 0.9, MU_PEAK], vec![0.1, 0.3, 1.0, 2.0]),
        (vec![-1.0, 0.0, 0.99, MU_PEAK], vec![0.01, 0.05, 5.0, 20.0]),
        (vec![-1.0, 0.9, 0.999, MU_PEAK], vec![1e-4, 0.1, 10.0, 100.0]),
    ];
    let distributions = tables
        .into_iter()
        .map(|(mu, pdf)| {
            TabularDistribution::new(mu, pdf, conditional_interp_for(interp)).unwrap()
        })
        .collect();
    Arc::new(
        BivariateDistribution::new(ENERGY_GRID.to_vec(), distributions, policy, interp, config)
            .unwrap(),
    )
}

fn cross_sections() -> (ThresholdCrossSection, ThresholdCrossSection) {
    let searcher = Arc::new(HashBasedGridSearcher::new(ENERGY_GRID.to_vec().into(), 1).unwrap());
    let cutoff = ThresholdCrossSection::new(
        searcher.clone(),
        0,
        vec![1e9, 5e8, 1e6, 1e3],
        OneDInterp::LogLog,
    )
    .unwrap();
    let total =
        ThresholdCrossSection::new(searcher, 0, vec![1e9, 5e8, 2e6, 5e3], OneDInterp::LogLog)
            .unwrap();
    (cutoff, total)
}

fn evaluator(policy: GridPolicy, cutoff_angle_cosine: f64) -> ElasticMomentsEvaluator {
    evaluator_for(cutoff_distribution(policy), cutoff_angle_cosine)
}

fn evaluator_for(
    distribution: Arc<BivariateDistribution>,
    cutoff_angle_cosine: f64,
) -> ElasticMomentsEvaluator {
    let (cutoff, total) = cross_sections();
    let config = EngineConfig::default().with_cutoff_angle_cosine(cutoff_angle_cosine);
    ElasticMomentsEvaluator::new(
        ElasticTraits::new(79).unwrap(),
        distribution,
        cutoff,
        total,
        SCREENED_RUTHERFORD_THRESHOLD,
        &config,
    )
    .unwrap()
}

#[test]
fn test_zeroth_moment_is_one_for_every_policy() {
    for policy in POLICIES {
        let evaluator = evaluator(policy, -1.0);
        for &energy in &[1e-5, 1e-4, 0.5, 1.0, 10.0, 1e5] {
            let moments = evaluator.evaluate_elastic_moment(energy, 4, PRECISION).unwrap();
            assert_eq!(moments.len(), 5);
            assert_relative_eq!(moments[0], 1.0, max_relative = 1e-12);
            for moment in &moments[1..] {
                assert!(moment.abs() <= 1.0 + 1e-12, "{policy}: {moment} at {energy}");
            }
        }
    }
}

#[test]
fn test_cutoff_moment_matches_tabulated_distribution() {
    // At a tabulated energy the first moment of a lin-lin table has a closed form.
    let evaluator = evaluator(GridPolicy::UnitBaseCorrelated, -1.0);
    let table = cutoff_distribution(GridPolicy::Direct);
    let dist = table.distribution(1).unwrap();
    let (mu, pdf) = (dist.x_values(), dist.pdf_values());

    let mut mass = 0.0;
    let mut first = 0.0;
    for i in 0..mu.len() - 1 {
        let h = mu[i + 1] - mu[i];
        mass += 0.5 * h * (pdf[i] + pdf[i + 1]);
        first += h * (mu[i] * (2.0 * pdf[i] + pdf[i + 1]) + mu[i + 1] * (pdf[i] + 2.0 * pdf[i + 1]))
            / 6.0;
    }

    let moments = evaluator.evaluate_elastic_moment(1e-3, 1, PRECISION).unwrap();
    assert_relative_eq!(moments[1], first / mass, max_relative = 1e-7);
}

#[test]
fn test_policies_agree_at_tabulated_energy() {
    let reference = evaluator(GridPolicy::Direct, -1.0)
        .evaluate_elastic_moment(1.0, 3, PRECISION)
        .unwrap();
    for policy in POLICIES {
        let moments = evaluator(policy, -1.0)
            .evaluate_elastic_moment(1.0, 3, PRECISION)
            .unwrap();
        for (m, r) in moments.iter().zip(&reference) {
            assert_relative_eq!(m, r, max_relative = 1e-7);
        }
    }
}

#[test]
fn test_rutherford_vanishes_below_threshold() {
    let evaluator = evaluator(GridPolicy::Correlated, -1.0);
    let (cutoff, _) = cross_sections();
    for &energy in &[1e-5, 1e-4, 0.5] {
        let contributions = evaluator
            .evaluate_moment_contributions(energy, 3, PRECISION)
            .unwrap();
        assert!(contributions.rutherford_moments.iter().all(|&m| m == 0.0));
        assert_eq!(contributions.rutherford_cross_section, 0.0);
        assert_relative_eq!(
            contributions.cutoff_moments[0],
            cutoff.cross_section(energy).unwrap(),
            max_relative = 1e-7
        );
    }
}

#[test]
fn test_no_cutoff_region_reports_total_cross_section() {
    let full_range = evaluator(GridPolicy::UnitBaseCorrelated, -1.0);
    let evaluator = evaluator(GridPolicy::UnitBaseCorrelated, 1.0);
    let (_, total) = cross_sections();
    for &energy in &[1e-5, 1e-4, 0.5] {
        let contributions = evaluator
            .evaluate_moment_contributions(energy, 2, PRECISION)
            .unwrap();
        assert_eq!(contributions.rutherford_cross_section, 0.0);
        assert!(contributions.rutherford_moments.iter().all(|&m| m == 0.0));
        assert_relative_eq!(
            contributions.cutoff_moments[0],
            total.cross_section(energy).unwrap(),
            max_relative = 1e-7
        );

        let moments = evaluator.evaluate_elastic_moment(energy, 2, PRECISION).unwrap();
        let expected = full_range.evaluate_elastic_moment(energy, 2, PRECISION).unwrap();
        assert_relative_eq!(moments[0], 1.0, max_relative = 1e-12);
        for (m, e) in moments.iter().zip(&expected) {
            assert_relative_eq!(m, e, max_relative = 1e-12);
        }
    }
}

#[test]
fn test_default_config_keeps_whole_cutoff_range() {
    let (cutoff, total) = cross_sections();
    let evaluator = ElasticMomentsEvaluator::new(
        ElasticTraits::new(79).unwrap(),
        cutoff_distribution(GridPolicy::Correlated),
        cutoff,
        total,
        SCREENED_RUTHERFORD_THRESHOLD,
        &EngineConfig::default(),
    )
    .unwrap();
    assert_eq!(evaluator.cutoff_angle_cosine(), -1.0);
    let moments = evaluator.evaluate_elastic_moment(1e-4, 2, PRECISION).unwrap();
    assert_relative_eq!(moments[0], 1.0, max_relative = 1e-12);
}

#[test]
fn test_correlated_policies_at_default_tolerance() {
    let (cutoff, _) = cross_sections();
    for policy in [GridPolicy::Correlated, GridPolicy::UnitBaseCorrelated] {
        let distribution =
            cutoff_distribution_with(policy, TwoDInterpPolicy::LIN_LIN_LOG, EngineConfig::default());
        let evaluator = evaluator_for(distribution, -1.0);
        for &energy in &[1e-4, 0.5, 10.0] {
            let contributions = evaluator
                .evaluate_moment_contributions(energy, 4, 1e-10)
                .unwrap();
            let moments = contributions.normalized().unwrap();
            assert_relative_eq!(moments[0], 1.0, max_relative = 1e-12);
            if energy < ENERGY_GRID[SCREENED_RUTHERFORD_THRESHOLD] {
                assert_relative_eq!(
                    contributions.cutoff_moments[0],
                    cutoff.cross_section(energy).unwrap(),
                    max_relative = 1e-8
                );
            }
        }
    }
}

#[test]
fn test_cosine_interpolation_policies() {
    let (cutoff, _) = cross_sections();
    for name in ["LinLogCosLog", "LogLogCosLog", "LinNudgedLogCosLog"] {
        let interp: TwoDInterpPolicy = name.parse().unwrap();
        for policy in POLICIES {
            let distribution = cutoff_distribution_with(policy, interp, EngineConfig::default());
            let evaluator = evaluator_for(distribution, -1.0);
            for &energy in &[1e-4, 0.5, 10.0] {
                let contributions = evaluator
                    .evaluate_moment_contributions(energy, 4, PRECISION)
                    .unwrap();
                let moments = contributions.normalized().unwrap();
                assert_relative_eq!(moments[0], 1.0, max_relative = 1e-12);
                for moment in &moments[1..] {
                    assert!(moment.abs() <= 1.0 + 1e-12, "{name} {policy}: {moment} at {energy}");
                }

                let correlated =
                    matches!(policy, GridPolicy::Correlated | GridPolicy::UnitBaseCorrelated);
                if correlated && energy < ENERGY_GRID[SCREENED_RUTHERFORD_THRESHOLD] {
                    assert_relative_eq!(
                        contributions.cutoff_moments[0],
                        cutoff.cross_section(energy).unwrap(),
                        max_relative = 1e-6
                    );
                }
            }
        }
    }
}

#[test]
fn test_pure_screened_rutherford_above_threshold() {
    let evaluator = evaluator(GridPolicy::UnitBase, 1.0);
    let traits = ElasticTraits::new(79).unwrap();
    for &energy in &[1.0, 10.0, 1e4] {
        let eta = traits.moliere_screening_constant(energy).unwrap();
        let expected = RecursionStrategy.moments(eta, 4).unwrap();
        let moments = evaluator.evaluate_elastic_moment(energy, 4, PRECISION).unwrap();
        for (m, e) in moments.iter().zip(&expected) {
            assert_relative_eq!(m, e, max_relative = 1e-14);
        }
        assert_relative_eq!(
            evaluator.evaluate_screened_rutherford_pdf_moment(eta, 2).unwrap(),
            expected[2],
            max_relative = 1e-15
        );
    }
}

#[test]
fn test_quadrature_strategy_can_replace_recursion() {
    let quadrature = QuadratureStrategy::new(1e-12).unwrap();
    let recursion_moments = evaluator(GridPolicy::Correlated, -1.0)
        .evaluate_elastic_moment(1.0, 3, PRECISION)
        .unwrap();
    let quadrature_moments = evaluator(GridPolicy::Correlated, -1.0)
        .with_rutherford_strategy(Box::new(quadrature))
        .evaluate_elastic_moment(1.0, 3, PRECISION)
        .unwrap();
    for (r, q) in recursion_moments.iter().zip(&quadrature_moments) {
        assert_relative_eq!(r, q, max_relative = 1e-9);
    }
}

#[test]
fn test_cutoff_pdf_moment_on_explicit_grid() {
    let evaluator = evaluator(GridPolicy::Direct, -1.0);
    let grid = [-1.0, 0.0, MU_PEAK];
    let mass = evaluator
        .evaluate_cutoff_pdf_moment(&grid, 1e-5, 0, PRECISION)
        .unwrap();
    assert_relative_eq!(mass, 1.0, max_relative = 1e-10);

    assert!(matches!(
        evaluator.evaluate_cutoff_pdf_moment(&[0.5, 0.1], 1e-5, 0, PRECISION),
        Err(Error::InvalidGrid { .. })
    ));
}

#[test]
fn test_moment_preserving_angles() {
    let evaluator = evaluator(GridPolicy::Correlated, -1.0);
    for &energy in &[1e-5, 0.5] {
        let angles = evaluator
            .evaluate_moment_preserving_angles(energy, 2, PRECISION)
            .unwrap();
        assert_eq!(angles.cosines.len(), 2);
        assert!(angles.cosines[0] < angles.cosines[1]);
        assert!(angles.cosines.iter().all(|&mu| mu > -1.0 && mu < 1.0));
        assert!(angles.weights.iter().all(|&w| w > 0.0));
        assert_relative_eq!(angles.weights.iter().sum::<f64>(), 1.0, epsilon = 1e-14);
        let reduction = angles.cross_section_reduction;
        assert!(reduction > 0.0 && reduction < 1.0);

        // the dropped forward node keeps the remaining weight at mu = 1
        let moments = evaluator.evaluate_elastic_moment(energy, 4, PRECISION).unwrap();
        for (l, moment) in moments.iter().enumerate() {
            let discrete: f64 = angles
                .cosines
                .iter()
                .zip(&angles.weights)
                .map(|(&mu, &w)| w * legendre_p(l, mu))
                .sum();
            assert_relative_eq!(
                reduction * discrete + (1.0 - reduction),
                *moment,
                epsilon = 1e-9
            );
        }
    }
    assert!(matches!(
        evaluator.evaluate_moment_preserving_angles(1e-5, 0, PRECISION),
        Err(Error::InvalidParameter { .. })
    ));
}

#[test]
fn test_invalid_arguments_are_rejected() {
    let evaluator = evaluator(GridPolicy::Direct, -1.0);
    assert!(matches!(
        evaluator.evaluate_elastic_moment(1e6, 1, PRECISION),
        Err(Error::OutOfBounds { .. })
    ));
    assert!(matches!(
        evaluator.evaluate_elastic_moment(1.0, 1, 0.0),
        Err(Error::InvalidParameter { .. })
    ));

    let (cutoff, total) = cross_sections();
    let bad_config = EngineConfig::default().with_cutoff_angle_cosine(1.5);
    assert!(ElasticMomentsEvaluator::new(
        ElasticTraits::new(79).unwrap(),
        cutoff_distribution(GridPolicy::Direct),
        cutoff.clone(),
        total.clone(),
        SCREENED_RUTHERFORD_THRESHOLD,
        &bad_config,
    )
    .is_err());
    assert!(ElasticMomentsEvaluator::new(
        ElasticTraits::new(79).unwrap(),
        cutoff_distribution(GridPolicy::Direct),
        cutoff,
        total,
        ENERGY_GRID.len(),
        &EngineConfig::default(),
    )
    .is_err());
}

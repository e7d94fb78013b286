use approx::assert_abs_diff_eq;
use proptest::prelude::*;
use sharpe_alloc_core::metrics::{check_feasible, portfolio_metrics};
use sharpe_alloc_core::optimizer::{
    efficient_frontier, max_sharpe, max_sharpe_with, min_variance, risk_free_grid,
    sweep_risk_free_rates, NotConvergedReason, OptimizationStatus, OptimizerConfig,
    ProjectedGradient, SolverConfig,
};
use sharpe_alloc_core::returns::AnnualizedStats;
use sharpe_alloc_core::{EngineError, WEIGHT_TOLERANCE};

// ===========================================================================
// Fixtures
// ===========================================================================

fn two_asset() -> AnnualizedStats {
    AnnualizedStats::new(
        vec!["A".into(), "B".into()],
        vec![0.10, 0.15],
        vec![vec![0.04, 0.01], vec![0.01, 0.09]],
    )
    .unwrap()
}

/// Five large caps with plausible annualized figures.
fn five_asset() -> AnnualizedStats {
    let vols = [0.28, 0.25, 0.30, 0.33, 0.60];
    let corr = [
        [1.00, 0.65, 0.60, 0.55, 0.40],
        [0.65, 1.00, 0.62, 0.58, 0.38],
        [0.60, 0.62, 1.00, 0.60, 0.35],
        [0.55, 0.58, 0.60, 1.00, 0.42],
        [0.40, 0.38, 0.35, 0.42, 1.00],
    ];
    let cov = (0..5)
        .map(|i| (0..5).map(|j| corr[i][j] * vols[i] * vols[j]).collect())
        .collect();
    AnnualizedStats::new(
        ["AAPL", "MSFT", "GOOGL", "AMZN", "TSLA"]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        vec![0.24, 0.22, 0.18, 0.20, 0.45],
        cov,
    )
    .unwrap()
}

fn assert_feasible(weights: &[f64]) {
    let total: f64 = weights.iter().sum();
    assert!((total - 1.0).abs() < WEIGHT_TOLERANCE, "sum = {}", total);
    for w in weights {
        assert!(*w >= -WEIGHT_TOLERANCE && *w <= 1.0 + WEIGHT_TOLERANCE, "w = {}", w);
    }
}

// ===========================================================================
// Max Sharpe
// ===========================================================================

#[test]
fn test_two_asset_reference_solution() {
    let result = max_sharpe(&two_asset(), 0.02, &OptimizerConfig::default()).unwrap();
    assert_eq!(result.status, OptimizationStatus::Converged);
    assert_abs_diff_eq!(result.weights[0], 0.572816, epsilon = 1e-4);
    assert_abs_diff_eq!(result.weights[1], 0.427184, epsilon = 1e-4);
    assert_abs_diff_eq!(result.metrics.sharpe_ratio, 0.546155, epsilon = 1e-4);
    assert_abs_diff_eq!(result.metrics.expected_return, 0.121359, epsilon = 1e-4);
}

#[test]
fn test_five_asset_optimum_is_feasible_and_beats_equal_weight() {
    let stats = five_asset();
    let result = max_sharpe(&stats, 0.01, &OptimizerConfig::default()).unwrap();
    assert!(result.is_converged());
    assert_feasible(&result.weights);
    check_feasible(&result.weights).unwrap();

    let equal = portfolio_metrics(&[0.2; 5], &stats, 0.01).unwrap();
    assert!(result.metrics.sharpe_ratio >= equal.sharpe_ratio - 1e-12);
}

#[test]
fn test_optimize_is_deterministic() {
    let stats = five_asset();
    let a = max_sharpe(&stats, 0.02, &OptimizerConfig::default()).unwrap();
    let b = max_sharpe(&stats, 0.02, &OptimizerConfig::default()).unwrap();
    assert_eq!(a.weights, b.weights);
    assert_eq!(a.iterations, b.iterations);
}

#[test]
fn test_optimum_is_a_local_maximum() {
    let stats = five_asset();
    let result = max_sharpe(&stats, 0.02, &OptimizerConfig::default()).unwrap();
    let best = result.metrics.sharpe_ratio;

    // Shift a little weight between every pair of assets.
    for i in 0..5 {
        for j in 0..5 {
            if i == j || result.weights[i] < 1e-3 {
                continue;
            }
            let mut w = result.weights.clone();
            w[i] -= 1e-3;
            w[j] += 1e-3;
            let m = portfolio_metrics(&w, &stats, 0.02).unwrap();
            assert!(m.sharpe_ratio <= best + 1e-9, "moving {}->{} improved", i, j);
        }
    }
}

#[test]
fn test_single_asset_universe() {
    let stats = AnnualizedStats::new(vec!["ONLY".into()], vec![0.07], vec![vec![0.02]]).unwrap();
    let result = max_sharpe(&stats, 0.01, &OptimizerConfig::default()).unwrap();
    assert_eq!(result.weights, vec![1.0]);
    assert!(result.is_converged());
}

#[test]
fn test_iteration_cap_reports_best_iterate() {
    let config = OptimizerConfig::default().with_solver(SolverConfig {
        max_iterations: 2,
        tolerance: 0.0,
        stationarity_tolerance: 0.0,
    });
    let stats = five_asset();
    let result = max_sharpe(&stats, 0.02, &config).unwrap();
    assert!(!result.is_converged());
    assert_feasible(&result.weights);

    let equal = portfolio_metrics(&[0.2; 5], &stats, 0.02).unwrap();
    assert!(result.metrics.sharpe_ratio >= equal.sharpe_ratio - 1e-12);
    assert!(matches!(
        result.into_converged(),
        Err(EngineError::NotConverged { iterations: 2, .. })
    ));
}

#[test]
fn test_riskless_asset_above_rate_is_unbounded() {
    // Cash-like asset beating the risk-free rate with zero variance.
    let stats = AnnualizedStats::new(
        vec!["CASH".into(), "STK".into()],
        vec![0.03, 0.10],
        vec![vec![0.0, 0.0], vec![0.0, 0.04]],
    )
    .unwrap();
    let result = max_sharpe(&stats, 0.01, &OptimizerConfig::default()).unwrap();
    assert_eq!(
        result.status,
        OptimizationStatus::NotConverged {
            reason: NotConvergedReason::LineSearchFailed
        }
    );
    assert_feasible(&result.weights);
    assert!(result.weights[0] > 0.999);
    assert!(result.weights[1] > 0.0);

    let equal = portfolio_metrics(&[0.5, 0.5], &stats, 0.01).unwrap();
    assert!(result.metrics.sharpe_ratio > 100.0 * equal.sharpe_ratio);
    assert!(result.into_converged().is_err());
}

#[test]
fn test_custom_solver_seam() {
    let solver = ProjectedGradient::new(SolverConfig::default());
    let via_seam = max_sharpe_with(&solver, &two_asset(), 0.02).unwrap();
    let direct = max_sharpe(&two_asset(), 0.02, &OptimizerConfig::default()).unwrap();
    assert_eq!(via_seam, direct);
}

// ===========================================================================
// Sweep and frontier
// ===========================================================================

#[test]
fn test_sweep_sharpe_is_non_increasing() {
    let stats = two_asset();
    let outcomes = sweep_risk_free_rates(&stats, &[0.0, 0.02, 0.05], &OptimizerConfig::default());
    let sharpes: Vec<f64> = outcomes
        .iter()
        .map(|o| o.outcome.as_ref().unwrap().metrics.sharpe_ratio)
        .collect();
    assert!(sharpes[0] >= sharpes[1]);
    assert!(sharpes[1] >= sharpes[2]);
    assert_eq!(outcomes[2].risk_free_rate, 0.05);
}

#[test]
fn test_sweep_over_grid_keeps_every_rate() {
    let rates = risk_free_grid(0.0, 0.05, 51).unwrap();
    let outcomes = sweep_risk_free_rates(&five_asset(), &rates, &OptimizerConfig::default());
    assert_eq!(outcomes.len(), 51);
    for (o, r) in outcomes.iter().zip(&rates) {
        assert_eq!(o.risk_free_rate, *r);
        assert_feasible(&o.outcome.as_ref().unwrap().weights);
    }
}

#[test]
fn test_frontier_brackets_tangency() {
    let stats = five_asset();
    let config = OptimizerConfig::default();
    let floor = min_variance(&stats, 0.01, &config).unwrap();
    let tangency = max_sharpe(&stats, 0.01, &config).unwrap();
    let frontier = efficient_frontier(&stats, 0.01, 15, &config).unwrap();

    assert_abs_diff_eq!(
        frontier[0].volatility,
        floor.metrics.volatility,
        epsilon = 1e-9
    );
    assert!(tangency.metrics.volatility >= floor.metrics.volatility - 1e-9);
    for point in &frontier {
        assert_feasible(&point.weights);
        assert!(point.sharpe_ratio <= tangency.metrics.sharpe_ratio + 1e-6);
    }
}

// ===========================================================================
// Properties
// ===========================================================================

/// Random positive-definite problem: `Sigma = A A' + 0.01 I`.
fn random_problem() -> impl Strategy<Value = (AnnualizedStats, Vec<f64>)> {
    (2usize..6).prop_flat_map(|n| {
        (
            prop::collection::vec(-0.3f64..0.3, n * n),
            prop::collection::vec(-0.1f64..0.3, n),
            prop::collection::vec(0.01f64..1.0, n),
        )
            .prop_map(move |(a, mu, raw)| {
                let cov: Vec<Vec<f64>> = (0..n)
                    .map(|i| {
                        (0..n)
                            .map(|j| {
                                let dot: f64 = (0..n).map(|k| a[i * n + k] * a[j * n + k]).sum();
                                if i == j {
                                    dot + 0.01
                                } else {
                                    dot
                                }
                            })
                            .collect()
                    })
                    .collect();
                let assets = (0..n).map(|i| format!("X{}", i)).collect();
                let total: f64 = raw.iter().sum();
                let weights = raw.iter().map(|w| w / total).collect();
                (AnnualizedStats::new(assets, mu, cov).unwrap(), weights)
            })
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_feasible_weights_have_finite_metrics((stats, weights) in random_problem()) {
        let m = portfolio_metrics(&weights, &stats, 0.02).unwrap();
        prop_assert!(m.volatility >= 0.0);
        prop_assert!(m.sharpe_ratio.is_finite());
    }

    #[test]
    fn prop_optimum_is_feasible_and_no_worse_than_start((stats, _w) in random_problem()) {
        let n = stats.n_assets();
        let result = max_sharpe(&stats, 0.02, &OptimizerConfig::sequential()).unwrap();
        let total: f64 = result.weights.iter().sum();
        prop_assert!((total - 1.0).abs() < WEIGHT_TOLERANCE);
        prop_assert!(result.weights.iter().all(|w| *w >= -WEIGHT_TOLERANCE && *w <= 1.0 + WEIGHT_TOLERANCE));

        let equal = portfolio_metrics(&vec![1.0 / n as f64; n], &stats, 0.02).unwrap();
        prop_assert!(result.metrics.sharpe_ratio >= equal.sharpe_ratio - 1e-9);
    }
}

//! Long-only minimum-variance portfolio and efficient frontier.
//!
//! Frontier portfolios minimize `w' Sigma w - tau * w·mu` on the simplex. The
//! return of the solution grows with `tau`, so each target return on an even
//! grid between the minimum-variance return and the best single-asset return
//! is reached by bisecting on `tau`.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::sharpe::finish;
use super::solver::{Objective, ProjectedGradient, SimplexSolver, SolverOutcome};
use super::{OptimizationResult, OptimizationStatus, OptimizerConfig};
use crate::error::EngineError;
use crate::linalg::{equal_weights, vec_dot};
use crate::metrics::portfolio_metrics;
use crate::returns::AnnualizedStats;
use crate::types::Rate;
use crate::EngineResult;

const MAX_FRONTIER_POINTS: usize = 500;
const TILT_DOUBLINGS: usize = 60;
const BISECTION_STEPS: usize = 60;
const RETURN_TOLERANCE: f64 = 1e-10;
const DUPLICATE_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrontierPoint {
    pub expected_return: f64,
    pub volatility: f64,
    /// Sharpe ratio at the risk-free rate the frontier was built with.
    pub sharpe_ratio: f64,
    pub weights: Vec<f64>,
    pub converged: bool,
}

/// `w' Sigma w - tilt * w·mu`
struct TiltedVariance<'a> {
    stats: &'a AnnualizedStats,
    tilt: f64,
}

impl Objective for TiltedVariance<'_> {
    fn value(&self, w: &[f64]) -> f64 {
        self.stats.variance_of(w) - self.tilt * vec_dot(w, self.stats.mean())
    }

    fn gradient(&self, w: &[f64]) -> Vec<f64> {
        self.stats
            .cov_times(w)
            .iter()
            .zip(self.stats.mean())
            .map(|(sw, mu)| 2.0 * sw - self.tilt * mu)
            .collect()
    }
}

/// Global minimum-variance long-only portfolio.
///
/// Fails with [`EngineError::DegenerateVariance`] when a riskless mix exists,
/// e.g. an asset whose price never moved.
pub fn min_variance(
    stats: &AnnualizedStats,
    risk_free_rate: Rate,
    config: &OptimizerConfig,
) -> EngineResult<OptimizationResult> {
    let outcome = min_variance_weights(stats, config)?;
    finish(
        stats,
        outcome.weights,
        risk_free_rate,
        outcome.status,
        outcome.iterations,
    )
}

fn min_variance_weights(
    stats: &AnnualizedStats,
    config: &OptimizerConfig,
) -> EngineResult<SolverOutcome> {
    let n = stats.n_assets();
    if n == 0 {
        return Err(EngineError::InfeasibleRegion(
            "No assets to allocate across".into(),
        ));
    }
    if n == 1 {
        return Ok(SolverOutcome {
            weights: vec![1.0],
            value: stats.variance_of(&[1.0]),
            iterations: 0,
            status: OptimizationStatus::Converged,
        });
    }

    let solver = ProjectedGradient::new(config.solver);
    Ok(solver.minimize(&TiltedVariance { stats, tilt: 0.0 }, &equal_weights(n)))
}

/// Up to `points` efficient portfolios ordered by volatility.
///
/// The first point is the minimum-variance portfolio and the last is the
/// highest-return single asset (the least volatile one on ties). Points that
/// coincide are merged, and riskless points (which have no Sharpe ratio) are
/// left out, so fewer than `points` may come back.
pub fn efficient_frontier(
    stats: &AnnualizedStats,
    risk_free_rate: Rate,
    points: usize,
    config: &OptimizerConfig,
) -> EngineResult<Vec<FrontierPoint>> {
    if !(2..=MAX_FRONTIER_POINTS).contains(&points) {
        return Err(EngineError::invalid(
            "points",
            format!("Must be between 2 and {}, got {}", MAX_FRONTIER_POINTS, points),
        ));
    }

    let floor = min_variance_weights(stats, config)?;
    let solver = ProjectedGradient::new(config.solver);
    let n = stats.n_assets();

    let top = top_return_asset(stats);
    let mut corner = vec![0.0; n];
    corner[top] = 1.0;

    let r_lo = vec_dot(&floor.weights, stats.mean());
    let r_hi = stats.mean()[top];

    let floor_converged = floor.status == OptimizationStatus::Converged;
    let mut frontier: Vec<FrontierPoint> =
        point(stats, risk_free_rate, &floor.weights, floor_converged)?
            .into_iter()
            .collect();
    if r_hi - r_lo > DUPLICATE_TOLERANCE {
        let mut warm = floor.weights.clone();
        for k in 1..points - 1 {
            let target = r_lo + (r_hi - r_lo) * k as f64 / (points - 1) as f64;
            let (weights, converged) = solve_for_return(&solver, stats, target, &warm);
            frontier.extend(point(stats, risk_free_rate, &weights, converged)?);
            warm = weights;
        }
        frontier.extend(point(stats, risk_free_rate, &corner, true)?);
    }

    frontier.sort_by(|a, b| a.volatility.total_cmp(&b.volatility));
    frontier.dedup_by(|b, a| {
        (a.volatility - b.volatility).abs() <= DUPLICATE_TOLERANCE
            && (a.expected_return - b.expected_return).abs() <= DUPLICATE_TOLERANCE
    });

    debug!(
        requested = points,
        returned = frontier.len(),
        "efficient frontier built"
    );
    Ok(frontier)
}

fn top_return_asset(stats: &AnnualizedStats) -> usize {
    let mean = stats.mean();
    let vols = stats.volatilities();
    (0..mean.len())
        .max_by(|&i, &j| {
            mean[i]
                .total_cmp(&mean[j])
                .then_with(|| vols[j].total_cmp(&vols[i]))
        })
        .unwrap_or(0)
}

fn solve_tilted(
    solver: &ProjectedGradient,
    stats: &AnnualizedStats,
    tilt: f64,
    warm: &[f64],
) -> (Vec<f64>, f64, bool) {
    let outcome = solver.minimize(&TiltedVariance { stats, tilt }, warm);
    let ret = vec_dot(&outcome.weights, stats.mean());
    let converged = outcome.status == OptimizationStatus::Converged;
    (outcome.weights, ret, converged)
}

/// Bisect on the tilt until the optimal portfolio earns `target`.
fn solve_for_return(
    solver: &ProjectedGradient,
    stats: &AnnualizedStats,
    target: f64,
    warm: &[f64],
) -> (Vec<f64>, bool) {
    let mut lo = 0.0;
    let mut hi = 1.0;
    let mut best = solve_tilted(solver, stats, hi, warm);
    for _ in 0..TILT_DOUBLINGS {
        if best.1 >= target {
            break;
        }
        lo = hi;
        hi *= 2.0;
        best = solve_tilted(solver, stats, hi, &best.0);
    }

    for _ in 0..BISECTION_STEPS {
        if (best.1 - target).abs() <= RETURN_TOLERANCE {
            break;
        }
        let mid = 0.5 * (lo + hi);
        let trial = solve_tilted(solver, stats, mid, &best.0);
        if trial.1 < target {
            lo = mid;
        } else {
            hi = mid;
        }
        if (trial.1 - target).abs() <= (best.1 - target).abs() {
            best = trial;
        }
    }

    (best.0, best.2)
}

/// `None` for a riskless portfolio.
fn point(
    stats: &AnnualizedStats,
    risk_free_rate: Rate,
    weights: &[f64],
    converged: bool,
) -> EngineResult<Option<FrontierPoint>> {
    let m = match portfolio_metrics(weights, stats, risk_free_rate) {
        Ok(m) => m,
        Err(EngineError::DegenerateVariance { .. }) => return Ok(None),
        Err(e) => return Err(e),
    };
    Ok(Some(FrontierPoint {
        expected_return: m.expected_return,
        volatility: m.volatility,
        sharpe_ratio: m.sharpe_ratio,
        weights: weights.to_vec(),
        converged,
    }))
}

use tracing::{debug, warn};

use super::solver::{Objective, ProjectedGradient, SimplexSolver};
use super::{OptimizationResult, OptimizationStatus, OptimizerConfig};
use crate::error::EngineError;
use crate::linalg::{clean_simplex, equal_weights, vec_dot};
use crate::metrics::portfolio_metrics;
use crate::returns::AnnualizedStats;
use crate::types::{Rate, VARIANCE_EPSILON};
use crate::EngineResult;

/// `-(w·mu - r) / sqrt(w' Sigma w)`, undefined where the variance vanishes.
pub(crate) struct NegativeSharpe<'a> {
    stats: &'a AnnualizedStats,
    risk_free_rate: Rate,
}

impl<'a> NegativeSharpe<'a> {
    pub(crate) fn new(stats: &'a AnnualizedStats, risk_free_rate: Rate) -> Self {
        Self {
            stats,
            risk_free_rate,
        }
    }
}

impl Objective for NegativeSharpe<'_> {
    fn value(&self, w: &[f64]) -> f64 {
        let variance = self.stats.variance_of(w);
        if variance <= VARIANCE_EPSILON {
            return f64::INFINITY;
        }
        -(vec_dot(w, self.stats.mean()) - self.risk_free_rate) / variance.sqrt()
    }

    fn gradient(&self, w: &[f64]) -> Vec<f64> {
        let sigma_w = self.stats.cov_times(w);
        let variance = vec_dot(w, &sigma_w);
        if variance <= VARIANCE_EPSILON {
            return vec![0.0; w.len()];
        }
        let vol = variance.sqrt();
        let excess = vec_dot(w, self.stats.mean()) - self.risk_free_rate;
        let vol3 = vol * variance;

        self.stats
            .mean()
            .iter()
            .zip(&sigma_w)
            .map(|(mu, sw)| -(mu / vol - excess * sw / vol3))
            .collect()
    }
}

/// Maximum-Sharpe long-only portfolio using the default projected-gradient
/// solver.
///
/// Starts from equal weights. Fails with [`EngineError::DegenerateVariance`]
/// if the starting portfolio has no variance, and with
/// [`EngineError::InfeasibleRegion`] when there are no assets.
///
/// A riskless asset earning more than the risk-free rate has no finite
/// optimum: the Sharpe ratio grows without bound toward its corner. The
/// search then stops short of the corner and reports
/// `NotConverged(LineSearchFailed)` with the best iterate found.
pub fn max_sharpe(
    stats: &AnnualizedStats,
    risk_free_rate: Rate,
    config: &OptimizerConfig,
) -> EngineResult<OptimizationResult> {
    max_sharpe_with(&ProjectedGradient::new(config.solver), stats, risk_free_rate)
}

/// [`max_sharpe`] with a caller-supplied solver.
pub fn max_sharpe_with(
    solver: &dyn SimplexSolver,
    stats: &AnnualizedStats,
    risk_free_rate: Rate,
) -> EngineResult<OptimizationResult> {
    let n = stats.n_assets();
    if n == 0 {
        return Err(EngineError::InfeasibleRegion(
            "No assets to allocate across".into(),
        ));
    }

    let initial = equal_weights(n);
    // Validates the rate and rejects a zero-variance start.
    portfolio_metrics(&initial, stats, risk_free_rate)?;

    if n == 1 {
        return finish(stats, vec![1.0], risk_free_rate, OptimizationStatus::Converged, 0);
    }

    let objective = NegativeSharpe::new(stats, risk_free_rate);
    let outcome = solver.minimize(&objective, &initial);
    let mut weights = outcome.weights;
    clean_simplex(&mut weights);

    let result = finish(
        stats,
        weights,
        risk_free_rate,
        outcome.status,
        outcome.iterations,
    )?;

    if result.is_converged() {
        debug!(
            risk_free_rate,
            iterations = result.iterations,
            sharpe = result.metrics.sharpe_ratio,
            "max-Sharpe solve converged"
        );
    } else {
        warn!(
            risk_free_rate,
            iterations = result.iterations,
            status = ?result.status,
            "max-Sharpe solve did not converge; returning best iterate"
        );
    }

    Ok(result)
}

pub(crate) fn finish(
    stats: &AnnualizedStats,
    weights: Vec<f64>,
    risk_free_rate: Rate,
    status: OptimizationStatus,
    iterations: u32,
) -> EngineResult<OptimizationResult> {
    let metrics = portfolio_metrics(&weights, stats, risk_free_rate)?;
    Ok(OptimizationResult {
        assets: stats.assets().to_vec(),
        weights,
        metrics,
        risk_free_rate,
        status,
        iterations,
    })
}

//! Long-only, fully-invested portfolio optimization.
//!
//! Every optimizer here searches the probability simplex
//! `{w : 0 <= w_i <= 1, sum(w) = 1}` through the [`solver::SimplexSolver`]
//! seam. Non-convergence is not an error: results carry an
//! [`OptimizationStatus`] and the best iterate found, and the caller decides
//! whether a near-optimal answer is acceptable.

pub mod frontier;
pub mod sharpe;
pub mod solver;
pub mod sweep;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::metrics::PortfolioMetrics;
use crate::types::{AssetId, Rate};
use crate::EngineResult;

pub use frontier::{efficient_frontier, min_variance, FrontierPoint};
pub use sharpe::{max_sharpe, max_sharpe_with};
pub use solver::{Objective, ProjectedGradient, SimplexSolver, SolverConfig, SolverOutcome};
pub use sweep::{
    fixed_weight_sensitivity, risk_free_grid, sensitivity_table, sweep_risk_free_rates,
    ScenarioOutcome, SensitivityRow,
};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Why a solver stopped before meeting its convergence criterion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotConvergedReason {
    /// Iteration ceiling reached.
    MaxIterations,
    /// No step length produced a sufficient decrease.
    LineSearchFailed,
    /// Objective was not finite at the starting point.
    NonFiniteObjective,
}

impl std::fmt::Display for NotConvergedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotConvergedReason::MaxIterations => write!(f, "iteration limit reached"),
            NotConvergedReason::LineSearchFailed => write!(f, "line search failed"),
            NotConvergedReason::NonFiniteObjective => write!(f, "objective not finite"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationStatus {
    Converged,
    NotConverged { reason: NotConvergedReason },
}

/// Optimizer settings shared by single runs and sweeps.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    pub solver: SolverConfig,
    /// Run sweeps on the rayon pool (requires the `parallel` feature).
    pub parallel: bool,
    /// Minimum number of scenarios before a sweep goes parallel.
    pub parallel_threshold: usize,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            solver: SolverConfig::default(),
            parallel: true,
            parallel_threshold: 4,
        }
    }
}

impl OptimizerConfig {
    /// A config that always sweeps sequentially.
    #[must_use]
    pub fn sequential() -> Self {
        Self {
            parallel: false,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_solver(mut self, solver: SolverConfig) -> Self {
        self.solver = solver;
        self
    }

    #[must_use]
    pub fn with_parallel(mut self, enabled: bool) -> Self {
        self.parallel = enabled;
        self
    }

    #[must_use]
    pub fn with_threshold(mut self, threshold: usize) -> Self {
        self.parallel_threshold = threshold;
        self
    }

    pub fn should_parallelize(&self, scenarios: usize) -> bool {
        self.parallel && scenarios >= self.parallel_threshold
    }
}

/// Optimal (or best-found) allocation for one risk-free rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub assets: Vec<AssetId>,
    pub weights: Vec<f64>,
    pub metrics: PortfolioMetrics,
    pub risk_free_rate: Rate,
    pub status: OptimizationStatus,
    pub iterations: u32,
}

impl OptimizationResult {
    pub fn is_converged(&self) -> bool {
        self.status == OptimizationStatus::Converged
    }

    /// Treat a non-converged result as a hard failure.
    pub fn into_converged(self) -> EngineResult<Self> {
        match self.status {
            OptimizationStatus::Converged => Ok(self),
            OptimizationStatus::NotConverged { reason } => Err(EngineError::NotConverged {
                iterations: self.iterations,
                reason: reason.to_string(),
            }),
        }
    }

    /// Weight of a named asset, if present.
    pub fn weight_of(&self, asset: &str) -> Option<f64> {
        self.assets
            .iter()
            .position(|a| a == asset)
            .map(|i| self.weights[i])
    }
}

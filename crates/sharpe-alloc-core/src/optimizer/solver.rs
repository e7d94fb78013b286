//! Projected-gradient minimization on the probability simplex.
//!
//! An [`Objective`] and a starting point go in, a feasible weight vector and a
//! convergence flag come out. Any [`SimplexSolver`] can stand in for
//! [`ProjectedGradient`].

use serde::{Deserialize, Serialize};
use tracing::trace;

use super::{NotConvergedReason, OptimizationStatus};
use crate::linalg::{clean_simplex, max_abs_diff, project_simplex, vec_dot};

/// Armijo sufficient-decrease constant.
const ARMIJO: f64 = 1e-4;
/// Smallest trial step before the line search gives up.
const MIN_STEP: f64 = 1e-16;
/// Bounds on the Barzilai-Borwein step.
const BB_MIN: f64 = 1e-10;
const BB_MAX: f64 = 1e6;
/// Stationarity accepted once progress stalls at machine precision.
const COARSE_STATIONARITY: f64 = 1e-6;

/// A smooth function of the weight vector. `value` may return a non-finite
/// number where the function is undefined; such points are never accepted.
pub trait Objective {
    fn value(&self, w: &[f64]) -> f64;
    fn gradient(&self, w: &[f64]) -> Vec<f64>;
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    pub max_iterations: u32,
    /// Relative objective improvement below which progress has stalled.
    pub tolerance: f64,
    /// Converged once `|P(w - grad) - w|_inf` falls to this.
    pub stationarity_tolerance: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            tolerance: 1e-9,
            stationarity_tolerance: 1e-10,
        }
    }
}

/// What a solver hands back.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverOutcome {
    pub weights: Vec<f64>,
    pub value: f64,
    pub iterations: u32,
    pub status: OptimizationStatus,
}

pub trait SimplexSolver: Send + Sync {
    /// Minimize `objective` over the simplex starting from `initial`.
    /// Always returns the best feasible iterate found.
    fn minimize(&self, objective: &dyn Objective, initial: &[f64]) -> SolverOutcome;
}

/// Spectral projected gradient with monotone Armijo backtracking.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProjectedGradient {
    config: SolverConfig,
}

impl ProjectedGradient {
    pub fn new(config: SolverConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }
}

impl SimplexSolver for ProjectedGradient {
    fn minimize(&self, objective: &dyn Objective, initial: &[f64]) -> SolverOutcome {
        let mut w = project_simplex(initial);
        clean_simplex(&mut w);
        let mut f = objective.value(&w);

        if !f.is_finite() {
            return SolverOutcome {
                weights: w,
                value: f,
                iterations: 0,
                status: OptimizationStatus::NotConverged {
                    reason: NotConvergedReason::NonFiniteObjective,
                },
            };
        }

        let mut g = objective.gradient(&w);
        let mut step = 1.0;
        let mut last_improvement = f64::INFINITY;

        let finish = |mut weights: Vec<f64>, value: f64, iterations: u32, status| {
            clean_simplex(&mut weights);
            SolverOutcome {
                weights,
                value,
                iterations,
                status,
            }
        };

        for k in 0..self.config.max_iterations {
            let stationarity = max_abs_diff(&project_simplex(&descend(&w, &g, 1.0)), &w);
            let stalled = last_improvement <= self.config.tolerance * (1.0 + f.abs());
            if stationarity <= self.config.stationarity_tolerance
                || (stalled && stationarity <= COARSE_STATIONARITY)
            {
                trace!(iterations = k, stationarity, value = f, "projected gradient converged");
                return finish(w, f, k, OptimizationStatus::Converged);
            }

            let mut t = step;
            let accepted = loop {
                let candidate = project_simplex(&descend(&w, &g, t));
                let d: Vec<f64> = candidate.iter().zip(&w).map(|(c, x)| c - x).collect();
                let f_c = objective.value(&candidate);
                if f_c.is_finite() && f_c <= f + ARMIJO * vec_dot(&g, &d) {
                    break Some((candidate, f_c));
                }
                t *= 0.5;
                if t < MIN_STEP {
                    break None;
                }
            };

            let Some((candidate, f_c)) = accepted else {
                let status = if stationarity <= COARSE_STATIONARITY {
                    OptimizationStatus::Converged
                } else {
                    OptimizationStatus::NotConverged {
                        reason: NotConvergedReason::LineSearchFailed,
                    }
                };
                trace!(iterations = k, stationarity, ?status, "line search exhausted");
                return finish(w, f, k, status);
            };

            let g_new = objective.gradient(&candidate);
            let s: Vec<f64> = candidate.iter().zip(&w).map(|(a, b)| a - b).collect();
            let y: Vec<f64> = g_new.iter().zip(&g).map(|(a, b)| a - b).collect();
            let sy = vec_dot(&s, &y);
            step = if sy > 0.0 {
                (vec_dot(&s, &s) / sy).clamp(BB_MIN, BB_MAX)
            } else {
                (2.0 * t).min(BB_MAX)
            };

            last_improvement = f - f_c;
            w = candidate;
            f = f_c;
            g = g_new;
        }

        finish(
            w,
            f,
            self.config.max_iterations,
            OptimizationStatus::NotConverged {
                reason: NotConvergedReason::MaxIterations,
            },
        )
    }
}

fn descend(w: &[f64], g: &[f64], t: f64) -> Vec<f64> {
    w.iter().zip(g).map(|(wi, gi)| wi - t * gi).collect()
}

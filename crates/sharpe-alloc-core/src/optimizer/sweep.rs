//! Risk-free-rate sensitivity.
//!
//! Two views are offered. [`sweep_risk_free_rates`] re-optimizes at every
//! rate, so weights move with the rate. [`fixed_weight_sensitivity`] keeps one
//! allocation and only re-prices its Sharpe ratio.

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use tracing::{debug, info};

use super::sharpe::max_sharpe;
use super::{OptimizationResult, OptimizerConfig};
use crate::error::EngineError;
use crate::returns::AnnualizedStats;
use crate::types::Rate;
use crate::EngineResult;

/// Largest grid a caller may request.
const MAX_GRID_STEPS: usize = 10_000;

/// One rate of a sweep and what the optimizer made of it.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioOutcome {
    pub risk_free_rate: Rate,
    pub outcome: Result<OptimizationResult, EngineError>,
}

impl Serialize for ScenarioOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ScenarioOutcome", 3)?;
        state.serialize_field("risk_free_rate", &self.risk_free_rate)?;
        match &self.outcome {
            Ok(result) => {
                state.serialize_field("result", result)?;
                state.serialize_field("error", &None::<String>)?;
            }
            Err(err) => {
                state.serialize_field("result", &None::<OptimizationResult>)?;
                state.serialize_field("error", &Some(err.to_string()))?;
            }
        }
        state.end()
    }
}

/// Flat row of a sensitivity table, one per rate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensitivityRow {
    pub risk_free_rate: Rate,
    pub sharpe_ratio: Option<f64>,
    pub expected_return: Option<f64>,
    pub volatility: Option<f64>,
    pub converged: bool,
    pub weights: Vec<f64>,
    pub error: Option<String>,
}

/// Re-optimize the maximum-Sharpe portfolio at every rate.
///
/// Output order follows `rates`. A failed rate is reported in its own
/// [`ScenarioOutcome`] and never aborts the others. With the `parallel`
/// feature and enough rates the work is spread over the rayon pool.
pub fn sweep_risk_free_rates(
    stats: &AnnualizedStats,
    rates: &[Rate],
    config: &OptimizerConfig,
) -> Vec<ScenarioOutcome> {
    let run = |rate: &Rate| ScenarioOutcome {
        risk_free_rate: *rate,
        outcome: max_sharpe(stats, *rate, config),
    };

    #[cfg(feature = "parallel")]
    {
        if config.should_parallelize(rates.len()) {
            use rayon::prelude::*;
            debug!(scenarios = rates.len(), "sweeping risk-free rates in parallel");
            let outcomes: Vec<ScenarioOutcome> = rates.par_iter().map(run).collect();
            log_summary(&outcomes);
            return outcomes;
        }
    }

    debug!(scenarios = rates.len(), "sweeping risk-free rates");
    let outcomes: Vec<ScenarioOutcome> = rates.iter().map(run).collect();
    log_summary(&outcomes);
    outcomes
}

fn log_summary(outcomes: &[ScenarioOutcome]) {
    let failed = outcomes.iter().filter(|o| o.outcome.is_err()).count();
    let unconverged = outcomes
        .iter()
        .filter(|o| matches!(&o.outcome, Ok(r) if !r.is_converged()))
        .count();
    info!(
        scenarios = outcomes.len(),
        failed, unconverged, "risk-free sweep complete"
    );
}

/// `steps` evenly spaced rates from `lower` to `upper` inclusive.
pub fn risk_free_grid(lower: Rate, upper: Rate, steps: usize) -> EngineResult<Vec<Rate>> {
    if !lower.is_finite() || !upper.is_finite() {
        return Err(EngineError::invalid("risk_free_grid", "Bounds must be finite"));
    }
    if upper < lower {
        return Err(EngineError::invalid(
            "risk_free_grid",
            format!("Upper bound {} is below lower bound {}", upper, lower),
        ));
    }
    if steps == 0 || steps > MAX_GRID_STEPS {
        return Err(EngineError::invalid(
            "steps",
            format!("Must be between 1 and {}, got {}", MAX_GRID_STEPS, steps),
        ));
    }
    if steps == 1 {
        return Ok(vec![lower]);
    }

    let span = upper - lower;
    let last = (steps - 1) as f64;
    Ok((0..steps)
        .map(|k| {
            if k == steps - 1 {
                upper
            } else {
                lower + span * k as f64 / last
            }
        })
        .collect())
}

/// Sharpe ratio of a fixed allocation re-priced at each rate.
pub fn fixed_weight_sensitivity(
    result: &OptimizationResult,
    rates: &[Rate],
) -> Vec<(Rate, Option<f64>)> {
    rates
        .iter()
        .map(|&r| (r, result.metrics.sharpe_at(r)))
        .collect()
}

/// Flatten sweep outcomes for tabular output.
pub fn sensitivity_table(outcomes: &[ScenarioOutcome]) -> Vec<SensitivityRow> {
    outcomes
        .iter()
        .map(|o| match &o.outcome {
            Ok(r) => SensitivityRow {
                risk_free_rate: o.risk_free_rate,
                sharpe_ratio: Some(r.metrics.sharpe_ratio),
                expected_return: Some(r.metrics.expected_return),
                volatility: Some(r.metrics.volatility),
                converged: r.is_converged(),
                weights: r.weights.clone(),
                error: None,
            },
            Err(e) => SensitivityRow {
                risk_free_rate: o.risk_free_rate,
                sharpe_ratio: None,
                expected_return: None,
                volatility: None,
                converged: false,
                weights: Vec::new(),
                error: Some(e.to_string()),
            },
        })
        .collect()
}

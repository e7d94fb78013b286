use chrono::NaiveDate;
use clap::Args;
use serde::Serialize;
use serde_json::Value;
use std::time::Instant;

use sharpe_alloc_core::optimizer::{
    efficient_frontier, fixed_weight_sensitivity, max_sharpe, risk_free_grid, sensitivity_table,
    sweep_risk_free_rates, OptimizationResult, OptimizerConfig,
};
use sharpe_alloc_core::returns::{build_stats, AnnualizedStats, ReturnConvention};
use sharpe_alloc_core::{with_metadata, EngineError};

use super::{PriceArgs, SolverArgs};

#[derive(Args)]
pub struct StatsArgs {
    #[command(flatten)]
    pub prices: PriceArgs,
}

#[derive(Args)]
pub struct OptimizeArgs {
    #[command(flatten)]
    pub prices: PriceArgs,

    #[command(flatten)]
    pub solver: SolverArgs,

    /// Annual risk-free rate as a decimal; repeat for several scenarios
    #[arg(long = "risk-free-rate", default_value = "0.01")]
    pub risk_free_rates: Vec<f64>,

    /// Fail instead of reporting a best iterate when the solver does not converge
    #[arg(long)]
    pub strict: bool,
}

#[derive(Args)]
pub struct SweepArgs {
    #[command(flatten)]
    pub prices: PriceArgs,

    #[command(flatten)]
    pub solver: SolverArgs,

    #[arg(long, default_value_t = 0.0)]
    pub from: f64,

    #[arg(long, default_value_t = 0.05)]
    pub to: f64,

    #[arg(long, default_value_t = 11)]
    pub steps: usize,

    /// Rate whose optimal weights are held fixed for the comparison column
    #[arg(long, default_value_t = 0.01)]
    pub base_rate: f64,
}

#[derive(Args)]
pub struct FrontierArgs {
    #[command(flatten)]
    pub prices: PriceArgs,

    #[command(flatten)]
    pub solver: SolverArgs,

    #[arg(long, default_value_t = 20)]
    pub points: usize,

    #[arg(long, default_value_t = 0.01)]
    pub risk_free_rate: f64,
}

#[derive(Serialize)]
struct StatsOutput {
    assets: Vec<String>,
    observations: usize,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    convention: ReturnConvention,
    expected_returns: Vec<f64>,
    volatilities: Vec<f64>,
    covariance_matrix: Vec<Vec<f64>>,
    correlation: Vec<Vec<f64>>,
}

#[derive(Debug, Serialize)]
struct AssetWeight {
    asset: String,
    weight: f64,
}

/// One risk-free-rate scenario; a failed rate keeps its row with `error` set.
#[derive(Debug, Serialize)]
struct AllocationOutput {
    risk_free_rate: f64,
    sharpe_ratio: Option<f64>,
    expected_return: Option<f64>,
    volatility: Option<f64>,
    converged: bool,
    iterations: Option<u32>,
    weights: Vec<AssetWeight>,
    error: Option<String>,
}

impl AllocationOutput {
    fn failed(risk_free_rate: f64, error: &EngineError) -> Self {
        Self {
            risk_free_rate,
            sharpe_ratio: None,
            expected_return: None,
            volatility: None,
            converged: false,
            iterations: None,
            weights: Vec::new(),
            error: Some(error.to_string()),
        }
    }
}

impl From<&OptimizationResult> for AllocationOutput {
    fn from(r: &OptimizationResult) -> Self {
        Self {
            risk_free_rate: r.risk_free_rate,
            sharpe_ratio: Some(r.metrics.sharpe_ratio),
            expected_return: Some(r.metrics.expected_return),
            volatility: Some(r.metrics.volatility),
            converged: r.is_converged(),
            iterations: Some(r.iterations),
            weights: r
                .assets
                .iter()
                .zip(&r.weights)
                .map(|(asset, &weight)| AssetWeight {
                    asset: asset.clone(),
                    weight,
                })
                .collect(),
            error: None,
        }
    }
}

#[derive(Serialize)]
struct SweepRow {
    risk_free_rate: f64,
    sharpe_ratio: Option<f64>,
    expected_return: Option<f64>,
    volatility: Option<f64>,
    converged: bool,
    fixed_weight_sharpe: Option<f64>,
    weights: Vec<f64>,
    error: Option<String>,
}

pub fn run_stats(args: StatsArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let start = Instant::now();
    let table = args.prices.load()?;
    let config = args.prices.stats_config();
    let stats = build_stats(&table, &config)?;

    let output = StatsOutput {
        assets: stats.assets().to_vec(),
        observations: table.n_observations(),
        start: table.dates().first().copied(),
        end: table.dates().last().copied(),
        convention: config.convention,
        expected_returns: stats.mean().to_vec(),
        volatilities: stats.volatilities(),
        covariance_matrix: stats.covariance().to_vec(),
        correlation: stats.correlation(),
    };
    let wrapped = with_metadata(
        "Annualized mean daily returns and sample covariance",
        &config,
        Vec::new(),
        start.elapsed().as_micros() as u64,
        output,
    );
    Ok(serde_json::to_value(wrapped)?)
}

pub fn run_optimize(args: OptimizeArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let start = Instant::now();
    let table = args.prices.load()?;
    let stats = build_stats(&table, &args.prices.stats_config())?;
    let config = args.solver.optimizer_config();
    let (mut rows, warnings) =
        allocation_rows(&stats, &args.risk_free_rates, &config, args.strict)?;

    let elapsed = start.elapsed().as_micros() as u64;
    let methodology = "Long-only maximum Sharpe ratio (projected gradient on the simplex)";
    let assumptions = serde_json::json!({
        "risk_free_rates": args.risk_free_rates,
        "optimizer": config,
    });
    let value = if rows.len() == 1 {
        let row = rows.remove(0);
        serde_json::to_value(with_metadata(methodology, &assumptions, warnings, elapsed, row))?
    } else {
        serde_json::to_value(with_metadata(methodology, &assumptions, warnings, elapsed, rows))?
    };
    Ok(value)
}

/// Solve every rate, keeping failed rates as error rows.
///
/// Fails only when `strict` meets a non-converged solve or when no rate
/// produced an allocation at all.
fn allocation_rows(
    stats: &AnnualizedStats,
    rates: &[f64],
    config: &OptimizerConfig,
    strict: bool,
) -> Result<(Vec<AllocationOutput>, Vec<String>), EngineError> {
    let mut warnings = Vec::new();
    let mut rows = Vec::with_capacity(rates.len());
    let mut first_error = None;

    for scenario in sweep_risk_free_rates(stats, rates, config) {
        let result = match scenario.outcome {
            Ok(result) if strict => result.into_converged()?,
            Ok(result) => result,
            Err(e) => {
                warnings.push(format!("Rate {}: {}", scenario.risk_free_rate, e));
                rows.push(AllocationOutput::failed(scenario.risk_free_rate, &e));
                first_error.get_or_insert(e);
                continue;
            }
        };
        if !result.is_converged() {
            warnings.push(format!(
                "Rate {}: no convergence after {} iterations; best iterate reported",
                result.risk_free_rate, result.iterations
            ));
        }
        rows.push(AllocationOutput::from(&result));
    }

    if rows.iter().all(|row| row.error.is_some()) {
        if let Some(e) = first_error {
            return Err(e);
        }
    }
    Ok((rows, warnings))
}

pub fn run_sweep(args: SweepArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let start = Instant::now();
    let table = args.prices.load()?;
    let stats = build_stats(&table, &args.prices.stats_config())?;
    let config = args.solver.optimizer_config();

    let rates = risk_free_grid(args.from, args.to, args.steps)?;
    let base = max_sharpe(&stats, args.base_rate, &config)?;
    let fixed = fixed_weight_sensitivity(&base, &rates);
    let outcomes = sweep_risk_free_rates(&stats, &rates, &config);

    let mut warnings = Vec::new();
    let rows: Vec<SweepRow> = sensitivity_table(&outcomes)
        .into_iter()
        .zip(fixed)
        .map(|(row, (_, fixed_weight_sharpe))| {
            if let Some(e) = &row.error {
                warnings.push(format!("Rate {}: {}", row.risk_free_rate, e));
            } else if !row.converged {
                warnings.push(format!("Rate {}: did not converge", row.risk_free_rate));
            }
            SweepRow {
                risk_free_rate: row.risk_free_rate,
                sharpe_ratio: row.sharpe_ratio,
                expected_return: row.expected_return,
                volatility: row.volatility,
                converged: row.converged,
                fixed_weight_sharpe,
                weights: row.weights,
                error: row.error,
            }
        })
        .collect();

    let assumptions = serde_json::json!({
        "assets": stats.assets(),
        "base_rate": args.base_rate,
        "base_weights": base.weights,
        "optimizer": config,
    });
    let wrapped = with_metadata(
        "Re-optimized maximum Sharpe portfolio at each risk-free rate",
        &assumptions,
        warnings,
        start.elapsed().as_micros() as u64,
        rows,
    );
    Ok(serde_json::to_value(wrapped)?)
}

pub fn run_frontier(args: FrontierArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let start = Instant::now();
    let table = args.prices.load()?;
    let stats = build_stats(&table, &args.prices.stats_config())?;
    let config = args.solver.optimizer_config();

    let frontier = efficient_frontier(&stats, args.risk_free_rate, args.points, &config)?;
    let warnings = frontier
        .iter()
        .filter(|p| !p.converged)
        .map(|p| format!("Frontier point at return {:.6} did not converge", p.expected_return))
        .collect();

    let assumptions = serde_json::json!({
        "assets": stats.assets(),
        "requested_points": args.points,
        "risk_free_rate": args.risk_free_rate,
    });
    let wrapped = with_metadata(
        "Long-only efficient frontier from minimum variance to the highest-return asset",
        &assumptions,
        warnings,
        start.elapsed().as_micros() as u64,
        frontier,
    );
    Ok(serde_json::to_value(wrapped)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sharpe_alloc_core::optimizer::SolverConfig;

    fn two_assets() -> AnnualizedStats {
        AnnualizedStats::new(
            vec!["AAA".into(), "BBB".into()],
            vec![0.10, 0.15],
            vec![vec![0.04, 0.01], vec![0.01, 0.09]],
        )
        .unwrap()
    }

    #[test]
    fn test_bad_rate_keeps_the_other_scenarios() {
        let stats = two_assets();
        let (rows, warnings) =
            allocation_rows(&stats, &[0.01, f64::NAN], &OptimizerConfig::default(), false)
                .unwrap();

        assert_eq!(rows.len(), 2);
        assert!(rows[0].error.is_none());
        assert!(rows[0].sharpe_ratio.is_some());
        assert_eq!(rows[0].weights.len(), 2);

        assert!(rows[1].sharpe_ratio.is_none());
        assert!(rows[1].weights.is_empty());
        assert!(rows[1].error.as_deref().unwrap().contains("Must be finite"));
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].starts_with("Rate NaN"));
    }

    #[test]
    fn test_every_rate_failing_is_an_error() {
        let stats = two_assets();
        let err = allocation_rows(
            &stats,
            &[f64::NAN, f64::INFINITY],
            &OptimizerConfig::default(),
            false,
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput { .. }));
    }

    #[test]
    fn test_strict_rejects_best_iterate() {
        let stats = two_assets();
        let config = OptimizerConfig::default().with_solver(SolverConfig {
            max_iterations: 2,
            tolerance: 0.0,
            stationarity_tolerance: 0.0,
        });
        let err = allocation_rows(&stats, &[0.01], &config, true).unwrap_err();
        assert!(matches!(err, EngineError::NotConverged { .. }));
    }
}

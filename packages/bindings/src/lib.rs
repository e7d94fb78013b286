use napi::Result as NapiResult;
use napi_derive::napi;
use serde::Deserialize;

use sharpe_alloc_core::engine::{self, AnalysisRequest, EngineConfig};
use sharpe_alloc_core::optimizer::{self, OptimizerConfig};
use sharpe_alloc_core::prices::PriceTable;
use sharpe_alloc_core::returns::{self, AnnualizedStats, StatsConfig};
use sharpe_alloc_core::Rate;

/// Convert any Display error into a napi::Error.
fn to_napi_error(e: impl std::fmt::Display) -> napi::Error {
    napi::Error::from_reason(e.to_string())
}

fn default_rate() -> Rate {
    0.01
}

fn default_points() -> usize {
    20
}

#[derive(Deserialize)]
struct StatsInput {
    prices: PriceTable,
    #[serde(default)]
    config: StatsConfig,
}

#[derive(Deserialize)]
struct OptimizeInput {
    stats: AnnualizedStats,
    risk_free_rates: Vec<Rate>,
    #[serde(default)]
    config: OptimizerConfig,
}

#[derive(Deserialize)]
struct PricesOptimizeInput {
    prices: PriceTable,
    risk_free_rates: Vec<Rate>,
    #[serde(default)]
    config: EngineConfig,
}

#[derive(Deserialize)]
struct MetricsInput {
    weights: Vec<f64>,
    stats: AnnualizedStats,
    #[serde(default)]
    risk_free_rate: Rate,
}

#[derive(Deserialize)]
struct FrontierInput {
    stats: AnnualizedStats,
    #[serde(default = "default_rate")]
    risk_free_rate: Rate,
    #[serde(default = "default_points")]
    points: usize,
    #[serde(default)]
    config: OptimizerConfig,
}

#[derive(Deserialize)]
struct AnalyzeInput {
    prices: PriceTable,
    #[serde(default)]
    request: AnalysisRequest,
}

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

#[napi]
pub fn annualized_stats(input_json: String) -> NapiResult<String> {
    let input: StatsInput = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = returns::build_stats(&input.prices, &input.config).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[napi]
pub fn portfolio_metrics(input_json: String) -> NapiResult<String> {
    let input: MetricsInput = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = engine::portfolio_metrics(&input.weights, &input.stats, input.risk_free_rate)
        .map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Optimization
// ---------------------------------------------------------------------------

/// Maximum Sharpe portfolio at each rate, from precomputed statistics.
#[napi]
pub fn optimize_portfolio(input_json: String) -> NapiResult<String> {
    let input: OptimizeInput = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output =
        optimizer::sweep_risk_free_rates(&input.stats, &input.risk_free_rates, &input.config);
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[napi]
pub fn optimize_from_prices(input_json: String) -> NapiResult<String> {
    let input: PricesOptimizeInput = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = engine::optimize(&input.prices, &input.risk_free_rates, &input.config)
        .map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[napi]
pub fn efficient_frontier(input_json: String) -> NapiResult<String> {
    let input: FrontierInput = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = optimizer::efficient_frontier(
        &input.stats,
        input.risk_free_rate,
        input.points,
        &input.config,
    )
    .map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Full analysis
// ---------------------------------------------------------------------------

#[napi]
pub fn analyze_portfolio(input_json: String) -> NapiResult<String> {
    let input: AnalyzeInput = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = engine::analyze(&input.prices, &input.request).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

//! Entry points that run the full pipeline from prices to allocations.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::info;

use crate::allocation::{allocate_capital, CapitalSlice};
use crate::error::EngineError;
use crate::linalg::equal_weights;
use crate::metrics::{concentration, risk_contributions, PortfolioMetrics, RiskContribution};
use crate::optimizer::{
    efficient_frontier, fixed_weight_sensitivity, max_sharpe, sensitivity_table,
    sweep_risk_free_rates, FrontierPoint, OptimizationResult, OptimizerConfig, ScenarioOutcome,
    SensitivityRow,
};
use crate::prices::{PriceRequest, PriceSource, PriceTable};
use crate::returns::{annualized_stats, build_stats, daily_returns, AnnualizedStats, StatsConfig};
use crate::risk::{
    average_var, cumulative_performance, historical_var, portfolio_returns, AssetVar,
    DEFAULT_VAR_LEVEL,
};
use crate::types::{with_metadata, ComputationOutput, Money, Rate};
use crate::EngineResult;

pub use crate::metrics::portfolio_metrics;

/// Single weight above which a position is flagged as concentrated.
const CONCENTRATION_LIMIT: f64 = 0.40;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub stats: StatsConfig,
    pub optimizer: OptimizerConfig,
}

impl EngineConfig {
    #[must_use]
    pub fn with_stats(mut self, stats: StatsConfig) -> Self {
        self.stats = stats;
        self
    }

    #[must_use]
    pub fn with_optimizer(mut self, optimizer: OptimizerConfig) -> Self {
        self.optimizer = optimizer;
        self
    }
}

/// Fetch prices for `request` and trim them to the requested assets and dates.
pub fn fetch_prices(source: &dyn PriceSource, request: &PriceRequest) -> EngineResult<PriceTable> {
    if request.assets.is_empty() {
        return Err(EngineError::invalid("assets", "At least one asset required"));
    }
    if request.end < request.start {
        return Err(EngineError::InsufficientData(format!(
            "Empty date range: end {} precedes start {}",
            request.end, request.start
        )));
    }

    let table = source
        .fetch(request)?
        .select(&request.assets)?
        .between(Some(request.start), Some(request.end));

    if table.n_observations() < 2 {
        return Err(EngineError::InsufficientData(format!(
            "{} price observation(s) between {} and {}",
            table.n_observations(),
            request.start,
            request.end
        )));
    }
    Ok(table)
}

/// Build statistics once and find the maximum-Sharpe portfolio at each rate.
pub fn optimize(
    prices: &PriceTable,
    risk_free_rates: &[Rate],
    config: &EngineConfig,
) -> EngineResult<Vec<ScenarioOutcome>> {
    if risk_free_rates.is_empty() {
        return Err(EngineError::invalid(
            "risk_free_rates",
            "At least one rate required",
        ));
    }
    let stats = build_stats(prices, &config.stats)?;
    info!(
        assets = stats.n_assets(),
        observations = prices.n_observations(),
        scenarios = risk_free_rates.len(),
        "optimizing"
    );
    Ok(sweep_risk_free_rates(&stats, risk_free_rates, &config.optimizer))
}

// ---------------------------------------------------------------------------
// Full analysis
// ---------------------------------------------------------------------------

/// Parameters of a full analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisRequest {
    /// Rate for the headline optimal portfolio.
    pub risk_free_rate: Rate,
    /// Rates for the re-optimizing sensitivity sweep; empty skips it.
    pub risk_free_rates: Vec<Rate>,
    pub initial_capital: Option<Money>,
    pub var_level: f64,
    /// Number of frontier points; 0 skips the frontier.
    pub frontier_points: usize,
    pub config: EngineConfig,
}

impl Default for AnalysisRequest {
    fn default() -> Self {
        Self {
            risk_free_rate: 0.01,
            risk_free_rates: Vec::new(),
            initial_capital: None,
            var_level: DEFAULT_VAR_LEVEL,
            frontier_points: 20,
            config: EngineConfig::default(),
        }
    }
}

/// Portfolio value on one date, starting from 1.0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformancePoint {
    pub date: NaiveDate,
    pub value: f64,
}

/// Sharpe ratio of the headline allocation held fixed at another rate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FixedWeightSharpe {
    pub risk_free_rate: Rate,
    pub sharpe_ratio: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub stats: AnnualizedStats,
    pub correlation: Vec<Vec<f64>>,
    pub optimal: OptimizationResult,
    pub equal_weight: PortfolioMetrics,
    pub risk_contributions: Vec<RiskContribution>,
    /// Herfindahl index of the optimal weights.
    pub concentration: f64,
    pub sensitivity: Vec<SensitivityRow>,
    pub fixed_weight_sensitivity: Vec<FixedWeightSharpe>,
    pub frontier: Vec<FrontierPoint>,
    pub asset_var: Vec<AssetVar>,
    pub average_var: Option<f64>,
    /// One-day Gaussian VaR of the optimal portfolio.
    pub parametric_var: Option<f64>,
    pub cumulative_performance: Vec<PerformancePoint>,
    pub allocation: Option<Vec<CapitalSlice>>,
}

/// Run every analysis on one price table.
pub fn analyze(
    prices: &PriceTable,
    request: &AnalysisRequest,
) -> EngineResult<ComputationOutput<AnalysisReport>> {
    let start = Instant::now();
    let config = &request.config;
    let mut warnings: Vec<String> = Vec::new();

    let returns = daily_returns(prices, config.stats.convention)?;
    let stats = annualized_stats(&returns, config.stats.annualization_factor)?;
    let n = stats.n_assets();

    for (asset, vol) in stats.assets().iter().zip(stats.volatilities()) {
        if vol <= 0.0 {
            warnings.push(format!("Asset {} has zero variance over the sample", asset));
        }
    }

    let optimal = max_sharpe(&stats, request.risk_free_rate, &config.optimizer)?;
    if !optimal.is_converged() {
        warnings.push(format!(
            "Optimal portfolio did not converge after {} iterations; best iterate reported",
            optimal.iterations
        ));
    }
    if optimal.metrics.sharpe_ratio < 0.0 {
        warnings.push(format!(
            "Optimal Sharpe ratio is negative ({:.4}): no asset mix beats the risk-free rate",
            optimal.metrics.sharpe_ratio
        ));
    }
    for (asset, w) in optimal.assets.iter().zip(&optimal.weights) {
        if *w > CONCENTRATION_LIMIT {
            warnings.push(format!(
                "Concentrated position: {} at {:.1}% of the portfolio",
                asset,
                w * 100.0
            ));
        }
    }

    let equal_weight = portfolio_metrics(&equal_weights(n), &stats, request.risk_free_rate)?;

    let outcomes = sweep_risk_free_rates(&stats, &request.risk_free_rates, &config.optimizer);
    for o in &outcomes {
        match &o.outcome {
            Ok(r) if !r.is_converged() => warnings.push(format!(
                "Scenario at risk-free rate {} did not converge",
                o.risk_free_rate
            )),
            Err(e) => warnings.push(format!(
                "Scenario at risk-free rate {} failed: {}",
                o.risk_free_rate, e
            )),
            _ => {}
        }
    }

    let frontier = if request.frontier_points == 0 {
        Vec::new()
    } else {
        match efficient_frontier(
            &stats,
            request.risk_free_rate,
            request.frontier_points,
            &config.optimizer,
        ) {
            Ok(points) => points,
            Err(e) => {
                warnings.push(format!("Efficient frontier unavailable: {}", e));
                Vec::new()
            }
        }
    };

    let asset_var = historical_var(&returns, request.var_level)?;
    let headline_var = average_var(&asset_var);
    let parametric_var = gaussian_var(&optimal.metrics, request, &mut warnings);

    let daily = portfolio_returns(&returns, &optimal.weights)?;
    let cumulative = returns
        .dates()
        .iter()
        .zip(cumulative_performance(&daily))
        .map(|(date, value)| PerformancePoint { date: *date, value })
        .collect();

    let allocation = request
        .initial_capital
        .map(|capital| allocate_capital(&optimal.assets, &optimal.weights, capital))
        .transpose()?;

    let fixed = fixed_weight_sensitivity(&optimal, &request.risk_free_rates)
        .into_iter()
        .map(|(risk_free_rate, sharpe_ratio)| FixedWeightSharpe {
            risk_free_rate,
            sharpe_ratio,
        })
        .collect();

    let report = AnalysisReport {
        correlation: stats.correlation(),
        risk_contributions: risk_contributions(&optimal.weights, &stats)?,
        concentration: concentration(&optimal.weights),
        sensitivity: sensitivity_table(&outcomes),
        fixed_weight_sensitivity: fixed,
        frontier,
        asset_var,
        average_var: headline_var,
        parametric_var,
        cumulative_performance: cumulative,
        allocation,
        equal_weight,
        optimal,
        stats,
    };

    info!(
        assets = n,
        sharpe = report.optimal.metrics.sharpe_ratio,
        scenarios = report.sensitivity.len(),
        warnings = warnings.len(),
        "analysis complete"
    );

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Maximum Sharpe ratio allocation (long-only, fully invested, projected gradient)",
        &serde_json::json!({
            "n_assets": n,
            "observations": prices.n_observations(),
            "first_date": prices.dates().first(),
            "last_date": prices.dates().last(),
            "risk_free_rate": request.risk_free_rate,
            "convention": config.stats.convention,
            "annualization_factor": config.stats.annualization_factor,
            "var_level": request.var_level,
            "solver": config.optimizer.solver,
        }),
        warnings,
        elapsed,
        report,
    ))
}

#[cfg(feature = "risk")]
fn gaussian_var(
    metrics: &PortfolioMetrics,
    request: &AnalysisRequest,
    warnings: &mut Vec<String>,
) -> Option<f64> {
    match crate::risk::parametric_var(
        metrics,
        request.var_level,
        1,
        request.config.stats.annualization_factor,
    ) {
        Ok(v) => Some(v),
        Err(e) => {
            warnings.push(format!("Parametric VaR unavailable: {}", e));
            None
        }
    }
}

#[cfg(not(feature = "risk"))]
fn gaussian_var(
    _metrics: &PortfolioMetrics,
    _request: &AnalysisRequest,
    _warnings: &mut Vec<String>,
) -> Option<f64> {
    None
}

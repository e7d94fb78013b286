use clap::Args;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Instant;

use sharpe_alloc_core::metrics::{
    check_feasible, concentration, portfolio_metrics, risk_contributions, RiskContribution,
};
use sharpe_alloc_core::returns::AnnualizedStats;
use sharpe_alloc_core::with_metadata;

use crate::input;

#[derive(Args)]
pub struct MetricsArgs {
    /// JSON file with `weights`, `stats` and `risk_free_rate`
    #[arg(long)]
    pub input: Option<String>,
}

#[derive(Deserialize)]
struct MetricsInput {
    weights: Vec<f64>,
    stats: AnnualizedStats,
    #[serde(default)]
    risk_free_rate: f64,
}

#[derive(Serialize)]
struct MetricsOutput {
    expected_return: f64,
    volatility: f64,
    sharpe_ratio: f64,
    feasible: bool,
    concentration: f64,
    risk_contributions: Vec<RiskContribution>,
}

pub fn run_metrics(args: MetricsArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let start = Instant::now();
    let metrics_input: MetricsInput = if let Some(ref path) = args.input {
        input::file::read_json(path)?
    } else if let Some(data) = input::stdin::read_stdin()? {
        data
    } else {
        return Err("--input <file.json> or stdin required for portfolio metrics".into());
    };

    let m = portfolio_metrics(
        &metrics_input.weights,
        &metrics_input.stats,
        metrics_input.risk_free_rate,
    )?;

    let mut warnings = Vec::new();
    let feasible = match check_feasible(&metrics_input.weights) {
        Ok(()) => true,
        Err(e) => {
            warnings.push(e.to_string());
            false
        }
    };

    let output = MetricsOutput {
        expected_return: m.expected_return,
        volatility: m.volatility,
        sharpe_ratio: m.sharpe_ratio,
        feasible,
        concentration: concentration(&metrics_input.weights),
        risk_contributions: risk_contributions(&metrics_input.weights, &metrics_input.stats)?,
    };
    let assumptions = serde_json::json!({
        "assets": metrics_input.stats.assets(),
        "risk_free_rate": metrics_input.risk_free_rate,
    });
    let wrapped = with_metadata(
        "Portfolio return w.mu, volatility sqrt(w'Sigma w), Sharpe (return - rf) / volatility",
        &assumptions,
        warnings,
        start.elapsed().as_micros() as u64,
        output,
    );
    Ok(serde_json::to_value(wrapped)?)
}

use clap::Args;
use rust_decimal::Decimal;
use serde_json::Value;
use std::path::Path;
use tracing::info;

use sharpe_alloc_core::engine::analyze;

use crate::config::RunConfig;
use crate::input;

#[derive(Args)]
pub struct AnalyzeArgs {
    /// Run configuration (YAML or JSON)
    #[arg(long)]
    pub config: String,

    /// Override the capital to split across the optimal weights
    #[arg(long)]
    pub capital: Option<Decimal>,

    /// Override the headline risk-free rate
    #[arg(long)]
    pub risk_free_rate: Option<f64>,

    /// Skip the risk-free-rate sweep
    #[arg(long)]
    pub no_sweep: bool,
}

pub fn run_analyze(args: AnalyzeArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut cfg: RunConfig = input::file::read_config(&args.config)?;
    if let Some(capital) = args.capital {
        cfg.initial_capital = Some(capital);
    }
    if let Some(rate) = args.risk_free_rate {
        cfg.risk_free_rate = rate;
    }
    if args.no_sweep {
        cfg.risk_free_grid = None;
    }

    let prices_path = cfg.prices_path(Path::new(&args.config))?;
    info!(config = %args.config, prices = %prices_path, "loading run configuration");

    let table = input::prices::load_prices(
        &prices_path,
        cfg.align,
        cfg.assets.as_deref(),
        cfg.start,
        cfg.end,
    )?;
    let report = analyze(&table, &cfg.analysis_request()?)?;
    Ok(serde_json::to_value(report)?)
}

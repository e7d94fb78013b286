pub mod analyze;
pub mod metrics;
pub mod optimize;

use chrono::NaiveDate;
use clap::Args;

use sharpe_alloc_core::engine::EngineConfig;
use sharpe_alloc_core::optimizer::{OptimizerConfig, SolverConfig};
use sharpe_alloc_core::prices::{AlignPolicy, PriceTable};
use sharpe_alloc_core::returns::{ReturnConvention, StatsConfig};
use sharpe_alloc_core::TRADING_DAYS_PER_YEAR;

use crate::input;

/// Where prices come from and how they become statistics.
#[derive(Args, Debug, Clone)]
pub struct PriceArgs {
    /// CSV with a `date` column followed by one close-price column per asset
    #[arg(long)]
    pub prices: String,

    /// Restrict to these assets (comma separated)
    #[arg(long, value_delimiter = ',')]
    pub assets: Option<Vec<String>>,

    /// First date to keep (YYYY-MM-DD)
    #[arg(long)]
    pub start: Option<NaiveDate>,

    /// Last date to keep (YYYY-MM-DD)
    #[arg(long)]
    pub end: Option<NaiveDate>,

    /// Drop dates missing any asset instead of carrying prices forward
    #[arg(long)]
    pub drop_incomplete: bool,

    /// Use log returns instead of simple returns
    #[arg(long)]
    pub log_returns: bool,

    /// Periods per year used to annualize daily statistics
    #[arg(long, default_value_t = TRADING_DAYS_PER_YEAR)]
    pub annualization_factor: f64,
}

impl PriceArgs {
    pub fn load(&self) -> Result<PriceTable, Box<dyn std::error::Error>> {
        let policy = if self.drop_incomplete {
            AlignPolicy::DropIncomplete
        } else {
            AlignPolicy::ForwardFill
        };
        input::prices::load_prices(
            &self.prices,
            policy,
            self.assets.as_deref(),
            self.start,
            self.end,
        )
    }

    pub fn stats_config(&self) -> StatsConfig {
        let convention = if self.log_returns {
            ReturnConvention::Log
        } else {
            ReturnConvention::Simple
        };
        StatsConfig::default()
            .with_convention(convention)
            .with_annualization_factor(self.annualization_factor)
    }
}

#[derive(Args, Debug, Clone)]
pub struct SolverArgs {
    /// Iteration cap for each optimization
    #[arg(long)]
    pub max_iterations: Option<u32>,

    /// Run scenarios one after another
    #[arg(long)]
    pub sequential: bool,
}

impl SolverArgs {
    pub fn optimizer_config(&self) -> OptimizerConfig {
        let mut solver = SolverConfig::default();
        if let Some(n) = self.max_iterations {
            solver.max_iterations = n;
        }
        OptimizerConfig::default()
            .with_solver(solver)
            .with_parallel(!self.sequential)
    }
}

pub fn engine_config(prices: &PriceArgs, solver: &SolverArgs) -> EngineConfig {
    EngineConfig::default()
        .with_stats(prices.stats_config())
        .with_optimizer(solver.optimizer_config())
}

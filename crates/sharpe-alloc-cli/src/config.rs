use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;

use sharpe_alloc_core::engine::{AnalysisRequest, EngineConfig};
use sharpe_alloc_core::optimizer::{risk_free_grid, OptimizerConfig, SolverConfig};
use sharpe_alloc_core::prices::AlignPolicy;
use sharpe_alloc_core::returns::{ReturnConvention, StatsConfig};
use sharpe_alloc_core::TRADING_DAYS_PER_YEAR;

/// Inclusive, evenly spaced risk-free-rate scenarios.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateGrid {
    pub from: f64,
    pub to: f64,
    pub steps: usize,
}

impl Default for RateGrid {
    fn default() -> Self {
        Self {
            from: 0.0,
            to: 0.05,
            steps: 11,
        }
    }
}

/// Everything `salloc analyze` needs, loaded from YAML or JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Price CSV; relative paths resolve against the config file's directory.
    pub prices: String,
    pub assets: Option<Vec<String>>,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub align: AlignPolicy,
    pub initial_capital: Option<Decimal>,
    pub risk_free_rate: f64,
    pub risk_free_grid: Option<RateGrid>,
    pub convention: ReturnConvention,
    pub annualization_factor: f64,
    pub var_level: f64,
    pub frontier_points: usize,
    pub solver: SolverConfig,
    pub parallel: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            prices: String::new(),
            assets: None,
            start: None,
            end: None,
            align: AlignPolicy::default(),
            initial_capital: None,
            risk_free_rate: 0.01,
            risk_free_grid: Some(RateGrid::default()),
            convention: ReturnConvention::default(),
            annualization_factor: TRADING_DAYS_PER_YEAR,
            var_level: 0.05,
            frontier_points: 20,
            solver: SolverConfig::default(),
            parallel: true,
        }
    }
}

impl RunConfig {
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig::default()
            .with_stats(
                StatsConfig::default()
                    .with_convention(self.convention)
                    .with_annualization_factor(self.annualization_factor),
            )
            .with_optimizer(
                OptimizerConfig::default()
                    .with_solver(self.solver)
                    .with_parallel(self.parallel),
            )
    }

    pub fn analysis_request(&self) -> Result<AnalysisRequest, Box<dyn std::error::Error>> {
        let risk_free_rates = match self.risk_free_grid {
            Some(g) => risk_free_grid(g.from, g.to, g.steps)?,
            None => Vec::new(),
        };
        Ok(AnalysisRequest {
            risk_free_rate: self.risk_free_rate,
            risk_free_rates,
            initial_capital: self.initial_capital,
            var_level: self.var_level,
            frontier_points: self.frontier_points,
            config: self.engine_config(),
        })
    }

    /// Price file path, resolved against `config_path`'s directory when relative.
    pub fn prices_path(&self, config_path: &Path) -> Result<String, Box<dyn std::error::Error>> {
        if self.prices.is_empty() {
            return Err("Config must name a 'prices' CSV file".into());
        }
        let p = Path::new(&self.prices);
        if p.is_absolute() {
            return Ok(self.prices.clone());
        }
        let base = config_path.parent().unwrap_or_else(|| Path::new("."));
        Ok(base.join(p).to_string_lossy().into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = "
prices: data/prices.csv
assets: [AAPL, MSFT, GOOGL]
start: 2023-01-01
initial_capital: 25000
risk_free_rate: 0.02
risk_free_grid:
  from: 0.0
  to: 0.04
  steps: 5
convention: log
solver:
  max_iterations: 500
";

    #[test]
    fn test_yaml_run_config() {
        let cfg: RunConfig = serde_yaml::from_str(YAML).unwrap();
        assert_eq!(cfg.assets.as_ref().map(|a| a.len()), Some(3));
        assert_eq!(cfg.start, NaiveDate::from_ymd_opt(2023, 1, 1));
        assert_eq!(cfg.initial_capital, Some(Decimal::from(25_000)));
        assert_eq!(cfg.convention, ReturnConvention::Log);
        assert_eq!(cfg.solver.max_iterations, 500);
        // untouched fields keep their defaults
        assert_eq!(cfg.frontier_points, 20);
        assert_eq!(cfg.solver.stationarity_tolerance, 1e-10);

        let request = cfg.analysis_request().unwrap();
        assert_eq!(request.risk_free_rates.len(), 5);
        assert_eq!(request.config.stats.convention, ReturnConvention::Log);
    }

    #[test]
    fn test_prices_path_is_relative_to_config() {
        let cfg: RunConfig = serde_yaml::from_str(YAML).unwrap();
        let path = cfg.prices_path(Path::new("/srv/runs/base.yaml")).unwrap();
        assert_eq!(path, "/srv/runs/data/prices.csv");
        assert!(RunConfig::default().prices_path(Path::new("x.yaml")).is_err());
    }
}

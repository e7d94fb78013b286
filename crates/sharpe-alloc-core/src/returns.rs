use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::debug;

use crate::error::EngineError;
use crate::linalg::{mat_vec_multiply, quad_form};
use crate::prices::PriceTable;
use crate::types::{with_metadata, AssetId, ComputationOutput, TRADING_DAYS_PER_YEAR};
use crate::EngineResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// How a daily return is derived from consecutive prices.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnConvention {
    /// `p[t] / p[t-1] - 1`
    #[default]
    Simple,
    /// `ln(p[t] / p[t-1])`
    Log,
}

/// Settings for turning prices into annualized statistics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    pub convention: ReturnConvention,
    /// Periods per year (252 for daily data).
    pub annualization_factor: f64,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            convention: ReturnConvention::Simple,
            annualization_factor: TRADING_DAYS_PER_YEAR,
        }
    }
}

impl StatsConfig {
    #[must_use]
    pub fn with_convention(mut self, convention: ReturnConvention) -> Self {
        self.convention = convention;
        self
    }

    #[must_use]
    pub fn with_annualization_factor(mut self, factor: f64) -> Self {
        self.annualization_factor = factor;
        self
    }
}

/// Per-period returns, `periods × assets`, indexed by the later date of each pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReturnSeries {
    assets: Vec<AssetId>,
    dates: Vec<NaiveDate>,
    convention: ReturnConvention,
    /// Row-major.
    values: Vec<f64>,
}

/// Annualized mean-return vector and covariance matrix.
///
/// Immutable once built; shared read-only by every optimization run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "AnnualizedStatsData", into = "AnnualizedStatsData")]
pub struct AnnualizedStats {
    assets: Vec<AssetId>,
    mean: Vec<f64>,
    covariance: Vec<Vec<f64>>,
}

/// Serialized shape of [`AnnualizedStats`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnualizedStatsData {
    pub assets: Vec<AssetId>,
    pub expected_returns: Vec<f64>,
    pub covariance_matrix: Vec<Vec<f64>>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Daily returns from aligned prices. Needs at least two observations.
pub fn daily_returns(prices: &PriceTable, convention: ReturnConvention) -> EngineResult<ReturnSeries> {
    let t_obs = prices.n_observations();
    if t_obs < 2 {
        return Err(EngineError::InsufficientData(format!(
            "At least 2 aligned price observations required, got {} for {} assets",
            t_obs,
            prices.n_assets()
        )));
    }

    let n = prices.n_assets();
    let mut values = Vec::with_capacity((t_obs - 1) * n);
    for t in 1..t_obs {
        let prev = prices.row(t - 1);
        let cur = prices.row(t);
        values.extend(prev.iter().zip(cur).map(|(p0, p1)| match convention {
            ReturnConvention::Simple => p1 / p0 - 1.0,
            ReturnConvention::Log => (p1 / p0).ln(),
        }));
    }

    Ok(ReturnSeries {
        assets: prices.assets().to_vec(),
        dates: prices.dates()[1..].to_vec(),
        convention,
        values,
    })
}

/// Mean and sample covariance (`T - 1` denominator) of the returns, each
/// scaled by `annualization_factor`.
pub fn annualized_stats(
    returns: &ReturnSeries,
    annualization_factor: f64,
) -> EngineResult<AnnualizedStats> {
    if !annualization_factor.is_finite() || annualization_factor <= 0.0 {
        return Err(EngineError::invalid(
            "annualization_factor",
            format!("Must be finite and positive, got {}", annualization_factor),
        ));
    }

    let t = returns.n_periods();
    let n = returns.n_assets();
    if t < 2 {
        return Err(EngineError::InsufficientData(format!(
            "At least 2 return observations required for covariance, got {} ({} assets{})",
            t,
            n,
            returns
                .dates
                .first()
                .map(|d| format!(", from {}", d))
                .unwrap_or_default()
        )));
    }

    let t_f = t as f64;
    let daily_mean: Vec<f64> = (0..n)
        .map(|j| returns.column(j).sum::<f64>() / t_f)
        .collect();

    let mut cov = vec![vec![0.0; n]; n];
    for row in returns.rows() {
        for i in 0..n {
            let di = row[i] - daily_mean[i];
            for j in i..n {
                cov[i][j] += di * (row[j] - daily_mean[j]);
            }
        }
    }
    let scale = annualization_factor / (t_f - 1.0);
    for i in 0..n {
        for j in i..n {
            let v = cov[i][j] * scale;
            cov[i][j] = v;
            cov[j][i] = v;
        }
    }

    let mean = daily_mean.iter().map(|m| m * annualization_factor).collect();

    debug!(assets = n, periods = t, factor = annualization_factor, "annualized return statistics");

    AnnualizedStats::new(returns.assets.clone(), mean, cov)
}

/// Prices straight to annualized statistics.
pub fn build_stats(prices: &PriceTable, config: &StatsConfig) -> EngineResult<AnnualizedStats> {
    let returns = daily_returns(prices, config.convention)?;
    annualized_stats(&returns, config.annualization_factor)
}

/// [`build_stats`] wrapped in the standard output envelope.
pub fn calculate_stats(
    prices: &PriceTable,
    config: &StatsConfig,
) -> EngineResult<ComputationOutput<AnnualizedStats>> {
    let start = Instant::now();
    let stats = build_stats(prices, config)?;

    let mut warnings = Vec::new();
    for (asset, vol) in stats.assets().iter().zip(stats.volatilities()) {
        if vol <= 0.0 {
            warnings.push(format!("Asset {} has zero variance over the sample", asset));
        }
    }

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Annualized mean returns and sample covariance from daily prices",
        &serde_json::json!({
            "n_assets": prices.n_assets(),
            "observations": prices.n_observations(),
            "convention": config.convention,
            "annualization_factor": config.annualization_factor,
        }),
        warnings,
        elapsed,
        stats,
    ))
}

// ---------------------------------------------------------------------------
// ReturnSeries
// ---------------------------------------------------------------------------

impl ReturnSeries {
    pub fn assets(&self) -> &[AssetId] {
        &self.assets
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn convention(&self) -> ReturnConvention {
        self.convention
    }

    pub fn n_assets(&self) -> usize {
        self.assets.len()
    }

    pub fn n_periods(&self) -> usize {
        self.dates.len()
    }

    pub fn row(&self, t: usize) -> &[f64] {
        let n = self.assets.len();
        &self.values[t * n..(t + 1) * n]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f64]> + '_ {
        self.values.chunks_exact(self.assets.len().max(1))
    }

    pub fn column(&self, j: usize) -> impl Iterator<Item = f64> + '_ {
        self.values
            .iter()
            .skip(j)
            .step_by(self.assets.len().max(1))
            .copied()
    }
}

// ---------------------------------------------------------------------------
// AnnualizedStats
// ---------------------------------------------------------------------------

impl AnnualizedStats {
    /// Validated constructor for externally supplied statistics.
    pub fn new(
        assets: Vec<AssetId>,
        mean: Vec<f64>,
        covariance: Vec<Vec<f64>>,
    ) -> EngineResult<Self> {
        let n = assets.len();
        if mean.len() != n {
            return Err(EngineError::dimension("expected_returns", n, mean.len()));
        }
        validate_covariance_matrix(&covariance, n)?;
        if let Some((i, m)) = mean.iter().enumerate().find(|(_, m)| !m.is_finite()) {
            return Err(EngineError::invalid(
                format!("expected_returns[{}]", i),
                format!("Must be finite, got {}", m),
            ));
        }
        Ok(Self {
            assets,
            mean,
            covariance,
        })
    }

    pub fn assets(&self) -> &[AssetId] {
        &self.assets
    }

    pub fn n_assets(&self) -> usize {
        self.assets.len()
    }

    /// Annualized mean return per asset.
    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    pub fn covariance(&self) -> &[Vec<f64>] {
        &self.covariance
    }

    /// Annualized volatility per asset.
    pub fn volatilities(&self) -> Vec<f64> {
        (0..self.n_assets())
            .map(|i| self.covariance[i][i].max(0.0).sqrt())
            .collect()
    }

    /// Correlation matrix; zero-variance assets get zero off-diagonal entries.
    pub fn correlation(&self) -> Vec<Vec<f64>> {
        let vols = self.volatilities();
        let n = self.n_assets();
        (0..n)
            .map(|i| {
                (0..n)
                    .map(|j| {
                        if i == j {
                            1.0
                        } else if vols[i] > 0.0 && vols[j] > 0.0 {
                            self.covariance[i][j] / (vols[i] * vols[j])
                        } else {
                            0.0
                        }
                    })
                    .collect()
            })
            .collect()
    }

    /// `Sigma * w`
    pub(crate) fn cov_times(&self, w: &[f64]) -> Vec<f64> {
        mat_vec_multiply(&self.covariance, w)
    }

    /// `w' * Sigma * w`
    pub(crate) fn variance_of(&self, w: &[f64]) -> f64 {
        quad_form(&self.covariance, w)
    }
}

impl TryFrom<AnnualizedStatsData> for AnnualizedStats {
    type Error = EngineError;

    fn try_from(data: AnnualizedStatsData) -> Result<Self, Self::Error> {
        AnnualizedStats::new(data.assets, data.expected_returns, data.covariance_matrix)
    }
}

impl From<AnnualizedStats> for AnnualizedStatsData {
    fn from(stats: AnnualizedStats) -> Self {
        AnnualizedStatsData {
            assets: stats.assets,
            expected_returns: stats.mean,
            covariance_matrix: stats.covariance,
        }
    }
}

#[allow(clippy::needless_range_loop)]
fn validate_covariance_matrix(cov: &[Vec<f64>], n: usize) -> EngineResult<()> {
    if cov.len() != n {
        return Err(EngineError::dimension("covariance_matrix rows", n, cov.len()));
    }
    for (i, row) in cov.iter().enumerate() {
        if row.len() != n {
            return Err(EngineError::dimension(
                format!("covariance_matrix row {}", i),
                n,
                row.len(),
            ));
        }
        if let Some(v) = row.iter().find(|v| !v.is_finite()) {
            return Err(EngineError::invalid(
                "covariance_matrix",
                format!("Row {} contains non-finite value {}", i, v),
            ));
        }
    }
    for i in 0..n {
        if cov[i][i] < 0.0 {
            return Err(EngineError::invalid(
                "covariance_matrix",
                format!("Negative variance on diagonal [{},{}]={}", i, i, cov[i][i]),
            ));
        }
        for j in (i + 1)..n {
            let scale = cov[i][j].abs().max(cov[j][i].abs()).max(1.0);
            if (cov[i][j] - cov[j][i]).abs() > 1e-10 * scale {
                return Err(EngineError::invalid(
                    "covariance_matrix",
                    format!(
                        "Not symmetric: [{},{}]={} != [{},{}]={}",
                        i, j, cov[i][j], j, i, cov[j][i]
                    ),
                ));
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

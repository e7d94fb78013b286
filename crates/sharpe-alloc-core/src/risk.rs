//! Downside-risk and performance series for a chosen allocation.
//!
//! Value-at-Risk figures are expressed as returns: a 5% VaR of `-0.031` means
//! one day in twenty is expected to lose at least 3.1%.

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::linalg::vec_dot;
use crate::returns::{ReturnConvention, ReturnSeries};
use crate::types::AssetId;
use crate::EngineResult;

#[cfg(feature = "risk")]
use crate::metrics::PortfolioMetrics;
#[cfg(feature = "risk")]
use statrs::distribution::{ContinuousCDF, Normal};

/// Default tail level for VaR.
pub const DEFAULT_VAR_LEVEL: f64 = 0.05;

/// Historical VaR of a single asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetVar {
    pub asset: AssetId,
    pub level: f64,
    /// Daily return quantile at `level`.
    pub var: f64,
}

fn check_level(level: f64) -> EngineResult<()> {
    if !(level > 0.0 && level < 1.0) {
        return Err(EngineError::invalid(
            "var_level",
            format!("Must lie strictly between 0 and 1, got {}", level),
        ));
    }
    Ok(())
}

/// Empirical quantile of each asset's daily returns.
///
/// Interpolates linearly between order statistics, so the quantile of `T`
/// observations at level `q` sits at rank `q (T - 1)`.
pub fn historical_var(returns: &ReturnSeries, level: f64) -> EngineResult<Vec<AssetVar>> {
    check_level(level)?;
    if returns.n_periods() == 0 {
        return Err(EngineError::InsufficientData(
            "Historical VaR needs at least one return".into(),
        ));
    }

    Ok(returns
        .assets()
        .iter()
        .enumerate()
        .map(|(j, asset)| {
            let mut sorted: Vec<f64> = returns.column(j).collect();
            sorted.sort_by(f64::total_cmp);
            AssetVar {
                asset: asset.clone(),
                level,
                var: quantile_sorted(&sorted, level),
            }
        })
        .collect())
}

/// Cross-asset mean of per-asset VaR, the single headline figure.
pub fn average_var(vars: &[AssetVar]) -> Option<f64> {
    if vars.is_empty() {
        return None;
    }
    Some(vars.iter().map(|v| v.var).sum::<f64>() / vars.len() as f64)
}

fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = q * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        sorted[lower]
    } else {
        let frac = rank - lower as f64;
        sorted[lower] * (1.0 - frac) + sorted[upper] * frac
    }
}

/// Daily simple returns of a fixed-weight portfolio.
///
/// Log returns are converted to simple returns before weighting.
pub fn portfolio_returns(returns: &ReturnSeries, weights: &[f64]) -> EngineResult<Vec<f64>> {
    if weights.len() != returns.n_assets() {
        return Err(EngineError::dimension(
            "weights",
            returns.n_assets(),
            weights.len(),
        ));
    }

    Ok(match returns.convention() {
        ReturnConvention::Simple => returns.rows().map(|row| vec_dot(row, weights)).collect(),
        ReturnConvention::Log => returns
            .rows()
            .map(|row| {
                row.iter()
                    .zip(weights)
                    .map(|(r, w)| w * r.exp_m1())
                    .sum()
            })
            .collect(),
    })
}

/// Growth of one unit of capital: running product of `1 + r`.
pub fn cumulative_performance(returns: &[f64]) -> Vec<f64> {
    returns
        .iter()
        .scan(1.0, |wealth, r| {
            *wealth *= 1.0 + r;
            Some(*wealth)
        })
        .collect()
}

/// Gaussian VaR of the portfolio over `horizon_days`.
///
/// Annualized mean and volatility are scaled back to one period with
/// `annualization_factor`, then to the horizon by `h` and `sqrt(h)`.
#[cfg(feature = "risk")]
pub fn parametric_var(
    metrics: &PortfolioMetrics,
    level: f64,
    horizon_days: u32,
    annualization_factor: f64,
) -> EngineResult<f64> {
    check_level(level)?;
    if horizon_days == 0 {
        return Err(EngineError::invalid("horizon_days", "Must be at least 1"));
    }
    if !(annualization_factor.is_finite() && annualization_factor > 0.0) {
        return Err(EngineError::invalid(
            "annualization_factor",
            format!("Must be finite and positive, got {}", annualization_factor),
        ));
    }

    let h = f64::from(horizon_days);
    let mean = metrics.expected_return / annualization_factor * h;
    let vol = metrics.volatility / annualization_factor.sqrt() * h.sqrt();

    let normal = Normal::new(0.0, 1.0).map_err(|e| EngineError::InvalidInput {
        field: "distribution".into(),
        reason: format!("Invalid Normal parameters: {e}"),
    })?;
    Ok(mean + normal.inverse_cdf(level) * vol)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prices::PriceTable;
    use crate::returns::daily_returns;
    use approx::assert_abs_diff_eq;
    use chrono::NaiveDate;

    fn series(convention: ReturnConvention) -> ReturnSeries {
        let dates: Vec<NaiveDate> = (1..=6)
            .map(|d| NaiveDate::from_ymd_opt(2024, 3, d).unwrap())
            .collect();
        let prices = PriceTable::new(
            vec!["A".into(), "B".into()],
            dates,
            vec![
                vec![100.0, 50.0],
                vec![102.0, 49.0],
                vec![99.96, 49.98],
                vec![101.9592, 51.9792],
                vec![96.861_24, 51.459_408],
                vec![97.829_852_4, 52.488_596_16],
            ],
        )
        .unwrap();
        daily_returns(&prices, convention).unwrap()
    }

    #[test]
    fn test_historical_var_interpolates() {
        // A returns: 0.02, -0.02, 0.02, -0.05, 0.01
        // sorted: -0.05, -0.02, 0.01, 0.02, 0.02; rank 0.05*4 = 0.2
        let vars = historical_var(&series(ReturnConvention::Simple), 0.05).unwrap();
        assert_eq!(vars[0].asset, "A");
        assert_abs_diff_eq!(vars[0].var, -0.05 + 0.2 * 0.03, epsilon = 1e-9);
        // B returns: -0.02, 0.02, 0.04, -0.01, 0.02
        assert_abs_diff_eq!(vars[1].var, -0.02 + 0.2 * 0.01, epsilon = 1e-9);
        let avg = average_var(&vars).unwrap();
        assert_abs_diff_eq!(avg, (vars[0].var + vars[1].var) / 2.0, epsilon = 1e-15);
    }

    #[test]
    fn test_var_level_bounds() {
        let r = series(ReturnConvention::Simple);
        assert!(historical_var(&r, 0.0).is_err());
        assert!(historical_var(&r, 1.0).is_err());
        assert!(average_var(&[]).is_none());
    }

    #[test]
    fn test_portfolio_and_cumulative_returns() {
        let r = series(ReturnConvention::Simple);
        let port = portfolio_returns(&r, &[0.5, 0.5]).unwrap();
        assert_abs_diff_eq!(port[0], 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(port[2], 0.03, epsilon = 1e-9);

        let wealth = cumulative_performance(&[0.10, -0.10, 0.05]);
        assert_abs_diff_eq!(wealth[0], 1.10, epsilon = 1e-12);
        assert_abs_diff_eq!(wealth[1], 0.99, epsilon = 1e-12);
        assert_abs_diff_eq!(wealth[2], 1.0395, epsilon = 1e-12);
    }

    #[test]
    fn test_log_returns_are_weighted_as_simple() {
        let simple = portfolio_returns(&series(ReturnConvention::Simple), &[0.3, 0.7]).unwrap();
        let log = portfolio_returns(&series(ReturnConvention::Log), &[0.3, 0.7]).unwrap();
        for (a, b) in simple.iter().zip(&log) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_portfolio_returns_dimension() {
        let err = portfolio_returns(&series(ReturnConvention::Simple), &[1.0]).unwrap_err();
        assert!(matches!(err, EngineError::DimensionMismatch { .. }));
    }

    #[cfg(feature = "risk")]
    #[test]
    fn test_parametric_var() {
        let m = PortfolioMetrics {
            expected_return: 0.252,
            volatility: 0.2,
            sharpe_ratio: 0.0,
        };
        // Daily mean 0.001.
        let daily_vol = m.volatility / 252f64.sqrt();
        let var = parametric_var(&m, 0.05, 1, 252.0).unwrap();
        assert_abs_diff_eq!(var, 0.001 - 1.644_853_626_951_472_2 * daily_vol, epsilon = 1e-9);

        let ten_day = parametric_var(&m, 0.05, 10, 252.0).unwrap();
        assert_abs_diff_eq!(
            ten_day,
            0.01 - 1.644_853_626_951_472_2 * daily_vol * 10f64.sqrt(),
            epsilon = 1e-9
        );
        assert!(parametric_var(&m, 0.05, 0, 252.0).is_err());
    }
}

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::linalg::vec_dot;
use crate::returns::AnnualizedStats;
use crate::types::{AssetId, Rate, VARIANCE_EPSILON, WEIGHT_TOLERANCE};
use crate::EngineResult;

/// Expected return, volatility and Sharpe ratio of one weight vector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PortfolioMetrics {
    /// Annualized `w · mu`.
    pub expected_return: f64,
    /// Annualized `sqrt(w' Sigma w)`, never negative.
    pub volatility: f64,
    /// `(expected_return - risk_free_rate) / volatility`.
    pub sharpe_ratio: f64,
}

impl PortfolioMetrics {
    /// Sharpe ratio of the same portfolio under a different risk-free rate.
    ///
    /// `None` when the volatility is not a positive finite number, which
    /// [`portfolio_metrics`] never produces but a hand-built value can.
    pub fn sharpe_at(&self, risk_free_rate: Rate) -> Option<f64> {
        if !(self.volatility.is_finite() && self.volatility > 0.0) {
            return None;
        }
        Some((self.expected_return - risk_free_rate) / self.volatility)
    }
}

/// Weight of one asset with its share of return and risk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskContribution {
    pub asset: AssetId,
    pub weight: f64,
    /// Weight times expected return.
    pub contribution_to_return: f64,
    /// `w_i (Sigma w)_i / sigma_p`; sums to portfolio volatility.
    pub contribution_to_risk: f64,
}

/// Evaluate a weight vector against annualized statistics.
///
/// Weights are used as given; only their length is checked. Use
/// [`check_feasible`] to validate the long-only, fully-invested constraints.
/// A variance at or below [`VARIANCE_EPSILON`] is reported as
/// [`EngineError::DegenerateVariance`] instead of producing an infinite or NaN
/// Sharpe ratio.
pub fn portfolio_metrics(
    weights: &[f64],
    stats: &AnnualizedStats,
    risk_free_rate: Rate,
) -> EngineResult<PortfolioMetrics> {
    let n = stats.n_assets();
    if weights.len() != n {
        return Err(EngineError::dimension("weights", n, weights.len()));
    }
    if let Some((i, w)) = weights.iter().enumerate().find(|(_, w)| !w.is_finite()) {
        return Err(EngineError::invalid(
            format!("weights[{}]", i),
            format!("Must be finite, got {}", w),
        ));
    }
    if !risk_free_rate.is_finite() {
        return Err(EngineError::invalid(
            "risk_free_rate",
            format!("Must be finite, got {}", risk_free_rate),
        ));
    }

    let expected_return = vec_dot(weights, stats.mean());
    let variance = stats.variance_of(weights);
    if variance <= VARIANCE_EPSILON {
        return Err(EngineError::DegenerateVariance {
            variance,
            epsilon: VARIANCE_EPSILON,
        });
    }
    let volatility = variance.sqrt();

    Ok(PortfolioMetrics {
        expected_return,
        volatility,
        sharpe_ratio: (expected_return - risk_free_rate) / volatility,
    })
}

/// Check the long-only, fully-invested constraints within [`WEIGHT_TOLERANCE`].
pub fn check_feasible(weights: &[f64]) -> EngineResult<()> {
    if weights.is_empty() {
        return Err(EngineError::InfeasibleRegion(
            "Weight vector is empty".into(),
        ));
    }
    for (i, w) in weights.iter().enumerate() {
        if !w.is_finite() || *w < -WEIGHT_TOLERANCE || *w > 1.0 + WEIGHT_TOLERANCE {
            return Err(EngineError::invalid(
                format!("weights[{}]", i),
                format!("Must lie in [0, 1], got {}", w),
            ));
        }
    }
    let total: f64 = weights.iter().sum();
    if (total - 1.0).abs() > WEIGHT_TOLERANCE {
        return Err(EngineError::invalid(
            "weights",
            format!("Must sum to 1, got {}", total),
        ));
    }
    Ok(())
}

/// Per-asset decomposition of return and volatility.
pub fn risk_contributions(
    weights: &[f64],
    stats: &AnnualizedStats,
) -> EngineResult<Vec<RiskContribution>> {
    let n = stats.n_assets();
    if weights.len() != n {
        return Err(EngineError::dimension("weights", n, weights.len()));
    }

    let sigma_w = stats.cov_times(weights);
    let vol = vec_dot(weights, &sigma_w).max(0.0).sqrt();

    Ok((0..n)
        .map(|i| RiskContribution {
            asset: stats.assets()[i].clone(),
            weight: weights[i],
            contribution_to_return: weights[i] * stats.mean()[i],
            contribution_to_risk: if vol > 0.0 {
                weights[i] * sigma_w[i] / vol
            } else {
                0.0
            },
        })
        .collect())
}

/// Herfindahl-Hirschman index of the weights.
pub fn concentration(weights: &[f64]) -> f64 {
    weights.iter().map(|w| w * w).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    fn two_asset() -> AnnualizedStats {
        AnnualizedStats::new(
            vec!["A".into(), "B".into()],
            vec![0.10, 0.15],
            vec![vec![0.04, 0.01], vec![0.01, 0.09]],
        )
        .unwrap()
    }

    #[test]
    fn test_equal_weight_metrics() {
        let m = portfolio_metrics(&[0.5, 0.5], &two_asset(), 0.02).unwrap();
        assert_relative_eq!(m.expected_return, 0.125, max_relative = 1e-12);
        assert_relative_eq!(m.volatility, 0.0375f64.sqrt(), max_relative = 1e-12);
        assert_relative_eq!(m.sharpe_ratio, 0.105 / 0.0375f64.sqrt(), max_relative = 1e-12);
    }

    #[test]
    fn test_dimension_mismatch() {
        let err = portfolio_metrics(&[1.0], &two_asset(), 0.02).unwrap_err();
        assert_eq!(
            err,
            EngineError::DimensionMismatch {
                context: "weights".into(),
                expected: 2,
                actual: 1
            }
        );
    }

    #[test]
    fn test_degenerate_variance() {
        let stats = AnnualizedStats::new(
            vec!["Cash".into(), "Bills".into()],
            vec![0.02, 0.03],
            vec![vec![0.0, 0.0], vec![0.0, 0.0]],
        )
        .unwrap();
        let err = portfolio_metrics(&[0.5, 0.5], &stats, 0.01).unwrap_err();
        assert!(matches!(err, EngineError::DegenerateVariance { .. }));
    }

    #[test]
    fn test_raw_weights_are_not_normalized() {
        let m = portfolio_metrics(&[1.0, 1.0], &two_asset(), 0.0).unwrap();
        assert_relative_eq!(m.expected_return, 0.25, max_relative = 1e-12);
    }

    #[test]
    fn test_sharpe_at_other_rate() {
        let m = portfolio_metrics(&[0.5, 0.5], &two_asset(), 0.02).unwrap();
        let at_5 = m.sharpe_at(0.05).unwrap();
        assert!(at_5 < m.sharpe_ratio);
        assert_relative_eq!(at_5, 0.075 / m.volatility, max_relative = 1e-12);
    }

    #[test]
    fn test_sharpe_at_needs_positive_volatility() {
        let flat = PortfolioMetrics {
            expected_return: 0.03,
            volatility: 0.0,
            sharpe_ratio: 0.0,
        };
        assert_eq!(flat.sharpe_at(0.01), None);
        let broken = PortfolioMetrics {
            volatility: f64::NAN,
            ..flat
        };
        assert_eq!(broken.sharpe_at(0.01), None);
    }

    #[test]
    fn test_check_feasible() {
        assert!(check_feasible(&[0.3, 0.7]).is_ok());
        assert!(check_feasible(&[0.3, 0.7 + 1e-7]).is_ok());
        assert!(check_feasible(&[1.2, -0.2]).is_err());
        assert!(check_feasible(&[0.3, 0.3]).is_err());
        assert!(matches!(
            check_feasible(&[]),
            Err(EngineError::InfeasibleRegion(_))
        ));
    }

    #[test]
    fn test_risk_contributions_sum_to_volatility() {
        let stats = two_asset();
        let w = [0.6, 0.4];
        let rc = risk_contributions(&w, &stats).unwrap();
        let m = portfolio_metrics(&w, &stats, 0.0).unwrap();
        let total: f64 = rc.iter().map(|c| c.contribution_to_risk).sum();
        assert_abs_diff_eq!(total, m.volatility, epsilon = 1e-12);
        let ret: f64 = rc.iter().map(|c| c.contribution_to_return).sum();
        assert_abs_diff_eq!(ret, m.expected_return, epsilon = 1e-12);
    }

    #[test]
    fn test_concentration() {
        assert_abs_diff_eq!(concentration(&[0.5, 0.5]), 0.5, epsilon = 1e-15);
        assert_abs_diff_eq!(concentration(&[1.0, 0.0]), 1.0, epsilon = 1e-15);
    }
}

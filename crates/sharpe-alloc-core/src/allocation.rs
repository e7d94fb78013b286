use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::metrics::check_feasible;
use crate::types::{AssetId, Money};
use crate::EngineResult;

/// Amount of capital placed in one asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapitalSlice {
    pub asset: AssetId,
    pub weight: f64,
    pub amount: Money,
}

/// Split `capital` across assets by weight, to the cent.
///
/// Capital is rounded to cents first. Each slice is rounded to cents and
/// whatever rounding leaves over goes to the largest position, so the slices
/// always sum to the rounded capital.
pub fn allocate_capital(
    assets: &[AssetId],
    weights: &[f64],
    capital: Money,
) -> EngineResult<Vec<CapitalSlice>> {
    if weights.len() != assets.len() {
        return Err(EngineError::dimension("weights", assets.len(), weights.len()));
    }
    if capital.is_sign_negative() {
        return Err(EngineError::invalid(
            "initial_capital",
            format!("Must not be negative, got {}", capital),
        ));
    }
    check_feasible(weights)?;

    let total = capital.round_dp(2);
    let mut slices = Vec::with_capacity(assets.len());
    for (asset, &weight) in assets.iter().zip(weights) {
        let w = Decimal::try_from(weight).map_err(|e| {
            EngineError::invalid(format!("weight for {}", asset), e.to_string())
        })?;
        slices.push(CapitalSlice {
            asset: asset.clone(),
            weight,
            amount: (total * w).round_dp(2),
        });
    }

    let residual = total - slices.iter().map(|s| s.amount).sum::<Decimal>();
    if !residual.is_zero() {
        let largest = weights
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap_or(0);
        slices[largest].amount += residual;
    }

    Ok(slices)
}

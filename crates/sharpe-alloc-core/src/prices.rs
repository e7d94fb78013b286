//! Aligned price history: a `dates × assets` matrix with an immutable date index.
//!
//! Every constructor enforces the alignment invariants up front (unique
//! assets, strictly increasing dates, one finite positive price per asset per
//! date), so downstream return and covariance code can index rows blindly.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::EngineError;
use crate::types::AssetId;
use crate::EngineResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Raw observations for one asset, as delivered by a price source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetSeries {
    pub asset: AssetId,
    pub observations: Vec<(NaiveDate, f64)>,
}

impl AssetSeries {
    pub fn new(asset: impl Into<AssetId>, observations: Vec<(NaiveDate, f64)>) -> Self {
        Self {
            asset: asset.into(),
            observations,
        }
    }
}

/// How gaps are treated when per-asset series are outer-joined on date.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlignPolicy {
    /// Carry the last observed price forward. Leading dates before every
    /// asset has its first observation are dropped.
    #[default]
    ForwardFill,
    /// Keep only dates observed for every asset.
    DropIncomplete,
}

/// Request passed to a [`PriceSource`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRequest {
    pub assets: Vec<AssetId>,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Market-data provider seam. Implementations live outside the engine; any
/// fetch failure (network, unknown asset, empty range) is reported as
/// [`EngineError::InsufficientData`].
pub trait PriceSource {
    fn fetch(&self, request: &PriceRequest) -> EngineResult<PriceTable>;
}

/// A table already in memory serves requests from itself.
impl PriceSource for PriceTable {
    fn fetch(&self, request: &PriceRequest) -> EngineResult<PriceTable> {
        Ok(self
            .select(&request.assets)?
            .between(Some(request.start), Some(request.end)))
    }
}

/// Serialized shape of a [`PriceTable`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceTableData {
    pub assets: Vec<AssetId>,
    pub dates: Vec<NaiveDate>,
    /// One row per date, one column per asset.
    pub rows: Vec<Vec<f64>>,
}

/// Aligned adjusted-close prices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "PriceTableData", into = "PriceTableData")]
pub struct PriceTable {
    assets: Vec<AssetId>,
    dates: Vec<NaiveDate>,
    /// Row-major, `dates.len() * assets.len()` entries.
    prices: Vec<f64>,
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

impl PriceTable {
    /// Strict constructor from already aligned rows.
    pub fn new(
        assets: Vec<AssetId>,
        dates: Vec<NaiveDate>,
        rows: Vec<Vec<f64>>,
    ) -> EngineResult<Self> {
        validate_assets(&assets)?;
        validate_dates(&dates)?;

        if rows.len() != dates.len() {
            return Err(EngineError::dimension("price rows", dates.len(), rows.len()));
        }

        let n = assets.len();
        let mut prices = Vec::with_capacity(n * dates.len());
        for (t, row) in rows.into_iter().enumerate() {
            if row.len() != n {
                return Err(EngineError::dimension(
                    format!("price row {} ({})", t, dates[t]),
                    n,
                    row.len(),
                ));
            }
            for (j, p) in row.iter().enumerate() {
                validate_price(&assets[j], dates[t], *p)?;
            }
            prices.extend(row);
        }

        Ok(Self {
            assets,
            dates,
            prices,
        })
    }

    /// Strict constructor from per-asset columns that must already share an
    /// identical date index.
    pub fn from_columns(columns: Vec<(AssetId, Vec<NaiveDate>, Vec<f64>)>) -> EngineResult<Self> {
        let Some((reference, ref_dates, _)) = columns.first() else {
            return Err(EngineError::InsufficientData(
                "At least one asset column required".into(),
            ));
        };

        for (asset, dates, prices) in &columns {
            if dates.len() != prices.len() {
                return Err(EngineError::dimension(
                    format!("prices for '{}'", asset),
                    dates.len(),
                    prices.len(),
                ));
            }
            if dates != ref_dates {
                let len = dates.len().max(ref_dates.len());
                let position = (0..len)
                    .find(|&i| dates.get(i) != ref_dates.get(i))
                    .unwrap_or(0);
                return Err(EngineError::misaligned_at(
                    asset,
                    reference,
                    position,
                    dates.get(position).copied(),
                    ref_dates.get(position).copied(),
                ));
            }
        }

        let dates = ref_dates.clone();
        let assets: Vec<AssetId> = columns.iter().map(|(a, _, _)| a.clone()).collect();
        let rows: Vec<Vec<f64>> = (0..dates.len())
            .map(|t| columns.iter().map(|(_, _, p)| p[t]).collect())
            .collect();

        Self::new(assets, dates, rows)
    }

    /// Outer-join per-asset series on date and fill gaps according to `policy`.
    pub fn from_series(series: Vec<AssetSeries>, policy: AlignPolicy) -> EngineResult<Self> {
        if series.is_empty() {
            return Err(EngineError::InsufficientData(
                "At least one asset series required".into(),
            ));
        }

        let mut by_asset: Vec<(AssetId, BTreeMap<NaiveDate, f64>)> =
            Vec::with_capacity(series.len());
        for s in series {
            if s.observations.is_empty() {
                return Err(EngineError::InsufficientData(format!(
                    "No price observations for '{}'",
                    s.asset
                )));
            }
            let mut map = BTreeMap::new();
            for (date, price) in s.observations {
                validate_price(&s.asset, date, price)?;
                if map.insert(date, price).is_some() {
                    return Err(EngineError::invalid(
                        format!("prices.{}", s.asset),
                        format!("Duplicate observation on {}", date),
                    ));
                }
            }
            by_asset.push((s.asset, map));
        }

        let assets: Vec<AssetId> = by_asset.iter().map(|(a, _)| a.clone()).collect();
        validate_assets(&assets)?;

        let all_dates: BTreeSet<NaiveDate> = by_asset
            .iter()
            .flat_map(|(_, m)| m.keys().copied())
            .collect();

        let mut dates = Vec::with_capacity(all_dates.len());
        let mut rows = Vec::with_capacity(all_dates.len());
        let mut last: Vec<Option<f64>> = vec![None; by_asset.len()];
        let mut dropped = 0usize;

        for date in all_dates {
            let observed: Vec<Option<f64>> =
                by_asset.iter().map(|(_, m)| m.get(&date).copied()).collect();

            let row: Option<Vec<f64>> = match policy {
                AlignPolicy::DropIncomplete => observed.iter().copied().collect(),
                AlignPolicy::ForwardFill => {
                    for (slot, obs) in last.iter_mut().zip(&observed) {
                        if obs.is_some() {
                            *slot = *obs;
                        }
                    }
                    last.iter().copied().collect()
                }
            };

            match row {
                Some(r) => {
                    dates.push(date);
                    rows.push(r);
                }
                None => dropped += 1,
            }
        }

        if dropped > 0 {
            warn!(
                dropped,
                kept = dates.len(),
                ?policy,
                "dropped dates lacking a price for every asset"
            );
        }
        debug!(assets = assets.len(), dates = dates.len(), "aligned price series");

        Self::new(assets, dates, rows)
    }
}

impl TryFrom<PriceTableData> for PriceTable {
    type Error = EngineError;

    fn try_from(data: PriceTableData) -> Result<Self, Self::Error> {
        PriceTable::new(data.assets, data.dates, data.rows)
    }
}

impl From<PriceTable> for PriceTableData {
    fn from(table: PriceTable) -> Self {
        let rows = (0..table.dates.len())
            .map(|t| table.row(t).to_vec())
            .collect();
        PriceTableData {
            assets: table.assets,
            dates: table.dates,
            rows,
        }
    }
}

// ---------------------------------------------------------------------------
// Accessors and views
// ---------------------------------------------------------------------------

impl PriceTable {
    pub fn assets(&self) -> &[AssetId] {
        &self.assets
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn n_assets(&self) -> usize {
        self.assets.len()
    }

    pub fn n_observations(&self) -> usize {
        self.dates.len()
    }

    /// Prices of every asset on the `t`-th date.
    pub fn row(&self, t: usize) -> &[f64] {
        let n = self.assets.len();
        &self.prices[t * n..(t + 1) * n]
    }

    /// Price history of the `j`-th asset.
    pub fn column(&self, j: usize) -> impl Iterator<Item = f64> + '_ {
        self.prices
            .iter()
            .skip(j)
            .step_by(self.assets.len())
            .copied()
    }

    pub fn asset_index(&self, asset: &str) -> Option<usize> {
        self.assets.iter().position(|a| a == asset)
    }

    /// Restrict to a subset of assets, in the order given.
    pub fn select(&self, assets: &[AssetId]) -> EngineResult<Self> {
        let idx: Vec<usize> = assets
            .iter()
            .map(|a| {
                self.asset_index(a).ok_or_else(|| {
                    EngineError::InsufficientData(format!("Unknown asset '{}'", a))
                })
            })
            .collect::<EngineResult<_>>()?;

        let rows = (0..self.dates.len())
            .map(|t| {
                let row = self.row(t);
                idx.iter().map(|&j| row[j]).collect()
            })
            .collect();

        Self::new(assets.to_vec(), self.dates.clone(), rows)
    }

    /// Keep only dates within `[start, end]` (either bound optional).
    pub fn between(&self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        let keep: Vec<usize> = self
            .dates
            .iter()
            .enumerate()
            .filter(|(_, d)| start.map_or(true, |s| **d >= s) && end.map_or(true, |e| **d <= e))
            .map(|(t, _)| t)
            .collect();

        let mut prices = Vec::with_capacity(keep.len() * self.assets.len());
        for &t in &keep {
            prices.extend_from_slice(self.row(t));
        }

        Self {
            assets: self.assets.clone(),
            dates: keep.iter().map(|&t| self.dates[t]).collect(),
            prices,
        }
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate_assets(assets: &[AssetId]) -> EngineResult<()> {
    if assets.is_empty() {
        return Err(EngineError::InsufficientData(
            "At least one asset required".into(),
        ));
    }
    let mut seen = HashSet::with_capacity(assets.len());
    for a in assets {
        if !seen.insert(a.as_str()) {
            return Err(EngineError::invalid(
                "assets",
                format!("Duplicate asset '{}'", a),
            ));
        }
    }
    Ok(())
}

fn validate_dates(dates: &[NaiveDate]) -> EngineResult<()> {
    if let Some(w) = dates.windows(2).find(|w| w[1] <= w[0]) {
        return Err(EngineError::invalid(
            "dates",
            format!("Dates must be strictly increasing: {} then {}", w[0], w[1]),
        ));
    }
    Ok(())
}

fn validate_price(asset: &str, date: NaiveDate, price: f64) -> EngineResult<()> {
    if !price.is_finite() || price <= 0.0 {
        return Err(EngineError::invalid(
            format!("prices.{}", asset),
            format!("Price on {} must be finite and positive, got {}", date, price),
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Price history from CSV files.
//!
//! Layout: a `date` column of ISO dates followed by one column per asset.
//! Empty cells are missing observations and are aligned by the configured
//! [`AlignPolicy`].

use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use tracing::debug;

use sharpe_alloc_core::engine::fetch_prices;
use sharpe_alloc_core::prices::{AlignPolicy, AssetSeries, PriceRequest, PriceSource, PriceTable};
use sharpe_alloc_core::{EngineError, EngineResult};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// A CSV file of adjusted closing prices.
#[derive(Debug, Clone)]
pub struct CsvPriceSource {
    path: PathBuf,
    policy: AlignPolicy,
}

impl CsvPriceSource {
    pub fn new(path: impl AsRef<Path>, policy: AlignPolicy) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            policy,
        }
    }

    /// Every asset and date in the file.
    pub fn load(&self) -> EngineResult<PriceTable> {
        let unreadable = |e: csv::Error| {
            EngineError::InsufficientData(format!(
                "Cannot read prices from '{}': {}",
                self.path.display(),
                e
            ))
        };

        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(&self.path)
            .map_err(unreadable)?;

        let headers = reader.headers().map_err(unreadable)?.clone();
        match headers.get(0) {
            Some(h) if h.eq_ignore_ascii_case("date") => {}
            other => {
                return Err(EngineError::InvalidInput {
                    field: "prices".into(),
                    reason: format!("First column must be 'date', found {:?}", other),
                })
            }
        }

        let mut series: Vec<AssetSeries> = headers
            .iter()
            .skip(1)
            .map(|asset| AssetSeries::new(asset, Vec::new()))
            .collect();

        for (line, record) in reader.records().enumerate() {
            let record = record.map_err(unreadable)?;
            let raw_date = record.get(0).unwrap_or_default();
            let date = NaiveDate::parse_from_str(raw_date, DATE_FORMAT).map_err(|e| {
                EngineError::InvalidInput {
                    field: format!("prices line {}", line + 2),
                    reason: format!("Bad date '{}': {}", raw_date, e),
                }
            })?;

            for (column, s) in series.iter_mut().enumerate() {
                let cell = record.get(column + 1).unwrap_or_default();
                if cell.is_empty() {
                    continue;
                }
                let price = cell.parse::<f64>().map_err(|e| EngineError::InvalidInput {
                    field: format!("prices line {}", line + 2),
                    reason: format!("Bad price '{}' for {}: {}", cell, s.asset, e),
                })?;
                s.observations.push((date, price));
            }
        }

        debug!(
            path = %self.path.display(),
            assets = series.len(),
            "loaded price file"
        );
        PriceTable::from_series(series, self.policy)
    }
}

impl PriceSource for CsvPriceSource {
    fn fetch(&self, request: &PriceRequest) -> EngineResult<PriceTable> {
        Ok(self
            .load()?
            .select(&request.assets)?
            .between(Some(request.start), Some(request.end)))
    }
}

/// Load prices, optionally restricted to some assets and a date window.
pub fn load_prices(
    path: &str,
    policy: AlignPolicy,
    assets: Option<&[String]>,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> Result<PriceTable, Box<dyn std::error::Error>> {
    let table = CsvPriceSource::new(super::file::resolve_path(path)?, policy).load()?;
    if assets.is_none() && start.is_none() && end.is_none() {
        return Ok(table);
    }

    let request = PriceRequest {
        assets: assets.map_or_else(|| table.assets().to_vec(), <[String]>::to_vec),
        start: start.unwrap_or(NaiveDate::MIN),
        end: end.unwrap_or(NaiveDate::MAX),
    };
    Ok(fetch_prices(&table, &request)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const CSV: &str = "\
date,AAPL,MSFT
2024-01-02,185.0,370.0
2024-01-03,184.0,
2024-01-04,181.5,367.5
2024-01-05,181.0,368.0
";

    fn write_csv(contents: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prices.csv");
        fs::write(&path, contents).unwrap();
        (dir, path)
    }

    #[test]
    fn test_forward_fills_empty_cells() {
        let (_dir, path) = write_csv(CSV);
        let table = CsvPriceSource::new(&path, AlignPolicy::ForwardFill)
            .load()
            .unwrap();
        assert_eq!(table.n_observations(), 4);
        assert_eq!(table.row(1), &[184.0, 370.0]);
    }

    #[test]
    fn test_drop_incomplete_policy() {
        let (_dir, path) = write_csv(CSV);
        let table = CsvPriceSource::new(&path, AlignPolicy::DropIncomplete)
            .load()
            .unwrap();
        assert_eq!(table.n_observations(), 3);
    }

    #[test]
    fn test_fetch_selects_window() {
        let (_dir, path) = write_csv(CSV);
        let table = load_prices(
            path.to_str().unwrap(),
            AlignPolicy::ForwardFill,
            Some(&["MSFT".to_string()]),
            NaiveDate::from_ymd_opt(2024, 1, 3),
            None,
        )
        .unwrap();
        assert_eq!(table.assets(), &["MSFT".to_string()][..]);
        assert_eq!(table.n_observations(), 3);
    }

    #[test]
    fn test_csv_source_serves_fetch_requests() {
        let (_dir, path) = write_csv(CSV);
        let source = CsvPriceSource::new(&path, AlignPolicy::ForwardFill);
        let request = PriceRequest {
            assets: vec!["AAPL".to_string()],
            start: NaiveDate::from_ymd_opt(2024, 1, 3).unwrap(),
            end: NaiveDate::from_ymd_opt(2024, 1, 4).unwrap(),
        };
        let table = fetch_prices(&source, &request).unwrap();
        assert_eq!(table.assets(), &["AAPL".to_string()][..]);
        assert_eq!(table.row(1), &[181.5]);
    }

    #[test]
    fn test_window_keeps_every_asset() {
        let (_dir, path) = write_csv(CSV);
        let table = load_prices(
            path.to_str().unwrap(),
            AlignPolicy::ForwardFill,
            None,
            None,
            NaiveDate::from_ymd_opt(2024, 1, 4),
        )
        .unwrap();
        assert_eq!(table.assets(), &["AAPL".to_string(), "MSFT".to_string()][..]);
        assert_eq!(table.n_observations(), 3);

        let err = load_prices(
            path.to_str().unwrap(),
            AlignPolicy::ForwardFill,
            None,
            NaiveDate::from_ymd_opt(2024, 1, 5),
            NaiveDate::from_ymd_opt(2024, 1, 2),
        )
        .unwrap_err();
        assert!(err.to_string().contains("Insufficient data"));
    }

    #[test]
    fn test_bad_header_and_bad_price() {
        let (_dir, path) = write_csv("day,AAPL\n2024-01-02,1.0\n");
        assert!(CsvPriceSource::new(&path, AlignPolicy::ForwardFill)
            .load()
            .is_err());

        let (_dir, path) = write_csv("date,AAPL\n2024-01-02,abc\n");
        let err = CsvPriceSource::new(&path, AlignPolicy::ForwardFill)
            .load()
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput { .. }));
    }

    #[test]
    fn test_unknown_asset_is_insufficient_data() {
        let (_dir, path) = write_csv(CSV);
        let err = load_prices(
            path.to_str().unwrap(),
            AlignPolicy::ForwardFill,
            Some(&["TSLA".to_string()]),
            None,
            None,
        )
        .unwrap_err();
        assert!(err.to_string().contains("Unknown asset"));
    }
}

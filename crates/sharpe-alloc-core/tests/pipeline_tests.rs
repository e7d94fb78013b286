use approx::assert_relative_eq;
use chrono::NaiveDate;
use pretty_assertions::assert_eq;
use sharpe_alloc_core::engine::{analyze, optimize, AnalysisRequest, EngineConfig};
use sharpe_alloc_core::prices::{AlignPolicy, AssetSeries, PriceTable};
use sharpe_alloc_core::returns::{build_stats, daily_returns, ReturnConvention, StatsConfig};
use sharpe_alloc_core::EngineError;

fn d(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
}

/// Two assets with a gap on day 4 for the second one.
fn gappy_series() -> Vec<AssetSeries> {
    vec![
        AssetSeries::new(
            "AAA",
            vec![
                (d(2), 100.0),
                (d(3), 101.0),
                (d(4), 99.5),
                (d(5), 102.0),
                (d(8), 103.0),
                (d(9), 102.5),
            ],
        ),
        AssetSeries::new(
            "BBB",
            vec![
                (d(2), 40.0),
                (d(3), 40.4),
                (d(5), 41.0),
                (d(8), 40.6),
                (d(9), 41.5),
            ],
        ),
    ]
}

// ===========================================================================
// Prices to statistics
// ===========================================================================

#[test]
fn test_forward_fill_then_returns() {
    let table = PriceTable::from_series(gappy_series(), AlignPolicy::ForwardFill).unwrap();
    assert_eq!(table.n_observations(), 6);
    // Day 4 carries BBB's day-3 price, so its return that day is zero.
    let returns = daily_returns(&table, ReturnConvention::Simple).unwrap();
    assert_eq!(returns.row(1)[1], 0.0);
    assert_relative_eq!(returns.row(0)[0], 0.01, max_relative = 1e-12);
}

#[test]
fn test_drop_incomplete_skips_gap() {
    let table = PriceTable::from_series(gappy_series(), AlignPolicy::DropIncomplete).unwrap();
    assert_eq!(table.dates(), &[d(2), d(3), d(5), d(8), d(9)][..]);
}

#[test]
fn test_strict_columns_reject_different_calendars() {
    let err = PriceTable::from_columns(vec![
        ("AAA".into(), vec![d(2), d(3)], vec![1.0, 1.1]),
        ("BBB".into(), vec![d(2), d(4)], vec![1.0, 1.1]),
    ])
    .unwrap_err();
    assert!(matches!(err, EngineError::MisalignedData { .. }));
}

#[test]
fn test_stats_need_three_prices() {
    let table = PriceTable::new(
        vec!["AAA".into()],
        vec![d(2), d(3)],
        vec![vec![100.0], vec![101.0]],
    )
    .unwrap();
    let err = build_stats(&table, &StatsConfig::default()).unwrap_err();
    assert!(matches!(err, EngineError::InsufficientData(_)));
}

// ===========================================================================
// Engine
// ===========================================================================

#[test]
fn test_optimize_from_prices() {
    let table = PriceTable::from_series(gappy_series(), AlignPolicy::ForwardFill).unwrap();
    let outcomes = optimize(&table, &[0.0, 0.02, 0.05], &EngineConfig::default()).unwrap();
    assert_eq!(outcomes.len(), 3);

    let mut previous = f64::INFINITY;
    for o in &outcomes {
        let r = o.outcome.as_ref().unwrap();
        let total: f64 = r.weights.iter().sum();
        assert!((total - 1.0).abs() < 1e-6);
        assert!(r.metrics.sharpe_ratio <= previous);
        previous = r.metrics.sharpe_ratio;
    }
}

#[test]
fn test_log_convention_changes_statistics() {
    let table = PriceTable::from_series(gappy_series(), AlignPolicy::ForwardFill).unwrap();
    let simple = build_stats(&table, &StatsConfig::default()).unwrap();
    let log = build_stats(
        &table,
        &StatsConfig::default().with_convention(ReturnConvention::Log),
    )
    .unwrap();
    // ln(1 + r) < r for r != 0, so log means sit below simple means.
    assert!(log.mean()[0] < simple.mean()[0]);
    assert!(log.mean()[1] < simple.mean()[1]);
}

#[test]
fn test_analyze_without_optional_sections() {
    let table = PriceTable::from_series(gappy_series(), AlignPolicy::ForwardFill).unwrap();
    let request = AnalysisRequest {
        frontier_points: 0,
        ..AnalysisRequest::default()
    };
    let output = analyze(&table, &request).unwrap();
    assert!(output.result.frontier.is_empty());
    assert!(output.result.sensitivity.is_empty());
    assert!(output.result.allocation.is_none());
    assert_eq!(output.result.cumulative_performance.len(), 5);

    let json = serde_json::to_value(&output).unwrap();
    assert!(json["result"]["optimal"]["weights"].is_array());
    assert!(json["result"]["stats"]["covariance_matrix"].is_array());
}

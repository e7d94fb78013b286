use serde_json::Value;
use std::io;

use super::{format_cell, result_of, tabulate};

/// Write output as CSV to stdout.
///
/// Scenario and frontier arrays become one record per element; single
/// results become `field,value` pairs.
pub fn print_csv(value: &Value) {
    let stdout = io::stdout();
    let mut wtr = csv::Writer::from_writer(stdout.lock());
    for record in records(value) {
        let _ = wtr.write_record(&record);
    }
    let _ = wtr.flush();
}

fn records(value: &Value) -> Vec<Vec<String>> {
    match result_of(value) {
        Value::Object(map) => std::iter::once(vec!["field".to_string(), "value".to_string()])
            .chain(map.iter().map(|(k, v)| vec![k.clone(), format_cell(v)]))
            .collect(),
        Value::Array(rows) => match tabulate(rows) {
            Some((headers, cells)) => std::iter::once(headers).chain(cells).collect(),
            None => rows.iter().map(|v| vec![format_cell(v)]).collect(),
        },
        other => vec![vec![format_cell(other)]],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sweep_rows_become_records() {
        let v = json!({
            "result": [
                {"risk_free_rate": 0.0, "converged": true},
                {"risk_free_rate": 0.01, "converged": false}
            ],
            "warnings": []
        });
        let recs = records(&v);
        assert_eq!(recs.len(), 3);
        assert_eq!(recs[0].len(), 2);
        let col = recs[0].iter().position(|h| h == "converged").unwrap();
        assert_eq!(recs[2][col], "false");
    }

    #[test]
    fn test_single_result_is_field_value() {
        let v = json!({"result": {"sharpe_ratio": 0.5}});
        assert_eq!(
            records(&v),
            vec![
                vec!["field".to_string(), "value".to_string()],
                vec!["sharpe_ratio".to_string(), "0.5".to_string()],
            ]
        );
    }
}

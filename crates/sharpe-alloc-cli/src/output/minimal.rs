use serde_json::Value;

use super::result_of;

/// Print just the key answer from the output.
///
/// Allocations print one `asset weight` line per position; anything else
/// falls back to the first well-known field, then the first field.
pub fn print_minimal(value: &Value) {
    for line in minimal_lines(value) {
        println!("{}", line);
    }
}

const PRIORITY_KEYS: [&str; 4] = ["sharpe_ratio", "volatility", "expected_return", "expected_returns"];

fn minimal_lines(value: &Value) -> Vec<String> {
    let result = result_of(value);

    match result {
        // One line per scenario, keyed by its rate when it has one
        Value::Array(rows) => rows
            .iter()
            .map(|row| {
                let answer = row_answer(row);
                match row.get("risk_free_rate") {
                    Some(rate) => format!("{} {}", format_minimal(rate), answer),
                    None => answer,
                }
            })
            .collect(),
        Value::Object(map) => {
            if let Some(optimal) = map.get("optimal") {
                return minimal_lines(optimal);
            }
            if let Some(Value::Array(weights)) = map.get("weights") {
                let lines: Vec<String> = weights
                    .iter()
                    .filter_map(|w| {
                        let asset = w.get("asset")?.as_str()?;
                        Some(format!("{} {}", asset, format_minimal(w.get("weight")?)))
                    })
                    .collect();
                if !lines.is_empty() {
                    return lines;
                }
                // Optimization results keep assets and weights side by side
                if let Some(Value::Array(assets)) = map.get("assets") {
                    return assets
                        .iter()
                        .zip(weights)
                        .map(|(a, w)| format!("{} {}", format_minimal(a), format_minimal(w)))
                        .collect();
                }
            }
            vec![row_answer(result)]
        }
        _ => vec![format_minimal(result)],
    }
}

fn row_answer(row: &Value) -> String {
    let Value::Object(map) = row else {
        return format_minimal(row);
    };
    for key in &PRIORITY_KEYS {
        if let Some(val) = map.get(*key) {
            if !val.is_null() {
                return format_minimal(val);
            }
        }
    }
    match map.iter().next() {
        Some((key, val)) => format!("{}: {}", key, format_minimal(val)),
        None => String::new(),
    }
}

fn format_minimal(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}

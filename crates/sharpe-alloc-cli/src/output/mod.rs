pub mod csv_out;
pub mod minimal;
pub mod table;

use crate::OutputFormat;
use serde_json::Value;

/// Dispatch output to the appropriate formatter.
pub fn format_output(format: &OutputFormat, value: &Value) {
    match format {
        OutputFormat::Json => match serde_json::to_string_pretty(value) {
            Ok(s) => println!("{}", s),
            Err(e) => eprintln!("JSON serialization error: {}", e),
        },
        OutputFormat::Table => table::print_table(value),
        OutputFormat::Csv => csv_out::print_csv(value),
        OutputFormat::Minimal => minimal::print_minimal(value),
    }
}

/// The `result` of a computation envelope, or the value itself.
pub(crate) fn result_of(value: &Value) -> &Value {
    value
        .as_object()
        .and_then(|m| m.get("result"))
        .unwrap_or(value)
}

/// Header and cells for an array of objects, keyed by the first element.
pub(crate) fn tabulate(rows: &[Value]) -> Option<(Vec<String>, Vec<Vec<String>>)> {
    let Value::Object(first) = rows.first()? else {
        return None;
    };
    let headers: Vec<String> = first.keys().cloned().collect();
    let cells = rows
        .iter()
        .filter_map(Value::as_object)
        .map(|row| {
            headers
                .iter()
                .map(|h| row.get(h).map(format_cell).unwrap_or_default())
                .collect()
        })
        .collect();
    Some((headers, cells))
}

/// Render one value as a single cell.
///
/// Lists of `{asset, weight}` pairs collapse to `AAPL=0.4; MSFT=0.6`.
pub(crate) fn format_cell(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        Value::Array(items) => {
            let pairs: Option<Vec<String>> = items
                .iter()
                .map(|item| {
                    let asset = item.get("asset")?.as_str()?;
                    let weight = item.get("weight")?;
                    Some(format!("{}={}", asset, format_cell(weight)))
                })
                .collect();
            match pairs {
                Some(p) if !p.is_empty() => p.join("; "),
                _ => items.iter().map(format_cell).collect::<Vec<_>>().join(", "),
            }
        }
        Value::Object(_) => serde_json::to_string(value).unwrap_or_default(),
    }
}

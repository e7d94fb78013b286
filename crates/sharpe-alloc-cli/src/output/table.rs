use serde_json::{Map, Value};
use tabled::{builder::Builder, Table};

use super::{format_cell, result_of, tabulate};

/// Square matrices that get asset labels on both axes.
const MATRIX_KEYS: [&str; 2] = ["covariance_matrix", "correlation"];

/// Format output as tables using the tabled crate.
pub fn print_table(value: &Value) {
    let result = result_of(value);
    match result {
        Value::Object(map) => print_object(map),
        Value::Array(rows) => print_rows(rows),
        _ => println!("{}", format_cell(result)),
    }

    if let Some(Value::Array(warnings)) = value.get("warnings") {
        if !warnings.is_empty() {
            println!("\nWarnings:");
            for w in warnings.iter().filter_map(Value::as_str) {
                println!("  - {}", w);
            }
        }
    }
    if let Some(Value::String(meth)) = value.get("methodology") {
        println!("\nMethodology: {}", meth);
    }
}

fn print_object(map: &Map<String, Value>) {
    let assets = asset_labels(map);
    let mut builder = Builder::default();
    builder.push_record(["Field", "Value"]);
    let mut matrices = Vec::new();
    for (key, val) in map {
        if MATRIX_KEYS.contains(&key.as_str()) && assets.is_some() {
            matrices.push((key, val));
            continue;
        }
        builder.push_record([key.as_str(), &format_cell(val)]);
    }
    println!("{}", Table::from(builder));

    if let Some(assets) = assets {
        for (key, val) in matrices {
            if let Some(table) = labelled_matrix(&assets, val) {
                println!("\n{}:\n{}", key, table);
            }
        }
    }
}

fn print_rows(rows: &[Value]) {
    match tabulate(rows) {
        Some((headers, cells)) => {
            let mut builder = Builder::default();
            builder.push_record(headers);
            for row in cells {
                builder.push_record(row);
            }
            println!("{}", Table::from(builder));
        }
        None if rows.is_empty() => println!("(empty)"),
        None => {
            for item in rows {
                println!("{}", format_cell(item));
            }
        }
    }
}

fn asset_labels(map: &Map<String, Value>) -> Option<Vec<String>> {
    map.get("assets")?
        .as_array()?
        .iter()
        .map(|a| a.as_str().map(str::to_string))
        .collect()
}

fn labelled_matrix(assets: &[String], matrix: &Value) -> Option<Table> {
    let rows = matrix.as_array()?;
    if rows.len() != assets.len() {
        return None;
    }
    let mut builder = Builder::default();
    builder.push_record(std::iter::once(String::new()).chain(assets.iter().cloned()));
    for (asset, row) in assets.iter().zip(rows) {
        let cells = row.as_array()?;
        builder.push_record(
            std::iter::once(asset.clone()).chain(cells.iter().map(|c| match c.as_f64() {
                Some(x) => format!("{:.6}", x),
                None => format_cell(c),
            })),
        );
    }
    Some(Table::from(builder))
}

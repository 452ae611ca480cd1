//! CSV export of tabular results.

use serde_json::Value;

use crate::chart::cell_to_string;

fn escape_field(field: &str) -> String {
    if field.contains(['\n', '\r', ',', '"']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Encode a header row followed by one record per line.
pub fn to_csv(columns: &[String], rows: &[Vec<Value>]) -> String {
    let mut records = Vec::with_capacity(rows.len() + 1);
    records.push(
        columns
            .iter()
            .map(|c| escape_field(c))
            .collect::<Vec<_>>()
            .join(","),
    );
    for row in rows {
        records.push(
            row.iter()
                .map(|cell| escape_field(&cell_to_string(cell)))
                .collect::<Vec<_>>()
                .join(","),
        );
    }
    records.join("\n")
}

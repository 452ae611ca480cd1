//! Chart data extraction from tabular results.
//!
//! Picks the first non-numeric column as the category axis and up to two
//! numeric columns as value series, over at most the first 12 rows.

use serde_json::Value;

use crate::types::{ChartData, ChartSeries};

/// Maximum number of rows plotted.
pub const MAX_CHART_ROWS: usize = 12;

/// Maximum number of value series plotted.
pub const MAX_CHART_SERIES: usize = 2;

/// Derive chart data from `columns` and `rows`.
///
/// Returns `None` when either input is empty, when every column is numeric
/// (no category), or when no column is numeric.
pub fn extract_chart_data(columns: &[String], rows: &[Vec<Value>]) -> Option<ChartData> {
    if columns.is_empty() || rows.is_empty() {
        return None;
    }

    let mut category_idx = None;
    let mut value_idxs = Vec::new();
    for idx in 0..columns.len() {
        let numeric = rows
            .iter()
            .all(|row| row.get(idx).map_or(true, is_numeric_cell));
        if numeric {
            value_idxs.push(idx);
        } else if category_idx.is_none() {
            category_idx = Some(idx);
        }
    }

    let category_idx = category_idx?;
    if value_idxs.is_empty() {
        return None;
    }
    value_idxs.truncate(MAX_CHART_SERIES);

    let sliced = &rows[..rows.len().min(MAX_CHART_ROWS)];
    let labels = sliced
        .iter()
        .map(|row| row.get(category_idx).map(cell_to_string).unwrap_or_default())
        .collect();
    let series: Vec<ChartSeries> = value_idxs
        .iter()
        .map(|&idx| ChartSeries {
            name: columns[idx].clone(),
            values: sliced
                .iter()
                .map(|row| row.get(idx).and_then(cell_to_number).unwrap_or(0.0))
                .collect(),
        })
        .collect();
    let metrics = series.iter().map(|s| s.name.clone()).collect();

    Some(ChartData {
        labels,
        series,
        category: columns[category_idx].clone(),
        metrics,
    })
}

/// Null, blank, boolean, or a finite number (native or numeric string).
pub fn is_numeric_cell(cell: &Value) -> bool {
    match cell {
        Value::Null => true,
        Value::String(s) if s.trim().is_empty() => true,
        _ => cell_to_number(cell).is_some(),
    }
}

/// Finite numeric value of a cell, if it has one. Booleans count as 1 and 0.
pub fn cell_to_number(cell: &Value) -> Option<f64> {
    let n = match cell {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        Value::Bool(b) => f64::from(u8::from(*b)),
        _ => return None,
    };
    n.is_finite().then_some(n)
}

/// Display string of a cell. Null renders as empty.
pub fn cell_to_string(cell: &Value) -> String {
    match cell {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn rows(v: Value) -> Vec<Vec<Value>> {
        serde_json::from_value(v).unwrap()
    }

    // ---- Core extraction ----

    #[test]
    fn test_region_revenue_margin() {
        let columns = cols(&["Region", "RevenueK", "MarginK"]);
        let data = rows(json!([
            ["North", 120.5, 30],
            ["South", 98, 22.25],
            ["West", "75", null]
        ]));
        let chart = extract_chart_data(&columns, &data).unwrap();
        assert_eq!(chart.category, "Region");
        assert_eq!(chart.labels, vec!["North", "South", "West"]);
        assert_eq!(chart.series.len(), 2);
        assert_eq!(chart.series[0].name, "RevenueK");
        assert_eq!(chart.series[1].name, "MarginK");
        assert_eq!(chart.series[0].values, vec![120.5, 98.0, 75.0]);
        assert_eq!(chart.series[1].values, vec![30.0, 22.25, 0.0]);
        assert_eq!(chart.metrics, vec!["RevenueK", "MarginK"]);
    }

    #[test]
    fn test_all_numeric_has_no_category() {
        let columns = cols(&["a", "b"]);
        let data = rows(json!([[1, 2], [3, 4]]));
        assert!(extract_chart_data(&columns, &data).is_none());
    }

    #[test]
    fn test_no_numeric_column() {
        let columns = cols(&["name", "owner"]);
        let data = rows(json!([["x", "y"]]));
        assert!(extract_chart_data(&columns, &data).is_none());
    }

    #[test]
    fn test_empty_inputs() {
        assert!(extract_chart_data(&[], &rows(json!([[1]]))).is_none());
        assert!(extract_chart_data(&cols(&["a"]), &[]).is_none());
    }

    // ---- Selection rules ----

    #[test]
    fn test_first_non_numeric_column_is_category() {
        let columns = cols(&["Revenue", "Quarter", "Owner"]);
        let data = rows(json!([[10, "Q1", "amy"], [20, "Q2", "bo"]]));
        let chart = extract_chart_data(&columns, &data).unwrap();
        assert_eq!(chart.category, "Quarter");
        assert_eq!(chart.metrics, vec!["Revenue"]);
    }

    #[test]
    fn test_series_capped_at_two() {
        let columns = cols(&["Label", "a", "b", "c"]);
        let data = rows(json!([["x", 1, 2, 3]]));
        let chart = extract_chart_data(&columns, &data).unwrap();
        assert_eq!(chart.metrics, vec!["a", "b"]);
    }

    #[test]
    fn test_rows_truncated_to_twelve() {
        let columns = cols(&["Deal", "Margin"]);
        let data: Vec<Vec<Value>> = (0..30)
            .map(|i| vec![json!(format!("deal-{i}")), json!(i)])
            .collect();
        let chart = extract_chart_data(&columns, &data).unwrap();
        assert_eq!(chart.labels.len(), MAX_CHART_ROWS);
        assert_eq!(chart.series[0].values.len(), MAX_CHART_ROWS);
        assert_eq!(chart.labels[11], "deal-11");
    }

    #[test]
    fn test_classification_uses_all_rows() {
        // The non-numeric cell sits beyond the plotted window.
        let columns = cols(&["Name", "Code"]);
        let mut data: Vec<Vec<Value>> = (0..13).map(|i| vec![json!("n"), json!(i)]).collect();
        data.push(vec![json!("n"), json!("X-1")]);
        assert!(extract_chart_data(&columns, &data).is_none());
    }

    #[test]
    fn test_numeric_labels_are_stringified() {
        let columns = cols(&["Owner", "Year", "Won"]);
        let data = rows(json!([["amy", 2024, true], ["bo", 2025, false]]));
        let chart = extract_chart_data(&columns, &data).unwrap();
        assert_eq!(chart.category, "Owner");
        assert_eq!(chart.metrics, vec!["Year", "Won"]);
        assert_eq!(chart.series[1].values, vec![1.0, 0.0]);
    }

    #[test]
    fn test_bit_column_is_not_a_category() {
        let columns = cols(&["IsWon", "Revenue"]);
        let data = rows(json!([[true, 5], [false, 7]]));
        assert!(extract_chart_data(&columns, &data).is_none());
    }

    #[test]
    fn test_null_category_label_is_blank() {
        let columns = cols(&["Owner", "Revenue"]);
        let data = rows(json!([["amy", 5], [null, 7]]));
        let chart = extract_chart_data(&columns, &data).unwrap();
        assert_eq!(chart.category, "Owner");
        assert_eq!(chart.labels, vec!["amy", ""]);
    }

    // ---- Cell helpers ----

    #[test]
    fn test_is_numeric_cell() {
        assert!(is_numeric_cell(&json!(null)));
        assert!(is_numeric_cell(&json!(1.5)));
        assert!(is_numeric_cell(&json!(" 42 ")));
        assert!(is_numeric_cell(&json!("")));
        assert!(!is_numeric_cell(&json!("abc")));
        assert!(!is_numeric_cell(&json!("inf")));
        assert!(!is_numeric_cell(&json!("NaN")));
        assert!(is_numeric_cell(&json!(true)));
        assert!(is_numeric_cell(&json!(false)));
        assert!(!is_numeric_cell(&json!([1])));
        assert_eq!(cell_to_number(&json!(true)), Some(1.0));
        assert_eq!(cell_to_number(&json!(false)), Some(0.0));
    }

    #[test]
    fn test_cell_to_string() {
        assert_eq!(cell_to_string(&json!(null)), "");
        assert_eq!(cell_to_string(&json!("x")), "x");
        assert_eq!(cell_to_string(&json!(3)), "3");
        assert_eq!(cell_to_string(&json!(2.5)), "2.5");
    }
}

//! Answer composition for a completed run.
//!
//! Turns a tabular result into the fallback answer text, the client-side SQL
//! lint, and the single assistant message a successful run appends.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use sqlchat_core::Currency;

use crate::chart::{cell_to_number, cell_to_string, extract_chart_data};
use crate::presentation::Presentation;
use crate::types::{Attachment, ChartData, Message, TableData};

/// Rows listed by the fallback summary before truncating.
pub const SUMMARY_MAX_ROWS: usize = 8;

pub const NO_RESULTS: &str = "No results.";
pub const LINT_NOT_SELECT: &str = "Not a SELECT/CTE.";
pub const LINT_LIMIT: &str = "LIMIT is not valid T-SQL.";

static LIMIT_KEYWORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\blimit\b").expect("Invalid limit regex"));

/// Whether a column holds figures expressed in thousands.
fn is_thousands_column(column: &str) -> bool {
    let c = column.to_lowercase();
    c.contains("thousand") || c.ends_with("_k")
}

/// Render a cell for display. Thousands columns render numbers as
/// `<symbol><rounded>K`; null renders as empty.
pub fn format_cell(column: &str, cell: &Value, currency: Currency) -> String {
    if cell.is_null() {
        return String::new();
    }
    if !is_thousands_column(column) {
        return cell_to_string(cell);
    }
    match cell_to_number(cell) {
        Some(n) => format_thousands(n, currency),
        None => cell_to_string(cell),
    }
}

/// `<symbol><rounded>K`, e.g. `£120K` or `C$98K`.
pub fn format_thousands(value: f64, currency: Currency) -> String {
    format!("{}{}K", currency.symbol(), value.round() as i64)
}

/// Locally synthesized answer used when the server supplies no narrative.
pub fn summarize_rows(columns: &[String], rows: &[Vec<Value>], currency: Currency) -> String {
    if columns.is_empty() || rows.is_empty() {
        return NO_RESULTS.to_string();
    }
    if rows.len() == 1 && columns.len() == 1 {
        let cell = rows[0].first().unwrap_or(&Value::Null);
        return format!("{}: {}", columns[0], format_cell(&columns[0], cell, currency));
    }

    let limit = rows.len().min(SUMMARY_MAX_ROWS);
    let mut lines = Vec::with_capacity(limit + 2);
    lines.push(columns.join(" | "));
    for row in &rows[..limit] {
        let cells: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(idx, cell)| {
                let column = columns.get(idx).map(String::as_str).unwrap_or_default();
                format_cell(column, cell, currency)
            })
            .collect();
        lines.push(cells.join(" | "));
    }
    if rows.len() > limit {
        lines.push(format!("... {} more rows", rows.len() - limit));
    }
    lines.join("\n")
}

/// Advisory lint of generated SQL. Never blocks presentation.
pub fn validate_sql(sql: &str) -> Vec<String> {
    let s = sql.to_lowercase();
    let mut issues = Vec::new();
    if !s.contains("select") && !s.contains("with") {
        issues.push(LINT_NOT_SELECT.to_string());
    }
    if LIMIT_KEYWORD.is_match(&s) {
        issues.push(LINT_LIMIT.to_string());
    }
    issues
}

fn chart_title(kind: &str, joiner: &str, chart: &ChartData) -> String {
    format!(
        "{} chart ({} {} {})",
        kind,
        chart.metrics.join(" vs "),
        joiner,
        chart.category
    )
}

/// Build the assistant message for a successful run.
///
/// Returns the presentation actually used: a chart request whose data
/// cannot be extracted falls back to text.
pub fn compose_message(
    presentation: Presentation,
    table: &TableData,
    answer: &str,
) -> (Presentation, Message) {
    let chart = if presentation.is_chart() {
        extract_chart_data(&table.columns, &table.rows)
    } else {
        None
    };

    match (presentation, chart) {
        (Presentation::Bar, Some(chart)) => (
            Presentation::Bar,
            Message::assistant_with(chart_title("Bar", "by", &chart), Attachment::BarChart(chart)),
        ),
        (Presentation::Line, Some(chart)) => (
            Presentation::Line,
            Message::assistant_with(
                chart_title("Line", "over", &chart),
                Attachment::LineChart(chart),
            ),
        ),
        (Presentation::Table, _) => (
            Presentation::Table,
            Message::assistant_with("", Attachment::Table(table.clone())),
        ),
        _ => {
            let content = if answer.is_empty() { "Done." } else { answer };
            (Presentation::Text, Message::assistant(content))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MessageKind;
    use serde_json::json;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn rows(v: Value) -> Vec<Vec<Value>> {
        serde_json::from_value(v).unwrap()
    }

    // ---- Cell formatting ----

    #[test]
    fn test_format_cell_thousands() {
        assert_eq!(format_cell("revenue_k", &json!(120.4), Currency::Gbp), "£120K");
        assert_eq!(format_cell("Margin_K", &json!("97.6"), Currency::Cad), "C$98K");
        assert_eq!(
            format_cell("Revenue (thousands)", &json!(5), Currency::Gbp),
            "£5K"
        );
    }

    #[test]
    fn test_format_cell_passthrough() {
        assert_eq!(format_cell("region", &json!("North"), Currency::Gbp), "North");
        assert_eq!(format_cell("deals", &json!(12), Currency::Gbp), "12");
        assert_eq!(format_cell("revenue_k", &json!("n/a"), Currency::Gbp), "n/a");
        assert_eq!(format_cell("revenue_k", &Value::Null, Currency::Gbp), "");
    }

    // ---- Summary ----

    #[test]
    fn test_summary_no_results() {
        assert_eq!(summarize_rows(&[], &[], Currency::Gbp), NO_RESULTS);
        assert_eq!(summarize_rows(&cols(&["a"]), &[], Currency::Gbp), NO_RESULTS);
    }

    #[test]
    fn test_summary_single_value() {
        let out = summarize_rows(&cols(&["total_revenue_k"]), &rows(json!([[1500.2]])), Currency::Gbp);
        assert_eq!(out, "total_revenue_k: £1500K");
    }

    #[test]
    fn test_summary_table_lines() {
        let out = summarize_rows(
            &cols(&["region", "deals"]),
            &rows(json!([["North", 3], ["South", null]])),
            Currency::Gbp,
        );
        assert_eq!(out, "region | deals\nNorth | 3\nSouth | ");
    }

    #[test]
    fn test_summary_truncates_after_eight() {
        let data: Vec<Vec<Value>> = (0..11).map(|i| vec![json!(i), json!("x")]).collect();
        let out = summarize_rows(&cols(&["n", "s"]), &data, Currency::Gbp);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 1 + SUMMARY_MAX_ROWS + 1);
        assert_eq!(lines[8], "7 | x");
        assert_eq!(lines.last().copied(), Some("... 3 more rows"));
    }

    // ---- SQL lint ----

    #[test]
    fn test_validate_sql_clean() {
        assert!(validate_sql("SELECT TOP 5 * FROM deals").is_empty());
        assert!(validate_sql("WITH x AS (SELECT 1) SELECT * FROM x").is_empty());
    }

    #[test]
    fn test_validate_sql_issues() {
        assert_eq!(validate_sql("DELETE FROM deals"), vec![LINT_NOT_SELECT]);
        assert_eq!(
            validate_sql("select * from deals LIMIT 10"),
            vec![LINT_LIMIT]
        );
        assert_eq!(validate_sql(""), vec![LINT_NOT_SELECT]);
    }

    #[test]
    fn test_validate_sql_limit_inside_identifier_is_fine() {
        assert!(validate_sql("select credit_limit from accounts").is_empty());
    }

    // ---- Message composition ----

    fn region_table() -> TableData {
        TableData {
            columns: cols(&["Region", "RevenueK", "MarginK"]),
            rows: rows(json!([["North", 1, 2], ["South", 3, 4]])),
        }
    }

    #[test]
    fn test_compose_bar_chart() {
        let (used, msg) = compose_message(Presentation::Bar, &region_table(), "ignored");
        assert_eq!(used, Presentation::Bar);
        assert_eq!(msg.kind(), Some(MessageKind::BarChart));
        assert_eq!(msg.content, "Bar chart (RevenueK vs MarginK by Region)");
    }

    #[test]
    fn test_compose_line_chart() {
        let (used, msg) = compose_message(Presentation::Line, &region_table(), "");
        assert_eq!(used, Presentation::Line);
        assert_eq!(msg.kind(), Some(MessageKind::LineChart));
        assert_eq!(msg.content, "Line chart (RevenueK vs MarginK over Region)");
    }

    #[test]
    fn test_compose_chart_falls_back_to_text() {
        let table = TableData {
            columns: cols(&["a", "b"]),
            rows: rows(json!([[1, 2]])),
        };
        let (used, msg) = compose_message(Presentation::Bar, &table, "Two numbers.");
        assert_eq!(used, Presentation::Text);
        assert_eq!(msg.kind(), None);
        assert_eq!(msg.content, "Two numbers.");
    }

    #[test]
    fn test_compose_table_has_empty_content() {
        let (used, msg) = compose_message(Presentation::Table, &region_table(), "answer");
        assert_eq!(used, Presentation::Table);
        assert_eq!(msg.content, "");
        match msg.attachment {
            Some(Attachment::Table(t)) => assert_eq!(t, region_table()),
            other => panic!("unexpected attachment: {:?}", other),
        }
    }

    #[test]
    fn test_compose_text_defaults_to_done() {
        let (_, msg) = compose_message(Presentation::Text, &TableData::default(), "");
        assert_eq!(msg.content, "Done.");
    }
}

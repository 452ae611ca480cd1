//! KPI strip: headline figures for the current context.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use sqlchat_core::Currency;

use crate::chart::cell_to_number;
use crate::response::format_thousands;

/// Placeholder shown for a missing or unavailable figure.
pub const KPI_PLACEHOLDER: &str = "-";

/// Quarter label used when the server omits one or the fetch failed.
pub const DEFAULT_QUARTER: &str = "This quarter";

/// Raw figures as returned by the server, in thousands.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KpiFigures {
    pub revenue_k: Value,
    pub margin_k: Value,
    pub gap_k: Value,
    pub coverage_ratio: Value,
}

/// Response body of the KPI strip call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KpiStrip {
    pub kpis: KpiFigures,
    pub quarter: Option<String>,
}

/// Display-ready KPI strip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KpiDisplay {
    pub quarter: String,
    pub revenue: String,
    pub margin: String,
    pub gap: String,
    pub coverage: String,
}

impl KpiDisplay {
    pub fn from_strip(strip: &KpiStrip, currency: Currency) -> Self {
        let money = |v: &Value| {
            cell_to_number(v)
                .map(|n| format_thousands(n, currency))
                .unwrap_or_else(|| KPI_PLACEHOLDER.to_string())
        };
        let quarter = strip
            .quarter
            .as_deref()
            .filter(|q| !q.is_empty())
            .unwrap_or(DEFAULT_QUARTER);
        Self {
            quarter: quarter.to_string(),
            revenue: money(&strip.kpis.revenue_k),
            margin: money(&strip.kpis.margin_k),
            gap: money(&strip.kpis.gap_k),
            coverage: cell_to_number(&strip.kpis.coverage_ratio)
                .map(|n| format!("{:.2}x", n))
                .unwrap_or_else(|| KPI_PLACEHOLDER.to_string()),
        }
    }

    /// Every figure unavailable.
    pub fn unavailable() -> Self {
        Self {
            quarter: DEFAULT_QUARTER.to_string(),
            revenue: KPI_PLACEHOLDER.to_string(),
            margin: KPI_PLACEHOLDER.to_string(),
            gap: KPI_PLACEHOLDER.to_string(),
            coverage: KPI_PLACEHOLDER.to_string(),
        }
    }
}

impl std::fmt::Display for KpiDisplay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: revenue {} | margin {} | gap {} | coverage {}",
            self.quarter, self.revenue, self.margin, self.gap, self.coverage
        )
    }
}

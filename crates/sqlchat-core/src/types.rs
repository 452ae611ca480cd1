//! Shared domain types for query scoping.
//!
//! Region, reporting currency and stage bucket travel with every remote
//! request and are persisted between runs.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SqlChatError;

// =============================================================================
// Region / Currency
// =============================================================================

/// Sales region a query is scoped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Region {
    /// United Kingdom (primary region).
    #[default]
    #[serde(rename = "GBR")]
    Gbr,
    /// Canada (alternate region).
    #[serde(rename = "CAN")]
    Can,
}

impl Region {
    /// Wire code sent to the backend.
    pub fn code(&self) -> &'static str {
        match self {
            Region::Gbr => "GBR",
            Region::Can => "CAN",
        }
    }

    /// Short label for context badges.
    pub fn label(&self) -> &'static str {
        match self {
            Region::Gbr => "UK",
            Region::Can => "CAN",
        }
    }

    /// Reporting currency implied by this region.
    pub fn currency(&self) -> Currency {
        match self {
            Region::Can => Currency::Cad,
            Region::Gbr => Currency::Gbp,
        }
    }

    /// Parse a region code, treating anything other than `CAN` as the
    /// primary region.
    pub fn parse_lenient(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("CAN") {
            Region::Can
        } else {
            Region::Gbr
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Region {
    type Err = SqlChatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GBR" | "UK" => Ok(Region::Gbr),
            "CAN" => Ok(Region::Can),
            _ => Err(SqlChatError::InvalidValue {
                field: "region".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Reporting currency. Always derived from [`Region`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Currency {
    #[default]
    #[serde(rename = "GBP")]
    Gbp,
    #[serde(rename = "CAD")]
    Cad,
}

impl Currency {
    /// ISO code sent to the backend.
    pub fn code(&self) -> &'static str {
        match self {
            Currency::Gbp => "GBP",
            Currency::Cad => "CAD",
        }
    }

    /// Symbol prefix used when rendering amounts.
    pub fn symbol(&self) -> &'static str {
        match self {
            Currency::Gbp => "£",
            Currency::Cad => "C$",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

// =============================================================================
// StageBucket
// =============================================================================

/// One of seven mutually exclusive pipeline-funnel scopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageBucket {
    #[default]
    NotApplied,
    ClosedWonForecast,
    Forecast,
    Bridge,
    Upside,
    ClosedWon,
    Pipeline,
}

impl StageBucket {
    /// All stage buckets in prompt order.
    pub const ALL: [StageBucket; 7] = [
        StageBucket::NotApplied,
        StageBucket::ClosedWonForecast,
        StageBucket::Forecast,
        StageBucket::Bridge,
        StageBucket::Upside,
        StageBucket::ClosedWon,
        StageBucket::Pipeline,
    ];

    /// Wire value.
    pub fn as_str(&self) -> &'static str {
        match self {
            StageBucket::NotApplied => "not_applied",
            StageBucket::ClosedWonForecast => "closed_won_forecast",
            StageBucket::Forecast => "forecast",
            StageBucket::Bridge => "bridge",
            StageBucket::Upside => "upside",
            StageBucket::ClosedWon => "closed_won",
            StageBucket::Pipeline => "pipeline",
        }
    }

    /// Human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            StageBucket::NotApplied => "Not Applied",
            StageBucket::ClosedWonForecast => "Closed Won + Forecast",
            StageBucket::Forecast => "Forecast",
            StageBucket::Bridge => "Bridge",
            StageBucket::Upside => "Upside",
            StageBucket::ClosedWon => "Closed Won",
            StageBucket::Pipeline => "Pipeline",
        }
    }

    /// Parse a stage value, coercing anything outside the fixed set to
    /// [`StageBucket::NotApplied`].
    pub fn parse_lenient(raw: &str) -> Self {
        raw.parse().unwrap_or_default()
    }

    /// The selectable options shown in a stage prompt.
    pub fn options() -> Vec<StageOption> {
        Self::ALL.iter().map(|s| StageOption::from(*s)).collect()
    }
}

impl fmt::Display for StageBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageBucket {
    type Err = SqlChatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .iter()
            .find(|b| b.as_str() == wanted)
            .copied()
            .ok_or_else(|| SqlChatError::InvalidValue {
                field: "stage_bucket".to_string(),
                value: s.to_string(),
            })
    }
}

/// A `{value, label}` pair offered to the user in a stage prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageOption {
    pub value: StageBucket,
    pub label: String,
}

impl From<StageBucket> for StageOption {
    fn from(value: StageBucket) -> Self {
        Self {
            value,
            label: value.label().to_string(),
        }
    }
}

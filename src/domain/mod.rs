//! Core domain types for scan sessions and screening results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Lifecycle state of a scan session.
///
/// `Idle` is the absence of any running session; it is reported by status
/// projections but never stored on a session row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    Idle,
    Running,
    Completed,
    Failed,
}

impl ScanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl TryFrom<&str> for ScanStatus {
    type Error = String;

    fn try_from(s: &str) -> std::result::Result<Self, Self::Error> {
        match s {
            "idle" => Ok(Self::Idle),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown scan status: {other}")),
        }
    }
}

/// Durable metadata of one scan session, as projected by `snapshot()`.
///
/// The universe itself is not carried here (it can be thousands of symbols);
/// `total` is its length. Symbols at index < `cursor` have been processed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanSession {
    pub id: Uuid,
    pub status: ScanStatus,
    pub cursor: u32,
    pub total: u32,
    pub batch_size: u32,
    pub fencing_token: i64,
    /// Passing symbols recorded so far.
    pub found: u32,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ScanSession {
    pub fn is_running(&self) -> bool {
        self.status == ScanStatus::Running
    }
}

/// Outcome of evaluating one symbol: a full report or a recorded error.
///
/// A failed evaluation still occupies the symbol's slot: it is processed,
/// never silently skipped.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScreeningOutcome {
    Report(SymbolReport),
    Error { symbol: String, error: String },
}

impl ScreeningOutcome {
    pub fn symbol(&self) -> &str {
        match self {
            Self::Report(r) => &r.symbol,
            Self::Error { symbol, .. } => symbol,
        }
    }

    pub fn passes(&self) -> bool {
        matches!(self, Self::Report(r) if r.passes)
    }

    pub fn report(&self) -> Option<&SymbolReport> {
        match self {
            Self::Report(r) => Some(r),
            Self::Error { .. } => None,
        }
    }
}

/// One committed per-symbol result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreeningResult {
    pub symbol: String,
    pub evaluated_at: DateTime<Utc>,
    pub outcome: ScreeningOutcome,
}

impl ScreeningResult {
    pub fn from_report(report: SymbolReport) -> Self {
        Self {
            symbol: report.symbol.clone(),
            evaluated_at: Utc::now(),
            outcome: ScreeningOutcome::Report(report),
        }
    }

    pub fn from_error(symbol: impl Into<String>, error: impl ToString) -> Self {
        let symbol = symbol.into();
        Self {
            symbol: symbol.clone(),
            evaluated_at: Utc::now(),
            outcome: ScreeningOutcome::Error {
                symbol,
                error: error.to_string(),
            },
        }
    }
}

/// Trend-template evaluation of one symbol.
///
/// `criteria` maps criterion id ("1".."9") to whether it was met; `None`
/// means the available history was too short to evaluate that criterion,
/// which counts as unmet for the score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolReport {
    pub symbol: String,
    pub price: f64,
    pub score: u32,
    pub passes: bool,
    pub sma_50: Option<f64>,
    pub sma_150: Option<f64>,
    pub sma_200: Option<f64>,
    pub high_52w: f64,
    pub low_52w: f64,
    pub pct_above_low: f64,
    pub pct_from_high: f64,
    pub criteria: BTreeMap<String, Option<bool>>,
}

/// Results of the most recent completed full scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletedScan {
    pub session_id: Uuid,
    pub total_scanned: u32,
    pub completed_at: DateTime<Utc>,
    /// Passing reports only, in universe order.
    pub passing: Vec<SymbolReport>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_status_round_trips() {
        for status in [
            ScanStatus::Idle,
            ScanStatus::Running,
            ScanStatus::Completed,
            ScanStatus::Failed,
        ] {
            assert_eq!(ScanStatus::try_from(status.as_str()), Ok(status));
        }
        assert!(ScanStatus::try_from("resting").is_err());
    }

    #[test]
    fn error_outcome_never_passes() {
        let result = ScreeningResult::from_error("RELIANCE", "no data");
        assert_eq!(result.symbol, "RELIANCE");
        assert!(!result.outcome.passes());
        assert!(result.outcome.report().is_none());
    }
}

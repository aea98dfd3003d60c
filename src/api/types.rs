use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{ScreeningResult, SymbolReport};

// ============================================================================
// Quick scan
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct QuickScanQuery {
    /// Comma-separated symbol list
    pub symbols: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuickScanResponse {
    pub success: bool,
    pub scanned: usize,
    pub passing: usize,
    pub results: Vec<ScreeningResult>,
}

// ============================================================================
// Full scan control
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct ScanAllResponse {
    pub status: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CronScanResponse {
    /// idle | running | completed | stale
    pub status: String,
    pub processed: u32,
    pub cursor: u32,
    pub total: u32,
    pub found_in_batch: u32,
    pub found_total: u32,
}

impl CronScanResponse {
    pub fn empty(status: &str) -> Self {
        Self {
            status: status.to_string(),
            processed: 0,
            cursor: 0,
            total: 0,
            found_in_batch: 0,
            found_total: 0,
        }
    }
}

// ============================================================================
// Status and results
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub is_scanning: bool,
    pub status: String,
    pub progress: u32,
    pub total: u32,
    pub progress_pct: f64,
    pub found: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResultsResponse {
    pub results: Vec<SymbolReport>,
    pub count: usize,
    pub last_scan: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub db: String,
    pub uptime_secs: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct WebhookResponse {
    pub ok: bool,
}

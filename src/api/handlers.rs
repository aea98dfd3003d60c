use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use tracing::{error, info, warn};

use crate::api::{state::AppState, types::*};
use crate::bot::TelegramUpdate;
use crate::error::ScanError;
use crate::scanner::{StartScanOutcome, StepOutcome};

fn internal(err: ScanError) -> (StatusCode, String) {
    error!(%err, "Request failed");
    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}

/// GET /api/scan?symbols=A,B -- synchronous quick scan outside any session
pub async fn quick_scan(
    State(state): State<AppState>,
    Query(query): Query<QuickScanQuery>,
) -> std::result::Result<Json<QuickScanResponse>, (StatusCode, String)> {
    let symbols: Vec<String> = query
        .symbols
        .split(',')
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect();
    if symbols.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "symbols query parameter must name at least one symbol".to_string(),
        ));
    }

    let results = state.dispatcher.quick_scan(symbols).await;
    let passing = results.iter().filter(|r| r.outcome.passes()).count();
    Ok(Json(QuickScanResponse {
        success: true,
        scanned: results.len(),
        passing,
        results,
    }))
}

/// POST /api/scanall -- force-start a full universe scan
pub async fn scan_all(
    State(state): State<AppState>,
) -> std::result::Result<Json<ScanAllResponse>, (StatusCode, String)> {
    match state.dispatcher.start_scan(true).await.map_err(internal)? {
        StartScanOutcome::Started { session_id, total } => {
            info!(%session_id, total, "Full scan started via API");
            Ok(Json(ScanAllResponse {
                status: "started".to_string(),
                message: format!("Scan started over {total} symbols"),
            }))
        }
        StartScanOutcome::AlreadyRunning => Ok(Json(ScanAllResponse {
            status: "already_running".to_string(),
            message: "A scan is already in progress".to_string(),
        })),
        StartScanOutcome::CoolingDown { until } => Ok(Json(ScanAllResponse {
            status: "cooling_down".to_string(),
            message: format!("Last scan finished recently; next start allowed at {until}"),
        })),
    }
}

/// GET /api/cron-scan -- run one step of the active session
pub async fn cron_scan(
    State(state): State<AppState>,
) -> std::result::Result<Json<CronScanResponse>, (StatusCode, String)> {
    match state.dispatcher.continue_scan().await.map_err(internal)? {
        StepOutcome::NoActiveSession => Ok(Json(CronScanResponse::empty("idle"))),
        StepOutcome::Stale => Ok(Json(CronScanResponse::empty("stale"))),
        StepOutcome::Committed(summary) => Ok(Json(CronScanResponse {
            status: if summary.completed {
                "completed".to_string()
            } else {
                "running".to_string()
            },
            processed: summary.processed,
            cursor: summary.cursor,
            total: summary.total,
            found_in_batch: summary.found_in_batch,
            found_total: summary.found_total,
        })),
    }
}

/// GET /api/status
pub async fn get_status(
    State(state): State<AppState>,
) -> std::result::Result<Json<StatusResponse>, (StatusCode, String)> {
    let report = state.dispatcher.status().await.map_err(internal)?;
    Ok(Json(StatusResponse {
        is_scanning: report.status == crate::domain::ScanStatus::Running,
        status: report.status.as_str().to_string(),
        progress: report.cursor,
        total: report.total,
        progress_pct: report.progress_pct,
        found: report.found,
    }))
}

/// GET /api/results -- passing symbols of the last completed scan
pub async fn get_results(
    State(state): State<AppState>,
) -> std::result::Result<Json<ResultsResponse>, (StatusCode, String)> {
    let scan = state.dispatcher.results().await.map_err(internal)?;
    Ok(Json(match scan {
        Some(scan) => ResultsResponse {
            count: scan.passing.len(),
            last_scan: Some(scan.completed_at),
            results: scan.passing,
        },
        None => ResultsResponse {
            results: vec![],
            count: 0,
            last_scan: None,
        },
    }))
}

/// GET /api/health -- lightweight liveness/readiness probe
pub async fn health(
    State(state): State<AppState>,
) -> std::result::Result<Json<HealthResponse>, (StatusCode, Json<HealthResponse>)> {
    let db = match state.store.ping().await {
        Ok(()) => "connected".to_string(),
        Err(_) => "disconnected".to_string(),
    };
    let ok = db == "connected";
    let resp = HealthResponse {
        status: if ok { "ok" } else { "degraded" }.to_string(),
        db,
        uptime_secs: state.uptime_seconds(),
    };
    if ok {
        Ok(Json(resp))
    } else {
        Err((StatusCode::SERVICE_UNAVAILABLE, Json(resp)))
    }
}

/// POST /api/webhook -- Telegram update intake
///
/// Always answers `{ok: true}`; neither a failed command nor a payload we
/// cannot decode may make Telegram retry the update.
pub async fn webhook(
    State(state): State<AppState>,
    Json(payload): Json<serde_json::Value>,
) -> Json<WebhookResponse> {
    match serde_json::from_value::<TelegramUpdate>(payload) {
        Ok(update) => {
            if let Some(bot) = &state.bot {
                bot.handle_update(update).await;
            }
        }
        Err(err) => warn!(%err, "Dropping undecodable webhook payload"),
    }
    Json(WebhookResponse { ok: true })
}

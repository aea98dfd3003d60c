//! HTML reply formatting for bot commands.

use crate::domain::{CompletedScan, ScanStatus, ScreeningOutcome, ScreeningResult, SymbolReport};
use crate::scanner::ScanStatusReport;

const CRITERIA_LABELS: [(&str, &str); 9] = [
    ("1", "Price above 150-day SMA"),
    ("2", "Price above 200-day SMA"),
    ("3", "150-day SMA above 200-day SMA"),
    ("4", "200-day SMA trending up"),
    ("5", "50-day SMA above 150-day SMA"),
    ("6", "50-day SMA above 200-day SMA"),
    ("7", "Price above 50-day SMA"),
    ("8", "At least 30% above 52-week low"),
    ("9", "Within 25% of 52-week high"),
];

/// Progress view for /status.
pub fn format_status(report: &ScanStatusReport) -> String {
    match report.status {
        ScanStatus::Idle => "No scan has run yet. Send /scanall to start one.".to_string(),
        ScanStatus::Running => format!(
            "⏳ <b>Scan running</b>\n{} of {} symbols ({:.1}%)\n{} passing so far",
            report.cursor, report.total, report.progress_pct, report.found
        ),
        ScanStatus::Completed => {
            let when = report
                .completed_at
                .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
                .unwrap_or_else(|| "unknown time".to_string());
            format!(
                "✅ <b>Last scan completed</b> at {when}\n{} symbols scanned, {} passing.\nUse /list to see them.",
                report.total, report.found
            )
        }
        ScanStatus::Failed => {
            "⚠️ The last scan was abandoned. Send /scanall to start a new one.".to_string()
        }
    }
}

/// Full passing list for /list.
pub fn format_results(results: Option<&CompletedScan>) -> String {
    let Some(scan) = results else {
        return "No completed scan yet. Send /scanall to start one.".to_string();
    };
    if scan.passing.is_empty() {
        return format!(
            "Last scan covered {} symbols; none met all nine criteria.",
            scan.total_scanned
        );
    }
    let mut text = format!(
        "<b>Trend template leaders</b> ({} of {} scanned)\n",
        scan.passing.len(),
        scan.total_scanned
    );
    for (i, report) in scan.passing.iter().enumerate() {
        text.push_str(&format!(
            "\n{}. <b>{}</b> — {:.2} ({:.1}% off high)",
            i + 1,
            report.symbol,
            report.price,
            report.pct_from_high
        ));
    }
    text
}

/// One-line-per-symbol view for the quick /scan shortlist.
pub fn format_quick_scan(results: &[ScreeningResult]) -> String {
    let passing = results.iter().filter(|r| r.outcome.passes()).count();
    let mut text = format!(
        "⚡ <b>Quick scan</b> — {passing} of {} pass\n",
        results.len()
    );
    for result in results {
        match &result.outcome {
            ScreeningOutcome::Report(report) => {
                let mark = if report.passes { "✅" } else { "❌" };
                text.push_str(&format!(
                    "\n{mark} <b>{}</b> — {:.2}, score {}/9",
                    report.symbol, report.price, report.score
                ));
            }
            ScreeningOutcome::Error { symbol, error } => {
                text.push_str(&format!("\n⚠️ <b>{symbol}</b> — {error}"));
            }
        }
    }
    text.push_str("\n\nUse /scanall to cover the full universe.");
    text
}

/// Detailed criterion-by-criterion view for /check.
pub fn format_check(report: &SymbolReport) -> String {
    let verdict = if report.passes {
        "✅ passes the trend template"
    } else {
        "❌ does not pass"
    };
    let mut text = format!(
        "<b>{}</b> — {:.2}\nScore {}/9, {}\n",
        report.symbol, report.price, report.score, verdict
    );
    for (id, label) in CRITERIA_LABELS {
        let mark = match report.criteria.get(id).copied().flatten() {
            Some(true) => "✅",
            Some(false) => "❌",
            None => "➖",
        };
        text.push_str(&format!("\n{mark} {label}"));
    }
    text.push_str(&format!(
        "\n\n52w range: {:.2} – {:.2}\n{:.1}% above low, {:.1}% from high",
        report.low_52w, report.high_52w, report.pct_above_low, report.pct_from_high
    ));
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::BTreeMap;
    use uuid::Uuid;

    fn report(passes: bool) -> SymbolReport {
        let mut criteria = BTreeMap::new();
        for (id, _) in CRITERIA_LABELS {
            criteria.insert(id.to_string(), Some(passes));
        }
        if !passes {
            criteria.insert("2".to_string(), None);
        }
        SymbolReport {
            symbol: "RELIANCE".to_string(),
            price: 2843.5,
            score: if passes { 9 } else { 7 },
            passes,
            sma_50: Some(2800.0),
            sma_150: Some(2700.0),
            sma_200: Some(2600.0),
            high_52w: 2950.0,
            low_52w: 2000.0,
            pct_above_low: 42.2,
            pct_from_high: 3.6,
            criteria,
        }
    }

    #[test]
    fn check_view_lists_all_nine_criteria() {
        let text = format_check(&report(true));
        assert!(text.contains("Score 9/9"));
        assert!(text.contains("passes the trend template"));
        for (_, label) in CRITERIA_LABELS {
            assert!(text.contains(label), "missing label: {label}");
        }
    }

    #[test]
    fn unevaluable_criterion_shows_neutral_mark() {
        let text = format_check(&report(false));
        assert!(text.contains("➖ Price above 200-day SMA"));
        assert!(text.contains("does not pass"));
    }

    #[test]
    fn results_view_handles_absence() {
        assert!(format_results(None).contains("No completed scan yet"));
        let empty = CompletedScan {
            session_id: Uuid::new_v4(),
            total_scanned: 100,
            completed_at: Utc::now(),
            passing: vec![],
        };
        assert!(format_results(Some(&empty)).contains("none met all nine"));
    }

    #[test]
    fn quick_scan_view_mixes_reports_and_errors() {
        let results = vec![
            ScreeningResult::from_report(report(true)),
            ScreeningResult::from_error("NOSUCH", "no data returned"),
        ];
        let text = format_quick_scan(&results);
        assert!(text.contains("1 of 2 pass"));
        assert!(text.contains("✅ <b>RELIANCE</b>"));
        assert!(text.contains("⚠️ <b>NOSUCH</b> — no data returned"));
    }

    #[test]
    fn status_view_tracks_lifecycle() {
        let mut status = ScanStatusReport {
            status: ScanStatus::Running,
            session_id: Some(Uuid::new_v4()),
            cursor: 120,
            total: 500,
            progress_pct: 24.0,
            found: 4,
            batch_size: 30,
            started_at: Some(Utc::now()),
            updated_at: Some(Utc::now()),
            completed_at: None,
        };
        assert!(format_status(&status).contains("120 of 500"));
        status.status = ScanStatus::Failed;
        assert!(format_status(&status).contains("abandoned"));
    }
}

//! Trend-template scoring: nine criteria over one year of daily candles.
//!
//! Criteria whose SMA window exceeds the available history are reported as
//! `None` and count as unmet; `passes` requires all nine.

use std::collections::BTreeMap;

use crate::config::ScreenerConfig;
use crate::domain::SymbolReport;
use crate::error::EvalError;
use crate::evaluator::DailySeries;

/// Simple moving average of the last `window` values.
fn sma(values: &[f64], window: usize) -> Option<f64> {
    if window == 0 || values.len() < window {
        return None;
    }
    let tail = &values[values.len() - window..];
    Some(tail.iter().sum::<f64>() / window as f64)
}

/// 200-day SMA sampled `lookback` trading days before the last close.
fn sma_200_lookback(close: &[f64], lookback: usize) -> Option<f64> {
    if close.len() < 200 + lookback {
        return None;
    }
    let end = close.len() - lookback;
    sma(&close[..end], 200)
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

/// Score one symbol's history against the trend template.
pub fn score_series(
    symbol: &str,
    series: &DailySeries,
    config: &ScreenerConfig,
) -> Result<SymbolReport, EvalError> {
    if series.is_empty() {
        return Err(EvalError::NoData);
    }
    let days = series.len();
    if days < config.min_history_days {
        return Err(EvalError::InsufficientHistory {
            days,
            min_days: config.min_history_days,
        });
    }

    let price = *series.close.last().expect("non-empty series");
    let high_52w = series.high.iter().cloned().fold(f64::MIN, f64::max);
    let low_52w = series.low.iter().cloned().fold(f64::MAX, f64::min);
    if !(high_52w.is_finite() && low_52w.is_finite()) || low_52w <= 0.0 || high_52w <= 0.0 {
        return Err(EvalError::Fetch("degenerate price range".to_string()));
    }

    let sma_50 = sma(&series.close, 50);
    let sma_150 = sma(&series.close, 150);
    let sma_200 = sma(&series.close, 200);
    let sma_200_past = sma_200_lookback(&series.close, config.trend_lookback_days);

    let pct_above_low = (price - low_52w) / low_52w * 100.0;
    let pct_from_high = (high_52w - price) / high_52w * 100.0;

    let mut criteria: BTreeMap<String, Option<bool>> = BTreeMap::new();
    criteria.insert("1".into(), sma_150.map(|v| price > v));
    criteria.insert("2".into(), sma_200.map(|v| price > v));
    criteria.insert(
        "3".into(),
        sma_150.zip(sma_200).map(|(s150, s200)| s150 > s200),
    );
    criteria.insert(
        "4".into(),
        sma_200.zip(sma_200_past).map(|(now, past)| now > past),
    );
    criteria.insert(
        "5".into(),
        sma_50.zip(sma_150).map(|(s50, s150)| s50 > s150),
    );
    criteria.insert(
        "6".into(),
        sma_50.zip(sma_200).map(|(s50, s200)| s50 > s200),
    );
    criteria.insert("7".into(), sma_50.map(|v| price > v));
    criteria.insert(
        "8".into(),
        Some(pct_above_low >= config.min_pct_above_low),
    );
    criteria.insert(
        "9".into(),
        Some(pct_from_high <= config.max_pct_from_high),
    );

    let score = criteria.values().filter(|v| **v == Some(true)).count() as u32;
    let passes = score == criteria.len() as u32;

    Ok(SymbolReport {
        symbol: symbol.to_string(),
        price: round2(price),
        score,
        passes,
        sma_50: sma_50.map(round2),
        sma_150: sma_150.map(round2),
        sma_200: sma_200.map(round2),
        high_52w: round2(high_52w),
        low_52w: round2(low_52w),
        pct_above_low: round1(pct_above_low),
        pct_from_high: round1(pct_from_high),
        criteria,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series_from_close(close: Vec<f64>) -> DailySeries {
        DailySeries {
            high: close.iter().map(|c| c * 1.01).collect(),
            low: close.iter().map(|c| c * 0.99).collect(),
            close,
        }
    }

    /// Steady riser: every SMA ordered correctly, near the high, far from
    /// the low.
    fn uptrend() -> DailySeries {
        let close: Vec<f64> = (0..252).map(|i| 100.0 + i as f64).collect();
        series_from_close(close)
    }

    /// Steady decliner: inverse ordering everywhere.
    fn downtrend() -> DailySeries {
        let close: Vec<f64> = (0..252).map(|i| 400.0 - i as f64).collect();
        series_from_close(close)
    }

    #[test]
    fn uptrend_passes_all_nine() {
        let report = score_series("UP", &uptrend(), &ScreenerConfig::default()).unwrap();
        assert_eq!(report.score, 9);
        assert!(report.passes);
        assert!(report.criteria.values().all(|v| *v == Some(true)));
        assert!(report.sma_50.unwrap() > report.sma_150.unwrap());
        assert!(report.sma_150.unwrap() > report.sma_200.unwrap());
    }

    #[test]
    fn downtrend_fails() {
        let report = score_series("DOWN", &downtrend(), &ScreenerConfig::default()).unwrap();
        assert!(!report.passes);
        assert_eq!(report.criteria["1"], Some(false));
        assert_eq!(report.criteria["4"], Some(false));
        // A straight decliner sits on its 52-week low.
        assert_eq!(report.criteria["8"], Some(false));
    }

    #[test]
    fn short_history_disables_long_sma_criteria() {
        // 100 days: enough for the 50-SMA, not for 150/200.
        let close: Vec<f64> = (0..100).map(|i| 100.0 + i as f64).collect();
        let report =
            score_series("NEW", &series_from_close(close), &ScreenerConfig::default()).unwrap();
        assert_eq!(report.criteria["1"], None);
        assert_eq!(report.criteria["2"], None);
        assert_eq!(report.criteria["4"], None);
        assert_eq!(report.criteria["7"], Some(true));
        assert!(!report.passes);
        assert!(report.score < 9);
        assert!(report.sma_150.is_none());
        assert!(report.sma_200.is_none());
    }

    #[test]
    fn too_short_history_is_an_error() {
        let close: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let err = score_series("TINY", &series_from_close(close), &ScreenerConfig::default())
            .unwrap_err();
        assert_eq!(
            err,
            EvalError::InsufficientHistory {
                days: 30,
                min_days: 50
            }
        );
    }

    #[test]
    fn empty_series_is_no_data() {
        let err =
            score_series("VOID", &DailySeries::default(), &ScreenerConfig::default()).unwrap_err();
        assert_eq!(err, EvalError::NoData);
    }

    #[test]
    fn sma_matches_hand_computation() {
        let values = vec![1.0, 2.0, 3.0, 4.0];
        assert_eq!(sma(&values, 2), Some(3.5));
        assert_eq!(sma(&values, 4), Some(2.5));
        assert_eq!(sma(&values, 5), None);
    }

    #[test]
    fn trend_lookback_window_ends_before_last_close() {
        // Flat then a late jump: the lookback sample excludes the jump.
        let mut close = vec![100.0; 252];
        for v in close.iter_mut().rev().take(10) {
            *v = 200.0;
        }
        let now = sma(&close, 200).unwrap();
        let past = sma_200_lookback(&close, 22).unwrap();
        assert!(now > past);
    }
}

//! Shared fixtures: a synthetic candle source and a wired dispatcher over
//! the in-memory store.

use async_trait::async_trait;
use std::sync::Arc;

use trendscan::config::{ScanConfig, ScreenerConfig};
use trendscan::error::EvalError;
use trendscan::evaluator::{CandleSource, DailySeries, Evaluator, TrendTemplateEvaluator};
use trendscan::scanner::{BatchStepper, ScanDispatcher};
use trendscan::store::MemorySessionStore;
use trendscan::universe::UniverseProvider;

/// Symbols starting with "UP" ride a year-long rally and pass all nine
/// criteria; "MISSING" has no data; everything else declines and fails.
pub struct SyntheticCandles;

#[async_trait]
impl CandleSource for SyntheticCandles {
    async fn daily_history(&self, symbol: &str) -> Result<DailySeries, EvalError> {
        if symbol.starts_with("MISSING") {
            return Err(EvalError::NoData);
        }
        let close: Vec<f64> = if symbol.starts_with("UP") {
            (0..252).map(|i| 100.0 + i as f64).collect()
        } else {
            (0..252).map(|i| 400.0 - i as f64).collect()
        };
        Ok(DailySeries {
            high: close.iter().map(|c| c * 1.01).collect(),
            low: close.iter().map(|c| c * 0.99).collect(),
            close,
        })
    }
}

pub fn evaluator() -> Arc<dyn Evaluator> {
    Arc::new(TrendTemplateEvaluator::new(
        Arc::new(SyntheticCandles),
        ScreenerConfig::default(),
    ))
}

pub fn dispatcher(store: Arc<MemorySessionStore>, config: ScanConfig) -> Arc<ScanDispatcher> {
    let evaluator = evaluator();
    let stepper = BatchStepper::new(store.clone(), evaluator.clone(), config.clone());
    Arc::new(ScanDispatcher::new(
        store,
        stepper,
        evaluator,
        UniverseProvider::new(None),
        None,
        config,
    ))
}

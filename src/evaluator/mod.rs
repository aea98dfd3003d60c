//! Screening evaluator: symbol + market data -> trend-template report.
//!
//! The scan core depends only on the `Evaluator` contract: a report or a
//! typed per-symbol error, within the caller's timeout. Candle fetching sits
//! behind `CandleSource` so tests run on synthetic series.

mod template;
mod yahoo;

pub use template::score_series;
pub use yahoo::YahooCandleSource;

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::ScreenerConfig;
use crate::domain::SymbolReport;
use crate::error::EvalError;

/// One year of daily candles, oldest first.
#[derive(Debug, Clone, Default)]
pub struct DailySeries {
    pub close: Vec<f64>,
    pub high: Vec<f64>,
    pub low: Vec<f64>,
}

impl DailySeries {
    pub fn len(&self) -> usize {
        self.close.len()
    }

    pub fn is_empty(&self) -> bool {
        self.close.is_empty()
    }
}

/// Daily OHLC history provider.
#[async_trait]
pub trait CandleSource: Send + Sync {
    async fn daily_history(&self, symbol: &str) -> Result<DailySeries, EvalError>;
}

/// Pure pass/fail scoring over fetched history.
#[async_trait]
pub trait Evaluator: Send + Sync {
    async fn evaluate(&self, symbol: &str) -> Result<SymbolReport, EvalError>;
}

/// Minervini trend-template evaluator over a candle source.
pub struct TrendTemplateEvaluator {
    source: Arc<dyn CandleSource>,
    config: ScreenerConfig,
}

impl TrendTemplateEvaluator {
    pub fn new(source: Arc<dyn CandleSource>, config: ScreenerConfig) -> Self {
        Self { source, config }
    }
}

#[async_trait]
impl Evaluator for TrendTemplateEvaluator {
    async fn evaluate(&self, symbol: &str) -> Result<SymbolReport, EvalError> {
        let series = self.source.daily_history(symbol).await?;
        score_series(symbol, &series, &self.config)
    }
}

//! Yahoo Finance chart API candle source.
//!
//! Fetches one year of daily OHLC for `SYMBOL{suffix}` and flattens it into
//! a `DailySeries`, dropping days with missing closes.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::config::MarketDataConfig;
use crate::error::EvalError;
use crate::evaluator::{CandleSource, DailySeries};

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    result: Option<Vec<ChartResult>>,
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<Quote>,
}

#[derive(Debug, Deserialize, Default)]
struct Quote {
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
}

/// Chart API client
pub struct YahooCandleSource {
    client: reqwest::Client,
    base_url: String,
    exchange_suffix: String,
}

impl YahooCandleSource {
    pub fn new(config: &MarketDataConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            exchange_suffix: config.exchange_suffix.clone(),
        })
    }

    /// Append the exchange suffix when the symbol does not carry one.
    fn exchange_symbol(&self, symbol: &str) -> String {
        if self.exchange_suffix.is_empty() || symbol.ends_with(&self.exchange_suffix) {
            symbol.to_string()
        } else {
            format!("{symbol}{}", self.exchange_suffix)
        }
    }

    fn flatten(quote: Quote) -> DailySeries {
        let mut series = DailySeries::default();
        for (i, close) in quote.close.iter().enumerate() {
            let Some(close) = close else { continue };
            let high = quote.high.get(i).copied().flatten().unwrap_or(*close);
            let low = quote.low.get(i).copied().flatten().unwrap_or(*close);
            series.close.push(*close);
            series.high.push(high);
            series.low.push(low);
        }
        series
    }
}

#[async_trait]
impl CandleSource for YahooCandleSource {
    async fn daily_history(&self, symbol: &str) -> Result<DailySeries, EvalError> {
        let ticker = self.exchange_symbol(symbol);
        let url = format!(
            "{}/v8/finance/chart/{}?range=1y&interval=1d",
            self.base_url, ticker
        );
        debug!(%ticker, "Fetching daily history");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| EvalError::Fetch(e.to_string()))?;

        if !response.status().is_success() {
            return Err(EvalError::Fetch(format!(
                "chart API returned {}",
                response.status()
            )));
        }

        let body: ChartResponse = response
            .json()
            .await
            .map_err(|e| EvalError::Fetch(e.to_string()))?;

        if let Some(err) = body.chart.error {
            return Err(EvalError::Fetch(err.to_string()));
        }

        let quote = body
            .chart
            .result
            .and_then(|mut r| {
                if r.is_empty() {
                    None
                } else {
                    r.swap_remove(0).indicators.quote.into_iter().next()
                }
            })
            .ok_or(EvalError::NoData)?;

        let series = Self::flatten(quote);
        if series.is_empty() {
            return Err(EvalError::NoData);
        }
        Ok(series)
    }
}

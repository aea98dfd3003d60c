//! Trigger dispatcher: every external entry point lands here.
//!
//! HTTP handlers, bot commands, and cron triggers map onto the same small
//! set of operations, so the concurrency story lives in one place: the
//! store arbitrates, the dispatcher only sequences.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::ScanConfig;
use crate::domain::{CompletedScan, ScanStatus, ScreeningResult, SymbolReport};
use crate::error::{EvalError, Result};
use crate::evaluator::Evaluator;
use crate::notify::CompletionNotifier;
use crate::scanner::{BatchStepper, StepOutcome};
use crate::store::{SessionStore, StartOutcome};
use crate::universe::UniverseProvider;

/// Outcome of a start request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartScanOutcome {
    Started { session_id: Uuid, total: u32 },
    /// A session is already running; callers should step it instead.
    AlreadyRunning,
    /// A full scan completed recently; an unforced start is refused.
    CoolingDown { until: DateTime<Utc> },
}

/// Point-in-time progress projection for status surfaces.
#[derive(Debug, Clone, Serialize)]
pub struct ScanStatusReport {
    pub status: ScanStatus,
    pub session_id: Option<Uuid>,
    pub cursor: u32,
    pub total: u32,
    pub progress_pct: f64,
    pub found: u32,
    pub batch_size: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ScanStatusReport {
    fn idle() -> Self {
        Self {
            status: ScanStatus::Idle,
            session_id: None,
            cursor: 0,
            total: 0,
            progress_pct: 0.0,
            found: 0,
            batch_size: 0,
            started_at: None,
            updated_at: None,
            completed_at: None,
        }
    }
}

/// Shared entry point for every scan trigger.
pub struct ScanDispatcher {
    store: Arc<dyn SessionStore>,
    stepper: BatchStepper,
    evaluator: Arc<dyn Evaluator>,
    universe: UniverseProvider,
    notifier: Option<Arc<CompletionNotifier>>,
    config: ScanConfig,
}

impl ScanDispatcher {
    pub fn new(
        store: Arc<dyn SessionStore>,
        stepper: BatchStepper,
        evaluator: Arc<dyn Evaluator>,
        universe: UniverseProvider,
        notifier: Option<Arc<CompletionNotifier>>,
        config: ScanConfig,
    ) -> Self {
        Self {
            store,
            stepper,
            evaluator,
            universe,
            notifier,
            config,
        }
    }

    /// Start a new full scan. Unforced starts respect the restart cooldown;
    /// the store still arbitrates concurrent starts either way.
    pub async fn start_scan(&self, force: bool) -> Result<StartScanOutcome> {
        if !force {
            if let Some(completed_at) = self.store.last_completed_at().await? {
                let until =
                    completed_at + ChronoDuration::hours(self.config.restart_cooldown_hours as i64);
                if Utc::now() < until {
                    info!(%until, "Start refused: restart cooldown active");
                    return Ok(StartScanOutcome::CoolingDown { until });
                }
            }
        }

        let universe = self.universe.load()?;
        match self
            .store
            .start(universe, self.config.batch_size)
            .await?
        {
            StartOutcome::Started { session_id, total } => {
                info!(%session_id, total, force, "Scan started");
                Ok(StartScanOutcome::Started { session_id, total })
            }
            StartOutcome::AlreadyRunning => Ok(StartScanOutcome::AlreadyRunning),
        }
    }

    /// Run one step within this invocation's budget. Fires completion
    /// notifications after the final commit is durable.
    pub async fn continue_scan(&self) -> Result<StepOutcome> {
        let deadline = Instant::now() + self.config.step_budget();
        let outcome = self.stepper.step(deadline).await?;

        if let StepOutcome::Committed(summary) = &outcome {
            if summary.completed {
                self.announce_completion().await;
            }
        }
        Ok(outcome)
    }

    async fn announce_completion(&self) {
        let Some(notifier) = &self.notifier else {
            return;
        };
        match self.store.last_completed().await {
            Ok(Some(scan)) => {
                notifier.announce(&scan).await;
            }
            Ok(None) => warn!("Completed step but no completed scan found to announce"),
            Err(err) => warn!(%err, "Cannot load completed scan for notification"),
        }
    }

    /// Evaluate an ad-hoc symbol list immediately, outside any session.
    /// Input beyond the configured limit is dropped.
    pub async fn quick_scan(&self, symbols: Vec<String>) -> Vec<ScreeningResult> {
        let mut symbols = symbols;
        if symbols.len() > self.config.quick_scan_limit {
            warn!(
                requested = symbols.len(),
                limit = self.config.quick_scan_limit,
                "Quick scan truncated"
            );
            symbols.truncate(self.config.quick_scan_limit);
        }

        stream::iter(symbols)
            .map(|symbol| async move {
                match tokio::time::timeout(
                    self.config.symbol_timeout(),
                    self.evaluator.evaluate(&symbol),
                )
                .await
                {
                    Ok(Ok(report)) => ScreeningResult::from_report(report),
                    Ok(Err(err)) => ScreeningResult::from_error(symbol, err),
                    Err(_) => ScreeningResult::from_error(
                        symbol,
                        EvalError::Timeout {
                            elapsed_ms: self.config.symbol_timeout_ms,
                        },
                    ),
                }
            })
            .buffered(self.config.concurrency)
            .collect()
            .await
    }

    /// Evaluate one symbol for an interactive check.
    pub async fn check(&self, symbol: &str) -> std::result::Result<SymbolReport, EvalError> {
        match tokio::time::timeout(self.config.symbol_timeout(), self.evaluator.evaluate(symbol))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(EvalError::Timeout {
                elapsed_ms: self.config.symbol_timeout_ms,
            }),
        }
    }

    /// Progress of the current (or most recent) session; `Idle` when none.
    pub async fn status(&self) -> Result<ScanStatusReport> {
        let Some(session) = self.store.snapshot().await? else {
            return Ok(ScanStatusReport::idle());
        };
        let progress_pct = if session.total > 0 {
            (session.cursor as f64 / session.total as f64 * 1000.0).round() / 10.0
        } else {
            0.0
        };
        Ok(ScanStatusReport {
            status: session.status,
            session_id: Some(session.id),
            cursor: session.cursor,
            total: session.total,
            progress_pct,
            found: session.found,
            batch_size: session.batch_size,
            started_at: Some(session.started_at),
            updated_at: Some(session.updated_at),
            completed_at: session.completed_at,
        })
    }

    /// Results of the most recent completed scan.
    pub async fn results(&self) -> Result<Option<CompletedScan>> {
        self.store.last_completed().await
    }

    /// Abandon any running session.
    pub async fn reset(&self) -> Result<()> {
        self.store.reset().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScreenerConfig;
    use crate::error::NotifyError;
    use crate::evaluator::{CandleSource, DailySeries, TrendTemplateEvaluator};
    use crate::notify::Notifier;
    use crate::store::MemorySessionStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Synthetic source: symbols starting with "UP" ride a year-long rally,
    /// everything else declines.
    struct SyntheticCandles;

    #[async_trait]
    impl CandleSource for SyntheticCandles {
        async fn daily_history(&self, symbol: &str) -> std::result::Result<DailySeries, EvalError> {
            if symbol == "MISSING" {
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

    struct CountingNotifier {
        sent: AtomicUsize,
    }

    #[async_trait]
    impl Notifier for CountingNotifier {
        async fn send(&self, _chat_id: &str, _text: &str) -> std::result::Result<(), NotifyError> {
            self.sent.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn evaluator() -> Arc<dyn Evaluator> {
        Arc::new(TrendTemplateEvaluator::new(
            Arc::new(SyntheticCandles),
            ScreenerConfig::default(),
        ))
    }

    fn dispatcher_with(
        store: Arc<MemorySessionStore>,
        notifier: Option<Arc<CompletionNotifier>>,
        config: ScanConfig,
    ) -> ScanDispatcher {
        let evaluator = evaluator();
        let stepper = BatchStepper::new(store.clone(), evaluator.clone(), config.clone());
        ScanDispatcher::new(
            store,
            stepper,
            evaluator,
            UniverseProvider::new(None),
            notifier,
            config,
        )
    }

    #[tokio::test]
    async fn second_start_is_already_running() {
        let store = Arc::new(MemorySessionStore::new());
        let dispatcher = dispatcher_with(store, None, ScanConfig::default());
        assert!(matches!(
            dispatcher.start_scan(false).await.unwrap(),
            StartScanOutcome::Started { .. }
        ));
        assert_eq!(
            dispatcher.start_scan(false).await.unwrap(),
            StartScanOutcome::AlreadyRunning
        );
    }

    #[tokio::test]
    async fn cooldown_blocks_unforced_start_only() {
        let store = Arc::new(MemorySessionStore::new());
        let config = ScanConfig {
            batch_size: 100,
            max_batch_size: 100,
            ..ScanConfig::default()
        };
        let dispatcher = dispatcher_with(store.clone(), None, config);

        // Run a full scan to completion to arm the cooldown.
        dispatcher.start_scan(false).await.unwrap();
        loop {
            match dispatcher.continue_scan().await.unwrap() {
                StepOutcome::Committed(summary) if summary.completed => break,
                StepOutcome::Committed(_) => {}
                other => panic!("unexpected outcome: {other:?}"),
            }
        }

        assert!(matches!(
            dispatcher.start_scan(false).await.unwrap(),
            StartScanOutcome::CoolingDown { .. }
        ));
        assert!(matches!(
            dispatcher.start_scan(true).await.unwrap(),
            StartScanOutcome::Started { .. }
        ));
    }

    #[tokio::test]
    async fn completion_notifies_each_subscriber() {
        let store = Arc::new(MemorySessionStore::new());
        store.add_subscriber("1001").await.unwrap();
        store.add_subscriber("1002").await.unwrap();

        let counting = Arc::new(CountingNotifier {
            sent: AtomicUsize::new(0),
        });
        let notifier = Arc::new(CompletionNotifier::new(counting.clone(), store.clone()));
        let config = ScanConfig {
            batch_size: 100,
            max_batch_size: 100,
            ..ScanConfig::default()
        };
        let dispatcher = dispatcher_with(store, Some(notifier), config);

        dispatcher.start_scan(false).await.unwrap();
        loop {
            if let StepOutcome::Committed(summary) = dispatcher.continue_scan().await.unwrap() {
                if summary.completed {
                    break;
                }
            }
        }
        assert_eq!(counting.sent.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn quick_scan_truncates_and_reports_errors_inline() {
        let store = Arc::new(MemorySessionStore::new());
        let config = ScanConfig {
            quick_scan_limit: 2,
            ..ScanConfig::default()
        };
        let dispatcher = dispatcher_with(store, None, config);

        let results = dispatcher
            .quick_scan(vec![
                "UPONE".to_string(),
                "MISSING".to_string(),
                "UPTWO".to_string(),
            ])
            .await;
        assert_eq!(results.len(), 2);
        assert!(results[0].outcome.passes());
        assert!(results[1].outcome.report().is_none());
    }

    #[tokio::test]
    async fn status_is_idle_before_any_session() {
        let store = Arc::new(MemorySessionStore::new());
        let dispatcher = dispatcher_with(store, None, ScanConfig::default());
        let report = dispatcher.status().await.unwrap();
        assert_eq!(report.status, ScanStatus::Idle);
        assert!(report.session_id.is_none());
    }

    #[tokio::test]
    async fn status_tracks_progress_mid_scan() {
        let store = Arc::new(MemorySessionStore::new());
        let config = ScanConfig {
            batch_size: 25,
            ..ScanConfig::default()
        };
        let dispatcher = dispatcher_with(store, None, config);

        dispatcher.start_scan(false).await.unwrap();
        dispatcher.continue_scan().await.unwrap();

        let report = dispatcher.status().await.unwrap();
        assert_eq!(report.status, ScanStatus::Running);
        assert_eq!(report.cursor, 25);
        assert_eq!(report.total, 50);
        assert_eq!(report.progress_pct, 50.0);
    }
}

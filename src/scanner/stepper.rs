//! Deadline-bounded batch stepper.
//!
//! One step claims a batch, evaluates symbols concurrently in claim order,
//! and commits whatever contiguous prefix finished before the deadline. The
//! commit carries the adaptively resized batch for the next step.

use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::ScanConfig;
use crate::domain::ScreeningResult;
use crate::error::{EvalError, Result};
use crate::evaluator::Evaluator;
use crate::store::{ClaimOutcome, CommitOutcome, CommitRequest, SessionStore};

/// Result of one step invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// No running session to step.
    NoActiveSession,
    /// Another invocation claimed past us; nothing was written.
    Stale,
    Committed(StepSummary),
}

/// What one committed step accomplished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepSummary {
    pub session_id: Uuid,
    /// Symbols handed out by the claim.
    pub claimed: u32,
    /// Symbols whose results were committed (prefix of the claim).
    pub processed: u32,
    pub cursor: u32,
    pub total: u32,
    /// Passing symbols in this step's committed results.
    pub found_in_batch: u32,
    /// Passing symbols recorded for the session so far.
    pub found_total: u32,
    pub completed: bool,
    pub next_batch_size: u32,
}

/// Claims, evaluates, and commits one batch per call.
pub struct BatchStepper {
    store: Arc<dyn SessionStore>,
    evaluator: Arc<dyn Evaluator>,
    config: ScanConfig,
}

impl BatchStepper {
    pub fn new(
        store: Arc<dyn SessionStore>,
        evaluator: Arc<dyn Evaluator>,
        config: ScanConfig,
    ) -> Self {
        Self {
            store,
            evaluator,
            config,
        }
    }

    /// Run one step, committing before `deadline`.
    pub async fn step(&self, deadline: Instant) -> Result<StepOutcome> {
        let batch = match self.store.claim(None).await? {
            ClaimOutcome::Claimed(batch) => batch,
            ClaimOutcome::NoActiveSession => return Ok(StepOutcome::NoActiveSession),
        };

        debug!(
            session_id = %batch.session_id,
            base_cursor = batch.base_cursor,
            claimed = batch.symbols.len(),
            token = batch.fencing_token,
            "Claimed batch"
        );

        let started = Instant::now();
        let results = self.evaluate_prefix(&batch.symbols, deadline).await;
        let elapsed = started.elapsed();

        let claimed = batch.symbols.len() as u32;
        let processed = results.len() as u32;
        if processed < claimed {
            warn!(
                claimed,
                processed,
                elapsed_ms = elapsed.as_millis() as u64,
                "Deadline cut the batch; committing finished prefix"
            );
        }

        let found_in_batch = results.iter().filter(|r| r.outcome.passes()).count() as u32;
        let next_batch_size = self.resize(processed, elapsed);
        let request = CommitRequest {
            session_id: batch.session_id,
            fencing_token: batch.fencing_token,
            base_cursor: batch.base_cursor,
            results,
            next_batch_size,
        };

        match self.store.commit(request).await? {
            CommitOutcome::Accepted {
                cursor,
                completed,
                found_total,
            } => {
                info!(
                    session_id = %batch.session_id,
                    cursor,
                    total = batch.total,
                    found_total,
                    completed,
                    next_batch_size,
                    "Committed step"
                );
                Ok(StepOutcome::Committed(StepSummary {
                    session_id: batch.session_id,
                    claimed,
                    processed,
                    cursor,
                    total: batch.total,
                    found_in_batch,
                    found_total,
                    completed,
                    next_batch_size,
                }))
            }
            CommitOutcome::Stale => {
                warn!(
                    session_id = %batch.session_id,
                    token = batch.fencing_token,
                    "Commit rejected as stale; discarding results"
                );
                Ok(StepOutcome::Stale)
            }
        }
    }

    /// Evaluate symbols concurrently, preserving claim order, and stop at
    /// the deadline. Ordered buffering means the collected results are
    /// always a contiguous prefix of the batch.
    async fn evaluate_prefix(
        &self,
        symbols: &[String],
        deadline: Instant,
    ) -> Vec<ScreeningResult> {
        let futures: Vec<_> = symbols
            .iter()
            .map(|symbol| self.evaluate_symbol(symbol))
            .collect();
        let mut stream = stream::iter(futures).buffered(self.config.concurrency);

        let mut results = Vec::with_capacity(symbols.len());
        loop {
            match tokio::time::timeout_at(deadline, stream.next()).await {
                Ok(Some(result)) => results.push(result),
                Ok(None) => break,
                Err(_) => break,
            }
        }
        results
    }

    /// A failed evaluation still fills the symbol's slot; errors never stall
    /// the cursor.
    async fn evaluate_symbol(&self, symbol: &str) -> ScreeningResult {
        let started = Instant::now();
        match tokio::time::timeout(self.config.symbol_timeout(), self.evaluator.evaluate(symbol))
            .await
        {
            Ok(Ok(report)) => ScreeningResult::from_report(report),
            Ok(Err(err)) => {
                debug!(%symbol, %err, "Symbol evaluation failed");
                ScreeningResult::from_error(symbol, err)
            }
            Err(_) => {
                let elapsed_ms = started.elapsed().as_millis() as u64;
                debug!(%symbol, elapsed_ms, "Symbol evaluation timed out");
                ScreeningResult::from_error(symbol, EvalError::Timeout { elapsed_ms })
            }
        }
    }

    /// Size the next batch so it fits the step budget at the observed
    /// wall-clock rate, clamped to the configured bounds.
    fn resize(&self, processed: u32, elapsed: Duration) -> u32 {
        if processed == 0 {
            return self.config.min_batch_size;
        }
        let per_symbol_ms = elapsed.as_millis() as f64 / processed as f64;
        let budget_ms = self.config.step_budget().as_millis() as f64;
        let ideal = if per_symbol_ms > 0.0 {
            (budget_ms / per_symbol_ms) as u32
        } else {
            self.config.max_batch_size
        };
        ideal.clamp(self.config.min_batch_size, self.config.max_batch_size)
    }
}

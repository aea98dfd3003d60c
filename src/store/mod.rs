//! Scan state store: the single source of truth for session progress.
//!
//! Invocations share no process memory, so every mutation of scan state goes
//! through this store's claim/commit protocol. A claim bumps the fencing
//! token; a commit is accepted only while it still holds the latest token and
//! the cursor sits at the claimed base. Anything else observes `Stale` and
//! the claimed symbols stay pending for a future claim.

mod memory;
mod postgres;

pub use memory::MemorySessionStore;
pub use postgres::PostgresSessionStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{CompletedScan, ScanSession, ScreeningResult};
use crate::error::Result;

/// Outcome of `start`. Both variants are normal results, not errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    Started { session_id: Uuid, total: u32 },
    AlreadyRunning,
}

/// A claimed batch: the caller owns `fencing_token` until the next claim.
#[derive(Debug, Clone)]
pub struct ClaimedBatch {
    pub session_id: Uuid,
    pub fencing_token: i64,
    /// Cursor value at claim time; commits must advance from here.
    pub base_cursor: u32,
    pub symbols: Vec<String>,
    pub total: u32,
    /// Session batch size at claim time (input to adaptive resizing).
    pub batch_size: u32,
}

/// Outcome of `claim`.
#[derive(Debug, Clone)]
pub enum ClaimOutcome {
    Claimed(ClaimedBatch),
    NoActiveSession,
}

/// A commit request: results for the contiguous prefix of the claimed batch
/// that finished before the deadline.
#[derive(Debug, Clone)]
pub struct CommitRequest {
    pub session_id: Uuid,
    pub fencing_token: i64,
    pub base_cursor: u32,
    pub results: Vec<ScreeningResult>,
    /// Batch size the next step should claim (adaptive sizing output).
    pub next_batch_size: u32,
}

impl CommitRequest {
    pub fn new_cursor(&self) -> u32 {
        self.base_cursor + self.results.len() as u32
    }
}

/// Outcome of `commit`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    Accepted {
        cursor: u32,
        completed: bool,
        /// Passing symbols recorded for the session so far.
        found_total: u32,
    },
    Stale,
}

/// Durable scan state store.
///
/// Every operation is atomic against concurrent callers; implementations
/// must not rely on process-local locks for cross-invocation exclusion.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Create a new running session over `universe`, unless one is running.
    async fn start(&self, universe: Vec<String>, batch_size: u32) -> Result<StartOutcome>;

    /// Atomically claim the next unprocessed symbols and a fresh fencing
    /// token. `max_batch = None` uses the session's own batch size.
    async fn claim(&self, max_batch: Option<u32>) -> Result<ClaimOutcome>;

    /// Merge results and advance the cursor, or reject as `Stale`.
    async fn commit(&self, request: CommitRequest) -> Result<CommitOutcome>;

    /// Read-only view of the current (or most recent) session.
    async fn snapshot(&self) -> Result<Option<ScanSession>>;

    /// Results of the most recent completed session.
    async fn last_completed(&self) -> Result<Option<CompletedScan>>;

    /// Completion time of the most recent completed session (cooldown input).
    async fn last_completed_at(&self) -> Result<Option<DateTime<Utc>>>;

    /// Abandon any running session, returning to idle.
    async fn reset(&self) -> Result<()>;

    /// Liveness probe.
    async fn ping(&self) -> Result<()>;

    // Subscriber registry; lifecycle owned by the bot command handlers.

    async fn subscribers(&self) -> Result<Vec<String>>;

    /// Returns false when the chat id was already registered.
    async fn add_subscriber(&self, chat_id: &str) -> Result<bool>;

    /// Returns false when the chat id was not registered.
    async fn remove_subscriber(&self, chat_id: &str) -> Result<bool>;
}

//! In-memory session store.
//!
//! Implements the same claim/commit contract as the Postgres store behind a
//! single mutex. Backs the protocol tests and offline CLI runs; a real
//! deployment uses `PostgresSessionStore` because in-process state cannot
//! outlive a host invocation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;
use uuid::Uuid;

use crate::domain::{CompletedScan, ScanSession, ScanStatus, ScreeningResult};
use crate::error::Result;
use crate::store::{
    ClaimOutcome, ClaimedBatch, CommitOutcome, CommitRequest, SessionStore, StartOutcome,
};

#[derive(Debug, Clone)]
struct SessionRecord {
    id: Uuid,
    status: ScanStatus,
    universe: Vec<String>,
    cursor: u32,
    batch_size: u32,
    fencing_token: i64,
    results: BTreeMap<u32, ScreeningResult>,
    started_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl SessionRecord {
    fn found(&self) -> u32 {
        self.results.values().filter(|r| r.outcome.passes()).count() as u32
    }

    fn to_session(&self) -> ScanSession {
        ScanSession {
            id: self.id,
            status: self.status,
            cursor: self.cursor,
            total: self.universe.len() as u32,
            batch_size: self.batch_size,
            fencing_token: self.fencing_token,
            found: self.found(),
            started_at: self.started_at,
            updated_at: self.updated_at,
            completed_at: self.completed_at,
        }
    }
}

#[derive(Default)]
struct State {
    current: Option<SessionRecord>,
    history: Vec<SessionRecord>,
    subscribers: BTreeSet<String>,
}

/// Mutex-guarded session store with the full claim/commit protocol.
#[derive(Default)]
pub struct MemorySessionStore {
    state: Mutex<State>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn start(&self, universe: Vec<String>, batch_size: u32) -> Result<StartOutcome> {
        let mut state = self.state.lock().expect("store mutex poisoned");

        if state
            .current
            .as_ref()
            .is_some_and(|s| s.status == ScanStatus::Running)
        {
            return Ok(StartOutcome::AlreadyRunning);
        }

        if let Some(finished) = state.current.take() {
            state.history.push(finished);
        }

        let now = Utc::now();
        let total = universe.len() as u32;
        let session = SessionRecord {
            id: Uuid::new_v4(),
            status: ScanStatus::Running,
            universe,
            cursor: 0,
            batch_size,
            fencing_token: 0,
            results: BTreeMap::new(),
            started_at: now,
            updated_at: now,
            completed_at: None,
        };
        let session_id = session.id;
        state.current = Some(session);

        Ok(StartOutcome::Started { session_id, total })
    }

    async fn claim(&self, max_batch: Option<u32>) -> Result<ClaimOutcome> {
        let mut state = self.state.lock().expect("store mutex poisoned");

        let Some(session) = state
            .current
            .as_mut()
            .filter(|s| s.status == ScanStatus::Running)
        else {
            return Ok(ClaimOutcome::NoActiveSession);
        };

        // Token is bumped by the claim itself so two concurrent claimants
        // can never hold the same token.
        session.fencing_token += 1;
        session.updated_at = Utc::now();

        let limit = max_batch.unwrap_or(session.batch_size).min(session.batch_size) as usize;
        let start = session.cursor as usize;
        let end = (start + limit).min(session.universe.len());
        let symbols = session.universe[start..end].to_vec();

        Ok(ClaimOutcome::Claimed(ClaimedBatch {
            session_id: session.id,
            fencing_token: session.fencing_token,
            base_cursor: session.cursor,
            symbols,
            total: session.universe.len() as u32,
            batch_size: session.batch_size,
        }))
    }

    async fn commit(&self, request: CommitRequest) -> Result<CommitOutcome> {
        let mut state = self.state.lock().expect("store mutex poisoned");

        let Some(session) = state
            .current
            .as_mut()
            .filter(|s| s.status == ScanStatus::Running)
        else {
            return Ok(CommitOutcome::Stale);
        };

        let fresh = session.id == request.session_id
            && session.fencing_token == request.fencing_token
            && session.cursor == request.base_cursor;
        if !fresh {
            return Ok(CommitOutcome::Stale);
        }

        let new_cursor = request.new_cursor();
        for (offset, result) in request.results.into_iter().enumerate() {
            session
                .results
                .insert(request.base_cursor + offset as u32, result);
        }
        session.cursor = new_cursor;
        session.batch_size = request.next_batch_size.max(1);
        session.updated_at = Utc::now();

        let completed = new_cursor >= session.universe.len() as u32;
        if completed {
            session.status = ScanStatus::Completed;
            session.completed_at = Some(Utc::now());
        }

        Ok(CommitOutcome::Accepted {
            cursor: new_cursor,
            completed,
            found_total: session.found(),
        })
    }

    async fn snapshot(&self) -> Result<Option<ScanSession>> {
        let state = self.state.lock().expect("store mutex poisoned");
        Ok(state.current.as_ref().map(|s| s.to_session()))
    }

    async fn last_completed(&self) -> Result<Option<CompletedScan>> {
        let state = self.state.lock().expect("store mutex poisoned");
        let completed = state
            .current
            .iter()
            .chain(state.history.iter().rev())
            .find(|s| s.status == ScanStatus::Completed);

        Ok(completed.map(|s| CompletedScan {
            session_id: s.id,
            total_scanned: s.universe.len() as u32,
            completed_at: s.completed_at.unwrap_or(s.updated_at),
            passing: s
                .results
                .values()
                .filter_map(|r| r.outcome.report())
                .filter(|r| r.passes)
                .cloned()
                .collect(),
        }))
    }

    async fn last_completed_at(&self) -> Result<Option<DateTime<Utc>>> {
        let state = self.state.lock().expect("store mutex poisoned");
        Ok(state
            .current
            .iter()
            .chain(state.history.iter().rev())
            .find(|s| s.status == ScanStatus::Completed)
            .and_then(|s| s.completed_at))
    }

    async fn reset(&self) -> Result<()> {
        let mut state = self.state.lock().expect("store mutex poisoned");
        if let Some(session) = state
            .current
            .as_mut()
            .filter(|s| s.status == ScanStatus::Running)
        {
            session.status = ScanStatus::Failed;
            session.completed_at = Some(Utc::now());
            session.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn subscribers(&self) -> Result<Vec<String>> {
        let state = self.state.lock().expect("store mutex poisoned");
        Ok(state.subscribers.iter().cloned().collect())
    }

    async fn add_subscriber(&self, chat_id: &str) -> Result<bool> {
        let mut state = self.state.lock().expect("store mutex poisoned");
        Ok(state.subscribers.insert(chat_id.to_string()))
    }

    async fn remove_subscriber(&self, chat_id: &str) -> Result<bool> {
        let mut state = self.state.lock().expect("store mutex poisoned");
        Ok(state.subscribers.remove(chat_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ScreeningResult;

    fn universe(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("SYM{i}")).collect()
    }

    fn results_for(batch: &ClaimedBatch, take: usize) -> Vec<ScreeningResult> {
        batch
            .symbols
            .iter()
            .take(take)
            .map(|s| ScreeningResult::from_error(s, "stub"))
            .collect()
    }

    #[tokio::test]
    async fn second_start_reports_already_running() {
        let store = MemorySessionStore::new();
        let first = store.start(universe(5), 2).await.unwrap();
        assert!(matches!(first, StartOutcome::Started { total: 5, .. }));
        let second = store.start(universe(5), 2).await.unwrap();
        assert_eq!(second, StartOutcome::AlreadyRunning);
    }

    #[tokio::test]
    async fn claim_without_session_is_no_op() {
        let store = MemorySessionStore::new();
        assert!(matches!(
            store.claim(None).await.unwrap(),
            ClaimOutcome::NoActiveSession
        ));
    }

    #[tokio::test]
    async fn stale_token_commit_is_rejected() {
        let store = MemorySessionStore::new();
        store.start(universe(6), 3).await.unwrap();

        let ClaimOutcome::Claimed(first) = store.claim(None).await.unwrap() else {
            panic!("expected claim");
        };
        let ClaimOutcome::Claimed(second) = store.claim(None).await.unwrap() else {
            panic!("expected claim");
        };
        assert!(second.fencing_token > first.fencing_token);
        assert_eq!(first.base_cursor, second.base_cursor);

        // The superseded claim commits first and must be rejected.
        let stale = store
            .commit(CommitRequest {
                session_id: first.session_id,
                fencing_token: first.fencing_token,
                base_cursor: first.base_cursor,
                results: results_for(&first, 3),
                next_batch_size: 3,
            })
            .await
            .unwrap();
        assert_eq!(stale, CommitOutcome::Stale);

        let accepted = store
            .commit(CommitRequest {
                session_id: second.session_id,
                fencing_token: second.fencing_token,
                base_cursor: second.base_cursor,
                results: results_for(&second, 3),
                next_batch_size: 3,
            })
            .await
            .unwrap();
        assert!(matches!(accepted, CommitOutcome::Accepted { cursor: 3, .. }));
    }

    #[tokio::test]
    async fn cursor_only_moves_forward() {
        let store = MemorySessionStore::new();
        store.start(universe(4), 2).await.unwrap();

        let ClaimOutcome::Claimed(batch) = store.claim(None).await.unwrap() else {
            panic!("expected claim");
        };
        let outcome = store
            .commit(CommitRequest {
                session_id: batch.session_id,
                fencing_token: batch.fencing_token,
                base_cursor: batch.base_cursor,
                results: results_for(&batch, 2),
                next_batch_size: 2,
            })
            .await
            .unwrap();
        assert!(matches!(outcome, CommitOutcome::Accepted { cursor: 2, .. }));

        // Replaying the same commit no longer matches the cursor base.
        let replay = store
            .commit(CommitRequest {
                session_id: batch.session_id,
                fencing_token: batch.fencing_token,
                base_cursor: batch.base_cursor,
                results: results_for(&batch, 2),
                next_batch_size: 2,
            })
            .await
            .unwrap();
        assert_eq!(replay, CommitOutcome::Stale);
        assert_eq!(store.snapshot().await.unwrap().unwrap().cursor, 2);
    }

    #[tokio::test]
    async fn completion_flips_status_and_reset_allows_restart() {
        let store = MemorySessionStore::new();
        store.start(universe(2), 5).await.unwrap();

        let ClaimOutcome::Claimed(batch) = store.claim(None).await.unwrap() else {
            panic!("expected claim");
        };
        assert_eq!(batch.symbols.len(), 2);
        let outcome = store
            .commit(CommitRequest {
                session_id: batch.session_id,
                fencing_token: batch.fencing_token,
                base_cursor: 0,
                results: results_for(&batch, 2),
                next_batch_size: 5,
            })
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            CommitOutcome::Accepted {
                completed: true,
                ..
            }
        ));
        let session = store.snapshot().await.unwrap().unwrap();
        assert_eq!(session.status, ScanStatus::Completed);
        assert!(store.last_completed_at().await.unwrap().is_some());

        // Completed session is not running; a new start succeeds.
        assert!(matches!(
            store.start(universe(3), 2).await.unwrap(),
            StartOutcome::Started { total: 3, .. }
        ));
        store.reset().await.unwrap();
        assert_eq!(
            store.snapshot().await.unwrap().unwrap().status,
            ScanStatus::Failed
        );
    }

    #[tokio::test]
    async fn subscriber_registry_round_trip() {
        let store = MemorySessionStore::new();
        assert!(store.add_subscriber("42").await.unwrap());
        assert!(!store.add_subscriber("42").await.unwrap());
        assert_eq!(store.subscribers().await.unwrap(), vec!["42".to_string()]);
        assert!(store.remove_subscriber("42").await.unwrap());
        assert!(!store.remove_subscriber("42").await.unwrap());
    }
}

//! PostgreSQL session store.
//!
//! The claim/commit protocol is expressed as guarded single-statement
//! UPDATEs so the database is the arbiter under concurrent invocations:
//! - the single-running-session invariant is a partial unique index, so two
//!   simultaneous `start` calls race on an INSERT and exactly one wins;
//! - `claim` bumps the fencing token in the same UPDATE that reads the
//!   cursor;
//! - `commit` only matches a row whose token and cursor are still the ones
//!   handed out at claim time, otherwise zero rows update and the commit is
//!   reported `Stale` with no side effects.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{QueryBuilder, Row};
use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::{CompletedScan, ScanSession, ScanStatus, ScreeningOutcome, SymbolReport};
use crate::error::{Result, ScanError};
use crate::store::{
    ClaimOutcome, ClaimedBatch, CommitOutcome, CommitRequest, SessionStore, StartOutcome,
};

/// PostgreSQL storage adapter
#[derive(Clone)]
pub struct PostgresSessionStore {
    pool: PgPool,
}

impl PostgresSessionStore {
    /// Create a new PostgreSQL store
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        info!("Connected to PostgreSQL");
        Ok(Self { pool })
    }

    /// Create a store from an existing connection pool
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations completed");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn found_total(&self, session_id: Uuid) -> Result<u32> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM scan_results WHERE session_id = $1 AND passed",
        )
        .bind(session_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count as u32)
    }

    fn row_to_session(row: &sqlx::postgres::PgRow, found: u32) -> Result<ScanSession> {
        let status: String = row.get("status");
        Ok(ScanSession {
            id: row.get("id"),
            status: ScanStatus::try_from(status.as_str()).map_err(ScanError::Internal)?,
            cursor: row.get::<i32, _>("cursor") as u32,
            total: row.get::<i32, _>("total") as u32,
            batch_size: row.get::<i32, _>("batch_size") as u32,
            fencing_token: row.get("fencing_token"),
            found,
            started_at: row.get("started_at"),
            updated_at: row.get("updated_at"),
            completed_at: row.get("completed_at"),
        })
    }
}

#[async_trait]
impl SessionStore for PostgresSessionStore {
    async fn start(&self, universe: Vec<String>, batch_size: u32) -> Result<StartOutcome> {
        let session_id = Uuid::new_v4();
        let total = universe.len() as i32;

        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO scan_sessions (id, status, cursor, total, batch_size, fencing_token)
            VALUES ($1, 'running', 0, $2, $3, 0)
            "#,
        )
        .bind(session_id)
        .bind(total)
        .bind(batch_size as i32)
        .execute(&mut *tx)
        .await;

        if let Err(e) = inserted {
            // Partial unique index on running sessions: the loser of a
            // simultaneous start lands here.
            if let sqlx::Error::Database(db) = &e {
                if db.kind() == sqlx::error::ErrorKind::UniqueViolation {
                    return Ok(StartOutcome::AlreadyRunning);
                }
            }
            return Err(e.into());
        }

        // Universe is immutable once started; insert in order, chunked to
        // stay under the bind-parameter limit.
        for (chunk_index, chunk) in universe.chunks(1000).enumerate() {
            let mut builder =
                QueryBuilder::new("INSERT INTO scan_universe (session_id, idx, symbol) ");
            let base = chunk_index * 1000;
            builder.push_values(chunk.iter().enumerate(), |mut b, (offset, symbol)| {
                b.push_bind(session_id)
                    .push_bind((base + offset) as i32)
                    .push_bind(symbol);
            });
            builder.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;
        info!(%session_id, total, batch_size, "Scan session started");

        Ok(StartOutcome::Started {
            session_id,
            total: total as u32,
        })
    }

    async fn claim(&self, max_batch: Option<u32>) -> Result<ClaimOutcome> {
        let row = sqlx::query(
            r#"
            UPDATE scan_sessions
            SET fencing_token = fencing_token + 1, updated_at = NOW()
            WHERE status = 'running'
            RETURNING id, fencing_token, cursor, total, batch_size
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(ClaimOutcome::NoActiveSession);
        };

        let session_id: Uuid = row.get("id");
        let fencing_token: i64 = row.get("fencing_token");
        let cursor = row.get::<i32, _>("cursor") as u32;
        let total = row.get::<i32, _>("total") as u32;
        let batch_size = row.get::<i32, _>("batch_size") as u32;
        let limit = max_batch.unwrap_or(batch_size).min(batch_size);

        let symbols: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT symbol FROM scan_universe
            WHERE session_id = $1 AND idx >= $2 AND idx < $3
            ORDER BY idx
            "#,
        )
        .bind(session_id)
        .bind(cursor as i32)
        .bind((cursor + limit) as i32)
        .fetch_all(&self.pool)
        .await?;

        debug!(
            %session_id,
            fencing_token,
            cursor,
            claimed = symbols.len(),
            "Claimed batch"
        );

        Ok(ClaimOutcome::Claimed(ClaimedBatch {
            session_id,
            fencing_token,
            base_cursor: cursor,
            symbols,
            total,
            batch_size,
        }))
    }

    async fn commit(&self, request: CommitRequest) -> Result<CommitOutcome> {
        let new_cursor = request.new_cursor() as i32;

        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            r#"
            UPDATE scan_sessions
            SET cursor = $1,
                batch_size = $2,
                updated_at = NOW(),
                status = CASE WHEN $1 >= total THEN 'completed' ELSE status END,
                completed_at = CASE WHEN $1 >= total THEN NOW() ELSE completed_at END
            WHERE id = $3
              AND fencing_token = $4
              AND status = 'running'
              AND cursor = $5
            RETURNING total
            "#,
        )
        .bind(new_cursor)
        .bind(request.next_batch_size.max(1) as i32)
        .bind(request.session_id)
        .bind(request.fencing_token)
        .bind(request.base_cursor as i32)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            // Another claim superseded this one, or the commit replays an
            // already-advanced cursor. Nothing was written.
            tx.rollback().await?;
            return Ok(CommitOutcome::Stale);
        };
        let total = row.get::<i32, _>("total");

        for (offset, result) in request.results.iter().enumerate() {
            let (passed, report, error) = match &result.outcome {
                ScreeningOutcome::Report(r) => (r.passes, Some(serde_json::to_value(r)?), None),
                ScreeningOutcome::Error { error, .. } => (false, None, Some(error.clone())),
            };

            sqlx::query(
                r#"
                INSERT INTO scan_results
                    (session_id, idx, symbol, passed, report, error, evaluated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (session_id, idx) DO NOTHING
                "#,
            )
            .bind(request.session_id)
            .bind(request.base_cursor as i32 + offset as i32)
            .bind(&result.symbol)
            .bind(passed)
            .bind(report)
            .bind(error)
            .bind(result.evaluated_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        let completed = new_cursor >= total;
        let found_total = self.found_total(request.session_id).await?;
        debug!(
            session_id = %request.session_id,
            cursor = new_cursor,
            completed,
            "Commit accepted"
        );

        Ok(CommitOutcome::Accepted {
            cursor: new_cursor as u32,
            completed,
            found_total,
        })
    }

    async fn snapshot(&self) -> Result<Option<ScanSession>> {
        let row = sqlx::query(
            r#"
            SELECT id, status, cursor, total, batch_size, fencing_token,
                   started_at, updated_at, completed_at
            FROM scan_sessions
            ORDER BY (status = 'running') DESC, started_at DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let found = self.found_total(row.get("id")).await?;
        Self::row_to_session(&row, found).map(Some)
    }

    async fn last_completed(&self) -> Result<Option<CompletedScan>> {
        let row = sqlx::query(
            r#"
            SELECT id, total, completed_at
            FROM scan_sessions
            WHERE status = 'completed'
            ORDER BY completed_at DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let session_id: Uuid = row.get("id");

        let reports: Vec<serde_json::Value> = sqlx::query_scalar(
            r#"
            SELECT report FROM scan_results
            WHERE session_id = $1 AND passed
            ORDER BY idx
            "#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        let passing = reports
            .into_iter()
            .map(serde_json::from_value::<SymbolReport>)
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let completed_at: Option<DateTime<Utc>> = row.get("completed_at");
        Ok(Some(CompletedScan {
            session_id,
            total_scanned: row.get::<i32, _>("total") as u32,
            completed_at: completed_at.unwrap_or_else(Utc::now),
            passing,
        }))
    }

    async fn last_completed_at(&self) -> Result<Option<DateTime<Utc>>> {
        let completed_at: Option<DateTime<Utc>> = sqlx::query_scalar(
            r#"
            SELECT completed_at FROM scan_sessions
            WHERE status = 'completed'
            ORDER BY completed_at DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?
        .flatten();
        Ok(completed_at)
    }

    async fn reset(&self) -> Result<()> {
        let affected = sqlx::query(
            r#"
            UPDATE scan_sessions
            SET status = 'failed', completed_at = NOW(), updated_at = NOW()
            WHERE status = 'running'
            "#,
        )
        .execute(&self.pool)
        .await?
        .rows_affected();

        if affected > 0 {
            info!("Abandoned running scan session");
        }
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(())
    }

    async fn subscribers(&self) -> Result<Vec<String>> {
        let ids = sqlx::query_scalar("SELECT chat_id FROM subscribers ORDER BY created_at")
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }

    async fn add_subscriber(&self, chat_id: &str) -> Result<bool> {
        let affected = sqlx::query(
            "INSERT INTO subscribers (chat_id) VALUES ($1) ON CONFLICT (chat_id) DO NOTHING",
        )
        .bind(chat_id)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(affected > 0)
    }

    async fn remove_subscriber(&self, chat_id: &str) -> Result<bool> {
        let affected = sqlx::query("DELETE FROM subscribers WHERE chat_id = $1")
            .bind(chat_id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(affected > 0)
    }
}

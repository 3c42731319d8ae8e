use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{check_capacity, validate_session_id, TraceError, TraceStore};
use crate::models::event::{EventContent, Metadata, TraceEvent};
use crate::models::session::Session;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS trace_sessions (
        session_id TEXT PRIMARY KEY,
        start_time TIMESTAMPTZ NOT NULL,
        end_time TIMESTAMPTZ NOT NULL,
        event_count INTEGER NOT NULL DEFAULT 0
    )",
    "CREATE TABLE IF NOT EXISTS trace_events (
        event_id UUID PRIMARY KEY,
        session_id TEXT NOT NULL REFERENCES trace_sessions(session_id) ON DELETE CASCADE,
        seq INTEGER NOT NULL,
        occurred_at TIMESTAMPTZ NOT NULL,
        event_type TEXT NOT NULL,
        content JSONB NOT NULL,
        metadata JSONB NOT NULL DEFAULT '{}'::jsonb,
        UNIQUE (session_id, seq)
    )",
    "CREATE INDEX IF NOT EXISTS idx_trace_sessions_end_time ON trace_sessions (end_time)",
];

type EventRow = (
    Uuid,
    String,
    DateTime<Utc>,
    serde_json::Value,
    serde_json::Value,
);

/// Sessions as rows in `trace_sessions`, events in `trace_events`.
///
/// Appends lock the session row with `SELECT ... FOR UPDATE`, which orders
/// concurrent writers to one session and leaves other sessions untouched.
pub struct PgTraceStore {
    pool: PgPool,
    max_events: usize,
}

impl PgTraceStore {
    /// Wrap a pool and create the schema if it is missing.
    pub async fn new(pool: PgPool, max_events: usize) -> Result<Self, TraceError> {
        let version = crate::db::health_check(&pool).await?;
        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }
        tracing::info!(postgresql = %version, "PostgreSQL trace store ready");
        Ok(Self { pool, max_events })
    }

    fn to_event(row: EventRow) -> Result<TraceEvent, TraceError> {
        let (event_id, session_id, timestamp, content, metadata) = row;
        Ok(TraceEvent {
            event_id,
            session_id,
            timestamp,
            content: serde_json::from_value::<EventContent>(content)?,
            metadata: serde_json::from_value::<Metadata>(metadata)?,
        })
    }
}

#[async_trait]
impl TraceStore for PgTraceStore {
    async fn append(&self, event: &TraceEvent) -> Result<(), TraceError> {
        validate_session_id(&event.session_id)?;
        let content = serde_json::to_value(&event.content)?;
        let metadata = serde_json::to_value(&event.metadata)?;

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO trace_sessions (session_id, start_time, end_time, event_count)
             VALUES ($1, $2, $2, 0)
             ON CONFLICT (session_id) DO NOTHING",
        )
        .bind(&event.session_id)
        .bind(event.timestamp)
        .execute(&mut *tx)
        .await?;

        let (count,): (i32,) = sqlx::query_as(
            "SELECT event_count FROM trace_sessions WHERE session_id = $1 FOR UPDATE",
        )
        .bind(&event.session_id)
        .fetch_one(&mut *tx)
        .await?;

        let (requests, completions): (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*) FILTER (WHERE event_type = 'user_request'),
                    COUNT(*) FILTER (WHERE event_type <> 'user_request')
             FROM trace_events WHERE session_id = $1",
        )
        .bind(&event.session_id)
        .fetch_one(&mut *tx)
        .await?;

        check_capacity(
            &event.session_id,
            count.max(0) as usize,
            (requests - completions).max(0) as usize,
            event.event_type(),
            self.max_events,
        )?;

        sqlx::query(
            "INSERT INTO trace_events
                (event_id, session_id, seq, occurred_at, event_type, content, metadata)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(event.event_id)
        .bind(&event.session_id)
        .bind(count)
        .bind(event.timestamp)
        .bind(event.event_type().as_str())
        .bind(&content)
        .bind(&metadata)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE trace_sessions SET end_time = GREATEST(end_time, $2), event_count = event_count + 1
             WHERE session_id = $1",
        )
        .bind(&event.session_id)
        .bind(event.timestamp)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::debug!(
            session_id = %event.session_id,
            event_type = %event.event_type(),
            seq = count,
            "Trace event appended"
        );
        Ok(())
    }

    async fn get_session(&self, session_id: &str) -> Result<Session, TraceError> {
        validate_session_id(session_id)?;

        let header: Option<(DateTime<Utc>, DateTime<Utc>)> = sqlx::query_as(
            "SELECT start_time, end_time FROM trace_sessions WHERE session_id = $1",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;
        let (start_time, end_time) =
            header.ok_or_else(|| TraceError::SessionNotFound(session_id.to_string()))?;

        let rows: Vec<EventRow> = sqlx::query_as(
            "SELECT event_id, session_id, occurred_at, content, metadata
             FROM trace_events WHERE session_id = $1 ORDER BY seq",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        let events = rows
            .into_iter()
            .map(Self::to_event)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Session {
            session_id: session_id.to_string(),
            start_time,
            end_time,
            events,
        })
    }

    async fn delete_session(&self, session_id: &str) -> Result<bool, TraceError> {
        validate_session_id(session_id)?;
        let result = sqlx::query("DELETE FROM trace_sessions WHERE session_id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        let deleted = result.rows_affected() > 0;
        if deleted {
            tracing::info!(session_id = %session_id, "Trace session deleted");
        }
        Ok(deleted)
    }

    async fn delete_if_older(
        &self,
        session_id: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<bool, TraceError> {
        validate_session_id(session_id)?;
        // appends hold the session row lock, so the DELETE sees their end_time
        let result =
            sqlx::query("DELETE FROM trace_sessions WHERE session_id = $1 AND end_time < $2")
                .bind(session_id)
                .bind(cutoff)
                .execute(&self.pool)
                .await?;
        let deleted = result.rows_affected() > 0;
        if deleted {
            tracing::info!(session_id = %session_id, "Trace session expired");
        }
        Ok(deleted)
    }

    async fn all_sessions(&self) -> Result<Vec<Session>, TraceError> {
        let headers: Vec<(String, DateTime<Utc>, DateTime<Utc>)> = sqlx::query_as(
            "SELECT session_id, start_time, end_time FROM trace_sessions ORDER BY session_id",
        )
        .fetch_all(&self.pool)
        .await?;

        let rows: Vec<EventRow> = sqlx::query_as(
            "SELECT event_id, session_id, occurred_at, content, metadata
             FROM trace_events ORDER BY session_id, seq",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut sessions: Vec<Session> = headers
            .into_iter()
            .map(|(session_id, start_time, end_time)| Session {
                session_id,
                start_time,
                end_time,
                events: Vec::new(),
            })
            .collect();

        // both result sets are ordered by session_id
        let mut idx = 0;
        for row in rows {
            let event = Self::to_event(row)?;
            while idx < sessions.len() && sessions[idx].session_id < event.session_id {
                idx += 1;
            }
            match sessions.get_mut(idx) {
                Some(session) if session.session_id == event.session_id => {
                    session.events.push(event)
                }
                _ => {
                    tracing::warn!(session_id = %event.session_id, "Event row without session header");
                }
            }
        }
        Ok(sessions)
    }

    fn name(&self) -> &str {
        "postgres"
    }
}

// ============================================================================
// TESTS
// ============================================================================

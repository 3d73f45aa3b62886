//! PostgreSQL state backend
//!
//! Durable drop-in replacement for the in-memory store. Checkpoint
//! monotonicity and fingerprint novelty are enforced inside single
//! statements, so concurrent writers only contend on the affected row.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::Row;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::domain::{AlertFingerprint, Cursor, Session, SessionId, SessionSpec, SessionStatus};
use crate::error::{Result, VigilError};
use crate::persistence::{Checkpoint, StateStore};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS vigil_sessions (
        id UUID PRIMARY KEY,
        spec JSONB NOT NULL,
        status JSONB NOT NULL,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS vigil_checkpoints (
        session_id UUID PRIMARY KEY,
        cursor BIGINT NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS vigil_fingerprints (
        session_id UUID NOT NULL,
        fingerprint TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        PRIMARY KEY (session_id, fingerprint)
    )
    "#,
];

/// PostgreSQL storage adapter
#[derive(Clone)]
pub struct PostgresStateStore {
    pool: PgPool,
}

impl PostgresStateStore {
    /// Connect and make sure the schema exists
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        info!("Connected to PostgreSQL");
        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    /// Create a store from an existing connection pool
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn ensure_schema(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        info!("State schema ready");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn to_cursor(raw: i64) -> Cursor {
    Cursor(u64::try_from(raw).unwrap_or_default())
}

fn to_db_cursor(cursor: Cursor) -> Result<i64> {
    i64::try_from(cursor.height())
        .map_err(|_| VigilError::Internal(format!("cursor {} exceeds BIGINT", cursor)))
}

#[async_trait]
impl StateStore for PostgresStateStore {
    #[instrument(skip(self))]
    async fn get_checkpoint(&self, session: SessionId) -> Result<Option<Checkpoint>> {
        let row = sqlx::query(
            "SELECT cursor, updated_at FROM vigil_checkpoints WHERE session_id = $1",
        )
        .bind(session.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| Checkpoint {
            session_id: session,
            cursor: to_cursor(row.get("cursor")),
            updated_at: row.get("updated_at"),
        }))
    }

    #[instrument(skip(self))]
    async fn set_checkpoint(&self, session: SessionId, cursor: Cursor) -> Result<Checkpoint> {
        let row = sqlx::query(
            r#"
            INSERT INTO vigil_checkpoints (session_id, cursor, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (session_id) DO UPDATE SET
                cursor = EXCLUDED.cursor,
                updated_at = EXCLUDED.updated_at
            WHERE vigil_checkpoints.cursor <= EXCLUDED.cursor
            RETURNING cursor, updated_at
            "#,
        )
        .bind(session.as_uuid())
        .bind(to_db_cursor(cursor)?)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Checkpoint {
                session_id: session,
                cursor: to_cursor(row.get("cursor")),
                updated_at: row.get("updated_at"),
            }),
            None => {
                let current = self
                    .get_checkpoint(session)
                    .await?
                    .map(|c| c.cursor.height())
                    .unwrap_or_default();
                Err(VigilError::CheckpointRegression {
                    session: session.to_string(),
                    current,
                    requested: cursor.height(),
                })
            }
        }
    }

    #[instrument(skip(self))]
    async fn reset_checkpoint(&self, session: SessionId, cursor: Cursor) -> Result<Checkpoint> {
        let row = sqlx::query(
            r#"
            INSERT INTO vigil_checkpoints (session_id, cursor, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (session_id) DO UPDATE SET
                cursor = EXCLUDED.cursor,
                updated_at = EXCLUDED.updated_at
            RETURNING updated_at
            "#,
        )
        .bind(session.as_uuid())
        .bind(to_db_cursor(cursor)?)
        .fetch_one(&self.pool)
        .await?;

        Ok(Checkpoint {
            session_id: session,
            cursor,
            updated_at: row.get("updated_at"),
        })
    }

    async fn has_fingerprint(&self, session: SessionId, fp: &AlertFingerprint) -> Result<bool> {
        let row = sqlx::query(
            "SELECT 1 AS present FROM vigil_fingerprints WHERE session_id = $1 AND fingerprint = $2",
        )
        .bind(session.as_uuid())
        .bind(fp.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    #[instrument(skip(self))]
    async fn put_fingerprint(&self, session: SessionId, fp: &AlertFingerprint) -> Result<bool> {
        let row = sqlx::query(
            r#"
            INSERT INTO vigil_fingerprints (session_id, fingerprint)
            VALUES ($1, $2)
            ON CONFLICT (session_id, fingerprint) DO NOTHING
            RETURNING fingerprint
            "#,
        )
        .bind(session.as_uuid())
        .bind(fp.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    async fn clear_fingerprints(&self, session: SessionId) -> Result<usize> {
        let result = sqlx::query("DELETE FROM vigil_fingerprints WHERE session_id = $1")
            .bind(session.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() as usize)
    }

    #[instrument(skip(self, session), fields(session = %session.id))]
    async fn put_session(&self, session: &Session) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO vigil_sessions (id, spec, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE SET
                spec = EXCLUDED.spec,
                status = EXCLUDED.status,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(session.id.as_uuid())
        .bind(Json(&session.spec))
        .bind(Json(&session.status))
        .bind(session.created_at)
        .bind(session.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_session(&self, id: SessionId) -> Result<Option<Session>> {
        let row = sqlx::query(
            "SELECT id, spec, status, created_at, updated_at FROM vigil_sessions WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| session_from_row(&row)).transpose()
    }

    async fn list_sessions(&self) -> Result<Vec<Session>> {
        let rows = sqlx::query(
            "SELECT id, spec, status, created_at, updated_at FROM vigil_sessions ORDER BY created_at, id",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(session_from_row).collect()
    }
}

fn session_from_row(row: &sqlx::postgres::PgRow) -> Result<Session> {
    let id: Uuid = row.try_get("id")?;
    let spec: Json<SessionSpec> = row.try_get("spec")?;
    let status: Json<SessionStatus> = row.try_get("status")?;
    let created_at: DateTime<Utc> = row.try_get("created_at")?;
    let updated_at: DateTime<Utc> = row.try_get("updated_at")?;

    Ok(Session {
        id: SessionId::from(id),
        spec: spec.0,
        status: status.0,
        created_at,
        updated_at,
    })
}

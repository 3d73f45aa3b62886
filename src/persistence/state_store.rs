//! State Store
//!
//! Tracks per-session checkpoints, alert fingerprints and session metadata.
//! Backends serialise access per key only; there is no store-wide lock.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::domain::{AlertFingerprint, Cursor, Session, SessionId};
use crate::error::{Result, VigilError};

/// Last processed position of a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub session_id: SessionId,
    /// Next block height the session has to process
    pub cursor: Cursor,
    pub updated_at: DateTime<Utc>,
}

/// Key/value contract shared by every state backend
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get_checkpoint(&self, session: SessionId) -> Result<Option<Checkpoint>>;

    /// Advance the checkpoint. Moving it backwards fails with
    /// `CheckpointRegression`; writing the same cursor again is a no-op.
    async fn set_checkpoint(&self, session: SessionId, cursor: Cursor) -> Result<Checkpoint>;

    /// Overwrite the checkpoint unconditionally (explicit resume-from-scratch)
    async fn reset_checkpoint(&self, session: SessionId, cursor: Cursor) -> Result<Checkpoint>;

    async fn has_fingerprint(&self, session: SessionId, fp: &AlertFingerprint) -> Result<bool>;

    /// Record a fingerprint. Returns `true` if it was not present before.
    async fn put_fingerprint(&self, session: SessionId, fp: &AlertFingerprint) -> Result<bool>;

    /// Forget every fingerprint of a session. Returns how many were removed.
    async fn clear_fingerprints(&self, session: SessionId) -> Result<usize>;

    async fn put_session(&self, session: &Session) -> Result<()>;

    async fn get_session(&self, id: SessionId) -> Result<Option<Session>>;

    async fn list_sessions(&self) -> Result<Vec<Session>>;
}

/// Shared handle type used across the pipeline
pub type SharedStateStore = Arc<dyn StateStore>;

/// In-memory state backend; nothing survives a restart
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    checkpoints: DashMap<SessionId, Checkpoint>,
    fingerprints: DashMap<(SessionId, AlertFingerprint), DateTime<Utc>>,
    sessions: DashMap<SessionId, Session>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of fingerprints recorded for a session
    pub fn fingerprint_count(&self, session: SessionId) -> usize {
        self.fingerprints
            .iter()
            .filter(|entry| entry.key().0 == session)
            .count()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn get_checkpoint(&self, session: SessionId) -> Result<Option<Checkpoint>> {
        Ok(self.checkpoints.get(&session).map(|c| c.value().clone()))
    }

    async fn set_checkpoint(&self, session: SessionId, cursor: Cursor) -> Result<Checkpoint> {
        let now = Utc::now();
        match self.checkpoints.entry(session) {
            Entry::Occupied(mut entry) => {
                let current = entry.get().cursor;
                if cursor < current {
                    return Err(VigilError::CheckpointRegression {
                        session: session.to_string(),
                        current: current.height(),
                        requested: cursor.height(),
                    });
                }
                let checkpoint = entry.get_mut();
                checkpoint.cursor = cursor;
                checkpoint.updated_at = now;
                Ok(checkpoint.clone())
            }
            Entry::Vacant(entry) => {
                let checkpoint = Checkpoint {
                    session_id: session,
                    cursor,
                    updated_at: now,
                };
                entry.insert(checkpoint.clone());
                Ok(checkpoint)
            }
        }
    }

    async fn reset_checkpoint(&self, session: SessionId, cursor: Cursor) -> Result<Checkpoint> {
        let checkpoint = Checkpoint {
            session_id: session,
            cursor,
            updated_at: Utc::now(),
        };
        self.checkpoints.insert(session, checkpoint.clone());
        debug!("Checkpoint for {} reset to {}", session, cursor);
        Ok(checkpoint)
    }

    async fn has_fingerprint(&self, session: SessionId, fp: &AlertFingerprint) -> Result<bool> {
        Ok(self.fingerprints.contains_key(&(session, fp.clone())))
    }

    async fn put_fingerprint(&self, session: SessionId, fp: &AlertFingerprint) -> Result<bool> {
        match self.fingerprints.entry((session, fp.clone())) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(entry) => {
                entry.insert(Utc::now());
                Ok(true)
            }
        }
    }

    async fn clear_fingerprints(&self, session: SessionId) -> Result<usize> {
        let before = self.fingerprints.len();
        self.fingerprints.retain(|(owner, _), _| *owner != session);
        Ok(before.saturating_sub(self.fingerprints.len()))
    }

    async fn put_session(&self, session: &Session) -> Result<()> {
        self.sessions.insert(session.id, session.clone());
        Ok(())
    }

    async fn get_session(&self, id: SessionId) -> Result<Option<Session>> {
        Ok(self.sessions.get(&id).map(|s| s.value().clone()))
    }

    async fn list_sessions(&self) -> Result<Vec<Session>> {
        let mut sessions: Vec<Session> = self.sessions.iter().map(|s| s.value().clone()).collect();
        sessions.sort_by_key(|s| (s.created_at, s.id));
        Ok(sessions)
    }
}

use serde::Serialize;

use crate::domain::{Session, SessionId};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub accepting: bool,
    pub sessions: usize,
    pub active_sessions: usize,
    pub uptime_secs: i64,
}

#[derive(Debug, Serialize)]
pub struct CreateSessionResponse {
    pub id: SessionId,
}

#[derive(Debug, Serialize)]
pub struct SessionDetail {
    #[serde(flatten)]
    pub session: Session,
    /// Next block height the session will process
    pub checkpoint: Option<u64>,
    /// Last worker heartbeat (unix seconds)
    pub last_heartbeat: Option<i64>,
}

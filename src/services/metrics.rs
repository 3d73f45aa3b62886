use chrono::Utc;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

use crate::domain::SessionId;

/// Metrics collector for observability
#[derive(Debug, Default)]
pub struct Metrics {
    /// Non-empty batches fully processed
    pub batches_processed: AtomicU64,
    /// Blocks covered by processed batches
    pub blocks_processed: AtomicU64,
    /// Findings produced by heuristics
    pub findings: AtomicU64,
    /// Alerts sent to at least one sink
    pub alerts_delivered: AtomicU64,
    /// Findings dropped because their fingerprint was already recorded
    pub alerts_suppressed: AtomicU64,
    /// Sink deliveries that exhausted their retries
    pub delivery_failures: AtomicU64,
    /// Transient fetch errors seen by collectors
    pub fetch_failures: AtomicU64,
    /// Sessions that ended in `failed`
    pub sessions_failed: AtomicU64,
    /// Last loop iteration per session (unix seconds)
    heartbeats: DashMap<SessionId, i64>,
}

impl Metrics {
    /// Create a new metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_batches(&self, blocks: u64) {
        self.batches_processed.fetch_add(1, Ordering::Relaxed);
        self.blocks_processed.fetch_add(blocks, Ordering::Relaxed);
    }

    pub fn inc_findings(&self, count: u64) {
        self.findings.fetch_add(count, Ordering::Relaxed);
    }

    pub fn inc_alerts_delivered(&self) {
        self.alerts_delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_alerts_suppressed(&self) {
        self.alerts_suppressed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_delivery_failures(&self) {
        self.delivery_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_fetch_failures(&self) {
        self.fetch_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_sessions_failed(&self) {
        self.sessions_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record that a session worker completed a loop iteration
    pub fn heartbeat(&self, session: SessionId) {
        self.heartbeats.insert(session, Utc::now().timestamp());
    }

    pub fn last_heartbeat(&self, session: SessionId) -> Option<i64> {
        self.heartbeats.get(&session).map(|t| *t)
    }

    pub fn forget(&self, session: SessionId) {
        self.heartbeats.remove(&session);
    }

    /// Current metrics as a formatted string
    pub fn summary(&self, active_sessions: usize) -> String {
        format!(
            "sessions={} batches={} blocks={} findings={} delivered={} suppressed={} delivery_failures={} fetch_failures={}",
            active_sessions,
            self.batches_processed.load(Ordering::Relaxed),
            self.blocks_processed.load(Ordering::Relaxed),
            self.findings.load(Ordering::Relaxed),
            self.alerts_delivered.load(Ordering::Relaxed),
            self.alerts_suppressed.load(Ordering::Relaxed),
            self.delivery_failures.load(Ordering::Relaxed),
            self.fetch_failures.load(Ordering::Relaxed),
        )
    }

    /// Export metrics in Prometheus format
    pub fn prometheus(&self, active_sessions: usize) -> String {
        let oldest_heartbeat = self
            .heartbeats
            .iter()
            .map(|entry| *entry.value())
            .min()
            .unwrap_or_default();

        format!(
            r#"# HELP vigil_active_sessions Sessions with a running worker
# TYPE vigil_active_sessions gauge
vigil_active_sessions {}

# HELP vigil_batches_processed_total Batches fully processed
# TYPE vigil_batches_processed_total counter
vigil_batches_processed_total {}

# HELP vigil_blocks_processed_total Blocks covered by processed batches
# TYPE vigil_blocks_processed_total counter
vigil_blocks_processed_total {}

# HELP vigil_findings_total Findings produced by heuristics
# TYPE vigil_findings_total counter
vigil_findings_total {}

# HELP vigil_alerts_delivered_total Alerts delivered to at least one sink
# TYPE vigil_alerts_delivered_total counter
vigil_alerts_delivered_total {}

# HELP vigil_alerts_suppressed_total Duplicate alerts suppressed
# TYPE vigil_alerts_suppressed_total counter
vigil_alerts_suppressed_total {}

# HELP vigil_delivery_failures_total Sink deliveries that exhausted retries
# TYPE vigil_delivery_failures_total counter
vigil_delivery_failures_total {}

# HELP vigil_fetch_failures_total Transient chain fetch failures
# TYPE vigil_fetch_failures_total counter
vigil_fetch_failures_total {}

# HELP vigil_sessions_failed_total Sessions that ended in failure
# TYPE vigil_sessions_failed_total counter
vigil_sessions_failed_total {}

# HELP vigil_oldest_heartbeat_seconds Oldest session heartbeat (unix time)
# TYPE vigil_oldest_heartbeat_seconds gauge
vigil_oldest_heartbeat_seconds {}
"#,
            active_sessions,
            self.batches_processed.load(Ordering::Relaxed),
            self.blocks_processed.load(Ordering::Relaxed),
            self.findings.load(Ordering::Relaxed),
            self.alerts_delivered.load(Ordering::Relaxed),
            self.alerts_suppressed.load(Ordering::Relaxed),
            self.delivery_failures.load(Ordering::Relaxed),
            self.fetch_failures.load(Ordering::Relaxed),
            self.sessions_failed.load(Ordering::Relaxed),
            oldest_heartbeat,
        )
    }

    /// Log periodic status
    pub fn log_status(&self, active_sessions: usize) {
        info!("{}", self.summary(active_sessions));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prometheus_export() {
        let metrics = Metrics::new();
        metrics.inc_batches(3);
        metrics.inc_batches(2);
        metrics.inc_alerts_suppressed();

        let text = metrics.prometheus(4);
        assert!(text.contains("vigil_active_sessions 4"));
        assert!(text.contains("vigil_batches_processed_total 2"));
        assert!(text.contains("vigil_blocks_processed_total 5"));
        assert!(text.contains("vigil_alerts_suppressed_total 1"));
    }

    #[test]
    fn test_heartbeats_per_session() {
        let metrics = Metrics::new();
        let id = SessionId::new();
        assert!(metrics.last_heartbeat(id).is_none());
        metrics.heartbeat(id);
        assert!(metrics.last_heartbeat(id).is_some());
        metrics.forget(id);
        assert!(metrics.last_heartbeat(id).is_none());
    }
}

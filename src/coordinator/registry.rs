//! Session Registry
//!
//! Owns every session record and the worker task behind it. Workers never
//! touch session records; they report their exit through the registry, which
//! applies the status change, persists it and publishes a `SessionEvent`.

use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::Serialize;
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tracing::{error, info, info_span, warn, Instrument};

use super::bootstrap::{BootstrapCreated, BootstrapFailure, BootstrapReport};
use crate::adapters::{ClientBundle, SharedChainClient};
use crate::collector::{SessionWorker, WorkerContext, WorkerOutcome};
use crate::coordination::{stop_pair, StopHandle};
use crate::domain::{Cursor, Session, SessionId, SessionSpec, SessionStatus, StartPosition};
use crate::error::{Result, VigilError};

/// Status change notification
#[derive(Debug, Clone, Serialize)]
pub struct SessionEvent {
    pub session_id: SessionId,
    pub status: SessionStatus,
    pub at: DateTime<Utc>,
}

/// Result of a registry shutdown
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ShutdownReport {
    /// Workers that finished before the deadline
    pub stopped: Vec<SessionId>,
    /// Workers aborted at the deadline
    pub abandoned: Vec<SessionId>,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.abandoned.is_empty()
    }
}

struct SessionEntry {
    session: Session,
    /// Registration order, tiebreak for equal creation timestamps
    seq: u64,
    stop: Option<StopHandle>,
    task: Option<JoinHandle<()>>,
}

struct RegistryInner {
    sessions: RwLock<HashMap<SessionId, SessionEntry>>,
    bundle: ClientBundle,
    ctx: WorkerContext,
    accepting: AtomicBool,
    next_seq: AtomicU64,
    event_tx: broadcast::Sender<SessionEvent>,
}

/// Cheaply cloneable handle to the session registry
#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<RegistryInner>,
}

impl SessionRegistry {
    pub fn new(bundle: ClientBundle, ctx: WorkerContext) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            inner: Arc::new(RegistryInner {
                sessions: RwLock::new(HashMap::new()),
                bundle,
                ctx,
                accepting: AtomicBool::new(true),
                next_seq: AtomicU64::new(0),
                event_tx,
            }),
        }
    }

    /// Subscribe to session status changes
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.event_tx.subscribe()
    }

    pub fn is_accepting(&self) -> bool {
        self.inner.accepting.load(Ordering::SeqCst)
    }

    // =========================================================================
    // Creation
    // =========================================================================

    /// Validate a spec, persist the session and start its worker.
    ///
    /// Validation failures, and a shutdown that begins while the start height
    /// is resolved, leave no trace in the registry or the store.
    pub async fn create_session(&self, spec: SessionSpec) -> Result<SessionId> {
        if !self.is_accepting() {
            return Err(VigilError::NotAccepting);
        }

        let client = self.validate(&spec)?;
        let start = match spec.start {
            StartPosition::Height(height) => Cursor(height),
            StartPosition::Latest => Cursor(client.latest_height().await?),
        };

        let session = Session::new(spec);
        let id = session.id;

        // Persist under the lock so shutdown either sees the entry or we see it first
        let mut sessions = self.inner.sessions.write().await;
        if !self.is_accepting() {
            return Err(VigilError::NotAccepting);
        }
        self.inner.ctx.store.put_session(&session).await?;
        self.inner.ctx.store.set_checkpoint(id, start).await?;

        info!("Created session {} starting at {}", session.display_name(), start);
        self.spawn_locked(&mut sessions, session, client);
        Ok(id)
    }

    /// Check a spec without creating anything
    pub fn validate(&self, spec: &SessionSpec) -> Result<SharedChainClient> {
        self.inner.ctx.engine.validate(spec)?;

        let client = self.inner.bundle.get(&spec.chain_target).ok_or_else(|| {
            VigilError::InvalidSpec(format!("unknown chain target '{}'", spec.chain_target))
        })?;

        if let (StartPosition::Height(start), Some(end)) = (spec.start, spec.end_height) {
            if end < start {
                return Err(VigilError::InvalidSpec(format!(
                    "end height {} is before start height {}",
                    end, start
                )));
            }
        }

        Ok(client)
    }

    /// Create a session per manifest entry without short-circuiting
    pub async fn bootstrap<I>(&self, entries: I) -> BootstrapReport
    where
        I: IntoIterator<Item = Result<SessionSpec>>,
    {
        let mut report = BootstrapReport::default();

        for (index, entry) in entries.into_iter().enumerate() {
            let created = match entry {
                Ok(spec) => self.create_session(spec).await,
                Err(e) => Err(e),
            };

            match created {
                Ok(session_id) => report.created.push(BootstrapCreated { index, session_id }),
                Err(e) => {
                    warn!("Bootstrap entry {} rejected: {}", index, e);
                    report.failures.push(BootstrapFailure {
                        index,
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            "Bootstrap finished: {} created, {} failed",
            report.created.len(),
            report.failures.len()
        );
        report
    }

    /// Restart workers for sessions a durable store still lists as running
    pub async fn resume_persisted(&self) -> Result<Vec<SessionId>> {
        let mut resumed = Vec::new();

        for mut session in self.inner.ctx.store.list_sessions().await? {
            if session.status.is_terminal() {
                continue;
            }
            if self.inner.sessions.read().await.contains_key(&session.id) {
                continue;
            }

            let client = match self.validate(&session.spec) {
                Ok(client) => client,
                Err(e) => {
                    warn!("Cannot resume session {}: {}", session.id, e);
                    continue;
                }
            };

            if self.inner.ctx.store.get_checkpoint(session.id).await?.is_none() {
                let start = match session.spec.start {
                    StartPosition::Height(height) => Cursor(height),
                    StartPosition::Latest => Cursor(client.latest_height().await?),
                };
                self.inner.ctx.store.set_checkpoint(session.id, start).await?;
            }

            let mut sessions = self.inner.sessions.write().await;
            if !self.is_accepting() {
                return Err(VigilError::NotAccepting);
            }
            if sessions.contains_key(&session.id) {
                continue;
            }

            // A new process starts the lifecycle over
            session.status = SessionStatus::Pending;
            session.updated_at = Utc::now();
            info!("Resuming session {}", session.display_name());
            resumed.push(session.id);
            self.spawn_locked(&mut sessions, session, client);
        }

        Ok(resumed)
    }

    /// Start a worker; the caller holds the sessions write lock and has
    /// checked that the registry still accepts sessions
    fn spawn_locked(
        &self,
        sessions: &mut HashMap<SessionId, SessionEntry>,
        session: Session,
        client: SharedChainClient,
    ) {
        let id = session.id;
        let (stop, signal) = stop_pair();
        let worker = SessionWorker::new(
            id,
            session.spec.clone(),
            client,
            self.inner.bundle.max_blocks_per_batch(&session.spec.chain_target),
            self.inner.ctx.clone(),
            signal,
        );

        let registry = self.clone();
        let span = info_span!("session", id = %id);
        let task = tokio::spawn(
            async move {
                if let Err(e) = registry.transition(id, SessionStatus::Active).await {
                    warn!("Session {} did not start: {}", id, e);
                    return;
                }
                // Runs inline so aborting this task at shutdown also drops the worker
                let outcome = match AssertUnwindSafe(worker.run()).catch_unwind().await {
                    Ok(outcome) => outcome,
                    Err(payload) => {
                        let reason = panic_message(payload.as_ref());
                        error!("Worker of session {} panicked: {}", id, reason);
                        WorkerOutcome::Failed(format!("worker panicked: {}", reason))
                    }
                };
                registry.record_exit(id, outcome).await;
            }
            .instrument(span),
        );

        sessions.insert(
            id,
            SessionEntry {
                session,
                seq: self.inner.next_seq.fetch_add(1, Ordering::SeqCst),
                stop: Some(stop),
                task: Some(task),
            },
        );
    }

    // =========================================================================
    // Status changes
    // =========================================================================

    async fn transition(&self, id: SessionId, next: SessionStatus) -> Result<Session> {
        let session = {
            let mut sessions = self.inner.sessions.write().await;
            let entry = sessions
                .get_mut(&id)
                .ok_or_else(|| VigilError::SessionNotFound(id.to_string()))?;

            if !entry.session.status.can_transition_to(&next) {
                return Err(VigilError::InvalidStateTransition {
                    from: entry.session.status.to_string(),
                    to: next.to_string(),
                });
            }
            entry.session.status = next;
            entry.session.updated_at = Utc::now();
            if entry.session.status.is_terminal() {
                entry.stop = None;
            }
            entry.session.clone()
        };

        if let Err(e) = self.inner.ctx.store.put_session(&session).await {
            error!("Failed to persist status of session {}: {}", id, e);
        }
        let _ = self.inner.event_tx.send(SessionEvent {
            session_id: id,
            status: session.status.clone(),
            at: session.updated_at,
        });
        Ok(session)
    }

    /// Apply a worker's exit to its session record
    async fn record_exit(&self, id: SessionId, outcome: WorkerOutcome) {
        let next = match outcome {
            WorkerOutcome::Stopped | WorkerOutcome::Completed => SessionStatus::Stopped,
            WorkerOutcome::Failed(reason) => {
                self.inner.ctx.metrics.inc_sessions_failed();
                SessionStatus::Failed { reason }
            }
        };

        match self.transition(id, next).await {
            Ok(session) => info!("Session {} is now {}", id, session.status),
            Err(e) => warn!("Session {} exit not recorded: {}", id, e),
        }
        self.inner.ctx.metrics.forget(id);
    }

    /// Mark a session stopped unless it already reached a terminal state
    async fn settle_stopped(&self, id: SessionId) {
        let terminal = {
            let sessions = self.inner.sessions.read().await;
            sessions
                .get(&id)
                .map(|e| e.session.status.is_terminal())
                .unwrap_or(true)
        };
        if !terminal {
            if let Err(e) = self.transition(id, SessionStatus::Stopped).await {
                warn!("Session {} could not be marked stopped: {}", id, e);
            }
        }
    }

    // =========================================================================
    // Stop / reset / shutdown
    // =========================================================================

    /// Signal a session, wait for its in-flight cycle and mark it stopped.
    /// Stopping an already stopped session is a no-op.
    pub async fn stop_session(&self, id: SessionId) -> Result<()> {
        let task = {
            let mut sessions = self.inner.sessions.write().await;
            let entry = sessions
                .get_mut(&id)
                .ok_or_else(|| VigilError::SessionNotFound(id.to_string()))?;
            if let Some(stop) = &entry.stop {
                stop.stop();
            }
            entry.task.take()
        };

        if let Some(task) = task {
            if let Err(e) = task.await {
                error!("Worker of session {} ended abnormally: {}", id, e);
            }
        }

        self.settle_stopped(id).await;
        Ok(())
    }

    /// Stop a session and clear its progress: fingerprints are forgotten and
    /// the checkpoint is rewound to `cursor`. The session stays stopped.
    pub async fn reset_session(&self, id: SessionId, cursor: Cursor) -> Result<()> {
        self.stop_session(id).await?;

        let cleared = self.inner.ctx.store.clear_fingerprints(id).await?;
        self.inner.ctx.store.reset_checkpoint(id, cursor).await?;
        info!(
            "Session {} reset to {} ({} fingerprints cleared)",
            id, cursor, cleared
        );
        Ok(())
    }

    /// Stop accepting sessions, signal every worker and wait until `timeout`.
    /// Workers still running at the deadline are aborted and reported as abandoned.
    pub async fn shutdown(&self, timeout: Duration) -> ShutdownReport {
        self.inner.accepting.store(false, Ordering::SeqCst);

        let running: Vec<(SessionId, JoinHandle<()>)> = {
            let mut sessions = self.inner.sessions.write().await;
            sessions
                .iter_mut()
                .filter_map(|(id, entry)| {
                    if let Some(stop) = &entry.stop {
                        stop.stop();
                    }
                    entry.task.take().map(|task| (*id, task))
                })
                .collect()
        };

        info!(
            "Shutting down {} session workers (deadline {:?})",
            running.len(),
            timeout
        );

        let deadline = tokio::time::Instant::now() + timeout;
        let mut report = ShutdownReport::default();

        for (id, mut task) in running {
            match tokio::time::timeout_at(deadline, &mut task).await {
                Ok(Ok(())) => report.stopped.push(id),
                Ok(Err(e)) => {
                    error!("Worker of session {} ended abnormally: {}", id, e);
                    report.stopped.push(id);
                }
                Err(_) => {
                    task.abort();
                    let _ = tokio::time::timeout(Duration::from_millis(100), task).await;
                    warn!("Session {} abandoned at shutdown deadline", id);
                    report.abandoned.push(id);
                }
            }
        }

        let ids: Vec<SessionId> = self.inner.sessions.read().await.keys().copied().collect();
        for id in ids {
            self.settle_stopped(id).await;
        }

        info!(
            "Shutdown complete: {} stopped, {} abandoned",
            report.stopped.len(),
            report.abandoned.len()
        );
        report
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub async fn get_session(&self, id: SessionId) -> Result<Session> {
        self.inner
            .sessions
            .read()
            .await
            .get(&id)
            .map(|e| e.session.clone())
            .ok_or_else(|| VigilError::SessionNotFound(id.to_string()))
    }

    /// Every known session, oldest first
    pub async fn list_sessions(&self) -> Vec<Session> {
        let sessions = self.inner.sessions.read().await;
        let mut entries: Vec<&SessionEntry> = sessions.values().collect();
        entries.sort_by_key(|e| (e.session.created_at, e.seq));
        entries.into_iter().map(|e| e.session.clone()).collect()
    }

    pub async fn session_count(&self) -> usize {
        self.inner.sessions.read().await.len()
    }

    /// Sessions that are not yet stopped or failed
    pub async fn active_count(&self) -> usize {
        self.inner
            .sessions
            .read()
            .await
            .values()
            .filter(|e| !e.session.status.is_terminal())
            .count()
    }

    pub fn bundle(&self) -> &ClientBundle {
        &self.inner.bundle
    }

    pub fn context(&self) -> &WorkerContext {
        &self.inner.ctx
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MockChainClient;
    use crate::config::{CollectorConfig, DispatcherConfig};
    use crate::coordination::RetryPolicy;
    use crate::domain::{ChainTarget, DataBatch, HeuristicKind, HeuristicParams};
    use crate::heuristics::HeuristicEngine;
    use crate::persistence::{MemoryStateStore, StateStore};
    use crate::services::Metrics;
    use crate::supervisor::AlertDispatcher;

    fn idle_chain(head: u64) -> MockChainClient {
        let mut mock = MockChainClient::new();
        mock.expect_latest_height().returning(move || Ok(head));
        mock.expect_fetch_since()
            .returning(|req| Ok(DataBatch::empty(ChainTarget::new("layer1"), req.from)));
        mock
    }

    fn registry(store: Arc<MemoryStateStore>) -> SessionRegistry {
        registry_with(store, idle_chain(1_000))
    }

    fn registry_with(store: Arc<MemoryStateStore>, chain: MockChainClient) -> SessionRegistry {
        let ctx = WorkerContext {
            store: store.clone(),
            engine: Arc::new(HeuristicEngine::with_defaults()),
            dispatcher: Arc::new(AlertDispatcher::new(store, &DispatcherConfig::default())),
            metrics: Arc::new(Metrics::new()),
            config: CollectorConfig {
                poll_interval_ms: 5,
                max_consecutive_failures: 2,
                backoff: RetryPolicy::new(1, 2),
            },
        };
        let bundle = ClientBundle::new().with_client("layer1", Arc::new(chain));
        SessionRegistry::new(bundle, ctx)
    }

    fn spec() -> SessionSpec {
        SessionSpec::new(
            "layer1",
            HeuristicKind::LargeTransfer,
            HeuristicParams::new().with("threshold", "1"),
        )
    }

    async fn wait_for_status(registry: &SessionRegistry, id: SessionId, state: &str) {
        for _ in 0..100 {
            if registry.get_session(id).await.unwrap().status.as_str() == state {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("session {} never reached {}", id, state);
    }

    #[tokio::test]
    async fn test_create_starts_at_latest_height() {
        let store = Arc::new(MemoryStateStore::new());
        let registry = registry(store.clone());

        let id = registry.create_session(spec()).await.unwrap();
        wait_for_status(&registry, id, "active").await;

        assert_eq!(store.get_checkpoint(id).await.unwrap().unwrap().cursor, Cursor(1_000));
        assert!(store.get_session(id).await.unwrap().is_some());
        assert_eq!(registry.session_count().await, 1);
    }

    #[tokio::test]
    async fn test_invalid_spec_has_no_side_effects() {
        let store = Arc::new(MemoryStateStore::new());
        let registry = registry(store.clone());

        let unknown_chain = SessionSpec::new(
            "layer9",
            HeuristicKind::LargeTransfer,
            HeuristicParams::new().with("threshold", "1"),
        );
        let err = registry.create_session(unknown_chain).await.unwrap_err();
        assert!(matches!(err, VigilError::InvalidSpec(_)));

        let bad_params = SessionSpec::new("layer1", HeuristicKind::LargeTransfer, HeuristicParams::new());
        assert!(registry.create_session(bad_params).await.is_err());

        let inverted = spec()
            .starting_at(StartPosition::Height(10))
            .ending_at(5);
        assert!(registry.create_session(inverted).await.is_err());

        assert_eq!(registry.session_count().await, 0);
        assert!(store.list_sessions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let store = Arc::new(MemoryStateStore::new());
        let registry = registry(store);
        let mut events = registry.subscribe();

        let id = registry.create_session(spec()).await.unwrap();
        registry.stop_session(id).await.unwrap();
        assert_eq!(registry.get_session(id).await.unwrap().status, SessionStatus::Stopped);

        registry.stop_session(id).await.unwrap();
        assert_eq!(registry.get_session(id).await.unwrap().status, SessionStatus::Stopped);

        let first = events.recv().await.unwrap();
        assert_eq!(first.session_id, id);
        assert_eq!(first.status, SessionStatus::Active);
        assert_eq!(events.recv().await.unwrap().status, SessionStatus::Stopped);
        assert_eq!(registry.active_count().await, 0);
    }

    #[tokio::test]
    async fn test_stop_unknown_session() {
        let registry = registry(Arc::new(MemoryStateStore::new()));
        let err = registry.stop_session(SessionId::new()).await.unwrap_err();
        assert!(matches!(err, VigilError::SessionNotFound(_)));
    }

    #[tokio::test]
    async fn test_shutdown_stops_accepting() {
        let registry = registry(Arc::new(MemoryStateStore::new()));
        let id = registry.create_session(spec()).await.unwrap();

        let report = registry.shutdown(Duration::from_secs(2)).await;
        assert_eq!(report.stopped, vec![id]);
        assert!(report.is_clean());
        assert_eq!(registry.get_session(id).await.unwrap().status, SessionStatus::Stopped);

        let err = registry.create_session(spec()).await.unwrap_err();
        assert!(matches!(err, VigilError::NotAccepting));
    }

    #[tokio::test]
    async fn test_reset_rewinds_progress() {
        let store = Arc::new(MemoryStateStore::new());
        let registry = registry(store.clone());
        let id = registry.create_session(spec()).await.unwrap();

        let fp = crate::domain::AlertFingerprint::from_hex("aa");
        store.put_fingerprint(id, &fp).await.unwrap();

        registry.reset_session(id, Cursor(3)).await.unwrap();
        assert_eq!(store.get_checkpoint(id).await.unwrap().unwrap().cursor, Cursor(3));
        assert!(!store.has_fingerprint(id, &fp).await.unwrap());
        assert_eq!(registry.get_session(id).await.unwrap().status, SessionStatus::Stopped);
    }

    #[tokio::test]
    async fn test_resume_persisted_sessions() {
        let store = Arc::new(MemoryStateStore::new());
        let mut session = Session::new(spec());
        session.status = SessionStatus::Active;
        store.put_session(&session).await.unwrap();
        store.set_checkpoint(session.id, Cursor(77)).await.unwrap();

        let mut finished = Session::new(spec());
        finished.status = SessionStatus::Stopped;
        store.put_session(&finished).await.unwrap();

        let registry = registry(store.clone());
        let resumed = registry.resume_persisted().await.unwrap();
        assert_eq!(resumed, vec![session.id]);
        wait_for_status(&registry, session.id, "active").await;
        assert_eq!(store.get_checkpoint(session.id).await.unwrap().unwrap().cursor, Cursor(77));

        registry.shutdown(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn test_worker_panic_marks_session_failed() {
        let mut chain = MockChainClient::new();
        chain.expect_latest_height().returning(|| Ok(10));
        chain
            .expect_fetch_since()
            .returning(|_| -> Result<DataBatch> { panic!("decoder bug") });

        let store = Arc::new(MemoryStateStore::new());
        let registry = registry_with(store.clone(), chain);
        let id = registry.create_session(spec()).await.unwrap();

        wait_for_status(&registry, id, "failed").await;
        match registry.get_session(id).await.unwrap().status {
            SessionStatus::Failed { reason } => assert!(reason.contains("decoder bug")),
            other => panic!("unexpected status {:?}", other),
        }
        let persisted = store.get_session(id).await.unwrap().unwrap();
        assert!(matches!(persisted.status, SessionStatus::Failed { .. }));
        assert_eq!(registry.active_count().await, 0);

        // The failed session is settled; shutdown has nothing left to wait on
        assert!(registry.shutdown(Duration::from_secs(1)).await.is_clean());
    }

    /// Chain whose head lookup waits until the gate opens
    struct GatedChain {
        gate: Arc<tokio::sync::Notify>,
    }

    #[async_trait::async_trait]
    impl crate::adapters::ChainClient for GatedChain {
        async fn latest_height(&self) -> Result<u64> {
            self.gate.notified().await;
            Ok(50)
        }

        async fn fetch_since(&self, request: &crate::domain::FetchRequest) -> Result<DataBatch> {
            Ok(DataBatch::empty(ChainTarget::new("layer1"), request.from))
        }
    }

    #[tokio::test]
    async fn test_create_racing_shutdown_persists_nothing() {
        let store = Arc::new(MemoryStateStore::new());
        let gate = Arc::new(tokio::sync::Notify::new());
        let registry = SessionRegistry::new(
            ClientBundle::new().with_client("layer1", Arc::new(GatedChain { gate: gate.clone() })),
            registry(store.clone()).context().clone(),
        );

        let creating = {
            let registry = registry.clone();
            tokio::spawn(async move { registry.create_session(spec()).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(registry.shutdown(Duration::from_secs(1)).await.is_clean());
        gate.notify_one();

        let err = creating.await.unwrap().unwrap_err();
        assert!(matches!(err, VigilError::NotAccepting));
        assert!(store.list_sessions().await.unwrap().is_empty());
        assert_eq!(registry.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_equal_timestamps_list_in_stable_order() {
        let store = Arc::new(MemoryStateStore::new());
        let created_at = Utc::now();
        let mut ids = Vec::new();
        for _ in 0..5 {
            let mut session = Session::new(spec().starting_at(StartPosition::Height(1)));
            session.created_at = created_at;
            session.updated_at = created_at;
            ids.push(session.id);
            store.put_session(&session).await.unwrap();
        }
        ids.sort();

        let listed: Vec<SessionId> = store.list_sessions().await.unwrap().iter().map(|s| s.id).collect();
        assert_eq!(listed, ids);

        let registry = registry(store.clone());
        assert_eq!(registry.resume_persisted().await.unwrap(), ids);
        let listed: Vec<SessionId> = registry.list_sessions().await.iter().map(|s| s.id).collect();
        assert_eq!(listed, ids);

        registry.shutdown(Duration::from_secs(1)).await;
    }
}

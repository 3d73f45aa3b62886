//! Shared fixtures for the integration tests

#![allow(dead_code)]

use alloy::primitives::{Address, B256, U256};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use vigil::adapters::{ChainClient, ClientBundle};
use vigil::collector::WorkerContext;
use vigil::config::{CollectorConfig, DispatcherConfig};
use vigil::coordination::RetryPolicy;
use vigil::domain::{
    Block, ChainTarget, DataBatch, FetchRequest, HeuristicKind, HeuristicParams, SessionId,
    SessionSpec, SessionStatus, StartPosition, Transaction,
};
use vigil::persistence::SharedStateStore;
use vigil::services::Metrics;
use vigil::supervisor::{Alert, AlertDispatcher, AlertSink};
use vigil::{HeuristicEngine, Result, SessionRegistry, VigilError};

/// Deterministic chain: every block carries one transfer of `value` wei
pub struct ScriptedChain {
    pub name: String,
    pub head: AtomicU64,
    pub value: u64,
    /// Remaining fetches that fail with a transient error
    pub failures: AtomicU32,
    pub fetches: AtomicU32,
}

impl ScriptedChain {
    pub fn new(name: &str, head: u64, value: u64) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            head: AtomicU64::new(head),
            value,
            failures: AtomicU32::new(0),
            fetches: AtomicU32::new(0),
        })
    }

    pub fn failing(name: &str, failures: u32) -> Arc<Self> {
        let chain = Self::new(name, 1_000, 1);
        chain.failures.store(failures, Ordering::SeqCst);
        chain
    }

    pub fn transfer_hash(number: u64) -> B256 {
        B256::left_padding_from(&number.to_be_bytes())
    }
}

#[async_trait]
impl ChainClient for ScriptedChain {
    async fn latest_height(&self) -> Result<u64> {
        Ok(self.head.load(Ordering::SeqCst))
    }

    async fn fetch_since(&self, request: &FetchRequest) -> Result<DataBatch> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(VigilError::TransientFetch(format!("{} unavailable", self.name)));
        }

        let head = self.head.load(Ordering::SeqCst);
        let from = request.from.height();
        let blocks = (from..from.saturating_add(request.max_blocks))
            .take_while(|n| *n <= head)
            .map(|n| {
                let mut block = Block::new(n);
                block.transactions.push(Transaction {
                    hash: Self::transfer_hash(n),
                    from: Address::repeat_byte(0x11),
                    to: Some(Address::repeat_byte(0x22)),
                    value: U256::from(self.value),
                });
                block
            })
            .collect();

        Ok(DataBatch::from_blocks(ChainTarget::new(self.name.as_str()), request.from, blocks))
    }
}

/// Sink that keeps every alert it receives
#[derive(Default)]
pub struct RecordingSink {
    pub alerts: Mutex<Vec<Alert>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn count(&self) -> usize {
        self.alerts.lock().await.len()
    }

    pub async fn count_for(&self, session: SessionId) -> usize {
        self.alerts
            .lock()
            .await
            .iter()
            .filter(|a| a.session_id == session)
            .count()
    }
}

#[async_trait]
impl AlertSink for RecordingSink {
    fn name(&self) -> &str {
        "recording"
    }

    async fn deliver(&self, alert: &Alert) -> Result<()> {
        self.alerts.lock().await.push(alert.clone());
        Ok(())
    }
}

/// Sink whose deliveries never complete
pub struct HangingSink;

#[async_trait]
impl AlertSink for HangingSink {
    fn name(&self) -> &str {
        "hanging"
    }

    async fn deliver(&self, _alert: &Alert) -> Result<()> {
        std::future::pending::<()>().await;
        Ok(())
    }
}

pub fn collector_config() -> CollectorConfig {
    CollectorConfig {
        poll_interval_ms: 10,
        max_consecutive_failures: 3,
        backoff: RetryPolicy::new(1, 5),
    }
}

pub fn dispatcher_config() -> DispatcherConfig {
    DispatcherConfig {
        max_attempts: 2,
        backoff: RetryPolicy::new(1, 5),
        delivery_timeout_ms: 60_000,
    }
}

pub fn context(store: SharedStateStore, sink: Arc<dyn AlertSink>) -> WorkerContext {
    let metrics = Arc::new(Metrics::new());
    let dispatcher = AlertDispatcher::new(store.clone(), &dispatcher_config())
        .with_route(sink, vigil::domain::Severity::Low)
        .with_metrics(metrics.clone());
    WorkerContext {
        store,
        engine: Arc::new(HeuristicEngine::with_defaults()),
        dispatcher: Arc::new(dispatcher),
        metrics,
        config: collector_config(),
    }
}

pub fn registry(
    store: SharedStateStore,
    sink: Arc<dyn AlertSink>,
    chains: &[Arc<ScriptedChain>],
) -> SessionRegistry {
    let mut bundle = ClientBundle::new();
    for chain in chains {
        bundle.insert_with_limit(chain.name.as_str(), chain.clone(), 4);
    }
    SessionRegistry::new(bundle, context(store, sink))
}

/// Large-transfer session over `start..=end`
pub fn transfer_spec(chain: &str, start: u64, end: Option<u64>) -> SessionSpec {
    let spec = SessionSpec::new(
        chain,
        HeuristicKind::LargeTransfer,
        HeuristicParams::new().with("threshold", "100"),
    )
    .starting_at(StartPosition::Height(start));
    match end {
        Some(end) => spec.ending_at(end),
        None => spec,
    }
}

/// Poll until the session satisfies `done` or panic after five seconds
pub async fn wait_for<F>(registry: &SessionRegistry, id: SessionId, done: F) -> SessionStatus
where
    F: Fn(&SessionStatus) -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let status = registry.get_session(id).await.expect("session exists").status;
        if done(&status) {
            return status;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("session {} stuck in {:?}", id, status);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

pub async fn wait_until_terminal(registry: &SessionRegistry, id: SessionId) -> SessionStatus {
    wait_for(registry, id, |s| s.is_terminal()).await
}

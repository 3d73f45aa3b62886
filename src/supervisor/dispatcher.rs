//! Alert Dispatcher
//!
//! Fingerprints findings, suppresses duplicates and fans alerts out to the
//! configured sinks. The fingerprint is recorded before any delivery attempt,
//! so a crash between record and send loses the alert rather than repeating it.

use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use super::alert::{Alert, AlertSink, LogSink, SharedSink};
use crate::adapters::{FeishuSink, SlackSink};
use crate::config::{DispatcherConfig, SinkConfig, SinkKind};
use crate::coordination::{RetryPolicy, StopSignal};
use crate::domain::{AlertFingerprint, Finding, Severity};
use crate::error::{Result, VigilError};
use crate::persistence::SharedStateStore;
use crate::services::Metrics;

/// A sink plus the lowest severity it accepts
#[derive(Clone)]
pub struct SinkRoute {
    pub sink: SharedSink,
    pub min_severity: Severity,
}

impl SinkRoute {
    pub fn new(sink: SharedSink, min_severity: Severity) -> Self {
        Self { sink, min_severity }
    }

    pub fn accepts(&self, severity: Severity) -> bool {
        severity >= self.min_severity
    }
}

/// What happened to one finding
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Fingerprint was new; `failed` of `attempted` sinks exhausted their retries
    Delivered {
        fingerprint: AlertFingerprint,
        attempted: usize,
        failed: usize,
    },
    /// Fingerprint already recorded; nothing was sent
    DuplicateSuppressed { fingerprint: AlertFingerprint },
    /// Fingerprint was new but no sink accepts the severity
    Unrouted { fingerprint: AlertFingerprint },
}

impl DispatchOutcome {
    pub fn fingerprint(&self) -> &AlertFingerprint {
        match self {
            DispatchOutcome::Delivered { fingerprint, .. }
            | DispatchOutcome::DuplicateSuppressed { fingerprint }
            | DispatchOutcome::Unrouted { fingerprint } => fingerprint,
        }
    }

    pub fn is_suppressed(&self) -> bool {
        matches!(self, DispatchOutcome::DuplicateSuppressed { .. })
    }
}

pub struct AlertDispatcher {
    store: SharedStateStore,
    routes: Vec<SinkRoute>,
    max_attempts: u32,
    backoff: RetryPolicy,
    delivery_timeout: Duration,
    metrics: Option<Arc<Metrics>>,
    event_tx: broadcast::Sender<Alert>,
}

impl AlertDispatcher {
    pub fn new(store: SharedStateStore, config: &DispatcherConfig) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            store,
            routes: Vec::new(),
            max_attempts: config.max_attempts.max(1),
            backoff: config.backoff.clone(),
            delivery_timeout: Duration::from_millis(config.delivery_timeout_ms),
            metrics: None,
            event_tx,
        }
    }

    /// Build a dispatcher with one route per configured sink
    pub fn from_config(
        store: SharedStateStore,
        config: &DispatcherConfig,
        sinks: &[SinkConfig],
    ) -> Result<Self> {
        let mut dispatcher = Self::new(store, config);
        let timeout = Duration::from_millis(config.delivery_timeout_ms);

        for (index, sink) in sinks.iter().enumerate() {
            let name = sink
                .name
                .clone()
                .unwrap_or_else(|| format!("{:?}-{}", sink.kind, index).to_lowercase());
            let webhook = || {
                sink.webhook_url.clone().ok_or_else(|| {
                    VigilError::InvalidConfig(format!("sink {} requires webhook_url", name))
                })
            };

            let built: SharedSink = match sink.kind {
                SinkKind::Log => Arc::new(LogSink::new(name.clone())),
                SinkKind::Feishu => Arc::new(FeishuSink::new(name.clone(), webhook()?, timeout)?),
                SinkKind::Slack => Arc::new(SlackSink::new(name.clone(), webhook()?, timeout)?),
            };
            info!("Alert sink {} ({:?}) routes >= {}", name, sink.kind, sink.min_severity);
            dispatcher.add_route(SinkRoute::new(built, sink.min_severity));
        }

        Ok(dispatcher)
    }

    pub fn add_route(&mut self, route: SinkRoute) {
        self.routes.push(route);
    }

    pub fn with_route(mut self, sink: SharedSink, min_severity: Severity) -> Self {
        self.add_route(SinkRoute::new(sink, min_severity));
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn sink_names(&self) -> Vec<String> {
        self.routes.iter().map(|r| r.sink.name().to_string()).collect()
    }

    /// Subscribe to every alert that passes dedup
    pub fn subscribe(&self) -> broadcast::Receiver<Alert> {
        self.event_tx.subscribe()
    }

    /// Dedup and deliver one finding.
    ///
    /// Store errors are returned; sink failures are logged and counted in the
    /// outcome. Once `stop` is set, pending retry backoffs are skipped.
    pub async fn dispatch(&self, finding: &Finding, stop: &StopSignal) -> Result<DispatchOutcome> {
        let fingerprint = finding.fingerprint();

        if !self
            .store
            .put_fingerprint(finding.session_id, &fingerprint)
            .await?
        {
            debug!(
                "Suppressed duplicate alert {} for session {}",
                fingerprint.short(),
                finding.session_id
            );
            if let Some(metrics) = &self.metrics {
                metrics.inc_alerts_suppressed();
            }
            return Ok(DispatchOutcome::DuplicateSuppressed { fingerprint });
        }

        let alert = Alert::from_finding(finding, fingerprint.clone());
        let _ = self.event_tx.send(alert.clone());

        let routes: Vec<&SinkRoute> = self
            .routes
            .iter()
            .filter(|r| r.accepts(alert.severity))
            .collect();
        if routes.is_empty() {
            debug!(
                "No sink accepts {} alert {}",
                alert.severity,
                fingerprint.short()
            );
            return Ok(DispatchOutcome::Unrouted { fingerprint });
        }

        let results = join_all(
            routes
                .iter()
                .map(|route| self.deliver_with_retry(route.sink.as_ref(), &alert, stop)),
        )
        .await;

        let mut failed = 0;
        for (route, result) in routes.iter().zip(results) {
            if let Err(e) = result {
                failed += 1;
                error!(
                    "Alert {} dropped for sink {}: {}",
                    fingerprint.short(),
                    route.sink.name(),
                    e
                );
                if let Some(metrics) = &self.metrics {
                    metrics.inc_delivery_failures();
                }
            }
        }

        if failed < routes.len() {
            if let Some(metrics) = &self.metrics {
                metrics.inc_alerts_delivered();
            }
        }

        Ok(DispatchOutcome::Delivered {
            fingerprint,
            attempted: routes.len(),
            failed,
        })
    }

    async fn deliver_with_retry(&self, sink: &dyn AlertSink, alert: &Alert, stop: &StopSignal) -> Result<()> {
        let mut stop = stop.clone();
        let mut last_error = None;

        for attempt in 0..self.max_attempts {
            let result = match tokio::time::timeout(self.delivery_timeout, sink.deliver(alert)).await {
                Ok(result) => result,
                Err(_) => Err(VigilError::Delivery {
                    sink: sink.name().to_string(),
                    reason: format!("timed out after {:?}", self.delivery_timeout),
                }),
            };

            match result {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!(
                        "Delivery of {} to {} failed (attempt {}/{}): {}",
                        alert.fingerprint.short(),
                        sink.name(),
                        attempt + 1,
                        self.max_attempts,
                        e
                    );
                    last_error = Some(e);
                }
            }

            if attempt + 1 >= self.max_attempts || stop.is_stopped() {
                break;
            }
            if stop.sleep(self.backoff.delay_for(attempt)).await {
                break;
            }
        }

        Err(last_error.unwrap_or(VigilError::Delivery {
            sink: sink.name().to_string(),
            reason: "no delivery attempt made".to_string(),
        }))
    }
}

//! Process control surface: wiring, startup, bootstrap and graceful shutdown.

use std::future::Future;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::adapters::{ClientBundle, PostgresStateStore};
use crate::api::{create_router, AppState};
use crate::collector::WorkerContext;
use crate::config::{AppConfig, StateBackend};
use crate::coordination::{stop_pair, StopHandle, StopSignal};
use crate::coordinator::{BootstrapReport, Manifest, SessionRegistry, ShutdownReport};
use crate::domain::SessionSpec;
use crate::error::{Result, VigilError};
use crate::heuristics::HeuristicEngine;
use crate::persistence::{MemoryStateStore, SharedStateStore};
use crate::services::Metrics;
use crate::supervisor::{Alert, AlertDispatcher};

const STATUS_LOG_INTERVAL: Duration = Duration::from_secs(60);

pub struct App {
    config: AppConfig,
    registry: SessionRegistry,
    dispatcher: Arc<AlertDispatcher>,
    metrics: Arc<Metrics>,
    background_stop: StopHandle,
    background: Vec<JoinHandle<()>>,
    background_signal: StopSignal,
}

impl App {
    /// Build the full pipeline from configuration.
    ///
    /// Connects the state backend and every configured chain; any failure
    /// here is fatal for the process.
    pub async fn new(config: AppConfig) -> Result<Self> {
        config.validate()?;

        let store: SharedStateStore = match config.state.backend {
            StateBackend::Memory => Arc::new(MemoryStateStore::new()),
            StateBackend::Postgres => {
                let url = config.state.database_url.as_deref().ok_or_else(|| {
                    VigilError::InvalidConfig("state.database_url is required".to_string())
                })?;
                Arc::new(PostgresStateStore::connect(url, config.state.max_connections).await?)
            }
        };
        info!("State backend: {:?}", config.state.backend);

        let bundle = ClientBundle::connect(&config.chains).await?;
        info!("Client bundle ready for {:?}", bundle.targets());

        Self::with_parts(config, store, bundle)
    }

    /// Assemble an app from an already built store and client bundle
    pub fn with_parts(config: AppConfig, store: SharedStateStore, bundle: ClientBundle) -> Result<Self> {
        let metrics = Arc::new(Metrics::new());
        let dispatcher = Arc::new(
            AlertDispatcher::from_config(store.clone(), &config.dispatcher, &config.sinks)?
                .with_metrics(metrics.clone()),
        );

        let ctx = WorkerContext {
            store,
            engine: Arc::new(HeuristicEngine::with_defaults()),
            dispatcher: dispatcher.clone(),
            metrics: metrics.clone(),
            config: config.collector.clone(),
        };
        let registry = SessionRegistry::new(bundle, ctx);
        let (background_stop, background_signal) = stop_pair();

        Ok(Self {
            config,
            registry,
            dispatcher,
            metrics,
            background_stop,
            background: Vec::new(),
            background_signal,
        })
    }

    /// Resume persisted sessions and start background services
    pub async fn start(&mut self) -> Result<()> {
        let resumed = self.registry.resume_persisted().await?;
        if !resumed.is_empty() {
            info!("Resumed {} persisted sessions", resumed.len());
        }

        let registry = self.registry.clone();
        let metrics = self.metrics.clone();
        let mut signal = self.background_signal.clone();
        self.background.push(tokio::spawn(async move {
            while !signal.sleep(STATUS_LOG_INTERVAL).await {
                metrics.log_status(registry.active_count().await);
            }
        }));

        if self.config.server.enabled {
            let addr = SocketAddr::from(([0, 0, 0, 0], self.config.server.port));
            let listener = tokio::net::TcpListener::bind(addr).await?;
            let router = create_router(AppState::new(self.registry.clone(), self.metrics.clone()));
            let mut signal = self.background_signal.clone();

            info!("Control API listening on {}", addr);
            self.background.push(tokio::spawn(async move {
                let result = axum::serve(listener, router)
                    .with_graceful_shutdown(async move { signal.stopped().await })
                    .await;
                if let Err(e) = result {
                    error!("Control API server error: {}", e);
                }
            }));
        }

        Ok(())
    }

    /// Create sessions from already decoded manifest entries
    pub async fn bootstrap<I>(&self, specs: I) -> BootstrapReport
    where
        I: IntoIterator<Item = Result<SessionSpec>>,
    {
        self.registry.bootstrap(specs).await
    }

    /// Load a manifest file and bootstrap from it. File-level errors are returned.
    pub async fn bootstrap_from_path<P: AsRef<Path>>(&self, path: P) -> Result<BootstrapReport> {
        let manifest = Manifest::load(path)?;
        let report = self.bootstrap(manifest.specs()).await;
        for failure in &report.failures {
            warn!("Manifest entry {} failed: {}", failure.index, failure.error);
        }
        Ok(report)
    }

    /// Wait for `signal`, then shut every session down within the configured deadline
    pub async fn listen_for_shutdown<F>(self, signal: F) -> ShutdownReport
    where
        F: Future<Output = ()>,
    {
        signal.await;
        info!("Shutdown requested");
        self.shutdown().await
    }

    pub async fn shutdown(self) -> ShutdownReport {
        let report = self.registry.shutdown(self.config.shutdown_timeout()).await;

        self.background_stop.stop();
        for task in self.background {
            if tokio::time::timeout(Duration::from_secs(5), task).await.is_err() {
                warn!("Background task did not stop in time");
            }
        }

        for id in &report.abandoned {
            warn!("Session {} was abandoned during shutdown", id);
        }
        report
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        self.metrics.clone()
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Subscribe to every alert that passes dedup
    pub fn subscribe_alerts(&self) -> broadcast::Receiver<Alert> {
        self.dispatcher.subscribe()
    }
}

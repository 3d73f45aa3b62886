//! Per-session collector loop
//!
//! checkpoint -> fetch -> evaluate -> dispatch -> advance checkpoint, until
//! the session is stopped, reaches its end height, or fails. The checkpoint
//! only moves after every finding of the batch went through the dispatcher.

use alloy::primitives::Address;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::adapters::SharedChainClient;
use crate::config::CollectorConfig;
use crate::coordination::StopSignal;
use crate::domain::{Cursor, FetchRequest, SessionId, SessionSpec};
use crate::error::{Result, VigilError};
use crate::heuristics::HeuristicEngine;
use crate::persistence::SharedStateStore;
use crate::services::Metrics;
use crate::supervisor::{AlertDispatcher, DispatchOutcome};

/// Services shared by every session worker
#[derive(Clone)]
pub struct WorkerContext {
    pub store: SharedStateStore,
    pub engine: Arc<HeuristicEngine>,
    pub dispatcher: Arc<AlertDispatcher>,
    pub metrics: Arc<Metrics>,
    pub config: CollectorConfig,
}

/// How a worker ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerOutcome {
    /// Stop was requested
    Stopped,
    /// The session reached its end height
    Completed,
    Failed(String),
}

/// Result of one loop iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Processed,
    Idle,
    Interrupted,
    Completed,
}

pub struct SessionWorker {
    session_id: SessionId,
    spec: SessionSpec,
    client: SharedChainClient,
    max_blocks: u64,
    ctx: WorkerContext,
    stop: StopSignal,
}

impl SessionWorker {
    pub fn new(
        session_id: SessionId,
        spec: SessionSpec,
        client: SharedChainClient,
        max_blocks: u64,
        ctx: WorkerContext,
        stop: StopSignal,
    ) -> Self {
        Self {
            session_id,
            spec,
            client,
            max_blocks: max_blocks.max(1),
            ctx,
            stop,
        }
    }

    pub async fn run(mut self) -> WorkerOutcome {
        let accounts = match self.ctx.engine.required_accounts(&self.spec) {
            Ok(accounts) => accounts,
            Err(e) => return WorkerOutcome::Failed(e.to_string()),
        };

        info!(
            "Session {} watching {} with {}",
            self.session_id, self.spec.chain_target, self.spec.heuristic_type
        );

        let max_failures = self.ctx.config.max_consecutive_failures.max(1);
        let mut failures: u32 = 0;

        loop {
            if self.stop.is_stopped() {
                return WorkerOutcome::Stopped;
            }

            match self.step(&accounts).await {
                Ok(Step::Processed) => {
                    failures = 0;
                    self.ctx.metrics.heartbeat(self.session_id);
                }
                Ok(Step::Idle) => {
                    failures = 0;
                    self.ctx.metrics.heartbeat(self.session_id);
                    if self.stop.sleep(self.ctx.config.poll_interval()).await {
                        return WorkerOutcome::Stopped;
                    }
                }
                Ok(Step::Interrupted) => return WorkerOutcome::Stopped,
                Ok(Step::Completed) => {
                    info!("Session {} reached its end height", self.session_id);
                    return WorkerOutcome::Completed;
                }
                Err(e) if e.is_transient() => {
                    failures += 1;
                    self.ctx.metrics.inc_fetch_failures();
                    if failures >= max_failures {
                        error!(
                            "Session {} giving up after {} consecutive failures: {}",
                            self.session_id, failures, e
                        );
                        return WorkerOutcome::Failed(format!(
                            "{} consecutive transient failures, last: {}",
                            failures, e
                        ));
                    }

                    let delay = self.ctx.config.backoff.delay_for(failures - 1);
                    warn!(
                        "Session {} transient failure {}/{}: {} (retrying in {:?})",
                        self.session_id, failures, max_failures, e, delay
                    );
                    if self.stop.sleep(delay).await {
                        return WorkerOutcome::Stopped;
                    }
                }
                Err(e) => {
                    error!("Session {} failed: {}", self.session_id, e);
                    return WorkerOutcome::Failed(e.to_string());
                }
            }
        }
    }

    async fn step(&mut self, accounts: &[Address]) -> Result<Step> {
        let cursor = self
            .ctx
            .store
            .get_checkpoint(self.session_id)
            .await?
            .map(|c| c.cursor)
            .ok_or_else(|| {
                VigilError::FatalSession(format!("session {} has no checkpoint", self.session_id))
            })?;

        let mut max_blocks = self.max_blocks;
        if let Some(end) = self.spec.end_height {
            if cursor.height() > end {
                return Ok(Step::Completed);
            }
            max_blocks = max_blocks.min((end - cursor.height()).saturating_add(1));
        }

        let request = FetchRequest::new(cursor, max_blocks).with_accounts(accounts.to_vec());
        let fetched = tokio::select! {
            biased;
            _ = self.stop.stopped() => None,
            result = self.client.fetch_since(&request) => Some(result),
        };
        let mut batch = match fetched {
            Some(result) => result?,
            None => return Ok(Step::Interrupted),
        };

        if let Some(end) = self.spec.end_height {
            batch.blocks.retain(|b| b.number <= end);
        }
        if batch.is_empty() {
            return Ok(Step::Idle);
        }
        if batch.from != cursor {
            return Err(VigilError::TransientFetch(format!(
                "batch starts at {} but checkpoint is {}",
                batch.from, cursor
            )));
        }

        let findings = self
            .ctx
            .engine
            .evaluate(self.session_id, &self.spec, &batch)?;
        self.ctx.metrics.inc_findings(findings.len() as u64);

        let mut suppressed = 0;
        for finding in &findings {
            let outcome = self.ctx.dispatcher.dispatch(finding, &self.stop).await?;
            if let DispatchOutcome::DuplicateSuppressed { .. } = outcome {
                suppressed += 1;
            }
        }

        let next = match batch.blocks.last() {
            Some(last) => Cursor::after(last.number),
            None => batch.next,
        };
        self.ctx.store.set_checkpoint(self.session_id, next).await?;
        self.ctx.metrics.inc_batches(batch.blocks.len() as u64);

        debug!(
            "Session {} processed {} ({} findings, {} suppressed), next {}",
            self.session_id,
            batch.window().map(|w| w.to_string()).unwrap_or_default(),
            findings.len(),
            suppressed,
            next
        );

        match self.spec.end_height {
            Some(end) if next.height() > end => Ok(Step::Completed),
            _ => Ok(Step::Processed),
        }
    }
}

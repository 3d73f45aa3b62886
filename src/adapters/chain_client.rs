//! Chain client boundary and the per-chain client bundle.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::ChainConfig;
use crate::coordination::RetryPolicy;
use crate::domain::{ChainTarget, DataBatch, FetchRequest};
use crate::error::{Result, VigilError};

use super::evm_rpc::EvmRpcClient;

/// Read-only access to one chain
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Highest height that is safe to process (head minus confirmations)
    async fn latest_height(&self) -> Result<u64>;

    /// Blocks from `request.from` up to the safe head, capped at
    /// `request.max_blocks`. Returns an empty batch when nothing is new.
    async fn fetch_since(&self, request: &FetchRequest) -> Result<DataBatch>;
}

/// Shared handle type for chain clients
pub type SharedChainClient = Arc<dyn ChainClient>;

/// Connected chain clients keyed by chain target, built once at startup
#[derive(Clone, Default)]
pub struct ClientBundle {
    clients: HashMap<ChainTarget, SharedChainClient>,
    batch_limits: HashMap<ChainTarget, u64>,
}

impl ClientBundle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an RPC client per configured chain and verify each one answers.
    ///
    /// Any chain that stays unreachable after its connect attempts fails the
    /// whole bundle.
    pub async fn connect(chains: &BTreeMap<String, ChainConfig>) -> Result<Self> {
        let mut bundle = Self::new();
        let policy = RetryPolicy::new(500, 10_000);

        for (name, config) in chains {
            let target = ChainTarget::new(name);
            let client = EvmRpcClient::new(target.clone(), config)?;

            let attempts = config.connect_attempts.max(1);
            let mut last_error = None;
            for attempt in 0..attempts {
                match client.latest_height().await {
                    Ok(height) => {
                        info!("Chain {} reachable, safe head at {}", target, height);
                        last_error = None;
                        break;
                    }
                    Err(e) => {
                        warn!(
                            "Chain {} not reachable (attempt {}/{}): {}",
                            target,
                            attempt + 1,
                            attempts,
                            e
                        );
                        last_error = Some(e);
                        if attempt + 1 < attempts {
                            tokio::time::sleep(policy.delay_for(attempt)).await;
                        }
                    }
                }
            }

            if let Some(e) = last_error {
                return Err(VigilError::ClientBundle(format!(
                    "chain {} unreachable after {} attempts: {}",
                    target, attempts, e
                )));
            }

            bundle.insert_with_limit(target, Arc::new(client), config.max_blocks_per_batch);
        }

        Ok(bundle)
    }

    /// Register a client using the default batch limit
    pub fn insert(&mut self, target: impl Into<ChainTarget>, client: SharedChainClient) {
        self.insert_with_limit(target, client, 25);
    }

    pub fn insert_with_limit(
        &mut self,
        target: impl Into<ChainTarget>,
        client: SharedChainClient,
        max_blocks_per_batch: u64,
    ) {
        let target = target.into();
        self.batch_limits.insert(target.clone(), max_blocks_per_batch.max(1));
        self.clients.insert(target, client);
    }

    pub fn with_client(mut self, target: impl Into<ChainTarget>, client: SharedChainClient) -> Self {
        self.insert(target, client);
        self
    }

    pub fn get(&self, target: &ChainTarget) -> Option<SharedChainClient> {
        self.clients.get(target).cloned()
    }

    pub fn contains(&self, target: &ChainTarget) -> bool {
        self.clients.contains_key(target)
    }

    pub fn max_blocks_per_batch(&self, target: &ChainTarget) -> u64 {
        self.batch_limits.get(target).copied().unwrap_or(25)
    }

    /// Configured chain targets, sorted
    pub fn targets(&self) -> Vec<ChainTarget> {
        let mut targets: Vec<ChainTarget> = self.clients.keys().cloned().collect();
        targets.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        targets
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

impl std::fmt::Debug for ClientBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientBundle")
            .field("targets", &self.targets())
            .finish()
    }
}

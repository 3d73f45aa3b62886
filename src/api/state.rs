use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::coordinator::SessionRegistry;
use crate::services::Metrics;

/// Shared application state for API handlers
#[derive(Clone)]
pub struct AppState {
    pub registry: SessionRegistry,
    pub metrics: Arc<Metrics>,
    /// Application start time
    pub start_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(registry: SessionRegistry, metrics: Arc<Metrics>) -> Self {
        Self {
            registry,
            metrics,
            start_time: Utc::now(),
        }
    }

    pub fn uptime_seconds(&self) -> i64 {
        (Utc::now() - self.start_time).num_seconds()
    }
}

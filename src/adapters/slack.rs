//! Slack incoming-webhook sink

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, error};

use crate::error::{Result, VigilError};
use crate::supervisor::{Alert, AlertSink};

#[derive(Clone)]
pub struct SlackSink {
    client: Client,
    name: String,
    webhook_url: String,
}

impl SlackSink {
    pub fn new(name: impl Into<String>, webhook_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            name: name.into(),
            webhook_url: webhook_url.into(),
        })
    }

    fn delivery_error(&self, reason: impl Into<String>) -> VigilError {
        VigilError::Delivery {
            sink: self.name.clone(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl AlertSink for SlackSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn deliver(&self, alert: &Alert) -> Result<()> {
        let payload = json!({
            "text": alert.format_slack(),
            "mrkdwn": true,
        });

        let resp = self
            .client
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| self.delivery_error(e.to_string()))?;

        let status = resp.status();
        if status.is_success() {
            debug!("Slack alert {} delivered", alert.fingerprint.short());
            return Ok(());
        }

        let body = resp.text().await.unwrap_or_default();
        error!("Slack webhook rejected alert: {} - {}", status, body);
        Err(self.delivery_error(format!("HTTP {}: {}", status, body)))
    }
}

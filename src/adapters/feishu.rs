//! Feishu (Lark) webhook notifications
//!
//! Sends alerts to a Feishu bot.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, error};

use crate::error::{Result, VigilError};
use crate::supervisor::{Alert, AlertSink};

/// Feishu notification sink
#[derive(Clone)]
pub struct FeishuSink {
    client: Client,
    name: String,
    webhook_url: String,
}

#[derive(Serialize)]
struct FeishuMessage {
    msg_type: String,
    content: FeishuContent,
}

#[derive(Serialize)]
struct FeishuContent {
    text: String,
}

impl FeishuSink {
    /// Create a new Feishu sink with explicit URL
    pub fn new(name: impl Into<String>, webhook_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            name: name.into(),
            webhook_url: webhook_url.into(),
        })
    }

    /// Send a text message to Feishu
    pub async fn send_message(&self, text: &str) -> Result<()> {
        let message = FeishuMessage {
            msg_type: "text".to_string(),
            content: FeishuContent {
                text: text.to_string(),
            },
        };

        let resp = self
            .client
            .post(&self.webhook_url)
            .json(&message)
            .send()
            .await
            .map_err(|e| {
                error!("Feishu request failed: {}", e);
                VigilError::Delivery {
                    sink: self.name.clone(),
                    reason: e.to_string(),
                }
            })?;

        if resp.status().is_success() {
            debug!("Feishu notification sent successfully");
            Ok(())
        } else {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            error!("Feishu notification failed: {} - {}", status, body);
            Err(VigilError::Delivery {
                sink: self.name.clone(),
                reason: format!("HTTP {}: {}", status, body),
            })
        }
    }
}

#[async_trait]
impl AlertSink for FeishuSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn deliver(&self, alert: &Alert) -> Result<()> {
        self.send_message(&alert.format_feishu()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_shape() {
        let message = FeishuMessage {
            msg_type: "text".into(),
            content: FeishuContent { text: "hi".into() },
        };
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["msg_type"], "text");
        assert_eq!(value["content"]["text"], "hi");
    }

    #[tokio::test]
    async fn test_unreachable_webhook_is_delivery_error() {
        let sink = FeishuSink::new("ops", "http://127.0.0.1:1/hook", Duration::from_millis(200))
            .unwrap();
        let err = sink.send_message("ping").await.unwrap_err();
        assert!(matches!(err, VigilError::Delivery { ref sink, .. } if sink == "ops"));
    }
}

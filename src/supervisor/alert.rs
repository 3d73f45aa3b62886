//! Alert payload and the sink boundary.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::domain::{AlertFingerprint, CursorWindow, Finding, HeuristicKind, SessionId, Severity};
use crate::error::Result;

/// Alert payload handed to sinks
#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub fingerprint: AlertFingerprint,
    pub session_id: SessionId,
    pub heuristic: HeuristicKind,
    pub severity: Severity,
    pub title: String,
    pub message: String,
    pub evidence: serde_json::Value,
    pub window: CursorWindow,
    pub timestamp: DateTime<Utc>,
}

impl Alert {
    pub fn from_finding(finding: &Finding, fingerprint: AlertFingerprint) -> Self {
        let message = match &finding.message {
            Some(prefix) => format!("{}\n{}", prefix, finding.summary),
            None => finding.summary.clone(),
        };

        Self {
            fingerprint,
            session_id: finding.session_id,
            heuristic: finding.heuristic,
            severity: finding.severity,
            title: format!("{} detected", finding.heuristic),
            message,
            evidence: finding.evidence.clone(),
            window: finding.window,
            timestamp: Utc::now(),
        }
    }

    /// Single-line form for log sinks
    pub fn format_text(&self) -> String {
        format!(
            "[{}] {} session={} blocks={} fp={}: {}",
            self.severity,
            self.title,
            self.session_id,
            self.window,
            self.fingerprint.short(),
            self.message.replace('\n', " | ")
        )
    }

    /// Format for Feishu message
    pub fn format_feishu(&self) -> String {
        format!(
            "{} **{}**\n\n**Session:** {}\n**Blocks:** {}\n**Time:** {}\n\n{}\n\nfp {}",
            self.severity.emoji(),
            self.title,
            self.session_id,
            self.window,
            self.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
            self.message,
            self.fingerprint.short()
        )
    }

    /// Format for Slack mrkdwn
    pub fn format_slack(&self) -> String {
        format!(
            "{} *{}* ({})\n>Session `{}` | blocks {}\n{}",
            self.severity.emoji(),
            self.title,
            self.severity,
            self.session_id,
            self.window,
            self.message
        )
    }
}

/// Destination an alert is delivered to
#[async_trait]
pub trait AlertSink: Send + Sync {
    fn name(&self) -> &str;

    async fn deliver(&self, alert: &Alert) -> Result<()>;
}

pub type SharedSink = Arc<dyn AlertSink>;

/// Writes alerts to the tracing log
#[derive(Debug, Clone)]
pub struct LogSink {
    name: String,
}

impl LogSink {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for LogSink {
    fn default() -> Self {
        Self::new("log")
    }
}

#[async_trait]
impl AlertSink for LogSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn deliver(&self, alert: &Alert) -> Result<()> {
        match alert.severity {
            Severity::Low => info!(target: "vigil::alert", "{}", alert.format_text()),
            Severity::Medium => warn!(target: "vigil::alert", "{}", alert.format_text()),
            Severity::High => error!(target: "vigil::alert", "{}", alert.format_text()),
            Severity::Critical => {
                error!(target: "vigil::alert", "CRITICAL {}", alert.format_text())
            }
        }
        Ok(())
    }
}

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use super::cursor::CursorWindow;
use super::session::{HeuristicKind, SessionId};

/// Alert severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Informational, usually routed to log sinks only
    Low,
    /// Chat notification
    Medium,
    /// Chat notification, operators should look now
    High,
    /// Paging-grade incident
    Critical,
}

impl Severity {
    /// Get emoji prefix for severity
    pub fn emoji(&self) -> &'static str {
        match self {
            Severity::Low => "\u{2139}\u{fe0f}",
            Severity::Medium => "\u{26a0}\u{fe0f}",
            Severity::High => "\u{274c}",
            Severity::Critical => "\u{1f6a8}",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "low" | "info" => Ok(Severity::Low),
            "medium" | "warning" => Ok(Severity::Medium),
            "high" | "error" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            other => Err(format!("unknown severity '{}'", other)),
        }
    }
}

/// Raw output of a heuristic evaluation, before the engine attaches session context
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    /// Stable identity of the detected condition (e.g. tx hash + log index)
    pub identity: String,
    pub severity: Severity,
    pub summary: String,
    pub evidence: JsonValue,
    pub window: CursorWindow,
}

/// A detected condition ready for dispatch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub session_id: SessionId,
    pub heuristic: HeuristicKind,
    pub severity: Severity,
    pub summary: String,
    pub evidence: JsonValue,
    pub identity: String,
    pub window: CursorWindow,
    /// Operator message from the session's alerting params
    #[serde(default)]
    pub message: Option<String>,
}

impl Finding {
    /// Deterministic fingerprint used for alert dedup
    pub fn fingerprint(&self) -> AlertFingerprint {
        AlertFingerprint::derive(self.session_id, self.heuristic, &self.identity, self.window)
    }
}

/// SHA-256 identity of a finding; at most one alert is sent per fingerprint
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlertFingerprint(String);

impl AlertFingerprint {
    pub fn derive(
        session_id: SessionId,
        heuristic: HeuristicKind,
        identity: &str,
        window: CursorWindow,
    ) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(session_id.as_uuid().as_bytes());
        hasher.update(heuristic.as_str().as_bytes());
        hasher.update([0u8]);
        hasher.update(identity.as_bytes());
        hasher.update([0u8]);
        hasher.update(window.start.to_be_bytes());
        hasher.update(window.end.to_be_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    pub fn from_hex(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form for log lines and alert footers
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl fmt::Display for AlertFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

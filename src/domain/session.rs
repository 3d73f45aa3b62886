use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::cursor::StartPosition;
use super::finding::Severity;

// =============================================================================
// Identifiers
// =============================================================================

/// Opaque session identifier, assigned once at creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for SessionId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// Name of a configured chain in the client bundle (e.g. "layer1")
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct ChainTarget(String);

impl ChainTarget {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into().trim().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChainTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChainTarget {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for ChainTarget {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

impl From<ChainTarget> for String {
    fn from(target: ChainTarget) -> Self {
        target.0
    }
}

// =============================================================================
// HeuristicKind
// =============================================================================

/// Detection heuristics known to the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeuristicKind {
    BalanceEnforcement,
    ContractEvent,
    LargeTransfer,
}

impl HeuristicKind {
    pub const ALL: [HeuristicKind; 3] = [
        HeuristicKind::BalanceEnforcement,
        HeuristicKind::ContractEvent,
        HeuristicKind::LargeTransfer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BalanceEnforcement => "balance_enforcement",
            Self::ContractEvent => "contract_event",
            Self::LargeTransfer => "large_transfer",
        }
    }
}

impl fmt::Display for HeuristicKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HeuristicKind {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "balance_enforcement" => Ok(Self::BalanceEnforcement),
            "contract_event" => Ok(Self::ContractEvent),
            "large_transfer" => Ok(Self::LargeTransfer),
            other => Err(format!("unknown heuristic type '{}'", other)),
        }
    }
}

// =============================================================================
// SessionStatus
// =============================================================================

/// Lifecycle status of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionStatus {
    Pending,
    Active,
    Stopped,
    Failed { reason: String },
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Stopped => "stopped",
            Self::Failed { .. } => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped | Self::Failed { .. })
    }

    /// Check whether transitioning to `next` is allowed.
    pub fn can_transition_to(&self, next: &SessionStatus) -> bool {
        use SessionStatus::*;
        match (self, next) {
            (Pending, Active) | (Pending, Stopped) | (Pending, Failed { .. }) => true,
            (Active, Stopped) | (Active, Failed { .. }) => true,
            _ => false,
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed { reason } => write!(f, "failed ({})", reason),
            other => f.write_str(other.as_str()),
        }
    }
}

// =============================================================================
// SessionSpec
// =============================================================================

/// Heuristic-specific parameters, validated against the heuristic's schema
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HeuristicParams(Map<String, JsonValue>);

impl HeuristicParams {
    pub fn new() -> Self {
        Self(Map::new())
    }

    pub fn with(mut self, name: &str, value: impl Into<JsonValue>) -> Self {
        self.0.insert(name.to_string(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&JsonValue> {
        self.0.get(name)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(|v| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &JsonValue)> {
        self.0.iter()
    }

    pub fn as_json(&self) -> JsonValue {
        JsonValue::Object(self.0.clone())
    }
}

impl From<Map<String, JsonValue>> for HeuristicParams {
    fn from(map: Map<String, JsonValue>) -> Self {
        Self(map)
    }
}

/// Per-session alert overrides
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertingParams {
    /// Replaces the severity a heuristic assigns to its findings
    #[serde(default, alias = "sev")]
    pub severity: Option<Severity>,
    /// Operator message prepended to every alert of the session
    #[serde(default, alias = "msg")]
    pub message: Option<String>,
}

/// Declarative description of what a session should watch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSpec {
    #[serde(alias = "chainTarget", alias = "network")]
    pub chain_target: ChainTarget,
    #[serde(alias = "heuristicType", alias = "type")]
    pub heuristic_type: HeuristicKind,
    #[serde(default, alias = "heuristic_params")]
    pub params: HeuristicParams,
    #[serde(default, alias = "start_height")]
    pub start: StartPosition,
    #[serde(default, alias = "endHeight")]
    pub end_height: Option<u64>,
    #[serde(default, alias = "alerting_params")]
    pub alerting: AlertingParams,
    #[serde(default)]
    pub label: Option<String>,
}

impl SessionSpec {
    pub fn new(chain: impl Into<ChainTarget>, heuristic: HeuristicKind, params: HeuristicParams) -> Self {
        Self {
            chain_target: chain.into(),
            heuristic_type: heuristic,
            params,
            start: StartPosition::Latest,
            end_height: None,
            alerting: AlertingParams::default(),
            label: None,
        }
    }

    pub fn starting_at(mut self, start: StartPosition) -> Self {
        self.start = start;
        self
    }

    pub fn ending_at(mut self, end_height: u64) -> Self {
        self.end_height = Some(end_height);
        self
    }
}

// =============================================================================
// Session
// =============================================================================

/// A live monitoring session owned by the registry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub spec: SessionSpec,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(spec: SessionSpec) -> Self {
        let now = Utc::now();
        Self {
            id: SessionId::new(),
            spec,
            status: SessionStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn chain(&self) -> &ChainTarget {
        &self.spec.chain_target
    }

    pub fn heuristic(&self) -> HeuristicKind {
        self.spec.heuristic_type
    }

    /// Short name used in logs
    pub fn display_name(&self) -> String {
        match &self.spec.label {
            Some(label) => format!("{} ({})", label, self.id),
            None => format!("{}:{} ({})", self.spec.chain_target, self.spec.heuristic_type, self.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transitions() {
        let failed = SessionStatus::Failed {
            reason: "rpc down".into(),
        };
        assert!(SessionStatus::Pending.can_transition_to(&SessionStatus::Active));
        assert!(SessionStatus::Active.can_transition_to(&failed));
        assert!(!SessionStatus::Stopped.can_transition_to(&SessionStatus::Active));
        assert!(!failed.can_transition_to(&SessionStatus::Stopped));
        assert!(!SessionStatus::Active.can_transition_to(&SessionStatus::Pending));
        assert!(failed.is_terminal());
    }

    #[test]
    fn test_spec_accepts_camel_case_aliases() {
        let raw = r#"{
            "chainTarget": "Layer1",
            "heuristicType": "large_transfer",
            "params": {"threshold": "1000"},
            "start": 42,
            "alerting": {"sev": "high", "msg": "bridge drain"}
        }"#;
        let spec: SessionSpec = serde_json::from_str(raw).unwrap();
        assert_eq!(spec.chain_target.as_str(), "layer1");
        assert_eq!(spec.heuristic_type, HeuristicKind::LargeTransfer);
        assert_eq!(spec.start, StartPosition::Height(42));
        assert_eq!(spec.alerting.severity, Some(Severity::High));
        assert_eq!(spec.params.get_str("threshold"), Some("1000"));
    }

    #[test]
    fn test_heuristic_kind_round_trip() {
        for kind in HeuristicKind::ALL {
            assert_eq!(kind.as_str().parse::<HeuristicKind>().unwrap(), kind);
        }
        assert!("fault_detector".parse::<HeuristicKind>().is_err());
    }
}

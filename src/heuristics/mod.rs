//! Heuristic Engine
//!
//! Each heuristic kind is bound to one evaluator. Evaluators are pure: they
//! see the session params and a batch, and return detections. The engine
//! attaches session context and alerting overrides to produce findings.

pub mod balance;
pub mod contract_event;
pub mod large_transfer;

use alloy::primitives::{Address, U256};
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use crate::domain::{DataBatch, Detection, Finding, HeuristicKind, HeuristicParams, SessionId, SessionSpec};
use crate::error::{Result, VigilError};

pub use balance::BalanceEnforcement;
pub use contract_event::ContractEvent;
pub use large_transfer::LargeTransfer;

// =============================================================================
// Parameter schema
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// 20-byte hex account address
    Address,
    /// Integer amount in wei, as a decimal string or JSON integer
    WeiAmount,
    /// Decimal number (JSON number or numeric string)
    Decimal,
    String,
    /// Non-empty list of strings
    StringList,
}

impl ParamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamKind::Address => "address",
            ParamKind::WeiAmount => "wei",
            ParamKind::Decimal => "decimal",
            ParamKind::String => "string",
            ParamKind::StringList => "string[]",
        }
    }
}

/// One declared heuristic parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub required: bool,
    pub description: &'static str,
}

impl ParamSpec {
    pub const fn required(name: &'static str, kind: ParamKind, description: &'static str) -> Self {
        Self {
            name,
            kind,
            required: true,
            description,
        }
    }

    pub const fn optional(name: &'static str, kind: ParamKind, description: &'static str) -> Self {
        Self {
            name,
            kind,
            required: false,
            description,
        }
    }
}

/// Check params against a schema: required present, no unknown names, values well typed
pub fn check_schema(kind: HeuristicKind, schema: &[ParamSpec], params: &HeuristicParams) -> Result<()> {
    for (name, _) in params.iter() {
        if !schema.iter().any(|p| p.name == name) {
            return Err(VigilError::InvalidSpec(format!(
                "{}: unknown parameter '{}'",
                kind, name
            )));
        }
    }

    for spec in schema {
        match params.get(spec.name) {
            None | Some(JsonValue::Null) if spec.required => {
                return Err(VigilError::InvalidSpec(format!(
                    "{}: missing required parameter '{}'",
                    kind, spec.name
                )));
            }
            None | Some(JsonValue::Null) => {}
            Some(value) => check_value(spec, value).map_err(|reason| {
                VigilError::InvalidSpec(format!("{}: parameter '{}' {}", kind, spec.name, reason))
            })?,
        }
    }

    Ok(())
}

fn check_value(spec: &ParamSpec, value: &JsonValue) -> std::result::Result<(), String> {
    match spec.kind {
        ParamKind::Address => value
            .as_str()
            .and_then(|s| Address::from_str(s).ok())
            .map(|_| ())
            .ok_or_else(|| "must be a hex address".to_string()),
        ParamKind::WeiAmount => parse_wei(value)
            .map(|_| ())
            .ok_or_else(|| "must be a non-negative integer amount of wei".to_string()),
        ParamKind::Decimal => parse_decimal(value)
            .map(|_| ())
            .ok_or_else(|| "must be a number".to_string()),
        ParamKind::String => value
            .as_str()
            .map(|_| ())
            .ok_or_else(|| "must be a string".to_string()),
        ParamKind::StringList => match value.as_array() {
            Some(items) if !items.is_empty() && items.iter().all(JsonValue::is_string) => Ok(()),
            _ => Err("must be a non-empty list of strings".to_string()),
        },
    }
}

fn parse_wei(value: &JsonValue) -> Option<U256> {
    match value {
        JsonValue::String(s) => U256::from_str_radix(s.trim(), 10).ok(),
        JsonValue::Number(n) => n.as_u64().map(U256::from),
        _ => None,
    }
}

fn parse_decimal(value: &JsonValue) -> Option<Decimal> {
    match value {
        JsonValue::String(s) => Decimal::from_str(s.trim()).ok(),
        JsonValue::Number(n) => Decimal::from_str(&n.to_string())
            .ok()
            .or_else(|| n.as_f64().and_then(|f| Decimal::try_from(f).ok())),
        _ => None,
    }
}

// Typed accessors for evaluators; params are already schema-checked

pub(crate) fn param_address(params: &HeuristicParams, name: &str) -> Result<Option<Address>> {
    params
        .get_str(name)
        .map(|raw| {
            Address::from_str(raw)
                .map_err(|_| VigilError::InvalidSpec(format!("parameter '{}' is not an address", name)))
        })
        .transpose()
}

pub(crate) fn param_wei(params: &HeuristicParams, name: &str) -> Result<Option<U256>> {
    match params.get(name) {
        None | Some(JsonValue::Null) => Ok(None),
        Some(value) => parse_wei(value)
            .map(Some)
            .ok_or_else(|| VigilError::InvalidSpec(format!("parameter '{}' is not a wei amount", name))),
    }
}

pub(crate) fn param_decimal(params: &HeuristicParams, name: &str) -> Result<Option<Decimal>> {
    match params.get(name) {
        None | Some(JsonValue::Null) => Ok(None),
        Some(value) => parse_decimal(value)
            .map(Some)
            .ok_or_else(|| VigilError::InvalidSpec(format!("parameter '{}' is not a number", name))),
    }
}

pub(crate) fn param_string_list(params: &HeuristicParams, name: &str) -> Vec<String> {
    params
        .get(name)
        .and_then(JsonValue::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(|s| s.trim().to_string()))
                .collect()
        })
        .unwrap_or_default()
}

/// Render a wei amount as ETH without losing precision
pub fn format_eth(wei: U256) -> String {
    let digits = wei.to_string();
    let padded = format!("{:0>19}", digits);
    let (whole, frac) = padded.split_at(padded.len() - 18);
    let frac = frac.trim_end_matches('0');
    if frac.is_empty() {
        whole.to_string()
    } else {
        format!("{}.{}", whole, frac)
    }
}

// =============================================================================
// Heuristic trait and engine
// =============================================================================

/// A detection rule bound to one `HeuristicKind`
pub trait Heuristic: Send + Sync {
    fn kind(&self) -> HeuristicKind;

    fn description(&self) -> &'static str;

    fn schema(&self) -> &'static [ParamSpec];

    /// Reject malformed params before a session is created
    fn validate(&self, params: &HeuristicParams) -> Result<()> {
        check_schema(self.kind(), self.schema(), params)
    }

    /// Accounts whose balances the collector must sample
    fn required_accounts(&self, _params: &HeuristicParams) -> Result<Vec<Address>> {
        Ok(Vec::new())
    }

    fn evaluate(&self, params: &HeuristicParams, batch: &DataBatch) -> Result<Vec<Detection>>;
}

/// Registry of heuristic evaluators by kind
#[derive(Clone, Default)]
pub struct HeuristicEngine {
    heuristics: HashMap<HeuristicKind, Arc<dyn Heuristic>>,
}

impl HeuristicEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine with every built-in heuristic registered
    pub fn with_defaults() -> Self {
        let mut engine = Self::new();
        engine.register(Arc::new(BalanceEnforcement));
        engine.register(Arc::new(ContractEvent));
        engine.register(Arc::new(LargeTransfer));
        engine
    }

    pub fn register(&mut self, heuristic: Arc<dyn Heuristic>) {
        self.heuristics.insert(heuristic.kind(), heuristic);
    }

    pub fn get(&self, kind: HeuristicKind) -> Option<Arc<dyn Heuristic>> {
        self.heuristics.get(&kind).cloned()
    }

    /// Registered heuristics in declaration order
    pub fn heuristics(&self) -> Vec<Arc<dyn Heuristic>> {
        HeuristicKind::ALL
            .iter()
            .filter_map(|kind| self.get(*kind))
            .collect()
    }

    /// Validate the heuristic part of a session spec
    pub fn validate(&self, spec: &SessionSpec) -> Result<()> {
        let heuristic = self.get(spec.heuristic_type).ok_or_else(|| {
            VigilError::InvalidSpec(format!("no evaluator for heuristic {}", spec.heuristic_type))
        })?;
        heuristic.validate(&spec.params)
    }

    pub fn required_accounts(&self, spec: &SessionSpec) -> Result<Vec<Address>> {
        match self.get(spec.heuristic_type) {
            Some(heuristic) => heuristic.required_accounts(&spec.params),
            None => Ok(Vec::new()),
        }
    }

    /// Evaluate a batch for one session. A kind without evaluator is fatal.
    pub fn evaluate(&self, session_id: SessionId, spec: &SessionSpec, batch: &DataBatch) -> Result<Vec<Finding>> {
        let heuristic = self.get(spec.heuristic_type).ok_or_else(|| {
            VigilError::FatalSession(format!("no evaluator for heuristic {}", spec.heuristic_type))
        })?;

        if batch.is_empty() {
            return Ok(Vec::new());
        }

        let detections = heuristic
            .evaluate(&spec.params, batch)
            .map_err(|e| match e {
                VigilError::InvalidSpec(reason) => VigilError::FatalSession(reason),
                other => other,
            })?;

        Ok(detections
            .into_iter()
            .map(|d| Finding {
                session_id,
                heuristic: spec.heuristic_type,
                severity: spec.alerting.severity.unwrap_or(d.severity),
                summary: d.summary,
                evidence: d.evidence,
                identity: d.identity,
                window: d.window,
                message: spec.alerting.message.clone(),
            })
            .collect())
    }
}

impl std::fmt::Debug for HeuristicEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kinds: Vec<&str> = self.heuristics().iter().map(|h| h.kind().as_str()).collect();
        f.debug_struct("HeuristicEngine").field("kinds", &kinds).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AlertingParams, Block, ChainTarget, Cursor, Severity, Transaction};
    use alloy::primitives::B256;
    use serde_json::json;

    const ALICE: &str = "0x00000000000000000000000000000000000000a1";

    fn transfer_batch() -> DataBatch {
        let mut block = Block::new(7);
        block.transactions.push(Transaction {
            hash: B256::repeat_byte(1),
            from: Address::from_str(ALICE).unwrap(),
            to: None,
            value: U256::from(10u64),
        });
        DataBatch::from_blocks(ChainTarget::new("layer1"), Cursor(7), vec![block])
    }

    #[test]
    fn test_schema_rejects_unknown_and_missing() {
        let engine = HeuristicEngine::with_defaults();

        let missing = SessionSpec::new("layer1", HeuristicKind::LargeTransfer, HeuristicParams::new());
        assert!(matches!(engine.validate(&missing), Err(VigilError::InvalidSpec(_))));

        let unknown = SessionSpec::new(
            "layer1",
            HeuristicKind::LargeTransfer,
            HeuristicParams::new().with("threshold", "1").with("colour", "red"),
        );
        let err = engine.validate(&unknown).unwrap_err();
        assert!(err.to_string().contains("colour"));

        let mistyped = SessionSpec::new(
            "layer1",
            HeuristicKind::LargeTransfer,
            HeuristicParams::new().with("threshold", "-3"),
        );
        assert!(engine.validate(&mistyped).is_err());
    }

    #[test]
    fn test_engine_applies_alerting_overrides() {
        let engine = HeuristicEngine::with_defaults();
        let mut spec = SessionSpec::new(
            "layer1",
            HeuristicKind::LargeTransfer,
            HeuristicParams::new().with("threshold", "5"),
        );
        spec.alerting = AlertingParams {
            severity: Some(Severity::Critical),
            message: Some("cold wallet".into()),
        };

        let id = SessionId::new();
        let findings = engine.evaluate(id, &spec, &transfer_batch()).unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].session_id, id);
        assert_eq!(findings[0].severity, Severity::Critical);
        assert_eq!(findings[0].message.as_deref(), Some("cold wallet"));
    }

    #[test]
    fn test_missing_evaluator_is_fatal() {
        let engine = HeuristicEngine::new();
        let spec = SessionSpec::new(
            "layer1",
            HeuristicKind::LargeTransfer,
            HeuristicParams::new().with("threshold", "5"),
        );

        assert!(matches!(engine.validate(&spec), Err(VigilError::InvalidSpec(_))));
        let err = engine
            .evaluate(SessionId::new(), &spec, &transfer_batch())
            .unwrap_err();
        assert!(matches!(err, VigilError::FatalSession(_)));
    }

    #[test]
    fn test_param_parsing() {
        assert_eq!(parse_wei(&json!("1000")), Some(U256::from(1000u64)));
        assert_eq!(parse_wei(&json!(12)), Some(U256::from(12u64)));
        assert_eq!(parse_wei(&json!(1.5)), None);
        assert_eq!(parse_decimal(&json!(1.5)), Some(Decimal::new(15, 1)));
        assert_eq!(parse_decimal(&json!("0.25")), Some(Decimal::new(25, 2)));
    }

    #[test]
    fn test_format_eth() {
        assert_eq!(format_eth(U256::from(1_500_000_000_000_000_000u128)), "1.5");
        assert_eq!(format_eth(U256::from(2_000_000_000_000_000_000u128)), "2");
        assert_eq!(format_eth(U256::from(1u64)), "0.000000000000000001");
        assert_eq!(format_eth(U256::ZERO), "0");
    }
}

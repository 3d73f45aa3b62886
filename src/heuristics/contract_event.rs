//! Contract event watch: alert on every log matching a watched event signature.

use alloy::primitives::{keccak256, B256};
use serde_json::json;
use std::collections::HashMap;

use super::{check_schema, param_address, param_string_list, Heuristic, ParamKind, ParamSpec};
use crate::domain::{CursorWindow, DataBatch, Detection, HeuristicKind, HeuristicParams, Severity};
use crate::error::{Result, VigilError};

const SCHEMA: &[ParamSpec] = &[
    ParamSpec::required("address", ParamKind::Address, "Contract emitting the events"),
    ParamSpec::required(
        "signatures",
        ParamKind::StringList,
        "Event signatures, e.g. Transfer(address,address,uint256)",
    ),
];

/// topic0 of a Solidity event signature
pub fn event_topic(signature: &str) -> B256 {
    keccak256(signature.as_bytes())
}

fn check_signature(signature: &str) -> Result<()> {
    let well_formed = signature
        .find('(')
        .map(|open| open > 0 && signature.ends_with(')') && !signature.contains(' '))
        .unwrap_or(false);
    if well_formed {
        Ok(())
    } else {
        Err(VigilError::InvalidSpec(format!(
            "contract_event: '{}' is not a canonical event signature",
            signature
        )))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ContractEvent;

impl Heuristic for ContractEvent {
    fn kind(&self) -> HeuristicKind {
        HeuristicKind::ContractEvent
    }

    fn description(&self) -> &'static str {
        "Alerts on every log of the watched events emitted by a contract"
    }

    fn schema(&self) -> &'static [ParamSpec] {
        SCHEMA
    }

    fn validate(&self, params: &HeuristicParams) -> Result<()> {
        check_schema(self.kind(), SCHEMA, params)?;
        for signature in param_string_list(params, "signatures") {
            check_signature(&signature)?;
        }
        Ok(())
    }

    fn evaluate(&self, params: &HeuristicParams, batch: &DataBatch) -> Result<Vec<Detection>> {
        let contract = param_address(params, "address")?
            .ok_or_else(|| VigilError::InvalidSpec("missing parameter 'address'".to_string()))?;
        let watched: HashMap<B256, String> = param_string_list(params, "signatures")
            .into_iter()
            .map(|sig| (event_topic(&sig), sig))
            .collect();

        let mut detections = Vec::new();
        for block in &batch.blocks {
            for log in block.logs.iter().filter(|l| l.address == contract) {
                let Some(signature) = log.topics.first().and_then(|t| watched.get(t)) else {
                    continue;
                };

                detections.push(Detection {
                    identity: format!("{:#x}:{}", log.transaction_hash, log.log_index),
                    severity: Severity::Medium,
                    summary: format!(
                        "{} emitted by {:#x} in tx {:#x}",
                        signature, contract, log.transaction_hash
                    ),
                    evidence: json!({
                        "contract": format!("{:#x}", contract),
                        "signature": signature,
                        "topics": log.topics.iter().map(|t| format!("{:#x}", t)).collect::<Vec<_>>(),
                        "data": format!("0x{}", hex::encode(&log.data)),
                        "transaction_hash": format!("{:#x}", log.transaction_hash),
                        "log_index": log.log_index,
                        "block": block.number,
                    }),
                    window: CursorWindow::single(block.number),
                });
            }
        }
        Ok(detections)
    }
}

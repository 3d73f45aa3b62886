//! Large native-value transfers, optionally restricted to one account.

use serde_json::json;

use super::{format_eth, param_address, param_wei, Heuristic, ParamKind, ParamSpec};
use crate::domain::{CursorWindow, DataBatch, Detection, HeuristicKind, HeuristicParams, Severity};
use crate::error::{Result, VigilError};

const SCHEMA: &[ParamSpec] = &[
    ParamSpec::required("threshold", ParamKind::WeiAmount, "Minimum transfer value in wei"),
    ParamSpec::optional("address", ParamKind::Address, "Only transfers from or to this account"),
];

#[derive(Debug, Clone, Copy, Default)]
pub struct LargeTransfer;

impl Heuristic for LargeTransfer {
    fn kind(&self) -> HeuristicKind {
        HeuristicKind::LargeTransfer
    }

    fn description(&self) -> &'static str {
        "Alerts on native-value transfers at or above a wei threshold"
    }

    fn schema(&self) -> &'static [ParamSpec] {
        SCHEMA
    }

    fn evaluate(&self, params: &HeuristicParams, batch: &DataBatch) -> Result<Vec<Detection>> {
        let threshold = param_wei(params, "threshold")?
            .ok_or_else(|| VigilError::InvalidSpec("missing parameter 'threshold'".to_string()))?;
        let account = param_address(params, "address")?;

        let mut detections = Vec::new();
        for block in &batch.blocks {
            for tx in &block.transactions {
                if tx.value < threshold {
                    continue;
                }
                if let Some(account) = account {
                    if tx.from != account && tx.to != Some(account) {
                        continue;
                    }
                }

                let to = tx
                    .to
                    .map(|a| format!("{:#x}", a))
                    .unwrap_or_else(|| "contract creation".to_string());
                detections.push(Detection {
                    identity: format!("{:#x}", tx.hash),
                    severity: Severity::High,
                    summary: format!(
                        "Transfer of {} ETH from {:#x} to {} in tx {:#x}",
                        format_eth(tx.value),
                        tx.from,
                        to,
                        tx.hash
                    ),
                    evidence: json!({
                        "transaction_hash": format!("{:#x}", tx.hash),
                        "from": format!("{:#x}", tx.from),
                        "to": tx.to.map(|a| format!("{:#x}", a)),
                        "value_wei": tx.value.to_string(),
                        "threshold_wei": threshold.to_string(),
                        "block": block.number,
                    }),
                    window: CursorWindow::single(block.number),
                });
            }
        }
        Ok(detections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Block, ChainTarget, Cursor, Transaction};
    use alloy::primitives::{Address, B256, U256};
    use std::str::FromStr;

    const HOT: &str = "0x00000000000000000000000000000000000000d0";
    const OTHER: &str = "0x00000000000000000000000000000000000000d1";

    fn tx(n: u8, from: &str, to: Option<&str>, value: u64) -> Transaction {
        Transaction {
            hash: B256::repeat_byte(n),
            from: Address::from_str(from).unwrap(),
            to: to.map(|t| Address::from_str(t).unwrap()),
            value: U256::from(value),
        }
    }

    fn batch() -> DataBatch {
        let mut first = Block::new(100);
        first.transactions = vec![
            tx(1, OTHER, Some(HOT), 50),
            tx(2, OTHER, Some(OTHER), 500),
        ];
        let mut second = Block::new(101);
        second.transactions = vec![tx(3, HOT, None, 1_000), tx(4, OTHER, Some(HOT), 99)];
        DataBatch::from_blocks(ChainTarget::new("layer1"), Cursor(100), vec![first, second])
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let params = HeuristicParams::new().with("threshold", "100");
        let detections = LargeTransfer.evaluate(&params, &batch()).unwrap();
        assert_eq!(detections.len(), 2);

        let params = HeuristicParams::new().with("threshold", "500");
        let detections = LargeTransfer.evaluate(&params, &batch()).unwrap();
        assert_eq!(detections.len(), 2);
        assert_eq!(detections[0].evidence["value_wei"], "500");
    }

    #[test]
    fn test_account_filter_matches_either_side() {
        let params = HeuristicParams::new()
            .with("threshold", "50")
            .with("address", HOT);
        let detections = LargeTransfer.evaluate(&params, &batch()).unwrap();

        let blocks: Vec<u64> = detections.iter().map(|d| d.window.start).collect();
        assert_eq!(blocks, vec![100, 101, 101]);
        assert!(detections[1].summary.contains("contract creation"));
    }

    #[test]
    fn test_identity_is_transaction_hash() {
        let params = HeuristicParams::new().with("threshold", 1_000u64);
        let detections = LargeTransfer.evaluate(&params, &batch()).unwrap();
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].identity, format!("{:#x}", B256::repeat_byte(3)));
    }
}

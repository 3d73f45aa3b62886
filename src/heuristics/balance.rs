//! Balance enforcement: alert when an account balance leaves its bounds.

use alloy::primitives::{Address, U256};
use rust_decimal::Decimal;
use serde_json::json;

use super::{check_schema, format_eth, param_address, param_decimal, Heuristic, ParamKind, ParamSpec};
use crate::domain::{CursorWindow, DataBatch, Detection, HeuristicKind, HeuristicParams, Severity};
use crate::error::{Result, VigilError};

const SCHEMA: &[ParamSpec] = &[
    ParamSpec::required("address", ParamKind::Address, "Account to watch"),
    ParamSpec::optional("lower", ParamKind::Decimal, "Minimum balance in ETH"),
    ParamSpec::optional("upper", ParamKind::Decimal, "Maximum balance in ETH"),
];

const WEI_PER_ETH: u64 = 1_000_000_000_000_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Breach {
    Below,
    Above,
}

impl Breach {
    fn as_str(&self) -> &'static str {
        match self {
            Breach::Below => "below_lower",
            Breach::Above => "above_upper",
        }
    }
}

struct Bounds {
    account: Address,
    lower: Option<(Decimal, U256)>,
    upper: Option<(Decimal, U256)>,
}

impl Bounds {
    fn parse(params: &HeuristicParams) -> Result<Self> {
        let account = param_address(params, "address")?
            .ok_or_else(|| VigilError::InvalidSpec("missing parameter 'address'".to_string()))?;
        let lower = param_decimal(params, "lower")?;
        let upper = param_decimal(params, "upper")?;

        if lower.is_none() && upper.is_none() {
            return Err(VigilError::InvalidSpec(
                "balance_enforcement needs at least one of 'lower' or 'upper'".to_string(),
            ));
        }
        if let (Some(lo), Some(hi)) = (lower, upper) {
            if lo >= hi {
                return Err(VigilError::InvalidSpec(format!(
                    "balance_enforcement lower bound {} must be below upper bound {}",
                    lo, hi
                )));
            }
        }

        Ok(Self {
            account,
            lower: lower.map(|eth| eth_to_wei(eth).map(|wei| (eth, wei))).transpose()?,
            upper: upper.map(|eth| eth_to_wei(eth).map(|wei| (eth, wei))).transpose()?,
        })
    }

    fn check(&self, balance: U256) -> Option<Breach> {
        if let Some((_, lower)) = self.lower {
            if balance < lower {
                return Some(Breach::Below);
            }
        }
        if let Some((_, upper)) = self.upper {
            if balance > upper {
                return Some(Breach::Above);
            }
        }
        None
    }

    fn bound_for(&self, breach: Breach) -> Option<Decimal> {
        match breach {
            Breach::Below => self.lower.map(|(eth, _)| eth),
            Breach::Above => self.upper.map(|(eth, _)| eth),
        }
    }
}

fn eth_to_wei(eth: Decimal) -> Result<U256> {
    if eth.is_sign_negative() {
        return Err(VigilError::InvalidSpec(format!(
            "balance bound {} must not be negative",
            eth
        )));
    }
    let wei = eth
        .checked_mul(Decimal::from(WEI_PER_ETH))
        .ok_or_else(|| VigilError::InvalidSpec(format!("balance bound {} is too large", eth)))?
        .trunc()
        .normalize();
    U256::from_str_radix(&wei.to_string(), 10)
        .map_err(|_| VigilError::InvalidSpec(format!("balance bound {} is not representable", eth)))
}

/// Open violation run inside a batch
struct Run {
    breach: Breach,
    start: u64,
    end: u64,
    first_balance: U256,
    last_balance: U256,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BalanceEnforcement;

impl BalanceEnforcement {
    fn detection(bounds: &Bounds, run: Run) -> Detection {
        let bound = bounds
            .bound_for(run.breach)
            .map(|b| b.normalize().to_string())
            .unwrap_or_default();
        let direction = match run.breach {
            Breach::Below => "fell below",
            Breach::Above => "rose above",
        };

        Detection {
            identity: format!("{:#x}:{}:{}", bounds.account, run.breach.as_str(), run.start),
            severity: Severity::High,
            summary: format!(
                "Balance of {:#x} {} {} ETH (observed {} ETH)",
                bounds.account,
                direction,
                bound,
                format_eth(run.first_balance)
            ),
            evidence: json!({
                "address": format!("{:#x}", bounds.account),
                "breach": run.breach.as_str(),
                "bound_eth": bound,
                "first_balance_wei": run.first_balance.to_string(),
                "last_balance_wei": run.last_balance.to_string(),
                "from_block": run.start,
                "to_block": run.end,
            }),
            // Keyed on where the run began; its end depends on batch boundaries
            window: CursorWindow::single(run.start),
        }
    }
}

impl Heuristic for BalanceEnforcement {
    fn kind(&self) -> HeuristicKind {
        HeuristicKind::BalanceEnforcement
    }

    fn description(&self) -> &'static str {
        "Alerts when an account balance leaves the configured ETH bounds"
    }

    fn schema(&self) -> &'static [ParamSpec] {
        SCHEMA
    }

    fn validate(&self, params: &HeuristicParams) -> Result<()> {
        check_schema(self.kind(), SCHEMA, params)?;
        Bounds::parse(params).map(|_| ())
    }

    fn required_accounts(&self, params: &HeuristicParams) -> Result<Vec<Address>> {
        Ok(param_address(params, "address")?.into_iter().collect())
    }

    fn evaluate(&self, params: &HeuristicParams, batch: &DataBatch) -> Result<Vec<Detection>> {
        let bounds = Bounds::parse(params)?;
        let mut detections = Vec::new();
        let mut open: Option<Run> = None;

        for block in &batch.blocks {
            let breach = block
                .balances
                .get(&bounds.account)
                .and_then(|balance| bounds.check(*balance).map(|b| (b, *balance)));

            if let (Some((kind, balance)), Some(run)) = (breach, open.as_mut()) {
                if run.breach == kind {
                    run.end = block.number;
                    run.last_balance = balance;
                    continue;
                }
            }

            if let Some(done) = open.take() {
                detections.push(Self::detection(&bounds, done));
            }
            if let Some((kind, balance)) = breach {
                open = Some(Run {
                    breach: kind,
                    start: block.number,
                    end: block.number,
                    first_balance: balance,
                    last_balance: balance,
                });
            }
        }

        if let Some(done) = open.take() {
            detections.push(Self::detection(&bounds, done));
        }
        Ok(detections)
    }
}

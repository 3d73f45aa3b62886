//! Chain data handed from the collector to the heuristic engine.

use alloy::primitives::{Address, B256, U256};
use std::collections::HashMap;

use super::cursor::{Cursor, CursorWindow};
use super::session::ChainTarget;

/// What a collector asks the chain client for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    /// First block height to return
    pub from: Cursor,
    /// Upper bound on the number of blocks in one batch
    pub max_blocks: u64,
    /// Accounts whose balance must be sampled at every returned block
    pub accounts: Vec<Address>,
}

impl FetchRequest {
    pub fn new(from: Cursor, max_blocks: u64) -> Self {
        Self {
            from,
            max_blocks: max_blocks.max(1),
            accounts: Vec::new(),
        }
    }

    pub fn with_accounts(mut self, accounts: Vec<Address>) -> Self {
        self.accounts = accounts;
        self
    }
}

/// Native-value transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub hash: B256,
    pub from: Address,
    pub to: Option<Address>,
    pub value: U256,
}

/// Contract event log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Log {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Vec<u8>,
    pub transaction_hash: B256,
    pub log_index: u64,
}

/// One block with everything heuristics may look at
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Block {
    pub number: u64,
    pub hash: B256,
    pub timestamp: u64,
    pub transactions: Vec<Transaction>,
    pub logs: Vec<Log>,
    /// Balances sampled at this block for the requested accounts
    pub balances: HashMap<Address, U256>,
}

impl Block {
    pub fn new(number: u64) -> Self {
        Self {
            number,
            ..Default::default()
        }
    }
}

/// Contiguous run of blocks returned by one `fetch_since` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataBatch {
    pub chain: ChainTarget,
    /// Cursor the batch was requested from
    pub from: Cursor,
    /// Cursor to persist once the batch is fully processed
    pub next: Cursor,
    pub blocks: Vec<Block>,
}

impl DataBatch {
    /// Batch with no new data; `next == from`
    pub fn empty(chain: ChainTarget, from: Cursor) -> Self {
        Self {
            chain,
            from,
            next: from,
            blocks: Vec::new(),
        }
    }

    /// Build a batch from contiguous blocks starting at `from`
    pub fn from_blocks(chain: ChainTarget, from: Cursor, blocks: Vec<Block>) -> Self {
        let next = blocks
            .last()
            .map(|b| Cursor::after(b.number))
            .unwrap_or(from);
        Self {
            chain,
            from,
            next,
            blocks,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Heights covered by this batch
    pub fn window(&self) -> Option<CursorWindow> {
        match (self.blocks.first(), self.blocks.last()) {
            (Some(first), Some(last)) => Some(CursorWindow::new(first.number, last.number)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_cursor_bounds() {
        let chain = ChainTarget::new("layer1");
        let empty = DataBatch::empty(chain.clone(), Cursor(50));
        assert!(empty.is_empty());
        assert_eq!(empty.next, Cursor(50));
        assert_eq!(empty.window(), None);

        let batch = DataBatch::from_blocks(
            chain,
            Cursor(50),
            vec![Block::new(50), Block::new(51), Block::new(52)],
        );
        assert_eq!(batch.next, Cursor(53));
        assert_eq!(batch.window(), Some(CursorWindow::new(50, 52)));
    }
}

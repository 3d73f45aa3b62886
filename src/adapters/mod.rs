pub mod chain_client;
pub mod evm_rpc;
pub mod feishu;
pub mod postgres;
pub mod slack;

pub use chain_client::{ChainClient, ClientBundle, SharedChainClient};
pub use evm_rpc::EvmRpcClient;
pub use feishu::FeishuSink;
pub use postgres::PostgresStateStore;
pub use slack::SlackSink;

#[cfg(test)]
pub use chain_client::MockChainClient;

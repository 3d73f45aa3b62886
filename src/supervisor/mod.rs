//! Alert supervision
//!
//! - Alert payload and the sink boundary (log, Feishu, Slack)
//! - Dispatcher with fingerprint dedup, severity routing and bounded retries

pub mod alert;
pub mod dispatcher;

pub use alert::{Alert, AlertSink, LogSink, SharedSink};
pub use dispatcher::{AlertDispatcher, DispatchOutcome, SinkRoute};

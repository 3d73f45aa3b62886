//! Per-session data collection
//!
//! One worker task per active session pulls batches from its chain client
//! and drives them through evaluation and dispatch.

pub mod worker;

pub use worker::{SessionWorker, WorkerContext, WorkerOutcome};

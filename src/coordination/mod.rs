//! Coordination primitives for long-running session workers
//!
//! - Retry/backoff policy shared by collectors and the alert dispatcher
//! - Cooperative stop signals and OS shutdown signal handling

pub mod retry;
pub mod shutdown;

pub use retry::RetryPolicy;
pub use shutdown::{shutdown_signal, stop_pair, StopHandle, StopSignal};

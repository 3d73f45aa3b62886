//! Persistence Layer for session progress and alert dedup
//!
//! - `StateStore` contract over checkpoints, fingerprints and session metadata
//! - In-memory reference backend (the PostgreSQL backend lives in `adapters`)

pub mod state_store;

pub use state_store::{Checkpoint, MemoryStateStore, SharedStateStore, StateStore};

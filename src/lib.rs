//! vigil: session-based blockchain threat monitoring
//!
//! Each session pairs a chain target with one heuristic. A per-session
//! collector walks the chain from a persisted checkpoint, the heuristic
//! engine turns batches into findings, and the alert dispatcher delivers
//! them to sinks at most once per fingerprint.

pub mod adapters;
pub mod api;
pub mod app;
pub mod cli;
pub mod collector;
pub mod config;
pub mod coordination;
pub mod coordinator;
pub mod domain;
pub mod error;
pub mod heuristics;
pub mod persistence;
pub mod services;
pub mod supervisor;

pub use app::App;
pub use config::AppConfig;
pub use coordinator::{BootstrapReport, Manifest, SessionRegistry, ShutdownReport};
pub use error::{Result, VigilError};
pub use heuristics::HeuristicEngine;
pub use persistence::{MemoryStateStore, StateStore};
pub use supervisor::{Alert, AlertDispatcher};

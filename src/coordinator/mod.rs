//! Session orchestration
//!
//! The registry owns session lifecycles; the bootstrap module loads the
//! startup manifest and reports per-entry outcomes.

pub mod bootstrap;
pub mod registry;

pub use bootstrap::{BootstrapCreated, BootstrapFailure, BootstrapReport, Manifest};
pub use registry::{SessionEvent, SessionRegistry, ShutdownReport};

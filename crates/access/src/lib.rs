//! `cloudgate-access` — the authorization orchestrator.
//!
//! Ties the token cache, authority resolver and permission evaluator together
//! for the end-to-end decisions the application needs, and is the recovery
//! boundary for every lower-layer error: authorization checks resolve any
//! uncertainty to **not authorized** (fail closed) instead of letting a fault
//! escape.

pub mod error;
pub mod orchestrator;
pub mod token_source;

pub use error::AccessError;
pub use orchestrator::AccessOrchestrator;
pub use token_source::{CachedTokenSource, TokenSource};

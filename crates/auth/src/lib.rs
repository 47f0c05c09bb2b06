//! `cloudgate-auth` — pure RBAC permission evaluation (zero I/O).
//!
//! This crate is intentionally decoupled from HTTP, tokens and storage: it
//! answers "does this grant list authorize this action" and nothing else.

pub mod evaluate;
pub mod grant;
pub mod principal;

pub use evaluate::{EvaluationMode, ROLE_ASSIGNMENT_WRITE_ACTION, evaluate, wildcard_match};
pub use grant::PermissionGrant;
pub use principal::SignedInUser;

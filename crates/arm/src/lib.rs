//! `cloudgate-arm` — clients for the Azure Resource Manager and directory
//! graph APIs.
//!
//! Only the minimal JSON shapes the authorization core consumes are modeled;
//! everything else in those APIs is out of scope.

pub mod client;
pub mod directory;
pub mod error;
pub mod models;

pub use client::{ArmApiVersions, ResourceManagerApi, ResourceManagerClient};
pub use directory::{DirectoryApi, DirectoryClient};
pub use error::ArmError;
pub use models::{RoleAssignment, RoleDefinition, ServicePrincipal};

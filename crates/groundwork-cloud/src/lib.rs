//! Groundwork cloud control-plane adapter
//!
//! Thin, retryable wrapper around the provider CLI. All remote reads and
//! writes in the engine go through this crate: existence checks, identity
//! assumption, and the narrow capability traits the provisioning engine
//! consumes. Nothing above this layer invokes the provider directly.

pub mod api;
pub mod aws;
pub mod credentials;
pub mod error;

// Re-exports
pub use api::{
    AccountStatus, AccountSummary, AccountsApi, CreationState, KeyHandle, ObjectVersionPage,
    ObjectVersionRef, StorageApi,
};
pub use aws::{AwsCli, CallerIdentity, OrgRoot, OrgUnit, Organization, Role};
pub use credentials::Credentials;
pub use error::{CloudError, Result};

//! Resource kinds the reconciler operates on
//!
//! One module per area: the organization tree, per-account identity
//! federation, and the state-backend storage triple. Each type is a thin
//! struct over the adapter implementing [`crate::reconcile::Reconcile`].

pub mod federation;
pub mod org;
pub mod storage;

pub use federation::{
    DeployRoleResource, FederationProviderResource, IDENTITY_PROPAGATION_WAIT,
};
pub use org::{OrgUnitResource, OrganizationResource, ensure_ou_path};
pub use storage::{EncryptionKeyResource, LockTableResource, StateBucketResource};

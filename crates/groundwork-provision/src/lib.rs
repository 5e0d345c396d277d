//! Groundwork provisioning engine
//!
//! The idempotent reconciliation core: a generic find-or-adopt-or-create
//! reconciler specialized per resource kind, the member-account lifecycle
//! state machine, the backend provisioner around the declarative
//! infrastructure tool, the staged pipeline executor, and the destroy
//! path that approximately inverts them.

pub mod account;
pub mod backend;
pub mod destroy;
pub mod drain;
pub mod error;
pub mod pipeline;
pub mod reconcile;
pub mod resources;
pub mod tofu;
pub mod verify;

#[cfg(test)]
pub(crate) mod testutil;

// Re-exports
pub use account::{AccountLifecycleManager, AccountOutcome, DesiredAccount};
pub use backend::{BackendOutcome, BackendProvisioner, BackendSpec};
pub use destroy::{ClosureSummary, close_accounts, remove_federation, tear_down_backend};
pub use drain::{DrainSummary, delete_bucket_drained, drain_bucket};
pub use error::{ProvisionError, Result};
pub use pipeline::{FailurePolicy, Pipeline, PipelineState, StageOutput, StageStatus};
pub use reconcile::{Health, Observation, Outcome, Reconcile, reconcile};
pub use tofu::{BackendVars, InfraTool, PlanVerdict, Tofu};
pub use verify::{Finding, verify_provisioning};

/// Grace window for scheduled encryption-key deletion, the provider's
/// enforced minimum in days.
pub const KEY_DELETION_WINDOW_DAYS: u32 = 7;

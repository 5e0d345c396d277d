use groundwork_cloud::CloudError;
use groundwork_core::CoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error(
        "{kind} '{name}' conflicts with an existing resource that could not be located for adoption: {detail}"
    )]
    Conflict {
        kind: &'static str,
        name: String,
        detail: String,
    },

    #[error("{what}\nhint: {remediation}")]
    InvalidState { what: String, remediation: String },

    #[error("timed out waiting for {what} after {attempts} attempts")]
    Timeout { what: String, attempts: u32 },

    #[error("account creation for '{name}' failed: {reason}")]
    AccountCreationFailed { name: String, reason: String },

    #[error(
        "bucket '{bucket}' could not be fully drained: {failed} object versions were not deleted; refusing to delete the bucket"
    )]
    DrainIncomplete { bucket: String, failed: usize },

    #[error(
        "state bucket '{bucket}' is in region {found}, expected {expected}\nhint: re-run `ground up --recreate-backend` to destroy and recreate the backend in the target region"
    )]
    RegionMismatch {
        bucket: String,
        found: String,
        expected: String,
    },

    #[error("backend for {environment} is not ready: {detail}")]
    BackendNotReady { environment: String, detail: String },

    #[error(
        "declarative infrastructure tool not found: {0}\nhint: install tofu (or terraform) and ensure it is on PATH"
    )]
    ToolNotFound(String),

    #[error("infrastructure tool {operation} failed: {detail}")]
    ToolFailed { operation: String, detail: String },

    #[error("pipeline aborted: {0}")]
    Aborted(String),

    #[error(transparent)]
    Cloud(#[from] CloudError),

    #[error(transparent)]
    Core(#[from] CoreError),
}

pub type Result<T> = std::result::Result<T, ProvisionError>;

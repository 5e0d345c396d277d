//! Control-plane error types and stderr classification
//!
//! The provider CLI reports API faults as error codes embedded in stderr
//! text. Classification into conflict / not-found / throttled drives the
//! reconciler's adopt fallback and the adapter's bounded retry; anything
//! unrecognized stays a plain command failure surfaced verbatim.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CloudError {
    #[error("provider CLI not found: {0}\nhint: install the aws CLI and ensure it is on PATH")]
    CliNotFound(String),

    #[error("command failed: {stderr}")]
    CommandFailed { code: Option<i32>, stderr: String },

    #[error("resource already exists: {0}")]
    Conflict(String),

    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("throttled by control plane: {0}")]
    Throttled(String),

    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("unexpected response: {0}")]
    InvalidResponse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CloudError>;

const CONFLICT_CODES: &[&str] = &[
    "EntityAlreadyExists",
    "AlreadyExistsException",
    "AlreadyInOrganizationException",
    "DuplicateOrganizationalUnitException",
    "BucketAlreadyOwnedByYou",
    "BucketAlreadyExists",
    "ResourceInUseException",
];

const NOT_FOUND_CODES: &[&str] = &[
    "NoSuchEntity",
    "NoSuchBucket",
    "NotFoundException",
    "ResourceNotFoundException",
    "AccountNotFoundException",
    "OrganizationalUnitNotFoundException",
    "AWSOrganizationsNotInUseException",
];

const THROTTLE_CODES: &[&str] = &[
    "Throttling",
    "ThrottlingException",
    "TooManyRequestsException",
    "RequestLimitExceeded",
    "Rate exceeded",
    "SlowDown",
];

const AUTH_CODES: &[&str] = &[
    "ExpiredToken",
    "InvalidClientTokenId",
    "AccessDenied",
    "UnauthorizedOperation",
    "could not be found in the configured credential sources",
];

impl CloudError {
    /// Classify a failed CLI invocation by its stderr text.
    pub fn classify(code: Option<i32>, stderr: &str) -> Self {
        let line = stderr.trim().to_string();
        if THROTTLE_CODES.iter().any(|c| line.contains(c)) {
            return CloudError::Throttled(line);
        }
        if CONFLICT_CODES.iter().any(|c| line.contains(c)) {
            return CloudError::Conflict(line);
        }
        if NOT_FOUND_CODES.iter().any(|c| line.contains(c)) {
            return CloudError::NotFound(line);
        }
        if AUTH_CODES.iter().any(|c| line.contains(c)) {
            return CloudError::AuthenticationFailed(line);
        }
        CloudError::CommandFailed { code, stderr: line }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, CloudError::Conflict(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CloudError::NotFound(_))
    }

    pub fn is_throttled(&self) -> bool {
        matches!(self, CloudError::Throttled(_))
    }
}

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(
        "project root not found\nsearched upward from: {0}\nhint: run inside a directory containing groundwork.json, or set GROUNDWORK_PROJECT_ROOT"
    )]
    ProjectRootNotFound(PathBuf),

    #[error(
        "account registry not found: {0}\nhint: run the provisioning step (`ground up`) first"
    )]
    RegistryNotFound(PathBuf),

    #[error(
        "account registry schema version {found} is newer than supported version {supported}\nhint: update the ground binary before re-running"
    )]
    RegistryVersion { found: u32, supported: u32 },
}

pub type Result<T> = std::result::Result<T, CoreError>;

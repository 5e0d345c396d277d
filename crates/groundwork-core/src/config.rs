//! Project configuration
//!
//! A small serde record read from `groundwork.json` at the project root.
//! The root is discovered by walking upward from the current directory,
//! with the `GROUNDWORK_PROJECT_ROOT` environment variable taking
//! priority.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::{CoreError, Result};

/// Configuration file name looked for at the project root.
pub const CONFIG_FILE: &str = "groundwork.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Project name, used as the prefix of every derived resource name.
    pub project: String,

    /// Target region for member-account resources and state backends.
    pub region: String,

    /// Base contact address; member accounts get plus-addressed variants.
    pub account_email: String,

    /// Repository claim (`owner/repo`) the deployment roles are scoped to.
    pub repository: String,

    /// Token issuer trusted by the identity-federation providers.
    #[serde(default = "default_token_issuer")]
    pub token_issuer: String,

    /// Cross-account operator role assumed in member accounts.
    #[serde(default = "default_operator_role")]
    pub operator_role: String,

    /// Directory holding the declarative backend module, relative to the
    /// project root.
    #[serde(default = "default_backend_module")]
    pub backend_module: String,
}

fn default_token_issuer() -> String {
    "https://token.actions.githubusercontent.com".to_string()
}

fn default_operator_role() -> String {
    "OrganizationAccountAccessRole".to_string()
}

fn default_backend_module() -> String {
    "infra/backend".to_string()
}

impl ProjectConfig {
    /// Load and validate the configuration at `root`.
    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join(CONFIG_FILE);
        let content = std::fs::read_to_string(&path)?;
        let config: ProjectConfig = serde_json::from_str(&content)?;
        config.validate()?;
        debug!(path = %path.display(), project = %config.project, "Loaded project config");
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.project.is_empty() {
            return Err(CoreError::InvalidConfig("project name is empty".into()));
        }
        if !self
            .project
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            return Err(CoreError::InvalidConfig(format!(
                "project name '{}' must be lowercase alphanumeric with dashes (it is embedded in bucket names)",
                self.project
            )));
        }
        if self.region.is_empty() {
            return Err(CoreError::InvalidConfig("region is empty".into()));
        }
        if !self.account_email.contains('@') {
            return Err(CoreError::InvalidConfig(format!(
                "account_email '{}' is not an email address",
                self.account_email
            )));
        }
        if !self.repository.contains('/') {
            return Err(CoreError::InvalidConfig(format!(
                "repository '{}' must be of the form owner/repo",
                self.repository
            )));
        }
        Ok(())
    }

    /// Issuer URL with the scheme stripped, the form the provider ARN and
    /// trust condition keys use.
    pub fn issuer_host(&self) -> &str {
        self.token_issuer
            .strip_prefix("https://")
            .unwrap_or(&self.token_issuer)
    }
}

/// Locate the project root.
///
/// Search order:
/// 1. `GROUNDWORK_PROJECT_ROOT` environment variable
/// 2. upward from the current directory, looking for `groundwork.json`
pub fn find_project_root() -> Result<PathBuf> {
    if let Ok(root) = std::env::var("GROUNDWORK_PROJECT_ROOT") {
        let path = PathBuf::from(&root);
        debug!(env_root = %root, "Checking GROUNDWORK_PROJECT_ROOT");
        if path.join(CONFIG_FILE).exists() {
            info!(project_root = %path.display(), "Found project root from environment variable");
            return Ok(path);
        }
    }

    let start_dir = std::env::current_dir()?;
    let mut current = start_dir.clone();
    debug!(start_dir = %start_dir.display(), "Searching for project root");

    loop {
        if current.join(CONFIG_FILE).exists() {
            info!(project_root = %current.display(), "Found project root");
            return Ok(current);
        }
        if !current.pop() {
            break;
        }
    }

    warn!(start_dir = %start_dir.display(), "Project root not found");
    Err(CoreError::ProjectRootNotFound(start_dir))
}

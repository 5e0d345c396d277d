//! Declarative infrastructure tool runner
//!
//! The backend module is materialized by an external tool (`tofu`, with
//! `terraform` as fallback). The orchestrator only invokes it and
//! interprets exit codes: the tool's module internals are an opaque
//! collaborator. [`InfraTool`] is the seam the backend provisioner uses;
//! tests substitute a fake.

use async_trait::async_trait;
use groundwork_cloud::Credentials;
use groundwork_core::Environment;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{ProvisionError, Result};

/// Input variables every invocation passes to the module.
#[derive(Debug, Clone)]
pub struct BackendVars {
    pub project: String,
    pub environment: Environment,
    pub account_id: String,
    pub region: String,
    /// Scoped operator credentials for the target account.
    pub credentials: Option<Credentials>,
}

impl BackendVars {
    fn var_args(&self) -> Vec<String> {
        vec![
            "-var".to_string(),
            format!("project={}", self.project),
            "-var".to_string(),
            format!("environment={}", self.environment),
            "-var".to_string(),
            format!("account_id={}", self.account_id),
            "-var".to_string(),
            format!("region={}", self.region),
        ]
    }
}

/// Verdict of a `plan -detailed-exitcode` run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanVerdict {
    NoChanges,
    ChangesPending,
}

#[async_trait]
pub trait InfraTool: Send + Sync {
    /// Initialize the working directory.
    async fn prepare(&self, vars: &BackendVars) -> Result<()>;

    /// Bring one pre-existing resource under the tool's state.
    async fn import(&self, vars: &BackendVars, address: &str, resource_id: &str) -> Result<()>;

    async fn plan(&self, vars: &BackendVars) -> Result<PlanVerdict>;

    async fn apply(&self, vars: &BackendVars) -> Result<()>;
}

/// CLI-backed implementation.
pub struct Tofu {
    binary: String,
    module_dir: PathBuf,
}

impl Tofu {
    /// Locate `tofu` (or `terraform`) on PATH.
    pub async fn detect(module_dir: impl AsRef<Path>) -> Result<Self> {
        for candidate in ["tofu", "terraform"] {
            let which = Command::new("which").arg(candidate).output().await
                .map_err(|e| ProvisionError::ToolFailed {
                    operation: "detect".to_string(),
                    detail: e.to_string(),
                })?;
            if which.status.success() {
                debug!(binary = candidate, "Detected infrastructure tool");
                return Ok(Self {
                    binary: candidate.to_string(),
                    module_dir: module_dir.as_ref().to_path_buf(),
                });
            }
        }
        Err(ProvisionError::ToolNotFound("tofu / terraform".to_string()))
    }

    async fn run(&self, vars: &BackendVars, args: &[&str]) -> Result<std::process::Output> {
        let chdir = format!("-chdir={}", self.module_dir.display());
        let mut cmd = Command::new(&self.binary);
        cmd.arg(&chdir);
        cmd.args(args);
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.env("AWS_REGION", &vars.region);

        if let Some(creds) = &vars.credentials {
            cmd.env("AWS_ACCESS_KEY_ID", &creds.access_key_id);
            cmd.env("AWS_SECRET_ACCESS_KEY", &creds.secret_access_key);
            cmd.env("AWS_SESSION_TOKEN", &creds.session_token);
        }

        debug!("Running: {} {} {}", self.binary, chdir, args.join(" "));
        Ok(cmd.output().await.map_err(|e| ProvisionError::ToolFailed {
            operation: args.first().copied().unwrap_or("run").to_string(),
            detail: e.to_string(),
        })?)
    }

    fn fail(operation: &str, output: &std::process::Output) -> ProvisionError {
        ProvisionError::ToolFailed {
            operation: operation.to_string(),
            detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }
    }
}

#[async_trait]
impl InfraTool for Tofu {
    async fn prepare(&self, vars: &BackendVars) -> Result<()> {
        let output = self
            .run(vars, &["init", "-input=false", "-no-color"])
            .await?;
        if !output.status.success() {
            return Err(Self::fail("init", &output));
        }
        Ok(())
    }

    async fn import(&self, vars: &BackendVars, address: &str, resource_id: &str) -> Result<()> {
        let var_args = vars.var_args();
        let mut args = vec!["import", "-input=false", "-no-color"];
        args.extend(var_args.iter().map(String::as_str));
        args.push(address);
        args.push(resource_id);

        let output = self.run(vars, &args).await?;
        if !output.status.success() {
            return Err(Self::fail("import", &output));
        }
        debug!(address, resource_id, "Imported pre-existing resource");
        Ok(())
    }

    async fn plan(&self, vars: &BackendVars) -> Result<PlanVerdict> {
        let var_args = vars.var_args();
        let mut args = vec!["plan", "-detailed-exitcode", "-input=false", "-no-color"];
        args.extend(var_args.iter().map(String::as_str));

        let output = self.run(vars, &args).await?;
        match output.status.code() {
            Some(0) => Ok(PlanVerdict::NoChanges),
            Some(2) => Ok(PlanVerdict::ChangesPending),
            _ => Err(Self::fail("plan", &output)),
        }
    }

    async fn apply(&self, vars: &BackendVars) -> Result<()> {
        let var_args = vars.var_args();
        let mut args = vec!["apply", "-auto-approve", "-input=false", "-no-color"];
        args.extend(var_args.iter().map(String::as_str));

        let output = self.run(vars, &args).await?;
        if !output.status.success() {
            return Err(Self::fail("apply", &output));
        }
        info!(environment = %vars.environment, "Backend module applied");
        Ok(())
    }
}

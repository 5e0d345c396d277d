//! aws CLI wrapper
//!
//! Wraps the provider CLI the same way for every service: one JSON-mode
//! invocation per call, stderr classified into typed errors, and a
//! bounded backoff retry for throttled calls. An adapter instance is
//! scoped to one credential context; [`AwsCli::assume_role`] returns a
//! fresh adapter for the target account instead of mutating this one.

use serde::Deserialize;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::credentials::{AssumeRoleResponse, Credentials};
use crate::error::{CloudError, Result};

/// Retries for throttled calls before the error propagates to stage
/// policy.
const THROTTLE_ATTEMPTS: u32 = 3;
const THROTTLE_BASE_DELAY: Duration = Duration::from_secs(1);
const THROTTLE_MAX_DELAY: Duration = Duration::from_secs(30);

const SESSION_NAME: &str = "groundwork-bootstrap";

/// aws CLI wrapper, scoped to one region and credential context.
#[derive(Debug, Clone)]
pub struct AwsCli {
    region: String,
    credentials: Option<Credentials>,
}

impl AwsCli {
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            credentials: None,
        }
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Credentials this adapter is scoped to, `None` for the ambient
    /// operator identity.
    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    /// Check that the CLI is installed.
    pub async fn check_cli() -> Result<()> {
        let which = Command::new("which").arg("aws").output().await?;
        if !which.status.success() {
            return Err(CloudError::CliNotFound("aws".to_string()));
        }
        Ok(())
    }

    /// Run a CLI command and return stdout.
    pub(crate) async fn run(&self, args: &[&str]) -> Result<String> {
        let mut delay = THROTTLE_BASE_DELAY;
        let mut attempt = 1;
        loop {
            match self.run_once(args).await {
                Err(CloudError::Throttled(msg)) if attempt < THROTTLE_ATTEMPTS => {
                    warn!(attempt, %msg, "Throttled by control plane, backing off");
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(THROTTLE_MAX_DELAY);
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    async fn run_once(&self, args: &[&str]) -> Result<String> {
        let mut cmd = Command::new("aws");
        cmd.args(args);
        cmd.arg("--region").arg(&self.region);
        cmd.arg("--output").arg("json");
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        if let Some(creds) = &self.credentials {
            cmd.env("AWS_ACCESS_KEY_ID", &creds.access_key_id);
            cmd.env("AWS_SECRET_ACCESS_KEY", &creds.secret_access_key);
            cmd.env("AWS_SESSION_TOKEN", &creds.session_token);
        }

        debug!("Running: aws {}", args.join(" "));

        let output = cmd.output().await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CloudError::classify(output.status.code(), &stderr));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    pub(crate) async fn run_json<T: serde::de::DeserializeOwned>(&self, args: &[&str]) -> Result<T> {
        let output = self.run(args).await?;
        serde_json::from_str(&output)
            .map_err(|e| CloudError::InvalidResponse(format!("aws {}: {}", args.join(" "), e)))
    }

    // ========== STS ==========

    pub async fn caller_identity(&self) -> Result<CallerIdentity> {
        self.run_json(&["sts", "get-caller-identity"]).await
    }

    /// Assume the operator role in a member account, returning a new
    /// adapter scoped to the temporary credentials. The returned context
    /// is released by dropping it.
    pub async fn assume_role(&self, account_id: &str, role_name: &str) -> Result<AwsCli> {
        let role_arn = format!("arn:aws:iam::{}:role/{}", account_id, role_name);
        let response: AssumeRoleResponse = self
            .run_json(&[
                "sts",
                "assume-role",
                "--role-arn",
                &role_arn,
                "--role-session-name",
                SESSION_NAME,
            ])
            .await?;

        debug!(account_id, role_name, "Assumed operator role");
        Ok(AwsCli {
            region: self.region.clone(),
            credentials: Some(response.credentials.into()),
        })
    }

    // ========== Organizations ==========

    /// Describe the organization, `None` when none exists yet.
    pub async fn describe_organization(&self) -> Result<Option<Organization>> {
        match self
            .run_json::<OrganizationEnvelope>(&["organizations", "describe-organization"])
            .await
        {
            Ok(envelope) => Ok(Some(envelope.organization)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn create_organization(&self) -> Result<Organization> {
        let envelope: OrganizationEnvelope = self
            .run_json(&[
                "organizations",
                "create-organization",
                "--feature-set",
                "ALL",
            ])
            .await?;
        Ok(envelope.organization)
    }

    pub async fn list_roots(&self) -> Result<Vec<OrgRoot>> {
        let envelope: RootsEnvelope = self.run_json(&["organizations", "list-roots"]).await?;
        Ok(envelope.roots)
    }

    pub async fn list_organizational_units(&self, parent_id: &str) -> Result<Vec<OrgUnit>> {
        let envelope: OrgUnitsEnvelope = self
            .run_json(&[
                "organizations",
                "list-organizational-units-for-parent",
                "--parent-id",
                parent_id,
            ])
            .await?;
        Ok(envelope.organizational_units)
    }

    pub async fn create_organizational_unit(&self, parent_id: &str, name: &str) -> Result<OrgUnit> {
        let envelope: OrgUnitEnvelope = self
            .run_json(&[
                "organizations",
                "create-organizational-unit",
                "--parent-id",
                parent_id,
                "--name",
                name,
            ])
            .await?;
        Ok(envelope.organizational_unit)
    }

    pub(crate) async fn list_org_accounts(&self) -> Result<Vec<ApiAccount>> {
        let envelope: AccountsEnvelope = self.run_json(&["organizations", "list-accounts"]).await?;
        Ok(envelope.accounts)
    }

    pub(crate) async fn describe_org_account(&self, account_id: &str) -> Result<ApiAccount> {
        let envelope: AccountEnvelope = self
            .run_json(&[
                "organizations",
                "describe-account",
                "--account-id",
                account_id,
            ])
            .await?;
        Ok(envelope.account)
    }

    // ========== IAM: identity federation ==========

    pub async fn list_openid_provider_arns(&self) -> Result<Vec<String>> {
        let envelope: OidcProvidersEnvelope = self
            .run_json(&["iam", "list-open-id-connect-providers"])
            .await?;
        Ok(envelope.list.into_iter().map(|p| p.arn).collect())
    }

    pub async fn create_openid_provider(
        &self,
        url: &str,
        client_id: &str,
        thumbprint: &str,
    ) -> Result<String> {
        let envelope: CreatedOidcProviderEnvelope = self
            .run_json(&[
                "iam",
                "create-open-id-connect-provider",
                "--url",
                url,
                "--client-id-list",
                client_id,
                "--thumbprint-list",
                thumbprint,
            ])
            .await?;
        Ok(envelope.arn)
    }

    pub async fn delete_openid_provider(&self, arn: &str) -> Result<()> {
        self.run(&[
            "iam",
            "delete-open-id-connect-provider",
            "--open-id-connect-provider-arn",
            arn,
        ])
        .await?;
        Ok(())
    }

    // ========== IAM: roles ==========

    pub async fn get_role(&self, role_name: &str) -> Result<Option<Role>> {
        match self
            .run_json::<RoleEnvelope>(&["iam", "get-role", "--role-name", role_name])
            .await
        {
            Ok(envelope) => Ok(Some(envelope.role)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn create_role(
        &self,
        role_name: &str,
        trust_policy: &str,
        description: &str,
    ) -> Result<Role> {
        let envelope: RoleEnvelope = self
            .run_json(&[
                "iam",
                "create-role",
                "--role-name",
                role_name,
                "--assume-role-policy-document",
                trust_policy,
                "--description",
                description,
            ])
            .await?;
        Ok(envelope.role)
    }

    pub async fn update_assume_role_policy(&self, role_name: &str, trust_policy: &str) -> Result<()> {
        self.run(&[
            "iam",
            "update-assume-role-policy",
            "--role-name",
            role_name,
            "--policy-document",
            trust_policy,
        ])
        .await?;
        Ok(())
    }

    pub async fn put_role_policy(
        &self,
        role_name: &str,
        policy_name: &str,
        policy_document: &str,
    ) -> Result<()> {
        self.run(&[
            "iam",
            "put-role-policy",
            "--role-name",
            role_name,
            "--policy-name",
            policy_name,
            "--policy-document",
            policy_document,
        ])
        .await?;
        Ok(())
    }

    pub async fn list_role_policies(&self, role_name: &str) -> Result<Vec<String>> {
        let envelope: RolePoliciesEnvelope = self
            .run_json(&["iam", "list-role-policies", "--role-name", role_name])
            .await?;
        Ok(envelope.policy_names)
    }

    pub async fn delete_role_policy(&self, role_name: &str, policy_name: &str) -> Result<()> {
        self.run(&[
            "iam",
            "delete-role-policy",
            "--role-name",
            role_name,
            "--policy-name",
            policy_name,
        ])
        .await?;
        Ok(())
    }

    pub async fn delete_role(&self, role_name: &str) -> Result<()> {
        self.run(&["iam", "delete-role", "--role-name", role_name])
            .await?;
        Ok(())
    }
}

/// `sts get-caller-identity` response.
#[derive(Debug, Clone, Deserialize)]
pub struct CallerIdentity {
    #[serde(rename = "Account")]
    pub account: String,

    #[serde(rename = "Arn")]
    pub arn: String,

    #[serde(rename = "UserId")]
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
struct OrganizationEnvelope {
    #[serde(rename = "Organization")]
    organization: Organization,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Organization {
    #[serde(rename = "Id")]
    pub id: String,

    #[serde(rename = "MasterAccountId")]
    pub management_account_id: String,
}

#[derive(Debug, Deserialize)]
struct RootsEnvelope {
    #[serde(rename = "Roots")]
    roots: Vec<OrgRoot>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrgRoot {
    #[serde(rename = "Id")]
    pub id: String,

    #[serde(rename = "Name")]
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct OrgUnitsEnvelope {
    #[serde(rename = "OrganizationalUnits")]
    organizational_units: Vec<OrgUnit>,
}

#[derive(Debug, Deserialize)]
struct OrgUnitEnvelope {
    #[serde(rename = "OrganizationalUnit")]
    organizational_unit: OrgUnit,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrgUnit {
    #[serde(rename = "Id")]
    pub id: String,

    #[serde(rename = "Name")]
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct AccountsEnvelope {
    #[serde(rename = "Accounts")]
    accounts: Vec<ApiAccount>,
}

#[derive(Debug, Deserialize)]
struct AccountEnvelope {
    #[serde(rename = "Account")]
    account: ApiAccount,
}

/// Raw member-account record as the organizations API reports it.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ApiAccount {
    #[serde(rename = "Id")]
    pub id: String,

    #[serde(rename = "Name")]
    pub name: String,

    #[serde(rename = "Email")]
    pub email: String,

    #[serde(rename = "Status")]
    pub status: String,
}

#[derive(Debug, Deserialize)]
struct OidcProvidersEnvelope {
    #[serde(rename = "OpenIDConnectProviderList")]
    list: Vec<OidcProviderArn>,
}

#[derive(Debug, Deserialize)]
struct OidcProviderArn {
    #[serde(rename = "Arn")]
    arn: String,
}

#[derive(Debug, Deserialize)]
struct CreatedOidcProviderEnvelope {
    #[serde(rename = "OpenIDConnectProviderArn")]
    arn: String,
}

#[derive(Debug, Deserialize)]
struct RoleEnvelope {
    #[serde(rename = "Role")]
    role: Role,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Role {
    #[serde(rename = "RoleName")]
    pub role_name: String,

    #[serde(rename = "Arn")]
    pub arn: String,

    /// Trust document, already URL-decoded to JSON by the CLI.
    #[serde(rename = "AssumeRolePolicyDocument")]
    pub assume_role_policy_document: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct RolePoliciesEnvelope {
    #[serde(rename = "PolicyNames")]
    policy_names: Vec<String>,
}

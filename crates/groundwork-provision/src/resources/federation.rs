//! Identity-federation provider and deployment-role resources
//!
//! Both are per-account. The provider is the trust anchor for the CI
//! token issuer; the role is assumable only through it and scoped to one
//! source repository. The policy documents are fixed text with the
//! account, issuer and repository substituted in.

use async_trait::async_trait;
use groundwork_cloud::AwsCli;
use std::time::Duration;

use crate::error::Result;
use crate::reconcile::{Health, Observation, Reconcile};

/// Client id the token issuer exchanges against.
pub const FEDERATION_CLIENT_ID: &str = "sts.amazonaws.com";

/// Fixed wait after creating identity resources. Propagation is
/// eventually consistent and exposes no reliable readiness probe, so the
/// pipeline inserts a deliberate delay instead of polling.
pub const IDENTITY_PROPAGATION_WAIT: Duration = Duration::from_secs(10);

/// Pinned issuer CA thumbprint.
pub const FEDERATION_THUMBPRINT: &str = "6938fd4d98bab03faadb97b34396831e3780aea1";

const DEPLOY_POLICY_NAME: &str = "deploy-permissions";

/// Per-account trust anchor for the external token issuer, identified by
/// issuer URL.
pub struct FederationProviderResource<'a> {
    aws: &'a AwsCli,
    issuer_url: String,
    issuer_host: String,
}

impl<'a> FederationProviderResource<'a> {
    pub fn new(aws: &'a AwsCli, issuer_url: impl Into<String>, issuer_host: impl Into<String>) -> Self {
        Self {
            aws,
            issuer_url: issuer_url.into(),
            issuer_host: issuer_host.into(),
        }
    }
}

#[async_trait]
impl Reconcile for FederationProviderResource<'_> {
    fn kind(&self) -> &'static str {
        "federation-provider"
    }

    fn display_name(&self) -> String {
        self.issuer_url.clone()
    }

    async fn probe(&self) -> Result<Option<Observation>> {
        let suffix = format!("oidc-provider/{}", self.issuer_host);
        let arns = self.aws.list_openid_provider_arns().await?;
        Ok(arns
            .into_iter()
            .find(|arn| arn.ends_with(&suffix))
            .map(|arn| Observation::new(arn.clone()).with_arn(arn)))
    }

    async fn create(&self) -> Result<Observation> {
        let arn = self
            .aws
            .create_openid_provider(&self.issuer_url, FEDERATION_CLIENT_ID, FEDERATION_THUMBPRINT)
            .await?;
        Ok(Observation::new(arn.clone()).with_arn(arn))
    }
}

/// Federated deployment role, named deterministically per environment.
/// When present, its trust document is verified and refreshed rather
/// than the role being recreated.
pub struct DeployRoleResource<'a> {
    aws: &'a AwsCli,
    role_name: String,
    account_id: String,
    issuer_host: String,
    repository: String,
}

impl<'a> DeployRoleResource<'a> {
    pub fn new(
        aws: &'a AwsCli,
        role_name: impl Into<String>,
        account_id: impl Into<String>,
        issuer_host: impl Into<String>,
        repository: impl Into<String>,
    ) -> Self {
        Self {
            aws,
            role_name: role_name.into(),
            account_id: account_id.into(),
            issuer_host: issuer_host.into(),
            repository: repository.into(),
        }
    }

    fn trust_policy(&self) -> String {
        trust_policy(&self.account_id, &self.issuer_host, &self.repository)
    }
}

#[async_trait]
impl Reconcile for DeployRoleResource<'_> {
    fn kind(&self) -> &'static str {
        "deployment-role"
    }

    fn display_name(&self) -> String {
        self.role_name.clone()
    }

    async fn probe(&self) -> Result<Option<Observation>> {
        let Some(role) = self.aws.get_role(&self.role_name).await? else {
            return Ok(None);
        };

        let mut obs = Observation::new(role.role_name).with_arn(role.arn);
        if let Some(trust) = role.assume_role_policy_document {
            obs = obs.with_attribute("trust_policy", trust.to_string());
        }
        Ok(Some(obs))
    }

    fn health(&self, obs: &Observation) -> Health {
        let claim = format!("repo:{}:", self.repository);
        match obs.attribute("trust_policy") {
            Some(trust) if trust.contains(&claim) && trust.contains(&self.issuer_host) => {
                Health::Healthy
            }
            Some(_) => Health::Degraded(
                "trust policy does not match the expected issuer and repository claim".to_string(),
            ),
            None => Health::Degraded("trust policy could not be read".to_string()),
        }
    }

    async fn repair(&self, _obs: &Observation) -> Result<()> {
        self.aws
            .update_assume_role_policy(&self.role_name, &self.trust_policy())
            .await?;
        self.aws
            .put_role_policy(&self.role_name, DEPLOY_POLICY_NAME, &deploy_permissions())
            .await?;
        Ok(())
    }

    async fn create(&self) -> Result<Observation> {
        let description = format!("Federated deployment role for {}", self.repository);
        let role = self
            .aws
            .create_role(&self.role_name, &self.trust_policy(), &description)
            .await?;
        self.aws
            .put_role_policy(&self.role_name, DEPLOY_POLICY_NAME, &deploy_permissions())
            .await?;
        Ok(Observation::new(role.role_name).with_arn(role.arn))
    }
}

fn trust_policy(account_id: &str, issuer_host: &str, repository: &str) -> String {
    serde_json::json!({
        "Version": "2012-10-17",
        "Statement": [{
            "Effect": "Allow",
            "Principal": {
                "Federated": format!("arn:aws:iam::{}:oidc-provider/{}", account_id, issuer_host)
            },
            "Action": "sts:AssumeRoleWithWebIdentity",
            "Condition": {
                "StringEquals": {
                    (format!("{}:aud", issuer_host)): FEDERATION_CLIENT_ID
                },
                "StringLike": {
                    (format!("{}:sub", issuer_host)): format!("repo:{}:*", repository)
                }
            }
        }]
    })
    .to_string()
}

fn deploy_permissions() -> String {
    serde_json::json!({
        "Version": "2012-10-17",
        "Statement": [{
            "Sid": "Deploy",
            "Effect": "Allow",
            "Action": "*",
            "Resource": "*"
        }]
    })
    .to_string()
}

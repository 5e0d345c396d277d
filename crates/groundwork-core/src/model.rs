//! Environment set and deterministic resource naming
//!
//! Every remote resource the engine touches is looked up by a natural key
//! derived here. The derivations are pure so that repeated runs, the
//! destroy path, and the verification pass all agree on what a resource
//! is called.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// Deployment environment backed by one member account each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Staging,
    Prod,
}

impl Environment {
    /// All environments in pipeline order.
    pub const ALL: [Environment; 3] = [Environment::Dev, Environment::Staging, Environment::Prod];

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Dev => "dev",
            Environment::Staging => "staging",
            Environment::Prod => "prod",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dev" => Ok(Environment::Dev),
            "staging" => Ok(Environment::Staging),
            "prod" => Ok(Environment::Prod),
            other => Err(CoreError::InvalidConfig(format!(
                "unknown environment '{}' (expected dev, staging or prod)",
                other
            ))),
        }
    }
}

/// Deterministic naming scheme shared by provisioning, destroy and verify.
pub mod naming {
    use super::Environment;

    /// Top-level organizational unit all project OUs live under.
    pub const WORKLOADS_OU: &str = "Workloads";

    /// Display name of the member account for an environment.
    pub fn account_name(project: &str, env: Environment) -> String {
        format!("{}-{}", project, env)
    }

    /// Contact email for the member account, plus-addressed from the
    /// configured base address. Doubles as the idempotent lookup key:
    /// account identifiers are only assigned once creation completes,
    /// the email is known up front.
    pub fn account_email(base: &str, project: &str, env: Environment) -> String {
        match base.split_once('@') {
            Some((local, domain)) => format!("{}+{}-{}@{}", local, project, env, domain),
            None => format!("{}+{}-{}", base, project, env),
        }
    }

    /// Email for a replacement account. The suffix keeps it from
    /// colliding with the unusable original, which retains its address.
    pub fn replacement_email(base: &str, project: &str, env: Environment, suffix: &str) -> String {
        match base.split_once('@') {
            Some((local, domain)) => {
                format!("{}+{}-{}-{}@{}", local, project, env, suffix, domain)
            }
            None => format!("{}+{}-{}-{}", base, project, env, suffix),
        }
    }

    /// Display name of a replacement account.
    pub fn replacement_name(project: &str, env: Environment, suffix: &str) -> String {
        format!("{}-{}-{}", project, env, suffix)
    }

    /// Federated deployment role assumed by CI.
    pub fn role_name(project: &str, env: Environment) -> String {
        format!("{}-{}-deploy", project, env)
    }

    /// State bucket. Carries the account id so the name stays globally
    /// unique across the bucket namespace.
    pub fn bucket_name(project: &str, env: Environment, account_id: &str) -> String {
        format!("{}-{}-state-{}", project, env, account_id)
    }

    /// Lock table backing the state bucket.
    pub fn lock_table_name(project: &str, env: Environment, account_id: &str) -> String {
        format!("{}-{}-locks-{}", project, env, account_id)
    }

    /// Encryption key alias. Matches the bucket name so the backend
    /// consistency check can pair them up.
    pub fn key_alias(bucket: &str) -> String {
        format!("alias/{}", bucket)
    }

    /// Object key the external deployment system stores its state under.
    pub fn state_key(project: &str, env: Environment) -> String {
        format!("{}/{}/terraform.tfstate", project, env)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_round_trip() {
        for env in Environment::ALL {
            assert_eq!(env.as_str().parse::<Environment>().unwrap(), env);
        }
        assert!("production".parse::<Environment>().is_err());
    }

    #[test]
    fn account_email_is_plus_addressed() {
        let email = naming::account_email("ops@example.com", "atlas", Environment::Dev);
        assert_eq!(email, "ops+atlas-dev@example.com");
    }

    #[test]
    fn replacement_identity_does_not_collide() {
        let original = naming::account_email("ops@example.com", "atlas", Environment::Prod);
        let replacement =
            naming::replacement_email("ops@example.com", "atlas", Environment::Prod, "20260807120000");
        assert_ne!(original, replacement);
        assert!(replacement.starts_with("ops+atlas-prod-"));
        assert_eq!(
            naming::replacement_name("atlas", Environment::Prod, "20260807120000"),
            "atlas-prod-20260807120000"
        );
    }

    #[test]
    fn backend_names_are_deterministic() {
        let bucket = naming::bucket_name("atlas", Environment::Staging, "123456789012");
        assert_eq!(bucket, "atlas-staging-state-123456789012");
        assert_eq!(
            naming::lock_table_name("atlas", Environment::Staging, "123456789012"),
            "atlas-staging-locks-123456789012"
        );
        assert_eq!(naming::key_alias(&bucket), "alias/atlas-staging-state-123456789012");
        assert_eq!(
            naming::state_key("atlas", Environment::Staging),
            "atlas/staging/terraform.tfstate"
        );
    }
}

//! Post-hoc verification
//!
//! Read-only pass over everything the pipeline provisions. Never
//! mutates; transport failures become failed findings rather than
//! errors so the caller can run this under warn policy.

use groundwork_cloud::{AccountStatus, AccountsApi, AwsCli, StorageApi};
use groundwork_core::{AccountRegistry, Environment, ProjectConfig, naming};

use crate::backend::BackendSpec;
use crate::error::Result;

#[derive(Debug)]
pub struct Finding {
    pub subject: String,
    pub ok: bool,
    pub detail: String,
}

impl Finding {
    fn passed(subject: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            ok: true,
            detail: detail.into(),
        }
    }

    fn failed(subject: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            ok: false,
            detail: detail.into(),
        }
    }
}

pub async fn verify_provisioning(
    aws: &AwsCli,
    config: &ProjectConfig,
    registry: &AccountRegistry,
) -> Result<Vec<Finding>> {
    let mut findings = Vec::new();

    match aws.describe_organization().await {
        Ok(Some(org)) => findings.push(Finding::passed("organization", org.id)),
        Ok(None) => findings.push(Finding::failed("organization", "not found")),
        Err(e) => findings.push(Finding::failed("organization", e.to_string())),
    }

    for env in Environment::ALL {
        let Some(account_id) = registry.account_id(env) else {
            findings.push(Finding::failed(
                format!("account/{}", env),
                "not recorded in the registry",
            ));
            continue;
        };

        match AccountsApi::account_status(aws, account_id).await {
            Ok(AccountStatus::Active) => {
                findings.push(Finding::passed(format!("account/{}", env), account_id))
            }
            Ok(status) => findings.push(Finding::failed(
                format!("account/{}", env),
                format!("{} is {}", account_id, status),
            )),
            Err(e) => findings.push(Finding::failed(format!("account/{}", env), e.to_string())),
        }

        let scoped = match aws.assume_role(account_id, &config.operator_role).await {
            Ok(scoped) => scoped,
            Err(e) => {
                findings.push(Finding::failed(
                    format!("access/{}", env),
                    format!("could not assume operator role: {}", e),
                ));
                continue;
            }
        };

        verify_account_resources(&scoped, config, env, account_id, &mut findings).await;
    }

    Ok(findings)
}

async fn verify_account_resources(
    scoped: &AwsCli,
    config: &ProjectConfig,
    env: Environment,
    account_id: &str,
    findings: &mut Vec<Finding>,
) {
    let provider_suffix = format!("oidc-provider/{}", config.issuer_host());
    match scoped.list_openid_provider_arns().await {
        Ok(arns) if arns.iter().any(|arn| arn.ends_with(&provider_suffix)) => {
            findings.push(Finding::passed(format!("federation/{}", env), config.issuer_host()))
        }
        Ok(_) => findings.push(Finding::failed(format!("federation/{}", env), "provider missing")),
        Err(e) => findings.push(Finding::failed(format!("federation/{}", env), e.to_string())),
    }

    let role_name = naming::role_name(&config.project, env);
    match scoped.get_role(&role_name).await {
        Ok(Some(role)) => findings.push(Finding::passed(format!("role/{}", env), role.arn)),
        Ok(None) => findings.push(Finding::failed(
            format!("role/{}", env),
            format!("{} missing", role_name),
        )),
        Err(e) => findings.push(Finding::failed(format!("role/{}", env), e.to_string())),
    }

    let spec = BackendSpec {
        project: config.project.clone(),
        environment: env,
        region: config.region.clone(),
        account_id: account_id.to_string(),
    };
    match scoped.bucket_region(&spec.bucket()).await {
        Ok(Some(region)) if region == spec.region => {
            findings.push(Finding::passed(format!("bucket/{}", env), spec.bucket()))
        }
        Ok(Some(region)) => findings.push(Finding::failed(
            format!("bucket/{}", env),
            format!("in region {}, expected {}", region, spec.region),
        )),
        Ok(None) => findings.push(Finding::failed(format!("bucket/{}", env), "missing")),
        Err(e) => findings.push(Finding::failed(format!("bucket/{}", env), e.to_string())),
    }
    match scoped.table_exists(&spec.table()).await {
        Ok(true) => findings.push(Finding::passed(format!("lock-table/{}", env), spec.table())),
        Ok(false) => findings.push(Finding::failed(format!("lock-table/{}", env), "missing")),
        Err(e) => findings.push(Finding::failed(format!("lock-table/{}", env), e.to_string())),
    }
    match scoped.find_key_by_alias(&spec.alias()).await {
        Ok(Some(key)) => findings.push(Finding::passed(format!("key/{}", env), key.arn)),
        Ok(None) => findings.push(Finding::failed(format!("key/{}", env), "missing")),
        Err(e) => findings.push(Finding::failed(format!("key/{}", env), e.to_string())),
    }
}

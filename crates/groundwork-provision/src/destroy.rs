//! Destroy path
//!
//! Approximate inverse of provisioning, in reverse dependency order:
//! backend sub-resources, then deployment roles, then federation
//! providers, then — explicitly gated — account closure. Buckets are
//! drained before deletion; keys are never deleted immediately, only
//! scheduled after the provider's minimum grace window; accounts that are
//! already suspended are skipped rather than attempted-and-failed.

use groundwork_cloud::{AccountStatus, AccountsApi, AwsCli, StorageApi};
use groundwork_core::{Environment, PollStep, RetryPolicy, poll_until};
use tracing::{debug, info, warn};

use crate::KEY_DELETION_WINDOW_DAYS;
use crate::backend::BackendSpec;
use crate::drain::delete_bucket_drained;
use crate::error::{ProvisionError, Result};

/// Fraction of the organization's accounts closable per invocation, the
/// provider's rolling-window cap, floored at its small-organization
/// minimum.
const CLOSE_CAP_PERCENT: usize = 10;
const CLOSE_CAP_MINIMUM: usize = 5;

/// Outcome counts for the gated closure sub-operation.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ClosureSummary {
    pub closed: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Remove one environment's backend sub-resources. Absent resources are
/// skipped; a drain failure is fatal. Returns warn-level notes.
pub async fn tear_down_backend<S: StorageApi + ?Sized>(
    storage: &S,
    spec: &BackendSpec,
    dry_run: bool,
) -> Result<Vec<String>> {
    let mut warnings = Vec::new();
    let bucket = spec.bucket();
    let table = spec.table();
    let alias = spec.alias();

    if storage.bucket_region(&bucket).await?.is_some() {
        delete_bucket_drained(storage, &bucket, dry_run).await?;
    } else {
        debug!(%bucket, "Bucket absent, nothing to drain");
    }

    if storage.table_exists(&table).await? {
        if dry_run {
            info!(%table, "dry-run: would delete lock table");
        } else {
            storage.delete_table(&table).await?;
            wait_for_table_removal(storage, &table).await?;
            info!(%table, "Lock table deleted");
        }
    }

    match storage.find_key_by_alias(&alias).await? {
        Some(key) if dry_run => {
            info!(%alias, key_id = %key.key_id, "dry-run: would remove alias and schedule key deletion");
        }
        Some(key) => {
            storage.delete_alias(&alias).await?;
            // Alias removal is immediate; the key itself only after the
            // mandatory grace window.
            if let Err(e) = storage
                .schedule_key_deletion(&key.key_id, KEY_DELETION_WINDOW_DAYS)
                .await
            {
                warn!(key_id = %key.key_id, error = %e, "Could not schedule key deletion");
                warnings.push(format!("key {} not scheduled for deletion: {}", key.key_id, e));
            } else {
                info!(key_id = %key.key_id, days = KEY_DELETION_WINDOW_DAYS,
                    "Key deletion scheduled");
            }
        }
        None => debug!(%alias, "Encryption key absent"),
    }

    Ok(warnings)
}

async fn wait_for_table_removal<S: StorageApi + ?Sized>(storage: &S, table: &str) -> Result<()> {
    let policy = RetryPolicy::removal();
    let outcome = poll_until(&policy, || async move {
        if storage.table_exists(table).await? {
            Ok::<_, ProvisionError>(PollStep::Pending)
        } else {
            Ok(PollStep::Ready(()))
        }
    })
    .await?;

    match outcome {
        groundwork_core::PollOutcome::Success(()) => Ok(()),
        groundwork_core::PollOutcome::Failed(reason) => Err(ProvisionError::InvalidState {
            what: format!("lock table {} deletion failed: {}", table, reason),
            remediation: "delete the table manually, then re-run `ground down`".to_string(),
        }),
        groundwork_core::PollOutcome::TimedOut { attempts } => Err(ProvisionError::Timeout {
            what: format!("removal of lock table {}", table),
            attempts,
        }),
    }
}

/// Remove an account's deployment role and federation provider, in that
/// order (the role trusts the provider). Absent resources are skipped.
pub async fn remove_federation(
    aws: &AwsCli,
    role_name: &str,
    issuer_host: &str,
    dry_run: bool,
) -> Result<()> {
    if dry_run {
        info!(role_name, issuer_host, "dry-run: would remove deployment role and federation provider");
        return Ok(());
    }

    if aws.get_role(role_name).await?.is_some() {
        for policy in aws.list_role_policies(role_name).await? {
            aws.delete_role_policy(role_name, &policy).await?;
        }
        aws.delete_role(role_name).await?;
        info!(role_name, "Deployment role removed");
    } else {
        debug!(role_name, "Deployment role absent");
    }

    let suffix = format!("oidc-provider/{}", issuer_host);
    let arns = aws.list_openid_provider_arns().await?;
    match arns.into_iter().find(|arn| arn.ends_with(&suffix)) {
        Some(arn) => {
            aws.delete_openid_provider(&arn).await?;
            info!(%arn, "Federation provider removed");
        }
        None => debug!(issuer_host, "Federation provider absent"),
    }

    Ok(())
}

/// Close member accounts, respecting the provider's rolling close-rate
/// cap. Accounts already suspended or pending closure are counted as
/// skipped; per-account failures do not abort the remainder.
pub async fn close_accounts<A: AccountsApi + ?Sized>(
    api: &A,
    targets: &[(Environment, String)],
    dry_run: bool,
) -> Result<ClosureSummary> {
    let mut summary = ClosureSummary::default();

    let total = api.list_accounts().await?.len();
    let cap = (total * CLOSE_CAP_PERCENT / 100).max(CLOSE_CAP_MINIMUM);

    for (env, id) in targets {
        let status = api.account_status(id).await?;
        match status {
            AccountStatus::Suspended | AccountStatus::PendingClosure => {
                debug!(%env, id, %status, "Account already unusable, skipping closure");
                summary.skipped += 1;
            }
            AccountStatus::Unknown => {
                warn!(%env, id, "Account status unknown, skipping closure");
                summary.skipped += 1;
            }
            AccountStatus::Active => {
                if summary.closed >= cap {
                    warn!(%env, id, cap, "Close-rate cap reached, skipping closure");
                    summary.skipped += 1;
                    continue;
                }
                if dry_run {
                    info!(%env, id, "dry-run: would close account");
                    summary.skipped += 1;
                    continue;
                }
                match api.close_account(id).await {
                    Ok(()) => {
                        info!(%env, id, "Account closure requested");
                        summary.closed += 1;
                    }
                    Err(e) => {
                        warn!(%env, id, error = %e, "Account closure failed");
                        summary.failed += 1;
                    }
                }
            }
        }
    }

    Ok(summary)
}

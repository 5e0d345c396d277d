//! Member-account lifecycle
//!
//! State machine over remote account status. A recorded identifier is
//! reused only while the account is usable; an unusable account is
//! replaced by adoption of an active sibling or by a fresh account with a
//! timestamp-suffixed identity. Creation is asynchronous and polled to a
//! terminal state with a bounded attempt count.

use chrono::Utc;
use groundwork_cloud::{AccountStatus, AccountsApi, CreationState};
use groundwork_core::{Environment, PollOutcome, PollStep, RetryPolicy, naming, poll_until};
use tracing::{debug, info, warn};

use crate::error::{ProvisionError, Result};

/// Identity the environment's account should carry.
#[derive(Debug, Clone)]
pub struct DesiredAccount {
    pub project: String,
    pub environment: Environment,
    pub base_email: String,
}

impl DesiredAccount {
    pub fn name(&self) -> String {
        naming::account_name(&self.project, self.environment)
    }

    pub fn email(&self) -> String {
        naming::account_email(&self.base_email, &self.project, self.environment)
    }

    fn replacement(&self, suffix: &str) -> (String, String) {
        (
            naming::replacement_name(&self.project, self.environment, suffix),
            naming::replacement_email(&self.base_email, &self.project, self.environment, suffix),
        )
    }
}

/// How the account for an environment was resolved.
#[derive(Debug)]
pub enum AccountOutcome {
    /// Recorded identifier probed `ACTIVE` and reused as-is.
    Reused { id: String },
    /// Located by natural key or adopted after a conflict.
    Found { id: String },
    Adopted { id: String },
    Created { id: String },
    /// Unusable recorded account superseded by a fresh one.
    Replaced { id: String, replaced: String },
    WouldCreate,
}

impl AccountOutcome {
    pub fn account_id(&self) -> Option<&str> {
        match self {
            AccountOutcome::Reused { id }
            | AccountOutcome::Found { id }
            | AccountOutcome::Adopted { id }
            | AccountOutcome::Created { id }
            | AccountOutcome::Replaced { id, .. } => Some(id),
            AccountOutcome::WouldCreate => None,
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            AccountOutcome::Reused { .. } => "reused",
            AccountOutcome::Found { .. } => "found",
            AccountOutcome::Adopted { .. } => "adopted",
            AccountOutcome::Created { .. } => "created",
            AccountOutcome::Replaced { .. } => "replaced",
            AccountOutcome::WouldCreate => "would create",
        }
    }
}

pub struct AccountLifecycleManager<'a, A: AccountsApi + ?Sized> {
    api: &'a A,
    policy: RetryPolicy,
}

impl<'a, A: AccountsApi + ?Sized> AccountLifecycleManager<'a, A> {
    pub fn new(api: &'a A) -> Self {
        Self {
            api,
            policy: RetryPolicy::account_creation(),
        }
    }

    pub fn with_policy(api: &'a A, policy: RetryPolicy) -> Self {
        Self { api, policy }
    }

    /// Converge one environment toward a usable member account.
    pub async fn ensure_account(
        &self,
        desired: &DesiredAccount,
        recorded: Option<&str>,
        dry_run: bool,
    ) -> Result<AccountOutcome> {
        let name = desired.name();
        let email = desired.email();

        if dry_run {
            info!(env = %desired.environment, %name, "dry-run: would ensure member account");
            return Ok(AccountOutcome::WouldCreate);
        }

        if let Some(id) = recorded {
            return self.from_recorded(desired, id, &name).await;
        }

        // No recorded identifier: the contact email is the natural key.
        if let Some(found) = self.api.find_account_by_email(&email).await? {
            match found.status {
                AccountStatus::Active => {
                    debug!(env = %desired.environment, id = %found.id, "Account found by email");
                    return Ok(AccountOutcome::Found { id: found.id });
                }
                AccountStatus::Suspended | AccountStatus::PendingClosure => {
                    warn!(id = %found.id, status = %found.status, "Account with desired email is unusable");
                    return self.adopt_or_replace(desired, &name, &found.id).await;
                }
                AccountStatus::Unknown => return Err(unknown_status(&found.id)),
            }
        }

        match self.create_and_wait(&name, &email).await {
            Ok(id) => Ok(AccountOutcome::Created { id }),
            Err(e) if is_identity_conflict(&e) => {
                debug!(%name, "Account creation conflicted, searching by name prefix");
                match self.api.find_active_by_name_prefix(&name).await? {
                    Some(found) => Ok(AccountOutcome::Adopted { id: found.id }),
                    None => Err(ProvisionError::Conflict {
                        kind: "member-account",
                        name,
                        detail: e.to_string(),
                    }),
                }
            }
            Err(e) => Err(e),
        }
    }

    async fn from_recorded(
        &self,
        desired: &DesiredAccount,
        id: &str,
        name: &str,
    ) -> Result<AccountOutcome> {
        match self.api.account_status(id).await? {
            AccountStatus::Active => {
                debug!(env = %desired.environment, id, "Recorded account is active");
                Ok(AccountOutcome::Reused { id: id.to_string() })
            }
            status @ (AccountStatus::Suspended | AccountStatus::PendingClosure) => {
                warn!(id, %status, "Recorded account is unusable");
                self.adopt_or_replace(desired, name, id).await
            }
            AccountStatus::Unknown => Err(unknown_status(id)),
        }
    }

    /// An unusable account is never reused: prefer any active sibling
    /// matching the naming pattern (covers manual recovery), otherwise
    /// create a replacement whose identity cannot collide with the
    /// original.
    async fn adopt_or_replace(
        &self,
        desired: &DesiredAccount,
        name: &str,
        unusable_id: &str,
    ) -> Result<AccountOutcome> {
        if let Some(found) = self.api.find_active_by_name_prefix(name).await?
            && found.id != unusable_id
        {
            info!(id = %found.id, name = %found.name, "Adopting active sibling account");
            return Ok(AccountOutcome::Adopted { id: found.id });
        }

        let suffix = Utc::now().format("%Y%m%d%H%M%S").to_string();
        let (replacement_name, replacement_email) = desired.replacement(&suffix);
        info!(%replacement_name, "Creating replacement account");
        let id = self
            .create_and_wait(&replacement_name, &replacement_email)
            .await?;
        Ok(AccountOutcome::Replaced {
            id,
            replaced: unusable_id.to_string(),
        })
    }

    async fn create_and_wait(&self, name: &str, email: &str) -> Result<String> {
        let request_id = self.api.create_account(name, email).await?;
        info!(%name, %request_id, "Account creation requested, polling");

        let outcome = poll_until(&self.policy, || {
            let api = self.api;
            let request_id = request_id.clone();
            async move {
                let state = api.creation_status(&request_id).await?;
                Ok::<_, ProvisionError>(match state {
                    CreationState::InProgress => PollStep::Pending,
                    CreationState::Succeeded { account_id } => PollStep::Ready(account_id),
                    CreationState::Failed { reason } => PollStep::Failed(reason),
                })
            }
        })
        .await?;

        match outcome {
            PollOutcome::Success(account_id) => {
                info!(%name, %account_id, "Account creation succeeded");
                Ok(account_id)
            }
            PollOutcome::Failed(reason) => Err(ProvisionError::AccountCreationFailed {
                name: name.to_string(),
                reason,
            }),
            PollOutcome::TimedOut { attempts } => Err(ProvisionError::Timeout {
                what: format!("creation of account '{}'", name),
                attempts,
            }),
        }
    }

    /// Park the account under the project OU; a no-op when already there.
    pub async fn place_in_ou(&self, account_id: &str, ou_id: &str) -> Result<()> {
        self.api.move_to_parent(account_id, ou_id).await?;
        Ok(())
    }

    /// Independent confirmation that every target account is `ACTIVE`.
    /// Downstream federation and backend stages assume usable accounts,
    /// so one bad account fails the whole pipeline here.
    pub async fn confirm_all_active(&self, targets: &[(Environment, String)]) -> Result<()> {
        for (env, id) in targets {
            let status = self.api.account_status(id).await?;
            if !status.is_usable() {
                return Err(ProvisionError::InvalidState {
                    what: format!("account {} for environment {} is {}", id, env, status),
                    remediation: format!(
                        "restore the account or remove the {} entry from .groundwork/accounts.json, then re-run `ground up`",
                        env
                    ),
                });
            }
            debug!(%env, id, "Account confirmed active");
        }
        Ok(())
    }
}

fn unknown_status(id: &str) -> ProvisionError {
    ProvisionError::InvalidState {
        what: format!("status of account {} could not be determined", id),
        remediation: "inspect the account in the organization console and correct .groundwork/accounts.json, then re-run `ground up`".to_string(),
    }
}

fn is_identity_conflict(e: &ProvisionError) -> bool {
    match e {
        ProvisionError::Cloud(cloud) => cloud.is_conflict(),
        ProvisionError::AccountCreationFailed { reason, .. } => reason.contains("ALREADY_EXISTS"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::FakeAccounts;
    use groundwork_cloud::AccountSummary;
    use std::time::Duration;

    fn desired() -> DesiredAccount {
        DesiredAccount {
            project: "atlas".to_string(),
            environment: Environment::Dev,
            base_email: "ops@example.com".to_string(),
        }
    }

    fn manager(api: &FakeAccounts) -> AccountLifecycleManager<'_, FakeAccounts> {
        AccountLifecycleManager::with_policy(api, RetryPolicy::new(3, Duration::ZERO))
    }

    fn active(id: &str, name: &str, email: &str) -> AccountSummary {
        AccountSummary {
            id: id.to_string(),
            name: name.to_string(),
            email: email.to_string(),
            status: AccountStatus::Active,
        }
    }

    #[tokio::test]
    async fn recorded_active_account_is_reused() {
        let api = FakeAccounts::default();
        api.insert(active("111", "atlas-dev", "ops+atlas-dev@example.com"));

        let outcome = manager(&api)
            .ensure_account(&desired(), Some("111"), false)
            .await
            .unwrap();
        assert!(matches!(outcome, AccountOutcome::Reused { ref id } if id == "111"));
        assert!(api.created().is_empty());
    }

    #[tokio::test]
    async fn suspended_account_adopts_active_sibling() {
        let api = FakeAccounts::default();
        api.insert(AccountSummary {
            status: AccountStatus::Suspended,
            ..active("111", "atlas-dev", "ops+atlas-dev@example.com")
        });
        api.insert(active(
            "222",
            "atlas-dev-20250101000000",
            "ops+atlas-dev-20250101000000@example.com",
        ));

        let outcome = manager(&api)
            .ensure_account(&desired(), Some("111"), false)
            .await
            .unwrap();
        assert!(matches!(outcome, AccountOutcome::Adopted { ref id } if id == "222"));
        assert!(api.created().is_empty());
    }

    #[tokio::test]
    async fn suspended_account_without_sibling_is_replaced() {
        let api = FakeAccounts::default();
        api.insert(AccountSummary {
            status: AccountStatus::Suspended,
            ..active("111", "atlas-dev", "ops+atlas-dev@example.com")
        });

        let outcome = manager(&api)
            .ensure_account(&desired(), Some("111"), false)
            .await
            .unwrap();

        let AccountOutcome::Replaced { id, replaced } = outcome else {
            panic!("expected replacement, got {:?}", outcome);
        };
        assert_eq!(replaced, "111");
        assert_ne!(id, "111");

        let created = api.created();
        assert_eq!(created.len(), 1);
        let (name, email) = &created[0];
        assert!(name.starts_with("atlas-dev-"));
        assert!(name.len() > "atlas-dev-".len());
        assert!(email.starts_with("ops+atlas-dev-"));
    }

    #[tokio::test]
    async fn unknown_status_blocks() {
        let api = FakeAccounts::default();
        // recorded id the fake knows nothing about → Unknown

        let err = manager(&api)
            .ensure_account(&desired(), Some("111"), false)
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::InvalidState { .. }));
        assert!(api.created().is_empty());
    }

    #[tokio::test]
    async fn fresh_environment_finds_account_by_email() {
        let api = FakeAccounts::default();
        api.insert(active("333", "atlas-dev", "ops+atlas-dev@example.com"));

        let outcome = manager(&api)
            .ensure_account(&desired(), None, false)
            .await
            .unwrap();
        assert!(matches!(outcome, AccountOutcome::Found { ref id } if id == "333"));
        assert!(api.created().is_empty());
    }

    #[tokio::test]
    async fn fresh_environment_creates_and_polls_to_completion() {
        let api = FakeAccounts::default();
        api.queue_creation_states([
            CreationState::InProgress,
            CreationState::Succeeded {
                account_id: "444".to_string(),
            },
        ]);

        let outcome = manager(&api)
            .ensure_account(&desired(), None, false)
            .await
            .unwrap();
        assert!(matches!(outcome, AccountOutcome::Created { ref id } if id == "444"));
        assert_eq!(api.created().len(), 1);
    }

    #[tokio::test]
    async fn creation_poll_times_out_fatally() {
        let api = FakeAccounts::default();
        api.always_in_progress();

        let err = manager(&api)
            .ensure_account(&desired(), None, false)
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::Timeout { attempts: 3, .. }));
    }

    #[tokio::test]
    async fn creation_conflict_adopts_by_name_prefix() {
        let api = FakeAccounts::default();
        api.fail_create_with_conflict();
        api.insert(active("555", "atlas-dev", "other+atlas-dev@example.com"));

        let outcome = manager(&api)
            .ensure_account(&desired(), None, false)
            .await
            .unwrap();
        assert!(matches!(outcome, AccountOutcome::Adopted { ref id } if id == "555"));
    }

    #[tokio::test]
    async fn creation_conflict_without_match_is_fatal() {
        let api = FakeAccounts::default();
        api.fail_create_with_conflict();

        let err = manager(&api)
            .ensure_account(&desired(), None, false)
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::Conflict { kind: "member-account", .. }));
    }

    #[tokio::test]
    async fn dry_run_makes_no_calls() {
        let api = FakeAccounts::default();
        let outcome = manager(&api)
            .ensure_account(&desired(), Some("111"), true)
            .await
            .unwrap();
        assert!(matches!(outcome, AccountOutcome::WouldCreate));
        assert!(api.created().is_empty());
        assert_eq!(api.status_probes(), 0);
    }

    #[tokio::test]
    async fn confirm_all_active_fails_fast_on_unusable_account() {
        let api = FakeAccounts::default();
        api.insert(active("111", "atlas-dev", "ops+atlas-dev@example.com"));
        api.insert(AccountSummary {
            status: AccountStatus::PendingClosure,
            ..active("222", "atlas-staging", "ops+atlas-staging@example.com")
        });

        let manager = manager(&api);
        let targets = vec![
            (Environment::Dev, "111".to_string()),
            (Environment::Staging, "222".to_string()),
        ];
        let err = manager.confirm_all_active(&targets).await.unwrap_err();
        assert!(matches!(err, ProvisionError::InvalidState { .. }));

        let ok_targets = vec![(Environment::Dev, "111".to_string())];
        manager.confirm_all_active(&ok_targets).await.unwrap();
    }
}

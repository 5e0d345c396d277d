//! Capability traits consumed by the provisioning engine
//!
//! Narrow seams over the adapter: member-account lifecycle operations and
//! the state-storage operations. The engine is generic over these traits;
//! tests substitute in-memory fakes.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::aws::AwsCli;
use crate::error::Result;

/// Lifecycle status of a member account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountStatus {
    Active,
    Suspended,
    PendingClosure,
    /// Status could not be determined. Blocking, never "proceed anyway".
    Unknown,
}

impl AccountStatus {
    pub fn from_api(s: &str) -> Self {
        match s {
            "ACTIVE" => AccountStatus::Active,
            "SUSPENDED" => AccountStatus::Suspended,
            "PENDING_CLOSURE" => AccountStatus::PendingClosure,
            _ => AccountStatus::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Active => "ACTIVE",
            AccountStatus::Suspended => "SUSPENDED",
            AccountStatus::PendingClosure => "PENDING_CLOSURE",
            AccountStatus::Unknown => "UNKNOWN",
        }
    }

    /// An account in this state still holds reachable resources.
    pub fn is_usable(&self) -> bool {
        matches!(self, AccountStatus::Active)
    }
}

impl std::fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct AccountSummary {
    pub id: String,
    pub name: String,
    pub email: String,
    pub status: AccountStatus,
}

/// Progress of an asynchronous account-creation request.
#[derive(Debug, Clone)]
pub enum CreationState {
    InProgress,
    Succeeded { account_id: String },
    Failed { reason: String },
}

/// Member-account lifecycle operations.
#[async_trait]
pub trait AccountsApi: Send + Sync {
    async fn account_status(&self, account_id: &str) -> Result<AccountStatus>;

    async fn find_account_by_email(&self, email: &str) -> Result<Option<AccountSummary>>;

    async fn find_active_by_name_prefix(&self, prefix: &str) -> Result<Option<AccountSummary>>;

    async fn list_accounts(&self) -> Result<Vec<AccountSummary>>;

    /// Start asynchronous creation; returns the request id to poll.
    async fn create_account(&self, name: &str, email: &str) -> Result<String>;

    async fn creation_status(&self, request_id: &str) -> Result<CreationState>;

    /// Move an account under `parent_id`, a no-op when already there.
    async fn move_to_parent(&self, account_id: &str, parent_id: &str) -> Result<()>;

    async fn close_account(&self, account_id: &str) -> Result<()>;
}

/// One object version or delete marker.
#[derive(Debug, Clone)]
pub struct ObjectVersionRef {
    pub key: String,
    pub version_id: String,
}

/// One page of the version listing.
#[derive(Debug, Clone, Default)]
pub struct ObjectVersionPage {
    pub versions: Vec<ObjectVersionRef>,
    pub delete_markers: Vec<ObjectVersionRef>,
    pub next_token: Option<String>,
}

/// Encryption key reference.
#[derive(Debug, Clone)]
pub struct KeyHandle {
    pub key_id: String,
    pub arn: String,
}

/// State-backend storage operations (bucket, lock table, key).
#[async_trait]
pub trait StorageApi: Send + Sync {
    /// Region the bucket lives in, `None` when it does not exist.
    async fn bucket_region(&self, bucket: &str) -> Result<Option<String>>;

    async fn create_bucket(&self, bucket: &str) -> Result<()>;

    async fn enable_versioning(&self, bucket: &str) -> Result<()>;

    async fn block_public_access(&self, bucket: &str) -> Result<()>;

    async fn enable_encryption(&self, bucket: &str, key_arn: &str) -> Result<()>;

    async fn list_object_versions(
        &self,
        bucket: &str,
        starting_token: Option<&str>,
    ) -> Result<ObjectVersionPage>;

    async fn delete_object_version(&self, bucket: &str, key: &str, version_id: &str) -> Result<()>;

    async fn delete_bucket(&self, bucket: &str) -> Result<()>;

    async fn table_exists(&self, table: &str) -> Result<bool>;

    async fn create_table(&self, table: &str) -> Result<()>;

    async fn delete_table(&self, table: &str) -> Result<()>;

    async fn find_key_by_alias(&self, alias: &str) -> Result<Option<KeyHandle>>;

    async fn create_key(&self, alias: &str, description: &str) -> Result<KeyHandle>;

    async fn delete_alias(&self, alias: &str) -> Result<()>;

    async fn schedule_key_deletion(&self, key_id: &str, pending_days: u32) -> Result<()>;
}

#[async_trait]
impl AccountsApi for AwsCli {
    async fn account_status(&self, account_id: &str) -> Result<AccountStatus> {
        match self.describe_org_account(account_id).await {
            Ok(account) => Ok(AccountStatus::from_api(&account.status)),
            // A recorded id the organization no longer knows about.
            Err(e) if e.is_not_found() => Ok(AccountStatus::Unknown),
            Err(e) => Err(e),
        }
    }

    async fn find_account_by_email(&self, email: &str) -> Result<Option<AccountSummary>> {
        let accounts = self.list_org_accounts().await?;
        Ok(accounts
            .into_iter()
            .find(|a| a.email.eq_ignore_ascii_case(email))
            .map(|a| AccountSummary {
                status: AccountStatus::from_api(&a.status),
                id: a.id,
                name: a.name,
                email: a.email,
            }))
    }

    async fn find_active_by_name_prefix(&self, prefix: &str) -> Result<Option<AccountSummary>> {
        let accounts = self.list_org_accounts().await?;
        Ok(accounts
            .into_iter()
            .filter(|a| AccountStatus::from_api(&a.status) == AccountStatus::Active)
            .find(|a| a.name.starts_with(prefix))
            .map(|a| AccountSummary {
                status: AccountStatus::Active,
                id: a.id,
                name: a.name,
                email: a.email,
            }))
    }

    async fn list_accounts(&self) -> Result<Vec<AccountSummary>> {
        let accounts = self.list_org_accounts().await?;
        Ok(accounts
            .into_iter()
            .map(|a| AccountSummary {
                status: AccountStatus::from_api(&a.status),
                id: a.id,
                name: a.name,
                email: a.email,
            })
            .collect())
    }

    async fn create_account(&self, name: &str, email: &str) -> Result<String> {
        let envelope: CreateAccountStatusEnvelope = self
            .run_json(&[
                "organizations",
                "create-account",
                "--account-name",
                name,
                "--email",
                email,
            ])
            .await?;
        debug!(request_id = %envelope.status.id, name, "Requested account creation");
        Ok(envelope.status.id)
    }

    async fn creation_status(&self, request_id: &str) -> Result<CreationState> {
        let envelope: CreateAccountStatusEnvelope = self
            .run_json(&[
                "organizations",
                "describe-create-account-status",
                "--create-account-request-id",
                request_id,
            ])
            .await?;

        let status = envelope.status;
        Ok(match status.state.as_str() {
            "SUCCEEDED" => match status.account_id {
                Some(account_id) => CreationState::Succeeded { account_id },
                None => CreationState::Failed {
                    reason: "creation succeeded but no account id was reported".to_string(),
                },
            },
            "FAILED" => CreationState::Failed {
                reason: status
                    .failure_reason
                    .unwrap_or_else(|| "unreported failure".to_string()),
            },
            _ => CreationState::InProgress,
        })
    }

    async fn move_to_parent(&self, account_id: &str, parent_id: &str) -> Result<()> {
        let envelope: ParentsEnvelope = self
            .run_json(&["organizations", "list-parents", "--child-id", account_id])
            .await?;
        let Some(current) = envelope.parents.first() else {
            return Ok(());
        };
        if current.id == parent_id {
            return Ok(());
        }

        self.run(&[
            "organizations",
            "move-account",
            "--account-id",
            account_id,
            "--source-parent-id",
            &current.id,
            "--destination-parent-id",
            parent_id,
        ])
        .await?;
        debug!(account_id, parent_id, "Moved account");
        Ok(())
    }

    async fn close_account(&self, account_id: &str) -> Result<()> {
        self.run(&["organizations", "close-account", "--account-id", account_id])
            .await?;
        Ok(())
    }
}

#[async_trait]
impl StorageApi for AwsCli {
    async fn bucket_region(&self, bucket: &str) -> Result<Option<String>> {
        match self
            .run_json::<BucketLocation>(&["s3api", "get-bucket-location", "--bucket", bucket])
            .await
        {
            // The legacy API reports the original region as null.
            Ok(location) => Ok(Some(
                location
                    .location_constraint
                    .unwrap_or_else(|| "us-east-1".to_string()),
            )),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn create_bucket(&self, bucket: &str) -> Result<()> {
        if self.region() == "us-east-1" {
            self.run(&["s3api", "create-bucket", "--bucket", bucket])
                .await?;
        } else {
            let location = format!("LocationConstraint={}", self.region());
            self.run(&[
                "s3api",
                "create-bucket",
                "--bucket",
                bucket,
                "--create-bucket-configuration",
                &location,
            ])
            .await?;
        }
        Ok(())
    }

    async fn enable_versioning(&self, bucket: &str) -> Result<()> {
        self.run(&[
            "s3api",
            "put-bucket-versioning",
            "--bucket",
            bucket,
            "--versioning-configuration",
            "Status=Enabled",
        ])
        .await?;
        Ok(())
    }

    async fn block_public_access(&self, bucket: &str) -> Result<()> {
        self.run(&[
            "s3api",
            "put-public-access-block",
            "--bucket",
            bucket,
            "--public-access-block-configuration",
            "BlockPublicAcls=true,IgnorePublicAcls=true,BlockPublicPolicy=true,RestrictPublicBuckets=true",
        ])
        .await?;
        Ok(())
    }

    async fn enable_encryption(&self, bucket: &str, key_arn: &str) -> Result<()> {
        let config = serde_json::json!({
            "Rules": [{
                "ApplyServerSideEncryptionByDefault": {
                    "SSEAlgorithm": "aws:kms",
                    "KMSMasterKeyID": key_arn,
                },
                "BucketKeyEnabled": true,
            }]
        })
        .to_string();

        self.run(&[
            "s3api",
            "put-bucket-encryption",
            "--bucket",
            bucket,
            "--server-side-encryption-configuration",
            &config,
        ])
        .await?;
        Ok(())
    }

    async fn list_object_versions(
        &self,
        bucket: &str,
        starting_token: Option<&str>,
    ) -> Result<ObjectVersionPage> {
        let mut args = vec![
            "s3api",
            "list-object-versions",
            "--bucket",
            bucket,
            "--max-items",
            "500",
        ];
        if let Some(token) = starting_token {
            args.push("--starting-token");
            args.push(token);
        }

        // An empty listing produces no output at all.
        let output = self.run(&args).await?;
        if output.trim().is_empty() {
            return Ok(ObjectVersionPage::default());
        }

        let listing: VersionListing = serde_json::from_str(&output)
            .map_err(|e| crate::error::CloudError::InvalidResponse(e.to_string()))?;
        Ok(ObjectVersionPage {
            versions: listing.versions.into_iter().map(Into::into).collect(),
            delete_markers: listing.delete_markers.into_iter().map(Into::into).collect(),
            next_token: listing.next_token,
        })
    }

    async fn delete_object_version(&self, bucket: &str, key: &str, version_id: &str) -> Result<()> {
        self.run(&[
            "s3api",
            "delete-object",
            "--bucket",
            bucket,
            "--key",
            key,
            "--version-id",
            version_id,
        ])
        .await?;
        Ok(())
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<()> {
        self.run(&["s3api", "delete-bucket", "--bucket", bucket])
            .await?;
        Ok(())
    }

    async fn table_exists(&self, table: &str) -> Result<bool> {
        match self
            .run(&["dynamodb", "describe-table", "--table-name", table])
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn create_table(&self, table: &str) -> Result<()> {
        self.run(&[
            "dynamodb",
            "create-table",
            "--table-name",
            table,
            "--attribute-definitions",
            "AttributeName=LockID,AttributeType=S",
            "--key-schema",
            "AttributeName=LockID,KeyType=HASH",
            "--billing-mode",
            "PAY_PER_REQUEST",
        ])
        .await?;
        Ok(())
    }

    async fn delete_table(&self, table: &str) -> Result<()> {
        self.run(&["dynamodb", "delete-table", "--table-name", table])
            .await?;
        Ok(())
    }

    async fn find_key_by_alias(&self, alias: &str) -> Result<Option<KeyHandle>> {
        let envelope: AliasesEnvelope = self.run_json(&["kms", "list-aliases"]).await?;
        let Some(found) = envelope
            .aliases
            .into_iter()
            .find(|a| a.alias_name == alias && a.target_key_id.is_some())
        else {
            return Ok(None);
        };

        let key_id = found.target_key_id.unwrap_or_default();
        let described: KeyMetadataEnvelope = self
            .run_json(&["kms", "describe-key", "--key-id", &key_id])
            .await?;
        Ok(Some(KeyHandle {
            key_id: described.key_metadata.key_id,
            arn: described.key_metadata.arn,
        }))
    }

    async fn create_key(&self, alias: &str, description: &str) -> Result<KeyHandle> {
        let envelope: KeyMetadataEnvelope = self
            .run_json(&["kms", "create-key", "--description", description])
            .await?;
        let handle = KeyHandle {
            key_id: envelope.key_metadata.key_id,
            arn: envelope.key_metadata.arn,
        };

        self.run(&[
            "kms",
            "create-alias",
            "--alias-name",
            alias,
            "--target-key-id",
            &handle.key_id,
        ])
        .await?;
        debug!(alias, key_id = %handle.key_id, "Created encryption key");
        Ok(handle)
    }

    async fn delete_alias(&self, alias: &str) -> Result<()> {
        self.run(&["kms", "delete-alias", "--alias-name", alias])
            .await?;
        Ok(())
    }

    async fn schedule_key_deletion(&self, key_id: &str, pending_days: u32) -> Result<()> {
        let days = pending_days.to_string();
        self.run(&[
            "kms",
            "schedule-key-deletion",
            "--key-id",
            key_id,
            "--pending-window-in-days",
            &days,
        ])
        .await?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct CreateAccountStatusEnvelope {
    #[serde(rename = "CreateAccountStatus")]
    status: CreateAccountStatusBody,
}

#[derive(Debug, Deserialize)]
struct CreateAccountStatusBody {
    #[serde(rename = "Id")]
    id: String,

    #[serde(rename = "State")]
    state: String,

    #[serde(rename = "AccountId")]
    account_id: Option<String>,

    #[serde(rename = "FailureReason")]
    failure_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ParentsEnvelope {
    #[serde(rename = "Parents")]
    parents: Vec<ParentRef>,
}

#[derive(Debug, Deserialize)]
struct ParentRef {
    #[serde(rename = "Id")]
    id: String,
}

#[derive(Debug, Deserialize)]
struct BucketLocation {
    #[serde(rename = "LocationConstraint")]
    location_constraint: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct VersionListing {
    #[serde(rename = "Versions", default)]
    versions: Vec<VersionEntry>,

    #[serde(rename = "DeleteMarkers", default)]
    delete_markers: Vec<VersionEntry>,

    #[serde(rename = "NextToken")]
    next_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VersionEntry {
    #[serde(rename = "Key")]
    key: String,

    #[serde(rename = "VersionId")]
    version_id: String,
}

impl From<VersionEntry> for ObjectVersionRef {
    fn from(entry: VersionEntry) -> Self {
        Self {
            key: entry.key,
            version_id: entry.version_id,
        }
    }
}

#[derive(Debug, Deserialize)]
struct AliasesEnvelope {
    #[serde(rename = "Aliases")]
    aliases: Vec<AliasEntry>,
}

#[derive(Debug, Deserialize)]
struct AliasEntry {
    #[serde(rename = "AliasName")]
    alias_name: String,

    #[serde(rename = "TargetKeyId")]
    target_key_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct KeyMetadataEnvelope {
    #[serde(rename = "KeyMetadata")]
    key_metadata: KeyMetadataBody,
}

#[derive(Debug, Deserialize)]
struct KeyMetadataBody {
    #[serde(rename = "KeyId")]
    key_id: String,

    #[serde(rename = "Arn")]
    arn: String,
}

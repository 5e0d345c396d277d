//! State-backend storage resources
//!
//! Bucket, lock table and encryption key, all looked up by deterministic
//! name rather than tags. Generic over [`StorageApi`] so the backend
//! provisioner and its tests run against the same code.

use async_trait::async_trait;
use groundwork_cloud::StorageApi;

use crate::error::Result;
use crate::reconcile::{Observation, Reconcile};

/// Versioned object-storage bucket holding deployment state.
pub struct StateBucketResource<'a, S: StorageApi + ?Sized> {
    storage: &'a S,
    bucket: String,
}

impl<'a, S: StorageApi + ?Sized> StateBucketResource<'a, S> {
    pub fn new(storage: &'a S, bucket: impl Into<String>) -> Self {
        Self {
            storage,
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl<S: StorageApi + ?Sized> Reconcile for StateBucketResource<'_, S> {
    fn kind(&self) -> &'static str {
        "state-bucket"
    }

    fn display_name(&self) -> String {
        self.bucket.clone()
    }

    async fn probe(&self) -> Result<Option<Observation>> {
        Ok(self
            .storage
            .bucket_region(&self.bucket)
            .await?
            .map(|region| Observation::new(&self.bucket).with_attribute("region", region)))
    }

    async fn create(&self) -> Result<Observation> {
        self.storage.create_bucket(&self.bucket).await?;
        Ok(Observation::new(&self.bucket))
    }
}

/// Lock table paired with the bucket.
pub struct LockTableResource<'a, S: StorageApi + ?Sized> {
    storage: &'a S,
    table: String,
}

impl<'a, S: StorageApi + ?Sized> LockTableResource<'a, S> {
    pub fn new(storage: &'a S, table: impl Into<String>) -> Self {
        Self {
            storage,
            table: table.into(),
        }
    }
}

#[async_trait]
impl<S: StorageApi + ?Sized> Reconcile for LockTableResource<'_, S> {
    fn kind(&self) -> &'static str {
        "lock-table"
    }

    fn display_name(&self) -> String {
        self.table.clone()
    }

    async fn probe(&self) -> Result<Option<Observation>> {
        Ok(self
            .storage
            .table_exists(&self.table)
            .await?
            .then(|| Observation::new(&self.table)))
    }

    async fn create(&self) -> Result<Observation> {
        self.storage.create_table(&self.table).await?;
        Ok(Observation::new(&self.table))
    }
}

/// Encryption key, addressed through its bucket-matching alias.
pub struct EncryptionKeyResource<'a, S: StorageApi + ?Sized> {
    storage: &'a S,
    alias: String,
    description: String,
}

impl<'a, S: StorageApi + ?Sized> EncryptionKeyResource<'a, S> {
    pub fn new(storage: &'a S, alias: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            storage,
            alias: alias.into(),
            description: description.into(),
        }
    }
}

#[async_trait]
impl<S: StorageApi + ?Sized> Reconcile for EncryptionKeyResource<'_, S> {
    fn kind(&self) -> &'static str {
        "encryption-key"
    }

    fn display_name(&self) -> String {
        self.alias.clone()
    }

    async fn probe(&self) -> Result<Option<Observation>> {
        Ok(self
            .storage
            .find_key_by_alias(&self.alias)
            .await?
            .map(|key| Observation::new(key.key_id).with_arn(key.arn)))
    }

    async fn create(&self) -> Result<Observation> {
        let key = self.storage.create_key(&self.alias, &self.description).await?;
        Ok(Observation::new(key.key_id).with_arn(key.arn))
    }
}

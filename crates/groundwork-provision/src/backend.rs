//! Backend provisioner
//!
//! Converges one environment's state backend: the bucket/table/key triple
//! plus the declarative-tool invocation that brings them under the
//! deployment system's own state. The backend is only ever reported
//! ready when all three sub-resources exist and the bucket sits in the
//! target region — a backend pointed at the wrong region would have every
//! later deployment silently target broken state.

use groundwork_cloud::{Credentials, StorageApi};
use groundwork_core::{BackendDescriptor, Environment, naming};
use tracing::{debug, info, warn};

use crate::destroy::tear_down_backend;
use crate::error::{ProvisionError, Result};
use crate::reconcile::{Outcome, reconcile};
use crate::resources::{EncryptionKeyResource, LockTableResource, StateBucketResource};
use crate::tofu::{BackendVars, InfraTool, PlanVerdict};

/// Addresses of the backend module's resources, used for import.
const IMPORT_ADDRESSES: [&str; 4] = [
    "aws_kms_key.state",
    "aws_kms_alias.state",
    "aws_s3_bucket.state",
    "aws_dynamodb_table.locks",
];

/// Coordinates of one environment's backend.
#[derive(Debug, Clone)]
pub struct BackendSpec {
    pub project: String,
    pub environment: Environment,
    pub region: String,
    pub account_id: String,
}

impl BackendSpec {
    pub fn bucket(&self) -> String {
        naming::bucket_name(&self.project, self.environment, &self.account_id)
    }

    pub fn table(&self) -> String {
        naming::lock_table_name(&self.project, self.environment, &self.account_id)
    }

    pub fn alias(&self) -> String {
        naming::key_alias(&self.bucket())
    }

    pub fn descriptor(&self) -> BackendDescriptor {
        BackendDescriptor {
            environment: self.environment,
            bucket: self.bucket(),
            lock_table: self.table(),
            region: self.region.clone(),
            state_key: naming::state_key(&self.project, self.environment),
        }
    }

    pub fn vars(&self, credentials: Option<Credentials>) -> BackendVars {
        BackendVars {
            project: self.project.clone(),
            environment: self.environment,
            account_id: self.account_id.clone(),
            region: self.region.clone(),
            credentials,
        }
    }
}

/// What `ensure_backend` did.
#[derive(Debug)]
pub struct BackendOutcome {
    pub descriptor: BackendDescriptor,
    /// Whether anything was mutated (false for a converged backend).
    pub mutated: bool,
    /// Dry-run: nothing was verified or mutated.
    pub planned_only: bool,
    pub warnings: Vec<String>,
}

pub struct BackendProvisioner<'a, S: StorageApi + ?Sized, T: InfraTool + ?Sized> {
    storage: &'a S,
    tool: &'a T,
    dry_run: bool,
    recreate: bool,
}

impl<'a, S: StorageApi + ?Sized, T: InfraTool + ?Sized> BackendProvisioner<'a, S, T> {
    pub fn new(storage: &'a S, tool: &'a T, dry_run: bool, recreate: bool) -> Self {
        Self {
            storage,
            tool,
            dry_run,
            recreate,
        }
    }

    pub async fn ensure_backend(
        &self,
        spec: &BackendSpec,
        credentials: Option<Credentials>,
    ) -> Result<BackendOutcome> {
        let descriptor = spec.descriptor();

        if self.dry_run {
            info!(environment = %spec.environment, bucket = %spec.bucket(),
                "dry-run: would ensure state backend");
            return Ok(BackendOutcome {
                descriptor,
                mutated: false,
                planned_only: true,
                warnings: Vec::new(),
            });
        }

        let mut warnings = Vec::new();
        let (mut key, mut bucket, mut table) = self.reconcile_all(spec).await?;

        // Region gate: a pre-existing bucket in the wrong region is never
        // mutated automatically.
        let mut recreated = false;
        let found_region = bucket
            .observation()
            .and_then(|obs| obs.attribute("region"))
            .map(str::to_string);
        if let Some(found) = found_region
            && found != spec.region
        {
            if !self.recreate {
                return Err(ProvisionError::RegionMismatch {
                    bucket: spec.bucket(),
                    found,
                    expected: spec.region.clone(),
                });
            }
            warn!(bucket = %spec.bucket(), %found, expected = %spec.region,
                "Region mismatch, destroying and recreating backend");
            warnings.extend(tear_down_backend(self.storage, spec, false).await?);
            (key, bucket, table) = self.reconcile_all(spec).await?;
            recreated = true;
        }

        let all_found = !recreated
            && matches!(key, Outcome::Found(_))
            && matches!(bucket, Outcome::Found(_))
            && matches!(table, Outcome::Found(_));
        if all_found {
            debug!(environment = %spec.environment, "Backend already converged, skipping tool invocation");
            self.verify_ready(spec).await?;
            return Ok(BackendOutcome {
                descriptor,
                mutated: false,
                planned_only: false,
                warnings,
            });
        }

        // Hardening for a bucket this run brought into existence.
        if !matches!(bucket, Outcome::Found(_)) {
            let key_arn = key.observation().and_then(|obs| obs.arn.clone());
            self.harden_bucket(&spec.bucket(), key_arn.as_deref(), &mut warnings)
                .await;
        }

        // The tool's own state must match reality before it plans, so
        // everything that exists by now gets imported. Import failures are
        // warnings; plan/apply reveals real conflicts.
        let vars = spec.vars(credentials);
        self.tool.prepare(&vars).await?;
        let import_ids = [
            key.observation().map(|obs| obs.id.clone()).unwrap_or_default(),
            spec.alias(),
            spec.bucket(),
            spec.table(),
        ];
        for (address, id) in IMPORT_ADDRESSES.iter().zip(import_ids.iter()) {
            if id.is_empty() {
                continue;
            }
            if let Err(e) = self.tool.import(&vars, address, id).await {
                warn!(address, id = %id, error = %e, "Import failed, plan will reconcile");
                warnings.push(format!("import of {} failed: {}", address, e));
            }
        }

        match self.tool.plan(&vars).await? {
            PlanVerdict::NoChanges => {
                debug!(environment = %spec.environment, "Plan reported no changes");
            }
            PlanVerdict::ChangesPending => {
                self.tool.apply(&vars).await?;
            }
        }

        self.verify_ready(spec).await?;
        info!(environment = %spec.environment, bucket = %spec.bucket(), "State backend ready");
        Ok(BackendOutcome {
            descriptor,
            mutated: true,
            planned_only: false,
            warnings,
        })
    }

    async fn reconcile_all(&self, spec: &BackendSpec) -> Result<(Outcome, Outcome, Outcome)> {
        let alias = spec.alias();
        let description = format!(
            "State encryption key for {} {}",
            spec.project, spec.environment
        );
        let key = reconcile(
            &EncryptionKeyResource::new(self.storage, &alias, &description),
            false,
        )
        .await?;
        let bucket = reconcile(&StateBucketResource::new(self.storage, spec.bucket()), false).await?;
        let table = reconcile(&LockTableResource::new(self.storage, spec.table()), false).await?;
        Ok((key, bucket, table))
    }

    /// Post-creation hardening. Failures degrade the security posture but
    /// do not block progress; they surface as warnings in the report.
    async fn harden_bucket(&self, bucket: &str, key_arn: Option<&str>, warnings: &mut Vec<String>) {
        if let Err(e) = self.storage.enable_versioning(bucket).await {
            warn!(bucket, error = %e, "Could not enable bucket versioning");
            warnings.push(format!("bucket versioning not enabled: {}", e));
        }
        if let Err(e) = self.storage.block_public_access(bucket).await {
            warn!(bucket, error = %e, "Could not block public access");
            warnings.push(format!("public access block not applied: {}", e));
        }
        match key_arn {
            Some(arn) => {
                if let Err(e) = self.storage.enable_encryption(bucket, arn).await {
                    warn!(bucket, error = %e, "Could not enable bucket encryption");
                    warnings.push(format!("bucket encryption not enabled: {}", e));
                }
            }
            None => warnings.push("bucket encryption not enabled: no key available".to_string()),
        }
    }

    /// Readiness invariant: bucket in the target region, table and key
    /// present.
    async fn verify_ready(&self, spec: &BackendSpec) -> Result<()> {
        let environment = spec.environment.to_string();
        match self.storage.bucket_region(&spec.bucket()).await? {
            Some(region) if region == spec.region => {}
            Some(region) => {
                return Err(ProvisionError::BackendNotReady {
                    environment,
                    detail: format!("bucket region {} does not match {}", region, spec.region),
                });
            }
            None => {
                return Err(ProvisionError::BackendNotReady {
                    environment,
                    detail: format!("bucket {} does not exist", spec.bucket()),
                });
            }
        }
        if !self.storage.table_exists(&spec.table()).await? {
            return Err(ProvisionError::BackendNotReady {
                environment,
                detail: format!("lock table {} does not exist", spec.table()),
            });
        }
        if self.storage.find_key_by_alias(&spec.alias()).await?.is_none() {
            return Err(ProvisionError::BackendNotReady {
                environment,
                detail: format!("encryption key {} does not exist", spec.alias()),
            });
        }
        Ok(())
    }
}

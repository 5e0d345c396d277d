//! Bucket draining
//!
//! Versioned buckets cannot be deleted while any object version or
//! delete marker remains. The drain is a paginated loop that tolerates
//! per-object failures without aborting, but the bucket delete is never
//! attempted once anything failed — a partially drained bucket surfaces
//! as a fatal error instead.

use groundwork_cloud::StorageApi;
use tracing::{debug, info, warn};

use crate::error::{ProvisionError, Result};

#[derive(Debug, Default)]
pub struct DrainSummary {
    pub deleted: usize,
    pub failed: usize,
}

/// Remove every object version and delete marker from `bucket`.
pub async fn drain_bucket<S: StorageApi + ?Sized>(storage: &S, bucket: &str) -> Result<DrainSummary> {
    let mut summary = DrainSummary::default();
    let mut token: Option<String> = None;

    loop {
        let page = storage
            .list_object_versions(bucket, token.as_deref())
            .await?;

        for entry in page.versions.iter().chain(page.delete_markers.iter()) {
            match storage
                .delete_object_version(bucket, &entry.key, &entry.version_id)
                .await
            {
                Ok(()) => summary.deleted += 1,
                Err(e) => {
                    warn!(bucket, key = %entry.key, version = %entry.version_id, error = %e,
                        "Failed to delete object version");
                    summary.failed += 1;
                }
            }
        }

        match page.next_token {
            Some(next) => token = Some(next),
            None => break,
        }
    }

    debug!(bucket, deleted = summary.deleted, failed = summary.failed, "Drain finished");
    Ok(summary)
}

/// Drain `bucket`, then delete it. Refuses the delete when the drain was
/// incomplete.
pub async fn delete_bucket_drained<S: StorageApi + ?Sized>(
    storage: &S,
    bucket: &str,
    dry_run: bool,
) -> Result<DrainSummary> {
    if dry_run {
        info!(bucket, "dry-run: would drain and delete bucket");
        return Ok(DrainSummary::default());
    }

    let summary = drain_bucket(storage, bucket).await?;
    if summary.failed > 0 {
        return Err(ProvisionError::DrainIncomplete {
            bucket: bucket.to_string(),
            failed: summary.failed,
        });
    }

    storage.delete_bucket(bucket).await?;
    info!(bucket, deleted = summary.deleted, "Bucket drained and deleted");
    Ok(summary)
}

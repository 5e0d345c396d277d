//! Find-or-adopt-or-create reconciliation
//!
//! One algorithm for every resource kind. Each kind implements
//! [`Reconcile`] — an existence probe by natural key, a relaxed probe for
//! the adopt fallback, a creation call and an optional health check — and
//! [`reconcile`] drives them uniformly.
//!
//! The remote APIs are eventually consistent and offer no atomic
//! create-if-not-exists, so a create can fail with a conflict for a
//! resource the probe did not see. The adopt fallback re-probes with a
//! relaxed matcher before the conflict is escalated; without it a re-run
//! after a partial failure would abort instead of converging.

use async_trait::async_trait;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::error::{ProvisionError, Result};

/// What a probe saw of an existing resource.
#[derive(Debug, Clone)]
pub struct Observation {
    pub id: String,
    pub arn: Option<String>,
    pub attributes: BTreeMap<String, String>,
}

impl Observation {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            arn: None,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_arn(mut self, arn: impl Into<String>) -> Self {
        self.arn = Some(arn.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }
}

/// Kind-specific health verdict for a resource the probe found.
#[derive(Debug, Clone)]
pub enum Health {
    Healthy,
    Degraded(String),
}

/// Result of reconciling one resource.
#[derive(Debug)]
pub enum Outcome {
    /// Probe found a healthy resource; nothing was mutated.
    Found(Observation),
    /// Create conflicted and the relaxed probe located the resource.
    Adopted(Observation),
    /// The resource was created by this run.
    Created(Observation),
    /// Dry-run: the resource would have been created.
    WouldCreate,
}

impl Outcome {
    pub fn observation(&self) -> Option<&Observation> {
        match self {
            Outcome::Found(obs) | Outcome::Adopted(obs) | Outcome::Created(obs) => Some(obs),
            Outcome::WouldCreate => None,
        }
    }

    /// True when this run issued a creation call.
    pub fn is_created(&self) -> bool {
        matches!(self, Outcome::Created(_))
    }

    pub fn describe(&self) -> &'static str {
        match self {
            Outcome::Found(_) => "found",
            Outcome::Adopted(_) => "adopted",
            Outcome::Created(_) => "created",
            Outcome::WouldCreate => "would create",
        }
    }
}

/// Capability interface implemented once per resource kind.
#[async_trait]
pub trait Reconcile: Send + Sync {
    fn kind(&self) -> &'static str;

    /// Natural key shown in logs and errors.
    fn display_name(&self) -> String;

    /// Read-only lookup by natural key.
    async fn probe(&self) -> Result<Option<Observation>>;

    /// Relaxed lookup used by the adopt fallback; defaults to the plain
    /// probe, which covers pure propagation lag.
    async fn probe_relaxed(&self) -> Result<Option<Observation>> {
        self.probe().await
    }

    /// Health predicate for a found resource.
    fn health(&self, _obs: &Observation) -> Health {
        Health::Healthy
    }

    /// Bring a degraded resource back in line without recreating it.
    async fn repair(&self, _obs: &Observation) -> Result<()> {
        Ok(())
    }

    /// Create with the full desired configuration.
    async fn create(&self) -> Result<Observation>;
}

/// Converge one resource toward existence.
pub async fn reconcile<R: Reconcile + ?Sized>(resource: &R, dry_run: bool) -> Result<Outcome> {
    let kind = resource.kind();
    let name = resource.display_name();

    if dry_run {
        info!(kind, %name, "dry-run: would create if missing");
        return Ok(Outcome::WouldCreate);
    }

    if let Some(obs) = resource.probe().await? {
        if let Health::Degraded(reason) = resource.health(&obs) {
            warn!(kind, %name, %reason, "resource degraded, repairing in place");
            resource.repair(&obs).await?;
        }
        debug!(kind, %name, id = %obs.id, "resource found");
        return Ok(Outcome::Found(obs));
    }

    match resource.create().await {
        Ok(obs) => {
            info!(kind, %name, id = %obs.id, "resource created");
            Ok(Outcome::Created(obs))
        }
        Err(ProvisionError::Cloud(e)) if e.is_conflict() => {
            debug!(kind, %name, "create conflicted, retrying probe with relaxed matcher");
            match resource.probe_relaxed().await? {
                Some(obs) => {
                    info!(kind, %name, id = %obs.id, "adopted existing resource");
                    Ok(Outcome::Adopted(obs))
                }
                None => Err(ProvisionError::Conflict {
                    kind,
                    name,
                    detail: e.to_string(),
                }),
            }
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use groundwork_cloud::CloudError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct FakeResource {
        exists: bool,
        degraded: bool,
        create_conflicts: bool,
        relaxed_finds: bool,
        probes: AtomicUsize,
        creates: AtomicUsize,
        repairs: AtomicUsize,
    }

    #[async_trait]
    impl Reconcile for FakeResource {
        fn kind(&self) -> &'static str {
            "fake"
        }

        fn display_name(&self) -> String {
            "fake-resource".to_string()
        }

        async fn probe(&self) -> Result<Option<Observation>> {
            self.probes.fetch_add(1, Ordering::SeqCst);
            Ok(self.exists.then(|| Observation::new("id-1")))
        }

        async fn probe_relaxed(&self) -> Result<Option<Observation>> {
            Ok(self.relaxed_finds.then(|| Observation::new("id-2")))
        }

        fn health(&self, _obs: &Observation) -> Health {
            if self.degraded {
                Health::Degraded("drifted".to_string())
            } else {
                Health::Healthy
            }
        }

        async fn repair(&self, _obs: &Observation) -> Result<()> {
            self.repairs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn create(&self) -> Result<Observation> {
            self.creates.fetch_add(1, Ordering::SeqCst);
            if self.create_conflicts {
                Err(ProvisionError::Cloud(CloudError::Conflict(
                    "already exists".to_string(),
                )))
            } else {
                Ok(Observation::new("id-new"))
            }
        }
    }

    #[tokio::test]
    async fn found_resource_is_not_mutated() {
        let resource = FakeResource {
            exists: true,
            ..Default::default()
        };
        let outcome = reconcile(&resource, false).await.unwrap();
        assert!(matches!(outcome, Outcome::Found(_)));
        assert_eq!(resource.creates.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_resource_is_created() {
        let resource = FakeResource::default();
        let outcome = reconcile(&resource, false).await.unwrap();
        assert!(outcome.is_created());
        assert_eq!(resource.creates.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn conflicting_create_adopts_via_relaxed_probe() {
        let resource = FakeResource {
            create_conflicts: true,
            relaxed_finds: true,
            ..Default::default()
        };
        let outcome = reconcile(&resource, false).await.unwrap();
        assert!(matches!(outcome, Outcome::Adopted(ref obs) if obs.id == "id-2"));
        // exactly one create was attempted, no duplicate
        assert_eq!(resource.creates.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unresolvable_conflict_is_fatal() {
        let resource = FakeResource {
            create_conflicts: true,
            relaxed_finds: false,
            ..Default::default()
        };
        let err = reconcile(&resource, false).await.unwrap_err();
        assert!(matches!(err, ProvisionError::Conflict { kind: "fake", .. }));
    }

    #[tokio::test]
    async fn degraded_resource_is_repaired_in_place() {
        let resource = FakeResource {
            exists: true,
            degraded: true,
            ..Default::default()
        };
        let outcome = reconcile(&resource, false).await.unwrap();
        assert!(matches!(outcome, Outcome::Found(_)));
        assert_eq!(resource.repairs.load(Ordering::SeqCst), 1);
        assert_eq!(resource.creates.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn dry_run_touches_nothing() {
        let resource = FakeResource {
            exists: true,
            ..Default::default()
        };
        let outcome = reconcile(&resource, true).await.unwrap();
        assert!(matches!(outcome, Outcome::WouldCreate));
        assert_eq!(resource.probes.load(Ordering::SeqCst), 0);
        assert_eq!(resource.creates.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn transport_errors_propagate_unclassified() {
        struct Failing;

        #[async_trait]
        impl Reconcile for Failing {
            fn kind(&self) -> &'static str {
                "failing"
            }
            fn display_name(&self) -> String {
                "failing".to_string()
            }
            async fn probe(&self) -> Result<Option<Observation>> {
                Err(ProvisionError::Cloud(CloudError::Throttled(
                    "rate exceeded".to_string(),
                )))
            }
            async fn create(&self) -> Result<Observation> {
                unreachable!()
            }
        }

        let err = reconcile(&Failing, false).await.unwrap_err();
        assert!(matches!(err, ProvisionError::Cloud(e) if e.is_throttled()));
    }
}

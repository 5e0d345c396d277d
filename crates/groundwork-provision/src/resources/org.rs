//! Organization and organizational-unit resources

use async_trait::async_trait;
use groundwork_cloud::AwsCli;
use tracing::debug;

use crate::error::Result;
use crate::reconcile::{Observation, Outcome, Reconcile, reconcile};

/// The organization singleton. Created once, never deleted.
pub struct OrganizationResource<'a> {
    aws: &'a AwsCli,
}

impl<'a> OrganizationResource<'a> {
    pub fn new(aws: &'a AwsCli) -> Self {
        Self { aws }
    }
}

#[async_trait]
impl Reconcile for OrganizationResource<'_> {
    fn kind(&self) -> &'static str {
        "organization"
    }

    fn display_name(&self) -> String {
        "organization".to_string()
    }

    async fn probe(&self) -> Result<Option<Observation>> {
        Ok(self.aws.describe_organization().await?.map(|org| {
            Observation::new(org.id)
                .with_attribute("management_account_id", org.management_account_id)
        }))
    }

    async fn create(&self) -> Result<Observation> {
        let org = self.aws.create_organization().await?;
        Ok(Observation::new(org.id)
            .with_attribute("management_account_id", org.management_account_id))
    }
}

/// One organizational unit, identified by name within its parent.
/// Names are only unique among siblings, so the probe is always scoped.
pub struct OrgUnitResource<'a> {
    aws: &'a AwsCli,
    parent_id: String,
    name: String,
}

impl<'a> OrgUnitResource<'a> {
    pub fn new(aws: &'a AwsCli, parent_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            aws,
            parent_id: parent_id.into(),
            name: name.into(),
        }
    }
}

#[async_trait]
impl Reconcile for OrgUnitResource<'_> {
    fn kind(&self) -> &'static str {
        "organizational-unit"
    }

    fn display_name(&self) -> String {
        self.name.clone()
    }

    async fn probe(&self) -> Result<Option<Observation>> {
        let units = self.aws.list_organizational_units(&self.parent_id).await?;
        Ok(units
            .into_iter()
            .find(|ou| ou.name == self.name)
            .map(|ou| Observation::new(ou.id)))
    }

    async fn create(&self) -> Result<Observation> {
        let ou = self
            .aws
            .create_organizational_unit(&self.parent_id, &self.name)
            .await?;
        Ok(Observation::new(ou.id))
    }
}

/// Reconcile a path of organizational units under the root, one segment
/// at a time. Returns the final OU id (`None` under dry-run, where parent
/// ids for deeper segments are unknowable) and the per-segment outcomes.
pub async fn ensure_ou_path(
    aws: &AwsCli,
    root_id: &str,
    segments: &[&str],
    dry_run: bool,
) -> Result<(Option<String>, Vec<Outcome>)> {
    let mut parent = root_id.to_string();
    let mut outcomes = Vec::with_capacity(segments.len());
    let mut resolved = true;

    for segment in segments {
        if !resolved {
            outcomes.push(Outcome::WouldCreate);
            continue;
        }

        let resource = OrgUnitResource::new(aws, parent.clone(), *segment);
        let outcome = reconcile(&resource, dry_run).await?;
        match outcome.observation() {
            Some(obs) => {
                debug!(segment, ou_id = %obs.id, "Resolved organizational unit");
                parent = obs.id.clone();
            }
            None => resolved = false,
        }
        outcomes.push(outcome);
    }

    Ok((resolved.then_some(parent), outcomes))
}

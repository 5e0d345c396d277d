//! Account registry
//!
//! The `.groundwork/accounts.json` file is the single source of truth for
//! which member accounts exist across separate invocations. It carries an
//! explicit schema version so future format changes can be migrated
//! rather than silently misread, and the previous file is kept as a
//! backup on every rewrite.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

use crate::STATE_DIR;
use crate::error::{CoreError, Result};
use crate::model::Environment;

const REGISTRY_VERSION: u32 = 1;
const REGISTRY_FILE: &str = "accounts.json";
const REGISTRY_BACKUP: &str = "accounts.json.backup";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountRegistry {
    /// Registry schema version.
    pub version: u32,

    /// Project the accounts belong to.
    pub project: String,

    /// Management (payer) account identifier.
    pub management_account_id: String,

    /// Environment to member-account identifier.
    pub accounts: BTreeMap<Environment, String>,

    /// Last modified timestamp.
    pub updated_at: DateTime<Utc>,
}

impl AccountRegistry {
    pub fn new(project: impl Into<String>, management_account_id: impl Into<String>) -> Self {
        Self {
            version: REGISTRY_VERSION,
            project: project.into(),
            management_account_id: management_account_id.into(),
            accounts: BTreeMap::new(),
            updated_at: Utc::now(),
        }
    }

    pub fn account_id(&self, env: Environment) -> Option<&str> {
        self.accounts.get(&env).map(String::as_str)
    }

    pub fn set_account(&mut self, env: Environment, account_id: impl Into<String>) {
        self.accounts.insert(env, account_id.into());
        self.updated_at = Utc::now();
    }

    /// Registry file path under `root`.
    pub fn path(root: &Path) -> PathBuf {
        root.join(STATE_DIR).join(REGISTRY_FILE)
    }

    /// Load the registry, returning `None` when no file exists yet.
    pub async fn load(root: &Path) -> Result<Option<Self>> {
        let path = Self::path(root);
        if !path.exists() {
            debug!(path = %path.display(), "Registry file not found");
            return Ok(None);
        }

        let content = fs::read_to_string(&path).await?;
        let registry: AccountRegistry = serde_json::from_str(&content)?;

        if registry.version > REGISTRY_VERSION {
            return Err(CoreError::RegistryVersion {
                found: registry.version,
                supported: REGISTRY_VERSION,
            });
        }

        debug!(accounts = registry.accounts.len(), "Loaded account registry");
        Ok(Some(registry))
    }

    /// Load the registry, failing with remediation guidance when missing.
    pub async fn load_required(root: &Path) -> Result<Self> {
        Self::load(root)
            .await?
            .ok_or_else(|| CoreError::RegistryNotFound(Self::path(root)))
    }

    /// Persist the registry, keeping the previous file as a backup.
    pub async fn save(&self, root: &Path) -> Result<()> {
        let dir = root.join(STATE_DIR);
        if !dir.exists() {
            fs::create_dir_all(&dir).await?;
        }

        let path = Self::path(root);
        let backup = dir.join(REGISTRY_BACKUP);

        if path.exists() {
            if backup.exists() {
                fs::remove_file(&backup).await?;
            }
            fs::rename(&path, &backup).await?;
            debug!("Created registry backup");
        }

        let content = serde_json::to_string_pretty(self)?;
        fs::write(&path, content).await?;

        debug!(path = %path.display(), accounts = self.accounts.len(), "Saved account registry");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn save_load_round_trip() {
        let dir = tempdir().unwrap();

        let mut registry = AccountRegistry::new("atlas", "111111111111");
        registry.set_account(Environment::Dev, "222222222222");
        registry.set_account(Environment::Prod, "333333333333");
        registry.save(dir.path()).await.unwrap();

        let loaded = AccountRegistry::load(dir.path()).await.unwrap().unwrap();
        assert_eq!(loaded.version, REGISTRY_VERSION);
        assert_eq!(loaded.management_account_id, "111111111111");
        assert_eq!(loaded.account_id(Environment::Dev), Some("222222222222"));
        assert_eq!(loaded.account_id(Environment::Staging), None);
    }

    #[tokio::test]
    async fn missing_registry_is_none() {
        let dir = tempdir().unwrap();
        assert!(AccountRegistry::load(dir.path()).await.unwrap().is_none());
        assert!(matches!(
            AccountRegistry::load_required(dir.path()).await,
            Err(CoreError::RegistryNotFound(_))
        ));
    }

    #[tokio::test]
    async fn rewrite_keeps_backup() {
        let dir = tempdir().unwrap();

        let mut registry = AccountRegistry::new("atlas", "111111111111");
        registry.save(dir.path()).await.unwrap();
        registry.set_account(Environment::Dev, "222222222222");
        registry.save(dir.path()).await.unwrap();

        let backup = dir.path().join(STATE_DIR).join(REGISTRY_BACKUP);
        assert!(backup.exists());
        let previous: AccountRegistry =
            serde_json::from_str(&std::fs::read_to_string(backup).unwrap()).unwrap();
        assert!(previous.accounts.is_empty());
    }

    #[tokio::test]
    async fn newer_schema_version_is_refused() {
        let dir = tempdir().unwrap();
        let state_dir = dir.path().join(STATE_DIR);
        std::fs::create_dir_all(&state_dir).unwrap();

        let mut value = serde_json::to_value(AccountRegistry::new("atlas", "111111111111")).unwrap();
        value["version"] = serde_json::json!(REGISTRY_VERSION + 1);
        std::fs::write(state_dir.join(REGISTRY_FILE), value.to_string()).unwrap();

        assert!(matches!(
            AccountRegistry::load(dir.path()).await,
            Err(CoreError::RegistryVersion { .. })
        ));
    }
}

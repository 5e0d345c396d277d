//! Backend descriptors
//!
//! One file per environment under `.groundwork/backends/`, consumed by
//! the external deployment system as its state-store coordinates.
//! Produced only by the backend provisioner.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

use crate::STATE_DIR;
use crate::error::Result;
use crate::model::Environment;

const BACKENDS_DIR: &str = "backends";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendDescriptor {
    pub environment: Environment,
    pub bucket: String,
    pub lock_table: String,
    pub region: String,
    pub state_key: String,
}

impl BackendDescriptor {
    pub fn path(root: &Path, env: Environment) -> PathBuf {
        root.join(STATE_DIR)
            .join(BACKENDS_DIR)
            .join(format!("{}.json", env))
    }

    pub async fn load(root: &Path, env: Environment) -> Result<Option<Self>> {
        let path = Self::path(root, env);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path).await?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    pub async fn save(&self, root: &Path) -> Result<PathBuf> {
        let dir = root.join(STATE_DIR).join(BACKENDS_DIR);
        if !dir.exists() {
            fs::create_dir_all(&dir).await?;
        }
        let path = Self::path(root, self.environment);
        let content = serde_json::to_string_pretty(self)?;
        fs::write(&path, content).await?;
        debug!(path = %path.display(), "Saved backend descriptor");
        Ok(path)
    }

    pub async fn remove(root: &Path, env: Environment) -> Result<bool> {
        let path = Self::path(root, env);
        if path.exists() {
            fs::remove_file(&path).await?;
            return Ok(true);
        }
        Ok(false)
    }
}

//! Bootstrap report
//!
//! Machine-readable record of one pipeline run, written on success and on
//! fatal failure alike. Read by humans and CI, never by the engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

use crate::STATE_DIR;
use crate::error::Result;

const REPORT_FILE: &str = "report.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Failure,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapReport {
    pub timestamp: DateTime<Utc>,
    pub status: RunStatus,
    pub dry_run: bool,
    pub duration_ms: u64,
    pub stages_total: usize,
    pub stages_passed: usize,
    pub stages_warned: usize,
    pub stages_failed: usize,
    /// Warn-level failures accumulated across the run.
    pub warnings: Vec<String>,
    /// Discovered resource identifiers/ARNs, keyed by logical name.
    pub resources: BTreeMap<String, String>,
    /// Error of the stage that aborted the run, when status is failure.
    pub error: Option<String>,
}

impl BootstrapReport {
    pub fn path(root: &Path) -> PathBuf {
        root.join(STATE_DIR).join(REPORT_FILE)
    }

    pub async fn save(&self, root: &Path) -> Result<PathBuf> {
        let dir = root.join(STATE_DIR);
        if !dir.exists() {
            fs::create_dir_all(&dir).await?;
        }
        let path = Self::path(root);
        let content = serde_json::to_string_pretty(self)?;
        fs::write(&path, content).await?;
        debug!(path = %path.display(), status = ?self.status, "Wrote bootstrap report");
        Ok(path)
    }

    pub async fn load(root: &Path) -> Result<Option<Self>> {
        let path = Self::path(root);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path).await?;
        Ok(Some(serde_json::from_str(&content)?))
    }
}

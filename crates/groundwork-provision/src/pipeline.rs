//! Staged pipeline executor
//!
//! Stages are declared up front with a known count, run strictly in
//! order, and carry an explicit failure policy: fatal failures abort the
//! remaining stages, warn failures are recorded and the run continues.
//! The executor owns progress display, wall-clock timing, and report
//! assembly — the report is built on the success and the failure path
//! alike.

use chrono::{DateTime, Utc};
use colored::Colorize;
use groundwork_core::{BootstrapReport, RunStatus};
use std::collections::BTreeMap;
use std::future::Future;
use std::time::Instant;

use crate::error::{ProvisionError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Abort the remaining stages and propagate a non-zero outcome.
    Fatal,
    /// Record the failure and continue.
    Warn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    Passed,
    Warned,
    Failed,
}

#[derive(Debug, Clone)]
pub struct StageRecord {
    pub name: &'static str,
    pub status: StageStatus,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineState {
    NotStarted,
    Running(usize),
    Completed,
    Failed(usize),
}

/// What a stage hands back on success.
#[derive(Debug, Default)]
pub struct StageOutput {
    summary: Option<String>,
    warnings: Vec<String>,
    resources: Vec<(String, String)>,
}

impl StageOutput {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn summary(text: impl Into<String>) -> Self {
        Self {
            summary: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    pub fn with_resource(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.resources.push((key.into(), value.into()));
        self
    }

    pub fn push_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    pub fn set_summary(&mut self, text: impl Into<String>) {
        self.summary = Some(text.into());
    }

    pub fn push_resource(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.resources.push((key.into(), value.into()));
    }
}

pub struct Pipeline {
    names: Vec<&'static str>,
    dry_run: bool,
    started_at: DateTime<Utc>,
    started: Instant,
    records: Vec<StageRecord>,
    warnings: Vec<String>,
    resources: BTreeMap<String, String>,
    state: PipelineState,
    error: Option<String>,
}

impl Pipeline {
    pub fn new(names: &[&'static str], dry_run: bool) -> Self {
        Self {
            names: names.to_vec(),
            dry_run,
            started_at: Utc::now(),
            started: Instant::now(),
            records: Vec::new(),
            warnings: Vec::new(),
            resources: BTreeMap::new(),
            state: PipelineState::NotStarted,
            error: None,
        }
    }

    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    pub fn total(&self) -> usize {
        self.names.len()
    }

    pub fn records(&self) -> &[StageRecord] {
        &self.records
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Run the next stage under the given policy.
    pub async fn run_stage<F, Fut>(
        &mut self,
        name: &'static str,
        policy: FailurePolicy,
        op: F,
    ) -> Result<()>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<StageOutput>>,
    {
        if let PipelineState::Failed(at) = self.state {
            return Err(ProvisionError::Aborted(format!(
                "stage '{}' not run, stage {} failed earlier",
                name, at
            )));
        }

        let index = self.records.len() + 1;
        self.state = PipelineState::Running(index);
        println!(
            "{} {}",
            format!("[{}/{}]", index, self.names.len()).bold(),
            name.blue().bold()
        );

        match op().await {
            Ok(output) => {
                match &output.summary {
                    Some(summary) => println!("  {} {}", "✓".green(), summary),
                    None => println!("  {}", "✓".green()),
                }
                for warning in &output.warnings {
                    println!("  {} {}", "⚠".yellow(), warning);
                    self.warnings.push(format!("{}: {}", name, warning));
                }
                for (key, value) in output.resources {
                    self.resources.insert(key, value);
                }
                self.records.push(StageRecord {
                    name,
                    status: StageStatus::Passed,
                    detail: output.summary,
                });
                Ok(())
            }
            Err(e) => match policy {
                FailurePolicy::Warn => {
                    println!("  {} {}", "⚠".yellow(), e);
                    self.warnings.push(format!("{}: {}", name, e));
                    self.records.push(StageRecord {
                        name,
                        status: StageStatus::Warned,
                        detail: Some(e.to_string()),
                    });
                    Ok(())
                }
                FailurePolicy::Fatal => {
                    println!("  {} {}", "✗".red(), e);
                    self.records.push(StageRecord {
                        name,
                        status: StageStatus::Failed,
                        detail: Some(e.to_string()),
                    });
                    self.error = Some(e.to_string());
                    self.state = PipelineState::Failed(index);
                    Err(e)
                }
            },
        }
    }

    /// Mark the run complete. A failed run keeps its failed state.
    pub fn complete(&mut self) {
        if !matches!(self.state, PipelineState::Failed(_)) {
            self.state = PipelineState::Completed;
        }
    }

    fn count(&self, status: StageStatus) -> usize {
        self.records.iter().filter(|r| r.status == status).count()
    }

    /// Assemble the bootstrap report for the run so far. Called on both
    /// the success and the failure path.
    pub fn report(&self) -> BootstrapReport {
        let status = if matches!(self.state, PipelineState::Failed(_)) {
            RunStatus::Failure
        } else {
            RunStatus::Success
        };
        BootstrapReport {
            timestamp: self.started_at,
            status,
            dry_run: self.dry_run,
            duration_ms: self.started.elapsed().as_millis() as u64,
            stages_total: self.names.len(),
            stages_passed: self.count(StageStatus::Passed),
            stages_warned: self.count(StageStatus::Warned),
            stages_failed: self.count(StageStatus::Failed),
            warnings: self.warnings.clone(),
            resources: self.resources.clone(),
            error: self.error.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boom() -> ProvisionError {
        ProvisionError::InvalidState {
            what: "it broke".to_string(),
            remediation: "fix it".to_string(),
        }
    }

    #[tokio::test]
    async fn passing_stages_complete_the_run() {
        let mut pipeline = Pipeline::new(&["one", "two"], false);
        pipeline
            .run_stage("one", FailurePolicy::Fatal, || async {
                Ok(StageOutput::summary("did the thing").with_resource("organization", "o-abc"))
            })
            .await
            .unwrap();
        pipeline
            .run_stage("two", FailurePolicy::Fatal, || async { Ok(StageOutput::ok()) })
            .await
            .unwrap();
        pipeline.complete();

        assert_eq!(*pipeline.state(), PipelineState::Completed);
        let report = pipeline.report();
        assert_eq!(report.status, RunStatus::Success);
        assert_eq!(report.stages_total, 2);
        assert_eq!(report.stages_passed, 2);
        assert_eq!(report.stages_failed, 0);
        assert_eq!(report.resources["organization"], "o-abc");
        assert!(report.error.is_none());
    }

    #[tokio::test]
    async fn warn_failure_does_not_stop_the_run() {
        let mut pipeline = Pipeline::new(&["one", "two"], false);
        pipeline
            .run_stage("one", FailurePolicy::Warn, || async { Err(boom()) })
            .await
            .unwrap();
        pipeline
            .run_stage("two", FailurePolicy::Fatal, || async { Ok(StageOutput::ok()) })
            .await
            .unwrap();
        pipeline.complete();

        let report = pipeline.report();
        assert_eq!(report.status, RunStatus::Success);
        assert_eq!(report.stages_warned, 1);
        assert_eq!(report.stages_passed, 1);
        assert_eq!(report.warnings.len(), 1);
    }

    #[tokio::test]
    async fn fatal_failure_aborts_later_stages() {
        let mut pipeline = Pipeline::new(&["one", "two", "three"], false);
        pipeline
            .run_stage("one", FailurePolicy::Fatal, || async { Ok(StageOutput::ok()) })
            .await
            .unwrap();
        let err = pipeline
            .run_stage("two", FailurePolicy::Fatal, || async { Err(boom()) })
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::InvalidState { .. }));
        assert_eq!(*pipeline.state(), PipelineState::Failed(2));

        // a later stage is refused and its closure never runs
        let err = pipeline
            .run_stage("three", FailurePolicy::Fatal, || async {
                unreachable!("stage three must not run")
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::Aborted(_)));

        // the report is still produced, with failure status
        let report = pipeline.report();
        assert_eq!(report.status, RunStatus::Failure);
        assert_eq!(report.stages_total, 3);
        assert_eq!(report.stages_passed, 1);
        assert_eq!(report.stages_failed, 1);
        assert!(report.error.as_ref().unwrap().contains("it broke"));
    }

    #[tokio::test]
    async fn stage_warnings_accumulate_into_the_report() {
        let mut pipeline = Pipeline::new(&["one"], true);
        pipeline
            .run_stage("one", FailurePolicy::Fatal, || async {
                Ok(StageOutput::summary("done").with_warning("encryption not enabled"))
            })
            .await
            .unwrap();
        pipeline.complete();

        let report = pipeline.report();
        assert!(report.dry_run);
        assert_eq!(report.warnings, vec!["one: encryption not enabled".to_string()]);
        assert_eq!(report.stages_warned, 0);
    }
}

//! Scan orchestration: drives one work item through
//! `PENDING -> FETCHING -> SCANNING -> CLASSIFYING -> REPORTING -> terminal`.
//!
//! Every failure is contained here and turned into a terminal status for the
//! item. The scoped working directory is dropped on every exit path.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::conflict_matrix::SharedMatrix;
use super::detector::{Detection, LicenseDetector};
use super::diff;
use super::github::VcsClient;
use super::reporter::Reporter;
use crate::db::ScanStore;
use crate::error::{AccessError, VcsError};
use crate::models::{ScanOutcome, ScanPhase, ScanResult, ScanStatus, WorkItem};

/// Repository license assumed when the repository declares none.
pub const DEFAULT_REPOSITORY_LICENSE: &str = "Proprietary";
/// Source lines kept per finding for report excerpts.
const EXCERPT_LINES: usize = 20;

/// Tracks and logs the phase of one run.
struct PhaseTracker {
    id: Uuid,
    phase: ScanPhase,
}

impl PhaseTracker {
    fn new(id: Uuid) -> Self {
        Self {
            id,
            phase: ScanPhase::Pending,
        }
    }

    fn advance(&mut self, next: ScanPhase) {
        if !self.phase.can_advance_to(next) {
            warn!(target: "scan", item = %self.id, from = %self.phase, to = %next, "Unexpected phase transition");
        }
        debug!(target: "scan", item = %self.id, from = %self.phase, to = %next, "Phase transition");
        self.phase = next;
    }
}

/// A run that stopped before producing a result.
struct Abort {
    status: ScanStatus,
    message: String,
}

impl Abort {
    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: ScanStatus::InternalError,
            message: message.into(),
        }
    }
}

impl From<AccessError> for Abort {
    fn from(err: AccessError) -> Self {
        Self {
            status: ScanStatus::NoAccess,
            message: err.to_string(),
        }
    }
}

fn fetch_failure(err: VcsError, repository: &str) -> Abort {
    match err {
        VcsError::Unauthorized | VcsError::Forbidden(_) | VcsError::NotFound(_) => {
            err.into_access(repository).into()
        }
        other => Abort::internal(format!("fetching {} failed: {}", repository, other)),
    }
}

/// Runs scans. Cheap to share; holds only handles.
pub struct ScanOrchestrator {
    store: Arc<dyn ScanStore>,
    vcs: Arc<dyn VcsClient>,
    detector: Arc<dyn LicenseDetector>,
    matrix: SharedMatrix,
    reporter: Reporter,
    work_dir: PathBuf,
    retry_backoff: Duration,
}

impl ScanOrchestrator {
    pub fn new(
        store: Arc<dyn ScanStore>,
        vcs: Arc<dyn VcsClient>,
        detector: Arc<dyn LicenseDetector>,
        matrix: SharedMatrix,
        reporter: Reporter,
        work_dir: PathBuf,
        retry_backoff: Duration,
    ) -> Self {
        Self {
            store,
            vcs,
            detector,
            matrix,
            reporter,
            work_dir,
            retry_backoff,
        }
    }

    pub fn reporter(&self) -> &Reporter {
        &self.reporter
    }

    pub fn vcs(&self) -> &Arc<dyn VcsClient> {
        &self.vcs
    }

    /// Matrix handle shared with the reload endpoint.
    pub fn matrix(&self) -> &SharedMatrix {
        &self.matrix
    }

    /// Run `item` to a terminal state. Never fails; problems become
    /// `INTERNAL_ERROR` or `NO_ACCESS` outcomes.
    pub async fn run(&self, mut item: WorkItem) -> ScanOutcome {
        let mut phases = PhaseTracker::new(item.id);
        info!(
            target: "scan",
            item = %item.id,
            repository = %item.repository,
            pull_request = item.pull_request,
            head_sha = %item.head_sha,
            "Scan started"
        );

        match self.scan(&mut item, &mut phases).await {
            Ok(result) => {
                phases.advance(ScanPhase::Finished(result.status));
                self.complete(item, result).await
            }
            Err(abort) => {
                phases.advance(ScanPhase::Finished(abort.status));
                self.finish_failed(item, abort.status, abort.message).await
            }
        }
    }

    async fn scan(
        &self,
        item: &mut WorkItem,
        phases: &mut PhaseTracker,
    ) -> Result<ScanResult, Abort> {
        let repository = item.repository.full_name();

        phases.advance(ScanPhase::Fetching);
        self.vcs
            .authenticate(&item.repository)
            .await
            .map_err(|e| fetch_failure(e, &repository))?;
        let pr = self
            .vcs
            .fetch_pull_request(&item.repository, item.pull_request)
            .await
            .map_err(|e| fetch_failure(e, &repository))?;
        if pr.head_sha != item.head_sha {
            debug!(target: "scan", item = %item.id, from = %item.head_sha, to = %pr.head_sha, "Head moved since trigger");
        }
        item.head_sha = pr.head_sha;
        item.head_ref = pr.head_ref;
        item.base_ref = Some(pr.base_ref);
        item.fork_url = pr.fork_url.or(item.fork_url.take());
        if item.pull_request_url.is_none() {
            item.pull_request_url = pr.html_url;
        }

        let files = self
            .vcs
            .fetch_pull_request_diff(&item.repository, item.pull_request)
            .await
            .map_err(|e| fetch_failure(e, &repository))?;
        // Only an undeclared license falls back; lookup failures abort.
        let repository_license = self
            .vcs
            .fetch_repository_license(&item.repository)
            .await
            .map_err(|e| fetch_failure(e, &repository))?
            .unwrap_or_else(|| DEFAULT_REPOSITORY_LICENSE.to_string());

        phases.advance(ScanPhase::Scanning);
        let workspace = diff::materialize(&self.work_dir, &files)
            .await
            .map_err(|e| Abort::internal(format!("preparing scan directory failed: {}", e)))?;
        debug!(
            target: "scan",
            item = %item.id,
            files = workspace.file_count(),
            skipped = workspace.skipped().len(),
            "Diff materialized"
        );

        let mut findings = if workspace.file_count() == 0 {
            Vec::new()
        } else {
            let detection = self.detect_with_retry(item.id, &workspace).await;
            if let Some(err) = detection.error {
                return Err(Abort::internal(format!(
                    "license detection failed after retry ({} partial findings): {}",
                    detection.findings.len(),
                    err
                )));
            }
            detection.findings
        };
        for finding in &mut findings {
            finding.patch = workspace.excerpt(&finding.path, &finding.line_spans(), EXCERPT_LINES);
        }
        drop(workspace);

        phases.advance(ScanPhase::Classifying);
        let matrix = self.matrix.snapshot().await;
        let classified = matrix.classify_findings(findings, std::slice::from_ref(&repository_license));
        if !classified.unreviewed.is_empty() {
            match self
                .store
                .register_unreviewed_licenses(&classified.unreviewed)
                .await
            {
                Ok(added) if added > 0 => {
                    info!(target: "scan", added, "Registered unreviewed licenses")
                }
                Ok(_) => {}
                Err(e) => warn!(target: "scan", error = %e, "Failed to register unreviewed licenses"),
            }
        }

        let result = ScanResult::new(
            classified.findings,
            classified.conflicts,
            repository_license,
            classified.unreviewed,
            item.head_sha.clone(),
        );

        phases.advance(ScanPhase::Reporting);
        Ok(result)
    }

    async fn detect_with_retry(&self, id: Uuid, workspace: &diff::Workspace) -> Detection {
        let first = self.detector.detect(workspace.path()).await;
        let Some(ref err) = first.error else {
            return first;
        };
        warn!(
            target: "scan",
            item = %id,
            error = %err,
            partial = first.findings.len(),
            "Detector failed, retrying once"
        );
        tokio::time::sleep(self.retry_backoff).await;
        self.detector.detect(workspace.path()).await
    }

    /// Persist and report a classified result.
    async fn complete(&self, item: WorkItem, result: ScanResult) -> ScanOutcome {
        let outcome = ScanOutcome::finished(item, result);

        if let Err(e) = self.store.save_scan(&outcome).await {
            error!(target: "scan", item = %outcome.item.id, error = %e, "Failed to persist scan result");
            return self
                .finish_failed(
                    outcome.item,
                    ScanStatus::InternalError,
                    format!("persisting result failed: {}", e),
                )
                .await;
        }

        if let Some(ref result) = outcome.result {
            if let Err(e) = self.reporter.report(result, &outcome.item).await {
                error!(target: "scan", item = %outcome.item.id, error = %e, "Reporting failed; result kept");
            }
            info!(
                target: "scan",
                item = %outcome.item.id,
                repository = %outcome.item.repository,
                pull_request = outcome.item.pull_request,
                status = %outcome.status,
                findings = result.findings.len(),
                conflicts = result.conflicts.len(),
                "Scan finished"
            );
        }
        outcome
    }

    /// Record a terminal failure: persist it and report a commit status only.
    pub async fn finish_failed(
        &self,
        item: WorkItem,
        status: ScanStatus,
        message: impl Into<String>,
    ) -> ScanOutcome {
        let outcome = ScanOutcome::failed(item, status, message);
        warn!(
            target: "scan",
            item = %outcome.item.id,
            repository = %outcome.item.repository,
            pull_request = outcome.item.pull_request,
            status = %status,
            error = outcome.error_message.as_deref().unwrap_or_default(),
            "Scan failed"
        );

        if let Err(e) = self.store.save_scan(&outcome).await {
            error!(target: "scan", item = %outcome.item.id, error = %e, "Failed to persist scan failure");
        }
        if let Err(e) = self
            .reporter
            .report_status(&outcome.item, outcome.head_sha(), status)
            .await
        {
            error!(target: "scan", item = %outcome.item.id, error = %e, "Failed to report scan failure");
        }
        outcome
    }
}

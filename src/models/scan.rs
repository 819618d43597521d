//! Scan lifecycle, findings and results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::history::{ScanDetail, ScanSummary};
use super::license::{ConflictPair, LicenseAccess};
use super::work_item::WorkItem;

/// Externally visible status of a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    Pending,
    Scanning,
    Completed,
    IssuesDetected,
    InternalError,
    NoAccess,
}

impl ScanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Scanning => "scanning",
            Self::Completed => "completed",
            Self::IssuesDetected => "issues_detected",
            Self::InternalError => "internal_error",
            Self::NoAccess => "no_access",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "scanning" => Some(Self::Scanning),
            "completed" => Some(Self::Completed),
            "issues_detected" => Some(Self::IssuesDetected),
            "internal_error" => Some(Self::InternalError),
            "no_access" => Some(Self::NoAccess),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending | Self::Scanning)
    }

    /// Human readable status, as shown in history views.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Pending => "Scan is queued",
            Self::Scanning => "Scan is scheduled",
            Self::Completed => "Scan completed",
            Self::IssuesDetected => "License issues detected",
            Self::InternalError => "Scanning process failed",
            Self::NoAccess => "Cannot access the pull request",
        }
    }

    /// Commit status state and description reported on the head commit.
    pub fn commit_status(&self) -> (CommitState, &'static str) {
        match self {
            Self::Pending | Self::Scanning => (CommitState::Pending, "Scanning opensource licenses"),
            Self::Completed => (CommitState::Success, "No license issue detected"),
            Self::IssuesDetected => (CommitState::Failure, "Potential license problem(s) detected"),
            Self::InternalError => (CommitState::Error, "Scanning process failed"),
            Self::NoAccess => (CommitState::Error, "Cannot access the pull request"),
        }
    }
}

impl std::fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Internal state of one scan run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanPhase {
    Pending,
    Fetching,
    Scanning,
    Classifying,
    Reporting,
    Finished(ScanStatus),
}

impl ScanPhase {
    /// Whether `next` is a legal successor of `self`.
    pub fn can_advance_to(&self, next: ScanPhase) -> bool {
        use ScanPhase::*;
        match (*self, next) {
            (Finished(_), _) => false,
            (_, Finished(ScanStatus::InternalError)) => true,
            (Pending, Fetching) => true,
            (Fetching, Scanning) => true,
            (Fetching, Finished(ScanStatus::NoAccess)) => true,
            (Scanning, Classifying) => true,
            (Classifying, Reporting) => true,
            (Reporting, Finished(ScanStatus::Completed | ScanStatus::IssuesDetected)) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for ScanPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Fetching => write!(f, "FETCHING"),
            Self::Scanning => write!(f, "SCANNING"),
            Self::Classifying => write!(f, "CLASSIFYING"),
            Self::Reporting => write!(f, "REPORTING"),
            Self::Finished(status) => write!(f, "{}", status.as_str().to_uppercase()),
        }
    }
}

/// Commit status states understood by the VCS host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum CommitState {
    Pending,
    Success,
    Failure,
    Error,
}

impl CommitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Error => "error",
        }
    }
}

/// How the detector matched a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    /// The whole file matches an upstream file.
    File,
    /// Part of the file matches upstream code.
    Snippet,
}

/// Upstream component a file was matched against.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ComponentRef {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_url: Option<String>,
    /// Matched line range in the upstream file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oss_lines: Option<String>,
}

impl ComponentRef {
    /// `vendor/name@version`, omitting missing parts.
    pub fn label(&self) -> Option<String> {
        let name = self.name.as_deref()?;
        let mut label = match self.vendor.as_deref() {
            Some(vendor) if !vendor.is_empty() => format!("{}/{}", vendor, name),
            _ => name.to_string(),
        };
        if let Some(version) = self.version.as_deref().filter(|v| !v.is_empty()) {
            label.push('@');
            label.push_str(version);
        }
        Some(label)
    }
}

/// One license detected in a file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct LicenseMatch {
    /// Name as emitted by the detector.
    pub name: String,
    /// Canonical identifier after resolution.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    pub access: LicenseAccess,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checklist_url: Option<String>,
}

impl LicenseMatch {
    pub fn unresolved(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            identifier: None,
            access: LicenseAccess::Unreviewed,
            checklist_url: None,
        }
    }

    /// Identifier used for conflict lookup and display.
    pub fn key(&self) -> &str {
        self.identifier.as_deref().unwrap_or(&self.name)
    }
}

/// Per-file detection result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct FileFinding {
    /// Path relative to the repository root.
    pub path: String,
    pub match_kind: MatchKind,
    /// Match strength, 0-100.
    pub match_percent: u8,
    /// Matched local lines, `all` or `a-b,c-d`.
    pub matched_lines: String,
    pub licenses: Vec<LicenseMatch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub component: Option<ComponentRef>,
    /// Local source lines covered by the match, for report excerpts.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub patch: Vec<String>,
    pub classification: LicenseAccess,
}

impl FileFinding {
    /// Parsed matched line spans; empty when the whole file matched.
    pub fn line_spans(&self) -> Vec<(u32, u32)> {
        parse_line_spans(&self.matched_lines)
    }
}

/// Parse `1-10,20-30` (single numbers allowed). `all` and garbage yield nothing.
pub fn parse_line_spans(raw: &str) -> Vec<(u32, u32)> {
    raw.split(',')
        .filter_map(|part| {
            let part = part.trim();
            match part.split_once('-') {
                Some((a, b)) => Some((a.trim().parse().ok()?, b.trim().parse().ok()?)),
                None => {
                    let n = part.parse().ok()?;
                    Some((n, n))
                }
            }
        })
        .collect()
}

/// Aggregate outcome of one scan.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ScanResult {
    pub findings: Vec<FileFinding>,
    pub conflicts: Vec<ConflictPair>,
    /// Declared license of the repository, `Proprietary` when none.
    pub repository_license: String,
    /// Detected license names the catalog does not know.
    pub unreviewed_licenses: Vec<String>,
    pub has_issue: bool,
    pub status: ScanStatus,
    /// Commit the result applies to.
    pub head_sha: String,
    pub scanned_at: DateTime<Utc>,
}

impl ScanResult {
    /// Derive `has_issue` and the terminal status from findings and conflicts.
    pub fn new(
        findings: Vec<FileFinding>,
        conflicts: Vec<ConflictPair>,
        repository_license: String,
        unreviewed_licenses: Vec<String>,
        head_sha: String,
    ) -> Self {
        let has_issue =
            !conflicts.is_empty() || findings.iter().any(|f| f.classification.is_issue());
        let status = if has_issue {
            ScanStatus::IssuesDetected
        } else {
            ScanStatus::Completed
        };
        Self {
            findings,
            conflicts,
            repository_license,
            unreviewed_licenses,
            has_issue,
            status,
            head_sha,
            scanned_at: Utc::now(),
        }
    }
}

/// Terminal record of one work item, as handed to persistence.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanOutcome {
    pub item: WorkItem,
    pub status: ScanStatus,
    /// Present when the scan reached classification.
    pub result: Option<ScanResult>,
    pub error_message: Option<String>,
}

impl ScanOutcome {
    pub fn finished(item: WorkItem, result: ScanResult) -> Self {
        Self {
            item,
            status: result.status,
            result: Some(result),
            error_message: None,
        }
    }

    pub fn failed(item: WorkItem, status: ScanStatus, error: impl Into<String>) -> Self {
        Self {
            item,
            status,
            result: None,
            error_message: Some(error.into()),
        }
    }

    pub fn has_issue(&self) -> bool {
        self.result.as_ref().is_some_and(|r| r.has_issue)
    }

    /// Commit the outcome refers to.
    pub fn head_sha(&self) -> &str {
        self.result
            .as_ref()
            .map(|r| r.head_sha.as_str())
            .unwrap_or(&self.item.head_sha)
    }

    pub fn summary(&self, id: uuid::Uuid) -> ScanSummary {
        ScanSummary {
            id,
            repository: self.item.repository.full_name(),
            organization: self.item.repository.owner.clone(),
            pull_request: self.item.pull_request,
            pull_request_url: self.item.pull_request_url.clone(),
            head_ref: self.item.head_ref.clone(),
            head_sha: self.head_sha().to_string(),
            sender: self.item.sender.clone(),
            action: self.item.action,
            status: self.status,
            status_description: self.status.description().to_string(),
            has_issue: self.has_issue(),
            repository_license: self.result.as_ref().map(|r| r.repository_license.clone()),
            scanned_at: self
                .result
                .as_ref()
                .map(|r| r.scanned_at)
                .unwrap_or_else(Utc::now),
        }
    }

    pub fn detail(&self, id: uuid::Uuid) -> ScanDetail {
        ScanDetail {
            summary: self.summary(id),
            source_url: self.item.source_url().to_string(),
            findings: self
                .result
                .as_ref()
                .map(|r| r.findings.clone())
                .unwrap_or_default(),
            conflicts: self
                .result
                .as_ref()
                .map(|r| r.conflicts.clone())
                .unwrap_or_default(),
            error_message: self.error_message.clone(),
        }
    }
}

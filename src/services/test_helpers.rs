//! In-process fakes for the VCS host and the detector.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::detector::{Detection, LicenseDetector};
use super::github::{ChangedFile, PullRequestInfo, VcsClient};
use crate::error::VcsError;
use crate::models::{CommitState, FileFinding, LicenseMatch, MatchKind, RepoRef};
use crate::models::LicenseAccess;

/// Records every write; reads are served from the public fields.
#[derive(Default)]
pub struct RecordingVcs {
    pub head_sha: Mutex<String>,
    pub files: Mutex<Vec<ChangedFile>>,
    pub license: Mutex<Option<String>>,
    /// Returned by every read when set.
    pub access_error: Mutex<Option<VcsError>>,
    /// Popped (last first) by `set_commit_status` before succeeding.
    pub status_failures: Mutex<Vec<VcsError>>,
    /// Popped (last first) by `post_or_update_comment` before succeeding.
    pub comment_failures: Mutex<Vec<VcsError>>,
    /// Returned by `fetch_repository_license` when set.
    pub license_error: Mutex<Option<VcsError>>,
    pub statuses: Mutex<Vec<(String, CommitState, String)>>,
    pub comments: Mutex<Vec<(u64, String)>>,
}

impl RecordingVcs {
    pub fn with_diff(head_sha: &str, files: Vec<ChangedFile>, license: Option<&str>) -> Self {
        let vcs = Self::default();
        *vcs.head_sha.lock().unwrap() = head_sha.to_string();
        *vcs.files.lock().unwrap() = files;
        *vcs.license.lock().unwrap() = license.map(str::to_string);
        vcs
    }

    pub fn statuses(&self) -> Vec<(String, CommitState, String)> {
        self.statuses.lock().unwrap().clone()
    }

    pub fn comments(&self) -> Vec<(u64, String)> {
        self.comments.lock().unwrap().clone()
    }

    fn check_access(&self) -> Result<(), VcsError> {
        match self.access_error.lock().unwrap().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

pub fn changed(path: &str, patch: &str) -> ChangedFile {
    ChangedFile {
        path: path.to_string(),
        status: Some("added".to_string()),
        patch: Some(patch.to_string()),
    }
}

#[async_trait]
impl VcsClient for RecordingVcs {
    async fn authenticate(&self, _repo: &RepoRef) -> Result<(), VcsError> {
        self.check_access()
    }

    async fn fetch_pull_request(
        &self,
        _repo: &RepoRef,
        number: u64,
    ) -> Result<PullRequestInfo, VcsError> {
        self.check_access()?;
        Ok(PullRequestInfo {
            number,
            head_ref: "feature".to_string(),
            head_sha: self.head_sha.lock().unwrap().clone(),
            base_ref: "main".to_string(),
            html_url: None,
            repository_url: None,
            fork_url: None,
        })
    }

    async fn fetch_pull_request_diff(
        &self,
        _repo: &RepoRef,
        _number: u64,
    ) -> Result<Vec<ChangedFile>, VcsError> {
        self.check_access()?;
        Ok(self.files.lock().unwrap().clone())
    }

    async fn fetch_repository_license(&self, _repo: &RepoRef) -> Result<Option<String>, VcsError> {
        self.check_access()?;
        if let Some(err) = self.license_error.lock().unwrap().clone() {
            return Err(err);
        }
        Ok(self.license.lock().unwrap().clone())
    }

    async fn set_commit_status(
        &self,
        _repo: &RepoRef,
        sha: &str,
        state: CommitState,
        description: &str,
    ) -> Result<(), VcsError> {
        if let Some(err) = self.status_failures.lock().unwrap().pop() {
            return Err(err);
        }
        self.statuses
            .lock()
            .unwrap()
            .push((sha.to_string(), state, description.to_string()));
        Ok(())
    }

    async fn post_or_update_comment(
        &self,
        _repo: &RepoRef,
        number: u64,
        marker: &str,
        body: &str,
    ) -> Result<(), VcsError> {
        assert!(body.contains(marker));
        if let Some(err) = self.comment_failures.lock().unwrap().pop() {
            return Err(err);
        }
        let mut comments = self.comments.lock().unwrap();
        match comments.iter_mut().find(|(n, _)| *n == number) {
            Some(existing) => existing.1 = body.to_string(),
            None => comments.push((number, body.to_string())),
        }
        Ok(())
    }
}

/// Hands out prepared detections in order, then repeats the last one.
pub struct ScriptedDetector {
    script: Mutex<VecDeque<Detection>>,
    last: Mutex<Detection>,
    pub calls: Mutex<usize>,
    /// Files present in the scan directory at each call.
    pub seen_files: Mutex<Vec<Vec<String>>>,
}

impl ScriptedDetector {
    pub fn new(script: Vec<Detection>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            last: Mutex::new(Detection::default()),
            calls: Mutex::new(0),
            seen_files: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

fn list_files(root: &Path) -> Vec<String> {
    let mut out = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else if let Ok(relative) = path.strip_prefix(root) {
                out.push(relative.to_string_lossy().to_string());
            }
        }
    }
    out.sort();
    out
}

#[async_trait]
impl LicenseDetector for ScriptedDetector {
    async fn detect(&self, root: &Path) -> Detection {
        *self.calls.lock().unwrap() += 1;
        self.seen_files.lock().unwrap().push(list_files(root));
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(detection) => {
                *self.last.lock().unwrap() = detection.clone();
                detection
            }
            None => self.last.lock().unwrap().clone(),
        }
    }
}

pub fn detected(path: &str, licenses: &[&str]) -> FileFinding {
    FileFinding {
        path: path.to_string(),
        match_kind: MatchKind::File,
        match_percent: 100,
        matched_lines: "all".to_string(),
        licenses: licenses.iter().map(|l| LicenseMatch::unresolved(*l)).collect(),
        component: None,
        patch: Vec::new(),
        classification: LicenseAccess::Unreviewed,
    }
}

/// Blocks every detection until released; tracks how many run at once.
pub struct GatedDetector {
    gate: tokio::sync::Semaphore,
    running: AtomicUsize,
    peak: AtomicUsize,
    finished: AtomicUsize,
}

impl Default for GatedDetector {
    fn default() -> Self {
        Self {
            gate: tokio::sync::Semaphore::new(0),
            running: AtomicUsize::default(),
            peak: AtomicUsize::default(),
            finished: AtomicUsize::default(),
        }
    }
}

impl GatedDetector {
    pub fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }

    pub fn running(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }

    /// Poll until `n` detections are blocked on the gate.
    pub async fn wait_running(&self, n: usize) {
        for _ in 0..400 {
            if self.running() >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("expected {} running detections, saw {}", n, self.running());
    }
}

#[async_trait]
impl LicenseDetector for GatedDetector {
    async fn detect(&self, _root: &Path) -> Detection {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.gate.acquire().await.unwrap().forget();
        self.running.fetch_sub(1, Ordering::SeqCst);
        self.finished.fetch_add(1, Ordering::SeqCst);
        Detection::default()
    }
}

//! Detector adapter: runs the external content-matching tool and parses its
//! line-delimited JSON output as it streams.

use std::collections::VecDeque;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn};

use crate::config::ScannerSettings;
use crate::error::DetectorError;
use crate::models::{ComponentRef, FileFinding, LicenseAccess, LicenseMatch, MatchKind};

const STDERR_TAIL_LINES: usize = 20;

/// Findings parsed so far plus the first failure, if any.
///
/// A set `error` does not discard `findings`: everything well-formed that
/// was read before the failure is kept.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Detection {
    pub findings: Vec<FileFinding>,
    pub error: Option<DetectorError>,
}

impl Detection {
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }

    fn fail(&mut self, err: DetectorError) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }
}

/// Something that can find license matches in a directory.
#[async_trait]
pub trait LicenseDetector: Send + Sync {
    async fn detect(&self, root: &Path) -> Detection;
}

#[derive(Debug, Deserialize)]
struct DetectorRecord {
    file: String,
    id: String,
    #[serde(default)]
    matched: Option<String>,
    #[serde(default)]
    lines: Option<String>,
    #[serde(default)]
    oss_lines: Option<String>,
    #[serde(default)]
    component: Option<String>,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    vendor: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    file_url: Option<String>,
    #[serde(default)]
    licenses: Vec<RecordLicense>,
}

#[derive(Debug, Deserialize)]
struct RecordLicense {
    name: String,
    #[serde(default)]
    checklist_url: Option<String>,
}

/// Parse one output line. `Ok(None)` for blank lines and non-matches.
pub fn parse_record(line: &str, root: &Path) -> Result<Option<FileFinding>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let record: DetectorRecord = serde_json::from_str(line).map_err(|e| e.to_string())?;

    let match_kind = match record.id.as_str() {
        "none" => return Ok(None),
        "file" => MatchKind::File,
        "snippet" => MatchKind::Snippet,
        other => return Err(format!("unknown match id '{}'", other)),
    };

    let match_percent = match record.matched.as_deref() {
        Some(raw) => parse_percent(raw)?,
        None if match_kind == MatchKind::File => 100,
        None => 0,
    };

    let component = record.component.as_ref().map(|name| ComponentRef {
        name: Some(name.clone()),
        version: record.version.clone(),
        vendor: record.vendor.clone(),
        url: record.url.clone(),
        file_url: record.file_url.clone(),
        oss_lines: record.oss_lines.clone(),
    });

    let licenses = record
        .licenses
        .into_iter()
        .filter(|l| !l.name.trim().is_empty())
        .map(|l| LicenseMatch {
            checklist_url: l.checklist_url,
            ..LicenseMatch::unresolved(l.name.trim())
        })
        .collect();

    Ok(Some(FileFinding {
        path: relative_path(&record.file, root),
        match_kind,
        match_percent,
        matched_lines: record.lines.unwrap_or_else(|| "all".to_string()),
        licenses,
        component,
        patch: Vec::new(),
        classification: LicenseAccess::Unreviewed,
    }))
}

fn parse_percent(raw: &str) -> Result<u8, String> {
    let value: f32 = raw
        .trim()
        .trim_end_matches('%')
        .trim()
        .parse()
        .map_err(|_| format!("invalid match percentage '{}'", raw))?;
    Ok(value.round().clamp(0.0, 100.0) as u8)
}

fn relative_path(file: &str, root: &Path) -> String {
    let path = Path::new(file);
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .to_string_lossy()
        .trim_start_matches("./")
        .trim_start_matches('/')
        .to_string()
}

/// Runs the configured command with the scan directory as last argument.
#[derive(Debug, Clone)]
pub struct ProcessDetector {
    command: String,
    args: Vec<String>,
    timeout: Duration,
}

impl ProcessDetector {
    pub fn new(settings: &ScannerSettings) -> Self {
        Self {
            command: settings.command.clone(),
            args: settings.args.clone(),
            timeout: Duration::from_secs(settings.timeout_secs),
        }
    }
}

#[async_trait]
impl LicenseDetector for ProcessDetector {
    async fn detect(&self, root: &Path) -> Detection {
        let mut detection = Detection::default();
        let deadline = Instant::now() + self.timeout;

        let mut child = match Command::new(&self.command)
            .args(&self.args)
            .arg(root)
            .current_dir(root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                detection.fail(DetectorError::Spawn {
                    command: self.command.clone(),
                    reason: e.to_string(),
                });
                return detection;
            }
        };

        let stderr_tail = child.stderr.take().map(|stderr| {
            tokio::spawn(async move {
                let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if tail.len() == STDERR_TAIL_LINES {
                        tail.pop_front();
                    }
                    tail.push_back(line);
                }
                Vec::from(tail).join("\n")
            })
        });

        let Some(stdout) = child.stdout.take() else {
            detection.fail(DetectorError::Io("stdout was not captured".to_string()));
            return detection;
        };

        let read = async {
            let mut lines = BufReader::new(stdout).lines();
            let mut line_no = 0usize;
            while let Some(line) = lines.next_line().await? {
                line_no += 1;
                match parse_record(&line, root) {
                    Ok(Some(finding)) => detection.findings.push(finding),
                    Ok(None) => {}
                    Err(reason) => {
                        warn!(target: "detector", line = line_no, %reason, "Skipping malformed detector record");
                        detection.fail(DetectorError::MalformedRecord {
                            line: line_no,
                            reason,
                        });
                    }
                }
            }
            Ok::<_, std::io::Error>(())
        };

        let read_outcome = timeout_at(deadline, read).await;
        let timed_out = match read_outcome {
            Ok(Ok(())) => false,
            Ok(Err(e)) => {
                detection.fail(DetectorError::Io(e.to_string()));
                false
            }
            Err(_) => true,
        };

        let status = if timed_out {
            None
        } else {
            timeout_at(deadline, child.wait()).await.ok()
        };

        match status {
            None => {
                if let Err(e) = child.kill().await {
                    warn!(target: "detector", error = %e, "Failed to kill timed out detector");
                }
                detection.fail(DetectorError::Timeout(self.timeout.as_secs()));
            }
            Some(Err(e)) => detection.fail(DetectorError::Io(e.to_string())),
            Some(Ok(status)) if status.success() => {}
            Some(Ok(status)) => match status.code() {
                Some(code) => detection.fail(DetectorError::ExitStatus(code)),
                None => detection.fail(DetectorError::Killed),
            },
        }

        if let Some(task) = stderr_tail
            && let Ok(tail) = task.await
            && !tail.is_empty()
        {
            if detection.is_complete() {
                debug!(target: "detector", stderr = %tail, "Detector stderr");
            } else {
                warn!(target: "detector", stderr = %tail, "Detector stderr");
            }
        }

        debug!(
            target: "detector",
            findings = detection.findings.len(),
            complete = detection.is_complete(),
            "Detector finished"
        );
        detection
    }
}

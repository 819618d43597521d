//! Reporter: commit statuses and the pull request summary comment, plus the
//! standalone HTML report served from history.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use super::github::VcsClient;
use crate::config::{ReporterSettings, STATUS_CONTEXT};
use crate::error::{ReportError, VcsError};
use crate::models::{
    FileFinding, LicenseAccess, LicenseMatch, ScanDetail, ScanResult, ScanStatus, WorkItem,
};

/// Hidden marker identifying the comment this service owns on a pull request.
pub const REPORT_MARKER: &str = "<!-- license-pre-validation-report -->";

/// Posts results back to the VCS host with bounded retries.
#[derive(Clone)]
pub struct Reporter {
    vcs: Arc<dyn VcsClient>,
    max_attempts: u32,
    backoff: Duration,
}

impl Reporter {
    pub fn new(vcs: Arc<dyn VcsClient>, settings: &ReporterSettings) -> Self {
        Self {
            vcs,
            max_attempts: settings.max_attempts.max(1),
            backoff: Duration::from_millis(settings.backoff_ms),
        }
    }

    /// `pending` status on the head commit while the item waits or runs.
    pub async fn mark_pending(&self, item: &WorkItem) -> Result<(), ReportError> {
        self.report_status(item, &item.head_sha, ScanStatus::Pending)
            .await
    }

    /// Commit status only, used for terminal states without a result.
    pub async fn report_status(
        &self,
        item: &WorkItem,
        sha: &str,
        status: ScanStatus,
    ) -> Result<(), ReportError> {
        let (state, description) = status.commit_status();
        self.with_retry("commit status", || {
            self.vcs
                .set_commit_status(&item.repository, sha, state, description)
        })
        .await
    }

    /// Upsert the summary comment, then set the terminal commit status.
    ///
    /// The status is attempted even when the comment could not be posted;
    /// otherwise the head commit would stay `pending` forever. The comment
    /// error is returned after the status has been set.
    pub async fn report(&self, result: &ScanResult, item: &WorkItem) -> Result<(), ReportError> {
        let body = build_comment(result, item);
        let commented = self
            .with_retry("summary comment", || {
                self.vcs.post_or_update_comment(
                    &item.repository,
                    item.pull_request,
                    REPORT_MARKER,
                    &body,
                )
            })
            .await;
        if let Err(ref e) = commented {
            warn!(
                target: "report",
                repository = %item.repository,
                pull_request = item.pull_request,
                error = %e,
                "Summary comment failed, setting commit status anyway"
            );
        }

        self.report_status(item, &result.head_sha, result.status)
            .await?;
        commented?;

        info!(
            target: "report",
            repository = %item.repository,
            pull_request = item.pull_request,
            status = %result.status,
            "Results reported"
        );
        Ok(())
    }

    async fn with_retry<F, Fut>(&self, what: &str, mut call: F) -> Result<(), ReportError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(), VcsError>>,
    {
        let mut delay = self.backoff;
        let mut attempt = 1;
        loop {
            let err = match call().await {
                Ok(()) => return Ok(()),
                Err(e) => ReportError::from(e),
            };
            if !err.is_retryable() {
                return Err(err);
            }
            if attempt >= self.max_attempts {
                return Err(ReportError::Exhausted {
                    attempts: attempt,
                    last: err.to_string(),
                });
            }
            warn!(
                target: "report",
                what,
                attempt,
                error = %err,
                delay_ms = delay.as_millis() as u64,
                "Report call failed, retrying"
            );
            tokio::time::sleep(delay).await;
            delay = delay.saturating_mul(2);
            attempt += 1;
        }
    }
}

fn md_cell(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}

fn license_label(m: &LicenseMatch) -> String {
    if m.access == LicenseAccess::Unreviewed && m.identifier.is_none() {
        return format!("UNREVIEWED LICENSE : {}", m.name);
    }
    match m.checklist_url {
        Some(ref url) => format!("[{}]({})", m.key(), url),
        None => m.key().to_string(),
    }
}

/// `<source>/blob/<sha>/<path>` plus `#La-Lb` per matched span.
fn line_links(source_url: &str, sha: &str, finding: &FileFinding) -> Vec<(String, String)> {
    let base = format!(
        "{}/blob/{}/{}",
        source_url.trim_end_matches('/'),
        sha,
        finding.path
    );
    let spans = finding.line_spans();
    if spans.is_empty() {
        return vec![(finding.matched_lines.clone(), base)];
    }
    spans
        .into_iter()
        .map(|(from, to)| {
            let label = if from == to {
                from.to_string()
            } else {
                format!("{}-{}", from, to)
            };
            let anchor = if from == to {
                format!("#L{}", from)
            } else {
                format!("#L{}-L{}", from, to)
            };
            (label, format!("{}{}", base, anchor))
        })
        .collect()
}

fn headline(result_has_issue: bool) -> &'static str {
    if result_has_issue {
        ScanStatus::IssuesDetected.commit_status().1
    } else {
        ScanStatus::Completed.commit_status().1
    }
}

/// Markdown body of the pull request comment.
pub fn build_comment(result: &ScanResult, item: &WorkItem) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", REPORT_MARKER);
    let _ = writeln!(out, "**{}** {}", STATUS_CONTEXT, headline(result.has_issue));
    out.push('\n');
    let _ = writeln!(
        out,
        "Repository license: `{}` | Commit: `{}`",
        result.repository_license,
        result.head_sha.chars().take(12).collect::<String>()
    );
    out.push('\n');

    if result.findings.is_empty() {
        out.push_str("No changed file matched known open source code.\n");
    } else {
        out.push_str("**Detected licenses:**\n\n");
        out.push_str("| File | License(s) | Classification | Match | Lines | Component |\n");
        out.push_str("|---|---|---|---|---|---|\n");
        for finding in &result.findings {
            let licenses = finding
                .licenses
                .iter()
                .map(license_label)
                .collect::<Vec<_>>()
                .join(", ");
            let lines = line_links(item.source_url(), &result.head_sha, finding)
                .into_iter()
                .map(|(label, url)| format!("[{}]({})", label, url))
                .collect::<Vec<_>>()
                .join(" ");
            let component = finding
                .component
                .as_ref()
                .and_then(|c| c.label())
                .unwrap_or_default();
            let _ = writeln!(
                out,
                "| `{}` | {} | {} | {}% | {} | {} |",
                md_cell(&finding.path),
                md_cell(&licenses),
                finding.classification.as_str(),
                finding.match_percent,
                lines,
                md_cell(&component)
            );
        }
    }

    if !result.conflicts.is_empty() {
        out.push_str("\n**Detected license conflicts:**\n\n");
        for pair in &result.conflicts {
            let _ = writeln!(out, "- {} and {}", pair.first, pair.second);
        }
    }

    if !result.unreviewed_licenses.is_empty() {
        out.push_str("\n**Licenses pending review:**\n\n");
        for name in &result.unreviewed_licenses {
            let _ = writeln!(out, "- UNREVIEWED LICENSE : {}", name);
        }
    }

    out
}

fn html_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn classification_explanation(access: LicenseAccess) -> &'static str {
    match access {
        LicenseAccess::Prohibited => {
            "Code under these licenses must not be included. Remove or replace it."
        }
        LicenseAccess::Restricted => {
            "Code under these licenses needs legal review or conflicts with other licenses in this pull request."
        }
        LicenseAccess::Unreviewed => {
            "These licenses are not in the catalog yet. Ask the license team to review them."
        }
        LicenseAccess::Permitted => "These licenses are approved for use.",
    }
}

const CLASSIFICATION_ORDER: [LicenseAccess; 4] = [
    LicenseAccess::Prohibited,
    LicenseAccess::Restricted,
    LicenseAccess::Unreviewed,
    LicenseAccess::Permitted,
];

/// Standalone HTML page for one stored scan.
/// Findings are grouped by classification, then license, then component.
pub fn build_html_report(detail: &ScanDetail) -> String {
    let summary = &detail.summary;
    let mut out = String::new();
    let title = format!(
        "{} #{} license report",
        summary.repository, summary.pull_request
    );

    let _ = write!(
        out,
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n<title>{}</title>\n\
         <style>body{{font-family:sans-serif;margin:2em}}table{{border-collapse:collapse}}\
         td,th{{border:1px solid #ccc;padding:4px 8px;text-align:left}}\
         .prohibited{{color:#b00020}}.restricted{{color:#c77700}}.unreviewed{{color:#555}}\
         .permitted{{color:#1b7f3b}}</style>\n</head>\n<body>\n",
        html_escape(&title)
    );
    let _ = writeln!(out, "<h1>{}</h1>", html_escape(&title));
    let _ = writeln!(
        out,
        "<p>Status: <strong>{}</strong> ({})<br>Commit: <code>{}</code><br>Branch: <code>{}</code><br>Repository license: <code>{}</code><br>Scanned at: {}</p>",
        html_escape(summary.status.as_str()),
        html_escape(&summary.status_description),
        html_escape(&summary.head_sha),
        html_escape(&summary.head_ref),
        html_escape(summary.repository_license.as_deref().unwrap_or("unknown")),
        summary.scanned_at.to_rfc3339()
    );
    if let Some(ref message) = detail.error_message {
        let _ = writeln!(out, "<p class=\"prohibited\">Error: {}</p>", html_escape(message));
    }

    // classification -> license -> component -> findings
    let mut groups: BTreeMap<usize, BTreeMap<String, BTreeMap<String, Vec<&FileFinding>>>> =
        BTreeMap::new();
    for finding in &detail.findings {
        let rank = CLASSIFICATION_ORDER
            .iter()
            .position(|a| *a == finding.classification)
            .unwrap_or(CLASSIFICATION_ORDER.len());
        let component = finding
            .component
            .as_ref()
            .and_then(|c| c.label())
            .unwrap_or_else(|| "unknown component".to_string());
        let keys: Vec<String> = if finding.licenses.is_empty() {
            vec!["no license".to_string()]
        } else {
            finding.licenses.iter().map(|m| m.key().to_string()).collect()
        };
        for license in keys {
            groups
                .entry(rank)
                .or_default()
                .entry(license)
                .or_default()
                .entry(component.clone())
                .or_default()
                .push(finding);
        }
    }

    if groups.is_empty() {
        out.push_str("<p>No changed file matched known open source code.</p>\n");
    }

    for (rank, licenses) in &groups {
        let Some(access) = CLASSIFICATION_ORDER.get(*rank) else {
            continue;
        };
        let _ = writeln!(
            out,
            "<h2 class=\"{cls}\">{cls}</h2>\n<p>{}</p>",
            classification_explanation(*access),
            cls = access.as_str()
        );
        for (license, components) in licenses {
            let _ = writeln!(out, "<h3>{}</h3>", html_escape(license));
            for (component, findings) in components {
                let _ = writeln!(out, "<h4>{}</h4>", html_escape(component));
                out.push_str(
                    "<table><tr><th>File</th><th>Match</th><th>Lines</th><th>Upstream lines</th></tr>\n",
                );
                for finding in findings {
                    let links = line_links(&detail.source_url, &summary.head_sha, finding)
                        .into_iter()
                        .map(|(label, url)| {
                            format!(
                                "<a target=\"_blank\" href=\"{}\">{}</a>",
                                html_escape(&url),
                                html_escape(&label)
                            )
                        })
                        .collect::<Vec<_>>()
                        .join(" ");
                    let oss_lines = finding
                        .component
                        .as_ref()
                        .and_then(|c| c.oss_lines.clone())
                        .unwrap_or_default();
                    let _ = writeln!(
                        out,
                        "<tr><td><code>{}</code></td><td>{}% {}</td><td>{}</td><td>{}</td></tr>",
                        html_escape(&finding.path),
                        finding.match_percent,
                        match finding.match_kind {
                            crate::models::MatchKind::File => "file",
                            crate::models::MatchKind::Snippet => "snippet",
                        },
                        links,
                        html_escape(&oss_lines)
                    );
                    if !finding.patch.is_empty() {
                        let _ = writeln!(
                            out,
                            "<tr><td colspan=\"4\"><pre>{}</pre></td></tr>",
                            html_escape(&finding.patch.join("\n"))
                        );
                    }
                }
                out.push_str("</table>\n");
            }
        }
    }

    if !detail.conflicts.is_empty() {
        out.push_str("<h2 class=\"restricted\">Detected license conflicts</h2>\n<ul>\n");
        for pair in &detail.conflicts {
            let _ = writeln!(
                out,
                "<li><strong>{a}</strong> and <strong>{b}</strong>: code under {a} cannot be combined with code under {b} in one distribution.</li>",
                a = html_escape(&pair.first),
                b = html_escape(&pair.second)
            );
        }
        out.push_str("</ul>\n");
    }

    out.push_str("</body>\n</html>\n");
    out
}

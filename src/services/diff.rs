//! Rebuild changed files from pull request patches into a scoped directory.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, warn};

use super::github::ChangedFile;

/// Files written for one scan. The directory is removed on drop.
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
    /// Rebuilt content by normalized relative path, as the detector reports it.
    files: HashMap<String, Vec<String>>,
    skipped: Vec<String>,
}

impl Workspace {
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Paths that were not written (binary, unsafe or empty).
    pub fn skipped(&self) -> &[String] {
        &self.skipped
    }

    /// Lines of `path` inside `spans` (1-based, inclusive), capped at `max`.
    pub fn excerpt(&self, path: &str, spans: &[(u32, u32)], max: usize) -> Vec<String> {
        let Some(lines) = safe_relative_path(path).and_then(|p| self.files.get(&path_key(&p)))
        else {
            return Vec::new();
        };
        spans
            .iter()
            .flat_map(|&(from, to)| {
                let from = from.max(1) as usize - 1;
                let to = (to as usize).min(lines.len());
                lines.get(from..to.max(from)).unwrap_or_default()
            })
            .take(max)
            .cloned()
            .collect()
    }
}

/// Create a scoped directory under `root` and write every patchable file into it.
pub async fn materialize(root: &Path, files: &[ChangedFile]) -> std::io::Result<Workspace> {
    tokio::fs::create_dir_all(root).await?;
    let dir = tempfile::Builder::new().prefix("scan-").tempdir_in(root)?;

    let mut written = HashMap::new();
    let mut skipped = Vec::new();

    for file in files {
        let Some(ref patch) = file.patch else {
            debug!(target: "scan", path = %file.path, "No patch, skipping file");
            skipped.push(file.path.clone());
            continue;
        };
        let Some(relative) = safe_relative_path(&file.path) else {
            warn!(target: "scan", path = %file.path, "Refusing to write path outside the scan directory");
            skipped.push(file.path.clone());
            continue;
        };

        let lines = rebuild_from_patch(patch);
        if lines.is_empty() {
            skipped.push(file.path.clone());
            continue;
        }

        let target = dir.path().join(&relative);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut content = lines.join("\n");
        content.push('\n');
        tokio::fs::write(&target, content).await?;
        written.insert(path_key(&relative), lines);
    }

    Ok(Workspace {
        dir,
        files: written,
        skipped,
    })
}

/// Relative path with only normal components, or `None`.
fn safe_relative_path(raw: &str) -> Option<PathBuf> {
    let path = Path::new(raw);
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    (!out.as_os_str().is_empty()).then_some(out)
}

/// `/`-separated form of a relative path, used as the workspace key.
fn path_key(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Reconstruct the new side of a file from its unified diff hunks.
/// Lines before and between hunks become blank lines so numbering matches
/// the real file.
pub fn rebuild_from_patch(patch: &str) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();

    for raw in patch.lines() {
        if raw.is_empty() {
            lines.push(String::new());
            continue;
        }
        match raw.as_bytes()[0] {
            b'@' => {
                if let Some(start) = hunk_new_start(raw) {
                    while lines.len() + 1 < start {
                        lines.push(String::new());
                    }
                }
            }
            b'+' | b' ' => lines.push(raw[1..].to_string()),
            // removed lines and "\ No newline at end of file"
            _ => {}
        }
    }

    lines
}

/// `c` from `@@ -a,b +c,d @@`.
fn hunk_new_start(header: &str) -> Option<usize> {
    let after_plus = &header[header.find('+')? + 1..];
    let end = after_plus
        .find(|c: char| c == ',' || c == ' ')
        .unwrap_or(after_plus.len());
    after_plus[..end].parse().ok()
}

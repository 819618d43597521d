//! License catalog and pairwise conflict lookup.
//!
//! A `ConflictMatrix` is built once from the persisted catalog and never
//! mutated. Scans take an `Arc` snapshot from [`SharedMatrix`] and classify
//! without holding any lock. Reloading builds a fresh matrix from the store
//! and swaps the pointer; scans already running keep the snapshot they
//! started with, and a failed reload leaves the current matrix in place.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::config::ConfigError;
use crate::db::ScanStore;
use crate::models::{Catalog, Classification, ConflictPair, FileFinding, License, LicenseAccess};

/// Immutable license catalog with alias and conflict tables.
#[derive(Debug)]
pub struct ConflictMatrix {
    /// Lowercased SPDX id -> license.
    licenses: HashMap<String, License>,
    /// Lowercased alternative name -> lowercased SPDX id.
    aliases: HashMap<String, String>,
    conflicts: HashSet<ConflictPair>,
    loaded_at: DateTime<Utc>,
}

/// Output of classifying every finding of one pull request.
#[derive(Debug, Clone)]
pub struct ClassifiedFindings {
    pub findings: Vec<FileFinding>,
    pub conflicts: Vec<ConflictPair>,
    /// Detected names that did not resolve to a catalog entry.
    pub unreviewed: Vec<String>,
}

fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

impl ConflictMatrix {
    /// Build a matrix, rejecting inconsistent catalogs.
    pub fn build(catalog: Catalog) -> Result<Self, ConfigError> {
        let mut licenses = HashMap::with_capacity(catalog.licenses.len());
        for license in catalog.licenses {
            let key = normalize(&license.spdx_id);
            if key.is_empty() {
                return Err(ConfigError::CatalogLoad(format!(
                    "license '{}' has an empty SPDX identifier",
                    license.name
                )));
            }
            if licenses.insert(key, license.clone()).is_some() {
                return Err(ConfigError::CatalogLoad(format!(
                    "duplicate SPDX identifier '{}'",
                    license.spdx_id
                )));
            }
        }

        let mut aliases: HashMap<String, String> = HashMap::new();
        for (key, license) in &licenses {
            let names = std::iter::once(&license.name).chain(license.alternative_names.iter());
            for alias in names.map(|n| normalize(n)).filter(|n| !n.is_empty()) {
                // An alias equal to another license's SPDX id would never be reached.
                if licenses.contains_key(&alias) && &alias != key {
                    return Err(ConfigError::CatalogLoad(format!(
                        "alternative name '{}' of '{}' shadows another SPDX identifier",
                        alias, license.spdx_id
                    )));
                }
                match aliases.get(&alias) {
                    Some(existing) if existing != key => {
                        return Err(ConfigError::CatalogLoad(format!(
                            "alternative name '{}' maps to both '{}' and '{}'",
                            alias, existing, key
                        )));
                    }
                    _ => {
                        aliases.insert(alias, key.clone());
                    }
                }
            }
        }

        let mut matrix = Self {
            licenses,
            aliases,
            conflicts: HashSet::new(),
            loaded_at: Utc::now(),
        };

        for (a, b) in catalog.conflicts {
            let first = matrix.resolve_alias(&a).ok_or_else(|| {
                ConfigError::CatalogLoad(format!("conflict references unknown license '{}'", a))
            })?;
            let second = matrix.resolve_alias(&b).ok_or_else(|| {
                ConfigError::CatalogLoad(format!("conflict references unknown license '{}'", b))
            })?;
            if first.eq_ignore_ascii_case(second) {
                return Err(ConfigError::CatalogLoad(format!(
                    "license '{}' cannot conflict with itself",
                    a
                )));
            }
            let pair = ConflictPair::new(first, second);
            matrix.conflicts.insert(pair);
        }

        Ok(matrix)
    }

    /// Resolve free text to a canonical SPDX identifier: exact SPDX match first,
    /// then the alternative-name table.
    pub fn resolve_alias(&self, name: &str) -> Option<&str> {
        let key = normalize(name);
        if let Some(license) = self.licenses.get(&key) {
            return Some(&license.spdx_id);
        }
        self.aliases
            .get(&key)
            .and_then(|spdx| self.licenses.get(spdx))
            .map(|license| license.spdx_id.as_str())
    }

    fn lookup(&self, name: &str) -> Option<&License> {
        let spdx = self.resolve_alias(name)?;
        self.licenses.get(&normalize(spdx))
    }

    /// Classify one license name. Unresolved names are `Unreviewed`.
    pub fn classify(&self, name: &str) -> Classification {
        match self.lookup(name) {
            Some(license) => Classification {
                identifier: license.spdx_id.clone(),
                access: license.access,
                resolved: true,
            },
            None => Classification {
                identifier: name.trim().to_string(),
                access: LicenseAccess::Unreviewed,
                resolved: false,
            },
        }
    }

    /// Whether the two licenses are listed as conflicting, in either order.
    pub fn conflicts_with(&self, a: &str, b: &str) -> bool {
        let a = self.resolve_alias(a).unwrap_or(a);
        let b = self.resolve_alias(b).unwrap_or(b);
        self.conflicts.contains(&ConflictPair::new(a, b))
    }

    /// Conflicting pairs among the detected licenses, and between a detected
    /// license and an allowed (declared) one. Pairs made only of allowed
    /// licenses are not reported.
    pub fn find_conflicts<'a, D, A>(&self, detected: D, allowed: A) -> BTreeSet<ConflictPair>
    where
        D: IntoIterator<Item = &'a str>,
        A: IntoIterator<Item = &'a str>,
    {
        let canonical = |name: &'a str| -> String {
            self.resolve_alias(name)
                .map(str::to_string)
                .unwrap_or_else(|| name.trim().to_string())
        };

        let mut seen = HashSet::new();
        let detected: Vec<String> = detected
            .into_iter()
            .map(canonical)
            .filter(|id| seen.insert(id.to_lowercase()))
            .collect();
        let allowed: Vec<String> = allowed
            .into_iter()
            .map(canonical)
            .filter(|id| seen.insert(id.to_lowercase()))
            .collect();

        let mut found = BTreeSet::new();
        for (i, a) in detected.iter().enumerate() {
            for b in detected[i + 1..].iter().chain(allowed.iter()) {
                let pair = ConflictPair::new(a.as_str(), b.as_str());
                if self.conflicts.contains(&pair) {
                    found.insert(pair);
                }
            }
        }
        found
    }

    /// Resolve every license of every finding, compute pull-request wide
    /// conflicts and assign each file its classification.
    pub fn classify_findings(
        &self,
        findings: Vec<FileFinding>,
        allowed: &[String],
    ) -> ClassifiedFindings {
        let mut unreviewed = BTreeSet::new();
        let mut findings: Vec<FileFinding> = findings
            .into_iter()
            .map(|mut finding| {
                for m in &mut finding.licenses {
                    let classification = self.classify(&m.name);
                    if classification.resolved {
                        m.identifier = Some(classification.identifier);
                        m.checklist_url = self
                            .lookup(&m.name)
                            .and_then(|l| l.checklist_url.clone())
                            .or(m.checklist_url.take());
                    } else {
                        unreviewed.insert(classification.identifier);
                    }
                    m.access = classification.access;
                }
                finding
            })
            .collect();

        let conflicts = self.find_conflicts(
            findings
                .iter()
                .flat_map(|f| f.licenses.iter().map(|m| m.key())),
            allowed.iter().map(String::as_str),
        );

        for finding in &mut findings {
            finding.classification = file_classification(finding, &conflicts);
        }

        ClassifiedFindings {
            findings,
            conflicts: conflicts.into_iter().collect(),
            unreviewed: unreviewed.into_iter().collect(),
        }
    }

    /// Catalog entries ordered by SPDX id.
    pub fn licenses(&self) -> Vec<License> {
        let mut licenses: Vec<License> = self.licenses.values().cloned().collect();
        licenses.sort_by(|a, b| a.spdx_id.to_lowercase().cmp(&b.spdx_id.to_lowercase()));
        licenses
    }

    /// Conflict table in canonical order.
    pub fn conflicts(&self) -> Vec<ConflictPair> {
        let mut pairs: Vec<ConflictPair> = self.conflicts.iter().cloned().collect();
        pairs.sort();
        pairs
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    pub fn is_empty(&self) -> bool {
        self.licenses.is_empty()
    }
}

fn file_classification(finding: &FileFinding, conflicts: &BTreeSet<ConflictPair>) -> LicenseAccess {
    let accesses: Vec<LicenseAccess> = finding.licenses.iter().map(|m| m.access).collect();

    if accesses.contains(&LicenseAccess::Prohibited) {
        return LicenseAccess::Prohibited;
    }
    let in_conflict = finding
        .licenses
        .iter()
        .any(|m| conflicts.iter().any(|pair| pair.contains(m.key())));
    if in_conflict || accesses.contains(&LicenseAccess::Restricted) {
        return LicenseAccess::Restricted;
    }
    if !accesses.is_empty() && accesses.iter().all(|a| *a == LicenseAccess::Permitted) {
        return LicenseAccess::Permitted;
    }
    LicenseAccess::Unreviewed
}

/// Read the catalog from the store and build a matrix.
pub async fn load_matrix(store: &dyn ScanStore) -> Result<ConflictMatrix, ConfigError> {
    let catalog = store
        .load_catalog()
        .await
        .map_err(|e| ConfigError::CatalogLoad(e.to_string()))?;
    let matrix = ConflictMatrix::build(catalog)?;
    if matrix.is_empty() {
        warn!("License catalog is empty; every detected license will be unreviewed");
    }
    Ok(matrix)
}

/// Shared handle to the current matrix.
#[derive(Clone)]
pub struct SharedMatrix {
    current: Arc<RwLock<Arc<ConflictMatrix>>>,
}

impl SharedMatrix {
    pub fn new(matrix: ConflictMatrix) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(matrix))),
        }
    }

    /// The matrix in effect right now.
    pub async fn snapshot(&self) -> Arc<ConflictMatrix> {
        self.current.read().await.clone()
    }

    /// Rebuild from the store and swap it in.
    pub async fn reload(&self, store: &dyn ScanStore) -> Result<Arc<ConflictMatrix>, ConfigError> {
        let matrix = Arc::new(load_matrix(store).await?);
        *self.current.write().await = matrix.clone();
        info!(
            licenses = matrix.licenses.len(),
            conflicts = matrix.conflicts.len(),
            "License catalog reloaded"
        );
        Ok(matrix)
    }
}

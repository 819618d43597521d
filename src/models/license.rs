//! License catalog models.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Risk category of a license, or of a file after classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum LicenseAccess {
    /// Allow-listed.
    Permitted,
    /// Usable under conditions; also assigned to files taking part in a conflict.
    Restricted,
    /// Deny-listed.
    Prohibited,
    /// Not (yet) reviewed by the organization.
    Unreviewed,
}

impl LicenseAccess {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Permitted => "permitted",
            Self::Restricted => "restricted",
            Self::Prohibited => "prohibited",
            Self::Unreviewed => "unreviewed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "permitted" => Some(Self::Permitted),
            "restricted" => Some(Self::Restricted),
            "prohibited" => Some(Self::Prohibited),
            "unreviewed" => Some(Self::Unreviewed),
            _ => None,
        }
    }

    /// Whether a file with this classification fails the gate.
    pub fn is_issue(&self) -> bool {
        matches!(self, Self::Prohibited | Self::Restricted)
    }
}

impl std::fmt::Display for LicenseAccess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct License {
    pub spdx_id: String,
    pub name: String,
    pub access: LicenseAccess,
    /// Free-text names that resolve to this license.
    #[serde(default)]
    pub alternative_names: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checklist_url: Option<String>,
}

/// Unordered pair of conflicting licenses. `(A, B) == (B, A)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
pub struct ConflictPair {
    pub first: String,
    pub second: String,
}

impl ConflictPair {
    /// Build a pair with its members in canonical order.
    pub fn new(a: impl Into<String>, b: impl Into<String>) -> Self {
        let (a, b) = (a.into(), b.into());
        if a.to_ascii_lowercase() <= b.to_ascii_lowercase() {
            Self { first: a, second: b }
        } else {
            Self { first: b, second: a }
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.first.eq_ignore_ascii_case(id) || self.second.eq_ignore_ascii_case(id)
    }

    /// The member that is not `id`, if `id` is part of the pair.
    pub fn other(&self, id: &str) -> Option<&str> {
        if self.first.eq_ignore_ascii_case(id) {
            Some(&self.second)
        } else if self.second.eq_ignore_ascii_case(id) {
            Some(&self.first)
        } else {
            None
        }
    }
}

impl std::fmt::Display for ConflictPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.first, self.second)
    }
}

/// Result of classifying one free-text license name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct Classification {
    /// Canonical identifier, or the original text when unresolved.
    pub identifier: String,
    pub access: LicenseAccess,
    pub resolved: bool,
}

/// Raw catalog contents as read from persistence.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    pub licenses: Vec<License>,
    pub conflicts: Vec<(String, String)>,
}

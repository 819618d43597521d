//! Database operations for the license catalog.

use std::collections::HashSet;

use chrono::Utc;
use sea_orm::*;
use uuid::Uuid;

use crate::entity::license::{self, Entity as LicenseEntity};
use crate::entity::license_conflict::{self, Entity as ConflictEntity};
use crate::error::{AppError, AppResult};
use crate::models::{Catalog, License, LicenseAccess};

/// Read every license and conflict row.
pub async fn load_catalog(db: &DatabaseConnection) -> AppResult<Catalog> {
    let licenses = LicenseEntity::find()
        .order_by_asc(license::Column::SpdxId)
        .all(db)
        .await
        .map_err(|e| AppError::Database(format!("Failed to load licenses: {}", e)))?
        .into_iter()
        .map(model_to_license)
        .collect::<AppResult<Vec<_>>>()?;

    let conflicts = ConflictEntity::find()
        .order_by_asc(license_conflict::Column::LicenseA)
        .all(db)
        .await
        .map_err(|e| AppError::Database(format!("Failed to load license conflicts: {}", e)))?
        .into_iter()
        .map(|m| (m.license_a, m.license_b))
        .collect();

    Ok(Catalog {
        licenses,
        conflicts,
    })
}

/// Insert `unreviewed` entries for names not present as SPDX identifiers.
pub async fn insert_unreviewed(db: &DatabaseConnection, names: &[String]) -> AppResult<usize> {
    if names.is_empty() {
        return Ok(0);
    }

    let existing: HashSet<String> = LicenseEntity::find()
        .select_only()
        .column(license::Column::SpdxId)
        .into_tuple::<String>()
        .all(db)
        .await
        .map_err(|e| AppError::Database(format!("Failed to list licenses: {}", e)))?
        .into_iter()
        .map(|id| id.to_lowercase())
        .collect();

    let now = Utc::now();
    let mut seen = HashSet::new();
    let models: Vec<license::ActiveModel> = names
        .iter()
        .map(|n| n.trim())
        .filter(|n| !n.is_empty())
        .filter(|n| !existing.contains(&n.to_lowercase()) && seen.insert(n.to_lowercase()))
        .map(|n| license::ActiveModel {
            id: Set(Uuid::now_v7()),
            spdx_id: Set(n.to_string()),
            name: Set(n.to_string()),
            access: Set(LicenseAccess::Unreviewed.as_str().to_string()),
            alternative_names: Set(serde_json::json!([])),
            checklist_url: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        })
        .collect();

    let inserted = models.len();
    if inserted == 0 {
        return Ok(0);
    }

    LicenseEntity::insert_many(models)
        .exec(db)
        .await
        .map_err(|e| AppError::Database(format!("Failed to insert unreviewed licenses: {}", e)))?;

    Ok(inserted)
}

fn model_to_license(m: license::Model) -> AppResult<License> {
    let access = LicenseAccess::parse(&m.access).ok_or_else(|| {
        AppError::Database(format!(
            "License '{}' has unknown access '{}'",
            m.spdx_id, m.access
        ))
    })?;
    let alternative_names: Vec<String> = serde_json::from_value(m.alternative_names)
        .map_err(|e| {
            AppError::Database(format!(
                "License '{}' has malformed alternative names: {}",
                m.spdx_id, e
            ))
        })?;

    Ok(License {
        spdx_id: m.spdx_id,
        name: m.name,
        access,
        alternative_names,
        checklist_url: m.checklist_url,
    })
}

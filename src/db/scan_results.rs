//! Database queries for scan history.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::entity::detected_license::{self, Entity as DetectedLicense};
use crate::entity::scan_result::{self, Entity as ScanResultEntity};
use crate::error::{AppError, AppResult};
use crate::models::{
    Action, ComponentRef, ConflictPair, FileFinding, HistoryQuery, LicenseAccess, LicenseMatch,
    MatchKind, ScanDetail, ScanOutcome, ScanStatus, ScanSummary,
};

use super::DbPool;

impl DbPool {
    /// Insert a finished scan and its per-file findings in one transaction.
    pub async fn insert_scan_result(&self, outcome: &ScanOutcome) -> AppResult<Uuid> {
        let id = Uuid::now_v7();
        let now = Utc::now();
        let summary = outcome.summary(id);
        let result = outcome.result.as_ref();

        let conflicts = serde_json::to_value(result.map(|r| &r.conflicts).unwrap_or(&Vec::new()))?;
        let unreviewed = serde_json::to_value(
            result
                .map(|r| r.unreviewed_licenses.clone())
                .unwrap_or_default(),
        )?;

        let txn = self
            .connection()
            .begin()
            .await
            .map_err(|e| AppError::Database(format!("Failed to start transaction: {}", e)))?;

        scan_result::ActiveModel {
            id: Set(id),
            queue_item_id: Set(outcome.item.id),
            repository: Set(summary.repository),
            organization: Set(summary.organization),
            repository_url: Set(outcome.item.repository_url.clone()),
            source_url: Set(outcome.item.source_url().to_string()),
            pull_request: Set(summary.pull_request as i64),
            pull_request_url: Set(summary.pull_request_url),
            head_ref: Set(summary.head_ref),
            head_sha: Set(summary.head_sha),
            sender: Set(summary.sender),
            action: Set(summary.action.as_str().to_string()),
            status: Set(outcome.status.as_str().to_string()),
            has_issue: Set(summary.has_issue),
            repository_license: Set(summary.repository_license),
            conflicts: Set(conflicts),
            unreviewed_licenses: Set(unreviewed),
            error_message: Set(outcome.error_message.clone()),
            scanned_at: Set(summary.scanned_at),
            created_at: Set(now),
        }
        .insert(&txn)
        .await
        .map_err(|e| AppError::Database(format!("Failed to insert scan result: {}", e)))?;

        let findings = result.map(|r| r.findings.as_slice()).unwrap_or_default();
        if !findings.is_empty() {
            let models = findings
                .iter()
                .map(|f| {
                    Ok(detected_license::ActiveModel {
                        id: Set(Uuid::now_v7()),
                        scan_result_id: Set(id),
                        file_path: Set(f.path.clone()),
                        classification: Set(f.classification.as_str().to_string()),
                        match_kind: Set(match_kind_str(f.match_kind).to_string()),
                        match_percent: Set(i16::from(f.match_percent)),
                        matched_lines: Set(f.matched_lines.clone()),
                        licenses: Set(serde_json::to_value(&f.licenses)?),
                        component: Set(f.component.as_ref().map(serde_json::to_value).transpose()?),
                        created_at: Set(now),
                    })
                })
                .collect::<AppResult<Vec<_>>>()?;

            DetectedLicense::insert_many(models)
                .exec(&txn)
                .await
                .map_err(|e| AppError::Database(format!("Failed to insert findings: {}", e)))?;
        }

        txn.commit()
            .await
            .map_err(|e| AppError::Database(format!("Failed to commit scan result: {}", e)))?;

        Ok(id)
    }

    /// Paged scan history, newest first.
    pub async fn query_scan_results(
        &self,
        query: &HistoryQuery,
    ) -> AppResult<(Vec<ScanSummary>, u64)> {
        let mut select = ScanResultEntity::find();

        if let Some(ref repository) = query.repository {
            select = select.filter(scan_result::Column::Repository.eq(repository.as_str()));
        }
        if let Some(ref organization) = query.organization {
            select = select.filter(scan_result::Column::Organization.eq(organization.as_str()));
        }
        if let Some(ref sender) = query.sender {
            select = select.filter(scan_result::Column::Sender.eq(sender.as_str()));
        }

        let total = select
            .clone()
            .count(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to count scans: {}", e)))?;

        let rows = select
            .order_by_desc(scan_result::Column::ScannedAt)
            .order_by_desc(scan_result::Column::Id)
            .offset(query.offset())
            .limit(u64::from(query.limit()))
            .all(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to list scans: {}", e)))?;

        let scans = rows
            .into_iter()
            .map(model_to_summary)
            .collect::<AppResult<Vec<_>>>()?;

        Ok((scans, total))
    }

    /// One scan with its findings.
    pub async fn get_scan_result(&self, id: Uuid) -> AppResult<Option<ScanDetail>> {
        let Some(row) = ScanResultEntity::find_by_id(id)
            .one(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to get scan: {}", e)))?
        else {
            return Ok(None);
        };

        let findings = DetectedLicense::find()
            .filter(detected_license::Column::ScanResultId.eq(id))
            .order_by_asc(detected_license::Column::FilePath)
            .all(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to get findings: {}", e)))?
            .into_iter()
            .map(model_to_finding)
            .collect::<AppResult<Vec<_>>>()?;

        let conflicts: Vec<ConflictPair> = serde_json::from_value(row.conflicts.clone())?;
        let source_url = row.source_url.clone();
        let error_message = row.error_message.clone();

        Ok(Some(ScanDetail {
            summary: model_to_summary(row)?,
            source_url,
            findings,
            conflicts,
            error_message,
        }))
    }
}

fn match_kind_str(kind: MatchKind) -> &'static str {
    match kind {
        MatchKind::File => "file",
        MatchKind::Snippet => "snippet",
    }
}

fn model_to_summary(m: scan_result::Model) -> AppResult<ScanSummary> {
    let status = ScanStatus::parse(&m.status).ok_or_else(|| {
        AppError::Database(format!("Scan {} has unknown status '{}'", m.id, m.status))
    })?;
    let action = Action::parse(&m.action).ok_or_else(|| {
        AppError::Database(format!("Scan {} has unknown action '{}'", m.id, m.action))
    })?;

    Ok(ScanSummary {
        id: m.id,
        repository: m.repository,
        organization: m.organization,
        pull_request: m.pull_request.max(0) as u64,
        pull_request_url: m.pull_request_url,
        head_ref: m.head_ref,
        head_sha: m.head_sha,
        sender: m.sender,
        action,
        status,
        status_description: status.description().to_string(),
        has_issue: m.has_issue,
        repository_license: m.repository_license,
        scanned_at: m.scanned_at,
    })
}

fn model_to_finding(m: detected_license::Model) -> AppResult<FileFinding> {
    let match_kind = match m.match_kind.as_str() {
        "snippet" => MatchKind::Snippet,
        _ => MatchKind::File,
    };
    let licenses: Vec<LicenseMatch> = serde_json::from_value(m.licenses)?;
    let component: Option<ComponentRef> = m.component.map(serde_json::from_value).transpose()?;

    Ok(FileFinding {
        path: m.file_path,
        match_kind,
        match_percent: m.match_percent.clamp(0, 100) as u8,
        matched_lines: m.matched_lines,
        licenses,
        component,
        patch: Vec::new(),
        classification: LicenseAccess::parse(&m.classification)
            .unwrap_or(LicenseAccess::Unreviewed),
    })
}

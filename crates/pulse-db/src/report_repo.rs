//! User reports and moderation review.

use tracing::info;
use uuid::Uuid;

use pulse_models::{CreateReportRequest, Report, ReportStatus, ReportTarget, ReviewReportRequest};

use crate::error::{DbError, DbResult};
use crate::pool::Database;
use crate::rows::{convert_all, ReportRow};

const REPORT_COLUMNS: &str = "id, reporter_id, target_type, target_id, reason, details, status, \
     resolution_note, reviewed_by, created_at, updated_at";

fn target_exists_sql(target: ReportTarget) -> &'static str {
    match target {
        ReportTarget::User => "SELECT 1 FROM users WHERE id = $1",
        ReportTarget::Stream => "SELECT 1 FROM streams WHERE id = $1",
        ReportTarget::Comment => "SELECT 1 FROM comments WHERE id = $1",
        ReportTarget::Story => "SELECT 1 FROM stories WHERE id = $1",
    }
}

/// Repository for reports.
#[derive(Clone)]
pub struct ReportRepository {
    db: Database,
}

impl ReportRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// File a report. One open report per reporter and target.
    pub async fn create(&self, reporter_id: Uuid, request: &CreateReportRequest) -> DbResult<Report> {
        if request.target_type == ReportTarget::User && request.target_id == reporter_id {
            return Err(DbError::invalid("cannot report yourself"));
        }

        let found: Option<(i32,)> = sqlx::query_as(target_exists_sql(request.target_type))
            .bind(request.target_id)
            .fetch_optional(self.db.pool())
            .await?;
        if found.is_none() {
            return Err(DbError::not_found(format!(
                "{} {}",
                request.target_type.as_str(),
                request.target_id
            )));
        }

        let details = request
            .details
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty());

        let result: Result<ReportRow, sqlx::Error> = sqlx::query_as(&format!(
            "INSERT INTO reports (id, reporter_id, target_type, target_id, reason, details) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {}",
            REPORT_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(reporter_id)
        .bind(request.target_type.as_str())
        .bind(request.target_id)
        .bind(request.reason.as_str())
        .bind(details)
        .fetch_one(self.db.pool())
        .await;

        match result.map_err(DbError::from) {
            Ok(row) => {
                info!(report_id = %row.id, target = %row.target_type, "Report filed");
                row.try_into()
            }
            Err(e) if e.is_unique_violation() => {
                Err(DbError::conflict("you already have an open report for this target"))
            }
            Err(e) => Err(e),
        }
    }

    /// Reports filed by a user, newest first.
    pub async fn mine(&self, reporter_id: Uuid) -> DbResult<Vec<Report>> {
        let rows: Vec<ReportRow> = sqlx::query_as(&format!(
            "SELECT {} FROM reports WHERE reporter_id = $1 ORDER BY created_at DESC",
            REPORT_COLUMNS
        ))
        .bind(reporter_id)
        .fetch_all(self.db.pool())
        .await?;
        convert_all(rows)
    }

    /// Moderation queue, oldest first.
    pub async fn list(&self, status: Option<ReportStatus>, limit: u32) -> DbResult<Vec<Report>> {
        let rows: Vec<ReportRow> = sqlx::query_as(&format!(
            "SELECT {} FROM reports WHERE ($1::text IS NULL OR status = $1) \
             ORDER BY created_at ASC LIMIT $2",
            REPORT_COLUMNS
        ))
        .bind(status.map(|s| s.as_str()))
        .bind(i64::from(limit))
        .fetch_all(self.db.pool())
        .await?;
        convert_all(rows)
    }

    /// Move a report through review.
    pub async fn review(
        &self,
        moderator_id: Uuid,
        report_id: Uuid,
        request: &ReviewReportRequest,
    ) -> DbResult<Report> {
        let mut tx = self.db.pool().begin().await?;

        let row: Option<ReportRow> = sqlx::query_as(&format!(
            "SELECT {} FROM reports WHERE id = $1 FOR UPDATE",
            REPORT_COLUMNS
        ))
        .bind(report_id)
        .fetch_optional(&mut *tx)
        .await?;
        let report: Report = row
            .ok_or_else(|| DbError::not_found(format!("report {}", report_id)))?
            .try_into()?;

        let next = report.status.transition(request.status)?;
        let note = request.note.as_deref().map(str::trim).filter(|n| !n.is_empty());

        let row: ReportRow = sqlx::query_as(&format!(
            "UPDATE reports SET status = $2, resolution_note = COALESCE($3, resolution_note), \
             reviewed_by = $4, updated_at = clock_timestamp() WHERE id = $1 RETURNING {}",
            REPORT_COLUMNS
        ))
        .bind(report_id)
        .bind(next.as_str())
        .bind(note)
        .bind(moderator_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        info!(report_id = %report_id, from = %report.status, to = %next, "Report reviewed");
        row.try_into()
    }
}

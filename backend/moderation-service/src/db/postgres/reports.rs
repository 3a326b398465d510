//! Database operations for user reports

use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use super::{push_date_range, PgStore};
use crate::db::ReportStore;
use crate::error::{ModerationError, Result};
use crate::models::*;

const REPORT_COLUMNS: &str = "id, reporter_id, reported_user_id, content_id, content_type, \
     report_type, reason, description, priority, status, assigned_to, assigned_at, \
     resolution, reviewed_by, reviewed_at, created_at";

fn push_report_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &ReportFilter) {
    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status);
    }
    if let Some(report_type) = filter.report_type {
        qb.push(" AND report_type = ").push_bind(report_type);
    }
    if let Some(priority) = filter.priority {
        qb.push(" AND priority = ").push_bind(priority);
    }
    if let Some(reporter_id) = filter.reporter_id {
        qb.push(" AND reporter_id = ").push_bind(reporter_id);
    }
    if let Some(reported_user_id) = filter.reported_user_id {
        qb.push(" AND reported_user_id = ").push_bind(reported_user_id);
    }
    if let Some(assigned_to) = filter.assigned_to {
        qb.push(" AND assigned_to = ").push_bind(assigned_to);
    }
    if let Some(content_id) = &filter.content_id {
        qb.push(" AND content_id = ").push_bind(content_id.clone());
    }
}

#[async_trait]
impl ReportStore for PgStore {
    async fn insert_report(&self, report: Report) -> Result<Report> {
        let stored = sqlx::query_as::<_, Report>(&format!(
            r#"
            INSERT INTO reports (
                id, reporter_id, reported_user_id, content_id, content_type,
                report_type, reason, description, priority, status, assigned_to,
                assigned_at, resolution, reviewed_by, reviewed_at, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            RETURNING {}
            "#,
            REPORT_COLUMNS
        ))
        .bind(report.id)
        .bind(report.reporter_id)
        .bind(report.reported_user_id)
        .bind(&report.content_id)
        .bind(&report.content_type)
        .bind(report.report_type)
        .bind(&report.reason)
        .bind(&report.description)
        .bind(report.priority)
        .bind(report.status)
        .bind(report.assigned_to)
        .bind(report.assigned_at)
        .bind(&report.resolution)
        .bind(report.reviewed_by)
        .bind(report.reviewed_at)
        .bind(report.created_at)
        .fetch_one(&*self.pool)
        .await?;

        Ok(stored)
    }

    async fn get_report(&self, id: Uuid) -> Result<Option<Report>> {
        let report = sqlx::query_as::<_, Report>(&format!(
            "SELECT {} FROM reports WHERE id = $1",
            REPORT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(report)
    }

    async fn update_report(&self, report: &Report, expected: ReportStatus) -> Result<Report> {
        let updated = sqlx::query_as::<_, Report>(&format!(
            r#"
            UPDATE reports
            SET status = $2,
                priority = $3,
                assigned_to = $4,
                assigned_at = $5,
                resolution = $6,
                reviewed_by = $7,
                reviewed_at = $8
            WHERE id = $1 AND status = $9
            RETURNING {}
            "#,
            REPORT_COLUMNS
        ))
        .bind(report.id)
        .bind(report.status)
        .bind(report.priority)
        .bind(report.assigned_to)
        .bind(report.assigned_at)
        .bind(&report.resolution)
        .bind(report.reviewed_by)
        .bind(report.reviewed_at)
        .bind(expected)
        .fetch_optional(&*self.pool)
        .await?;

        match updated {
            Some(report) => Ok(report),
            None => match self.get_report(report.id).await? {
                Some(current) => Err(ModerationError::Conflict(format!(
                    "report {} changed concurrently (now {})",
                    report.id,
                    current.status.as_str()
                ))),
                None => Err(ModerationError::not_found("Report", report.id)),
            },
        }
    }

    async fn delete_report(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM reports WHERE id = $1")
            .bind(id)
            .execute(&*self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_reports(&self, filter: &ReportFilter, page: Pagination) -> Result<Vec<Report>> {
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {} FROM reports WHERE 1=1",
            REPORT_COLUMNS
        ));
        push_report_filter(&mut qb, filter);
        qb.push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(page.take)
            .push(" OFFSET ")
            .push_bind(page.skip);

        let reports = qb.build_query_as::<Report>().fetch_all(&*self.pool).await?;
        Ok(reports)
    }

    async fn count_reports(&self, filter: &ReportFilter) -> Result<i64> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM reports WHERE 1=1");
        push_report_filter(&mut qb, filter);

        let count: i64 = qb.build_query_scalar().fetch_one(&*self.pool).await?;
        Ok(count)
    }

    async fn report_stats(&self, range: DateRange) -> Result<ReportStats> {
        let mut qb = QueryBuilder::<Postgres>::new(
            "SELECT status, report_type, priority, COUNT(*) FROM reports WHERE 1=1",
        );
        push_date_range(&mut qb, "created_at", range);
        qb.push(" GROUP BY status, report_type, priority");

        let rows: Vec<(ReportStatus, ReportType, Priority, i64)> =
            qb.build_query_as().fetch_all(&*self.pool).await?;

        let mut stats = ReportStats::default();
        for (status, report_type, priority, count) in rows {
            stats.record(status, report_type, priority, count);
        }
        Ok(stats)
    }
}

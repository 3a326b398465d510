//! Database operations for appeals

use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use super::{is_unique_violation, push_date_range, PgStore};
use crate::db::AppealStore;
use crate::error::{ModerationError, Result};
use crate::models::*;

const APPEAL_COLUMNS: &str = "id, report_id, appellant_id, reason, status, \
     reviewed_by, reviewed_at, review_notes, created_at";

#[async_trait]
impl AppealStore for PgStore {
    async fn insert_appeal(&self, appeal: Appeal) -> Result<Appeal> {
        let inserted = sqlx::query_as::<_, Appeal>(&format!(
            r#"
            INSERT INTO appeals (
                id, report_id, appellant_id, reason, status,
                reviewed_by, reviewed_at, review_notes, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {}
            "#,
            APPEAL_COLUMNS
        ))
        .bind(appeal.id)
        .bind(appeal.report_id)
        .bind(appeal.appellant_id)
        .bind(&appeal.reason)
        .bind(appeal.status)
        .bind(appeal.reviewed_by)
        .bind(appeal.reviewed_at)
        .bind(&appeal.review_notes)
        .bind(appeal.created_at)
        .fetch_one(&*self.pool)
        .await;

        match inserted {
            Ok(stored) => Ok(stored),
            Err(e) if is_unique_violation(&e) => Err(ModerationError::Conflict(format!(
                "report {} already has an appeal",
                appeal.report_id
            ))),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_appeal(&self, id: Uuid) -> Result<Option<Appeal>> {
        let appeal = sqlx::query_as::<_, Appeal>(&format!(
            "SELECT {} FROM appeals WHERE id = $1",
            APPEAL_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(appeal)
    }

    async fn get_appeal_by_report(&self, report_id: Uuid) -> Result<Option<Appeal>> {
        let appeal = sqlx::query_as::<_, Appeal>(&format!(
            "SELECT {} FROM appeals WHERE report_id = $1",
            APPEAL_COLUMNS
        ))
        .bind(report_id)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(appeal)
    }

    async fn update_appeal(&self, appeal: &Appeal, expected: AppealStatus) -> Result<Appeal> {
        let updated = sqlx::query_as::<_, Appeal>(&format!(
            r#"
            UPDATE appeals
            SET reason = $2,
                status = $3,
                reviewed_by = $4,
                reviewed_at = $5,
                review_notes = $6
            WHERE id = $1 AND status = $7
            RETURNING {}
            "#,
            APPEAL_COLUMNS
        ))
        .bind(appeal.id)
        .bind(&appeal.reason)
        .bind(appeal.status)
        .bind(appeal.reviewed_by)
        .bind(appeal.reviewed_at)
        .bind(&appeal.review_notes)
        .bind(expected)
        .fetch_optional(&*self.pool)
        .await?;

        match updated {
            Some(appeal) => Ok(appeal),
            None => match self.get_appeal(appeal.id).await? {
                Some(current) => Err(ModerationError::transition(
                    "Appeal",
                    current.status.as_str(),
                    appeal.status.as_str(),
                )),
                None => Err(ModerationError::not_found("Appeal", appeal.id)),
            },
        }
    }

    async fn delete_appeal(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM appeals WHERE id = $1")
            .bind(id)
            .execute(&*self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_appeals(
        &self,
        filter: &AppealFilter,
        page: Pagination,
        oldest_first: bool,
    ) -> Result<Vec<Appeal>> {
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {} FROM appeals WHERE 1=1",
            APPEAL_COLUMNS
        ));
        if let Some(status) = filter.status {
            qb.push(" AND status = ").push_bind(status);
        }
        if let Some(appellant_id) = filter.appellant_id {
            qb.push(" AND appellant_id = ").push_bind(appellant_id);
        }
        if let Some(report_id) = filter.report_id {
            qb.push(" AND report_id = ").push_bind(report_id);
        }
        qb.push(if oldest_first {
            " ORDER BY created_at ASC"
        } else {
            " ORDER BY created_at DESC"
        });
        qb.push(" LIMIT ")
            .push_bind(page.take)
            .push(" OFFSET ")
            .push_bind(page.skip);

        let appeals = qb.build_query_as::<Appeal>().fetch_all(&*self.pool).await?;
        Ok(appeals)
    }

    async fn appeal_stats(&self, range: DateRange) -> Result<AppealStats> {
        let mut qb =
            QueryBuilder::<Postgres>::new("SELECT status, COUNT(*) FROM appeals WHERE 1=1");
        push_date_range(&mut qb, "created_at", range);
        qb.push(" GROUP BY status");

        let rows: Vec<(AppealStatus, i64)> = qb.build_query_as().fetch_all(&*self.pool).await?;

        let mut stats = AppealStats::default();
        for (status, count) in rows {
            stats.record(status, count);
        }
        Ok(stats)
    }
}

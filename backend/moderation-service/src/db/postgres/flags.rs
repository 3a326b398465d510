//! Database operations for content flags

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use super::{push_date_range, PgStore};
use crate::db::ContentFlagStore;
use crate::error::Result;
use crate::models::*;

const FLAG_COLUMNS: &str = "id, content_id, content_type, flag_type, confidence, \
     is_resolved, resolved_by, resolved_at, created_at";

fn push_flag_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &FlagFilter) {
    if let Some(content_id) = &filter.content_id {
        qb.push(" AND content_id = ").push_bind(content_id.clone());
    }
    if let Some(content_type) = &filter.content_type {
        qb.push(" AND content_type = ").push_bind(content_type.clone());
    }
    if let Some(flag_type) = filter.flag_type {
        qb.push(" AND flag_type = ").push_bind(flag_type);
    }
    if let Some(is_resolved) = filter.is_resolved {
        qb.push(" AND is_resolved = ").push_bind(is_resolved);
    }
    if let Some(min) = filter.min_confidence {
        qb.push(" AND confidence >= ").push_bind(min);
    }
    if let Some(max) = filter.max_confidence {
        qb.push(" AND confidence <= ").push_bind(max);
    }
}

#[async_trait]
impl ContentFlagStore for PgStore {
    async fn insert_flag(&self, flag: ContentFlag) -> Result<ContentFlag> {
        let stored = sqlx::query_as::<_, ContentFlag>(&format!(
            r#"
            INSERT INTO content_flags (
                id, content_id, content_type, flag_type, confidence,
                is_resolved, resolved_by, resolved_at, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {}
            "#,
            FLAG_COLUMNS
        ))
        .bind(flag.id)
        .bind(&flag.content_id)
        .bind(&flag.content_type)
        .bind(flag.flag_type)
        .bind(flag.confidence)
        .bind(flag.is_resolved)
        .bind(flag.resolved_by)
        .bind(flag.resolved_at)
        .bind(flag.created_at)
        .fetch_one(&*self.pool)
        .await?;

        Ok(stored)
    }

    async fn get_flag(&self, id: Uuid) -> Result<Option<ContentFlag>> {
        let flag = sqlx::query_as::<_, ContentFlag>(&format!(
            "SELECT {} FROM content_flags WHERE id = $1",
            FLAG_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(flag)
    }

    async fn get_flags_by_ids(&self, ids: &[Uuid]) -> Result<Vec<ContentFlag>> {
        let flags = sqlx::query_as::<_, ContentFlag>(&format!(
            "SELECT {} FROM content_flags WHERE id = ANY($1)",
            FLAG_COLUMNS
        ))
        .bind(ids.to_vec())
        .fetch_all(&*self.pool)
        .await?;

        Ok(flags)
    }

    async fn list_flags(&self, filter: &FlagFilter, page: Pagination) -> Result<Vec<ContentFlag>> {
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {} FROM content_flags WHERE 1=1",
            FLAG_COLUMNS
        ));
        push_flag_filter(&mut qb, filter);
        qb.push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(page.take)
            .push(" OFFSET ")
            .push_bind(page.skip);

        let flags = qb
            .build_query_as::<ContentFlag>()
            .fetch_all(&*self.pool)
            .await?;
        Ok(flags)
    }

    async fn resolve_flags(
        &self,
        ids: &[Uuid],
        resolver_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<ContentFlag>> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE content_flags
            SET is_resolved = true,
                resolved_by = $2,
                resolved_at = $3
            WHERE id = ANY($1) AND is_resolved = false
            "#,
        )
        .bind(ids.to_vec())
        .bind(resolver_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let flags = sqlx::query_as::<_, ContentFlag>(&format!(
            "SELECT {} FROM content_flags WHERE id = ANY($1)",
            FLAG_COLUMNS
        ))
        .bind(ids.to_vec())
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(flags)
    }

    async fn delete_flag(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM content_flags WHERE id = $1")
            .bind(id)
            .execute(&*self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn high_confidence_flags(&self, threshold: f64, limit: i64) -> Result<Vec<ContentFlag>> {
        let flags = sqlx::query_as::<_, ContentFlag>(&format!(
            r#"
            SELECT {}
            FROM content_flags
            WHERE is_resolved = false AND confidence >= $1
            ORDER BY confidence DESC, created_at ASC
            LIMIT $2
            "#,
            FLAG_COLUMNS
        ))
        .bind(threshold)
        .bind(limit)
        .fetch_all(&*self.pool)
        .await?;

        Ok(flags)
    }

    async fn flag_stats(&self, range: DateRange) -> Result<FlagStats> {
        let mut qb = QueryBuilder::<Postgres>::new(
            r#"
            SELECT flag_type,
                   COUNT(*),
                   COUNT(*) FILTER (WHERE is_resolved = false),
                   COALESCE(SUM(confidence), 0)::DOUBLE PRECISION
            FROM content_flags
            WHERE 1=1
            "#,
        );
        push_date_range(&mut qb, "created_at", range);
        qb.push(" GROUP BY flag_type");

        let rows: Vec<(FlagType, i64, i64, f64)> =
            qb.build_query_as().fetch_all(&*self.pool).await?;

        let mut stats = FlagStats::default();
        let mut confidence_sum = 0.0;
        for (flag_type, total, unresolved, sum) in rows {
            stats.total += total;
            stats.unresolved += unresolved;
            stats.by_type.insert(flag_type, total);
            confidence_sum += sum;
        }
        stats.average_confidence = (stats.total > 0).then(|| confidence_sum / stats.total as f64);
        Ok(stats)
    }
}

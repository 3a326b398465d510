//! Database operations for the moderation queue and its audit log

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, PgConnection, Postgres, QueryBuilder};
use uuid::Uuid;

use super::{push_date_range, PgStore};
use crate::db::{ActionLogStore, QueueStore};
use crate::error::{ModerationError, Result};
use crate::models::*;

const QUEUE_COLUMNS: &str = "id, content_id, content_type, priority, reason, flags, \
     assigned_to, is_processed, processed_at, action, notes, created_at";

const LOG_COLUMNS: &str =
    "id, moderator_id, action, target_id, target_type, reason, metadata, created_at";

/// Row shape of `moderation_action_logs`; metadata is stored as JSONB.
#[derive(Debug, FromRow)]
struct ActionLogRow {
    id: Uuid,
    moderator_id: Uuid,
    action: ModerationAction,
    target_id: String,
    target_type: ContentType,
    reason: Option<String>,
    metadata: Json<ActionMetadata>,
    created_at: DateTime<Utc>,
}

impl From<ActionLogRow> for ModerationActionLog {
    fn from(row: ActionLogRow) -> Self {
        Self {
            id: row.id,
            moderator_id: row.moderator_id,
            action: row.action,
            target_id: row.target_id,
            target_type: row.target_type,
            reason: row.reason,
            metadata: row.metadata.0,
            created_at: row.created_at,
        }
    }
}

fn push_queue_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &QueueFilter) {
    if let Some(is_processed) = filter.is_processed {
        qb.push(" AND is_processed = ").push_bind(is_processed);
    }
    if let Some(assigned_to) = filter.assigned_to {
        qb.push(" AND assigned_to = ").push_bind(assigned_to);
    }
    if filter.unassigned_only {
        qb.push(" AND assigned_to IS NULL");
    }
    if let Some(content_type) = &filter.content_type {
        qb.push(" AND content_type = ").push_bind(content_type.clone());
    }
    if let Some(priority) = filter.priority {
        qb.push(" AND priority = ").push_bind(priority);
    }
    if let Some(min_priority) = filter.min_priority {
        qb.push(" AND priority >= ").push_bind(min_priority);
    }
    if let Some(action) = filter.action {
        qb.push(" AND action = ").push_bind(action);
    }
}

async fn lock_active_item(conn: &mut PgConnection, content_id: &str) -> Result<Option<QueueItem>> {
    let item = sqlx::query_as::<_, QueueItem>(&format!(
        "SELECT {} FROM moderation_queue WHERE content_id = $1 AND is_processed = false FOR UPDATE",
        QUEUE_COLUMNS
    ))
    .bind(content_id)
    .fetch_optional(conn)
    .await?;

    Ok(item)
}

async fn store_merge(conn: &mut PgConnection, item: &QueueItem) -> Result<QueueItem> {
    let updated = sqlx::query_as::<_, QueueItem>(&format!(
        r#"
        UPDATE moderation_queue
        SET priority = $2,
            reason = $3,
            flags = $4
        WHERE id = $1
        RETURNING {}
        "#,
        QUEUE_COLUMNS
    ))
    .bind(item.id)
    .bind(item.priority)
    .bind(&item.reason)
    .bind(&item.flags)
    .fetch_one(conn)
    .await?;

    Ok(updated)
}

/// Folds `request` into a locked active item and persists the merge.
async fn merge_into(
    conn: &mut PgConnection,
    mut item: QueueItem,
    request: EnqueueRequest,
) -> Result<EnqueueOutcome> {
    let previous = item.absorb(request);
    let item = store_merge(conn, &item).await?;
    Ok(match previous {
        Some(previous) => EnqueueOutcome::Escalated { item, previous },
        None => EnqueueOutcome::Merged { item },
    })
}

#[async_trait]
impl QueueStore for PgStore {
    async fn enqueue(&self, request: EnqueueRequest) -> Result<EnqueueOutcome> {
        let mut tx = self.pool.begin().await?;

        if let Some(active) = lock_active_item(&mut tx, &request.content_id).await? {
            let outcome = merge_into(&mut tx, active, request).await?;
            tx.commit().await?;
            return Ok(outcome);
        }

        let candidate = QueueItem::new(request.clone());
        let inserted = sqlx::query_as::<_, QueueItem>(&format!(
            r#"
            INSERT INTO moderation_queue (
                id, content_id, content_type, priority, reason, flags,
                assigned_to, is_processed, processed_at, action, notes, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (content_id) WHERE is_processed = false DO NOTHING
            RETURNING {}
            "#,
            QUEUE_COLUMNS
        ))
        .bind(candidate.id)
        .bind(&candidate.content_id)
        .bind(&candidate.content_type)
        .bind(candidate.priority)
        .bind(&candidate.reason)
        .bind(&candidate.flags)
        .bind(candidate.assigned_to)
        .bind(candidate.is_processed)
        .bind(candidate.processed_at)
        .bind(candidate.action)
        .bind(&candidate.notes)
        .bind(candidate.created_at)
        .fetch_optional(&mut *tx)
        .await?;

        let outcome = match inserted {
            Some(item) => EnqueueOutcome::Created { item },
            None => {
                // A concurrent enqueue created the active item first.
                let active = lock_active_item(&mut tx, &request.content_id)
                    .await?
                    .ok_or_else(|| {
                        ModerationError::Conflict(format!(
                            "queue slot for {} changed concurrently",
                            request.content_id
                        ))
                    })?;
                merge_into(&mut tx, active, request).await?
            }
        };

        tx.commit().await?;
        Ok(outcome)
    }

    async fn get_queue_item(&self, id: Uuid) -> Result<Option<QueueItem>> {
        let item = sqlx::query_as::<_, QueueItem>(&format!(
            "SELECT {} FROM moderation_queue WHERE id = $1",
            QUEUE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(item)
    }

    async fn get_active_item(&self, content_id: &str) -> Result<Option<QueueItem>> {
        let item = sqlx::query_as::<_, QueueItem>(&format!(
            "SELECT {} FROM moderation_queue WHERE content_id = $1 AND is_processed = false",
            QUEUE_COLUMNS
        ))
        .bind(content_id)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(item)
    }

    async fn list_queue_items(&self, filter: &QueueFilter, page: Pagination) -> Result<Vec<QueueItem>> {
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {} FROM moderation_queue WHERE 1=1",
            QUEUE_COLUMNS
        ));
        push_queue_filter(&mut qb, filter);
        qb.push(" ORDER BY priority DESC, created_at ASC, id ASC LIMIT ")
            .push_bind(page.take)
            .push(" OFFSET ")
            .push_bind(page.skip);

        let items = qb.build_query_as::<QueueItem>().fetch_all(&*self.pool).await?;
        Ok(items)
    }

    async fn claim_queue_items(
        &self,
        ids: &[Uuid],
        moderator_id: Uuid,
        mode: ClaimMode,
    ) -> Result<Vec<QueueItem>> {
        let guard = match mode {
            ClaimMode::IfUnclaimed => " AND assigned_to IS NULL",
            ClaimMode::Override => "",
        };

        let claimed = sqlx::query_as::<_, QueueItem>(&format!(
            r#"
            UPDATE moderation_queue
            SET assigned_to = $2
            WHERE id = ANY($1) AND is_processed = false{}
            RETURNING {}
            "#,
            guard, QUEUE_COLUMNS
        ))
        .bind(ids.to_vec())
        .bind(moderator_id)
        .fetch_all(&*self.pool)
        .await?;

        Ok(claimed)
    }

    async fn process_queue_item(
        &self,
        id: Uuid,
        command: ProcessCommand,
        now: DateTime<Utc>,
    ) -> Result<(QueueItem, ModerationActionLog)> {
        let mut tx = self.pool.begin().await?;

        let processed = sqlx::query_as::<_, QueueItem>(&format!(
            r#"
            UPDATE moderation_queue
            SET is_processed = true,
                processed_at = $2,
                action = $3,
                notes = $4
            WHERE id = $1 AND is_processed = false
            RETURNING {}
            "#,
            QUEUE_COLUMNS
        ))
        .bind(id)
        .bind(now)
        .bind(command.action)
        .bind(&command.notes)
        .fetch_optional(&mut *tx)
        .await?;

        let item = match processed {
            Some(item) => item,
            None => {
                let exists: bool = sqlx::query_scalar(
                    "SELECT EXISTS(SELECT 1 FROM moderation_queue WHERE id = $1)",
                )
                .bind(id)
                .fetch_one(&mut *tx)
                .await?;
                return Err(if exists {
                    ModerationError::transition("QueueItem", "PROCESSED", "PROCESSED")
                } else {
                    ModerationError::not_found("QueueItem", id)
                });
            }
        };

        let log = ModerationActionLog::for_processed_item(&item, command.moderator_id, now);
        let row = sqlx::query_as::<_, ActionLogRow>(&format!(
            r#"
            INSERT INTO moderation_action_logs (
                id, moderator_id, action, target_id, target_type, reason, metadata, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {}
            "#,
            LOG_COLUMNS
        ))
        .bind(log.id)
        .bind(log.moderator_id)
        .bind(log.action)
        .bind(&log.target_id)
        .bind(&log.target_type)
        .bind(&log.reason)
        .bind(Json(log.metadata.clone()))
        .bind(log.created_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok((item, row.into()))
    }

    async fn delete_queue_item(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM moderation_queue WHERE id = $1")
            .bind(id)
            .execute(&*self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_processed_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM moderation_queue WHERE is_processed = true AND processed_at < $1",
        )
        .bind(cutoff)
        .execute(&*self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn queue_stats(&self, range: DateRange) -> Result<QueueStats> {
        let mut qb = QueryBuilder::<Postgres>::new(
            r#"
            SELECT is_processed, assigned_to IS NOT NULL, priority, action, COUNT(*)
            FROM moderation_queue
            WHERE 1=1
            "#,
        );
        push_date_range(&mut qb, "created_at", range);
        qb.push(" GROUP BY 1, 2, 3, 4");

        let rows: Vec<(bool, bool, Priority, ModerationAction, i64)> =
            qb.build_query_as().fetch_all(&*self.pool).await?;

        let mut stats = QueueStats::default();
        for (is_processed, assigned, priority, action, count) in rows {
            stats.total += count;
            if is_processed {
                stats.processed += count;
                *stats.by_action.entry(action).or_default() += count;
                continue;
            }
            stats.pending += count;
            *stats.by_priority.entry(priority.value()).or_default() += count;
            if assigned {
                stats.assigned += count;
            } else {
                stats.unassigned += count;
            }
        }
        Ok(stats)
    }
}

#[async_trait]
impl ActionLogStore for PgStore {
    async fn list_action_logs(
        &self,
        filter: &ActionLogFilter,
        page: Pagination,
    ) -> Result<Vec<ModerationActionLog>> {
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {} FROM moderation_action_logs WHERE 1=1",
            LOG_COLUMNS
        ));
        if let Some(moderator_id) = filter.moderator_id {
            qb.push(" AND moderator_id = ").push_bind(moderator_id);
        }
        if let Some(action) = filter.action {
            qb.push(" AND action = ").push_bind(action);
        }
        if let Some(target_id) = &filter.target_id {
            qb.push(" AND target_id = ").push_bind(target_id.clone());
        }
        qb.push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(page.take)
            .push(" OFFSET ")
            .push_bind(page.skip);

        let rows = qb
            .build_query_as::<ActionLogRow>()
            .fetch_all(&*self.pool)
            .await?;
        Ok(rows.into_iter().map(ModerationActionLog::from).collect())
    }
}

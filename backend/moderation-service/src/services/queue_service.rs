//! Moderation queue: deduplicated, priority-banded worklist plus processing.
//!
//! Ordering is priority desc, then oldest first. Each content id owns at most one
//! unprocessed item; adding it again folds into that item and can only raise its
//! priority. Processing writes the audit row in the same transaction.

use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::db::ModerationStore;
use crate::error::{ModerationError, Result};
use crate::events::{dispatch_best_effort, DomainEvent, EventDispatcher, EventPayload};
use crate::metrics::ModerationMetrics;
use crate::models::*;

pub const DEFAULT_RETENTION_DAYS: i64 = 30;

/// Base priority of the content type plus one per flag, counting at most two flags.
pub fn calculate_priority(content_type: &ContentType, flag_count: usize) -> Priority {
    let escalation = flag_count.min(2) as i64;
    Priority::clamped(i64::from(content_type.base_priority().value()) + escalation)
}

pub struct QueueService {
    store: Arc<dyn ModerationStore>,
    dispatcher: Arc<dyn EventDispatcher>,
    metrics: Option<ModerationMetrics>,
    retention_days: i64,
}

impl QueueService {
    pub fn new(store: Arc<dyn ModerationStore>, dispatcher: Arc<dyn EventDispatcher>) -> Self {
        Self {
            store,
            dispatcher,
            metrics: None,
            retention_days: DEFAULT_RETENTION_DAYS,
        }
    }

    pub fn with_metrics(mut self, metrics: ModerationMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_retention_days(mut self, days: i64) -> Self {
        self.retention_days = days;
        self
    }

    pub async fn add_to_queue(&self, input: NewQueueItem) -> Result<EnqueueOutcome> {
        input.validate()?;

        let mut flags: Vec<Uuid> = Vec::with_capacity(input.flags.len());
        for id in input.flags {
            if !flags.contains(&id) {
                flags.push(id);
            }
        }
        self.check_flags(&input.content_id, &flags).await?;

        let priority = input
            .priority
            .unwrap_or_else(|| calculate_priority(&input.content_type, flags.len()));
        let outcome = self
            .store
            .enqueue(EnqueueRequest {
                content_id: input.content_id,
                content_type: input.content_type,
                priority,
                reason: input.reason,
                flags,
            })
            .await?;

        let item = outcome.item();
        match &outcome {
            EnqueueOutcome::Escalated { previous, .. } => info!(
                queue_item_id = %item.id,
                content_id = %item.content_id,
                from = previous.value(),
                to = item.priority.value(),
                "Queue item escalated"
            ),
            _ => info!(
                queue_item_id = %item.id,
                content_id = %item.content_id,
                priority = item.priority.value(),
                outcome = outcome.label(),
                "Content queued"
            ),
        }
        if let Some(metrics) = &self.metrics {
            metrics.enqueued(&outcome);
        }

        Ok(outcome)
    }

    /// Every referenced flag must exist and describe the same content.
    async fn check_flags(&self, content_id: &str, flags: &[Uuid]) -> Result<()> {
        if flags.is_empty() {
            return Ok(());
        }

        let found = self.store.get_flags_by_ids(flags).await?;
        for id in flags {
            match found.iter().find(|flag| flag.id == *id) {
                None => return Err(ModerationError::not_found("ContentFlag", id)),
                Some(flag) if flag.content_id != content_id => {
                    return Err(ModerationError::Validation(format!(
                        "flag {} belongs to content {}, not {}",
                        id, flag.content_id, content_id
                    )))
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    pub async fn get_queue_item(&self, id: Uuid) -> Result<QueueItem> {
        self.store
            .get_queue_item(id)
            .await?
            .ok_or_else(|| ModerationError::not_found("QueueItem", id))
    }

    /// The unprocessed item for a content id, if any.
    pub async fn get_queue_item_by_content(&self, content_id: &str) -> Result<Option<QueueItem>> {
        self.store.get_active_item(content_id).await
    }

    pub async fn get_queue_items(&self, filter: &QueueFilter, page: Pagination) -> Result<Vec<QueueItem>> {
        self.store.list_queue_items(filter, page).await
    }

    pub async fn get_unassigned_items(&self, limit: i64) -> Result<Vec<QueueItem>> {
        if limit <= 0 {
            return Ok(Vec::new());
        }
        let filter = QueueFilter {
            unassigned_only: true,
            ..QueueFilter::pending()
        };
        self.store
            .list_queue_items(&filter, Pagination::first(limit))
            .await
    }

    /// Open worklist of one moderator.
    pub async fn get_assigned_items(&self, moderator_id: Uuid, page: Pagination) -> Result<Vec<QueueItem>> {
        let filter = QueueFilter {
            assigned_to: Some(moderator_id),
            ..QueueFilter::pending()
        };
        self.store.list_queue_items(&filter, page).await
    }

    /// Manual (re)assignment; the last writer wins. Processed items are refused.
    pub async fn assign_queue_item(&self, id: Uuid, moderator_id: Uuid) -> Result<QueueItem> {
        let claimed = self
            .store
            .claim_queue_items(&[id], moderator_id, ClaimMode::Override)
            .await?;
        let item = match claimed.into_iter().next() {
            Some(item) => item,
            None => return Err(self.claim_failure(id).await),
        };

        info!(queue_item_id = %id, moderator_id = %moderator_id, "Queue item assigned");
        Ok(item)
    }

    /// Takes an item only if nobody holds it yet.
    pub async fn claim_queue_item(&self, id: Uuid, moderator_id: Uuid) -> Result<QueueItem> {
        let claimed = self
            .store
            .claim_queue_items(&[id], moderator_id, ClaimMode::IfUnclaimed)
            .await?;
        let item = match claimed.into_iter().next() {
            Some(item) => item,
            None => return Err(self.claim_failure(id).await),
        };

        info!(queue_item_id = %id, moderator_id = %moderator_id, "Queue item claimed");
        Ok(item)
    }

    async fn claim_failure(&self, id: Uuid) -> ModerationError {
        match self.store.get_queue_item(id).await {
            Err(e) => e,
            Ok(None) => ModerationError::not_found("QueueItem", id),
            Ok(Some(item)) if item.is_processed => {
                ModerationError::transition("QueueItem", "PROCESSED", "ASSIGNED")
            }
            Ok(Some(item)) => ModerationError::Conflict(format!(
                "queue item {} is already assigned to {}",
                id,
                item.assigned_to.map(|m| m.to_string()).unwrap_or_default()
            )),
        }
    }

    /// Claims each unassigned, unprocessed item among `ids`. Returns how many were won.
    pub async fn bulk_assign_items(&self, ids: &[Uuid], moderator_id: Uuid) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }

        let claimed = self
            .store
            .claim_queue_items(ids, moderator_id, ClaimMode::IfUnclaimed)
            .await?;
        info!(
            requested = ids.len(),
            claimed = claimed.len(),
            moderator_id = %moderator_id,
            "Queue items bulk assigned"
        );
        Ok(claimed.len())
    }

    /// Records the moderator's decision and its audit entry atomically.
    pub async fn process_queue_item(
        &self,
        id: Uuid,
        command: ProcessCommand,
    ) -> Result<(QueueItem, ModerationActionLog)> {
        let moderator_id = command.moderator_id;
        let (item, log) = self
            .store
            .process_queue_item(id, command, Utc::now())
            .await?;

        info!(
            queue_item_id = %item.id,
            content_id = %item.content_id,
            action = item.action.as_str(),
            moderator_id = %moderator_id,
            action_log_id = %log.id,
            "Queue item processed"
        );
        if let Some(metrics) = &self.metrics {
            metrics.processed(item.action);
        }

        let event = DomainEvent::new(
            item.content_id.clone(),
            moderator_id,
            EventPayload::QueueItemProcessed {
                queue_item_id: item.id,
                content_id: item.content_id.clone(),
                content_type: item.content_type.clone(),
                action: item.action,
                priority: item.priority,
                action_log_id: log.id,
            },
        );
        dispatch_best_effort(self.dispatcher.as_ref(), event).await;

        Ok((item, log))
    }

    pub async fn delete_queue_item(&self, id: Uuid) -> Result<()> {
        if !self.store.delete_queue_item(id).await? {
            return Err(ModerationError::not_found("QueueItem", id));
        }
        info!(queue_item_id = %id, "Queue item deleted");
        Ok(())
    }

    /// Drops processed items finished more than `days_old` days ago. The action log is kept.
    pub async fn cleanup_old_items(&self, days_old: i64) -> Result<u64> {
        if days_old < 1 {
            return Err(ModerationError::Validation(format!(
                "days_old must be at least 1, got {}",
                days_old
            )));
        }

        // Past chrono's range nothing can be that old.
        let Some(cutoff) = Duration::try_days(days_old).and_then(|age| Utc::now().checked_sub_signed(age))
        else {
            info!(days_old, "Retention window exceeds the calendar, nothing to clean up");
            return Ok(0);
        };
        let removed = self.store.delete_processed_before(cutoff).await?;
        info!(days_old, removed, "Processed queue items cleaned up");
        Ok(removed)
    }

    pub async fn cleanup_expired_items(&self) -> Result<u64> {
        self.cleanup_old_items(self.retention_days).await
    }

    pub async fn get_queue_stats(&self, range: DateRange) -> Result<QueueStats> {
        self.store.queue_stats(range).await
    }

    /// Audit trail, newest first.
    pub async fn get_action_logs(
        &self,
        filter: &ActionLogFilter,
        page: Pagination,
    ) -> Result<Vec<ModerationActionLog>> {
        self.store.list_action_logs(filter, page).await
    }

    pub async fn get_action_logs_for_target(&self, content_id: &str) -> Result<Vec<ModerationActionLog>> {
        let filter = ActionLogFilter {
            target_id: Some(content_id.to_string()),
            ..Default::default()
        };

        let mut logs = Vec::new();
        let mut page = Pagination::new(0, Pagination::MAX_TAKE);
        loop {
            let batch = self.store.list_action_logs(&filter, page).await?;
            let done = (batch.len() as i64) < page.take;
            logs.extend(batch);
            if done {
                return Ok(logs);
            }
            page = Pagination::new(page.skip + page.take, page.take);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::events::{EventType, MockEventDispatcher, NoopDispatcher};

    fn service() -> QueueService {
        QueueService::new(Arc::new(MemoryStore::new()), Arc::new(NoopDispatcher))
    }

    fn entry(content_id: &str, priority: Option<Priority>) -> NewQueueItem {
        NewQueueItem {
            content_id: content_id.to_string(),
            content_type: ContentType::Post,
            priority,
            reason: None,
            flags: Vec::new(),
        }
    }

    fn process(action: ModerationAction, moderator_id: Uuid) -> ProcessCommand {
        ProcessCommand {
            action,
            moderator_id,
            notes: None,
        }
    }

    #[test]
    fn test_calculate_priority_stays_in_range() {
        let types = [
            ContentType::Post,
            ContentType::Comment,
            ContentType::UserProfile,
            ContentType::Media,
            ContentType::Message,
            ContentType::from("LIVESTREAM"),
        ];
        for content_type in &types {
            for flags in 0..6 {
                let p = calculate_priority(content_type, flags).value();
                assert!((1..=4).contains(&p), "{content_type} with {flags} flags -> {p}");
            }
        }
        assert_eq!(calculate_priority(&ContentType::from("LIVESTREAM"), 0), Priority::LOW);
        assert_eq!(calculate_priority(&ContentType::Post, 2), Priority::CRITICAL);
        assert_eq!(calculate_priority(&ContentType::Comment, 1), Priority::MEDIUM);
        assert_eq!(calculate_priority(&ContentType::UserProfile, 5), Priority::CRITICAL);
    }

    #[tokio::test]
    async fn test_requeue_keeps_single_item() {
        let service = service();
        let first = service
            .add_to_queue(entry("c1", Some(Priority::HIGH)))
            .await
            .unwrap();
        let second = service
            .add_to_queue(entry("c1", Some(Priority::MEDIUM)))
            .await
            .unwrap();

        assert!(matches!(second, EnqueueOutcome::Merged { .. }));
        assert_eq!(second.item().id, first.item().id);
        assert_eq!(second.item().priority, Priority::HIGH);

        let third = service
            .add_to_queue(entry("c1", Some(Priority::CRITICAL)))
            .await
            .unwrap();
        assert!(matches!(
            third,
            EnqueueOutcome::Escalated {
                previous: Priority::HIGH,
                ..
            }
        ));

        let items = service
            .get_queue_items(&QueueFilter::default(), Pagination::default())
            .await
            .unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].priority, Priority::CRITICAL);
    }

    #[tokio::test]
    async fn test_flags_must_exist_and_match_content() {
        let store = Arc::new(MemoryStore::new());
        let service = QueueService::new(store.clone(), Arc::new(NoopDispatcher));
        let flags = crate::services::ContentFlagService::new(store);
        let other = flags
            .create_content_flag(NewContentFlag {
                content_id: "c2".into(),
                content_type: ContentType::Post,
                flag_type: FlagType::Spam,
                confidence: 0.9,
            })
            .await
            .unwrap();

        let mut input = entry("c1", None);
        input.flags = vec![Uuid::new_v4()];
        let err = service.add_to_queue(input).await.unwrap_err();
        assert!(matches!(err, ModerationError::NotFound { entity: "ContentFlag", .. }));

        let mut input = entry("c1", None);
        input.flags = vec![other.id];
        let err = service.add_to_queue(input).await.unwrap_err();
        assert!(matches!(err, ModerationError::Validation(_)));
    }

    #[tokio::test]
    async fn test_claim_conflicts_but_assign_overrides() {
        let service = service();
        let item = service
            .add_to_queue(entry("c1", None))
            .await
            .unwrap()
            .into_item();
        let (m1, m2) = (Uuid::new_v4(), Uuid::new_v4());

        service.claim_queue_item(item.id, m1).await.unwrap();
        let err = service.claim_queue_item(item.id, m2).await.unwrap_err();
        assert!(matches!(err, ModerationError::Conflict(_)));

        let reassigned = service.assign_queue_item(item.id, m2).await.unwrap();
        assert_eq!(reassigned.assigned_to, Some(m2));

        let err = service
            .assign_queue_item(Uuid::new_v4(), m1)
            .await
            .unwrap_err();
        assert!(matches!(err, ModerationError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_bulk_assign_counts_only_won_rows() {
        let service = service();
        let a = service.add_to_queue(entry("a", None)).await.unwrap().into_item();
        let b = service.add_to_queue(entry("b", None)).await.unwrap().into_item();
        let c = service.add_to_queue(entry("c", None)).await.unwrap().into_item();
        let (m1, m2) = (Uuid::new_v4(), Uuid::new_v4());

        service.assign_queue_item(b.id, m1).await.unwrap();
        service
            .process_queue_item(c.id, process(ModerationAction::None, m1))
            .await
            .unwrap();

        let won = service.bulk_assign_items(&[a.id, b.id, c.id], m2).await.unwrap();
        assert_eq!(won, 1);
        assert_eq!(service.get_queue_item(b.id).await.unwrap().assigned_to, Some(m1));

        let mine = service
            .get_assigned_items(m2, Pagination::default())
            .await
            .unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].id, a.id);
    }

    #[tokio::test]
    async fn test_process_twice_is_rejected_without_second_log() {
        let service = service();
        let item = service.add_to_queue(entry("c1", None)).await.unwrap().into_item();
        let moderator = Uuid::new_v4();

        service
            .process_queue_item(item.id, process(ModerationAction::Warning, moderator))
            .await
            .unwrap();
        let err = service
            .process_queue_item(item.id, process(ModerationAction::UserBan, moderator))
            .await
            .unwrap_err();
        assert!(matches!(err, ModerationError::InvalidStatusTransition { .. }));

        let logs = service.get_action_logs_for_target("c1").await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].action, ModerationAction::Warning);
    }

    #[tokio::test]
    async fn test_process_emits_event_after_commit() {
        let mut dispatcher = MockEventDispatcher::new();
        dispatcher
            .expect_dispatch()
            .withf(|event| {
                event.event_type == EventType::QueueItemProcessed && event.target_id == "c1"
            })
            .times(1)
            .returning(|_| Err(ModerationError::Internal("dispatcher offline".into())));
        let service = QueueService::new(Arc::new(MemoryStore::new()), Arc::new(dispatcher));

        let item = service.add_to_queue(entry("c1", None)).await.unwrap().into_item();
        let (processed, _) = service
            .process_queue_item(
                item.id,
                process(ModerationAction::ContentRemoval, Uuid::new_v4()),
            )
            .await
            .unwrap();
        assert!(processed.is_processed);
    }

    #[tokio::test]
    async fn test_cleanup_keeps_recent_and_pending_items() {
        let service = service();
        let item = service.add_to_queue(entry("c1", None)).await.unwrap().into_item();
        service.add_to_queue(entry("c2", None)).await.unwrap();
        service
            .process_queue_item(item.id, process(ModerationAction::None, Uuid::new_v4()))
            .await
            .unwrap();

        assert!(service.cleanup_old_items(0).await.is_err());
        assert_eq!(service.cleanup_expired_items().await.unwrap(), 0);
        assert_eq!(service.cleanup_old_items(1_000_000_000_000).await.unwrap(), 0);
        assert_eq!(service.cleanup_old_items(i64::MAX).await.unwrap(), 0);

        let stats = service.get_queue_stats(DateRange::all()).await.unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.processed, 1);
        assert_eq!(stats.pending, 1);
    }
}

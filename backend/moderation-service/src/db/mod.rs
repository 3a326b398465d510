//! Persistence contract for the moderation core.
//!
//! Every compound write named here is atomic in each implementation: enqueue
//! merges, claims, and processing together with its audit row.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::models::*;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::{create_pool, PgStore};

#[async_trait]
pub trait ReportStore: Send + Sync {
    async fn insert_report(&self, report: Report) -> Result<Report>;
    async fn get_report(&self, id: Uuid) -> Result<Option<Report>>;
    /// Persists `report` only while the stored status still equals `expected`.
    /// Only status is compared; concurrent priority or assignment edits on an
    /// open report are last-writer-wins.
    async fn update_report(&self, report: &Report, expected: ReportStatus) -> Result<Report>;
    async fn delete_report(&self, id: Uuid) -> Result<bool>;
    /// Newest first.
    async fn list_reports(&self, filter: &ReportFilter, page: Pagination) -> Result<Vec<Report>>;
    async fn count_reports(&self, filter: &ReportFilter) -> Result<i64>;
    async fn report_stats(&self, range: DateRange) -> Result<ReportStats>;
}

#[async_trait]
pub trait ContentFlagStore: Send + Sync {
    async fn insert_flag(&self, flag: ContentFlag) -> Result<ContentFlag>;
    async fn get_flag(&self, id: Uuid) -> Result<Option<ContentFlag>>;
    async fn get_flags_by_ids(&self, ids: &[Uuid]) -> Result<Vec<ContentFlag>>;
    /// Newest first.
    async fn list_flags(&self, filter: &FlagFilter, page: Pagination) -> Result<Vec<ContentFlag>>;
    /// Marks unresolved flags among `ids` resolved and returns every existing flag in `ids`.
    async fn resolve_flags(
        &self,
        ids: &[Uuid],
        resolver_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<ContentFlag>>;
    async fn delete_flag(&self, id: Uuid) -> Result<bool>;
    /// Unresolved flags with confidence >= `threshold`, most confident first.
    async fn high_confidence_flags(&self, threshold: f64, limit: i64) -> Result<Vec<ContentFlag>>;
    async fn flag_stats(&self, range: DateRange) -> Result<FlagStats>;
}

#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Inserts a new item, or folds the request into the content's unprocessed item.
    async fn enqueue(&self, request: EnqueueRequest) -> Result<EnqueueOutcome>;
    async fn get_queue_item(&self, id: Uuid) -> Result<Option<QueueItem>>;
    async fn get_active_item(&self, content_id: &str) -> Result<Option<QueueItem>>;
    /// Ordered by priority desc, then oldest first.
    async fn list_queue_items(&self, filter: &QueueFilter, page: Pagination) -> Result<Vec<QueueItem>>;
    /// Conditional assignment; returns only the items actually claimed.
    async fn claim_queue_items(
        &self,
        ids: &[Uuid],
        moderator_id: Uuid,
        mode: ClaimMode,
    ) -> Result<Vec<QueueItem>>;
    /// Marks the item processed and appends its audit row in one transaction.
    async fn process_queue_item(
        &self,
        id: Uuid,
        command: ProcessCommand,
        now: DateTime<Utc>,
    ) -> Result<(QueueItem, ModerationActionLog)>;
    async fn delete_queue_item(&self, id: Uuid) -> Result<bool>;
    /// Drops processed items whose processing finished before `cutoff`.
    async fn delete_processed_before(&self, cutoff: DateTime<Utc>) -> Result<u64>;
    async fn queue_stats(&self, range: DateRange) -> Result<QueueStats>;
}

#[async_trait]
pub trait ActionLogStore: Send + Sync {
    /// Newest first.
    async fn list_action_logs(
        &self,
        filter: &ActionLogFilter,
        page: Pagination,
    ) -> Result<Vec<ModerationActionLog>>;
}

#[async_trait]
pub trait AppealStore: Send + Sync {
    /// Fails with `Conflict` when the report already has an appeal.
    async fn insert_appeal(&self, appeal: Appeal) -> Result<Appeal>;
    async fn get_appeal(&self, id: Uuid) -> Result<Option<Appeal>>;
    async fn get_appeal_by_report(&self, report_id: Uuid) -> Result<Option<Appeal>>;
    /// Persists `appeal` only while the stored status still equals `expected`.
    async fn update_appeal(&self, appeal: &Appeal, expected: AppealStatus) -> Result<Appeal>;
    async fn delete_appeal(&self, id: Uuid) -> Result<bool>;
    async fn list_appeals(&self, filter: &AppealFilter, page: Pagination, oldest_first: bool)
        -> Result<Vec<Appeal>>;
    async fn appeal_stats(&self, range: DateRange) -> Result<AppealStats>;
}

#[async_trait]
pub trait StoreHealth: Send + Sync {
    async fn ping(&self) -> Result<()>;
}

pub trait ModerationStore:
    ReportStore + ContentFlagStore + QueueStore + ActionLogStore + AppealStore + StoreHealth
{
}

impl<T> ModerationStore for T where
    T: ReportStore + ContentFlagStore + QueueStore + ActionLogStore + AppealStore + StoreHealth
{
}

use std::sync::Arc;
use tracing::info;

use super::{AppealService, ContentFlagService, QueueService, ReportService};
use crate::config::Config;
use crate::db::{MemoryStore, ModerationStore};
use crate::error::Result;
use crate::events::{EventDispatcher, NoopDispatcher};
use crate::metrics::ModerationMetrics;
use crate::models::*;

/// The four moderation services wired over one store and one dispatcher.
#[derive(Clone)]
pub struct ModerationCore {
    pub reports: Arc<ReportService>,
    pub flags: Arc<ContentFlagService>,
    pub queue: Arc<QueueService>,
    pub appeals: Arc<AppealService>,
    store: Arc<dyn ModerationStore>,
}

impl ModerationCore {
    pub fn new(
        store: Arc<dyn ModerationStore>,
        dispatcher: Arc<dyn EventDispatcher>,
        metrics: Option<ModerationMetrics>,
    ) -> Self {
        Self::build(store, dispatcher, metrics, None)
    }

    /// Like `new`, with thresholds and retention taken from `config`.
    pub fn from_config(
        config: &Config,
        store: Arc<dyn ModerationStore>,
        dispatcher: Arc<dyn EventDispatcher>,
        metrics: Option<ModerationMetrics>,
    ) -> Self {
        Self::build(store, dispatcher, metrics, Some(config))
    }

    /// Memory-backed core with events discarded.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()), Arc::new(NoopDispatcher), None)
    }

    fn build(
        store: Arc<dyn ModerationStore>,
        dispatcher: Arc<dyn EventDispatcher>,
        metrics: Option<ModerationMetrics>,
        config: Option<&Config>,
    ) -> Self {
        let mut reports = ReportService::new(store.clone(), dispatcher.clone());
        let mut flags = ContentFlagService::new(store.clone());
        let mut queue = QueueService::new(store.clone(), dispatcher.clone());
        let mut appeals = AppealService::new(store.clone(), dispatcher);

        if let Some(metrics) = metrics {
            reports = reports.with_metrics(metrics.clone());
            queue = queue.with_metrics(metrics.clone());
            appeals = appeals.with_metrics(metrics);
        }
        if let Some(config) = config {
            flags = flags.with_threshold(config.flag_confidence_threshold);
            queue = queue.with_retention_days(config.queue_retention_days);
        }

        Self {
            reports: Arc::new(reports),
            flags: Arc::new(flags),
            queue: Arc::new(queue),
            appeals: Arc::new(appeals),
            store,
        }
    }

    /// Creates the report and, for content reports, queues the content at the
    /// report's priority with its reason.
    ///
    /// If queueing fails the report stays filed and the error is returned; a retry
    /// folds into any item that already exists.
    pub async fn report_and_enqueue(&self, input: NewReport) -> Result<(Report, Option<EnqueueOutcome>)> {
        let report = self.reports.create_report(input).await?;

        let Some(ReportTarget::Content {
            content_id,
            content_type,
            ..
        }) = report.target()
        else {
            return Ok((report, None));
        };

        let outcome = self
            .queue
            .add_to_queue(NewQueueItem {
                content_id,
                content_type,
                priority: Some(report.priority),
                reason: Some(report.reason.clone()),
                flags: Vec::new(),
            })
            .await?;

        info!(
            report_id = %report.id,
            queue_item_id = %outcome.item().id,
            outcome = outcome.label(),
            "Report routed to moderation queue"
        );
        Ok((report, Some(outcome)))
    }

    /// Readiness of the backing store.
    pub async fn ping(&self) -> Result<()> {
        self.store.ping().await
    }
}

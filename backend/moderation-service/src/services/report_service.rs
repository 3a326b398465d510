use chrono::Utc;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::db::ModerationStore;
use crate::error::{ModerationError, Result};
use crate::events::{dispatch_best_effort, DomainEvent, EventDispatcher, EventPayload};
use crate::metrics::ModerationMetrics;
use crate::models::*;

/// Report intake and moderator-side report lifecycle
pub struct ReportService {
    store: Arc<dyn ModerationStore>,
    dispatcher: Arc<dyn EventDispatcher>,
    metrics: Option<ModerationMetrics>,
}

impl ReportService {
    pub fn new(store: Arc<dyn ModerationStore>, dispatcher: Arc<dyn EventDispatcher>) -> Self {
        Self {
            store,
            dispatcher,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: ModerationMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// File a new report. Priority defaults to the report type's severity.
    ///
    /// Intake never enqueues on its own; see `ModerationCore::report_and_enqueue`.
    pub async fn create_report(&self, input: NewReport) -> Result<Report> {
        input.validate()?;
        input.target.validate()?;

        let report = self.store.insert_report(Report::new(input)).await?;

        info!(
            report_id = %report.id,
            reporter_id = %report.reporter_id,
            report_type = report.report_type.as_str(),
            priority = report.priority.value(),
            "Report created"
        );
        if let Some(metrics) = &self.metrics {
            metrics.report_created(report.report_type);
        }

        Ok(report)
    }

    pub async fn get_report(&self, id: Uuid) -> Result<Report> {
        self.store
            .get_report(id)
            .await?
            .ok_or_else(|| ModerationError::not_found("Report", id))
    }

    /// PENDING -> UNDER_REVIEW with the moderator as assignee.
    pub async fn assign_report(&self, id: Uuid, moderator_id: Uuid) -> Result<Report> {
        let mut report = self.get_report(id).await?;
        let expected = report.status;
        report.assign(moderator_id, Utc::now())?;

        let report = self.store.update_report(&report, expected).await?;
        info!(
            report_id = %id,
            moderator_id = %moderator_id,
            "Report assigned"
        );
        Ok(report)
    }

    pub async fn resolve_report(
        &self,
        id: Uuid,
        resolution: String,
        moderator_id: Uuid,
    ) -> Result<Report> {
        self.close(id, ReportStatus::Resolved, resolution, moderator_id)
            .await
    }

    pub async fn dismiss_report(&self, id: Uuid, reason: String, moderator_id: Uuid) -> Result<Report> {
        self.close(id, ReportStatus::Dismissed, reason, moderator_id)
            .await
    }

    async fn close(
        &self,
        id: Uuid,
        outcome: ReportStatus,
        resolution: String,
        moderator_id: Uuid,
    ) -> Result<Report> {
        let mut report = self.get_report(id).await?;
        let expected = report.status;
        report.close(outcome, resolution, moderator_id, Utc::now())?;

        let report = self.store.update_report(&report, expected).await?;
        info!(
            report_id = %id,
            moderator_id = %moderator_id,
            status = report.status.as_str(),
            "Report closed"
        );

        self.emit_closed(&report, moderator_id).await;
        Ok(report)
    }

    /// Generic moderator patch. Leaving PENDING stamps review metadata and
    /// closed reports never reopen.
    pub async fn update_report(&self, id: Uuid, patch: ReportPatch, updated_by: Uuid) -> Result<Report> {
        let mut report = self.get_report(id).await?;
        let expected = report.status;
        report.apply_patch(patch, updated_by, Utc::now())?;

        let report = self.store.update_report(&report, expected).await?;
        info!(
            report_id = %id,
            updated_by = %updated_by,
            from = expected.as_str(),
            to = report.status.as_str(),
            "Report updated"
        );

        if report.status != expected && report.status.is_terminal() {
            self.emit_closed(&report, updated_by).await;
        }
        Ok(report)
    }

    async fn emit_closed(&self, report: &Report, moderator_id: Uuid) {
        let payload = match report.status {
            ReportStatus::Resolved => EventPayload::ReportResolved {
                report_id: report.id,
                reported_user_id: report.reported_user_id,
                content_id: report.content_id.clone(),
                resolution: report.resolution.clone(),
            },
            ReportStatus::Dismissed => EventPayload::ReportDismissed {
                report_id: report.id,
                reason: report.resolution.clone(),
            },
            _ => return,
        };
        let event = DomainEvent::new(report.id.to_string(), moderator_id, payload);
        dispatch_best_effort(self.dispatcher.as_ref(), event).await;
    }

    pub async fn delete_report(&self, id: Uuid) -> Result<()> {
        if !self.store.delete_report(id).await? {
            return Err(ModerationError::not_found("Report", id));
        }
        info!(report_id = %id, "Report deleted");
        Ok(())
    }

    /// Newest first.
    pub async fn get_reports(&self, filter: &ReportFilter, page: Pagination) -> Result<Vec<Report>> {
        self.store.list_reports(filter, page).await
    }

    pub async fn count_reports(&self, filter: &ReportFilter) -> Result<i64> {
        self.store.count_reports(filter).await
    }

    pub async fn get_reports_by_reporter(&self, reporter_id: Uuid, page: Pagination) -> Result<Vec<Report>> {
        let filter = ReportFilter {
            reporter_id: Some(reporter_id),
            ..Default::default()
        };
        self.store.list_reports(&filter, page).await
    }

    pub async fn get_report_stats(&self, range: DateRange) -> Result<ReportStats> {
        self.store.report_stats(range).await
    }
}

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

/// Appeal service for contesting report outcomes
pub struct AppealService {
    store: Arc<dyn ModerationStore>,
    dispatcher: Arc<dyn EventDispatcher>,
    metrics: Option<ModerationMetrics>,
}

impl AppealService {
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

    /// Why `user_id` may or may not appeal the outcome of `report_id`.
    pub async fn check_appeal_eligibility(&self, report_id: Uuid, user_id: Uuid) -> Result<AppealEligibility> {
        let Some(report) = self.store.get_report(report_id).await? else {
            return Ok(AppealEligibility::ReportNotFound);
        };
        if !report.status.is_terminal() {
            return Ok(AppealEligibility::ReportNotFinal);
        }
        if report.affected_user_id() != Some(user_id) {
            return Ok(AppealEligibility::NotAffectedParty);
        }
        if self.store.get_appeal_by_report(report_id).await?.is_some() {
            return Ok(AppealEligibility::AlreadyAppealed);
        }
        Ok(AppealEligibility::Eligible)
    }

    pub async fn can_user_appeal(&self, report_id: Uuid, user_id: Uuid) -> Result<bool> {
        Ok(self
            .check_appeal_eligibility(report_id, user_id)
            .await?
            .is_eligible())
    }

    /// File a pending appeal. The report must exist and may carry only one appeal;
    /// the other eligibility rules are left to `can_user_appeal`.
    pub async fn create_appeal(&self, input: NewAppeal) -> Result<Appeal> {
        input.validate()?;

        if self.store.get_report(input.report_id).await?.is_none() {
            return Err(ModerationError::not_found("Report", input.report_id));
        }

        let appeal = self
            .store
            .insert_appeal(Appeal::new(input.report_id, input.appellant_id, input.reason))
            .await?;

        info!(
            appeal_id = %appeal.id,
            report_id = %appeal.report_id,
            appellant_id = %appeal.appellant_id,
            "Appeal submitted"
        );
        Ok(appeal)
    }

    pub async fn approve_appeal(&self, id: Uuid, reviewer_id: Uuid, notes: Option<String>) -> Result<Appeal> {
        self.review_appeal(id, reviewer_id, AppealStatus::Approved, notes)
            .await
    }

    pub async fn reject_appeal(&self, id: Uuid, reviewer_id: Uuid, notes: Option<String>) -> Result<Appeal> {
        self.review_appeal(id, reviewer_id, AppealStatus::Rejected, notes)
            .await
    }

    /// Review an appeal (moderator action). Decided appeals are never overwritten.
    ///
    /// Reversing the original action on approval is left to event consumers.
    async fn review_appeal(
        &self,
        id: Uuid,
        reviewer_id: Uuid,
        decision: AppealStatus,
        notes: Option<String>,
    ) -> Result<Appeal> {
        let mut appeal = self.get_appeal(id).await?;
        let expected = appeal.status;
        appeal.review(reviewer_id, decision, notes, Utc::now())?;

        let appeal = self.store.update_appeal(&appeal, expected).await?;
        info!(
            appeal_id = %id,
            reviewer_id = %reviewer_id,
            decision = decision.as_str(),
            "Appeal reviewed"
        );
        self.after_decision(&appeal, reviewer_id).await;
        Ok(appeal)
    }

    async fn after_decision(&self, appeal: &Appeal, reviewer_id: Uuid) {
        if let Some(metrics) = &self.metrics {
            metrics.appeal_reviewed(appeal.status);
        }

        let payload = match appeal.status {
            AppealStatus::Approved => EventPayload::AppealApproved {
                appeal_id: appeal.id,
                report_id: appeal.report_id,
                appellant_id: appeal.appellant_id,
                review_notes: appeal.review_notes.clone(),
            },
            AppealStatus::Rejected => EventPayload::AppealRejected {
                appeal_id: appeal.id,
                report_id: appeal.report_id,
                appellant_id: appeal.appellant_id,
                review_notes: appeal.review_notes.clone(),
            },
            AppealStatus::Pending => return,
        };
        let event = DomainEvent::new(appeal.id.to_string(), reviewer_id, payload);
        dispatch_best_effort(self.dispatcher.as_ref(), event).await;
    }

    /// Get appeal by ID
    pub async fn get_appeal(&self, id: Uuid) -> Result<Appeal> {
        self.store
            .get_appeal(id)
            .await?
            .ok_or_else(|| ModerationError::not_found("Appeal", id))
    }

    pub async fn get_appeal_by_report(&self, report_id: Uuid) -> Result<Option<Appeal>> {
        self.store.get_appeal_by_report(report_id).await
    }

    pub async fn get_appeals_by_appellant(&self, appellant_id: Uuid, page: Pagination) -> Result<Vec<Appeal>> {
        let filter = AppealFilter {
            appellant_id: Some(appellant_id),
            ..Default::default()
        };
        self.store.list_appeals(&filter, page, false).await
    }

    /// Review backlog, oldest first.
    pub async fn get_pending_appeals(&self, page: Pagination) -> Result<Vec<Appeal>> {
        let filter = AppealFilter {
            status: Some(AppealStatus::Pending),
            ..Default::default()
        };
        self.store.list_appeals(&filter, page, true).await
    }

    pub async fn get_appeal_stats(&self, range: DateRange) -> Result<AppealStats> {
        self.store.appeal_stats(range).await
    }

    pub async fn update_appeal(&self, id: Uuid, patch: AppealPatch, updated_by: Uuid) -> Result<Appeal> {
        let mut appeal = self.get_appeal(id).await?;
        let expected = appeal.status;
        appeal.apply_patch(patch, updated_by, Utc::now())?;

        let appeal = self.store.update_appeal(&appeal, expected).await?;
        info!(
            appeal_id = %id,
            updated_by = %updated_by,
            status = appeal.status.as_str(),
            "Appeal updated"
        );
        if appeal.status != expected {
            self.after_decision(&appeal, updated_by).await;
        }
        Ok(appeal)
    }

    pub async fn delete_appeal(&self, id: Uuid) -> Result<()> {
        if !self.store.delete_appeal(id).await? {
            return Err(ModerationError::not_found("Appeal", id));
        }
        info!(appeal_id = %id, "Appeal deleted");
        Ok(())
    }

    /// Report and appeal lifecycle in chronological order. Built on read, never stored.
    pub async fn get_appeal_timeline(&self, report_id: Uuid) -> Result<Vec<TimelineEntry>> {
        let report = self
            .store
            .get_report(report_id)
            .await?
            .ok_or_else(|| ModerationError::not_found("Report", report_id))?;

        let mut timeline = vec![TimelineEntry {
            at: report.created_at,
            event: TimelineEvent::ReportCreated,
            actor_id: Some(report.reporter_id),
            detail: Some(report.reason.clone()),
        }];

        if let Some(at) = report.assigned_at {
            timeline.push(TimelineEntry {
                at,
                event: TimelineEvent::ReportAssigned,
                actor_id: report.assigned_to,
                detail: None,
            });
        }

        let closed = match report.status {
            ReportStatus::Resolved => Some(TimelineEvent::ReportResolved),
            ReportStatus::Dismissed => Some(TimelineEvent::ReportDismissed),
            _ => None,
        };
        if let (Some(event), Some(at)) = (closed, report.reviewed_at) {
            timeline.push(TimelineEntry {
                at,
                event,
                actor_id: report.reviewed_by,
                detail: report.resolution.clone(),
            });
        }

        if let Some(appeal) = self.store.get_appeal_by_report(report_id).await? {
            timeline.push(TimelineEntry {
                at: appeal.created_at,
                event: TimelineEvent::AppealFiled,
                actor_id: Some(appeal.appellant_id),
                detail: Some(appeal.reason.clone()),
            });

            let decided = match appeal.status {
                AppealStatus::Approved => Some(TimelineEvent::AppealApproved),
                AppealStatus::Rejected => Some(TimelineEvent::AppealRejected),
                AppealStatus::Pending => None,
            };
            if let (Some(event), Some(at)) = (decided, appeal.reviewed_at) {
                timeline.push(TimelineEntry {
                    at,
                    event,
                    actor_id: appeal.reviewed_by,
                    detail: appeal.review_notes.clone(),
                });
            }
        }

        timeline.sort_by_key(|entry| entry.at);
        Ok(timeline)
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use crate::error::{ModerationError, Result};

/// Appeal status enum with state machine
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "appeal_status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppealStatus {
    Pending,
    Approved,
    Rejected,
}

impl AppealStatus {
    /// Validate state transition (pending -> approved/rejected only)
    pub fn can_transition_to(&self, new_status: AppealStatus) -> bool {
        matches!(
            (self, new_status),
            (AppealStatus::Pending, AppealStatus::Approved)
                | (AppealStatus::Pending, AppealStatus::Rejected)
        )
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, AppealStatus::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AppealStatus::Pending => "PENDING",
            AppealStatus::Approved => "APPROVED",
            AppealStatus::Rejected => "REJECTED",
        }
    }
}

/// Appeal record
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Appeal {
    pub id: Uuid,
    pub report_id: Uuid,
    pub appellant_id: Uuid,
    pub reason: String,
    pub status: AppealStatus,
    pub reviewed_by: Option<Uuid>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub review_notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Appeal {
    /// Create new pending appeal
    pub fn new(report_id: Uuid, appellant_id: Uuid, reason: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            report_id,
            appellant_id,
            reason,
            status: AppealStatus::Pending,
            reviewed_by: None,
            reviewed_at: None,
            review_notes: None,
            created_at: Utc::now(),
        }
    }

    /// Review appeal (state transition). A decided appeal is never overwritten.
    pub fn review(
        &mut self,
        reviewer_id: Uuid,
        decision: AppealStatus,
        review_notes: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if !self.status.can_transition_to(decision) {
            return Err(ModerationError::transition(
                "Appeal",
                self.status.as_str(),
                decision.as_str(),
            ));
        }

        self.status = decision;
        self.reviewed_by = Some(reviewer_id);
        self.review_notes = review_notes;
        self.reviewed_at = Some(now);

        Ok(())
    }

    /// Edits a pending appeal or decides it. Once decided, reason and notes are frozen.
    pub fn apply_patch(&mut self, patch: AppealPatch, updated_by: Uuid, now: DateTime<Utc>) -> Result<()> {
        if self.status.is_terminal() && (patch.reason.is_some() || patch.review_notes.is_some()) {
            return Err(ModerationError::Conflict(format!(
                "appeal {} is already {}",
                self.id,
                self.status.as_str()
            )));
        }

        if let Some(reason) = patch.reason {
            self.reason = reason;
        }
        match patch.status {
            Some(status) if status != self.status => {
                self.review(updated_by, status, patch.review_notes, now)?
            }
            _ => {
                if let Some(notes) = patch.review_notes {
                    self.review_notes = Some(notes);
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewAppeal {
    pub report_id: Uuid,
    pub appellant_id: Uuid,
    #[validate(length(min = 1, max = 2000))]
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppealPatch {
    pub status: Option<AppealStatus>,
    pub reason: Option<String>,
    pub review_notes: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppealFilter {
    pub status: Option<AppealStatus>,
    pub appellant_id: Option<Uuid>,
    pub report_id: Option<Uuid>,
}

impl AppealFilter {
    pub fn matches(&self, appeal: &Appeal) -> bool {
        self.status.map_or(true, |s| appeal.status == s)
            && self.appellant_id.map_or(true, |id| appeal.appellant_id == id)
            && self.report_id.map_or(true, |id| appeal.report_id == id)
    }
}

/// Why a user may or may not contest a report outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppealEligibility {
    Eligible,
    ReportNotFound,
    ReportNotFinal,
    NotAffectedParty,
    AlreadyAppealed,
}

impl AppealEligibility {
    pub fn is_eligible(&self) -> bool {
        matches!(self, AppealEligibility::Eligible)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppealStats {
    pub total: i64,
    pub pending: i64,
    pub approved: i64,
    pub rejected: i64,
    /// Share of decided appeals that were approved.
    pub approval_rate: Option<f64>,
}

impl AppealStats {
    pub fn record(&mut self, status: AppealStatus, count: i64) {
        self.total += count;
        match status {
            AppealStatus::Pending => self.pending += count,
            AppealStatus::Approved => self.approved += count,
            AppealStatus::Rejected => self.rejected += count,
        }
        let decided = self.approved + self.rejected;
        self.approval_rate = (decided > 0).then(|| self.approved as f64 / decided as f64);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimelineEvent {
    ReportCreated,
    ReportAssigned,
    ReportResolved,
    ReportDismissed,
    AppealFiled,
    AppealApproved,
    AppealRejected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub at: DateTime<Utc>,
    pub event: TimelineEvent,
    pub actor_id: Option<Uuid>,
    pub detail: Option<String>,
}

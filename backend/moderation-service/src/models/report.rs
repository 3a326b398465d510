use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::BTreeMap;
use uuid::Uuid;
use validator::Validate;

use super::common::{ContentType, Priority};
use crate::error::{ModerationError, Result};

/// Category chosen by the reporter; drives the default severity.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "report_type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportType {
    Threat,
    HateSpeech,
    CopyrightViolation,
    Harassment,
    InappropriateContent,
    Spam,
    Misleading,
    Other,
}

impl ReportType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportType::Threat => "THREAT",
            ReportType::HateSpeech => "HATE_SPEECH",
            ReportType::CopyrightViolation => "COPYRIGHT_VIOLATION",
            ReportType::Harassment => "HARASSMENT",
            ReportType::InappropriateContent => "INAPPROPRIATE_CONTENT",
            ReportType::Spam => "SPAM",
            ReportType::Misleading => "MISLEADING",
            ReportType::Other => "OTHER",
        }
    }

    /// Severity table applied when the reporter gives no explicit priority.
    pub fn default_priority(&self) -> Priority {
        match self {
            ReportType::Threat | ReportType::HateSpeech => Priority::CRITICAL,
            ReportType::CopyrightViolation | ReportType::Harassment => Priority::HIGH,
            ReportType::InappropriateContent | ReportType::Spam | ReportType::Misleading => {
                Priority::MEDIUM
            }
            ReportType::Other => Priority::LOW,
        }
    }
}

/// Report lifecycle. RESOLVED and DISMISSED are final.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "report_status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportStatus {
    Pending,
    UnderReview,
    Resolved,
    Dismissed,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Pending => "PENDING",
            ReportStatus::UnderReview => "UNDER_REVIEW",
            ReportStatus::Resolved => "RESOLVED",
            ReportStatus::Dismissed => "DISMISSED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ReportStatus::Resolved | ReportStatus::Dismissed)
    }

    /// Final states never reopen; an under-review report may be released back to pending.
    pub fn can_transition_to(&self, next: ReportStatus) -> bool {
        use ReportStatus::*;
        matches!(
            (self, next),
            (Pending, UnderReview)
                | (Pending, Resolved)
                | (Pending, Dismissed)
                | (UnderReview, Pending)
                | (UnderReview, Resolved)
                | (UnderReview, Dismissed)
        )
    }
}

/// What a report points at. A content report may also name the content owner,
/// who is then the affected party for appeals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReportTarget {
    Content {
        content_id: String,
        content_type: ContentType,
        owner_id: Option<Uuid>,
    },
    User {
        user_id: Uuid,
    },
}

impl ReportTarget {
    pub fn validate(&self) -> Result<()> {
        match self {
            ReportTarget::Content { content_id, .. } if content_id.trim().is_empty() => Err(
                ModerationError::Validation("content target requires a content id".to_string()),
            ),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Report {
    pub id: Uuid,
    pub reporter_id: Uuid,
    pub reported_user_id: Option<Uuid>,
    pub content_id: Option<String>,
    pub content_type: Option<ContentType>,
    pub report_type: ReportType,
    pub reason: String,
    pub description: Option<String>,
    pub priority: Priority,
    pub status: ReportStatus,
    pub assigned_to: Option<Uuid>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub resolution: Option<String>,
    pub reviewed_by: Option<Uuid>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Report {
    pub fn new(input: NewReport) -> Self {
        let priority = input
            .priority
            .unwrap_or_else(|| input.report_type.default_priority());
        let (reported_user_id, content_id, content_type) = match input.target {
            ReportTarget::Content {
                content_id,
                content_type,
                owner_id,
            } => (owner_id, Some(content_id), Some(content_type)),
            ReportTarget::User { user_id } => (Some(user_id), None, None),
        };

        Self {
            id: Uuid::new_v4(),
            reporter_id: input.reporter_id,
            reported_user_id,
            content_id,
            content_type,
            report_type: input.report_type,
            reason: input.reason,
            description: input.description,
            priority,
            status: ReportStatus::Pending,
            assigned_to: None,
            assigned_at: None,
            resolution: None,
            reviewed_by: None,
            reviewed_at: None,
            created_at: Utc::now(),
        }
    }

    pub fn target(&self) -> Option<ReportTarget> {
        match (&self.content_id, &self.content_type, self.reported_user_id) {
            (Some(content_id), Some(content_type), owner_id) => Some(ReportTarget::Content {
                content_id: content_id.clone(),
                content_type: content_type.clone(),
                owner_id,
            }),
            (None, _, Some(user_id)) => Some(ReportTarget::User { user_id }),
            _ => None,
        }
    }

    /// User entitled to contest the outcome.
    pub fn affected_user_id(&self) -> Option<Uuid> {
        self.reported_user_id
    }

    /// Moves the report to `next`, stamping review metadata when it leaves PENDING.
    pub fn transition(&mut self, next: ReportStatus, actor_id: Uuid, now: DateTime<Utc>) -> Result<()> {
        if self.status == next {
            return Ok(());
        }
        if !self.status.can_transition_to(next) {
            return Err(ModerationError::transition(
                "Report",
                self.status.as_str(),
                next.as_str(),
            ));
        }

        self.status = next;
        if next != ReportStatus::Pending {
            self.reviewed_by = Some(actor_id);
            self.reviewed_at = Some(now);
        }
        Ok(())
    }

    pub fn assign(&mut self, moderator_id: Uuid, now: DateTime<Utc>) -> Result<()> {
        if self.status.is_terminal() {
            return Err(ModerationError::transition(
                "Report",
                self.status.as_str(),
                ReportStatus::UnderReview.as_str(),
            ));
        }
        self.transition(ReportStatus::UnderReview, moderator_id, now)?;
        self.assigned_to = Some(moderator_id);
        self.assigned_at = Some(now);
        Ok(())
    }

    pub fn close(
        &mut self,
        outcome: ReportStatus,
        resolution: String,
        moderator_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if !outcome.is_terminal() || self.status.is_terminal() {
            return Err(ModerationError::transition(
                "Report",
                self.status.as_str(),
                outcome.as_str(),
            ));
        }
        self.transition(outcome, moderator_id, now)?;
        self.resolution = Some(resolution);
        Ok(())
    }

    /// Partial update. A closed report accepts no field changes, only a no-op status.
    pub fn apply_patch(&mut self, patch: ReportPatch, updated_by: Uuid, now: DateTime<Utc>) -> Result<()> {
        let was_closed = self.status.is_terminal();
        if let Some(status) = patch.status {
            self.transition(status, updated_by, now)?;
        }
        if was_closed
            && (patch.priority.is_some() || patch.assigned_to.is_some() || patch.resolution.is_some())
        {
            return Err(ModerationError::Conflict(format!(
                "report {} is already {}",
                self.id,
                self.status.as_str()
            )));
        }
        if let Some(priority) = patch.priority {
            self.priority = priority;
        }
        if let Some(assigned_to) = patch.assigned_to {
            self.assigned_to = assigned_to;
            self.assigned_at = assigned_to.map(|_| now);
        }
        if let Some(resolution) = patch.resolution {
            self.resolution = Some(resolution);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewReport {
    pub reporter_id: Uuid,
    pub target: ReportTarget,
    pub report_type: ReportType,
    #[validate(length(min = 1, max = 500))]
    pub reason: String,
    #[validate(length(max = 5000))]
    pub description: Option<String>,
    pub priority: Option<Priority>,
}

/// Partial moderator update. `assigned_to: Some(None)` clears the assignment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportPatch {
    pub status: Option<ReportStatus>,
    pub priority: Option<Priority>,
    pub assigned_to: Option<Option<Uuid>>,
    pub resolution: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportFilter {
    pub status: Option<ReportStatus>,
    pub report_type: Option<ReportType>,
    pub priority: Option<Priority>,
    pub reporter_id: Option<Uuid>,
    pub reported_user_id: Option<Uuid>,
    pub assigned_to: Option<Uuid>,
    pub content_id: Option<String>,
}

impl ReportFilter {
    pub fn matches(&self, report: &Report) -> bool {
        self.status.map_or(true, |s| report.status == s)
            && self.report_type.map_or(true, |t| report.report_type == t)
            && self.priority.map_or(true, |p| report.priority == p)
            && self.reporter_id.map_or(true, |id| report.reporter_id == id)
            && self
                .reported_user_id
                .map_or(true, |id| report.reported_user_id == Some(id))
            && self.assigned_to.map_or(true, |id| report.assigned_to == Some(id))
            && self
                .content_id
                .as_ref()
                .map_or(true, |id| report.content_id.as_ref() == Some(id))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportStats {
    pub total: i64,
    pub by_status: BTreeMap<ReportStatus, i64>,
    pub by_type: BTreeMap<ReportType, i64>,
    pub by_priority: BTreeMap<i16, i64>,
}

impl ReportStats {
    pub fn record(&mut self, status: ReportStatus, report_type: ReportType, priority: Priority, count: i64) {
        self.total += count;
        *self.by_status.entry(status).or_default() += count;
        *self.by_type.entry(report_type).or_default() += count;
        *self.by_priority.entry(priority.value()).or_default() += count;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn content_report(report_type: ReportType, priority: Option<Priority>) -> Report {
        Report::new(NewReport {
            reporter_id: Uuid::new_v4(),
            target: ReportTarget::Content {
                content_id: "c1".to_string(),
                content_type: ContentType::Post,
                owner_id: Some(Uuid::new_v4()),
            },
            report_type,
            reason: "offensive".to_string(),
            description: None,
            priority,
        })
    }

    #[test]
    fn test_default_priority_table() {
        assert_eq!(ReportType::Threat.default_priority(), Priority::CRITICAL);
        assert_eq!(ReportType::HateSpeech.default_priority(), Priority::CRITICAL);
        assert_eq!(ReportType::CopyrightViolation.default_priority(), Priority::HIGH);
        assert_eq!(ReportType::Harassment.default_priority(), Priority::HIGH);
        assert_eq!(ReportType::InappropriateContent.default_priority(), Priority::MEDIUM);
        assert_eq!(ReportType::Spam.default_priority(), Priority::MEDIUM);
        assert_eq!(ReportType::Misleading.default_priority(), Priority::MEDIUM);
        assert_eq!(ReportType::Other.default_priority(), Priority::LOW);
    }

    #[test]
    fn test_explicit_priority_wins() {
        let report = content_report(ReportType::Threat, Some(Priority::LOW));
        assert_eq!(report.priority, Priority::LOW);
        let report = content_report(ReportType::Harassment, None);
        assert_eq!(report.priority, Priority::HIGH);
    }

    #[test]
    fn test_terminal_reports_never_reopen() {
        let moderator = Uuid::new_v4();
        let mut report = content_report(ReportType::Spam, None);
        report.close(ReportStatus::Resolved, "removed".into(), moderator, Utc::now()).unwrap();

        assert!(report.assign(moderator, Utc::now()).is_err());
        let patch = ReportPatch {
            status: Some(ReportStatus::Pending),
            ..Default::default()
        };
        assert!(report.apply_patch(patch, moderator, Utc::now()).is_err());
        assert_eq!(report.status, ReportStatus::Resolved);
    }

    #[test]
    fn test_closing_patch_may_set_resolution() {
        let moderator = Uuid::new_v4();
        let mut report = content_report(ReportType::Spam, None);
        let patch = ReportPatch {
            status: Some(ReportStatus::Dismissed),
            resolution: Some("not spam".into()),
            ..Default::default()
        };
        report.apply_patch(patch, moderator, Utc::now()).unwrap();
        assert_eq!(report.status, ReportStatus::Dismissed);
        assert_eq!(report.resolution.as_deref(), Some("not spam"));

        let patch = ReportPatch {
            resolution: Some("rewritten".into()),
            ..Default::default()
        };
        assert!(matches!(
            report.apply_patch(patch, moderator, Utc::now()),
            Err(ModerationError::Conflict(_))
        ));
        assert_eq!(report.resolution.as_deref(), Some("not spam"));
    }

    #[test]
    fn test_leaving_pending_stamps_review() {
        let moderator = Uuid::new_v4();
        let mut report = content_report(ReportType::Spam, None);
        report.assign(moderator, Utc::now()).unwrap();
        assert_eq!(report.status, ReportStatus::UnderReview);
        assert_eq!(report.assigned_to, Some(moderator));
        assert_eq!(report.reviewed_by, Some(moderator));
        assert!(report.assigned_at.is_some());
    }

    #[test]
    fn test_target_round_trip() {
        let report = content_report(ReportType::Spam, None);
        match report.target() {
            Some(ReportTarget::Content { content_id, owner_id, .. }) => {
                assert_eq!(content_id, "c1");
                assert_eq!(owner_id, report.reported_user_id);
            }
            other => panic!("unexpected target {:?}", other),
        }
    }

    #[test]
    fn test_empty_content_id_rejected() {
        let target = ReportTarget::Content {
            content_id: "  ".into(),
            content_type: ContentType::Post,
            owner_id: None,
        };
        assert!(target.validate().is_err());
    }
}

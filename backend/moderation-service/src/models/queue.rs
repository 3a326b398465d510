use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::BTreeMap;
use uuid::Uuid;
use validator::Validate;

use super::common::{ContentType, Priority};

/// Remedial decision recorded when a queue item is processed.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "moderation_action", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModerationAction {
    None,
    Warning,
    ContentRemoval,
    UserSuspension,
    UserBan,
    ContentQuarantine,
}

impl ModerationAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModerationAction::None => "NONE",
            ModerationAction::Warning => "WARNING",
            ModerationAction::ContentRemoval => "CONTENT_REMOVAL",
            ModerationAction::UserSuspension => "USER_SUSPENSION",
            ModerationAction::UserBan => "USER_BAN",
            ModerationAction::ContentQuarantine => "CONTENT_QUARANTINE",
        }
    }
}

/// Unit of review work for one content id. At most one unprocessed item
/// exists per content id.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct QueueItem {
    pub id: Uuid,
    pub content_id: String,
    pub content_type: ContentType,
    pub priority: Priority,
    pub reason: Option<String>,
    pub flags: Vec<Uuid>,
    pub assigned_to: Option<Uuid>,
    pub is_processed: bool,
    pub processed_at: Option<DateTime<Utc>>,
    pub action: ModerationAction,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl QueueItem {
    pub fn new(request: EnqueueRequest) -> Self {
        Self {
            id: Uuid::new_v4(),
            content_id: request.content_id,
            content_type: request.content_type,
            priority: request.priority,
            reason: request.reason,
            flags: dedup_flags(request.flags),
            assigned_to: None,
            is_processed: false,
            processed_at: None,
            action: ModerationAction::None,
            notes: None,
            created_at: Utc::now(),
        }
    }

    /// Folds a repeated enqueue of the same content into this item.
    ///
    /// Priority only ever rises; flags are unioned and a new reason is appended.
    /// Returns the previous priority when it was raised.
    pub fn absorb(&mut self, request: EnqueueRequest) -> Option<Priority> {
        for flag in request.flags {
            if !self.flags.contains(&flag) {
                self.flags.push(flag);
            }
        }
        self.reason = merge_reason(self.reason.take(), request.reason);

        if request.priority > self.priority {
            let previous = self.priority;
            self.priority = request.priority;
            Some(previous)
        } else {
            None
        }
    }

    pub fn is_claimable(&self) -> bool {
        !self.is_processed && self.assigned_to.is_none()
    }
}

fn dedup_flags(flags: Vec<Uuid>) -> Vec<Uuid> {
    let mut unique = Vec::with_capacity(flags.len());
    for flag in flags {
        if !unique.contains(&flag) {
            unique.push(flag);
        }
    }
    unique
}

pub(crate) fn merge_reason(existing: Option<String>, incoming: Option<String>) -> Option<String> {
    match (existing, incoming) {
        (Some(existing), Some(incoming)) => {
            if incoming.is_empty() || existing.split("; ").any(|part| part == incoming) {
                Some(existing)
            } else {
                Some(format!("{}; {}", existing, incoming))
            }
        }
        (existing, None) => existing,
        (None, incoming) => incoming,
    }
}

/// Caller-facing queue addition; priority is computed when absent.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewQueueItem {
    #[validate(length(min = 1, max = 255))]
    pub content_id: String,
    pub content_type: ContentType,
    pub priority: Option<Priority>,
    #[validate(length(max = 1000))]
    pub reason: Option<String>,
    #[serde(default)]
    pub flags: Vec<Uuid>,
}

/// Fully resolved enqueue: priority is already computed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnqueueRequest {
    pub content_id: String,
    pub content_type: ContentType,
    pub priority: Priority,
    pub reason: Option<String>,
    pub flags: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EnqueueOutcome {
    Created { item: QueueItem },
    Escalated { item: QueueItem, previous: Priority },
    Merged { item: QueueItem },
}

impl EnqueueOutcome {
    pub fn item(&self) -> &QueueItem {
        match self {
            EnqueueOutcome::Created { item }
            | EnqueueOutcome::Escalated { item, .. }
            | EnqueueOutcome::Merged { item } => item,
        }
    }

    pub fn into_item(self) -> QueueItem {
        match self {
            EnqueueOutcome::Created { item }
            | EnqueueOutcome::Escalated { item, .. }
            | EnqueueOutcome::Merged { item } => item,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            EnqueueOutcome::Created { .. } => "created",
            EnqueueOutcome::Escalated { .. } => "escalated",
            EnqueueOutcome::Merged { .. } => "merged",
        }
    }
}

/// How a claim treats an item that already has an assignee.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimMode {
    /// Only unassigned, unprocessed items are taken.
    IfUnclaimed,
    /// Manual reassignment: any unprocessed item is taken, last writer wins.
    Override,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessCommand {
    pub action: ModerationAction,
    pub moderator_id: Uuid,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueFilter {
    pub is_processed: Option<bool>,
    pub assigned_to: Option<Uuid>,
    pub unassigned_only: bool,
    pub content_type: Option<ContentType>,
    pub priority: Option<Priority>,
    pub min_priority: Option<Priority>,
    pub action: Option<ModerationAction>,
}

impl QueueFilter {
    pub fn pending() -> Self {
        Self {
            is_processed: Some(false),
            ..Default::default()
        }
    }

    pub fn matches(&self, item: &QueueItem) -> bool {
        self.is_processed.map_or(true, |p| item.is_processed == p)
            && self.assigned_to.map_or(true, |id| item.assigned_to == Some(id))
            && (!self.unassigned_only || item.assigned_to.is_none())
            && self
                .content_type
                .as_ref()
                .map_or(true, |t| &item.content_type == t)
            && self.priority.map_or(true, |p| item.priority == p)
            && self.min_priority.map_or(true, |p| item.priority >= p)
            && self.action.map_or(true, |a| item.action == a)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueStats {
    pub total: i64,
    pub pending: i64,
    pub processed: i64,
    pub assigned: i64,
    pub unassigned: i64,
    pub by_priority: BTreeMap<i16, i64>,
    pub by_action: BTreeMap<ModerationAction, i64>,
}

impl QueueStats {
    pub fn record(&mut self, item: &QueueItem) {
        self.total += 1;
        if item.is_processed {
            self.processed += 1;
            *self.by_action.entry(item.action).or_default() += 1;
        } else {
            self.pending += 1;
            *self.by_priority.entry(item.priority.value()).or_default() += 1;
            if item.assigned_to.is_some() {
                self.assigned += 1;
            } else {
                self.unassigned += 1;
            }
        }
    }
}

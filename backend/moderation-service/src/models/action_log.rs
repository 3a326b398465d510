//! Append-only audit trail of processed moderation actions.
//!
//! Rows are never updated or deleted; they outlive the queue items they describe.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::common::{ContentType, Priority};
use super::queue::{ModerationAction, QueueItem};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionMetadata {
    QueueItemProcessed {
        queue_item_id: Uuid,
        original_priority: Priority,
        flags: Vec<Uuid>,
    },
}

impl ActionMetadata {
    pub fn queue_item_id(&self) -> Option<Uuid> {
        match self {
            ActionMetadata::QueueItemProcessed { queue_item_id, .. } => Some(*queue_item_id),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModerationActionLog {
    pub id: Uuid,
    pub moderator_id: Uuid,
    pub action: ModerationAction,
    pub target_id: String,
    pub target_type: ContentType,
    pub reason: Option<String>,
    pub metadata: ActionMetadata,
    pub created_at: DateTime<Utc>,
}

impl ModerationActionLog {
    /// Audit row for a queue item that was just processed.
    pub fn for_processed_item(item: &QueueItem, moderator_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            moderator_id,
            action: item.action,
            target_id: item.content_id.clone(),
            target_type: item.content_type.clone(),
            reason: item.notes.clone(),
            metadata: ActionMetadata::QueueItemProcessed {
                queue_item_id: item.id,
                original_priority: item.priority,
                flags: item.flags.clone(),
            },
            created_at: now,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionLogFilter {
    pub moderator_id: Option<Uuid>,
    pub action: Option<ModerationAction>,
    pub target_id: Option<String>,
}

impl ActionLogFilter {
    pub fn matches(&self, log: &ModerationActionLog) -> bool {
        self.moderator_id.map_or(true, |id| log.moderator_id == id)
            && self.action.map_or(true, |a| log.action == a)
            && self.target_id.as_ref().map_or(true, |id| &log.target_id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::queue::EnqueueRequest;

    #[test]
    fn test_log_mirrors_processed_item() {
        let flag = Uuid::new_v4();
        let mut item = QueueItem::new(EnqueueRequest {
            content_id: "c1".into(),
            content_type: ContentType::Post,
            priority: Priority::CRITICAL,
            reason: None,
            flags: vec![flag],
        });
        item.action = ModerationAction::ContentRemoval;
        item.notes = Some("graphic".into());

        let moderator = Uuid::new_v4();
        let log = ModerationActionLog::for_processed_item(&item, moderator, Utc::now());
        assert_eq!(log.target_id, "c1");
        assert_eq!(log.reason.as_deref(), Some("graphic"));
        assert_eq!(log.metadata.queue_item_id(), Some(item.id));

        let json = serde_json::to_value(&log.metadata).unwrap();
        assert_eq!(json["kind"], "queue_item_processed");
        assert_eq!(json["original_priority"], 4);
    }
}

//! Domain events emitted after moderation decisions commit.
//!
//! The core only hands events to an [`EventDispatcher`]; transport, retries and
//! delivery guarantees belong to the dispatcher. A failed dispatch is logged and
//! never undoes or fails the decision that produced it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{ContentType, ModerationAction, Priority};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    QueueItemProcessed,
    ReportResolved,
    ReportDismissed,
    AppealApproved,
    AppealRejected,
}

impl EventType {
    /// Routing key in `<aggregate>.<action>` form.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::QueueItemProcessed => "moderation.queue_item.processed",
            EventType::ReportResolved => "moderation.report.resolved",
            EventType::ReportDismissed => "moderation.report.dismissed",
            EventType::AppealApproved => "moderation.appeal.approved",
            EventType::AppealRejected => "moderation.appeal.rejected",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    QueueItemProcessed {
        queue_item_id: Uuid,
        content_id: String,
        content_type: ContentType,
        action: ModerationAction,
        priority: Priority,
        action_log_id: Uuid,
    },
    ReportResolved {
        report_id: Uuid,
        reported_user_id: Option<Uuid>,
        content_id: Option<String>,
        resolution: Option<String>,
    },
    ReportDismissed {
        report_id: Uuid,
        reason: Option<String>,
    },
    AppealApproved {
        appeal_id: Uuid,
        report_id: Uuid,
        appellant_id: Uuid,
        review_notes: Option<String>,
    },
    AppealRejected {
        appeal_id: Uuid,
        report_id: Uuid,
        appellant_id: Uuid,
        review_notes: Option<String>,
    },
}

impl EventPayload {
    pub fn event_type(&self) -> EventType {
        match self {
            EventPayload::QueueItemProcessed { .. } => EventType::QueueItemProcessed,
            EventPayload::ReportResolved { .. } => EventType::ReportResolved,
            EventPayload::ReportDismissed { .. } => EventType::ReportDismissed,
            EventPayload::AppealApproved { .. } => EventType::AppealApproved,
            EventPayload::AppealRejected { .. } => EventType::AppealRejected,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainEvent {
    pub event_id: Uuid,
    pub event_type: EventType,
    /// Content id, report id or appeal id, depending on the event.
    pub target_id: String,
    pub actor_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub payload: EventPayload,
}

impl DomainEvent {
    /// The event type always follows the payload variant.
    pub fn new(target_id: impl Into<String>, actor_id: Uuid, payload: EventPayload) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_type: payload.event_type(),
            target_id: target_id.into(),
            actor_id,
            timestamp: Utc::now(),
            payload,
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventDispatcher: Send + Sync {
    async fn dispatch(&self, event: &DomainEvent) -> Result<()>;
}

/// Writes every event to the log as a structured JSON record.
#[derive(Debug, Clone, Default)]
pub struct TracingDispatcher;

#[async_trait]
impl EventDispatcher for TracingDispatcher {
    async fn dispatch(&self, event: &DomainEvent) -> Result<()> {
        let body = serde_json::to_string(event)?;
        tracing::info!(
            target: "moderation_events",
            event_id = %event.event_id,
            event_type = event.event_type.as_str(),
            target_id = %event.target_id,
            actor_id = %event.actor_id,
            event = %body,
            "Domain event"
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct NoopDispatcher;

#[async_trait]
impl EventDispatcher for NoopDispatcher {
    async fn dispatch(&self, _event: &DomainEvent) -> Result<()> {
        Ok(())
    }
}

/// Hands `event` to the dispatcher, logging instead of propagating a failure.
pub(crate) async fn dispatch_best_effort(dispatcher: &dyn EventDispatcher, event: DomainEvent) {
    if let Err(e) = dispatcher.dispatch(&event).await {
        tracing::warn!(
            event_id = %event.event_id,
            event_type = event.event_type.as_str(),
            target_id = %event.target_id,
            error = %e,
            "Failed to dispatch domain event"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ModerationError;

    fn resolved_event() -> DomainEvent {
        let report_id = Uuid::new_v4();
        DomainEvent::new(
            report_id.to_string(),
            Uuid::new_v4(),
            EventPayload::ReportResolved {
                report_id,
                reported_user_id: None,
                content_id: Some("c1".into()),
                resolution: Some("removed".into()),
            },
        )
    }

    #[test]
    fn test_event_type_follows_payload() {
        let event = resolved_event();
        assert_eq!(event.event_type, EventType::ReportResolved);
        assert_eq!(event.event_type.as_str(), "moderation.report.resolved");
    }

    #[test]
    fn test_payload_serializes_with_type_tag() {
        let json = serde_json::to_value(resolved_event()).unwrap();
        assert_eq!(json["event_type"], "report_resolved");
        assert_eq!(json["payload"]["type"], "report_resolved");
        assert_eq!(json["payload"]["content_id"], "c1");
    }

    #[tokio::test]
    async fn test_builtin_dispatchers_accept_events() {
        let event = resolved_event();
        TracingDispatcher.dispatch(&event).await.unwrap();
        NoopDispatcher.dispatch(&event).await.unwrap();
    }

    #[tokio::test]
    async fn test_best_effort_swallows_failures() {
        let mut dispatcher = MockEventDispatcher::new();
        dispatcher
            .expect_dispatch()
            .times(1)
            .returning(|_| Err(ModerationError::Internal("broker down".into())));

        dispatch_best_effort(&dispatcher, resolved_event()).await;
    }
}

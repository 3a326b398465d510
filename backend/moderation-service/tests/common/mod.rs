#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use moderation_service::events::{DomainEvent, EventDispatcher, EventType};
use moderation_service::models::*;
use moderation_service::{MemoryStore, ModerationCore, Result};

/// Keeps every dispatched event for later assertions.
#[derive(Default)]
pub struct RecordingDispatcher {
    events: Mutex<Vec<DomainEvent>>,
}

impl RecordingDispatcher {
    pub async fn events(&self) -> Vec<DomainEvent> {
        self.events.lock().await.clone()
    }

    pub async fn types(&self) -> Vec<EventType> {
        self.events
            .lock()
            .await
            .iter()
            .map(|event| event.event_type)
            .collect()
    }
}

#[async_trait]
impl EventDispatcher for RecordingDispatcher {
    async fn dispatch(&self, event: &DomainEvent) -> Result<()> {
        self.events.lock().await.push(event.clone());
        Ok(())
    }
}

pub fn recording_core() -> (ModerationCore, Arc<RecordingDispatcher>) {
    let dispatcher = Arc::new(RecordingDispatcher::default());
    let core = ModerationCore::new(Arc::new(MemoryStore::new()), dispatcher.clone(), None);
    (core, dispatcher)
}

pub fn content_report(
    content_id: &str,
    owner_id: Option<Uuid>,
    report_type: ReportType,
) -> NewReport {
    NewReport {
        reporter_id: Uuid::new_v4(),
        target: ReportTarget::Content {
            content_id: content_id.to_string(),
            content_type: ContentType::Post,
            owner_id,
        },
        report_type,
        reason: format!("reported {}", content_id),
        description: None,
        priority: None,
    }
}

pub fn queue_entry(content_id: &str, content_type: ContentType, priority: Option<Priority>) -> NewQueueItem {
    NewQueueItem {
        content_id: content_id.to_string(),
        content_type,
        priority,
        reason: None,
        flags: Vec::new(),
    }
}

pub fn flag_for(content_id: &str, confidence: f64) -> NewContentFlag {
    NewContentFlag {
        content_id: content_id.to_string(),
        content_type: ContentType::Post,
        flag_type: FlagType::Violence,
        confidence,
    }
}

pub fn command(action: ModerationAction, moderator_id: Uuid) -> ProcessCommand {
    ProcessCommand {
        action,
        moderator_id,
        notes: None,
    }
}

//! In-process store. One `RwLock` guards all state, so a write guard is a transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    ActionLogStore, AppealStore, ContentFlagStore, QueueStore, ReportStore, StoreHealth,
};
use crate::error::{ModerationError, Result};
use crate::models::*;

struct Slot {
    seq: u64,
    item: QueueItem,
}

/// Queue rows keyed by item id, plus an index from content id to the slot
/// holding its unprocessed item. Re-enqueueing content mutates that slot.
#[derive(Default)]
struct QueueArena {
    slots: HashMap<Uuid, Slot>,
    active: HashMap<String, Uuid>,
    next_seq: u64,
}

impl QueueArena {
    fn active_slot_mut(&mut self, content_id: &str) -> Option<&mut Slot> {
        let id = self.active.get(content_id)?;
        self.slots.get_mut(id)
    }

    fn insert(&mut self, item: QueueItem) {
        self.next_seq += 1;
        if !item.is_processed {
            self.active.insert(item.content_id.clone(), item.id);
        }
        self.slots.insert(
            item.id,
            Slot {
                seq: self.next_seq,
                item,
            },
        );
    }

    fn remove(&mut self, id: Uuid) -> Option<QueueItem> {
        let slot = self.slots.remove(&id)?;
        if self.active.get(&slot.item.content_id) == Some(&id) {
            self.active.remove(&slot.item.content_id);
        }
        Some(slot.item)
    }

    fn ordered<'a>(&'a self, filter: &'a QueueFilter) -> Vec<&'a Slot> {
        let mut slots: Vec<&Slot> = self
            .slots
            .values()
            .filter(|slot| filter.matches(&slot.item))
            .collect();
        slots.sort_by_key(|slot| (Reverse(slot.item.priority), slot.item.created_at, slot.seq));
        slots
    }
}

#[derive(Default)]
struct State {
    reports: HashMap<Uuid, Report>,
    flags: HashMap<Uuid, ContentFlag>,
    queue: QueueArena,
    action_logs: Vec<ModerationActionLog>,
    appeals: HashMap<Uuid, Appeal>,
    appeal_by_report: HashMap<Uuid, Uuid>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn newest_first<T>(mut rows: Vec<T>, created_at: impl Fn(&T) -> DateTime<Utc>) -> Vec<T> {
    rows.sort_by_key(|row| Reverse(created_at(row)));
    rows
}

#[async_trait]
impl ReportStore for MemoryStore {
    async fn insert_report(&self, report: Report) -> Result<Report> {
        let mut s = self.state.write().await;
        if s.reports.contains_key(&report.id) {
            return Err(ModerationError::Conflict(format!(
                "report {} already exists",
                report.id
            )));
        }
        s.reports.insert(report.id, report.clone());
        Ok(report)
    }

    async fn get_report(&self, id: Uuid) -> Result<Option<Report>> {
        let s = self.state.read().await;
        Ok(s.reports.get(&id).cloned())
    }

    async fn update_report(&self, report: &Report, expected: ReportStatus) -> Result<Report> {
        let mut s = self.state.write().await;
        let stored = s
            .reports
            .get_mut(&report.id)
            .ok_or_else(|| ModerationError::not_found("Report", report.id))?;
        if stored.status != expected {
            return Err(ModerationError::Conflict(format!(
                "report {} changed concurrently (now {})",
                report.id,
                stored.status.as_str()
            )));
        }
        *stored = report.clone();
        Ok(report.clone())
    }

    async fn delete_report(&self, id: Uuid) -> Result<bool> {
        let mut s = self.state.write().await;
        let removed = s.reports.remove(&id).is_some();
        if let Some(appeal_id) = s.appeal_by_report.remove(&id) {
            s.appeals.remove(&appeal_id);
        }
        Ok(removed)
    }

    async fn list_reports(&self, filter: &ReportFilter, page: Pagination) -> Result<Vec<Report>> {
        let s = self.state.read().await;
        let rows = s
            .reports
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        Ok(page.apply(newest_first(rows, |r: &Report| r.created_at)))
    }

    async fn count_reports(&self, filter: &ReportFilter) -> Result<i64> {
        let s = self.state.read().await;
        Ok(s.reports.values().filter(|r| filter.matches(r)).count() as i64)
    }

    async fn report_stats(&self, range: DateRange) -> Result<ReportStats> {
        let s = self.state.read().await;
        let mut stats = ReportStats::default();
        for report in s.reports.values().filter(|r| range.contains(r.created_at)) {
            stats.record(report.status, report.report_type, report.priority, 1);
        }
        Ok(stats)
    }
}

#[async_trait]
impl ContentFlagStore for MemoryStore {
    async fn insert_flag(&self, flag: ContentFlag) -> Result<ContentFlag> {
        let mut s = self.state.write().await;
        s.flags.insert(flag.id, flag.clone());
        Ok(flag)
    }

    async fn get_flag(&self, id: Uuid) -> Result<Option<ContentFlag>> {
        let s = self.state.read().await;
        Ok(s.flags.get(&id).cloned())
    }

    async fn get_flags_by_ids(&self, ids: &[Uuid]) -> Result<Vec<ContentFlag>> {
        let s = self.state.read().await;
        Ok(ids.iter().filter_map(|id| s.flags.get(id).cloned()).collect())
    }

    async fn list_flags(&self, filter: &FlagFilter, page: Pagination) -> Result<Vec<ContentFlag>> {
        let s = self.state.read().await;
        let rows = s
            .flags
            .values()
            .filter(|f| filter.matches(f))
            .cloned()
            .collect();
        Ok(page.apply(newest_first(rows, |f: &ContentFlag| f.created_at)))
    }

    async fn resolve_flags(
        &self,
        ids: &[Uuid],
        resolver_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<ContentFlag>> {
        let mut s = self.state.write().await;
        let mut touched = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(flag) = s.flags.get_mut(id) {
                flag.resolve(resolver_id, now);
                touched.push(flag.clone());
            }
        }
        Ok(touched)
    }

    async fn delete_flag(&self, id: Uuid) -> Result<bool> {
        let mut s = self.state.write().await;
        Ok(s.flags.remove(&id).is_some())
    }

    async fn high_confidence_flags(&self, threshold: f64, limit: i64) -> Result<Vec<ContentFlag>> {
        let s = self.state.read().await;
        let mut rows: Vec<ContentFlag> = s
            .flags
            .values()
            .filter(|f| !f.is_resolved && should_flag_content(f.confidence, threshold))
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            b.confidence
                .total_cmp(&a.confidence)
                .then(a.created_at.cmp(&b.created_at))
        });
        rows.truncate(limit.max(0) as usize);
        Ok(rows)
    }

    async fn flag_stats(&self, range: DateRange) -> Result<FlagStats> {
        let s = self.state.read().await;
        let mut stats = FlagStats::default();
        let mut confidence_sum = 0.0;
        for flag in s.flags.values().filter(|f| range.contains(f.created_at)) {
            stats.total += 1;
            if !flag.is_resolved {
                stats.unresolved += 1;
            }
            *stats.by_type.entry(flag.flag_type).or_default() += 1;
            confidence_sum += flag.confidence;
        }
        stats.average_confidence = (stats.total > 0).then(|| confidence_sum / stats.total as f64);
        Ok(stats)
    }
}

#[async_trait]
impl QueueStore for MemoryStore {
    async fn enqueue(&self, request: EnqueueRequest) -> Result<EnqueueOutcome> {
        let mut s = self.state.write().await;
        if let Some(slot) = s.queue.active_slot_mut(&request.content_id) {
            let outcome = match slot.item.absorb(request) {
                Some(previous) => EnqueueOutcome::Escalated {
                    item: slot.item.clone(),
                    previous,
                },
                None => EnqueueOutcome::Merged {
                    item: slot.item.clone(),
                },
            };
            return Ok(outcome);
        }

        let item = QueueItem::new(request);
        s.queue.insert(item.clone());
        Ok(EnqueueOutcome::Created { item })
    }

    async fn get_queue_item(&self, id: Uuid) -> Result<Option<QueueItem>> {
        let s = self.state.read().await;
        Ok(s.queue.slots.get(&id).map(|slot| slot.item.clone()))
    }

    async fn get_active_item(&self, content_id: &str) -> Result<Option<QueueItem>> {
        let s = self.state.read().await;
        Ok(s.queue
            .active
            .get(content_id)
            .and_then(|id| s.queue.slots.get(id))
            .map(|slot| slot.item.clone()))
    }

    async fn list_queue_items(&self, filter: &QueueFilter, page: Pagination) -> Result<Vec<QueueItem>> {
        let s = self.state.read().await;
        Ok(page.apply(
            s.queue
                .ordered(filter)
                .into_iter()
                .map(|slot| slot.item.clone()),
        ))
    }

    async fn claim_queue_items(
        &self,
        ids: &[Uuid],
        moderator_id: Uuid,
        mode: ClaimMode,
    ) -> Result<Vec<QueueItem>> {
        let mut s = self.state.write().await;
        let mut claimed = Vec::new();
        for id in ids {
            let Some(slot) = s.queue.slots.get_mut(id) else {
                continue;
            };
            let eligible = match mode {
                ClaimMode::IfUnclaimed => slot.item.is_claimable(),
                ClaimMode::Override => !slot.item.is_processed,
            };
            if eligible {
                slot.item.assigned_to = Some(moderator_id);
                claimed.push(slot.item.clone());
            }
        }
        Ok(claimed)
    }

    async fn process_queue_item(
        &self,
        id: Uuid,
        command: ProcessCommand,
        now: DateTime<Utc>,
    ) -> Result<(QueueItem, ModerationActionLog)> {
        let mut s = self.state.write().await;
        let slot = s
            .queue
            .slots
            .get_mut(&id)
            .ok_or_else(|| ModerationError::not_found("QueueItem", id))?;
        if slot.item.is_processed {
            return Err(ModerationError::transition(
                "QueueItem",
                "PROCESSED",
                "PROCESSED",
            ));
        }

        slot.item.is_processed = true;
        slot.item.processed_at = Some(now);
        slot.item.action = command.action;
        slot.item.notes = command.notes;
        let item = slot.item.clone();
        let log = ModerationActionLog::for_processed_item(&item, command.moderator_id, now);

        s.queue.active.remove(&item.content_id);
        s.action_logs.push(log.clone());
        Ok((item, log))
    }

    async fn delete_queue_item(&self, id: Uuid) -> Result<bool> {
        let mut s = self.state.write().await;
        Ok(s.queue.remove(id).is_some())
    }

    async fn delete_processed_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut s = self.state.write().await;
        let expired: Vec<Uuid> = s
            .queue
            .slots
            .values()
            .filter(|slot| {
                slot.item.is_processed
                    && slot.item.processed_at.map_or(false, |at| at < cutoff)
            })
            .map(|slot| slot.item.id)
            .collect();
        for id in &expired {
            s.queue.remove(*id);
        }
        Ok(expired.len() as u64)
    }

    async fn queue_stats(&self, range: DateRange) -> Result<QueueStats> {
        let s = self.state.read().await;
        let mut stats = QueueStats::default();
        for slot in s.queue.slots.values() {
            if range.contains(slot.item.created_at) {
                stats.record(&slot.item);
            }
        }
        Ok(stats)
    }
}

#[async_trait]
impl ActionLogStore for MemoryStore {
    async fn list_action_logs(
        &self,
        filter: &ActionLogFilter,
        page: Pagination,
    ) -> Result<Vec<ModerationActionLog>> {
        let s = self.state.read().await;
        // Appended in commit order, so reversing yields newest first.
        Ok(page.apply(
            s.action_logs
                .iter()
                .rev()
                .filter(|log| filter.matches(log))
                .cloned(),
        ))
    }
}

#[async_trait]
impl AppealStore for MemoryStore {
    async fn insert_appeal(&self, appeal: Appeal) -> Result<Appeal> {
        let mut s = self.state.write().await;
        if let Some(existing) = s.appeal_by_report.get(&appeal.report_id) {
            return Err(ModerationError::Conflict(format!(
                "report {} already has appeal {}",
                appeal.report_id, existing
            )));
        }
        s.appeal_by_report.insert(appeal.report_id, appeal.id);
        s.appeals.insert(appeal.id, appeal.clone());
        Ok(appeal)
    }

    async fn get_appeal(&self, id: Uuid) -> Result<Option<Appeal>> {
        let s = self.state.read().await;
        Ok(s.appeals.get(&id).cloned())
    }

    async fn get_appeal_by_report(&self, report_id: Uuid) -> Result<Option<Appeal>> {
        let s = self.state.read().await;
        Ok(s.appeal_by_report
            .get(&report_id)
            .and_then(|id| s.appeals.get(id))
            .cloned())
    }

    async fn update_appeal(&self, appeal: &Appeal, expected: AppealStatus) -> Result<Appeal> {
        let mut s = self.state.write().await;
        let stored = s
            .appeals
            .get_mut(&appeal.id)
            .ok_or_else(|| ModerationError::not_found("Appeal", appeal.id))?;
        if stored.status != expected {
            return Err(ModerationError::transition(
                "Appeal",
                stored.status.as_str(),
                appeal.status.as_str(),
            ));
        }
        *stored = appeal.clone();
        Ok(appeal.clone())
    }

    async fn delete_appeal(&self, id: Uuid) -> Result<bool> {
        let mut s = self.state.write().await;
        match s.appeals.remove(&id) {
            Some(appeal) => {
                s.appeal_by_report.remove(&appeal.report_id);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_appeals(
        &self,
        filter: &AppealFilter,
        page: Pagination,
        oldest_first: bool,
    ) -> Result<Vec<Appeal>> {
        let s = self.state.read().await;
        let mut rows = newest_first(
            s.appeals
                .values()
                .filter(|a| filter.matches(a))
                .cloned()
                .collect(),
            |a: &Appeal| a.created_at,
        );
        if oldest_first {
            rows.reverse();
        }
        Ok(page.apply(rows))
    }

    async fn appeal_stats(&self, range: DateRange) -> Result<AppealStats> {
        let s = self.state.read().await;
        let mut stats = AppealStats::default();
        for appeal in s.appeals.values().filter(|a| range.contains(a.created_at)) {
            stats.record(appeal.status, 1);
        }
        Ok(stats)
    }
}

#[async_trait]
impl StoreHealth for MemoryStore {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

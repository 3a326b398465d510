use prometheus::{IntCounterVec, Opts, Registry};
use tracing::warn;

use crate::models::{AppealStatus, EnqueueOutcome, ModerationAction, ReportType};

/// Best-effort moderation counters. Recording never fails a caller.
#[derive(Clone)]
pub struct ModerationMetrics {
    reports_created: IntCounterVec,
    queue_enqueued: IntCounterVec,
    queue_processed: IntCounterVec,
    appeals_reviewed: IntCounterVec,
}

impl ModerationMetrics {
    /// Builds the counters and registers them with `registry`.
    ///
    /// A registration failure (for example a duplicate name) is logged and the
    /// counters still work, they just are not exported.
    pub fn new(registry: &Registry, service: &str) -> prometheus::Result<Self> {
        let counter = |name: &str, help: &str, label: &str| {
            IntCounterVec::new(
                Opts::new(name, help).const_label("service", service.to_string()),
                &[label],
            )
        };

        let reports_created = counter(
            "moderation_reports_created_total",
            "Reports accepted by intake",
            "type",
        )?;
        let queue_enqueued = counter(
            "moderation_queue_enqueued_total",
            "Queue additions by outcome (created, escalated, merged)",
            "outcome",
        )?;
        let queue_processed = counter(
            "moderation_queue_processed_total",
            "Queue items processed by action",
            "action",
        )?;
        let appeals_reviewed = counter(
            "moderation_appeals_reviewed_total",
            "Appeal decisions",
            "decision",
        )?;

        for metric in [
            Box::new(reports_created.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(queue_enqueued.clone()),
            Box::new(queue_processed.clone()),
            Box::new(appeals_reviewed.clone()),
        ] {
            if let Err(e) = registry.register(metric) {
                warn!("Failed to register moderation metric: {}", e);
            }
        }

        Ok(Self {
            reports_created,
            queue_enqueued,
            queue_processed,
            appeals_reviewed,
        })
    }

    pub fn report_created(&self, report_type: ReportType) {
        self.reports_created
            .with_label_values(&[report_type.as_str()])
            .inc();
    }

    pub fn enqueued(&self, outcome: &EnqueueOutcome) {
        self.queue_enqueued
            .with_label_values(&[outcome.label()])
            .inc();
    }

    pub fn processed(&self, action: ModerationAction) {
        self.queue_processed
            .with_label_values(&[action.as_str()])
            .inc();
    }

    pub fn appeal_reviewed(&self, decision: AppealStatus) {
        self.appeals_reviewed
            .with_label_values(&[decision.as_str()])
            .inc();
    }
}

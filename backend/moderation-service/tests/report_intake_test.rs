mod common;

use chrono::{Duration, Utc};
use tokio_test::{assert_err, assert_ok};
use uuid::Uuid;

use common::*;
use moderation_service::events::EventType;
use moderation_service::models::*;
use moderation_service::{ModerationCore, ModerationError};

#[tokio::test]
async fn test_harassment_report_defaults_to_high_priority() {
    let core = ModerationCore::in_memory();
    let owner = Uuid::new_v4();

    let report = core
        .reports
        .create_report(content_report("c1", Some(owner), ReportType::Harassment))
        .await
        .unwrap();

    assert_eq!(report.priority, Priority::HIGH);
    assert_eq!(report.status, ReportStatus::Pending);
    assert_eq!(report.content_id.as_deref(), Some("c1"));
    assert_eq!(report.reported_user_id, Some(owner));
    assert!(report.reviewed_at.is_none());
}

#[tokio::test]
async fn test_report_without_target_is_rejected() {
    let core = ModerationCore::in_memory();
    let mut input = content_report("", None, ReportType::Spam);
    input.reason = "spam".into();

    let err = assert_err!(core.reports.create_report(input).await);
    assert!(matches!(err, ModerationError::Validation(_)));
    assert_eq!(
        core.reports
            .count_reports(&ReportFilter::default())
            .await
            .unwrap(),
        0
    );
}

#[tokio::test]
async fn test_report_and_enqueue_routes_content() {
    let core = ModerationCore::in_memory();
    let (report, outcome) = core
        .report_and_enqueue(content_report("c1", None, ReportType::Threat))
        .await
        .unwrap();

    let item = outcome.expect("content report is queued").into_item();
    assert_eq!(item.content_id, "c1");
    assert_eq!(item.priority, report.priority);
    assert_eq!(item.priority, Priority::CRITICAL);
    assert_eq!(item.reason.as_deref(), Some(report.reason.as_str()));

    // A user report has nothing to queue.
    let (_, outcome) = core
        .report_and_enqueue(NewReport {
            reporter_id: Uuid::new_v4(),
            target: ReportTarget::User {
                user_id: Uuid::new_v4(),
            },
            report_type: ReportType::Harassment,
            reason: "abusive messages".into(),
            description: None,
            priority: None,
        })
        .await
        .unwrap();
    assert!(outcome.is_none());
}

#[tokio::test]
async fn test_reports_on_same_content_share_one_queue_item() {
    let core = ModerationCore::in_memory();
    let (_, first) = core
        .report_and_enqueue(content_report("c1", None, ReportType::Spam))
        .await
        .unwrap();
    let (_, second) = core
        .report_and_enqueue(content_report("c1", None, ReportType::HateSpeech))
        .await
        .unwrap();

    let first = first.unwrap().into_item();
    let second = second.unwrap();
    assert!(matches!(second, EnqueueOutcome::Escalated { previous, .. } if previous == Priority::MEDIUM));
    assert_eq!(second.item().id, first.id);
    assert_eq!(second.item().priority, Priority::CRITICAL);
}

#[tokio::test]
async fn test_closed_reports_never_reopen() {
    let (core, dispatcher) = recording_core();
    let moderator = Uuid::new_v4();
    let report = core
        .reports
        .create_report(content_report("c1", None, ReportType::Spam))
        .await
        .unwrap();

    let assigned = core.reports.assign_report(report.id, moderator).await.unwrap();
    assert_eq!(assigned.status, ReportStatus::UnderReview);
    assert_eq!(assigned.assigned_to, Some(moderator));

    let resolved = core
        .reports
        .resolve_report(report.id, "content removed".into(), moderator)
        .await
        .unwrap();
    assert_eq!(resolved.status, ReportStatus::Resolved);
    assert_eq!(resolved.reviewed_by, Some(moderator));
    assert!(resolved.reviewed_at.is_some());

    for next in [ReportStatus::Pending, ReportStatus::UnderReview, ReportStatus::Dismissed] {
        let err = core
            .reports
            .update_report(
                report.id,
                ReportPatch {
                    status: Some(next),
                    ..Default::default()
                },
                moderator,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ModerationError::InvalidStatusTransition { .. }));
    }

    let err = core
        .reports
        .dismiss_report(report.id, "duplicate".into(), moderator)
        .await
        .unwrap_err();
    assert!(matches!(err, ModerationError::InvalidStatusTransition { .. }));

    let stored = core.reports.get_report(report.id).await.unwrap();
    assert_eq!(stored.status, ReportStatus::Resolved);
    assert_eq!(dispatcher.types().await, vec![EventType::ReportResolved]);
}

#[tokio::test]
async fn test_closed_report_fields_are_frozen() {
    let core = ModerationCore::in_memory();
    let moderator = Uuid::new_v4();
    let report = core
        .reports
        .create_report(content_report("c1", None, ReportType::Spam))
        .await
        .unwrap();
    core.reports
        .resolve_report(report.id, "content removed".into(), moderator)
        .await
        .unwrap();

    let patches = [
        ReportPatch {
            priority: Some(Priority::LOW),
            ..Default::default()
        },
        ReportPatch {
            assigned_to: Some(Some(Uuid::new_v4())),
            ..Default::default()
        },
        ReportPatch {
            status: Some(ReportStatus::Resolved),
            resolution: Some("rewritten".into()),
            ..Default::default()
        },
    ];
    for patch in patches {
        let err = assert_err!(core.reports.update_report(report.id, patch, Uuid::new_v4()).await);
        assert!(matches!(err, ModerationError::Conflict(_)));
    }

    let stored = core.reports.get_report(report.id).await.unwrap();
    assert_eq!(stored.status, ReportStatus::Resolved);
    assert_eq!(stored.priority, Priority::MEDIUM);
    assert!(stored.assigned_to.is_none());
    assert_eq!(stored.resolution.as_deref(), Some("content removed"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_open_report_field_edits_are_last_writer_wins() {
    let core = ModerationCore::in_memory();
    let report = core
        .reports
        .create_report(content_report("c1", None, ReportType::Spam))
        .await
        .unwrap();
    let id = report.id;

    let mut handles = Vec::new();
    for priority in [Priority::LOW, Priority::CRITICAL] {
        let reports = core.reports.clone();
        handles.push(tokio::spawn(async move {
            reports
                .update_report(
                    id,
                    ReportPatch {
                        priority: Some(priority),
                        ..Default::default()
                    },
                    Uuid::new_v4(),
                )
                .await
        }));
    }
    for handle in handles {
        assert_ok!(handle.await.unwrap());
    }

    let stored = core.reports.get_report(id).await.unwrap();
    assert_eq!(stored.status, ReportStatus::Pending);
    assert!([Priority::LOW, Priority::CRITICAL].contains(&stored.priority));
}

#[tokio::test]
async fn test_under_review_can_be_released() {
    let core = ModerationCore::in_memory();
    let moderator = Uuid::new_v4();
    let report = core
        .reports
        .create_report(content_report("c1", None, ReportType::Misleading))
        .await
        .unwrap();
    assert_ok!(core.reports.assign_report(report.id, moderator).await);

    let released = core
        .reports
        .update_report(
            report.id,
            ReportPatch {
                status: Some(ReportStatus::Pending),
                assigned_to: Some(None),
                ..Default::default()
            },
            moderator,
        )
        .await
        .unwrap();
    assert_eq!(released.status, ReportStatus::Pending);
    assert!(released.assigned_to.is_none());
}

#[tokio::test]
async fn test_report_listing_and_stats() {
    let core = ModerationCore::in_memory();
    let reporter = Uuid::new_v4();
    for (content, report_type) in [
        ("a", ReportType::Spam),
        ("b", ReportType::Spam),
        ("c", ReportType::Threat),
    ] {
        let mut input = content_report(content, None, report_type);
        input.reporter_id = reporter;
        core.reports.create_report(input).await.unwrap();
    }
    core.reports
        .create_report(content_report("d", None, ReportType::Other))
        .await
        .unwrap();

    let mine = core
        .reports
        .get_reports_by_reporter(reporter, Pagination::default())
        .await
        .unwrap();
    assert_eq!(mine.len(), 3);
    assert!(mine.windows(2).all(|w| w[0].created_at >= w[1].created_at));

    let spam = core
        .reports
        .count_reports(&ReportFilter {
            report_type: Some(ReportType::Spam),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(spam, 2);

    let stats = core.reports.get_report_stats(DateRange::all()).await.unwrap();
    assert_eq!(stats.total, 4);
    assert_eq!(stats.by_type.get(&ReportType::Spam), Some(&2));
    assert_eq!(stats.by_status.get(&ReportStatus::Pending), Some(&4));

    let future = Utc::now() + Duration::hours(1);
    let empty = core
        .reports
        .get_report_stats(DateRange::between(future, future + Duration::hours(1)))
        .await
        .unwrap();
    assert_eq!(empty.total, 0);
}

#[tokio::test]
async fn test_deleting_missing_report_is_not_found() {
    let core = ModerationCore::in_memory();
    let err = assert_err!(core.reports.delete_report(Uuid::new_v4()).await);
    assert!(matches!(err, ModerationError::NotFound { .. }));
}

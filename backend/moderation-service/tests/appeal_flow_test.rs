//! End-to-end appeal flow: report, queue review, resolution, appeal decision.

mod common;

use uuid::Uuid;

use common::*;
use moderation_service::events::{EventPayload, EventType};
use moderation_service::models::*;
use moderation_service::{ModerationCore, ModerationError};

async fn resolved_content_report(core: &ModerationCore, owner: Uuid, moderator: Uuid) -> Report {
    let (report, outcome) = core
        .report_and_enqueue(content_report("c1", Some(owner), ReportType::Harassment))
        .await
        .unwrap();
    let item = outcome.unwrap().into_item();

    core.queue
        .claim_queue_item(item.id, moderator)
        .await
        .unwrap();
    core.queue
        .process_queue_item(item.id, command(ModerationAction::ContentRemoval, moderator))
        .await
        .unwrap();
    core.reports
        .resolve_report(report.id, "content removed".into(), moderator)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_owner_appeal_is_approved() {
    let (core, dispatcher) = recording_core();
    let owner = Uuid::new_v4();
    let moderator = Uuid::new_v4();
    let reviewer = Uuid::new_v4();
    let report = resolved_content_report(&core, owner, moderator).await;

    assert!(core.appeals.can_user_appeal(report.id, owner).await.unwrap());
    assert_eq!(
        core.appeals
            .check_appeal_eligibility(report.id, Uuid::new_v4())
            .await
            .unwrap(),
        AppealEligibility::NotAffectedParty
    );

    let appeal = core
        .appeals
        .create_appeal(NewAppeal {
            report_id: report.id,
            appellant_id: owner,
            reason: "the post was satire".into(),
        })
        .await
        .unwrap();
    assert_eq!(appeal.status, AppealStatus::Pending);
    assert_eq!(
        core.appeals.check_appeal_eligibility(report.id, owner).await.unwrap(),
        AppealEligibility::AlreadyAppealed
    );

    let decided = core
        .appeals
        .approve_appeal(appeal.id, reviewer, Some("context supports satire".into()))
        .await
        .unwrap();
    assert_eq!(decided.status, AppealStatus::Approved);
    assert_eq!(decided.reviewed_by, Some(reviewer));
    assert!(decided.reviewed_at.is_some());

    assert_eq!(
        dispatcher.types().await,
        vec![
            EventType::QueueItemProcessed,
            EventType::ReportResolved,
            EventType::AppealApproved,
        ]
    );
    let events = dispatcher.events().await;
    match &events[2].payload {
        EventPayload::AppealApproved {
            report_id,
            appellant_id,
            ..
        } => {
            assert_eq!(*report_id, report.id);
            assert_eq!(*appellant_id, owner);
        }
        other => panic!("unexpected payload {:?}", other),
    }
}

#[tokio::test]
async fn test_decided_appeal_cannot_be_reviewed_again() {
    let core = ModerationCore::in_memory();
    let owner = Uuid::new_v4();
    let report = resolved_content_report(&core, owner, Uuid::new_v4()).await;
    let appeal = core
        .appeals
        .create_appeal(NewAppeal {
            report_id: report.id,
            appellant_id: owner,
            reason: "mistaken identity".into(),
        })
        .await
        .unwrap();

    core.appeals
        .reject_appeal(appeal.id, Uuid::new_v4(), None)
        .await
        .unwrap();

    let err = core
        .appeals
        .approve_appeal(appeal.id, Uuid::new_v4(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, ModerationError::InvalidStatusTransition { .. }));
    assert_eq!(
        core.appeals.get_appeal(appeal.id).await.unwrap().status,
        AppealStatus::Rejected
    );
}

#[tokio::test]
async fn test_decided_appeal_notes_are_not_rewritten() {
    let core = ModerationCore::in_memory();
    let owner = Uuid::new_v4();
    let reviewer = Uuid::new_v4();
    let report = resolved_content_report(&core, owner, Uuid::new_v4()).await;
    let appeal = core
        .appeals
        .create_appeal(NewAppeal {
            report_id: report.id,
            appellant_id: owner,
            reason: "the post was satire".into(),
        })
        .await
        .unwrap();
    core.appeals
        .approve_appeal(appeal.id, reviewer, Some("original decision".into()))
        .await
        .unwrap();

    for patch in [
        AppealPatch {
            status: Some(AppealStatus::Approved),
            review_notes: Some("rewritten".into()),
            ..Default::default()
        },
        AppealPatch {
            review_notes: Some("rewritten".into()),
            ..Default::default()
        },
    ] {
        let err = core
            .appeals
            .update_appeal(appeal.id, patch, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, ModerationError::Conflict(_)));
    }

    let stored = core.appeals.get_appeal(appeal.id).await.unwrap();
    assert_eq!(stored.status, AppealStatus::Approved);
    assert_eq!(stored.reviewed_by, Some(reviewer));
    assert_eq!(stored.review_notes.as_deref(), Some("original decision"));
}

#[tokio::test]
async fn test_second_appeal_for_report_conflicts() {
    let core = ModerationCore::in_memory();
    let owner = Uuid::new_v4();
    let report = resolved_content_report(&core, owner, Uuid::new_v4()).await;
    let input = NewAppeal {
        report_id: report.id,
        appellant_id: owner,
        reason: "please reconsider".into(),
    };

    core.appeals.create_appeal(input.clone()).await.unwrap();
    let err = core.appeals.create_appeal(input).await.unwrap_err();
    assert!(matches!(err, ModerationError::Conflict(_)));
}

#[tokio::test]
async fn test_pending_report_is_not_appealable() {
    let core = ModerationCore::in_memory();
    let owner = Uuid::new_v4();
    let report = core
        .reports
        .create_report(content_report("c1", Some(owner), ReportType::Spam))
        .await
        .unwrap();

    assert_eq!(
        core.appeals.check_appeal_eligibility(report.id, owner).await.unwrap(),
        AppealEligibility::ReportNotFinal
    );
    assert_eq!(
        core.appeals
            .check_appeal_eligibility(Uuid::new_v4(), owner)
            .await
            .unwrap(),
        AppealEligibility::ReportNotFound
    );
}

#[tokio::test]
async fn test_timeline_follows_report_and_appeal() {
    let core = ModerationCore::in_memory();
    let owner = Uuid::new_v4();
    let moderator = Uuid::new_v4();
    let report = core
        .reports
        .create_report(content_report("c1", Some(owner), ReportType::Spam))
        .await
        .unwrap();
    core.reports.assign_report(report.id, moderator).await.unwrap();
    core.reports
        .dismiss_report(report.id, "not spam".into(), moderator)
        .await
        .unwrap();
    let appeal = core
        .appeals
        .create_appeal(NewAppeal {
            report_id: report.id,
            appellant_id: owner,
            reason: "dismissal hides ongoing abuse".into(),
        })
        .await
        .unwrap();
    core.appeals
        .reject_appeal(appeal.id, moderator, Some("upheld".into()))
        .await
        .unwrap();

    let events: Vec<TimelineEvent> = core
        .appeals
        .get_appeal_timeline(report.id)
        .await
        .unwrap()
        .into_iter()
        .map(|entry| entry.event)
        .collect();
    assert_eq!(
        events,
        vec![
            TimelineEvent::ReportCreated,
            TimelineEvent::ReportAssigned,
            TimelineEvent::ReportDismissed,
            TimelineEvent::AppealFiled,
            TimelineEvent::AppealRejected,
        ]
    );
}

#[tokio::test]
async fn test_deleting_report_removes_its_appeal() {
    let core = ModerationCore::in_memory();
    let owner = Uuid::new_v4();
    let report = resolved_content_report(&core, owner, Uuid::new_v4()).await;
    let appeal = core
        .appeals
        .create_appeal(NewAppeal {
            report_id: report.id,
            appellant_id: owner,
            reason: "wrong account".into(),
        })
        .await
        .unwrap();

    core.reports.delete_report(report.id).await.unwrap();

    assert!(matches!(
        core.appeals.get_appeal(appeal.id).await.unwrap_err(),
        ModerationError::NotFound { .. }
    ));
    assert!(core.appeals.get_appeal_by_report(report.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_pending_appeals_oldest_first() {
    let core = ModerationCore::in_memory();
    let mut created = Vec::new();
    for _ in 0..3 {
        let owner = Uuid::new_v4();
        let report = resolved_content_report(&core, owner, Uuid::new_v4()).await;
        let appeal = core
            .appeals
            .create_appeal(NewAppeal {
                report_id: report.id,
                appellant_id: owner,
                reason: "appeal".into(),
            })
            .await
            .unwrap();
        created.push(appeal.id);
    }
    core.appeals
        .approve_appeal(created[1], Uuid::new_v4(), None)
        .await
        .unwrap();

    let pending: Vec<Uuid> = core
        .appeals
        .get_pending_appeals(Pagination::default())
        .await
        .unwrap()
        .iter()
        .map(|appeal| appeal.id)
        .collect();
    assert_eq!(pending, vec![created[0], created[2]]);

    let stats = core.appeals.get_appeal_stats(DateRange::all()).await.unwrap();
    assert_eq!(stats.total, 3);
    assert_eq!(stats.pending, 2);
    assert_eq!(stats.approved, 1);
    assert_eq!(stats.approval_rate, Some(1.0));
}

//! PostgreSQL adapter and queue tests
//!
//! Need Docker: `cargo test -p infra_db -- --ignored`. Each test owns its
//! container; a pool cannot outlive the runtime of the test that opened it.

use serde_json::json;
use std::time::Duration;
use uuid::Uuid;

use core_kernel::{ClaimId, EventId, OrganizationId, UserId};
use domain_claims::{
    AuditAction, ClaimChanges, ClaimError, ClaimPort, ClaimQuery, ClaimStatus, ClaimTransition,
    ClaimWriteError, SortField, SortOrder,
};
use domain_events::{
    EnqueueOutcome, EventPort, EventQuery, FailOutcome, JobQueue, NewJob, ReconciliationPort,
    RetryPolicy,
};
use infra_db::{PostgresClaimAdapter, PostgresEventAdapter, PostgresJobQueue};
use rust_decimal_macros::dec;
use test_utils::{create_isolated_test_database, fake_treatment_type, ClaimBuilder, EventBuilder, TestDatabase};

const ADMISSION: ClaimTransition = ClaimTransition::new(ClaimStatus::Submitted, ClaimStatus::UnderReview);

struct Setup {
    db: TestDatabase,
    claims: PostgresClaimAdapter,
    events: PostgresEventAdapter,
    org: OrganizationId,
}

async fn setup() -> Setup {
    let db = create_isolated_test_database().await.unwrap();
    let org = db.organization().await.unwrap();
    Setup {
        claims: PostgresClaimAdapter::new(db.pool().clone()),
        events: PostgresEventAdapter::new(db.pool().clone()),
        org,
        db,
    }
}

fn unique_queue() -> String {
    format!("test-queue-{}", Uuid::new_v4())
}

fn job(queue: &str, job_id: &str, policy: RetryPolicy) -> NewJob {
    NewJob {
        queue: queue.to_string(),
        job_id: job_id.to_string(),
        name: "process-admission".to_string(),
        payload: json!({ "eventId": job_id }),
        policy,
    }
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_insert_is_tenant_scoped_and_audited() {
    let Setup { db, claims, org, .. } = setup().await;
    let actor = UserId::new();

    let created = claims
        .insert(org, ClaimBuilder::new(org).build_new(), actor)
        .await
        .unwrap();
    assert_eq!(created.status, ClaimStatus::Submitted);

    let found = claims.find_by_id(org, created.id).await.unwrap();
    assert_eq!(found.as_ref().map(|c| c.id), Some(created.id));

    let other_org = db.organization().await.unwrap();
    assert!(claims.find_by_id(other_org, created.id).await.unwrap().is_none());

    let trail = claims.audit_trail(org, created.id).await.unwrap();
    assert_eq!(trail.len(), 1);
    assert_eq!(trail[0].action, AuditAction::Insert);
    assert_eq!(trail[0].changed_by, actor);
    assert!(trail[0].old_values.is_none());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_update_records_before_and_after() {
    let Setup { db: _db, claims, org, .. } = setup().await;
    let actor = UserId::new();
    let created = claims
        .insert(org, ClaimBuilder::new(org).build_new(), actor)
        .await
        .unwrap();

    let changes = ClaimChanges {
        status: Some(ClaimStatus::UnderReview),
        diagnosis_code: Some("K35.80".into()),
        ..Default::default()
    };
    let updated = claims
        .update(org, created.id, &changes, actor)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.status, ClaimStatus::UnderReview);
    assert_eq!(updated.diagnosis_code, "K35.80");

    let trail = claims.audit_trail(org, created.id).await.unwrap();
    assert_eq!(trail.len(), 2);
    assert_eq!(trail[1].action, AuditAction::Update);
    assert_eq!(trail[1].old_values.as_ref().unwrap()["status"], "submitted");
    assert_eq!(trail[1].new_values["status"], "under_review");

    let missing = claims
        .update(org, ClaimId::new(), &changes, actor)
        .await
        .unwrap();
    assert!(missing.is_none());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_list_filters_sorts_and_paginates() {
    let Setup { db: _db, claims, org, .. } = setup().await;
    let actor = UserId::new();
    let patient = UserId::new();

    for amount in [dec!(100.00), dec!(300.00), dec!(200.00)] {
        claims
            .insert(
                org,
                ClaimBuilder::new(org)
                    .with_patient(patient)
                    .with_amount(core_kernel::Amount::new(amount))
                    .build_new(),
                actor,
            )
            .await
            .unwrap();
    }
    claims
        .insert(org, ClaimBuilder::new(org).build_new(), actor)
        .await
        .unwrap();

    let query = ClaimQuery {
        patient_id: Some(patient),
        sort_by: SortField::Amount,
        sort_order: SortOrder::Asc,
        limit: 2,
        ..Default::default()
    };
    let page = claims.list(org, &query).await.unwrap();
    assert_eq!(page.total, 3);
    assert!(page.has_more);
    let amounts: Vec<_> = page.data.iter().map(|c| c.amount.value()).collect();
    assert_eq!(amounts, vec![dec!(100.00), dec!(200.00)]);

    let second = claims
        .list(org, &ClaimQuery { offset: 2, ..query })
        .await
        .unwrap();
    assert_eq!(second.data.len(), 1);
    assert!(!second.has_more);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_bulk_update_keeps_request_order() {
    let Setup { db: _db, claims, org, .. } = setup().await;
    let actor = UserId::new();
    let mut ids = Vec::new();
    for _ in 0..3 {
        let claim = claims
            .insert(org, ClaimBuilder::new(org).build_new(), actor)
            .await
            .unwrap();
        ids.push(claim.id);
    }
    ids.reverse();

    let updated = claims
        .bulk_update_status(org, &ids, ClaimStatus::UnderReview, actor)
        .await
        .unwrap();
    let returned: Vec<_> = updated.iter().map(|c| c.id).collect();
    assert_eq!(returned, ids);
    test_utils::assert_all_in_status(&updated, ClaimStatus::UnderReview);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_writes_recheck_the_locked_row() {
    let Setup { db: _db, claims, org, .. } = setup().await;
    let actor = UserId::new();
    let patient = UserId::new();
    let claim = claims
        .insert(org, ClaimBuilder::new(org).with_patient(patient).build_new(), actor)
        .await
        .unwrap();
    claims
        .update(org, claim.id, &ClaimChanges::status(ClaimStatus::UnderReview), actor)
        .await
        .unwrap();

    // Approved behind the back of a caller that still sees under_review
    let approved = ClaimTransition::new(ClaimStatus::UnderReview, ClaimStatus::Approved);
    claims
        .transition_by_patient(org, patient, approved, UserId::SYSTEM)
        .await
        .unwrap();

    let single = claims
        .update(org, claim.id, &ClaimChanges::status(ClaimStatus::Rejected), actor)
        .await;
    assert!(matches!(
        single,
        Err(ClaimWriteError::Rejected { source: ClaimError::Locked { .. }, .. })
    ));

    let bulk = claims
        .bulk_update_status(org, &[claim.id], ClaimStatus::Rejected, actor)
        .await;
    assert!(matches!(bulk, Err(ClaimWriteError::Rejected { claim_id, .. }) if claim_id == claim.id));

    let stored = claims.find_by_id(org, claim.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ClaimStatus::Approved);
    assert_eq!(claims.audit_trail(org, claim.id).await.unwrap().len(), 3);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_reconcile_is_conditional_and_marks_processed_once() {
    let Setup { db: _db, claims, events, org } = setup().await;
    let patient = UserId::new();
    let actor = UserId::new();

    let submitted = claims
        .insert(org, ClaimBuilder::new(org).with_patient(patient).build_new(), actor)
        .await
        .unwrap();
    let rejected = claims
        .insert(org, ClaimBuilder::new(org).with_patient(patient).build_new(), actor)
        .await
        .unwrap();
    claims
        .update(org, rejected.id, &ClaimChanges::status(ClaimStatus::Rejected), actor)
        .await
        .unwrap();

    let event = events
        .insert(org, EventBuilder::new(org, patient).admission().build_new())
        .await
        .unwrap();

    let moved = events
        .reconcile(org, event.id, patient, ADMISSION, UserId::SYSTEM)
        .await
        .unwrap();
    assert_eq!(moved.iter().map(|c| c.id).collect::<Vec<_>>(), vec![submitted.id]);

    let processed_at = events
        .find_by_id(org, event.id)
        .await
        .unwrap()
        .and_then(|e| e.processed_at)
        .unwrap();

    let replay = events
        .reconcile(org, event.id, patient, ADMISSION, UserId::SYSTEM)
        .await
        .unwrap();
    assert!(replay.is_empty());

    let after_replay = events.find_by_id(org, event.id).await.unwrap().unwrap();
    assert_eq!(after_replay.processed_at, Some(processed_at));

    let still_rejected = claims.find_by_id(org, rejected.id).await.unwrap().unwrap();
    assert_eq!(still_rejected.status, ClaimStatus::Rejected);

    let trail = claims.audit_trail(org, submitted.id).await.unwrap();
    assert_eq!(trail.last().map(|a| a.changed_by), Some(UserId::SYSTEM));
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_reconcile_rolls_back_when_event_missing() {
    let Setup { db: _db, claims, events, org } = setup().await;
    let patient = UserId::new();
    let claim = claims
        .insert(org, ClaimBuilder::new(org).with_patient(patient).build_new(), UserId::new())
        .await
        .unwrap();

    let result = events
        .reconcile(org, EventId::new(), patient, ADMISSION, UserId::SYSTEM)
        .await;
    assert!(result.is_err());

    let unchanged = claims.find_by_id(org, claim.id).await.unwrap().unwrap();
    assert_eq!(unchanged.status, ClaimStatus::Submitted);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_history_is_newest_first() {
    let Setup { db: _db, events, org, .. } = setup().await;
    let patient = UserId::new();
    for builder in [
        EventBuilder::new(org, patient).admission(),
        EventBuilder::new(org, patient).discharge(),
        EventBuilder::new(org, patient).treatment(fake_treatment_type()),
    ] {
        events.insert(org, builder.build_new()).await.unwrap();
    }

    let history = events
        .list_by_patient(org, patient, &EventQuery::default())
        .await
        .unwrap();
    let types: Vec<_> = history.iter().map(|e| e.event_type.as_str().to_string()).collect();
    assert_eq!(types, vec!["discharge", "treatment", "admission"]);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_queue_deduplicates_and_retries() {
    let db = create_isolated_test_database().await.unwrap();
    let queue = PostgresJobQueue::new(db.pool().clone());
    let name = unique_queue();
    let policy = RetryPolicy {
        max_attempts: 2,
        base_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(10),
    };

    assert_eq!(queue.enqueue(job(&name, "a", policy)).await.unwrap(), EnqueueOutcome::Enqueued);
    assert_eq!(queue.enqueue(job(&name, "a", policy)).await.unwrap(), EnqueueOutcome::Duplicate);

    let lease = queue.claim_next(&name).await.unwrap().unwrap();
    assert_eq!(lease.attempt, 1);
    assert_eq!(lease.policy, policy);
    assert!(queue.claim_next(&name).await.unwrap().is_none());

    let outcome = queue.fail(&lease, "boom").await.unwrap();
    assert!(matches!(outcome, FailOutcome::RetryScheduled { .. }));

    tokio::time::sleep(Duration::from_millis(50)).await;
    let retry = queue.claim_next(&name).await.unwrap().unwrap();
    assert_eq!(retry.attempt, 2);
    assert_eq!(queue.fail(&retry, "boom").await.unwrap(), FailOutcome::Exhausted);
    assert!(queue.claim_next(&name).await.unwrap().is_none());

    let counts = queue.counts(&name).await.unwrap();
    assert_eq!(counts.failed, 1);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_queue_completion_and_stall_recovery() {
    let db = create_isolated_test_database().await.unwrap();
    let queue = PostgresJobQueue::new(db.pool().clone());
    let name = unique_queue();

    queue.enqueue(job(&name, "done", RetryPolicy::default())).await.unwrap();
    queue.enqueue(job(&name, "stalled", RetryPolicy::default())).await.unwrap();

    let first = queue.claim_next(&name).await.unwrap().unwrap();
    assert_eq!(first.job_id, "done");
    queue.complete(&first, &json!({ "processed": true })).await.unwrap();

    let second = queue.claim_next(&name).await.unwrap().unwrap();
    assert_eq!(second.job_id, "stalled");

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(queue.recover_stalled(&name, Duration::from_millis(1)).await.unwrap(), 1);
    let again = queue.claim_next(&name).await.unwrap().unwrap();
    assert_eq!(again.job_id, "stalled");
    assert_eq!(again.attempt, 2);

    let purged = queue.purge_finished(&name, Duration::ZERO, 0).await.unwrap();
    assert_eq!(purged, 1);
    assert_eq!(
        queue.enqueue(job(&name, "done", RetryPolicy::default())).await.unwrap(),
        EnqueueOutcome::Enqueued
    );
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_concurrent_claims_never_share_a_job() {
    let db = create_isolated_test_database().await.unwrap();
    let queue = PostgresJobQueue::new(db.pool().clone());
    let name = unique_queue();
    for i in 0..20 {
        queue
            .enqueue(job(&name, &format!("job-{}", i), RetryPolicy::default()))
            .await
            .unwrap();
    }

    let mut handles = Vec::new();
    for _ in 0..5 {
        let queue = queue.clone();
        let name = name.clone();
        handles.push(tokio::spawn(async move {
            let mut leased = Vec::new();
            while let Some(lease) = queue.claim_next(&name).await.unwrap() {
                leased.push(lease.job_id);
            }
            leased
        }));
    }

    let mut all = Vec::new();
    for handle in handles {
        all.extend(handle.await.unwrap());
    }
    all.sort();
    all.dedup();
    assert_eq!(all.len(), 20);
}

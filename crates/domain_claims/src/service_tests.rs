//! Behaviour of the lifecycle service against the in-memory store

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal_macros::dec;
use std::sync::Arc;

use core_kernel::cache::{CacheConfig, CacheLayer, MemoryCacheStore};
use core_kernel::{
    tenant, Amount, ClaimId, DomainPort, OrganizationId, PortError, Role, TenantContext, UserId,
};

use crate::audit::{AuditAction, ClaimAudit};
use crate::cache_keys;
use crate::claim::{Claim, ClaimChanges, ClaimStatus, ClaimTransition, NewClaim};
use crate::error::ClaimWriteError;
use crate::ports::mock::InMemoryClaimStore;
use crate::ports::ClaimPort;
use crate::query::{ClaimQuery, Page};
use crate::service::ClaimLifecycleService;

struct Harness {
    org: OrganizationId,
    store: InMemoryClaimStore,
    cache: Arc<MemoryCacheStore>,
    service: ClaimLifecycleService,
}

impl Harness {
    fn new() -> Self {
        let store = InMemoryClaimStore::new();
        let cache = Arc::new(MemoryCacheStore::new());
        let service = ClaimLifecycleService::new(
            Arc::new(store.clone()),
            CacheLayer::new(cache.clone(), CacheConfig::default()),
        );
        Self {
            org: OrganizationId::new(),
            store,
            cache,
            service,
        }
    }

    fn admin(&self) -> TenantContext {
        TenantContext::new(self.org, UserId::new(), Role::Admin)
    }

    fn as_role(&self, user: UserId, role: Role) -> TenantContext {
        TenantContext::new(self.org, user, role)
    }

    async fn seed(&self, org: OrganizationId, patient: UserId, status: ClaimStatus) -> Claim {
        let mut claim = Claim::submit(org, new_claim(patient), Utc::now());
        claim.status = status;
        self.store.seed(claim.clone()).await;
        claim
    }
}

fn new_claim(patient: UserId) -> NewClaim {
    NewClaim {
        patient_id: patient,
        provider_id: UserId::new(),
        diagnosis_code: "I10".into(),
        amount: Amount::new(dec!(250.00)),
        assigned_processor_id: None,
    }
}

#[tokio::test]
async fn test_create_forces_submitted() {
    let h = Harness::new();
    let claim = tenant::scope(h.admin(), h.service.create(new_claim(UserId::new())))
        .await
        .unwrap();

    assert_eq!(claim.status, ClaimStatus::Submitted);
    assert_eq!(claim.organization_id, h.org);
}

#[tokio::test]
async fn test_patient_cannot_create() {
    let h = Harness::new();
    let patient = UserId::new();
    let err = tenant::scope(h.as_role(patient, Role::Patient), h.service.create(new_claim(patient)))
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 403);
}

#[tokio::test]
async fn test_operations_require_tenant_scope() {
    let h = Harness::new();
    let err = h.service.get(ClaimId::new()).await.unwrap_err();
    assert_eq!(err.status_code(), 401);
}

#[tokio::test]
async fn test_get_is_served_from_cache_on_second_read() {
    let h = Harness::new();
    let claim = h.seed(h.org, UserId::new(), ClaimStatus::Submitted).await;
    let ctx = h.admin();

    let first = tenant::scope(ctx.clone(), h.service.get(claim.id)).await.unwrap();
    let reads_after_first = h.store.read_count();
    let second = tenant::scope(ctx, h.service.get(claim.id)).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(h.store.read_count(), reads_after_first);
    assert!(h.cache.contains_key(&cache_keys::claim_key(h.org, claim.id)));
}

#[tokio::test]
async fn test_cached_claim_is_still_permission_checked() {
    let h = Harness::new();
    let claim = h.seed(h.org, UserId::new(), ClaimStatus::Submitted).await;

    tenant::scope(h.admin(), h.service.get(claim.id)).await.unwrap();

    let stranger = h.as_role(UserId::new(), Role::Patient);
    let err = tenant::scope(stranger, h.service.get(claim.id)).await.unwrap_err();
    assert!(err.is_forbidden());
}

#[tokio::test]
async fn test_cross_tenant_read_is_not_found() {
    let h = Harness::new();
    let foreign = h.seed(OrganizationId::new(), UserId::new(), ClaimStatus::Submitted).await;

    let err = tenant::scope(h.admin(), h.service.get(foreign.id)).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_processor_reading_foreign_assignment_is_forbidden() {
    let h = Harness::new();
    let mut claim = Claim::submit(h.org, new_claim(UserId::new()), Utc::now());
    claim.assigned_processor_id = Some(UserId::new());
    h.store.seed(claim.clone()).await;

    let other_processor = h.as_role(UserId::new(), Role::Processor);
    let err = tenant::scope(other_processor, h.service.get(claim.id)).await.unwrap_err();
    assert!(err.is_forbidden());
}

#[tokio::test]
async fn test_update_invalidates_cached_claim() {
    let h = Harness::new();
    let claim = h.seed(h.org, UserId::new(), ClaimStatus::Submitted).await;
    let ctx = h.admin();

    tenant::scope(ctx.clone(), async {
        h.service.get(claim.id).await.unwrap();
        h.service
            .update(claim.id, ClaimChanges::status(ClaimStatus::UnderReview))
            .await
            .unwrap();
        let after = h.service.get(claim.id).await.unwrap();
        assert_eq!(after.status, ClaimStatus::UnderReview);
    })
    .await;
}

#[tokio::test]
async fn test_update_locked_claim_is_forbidden() {
    let h = Harness::new();
    let claim = h.seed(h.org, UserId::new(), ClaimStatus::Approved).await;
    let changes = ClaimChanges {
        diagnosis_code: Some("E11.9".into()),
        ..Default::default()
    };

    let err = tenant::scope(h.admin(), h.service.update(claim.id, changes)).await.unwrap_err();
    assert!(err.is_forbidden());
    assert_eq!(err.to_string(), "Cannot modify approved or paid claims");
}

#[tokio::test]
async fn test_invalid_transition_is_business_rule() {
    let h = Harness::new();
    let claim = h.seed(h.org, UserId::new(), ClaimStatus::Submitted).await;

    let err = tenant::scope(
        h.admin(),
        h.service.update(claim.id, ClaimChanges::status(ClaimStatus::Paid)),
    )
    .await
    .unwrap_err();

    assert_eq!(err.status_code(), 422);
    assert_eq!(err.error_code(), "INVALID_STATUS_TRANSITION");
    assert_eq!(err.metadata().unwrap()["currentStatus"], "submitted");
    assert_eq!(h.store.snapshot(claim.id).await.unwrap().status, ClaimStatus::Submitted);
}

#[tokio::test]
async fn test_provider_cannot_update_own_claim() {
    let h = Harness::new();
    let claim = h.seed(h.org, UserId::new(), ClaimStatus::Submitted).await;
    let provider = h.as_role(claim.provider_id, Role::Provider);

    let err = tenant::scope(provider, h.service.update(claim.id, ClaimChanges::status(ClaimStatus::Rejected)))
        .await
        .unwrap_err();
    assert!(err.is_forbidden());
}

#[tokio::test]
async fn test_bulk_update_with_foreign_claim_writes_nothing() {
    let h = Harness::new();
    let a = h.seed(h.org, UserId::new(), ClaimStatus::Submitted).await;
    let b = h.seed(OrganizationId::new(), UserId::new(), ClaimStatus::Submitted).await;

    let err = tenant::scope(
        h.admin(),
        h.service.bulk_update_status(vec![a.id, b.id], ClaimStatus::UnderReview),
    )
    .await
    .unwrap_err();

    assert!(err.is_not_found());
    assert_eq!(err.to_string(), format!("Claim {} not found", b.id.as_uuid()));
    assert_eq!(h.store.snapshot(a.id).await.unwrap().status, ClaimStatus::Submitted);
}

#[tokio::test]
async fn test_bulk_update_is_admin_only() {
    let h = Harness::new();
    let a = h.seed(h.org, UserId::new(), ClaimStatus::Submitted).await;
    let processor = h.as_role(UserId::new(), Role::Processor);

    let err = tenant::scope(processor, h.service.bulk_update_status(vec![a.id], ClaimStatus::Rejected))
        .await
        .unwrap_err();
    assert!(err.is_forbidden());
}

#[tokio::test]
async fn test_bulk_update_rejects_whole_batch_on_locked_claim() {
    let h = Harness::new();
    let open = h.seed(h.org, UserId::new(), ClaimStatus::UnderReview).await;
    let locked = h.seed(h.org, UserId::new(), ClaimStatus::Approved).await;

    let err = tenant::scope(
        h.admin(),
        h.service.bulk_update_status(vec![open.id, locked.id], ClaimStatus::Rejected),
    )
    .await
    .unwrap_err();

    assert!(err.is_forbidden());
    assert!(err.to_string().contains(&locked.id.as_uuid().to_string()));
    assert_eq!(h.store.snapshot(open.id).await.unwrap().status, ClaimStatus::UnderReview);
}

#[tokio::test]
async fn test_bulk_update_skips_same_status_and_collapses_duplicates() {
    let h = Harness::new();
    let moving = h.seed(h.org, UserId::new(), ClaimStatus::Submitted).await;
    let already = h.seed(h.org, UserId::new(), ClaimStatus::UnderReview).await;

    let result = tenant::scope(
        h.admin(),
        h.service
            .bulk_update_status(vec![moving.id, already.id, moving.id], ClaimStatus::UnderReview),
    )
    .await
    .unwrap();

    assert_eq!(result.len(), 2);
    assert_eq!(result[0].id, moving.id);
    assert!(result.iter().all(|c| c.status == ClaimStatus::UnderReview));
    assert_eq!(h.store.snapshot(already.id).await.unwrap().updated_at, already.updated_at);
}

/// Store whose writes land just after a discharge reconciliation approved
/// every under_review claim of `patient`
struct ApprovedMidWrite {
    inner: InMemoryClaimStore,
    patient: UserId,
}

impl ApprovedMidWrite {
    async fn approve(&self, organization_id: OrganizationId) -> Result<(), PortError> {
        let discharge = ClaimTransition::new(ClaimStatus::UnderReview, ClaimStatus::Approved);
        self.inner
            .transition_by_patient(organization_id, self.patient, discharge, UserId::SYSTEM)
            .await
            .map(|_| ())
    }
}

impl DomainPort for ApprovedMidWrite {}

#[async_trait]
impl ClaimPort for ApprovedMidWrite {
    async fn insert(&self, org: OrganizationId, claim: NewClaim, actor: UserId) -> Result<Claim, PortError> {
        self.inner.insert(org, claim, actor).await
    }

    async fn find_by_id(&self, org: OrganizationId, id: ClaimId) -> Result<Option<Claim>, PortError> {
        self.inner.find_by_id(org, id).await
    }

    async fn find_many(&self, org: OrganizationId, ids: &[ClaimId]) -> Result<Vec<Claim>, PortError> {
        self.inner.find_many(org, ids).await
    }

    async fn list(&self, org: OrganizationId, query: &ClaimQuery) -> Result<Page<Claim>, PortError> {
        self.inner.list(org, query).await
    }

    async fn update(
        &self,
        org: OrganizationId,
        id: ClaimId,
        changes: &ClaimChanges,
        actor: UserId,
    ) -> Result<Option<Claim>, ClaimWriteError> {
        self.approve(org).await?;
        self.inner.update(org, id, changes, actor).await
    }

    async fn bulk_update_status(
        &self,
        org: OrganizationId,
        ids: &[ClaimId],
        status: ClaimStatus,
        actor: UserId,
    ) -> Result<Vec<Claim>, ClaimWriteError> {
        self.approve(org).await?;
        self.inner.bulk_update_status(org, ids, status, actor).await
    }

    async fn transition_by_patient(
        &self,
        org: OrganizationId,
        patient_id: UserId,
        transition: ClaimTransition,
        actor: UserId,
    ) -> Result<Vec<Claim>, PortError> {
        self.inner.transition_by_patient(org, patient_id, transition, actor).await
    }

    async fn audit_trail(&self, org: OrganizationId, id: ClaimId) -> Result<Vec<ClaimAudit>, PortError> {
        self.inner.audit_trail(org, id).await
    }
}

#[tokio::test]
async fn test_writes_racing_an_approval_are_rejected() {
    let h = Harness::new();
    let patient = UserId::new();
    let claim = h.seed(h.org, patient, ClaimStatus::UnderReview).await;
    let service = ClaimLifecycleService::new(
        Arc::new(ApprovedMidWrite { inner: h.store.clone(), patient }),
        CacheLayer::in_memory(),
    );

    let err = tenant::scope(h.admin(), service.update(claim.id, ClaimChanges::status(ClaimStatus::Rejected)))
        .await
        .unwrap_err();
    assert!(err.is_forbidden());
    assert_eq!(h.store.snapshot(claim.id).await.unwrap().status, ClaimStatus::Approved);

    // Back to under_review so the bulk pre-check passes again
    let mut reopened = h.store.snapshot(claim.id).await.unwrap();
    reopened.status = ClaimStatus::UnderReview;
    h.store.seed(reopened).await;

    let err = tenant::scope(h.admin(), service.bulk_update_status(vec![claim.id], ClaimStatus::Rejected))
        .await
        .unwrap_err();
    assert!(err.is_forbidden());
    assert!(err.to_string().contains(&claim.id.as_uuid().to_string()));
    assert_eq!(h.store.snapshot(claim.id).await.unwrap().status, ClaimStatus::Approved);
}

#[tokio::test]
async fn test_store_rechecks_transition_on_write() {
    let h = Harness::new();
    let claim = h.seed(h.org, UserId::new(), ClaimStatus::Submitted).await;

    let err = h
        .store
        .update(h.org, claim.id, &ClaimChanges::status(ClaimStatus::Paid), UserId::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ClaimWriteError::Rejected { claim_id, .. } if claim_id == claim.id));
    assert_eq!(h.store.snapshot(claim.id).await.unwrap().status, ClaimStatus::Submitted);
}

#[tokio::test]
async fn test_list_forces_patient_scope() {
    let h = Harness::new();
    let me = UserId::new();
    h.seed(h.org, me, ClaimStatus::Submitted).await;
    h.seed(h.org, me, ClaimStatus::Rejected).await;
    h.seed(h.org, UserId::new(), ClaimStatus::Submitted).await;

    let query = ClaimQuery {
        patient_id: Some(UserId::new()),
        ..Default::default()
    };
    let page = tenant::scope(h.as_role(me, Role::Patient), h.service.list(query))
        .await
        .unwrap();

    assert_eq!(page.total, 2);
    assert!(page.data.iter().all(|c| c.patient_id == me));
}

#[tokio::test]
async fn test_create_invalidates_list_cache() {
    let h = Harness::new();
    let ctx = h.admin();

    tenant::scope(ctx, async {
        let before = h.service.list(ClaimQuery::default()).await.unwrap();
        assert_eq!(before.total, 0);

        h.service.create(new_claim(UserId::new())).await.unwrap();

        let after = h.service.list(ClaimQuery::default()).await.unwrap();
        assert_eq!(after.total, 1);
    })
    .await;
}

#[tokio::test]
async fn test_audit_trail_records_every_write() {
    let h = Harness::new();

    let trail = tenant::scope(h.admin(), async {
        let claim = h.service.create(new_claim(UserId::new())).await.unwrap();
        h.service
            .update(claim.id, ClaimChanges::status(ClaimStatus::UnderReview))
            .await
            .unwrap();
        h.service.audit_trail(claim.id).await.unwrap()
    })
    .await;

    assert_eq!(trail.len(), 2);
    assert_eq!(trail[0].action, AuditAction::Insert);
    assert_eq!(trail[1].action, AuditAction::Update);
    assert_eq!(trail[1].new_values["status"], "under_review");
}

//! Claims handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use core_kernel::ClaimId;
use domain_claims::{ClaimChanges, ClaimQuery, NewClaim};

use crate::dto::claims::*;
use crate::dto::{CountedResponse, DataResponse};
use crate::error::ApiError;
use crate::extract::{ValidatedJson, ValidatedQuery};
use crate::AppState;

/// Creates a new claim in `submitted`
pub async fn create_claim(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<CreateClaimRequest>,
) -> Result<(StatusCode, Json<DataResponse<ClaimResponse>>), ApiError> {
    let claim = state.claims.create(NewClaim::from(request)).await?;
    Ok((StatusCode::CREATED, Json(DataResponse::new(claim.into()))))
}

/// Lists claims visible to the caller
pub async fn list_claims(
    State(state): State<AppState>,
    ValidatedQuery(params): ValidatedQuery<ListClaimsParams>,
) -> Result<Json<ClaimPageResponse>, ApiError> {
    let page = state.claims.list(ClaimQuery::from(params)).await?;
    Ok(Json(page.into()))
}

/// Gets a claim by ID
pub async fn get_claim(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<DataResponse<ClaimResponse>>, ApiError> {
    let claim = state.claims.get(ClaimId::from_uuid(id)).await?;
    Ok(Json(DataResponse::new(claim.into())))
}

/// Applies a partial update
pub async fn update_claim(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ValidatedJson(request): ValidatedJson<UpdateClaimRequest>,
) -> Result<Json<DataResponse<ClaimResponse>>, ApiError> {
    let claim = state
        .claims
        .update(ClaimId::from_uuid(id), ClaimChanges::from(request))
        .await?;
    Ok(Json(DataResponse::new(claim.into())))
}

/// Moves every listed claim to one status, all or nothing
pub async fn bulk_update_status(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<BulkStatusUpdateRequest>,
) -> Result<Json<CountedResponse<ClaimResponse>>, ApiError> {
    let claims = state
        .claims
        .bulk_update_status(request.ids(), request.status)
        .await?;
    Ok(Json(CountedResponse::new(
        claims.into_iter().map(ClaimResponse::from).collect(),
    )))
}

/// Change history of a claim
pub async fn audit_trail(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<CountedResponse<AuditResponse>>, ApiError> {
    let entries = state.claims.audit_trail(ClaimId::from_uuid(id)).await?;
    Ok(Json(CountedResponse::new(
        entries.into_iter().map(AuditResponse::from).collect(),
    )))
}

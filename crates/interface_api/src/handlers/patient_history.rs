//! Patient history handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use core_kernel::UserId;
use domain_events::{EventQuery, NewEvent};

use crate::dto::patient_history::*;
use crate::dto::{CountedResponse, DataResponse};
use crate::error::ApiError;
use crate::extract::{ValidatedJson, ValidatedQuery};
use crate::AppState;

/// Records an event and schedules its reconciliation
pub async fn create_event(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<CreateEventRequest>,
) -> Result<(StatusCode, Json<DataResponse<EventResponse>>), ApiError> {
    let event = state.history.create_event(NewEvent::from(request)).await?;
    Ok((StatusCode::CREATED, Json(DataResponse::new(event.into()))))
}

/// A patient's events, most recent first
pub async fn get_patient_history(
    State(state): State<AppState>,
    Path(patient_id): Path<Uuid>,
    ValidatedQuery(params): ValidatedQuery<HistoryParams>,
) -> Result<Json<CountedResponse<EventResponse>>, ApiError> {
    let events = state
        .history
        .get_patient_history(UserId::from_uuid(patient_id), EventQuery::from(params))
        .await?;
    Ok(Json(CountedResponse::new(
        events.into_iter().map(EventResponse::from).collect(),
    )))
}

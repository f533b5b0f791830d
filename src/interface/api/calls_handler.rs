//! Call API handlers

use super::dto::{
    ApiError, ApiResponse, CallCreatedResponse, CallsResponse, IncomingCallRequest,
    PlaceCallRequest,
};
use super::state::AppState;
use crate::domain::call::CallSnapshot;
use crate::domain::shared::error::DomainError;
use crate::domain::shared::value_objects::SessionId;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use tracing::info;
use uuid::Uuid;

/// Registry snapshot
pub async fn list_calls(State(state): State<AppState>) -> Json<ApiResponse<CallsResponse>> {
    let calls = state.broker.snapshot();
    let conferences = state.broker.conference_snapshots();
    let total = calls.len();
    Json(ApiResponse::success(CallsResponse {
        calls,
        conferences,
        total,
    }))
}

pub async fn get_call(
    State(state): State<AppState>,
    Path(call_id): Path<Uuid>,
) -> Result<Json<ApiResponse<CallSnapshot>>, ApiError> {
    let call_id = SessionId::from_uuid(call_id);
    state
        .broker
        .call(&call_id)
        .map(|call| Json(ApiResponse::success(call)))
        .ok_or(ApiError(DomainError::NoSuchSession(call_id)))
}

pub async fn place_call(
    State(state): State<AppState>,
    Json(request): Json<PlaceCallRequest>,
) -> Result<(StatusCode, Json<ApiResponse<CallCreatedResponse>>), ApiError> {
    info!("API: Placing call to {}", request.address);
    let call_id = state
        .intents
        .place_call(&request.address, request.account.as_ref())
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(CallCreatedResponse { call_id })),
    ))
}

pub async fn incoming_call(
    State(state): State<AppState>,
    Json(request): Json<IncomingCallRequest>,
) -> Result<(StatusCode, Json<ApiResponse<CallCreatedResponse>>), ApiError> {
    info!("API: Incoming call from {} on {}", request.address, request.account);
    let call_id = state
        .intents
        .process_incoming_call(&request.account, &request.address)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(CallCreatedResponse { call_id })),
    ))
}

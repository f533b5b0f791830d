//! Account management API handlers

use super::dto::{AccountDto, AccountsQuery, ApiError, ApiResponse, RegisterAccountRequest};
use super::state::AppState;
use crate::domain::shared::value_objects::AccountHandle;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use tracing::info;

/// List accounts, optionally filtered by scheme
pub async fn list_accounts(
    State(state): State<AppState>,
    Query(query): Query<AccountsQuery>,
) -> Json<ApiResponse<Vec<AccountDto>>> {
    let default = state.accounts.default_outgoing();
    let default = default.as_ref().map(|account| account.handle());
    let accounts = state
        .accounts
        .list(query.scheme.as_deref())
        .iter()
        .map(|account| AccountDto::from_account(account, default))
        .collect();
    Json(ApiResponse::success(accounts))
}

pub async fn register_account(
    State(state): State<AppState>,
    Json(request): Json<RegisterAccountRequest>,
) -> Result<(StatusCode, Json<ApiResponse<AccountDto>>), ApiError> {
    let account = request.into_account()?;
    info!("API: Registering account {}", account.handle());

    let dto = AccountDto::from_account(&account, None);
    let status = match state.accounts.register(account) {
        Some(_) => StatusCode::OK,
        None => StatusCode::CREATED,
    };
    Ok((status, Json(ApiResponse::success(dto))))
}

pub async fn unregister_account(
    State(state): State<AppState>,
    Path((provider_id, account_id)): Path<(String, String)>,
) -> Result<Json<ApiResponse<AccountDto>>, ApiError> {
    let handle = AccountHandle::new(provider_id, account_id);
    info!("API: Unregistering account {}", handle);

    let removed = state.accounts.unregister(&handle)?;
    Ok(Json(ApiResponse::success(AccountDto::from_account(
        &removed, None,
    ))))
}

pub async fn set_default_account(
    State(state): State<AppState>,
    Json(handle): Json<AccountHandle>,
) -> Result<Json<ApiResponse<AccountHandle>>, ApiError> {
    state.accounts.set_default_outgoing(&handle)?;
    Ok(Json(ApiResponse::success(handle)))
}

//! Request and response bodies

use crate::domain::account::{Account, AccountCapabilities};
use crate::domain::call::{CallSnapshot, ConferenceSnapshot};
use crate::domain::shared::error::DomainError;
use crate::domain::shared::value_objects::{AccountHandle, SessionId};
use axum::{http::StatusCode, response::IntoResponse, response::Response, Json};
use serde::{Deserialize, Serialize};

/// Generic API response
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            code: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            code: None,
        }
    }
}

/// A domain error rendered as an API response
#[derive(Debug)]
pub struct ApiError(pub DomainError);

impl From<DomainError> for ApiError {
    fn from(error: DomainError) -> Self {
        Self(error)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            DomainError::NoSuchSession(_)
            | DomainError::NoSuchConference(_)
            | DomainError::UnknownAccount(_) => StatusCode::NOT_FOUND,
            DomainError::InvalidAddress(_) | DomainError::ValidationError(_) => {
                StatusCode::BAD_REQUEST
            }
            DomainError::NoMatchingAccount(_) => StatusCode::UNPROCESSABLE_ENTITY,
            DomainError::SessionNotActive(_)
            | DomainError::InvalidStateTransition(_)
            | DomainError::RingingConflict { .. }
            | DomainError::ControllerDetached(_) => StatusCode::CONFLICT,
            DomainError::ProviderNotBound(_)
            | DomainError::ProviderLost(_)
            | DomainError::BrokerUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            DomainError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(self.0.to_string()),
            code: Some(self.0.code().to_string()),
        };
        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AccountDto {
    pub provider_id: String,
    pub account_id: String,
    pub label: String,
    pub schemes: Vec<String>,
    pub capabilities: u32,
    #[serde(default)]
    pub is_default: bool,
}

impl AccountDto {
    pub fn from_account(account: &Account, default: Option<&AccountHandle>) -> Self {
        Self {
            provider_id: account.provider_id().to_string(),
            account_id: account.handle().account_id.clone(),
            label: account.label().to_string(),
            schemes: account.supported_schemes().iter().cloned().collect(),
            capabilities: account.capabilities().bits(),
            is_default: default == Some(account.handle()),
        }
    }
}

/// Body of `POST /accounts`
#[derive(Debug, Deserialize)]
pub struct RegisterAccountRequest {
    pub provider_id: String,
    pub account_id: String,
    pub label: Option<String>,
    pub schemes: Vec<String>,
    /// Raw capability bits; call-capable when absent
    pub capabilities: Option<u32>,
}

impl RegisterAccountRequest {
    pub fn into_account(self) -> Result<Account, DomainError> {
        if self.provider_id.trim().is_empty() || self.account_id.trim().is_empty() {
            return Err(DomainError::ValidationError(
                "provider_id and account_id are required".to_string(),
            ));
        }
        let handle = AccountHandle::new(self.provider_id, self.account_id);
        let label = self.label.unwrap_or_else(|| handle.account_id.clone());
        let capabilities = self
            .capabilities
            .map_or(AccountCapabilities::CALL_PROVIDER, AccountCapabilities::from_bits);
        Ok(Account::new(handle, label)
            .with_schemes(self.schemes)
            .with_capabilities(capabilities))
    }
}

#[derive(Debug, Deserialize)]
pub struct AccountsQuery {
    pub scheme: Option<String>,
}

/// Body of `POST /calls`
#[derive(Debug, Deserialize)]
pub struct PlaceCallRequest {
    pub address: String,
    pub account: Option<AccountHandle>,
}

/// Body of `POST /calls/incoming`
#[derive(Debug, Deserialize)]
pub struct IncomingCallRequest {
    pub account: AccountHandle,
    pub address: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CallCreatedResponse {
    pub call_id: SessionId,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CallsResponse {
    pub calls: Vec<CallSnapshot>,
    pub conferences: Vec<ConferenceSnapshot>,
    pub total: usize,
}

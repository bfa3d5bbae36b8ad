use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use contracts::domain::a030_returns_charge::ReturnStatus;
use thiserror::Error;
use uuid::Uuid;

/// Ошибки домена возвратов
#[derive(Debug, Error)]
pub enum ReturnsError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid transition: {current} -> {requested}")]
    InvalidTransition {
        current: ReturnStatus,
        requested: ReturnStatus,
    },

    #[error("Record {id} was modified concurrently, re-read and retry")]
    ConcurrentModification { id: Uuid },

    #[error("No return policy found: {0}")]
    PolicyNotFound(String),

    #[error("Return policy {policy_id} is not active at {at}")]
    PolicyExpired { policy_id: String, at: DateTime<Utc> },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("External service error: {0}")]
    ExternalService(String),

    #[error("Storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

pub type ReturnsResult<T> = Result<T, ReturnsError>;

impl ReturnsError {
    pub fn validation(message: impl Into<String>) -> Self {
        ReturnsError::Validation(message.into())
    }

    /// Стабильный код ошибки для клиентов
    pub fn code(&self) -> &'static str {
        match self {
            ReturnsError::Validation(_) => "validation_error",
            ReturnsError::InvalidTransition { .. } => "invalid_transition",
            ReturnsError::ConcurrentModification { .. } => "concurrent_modification",
            ReturnsError::PolicyNotFound(_) => "policy_not_found",
            ReturnsError::PolicyExpired { .. } => "policy_expired",
            ReturnsError::NotFound(_) => "not_found",
            ReturnsError::ExternalService(_) => "external_service_error",
            ReturnsError::Storage(_) => "storage_error",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ReturnsError::Validation(_) => StatusCode::BAD_REQUEST,
            ReturnsError::NotFound(_) => StatusCode::NOT_FOUND,
            ReturnsError::InvalidTransition { .. } | ReturnsError::ConcurrentModification { .. } => {
                StatusCode::CONFLICT
            }
            ReturnsError::PolicyNotFound(_) | ReturnsError::PolicyExpired { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ReturnsError::ExternalService(_) => StatusCode::BAD_GATEWAY,
            ReturnsError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<sea_orm::DbErr> for ReturnsError {
    fn from(e: sea_orm::DbErr) -> Self {
        ReturnsError::Storage(e.into())
    }
}

impl From<serde_json::Error> for ReturnsError {
    fn from(e: serde_json::Error) -> Self {
        ReturnsError::Storage(e.into())
    }
}

impl IntoResponse for ReturnsError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("{}", self);
        } else {
            tracing::warn!("{}", self);
        }

        let mut body = serde_json::json!({
            "error": self.code(),
            "message": self.to_string(),
        });
        if let ReturnsError::InvalidTransition { current, requested } = &self {
            body["current_status"] = serde_json::json!(current);
            body["requested_status"] = serde_json::json!(requested);
        }

        (status, Json(body)).into_response()
    }
}

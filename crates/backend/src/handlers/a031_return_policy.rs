use axum::{
    extract::{Path, State},
    Json,
};
use contracts::domain::a031_return_policy::aggregate::{CreateReturnPolicyRequest, ReturnPolicy};

use crate::routes::AppState;
use crate::shared::error::ReturnsError;

/// GET /api/a031/return-policies
pub async fn list_all(State(state): State<AppState>) -> Result<Json<Vec<ReturnPolicy>>, ReturnsError> {
    Ok(Json(state.policies.list().await?))
}

/// POST /api/a031/return-policies
pub async fn create(
    State(state): State<AppState>,
    Json(request): Json<CreateReturnPolicyRequest>,
) -> Result<Json<ReturnPolicy>, ReturnsError> {
    Ok(Json(state.policies.create_policy(request).await?))
}

/// GET /api/a031/return-policies/:id
pub async fn get_by_id(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ReturnPolicy>, ReturnsError> {
    Ok(Json(state.policies.get_by_id(&id).await?))
}

/// POST /api/a031/return-policies/:id/activate
pub async fn activate(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ReturnPolicy>, ReturnsError> {
    Ok(Json(state.policies.set_active(&id, true).await?))
}

/// POST /api/a031/return-policies/:id/deactivate
pub async fn deactivate(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ReturnPolicy>, ReturnsError> {
    Ok(Json(state.policies.set_active(&id, false).await?))
}

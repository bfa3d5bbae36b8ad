use axum::{
    extract::{Query, State},
    Json,
};
use contracts::dashboards::d402_returns_dashboard::{ReturnsDashboardData, ReturnsDashboardRequest};

use crate::routes::AppState;
use crate::shared::error::ReturnsError;

/// GET /api/d402/returns_dashboard?date_from=2024-06-01&date_to=2024-06-30
pub async fn get_returns_dashboard(
    State(state): State<AppState>,
    Query(request): Query<ReturnsDashboardRequest>,
) -> Result<Json<ReturnsDashboardData>, ReturnsError> {
    tracing::info!(
        "D402 Dashboard: period {:?}..{:?}, reason {:?}, resolution {:?}",
        request.date_from,
        request.date_to,
        request.return_reason,
        request.resolution_type
    );

    let data = state.returns.get_returns_dashboard(&request).await?;
    tracing::info!(
        "D402 Dashboard: {} returns, {} fraud alerts, {} delayed",
        data.total_returns,
        data.fraud_alerts.len(),
        data.delayed_processing.len()
    );
    Ok(Json(data))
}

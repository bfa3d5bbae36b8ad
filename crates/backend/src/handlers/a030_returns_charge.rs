use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::NaiveDate;
use contracts::domain::a030_returns_charge::aggregate::{
    CompleteInspectionRequest, CostBreakdown, CostCalculationRequest, CreateReturnsChargeRequest,
    ProcessRefundRequest, RecordLogisticsEventsRequest, ReturnsCharge, UpdateReturnStatusRequest,
    VendorRecoveryRequest,
};
use contracts::domain::a030_returns_charge::vendor_claim::{VendorClaimRequest, VendorClaimStatus};
use serde::Deserialize;

use crate::domain::a030_returns_charge::cost_calculator::parse_reason;
use crate::domain::a030_returns_charge::lifecycle::parse_status;
use crate::domain::a030_returns_charge::repository::ReturnsChargeFilter;
use crate::routes::AppState;
use crate::shared::error::ReturnsError;

#[derive(Debug, Deserialize, Default)]
pub struct ListQuery {
    pub status: Option<String>,
    pub return_reason: Option<String>,
    pub customer_id: Option<String>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    #[serde(default)]
    pub include_archived: bool,
}

impl ListQuery {
    fn into_filter(self) -> Result<ReturnsChargeFilter, ReturnsError> {
        let status = match self.status.as_deref().filter(|s| !s.is_empty()) {
            Some(code) => Some(parse_status(code)?),
            None => None,
        };
        let return_reason = match self.return_reason.as_deref().filter(|s| !s.is_empty()) {
            Some(code) => Some(parse_reason(code)?),
            None => None,
        };
        Ok(ReturnsChargeFilter {
            date_from: self.date_from,
            date_to: self.date_to,
            status,
            return_reason,
            customer_id: self.customer_id.filter(|s| !s.is_empty()),
            include_archived: self.include_archived,
        })
    }
}

/// POST /api/a030/returns/calculate
pub async fn calculate(
    State(state): State<AppState>,
    Json(request): Json<CostCalculationRequest>,
) -> Result<Json<CostBreakdown>, ReturnsError> {
    Ok(Json(state.returns.calculate_return_costs(&request).await?))
}

/// GET /api/a030/returns
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<ReturnsCharge>>, ReturnsError> {
    let filter = query.into_filter()?;
    let items = state.returns.list(&filter).await?;
    tracing::info!("A030: returning {} returns", items.len());
    Ok(Json(items))
}

/// POST /api/a030/returns
pub async fn create(
    State(state): State<AppState>,
    Json(request): Json<CreateReturnsChargeRequest>,
) -> Result<Json<ReturnsCharge>, ReturnsError> {
    Ok(Json(state.returns.create_returns_charge(request).await?))
}

/// GET /api/a030/returns/:id
pub async fn get_by_id(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ReturnsCharge>, ReturnsError> {
    Ok(Json(state.returns.get_by_id(&id).await?))
}

/// POST /api/a030/returns/:id/status
pub async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<UpdateReturnStatusRequest>,
) -> Result<Json<ReturnsCharge>, ReturnsError> {
    Ok(Json(state.returns.update_return_status(&id, request).await?))
}

/// POST /api/a030/returns/:id/inspection
pub async fn complete_inspection(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<CompleteInspectionRequest>,
) -> Result<Json<ReturnsCharge>, ReturnsError> {
    Ok(Json(state.returns.complete_inspection(&id, request).await?))
}

/// POST /api/a030/returns/:id/refund
pub async fn process_refund(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<ProcessRefundRequest>,
) -> Result<Json<ReturnsCharge>, ReturnsError> {
    Ok(Json(state.returns.process_refund(&id, request).await?))
}

/// POST /api/a030/returns/:id/archive
pub async fn archive(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ReturnsCharge>, ReturnsError> {
    Ok(Json(state.returns.archive(&id).await?))
}

/// POST /api/a030/returns/:id/logistics-events
pub async fn record_logistics_events(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<RecordLogisticsEventsRequest>,
) -> Result<Json<ReturnsCharge>, ReturnsError> {
    Ok(Json(state.returns.record_logistics_events(&id, request).await?))
}

/// POST /api/a030/returns/:id/vendor-claim
pub async fn submit_vendor_claim(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<VendorClaimRequest>,
) -> Result<Json<ReturnsCharge>, ReturnsError> {
    Ok(Json(state.returns.submit_vendor_claim(&id, request).await?))
}

/// POST /api/a030/returns/:id/vendor-recovery
pub async fn record_vendor_recovery(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<VendorRecoveryRequest>,
) -> Result<Json<ReturnsCharge>, ReturnsError> {
    Ok(Json(state.returns.record_vendor_recovery(&id, request).await?))
}

/// GET /api/a030/vendor-claims/:claim_id
pub async fn get_vendor_claim_status(
    State(state): State<AppState>,
    Path(claim_id): Path<String>,
) -> Result<Json<VendorClaimStatus>, ReturnsError> {
    Ok(Json(state.returns.get_vendor_claim_status(&claim_id).await?))
}

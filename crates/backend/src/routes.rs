use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::domain::a030_returns_charge::service::ReturnsService;
use crate::domain::a031_return_policy::service::ReturnPolicyService;
use crate::handlers;

/// Общее состояние для хендлеров
#[derive(Clone)]
pub struct AppState {
    pub returns: Arc<ReturnsService>,
    pub policies: Arc<ReturnPolicyService>,
}

/// Конфигурация всех роутов приложения
pub fn configure_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        // ========================================
        // A030 Returns charge
        // ========================================
        .route(
            "/api/a030/returns/calculate",
            post(handlers::a030_returns_charge::calculate),
        )
        .route(
            "/api/a030/returns",
            get(handlers::a030_returns_charge::list).post(handlers::a030_returns_charge::create),
        )
        .route(
            "/api/a030/returns/:id",
            get(handlers::a030_returns_charge::get_by_id),
        )
        .route(
            "/api/a030/returns/:id/status",
            post(handlers::a030_returns_charge::update_status),
        )
        .route(
            "/api/a030/returns/:id/inspection",
            post(handlers::a030_returns_charge::complete_inspection),
        )
        .route(
            "/api/a030/returns/:id/refund",
            post(handlers::a030_returns_charge::process_refund),
        )
        .route(
            "/api/a030/returns/:id/archive",
            post(handlers::a030_returns_charge::archive),
        )
        .route(
            "/api/a030/returns/:id/logistics-events",
            post(handlers::a030_returns_charge::record_logistics_events),
        )
        .route(
            "/api/a030/returns/:id/vendor-claim",
            post(handlers::a030_returns_charge::submit_vendor_claim),
        )
        .route(
            "/api/a030/returns/:id/vendor-recovery",
            post(handlers::a030_returns_charge::record_vendor_recovery),
        )
        .route(
            "/api/a030/vendor-claims/:claim_id",
            get(handlers::a030_returns_charge::get_vendor_claim_status),
        )
        // ========================================
        // A031 Return policy
        // ========================================
        .route(
            "/api/a031/return-policies",
            get(handlers::a031_return_policy::list_all).post(handlers::a031_return_policy::create),
        )
        .route(
            "/api/a031/return-policies/:id",
            get(handlers::a031_return_policy::get_by_id),
        )
        .route(
            "/api/a031/return-policies/:id/activate",
            post(handlers::a031_return_policy::activate),
        )
        .route(
            "/api/a031/return-policies/:id/deactivate",
            post(handlers::a031_return_policy::deactivate),
        )
        // ========================================
        // D402 Returns dashboard
        // ========================================
        .route(
            "/api/d402/returns_dashboard",
            get(handlers::d402_returns_dashboard::get_returns_dashboard),
        )
        .with_state(state)
}

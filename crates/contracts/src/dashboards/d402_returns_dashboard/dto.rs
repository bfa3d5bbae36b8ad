use crate::domain::a030_returns_charge::aggregate::{ResolutionType, ReturnReason};
use crate::domain::a030_returns_charge::lifecycle::ReturnStatus;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Request for returns dashboard
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReturnsDashboardRequest {
    /// Inclusive, by return_initiated_date
    #[serde(default)]
    pub date_from: Option<NaiveDate>,
    /// Inclusive, by return_initiated_date
    #[serde(default)]
    pub date_to: Option<NaiveDate>,
    #[serde(default)]
    pub return_reason: Option<ReturnReason>,
    #[serde(default)]
    pub resolution_type: Option<ResolutionType>,
    /// Момент расчёта days_pending, по умолчанию текущее время
    #[serde(default)]
    pub as_of: Option<DateTime<Utc>>,
}

/// Response for returns dashboard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnsDashboardData {
    pub total_returns: usize,
    pub total_return_value: f64,
    pub total_refunded: f64,
    pub total_vendor_claims: f64,
    pub total_net_loss: f64,
    pub manual_review_count: usize,
    /// Every status, zero-filled
    pub status_distribution: BTreeMap<ReturnStatus, usize>,
    /// Only charges with a resolution
    pub resolution_distribution: BTreeMap<ResolutionType, usize>,
    pub top_return_reasons: Vec<ReasonStat>,
    pub return_trends: Vec<TrendPoint>,
    pub fraud_alerts: Vec<FraudAlert>,
    pub delayed_processing: Vec<DelayedReturn>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasonStat {
    pub reason: ReturnReason,
    pub count: usize,
    /// count / total_returns × 100
    pub percentage: f64,
    pub total_value: f64,
}

/// Daily bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendPoint {
    pub date: NaiveDate,
    pub count: usize,
    pub total_value: f64,
    /// (refunded + closed) / count
    pub resolution_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FraudAlert {
    pub return_id: String,
    pub code: String,
    pub customer_id: String,
    pub fraud_risk_score: f64,
    pub fraud_indicators: Vec<String>,
    pub current_status: ReturnStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelayedReturn {
    pub return_id: String,
    pub code: String,
    pub current_status: ReturnStatus,
    pub days_pending: i64,
    pub max_processing_days: i64,
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Запрос на подачу претензии поставщику по возврату
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VendorClaimRequest {
    pub vendor_id: String,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub actor: Option<String>,
}

/// Тело запроса во внешнюю систему претензий
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VendorClaimSubmission {
    pub return_id: String,
    pub return_code: String,
    pub vendor_id: String,
    pub order_id: String,
    pub return_reason: String,
    pub amount: f64,
    pub product_ids: Vec<i64>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Ответ внешней системы на подачу претензии
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VendorClaimReceipt {
    pub claim_id: String,
    pub status: String,
}

/// Статус претензии во внешней системе
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VendorClaimStatus {
    pub claim_id: String,
    pub status: String,
    #[serde(default)]
    pub approved_amount: Option<f64>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

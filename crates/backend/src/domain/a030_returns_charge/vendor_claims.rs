use async_trait::async_trait;
use contracts::domain::a030_returns_charge::vendor_claim::{
    VendorClaimReceipt, VendorClaimStatus, VendorClaimSubmission,
};
use std::sync::Arc;
use std::time::Duration;

use crate::shared::config::VendorClaimsConfig;
use crate::shared::error::{ReturnsError, ReturnsResult};

/// Имя внешней системы в журнале сбоев
pub const COLLABORATOR: &str = "vendor_claims";

/// Клиент внешней системы претензий поставщикам
#[async_trait]
pub trait VendorClaimsClient: Send + Sync {
    /// Подать претензию
    async fn submit_claim(&self, submission: &VendorClaimSubmission)
        -> ReturnsResult<VendorClaimReceipt>;

    /// Текущий статус претензии
    async fn claim_status(&self, claim_id: &str) -> ReturnsResult<VendorClaimStatus>;
}

/// Клиент по конфигурации: HTTP, если задан base_url, иначе заглушка с ошибкой
pub fn build_client(config: &VendorClaimsConfig) -> ReturnsResult<Arc<dyn VendorClaimsClient>> {
    match config.base_url.as_deref().map(str::trim) {
        Some(base_url) if !base_url.is_empty() => Ok(Arc::new(HttpVendorClaimsClient::new(
            base_url.to_string(),
            config.api_key.clone(),
            config.timeout_secs,
        )?)),
        _ => {
            tracing::warn!("Vendor claims integration is disabled (vendor_claims.base_url is not set)");
            Ok(Arc::new(DisabledVendorClaimsClient))
        }
    }
}

/// HTTP клиент (JSON API)
pub struct HttpVendorClaimsClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpVendorClaimsClient {
    pub fn new(base_url: String, api_key: Option<String>, timeout_secs: u64) -> ReturnsResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| {
                ReturnsError::ExternalService(format!("Ошибка создания HTTP клиента: {}", e))
            })?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// claim_id кодируется как один сегмент пути
    fn claim_url(&self, claim_id: &str) -> String {
        self.url(&format!("claims/{}", urlencoding::encode(claim_id)))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    async fn read_json<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
        url: &str,
    ) -> ReturnsResult<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ReturnsError::ExternalService(format!(
                "{} returned HTTP {}: {}",
                url,
                status.as_u16(),
                body
            )));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| ReturnsError::ExternalService(format!("Invalid response from {}: {}", url, e)))
    }
}

fn describe_request_error(e: &reqwest::Error, url: &str) -> ReturnsError {
    let message = if e.is_timeout() {
        format!("Timeout calling {}", url)
    } else if e.is_connect() {
        format!("Cannot connect to {}: {}", url, e)
    } else {
        format!("Request to {} failed: {}", url, e)
    };
    ReturnsError::ExternalService(message)
}

#[async_trait]
impl VendorClaimsClient for HttpVendorClaimsClient {
    async fn submit_claim(
        &self,
        submission: &VendorClaimSubmission,
    ) -> ReturnsResult<VendorClaimReceipt> {
        let url = self.url("claims");
        tracing::info!(
            "Submitting vendor claim for return {} to {}",
            submission.return_code,
            url
        );
        let response = self
            .authorize(self.client.post(&url).json(submission))
            .send()
            .await
            .map_err(|e| describe_request_error(&e, &url))?;
        Self::read_json(response, &url).await
    }

    async fn claim_status(&self, claim_id: &str) -> ReturnsResult<VendorClaimStatus> {
        let url = self.claim_url(claim_id);
        let response = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .map_err(|e| describe_request_error(&e, &url))?;
        Self::read_json(response, &url).await
    }
}

/// Интеграция не настроена
pub struct DisabledVendorClaimsClient;

#[async_trait]
impl VendorClaimsClient for DisabledVendorClaimsClient {
    async fn submit_claim(
        &self,
        _submission: &VendorClaimSubmission,
    ) -> ReturnsResult<VendorClaimReceipt> {
        Err(ReturnsError::ExternalService(
            "Vendor claims integration is not configured".into(),
        ))
    }

    async fn claim_status(&self, _claim_id: &str) -> ReturnsResult<VendorClaimStatus> {
        Err(ReturnsError::ExternalService(
            "Vendor claims integration is not configured".into(),
        ))
    }
}

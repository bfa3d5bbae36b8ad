use chrono::{DateTime, Utc};
use contracts::domain::a031_return_policy::aggregate::{CreateReturnPolicyRequest, ReturnPolicy};
use std::collections::HashMap;
use uuid::Uuid;

use super::repository::ReturnPolicyRepository;
use crate::shared::error::{ReturnsError, ReturnsResult};

const MAX_VERSION_ATTEMPTS: u32 = 3;

fn parse_policy_id(id: &str) -> ReturnsResult<Uuid> {
    Uuid::parse_str(id.trim())
        .map_err(|_| ReturnsError::validation(format!("Invalid policy_id: '{}'", id)))
}

/// Версионированные политики возвратов
#[derive(Clone)]
pub struct ReturnPolicyService {
    repo: ReturnPolicyRepository,
}

impl ReturnPolicyService {
    pub fn new(repo: ReturnPolicyRepository) -> Self {
        Self { repo }
    }

    /// Создать новую версию политики
    ///
    /// Правила существующих версий не меняются, поэтому изменения
    /// оформляются новой версией с тем же кодом.
    pub async fn create_policy(&self, request: CreateReturnPolicyRequest) -> ReturnsResult<ReturnPolicy> {
        let code = request.code.trim().to_string();
        let mut policy = ReturnPolicy::new_for_insert(
            code,
            request.description,
            0,
            request.rules,
            request.effective_from,
            request.effective_until,
        );

        let mut attempt = 1;
        loop {
            policy.version_no = self.repo.next_version_no(&policy.base.code).await?;
            policy.validate().map_err(ReturnsError::Validation)?;
            if !(0.0..=100.0).contains(&policy.rules.fraud_check_threshold) {
                return Err(ReturnsError::validation(
                    "fraud_check_threshold должен быть в диапазоне 0..100",
                ));
            }
            policy.before_write();

            match self.repo.insert(&policy).await {
                Ok(()) => break,
                // номер версии занят параллельной вставкой
                Err(ReturnsError::ConcurrentModification { .. })
                    if attempt < MAX_VERSION_ATTEMPTS =>
                {
                    tracing::warn!(
                        "Return policy {} v{} already exists, retrying",
                        policy.base.code,
                        policy.version_no
                    );
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
        tracing::info!(
            "Created return policy {} v{} ({})",
            policy.base.code,
            policy.version_no,
            policy.to_string_id()
        );
        Ok(policy)
    }

    pub async fn get_by_id(&self, id: &str) -> ReturnsResult<ReturnPolicy> {
        let uuid = parse_policy_id(id)?;
        self.repo
            .get_by_id(uuid)
            .await?
            .ok_or_else(|| ReturnsError::PolicyNotFound(id.to_string()))
    }

    pub async fn list(&self) -> ReturnsResult<Vec<ReturnPolicy>> {
        self.repo.list_all().await
    }

    /// Политика для расчёта: явно указанная или действующая на дату
    ///
    /// Активность явно указанной политики проверяет калькулятор.
    pub async fn resolve(
        &self,
        policy_id: Option<&str>,
        at: DateTime<Utc>,
    ) -> ReturnsResult<ReturnPolicy> {
        match policy_id {
            Some(id) if !id.trim().is_empty() => self.get_by_id(id).await,
            _ => self.find_active_at(at).await,
        }
    }

    /// Действующая на дату политика
    pub async fn find_active_at(&self, at: DateTime<Utc>) -> ReturnsResult<ReturnPolicy> {
        self.repo.find_active_at(at).await?.ok_or_else(|| {
            ReturnsError::PolicyNotFound(format!("no active return policy at {}", at))
        })
    }

    /// Включить или выключить версию политики
    pub async fn set_active(&self, id: &str, is_active: bool) -> ReturnsResult<ReturnPolicy> {
        let mut policy = self.get_by_id(id).await?;
        if policy.is_active == is_active {
            return Ok(policy);
        }
        let expected_version = policy.base.metadata.version;
        policy.is_active = is_active;
        policy.base.metadata.increment_version();
        policy.before_write();
        self.repo.update(&policy, expected_version).await?;

        tracing::info!(
            "Return policy {} v{} is now {}",
            policy.base.code,
            policy.version_no,
            if is_active { "active" } else { "inactive" }
        );
        Ok(policy)
    }

    /// max_processing_days по id версии (для дашборда)
    pub async fn processing_limits(&self) -> ReturnsResult<HashMap<String, i64>> {
        Ok(self
            .repo
            .list_all()
            .await?
            .into_iter()
            .map(|p| (p.to_string_id(), p.rules.max_processing_days))
            .collect())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::shared::data::db::connect_in_memory;
    use chrono::Duration;
    use contracts::domain::a030_returns_charge::aggregate::ItemCondition;
    use contracts::domain::a031_return_policy::{ReturnPolicyRules, ShippingPayer};

    pub(crate) fn standard_rules() -> ReturnPolicyRules {
        ReturnPolicyRules {
            return_window_days: 30,
            restocking_fee_percentage: 10.0,
            minimum_restocking_fee: 200.0,
            return_shipping_paid_by: ShippingPayer::Customer,
            auto_approve_conditions: vec![
                ItemCondition::New,
                ItemCondition::LikeNew,
                ItemCondition::Good,
            ],
            fraud_check_threshold: 70.0,
            max_processing_days: 5,
        }
    }

    pub(crate) fn standard_request(effective_from: DateTime<Utc>) -> CreateReturnPolicyRequest {
        CreateReturnPolicyRequest {
            code: "STD".into(),
            description: "Стандартная политика".into(),
            rules: standard_rules(),
            effective_from,
            effective_until: None,
        }
    }

    async fn service() -> ReturnPolicyService {
        let db = connect_in_memory().await.unwrap();
        ReturnPolicyService::new(ReturnPolicyRepository::new(db))
    }

    #[tokio::test]
    async fn test_versions_are_numbered_per_code() {
        let svc = service().await;
        let from = Utc::now() - Duration::days(30);

        let v1 = svc.create_policy(standard_request(from)).await.unwrap();
        let v2 = svc.create_policy(standard_request(from + Duration::days(10))).await.unwrap();

        assert_eq!(v1.version_no, 1);
        assert_eq!(v2.version_no, 2);
        assert_eq!(svc.list().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_versions_of_one_code_both_succeed() {
        let svc = service().await;
        let from = Utc::now() - Duration::days(1);
        let (a, b) = tokio::join!(
            svc.create_policy(standard_request(from)),
            svc.create_policy(standard_request(from))
        );
        let mut versions = vec![a.unwrap().version_no, b.unwrap().version_no];
        versions.sort();
        assert_eq!(versions, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_duplicate_version_is_concurrent_modification() {
        let db = connect_in_memory().await.unwrap();
        let repo = ReturnPolicyRepository::new(db);
        let first = ReturnPolicy::new_for_insert(
            "STD".into(),
            "Стандартная".into(),
            1,
            standard_rules(),
            Utc::now(),
            None,
        );
        repo.insert(&first).await.unwrap();

        let duplicate = ReturnPolicy::new_for_insert(
            "STD".into(),
            "Стандартная".into(),
            1,
            standard_rules(),
            Utc::now(),
            None,
        );
        let err = repo.insert(&duplicate).await.unwrap_err();
        assert!(matches!(err, ReturnsError::ConcurrentModification { .. }));
    }

    #[tokio::test]
    async fn test_resolve_picks_latest_active_version() {
        let svc = service().await;
        let now = Utc::now();
        let v1 = svc
            .create_policy(standard_request(now - Duration::days(30)))
            .await
            .unwrap();
        let v2 = svc
            .create_policy(standard_request(now - Duration::days(5)))
            .await
            .unwrap();

        let resolved = svc.resolve(None, now).await.unwrap();
        assert_eq!(resolved.base.id, v2.base.id);

        let earlier = svc.resolve(None, now - Duration::days(10)).await.unwrap();
        assert_eq!(earlier.base.id, v1.base.id);

        svc.set_active(&v2.to_string_id(), false).await.unwrap();
        let resolved = svc.resolve(None, now).await.unwrap();
        assert_eq!(resolved.base.id, v1.base.id);
    }

    #[tokio::test]
    async fn test_resolve_errors() {
        let svc = service().await;
        let err = svc.resolve(None, Utc::now()).await.unwrap_err();
        assert!(matches!(err, ReturnsError::PolicyNotFound(_)));

        let missing = Uuid::new_v4().to_string();
        let err = svc.resolve(Some(&missing), Utc::now()).await.unwrap_err();
        assert!(matches!(err, ReturnsError::PolicyNotFound(_)));

        let err = svc.resolve(Some("not-a-uuid"), Utc::now()).await.unwrap_err();
        assert!(matches!(err, ReturnsError::Validation(_)));
    }

    #[tokio::test]
    async fn test_invalid_rules_are_rejected() {
        let svc = service().await;
        let mut request = standard_request(Utc::now());
        request.rules.restocking_fee_percentage = 150.0;
        assert!(matches!(
            svc.create_policy(request).await,
            Err(ReturnsError::Validation(_))
        ));

        let mut request = standard_request(Utc::now());
        request.rules.fraud_check_threshold = -1.0;
        assert!(matches!(
            svc.create_policy(request).await,
            Err(ReturnsError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_processing_limits() {
        let svc = service().await;
        let mut request = standard_request(Utc::now());
        request.rules.max_processing_days = 9;
        let policy = svc.create_policy(request).await.unwrap();

        let limits = svc.processing_limits().await.unwrap();
        assert_eq!(limits.get(&policy.to_string_id()), Some(&9));
    }
}

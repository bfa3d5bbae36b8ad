use crate::domain::a030_returns_charge::aggregate::ItemCondition;
use crate::domain::common::{
    AggregateId, AggregateRoot, BaseAggregate, EntityMetadata, EventStore, Origin,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// ID типа для политики возвратов
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReturnPolicyId(pub Uuid);

impl ReturnPolicyId {
    pub fn new(value: Uuid) -> Self {
        Self(value)
    }
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }
    pub fn value(&self) -> Uuid {
        self.0
    }
}

impl AggregateId for ReturnPolicyId {
    fn as_string(&self) -> String {
        self.0.to_string()
    }
    fn from_string(s: &str) -> Result<Self, String> {
        Uuid::parse_str(s)
            .map(ReturnPolicyId::new)
            .map_err(|e| format!("Invalid UUID: {}", e))
    }
}

/// Кто оплачивает обратную доставку
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShippingPayer {
    Company,
    Customer,
}

fn default_max_processing_days() -> i64 {
    5
}

/// Правила политики (неизменяемы после создания)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnPolicyRules {
    pub return_window_days: i64,
    /// Процент от стоимости, например 10.0
    pub restocking_fee_percentage: f64,
    #[serde(default)]
    pub minimum_restocking_fee: f64,
    pub return_shipping_paid_by: ShippingPayer,
    /// Состояния, при которых ручная проверка не требуется
    #[serde(default)]
    pub auto_approve_conditions: Vec<ItemCondition>,
    /// Порог fraud_risk_score для ручной проверки
    pub fraud_check_threshold: f64,
    #[serde(default = "default_max_processing_days")]
    pub max_processing_days: i64,
}

/// Политика возвратов (версионированный набор правил)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnPolicy {
    #[serde(flatten)]
    pub base: BaseAggregate<ReturnPolicyId>,
    /// Номер версии в пределах code
    pub version_no: i32,
    pub rules: ReturnPolicyRules,
    pub effective_from: DateTime<Utc>,
    #[serde(default)]
    pub effective_until: Option<DateTime<Utc>>,
    pub is_active: bool,
}

impl ReturnPolicy {
    pub fn new_for_insert(
        code: String,
        description: String,
        version_no: i32,
        rules: ReturnPolicyRules,
        effective_from: DateTime<Utc>,
        effective_until: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            base: BaseAggregate::new(ReturnPolicyId::new_v4(), code, description),
            version_no,
            rules,
            effective_from,
            effective_until,
            is_active: true,
        }
    }

    pub fn to_string_id(&self) -> String {
        self.base.id.as_string()
    }

    /// Действует ли политика на момент `at`
    pub fn is_active_at(&self, at: DateTime<Utc>) -> bool {
        self.is_active
            && self.effective_from <= at
            && self.effective_until.map_or(true, |until| at <= until)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.base.code.trim().is_empty() {
            return Err("Код политики не может быть пустым".into());
        }
        if self.rules.return_window_days <= 0 {
            return Err("return_window_days должен быть больше 0".into());
        }
        if !(0.0..=100.0).contains(&self.rules.restocking_fee_percentage) {
            return Err("restocking_fee_percentage должен быть в диапазоне 0..100".into());
        }
        let minimum = self.rules.minimum_restocking_fee;
        if !minimum.is_finite() || minimum < 0.0 {
            return Err("minimum_restocking_fee должен быть неотрицательным числом".into());
        }
        if self.rules.max_processing_days <= 0 {
            return Err("max_processing_days должен быть больше 0".into());
        }
        if let Some(until) = self.effective_until {
            if until < self.effective_from {
                return Err("effective_until раньше effective_from".into());
            }
        }
        Ok(())
    }

    pub fn before_write(&mut self) {
        self.base.touch();
    }
}

impl AggregateRoot for ReturnPolicy {
    type Id = ReturnPolicyId;

    fn id(&self) -> Self::Id {
        self.base.id
    }

    fn code(&self) -> &str {
        &self.base.code
    }

    fn description(&self) -> &str {
        &self.base.description
    }

    fn metadata(&self) -> &EntityMetadata {
        &self.base.metadata
    }

    fn metadata_mut(&mut self) -> &mut EntityMetadata {
        &mut self.base.metadata
    }

    fn events(&self) -> &EventStore {
        &self.base.events
    }

    fn events_mut(&mut self) -> &mut EventStore {
        &mut self.base.events
    }

    fn aggregate_index() -> &'static str {
        "a031"
    }

    fn collection_name() -> &'static str {
        "return_policies"
    }

    fn element_name() -> &'static str {
        "Политика возвратов"
    }

    fn list_name() -> &'static str {
        "Политики возвратов"
    }

    fn origin() -> Origin {
        Origin::Self_
    }
}

/// Запрос на создание новой версии политики
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateReturnPolicyRequest {
    pub code: String,
    pub description: String,
    pub rules: ReturnPolicyRules,
    pub effective_from: DateTime<Utc>,
    #[serde(default)]
    pub effective_until: Option<DateTime<Utc>>,
}

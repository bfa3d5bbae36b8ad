use super::lifecycle::ReturnStatus;
use crate::domain::common::{
    AggregateId, AggregateRoot, BaseAggregate, EntityMetadata, EventStore, Origin,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// ID типа для документа возврата
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReturnsChargeId(pub Uuid);

impl ReturnsChargeId {
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

impl AggregateId for ReturnsChargeId {
    fn as_string(&self) -> String {
        self.0.to_string()
    }
    fn from_string(s: &str) -> Result<Self, String> {
        Uuid::parse_str(s)
            .map(ReturnsChargeId::new)
            .map_err(|e| format!("Invalid UUID: {}", e))
    }
}

// ============================================================================
// Справочные перечисления
// ============================================================================

/// Причина возврата
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnReason {
    Defective,
    WrongItem,
    NotAsDescribed,
    CustomerChangedMind,
    DamagedInShipping,
    LateDelivery,
    Other,
}

impl ReturnReason {
    pub fn code(&self) -> &'static str {
        match self {
            ReturnReason::Defective => "defective",
            ReturnReason::WrongItem => "wrong_item",
            ReturnReason::NotAsDescribed => "not_as_described",
            ReturnReason::CustomerChangedMind => "customer_changed_mind",
            ReturnReason::DamagedInShipping => "damaged_in_shipping",
            ReturnReason::LateDelivery => "late_delivery",
            ReturnReason::Other => "other",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "defective" => Some(ReturnReason::Defective),
            "wrong_item" => Some(ReturnReason::WrongItem),
            "not_as_described" => Some(ReturnReason::NotAsDescribed),
            "customer_changed_mind" => Some(ReturnReason::CustomerChangedMind),
            "damaged_in_shipping" => Some(ReturnReason::DamagedInShipping),
            "late_delivery" => Some(ReturnReason::LateDelivery),
            "other" => Some(ReturnReason::Other),
            _ => None,
        }
    }

    pub fn all() -> [ReturnReason; 7] {
        [
            ReturnReason::Defective,
            ReturnReason::WrongItem,
            ReturnReason::NotAsDescribed,
            ReturnReason::CustomerChangedMind,
            ReturnReason::DamagedInShipping,
            ReturnReason::LateDelivery,
            ReturnReason::Other,
        ]
    }

    /// Вина компании: restocking fee не взимается, доставка компенсируется
    pub fn is_company_fault(&self) -> bool {
        matches!(
            self,
            ReturnReason::Defective
                | ReturnReason::WrongItem
                | ReturnReason::DamagedInShipping
                | ReturnReason::NotAsDescribed
        )
    }

    /// Причины, по которым убыток можно предъявить поставщику
    pub fn is_vendor_claimable(&self) -> bool {
        matches!(
            self,
            ReturnReason::Defective | ReturnReason::DamagedInShipping
        )
    }
}

/// Способ возврата
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnMethod {
    Pickup,
    DropOff,
    Mail,
    InStore,
}

impl ReturnMethod {
    pub fn code(&self) -> &'static str {
        match self {
            ReturnMethod::Pickup => "pickup",
            ReturnMethod::DropOff => "drop_off",
            ReturnMethod::Mail => "mail",
            ReturnMethod::InStore => "in_store",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "pickup" => Some(ReturnMethod::Pickup),
            "drop_off" => Some(ReturnMethod::DropOff),
            "mail" => Some(ReturnMethod::Mail),
            "in_store" => Some(ReturnMethod::InStore),
            _ => None,
        }
    }
}

/// Состояние возвращённого товара
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemCondition {
    New,
    LikeNew,
    Good,
    Fair,
    Poor,
    Damaged,
    Defective,
}

impl ItemCondition {
    pub fn code(&self) -> &'static str {
        match self {
            ItemCondition::New => "new",
            ItemCondition::LikeNew => "like_new",
            ItemCondition::Good => "good",
            ItemCondition::Fair => "fair",
            ItemCondition::Poor => "poor",
            ItemCondition::Damaged => "damaged",
            ItemCondition::Defective => "defective",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "new" => Some(ItemCondition::New),
            "like_new" => Some(ItemCondition::LikeNew),
            "good" => Some(ItemCondition::Good),
            "fair" => Some(ItemCondition::Fair),
            "poor" => Some(ItemCondition::Poor),
            "damaged" => Some(ItemCondition::Damaged),
            "defective" => Some(ItemCondition::Defective),
            _ => None,
        }
    }

    /// Доля цены, возвращаемая покупателю
    pub fn refund_factor(&self) -> f64 {
        match self {
            ItemCondition::New | ItemCondition::LikeNew | ItemCondition::Good => 1.0,
            ItemCondition::Fair => 0.75,
            ItemCondition::Poor => 0.5,
            ItemCondition::Damaged | ItemCondition::Defective => 0.0,
        }
    }

    /// Товар можно вернуть на склад для продажи
    pub fn is_resellable(&self) -> bool {
        matches!(
            self,
            ItemCondition::New | ItemCondition::LikeNew | ItemCondition::Good
        )
    }

    /// Брак или повреждение: кандидат на претензию поставщику
    pub fn is_vendor_claimable(&self) -> bool {
        matches!(self, ItemCondition::Damaged | ItemCondition::Defective)
    }
}

/// Итоговое решение по возврату
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionType {
    FullRefund,
    PartialRefund,
    StoreCredit,
    Exchange,
    Repair,
    NoRefund,
}

impl ResolutionType {
    pub fn code(&self) -> &'static str {
        match self {
            ResolutionType::FullRefund => "full_refund",
            ResolutionType::PartialRefund => "partial_refund",
            ResolutionType::StoreCredit => "store_credit",
            ResolutionType::Exchange => "exchange",
            ResolutionType::Repair => "repair",
            ResolutionType::NoRefund => "no_refund",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "full_refund" => Some(ResolutionType::FullRefund),
            "partial_refund" => Some(ResolutionType::PartialRefund),
            "store_credit" => Some(ResolutionType::StoreCredit),
            "exchange" => Some(ResolutionType::Exchange),
            "repair" => Some(ResolutionType::Repair),
            "no_refund" => Some(ResolutionType::NoRefund),
            _ => None,
        }
    }
}

// ============================================================================
// Части документа
// ============================================================================

/// Строка возврата (товар)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnItem {
    pub product_id: i64,
    pub quantity_returned: i32,
    /// Цена продажи за единицу
    pub original_price: f64,
    pub condition: ItemCondition,
    #[serde(default)]
    pub condition_notes: Option<String>,
    /// Решение по строке (заполняется при осмотре)
    #[serde(default)]
    pub resolution: Option<ResolutionType>,
    /// Возвращается на склад (фиксируется при осмотре)
    #[serde(default)]
    pub return_to_inventory: bool,
}

/// Операционные затраты на обработку возврата (вводятся, не вычисляются)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationalCosts {
    #[serde(default)]
    pub return_shipping_cost: f64,
    #[serde(default)]
    pub inspection_cost: f64,
    #[serde(default)]
    pub restocking_cost: f64,
    #[serde(default)]
    pub refurbishment_cost: f64,
    #[serde(default)]
    pub disposal_cost: f64,
    #[serde(default)]
    pub administrative_cost: f64,
}

impl OperationalCosts {
    pub fn total(&self) -> f64 {
        self.inspection_cost
            + self.restocking_cost
            + self.refurbishment_cost
            + self.disposal_cost
            + self.administrative_cost
            + self.return_shipping_cost
    }

    pub fn values(&self) -> [f64; 6] {
        [
            self.return_shipping_cost,
            self.inspection_cost,
            self.restocking_cost,
            self.refurbishment_cost,
            self.disposal_cost,
            self.administrative_cost,
        ]
    }
}

/// Расчёт по одной строке
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostLine {
    pub product_id: i64,
    pub quantity_returned: i32,
    pub original_price: f64,
    pub condition: ItemCondition,
    pub condition_factor: f64,
    /// Цена к возврату за единицу
    pub refund_price: f64,
    /// refund_price × quantity
    pub line_refund: f64,
    /// Недовозврат, который можно предъявить поставщику
    pub vendor_claimable_amount: f64,
}

/// Финансовый расчёт возврата
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub lines: Vec<CostLine>,
    /// Σ original_price × quantity
    pub total_return_value: f64,
    /// Σ refund_price × quantity
    pub refundable_value: f64,
    pub restocking_fee: f64,
    pub restocking_fee_waived: bool,
    pub shipping_refund: f64,
    /// Сумма к возврату покупателю (не меньше 0)
    pub refund_amount: f64,
    /// Сумма операционных затрат (processing_fee)
    pub processing_costs: f64,
    pub vendor_claim_potential: f64,
    pub vendor_recovery: f64,
    pub net_loss: f64,
    pub policy_id: String,
    pub policy_version: i32,
}

/// Заголовок документа возврата
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnsChargeHeader {
    pub order_id: String,
    #[serde(default)]
    pub original_sale_id: Option<String>,
    pub customer_id: String,
    pub return_reason: ReturnReason,
    pub return_method: ReturnMethod,
    /// Политика, действовавшая на дату инициирования
    pub policy_id: String,
    pub policy_version: i32,
    /// Сколько покупатель заплатил за обратную доставку
    #[serde(default)]
    pub customer_paid_shipping: f64,
}

/// Финансовые поля документа
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnsChargeFinancials {
    pub costs: OperationalCosts,
    /// Последний расчёт (при создании, затем после осмотра)
    pub breakdown: CostBreakdown,
    /// Фактически выплаченная сумма
    #[serde(default)]
    pub refund_amount: Option<f64>,
    #[serde(default)]
    pub refund_received_from_vendor: f64,
    pub net_loss: f64,
}

/// Решение по возврату
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReturnsChargeResolution {
    #[serde(default)]
    pub resolution_type: Option<ResolutionType>,
    #[serde(default)]
    pub resolution_amount: Option<f64>,
}

/// Риски и качество
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReturnsChargeRisk {
    #[serde(default)]
    pub condition_assessment: Option<String>,
    /// 0..=100, приходит извне
    #[serde(default)]
    pub fraud_risk_score: f64,
    #[serde(default)]
    pub fraud_indicators: Vec<String>,
    #[serde(default)]
    pub requires_manual_review: bool,
    #[serde(default)]
    pub vendor_responsible: bool,
    #[serde(default)]
    pub vendor_claim_amount: f64,
}

/// Статус и временные метки
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnsChargeState {
    pub current_status: ReturnStatus,
    pub return_initiated_date: DateTime<Utc>,
    #[serde(default)]
    pub return_received_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub inspection_completed_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub refund_processed_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub case_closed_date: Option<DateTime<Utc>>,
}

/// Ссылка на претензию поставщику
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VendorClaimRef {
    pub claim_id: String,
    pub vendor_id: String,
    pub status: String,
    pub amount: f64,
    pub submitted_at: DateTime<Utc>,
}

/// Сбой внешней системы, сохранённый для ручного разбора
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalFailure {
    pub collaborator: String,
    pub operation: String,
    pub message: String,
    pub occurred_at: DateTime<Utc>,
}

/// Документ возврата (агрегат)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnsCharge {
    #[serde(flatten)]
    pub base: BaseAggregate<ReturnsChargeId>,

    pub header: ReturnsChargeHeader,

    /// Строки документа (товары возврата)
    pub items: Vec<ReturnItem>,

    pub financials: ReturnsChargeFinancials,

    #[serde(default)]
    pub resolution: ReturnsChargeResolution,

    #[serde(default)]
    pub risk: ReturnsChargeRisk,

    pub state: ReturnsChargeState,

    #[serde(default)]
    pub vendor_claim: Option<VendorClaimRef>,

    #[serde(default)]
    pub external_failures: Vec<ExternalFailure>,
}

impl ReturnsCharge {
    pub fn new_for_insert(
        description: String,
        header: ReturnsChargeHeader,
        items: Vec<ReturnItem>,
        financials: ReturnsChargeFinancials,
        risk: ReturnsChargeRisk,
        return_initiated_date: DateTime<Utc>,
    ) -> Self {
        let id = ReturnsChargeId::new_v4();
        let code = format!("RET-{}", &id.as_string()[..8]);
        Self {
            base: BaseAggregate::new(id, code, description),
            header,
            items,
            financials,
            resolution: ReturnsChargeResolution::default(),
            risk,
            state: ReturnsChargeState {
                current_status: ReturnStatus::Initiated,
                return_initiated_date,
                return_received_date: None,
                inspection_completed_date: None,
                refund_processed_date: None,
                case_closed_date: None,
            },
            vendor_claim: None,
            external_failures: Vec::new(),
        }
    }

    pub fn to_string_id(&self) -> String {
        self.base.id.as_string()
    }

    pub fn current_status(&self) -> ReturnStatus {
        self.state.current_status
    }

    pub fn is_archived(&self) -> bool {
        self.base.metadata.is_archived
    }

    pub fn total_return_value(&self) -> f64 {
        self.financials.breakdown.total_return_value
    }

    /// Верхняя граница суммы возврата по последнему расчёту
    pub fn refund_ceiling(&self) -> f64 {
        self.financials.breakdown.refund_amount
    }

    /// Получить количество товаров в возврате
    pub fn total_items_count(&self) -> i32 {
        self.items.iter().map(|i| i.quantity_returned).sum()
    }

    /// Худшее состояние среди строк
    pub fn worst_condition(&self) -> Option<ItemCondition> {
        self.items.iter().map(|i| i.condition).max()
    }

    /// net_loss = total_return_value − refund_received_from_vendor + processing_costs − restocking_fee
    pub fn recompute_net_loss(&mut self) {
        let b = &self.financials.breakdown;
        self.financials.net_loss = b.total_return_value
            - self.financials.refund_received_from_vendor
            + b.processing_costs
            - b.restocking_fee;
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.header.order_id.trim().is_empty() {
            return Err("order_id обязателен".into());
        }
        if self.header.customer_id.trim().is_empty() {
            return Err("customer_id обязателен".into());
        }
        if self.items.is_empty() {
            return Err("В возврате должен быть хотя бы один товар".into());
        }
        if !(0.0..=100.0).contains(&self.risk.fraud_risk_score) {
            return Err("fraud_risk_score должен быть в диапазоне 0..100".into());
        }
        if let Some(refund) = self.financials.refund_amount {
            if refund > self.total_return_value() {
                return Err("Сумма возврата превышает стоимость возвращённых товаров".into());
            }
        }
        Ok(())
    }

    pub fn before_write(&mut self) {
        self.base.touch();
    }
}

impl AggregateRoot for ReturnsCharge {
    type Id = ReturnsChargeId;

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
        "a030"
    }

    fn collection_name() -> &'static str {
        "returns_charges"
    }

    fn element_name() -> &'static str {
        "Возврат"
    }

    fn list_name() -> &'static str {
        "Возвраты"
    }

    fn origin() -> Origin {
        Origin::Self_
    }
}

// ============================================================================
// DTO запросов
// ============================================================================

/// Строка возврата во входящем запросе (коды ещё не проверены)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnItemInput {
    pub product_id: i64,
    pub quantity_returned: i32,
    pub original_price: f64,
    pub condition: String,
    #[serde(default)]
    pub condition_notes: Option<String>,
}

/// Запрос предварительного расчёта
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostCalculationRequest {
    pub items: Vec<ReturnItemInput>,
    pub return_reason: String,
    pub return_method: String,
    /// Явная политика; если не задана, берётся активная на дату
    #[serde(default)]
    pub policy_id: Option<String>,
    #[serde(default)]
    pub costs: OperationalCosts,
    #[serde(default)]
    pub customer_paid_shipping: f64,
    /// Ожидаемое возмещение от поставщика
    #[serde(default)]
    pub vendor_recovery: f64,
    #[serde(default)]
    pub return_initiated_date: Option<DateTime<Utc>>,
}

/// Запрос на создание возврата
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateReturnsChargeRequest {
    pub order_id: String,
    #[serde(default)]
    pub original_sale_id: Option<String>,
    pub customer_id: String,
    pub return_reason: String,
    pub return_method: String,
    pub items: Vec<ReturnItemInput>,
    #[serde(default)]
    pub costs: OperationalCosts,
    #[serde(default)]
    pub customer_paid_shipping: f64,
    #[serde(default)]
    pub policy_id: Option<String>,
    #[serde(default)]
    pub return_initiated_date: Option<DateTime<Utc>>,
    /// Дата покупки, для проверки окна возврата
    #[serde(default)]
    pub original_purchase_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub fraud_risk_score: f64,
    #[serde(default)]
    pub fraud_indicators: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub actor: Option<String>,
}

impl CreateReturnsChargeRequest {
    pub fn to_cost_request(&self) -> CostCalculationRequest {
        CostCalculationRequest {
            items: self.items.clone(),
            return_reason: self.return_reason.clone(),
            return_method: self.return_method.clone(),
            policy_id: self.policy_id.clone(),
            costs: self.costs.clone(),
            customer_paid_shipping: self.customer_paid_shipping,
            vendor_recovery: 0.0,
            return_initiated_date: self.return_initiated_date,
        }
    }
}

/// Сопроводительные данные перехода (попадают в журнал)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusChangeMetadata {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub actor: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateReturnStatusRequest {
    pub status: String,
    #[serde(default)]
    pub metadata: StatusChangeMetadata,
}

/// Результат осмотра по строке
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InspectionItemInput {
    pub product_id: i64,
    pub condition: String,
    #[serde(default)]
    pub condition_notes: Option<String>,
    #[serde(default)]
    pub resolution: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteInspectionRequest {
    pub condition_assessment: String,
    pub items: Vec<InspectionItemInput>,
    pub resolution_type: String,
    /// Фактические затраты после осмотра (если отличаются от первоначальных)
    #[serde(default)]
    pub costs: Option<OperationalCosts>,
    #[serde(default)]
    pub metadata: StatusChangeMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessRefundRequest {
    pub refund_amount: f64,
    #[serde(default)]
    pub metadata: StatusChangeMetadata,
}

/// Событие логистического провайдера (трекинг обратной доставки)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticsEventInput {
    pub event_type: String,
    pub description: String,
    #[serde(default)]
    pub location: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordLogisticsEventsRequest {
    pub events: Vec<LogisticsEventInput>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VendorRecoveryRequest {
    pub amount: f64,
    #[serde(default)]
    pub actor: Option<String>,
}

/// Элемент списка возвратов
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnsChargeListItemDto {
    pub id: String,
    pub code: String,
    pub order_id: String,
    pub customer_id: String,
    pub return_reason: ReturnReason,
    pub current_status: ReturnStatus,
    pub total_items: i32,
    pub total_return_value: f64,
    pub refund_amount: f64,
    pub fraud_risk_score: f64,
    pub requires_manual_review: bool,
    pub return_initiated_date: DateTime<Utc>,
    pub is_archived: bool,
}

impl From<&ReturnsCharge> for ReturnsChargeListItemDto {
    fn from(c: &ReturnsCharge) -> Self {
        Self {
            id: c.to_string_id(),
            code: c.base.code.clone(),
            order_id: c.header.order_id.clone(),
            customer_id: c.header.customer_id.clone(),
            return_reason: c.header.return_reason,
            current_status: c.current_status(),
            total_items: c.total_items_count(),
            total_return_value: c.total_return_value(),
            refund_amount: c.financials.refund_amount.unwrap_or(c.refund_ceiling()),
            fraud_risk_score: c.risk.fraud_risk_score,
            requires_manual_review: c.risk.requires_manual_review,
            return_initiated_date: c.state.return_initiated_date,
            is_archived: c.is_archived(),
        }
    }
}

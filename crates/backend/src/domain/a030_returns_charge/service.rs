use chrono::{DateTime, Utc};
use contracts::dashboards::d402_returns_dashboard::{ReturnsDashboardData, ReturnsDashboardRequest};
use contracts::domain::a030_returns_charge::aggregate::{
    CompleteInspectionRequest, CostBreakdown, CostCalculationRequest, CreateReturnsChargeRequest,
    ExternalFailure, ProcessRefundRequest, RecordLogisticsEventsRequest, ResolutionType,
    ReturnsCharge, ReturnsChargeFinancials, ReturnsChargeHeader, ReturnsChargeRisk,
    UpdateReturnStatusRequest, VendorClaimRef, VendorRecoveryRequest,
};
use contracts::domain::a030_returns_charge::vendor_claim::{
    VendorClaimRequest, VendorClaimStatus, VendorClaimSubmission,
};
use contracts::domain::a030_returns_charge::ReturnStatus;
use std::sync::Arc;
use tokio::sync::OwnedMutexGuard;
use uuid::Uuid;

use super::cost_calculator::{self, parse_condition, parse_items, parse_method, parse_reason};
use super::lifecycle::{apply_transition, ensure_transition, parse_status, DEFAULT_ACTOR};
use super::repository::{ReturnsChargeFilter, ReturnsChargeRepository};
use super::vendor_claims::{VendorClaimsClient, COLLABORATOR};
use crate::dashboards::d402_returns_dashboard::service::build_dashboard;
use crate::domain::a031_return_policy::service::ReturnPolicyService;
use crate::shared::config::ReturnsConfig;
use crate::shared::error::{ReturnsError, ReturnsResult};
use crate::shared::format::round_money;
use crate::shared::locks::KeyedLocks;

fn parse_return_id(id: &str) -> ReturnsResult<Uuid> {
    Uuid::parse_str(id.trim())
        .map_err(|_| ReturnsError::validation(format!("Invalid return id: '{}'", id)))
}

fn parse_resolution(code: &str) -> ReturnsResult<ResolutionType> {
    ResolutionType::from_code(code)
        .ok_or_else(|| ReturnsError::validation(format!("Unknown resolution_type: '{}'", code)))
}

fn ensure_money(name: &str, value: f64) -> ReturnsResult<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(ReturnsError::validation(format!(
            "{} must be a non-negative number",
            name
        )));
    }
    Ok(())
}

/// Жизненный цикл документов возврата
#[derive(Clone)]
pub struct ReturnsService {
    charges: ReturnsChargeRepository,
    policies: ReturnPolicyService,
    vendor_claims: Arc<dyn VendorClaimsClient>,
    locks: KeyedLocks,
    settings: ReturnsConfig,
}

impl ReturnsService {
    pub fn new(
        charges: ReturnsChargeRepository,
        policies: ReturnPolicyService,
        vendor_claims: Arc<dyn VendorClaimsClient>,
        settings: ReturnsConfig,
    ) -> Self {
        Self {
            charges,
            policies,
            vendor_claims,
            locks: KeyedLocks::new(),
            settings,
        }
    }

    // ------------------------------------------------------------------
    // Чтение
    // ------------------------------------------------------------------

    pub async fn get_by_id(&self, id: &str) -> ReturnsResult<ReturnsCharge> {
        let uuid = parse_return_id(id)?;
        self.load(uuid).await
    }

    pub async fn list(&self, filter: &ReturnsChargeFilter) -> ReturnsResult<Vec<ReturnsCharge>> {
        self.charges.list(filter).await
    }

    /// Предварительный расчёт без сохранения
    pub async fn calculate_return_costs(
        &self,
        request: &CostCalculationRequest,
    ) -> ReturnsResult<CostBreakdown> {
        let at = request.return_initiated_date.unwrap_or_else(Utc::now);
        let policy = self.policies.resolve(request.policy_id.as_deref(), at).await?;
        cost_calculator::calculate_return_costs(request, &policy, at)
    }

    pub async fn get_returns_dashboard(
        &self,
        params: &ReturnsDashboardRequest,
    ) -> ReturnsResult<ReturnsDashboardData> {
        let filter = ReturnsChargeFilter {
            date_from: params.date_from,
            date_to: params.date_to,
            return_reason: params.return_reason,
            ..Default::default()
        };
        let charges = self.charges.list(&filter).await?;
        let limits = self.policies.processing_limits().await?;
        Ok(build_dashboard(
            &charges,
            &limits,
            params,
            &self.settings,
            params.as_of.unwrap_or_else(Utc::now),
        ))
    }

    // ------------------------------------------------------------------
    // Создание
    // ------------------------------------------------------------------

    pub async fn create_returns_charge(
        &self,
        request: CreateReturnsChargeRequest,
    ) -> ReturnsResult<ReturnsCharge> {
        if request.order_id.trim().is_empty() {
            return Err(ReturnsError::validation("order_id is required"));
        }
        if request.customer_id.trim().is_empty() {
            return Err(ReturnsError::validation("customer_id is required"));
        }
        if !request.fraud_risk_score.is_finite()
            || !(0.0..=100.0).contains(&request.fraud_risk_score)
        {
            return Err(ReturnsError::validation(
                "fraud_risk_score must be within 0..100",
            ));
        }

        let reason = parse_reason(&request.return_reason)?;
        let method = parse_method(&request.return_method)?;
        let items = parse_items(&request.items)?;

        let at = request.return_initiated_date.unwrap_or_else(Utc::now);
        let policy = self.policies.resolve(request.policy_id.as_deref(), at).await?;
        let breakdown =
            cost_calculator::calculate_return_costs(&request.to_cost_request(), &policy, at)?;

        if let Some(purchased_at) = request.original_purchase_date {
            if purchased_at > at {
                return Err(ReturnsError::validation(
                    "original_purchase_date is after return_initiated_date",
                ));
            }
            let days = (at - purchased_at).num_days();
            if days > policy.rules.return_window_days {
                return Err(ReturnsError::validation(format!(
                    "Return window of {} days exceeded ({} days since purchase)",
                    policy.rules.return_window_days, days
                )));
            }
        }

        let requires_manual_review = request.fraud_risk_score >= policy.rules.fraud_check_threshold
            || items
                .iter()
                .any(|i| !policy.rules.auto_approve_conditions.contains(&i.condition));

        let header = ReturnsChargeHeader {
            order_id: request.order_id.trim().to_string(),
            original_sale_id: request.original_sale_id.clone(),
            customer_id: request.customer_id.trim().to_string(),
            return_reason: reason,
            return_method: method,
            policy_id: policy.to_string_id(),
            policy_version: policy.version_no,
            customer_paid_shipping: request.customer_paid_shipping,
        };
        let financials = ReturnsChargeFinancials {
            costs: request.costs.clone(),
            net_loss: breakdown.net_loss,
            breakdown,
            refund_amount: None,
            refund_received_from_vendor: 0.0,
        };
        let risk = ReturnsChargeRisk {
            condition_assessment: None,
            fraud_risk_score: request.fraud_risk_score,
            fraud_indicators: request.fraud_indicators.clone(),
            requires_manual_review,
            vendor_responsible: false,
            vendor_claim_amount: 0.0,
        };
        let description = request
            .description
            .clone()
            .unwrap_or_else(|| format!("Возврат по заказу {}", header.order_id));

        let mut charge =
            ReturnsCharge::new_for_insert(description, header, items, financials, risk, at);
        charge.base.events.append(
            "created",
            format!(
                "Возврат создан, к возврату {:.2} из {:.2}",
                charge.refund_ceiling(),
                charge.total_return_value()
            ),
            None,
            at,
            request.actor.as_deref().unwrap_or(DEFAULT_ACTOR),
        );
        charge.validate().map_err(ReturnsError::Validation)?;
        charge.before_write();

        self.charges.insert(&charge).await?;
        tracing::info!(
            "Created return {} ({}) for order {}, manual review: {}",
            charge.base.code,
            charge.to_string_id(),
            charge.header.order_id,
            charge.risk.requires_manual_review
        );
        Ok(charge)
    }

    // ------------------------------------------------------------------
    // Переходы
    // ------------------------------------------------------------------

    /// Общий переход статуса (кроме processed и refunded)
    pub async fn update_return_status(
        &self,
        id: &str,
        request: UpdateReturnStatusRequest,
    ) -> ReturnsResult<ReturnsCharge> {
        let uuid = parse_return_id(id)?;
        let requested = parse_status(&request.status)?;

        let (_guard, mut charge) = self.load_for_update(uuid).await?;
        let previous = charge.current_status();
        ensure_transition(previous, requested)?;
        match requested {
            ReturnStatus::Processed => {
                return Err(ReturnsError::validation(
                    "Status 'processed' is set by completing the inspection",
                ))
            }
            ReturnStatus::Refunded => {
                return Err(ReturnsError::validation(
                    "Status 'refunded' is set by processing the refund",
                ))
            }
            _ => {}
        }
        apply_transition(&mut charge, requested, &request.metadata, Utc::now())?;
        self.save(&mut charge).await?;

        tracing::info!(
            "Return {} status changed: {} -> {}",
            charge.to_string_id(),
            previous,
            requested
        );
        Ok(charge)
    }

    /// Итоги осмотра: inspecting -> processed
    pub async fn complete_inspection(
        &self,
        id: &str,
        request: CompleteInspectionRequest,
    ) -> ReturnsResult<ReturnsCharge> {
        let uuid = parse_return_id(id)?;
        let resolution_type = parse_resolution(&request.resolution_type)?;
        if request.items.is_empty() {
            return Err(ReturnsError::validation(
                "Inspection must cover at least one item",
            ));
        }
        let mut inspected = Vec::with_capacity(request.items.len());
        for input in &request.items {
            let condition = parse_condition(&input.condition)?;
            let resolution = match input.resolution.as_deref() {
                Some(code) => Some(parse_resolution(code)?),
                None => None,
            };
            inspected.push((input, condition, resolution));
        }
        if let Some(ref costs) = request.costs {
            cost_calculator::validate_costs(costs)?;
        }

        let (_guard, mut charge) = self.load_for_update(uuid).await?;
        ensure_transition(charge.current_status(), ReturnStatus::Processed)?;

        for (input, condition, resolution) in &inspected {
            let mut matched = false;
            for item in charge
                .items
                .iter_mut()
                .filter(|i| i.product_id == input.product_id)
            {
                item.condition = *condition;
                if input.condition_notes.is_some() {
                    item.condition_notes = input.condition_notes.clone();
                }
                item.resolution = resolution.or(Some(resolution_type));
                matched = true;
            }
            if !matched {
                return Err(ReturnsError::validation(format!(
                    "Product {} is not part of return {}",
                    input.product_id,
                    charge.base.code
                )));
            }
        }
        for item in charge.items.iter_mut() {
            item.return_to_inventory = item.condition.is_resellable();
            if item.resolution.is_none() {
                item.resolution = Some(resolution_type);
            }
        }

        let policy = self.policies.get_by_id(&charge.header.policy_id).await?;
        if let Some(costs) = request.costs.clone() {
            charge.financials.costs = costs;
        }
        let breakdown = cost_calculator::compute_breakdown(
            &charge.items,
            charge.header.return_reason,
            &charge.financials.costs,
            charge.header.customer_paid_shipping,
            charge.financials.refund_received_from_vendor,
            &policy,
        )?;

        let vendor_responsible = charge.header.return_reason.is_vendor_claimable()
            && charge.items.iter().any(|i| i.condition.is_vendor_claimable());
        charge.risk.condition_assessment = Some(request.condition_assessment.clone());
        charge.risk.vendor_responsible = vendor_responsible;
        charge.risk.vendor_claim_amount = breakdown.vendor_claim_potential;
        if charge
            .items
            .iter()
            .any(|i| !policy.rules.auto_approve_conditions.contains(&i.condition))
        {
            charge.risk.requires_manual_review = true;
        }
        charge.financials.net_loss = breakdown.net_loss;
        charge.financials.breakdown = breakdown;
        charge.resolution.resolution_type = Some(resolution_type);

        let mut metadata = request.metadata.clone();
        if metadata.description.is_none() {
            metadata.description = Some(format!(
                "Осмотр завершён: {}",
                request.condition_assessment
            ));
        }
        apply_transition(&mut charge, ReturnStatus::Processed, &metadata, Utc::now())?;
        self.save(&mut charge).await?;

        tracing::info!(
            "Inspection completed for return {}: resolution {}, refund ceiling {:.2}, vendor responsible: {}",
            charge.to_string_id(),
            resolution_type.code(),
            charge.refund_ceiling(),
            vendor_responsible
        );
        Ok(charge)
    }

    /// Выплата: processed -> refunded
    pub async fn process_refund(
        &self,
        id: &str,
        request: ProcessRefundRequest,
    ) -> ReturnsResult<ReturnsCharge> {
        let uuid = parse_return_id(id)?;
        ensure_money("refund_amount", request.refund_amount)?;

        let (_guard, mut charge) = self.load_for_update(uuid).await?;
        ensure_transition(charge.current_status(), ReturnStatus::Refunded)?;

        let amount = round_money(request.refund_amount);
        if amount > charge.refund_ceiling() {
            return Err(ReturnsError::validation(format!(
                "refund_amount {:.2} exceeds the calculated refund {:.2}",
                amount,
                charge.refund_ceiling()
            )));
        }

        charge.financials.refund_amount = Some(amount);
        charge.resolution.resolution_amount = Some(amount);

        let mut metadata = request.metadata.clone();
        if metadata.description.is_none() {
            metadata.description = Some(format!("Возврат средств {:.2}", amount));
        }
        apply_transition(&mut charge, ReturnStatus::Refunded, &metadata, Utc::now())?;
        self.save(&mut charge).await?;

        tracing::info!("Refund {:.2} processed for return {}", amount, charge.to_string_id());
        Ok(charge)
    }

    // ------------------------------------------------------------------
    // Прочие изменения
    // ------------------------------------------------------------------

    /// События перевозчика: только журнал, статус не меняется
    pub async fn record_logistics_events(
        &self,
        id: &str,
        request: RecordLogisticsEventsRequest,
    ) -> ReturnsResult<ReturnsCharge> {
        let uuid = parse_return_id(id)?;
        if request.events.is_empty() {
            return Err(ReturnsError::validation("No logistics events supplied"));
        }
        if request.events.iter().any(|e| e.event_type.trim().is_empty()) {
            return Err(ReturnsError::validation("event_type is required"));
        }

        let (_guard, mut charge) = self.load_for_update(uuid).await?;
        for event in &request.events {
            charge.base.events.append(
                event.event_type.trim(),
                event.description.clone(),
                event.location.clone(),
                event.timestamp,
                "logistics",
            );
        }
        self.save(&mut charge).await?;

        tracing::info!(
            "Recorded {} logistics event(s) for return {}",
            request.events.len(),
            charge.to_string_id()
        );
        Ok(charge)
    }

    /// Возмещение от поставщика, пересчитывает net_loss
    pub async fn record_vendor_recovery(
        &self,
        id: &str,
        request: VendorRecoveryRequest,
    ) -> ReturnsResult<ReturnsCharge> {
        let uuid = parse_return_id(id)?;
        ensure_money("amount", request.amount)?;

        let (_guard, mut charge) = self.load_for_update(uuid).await?;
        let total = round_money(charge.financials.refund_received_from_vendor + request.amount);
        cost_calculator::ensure_finite_total("refund_received_from_vendor", total)?;
        charge.financials.refund_received_from_vendor = total;
        charge.financials.breakdown.vendor_recovery = total;
        charge.recompute_net_loss();
        charge.financials.net_loss = round_money(charge.financials.net_loss);
        cost_calculator::ensure_finite_total("net_loss", charge.financials.net_loss)?;
        charge.financials.breakdown.net_loss = charge.financials.net_loss;
        charge.base.events.append(
            "vendor_recovery_recorded",
            format!("Получено от поставщика {:.2}, всего {:.2}", request.amount, total),
            None,
            Utc::now(),
            request.actor.as_deref().unwrap_or(DEFAULT_ACTOR),
        );
        self.save(&mut charge).await?;

        tracing::info!(
            "Vendor recovery {:.2} recorded for return {}, net loss {:.2}",
            request.amount,
            charge.to_string_id(),
            charge.financials.net_loss
        );
        Ok(charge)
    }

    /// Пометить документ архивным (физически не удаляется)
    pub async fn archive(&self, id: &str) -> ReturnsResult<ReturnsCharge> {
        let uuid = parse_return_id(id)?;
        let _guard = self.locks.acquire(uuid).await;
        let mut charge = self.load(uuid).await?;
        if charge.is_archived() {
            return Ok(charge);
        }
        charge.base.metadata.is_archived = true;
        charge
            .base
            .events
            .append("archived", "Документ перенесён в архив", None, Utc::now(), DEFAULT_ACTOR);
        self.save(&mut charge).await?;

        tracing::info!("Return {} archived", charge.to_string_id());
        Ok(charge)
    }

    // ------------------------------------------------------------------
    // Претензии поставщику
    // ------------------------------------------------------------------

    pub async fn submit_vendor_claim(
        &self,
        id: &str,
        request: VendorClaimRequest,
    ) -> ReturnsResult<ReturnsCharge> {
        let uuid = parse_return_id(id)?;
        if request.vendor_id.trim().is_empty() {
            return Err(ReturnsError::validation("vendor_id is required"));
        }

        let (_guard, mut charge) = self.load_for_update(uuid).await?;
        if !charge.risk.vendor_responsible || charge.risk.vendor_claim_amount <= 0.0 {
            return Err(ReturnsError::validation(
                "Inspection has not established a vendor claim for this return",
            ));
        }
        if let Some(ref existing) = charge.vendor_claim {
            return Err(ReturnsError::validation(format!(
                "Vendor claim {} has already been submitted",
                existing.claim_id
            )));
        }

        let submission = VendorClaimSubmission {
            return_id: charge.to_string_id(),
            return_code: charge.base.code.clone(),
            vendor_id: request.vendor_id.trim().to_string(),
            order_id: charge.header.order_id.clone(),
            return_reason: charge.header.return_reason.code().to_string(),
            amount: charge.risk.vendor_claim_amount,
            product_ids: charge
                .items
                .iter()
                .filter(|i| i.condition.is_vendor_claimable())
                .map(|i| i.product_id)
                .collect(),
            notes: request.notes.clone(),
        };
        let actor = request.actor.as_deref().unwrap_or(DEFAULT_ACTOR);

        match self.vendor_claims.submit_claim(&submission).await {
            Ok(receipt) => {
                let now = Utc::now();
                charge.vendor_claim = Some(VendorClaimRef {
                    claim_id: receipt.claim_id.clone(),
                    vendor_id: submission.vendor_id.clone(),
                    status: receipt.status.clone(),
                    amount: submission.amount,
                    submitted_at: now,
                });
                charge.base.events.append(
                    "vendor_claim_submitted",
                    format!(
                        "Претензия {} на {:.2} подана поставщику {}",
                        receipt.claim_id, submission.amount, submission.vendor_id
                    ),
                    None,
                    now,
                    actor,
                );
                self.save(&mut charge).await?;
                tracing::info!(
                    "Vendor claim {} submitted for return {}",
                    receipt.claim_id,
                    charge.to_string_id()
                );
                Ok(charge)
            }
            Err(e) => {
                self.attach_failure(&mut charge, "vendor_claim_failed", "submit_claim", &e, actor)
                    .await;
                Err(e)
            }
        }
    }

    /// Статус претензии; найденный документ получает актуальный статус
    pub async fn get_vendor_claim_status(&self, claim_id: &str) -> ReturnsResult<VendorClaimStatus> {
        if claim_id.trim().is_empty() {
            return Err(ReturnsError::validation("claim_id is required"));
        }
        let linked = self.charges.find_by_vendor_claim(claim_id).await?;

        let result = self.vendor_claims.claim_status(claim_id).await;
        let Some(linked) = linked else {
            return result;
        };
        let id = linked.base.id.value();

        match result {
            Ok(status) => {
                let stale = linked
                    .vendor_claim
                    .as_ref()
                    .map_or(false, |c| c.status != status.status);
                if stale && !linked.is_archived() {
                    let (_guard, mut charge) = self.load_for_update(id).await?;
                    if let Some(ref mut claim) = charge.vendor_claim {
                        let previous = std::mem::replace(&mut claim.status, status.status.clone());
                        charge.base.events.append(
                            "vendor_claim_status",
                            format!("Претензия {}: {} -> {}", claim_id, previous, status.status),
                            None,
                            status.updated_at.unwrap_or_else(Utc::now),
                            COLLABORATOR,
                        );
                        self.save(&mut charge).await?;
                    }
                }
                Ok(status)
            }
            Err(e) => {
                if !linked.is_archived() {
                    let (_guard, mut charge) = self.load_for_update(id).await?;
                    self.attach_failure(
                        &mut charge,
                        "vendor_claim_status_failed",
                        "claim_status",
                        &e,
                        DEFAULT_ACTOR,
                    )
                    .await;
                }
                Err(e)
            }
        }
    }

    // ------------------------------------------------------------------
    // Внутреннее
    // ------------------------------------------------------------------

    async fn load(&self, id: Uuid) -> ReturnsResult<ReturnsCharge> {
        self.charges
            .get_by_id(id)
            .await?
            .ok_or_else(|| ReturnsError::NotFound(format!("return {}", id)))
    }

    /// Захватить блокировку документа и прочитать актуальную версию
    async fn load_for_update(
        &self,
        id: Uuid,
    ) -> ReturnsResult<(OwnedMutexGuard<()>, ReturnsCharge)> {
        let guard = self.locks.acquire(id).await;
        let charge = self.load(id).await?;
        if charge.is_archived() {
            return Err(ReturnsError::validation(format!(
                "Return {} is archived",
                charge.base.code
            )));
        }
        Ok((guard, charge))
    }

    async fn save(&self, charge: &mut ReturnsCharge) -> ReturnsResult<()> {
        charge.validate().map_err(ReturnsError::Validation)?;
        let expected_version = charge.base.metadata.version;
        charge.base.metadata.increment_version();
        charge.before_write();
        self.charges.update(charge, expected_version).await
    }

    /// Сбой внешней системы сохраняется в документе для ручного разбора
    async fn attach_failure(
        &self,
        charge: &mut ReturnsCharge,
        event_type: &str,
        operation: &str,
        error: &ReturnsError,
        actor: &str,
    ) {
        let now = Utc::now();
        tracing::error!(
            "{} failed for return {}: {}",
            operation,
            charge.to_string_id(),
            error
        );
        charge.external_failures.push(ExternalFailure {
            collaborator: COLLABORATOR.to_string(),
            operation: operation.to_string(),
            message: error.to_string(),
            occurred_at: now,
        });
        charge
            .base
            .events
            .append(event_type, error.to_string(), None, now, actor);
        if let Err(save_error) = self.save(charge).await {
            tracing::error!(
                "Cannot record {} failure for return {}: {}",
                operation,
                charge.to_string_id(),
                save_error
            );
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::a030_returns_charge::cost_calculator::tests::test_policy;
    use crate::domain::a031_return_policy::repository::ReturnPolicyRepository;
    use crate::domain::a031_return_policy::service::tests::standard_request;
    use crate::shared::data::db::connect_in_memory;
    use async_trait::async_trait;
    use chrono::Duration;
    use contracts::domain::a030_returns_charge::aggregate::{
        InspectionItemInput, LogisticsEventInput, OperationalCosts, ReturnItemInput,
        ReturnMethod, ReturnReason, StatusChangeMetadata,
    };
    use contracts::domain::a030_returns_charge::vendor_claim::VendorClaimReceipt;
    use contracts::domain::a031_return_policy::{ReturnPolicy, ShippingPayer};
    use std::sync::Mutex;

    /// Документ без базы, для тестов переходов и хранилища
    pub(crate) fn sample_charge() -> ReturnsCharge {
        let policy = test_policy(10.0, 200.0, ShippingPayer::Customer);
        let items = parse_items(&[ReturnItemInput {
            product_id: 42,
            quantity_returned: 1,
            original_price: 5000.0,
            condition: "good".into(),
            condition_notes: None,
        }])
        .unwrap();
        let breakdown = cost_calculator::compute_breakdown(
            &items,
            ReturnReason::CustomerChangedMind,
            &OperationalCosts::default(),
            0.0,
            0.0,
            &policy,
        )
        .unwrap();
        ReturnsCharge::new_for_insert(
            "Тестовый возврат".into(),
            ReturnsChargeHeader {
                order_id: "ORD-1".into(),
                original_sale_id: None,
                customer_id: "CUST-1".into(),
                return_reason: ReturnReason::CustomerChangedMind,
                return_method: ReturnMethod::Mail,
                policy_id: policy.to_string_id(),
                policy_version: policy.version_no,
                customer_paid_shipping: 0.0,
            },
            items,
            ReturnsChargeFinancials {
                costs: OperationalCosts::default(),
                net_loss: breakdown.net_loss,
                breakdown,
                refund_amount: None,
                refund_received_from_vendor: 0.0,
            },
            ReturnsChargeRisk::default(),
            Utc::now(),
        )
    }

    #[derive(Default)]
    pub(crate) struct StubVendorClaims {
        pub fail: bool,
        pub submitted: Mutex<Vec<VendorClaimSubmission>>,
    }

    #[async_trait]
    impl VendorClaimsClient for StubVendorClaims {
        async fn submit_claim(
            &self,
            submission: &VendorClaimSubmission,
        ) -> ReturnsResult<VendorClaimReceipt> {
            if self.fail {
                return Err(ReturnsError::ExternalService("claims API unavailable".into()));
            }
            self.submitted.lock().unwrap().push(submission.clone());
            Ok(VendorClaimReceipt {
                claim_id: "VC-1001".into(),
                status: "submitted".into(),
            })
        }

        async fn claim_status(&self, claim_id: &str) -> ReturnsResult<VendorClaimStatus> {
            if self.fail {
                return Err(ReturnsError::ExternalService("claims API unavailable".into()));
            }
            Ok(VendorClaimStatus {
                claim_id: claim_id.to_string(),
                status: "approved".into(),
                approved_amount: Some(5000.0),
                updated_at: None,
            })
        }
    }

    pub(crate) struct Fixture {
        pub service: ReturnsService,
        pub charges: ReturnsChargeRepository,
        pub policies: ReturnPolicyService,
        pub policy: ReturnPolicy,
        pub vendor: Arc<StubVendorClaims>,
    }

    pub(crate) async fn fixture_with(vendor: StubVendorClaims) -> Fixture {
        let db = connect_in_memory().await.unwrap();
        let policies = ReturnPolicyService::new(ReturnPolicyRepository::new(db.clone()));
        let policy = policies
            .create_policy(standard_request(Utc::now() - Duration::days(365)))
            .await
            .unwrap();
        let vendor = Arc::new(vendor);
        let charges = ReturnsChargeRepository::new(db);
        let service = ReturnsService::new(
            charges.clone(),
            policies.clone(),
            vendor.clone(),
            ReturnsConfig::default(),
        );
        Fixture {
            service,
            charges,
            policies,
            policy,
            vendor,
        }
    }

    pub(crate) async fn fixture() -> Fixture {
        fixture_with(StubVendorClaims::default()).await
    }

    pub(crate) fn create_request(reason: &str, condition: &str, price: f64) -> CreateReturnsChargeRequest {
        CreateReturnsChargeRequest {
            order_id: "ORD-100".into(),
            original_sale_id: Some("SALE-100".into()),
            customer_id: "CUST-7".into(),
            return_reason: reason.into(),
            return_method: "mail".into(),
            items: vec![ReturnItemInput {
                product_id: 42,
                quantity_returned: 1,
                original_price: price,
                condition: condition.into(),
                condition_notes: None,
            }],
            costs: OperationalCosts::default(),
            customer_paid_shipping: 0.0,
            policy_id: None,
            return_initiated_date: None,
            original_purchase_date: None,
            fraud_risk_score: 10.0,
            fraud_indicators: vec![],
            description: None,
            actor: Some("operator".into()),
        }
    }

    fn status(code: &str) -> UpdateReturnStatusRequest {
        UpdateReturnStatusRequest {
            status: code.into(),
            metadata: StatusChangeMetadata::default(),
        }
    }

    fn inspection(condition: &str, resolution: &str) -> CompleteInspectionRequest {
        CompleteInspectionRequest {
            condition_assessment: "Осмотр на складе".into(),
            items: vec![InspectionItemInput {
                product_id: 42,
                condition: condition.into(),
                condition_notes: None,
                resolution: None,
            }],
            resolution_type: resolution.into(),
            costs: None,
            metadata: StatusChangeMetadata::default(),
        }
    }

    async fn move_to_inspecting(service: &ReturnsService, id: &str) {
        for code in ["in_transit", "received", "inspecting"] {
            service.update_return_status(id, status(code)).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_create_prices_with_active_policy() {
        let f = fixture().await;
        let charge = f
            .service
            .create_returns_charge(create_request("customer_changed_mind", "good", 5000.0))
            .await
            .unwrap();

        assert_eq!(charge.current_status(), ReturnStatus::Initiated);
        assert_eq!(charge.financials.breakdown.restocking_fee, 500.0);
        assert_eq!(charge.refund_ceiling(), 4500.0);
        assert_eq!(charge.header.policy_id, f.policy.to_string_id());
        assert!(!charge.risk.requires_manual_review);
        assert_eq!(charge.base.events.entries()[0].event_type, "created");
        assert_eq!(charge.base.events.entries()[0].actor, "operator");

        let loaded = f.service.get_by_id(&charge.to_string_id()).await.unwrap();
        assert_eq!(loaded.base.code, charge.base.code);
    }

    #[tokio::test]
    async fn test_create_flags_manual_review() {
        let f = fixture().await;
        let defective = f
            .service
            .create_returns_charge(create_request("defective", "defective", 5000.0))
            .await
            .unwrap();
        assert!(defective.risk.requires_manual_review);
        assert_eq!(defective.financials.breakdown.vendor_claim_potential, 5000.0);

        let mut risky = create_request("other", "new", 100.0);
        risky.fraud_risk_score = 85.0;
        let risky = f.service.create_returns_charge(risky).await.unwrap();
        assert!(risky.risk.requires_manual_review);
    }

    #[tokio::test]
    async fn test_create_validation_errors() {
        let f = fixture().await;

        let mut req = create_request("customer_changed_mind", "good", 1e308);
        req.items[0].quantity_returned = 2;
        assert!(matches!(
            f.service.create_returns_charge(req).await,
            Err(ReturnsError::Validation(_))
        ));
        assert!(f
            .service
            .list(&ReturnsChargeFilter::default())
            .await
            .unwrap()
            .is_empty());

        let mut req = create_request("other", "good", 100.0);
        req.fraud_risk_score = 120.0;
        assert!(matches!(
            f.service.create_returns_charge(req).await,
            Err(ReturnsError::Validation(_))
        ));

        let mut req = create_request("other", "good", 100.0);
        req.original_purchase_date = Some(Utc::now() - Duration::days(45));
        assert!(matches!(
            f.service.create_returns_charge(req).await,
            Err(ReturnsError::Validation(_))
        ));

        let mut req = create_request("other", "good", 100.0);
        req.items[0].quantity_returned = 0;
        assert!(matches!(
            f.service.create_returns_charge(req).await,
            Err(ReturnsError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_create_policy_errors() {
        let f = fixture().await;

        let mut req = create_request("other", "good", 100.0);
        req.return_initiated_date = Some(Utc::now() - Duration::days(400));
        assert!(matches!(
            f.service.create_returns_charge(req).await,
            Err(ReturnsError::PolicyNotFound(_))
        ));

        f.policies
            .set_active(&f.policy.to_string_id(), false)
            .await
            .unwrap();
        let mut req = create_request("other", "good", 100.0);
        req.policy_id = Some(f.policy.to_string_id());
        assert!(matches!(
            f.service.create_returns_charge(req).await,
            Err(ReturnsError::PolicyExpired { .. })
        ));
    }

    #[tokio::test]
    async fn test_full_lifecycle() {
        let f = fixture().await;
        let charge = f
            .service
            .create_returns_charge(create_request("customer_changed_mind", "good", 5000.0))
            .await
            .unwrap();
        let id = charge.to_string_id();

        move_to_inspecting(&f.service, &id).await;

        let inspected = f
            .service
            .complete_inspection(&id, inspection("fair", "partial_refund"))
            .await
            .unwrap();
        assert_eq!(inspected.current_status(), ReturnStatus::Processed);
        assert!(inspected.state.inspection_completed_date.is_some());
        // 5000 × 0.75 − 500
        assert_eq!(inspected.refund_ceiling(), 3250.0);
        assert!(!inspected.items[0].return_to_inventory);
        assert_eq!(
            inspected.resolution.resolution_type,
            Some(ResolutionType::PartialRefund)
        );
        assert!(!inspected.risk.vendor_responsible);

        let refunded = f
            .service
            .process_refund(
                &id,
                ProcessRefundRequest {
                    refund_amount: 3250.0,
                    metadata: StatusChangeMetadata::default(),
                },
            )
            .await
            .unwrap();
        assert_eq!(refunded.current_status(), ReturnStatus::Refunded);
        assert_eq!(refunded.financials.refund_amount, Some(3250.0));
        assert_eq!(refunded.resolution.resolution_amount, Some(3250.0));
        assert!(refunded.state.refund_processed_date.is_some());

        let closed = f.service.update_return_status(&id, status("closed")).await.unwrap();
        assert_eq!(closed.current_status(), ReturnStatus::Closed);
        assert!(closed.state.case_closed_date.is_some());
        assert!(closed.state.return_received_date.is_some());
        // created + 3 + inspection + refund + closed
        assert_eq!(closed.base.events.len(), 7);
        assert_eq!(closed.base.metadata.version, 6);

        let err = f
            .service
            .update_return_status(&id, status("disputed"))
            .await
            .unwrap_err();
        assert!(matches!(err, ReturnsError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_processed_and_refunded_need_dedicated_operations() {
        let f = fixture().await;
        let charge = f
            .service
            .create_returns_charge(create_request("other", "good", 100.0))
            .await
            .unwrap();
        let id = charge.to_string_id();

        for code in ["processed", "refunded"] {
            let err = f.service.update_return_status(&id, status(code)).await.unwrap_err();
            assert!(matches!(
                err,
                ReturnsError::InvalidTransition {
                    current: ReturnStatus::Initiated,
                    ..
                }
            ));
        }

        for (from, code) in [
            (ReturnStatus::Inspecting, "processed"),
            (ReturnStatus::Processed, "refunded"),
        ] {
            let mut charge = sample_charge();
            charge.state.current_status = from;
            f.charges.insert(&charge).await.unwrap();
            let err = f
                .service
                .update_return_status(&charge.to_string_id(), status(code))
                .await
                .unwrap_err();
            assert!(matches!(err, ReturnsError::Validation(_)));
        }

        let err = f
            .service
            .update_return_status(&id, status("received"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ReturnsError::InvalidTransition {
                current: ReturnStatus::Initiated,
                requested: ReturnStatus::Received
            }
        ));

        let err = f
            .service
            .complete_inspection(&id, inspection("good", "full_refund"))
            .await
            .unwrap_err();
        assert!(matches!(err, ReturnsError::InvalidTransition { .. }));

        let stored = f.service.get_by_id(&id).await.unwrap();
        assert_eq!(stored.current_status(), ReturnStatus::Initiated);
        assert_eq!(stored.base.events.len(), 1);
    }

    #[tokio::test]
    async fn test_generic_update_checks_every_status_pair() {
        let f = fixture().await;
        for from in ReturnStatus::all() {
            for to in ReturnStatus::all() {
                let mut charge = sample_charge();
                charge.state.current_status = from;
                f.charges.insert(&charge).await.unwrap();
                let id = charge.to_string_id();

                let result = f.service.update_return_status(&id, status(to.code())).await;
                let stored = f.service.get_by_id(&id).await.unwrap();

                if !from.can_transition_to(to) {
                    match result {
                        Err(ReturnsError::InvalidTransition { current, requested }) => {
                            assert_eq!((current, requested), (from, to));
                        }
                        other => panic!("{} -> {}: unexpected {:?}", from, to, other.map(|c| c.current_status())),
                    }
                } else if matches!(to, ReturnStatus::Processed | ReturnStatus::Refunded) {
                    assert!(
                        matches!(result, Err(ReturnsError::Validation(_))),
                        "{} -> {}",
                        from,
                        to
                    );
                } else {
                    assert_eq!(result.unwrap().current_status(), to);
                    assert_eq!(stored.current_status(), to);
                    continue;
                }
                assert_eq!(stored.current_status(), from, "{} -> {}", from, to);
                assert_eq!(stored.base.metadata.version, charge.base.metadata.version);
                assert_eq!(stored.base.events.len(), charge.base.events.len());
            }
        }
    }

    #[tokio::test]
    async fn test_refund_must_not_exceed_ceiling() {
        let f = fixture().await;
        let charge = f
            .service
            .create_returns_charge(create_request("customer_changed_mind", "good", 5000.0))
            .await
            .unwrap();
        let id = charge.to_string_id();

        let err = f
            .service
            .process_refund(
                &id,
                ProcessRefundRequest {
                    refund_amount: 10.0,
                    metadata: StatusChangeMetadata::default(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ReturnsError::InvalidTransition { .. }));

        move_to_inspecting(&f.service, &id).await;
        f.service
            .complete_inspection(&id, inspection("good", "full_refund"))
            .await
            .unwrap();

        for amount in [4500.01, -1.0, f64::NAN] {
            let err = f
                .service
                .process_refund(
                    &id,
                    ProcessRefundRequest {
                        refund_amount: amount,
                        metadata: StatusChangeMetadata::default(),
                    },
                )
                .await
                .unwrap_err();
            assert!(matches!(err, ReturnsError::Validation(_)));
        }
    }

    #[tokio::test]
    async fn test_concurrent_transitions_apply_once() {
        let f = fixture().await;
        let charge = f
            .service
            .create_returns_charge(create_request("other", "good", 100.0))
            .await
            .unwrap();
        let id = charge.to_string_id();

        let (a, b) = tokio::join!(
            f.service.update_return_status(&id, status("in_transit")),
            f.service.update_return_status(&id, status("in_transit")),
        );

        let ok = [&a, &b].iter().filter(|r| r.is_ok()).count();
        assert_eq!(ok, 1);
        let failed = if a.is_err() { a } else { b };
        assert!(matches!(
            failed,
            Err(ReturnsError::InvalidTransition {
                current: ReturnStatus::InTransit,
                requested: ReturnStatus::InTransit
            })
        ));

        let stored = f.service.get_by_id(&id).await.unwrap();
        assert_eq!(stored.base.events.len(), 2);
        assert_eq!(stored.base.metadata.version, 1);
    }

    #[tokio::test]
    async fn test_dispute_and_reopen() {
        let f = fixture().await;
        let charge = f
            .service
            .create_returns_charge(create_request("wrong_item", "good", 1200.0))
            .await
            .unwrap();
        let id = charge.to_string_id();

        f.service.update_return_status(&id, status("disputed")).await.unwrap();
        let reopened = f
            .service
            .update_return_status(
                &id,
                UpdateReturnStatusRequest {
                    status: "received".into(),
                    metadata: StatusChangeMetadata {
                        description: Some("Спор урегулирован".into()),
                        actor: Some("supervisor".into()),
                        ..Default::default()
                    },
                },
            )
            .await
            .unwrap();
        assert_eq!(reopened.current_status(), ReturnStatus::Received);
        let last = reopened.base.events.last().unwrap();
        assert_eq!(last.description, "Спор урегулирован");
        assert_eq!(last.actor, "supervisor");
    }

    #[tokio::test]
    async fn test_vendor_claim_submission() {
        let f = fixture().await;
        let charge = f
            .service
            .create_returns_charge(create_request("defective", "defective", 5000.0))
            .await
            .unwrap();
        let id = charge.to_string_id();

        let request = VendorClaimRequest {
            vendor_id: "vendor-7".into(),
            notes: None,
            actor: None,
        };
        let err = f
            .service
            .submit_vendor_claim(&id, request.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, ReturnsError::Validation(_)));

        move_to_inspecting(&f.service, &id).await;
        let inspected = f
            .service
            .complete_inspection(&id, inspection("defective", "full_refund"))
            .await
            .unwrap();
        assert!(inspected.risk.vendor_responsible);
        assert_eq!(inspected.risk.vendor_claim_amount, 5000.0);

        let claimed = f.service.submit_vendor_claim(&id, request).await.unwrap();
        let claim = claimed.vendor_claim.clone().unwrap();
        assert_eq!(claim.claim_id, "VC-1001");
        assert_eq!(claim.amount, 5000.0);
        assert_eq!(claimed.current_status(), ReturnStatus::Processed);
        assert_eq!(f.vendor.submitted.lock().unwrap()[0].product_ids, vec![42]);

        let events = claimed.base.events.len();
        for lookalike in ["VC-100%", "VC_1001"] {
            f.service.get_vendor_claim_status(lookalike).await.unwrap();
            let untouched = f.service.get_by_id(&id).await.unwrap();
            assert_eq!(untouched.vendor_claim.unwrap().status, "submitted");
            assert_eq!(untouched.base.events.len(), events);
        }

        let status = f.service.get_vendor_claim_status("VC-1001").await.unwrap();
        assert_eq!(status.status, "approved");
        let stored = f.service.get_by_id(&id).await.unwrap();
        assert_eq!(stored.vendor_claim.unwrap().status, "approved");
        assert_eq!(stored.base.events.last().unwrap().event_type, "vendor_claim_status");
    }

    #[tokio::test]
    async fn test_vendor_claim_failure_is_recorded() {
        let f = fixture_with(StubVendorClaims {
            fail: true,
            ..Default::default()
        })
        .await;
        let charge = f
            .service
            .create_returns_charge(create_request("damaged_in_shipping", "damaged", 800.0))
            .await
            .unwrap();
        let id = charge.to_string_id();
        move_to_inspecting(&f.service, &id).await;
        f.service
            .complete_inspection(&id, inspection("damaged", "full_refund"))
            .await
            .unwrap();

        let err = f
            .service
            .submit_vendor_claim(
                &id,
                VendorClaimRequest {
                    vendor_id: "vendor-7".into(),
                    notes: Some("Повреждение при доставке".into()),
                    actor: Some("claims-desk".into()),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ReturnsError::ExternalService(_)));

        let stored = f.service.get_by_id(&id).await.unwrap();
        assert_eq!(stored.current_status(), ReturnStatus::Processed);
        assert!(stored.vendor_claim.is_none());
        assert_eq!(stored.external_failures.len(), 1);
        assert_eq!(stored.external_failures[0].operation, "submit_claim");
        let last = stored.base.events.last().unwrap();
        assert_eq!(last.event_type, "vendor_claim_failed");
        assert_eq!(last.actor, "claims-desk");
    }

    #[tokio::test]
    async fn test_logistics_events_do_not_change_status() {
        let f = fixture().await;
        let charge = f
            .service
            .create_returns_charge(create_request("other", "good", 100.0))
            .await
            .unwrap();
        let id = charge.to_string_id();

        let updated = f
            .service
            .record_logistics_events(
                &id,
                RecordLogisticsEventsRequest {
                    events: vec![
                        LogisticsEventInput {
                            event_type: "picked_up".into(),
                            description: "Курьер забрал посылку".into(),
                            location: Some("Москва".into()),
                            timestamp: Utc::now(),
                        },
                        LogisticsEventInput {
                            event_type: "arrived_at_hub".into(),
                            description: "Посылка на сортировке".into(),
                            location: Some("Подольск".into()),
                            timestamp: Utc::now(),
                        },
                    ],
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.current_status(), ReturnStatus::Initiated);
        assert_eq!(updated.base.events.len(), 3);
        assert!(updated.base.events.entries()[1..]
            .iter()
            .all(|e| e.actor == "logistics"));

        let err = f
            .service
            .record_logistics_events(&id, RecordLogisticsEventsRequest { events: vec![] })
            .await
            .unwrap_err();
        assert!(matches!(err, ReturnsError::Validation(_)));
    }

    #[tokio::test]
    async fn test_vendor_recovery_reduces_net_loss() {
        let f = fixture().await;
        let charge = f
            .service
            .create_returns_charge(create_request("defective", "defective", 5000.0))
            .await
            .unwrap();
        assert_eq!(charge.financials.net_loss, 5000.0);

        let updated = f
            .service
            .record_vendor_recovery(
                &charge.to_string_id(),
                VendorRecoveryRequest {
                    amount: 3000.0,
                    actor: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.financials.refund_received_from_vendor, 3000.0);
        assert_eq!(updated.financials.net_loss, 2000.0);
    }

    #[tokio::test]
    async fn test_archived_charge_is_read_only() {
        let f = fixture().await;
        let charge = f
            .service
            .create_returns_charge(create_request("other", "good", 100.0))
            .await
            .unwrap();
        let id = charge.to_string_id();

        let archived = f.service.archive(&id).await.unwrap();
        assert!(archived.is_archived());

        let err = f
            .service
            .update_return_status(&id, status("in_transit"))
            .await
            .unwrap_err();
        assert!(matches!(err, ReturnsError::Validation(_)));
        assert!(f.service.get_by_id(&id).await.unwrap().is_archived());
        assert!(f
            .service
            .list(&ReturnsChargeFilter::default())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_unknown_and_malformed_ids() {
        let f = fixture().await;
        assert!(matches!(
            f.service.get_by_id(&Uuid::new_v4().to_string()).await,
            Err(ReturnsError::NotFound(_))
        ));
        assert!(matches!(
            f.service.get_by_id("RET-123").await,
            Err(ReturnsError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_preview_matches_created_charge() {
        let f = fixture().await;
        let request = create_request("customer_changed_mind", "poor", 2000.0);
        let preview = f
            .service
            .calculate_return_costs(&request.to_cost_request())
            .await
            .unwrap();
        let created = f.service.create_returns_charge(request).await.unwrap();
        assert_eq!(preview, created.financials.breakdown);
    }

    #[tokio::test]
    async fn test_dashboard_as_of_drives_delayed_processing() {
        let f = fixture().await;
        let charge = f
            .service
            .create_returns_charge(create_request("other", "good", 100.0))
            .await
            .unwrap();

        let today = f
            .service
            .get_returns_dashboard(&ReturnsDashboardRequest::default())
            .await
            .unwrap();
        assert!(today.delayed_processing.is_empty());

        let later = ReturnsDashboardRequest {
            as_of: Some(charge.state.return_initiated_date + Duration::days(9)),
            ..Default::default()
        };
        let first = f.service.get_returns_dashboard(&later).await.unwrap();
        let second = f.service.get_returns_dashboard(&later).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.delayed_processing.len(), 1);
        assert_eq!(first.delayed_processing[0].days_pending, 9);
        assert_eq!(first.delayed_processing[0].max_processing_days, 5);
    }

    #[tokio::test]
    async fn test_dashboard_reads_are_idempotent() {
        let f = fixture().await;
        for (reason, condition) in [
            ("defective", "defective"),
            ("customer_changed_mind", "good"),
            ("wrong_item", "fair"),
        ] {
            f.service
                .create_returns_charge(create_request(reason, condition, 1000.0))
                .await
                .unwrap();
        }

        let params = ReturnsDashboardRequest::default();
        let first = f.service.get_returns_dashboard(&params).await.unwrap();
        let second = f.service.get_returns_dashboard(&params).await.unwrap();

        assert_eq!(first.total_returns, 3);
        assert_eq!(first, second);
        assert_eq!(
            first.status_distribution.values().sum::<usize>(),
            first.total_returns
        );
    }
}

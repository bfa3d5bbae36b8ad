//! Расчёт финансовых последствий возврата
//!
//! Одна функция обслуживает и предварительный расчёт, и создание документа,
//! и пересчёт после осмотра. Побочных эффектов нет.

use chrono::{DateTime, Utc};
use contracts::domain::a030_returns_charge::aggregate::{
    CostBreakdown, CostCalculationRequest, CostLine, ItemCondition, OperationalCosts, ReturnItem,
    ReturnItemInput, ReturnMethod, ReturnReason,
};
use contracts::domain::a031_return_policy::{ReturnPolicy, ShippingPayer};

use crate::shared::error::{ReturnsError, ReturnsResult};
use crate::shared::format::round_money;

pub fn parse_reason(code: &str) -> ReturnsResult<ReturnReason> {
    ReturnReason::from_code(code)
        .ok_or_else(|| ReturnsError::validation(format!("Unknown return_reason: '{}'", code)))
}

pub fn parse_method(code: &str) -> ReturnsResult<ReturnMethod> {
    ReturnMethod::from_code(code)
        .ok_or_else(|| ReturnsError::validation(format!("Unknown return_method: '{}'", code)))
}

pub fn parse_condition(code: &str) -> ReturnsResult<ItemCondition> {
    ItemCondition::from_code(code)
        .ok_or_else(|| ReturnsError::validation(format!("Unknown condition: '{}'", code)))
}

/// Проверить и привести входные строки к типизированным
pub fn parse_items(items: &[ReturnItemInput]) -> ReturnsResult<Vec<ReturnItem>> {
    if items.is_empty() {
        return Err(ReturnsError::validation("At least one item is required"));
    }

    items
        .iter()
        .map(|input| {
            if input.quantity_returned <= 0 {
                return Err(ReturnsError::validation(format!(
                    "quantity_returned must be positive for product {}",
                    input.product_id
                )));
            }
            if !input.original_price.is_finite() || input.original_price < 0.0 {
                return Err(ReturnsError::validation(format!(
                    "original_price must be a non-negative number for product {}",
                    input.product_id
                )));
            }
            Ok(ReturnItem {
                product_id: input.product_id,
                quantity_returned: input.quantity_returned,
                original_price: input.original_price,
                condition: parse_condition(&input.condition)?,
                condition_notes: input.condition_notes.clone(),
                resolution: None,
                return_to_inventory: false,
            })
        })
        .collect()
}

fn ensure_amount(name: &str, value: f64) -> ReturnsResult<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(ReturnsError::validation(format!(
            "{} must be a non-negative number",
            name
        )));
    }
    Ok(())
}

/// Итог вне диапазона f64 (переполнение сумм по строкам)
pub fn ensure_finite_total(name: &str, value: f64) -> ReturnsResult<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ReturnsError::validation(format!("{} is out of range", name)))
    }
}

pub fn validate_costs(costs: &OperationalCosts) -> ReturnsResult<()> {
    for value in costs.values() {
        ensure_amount("operational cost", value)?;
    }
    Ok(())
}

/// Политика должна действовать на дату инициирования возврата
pub fn ensure_policy_active(policy: &ReturnPolicy, at: DateTime<Utc>) -> ReturnsResult<()> {
    if policy.is_active_at(at) {
        Ok(())
    } else {
        Err(ReturnsError::PolicyExpired {
            policy_id: policy.to_string_id(),
            at,
        })
    }
}

/// Предварительный расчёт по запросу клиента
pub fn calculate_return_costs(
    request: &CostCalculationRequest,
    policy: &ReturnPolicy,
    evaluated_at: DateTime<Utc>,
) -> ReturnsResult<CostBreakdown> {
    let items = parse_items(&request.items)?;
    let reason = parse_reason(&request.return_reason)?;
    parse_method(&request.return_method)?;
    ensure_policy_active(policy, evaluated_at)?;

    compute_breakdown(
        &items,
        reason,
        &request.costs,
        request.customer_paid_shipping,
        request.vendor_recovery,
        policy,
    )
}

/// Расчёт по уже проверенным строкам
pub fn compute_breakdown(
    items: &[ReturnItem],
    reason: ReturnReason,
    costs: &OperationalCosts,
    customer_paid_shipping: f64,
    vendor_recovery: f64,
    policy: &ReturnPolicy,
) -> ReturnsResult<CostBreakdown> {
    if items.is_empty() {
        return Err(ReturnsError::validation("At least one item is required"));
    }
    validate_costs(costs)?;
    ensure_amount("customer_paid_shipping", customer_paid_shipping)?;
    ensure_amount("vendor_recovery", vendor_recovery)?;

    let rules = &policy.rules;
    let vendor_case = reason.is_vendor_claimable();

    let mut lines = Vec::with_capacity(items.len());
    let mut total_return_value = 0.0;
    let mut refundable_value = 0.0;
    let mut vendor_claim_potential = 0.0;

    for item in items {
        let qty = item.quantity_returned as f64;
        let factor = item.condition.refund_factor();
        let refund_price = round_money(item.original_price * factor);
        let line_value = item.original_price * qty;
        let line_refund = refund_price * qty;

        let vendor_claimable_amount = if vendor_case && item.condition.is_vendor_claimable() {
            round_money((item.original_price - refund_price) * qty)
        } else {
            0.0
        };

        total_return_value += line_value;
        refundable_value += line_refund;
        vendor_claim_potential += vendor_claimable_amount;

        lines.push(CostLine {
            product_id: item.product_id,
            quantity_returned: item.quantity_returned,
            original_price: item.original_price,
            condition: item.condition,
            condition_factor: factor,
            refund_price,
            line_refund: round_money(line_refund),
            vendor_claimable_amount,
        });
    }

    let total_return_value = round_money(total_return_value);
    let refundable_value = round_money(refundable_value);

    let restocking_fee_waived = reason.is_company_fault();
    let restocking_fee = if restocking_fee_waived {
        0.0
    } else {
        round_money(
            rules
                .minimum_restocking_fee
                .max(total_return_value * rules.restocking_fee_percentage / 100.0),
        )
    };

    let shipping_refund =
        if rules.return_shipping_paid_by == ShippingPayer::Company || reason.is_company_fault() {
            round_money(customer_paid_shipping)
        } else {
            0.0
        };

    let refund_amount = round_money(
        (refundable_value - restocking_fee + shipping_refund)
            .max(0.0)
            .min(total_return_value),
    );

    let processing_costs = round_money(costs.total());
    let vendor_claim_potential = round_money(vendor_claim_potential);
    let net_loss =
        round_money(total_return_value - vendor_recovery + processing_costs - restocking_fee);

    ensure_finite_total("total_return_value", total_return_value)?;
    ensure_finite_total("restocking_fee", restocking_fee)?;
    ensure_finite_total("processing_costs", processing_costs)?;
    ensure_finite_total("net_loss", net_loss)?;

    Ok(CostBreakdown {
        lines,
        total_return_value,
        refundable_value,
        restocking_fee,
        restocking_fee_waived,
        shipping_refund,
        refund_amount,
        processing_costs,
        vendor_claim_potential,
        vendor_recovery: round_money(vendor_recovery),
        net_loss,
        policy_id: policy.to_string_id(),
        policy_version: policy.version_no,
    })
}

use chrono::{DateTime, NaiveDate, Utc};
use contracts::dashboards::d402_returns_dashboard::{
    DelayedReturn, FraudAlert, ReasonStat, ReturnsDashboardData, ReturnsDashboardRequest,
    TrendPoint,
};
use contracts::domain::a030_returns_charge::aggregate::{ReturnReason, ReturnsCharge};
use contracts::domain::a030_returns_charge::ReturnStatus;
use std::collections::{BTreeMap, HashMap};

use crate::shared::config::ReturnsConfig;
use crate::shared::format::{round_money, round_percent};

fn matches_filter(charge: &ReturnsCharge, params: &ReturnsDashboardRequest) -> bool {
    if charge.is_archived() {
        return false;
    }
    let initiated = charge.state.return_initiated_date.date_naive();
    if params.date_from.map_or(false, |from| initiated < from) {
        return false;
    }
    if params.date_to.map_or(false, |to| initiated > to) {
        return false;
    }
    if params
        .return_reason
        .map_or(false, |reason| charge.header.return_reason != reason)
    {
        return false;
    }
    if let Some(resolution) = params.resolution_type {
        if charge.resolution.resolution_type != Some(resolution) {
            return false;
        }
    }
    true
}

#[derive(Default)]
struct ReasonAcc {
    count: usize,
    total_value: f64,
}

#[derive(Default)]
struct DayAcc {
    count: usize,
    total_value: f64,
    resolved: usize,
}

/// Собрать дашборд возвратов
///
/// Чистая функция: одинаковые входные данные дают одинаковый результат.
/// `limits` содержит max_processing_days по id политики,
/// `now` задаёт момент отсчёта days_pending.
pub fn build_dashboard(
    charges: &[ReturnsCharge],
    limits: &HashMap<String, i64>,
    params: &ReturnsDashboardRequest,
    settings: &ReturnsConfig,
    now: DateTime<Utc>,
) -> ReturnsDashboardData {
    let selected: Vec<&ReturnsCharge> = charges
        .iter()
        .filter(|c| matches_filter(c, params))
        .collect();
    let total_returns = selected.len();

    let mut status_distribution: BTreeMap<ReturnStatus, usize> =
        ReturnStatus::all().into_iter().map(|s| (s, 0)).collect();
    let mut resolution_distribution = BTreeMap::new();
    let mut reasons: BTreeMap<ReturnReason, ReasonAcc> = BTreeMap::new();
    let mut days: BTreeMap<NaiveDate, DayAcc> = BTreeMap::new();
    let mut fraud_alerts = Vec::new();
    let mut delayed_processing = Vec::new();

    let mut total_return_value = 0.0;
    let mut total_refunded = 0.0;
    let mut total_vendor_claims = 0.0;
    let mut total_net_loss = 0.0;
    let mut manual_review_count = 0;

    for charge in &selected {
        let status = charge.current_status();
        let value = charge.total_return_value();

        *status_distribution.entry(status).or_insert(0) += 1;
        if let Some(resolution) = charge.resolution.resolution_type {
            *resolution_distribution.entry(resolution).or_insert(0) += 1;
        }

        let reason = reasons.entry(charge.header.return_reason).or_default();
        reason.count += 1;
        reason.total_value += value;

        let day = days
            .entry(charge.state.return_initiated_date.date_naive())
            .or_default();
        day.count += 1;
        day.total_value += value;
        if status.is_resolved() {
            day.resolved += 1;
        }

        total_return_value += value;
        total_refunded += charge.financials.refund_amount.unwrap_or(0.0);
        total_vendor_claims += charge.risk.vendor_claim_amount;
        total_net_loss += charge.financials.net_loss;
        if charge.risk.requires_manual_review {
            manual_review_count += 1;
        }

        if charge.risk.fraud_risk_score >= settings.fraud_alert_threshold {
            fraud_alerts.push(FraudAlert {
                return_id: charge.to_string_id(),
                code: charge.base.code.clone(),
                customer_id: charge.header.customer_id.clone(),
                fraud_risk_score: charge.risk.fraud_risk_score,
                fraud_indicators: charge.risk.fraud_indicators.clone(),
                current_status: status,
            });
        }

        if status != ReturnStatus::Closed {
            let max_days = limits
                .get(&charge.header.policy_id)
                .copied()
                .unwrap_or(settings.max_processing_days);
            let days_pending = (now - charge.state.return_initiated_date).num_days();
            if days_pending > max_days {
                delayed_processing.push(DelayedReturn {
                    return_id: charge.to_string_id(),
                    code: charge.base.code.clone(),
                    current_status: status,
                    days_pending,
                    max_processing_days: max_days,
                });
            }
        }
    }

    let mut top_return_reasons: Vec<ReasonStat> = reasons
        .into_iter()
        .map(|(reason, acc)| ReasonStat {
            reason,
            count: acc.count,
            percentage: round_percent(acc.count as f64 / total_returns as f64 * 100.0),
            total_value: round_money(acc.total_value),
        })
        .collect();
    top_return_reasons.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then(b.total_value.total_cmp(&a.total_value))
            .then_with(|| a.reason.code().cmp(b.reason.code()))
    });

    let return_trends = days
        .into_iter()
        .map(|(date, acc)| TrendPoint {
            date,
            count: acc.count,
            total_value: round_money(acc.total_value),
            resolution_rate: acc.resolved as f64 / acc.count as f64,
        })
        .collect();

    fraud_alerts.sort_by(|a, b| {
        b.fraud_risk_score
            .total_cmp(&a.fraud_risk_score)
            .then_with(|| a.code.cmp(&b.code))
    });
    delayed_processing.sort_by(|a, b| {
        b.days_pending
            .cmp(&a.days_pending)
            .then_with(|| a.code.cmp(&b.code))
    });

    ReturnsDashboardData {
        total_returns,
        total_return_value: round_money(total_return_value),
        total_refunded: round_money(total_refunded),
        total_vendor_claims: round_money(total_vendor_claims),
        total_net_loss: round_money(total_net_loss),
        manual_review_count,
        status_distribution,
        resolution_distribution,
        top_return_reasons,
        return_trends,
        fraud_alerts,
        delayed_processing,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::a030_returns_charge::service::tests::sample_charge;
    use chrono::{Duration, TimeZone};
    use contracts::domain::a030_returns_charge::aggregate::ResolutionType;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 20, 12, 0, 0).unwrap()
    }

    fn charge(
        reason: ReturnReason,
        status: ReturnStatus,
        value: f64,
        initiated: DateTime<Utc>,
    ) -> ReturnsCharge {
        let mut c = sample_charge();
        c.header.return_reason = reason;
        c.state.current_status = status;
        c.state.return_initiated_date = initiated;
        c.financials.breakdown.total_return_value = value;
        c
    }

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, d, 9, 0, 0).unwrap()
    }

    #[test]
    fn test_empty_input_gives_zero_filled_distribution() {
        let data = build_dashboard(
            &[],
            &HashMap::new(),
            &ReturnsDashboardRequest::default(),
            &ReturnsConfig::default(),
            now(),
        );
        assert_eq!(data.total_returns, 0);
        assert_eq!(data.status_distribution.len(), 8);
        assert!(data.status_distribution.values().all(|v| *v == 0));
        assert!(data.top_return_reasons.is_empty());
        assert!(data.return_trends.is_empty());
    }

    #[test]
    fn test_distribution_sums_to_total() {
        let charges = vec![
            charge(ReturnReason::Defective, ReturnStatus::Initiated, 100.0, day(19)),
            charge(ReturnReason::Defective, ReturnStatus::Refunded, 200.0, day(19)),
            charge(ReturnReason::Other, ReturnStatus::Disputed, 300.0, day(18)),
        ];
        let data = build_dashboard(
            &charges,
            &HashMap::new(),
            &ReturnsDashboardRequest::default(),
            &ReturnsConfig::default(),
            now(),
        );
        assert_eq!(data.total_returns, 3);
        assert_eq!(data.status_distribution.values().sum::<usize>(), 3);
        assert_eq!(data.status_distribution[&ReturnStatus::Disputed], 1);
        assert_eq!(data.status_distribution[&ReturnStatus::Closed], 0);
        assert_eq!(data.total_return_value, 600.0);
    }

    #[test]
    fn test_top_reasons_ordering() {
        let charges = vec![
            charge(ReturnReason::WrongItem, ReturnStatus::Initiated, 100.0, day(19)),
            charge(ReturnReason::Defective, ReturnStatus::Initiated, 100.0, day(19)),
            charge(ReturnReason::LateDelivery, ReturnStatus::Initiated, 500.0, day(19)),
            charge(ReturnReason::Other, ReturnStatus::Initiated, 50.0, day(19)),
            charge(ReturnReason::Other, ReturnStatus::Initiated, 50.0, day(19)),
        ];
        let data = build_dashboard(
            &charges,
            &HashMap::new(),
            &ReturnsDashboardRequest::default(),
            &ReturnsConfig::default(),
            now(),
        );
        let order: Vec<ReturnReason> = data.top_return_reasons.iter().map(|r| r.reason).collect();
        assert_eq!(
            order,
            vec![
                ReturnReason::Other,
                ReturnReason::LateDelivery,
                ReturnReason::Defective,
                ReturnReason::WrongItem,
            ]
        );
        assert_eq!(data.top_return_reasons[0].percentage, 40.0);
        assert_eq!(data.top_return_reasons[0].total_value, 100.0);
    }

    #[test]
    fn test_trends_are_daily_and_ascending() {
        let charges = vec![
            charge(ReturnReason::Other, ReturnStatus::Closed, 100.0, day(19)),
            charge(ReturnReason::Other, ReturnStatus::Refunded, 100.0, day(17)),
            charge(ReturnReason::Other, ReturnStatus::Initiated, 100.0, day(19)),
            charge(ReturnReason::Other, ReturnStatus::Received, 100.0, day(19)),
            charge(ReturnReason::Other, ReturnStatus::Refunded, 100.0, day(19)),
        ];
        let data = build_dashboard(
            &charges,
            &HashMap::new(),
            &ReturnsDashboardRequest::default(),
            &ReturnsConfig::default(),
            now(),
        );
        assert_eq!(data.return_trends.len(), 2);
        assert_eq!(data.return_trends[0].date, NaiveDate::from_ymd_opt(2024, 6, 17).unwrap());
        assert_eq!(data.return_trends[0].resolution_rate, 1.0);
        assert_eq!(data.return_trends[1].count, 4);
        assert_eq!(data.return_trends[1].resolution_rate, 0.5);
        assert_eq!(data.return_trends[1].total_value, 400.0);
    }

    #[test]
    fn test_fraud_alerts_sorted_by_score() {
        let mut a = charge(ReturnReason::Other, ReturnStatus::Initiated, 10.0, day(19));
        a.risk.fraud_risk_score = 75.0;
        let mut b = charge(ReturnReason::Other, ReturnStatus::Initiated, 10.0, day(19));
        b.risk.fraud_risk_score = 95.0;
        let mut c = charge(ReturnReason::Other, ReturnStatus::Initiated, 10.0, day(19));
        c.risk.fraud_risk_score = 69.9;
        let mut d = charge(ReturnReason::Other, ReturnStatus::Initiated, 10.0, day(19));
        d.risk.fraud_risk_score = 70.0;

        let data = build_dashboard(
            &[a.clone(), b.clone(), c, d.clone()],
            &HashMap::new(),
            &ReturnsDashboardRequest::default(),
            &ReturnsConfig::default(),
            now(),
        );
        let ids: Vec<String> = data.fraud_alerts.iter().map(|f| f.return_id.clone()).collect();
        assert_eq!(
            ids,
            vec![b.to_string_id(), a.to_string_id(), d.to_string_id()]
        );
    }

    #[test]
    fn test_delayed_processing_uses_policy_limit() {
        let old = charge(ReturnReason::Other, ReturnStatus::Received, 10.0, now() - Duration::days(8));
        let older = charge(ReturnReason::Other, ReturnStatus::Initiated, 10.0, now() - Duration::days(12));
        let closed = charge(ReturnReason::Other, ReturnStatus::Closed, 10.0, now() - Duration::days(30));
        let fresh = charge(ReturnReason::Other, ReturnStatus::Initiated, 10.0, now() - Duration::days(3));

        let data = build_dashboard(
            &[old.clone(), older.clone(), closed, fresh],
            &HashMap::new(),
            &ReturnsDashboardRequest::default(),
            &ReturnsConfig::default(),
            now(),
        );
        let delayed: Vec<(String, i64)> = data
            .delayed_processing
            .iter()
            .map(|d| (d.return_id.clone(), d.days_pending))
            .collect();
        assert_eq!(
            delayed,
            vec![(older.to_string_id(), 12), (old.to_string_id(), 8)]
        );

        let mut limits = HashMap::new();
        limits.insert(old.header.policy_id.clone(), 10);
        let data = build_dashboard(
            &[old, older.clone()],
            &limits,
            &ReturnsDashboardRequest::default(),
            &ReturnsConfig::default(),
            now(),
        );
        assert_eq!(data.delayed_processing.len(), 1);
        assert_eq!(data.delayed_processing[0].return_id, older.to_string_id());
        assert_eq!(data.delayed_processing[0].max_processing_days, 10);
    }

    #[test]
    fn test_filters() {
        let mut resolved = charge(ReturnReason::Defective, ReturnStatus::Processed, 10.0, day(10));
        resolved.resolution.resolution_type = Some(ResolutionType::Exchange);
        let mut archived = charge(ReturnReason::Defective, ReturnStatus::Initiated, 10.0, day(12));
        archived.base.metadata.is_archived = true;
        let charges = vec![
            resolved,
            archived,
            charge(ReturnReason::Other, ReturnStatus::Initiated, 10.0, day(12)),
            charge(ReturnReason::Defective, ReturnStatus::Initiated, 10.0, day(15)),
        ];

        let by_date = ReturnsDashboardRequest {
            date_from: NaiveDate::from_ymd_opt(2024, 6, 10),
            date_to: NaiveDate::from_ymd_opt(2024, 6, 12),
            ..Default::default()
        };
        let data = build_dashboard(&charges, &HashMap::new(), &by_date, &ReturnsConfig::default(), now());
        assert_eq!(data.total_returns, 2);

        let by_reason = ReturnsDashboardRequest {
            return_reason: Some(ReturnReason::Defective),
            ..Default::default()
        };
        let data = build_dashboard(&charges, &HashMap::new(), &by_reason, &ReturnsConfig::default(), now());
        assert_eq!(data.total_returns, 2);

        let by_resolution = ReturnsDashboardRequest {
            resolution_type: Some(ResolutionType::Exchange),
            ..Default::default()
        };
        let data = build_dashboard(&charges, &HashMap::new(), &by_resolution, &ReturnsConfig::default(), now());
        assert_eq!(data.total_returns, 1);
        assert_eq!(data.resolution_distribution[&ResolutionType::Exchange], 1);
    }

    #[test]
    fn test_same_input_same_output() {
        let charges = vec![
            charge(ReturnReason::Defective, ReturnStatus::Initiated, 100.0, day(19)),
            charge(ReturnReason::Other, ReturnStatus::Refunded, 250.0, day(3)),
        ];
        let params = ReturnsDashboardRequest::default();
        let first = build_dashboard(&charges, &HashMap::new(), &params, &ReturnsConfig::default(), now());
        let second = build_dashboard(&charges, &HashMap::new(), &params, &ReturnsConfig::default(), now());
        assert_eq!(first, second);
    }
}

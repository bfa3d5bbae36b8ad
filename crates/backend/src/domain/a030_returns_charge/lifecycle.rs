use chrono::{DateTime, Utc};
use contracts::domain::a030_returns_charge::aggregate::{ReturnsCharge, StatusChangeMetadata};
use contracts::domain::a030_returns_charge::ReturnStatus;
use contracts::domain::common::AggregateRoot;

use crate::shared::error::{ReturnsError, ReturnsResult};

pub const DEFAULT_ACTOR: &str = "system";

pub fn parse_status(code: &str) -> ReturnsResult<ReturnStatus> {
    ReturnStatus::from_code(code)
        .ok_or_else(|| ReturnsError::validation(format!("Unknown status: '{}'", code)))
}

pub fn ensure_transition(current: ReturnStatus, requested: ReturnStatus) -> ReturnsResult<()> {
    if current.can_transition_to(requested) {
        Ok(())
    } else {
        Err(ReturnsError::InvalidTransition { current, requested })
    }
}

/// Перевести документ в новый статус
///
/// Проверяет переход, проставляет дату этапа и дописывает событие в журнал.
/// Сохранение выполняет вызывающая сторона.
pub fn apply_transition(
    charge: &mut ReturnsCharge,
    requested: ReturnStatus,
    metadata: &StatusChangeMetadata,
    now: DateTime<Utc>,
) -> ReturnsResult<()> {
    let current = charge.current_status();
    ensure_transition(current, requested)?;

    let at = metadata.timestamp.unwrap_or(now);
    match requested {
        ReturnStatus::Received => charge.state.return_received_date = Some(at),
        ReturnStatus::Processed => charge.state.inspection_completed_date = Some(at),
        ReturnStatus::Refunded => charge.state.refund_processed_date = Some(at),
        ReturnStatus::Closed => charge.state.case_closed_date = Some(at),
        _ => {}
    }
    charge.state.current_status = requested;

    let description = metadata
        .description
        .clone()
        .unwrap_or_else(|| format!("{} -> {}", current, requested));
    charge.events_mut().append(
        "status_changed",
        description,
        metadata.location.clone(),
        at,
        metadata.actor.as_deref().unwrap_or(DEFAULT_ACTOR),
    );
    Ok(())
}

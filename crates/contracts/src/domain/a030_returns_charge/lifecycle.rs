use serde::{Deserialize, Serialize};

/// Статус возврата (жизненный цикл)
///
/// Порядок вариантов совпадает с порядком этапов, `Ord` используется
/// для стабильной сортировки в дашборде.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnStatus {
    Initiated,
    InTransit,
    Received,
    Inspecting,
    Processed,
    Refunded,
    Closed,
    Disputed,
}

impl ReturnStatus {
    pub fn code(&self) -> &'static str {
        match self {
            ReturnStatus::Initiated => "initiated",
            ReturnStatus::InTransit => "in_transit",
            ReturnStatus::Received => "received",
            ReturnStatus::Inspecting => "inspecting",
            ReturnStatus::Processed => "processed",
            ReturnStatus::Refunded => "refunded",
            ReturnStatus::Closed => "closed",
            ReturnStatus::Disputed => "disputed",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "initiated" => Some(ReturnStatus::Initiated),
            "in_transit" => Some(ReturnStatus::InTransit),
            "received" => Some(ReturnStatus::Received),
            "inspecting" => Some(ReturnStatus::Inspecting),
            "processed" => Some(ReturnStatus::Processed),
            "refunded" => Some(ReturnStatus::Refunded),
            "closed" => Some(ReturnStatus::Closed),
            "disputed" => Some(ReturnStatus::Disputed),
            _ => None,
        }
    }

    pub fn all() -> [ReturnStatus; 8] {
        [
            ReturnStatus::Initiated,
            ReturnStatus::InTransit,
            ReturnStatus::Received,
            ReturnStatus::Inspecting,
            ReturnStatus::Processed,
            ReturnStatus::Refunded,
            ReturnStatus::Closed,
            ReturnStatus::Disputed,
        ]
    }

    /// Таблица допустимых переходов. Единственное место, где она задана.
    pub fn allowed_transitions(&self) -> &'static [ReturnStatus] {
        use ReturnStatus::*;
        match self {
            Initiated => &[InTransit, Disputed],
            InTransit => &[Received, Disputed],
            Received => &[Inspecting, Disputed],
            Inspecting => &[Processed, Disputed],
            Processed => &[Refunded, Disputed],
            Refunded => &[Closed],
            Disputed => &[Received, Closed],
            Closed => &[],
        }
    }

    pub fn can_transition_to(&self, next: ReturnStatus) -> bool {
        self.allowed_transitions().contains(&next)
    }

    /// Конечное состояние: исходящих переходов нет
    pub fn is_terminal(&self) -> bool {
        self.allowed_transitions().is_empty()
    }

    /// Деньги возвращены или дело закрыто (для resolution_rate)
    pub fn is_resolved(&self) -> bool {
        matches!(self, ReturnStatus::Refunded | ReturnStatus::Closed)
    }
}

impl std::fmt::Display for ReturnStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

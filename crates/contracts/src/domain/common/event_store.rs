use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Запись журнала событий агрегата
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainEvent {
    /// Порядковый номер в журнале (с 1)
    pub sequence: u32,
    /// Тип события ("created", "status_changed", "inspection_completed", ...)
    pub event_type: String,
    pub description: String,
    /// Место события (склад, ПВЗ, трекинг перевозчика)
    #[serde(default)]
    pub location: Option<String>,
    pub timestamp: DateTime<Utc>,
    /// Кто инициировал: пользователь, "system", "logistics"
    pub actor: String,
}

/// Журнал доменных событий, только дозапись
///
/// Прежние записи не редактируются и не удаляются.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct EventStore {
    entries: Vec<DomainEvent>,
}

impl EventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Восстановить журнал из сохранённых записей
    pub fn from_entries(entries: Vec<DomainEvent>) -> Self {
        Self { entries }
    }

    /// Добавить событие в конец журнала
    pub fn append(
        &mut self,
        event_type: impl Into<String>,
        description: impl Into<String>,
        location: Option<String>,
        timestamp: DateTime<Utc>,
        actor: impl Into<String>,
    ) -> &DomainEvent {
        let sequence = self.entries.len() as u32 + 1;
        self.entries.push(DomainEvent {
            sequence,
            event_type: event_type.into(),
            description: description.into(),
            location,
            timestamp,
            actor: actor.into(),
        });
        &self.entries[self.entries.len() - 1]
    }

    pub fn entries(&self) -> &[DomainEvent] {
        &self.entries
    }

    pub fn last(&self) -> Option<&DomainEvent> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_assigns_sequence() {
        let mut store = EventStore::new();
        let now = Utc::now();
        store.append("created", "Возврат создан", None, now, "system");
        store.append("status_changed", "initiated -> in_transit", None, now, "courier");

        assert_eq!(store.len(), 2);
        assert_eq!(store.entries()[0].sequence, 1);
        assert_eq!(store.entries()[1].sequence, 2);
        assert_eq!(store.last().map(|e| e.actor.as_str()), Some("courier"));
    }
}

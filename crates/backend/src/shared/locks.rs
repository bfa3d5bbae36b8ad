use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// Блокировки по id документа (in-memory)
///
/// Изменения одного документа выполняются строго по очереди,
/// разные документы обрабатываются параллельно.
#[derive(Clone, Default)]
pub struct KeyedLocks {
    slots: Arc<Mutex<HashMap<Uuid, Arc<Mutex<()>>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Дождаться и захватить блокировку документа
    pub async fn acquire(&self, id: Uuid) -> OwnedMutexGuard<()> {
        let slot = {
            let mut slots = self.slots.lock().await;
            // Освободившиеся слоты больше никто не держит
            slots.retain(|key, slot| *key == id || Arc::strong_count(slot) > 1);
            slots
                .entry(id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        slot.lock_owned().await
    }

    /// Количество отслеживаемых ключей
    pub async fn len(&self) -> usize {
        self.slots.lock().await.len()
    }
}

use serde::{Deserialize, Serialize};

/// Источник данных для агрегата / события
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    /// Собственная система
    #[serde(rename = "self")]
    Self_,
    /// Логистический провайдер (трекинг обратной доставки)
    Logistics,
    /// Поставщик (претензии)
    Vendor,
}

impl Origin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Origin::Self_ => "self",
            Origin::Logistics => "logistics",
            Origin::Vendor => "vendor",
        }
    }
}

impl std::fmt::Display for Origin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

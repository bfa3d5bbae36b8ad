//! Общие типы для backend: агрегаты возвратов, политики и DTO дашборда

pub mod dashboards;
pub mod domain;

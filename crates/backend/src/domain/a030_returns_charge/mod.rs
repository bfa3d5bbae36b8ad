pub mod cost_calculator;
pub mod lifecycle;
pub mod repository;
pub mod service;
pub mod vendor_claims;

pub mod common;

pub mod a030_returns_charge;
pub mod a031_return_policy;

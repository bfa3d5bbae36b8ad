// Aggregate handlers
pub mod a030_returns_charge;
pub mod a031_return_policy;

// Dashboard handlers
pub mod d402_returns_dashboard;

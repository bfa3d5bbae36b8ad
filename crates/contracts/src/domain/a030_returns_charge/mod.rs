pub mod aggregate;
pub mod lifecycle;
pub mod vendor_claim;

pub use aggregate::{ReturnsCharge, ReturnsChargeId};
pub use lifecycle::ReturnStatus;

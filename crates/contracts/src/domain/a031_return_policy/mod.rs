pub mod aggregate;

pub use aggregate::{ReturnPolicy, ReturnPolicyId, ReturnPolicyRules, ShippingPayer};

//! Core engine: the coupon ledger and its reconciliation.

pub mod accountant;
pub mod ledger;

pub use accountant::Accountant;
pub use ledger::{CouponRequest, Ledger};

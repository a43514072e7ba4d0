//! Transaction submission with adaptive fee defaults

mod gas;
mod sender;

pub use gas::{FeeCalculator, FeeOverrides};
pub use sender::{Phase, TransactionSubmitter};

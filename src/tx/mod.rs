//! Transaction submission module with nonce management and receipt tracking

mod nonce;
pub mod status;
mod submitter;

pub use nonce::{calculate_increment, NonceCalculator};
pub use status::{TransactionStatus, TransactionStatusTask};
pub use submitter::TransactionSubmitter;

//! Domain entities shared by the ledger store, the reconciliation engine and
//! the transfer executor.

pub mod notification;
pub mod transaction;
pub mod verification;
pub mod wallet;

pub use notification::{parse_flag, NotificationPayload, NotificationRecord};
pub use transaction::{StatusChange, StatusFamily, Transaction, TransactionStatus, TransactionType};
pub use verification::{VerificationLog, VerificationOutcome, VerificationSource};
pub use wallet::{EarningsRate, Wallet};

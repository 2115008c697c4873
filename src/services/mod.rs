pub mod deposit;
pub mod earnings_rate;
pub mod idempotency;
pub mod reconciliation;
pub mod transfer;

pub use deposit::{DepositInitiation, DepositService, DepositSettings};
pub use earnings_rate::EarningsRateService;
pub use idempotency::{IdempotencyGuard, Reservation};
pub use reconciliation::{ClientVerification, ReconcileOutcome, ReconciliationEngine, RetryReport};
pub use transfer::{TransferExecutor, TransferRequest};

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One wallet per user. `balance` never goes negative; it only changes through
/// atomic deltas applied by the ledger store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    pub user_id: String,
    pub balance: BigDecimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    pub fn empty(user_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            user_id: user_id.into(),
            balance: BigDecimal::from(0),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Platform earnings rate shown on the admin dashboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EarningsRate {
    pub rate: f64,
    pub updated_at: DateTime<Utc>,
}

use chrono::Utc;
use rand::Rng;
use std::sync::Arc;

use crate::domain::EarningsRate;
use crate::error::AppError;
use crate::ports::LedgerStore;

pub const RATE_FLOOR: f64 = 12.0;
pub const RATE_SPREAD: f64 = 0.5;

/// Stateless access to the advertised earnings rate. Refreshes are driven by
/// an external scheduler (`rates refresh`), never by an in-process timer.
#[derive(Clone)]
pub struct EarningsRateService {
    store: Arc<dyn LedgerStore>,
}

impl EarningsRateService {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Returns the stored rate, initializing it on first read.
    pub async fn current(&self) -> Result<EarningsRate, AppError> {
        match self.store.get_earnings_rate().await? {
            Some(rate) => Ok(rate),
            None => self.refresh().await,
        }
    }

    /// Writes a new rate in `[RATE_FLOOR, RATE_FLOOR + RATE_SPREAD)`.
    pub async fn refresh(&self) -> Result<EarningsRate, AppError> {
        let rate = RATE_FLOOR + rand::thread_rng().gen_range(0.0..RATE_SPREAD);
        let stored = self.store.set_earnings_rate(rate, Utc::now()).await?;
        tracing::info!(rate = stored.rate, "Earnings rate refreshed");
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MemoryLedgerStore;

    #[tokio::test]
    async fn test_refresh_stays_in_range() {
        let service = EarningsRateService::new(Arc::new(MemoryLedgerStore::new()));
        for _ in 0..50 {
            let rate = service.refresh().await.unwrap().rate;
            assert!((RATE_FLOOR..RATE_FLOOR + RATE_SPREAD).contains(&rate));
        }
    }

    #[tokio::test]
    async fn test_current_initializes_once() {
        let service = EarningsRateService::new(Arc::new(MemoryLedgerStore::new()));
        let first = service.current().await.unwrap();
        let second = service.current().await.unwrap();
        assert_eq!(first.rate, second.rate);
    }

    #[tokio::test]
    async fn test_refresh_replaces_stored_rate() {
        let store = Arc::new(MemoryLedgerStore::new());
        store.set_earnings_rate(50.0, Utc::now()).await.unwrap();
        let service = EarningsRateService::new(store.clone());

        let refreshed = service.refresh().await.unwrap();
        assert!((RATE_FLOOR..RATE_FLOOR + RATE_SPREAD).contains(&refreshed.rate));
        assert_eq!(service.current().await.unwrap().rate, refreshed.rate);
    }
}

use std::sync::Arc;

use crate::domain::NotificationRecord;
use crate::ports::{LedgerStore, NotificationInsert, RepositoryResult};

/// Result of a reservation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reservation {
    pub is_duplicate: bool,
}

/// Replay protection for gateway notifications, keyed by the gateway
/// transaction id.
///
/// The lookup is only a fast path. The insert runs under the store's
/// uniqueness constraint, so two concurrent deliveries of the same id cannot
/// both reserve it.
#[derive(Clone)]
pub struct IdempotencyGuard {
    store: Arc<dyn LedgerStore>,
}

impl IdempotencyGuard {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    pub async fn is_duplicate(&self, gateway_transaction_id: &str) -> RepositoryResult<bool> {
        Ok(self
            .store
            .find_notification(gateway_transaction_id)
            .await?
            .is_some())
    }

    /// Checks for an existing notification and, if there is none, stores
    /// `record` unprocessed.
    pub async fn check_and_reserve(&self, record: &NotificationRecord) -> RepositoryResult<Reservation> {
        if self.is_duplicate(&record.gateway_transaction_id).await? {
            return Ok(Reservation { is_duplicate: true });
        }

        match self.store.insert_notification(record).await? {
            NotificationInsert::Inserted => Ok(Reservation { is_duplicate: false }),
            NotificationInsert::Duplicate => {
                tracing::info!(
                    gateway_transaction_id = %record.gateway_transaction_id,
                    "Lost notification insert race; treating as duplicate"
                );
                Ok(Reservation { is_duplicate: true })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MemoryLedgerStore;
    use crate::domain::NotificationPayload;

    fn record(id: &str) -> NotificationRecord {
        NotificationRecord::from_payload(&NotificationPayload {
            site_code: Some("TSTSTE0001".to_string()),
            transaction_id: Some(id.to_string()),
            transaction_reference: Some("ref-1".to_string()),
            amount: Some("10.00".to_string()),
            status: Some("Complete".to_string()),
            currency_code: Some("ZAR".to_string()),
            is_test: Some("false".to_string()),
            hash: Some("h".to_string()),
            ..Default::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_second_reservation_is_duplicate() {
        let guard = IdempotencyGuard::new(Arc::new(MemoryLedgerStore::new()));

        let first = guard.check_and_reserve(&record("gw-1")).await.unwrap();
        assert!(!first.is_duplicate);

        let second = guard.check_and_reserve(&record("gw-1")).await.unwrap();
        assert!(second.is_duplicate);

        let other = guard.check_and_reserve(&record("gw-2")).await.unwrap();
        assert!(!other.is_duplicate);
    }

    #[tokio::test]
    async fn test_concurrent_reservations_admit_one() {
        let guard = IdempotencyGuard::new(Arc::new(MemoryLedgerStore::new()));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let guard = guard.clone();
            handles.push(tokio::spawn(async move {
                guard.check_and_reserve(&record("gw-race")).await.unwrap()
            }));
        }

        let mut reserved = 0;
        for handle in handles {
            if !handle.await.unwrap().is_duplicate {
                reserved += 1;
            }
        }
        assert_eq!(reserved, 1);
    }
}

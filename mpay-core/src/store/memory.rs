use super::{CasOutcome, ListFilter, PaymentStore, StoreError};
use crate::entities::PaymentStatus;
use crate::entities::payment_records::{NewPayment, PaymentRecord, StatusEffects};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// In-process [`PaymentStore`].
///
/// Every compare-and-set runs under the write lock, so it is atomic with
/// respect to all other store operations. The lock is never held across an
/// await point outside the store.
#[derive(Default)]
pub struct MemoryPaymentStore {
    inner: RwLock<Tables>,
}

#[derive(Default)]
struct Tables {
    records: HashMap<Uuid, PaymentRecord>,
    by_transaction_id: HashMap<String, Uuid>,
}

impl MemoryPaymentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn now() -> time::PrimitiveDateTime {
    let now = time::OffsetDateTime::now_utc();
    time::PrimitiveDateTime::new(now.date(), now.time())
}

#[async_trait]
impl PaymentStore for MemoryPaymentStore {
    async fn insert(&self, payment: NewPayment) -> Result<PaymentRecord, StoreError> {
        payment.validate()?;
        let created_at = now();
        let record = PaymentRecord {
            token: Uuid::new_v4(),
            status: PaymentStatus::Pending,
            currency: payment.currency,
            description: payment.description,
            total: payment.total,
            tax: payment.tax,
            delivery: payment.delivery,
            captured_amount: Decimal::ZERO,
            preference_id: None,
            transaction_id: None,
            extra_data: None,
            created_at,
            updated_at: created_at,
        };
        let mut tables = self.inner.write().await;
        tables.records.insert(record.token, record.clone());
        Ok(record)
    }

    async fn get(&self, token: Uuid) -> Result<Option<PaymentRecord>, StoreError> {
        Ok(self.inner.read().await.records.get(&token).cloned())
    }

    async fn find_by_transaction_id(
        &self,
        transaction_id: &str,
    ) -> Result<Option<PaymentRecord>, StoreError> {
        let tables = self.inner.read().await;
        Ok(tables
            .by_transaction_id
            .get(transaction_id)
            .and_then(|token| tables.records.get(token))
            .cloned())
    }

    async fn list(&self, filter: ListFilter) -> Result<Vec<PaymentRecord>, StoreError> {
        let tables = self.inner.read().await;
        let mut records: Vec<_> = tables
            .records
            .values()
            .filter(|r| filter.status.is_none_or(|s| r.status == s))
            .cloned()
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records
            .into_iter()
            .skip(filter.offset.max(0) as usize)
            .take(filter.limit.max(0) as usize)
            .collect())
    }

    async fn compare_and_set_status(
        &self,
        token: Uuid,
        expected: PaymentStatus,
        next: PaymentStatus,
        effects: StatusEffects,
    ) -> Result<CasOutcome, StoreError> {
        let mut tables = self.inner.write().await;
        let Tables {
            records,
            by_transaction_id,
        } = &mut *tables;

        let Some(record) = records.get_mut(&token) else {
            return Ok(CasOutcome::NotFound);
        };
        if record.status != expected {
            return Ok(CasOutcome::Stale(record.clone()));
        }

        effects.check(record)?;
        if let Some(transaction_id) = &effects.transaction_id {
            if by_transaction_id
                .get(transaction_id)
                .is_some_and(|owner| *owner != token)
            {
                return Err(StoreError::DuplicateTransactionId(transaction_id.clone()));
            }
            by_transaction_id.insert(transaction_id.clone(), token);
        }

        effects.apply(record);
        record.status = next;
        record.updated_at = now();
        Ok(CasOutcome::Applied(record.clone()))
    }
}

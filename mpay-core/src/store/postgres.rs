use super::{CasOutcome, ListFilter, PaymentStore, StoreError};
use crate::entities::PaymentStatus;
use crate::entities::payment_records::{
    CompareAndSetPaymentStatus, GetPaymentRecordByToken, GetPaymentRecordByTransactionId,
    InsertPaymentRecord, ListPaymentRecords, NewPayment, PaymentRecord, StatusEffects,
};
use crate::framework::DatabaseProcessor;
use async_trait::async_trait;
use kanau::processor::Processor;
use uuid::Uuid;

const UNIQUE_VIOLATION: &str = "23505";

/// Postgres-backed [`PaymentStore`].
///
/// The compare-and-set is a single conditional `UPDATE`, so the database
/// provides the atomicity.
#[derive(Clone)]
pub struct PgPaymentStore {
    db: DatabaseProcessor,
}

impl PgPaymentStore {
    pub fn new(db: DatabaseProcessor) -> Self {
        Self { db }
    }
}

fn map_unique_violation(err: sqlx::Error, transaction_id: Option<&str>) -> StoreError {
    match (&err, transaction_id) {
        (sqlx::Error::Database(db_err), Some(id))
            if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) =>
        {
            StoreError::DuplicateTransactionId(id.to_string())
        }
        _ => StoreError::Database(err),
    }
}

#[async_trait]
impl PaymentStore for PgPaymentStore {
    async fn insert(&self, payment: NewPayment) -> Result<PaymentRecord, StoreError> {
        payment.validate()?;
        Ok(self.db.process(InsertPaymentRecord { payment }).await?)
    }

    async fn get(&self, token: Uuid) -> Result<Option<PaymentRecord>, StoreError> {
        Ok(self.db.process(GetPaymentRecordByToken { token }).await?)
    }

    async fn find_by_transaction_id(
        &self,
        transaction_id: &str,
    ) -> Result<Option<PaymentRecord>, StoreError> {
        Ok(self
            .db
            .process(GetPaymentRecordByTransactionId {
                transaction_id: transaction_id.to_string(),
            })
            .await?)
    }

    async fn list(&self, filter: ListFilter) -> Result<Vec<PaymentRecord>, StoreError> {
        Ok(self
            .db
            .process(ListPaymentRecords {
                status: filter.status,
                limit: filter.limit,
                offset: filter.offset,
            })
            .await?)
    }

    async fn compare_and_set_status(
        &self,
        token: Uuid,
        expected: PaymentStatus,
        next: PaymentStatus,
        effects: StatusEffects,
    ) -> Result<CasOutcome, StoreError> {
        let transaction_id = effects.transaction_id.clone();
        let updated = self
            .db
            .process(CompareAndSetPaymentStatus {
                token,
                expected,
                next,
                effects: effects.clone(),
            })
            .await
            .map_err(|e| map_unique_violation(e, transaction_id.as_deref()))?;

        if let Some(record) = updated {
            return Ok(CasOutcome::Applied(record));
        }

        // Nothing matched: the record is gone, its status moved on, or the
        // effects broke an invariant.
        match self.db.process(GetPaymentRecordByToken { token }).await? {
            None => Ok(CasOutcome::NotFound),
            Some(current) if current.status != expected => Ok(CasOutcome::Stale(current)),
            Some(current) => {
                effects.check(&current)?;
                tracing::warn!(
                    %token,
                    status = %current.status,
                    "Compare-and-set matched nothing although the status is unchanged"
                );
                Ok(CasOutcome::Stale(current))
            }
        }
    }
}

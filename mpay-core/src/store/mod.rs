//! Payment record store.
//!
//! The store is the only component allowed to mutate a [`PaymentRecord`]
//! after creation, and [`PaymentStore::compare_and_set_status`] is the only
//! mutation path. Concurrent writers for the same token are serialized by
//! the compare-and-set alone: a writer whose expected status no longer
//! matches gets [`CasOutcome::Stale`] with the current record and has to
//! decide again.

mod memory;
mod postgres;

pub use memory::MemoryPaymentStore;
pub use postgres::PgPaymentStore;

use crate::entities::PaymentStatus;
use crate::entities::payment_records::{NewPayment, PaymentRecord, StatusEffects};
use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur in the payment store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The creation input was rejected
    #[error("invalid payment: {0}")]
    InvalidPayment(String),

    /// The requested effects would break a record invariant
    #[error("invariant violated for payment {token}: {reason}")]
    InvariantViolated { token: Uuid, reason: String },

    /// The transaction id is already bound to another record
    #[error("transaction id {0} is already bound to another payment")]
    DuplicateTransactionId(String),
}

/// Result of a compare-and-set.
#[derive(Debug, Clone, PartialEq)]
pub enum CasOutcome {
    /// The write happened; carries the updated record.
    Applied(PaymentRecord),
    /// The stored status did not match; carries the current record.
    Stale(PaymentRecord),
    /// No record with that token.
    NotFound,
}

/// Filter for [`PaymentStore::list`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListFilter {
    pub status: Option<PaymentStatus>,
    pub limit: i64,
    pub offset: i64,
}

/// Durable table of payment records keyed by token.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Register a new payment in the `Pending` state.
    async fn insert(&self, payment: NewPayment) -> Result<PaymentRecord, StoreError>;

    async fn get(&self, token: Uuid) -> Result<Option<PaymentRecord>, StoreError>;

    /// Look up the record bound to a processor reference.
    async fn find_by_transaction_id(
        &self,
        transaction_id: &str,
    ) -> Result<Option<PaymentRecord>, StoreError>;

    /// List records, newest first.
    async fn list(&self, filter: ListFilter) -> Result<Vec<PaymentRecord>, StoreError>;

    /// Move `token` from `expected` to `next`, applying `effects`, only if
    /// the stored status still equals `expected`.
    async fn compare_and_set_status(
        &self,
        token: Uuid,
        expected: PaymentStatus,
        next: PaymentStatus,
        effects: StatusEffects,
    ) -> Result<CasOutcome, StoreError>;
}

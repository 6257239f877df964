use crate::entities::PaymentStatus;
use crate::framework::DatabaseProcessor;
use crate::store::StoreError;
use kanau::processor::Processor;
use rust_decimal::Decimal;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct PaymentRecord {
    pub token: Uuid,
    pub status: PaymentStatus,
    pub currency: String,
    pub description: String,
    pub total: Decimal,
    pub tax: Decimal,
    pub delivery: Decimal,
    pub captured_amount: Decimal,
    /// Checkout preference created for this payment.
    pub preference_id: Option<String>,
    /// Processor payment id, bound when the payment settles.
    pub transaction_id: Option<String>,
    pub extra_data: Option<serde_json::Value>,
    pub created_at: time::PrimitiveDateTime,
    pub updated_at: time::PrimitiveDateTime,
}

/// Data for registering a new payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPayment {
    pub currency: String,
    pub description: String,
    pub total: Decimal,
    pub tax: Decimal,
    pub delivery: Decimal,
}

impl NewPayment {
    /// Amounts must be non-negative and tax plus delivery may not exceed the total.
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.total.is_sign_negative() || self.tax.is_sign_negative() || self.delivery.is_sign_negative() {
            return Err(StoreError::InvalidPayment("amounts must be non-negative".into()));
        }
        if self.tax + self.delivery > self.total {
            return Err(StoreError::InvalidPayment(
                "tax and delivery exceed the total".into(),
            ));
        }
        if self.currency.trim().is_empty() {
            return Err(StoreError::InvalidPayment("currency is required".into()));
        }
        Ok(())
    }
}

/// Field updates applied together with a status compare-and-set.
///
/// `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusEffects {
    pub captured_amount: Option<Decimal>,
    pub preference_id: Option<String>,
    pub transaction_id: Option<String>,
    pub extra_data: Option<serde_json::Value>,
}

impl StatusEffects {
    /// Check the effects against the record invariants without applying them.
    ///
    /// The captured amount may only grow and never past the total, and the
    /// preference and transaction ids are write-once.
    pub fn check(&self, record: &PaymentRecord) -> Result<(), StoreError> {
        if let Some(amount) = self.captured_amount {
            if amount < record.captured_amount || amount > record.total {
                return Err(StoreError::InvariantViolated {
                    token: record.token,
                    reason: format!(
                        "captured amount {amount} outside [{}, {}]",
                        record.captured_amount, record.total
                    ),
                });
            }
        }
        if let (Some(new), Some(existing)) = (&self.preference_id, &record.preference_id) {
            if new != existing {
                return Err(StoreError::InvariantViolated {
                    token: record.token,
                    reason: format!("preference id already set to {existing}"),
                });
            }
        }
        if let (Some(new), Some(existing)) = (&self.transaction_id, &record.transaction_id) {
            if new != existing {
                return Err(StoreError::InvariantViolated {
                    token: record.token,
                    reason: format!("transaction id already set to {existing}"),
                });
            }
        }
        Ok(())
    }

    /// Apply checked effects to `record` in place.
    pub fn apply(self, record: &mut PaymentRecord) {
        if let Some(amount) = self.captured_amount {
            record.captured_amount = amount;
        }
        if record.preference_id.is_none() {
            record.preference_id = self.preference_id;
        }
        if record.transaction_id.is_none() {
            record.transaction_id = self.transaction_id;
        }
        if let Some(extra) = self.extra_data {
            record.extra_data = Some(extra);
        }
    }
}

#[derive(Debug, Clone)]
/// Get a payment record by its token.
pub struct GetPaymentRecordByToken {
    pub token: Uuid,
}

impl Processor<GetPaymentRecordByToken> for DatabaseProcessor {
    type Output = Option<PaymentRecord>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetPaymentRecordByToken")]
    async fn process(
        &self,
        query: GetPaymentRecordByToken,
    ) -> Result<Option<PaymentRecord>, sqlx::Error> {
        sqlx::query_as::<_, PaymentRecord>(
            r#"
            SELECT token, status, currency, description, total, tax, delivery,
                   captured_amount, preference_id, transaction_id, extra_data, created_at, updated_at
            FROM payment_records
            WHERE token = $1
            "#,
        )
        .bind(query.token)
        .fetch_optional(&self.pool)
        .await
    }
}

#[derive(Debug, Clone)]
/// Get a payment record by the processor reference bound to it.
pub struct GetPaymentRecordByTransactionId {
    pub transaction_id: String,
}

impl Processor<GetPaymentRecordByTransactionId> for DatabaseProcessor {
    type Output = Option<PaymentRecord>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetPaymentRecordByTransactionId")]
    async fn process(
        &self,
        query: GetPaymentRecordByTransactionId,
    ) -> Result<Option<PaymentRecord>, sqlx::Error> {
        sqlx::query_as::<_, PaymentRecord>(
            r#"
            SELECT token, status, currency, description, total, tax, delivery,
                   captured_amount, preference_id, transaction_id, extra_data, created_at, updated_at
            FROM payment_records
            WHERE transaction_id = $1
            "#,
        )
        .bind(query.transaction_id)
        .fetch_optional(&self.pool)
        .await
    }
}

#[derive(Debug, Clone)]
/// Insert a new pending payment record with a freshly generated token.
pub struct InsertPaymentRecord {
    pub payment: NewPayment,
}

impl Processor<InsertPaymentRecord> for DatabaseProcessor {
    type Output = PaymentRecord;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:InsertPaymentRecord")]
    async fn process(&self, insert: InsertPaymentRecord) -> Result<PaymentRecord, sqlx::Error> {
        let NewPayment {
            currency,
            description,
            total,
            tax,
            delivery,
        } = insert.payment;
        sqlx::query_as::<_, PaymentRecord>(
            r#"
            INSERT INTO payment_records
                (token, status, currency, description, total, tax, delivery, captured_amount)
            VALUES ($1, 'pending', $2, $3, $4, $5, $6, 0)
            RETURNING token, status, currency, description, total, tax, delivery,
                      captured_amount, preference_id, transaction_id, extra_data, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(currency)
        .bind(description)
        .bind(total)
        .bind(tax)
        .bind(delivery)
        .fetch_one(&self.pool)
        .await
    }
}

#[derive(Debug, Clone)]
/// List payment records, newest first, optionally filtered by status.
pub struct ListPaymentRecords {
    pub status: Option<PaymentStatus>,
    pub limit: i64,
    pub offset: i64,
}

impl Processor<ListPaymentRecords> for DatabaseProcessor {
    type Output = Vec<PaymentRecord>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:ListPaymentRecords")]
    async fn process(&self, query: ListPaymentRecords) -> Result<Vec<PaymentRecord>, sqlx::Error> {
        sqlx::query_as::<_, PaymentRecord>(
            r#"
            SELECT token, status, currency, description, total, tax, delivery,
                   captured_amount, preference_id, transaction_id, extra_data, created_at, updated_at
            FROM payment_records
            WHERE ($1::payment_status IS NULL OR status = $1)
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(query.status)
        .bind(query.limit)
        .bind(query.offset)
        .fetch_all(&self.pool)
        .await
    }
}

#[derive(Debug, Clone)]
/// Conditionally move a record from `expected` to `next`.
///
/// The row is only updated while its status still equals `expected` and the
/// effects respect the record invariants. Returns the updated row, or `None`
/// when nothing matched; callers re-read to find out why.
pub struct CompareAndSetPaymentStatus {
    pub token: Uuid,
    pub expected: PaymentStatus,
    pub next: PaymentStatus,
    pub effects: StatusEffects,
}

impl Processor<CompareAndSetPaymentStatus> for DatabaseProcessor {
    type Output = Option<PaymentRecord>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:CompareAndSetPaymentStatus")]
    async fn process(
        &self,
        update: CompareAndSetPaymentStatus,
    ) -> Result<Option<PaymentRecord>, sqlx::Error> {
        let CompareAndSetPaymentStatus {
            token,
            expected,
            next,
            effects,
        } = update;
        sqlx::query_as::<_, PaymentRecord>(
            r#"
            UPDATE payment_records
            SET status = $3,
                captured_amount = COALESCE($4, captured_amount),
                transaction_id = COALESCE(transaction_id, $5),
                extra_data = COALESCE($6, extra_data),
                preference_id = COALESCE(preference_id, $7),
                updated_at = (now() AT TIME ZONE 'utc')
            WHERE token = $1
              AND status = $2
              AND ($4::numeric IS NULL OR ($4 >= captured_amount AND $4 <= total))
              AND ($5::text IS NULL OR transaction_id IS NULL OR transaction_id = $5)
              AND ($7::text IS NULL OR preference_id IS NULL OR preference_id = $7)
            RETURNING token, status, currency, description, total, tax, delivery,
                      captured_amount, preference_id, transaction_id, extra_data, created_at, updated_at
            "#,
        )
        .bind(token)
        .bind(expected)
        .bind(next)
        .bind(effects.captured_amount)
        .bind(effects.transaction_id)
        .bind(effects.extra_data)
        .bind(effects.preference_id)
        .fetch_optional(&self.pool)
        .await
    }
}

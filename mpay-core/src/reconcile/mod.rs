//! Reconciliation engine.
//!
//! Turns processor notifications and operator actions into status
//! transitions on payment records. The engine never trusts the state a
//! notification claims: it fetches the authoritative status, asks the
//! [`policy`] what to do, and writes through the store's compare-and-set.
//! When the compare-and-set finds the record moved on, the decision is taken
//! again from the fresh record, a bounded number of times.
//!
//! A checkout stores the preference id and tags the preference with the
//! payment token as `external_reference`. Notifications carry the processor
//! payment id instead: a payment id not yet bound to a record is resolved
//! through the `external_reference` of the fetched payment, and is bound as
//! the record's transaction id by the transition that settles it. Refunds
//! and cancellations act on that payment id.
//!
//! No lock is held across processor calls. Concurrent reconciliations of the
//! same reference are serialized by the store alone, so duplicate or
//! concurrent deliveries apply a transition at most once.

pub mod policy;
pub mod retry;

use crate::config::{ConfigStore, ReconcilePolicy};
use crate::entities::PaymentStatus;
use crate::entities::payment_records::{NewPayment, PaymentRecord, StatusEffects};
use crate::gateway::{PaymentDetail, ProcessorClient, ProcessorError};
use crate::store::{CasOutcome, ListFilter, PaymentStore, StoreError};
use policy::{Action, Decision, Trigger, decide};
use retry::{RetryBounds, with_retries};
use rust_decimal::Decimal;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Preference field carrying the payment token back on every payment.
const EXTERNAL_REFERENCE: &str = "external_reference";

/// Result of a reconciliation or cancel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// A write was applied; the record now has this status.
    Settled(PaymentStatus),
    /// Nothing was written; the record keeps this status.
    Unchanged(PaymentStatus),
    /// The record kept moving under us; presumed handled by a sibling delivery.
    Abandoned,
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    /// No record for the given reference or token
    #[error("no payment found for {0}")]
    NotFound(String),

    /// The checkout preference document is unusable
    #[error("invalid preference: {0}")]
    InvalidPreference(String),

    /// The processor refused the call or answered something unusable
    #[error("processor error: {0}")]
    Processor(#[from] ProcessorError),

    /// Transient processor failures outlasted the retry budget
    #[error("processor call failed after {attempts} attempts: {last_error}")]
    ReconciliationFailed {
        attempts: u32,
        last_error: ProcessorError,
    },

    /// The operator action is not allowed from the current status
    #[error("cannot {action} a payment in status {status}")]
    IllegalTransition {
        status: PaymentStatus,
        action: Action,
    },

    /// Store failure
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Where to send the payer after a checkout was started.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutRedirect {
    pub preference_id: String,
    pub redirect_url: String,
    pub record: PaymentRecord,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RefundOutcome {
    pub refunded_amount: Decimal,
    pub record: PaymentRecord,
}

/// How a decide-and-write loop ended.
enum Settlement {
    Applied(PaymentRecord),
    NoChange(PaymentRecord),
    Refused(PaymentRecord),
    Abandoned(PaymentRecord),
}

/// The reconciliation engine.
#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn PaymentStore>,
    processor: Arc<dyn ProcessorClient>,
    policy: ConfigStore<ReconcilePolicy>,
    sandbox: bool,
}

impl Reconciler {
    /// Create a new Reconciler.
    ///
    /// # Arguments
    ///
    /// * `store` - Payment record store
    /// * `processor` - Processor client
    /// * `policy` - Retry bounds, re-read for every operation
    /// * `sandbox` - Redirect payers to the sandbox checkout
    pub fn new(
        store: Arc<dyn PaymentStore>,
        processor: Arc<dyn ProcessorClient>,
        policy: ConfigStore<ReconcilePolicy>,
        sandbox: bool,
    ) -> Self {
        Self {
            store,
            processor,
            policy,
            sandbox,
        }
    }

    pub fn policy(&self) -> &ConfigStore<ReconcilePolicy> {
        &self.policy
    }

    /// Bring the record paid by processor payment `reference_id` in line
    /// with the processor.
    #[tracing::instrument(skip(self))]
    pub async fn reconcile(&self, reference_id: &str) -> Result<Outcome, ReconcileError> {
        let bound = self.store.find_by_transaction_id(reference_id).await?;
        // Only a waiting payment can be moved by a notification.
        if let Some(record) = bound.as_ref().filter(|r| r.status != PaymentStatus::Waiting) {
            debug!(token = %record.token, status = %record.status, "Payment already settled");
            return Ok(Outcome::Unchanged(record.status));
        }

        let policy = self.policy.snapshot().await;
        let detail = with_retries("fetch_payment", fetch_bounds(&policy), || {
            self.processor.fetch_payment(reference_id)
        })
        .await
        .inspect_err(|e| {
            if let ReconcileError::ReconciliationFailed { attempts, last_error } = e {
                error!(
                    alert = true,
                    attempts,
                    error = %last_error,
                    "Could not fetch payment status from processor"
                );
            }
        })?;
        debug!(processor_status = %detail.status, "Fetched payment status");

        let record = match bound {
            Some(record) => record,
            None => self.resolve_external_reference(reference_id, &detail).await?,
        };
        if record.status != PaymentStatus::Waiting {
            if record.transaction_id.as_deref() != Some(reference_id) {
                warn!(
                    token = %record.token,
                    status = %record.status,
                    bound = record.transaction_id.as_deref(),
                    "Notification for another payment of a settled record"
                );
            }
            return Ok(Outcome::Unchanged(record.status));
        }

        let trigger = Trigger::Notification {
            processor_status: &detail.status,
        };
        let effects = StatusEffects {
            transaction_id: Some(reference_id.to_string()),
            extra_data: Some(detail.raw.clone()),
            ..Default::default()
        };
        let settlement = self
            .settle(record, trigger, effects, policy.stale_retries)
            .await?;
        Ok(match settlement {
            Settlement::Applied(record) => Outcome::Settled(record.status),
            Settlement::NoChange(record) | Settlement::Refused(record) => {
                Outcome::Unchanged(record.status)
            }
            Settlement::Abandoned(_) => Outcome::Abandoned,
        })
    }

    /// Find the record a payment not yet bound to any record belongs to.
    async fn resolve_external_reference(
        &self,
        reference_id: &str,
        detail: &PaymentDetail,
    ) -> Result<PaymentRecord, ReconcileError> {
        let token = detail
            .external_reference
            .as_deref()
            .and_then(|reference| Uuid::parse_str(reference.trim()).ok());
        let record = match token {
            Some(token) => self.store.get(token).await?,
            None => None,
        };
        record.ok_or_else(|| {
            info!(
                external_reference = detail.external_reference.as_deref(),
                "No payment bound to reference, ignoring"
            );
            ReconcileError::NotFound(reference_id.to_string())
        })
    }

    /// Register a checkout preference for a pending payment and move it to
    /// waiting.
    ///
    /// The preference document is passed through with `external_reference`
    /// set to the payment token; any value the caller put there is replaced.
    #[tracing::instrument(skip(self, preference))]
    pub async fn begin_checkout(
        &self,
        token: Uuid,
        preference: &Value,
    ) -> Result<CheckoutRedirect, ReconcileError> {
        let mut preference = preference.clone();
        let Some(fields) = preference.as_object_mut() else {
            return Err(ReconcileError::InvalidPreference(
                "preference must be a JSON object".into(),
            ));
        };
        fields.insert(EXTERNAL_REFERENCE.into(), Value::String(token.to_string()));

        let record = self.require(token).await?;
        refuse_unless_allowed(&record, Trigger::CheckoutStarted)?;

        let policy = self.policy.snapshot().await;
        // Preference creation is not idempotent: one attempt only.
        let bounds = RetryBounds {
            attempts: 1,
            ..fetch_bounds(&policy)
        };
        let created = with_retries("create_preference", bounds, || {
            self.processor.create_preference(&preference)
        })
        .await?;
        let redirect_url = created.redirect_url(self.sandbox)?.to_string();
        let preference_id = created.id.clone();

        let effects = StatusEffects {
            preference_id: Some(created.id),
            extra_data: Some(created.raw),
            ..Default::default()
        };
        let settlement = self
            .settle(record, Trigger::CheckoutStarted, effects, policy.stale_retries)
            .await?;
        match settlement {
            Settlement::Applied(record) => {
                info!(%token, %preference_id, "Checkout started");
                Ok(CheckoutRedirect {
                    preference_id,
                    redirect_url,
                    record,
                })
            }
            Settlement::NoChange(record)
            | Settlement::Refused(record)
            | Settlement::Abandoned(record) => Err(illegal(&record, Action::Checkout)),
        }
    }

    /// Fully refund a confirmed payment.
    #[tracing::instrument(skip(self))]
    pub async fn refund(&self, token: Uuid) -> Result<RefundOutcome, ReconcileError> {
        let record = self.require(token).await?;
        refuse_unless_allowed(&record, Trigger::RefundRequested)?;
        let Some(reference_id) = record.transaction_id.clone() else {
            return Err(illegal(&record, Action::Refund));
        };

        let policy = self.policy.snapshot().await;
        let idempotency_key = format!("refund-{token}");
        let receipt = with_retries("refund", fetch_bounds(&policy), || {
            self.processor.refund(&reference_id, &idempotency_key)
        })
        .await?;

        let effects = StatusEffects {
            extra_data: Some(receipt.raw),
            ..Default::default()
        };
        let settlement = self
            .settle(record, Trigger::RefundRequested, effects, policy.stale_retries)
            .await?;
        match settlement {
            Settlement::Applied(record) => {
                info!(%token, amount = %record.captured_amount, "Payment refunded");
                Ok(RefundOutcome {
                    refunded_amount: record.captured_amount,
                    record,
                })
            }
            // A concurrent refund got there first.
            Settlement::Refused(record) if record.status == PaymentStatus::Refunded => {
                Ok(RefundOutcome {
                    refunded_amount: record.captured_amount,
                    record,
                })
            }
            Settlement::NoChange(record)
            | Settlement::Refused(record)
            | Settlement::Abandoned(record) => Err(illegal(&record, Action::Refund)),
        }
    }

    /// Cancel a payment, at the processor first when a processor payment is
    /// bound to it.
    #[tracing::instrument(skip(self))]
    pub async fn cancel(&self, token: Uuid) -> Result<Outcome, ReconcileError> {
        let record = self.require(token).await?;
        if decide(record.status, Trigger::CancelRequested) == Decision::NoChange {
            return Ok(Outcome::Unchanged(record.status));
        }

        let policy = self.policy.snapshot().await;
        let extra_data = match record.transaction_id.as_deref() {
            Some(reference_id) => {
                let receipt = with_retries("cancel", fetch_bounds(&policy), || {
                    self.processor.cancel(reference_id)
                })
                .await?;
                Some(receipt.raw)
            }
            None => None,
        };

        let effects = StatusEffects {
            extra_data,
            ..Default::default()
        };
        let settlement = self
            .settle(record, Trigger::CancelRequested, effects, policy.stale_retries)
            .await?;
        Ok(match settlement {
            Settlement::Applied(record) => {
                info!(%token, "Payment cancelled");
                Outcome::Settled(record.status)
            }
            Settlement::NoChange(record) | Settlement::Refused(record) => {
                Outcome::Unchanged(record.status)
            }
            Settlement::Abandoned(_) => Outcome::Abandoned,
        })
    }

    pub async fn create_payment(&self, payment: NewPayment) -> Result<PaymentRecord, ReconcileError> {
        let record = self.store.insert(payment).await?;
        info!(token = %record.token, total = %record.total, "Payment created");
        Ok(record)
    }

    pub async fn get(&self, token: Uuid) -> Result<Option<PaymentRecord>, ReconcileError> {
        Ok(self.store.get(token).await?)
    }

    pub async fn list(&self, filter: ListFilter) -> Result<Vec<PaymentRecord>, ReconcileError> {
        Ok(self.store.list(filter).await?)
    }

    async fn require(&self, token: Uuid) -> Result<PaymentRecord, ReconcileError> {
        self.store
            .get(token)
            .await?
            .ok_or_else(|| ReconcileError::NotFound(token.to_string()))
    }

    /// Decide and compare-and-set until a write lands, the policy says stop,
    /// or the stale budget runs out.
    async fn settle(
        &self,
        mut record: PaymentRecord,
        trigger: Trigger<'_>,
        effects: StatusEffects,
        stale_retries: u32,
    ) -> Result<Settlement, ReconcileError> {
        for round in 0..=stale_retries {
            let (expected, next, capture) = match decide(record.status, trigger) {
                Decision::Transition {
                    expected,
                    next,
                    capture,
                } => (expected, next, capture),
                Decision::NoChange => return Ok(Settlement::NoChange(record)),
                Decision::Refused => return Ok(Settlement::Refused(record)),
            };

            let mut attempt = effects.clone();
            attempt.captured_amount = capture.resolve(record.total);
            // A payment id is bound only by the transition it settles.
            if expected == next {
                attempt.transaction_id = None;
            }
            match self
                .store
                .compare_and_set_status(record.token, expected, next, attempt)
                .await?
            {
                CasOutcome::Applied(updated) => {
                    if expected != next {
                        info!(token = %updated.token, from = %expected, to = %next, "Payment status changed");
                    }
                    return Ok(Settlement::Applied(updated));
                }
                CasOutcome::Stale(current) => {
                    debug!(
                        token = %current.token,
                        expected = %expected,
                        actual = %current.status,
                        round,
                        "Stale compare-and-set, deciding again"
                    );
                    record = current;
                }
                CasOutcome::NotFound => {
                    return Err(ReconcileError::NotFound(record.token.to_string()));
                }
            }
        }

        warn!(
            token = %record.token,
            status = %record.status,
            stale_retries,
            "Giving up after repeated stale writes"
        );
        Ok(Settlement::Abandoned(record))
    }
}

fn fetch_bounds(policy: &ReconcilePolicy) -> RetryBounds {
    RetryBounds {
        attempts: policy.fetch_attempts,
        base: policy.backoff_base,
        max: policy.backoff_max,
        timeout: policy.fetch_timeout,
    }
}

fn illegal(record: &PaymentRecord, action: Action) -> ReconcileError {
    ReconcileError::IllegalTransition {
        status: record.status,
        action,
    }
}

fn refuse_unless_allowed(record: &PaymentRecord, trigger: Trigger<'_>) -> Result<(), ReconcileError> {
    match (decide(record.status, trigger), trigger.action()) {
        (Decision::Refused, Some(action)) => Err(illegal(record, action)),
        _ => Ok(()),
    }
}

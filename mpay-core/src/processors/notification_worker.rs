//! NotificationWorker processor.
//!
//! The NotificationWorker is responsible for:
//! - Receiving `NotificationEvent` from the ingress queue
//! - Running one reconciliation per event, concurrently, bounded by
//!   `max_in_flight`
//! - Stopping on the shutdown signal and aborting in-flight reconciliations
//!
//! Aborting is safe: a reconciliation has no side effect before its final
//! compare-and-set, and the processor redelivers unacknowledged changes.

use crate::events::{NotificationEvent, NotificationEventReceiver};
use crate::reconcile::{ReconcileError, Reconciler};
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// NotificationWorker drains the ingress queue into the reconciler.
pub struct NotificationWorker {
    reconciler: Reconciler,
    notification_rx: NotificationEventReceiver,
    shutdown_rx: watch::Receiver<bool>,
}

impl NotificationWorker {
    /// Create a new NotificationWorker.
    ///
    /// # Arguments
    ///
    /// * `reconciler` - The reconciliation engine
    /// * `notification_rx` - Receiver for NotificationEvent events
    /// * `shutdown_rx` - Receiver for shutdown signal
    pub fn new(
        reconciler: Reconciler,
        notification_rx: NotificationEventReceiver,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            reconciler,
            notification_rx,
            shutdown_rx,
        }
    }

    /// Run the NotificationWorker.
    ///
    /// Returns when the shutdown signal fires, or once the queue is closed
    /// and every in-flight reconciliation has finished.
    pub async fn run(mut self) {
        // Read once; a changed limit applies after a restart.
        let max_in_flight = self.reconciler.policy().read().await.max_in_flight.max(1);
        let semaphore = Arc::new(Semaphore::new(max_in_flight));
        let mut tasks = JoinSet::new();
        info!(max_in_flight, "NotificationWorker started");

        let mut queue_closed = false;
        loop {
            if queue_closed && tasks.is_empty() {
                info!("Notification channel closed");
                break;
            }

            tokio::select! {
                biased;

                changed = self.shutdown_rx.changed() => {
                    if changed.is_err() || *self.shutdown_rx.borrow() {
                        info!("NotificationWorker received shutdown signal");
                        break;
                    }
                }

                Some(joined) = tasks.join_next() => {
                    if let Err(e) = joined {
                        if e.is_panic() {
                            error!(error = %e, "Reconciliation task panicked");
                        }
                    }
                }

                event = self.notification_rx.recv(), if !queue_closed && semaphore.available_permits() > 0 => {
                    let Some(event) = event else {
                        queue_closed = true;
                        continue;
                    };
                    let Ok(permit) = semaphore.clone().try_acquire_owned() else {
                        warn!(reference_id = %event.reference_id, "No reconciliation slot free, dropping notification");
                        continue;
                    };
                    let reconciler = self.reconciler.clone();
                    tasks.spawn(async move {
                        let _permit = permit;
                        process_event(&reconciler, event).await;
                    });
                }
            }
        }

        self.notification_rx.close();
        if !tasks.is_empty() {
            info!(in_flight = tasks.len(), "Aborting in-flight reconciliations");
        }
        tasks.shutdown().await;
        info!("NotificationWorker shutdown complete");
    }
}

async fn process_event(reconciler: &Reconciler, event: NotificationEvent) {
    let queued_ms = (OffsetDateTime::now_utc() - event.received_at).whole_milliseconds() as i64;
    debug!(reference_id = %event.reference_id, queued_ms, "Reconciling notification");

    match reconciler.reconcile(&event.reference_id).await {
        Ok(outcome) => {
            debug!(reference_id = %event.reference_id, ?outcome, "Notification reconciled");
        }
        // Both are logged where they happen.
        Err(ReconcileError::NotFound(_) | ReconcileError::ReconciliationFailed { .. }) => {}
        Err(e) => {
            error!(
                reference_id = %event.reference_id,
                error = %e,
                "Failed to reconcile notification"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigStore, ReconcilePolicy};
    use crate::entities::PaymentStatus;
    use crate::entities::payment_records::{NewPayment, StatusEffects};
    use crate::events::notification_channel;
    use crate::gateway::{
        PaymentDetail, PreferenceCreated, ProcessorClient, ProcessorError, ProcessorReceipt,
    };
    use crate::store::{MemoryPaymentStore, PaymentStore};
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use serde_json::{Value, json};
    use std::collections::HashMap;
    use std::time::Duration;
    use uuid::Uuid;

    /// Answers every fetch with one status, or never answers.
    struct FixedProcessor {
        status: &'static str,
        stall: bool,
        /// Payment id to the token its preference was created for.
        external_references: HashMap<String, String>,
    }

    #[async_trait]
    impl ProcessorClient for FixedProcessor {
        async fn create_preference(&self, _: &Value) -> Result<PreferenceCreated, ProcessorError> {
            Err(ProcessorError::Application {
                status: 400,
                message: "unused".into(),
            })
        }

        async fn fetch_payment(&self, reference_id: &str) -> Result<PaymentDetail, ProcessorError> {
            if self.stall {
                std::future::pending::<()>().await;
            }
            Ok(PaymentDetail {
                reference_id: reference_id.to_string(),
                status: self.status.to_string(),
                external_reference: self.external_references.get(reference_id).cloned(),
                raw: json!({ "status": self.status }),
            })
        }

        async fn refund(&self, _: &str, _: &str) -> Result<ProcessorReceipt, ProcessorError> {
            Err(ProcessorError::Timeout)
        }

        async fn cancel(&self, _: &str) -> Result<ProcessorReceipt, ProcessorError> {
            Err(ProcessorError::Timeout)
        }
    }

    async fn setup(
        status: &'static str,
        stall: bool,
        references: &[&str],
    ) -> (Reconciler, Vec<Uuid>) {
        let store = Arc::new(MemoryPaymentStore::new());
        let mut tokens = Vec::new();
        let mut external_references = HashMap::new();
        for reference in references {
            let record = store
                .insert(NewPayment {
                    currency: "MXN".into(),
                    description: "payment".into(),
                    total: Decimal::new(10000, 2),
                    tax: Decimal::ZERO,
                    delivery: Decimal::ZERO,
                })
                .await
                .unwrap();
            store
                .compare_and_set_status(
                    record.token,
                    PaymentStatus::Pending,
                    PaymentStatus::Waiting,
                    StatusEffects {
                        preference_id: Some(format!("pref-{reference}")),
                        ..Default::default()
                    },
                )
                .await
                .unwrap();
            external_references.insert(reference.to_string(), record.token.to_string());
            tokens.push(record.token);
        }
        let processor = FixedProcessor {
            status,
            stall,
            external_references,
        };
        let policy = ReconcilePolicy {
            max_in_flight: 2,
            ..ReconcilePolicy::default()
        };
        let reconciler = Reconciler::new(
            store,
            Arc::new(processor),
            ConfigStore::new(policy),
            true,
        );
        (reconciler, tokens)
    }

    #[tokio::test]
    async fn test_worker_reconciles_queued_events_and_drains_on_close() {
        let references = ["101", "102", "103", "unknown"];
        let (reconciler, tokens) = setup("approved", false, &references[..3]).await;
        let (tx, rx) = notification_channel(8);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        for reference in references {
            tx.send(NotificationEvent::new(reference)).await.unwrap();
        }
        drop(tx);

        // The shutdown sender stays alive: a closed queue alone ends the run.
        tokio::time::timeout(
            Duration::from_secs(5),
            NotificationWorker::new(reconciler.clone(), rx, shutdown_rx).run(),
        )
        .await
        .unwrap();

        for (token, reference) in tokens.into_iter().zip(references) {
            let record = reconciler.get(token).await.unwrap().unwrap();
            assert_eq!(record.status, PaymentStatus::Confirmed);
            assert_eq!(record.transaction_id.as_deref(), Some(reference));
        }
    }

    #[tokio::test]
    async fn test_shutdown_aborts_in_flight_reconciliations() {
        let (reconciler, tokens) = setup("approved", true, &["201"]).await;
        let (tx, rx) = notification_channel(8);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let worker = tokio::spawn(NotificationWorker::new(reconciler.clone(), rx, shutdown_rx).run());
        tx.send(NotificationEvent::new("201")).await.unwrap();
        // Let the worker pick the event up and block on the processor.
        tokio::task::yield_now().await;
        shutdown_tx.send(true).unwrap();
        worker.await.unwrap();

        let record = reconciler.get(tokens[0]).await.unwrap().unwrap();
        assert_eq!(record.status, PaymentStatus::Waiting);
        assert!(tx.send(NotificationEvent::new("201")).await.is_err());
    }
}

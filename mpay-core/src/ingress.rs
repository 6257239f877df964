//! Notification ingress.
//!
//! Receives processor notifications, authenticates them when a webhook
//! secret is configured, and queues the actionable ones for the
//! notification worker. Every notification is acknowledged: the processor
//! keeps redelivering anything it does not see accepted, and nothing here is
//! worth a redelivery.

use crate::config::ProcessorConfig;
use crate::events::{NotificationEvent, NotificationEventSender};
use mpay_sdk::objects::{NotificationBody, PAYMENT_EVENT_TYPE};
use mpay_sdk::signature::WebhookSignature;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error, warn};

/// An inbound notification as received over HTTP.
#[derive(Debug, Clone, Default)]
pub struct RawNotification {
    pub query: Vec<(String, String)>,
    pub body: Vec<u8>,
    /// `x-signature` header
    pub signature: Option<String>,
    /// `x-request-id` header
    pub request_id: Option<String>,
}

/// Why a notification was not queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    UnsupportedType,
    MissingReference,
    InvalidSignature,
    QueueUnavailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ack {
    Queued,
    Ignored(IgnoreReason),
}

/// Extracted type and reference. Query parameters win over the body.
struct Extracted {
    event_type: Option<String>,
    reference_id: Option<String>,
}

impl RawNotification {
    fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    fn extract(&self) -> Extracted {
        let body = if self.body.is_empty() {
            NotificationBody::default()
        } else {
            serde_json::from_slice::<NotificationBody>(&self.body).unwrap_or_else(|e| {
                debug!(error = %e, "Notification body is not a processor webhook");
                NotificationBody::default()
            })
        };

        let event_type = self
            .query_param("type")
            .map(str::to_owned)
            .or_else(|| body.event_type.clone());
        let reference_id = self
            .query_param("data.id")
            .or_else(|| body.reference_id())
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_owned);
        Extracted {
            event_type,
            reference_id,
        }
    }
}

/// Front door for processor notifications.
#[derive(Clone)]
pub struct NotificationIngress {
    queue: NotificationEventSender,
    webhook_secret: Option<Box<[u8]>>,
}

impl NotificationIngress {
    pub fn new(queue: NotificationEventSender, config: &ProcessorConfig) -> Self {
        Self {
            queue,
            webhook_secret: config
                .webhook_secret
                .as_ref()
                .map(|s| s.as_bytes().into()),
        }
    }

    /// Classify a notification and queue it when actionable.
    pub fn accept(&self, raw: RawNotification) -> Ack {
        let Extracted {
            event_type,
            reference_id,
        } = raw.extract();

        if let Some(secret) = &self.webhook_secret {
            let verified = raw
                .signature
                .as_deref()
                .ok_or(mpay_sdk::signature::SignatureError::InvalidFormat)
                .and_then(WebhookSignature::parse)
                .and_then(|sig| {
                    sig.verify(reference_id.as_deref(), raw.request_id.as_deref(), secret)
                });
            if let Err(e) = verified {
                warn!(
                    error = %e,
                    reference_id = reference_id.as_deref(),
                    "Dropping notification with a missing or invalid signature"
                );
                return Ack::Ignored(IgnoreReason::InvalidSignature);
            }
        }

        if event_type.as_deref() != Some(PAYMENT_EVENT_TYPE) {
            debug!(event_type = event_type.as_deref(), "Ignoring non-payment notification");
            return Ack::Ignored(IgnoreReason::UnsupportedType);
        }
        let Some(reference_id) = reference_id else {
            warn!("Payment notification without a reference id");
            return Ack::Ignored(IgnoreReason::MissingReference);
        };

        match self.queue.try_send(NotificationEvent::new(reference_id)) {
            Ok(()) => Ack::Queued,
            Err(TrySendError::Full(event)) => {
                error!(
                    reference_id = %event.reference_id,
                    "Notification queue is full, dropping; the processor will redeliver"
                );
                Ack::Ignored(IgnoreReason::QueueUnavailable)
            }
            Err(TrySendError::Closed(event)) => {
                error!(
                    reference_id = %event.reference_id,
                    "Notification queue is closed, dropping"
                );
                Ack::Ignored(IgnoreReason::QueueUnavailable)
            }
        }
    }
}

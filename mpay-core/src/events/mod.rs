//! Event types and channels.
//!
//! # Event Flow
//!
//! 1. Notification ingress emits `NotificationEvent` -> `NotificationWorker`
//! 2. `NotificationWorker` runs the reconciler for each event
//!
//! Events are ephemeral and carry identifiers only; the reconciler fetches
//! the payment state itself.

pub mod channels;
pub mod types;

pub use channels::{
    DEFAULT_CHANNEL_BUFFER, NotificationEventReceiver, NotificationEventSender,
    notification_channel,
};

pub use types::NotificationEvent;

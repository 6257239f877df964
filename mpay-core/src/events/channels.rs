//! Event channel factories and handles.

use super::types::NotificationEvent;
use tokio::sync::mpsc;

/// Default buffer size for event channels.
///
/// Enough to absorb a burst of processor redeliveries while keeping memory
/// bounded; the ingress drops events when it is full.
pub const DEFAULT_CHANNEL_BUFFER: usize = 256;

/// Sender handle for NotificationEvent events.
pub type NotificationEventSender = mpsc::Sender<NotificationEvent>;
/// Receiver handle for NotificationEvent events.
pub type NotificationEventReceiver = mpsc::Receiver<NotificationEvent>;

/// Create the queue between the notification ingress and the worker.
pub fn notification_channel(buffer: usize) -> (NotificationEventSender, NotificationEventReceiver) {
    mpsc::channel(buffer)
}

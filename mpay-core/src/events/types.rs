//! Event type definitions.

use time::OffsetDateTime;

/// An actionable processor notification.
///
/// Only the reference id is carried; the payment state itself is always
/// fetched from the processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationEvent {
    pub reference_id: String,
    pub received_at: OffsetDateTime,
}

impl NotificationEvent {
    pub fn new(reference_id: impl Into<String>) -> Self {
        Self {
            reference_id: reference_id.into(),
            received_at: OffsetDateTime::now_utc(),
        }
    }
}

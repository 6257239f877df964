//! Long-running processors.
//!
//! - `NotificationWorker`: Receives `NotificationEvent`, runs reconciliations

pub mod notification_worker;

pub use notification_worker::NotificationWorker;

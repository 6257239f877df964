use std::time::Duration;

/// Retry and concurrency bounds of the reconciliation engine.
///
/// Kept in a [`ConfigStore`](super::ConfigStore) and re-read for every
/// reconciliation, so a reload applies to the next event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilePolicy {
    /// Attempts per processor call, the first one included.
    pub fetch_attempts: u32,
    /// Delay before the first retry; doubles per attempt.
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    /// Fresh decisions taken after a stale compare-and-set before giving up.
    pub stale_retries: u32,
    /// Bound on a single processor call.
    pub fetch_timeout: Duration,
    /// Reconciliations the notification worker runs at once.
    pub max_in_flight: usize,
}

impl Default for ReconcilePolicy {
    fn default() -> Self {
        Self {
            fetch_attempts: 4,
            backoff_base: Duration::from_millis(250),
            backoff_max: Duration::from_secs(8),
            stale_retries: 3,
            fetch_timeout: Duration::from_secs(15),
            max_in_flight: 16,
        }
    }
}

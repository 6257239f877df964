//! Application state shared across all request handlers.

use mpay_core::config::{ConfigStore, ServiceConfig};
use mpay_core::ingress::NotificationIngress;
use mpay_core::reconcile::Reconciler;

/// Application state that is shared across all request handlers.
///
/// This is cloneable and cheap to pass around (everything is behind Arc).
#[derive(Clone)]
pub struct AppState {
    /// Reconciliation engine, also serving the Service API reads.
    pub reconciler: Reconciler,
    /// Front door for processor notifications.
    pub ingress: NotificationIngress,
    /// Service API credentials (can be reloaded via SIGHUP).
    pub service: ConfigStore<ServiceConfig>,
}

impl AppState {
    pub fn new(
        reconciler: Reconciler,
        ingress: NotificationIngress,
        service: ConfigStore<ServiceConfig>,
    ) -> Self {
        Self {
            reconciler,
            ingress,
            service,
        }
    }
}

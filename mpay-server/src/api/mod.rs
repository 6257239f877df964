//! HTTP API surfaces.
//!
//! - `/notifications` – processor notifications, unauthenticated, always 200
//! - `/api/v1`        – Service API for the host application

pub mod extractors;
pub mod notifications;
pub mod payments;

use axum::Router;

use crate::state::AppState;

/// Build the versioned Service API router.
pub fn service_router() -> Router<AppState> {
    Router::new().nest("/v1", payments::router())
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Router fixtures backed by the in-memory store.

    use crate::state::AppState;
    use argon2::{
        Argon2, PasswordHasher,
        password_hash::{SaltString, rand_core::OsRng},
    };
    use async_trait::async_trait;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, Response};
    use mpay_core::config::{ConfigStore, ProcessorConfig, ReconcilePolicy, ServiceConfig};
    use mpay_core::events::{NotificationEventReceiver, notification_channel};
    use mpay_core::gateway::{
        PaymentDetail, PreferenceCreated, ProcessorClient, ProcessorError, ProcessorReceipt,
    };
    use mpay_core::ingress::NotificationIngress;
    use mpay_core::reconcile::Reconciler;
    use mpay_core::store::MemoryPaymentStore;
    use serde_json::{Value, json};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use url::Url;

    pub const SERVICE_SECRET: &str = "host-secret";

    /// Processor double answering every call from fixed data.
    ///
    /// Payments it reports belong to the last preference it created.
    pub struct StubProcessor {
        pub payment_status: &'static str,
        pub reject_with: Option<&'static str>,
        pub external_reference: Mutex<Option<String>>,
    }

    impl Default for StubProcessor {
        fn default() -> Self {
            Self {
                payment_status: "approved",
                reject_with: None,
                external_reference: Mutex::new(None),
            }
        }
    }

    impl StubProcessor {
        fn rejection(&self) -> Result<(), ProcessorError> {
            match self.reject_with {
                Some(message) => Err(ProcessorError::Application {
                    status: 400,
                    message: message.to_string(),
                }),
                None => Ok(()),
            }
        }
    }

    #[async_trait]
    impl ProcessorClient for StubProcessor {
        async fn create_preference(
            &self,
            preference: &Value,
        ) -> Result<PreferenceCreated, ProcessorError> {
            self.rejection()?;
            *self.external_reference.lock().unwrap() = preference["external_reference"]
                .as_str()
                .map(str::to_owned);
            Ok(PreferenceCreated {
                id: "pref-1".into(),
                init_point: Some("https://www.mercadopago.com/checkout?pref_id=pref-1".into()),
                sandbox_init_point: Some(
                    "https://sandbox.mercadopago.com/checkout?pref_id=pref-1".into(),
                ),
                raw: json!({ "id": "pref-1" }),
            })
        }

        async fn fetch_payment(&self, reference_id: &str) -> Result<PaymentDetail, ProcessorError> {
            self.rejection()?;
            Ok(PaymentDetail {
                reference_id: reference_id.to_string(),
                status: self.payment_status.to_string(),
                external_reference: self.external_reference.lock().unwrap().clone(),
                raw: json!({ "id": reference_id, "status": self.payment_status }),
            })
        }

        async fn refund(&self, _: &str, _: &str) -> Result<ProcessorReceipt, ProcessorError> {
            self.rejection()?;
            Ok(ProcessorReceipt {
                status: Some("approved".into()),
                raw: json!({ "status": "approved" }),
            })
        }

        async fn cancel(&self, _: &str) -> Result<ProcessorReceipt, ProcessorError> {
            self.rejection()?;
            Ok(ProcessorReceipt {
                status: Some("cancelled".into()),
                raw: json!({ "status": "cancelled" }),
            })
        }
    }

    pub fn processor_config() -> ProcessorConfig {
        ProcessorConfig {
            access_token: "TEST_123456789ABCDEFGHIJKLM".into(),
            sandbox: true,
            base_url: Url::parse(ProcessorConfig::DEFAULT_BASE_URL).unwrap(),
            timeout: Duration::from_secs(5),
            webhook_secret: None,
        }
    }

    pub fn state_with(processor: StubProcessor) -> (AppState, NotificationEventReceiver) {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(SERVICE_SECRET.as_bytes(), &salt)
            .unwrap()
            .to_string();
        let policy = ReconcilePolicy {
            fetch_attempts: 1,
            ..ReconcilePolicy::default()
        };
        let reconciler = Reconciler::new(
            Arc::new(MemoryPaymentStore::new()),
            Arc::new(processor),
            ConfigStore::new(policy),
            true,
        );
        let (tx, rx) = notification_channel(8);
        let ingress = NotificationIngress::new(tx, &processor_config());
        let state = AppState::new(reconciler, ingress, ConfigStore::new(ServiceConfig::new(hash)));
        (state, rx)
    }

    pub async fn body_json(response: Response<Body>) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    pub fn authorized(builder: axum::http::request::Builder) -> axum::http::request::Builder {
        builder.header(mpay_sdk::signature::SERVICE_AUTH_HEADER, SERVICE_SECRET)
    }

    pub fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        authorized(Request::builder().method(method).uri(uri))
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }
}

//! Processor client boundary.
//!
//! Everything the reconciliation engine needs from the payment processor
//! goes through [`ProcessorClient`]; [`MercadoPagoClient`] is the REST
//! implementation.

mod mercadopago;

pub use mercadopago::MercadoPagoClient;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Errors returned by a processor call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProcessorError {
    /// Connection failure before a response was received
    #[error("transport error: {0}")]
    Transport(String),

    /// The call did not complete within the configured timeout
    #[error("processor call timed out")]
    Timeout,

    /// The processor is overloaded or failing (5xx, 429)
    #[error("processor unavailable ({status}): {message}")]
    Unavailable { status: u16, message: String },

    /// The processor refused the request
    #[error("processor rejected the request ({status}): {message}")]
    Application { status: u16, message: String },

    /// The response could not be understood
    #[error("malformed processor response: {0}")]
    MalformedResponse(String),
}

impl ProcessorError {
    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProcessorError::Transport(_)
                | ProcessorError::Timeout
                | ProcessorError::Unavailable { .. }
        )
    }
}

/// A created checkout preference.
#[derive(Debug, Clone, PartialEq)]
pub struct PreferenceCreated {
    pub id: String,
    pub init_point: Option<String>,
    pub sandbox_init_point: Option<String>,
    pub raw: Value,
}

impl PreferenceCreated {
    /// The URL the payer should be redirected to.
    pub fn redirect_url(&self, sandbox: bool) -> Result<&str, ProcessorError> {
        let (field, url) = if sandbox {
            ("sandbox_init_point", &self.sandbox_init_point)
        } else {
            ("init_point", &self.init_point)
        };
        url.as_deref()
            .ok_or_else(|| ProcessorError::MalformedResponse(format!("missing {field}")))
    }
}

/// Authoritative payment state as reported by the processor.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentDetail {
    pub reference_id: String,
    pub status: String,
    /// The payment token the checkout preference was created for.
    pub external_reference: Option<String>,
    pub raw: Value,
}

/// Response of a refund or cancel call.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessorReceipt {
    pub status: Option<String>,
    pub raw: Value,
}

#[async_trait]
pub trait ProcessorClient: Send + Sync {
    /// Register a checkout preference. The document is passed through as-is.
    async fn create_preference(&self, preference: &Value)
    -> Result<PreferenceCreated, ProcessorError>;

    async fn fetch_payment(&self, reference_id: &str) -> Result<PaymentDetail, ProcessorError>;

    /// Full refund. The idempotency key makes retries safe.
    async fn refund(
        &self,
        reference_id: &str,
        idempotency_key: &str,
    ) -> Result<ProcessorReceipt, ProcessorError>;

    async fn cancel(&self, reference_id: &str) -> Result<ProcessorReceipt, ProcessorError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_transient_classification() {
        assert!(ProcessorError::Transport("reset".into()).is_transient());
        assert!(ProcessorError::Timeout.is_transient());
        assert!(
            ProcessorError::Unavailable {
                status: 503,
                message: String::new()
            }
            .is_transient()
        );
        assert!(
            !ProcessorError::Application {
                status: 400,
                message: "bad".into()
            }
            .is_transient()
        );
        assert!(!ProcessorError::MalformedResponse("x".into()).is_transient());
    }

    #[test]
    fn test_redirect_url_follows_sandbox_flag() {
        let pref = PreferenceCreated {
            id: "pref-1".into(),
            init_point: Some("https://live".into()),
            sandbox_init_point: Some("https://sandbox".into()),
            raw: json!({}),
        };
        assert_eq!(pref.redirect_url(true).unwrap(), "https://sandbox");
        assert_eq!(pref.redirect_url(false).unwrap(), "https://live");

        let live_only = PreferenceCreated {
            sandbox_init_point: None,
            ..pref
        };
        assert!(matches!(
            live_only.redirect_url(true),
            Err(ProcessorError::MalformedResponse(_))
        ));
    }
}

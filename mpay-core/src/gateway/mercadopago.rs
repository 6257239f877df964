//! MercadoPago REST client.

use super::{PaymentDetail, PreferenceCreated, ProcessorClient, ProcessorError, ProcessorReceipt};
use crate::config::ProcessorConfig;
use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, warn};
use url::Url;

const IDEMPOTENCY_HEADER: &str = "X-Idempotency-Key";

/// [`ProcessorClient`] over the MercadoPago REST API.
#[derive(Clone)]
pub struct MercadoPagoClient {
    http_client: reqwest::Client,
    base_url: Url,
    access_token: String,
}

/// Processor ids are numeric for payments and strings for preferences.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RemoteId {
    Number(u64),
    Text(String),
}

impl std::fmt::Display for RemoteId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemoteId::Number(n) => write!(f, "{n}"),
            RemoteId::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Deserialize)]
struct PreferenceBody {
    id: RemoteId,
    #[serde(default)]
    init_point: Option<String>,
    #[serde(default)]
    sandbox_init_point: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PaymentBody {
    id: RemoteId,
    status: String,
    #[serde(default)]
    external_reference: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReceiptBody {
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

impl MercadoPagoClient {
    pub fn new(config: &ProcessorConfig) -> Self {
        Self {
            http_client: reqwest::Client::builder()
                .timeout(config.timeout)
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            base_url: config.base_url.clone(),
            access_token: config.access_token.clone(),
        }
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ProcessorError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ProcessorError::Transport(format!("invalid base url {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn call(
        &self,
        method: Method,
        url: Url,
        body: Option<&Value>,
        idempotency_key: Option<&str>,
        accepted: &[StatusCode],
    ) -> Result<Value, ProcessorError> {
        debug!(%method, %url, "Calling processor");
        let mut request = self
            .http_client
            .request(method, url)
            .bearer_auth(&self.access_token);
        if let Some(body) = body {
            request = request.json(body);
        }
        if let Some(key) = idempotency_key {
            request = request.header(IDEMPOTENCY_HEADER, key);
        }

        let response = request.send().await.map_err(map_transport_error)?;
        let status = response.status();
        let text = response.text().await.map_err(map_transport_error)?;
        classify_response(status, &text, accepted)
    }
}

fn map_transport_error(err: reqwest::Error) -> ProcessorError {
    if err.is_timeout() {
        ProcessorError::Timeout
    } else {
        ProcessorError::Transport(err.to_string())
    }
}

/// Turn a status code and body into the JSON payload or a classified error.
fn classify_response(
    status: StatusCode,
    body: &str,
    accepted: &[StatusCode],
) -> Result<Value, ProcessorError> {
    if accepted.contains(&status) {
        return serde_json::from_str(body)
            .map_err(|e| ProcessorError::MalformedResponse(format!("invalid JSON body: {e}")));
    }

    let message = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.message)
        .unwrap_or_else(|| body.trim().to_string());
    let code = status.as_u16();
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        warn!(status = code, %message, "Processor unavailable");
        Err(ProcessorError::Unavailable {
            status: code,
            message,
        })
    } else {
        warn!(status = code, %message, "Processor rejected the request");
        Err(ProcessorError::Application {
            status: code,
            message,
        })
    }
}

fn decode<T: for<'de> Deserialize<'de>>(raw: &Value) -> Result<T, ProcessorError> {
    T::deserialize(raw).map_err(|e| ProcessorError::MalformedResponse(e.to_string()))
}

fn parse_preference(raw: Value) -> Result<PreferenceCreated, ProcessorError> {
    let body: PreferenceBody = decode(&raw)?;
    Ok(PreferenceCreated {
        id: body.id.to_string(),
        init_point: body.init_point,
        sandbox_init_point: body.sandbox_init_point,
        raw,
    })
}

fn parse_payment(raw: Value) -> Result<PaymentDetail, ProcessorError> {
    let body: PaymentBody = decode(&raw)?;
    Ok(PaymentDetail {
        reference_id: body.id.to_string(),
        status: body.status,
        external_reference: body.external_reference.filter(|r| !r.is_empty()),
        raw,
    })
}

fn parse_receipt(raw: Value) -> Result<ProcessorReceipt, ProcessorError> {
    let body: ReceiptBody = decode(&raw)?;
    Ok(ProcessorReceipt {
        status: body.status,
        raw,
    })
}

#[async_trait]
impl ProcessorClient for MercadoPagoClient {
    async fn create_preference(
        &self,
        preference: &Value,
    ) -> Result<PreferenceCreated, ProcessorError> {
        let url = self.endpoint(&["checkout", "preferences"])?;
        let raw = self
            .call(
                Method::POST,
                url,
                Some(preference),
                None,
                &[StatusCode::OK, StatusCode::CREATED],
            )
            .await?;
        parse_preference(raw)
    }

    async fn fetch_payment(&self, reference_id: &str) -> Result<PaymentDetail, ProcessorError> {
        let url = self.endpoint(&["v1", "payments", reference_id])?;
        let raw = self
            .call(Method::GET, url, None, None, &[StatusCode::OK])
            .await?;
        parse_payment(raw)
    }

    async fn refund(
        &self,
        reference_id: &str,
        idempotency_key: &str,
    ) -> Result<ProcessorReceipt, ProcessorError> {
        let url = self.endpoint(&["v1", "payments", reference_id, "refunds"])?;
        let raw = self
            .call(
                Method::POST,
                url,
                Some(&json!({})),
                Some(idempotency_key),
                &[StatusCode::CREATED],
            )
            .await?;
        parse_receipt(raw)
    }

    async fn cancel(&self, reference_id: &str) -> Result<ProcessorReceipt, ProcessorError> {
        let url = self.endpoint(&["v1", "payments", reference_id])?;
        let raw = self
            .call(
                Method::PUT,
                url,
                Some(&json!({ "status": "cancelled" })),
                None,
                &[StatusCode::OK],
            )
            .await?;
        parse_receipt(raw)
    }
}

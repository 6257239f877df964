//! Service API client (host application → mpay server).

use reqwest::Client;
use url::Url;
use uuid::Uuid;

use super::{ClientError, parse_response};
use crate::objects::payment::{
    CheckoutResponse, CreatePaymentRequest, ListPaymentsQuery, PaymentResponse, RefundResponse,
};
use crate::signature::SERVICE_AUTH_HEADER;

/// Typed HTTP client for the mpay **Service API**.
///
/// Authentication uses a plaintext secret sent in the
/// `Mpay-Service-Authorization` header, verified server-side against an
/// argon2-hashed value.
#[derive(Debug, Clone)]
pub struct ServiceClient {
    http: Client,
    base_url: Url,
    secret: String,
}

impl ServiceClient {
    /// Create a new `ServiceClient`.
    ///
    /// * `base_url` – root URL of the mpay server (e.g. `https://pay.example.com`).
    /// * `secret` – the plaintext service secret.
    pub fn new(base_url: Url, secret: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url,
            secret: secret.into(),
        }
    }

    /// Replace the default `reqwest::Client` with a custom one (e.g. to
    /// configure timeouts or a proxy).
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http = client;
        self
    }

    fn payment_url(&self, token: Uuid, suffix: &str) -> Result<Url, ClientError> {
        let token = token.to_string();
        let path = format!(
            "/api/v1/payments/{}{suffix}",
            urlencoding::encode(&token)
        );
        Ok(self.base_url.join(&path)?)
    }

    /// `POST /api/v1/payments` – register a new pending payment.
    pub async fn create_payment(
        &self,
        request: &CreatePaymentRequest,
    ) -> Result<PaymentResponse, ClientError> {
        let url = self.base_url.join("/api/v1/payments")?;

        let resp = self
            .http
            .post(url)
            .header(SERVICE_AUTH_HEADER, &self.secret)
            .json(request)
            .send()
            .await?;

        parse_response(resp).await
    }

    /// `GET /api/v1/payments` – list payments, newest first.
    pub async fn list_payments(
        &self,
        query: &ListPaymentsQuery,
    ) -> Result<Vec<PaymentResponse>, ClientError> {
        let url = self.base_url.join("/api/v1/payments")?;

        let resp = self
            .http
            .get(url)
            .header(SERVICE_AUTH_HEADER, &self.secret)
            .query(query)
            .send()
            .await?;

        parse_response(resp).await
    }

    /// `GET /api/v1/payments/{token}` – read a payment.
    pub async fn get_payment(&self, token: Uuid) -> Result<PaymentResponse, ClientError> {
        let url = self.payment_url(token, "")?;

        let resp = self
            .http
            .get(url)
            .header(SERVICE_AUTH_HEADER, &self.secret)
            .send()
            .await?;

        parse_response(resp).await
    }

    /// `POST /api/v1/payments/{token}/checkout` – create the processor
    /// preference and obtain the redirect URL for the payer.
    ///
    /// `preference` is forwarded to the processor unchanged.
    pub async fn checkout(
        &self,
        token: Uuid,
        preference: &serde_json::Value,
    ) -> Result<CheckoutResponse, ClientError> {
        let url = self.payment_url(token, "/checkout")?;

        let resp = self
            .http
            .post(url)
            .header(SERVICE_AUTH_HEADER, &self.secret)
            .json(preference)
            .send()
            .await?;

        parse_response(resp).await
    }

    /// `POST /api/v1/payments/{token}/refund` – fully refund a confirmed payment.
    pub async fn refund(&self, token: Uuid) -> Result<RefundResponse, ClientError> {
        let url = self.payment_url(token, "/refund")?;

        let resp = self
            .http
            .post(url)
            .header(SERVICE_AUTH_HEADER, &self.secret)
            .send()
            .await?;

        parse_response(resp).await
    }

    /// `POST /api/v1/payments/{token}/cancel` – cancel a payment.
    pub async fn cancel(&self, token: Uuid) -> Result<PaymentResponse, ClientError> {
        let url = self.payment_url(token, "/cancel")?;

        let resp = self
            .http
            .post(url)
            .header(SERVICE_AUTH_HEADER, &self.secret)
            .send()
            .await?;

        parse_response(resp).await
    }
}

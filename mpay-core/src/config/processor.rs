use std::time::Duration;
use url::Url;

/// Processor credentials and endpoint.
///
/// Passed explicitly to the client and the notification ingress; changing
/// any of it requires a restart.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    pub access_token: String,
    /// Redirect payers to the sandbox checkout.
    pub sandbox: bool,
    pub base_url: Url,
    /// Per-request timeout of the HTTP client.
    pub timeout: Duration,
    /// Shared secret for `x-signature` verification; unset disables it.
    pub webhook_secret: Option<String>,
}

impl ProcessorConfig {
    pub const DEFAULT_BASE_URL: &'static str = "https://api.mercadopago.com";
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
}

//! TOML file configuration structures.
//!
//! These structs directly map to the `mpay-config.toml` file format.

use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};

/// Root configuration structure as read from the TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub service: ServiceConfig,
    pub processor: ProcessorConfig,
    #[serde(default)]
    pub reconciler: ReconcilerConfig,
}

/// Server configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The address and port to listen on (e.g., "0.0.0.0:8080").
    #[serde(default = "default_listen_addr")]
    pub listen: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::UNSPECIFIED, 8080))
}

/// Service API section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// The secret the host application sends. If this is plaintext (doesn't
    /// start with `$argon2`), it will be hashed and the config file rewritten.
    pub secret: String,
}

/// Payment processor section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessorConfig {
    pub access_token: String,
    #[serde(default)]
    pub sandbox: bool,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Enables `x-signature` verification of notifications.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_secret: Option<String>,
}

fn default_base_url() -> String {
    mpay_core::config::ProcessorConfig::DEFAULT_BASE_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    mpay_core::config::ProcessorConfig::DEFAULT_TIMEOUT.as_secs()
}

/// Reconciliation bounds. Everything but `queue_capacity` is hot-reloaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcilerConfig {
    pub fetch_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    pub stale_retries: u32,
    pub fetch_timeout_ms: u64,
    pub max_in_flight: usize,
    /// Notifications buffered between the ingress and the worker.
    pub queue_capacity: usize,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        let policy = mpay_core::config::ReconcilePolicy::default();
        Self {
            fetch_attempts: policy.fetch_attempts,
            backoff_base_ms: policy.backoff_base.as_millis() as u64,
            backoff_max_ms: policy.backoff_max.as_millis() as u64,
            stale_retries: policy.stale_retries,
            fetch_timeout_ms: policy.fetch_timeout.as_millis() as u64,
            max_in_flight: policy.max_in_flight,
            queue_capacity: mpay_core::events::DEFAULT_CHANNEL_BUFFER,
        }
    }
}

impl FileConfig {
    /// Check if the service secret is already hashed (argon2 format).
    pub fn is_service_secret_hashed(&self) -> bool {
        self.service.secret.starts_with("$argon2")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_parsing() {
        let toml_str = r#"
[server]
listen = "127.0.0.1:3000"

[service]
secret = "host-secret"

[processor]
access_token = "TEST_123456789ABCDEFGHIJKLM"
sandbox = true
"#;
        let config: FileConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.listen.port(), 3000);
        assert!(config.processor.sandbox);
        assert_eq!(config.processor.base_url, "https://api.mercadopago.com");
        assert_eq!(config.processor.timeout_secs, 10);
        assert_eq!(config.processor.webhook_secret, None);
        assert_eq!(config.reconciler.fetch_attempts, 4);
        assert_eq!(config.reconciler.queue_capacity, 256);
        assert!(!config.is_service_secret_hashed());
    }

    #[test]
    fn test_partial_reconciler_section_keeps_defaults() {
        let toml_str = r#"
[service]
secret = "$argon2id$v=19$m=19456,t=2,p=1$abc123"

[processor]
access_token = "APP_USR-1"
webhook_secret = "whsec"

[reconciler]
fetch_attempts = 2
max_in_flight = 64
"#;
        let config: FileConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.listen.port(), 8080);
        assert_eq!(config.reconciler.fetch_attempts, 2);
        assert_eq!(config.reconciler.max_in_flight, 64);
        assert_eq!(config.reconciler.stale_retries, 3);
        assert_eq!(config.processor.webhook_secret.as_deref(), Some("whsec"));
        assert!(config.is_service_secret_hashed());
    }

    #[test]
    fn test_config_survives_rewrite() {
        let toml_str = r#"
[service]
secret = "host-secret"

[processor]
access_token = "APP_USR-1"
"#;
        let config: FileConfig = toml::from_str(toml_str).unwrap();
        let rewritten = toml::to_string_pretty(&config).unwrap();
        let reparsed: FileConfig = toml::from_str(&rewritten).unwrap();
        assert_eq!(reparsed.processor.access_token, "APP_USR-1");
        assert_eq!(reparsed.server.listen, config.server.listen);
    }
}

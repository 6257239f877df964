//! Configuration module for mpay-server.
//!
//! Handles loading configuration from TOML files, CLI arguments,
//! and environment variables. Also handles service secret hashing.

pub mod file;

use crate::config::file::{FileConfig, ReconcilerConfig};
use mpay_core::config::{ProcessorConfig, ReconcilePolicy, ServiceConfig};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("password hashing error: {0}")]
    HashError(String),

    #[error("DATABASE_URL environment variable not set")]
    MissingDatabaseUrl,
}

/// Loaded configuration result containing all parts.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub listen: SocketAddr,
    pub service: ServiceConfig,
    pub processor: ProcessorConfig,
    pub policy: ReconcilePolicy,
    pub queue_capacity: usize,
}

/// Configuration loader that handles the complete loading process.
pub struct ConfigLoader {
    config_path: std::path::PathBuf,
    listen_override: Option<SocketAddr>,
}

impl ConfigLoader {
    /// Create a new config loader.
    pub fn new(config_path: impl AsRef<Path>, listen_override: Option<SocketAddr>) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
            listen_override,
        }
    }

    /// Load and process the configuration.
    ///
    /// This will:
    /// 1. Read the TOML file
    /// 2. Apply CLI overrides
    /// 3. Validate the configuration
    /// 4. Hash the service secret if it's plaintext (and rewrite the file)
    /// 5. Build the loaded configuration
    pub fn load(&self) -> Result<LoadedConfig, ConfigError> {
        let config_content = std::fs::read_to_string(&self.config_path)?;
        let mut file_config: FileConfig = toml::from_str(&config_content)?;

        if let Some(listen) = self.listen_override {
            file_config.server.listen = listen;
        }

        let base_url = self.validate(&file_config)?;

        let secret_hash = if file_config.is_service_secret_hashed() {
            file_config.service.secret.clone()
        } else {
            let hash = hash_secret(&file_config.service.secret)?;
            file_config.service.secret = hash.clone();
            self.rewrite_config(&file_config)?;
            tracing::info!("Service secret hashed and config file updated");
            hash
        };

        Ok(build_loaded_config(file_config, base_url, secret_hash))
    }

    /// Reload the configuration (used during SIGHUP).
    pub fn reload(&self) -> Result<LoadedConfig, ConfigError> {
        self.load()
    }

    fn validate(&self, config: &FileConfig) -> Result<Url, ConfigError> {
        if config.service.secret.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "service.secret must not be empty".into(),
            ));
        }
        if config.processor.access_token.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "processor.access_token must not be empty".into(),
            ));
        }
        let base_url = Url::parse(&config.processor.base_url).map_err(|e| {
            ConfigError::ValidationError(format!(
                "processor.base_url {:?} is not a valid URL: {e}",
                config.processor.base_url
            ))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ConfigError::ValidationError(format!(
                "processor.base_url {base_url} cannot be used as a base URL"
            )));
        }

        let reconciler = &config.reconciler;
        if reconciler.fetch_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "reconciler.fetch_attempts must be at least 1".into(),
            ));
        }
        if reconciler.max_in_flight == 0 || reconciler.queue_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "reconciler.max_in_flight and reconciler.queue_capacity must be at least 1".into(),
            ));
        }
        if reconciler.backoff_base_ms > reconciler.backoff_max_ms {
            return Err(ConfigError::ValidationError(
                "reconciler.backoff_base_ms exceeds reconciler.backoff_max_ms".into(),
            ));
        }
        Ok(base_url)
    }

    fn rewrite_config(&self, config: &FileConfig) -> Result<(), ConfigError> {
        let toml_string = toml::to_string_pretty(config)?;

        // Write atomically: write to temp file, then rename
        let temp_path = self.config_path.with_extension("toml.tmp");
        std::fs::write(&temp_path, toml_string)?;
        std::fs::rename(&temp_path, &self.config_path)?;

        Ok(())
    }
}

fn hash_secret(plaintext: &str) -> Result<String, ConfigError> {
    use argon2::{
        Argon2, PasswordHasher,
        password_hash::{SaltString, rand_core::OsRng},
    };

    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(plaintext.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ConfigError::HashError(e.to_string()))
}

fn convert_policy(r: &ReconcilerConfig) -> ReconcilePolicy {
    ReconcilePolicy {
        fetch_attempts: r.fetch_attempts,
        backoff_base: Duration::from_millis(r.backoff_base_ms),
        backoff_max: Duration::from_millis(r.backoff_max_ms),
        stale_retries: r.stale_retries,
        fetch_timeout: Duration::from_millis(r.fetch_timeout_ms),
        max_in_flight: r.max_in_flight,
    }
}

fn build_loaded_config(file_config: FileConfig, base_url: Url, secret_hash: String) -> LoadedConfig {
    LoadedConfig {
        listen: file_config.server.listen,
        service: ServiceConfig::new(secret_hash),
        processor: ProcessorConfig {
            access_token: file_config.processor.access_token,
            sandbox: file_config.processor.sandbox,
            base_url,
            timeout: Duration::from_secs(file_config.processor.timeout_secs),
            webhook_secret: file_config.processor.webhook_secret,
        },
        policy: convert_policy(&file_config.reconciler),
        queue_capacity: file_config.reconciler.queue_capacity,
    }
}

/// Get the database URL from the environment.
pub fn get_database_url() -> Result<String, ConfigError> {
    std::env::var("DATABASE_URL").map_err(|_| ConfigError::MissingDatabaseUrl)
}

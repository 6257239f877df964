//! Service API credentials.

use argon2::{Argon2, PasswordHash, PasswordVerifier};

/// Host application credentials with the secret stored as an argon2 hash.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub secret_hash: String,
}

impl ServiceConfig {
    pub fn new(secret_hash: String) -> Self {
        Self { secret_hash }
    }

    /// Check a plaintext secret from the `Mpay-Service-Authorization` header.
    pub fn verify_secret(&self, plaintext: &str) -> bool {
        let Ok(parsed_hash) = PasswordHash::new(&self.secret_hash) else {
            return false;
        };

        Argon2::default()
            .verify_password(plaintext.as_bytes(), &parsed_hash)
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use argon2::{
        PasswordHasher,
        password_hash::{SaltString, rand_core::OsRng},
    };

    #[test]
    fn test_verify_secret() {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(b"host-secret", &salt)
            .unwrap()
            .to_string();

        let config = ServiceConfig::new(hash);
        assert!(config.verify_secret("host-secret"));
        assert!(!config.verify_secret("other"));
    }

    #[test]
    fn test_unparseable_hash_never_verifies() {
        let config = ServiceConfig::new("host-secret".to_string());
        assert!(!config.verify_secret("host-secret"));
    }
}

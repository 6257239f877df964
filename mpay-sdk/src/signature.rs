//! Processor webhook signature scheme and Service API header names.
//!
//! The processor signs every webhook with a secret configured in its
//! dashboard. The wire format for the header is:
//!
//! ```text
//! x-signature: ts={unix_timestamp},v1={hex_hmac}
//! ```
//!
//! The signed data is the manifest
//! `id:{data.id};request-id:{x-request-id};ts:{ts};` and the digest is
//! `HMAC-SHA256(manifest, secret)` encoded as lowercase hex. Parts whose
//! value is absent are left out of the manifest.

/// Header carrying the processor webhook signature.
pub const WEBHOOK_SIGNATURE_HEADER: &str = "x-signature";

/// Header carrying the processor request id, part of the signed manifest.
pub const WEBHOOK_REQUEST_ID_HEADER: &str = "x-request-id";

/// Header name for Service API authentication (plaintext secret).
pub const SERVICE_AUTH_HEADER: &str = "Mpay-Service-Authorization";

/// Errors produced by signature operations.
#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("invalid header format")]
    InvalidFormat,
    #[error("invalid hex encoding")]
    InvalidHex,
    #[error("invalid signature")]
    SignatureMismatch,
}

impl From<ring::error::Unspecified> for SignatureError {
    fn from(_: ring::error::Unspecified) -> Self {
        Self::SignatureMismatch
    }
}

/// A parsed `x-signature` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookSignature {
    pub timestamp: String,
    pub digest: Box<[u8]>,
}

impl WebhookSignature {
    /// Parse a `ts=...,v1=...` header value. Unknown keys are ignored.
    pub fn parse(value: &str) -> Result<Self, SignatureError> {
        let mut timestamp = None;
        let mut digest = None;
        for part in value.split(',') {
            let Some((key, val)) = part.split_once('=') else {
                return Err(SignatureError::InvalidFormat);
            };
            match key.trim() {
                "ts" => timestamp = Some(val.trim().to_owned()),
                "v1" => {
                    let bytes = hex::decode(val.trim()).map_err(|_| SignatureError::InvalidHex)?;
                    digest = Some(bytes.into_boxed_slice());
                }
                _ => {}
            }
        }
        match (timestamp, digest) {
            (Some(timestamp), Some(digest)) if !timestamp.is_empty() => {
                Ok(Self { timestamp, digest })
            }
            _ => Err(SignatureError::InvalidFormat),
        }
    }

    /// Verify the digest against the manifest built from `data_id` and
    /// `request_id`.
    pub fn verify(
        &self,
        data_id: Option<&str>,
        request_id: Option<&str>,
        secret: &[u8],
    ) -> Result<(), SignatureError> {
        let manifest = build_manifest(data_id, request_id, &self.timestamp);
        ring::hmac::verify(
            &ring::hmac::Key::new(ring::hmac::HMAC_SHA256, secret),
            manifest.as_bytes(),
            &self.digest,
        )?;
        Ok(())
    }
}

/// Build the signed manifest, skipping absent parts.
///
/// Alphanumeric data ids are lowercased, matching what the processor signs.
pub fn build_manifest(data_id: Option<&str>, request_id: Option<&str>, timestamp: &str) -> String {
    let mut manifest = String::new();
    if let Some(id) = data_id {
        let id = if id.chars().all(|c| c.is_ascii_alphanumeric()) {
            id.to_ascii_lowercase()
        } else {
            id.to_owned()
        };
        manifest.push_str(&format!("id:{id};"));
    }
    if let Some(request_id) = request_id {
        manifest.push_str(&format!("request-id:{request_id};"));
    }
    manifest.push_str(&format!("ts:{timestamp};"));
    manifest
}

/// Produce an `x-signature` header value for the given parts.
///
/// Used by tests and by tooling that replays notifications.
pub fn sign_webhook(
    data_id: Option<&str>,
    request_id: Option<&str>,
    timestamp: i64,
    secret: &[u8],
) -> String {
    let ts = timestamp.to_string();
    let manifest = build_manifest(data_id, request_id, &ts);
    let sig = ring::hmac::sign(
        &ring::hmac::Key::new(ring::hmac::HMAC_SHA256, secret),
        manifest.as_bytes(),
    );
    format!("ts={ts},v1={}", hex::encode(sig.as_ref()))
}

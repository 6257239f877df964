//! Custom Axum extractors for request authentication.
//!
//! Provides `ServiceAuth`, which checks the `Mpay-Service-Authorization`
//! header against the argon2 hash of the service secret (used by the
//! Service API).

use axum::{
    extract::FromRequestParts,
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
};
use mpay_sdk::signature::SERVICE_AUTH_HEADER;

use crate::state::AppState;

/// Marker extractor: the request carried the current service secret.
pub struct ServiceAuth;

/// Errors returned by the [`ServiceAuth`] extractor.
#[derive(Debug, thiserror::Error)]
pub enum ServiceAuthError {
    #[error("missing Mpay-Service-Authorization header")]
    MissingHeader,
    #[error("invalid Mpay-Service-Authorization header")]
    InvalidHeader,
    #[error("service secret rejected")]
    Rejected,
}

impl IntoResponse for ServiceAuthError {
    fn into_response(self) -> Response {
        let status = match self {
            ServiceAuthError::InvalidHeader => StatusCode::BAD_REQUEST,
            ServiceAuthError::MissingHeader | ServiceAuthError::Rejected => {
                StatusCode::UNAUTHORIZED
            }
        };
        (status, self.to_string()).into_response()
    }
}

impl FromRequestParts<AppState> for ServiceAuth {
    type Rejection = ServiceAuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let secret = parts
            .headers
            .get(SERVICE_AUTH_HEADER)
            .ok_or(ServiceAuthError::MissingHeader)?
            .to_str()
            .map_err(|_| ServiceAuthError::InvalidHeader)?;

        let service = state.service.read().await;
        if !service.verify_secret(secret) {
            drop(service);
            tracing::warn!("Service API request with a wrong secret");
            return Err(ServiceAuthError::Rejected);
        }

        drop(service);
        Ok(ServiceAuth)
    }
}

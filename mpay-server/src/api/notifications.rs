//! Processor notification endpoint.
//!
//! `GET|POST /notifications` accepts both notification styles the processor
//! sends (query parameters and JSON webhooks). The answer is always 200:
//! anything else makes the processor redeliver, and an unusable
//! notification stays unusable.

use axum::{
    Router,
    body::Bytes,
    extract::{RawQuery, State},
    http::{HeaderMap, StatusCode},
    routing::get,
};
use mpay_core::ingress::{Ack, RawNotification};

use crate::state::AppState;

/// Build the notification router.
pub fn router() -> Router<AppState> {
    Router::new().route("/notifications", get(receive).post(receive))
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
}

async fn receive(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let raw = RawNotification {
        query: query
            .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
            .unwrap_or_default(),
        body: body.to_vec(),
        signature: header(&headers, "x-signature"),
        request_id: header(&headers, "x-request-id"),
    };

    match state.ingress.accept(raw) {
        Ack::Queued => tracing::debug!("Notification queued"),
        Ack::Ignored(reason) => tracing::debug!(?reason, "Notification acknowledged without action"),
    }
    StatusCode::OK
}

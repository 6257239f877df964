//! Service API handlers.
//!
//! These endpoints are called by the host application backend and require
//! the service secret in the `Mpay-Service-Authorization` header.
//!
//! # Endpoints
//!
//! - `POST /payments`                  – register a pending payment
//! - `GET  /payments`                  – list payments
//! - `GET  /payments/{token}`          – read one payment
//! - `POST /payments/{token}/checkout` – create the processor preference
//! - `POST /payments/{token}/refund`   – full refund
//! - `POST /payments/{token}/cancel`   – cancel

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use mpay_core::entities::payment_records::{NewPayment, PaymentRecord};
use mpay_core::gateway::ProcessorError;
use mpay_core::reconcile::ReconcileError;
use mpay_core::store::{ListFilter, StoreError};
use mpay_sdk::objects::{
    CheckoutResponse, CreatePaymentRequest, ListPaymentsQuery, PaymentResponse, RefundResponse,
    clamp_pagination,
};
use serde_json::Value;
use uuid::Uuid;

use crate::api::extractors::ServiceAuth;
use crate::state::AppState;

/// Build the payments router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/payments", post(create_payment).get(list_payments))
        .route("/payments/{token}", get(get_payment))
        .route("/payments/{token}/checkout", post(checkout))
        .route("/payments/{token}/refund", post(refund))
        .route("/payments/{token}/cancel", post(cancel))
}

/// Convert a `PaymentRecord` (DB model) into a `PaymentResponse` (API model).
fn to_response(record: &PaymentRecord) -> PaymentResponse {
    PaymentResponse {
        token: record.token,
        status: record.status.into(),
        currency: record.currency.clone(),
        description: record.description.clone(),
        total: record.total,
        tax: record.tax,
        delivery: record.delivery,
        captured_amount: record.captured_amount,
        preference_id: record.preference_id.clone(),
        transaction_id: record.transaction_id.clone(),
        extra_data: record.extra_data.clone(),
        created_at: record.created_at.assume_utc().unix_timestamp(),
        updated_at: record.updated_at.assume_utc().unix_timestamp(),
    }
}

async fn create_payment(
    _: ServiceAuth,
    State(state): State<AppState>,
    Json(payload): Json<CreatePaymentRequest>,
) -> Result<impl IntoResponse, ServiceApiError> {
    let record = state
        .reconciler
        .create_payment(NewPayment {
            currency: payload.currency,
            description: payload.description,
            total: payload.total,
            tax: payload.tax,
            delivery: payload.delivery,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(to_response(&record))))
}

async fn list_payments(
    _: ServiceAuth,
    State(state): State<AppState>,
    Query(query): Query<ListPaymentsQuery>,
) -> Result<Json<Vec<PaymentResponse>>, ServiceApiError> {
    let (limit, offset) = clamp_pagination(query.limit, query.offset);
    let records = state
        .reconciler
        .list(ListFilter {
            status: query.status.map(Into::into),
            limit,
            offset,
        })
        .await?;

    Ok(Json(records.iter().map(to_response).collect()))
}

async fn get_payment(
    _: ServiceAuth,
    State(state): State<AppState>,
    Path(token): Path<Uuid>,
) -> Result<Json<PaymentResponse>, ServiceApiError> {
    let record = state
        .reconciler
        .get(token)
        .await?
        .ok_or_else(|| ReconcileError::NotFound(token.to_string()))?;

    Ok(Json(to_response(&record)))
}

/// The body is the processor preference document, passed through with its
/// `external_reference` set to the payment token.
async fn checkout(
    _: ServiceAuth,
    State(state): State<AppState>,
    Path(token): Path<Uuid>,
    Json(preference): Json<Value>,
) -> Result<Json<CheckoutResponse>, ServiceApiError> {
    let redirect = state.reconciler.begin_checkout(token, &preference).await?;

    Ok(Json(CheckoutResponse {
        token,
        preference_id: redirect.preference_id,
        redirect_url: redirect.redirect_url,
    }))
}

async fn refund(
    _: ServiceAuth,
    State(state): State<AppState>,
    Path(token): Path<Uuid>,
) -> Result<Json<RefundResponse>, ServiceApiError> {
    let outcome = state.reconciler.refund(token).await?;

    Ok(Json(RefundResponse {
        refunded_amount: outcome.refunded_amount,
        payment: to_response(&outcome.record),
    }))
}

async fn cancel(
    _: ServiceAuth,
    State(state): State<AppState>,
    Path(token): Path<Uuid>,
) -> Result<Json<PaymentResponse>, ServiceApiError> {
    let outcome = state.reconciler.cancel(token).await?;
    tracing::debug!(%token, ?outcome, "Cancel handled");

    let record = state
        .reconciler
        .get(token)
        .await?
        .ok_or_else(|| ReconcileError::NotFound(token.to_string()))?;
    Ok(Json(to_response(&record)))
}

/// Errors that can occur in Service API handlers.
#[derive(Debug)]
pub struct ServiceApiError(ReconcileError);

impl From<ReconcileError> for ServiceApiError {
    fn from(err: ReconcileError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ServiceApiError {
    fn into_response(self) -> Response {
        match self.0 {
            ReconcileError::NotFound(_) => {
                (StatusCode::NOT_FOUND, "payment not found").into_response()
            }
            e @ ReconcileError::InvalidPreference(_) => {
                (StatusCode::BAD_REQUEST, e.to_string()).into_response()
            }
            e @ ReconcileError::IllegalTransition { .. } => {
                (StatusCode::CONFLICT, e.to_string()).into_response()
            }
            ReconcileError::Processor(e) if e.is_transient() => {
                (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response()
            }
            ReconcileError::Processor(ProcessorError::Application { message, .. }) => (
                StatusCode::BAD_GATEWAY,
                format!("processor rejected the request: {message}"),
            )
                .into_response(),
            ReconcileError::Processor(e) => {
                tracing::error!(error = %e, "Service API processor error");
                (StatusCode::BAD_GATEWAY, e.to_string()).into_response()
            }
            e @ ReconcileError::ReconciliationFailed { .. } => {
                (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response()
            }
            ReconcileError::Store(StoreError::InvalidPayment(reason)) => {
                (StatusCode::BAD_REQUEST, reason).into_response()
            }
            ReconcileError::Store(e @ StoreError::DuplicateTransactionId(_)) => {
                (StatusCode::CONFLICT, e.to_string()).into_response()
            }
            ReconcileError::Store(e) => {
                tracing::error!(error = %e, "Service API store error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::{StubProcessor, authorized, body_json, json_request, state_with};
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::json;
    use tower::ServiceExt;

    fn app(processor: StubProcessor) -> (Router, AppState) {
        let (state, _rx) = state_with(processor);
        (router().with_state(state.clone()), state)
    }

    async fn create(app: &Router) -> Uuid {
        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/payments",
                json!({ "currency": "MXN", "description": "order 42", "total": "100.00" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = body_json(response).await;
        assert_eq!(body["status"], "pending");
        assert_eq!(body["captured_amount"], "0");
        body["token"].as_str().unwrap().parse().unwrap()
    }

    async fn post(app: &Router, uri: String, body: Value) -> Response {
        app.clone()
            .oneshot(json_request("POST", &uri, body))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_requests_without_the_service_secret_are_rejected() {
        let (app, _) = app(StubProcessor::default());

        let missing = app
            .clone()
            .oneshot(Request::builder().uri("/payments").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

        let wrong = app
            .oneshot(
                Request::builder()
                    .uri("/payments")
                    .header(mpay_sdk::signature::SERVICE_AUTH_HEADER, "guess")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_invalid_amounts_are_a_bad_request() {
        let (app, _) = app(StubProcessor::default());
        let response = post(
            &app,
            "/payments".into(),
            json!({ "currency": "MXN", "total": "10.00", "tax": "20.00" }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_checkout_then_notification_then_refund() {
        let (app, state) = app(StubProcessor::default());
        let token = create(&app).await;

        let response = post(&app, format!("/payments/{token}/checkout"), json!({ "items": [] })).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["preference_id"], "pref-1");
        assert_eq!(
            body["redirect_url"],
            "https://sandbox.mercadopago.com/checkout?pref_id=pref-1"
        );

        // A second checkout is refused.
        let response = post(&app, format!("/payments/{token}/checkout"), json!({})).await;
        assert_eq!(response.status(), StatusCode::CONFLICT);

        // Notifications name the processor payment, never the preference.
        state.reconciler.reconcile("1234567").await.unwrap();

        let response = app
            .clone()
            .oneshot(
                authorized(Request::builder().uri(format!("/payments/{token}")))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["status"], "confirmed");
        assert_eq!(body["captured_amount"], "100.00");
        assert_eq!(body["preference_id"], "pref-1");
        assert_eq!(body["transaction_id"], "1234567");

        let response = post(&app, format!("/payments/{token}/refund"), json!({})).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["refunded_amount"], "100.00");
        assert_eq!(body["payment"]["status"], "refunded");
    }

    #[tokio::test]
    async fn test_checkout_with_non_object_preference_is_a_bad_request() {
        let (app, _) = app(StubProcessor::default());
        let token = create(&app).await;

        let response = post(&app, format!("/payments/{token}/checkout"), json!(["items"])).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_refund_of_waiting_payment_is_a_conflict() {
        let (app, _) = app(StubProcessor::default());
        let token = create(&app).await;
        post(&app, format!("/payments/{token}/checkout"), json!({})).await;

        let response = post(&app, format!("/payments/{token}/refund"), json!({})).await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_cancel_rejects_and_repeated_cancel_is_unchanged() {
        let (app, _) = app(StubProcessor::default());
        let token = create(&app).await;

        for _ in 0..2 {
            let response = post(&app, format!("/payments/{token}/cancel"), json!({})).await;
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(body_json(response).await["status"], "rejected");
        }
    }

    #[tokio::test]
    async fn test_processor_rejection_is_a_bad_gateway() {
        let (app, _) = app(StubProcessor {
            reject_with: Some("invalid items"),
            ..StubProcessor::default()
        });
        let token = create(&app).await;

        let response = post(&app, format!("/payments/{token}/checkout"), json!({})).await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert!(String::from_utf8_lossy(&bytes).contains("invalid items"));
    }

    #[tokio::test]
    async fn test_unknown_token_is_not_found() {
        let (app, _) = app(StubProcessor::default());
        let token = Uuid::new_v4();

        let response = post(&app, format!("/payments/{token}/refund"), json!({})).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let response = app
            .oneshot(
                authorized(Request::builder().uri(format!("/payments/{token}")))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_list_filters_by_status() {
        let (app, _) = app(StubProcessor::default());
        let first = create(&app).await;
        create(&app).await;
        post(&app, format!("/payments/{first}/cancel"), json!({})).await;

        let response = app
            .oneshot(
                authorized(Request::builder().uri("/payments?status=pending&limit=10"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        let payments = body.as_array().unwrap();
        assert_eq!(payments.len(), 1);
        assert_ne!(payments[0]["token"], first.to_string());
    }
}

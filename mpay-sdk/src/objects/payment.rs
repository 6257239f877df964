//! Service API request and response types.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Payment status for API responses.
///
/// This is the API/DTO version without sqlx::Type.
/// For database operations, use the version in `mpay-core::entities`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Waiting,
    Confirmed,
    Refunded,
    Rejected,
    Error,
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentStatus::Pending => write!(f, "pending"),
            PaymentStatus::Waiting => write!(f, "waiting"),
            PaymentStatus::Confirmed => write!(f, "confirmed"),
            PaymentStatus::Refunded => write!(f, "refunded"),
            PaymentStatus::Rejected => write!(f, "rejected"),
            PaymentStatus::Error => write!(f, "error"),
        }
    }
}

/// Request payload for registering a new payment.
///
/// Sent by the host application before the checkout starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePaymentRequest {
    pub currency: String,
    #[serde(default)]
    pub description: String,
    pub total: Decimal,
    #[serde(default)]
    pub tax: Decimal,
    #[serde(default)]
    pub delivery: Decimal,
}

/// A payment record as seen by the host application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentResponse {
    pub token: Uuid,
    pub status: PaymentStatus,
    pub currency: String,
    pub description: String,
    pub total: Decimal,
    pub tax: Decimal,
    pub delivery: Decimal,
    pub captured_amount: Decimal,
    /// Checkout preference, present once the checkout has started.
    pub preference_id: Option<String>,
    /// Processor payment id, present once the payment has been confirmed.
    pub transaction_id: Option<String>,
    /// Last processor response payload seen for this payment.
    pub extra_data: Option<serde_json::Value>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Redirect instruction returned when a checkout starts.
///
/// The host must send the payer's browser to `redirect_url`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutResponse {
    pub token: Uuid,
    pub preference_id: String,
    pub redirect_url: String,
}

/// Result of a full refund.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefundResponse {
    pub refunded_amount: Decimal,
    pub payment: PaymentResponse,
}

const DEFAULT_LIMIT: i64 = 20;
const MAX_LIMIT: i64 = 200;
const MAX_OFFSET: i64 = 100_000;

/// Query parameters for listing payments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListPaymentsQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<PaymentStatus>,
}

impl Default for ListPaymentsQuery {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            offset: 0,
            status: None,
        }
    }
}

fn default_limit() -> i64 {
    DEFAULT_LIMIT
}

/// Clamp limit and offset to safe maximums.
pub fn clamp_pagination(limit: i64, offset: i64) -> (i64, i64) {
    (limit.clamp(1, MAX_LIMIT), offset.clamp(0, MAX_OFFSET))
}

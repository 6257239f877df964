pub mod payment_records;

use mpay_sdk::objects::PaymentStatus as SdkPaymentStatus;

/// Payment status for database operations.
///
/// This is the sqlx::Type version. For API/DTO use, see `mpay_sdk::objects::PaymentStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "lowercase", type_name = "payment_status")]
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
        SdkPaymentStatus::from(*self).fmt(f)
    }
}

impl From<PaymentStatus> for SdkPaymentStatus {
    fn from(value: PaymentStatus) -> Self {
        match value {
            PaymentStatus::Pending => SdkPaymentStatus::Pending,
            PaymentStatus::Waiting => SdkPaymentStatus::Waiting,
            PaymentStatus::Confirmed => SdkPaymentStatus::Confirmed,
            PaymentStatus::Refunded => SdkPaymentStatus::Refunded,
            PaymentStatus::Rejected => SdkPaymentStatus::Rejected,
            PaymentStatus::Error => SdkPaymentStatus::Error,
        }
    }
}

impl From<SdkPaymentStatus> for PaymentStatus {
    fn from(value: SdkPaymentStatus) -> Self {
        match value {
            SdkPaymentStatus::Pending => PaymentStatus::Pending,
            SdkPaymentStatus::Waiting => PaymentStatus::Waiting,
            SdkPaymentStatus::Confirmed => PaymentStatus::Confirmed,
            SdkPaymentStatus::Refunded => PaymentStatus::Refunded,
            SdkPaymentStatus::Rejected => PaymentStatus::Rejected,
            SdkPaymentStatus::Error => PaymentStatus::Error,
        }
    }
}

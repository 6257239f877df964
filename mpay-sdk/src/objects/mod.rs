pub mod notification;
pub mod payment;

pub use notification::{NotificationBody, NotificationData, PAYMENT_EVENT_TYPE};
pub use payment::{
    CheckoutResponse, CreatePaymentRequest, ListPaymentsQuery, PaymentResponse, PaymentStatus,
    RefundResponse, clamp_pagination,
};

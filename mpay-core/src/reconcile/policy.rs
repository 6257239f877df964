//! Status transition policy.
//!
//! A pure mapping from the current status and a trigger to the transition
//! the engine should attempt. Nothing here touches the store or the
//! processor.

use crate::entities::PaymentStatus;
use rust_decimal::Decimal;

/// Processor status that confirms a payment.
pub const APPROVED: &str = "approved";

/// What asks for a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger<'a> {
    /// A notification, with the authoritative status fetched from the processor.
    Notification { processor_status: &'a str },
    CheckoutStarted,
    RefundRequested,
    CancelRequested,
}

/// Operator actions that can be refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Checkout,
    Refund,
    Cancel,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Action::Checkout => "checkout",
            Action::Refund => "refund",
            Action::Cancel => "cancel",
        })
    }
}

impl Trigger<'_> {
    /// The operator action behind this trigger, if any.
    pub fn action(&self) -> Option<Action> {
        match self {
            Trigger::Notification { .. } => None,
            Trigger::CheckoutStarted => Some(Action::Checkout),
            Trigger::RefundRequested => Some(Action::Refund),
            Trigger::CancelRequested => Some(Action::Cancel),
        }
    }
}

/// How a transition touches the captured amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureEffect {
    Unchanged,
    SetToTotal,
}

impl CaptureEffect {
    /// The value to write, `None` when the stored amount stays.
    pub fn resolve(self, total: Decimal) -> Option<Decimal> {
        match self {
            CaptureEffect::Unchanged => None,
            CaptureEffect::SetToTotal => Some(total),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Compare-and-set `expected` to `next`.
    Transition {
        expected: PaymentStatus,
        next: PaymentStatus,
        capture: CaptureEffect,
    },
    /// Nothing to do; the record keeps its status.
    NoChange,
    /// The trigger is not allowed from the current status.
    Refused,
}

pub fn decide(current: PaymentStatus, trigger: Trigger<'_>) -> Decision {
    use PaymentStatus::*;

    let transition = |next, capture| Decision::Transition {
        expected: current,
        next,
        capture,
    };
    match (current, trigger) {
        (Waiting, Trigger::Notification { processor_status }) if processor_status == APPROVED => {
            transition(Confirmed, CaptureEffect::SetToTotal)
        }
        (Waiting, Trigger::Notification { .. }) => transition(Waiting, CaptureEffect::Unchanged),
        (_, Trigger::Notification { .. }) => Decision::NoChange,

        (Pending, Trigger::CheckoutStarted) => transition(Waiting, CaptureEffect::Unchanged),
        (_, Trigger::CheckoutStarted) => Decision::Refused,

        (Confirmed, Trigger::RefundRequested) => transition(Refunded, CaptureEffect::Unchanged),
        (_, Trigger::RefundRequested) => Decision::Refused,

        (Rejected, Trigger::CancelRequested) => Decision::NoChange,
        (_, Trigger::CancelRequested) => transition(Rejected, CaptureEffect::Unchanged),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use PaymentStatus::*;

    const ALL: [PaymentStatus; 6] = [Pending, Waiting, Confirmed, Refunded, Rejected, Error];

    fn notification(status: &str) -> Trigger<'_> {
        Trigger::Notification {
            processor_status: status,
        }
    }

    #[test]
    fn test_approved_notification_confirms_waiting() {
        assert_eq!(
            decide(Waiting, notification("approved")),
            Decision::Transition {
                expected: Waiting,
                next: Confirmed,
                capture: CaptureEffect::SetToTotal
            }
        );
    }

    #[test]
    fn test_other_notification_keeps_waiting() {
        for status in ["pending", "in_process", "rejected", "APPROVED", ""] {
            assert_eq!(
                decide(Waiting, notification(status)),
                Decision::Transition {
                    expected: Waiting,
                    next: Waiting,
                    capture: CaptureEffect::Unchanged
                },
                "processor status {status:?}"
            );
        }
    }

    #[test]
    fn test_notification_only_moves_waiting_records() {
        for current in ALL.into_iter().filter(|s| *s != Waiting) {
            assert_eq!(decide(current, notification("approved")), Decision::NoChange);
        }
    }

    #[test]
    fn test_notification_can_only_confirm() {
        for current in ALL {
            for status in ["approved", "pending", "cancelled"] {
                if let Decision::Transition { next, .. } = decide(current, notification(status)) {
                    assert!(matches!(next, Waiting | Confirmed));
                }
            }
        }
    }

    #[test]
    fn test_checkout_only_from_pending() {
        assert_eq!(
            decide(Pending, Trigger::CheckoutStarted),
            Decision::Transition {
                expected: Pending,
                next: Waiting,
                capture: CaptureEffect::Unchanged
            }
        );
        for current in ALL.into_iter().filter(|s| *s != Pending) {
            assert_eq!(decide(current, Trigger::CheckoutStarted), Decision::Refused);
        }
    }

    #[test]
    fn test_refund_only_from_confirmed() {
        assert_eq!(
            decide(Confirmed, Trigger::RefundRequested),
            Decision::Transition {
                expected: Confirmed,
                next: Refunded,
                capture: CaptureEffect::Unchanged
            }
        );
        for current in ALL.into_iter().filter(|s| *s != Confirmed) {
            assert_eq!(decide(current, Trigger::RefundRequested), Decision::Refused);
        }
    }

    #[test]
    fn test_cancel_from_anywhere() {
        assert_eq!(decide(Rejected, Trigger::CancelRequested), Decision::NoChange);
        for current in ALL.into_iter().filter(|s| *s != Rejected) {
            assert_eq!(
                decide(current, Trigger::CancelRequested),
                Decision::Transition {
                    expected: current,
                    next: Rejected,
                    capture: CaptureEffect::Unchanged
                }
            );
        }
    }

    #[test]
    fn test_capture_effect_resolution() {
        let total = Decimal::new(10000, 2);
        assert_eq!(CaptureEffect::SetToTotal.resolve(total), Some(total));
        assert_eq!(CaptureEffect::Unchanged.resolve(total), None);
    }
}

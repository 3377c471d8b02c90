//! Order and payment status machines.
//!
//! Every status write in the crate goes through [`validate_transition`] or
//! [`validate_payment_transition`] first, so an illegal pair is rejected
//! before any repository or inventory call is made.
//!
//! ```text
//! pending          -> awaiting_payment | confirmed | cancelled | failed
//! awaiting_payment -> pending | confirmed | cancelled | failed
//! confirmed        -> processing | cancelled | refunded | failed
//! processing       -> shipping | cancelled | refunded | failed
//! shipping         -> completed | refunded | failed
//! completed        -> refunded
//! failed           -> pending | cancelled
//! cancelled        -> refunded   (full refund of a paid order only)
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::DomainError;

/// Lifecycle stage of a customer order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    AwaitingPayment,
    Confirmed,
    Processing,
    Shipping,
    Completed,
    Cancelled,
    Refunded,
    Failed,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 9] = [
        OrderStatus::Pending,
        OrderStatus::AwaitingPayment,
        OrderStatus::Confirmed,
        OrderStatus::Processing,
        OrderStatus::Shipping,
        OrderStatus::Completed,
        OrderStatus::Cancelled,
        OrderStatus::Refunded,
        OrderStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::AwaitingPayment => "awaiting_payment",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipping => "shipping",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Refunded => "refunded",
            OrderStatus::Failed => "failed",
        }
    }

    /// No further fulfilment. A cancelled order can still be refunded.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Cancelled | OrderStatus::Refunded)
    }

    pub fn can_cancel(&self) -> bool {
        validate_transition(*self, OrderStatus::Cancelled).is_ok()
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| DomainError::UnknownStatus(s.to_string()))
    }
}

/// Settlement state of the money behind an order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Paid,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for PaymentStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "paid" => Ok(PaymentStatus::Paid),
            "failed" => Ok(PaymentStatus::Failed),
            "refunded" => Ok(PaymentStatus::Refunded),
            other => Err(DomainError::UnknownStatus(other.to_string())),
        }
    }
}

/// Statuses reachable from `from` in one step.
pub fn allowed_transitions(from: OrderStatus) -> &'static [OrderStatus] {
    use OrderStatus::*;
    match from {
        Pending => &[AwaitingPayment, Confirmed, Cancelled, Failed],
        AwaitingPayment => &[Pending, Confirmed, Cancelled, Failed],
        Confirmed => &[Processing, Cancelled, Refunded, Failed],
        Processing => &[Shipping, Cancelled, Refunded, Failed],
        Shipping => &[Completed, Refunded, Failed],
        Completed => &[Refunded],
        Failed => &[Pending, Cancelled],
        Cancelled => &[Refunded],
        Refunded => &[],
    }
}

pub fn validate_transition(from: OrderStatus, to: OrderStatus) -> Result<(), DomainError> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(DomainError::InvalidTransition { from, to })
    }
}

/// Direct payment-status changes. `refunded` is only reachable through a refund.
pub fn validate_payment_transition(from: PaymentStatus, to: PaymentStatus) -> Result<(), DomainError> {
    use PaymentStatus::*;
    let ok = matches!((from, to), (Pending, Paid) | (Pending, Failed) | (Failed, Pending) | (Failed, Paid));
    if ok {
        Ok(())
    } else {
        Err(DomainError::InvalidPaymentTransition { from, to })
    }
}

/// Cross-check of a payment change against the order it belongs to.
pub fn validate_payment_against_status(status: OrderStatus, to: PaymentStatus) -> Result<(), DomainError> {
    if to == PaymentStatus::Paid && matches!(status, OrderStatus::Cancelled | OrderStatus::Failed) {
        return Err(DomainError::PaymentRejected { status, payment_status: to });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_is_legal() {
        let path = [
            OrderStatus::Pending,
            OrderStatus::AwaitingPayment,
            OrderStatus::Confirmed,
            OrderStatus::Processing,
            OrderStatus::Shipping,
            OrderStatus::Completed,
            OrderStatus::Refunded,
        ];
        for pair in path.windows(2) {
            assert!(validate_transition(pair[0], pair[1]).is_ok(), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_terminal_states_only_lead_to_refunded() {
        for to in OrderStatus::ALL {
            assert!(validate_transition(OrderStatus::Refunded, to).is_err());
            assert_eq!(validate_transition(OrderStatus::Cancelled, to).is_ok(), to == OrderStatus::Refunded, "cancelled -> {to}");
        }
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(OrderStatus::Refunded.is_terminal());
        assert!(!OrderStatus::Completed.is_terminal());
        assert!(!OrderStatus::Cancelled.can_cancel());
    }

    #[test]
    fn test_self_transition_rejected() {
        for st in OrderStatus::ALL {
            assert_eq!(
                validate_transition(st, st),
                Err(DomainError::InvalidTransition { from: st, to: st })
            );
        }
    }

    #[test]
    fn test_cannot_cancel_once_shipping() {
        assert!(OrderStatus::Processing.can_cancel());
        assert!(!OrderStatus::Shipping.can_cancel());
        assert!(!OrderStatus::Completed.can_cancel());
    }

    #[test]
    fn test_skipping_stages_rejected() {
        assert!(validate_transition(OrderStatus::Pending, OrderStatus::Shipping).is_err());
        assert!(validate_transition(OrderStatus::Confirmed, OrderStatus::Completed).is_err());
        assert!(validate_transition(OrderStatus::Completed, OrderStatus::Pending).is_err());
    }

    #[test]
    fn test_status_round_trips_through_str() {
        for st in OrderStatus::ALL {
            assert_eq!(st.as_str().parse::<OrderStatus>().unwrap(), st);
        }
        assert!("shipped".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn test_payment_transitions() {
        assert!(validate_payment_transition(PaymentStatus::Pending, PaymentStatus::Paid).is_ok());
        assert!(validate_payment_transition(PaymentStatus::Failed, PaymentStatus::Paid).is_ok());
        assert!(validate_payment_transition(PaymentStatus::Paid, PaymentStatus::Refunded).is_err());
        assert!(validate_payment_transition(PaymentStatus::Paid, PaymentStatus::Pending).is_err());
        assert!(validate_payment_transition(PaymentStatus::Refunded, PaymentStatus::Paid).is_err());
    }

    #[test]
    fn test_paid_rejected_for_dead_orders() {
        assert!(validate_payment_against_status(OrderStatus::Cancelled, PaymentStatus::Paid).is_err());
        assert!(validate_payment_against_status(OrderStatus::Failed, PaymentStatus::Paid).is_err());
        assert!(validate_payment_against_status(OrderStatus::Failed, PaymentStatus::Pending).is_ok());
        assert!(validate_payment_against_status(OrderStatus::Processing, PaymentStatus::Paid).is_ok());
    }
}

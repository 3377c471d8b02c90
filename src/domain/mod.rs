//! Domain layer: aggregates, status machines, audit history and events.

pub mod aggregates;
pub mod events;
pub mod history;
pub mod lifecycle;
pub mod value_objects;

use rust_decimal::Decimal;
use thiserror::Error;

use lifecycle::{OrderStatus, PaymentStatus};
use value_objects::MoneyError;

/// Rule violations. None of these leave anything written behind.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("invalid payment status transition: {from} -> {to}")]
    InvalidPaymentTransition { from: PaymentStatus, to: PaymentStatus },

    #[error("payment status {payment_status} not allowed while order is {status}")]
    PaymentRejected { status: OrderStatus, payment_status: PaymentStatus },

    #[error("unknown status: {0}")]
    UnknownStatus(String),

    #[error("orders enter refunded only through a refund")]
    RefundViaStatusUpdate,

    #[error("refund requires payment status paid, found {0}")]
    RefundNotAllowed(PaymentStatus),

    #[error("refund amount must be positive")]
    InvalidRefundAmount,

    #[error("refund amount {requested} exceeds refundable {remaining}")]
    RefundExceedsRemaining { requested: Decimal, remaining: Decimal },

    #[error("order has no items")]
    NoItems,

    #[error("validation failed: {0}")]
    Validation(String),

    #[error(transparent)]
    Money(#[from] MoneyError),
}

//! Domain events published after a lifecycle change is committed
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::aggregates::RefundType;
use crate::domain::lifecycle::{OrderStatus, PaymentStatus};

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OrderEvent {
    Created { order_id: Uuid, order_number: String, status: OrderStatus, grand_total: Decimal },
    StatusChanged { order_id: Uuid, from: OrderStatus, to: OrderStatus },
    PaymentStatusChanged { order_id: Uuid, from: PaymentStatus, to: PaymentStatus },
    Refunded { order_id: Uuid, refund_id: Uuid, amount: Decimal, kind: RefundType },
}

impl OrderEvent {
    /// Subject the event is published under.
    pub fn subject(&self) -> &'static str {
        match self {
            OrderEvent::Created { .. } => "order.created",
            OrderEvent::StatusChanged { .. } => "order.status_changed",
            OrderEvent::PaymentStatusChanged { .. } => "order.payment_status_changed",
            OrderEvent::Refunded { .. } => "order.refunded",
        }
    }

    pub fn order_id(&self) -> Uuid {
        match self {
            OrderEvent::Created { order_id, .. }
            | OrderEvent::StatusChanged { order_id, .. }
            | OrderEvent::PaymentStatusChanged { order_id, .. }
            | OrderEvent::Refunded { order_id, .. } => *order_id,
        }
    }
}

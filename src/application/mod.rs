//! Application layer: the order lifecycle use cases.

mod order_service;
mod stock_effects;

use serde::Serialize;

use crate::domain::aggregates::{Order, OrderItem, Refund};
use crate::domain::lifecycle::OrderStatus;

pub use order_service::OrderService;

#[derive(Debug, Clone, Serialize)]
pub struct OrderDetails {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub total: i64,
    pub page: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefundResult {
    pub refund: Refund,
    pub order: Order,
}

/// Where an order can go next.
#[derive(Debug, Clone, Serialize)]
pub struct TransitionOptions {
    pub current: OrderStatus,
    pub next: Vec<OrderStatus>,
    pub can_cancel: bool,
    pub can_refund: bool,
}

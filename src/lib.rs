//! OpenSASE Orders
//!
//! Order lifecycle service for the OpenSASE storefront.
//!
//! ## Features
//! - Order status machine with a single transition gate
//! - Payment status tracking, cross-checked against order status
//! - Stock reservation, deduction and one-time release tied to status changes
//! - Full and partial refunds
//! - Append-only audit history per order
//! - PostgreSQL or in-memory storage, NATS event publishing

pub mod api;
pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

use thiserror::Error;
use uuid::Uuid;

pub use application::{OrderDetails, OrderService, Page, RefundResult, TransitionOptions};
pub use domain::aggregates::{
    InventoryError, NewOrder, NewOrderLine, Order, OrderItem, PaymentMethod, Refund, RefundType, StockHold, StockKey, StockLevel,
};
pub use domain::history::{Actor, ActorType, HistoryAction, HistoryEntry};
pub use domain::lifecycle::{allowed_transitions, validate_transition, OrderStatus, PaymentStatus};
pub use domain::DomainError;

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum EcommerceError {
    #[error("Order {0} not found")]
    OrderNotFound(Uuid),

    #[error("No stock record for {0}")]
    StockNotFound(StockKey),

    #[error("Order {0} was modified concurrently, reload and retry")]
    Conflict(Uuid),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Inventory(#[from] InventoryError),

    #[error("Storage error: {0}")]
    StorageError(String),
}

impl From<infrastructure::StoreError> for EcommerceError {
    fn from(err: infrastructure::StoreError) -> Self {
        use infrastructure::StoreError;
        match err {
            StoreError::NotFound(id) => EcommerceError::OrderNotFound(id),
            StoreError::Conflict { order_id, .. } => EcommerceError::Conflict(order_id),
            other => EcommerceError::StorageError(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, EcommerceError>;

//! Aggregates module
pub mod order;
pub mod refund;
pub mod stock;

pub use order::{NewOrder, NewOrderLine, Order, OrderItem, PaymentMethod, RefundOutcome, StockHold};
pub use refund::{Refund, RefundType};
pub use stock::{InventoryError, StockKey, StockLevel, StockLine};

//! Storage and messaging seams.
//!
//! The service only talks to these traits. [`memory::MemoryStore`] backs
//! tests and database-less runs; [`postgres::PgStore`] is the production
//! backend. Both give the same guarantees: an order change commits with its
//! history entries and refund or not at all, commits are version-checked,
//! stock holds only move with a conditional write, the restoration flag is
//! claimed once, and inventory batches apply all lines or none.

pub mod events;
pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::aggregates::{InventoryError, Order, OrderItem, Refund, StockHold, StockKey, StockLevel, StockLine};
use crate::domain::history::HistoryEntry;
use crate::domain::lifecycle::{OrderStatus, PaymentStatus};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("order {0} not found")]
    NotFound(Uuid),

    #[error("order {order_id} was modified concurrently (expected version {expected})")]
    Conflict { order_id: Uuid, expected: i64 },

    #[error("stored row is invalid: {0}")]
    Corrupt(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub payment_status: Option<PaymentStatus>,
    pub customer_email: Option<String>,
    pub page: u32,
    pub per_page: u32,
}

impl OrderFilter {
    pub fn limit(&self) -> i64 { i64::from(self.per_page.clamp(1, 100)) }
    pub fn offset(&self) -> i64 { i64::from(self.page.max(1) - 1) * self.limit() }

    pub fn matches(&self, order: &Order) -> bool {
        self.status.map_or(true, |s| order.status() == s)
            && self.payment_status.map_or(true, |p| order.payment_status() == p)
            && self.customer_email.as_deref().map_or(true, |e| order.customer_email().eq_ignore_ascii_case(e))
    }
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Stores a new order with its items and its `created` history entry.
    async fn insert(&self, order: &Order, items: &[OrderItem], created: &HistoryEntry) -> Result<(), StoreError>;

    async fn find(&self, id: Uuid) -> Result<Option<Order>, StoreError>;

    async fn items(&self, id: Uuid) -> Result<Vec<OrderItem>, StoreError>;

    /// Newest first, with the total count of matching orders.
    async fn list(&self, filter: &OrderFilter) -> Result<(Vec<Order>, i64), StoreError>;

    /// Writes the lifecycle fields together with `history` and `refund`,
    /// all or nothing. Succeeds only when the stored version equals
    /// `order.version()`, then bumps the version on both sides.
    /// `stock_hold` and `is_stock_restored` are not written here.
    async fn commit(&self, order: &mut Order, history: &[HistoryEntry], refund: Option<&Refund>) -> Result<(), StoreError>;

    /// Moves the hold from `expected` to `hold`. Returns false, writing
    /// nothing, when the hold is not `expected` or the stock restoration
    /// has been claimed.
    async fn swap_stock_hold(&self, id: Uuid, expected: StockHold, hold: StockHold) -> Result<bool, StoreError>;

    /// Flips `is_stock_restored` from false to true and marks the hold
    /// released, returning the hold it replaced. Returns `None` when the
    /// flag was already set.
    async fn claim_stock_restoration(&self, id: Uuid) -> Result<Option<StockHold>, StoreError>;
}

#[async_trait]
pub trait InventoryRepository: Send + Sync {
    async fn get(&self, key: StockKey) -> Result<Option<StockLevel>, InventoryError>;

    /// Creates the row when missing.
    async fn set_on_hand(&self, key: StockKey, on_hand: i64) -> Result<StockLevel, InventoryError>;

    async fn reserve(&self, lines: &[StockLine]) -> Result<(), InventoryError>;

    async fn deduct(&self, lines: &[StockLine]) -> Result<(), InventoryError>;

    async fn release_reserved(&self, lines: &[StockLine]) -> Result<(), InventoryError>;

    async fn restock(&self, lines: &[StockLine]) -> Result<(), InventoryError>;
}

/// Read side of the audit trail. Entries are written by
/// [`OrderRepository::insert`] and [`OrderRepository::commit`].
#[async_trait]
pub trait HistoryRepository: Send + Sync {
    /// Oldest first.
    async fn list_for_order(&self, order_id: Uuid) -> Result<Vec<HistoryEntry>, StoreError>;
}

#[async_trait]
pub trait RefundRepository: Send + Sync {
    async fn list_for_order(&self, order_id: Uuid) -> Result<Vec<Refund>, StoreError>;
}

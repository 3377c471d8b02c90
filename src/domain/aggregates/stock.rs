//! Stock levels per product variation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::aggregates::order::OrderItem;

/// Identifies a stock row. A `None` variation is the base product.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StockKey {
    pub product_id: Uuid,
    pub variation_id: Option<Uuid>,
}

impl StockKey {
    pub fn new(product_id: Uuid, variation_id: Option<Uuid>) -> Self { Self { product_id, variation_id } }
}

impl From<&OrderItem> for StockKey {
    fn from(item: &OrderItem) -> Self { Self::new(item.product_id, item.variation_id) }
}

impl fmt::Display for StockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.variation_id {
            Some(v) => write!(f, "{}/{}", self.product_id, v),
            None => write!(f, "{}", self.product_id),
        }
    }
}

/// Quantity of one stock row moved by an inventory operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StockLine {
    pub key: StockKey,
    pub quantity: i64,
}

impl StockLine {
    pub fn from_items(items: &[OrderItem]) -> Vec<StockLine> {
        items.iter().map(|i| StockLine { key: StockKey::from(i), quantity: i64::from(i.quantity) }).collect()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevel {
    pub product_id: Uuid,
    pub variation_id: Option<Uuid>,
    pub on_hand: i64,
    pub reserved: i64,
    pub updated_at: DateTime<Utc>,
}

impl StockLevel {
    pub fn new(key: StockKey, on_hand: i64) -> Self {
        Self { product_id: key.product_id, variation_id: key.variation_id, on_hand, reserved: 0, updated_at: Utc::now() }
    }

    pub fn key(&self) -> StockKey { StockKey::new(self.product_id, self.variation_id) }
    pub fn available(&self) -> i64 { self.on_hand - self.reserved }

    pub fn reserve(&mut self, qty: i64) -> Result<(), InventoryError> {
        if qty > self.available() {
            return Err(InventoryError::Insufficient { key: self.key(), requested: qty, available: self.available() });
        }
        self.reserved += qty;
        self.touch();
        Ok(())
    }

    /// Turns a reservation into a permanent decrement.
    pub fn deduct(&mut self, qty: i64) -> Result<(), InventoryError> {
        if qty > self.reserved || qty > self.on_hand {
            return Err(InventoryError::Inconsistent { key: self.key(), detail: format!("deduct {qty} with {} reserved", self.reserved) });
        }
        self.reserved -= qty;
        self.on_hand -= qty;
        self.touch();
        Ok(())
    }

    pub fn release_reserved(&mut self, qty: i64) -> Result<(), InventoryError> {
        if qty > self.reserved {
            return Err(InventoryError::Inconsistent { key: self.key(), detail: format!("release {qty} with {} reserved", self.reserved) });
        }
        self.reserved -= qty;
        self.touch();
        Ok(())
    }

    pub fn restock(&mut self, qty: i64) {
        self.on_hand += qty;
        self.touch();
    }

    pub fn set_on_hand(&mut self, on_hand: i64) -> Result<(), InventoryError> {
        if on_hand < self.reserved {
            return Err(InventoryError::BelowReserved { key: self.key(), on_hand, reserved: self.reserved });
        }
        self.on_hand = on_hand;
        self.touch();
        Ok(())
    }

    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InventoryError {
    #[error("no stock record for {0}")]
    UnknownItem(StockKey),

    #[error("insufficient stock for {key}: requested {requested}, available {available}")]
    Insufficient { key: StockKey, requested: i64, available: i64 },

    #[error("stock for {key} cannot go below the {reserved} reserved units (asked {on_hand})")]
    BelowReserved { key: StockKey, on_hand: i64, reserved: i64 },

    #[error("stock bookkeeping mismatch for {key}: {detail}")]
    Inconsistent { key: StockKey, detail: String },

    #[error("stock storage error: {0}")]
    Storage(String),
}

//! In-process store used by tests and when no database is configured.

use async_trait::async_trait;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::domain::aggregates::{InventoryError, Order, OrderItem, Refund, StockHold, StockKey, StockLevel, StockLine};
use crate::domain::history::HistoryEntry;
use crate::infrastructure::{HistoryRepository, InventoryRepository, OrderFilter, OrderRepository, RefundRepository, StoreError};

#[derive(Default)]
pub struct MemoryStore {
    orders: RwLock<HashMap<Uuid, Order>>,
    items: RwLock<HashMap<Uuid, Vec<OrderItem>>>,
    stock: Mutex<HashMap<StockKey, StockLevel>>,
    history: RwLock<Vec<HistoryEntry>>,
    refunds: RwLock<Vec<Refund>>,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }

    /// Applies `op` to every line on a scratch copy and commits only if all succeed.
    async fn apply_all<F>(&self, lines: &[StockLine], op: F) -> Result<(), InventoryError>
    where
        F: Fn(&mut StockLevel, i64) -> Result<(), InventoryError>,
    {
        let mut stock = self.stock.lock().await;
        let mut staged: HashMap<StockKey, StockLevel> = HashMap::new();
        for line in lines {
            let level = match staged.entry(line.key) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => {
                    let current = stock.get(&line.key).cloned().ok_or(InventoryError::UnknownItem(line.key))?;
                    entry.insert(current)
                }
            };
            op(level, line.quantity)?;
        }
        stock.extend(staged);
        Ok(())
    }
}

#[async_trait]
impl OrderRepository for MemoryStore {
    async fn insert(&self, order: &Order, items: &[OrderItem], created: &HistoryEntry) -> Result<(), StoreError> {
        let mut orders = self.orders.write().await;
        let mut stored_items = self.items.write().await;
        let mut history = self.history.write().await;
        if created.order_id != order.id() {
            return Err(StoreError::Corrupt(format!("history entry {} belongs to order {}", created.id, created.order_id)));
        }
        orders.insert(order.id(), order.clone());
        stored_items.insert(order.id(), items.to_vec());
        history.push(created.clone());
        Ok(())
    }

    async fn find(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
        Ok(self.orders.read().await.get(&id).cloned())
    }

    async fn items(&self, id: Uuid) -> Result<Vec<OrderItem>, StoreError> {
        Ok(self.items.read().await.get(&id).cloned().unwrap_or_default())
    }

    async fn list(&self, filter: &OrderFilter) -> Result<(Vec<Order>, i64), StoreError> {
        let orders = self.orders.read().await;
        let mut matching: Vec<&Order> = orders.values().filter(|o| filter.matches(o)).collect();
        matching.sort_by(|a, b| b.created_at().cmp(&a.created_at()).then_with(|| b.id().cmp(&a.id())));
        let total = matching.len() as i64;
        let page = matching
            .into_iter()
            .skip(filter.offset() as usize)
            .take(filter.limit() as usize)
            .cloned()
            .collect();
        Ok((page, total))
    }

    async fn commit(&self, order: &mut Order, entries: &[HistoryEntry], refund: Option<&Refund>) -> Result<(), StoreError> {
        let mut orders = self.orders.write().await;
        let mut history = self.history.write().await;
        let mut refunds = self.refunds.write().await;

        let stored = orders.get_mut(&order.id()).ok_or(StoreError::NotFound(order.id()))?;
        if stored.version != order.version {
            return Err(StoreError::Conflict { order_id: order.id(), expected: order.version });
        }
        let foreign = entries.iter().map(|e| e.order_id).chain(refund.map(|r| r.order_id)).find(|id| *id != order.id());
        if let Some(other) = foreign {
            return Err(StoreError::Corrupt(format!("record for order {other} committed with order {}", order.id())));
        }

        order.version += 1;
        order.stock_hold = stored.stock_hold;
        order.is_stock_restored = stored.is_stock_restored;
        *stored = order.clone();
        history.extend(entries.iter().cloned());
        refunds.extend(refund.cloned());
        Ok(())
    }

    async fn swap_stock_hold(&self, id: Uuid, expected: StockHold, hold: StockHold) -> Result<bool, StoreError> {
        let mut orders = self.orders.write().await;
        let stored = orders.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        if stored.is_stock_restored || stored.stock_hold != expected {
            return Ok(false);
        }
        stored.stock_hold = hold;
        Ok(true)
    }

    async fn claim_stock_restoration(&self, id: Uuid) -> Result<Option<StockHold>, StoreError> {
        let mut orders = self.orders.write().await;
        let stored = orders.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        if stored.is_stock_restored {
            return Ok(None);
        }
        stored.is_stock_restored = true;
        Ok(Some(std::mem::replace(&mut stored.stock_hold, StockHold::Released)))
    }
}

#[async_trait]
impl InventoryRepository for MemoryStore {
    async fn get(&self, key: StockKey) -> Result<Option<StockLevel>, InventoryError> {
        Ok(self.stock.lock().await.get(&key).cloned())
    }

    async fn set_on_hand(&self, key: StockKey, on_hand: i64) -> Result<StockLevel, InventoryError> {
        let mut stock = self.stock.lock().await;
        let level = stock.entry(key).or_insert_with(|| StockLevel::new(key, 0));
        level.set_on_hand(on_hand)?;
        Ok(level.clone())
    }

    async fn reserve(&self, lines: &[StockLine]) -> Result<(), InventoryError> {
        self.apply_all(lines, StockLevel::reserve).await
    }

    async fn deduct(&self, lines: &[StockLine]) -> Result<(), InventoryError> {
        self.apply_all(lines, StockLevel::deduct).await
    }

    async fn release_reserved(&self, lines: &[StockLine]) -> Result<(), InventoryError> {
        self.apply_all(lines, StockLevel::release_reserved).await
    }

    async fn restock(&self, lines: &[StockLine]) -> Result<(), InventoryError> {
        self.apply_all(lines, |level, qty| {
            level.restock(qty);
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl HistoryRepository for MemoryStore {
    async fn list_for_order(&self, order_id: Uuid) -> Result<Vec<HistoryEntry>, StoreError> {
        Ok(self.history.read().await.iter().filter(|e| e.order_id == order_id).cloned().collect())
    }
}

#[async_trait]
impl RefundRepository for MemoryStore {
    async fn list_for_order(&self, order_id: Uuid) -> Result<Vec<Refund>, StoreError> {
        Ok(self.refunds.read().await.iter().filter(|r| r.order_id == order_id).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::Utc;
    use rust_decimal::Decimal;

    use crate::domain::aggregates::{NewOrder, NewOrderLine, PaymentMethod};
    use crate::domain::history::Actor;
    use crate::domain::lifecycle::OrderStatus;

    fn key(n: u128) -> StockKey { StockKey::new(Uuid::from_u128(n), None) }

    async fn stored_order(store: &MemoryStore) -> Order {
        let input = NewOrder {
            customer_id: None, customer_email: "a@b.c".into(), currency: "USD".into(), payment_method: PaymentMethod::Cod,
            shipping_fee: Decimal::ZERO, discount: Decimal::ZERO,
            lines: vec![NewOrderLine { product_id: Uuid::from_u128(1), variation_id: None, name: "Mug".into(), quantity: 1, unit_price: Decimal::TEN }],
        };
        let (order, items) = Order::place(input, "ORD-1".into(), Utc::now()).unwrap();
        let created = HistoryEntry::created(order.id(), order.order_number(), order.status(), &Actor::system());
        store.insert(&order, &items, &created).await.unwrap();
        order
    }

    #[tokio::test]
    async fn test_commit_with_foreign_entry_writes_nothing() {
        let store = MemoryStore::new();
        let mut order = stored_order(&store).await;
        order.transition_to(OrderStatus::Confirmed, Utc::now()).unwrap();
        let ours = HistoryEntry::status_changed(order.id(), OrderStatus::Pending, OrderStatus::Confirmed, None, &Actor::system());
        let stray = HistoryEntry::status_changed(Uuid::from_u128(99), OrderStatus::Pending, OrderStatus::Confirmed, None, &Actor::system());

        let err = store.commit(&mut order, &[ours, stray], None).await.unwrap_err();
        assert!(matches!(err, StoreError::Corrupt(_)));
        assert_eq!(order.version(), 0);
        let stored = store.find(order.id()).await.unwrap().unwrap();
        assert_eq!(stored.status(), OrderStatus::Pending);
        assert_eq!(HistoryRepository::list_for_order(&store, order.id()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_hold_swap_is_conditional() {
        let store = MemoryStore::new();
        let order = stored_order(&store).await;
        assert!(!store.swap_stock_hold(order.id(), StockHold::Deducted, StockHold::Released).await.unwrap());
        assert!(store.swap_stock_hold(order.id(), StockHold::Reserved, StockHold::Deducted).await.unwrap());

        assert_eq!(store.claim_stock_restoration(order.id()).await.unwrap(), Some(StockHold::Deducted));
        assert_eq!(store.claim_stock_restoration(order.id()).await.unwrap(), None);
        assert!(!store.swap_stock_hold(order.id(), StockHold::Released, StockHold::Reserved).await.unwrap());
    }

    #[tokio::test]
    async fn test_reserve_is_all_or_nothing() {
        let store = MemoryStore::new();
        store.set_on_hand(key(1), 5).await.unwrap();
        store.set_on_hand(key(2), 1).await.unwrap();

        let lines = [StockLine { key: key(1), quantity: 3 }, StockLine { key: key(2), quantity: 2 }];
        assert!(matches!(store.reserve(&lines).await, Err(InventoryError::Insufficient { .. })));
        assert_eq!(InventoryRepository::get(&store, key(1)).await.unwrap().unwrap().reserved, 0);
    }

    #[tokio::test]
    async fn test_repeated_key_in_one_batch_accumulates() {
        let store = MemoryStore::new();
        store.set_on_hand(key(1), 3).await.unwrap();
        let lines = [StockLine { key: key(1), quantity: 2 }, StockLine { key: key(1), quantity: 2 }];
        assert!(store.reserve(&lines).await.is_err());
        store.reserve(&lines[..1]).await.unwrap();
        assert_eq!(InventoryRepository::get(&store, key(1)).await.unwrap().unwrap().available(), 1);
    }

    #[tokio::test]
    async fn test_unknown_item() {
        let store = MemoryStore::new();
        let lines = [StockLine { key: key(9), quantity: 1 }];
        assert_eq!(store.reserve(&lines).await, Err(InventoryError::UnknownItem(key(9))));
    }
}

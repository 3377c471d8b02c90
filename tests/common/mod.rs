//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

use opensase_orders::infrastructure::events::RecordingPublisher;
use opensase_orders::infrastructure::memory::MemoryStore;
use opensase_orders::{Actor, ActorType, NewOrder, NewOrderLine, OrderService, PaymentMethod, StockKey};

pub struct Harness {
    pub service: OrderService,
    pub store: Arc<MemoryStore>,
    pub events: RecordingPublisher,
}

pub fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    let events = RecordingPublisher::default();
    let service = OrderService::with_store(store.clone(), Arc::new(events.clone()));
    Harness { service, store, events }
}

pub fn tee() -> StockKey { StockKey::new(Uuid::from_u128(1), None) }
pub fn cap() -> StockKey { StockKey::new(Uuid::from_u128(2), Some(Uuid::from_u128(20))) }

pub fn vnd(amount: i64) -> Decimal { Decimal::new(amount, 0) }

/// 10 tees and 5 caps on hand.
pub async fn stocked() -> Harness {
    let h = harness();
    h.service.set_stock(tee(), 10).await.unwrap();
    h.service.set_stock(cap(), 5).await.unwrap();
    h
}

/// 2 tees at 150 000 and 1 cap at 80 000, plus 30 000 shipping minus a
/// 10 000 discount: 400 000 VND.
pub fn new_order(method: PaymentMethod) -> NewOrder {
    NewOrder {
        customer_id: None,
        customer_email: "buyer@example.com".into(),
        currency: "VND".into(),
        payment_method: method,
        shipping_fee: vnd(30_000),
        discount: vnd(10_000),
        lines: vec![
            NewOrderLine { product_id: tee().product_id, variation_id: None, name: "Tee".into(), quantity: 2, unit_price: vnd(150_000) },
            NewOrderLine { product_id: cap().product_id, variation_id: cap().variation_id, name: "Cap".into(), quantity: 1, unit_price: vnd(80_000) },
        ],
    }
}

pub fn admin() -> Actor { Actor::new("admin-1", "Lan", ActorType::Admin) }

/// (on_hand, reserved)
pub async fn counts(h: &Harness, key: StockKey) -> (i64, i64) {
    let level = h.service.stock(key).await.unwrap();
    (level.on_hand, level.reserved)
}

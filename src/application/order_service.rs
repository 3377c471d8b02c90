//! Order lifecycle use cases.

use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::application::stock_effects::StockEffects;
use crate::application::{OrderDetails, Page, RefundResult, TransitionOptions};
use crate::domain::aggregates::{NewOrder, Order, OrderItem, Refund, StockKey, StockLevel};
use crate::domain::events::OrderEvent;
use crate::domain::history::{Actor, HistoryEntry};
use crate::domain::lifecycle::{allowed_transitions, OrderStatus, PaymentStatus};
use crate::domain::DomainError;
use crate::infrastructure::events::EventPublisher;
use crate::infrastructure::{HistoryRepository, InventoryRepository, OrderFilter, OrderRepository, RefundRepository};
use crate::{EcommerceError, Result};

/// Runs every order lifecycle operation.
///
/// Writes follow one order: validate, commit the order together with its
/// history entries (version-checked, one atomic write), then run stock
/// effects and publish events. Only validation and the commit can fail the
/// call.
#[derive(Clone)]
pub struct OrderService {
    orders: Arc<dyn OrderRepository>,
    inventory: Arc<dyn InventoryRepository>,
    history: Arc<dyn HistoryRepository>,
    refunds: Arc<dyn RefundRepository>,
    events: Arc<dyn EventPublisher>,
    stock: Arc<StockEffects>,
}

impl OrderService {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        inventory: Arc<dyn InventoryRepository>,
        history: Arc<dyn HistoryRepository>,
        refunds: Arc<dyn RefundRepository>,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        let stock = Arc::new(StockEffects::new(orders.clone(), inventory.clone()));
        Self { orders, inventory, history, refunds, events, stock }
    }

    /// One backend serving every repository.
    pub fn with_store<S>(store: Arc<S>, events: Arc<dyn EventPublisher>) -> Self
    where
        S: OrderRepository + InventoryRepository + HistoryRepository + RefundRepository + 'static,
    {
        Self::new(store.clone(), store.clone(), store.clone(), store, events)
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    pub async fn get_order(&self, id: Uuid) -> Result<OrderDetails> {
        let order = self.load(id).await?;
        let items = self.orders.items(id).await?;
        Ok(OrderDetails { order, items })
    }

    pub async fn list_orders(&self, filter: OrderFilter) -> Result<Page<Order>> {
        let (data, total) = self.orders.list(&filter).await?;
        Ok(Page { data, total, page: filter.page.max(1) })
    }

    pub async fn history(&self, id: Uuid) -> Result<Vec<HistoryEntry>> {
        self.load(id).await?;
        Ok(self.history.list_for_order(id).await?)
    }

    pub async fn refunds(&self, id: Uuid) -> Result<Vec<Refund>> {
        self.load(id).await?;
        Ok(self.refunds.list_for_order(id).await?)
    }

    pub async fn allowed_transitions(&self, id: Uuid) -> Result<TransitionOptions> {
        let order = self.load(id).await?;
        Ok(TransitionOptions {
            current: order.status(),
            next: allowed_transitions(order.status()).iter().copied().filter(|s| *s != OrderStatus::Refunded).collect(),
            can_cancel: order.status().can_cancel(),
            can_refund: order.payment_status() == PaymentStatus::Paid && order.remaining_refundable() > Decimal::ZERO,
        })
    }

    pub async fn stock(&self, key: StockKey) -> Result<StockLevel> {
        self.inventory.get(key).await?.ok_or(EcommerceError::StockNotFound(key))
    }

    // -------------------------------------------------------------------------
    // Commands
    // -------------------------------------------------------------------------

    #[instrument(skip(self), fields(product_id = %key.product_id))]
    pub async fn set_stock(&self, key: StockKey, on_hand: i64) -> Result<StockLevel> {
        let level = self.inventory.set_on_hand(key, on_hand).await?;
        info!(on_hand = level.on_hand, reserved = level.reserved, "stock level set");
        Ok(level)
    }

    /// Places an order and reserves its stock. Nothing is stored when the
    /// reservation fails.
    #[instrument(skip(self, input, actor), fields(actor = %actor, email = %input.customer_email))]
    pub async fn create_order(&self, input: NewOrder, actor: &Actor) -> Result<OrderDetails> {
        let now = Utc::now();
        let (order, items) = Order::place(input, generate_order_number(now), now)?;

        let created = HistoryEntry::created(order.id(), order.order_number(), order.status(), actor);

        self.stock.reserve_new(&items).await?;
        if let Err(e) = self.orders.insert(&order, &items, &created).await {
            self.stock.undo_reservation(&items).await;
            return Err(e.into());
        }
        info!(order_id = %order.id(), order_number = order.order_number(), "order created");

        self.publish(OrderEvent::Created {
            order_id: order.id(),
            order_number: order.order_number().to_string(),
            status: order.status(),
            grand_total: order.grand_total().amount(),
        })
        .await;
        Ok(OrderDetails { order, items })
    }

    /// Moves an order to `to`. `refunded` is rejected here; use
    /// [`OrderService::process_refund`].
    #[instrument(skip(self, reason, actor), fields(actor = %actor))]
    pub async fn update_status(&self, id: Uuid, to: OrderStatus, reason: Option<String>, actor: &Actor) -> Result<Order> {
        if to == OrderStatus::Refunded {
            return Err(DomainError::RefundViaStatusUpdate.into());
        }
        self.change_status(id, to, reason, actor).await
    }

    #[instrument(skip(self, reason, actor), fields(actor = %actor))]
    pub async fn cancel_order(&self, id: Uuid, reason: String, actor: &Actor) -> Result<Order> {
        let reason = reason.trim().to_string();
        if reason.is_empty() {
            return Err(DomainError::Validation("cancellation reason is required".into()).into());
        }
        self.change_status(id, OrderStatus::Cancelled, Some(reason), actor).await
    }

    /// Direct payment change. Marking an unconfirmed order paid also
    /// confirms it.
    #[instrument(skip(self, actor), fields(actor = %actor))]
    pub async fn update_payment_status(&self, id: Uuid, to: PaymentStatus, actor: &Actor) -> Result<Order> {
        let now = Utc::now();
        let mut order = self.load(id).await?;
        let payment_from = order.set_payment_status(to, now)?;
        let status_change = if to == PaymentStatus::Paid && matches!(order.status(), OrderStatus::Pending | OrderStatus::AwaitingPayment) {
            Some((order.transition_to(OrderStatus::Confirmed, now)?, OrderStatus::Confirmed))
        } else {
            None
        };

        let mut entries = vec![HistoryEntry::payment_changed(id, payment_from, to, actor)];
        if let Some((from, status_to)) = status_change {
            entries.push(HistoryEntry::status_changed(id, from, status_to, Some("payment received"), actor));
        }
        self.orders.commit(&mut order, &entries, None).await?;
        info!(order_id = %id, from = %payment_from, to = %to, "payment status changed");

        if let Some((from, status_to)) = status_change {
            let items = self.items_for_effects(id).await;
            self.stock.after_transition(&mut order, &items, from, status_to).await;
        }
        self.publish(OrderEvent::PaymentStatusChanged { order_id: id, from: payment_from, to }).await;
        if let Some((from, status_to)) = status_change {
            self.publish(OrderEvent::StatusChanged { order_id: id, from, to: status_to }).await;
        }
        Ok(order)
    }

    /// Refunds `amount`. A refund equal to the grand total is a full refund:
    /// the order moves to `refunded` and its stock is released.
    #[instrument(skip(self, amount, reason, actor), fields(actor = %actor, amount = %amount))]
    pub async fn process_refund(&self, id: Uuid, amount: Decimal, reason: String, actor: &Actor) -> Result<RefundResult> {
        let reason = reason.trim().to_string();
        if reason.is_empty() {
            return Err(DomainError::Validation("refund reason is required".into()).into());
        }
        let now = Utc::now();
        let mut order = self.load(id).await?;
        let refunded_before = order.refunded_total();
        let outcome = order.apply_refund(amount, now)?;

        let refund = Refund {
            id: Uuid::now_v7(),
            order_id: id,
            amount: outcome.amount,
            currency: order.currency().to_string(),
            kind: outcome.kind,
            reason,
            processed_by: actor.id.clone(),
            created_at: now,
        };
        let mut entries = vec![HistoryEntry::refund_processed(
            id,
            refund.id,
            refund.kind,
            &outcome.amount.to_string(),
            &refund.reason,
            &refunded_before.rounded().to_string(),
            &order.refunded_total().rounded().to_string(),
            actor,
        )];
        if let Some((from, to)) = outcome.payment_change {
            entries.push(HistoryEntry::payment_changed(id, from, to, actor));
        }
        if let Some((from, to)) = outcome.status_change {
            entries.push(HistoryEntry::status_changed(id, from, to, Some(&refund.reason), actor));
        }
        self.orders.commit(&mut order, &entries, Some(&refund)).await?;
        info!(order_id = %id, refund_id = %refund.id, kind = refund.kind.as_str(), "refund processed");

        if let Some((from, to)) = outcome.status_change {
            let items = self.items_for_effects(id).await;
            self.stock.after_transition(&mut order, &items, from, to).await;
        }
        self.publish(OrderEvent::Refunded { order_id: id, refund_id: refund.id, amount: refund.amount, kind: refund.kind }).await;
        if let Some((from, to)) = outcome.payment_change {
            self.publish(OrderEvent::PaymentStatusChanged { order_id: id, from, to }).await;
        }
        if let Some((from, to)) = outcome.status_change {
            self.publish(OrderEvent::StatusChanged { order_id: id, from, to }).await;
        }
        Ok(RefundResult { refund, order })
    }

    #[instrument(skip(self, notes, actor), fields(actor = %actor))]
    pub async fn set_admin_notes(&self, id: Uuid, notes: Option<String>, actor: &Actor) -> Result<Order> {
        let notes = notes.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
        let mut order = self.load(id).await?;
        if order.admin_notes() == notes.as_deref() {
            return Ok(order);
        }
        let old = order.set_admin_notes(notes.clone(), Utc::now());
        let entry = HistoryEntry::note_updated(id, old, notes, actor);
        self.orders.commit(&mut order, std::slice::from_ref(&entry), None).await?;
        Ok(order)
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    async fn change_status(&self, id: Uuid, to: OrderStatus, reason: Option<String>, actor: &Actor) -> Result<Order> {
        let mut order = self.load(id).await?;
        let from = order.transition_to(to, Utc::now())?;
        if to == OrderStatus::Cancelled {
            order.set_cancelled_reason(reason.clone());
        }
        let entry = HistoryEntry::status_changed(id, from, to, reason.as_deref(), actor);
        self.orders.commit(&mut order, std::slice::from_ref(&entry), None).await?;
        info!(order_id = %id, from = %from, to = %to, "order status changed");

        let items = self.items_for_effects(id).await;
        self.stock.after_transition(&mut order, &items, from, to).await;
        self.publish(OrderEvent::StatusChanged { order_id: id, from, to }).await;
        Ok(order)
    }

    async fn load(&self, id: Uuid) -> Result<Order> {
        self.orders.find(id).await?.ok_or(EcommerceError::OrderNotFound(id))
    }

    /// Items for stock effects; a read failure skips the effects like any
    /// other inventory failure.
    async fn items_for_effects(&self, id: Uuid) -> Vec<OrderItem> {
        match self.orders.items(id).await {
            Ok(items) => items,
            Err(e) => {
                tracing::error!(order_id = %id, error = %e, "could not load items for stock effects");
                Vec::new()
            }
        }
    }

    async fn publish(&self, event: OrderEvent) {
        if let Err(e) = self.events.publish(&event).await {
            warn!(subject = event.subject(), order_id = %event.order_id(), error = %e, "event publish failed");
        }
    }
}

fn generate_order_number(now: chrono::DateTime<Utc>) -> String {
    format!("ORD-{}-{:08}", now.format("%Y%m%d"), rand::random::<u32>() % 100_000_000)
}

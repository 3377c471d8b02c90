//! Inventory side effects of status changes.
//!
//! These run after the status change and its history are committed.
//! Failures are logged and swallowed: the status change stands even when the
//! stock counts could not follow it.
//!
//! The order's `stock_hold` says which counter holds its stock. Moves that
//! give stock up (deduct, restock) switch the hold first with a conditional
//! write; moves that take stock (reserve) touch the counts first. Either way
//! a concurrent restoration claim reads a hold that matches the counts.

use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::domain::aggregates::{InventoryError, Order, OrderItem, StockHold, StockLine};
use crate::domain::lifecycle::OrderStatus;
use crate::infrastructure::{InventoryRepository, OrderRepository};

pub(crate) struct StockEffects {
    orders: Arc<dyn OrderRepository>,
    inventory: Arc<dyn InventoryRepository>,
}

impl StockEffects {
    pub(crate) fn new(orders: Arc<dyn OrderRepository>, inventory: Arc<dyn InventoryRepository>) -> Self {
        Self { orders, inventory }
    }

    /// All-or-nothing reservation for a new order. Unlike the transition
    /// effects this one fails the caller.
    pub(crate) async fn reserve_new(&self, items: &[OrderItem]) -> Result<(), InventoryError> {
        self.inventory.reserve(&StockLine::from_items(items)).await
    }

    /// Gives back the reservation of an order that was never stored.
    pub(crate) async fn undo_reservation(&self, items: &[OrderItem]) {
        if let Err(e) = self.inventory.release_reserved(&StockLine::from_items(items)).await {
            error!(error = %e, "failed to release reservation of unsaved order");
        }
    }

    /// Brings stock in line with a committed `from -> to` change and mirrors
    /// the resulting hold onto `order`.
    pub(crate) async fn after_transition(&self, order: &mut Order, items: &[OrderItem], from: OrderStatus, to: OrderStatus) {
        match to {
            OrderStatus::Confirmed if matches!(from, OrderStatus::Pending | OrderStatus::AwaitingPayment) => {
                self.deduct(order, items).await
            }
            OrderStatus::Cancelled | OrderStatus::Refunded => self.restore(order, items).await,
            OrderStatus::Pending => self.reserve_again(order, items).await,
            _ => {}
        }
    }

    /// Moves the hold before touching the counts, so a restoration that
    /// runs in between sees `Deducted` and restocks instead of releasing.
    async fn deduct(&self, order: &mut Order, items: &[OrderItem]) {
        if !self.move_hold(order, StockHold::Reserved, StockHold::Deducted).await {
            warn!(order_id = %order.id, hold = %order.stock_hold, "confirming order without a reservation, stock untouched");
            return;
        }
        if let Err(e) = self.inventory.deduct(&StockLine::from_items(items)).await {
            error!(order_id = %order.id, error = %e, "stock deduction failed, status update kept");
            if !self.move_hold(order, StockHold::Deducted, StockHold::Reserved).await {
                error!(order_id = %order.id, "stock restored against a failed deduction, counts need reconciliation");
            }
        }
    }

    /// Credits stock back at most once per order.
    async fn restore(&self, order: &mut Order, items: &[OrderItem]) {
        let previous = match self.orders.claim_stock_restoration(order.id).await {
            Ok(Some(previous)) => previous,
            Ok(None) => {
                debug!(order_id = %order.id, "stock already restored");
                order.is_stock_restored = true;
                order.stock_hold = StockHold::Released;
                return;
            }
            Err(e) => {
                error!(order_id = %order.id, error = %e, "could not claim stock restoration, status update kept");
                return;
            }
        };
        order.is_stock_restored = true;
        order.stock_hold = StockHold::Released;

        let lines = StockLine::from_items(items);
        let result = match previous {
            StockHold::Reserved => self.inventory.release_reserved(&lines).await,
            StockHold::Deducted => self.inventory.restock(&lines).await,
            StockHold::Released => Ok(()),
        };
        match result {
            Ok(()) => info!(order_id = %order.id, from = %previous, "stock restored"),
            Err(e) => error!(order_id = %order.id, from = %previous, error = %e, "stock restoration failed, status update kept"),
        }
    }

    async fn reserve_again(&self, order: &mut Order, items: &[OrderItem]) {
        let lines = StockLine::from_items(items);
        match order.stock_hold {
            StockHold::Reserved => {}
            StockHold::Deducted => {
                if !self.move_hold(order, StockHold::Deducted, StockHold::Released).await {
                    warn!(order_id = %order.id, "stock hold changed underneath, nothing returned");
                    return;
                }
                if let Err(e) = self.inventory.restock(&lines).await {
                    error!(order_id = %order.id, error = %e, "could not return deducted stock, status update kept");
                    self.move_hold(order, StockHold::Released, StockHold::Deducted).await;
                    return;
                }
                self.reserve_released(order, &lines).await;
            }
            StockHold::Released => self.reserve_released(order, &lines).await,
        }
    }

    /// Takes the stock first and only then records the hold. If the order
    /// was restored meanwhile the reservation is handed straight back.
    async fn reserve_released(&self, order: &mut Order, lines: &[StockLine]) {
        if let Err(e) = self.inventory.reserve(lines).await {
            error!(order_id = %order.id, error = %e, "stock re-reservation failed, status update kept");
            return;
        }
        if !self.move_hold(order, StockHold::Released, StockHold::Reserved).await {
            warn!(order_id = %order.id, "order restored during re-reservation, releasing it again");
            if let Err(e) = self.inventory.release_reserved(lines).await {
                error!(order_id = %order.id, error = %e, "could not release orphaned reservation");
            }
        }
    }

    /// Conditional hold write; `false` when the stored hold is not `from` or
    /// the order's stock was already restored.
    async fn move_hold(&self, order: &mut Order, from: StockHold, to: StockHold) -> bool {
        match self.orders.swap_stock_hold(order.id, from, to).await {
            Ok(true) => {
                order.stock_hold = to;
                true
            }
            Ok(false) => false,
            Err(e) => {
                error!(order_id = %order.id, hold = %to, error = %e, "failed to record stock hold");
                false
            }
        }
    }
}

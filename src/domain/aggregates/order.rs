//! Order Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::aggregates::refund::RefundType;
use crate::domain::lifecycle::{
    validate_payment_against_status, validate_payment_transition, validate_transition, OrderStatus, PaymentStatus,
};
use crate::domain::value_objects::{round_amount, Money};
use crate::domain::DomainError;

#[derive(Clone, Debug, Serialize)]
pub struct Order {
    pub(crate) id: Uuid,
    pub(crate) order_number: String,
    pub(crate) customer_id: Option<Uuid>,
    pub(crate) customer_email: String,
    pub(crate) status: OrderStatus,
    pub(crate) payment_status: PaymentStatus,
    pub(crate) payment_method: PaymentMethod,
    pub(crate) currency: String,
    pub(crate) subtotal: Decimal,
    pub(crate) shipping_fee: Decimal,
    pub(crate) discount: Decimal,
    pub(crate) grand_total: Decimal,
    pub(crate) refunded_total: Decimal,
    pub(crate) admin_notes: Option<String>,
    pub(crate) cancelled_reason: Option<String>,
    pub(crate) is_stock_restored: bool,
    pub(crate) stock_hold: StockHold,
    pub(crate) version: i64,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) updated_at: DateTime<Utc>,
    pub(crate) awaiting_payment_at: Option<DateTime<Utc>>,
    pub(crate) confirmed_at: Option<DateTime<Utc>>,
    pub(crate) processing_at: Option<DateTime<Utc>>,
    pub(crate) shipped_at: Option<DateTime<Utc>>,
    pub(crate) completed_at: Option<DateTime<Utc>>,
    pub(crate) cancelled_at: Option<DateTime<Utc>>,
    pub(crate) refunded_at: Option<DateTime<Utc>>,
    pub(crate) failed_at: Option<DateTime<Utc>>,
    pub(crate) paid_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub variation_id: Option<Uuid>,
    pub name: String,
    pub quantity: u32,
    pub price: Decimal,
}

impl OrderItem {
    pub fn line_total(&self) -> Decimal { self.price * Decimal::from(self.quantity) }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    #[default]
    Cod,
    BankTransfer,
    Online,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cod => "cod",
            PaymentMethod::BankTransfer => "bank_transfer",
            PaymentMethod::Online => "online",
        }
    }

    /// Prepaid methods wait for the money before anything is confirmed.
    pub fn initial_status(&self) -> OrderStatus {
        match self {
            PaymentMethod::Cod => OrderStatus::Pending,
            PaymentMethod::BankTransfer | PaymentMethod::Online => OrderStatus::AwaitingPayment,
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cod" => Ok(PaymentMethod::Cod),
            "bank_transfer" => Ok(PaymentMethod::BankTransfer),
            "online" => Ok(PaymentMethod::Online),
            other => Err(DomainError::Validation(format!("unknown payment method {other}"))),
        }
    }
}

/// What an order currently holds in inventory.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockHold {
    #[default]
    Reserved,
    Deducted,
    Released,
}

impl StockHold {
    pub fn as_str(&self) -> &'static str {
        match self {
            StockHold::Reserved => "reserved",
            StockHold::Deducted => "deducted",
            StockHold::Released => "released",
        }
    }
}

impl fmt::Display for StockHold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for StockHold {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reserved" => Ok(StockHold::Reserved),
            "deducted" => Ok(StockHold::Deducted),
            "released" => Ok(StockHold::Released),
            other => Err(DomainError::Validation(format!("unknown stock hold {other}"))),
        }
    }
}

#[derive(Clone, Debug)]
pub struct NewOrderLine {
    pub product_id: Uuid,
    pub variation_id: Option<Uuid>,
    pub name: String,
    pub quantity: u32,
    pub unit_price: Decimal,
}

#[derive(Clone, Debug)]
pub struct NewOrder {
    pub customer_id: Option<Uuid>,
    pub customer_email: String,
    pub currency: String,
    pub payment_method: PaymentMethod,
    pub shipping_fee: Decimal,
    pub discount: Decimal,
    pub lines: Vec<NewOrderLine>,
}

/// What a refund did to the order, for history and events.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RefundOutcome {
    pub kind: RefundType,
    pub amount: Decimal,
    pub status_change: Option<(OrderStatus, OrderStatus)>,
    pub payment_change: Option<(PaymentStatus, PaymentStatus)>,
}

impl Order {
    /// Builds a new order and its items. Lines for the same product and
    /// variation are merged.
    pub fn place(input: NewOrder, order_number: String, now: DateTime<Utc>) -> Result<(Self, Vec<OrderItem>), DomainError> {
        if input.lines.is_empty() { return Err(DomainError::NoItems); }
        if input.shipping_fee < Decimal::ZERO || input.discount < Decimal::ZERO {
            return Err(DomainError::Validation("fees and discounts must not be negative".into()));
        }

        let id = Uuid::now_v7();
        let mut items: Vec<OrderItem> = Vec::with_capacity(input.lines.len());
        for line in input.lines {
            if line.quantity == 0 { return Err(DomainError::Validation(format!("quantity for {} must be positive", line.product_id))); }
            if line.unit_price < Decimal::ZERO { return Err(DomainError::Validation(format!("price for {} must not be negative", line.product_id))); }
            if let Some(existing) = items.iter_mut().find(|i| i.product_id == line.product_id && i.variation_id == line.variation_id) {
                if existing.price != line.unit_price {
                    return Err(DomainError::Validation(format!("conflicting prices for {}", line.product_id)));
                }
                existing.quantity += line.quantity;
                continue;
            }
            items.push(OrderItem {
                id: Uuid::new_v4(), order_id: id, product_id: line.product_id, variation_id: line.variation_id,
                name: line.name, quantity: line.quantity, price: line.unit_price,
            });
        }

        let currency = Money::zero(&input.currency).currency().to_string();
        let subtotal = round_amount(items.iter().map(OrderItem::line_total).sum());
        let grand_total = round_amount(subtotal + input.shipping_fee - input.discount);
        if grand_total < Decimal::ZERO {
            return Err(DomainError::Validation("discount exceeds order value".into()));
        }

        let status = input.payment_method.initial_status();
        let mut order = Self {
            id, order_number, customer_id: input.customer_id, customer_email: input.customer_email,
            status, payment_status: PaymentStatus::Pending, payment_method: input.payment_method, currency,
            subtotal, shipping_fee: round_amount(input.shipping_fee), discount: round_amount(input.discount),
            grand_total, refunded_total: Decimal::ZERO, admin_notes: None, cancelled_reason: None,
            is_stock_restored: false, stock_hold: StockHold::Reserved, version: 0,
            created_at: now, updated_at: now, awaiting_payment_at: None, confirmed_at: None, processing_at: None,
            shipped_at: None, completed_at: None, cancelled_at: None, refunded_at: None, failed_at: None, paid_at: None,
        };
        order.stamp(status, now);
        Ok((order, items))
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn order_number(&self) -> &str { &self.order_number }
    pub fn customer_id(&self) -> Option<Uuid> { self.customer_id }
    pub fn customer_email(&self) -> &str { &self.customer_email }
    pub fn status(&self) -> OrderStatus { self.status }
    pub fn payment_status(&self) -> PaymentStatus { self.payment_status }
    pub fn payment_method(&self) -> PaymentMethod { self.payment_method }
    pub fn currency(&self) -> &str { &self.currency }
    pub fn subtotal(&self) -> Decimal { self.subtotal }
    pub fn grand_total(&self) -> Money { Money::new(self.grand_total, &self.currency) }
    pub fn refunded_total(&self) -> Money { Money::new(self.refunded_total, &self.currency) }
    pub fn admin_notes(&self) -> Option<&str> { self.admin_notes.as_deref() }
    pub fn cancelled_reason(&self) -> Option<&str> { self.cancelled_reason.as_deref() }
    pub fn is_stock_restored(&self) -> bool { self.is_stock_restored }
    pub fn stock_hold(&self) -> StockHold { self.stock_hold }
    pub fn version(&self) -> i64 { self.version }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }
    pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }
    pub fn confirmed_at(&self) -> Option<DateTime<Utc>> { self.confirmed_at }
    pub fn cancelled_at(&self) -> Option<DateTime<Utc>> { self.cancelled_at }
    pub fn refunded_at(&self) -> Option<DateTime<Utc>> { self.refunded_at }
    pub fn paid_at(&self) -> Option<DateTime<Utc>> { self.paid_at }

    pub fn remaining_refundable(&self) -> Decimal {
        self.grand_total()
            .subtract(&self.refunded_total())
            .map(|m| m.rounded().max(Decimal::ZERO))
            .unwrap_or(Decimal::ZERO)
    }

    /// Moves to `to` if the graph allows it and returns the previous status.
    pub fn transition_to(&mut self, to: OrderStatus, now: DateTime<Utc>) -> Result<OrderStatus, DomainError> {
        validate_transition(self.status, to)?;
        let from = self.status;
        self.status = to;
        self.stamp(to, now);
        self.updated_at = now;
        Ok(from)
    }

    /// Direct payment change; `refunded` goes through [`Order::apply_refund`].
    pub fn set_payment_status(&mut self, to: PaymentStatus, now: DateTime<Utc>) -> Result<PaymentStatus, DomainError> {
        validate_payment_transition(self.payment_status, to)?;
        validate_payment_against_status(self.status, to)?;
        let from = self.payment_status;
        self.payment_status = to;
        if to == PaymentStatus::Paid { self.paid_at = Some(now); }
        self.updated_at = now;
        Ok(from)
    }

    /// Applies a refund of `amount` in the order's currency. All checks run
    /// before anything changes.
    pub fn apply_refund(&mut self, amount: Decimal, now: DateTime<Utc>) -> Result<RefundOutcome, DomainError> {
        if self.payment_status != PaymentStatus::Paid {
            return Err(DomainError::RefundNotAllowed(self.payment_status));
        }
        let requested = Money::new(amount, &self.currency);
        if !requested.is_positive() { return Err(DomainError::InvalidRefundAmount); }
        let remaining = self.grand_total().subtract(&self.refunded_total())?;
        if requested.rounded() > remaining.rounded() {
            return Err(DomainError::RefundExceedsRemaining { requested: requested.rounded(), remaining: remaining.rounded() });
        }
        let grand_total = self.grand_total();
        let kind = if requested.same_amount(&grand_total) { RefundType::Full } else { RefundType::Partial };
        if kind == RefundType::Full {
            validate_transition(self.status, OrderStatus::Refunded)?;
        }
        let refunded = self.refunded_total().add(&requested)?;

        let status_change = match kind {
            RefundType::Full => Some((self.transition_to(OrderStatus::Refunded, now)?, OrderStatus::Refunded)),
            RefundType::Partial => None,
        };
        self.refunded_total = refunded.rounded();
        let payment_change = if refunded.rounded() >= grand_total.rounded() {
            let from = self.payment_status;
            self.payment_status = PaymentStatus::Refunded;
            Some((from, PaymentStatus::Refunded))
        } else {
            None
        };
        self.updated_at = now;
        Ok(RefundOutcome { kind, amount: requested.rounded(), status_change, payment_change })
    }

    pub fn set_admin_notes(&mut self, notes: Option<String>, now: DateTime<Utc>) -> Option<String> {
        self.updated_at = now;
        std::mem::replace(&mut self.admin_notes, notes)
    }

    pub fn set_cancelled_reason(&mut self, reason: Option<String>) {
        self.cancelled_reason = reason;
    }

    fn stamp(&mut self, status: OrderStatus, now: DateTime<Utc>) {
        let slot = match status {
            OrderStatus::Pending => return,
            OrderStatus::AwaitingPayment => &mut self.awaiting_payment_at,
            OrderStatus::Confirmed => &mut self.confirmed_at,
            OrderStatus::Processing => &mut self.processing_at,
            OrderStatus::Shipping => &mut self.shipped_at,
            OrderStatus::Completed => &mut self.completed_at,
            OrderStatus::Cancelled => &mut self.cancelled_at,
            OrderStatus::Refunded => &mut self.refunded_at,
            OrderStatus::Failed => &mut self.failed_at,
        };
        *slot = Some(now);
    }
}

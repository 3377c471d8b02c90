//! Append-only audit trail for orders.
//!
//! Every accepted status change, payment change and refund produces exactly
//! one [`HistoryEntry`]. Entries are never updated or deleted; repositories
//! only expose `append` and ordered reads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::aggregates::RefundType;
use crate::domain::lifecycle::{OrderStatus, PaymentStatus};
use crate::domain::DomainError;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorType {
    Admin,
    Customer,
    #[default]
    System,
}

impl ActorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActorType::Admin => "admin",
            ActorType::Customer => "customer",
            ActorType::System => "system",
        }
    }
}

impl FromStr for ActorType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "admin" => Ok(ActorType::Admin),
            "customer" => Ok(ActorType::Customer),
            "system" => Ok(ActorType::System),
            other => Err(DomainError::Validation(format!("unknown actor type {other}"))),
        }
    }
}

/// Who performed an action.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub name: String,
    pub actor_type: ActorType,
}

impl Actor {
    pub fn new(id: impl Into<String>, name: impl Into<String>, actor_type: ActorType) -> Self {
        Self { id: id.into(), name: name.into(), actor_type }
    }

    pub fn system() -> Self { Self::new("system", "System", ActorType::System) }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.actor_type.as_str(), self.id)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryAction {
    Created,
    StatusChanged,
    PaymentStatusChanged,
    RefundProcessed,
    NoteUpdated,
}

impl HistoryAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryAction::Created => "created",
            HistoryAction::StatusChanged => "status_changed",
            HistoryAction::PaymentStatusChanged => "payment_status_changed",
            HistoryAction::RefundProcessed => "refund_processed",
            HistoryAction::NoteUpdated => "note_updated",
        }
    }
}

impl FromStr for HistoryAction {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(HistoryAction::Created),
            "status_changed" => Ok(HistoryAction::StatusChanged),
            "payment_status_changed" => Ok(HistoryAction::PaymentStatusChanged),
            "refund_processed" => Ok(HistoryAction::RefundProcessed),
            "note_updated" => Ok(HistoryAction::NoteUpdated),
            other => Err(DomainError::Validation(format!("unknown history action {other}"))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: Uuid,
    pub order_id: Uuid,
    pub action: HistoryAction,
    pub description: String,
    pub actor_id: String,
    pub actor_name: String,
    pub actor_type: ActorType,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn new(order_id: Uuid, action: HistoryAction, description: impl Into<String>, actor: &Actor) -> Self {
        Self {
            id: Uuid::now_v7(),
            order_id,
            action,
            description: description.into(),
            actor_id: actor.id.clone(),
            actor_name: actor.name.clone(),
            actor_type: actor.actor_type,
            old_value: None,
            new_value: None,
            metadata: serde_json::Value::Null,
            created_at: Utc::now(),
        }
    }

    pub fn values(mut self, old: Option<String>, new: Option<String>) -> Self {
        self.old_value = old;
        self.new_value = new;
        self
    }

    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn created(order_id: Uuid, order_number: &str, status: OrderStatus, actor: &Actor) -> Self {
        Self::new(order_id, HistoryAction::Created, format!("Order {order_number} created"), actor)
            .values(None, Some(status.to_string()))
    }

    pub fn status_changed(order_id: Uuid, from: OrderStatus, to: OrderStatus, reason: Option<&str>, actor: &Actor) -> Self {
        let mut description = format!("Status changed from {from} to {to}");
        if let Some(reason) = reason {
            description.push_str(&format!(": {reason}"));
        }
        let entry = Self::new(order_id, HistoryAction::StatusChanged, description, actor)
            .values(Some(from.to_string()), Some(to.to_string()));
        match reason {
            Some(reason) => entry.metadata(serde_json::json!({ "reason": reason })),
            None => entry,
        }
    }

    pub fn payment_changed(order_id: Uuid, from: PaymentStatus, to: PaymentStatus, actor: &Actor) -> Self {
        Self::new(order_id, HistoryAction::PaymentStatusChanged, format!("Payment status changed from {from} to {to}"), actor)
            .values(Some(from.to_string()), Some(to.to_string()))
    }

    pub fn refund_processed(
        order_id: Uuid,
        refund_id: Uuid,
        kind: RefundType,
        amount: &str,
        reason: &str,
        refunded_before: &str,
        refunded_after: &str,
        actor: &Actor,
    ) -> Self {
        Self::new(order_id, HistoryAction::RefundProcessed, format!("{} refund of {amount}: {reason}", kind.as_str()), actor)
            .values(Some(refunded_before.to_string()), Some(refunded_after.to_string()))
            .metadata(serde_json::json!({ "refund_id": refund_id, "type": kind, "amount": amount, "reason": reason }))
    }

    pub fn note_updated(order_id: Uuid, old: Option<String>, new: Option<String>, actor: &Actor) -> Self {
        Self::new(order_id, HistoryAction::NoteUpdated, "Admin notes updated", actor).values(old, new)
    }
}

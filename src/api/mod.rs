//! HTTP surface.

pub mod error;
pub mod extract;
mod handlers;

use axum::{
    routing::{get, patch, post, put},
    Router,
};
use std::sync::Arc;

use crate::application::OrderService;

pub use error::ApiError;
pub use extract::RequestActor;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<OrderService>,
    pub default_currency: String,
}

impl AppState {
    pub fn new(service: OrderService, default_currency: impl Into<String>) -> Self {
        Self { service: Arc::new(service), default_currency: default_currency.into() }
    }
}

/// Routes without middleware; the binary adds tracing and CORS layers.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/v1/orders", get(handlers::list_orders).post(handlers::create_order))
        .route("/api/v1/orders/:id", get(handlers::get_order))
        .route("/api/v1/orders/:id/status", patch(handlers::update_status))
        .route("/api/v1/orders/:id/payment-status", patch(handlers::update_payment_status))
        .route("/api/v1/orders/:id/cancel", post(handlers::cancel_order))
        .route("/api/v1/orders/:id/transitions", get(handlers::allowed_transitions))
        .route("/api/v1/orders/:id/refunds", get(handlers::list_refunds).post(handlers::process_refund))
        .route("/api/v1/orders/:id/history", get(handlers::history))
        .route("/api/v1/orders/:id/notes", put(handlers::set_admin_notes))
        .route("/api/v1/inventory/:product_id", get(handlers::get_stock).put(handlers::set_stock))
        .with_state(state)
}

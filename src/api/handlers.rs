use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::api::error::ApiError;
use crate::api::extract::RequestActor;
use crate::api::AppState;
use crate::application::{OrderDetails, Page, RefundResult, TransitionOptions};
use crate::domain::aggregates::{NewOrder, NewOrderLine, Order, PaymentMethod, Refund, StockKey, StockLevel};
use crate::domain::history::HistoryEntry;
use crate::domain::lifecycle::{OrderStatus, PaymentStatus};
use crate::infrastructure::OrderFilter;

type ApiResult<T> = Result<Json<T>, ApiError>;

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "healthy", "service": "opensase-orders"}))
}

// =============================================================================
// Orders
// =============================================================================

#[derive(Debug, Deserialize, Validate)]
pub struct CreateOrderRequest {
    pub customer_id: Option<Uuid>,
    #[validate(email)]
    pub customer_email: String,
    #[validate(length(equal = 3, message = "currency must be an ISO 4217 code"))]
    pub currency: Option<String>,
    #[serde(default)]
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub shipping_fee: Decimal,
    #[serde(default)]
    pub discount: Decimal,
    #[validate(length(min = 1, message = "an order needs at least one item"))]
    pub items: Vec<OrderLineRequest>,
}

/// `Serialize` lets validator attach the rejected list to a length error.
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct OrderLineRequest {
    pub product_id: Uuid,
    pub variation_id: Option<Uuid>,
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(range(min = 1, max = 10000))]
    pub quantity: u32,
    pub unit_price: Decimal,
}

pub async fn create_order(
    State(state): State<AppState>,
    RequestActor(actor): RequestActor,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderDetails>), ApiError> {
    req.validate()?;
    for line in &req.items {
        line.validate()?;
    }
    let input = NewOrder {
        customer_id: req.customer_id,
        customer_email: req.customer_email,
        currency: req.currency.unwrap_or_else(|| state.default_currency.clone()),
        payment_method: req.payment_method,
        shipping_fee: req.shipping_fee,
        discount: req.discount,
        lines: req
            .items
            .into_iter()
            .map(|l| NewOrderLine {
                product_id: l.product_id,
                variation_id: l.variation_id,
                name: l.name,
                quantity: l.quantity,
                unit_price: l.unit_price,
            })
            .collect(),
    };
    let details = state.service.create_order(input, &actor).await?;
    Ok((StatusCode::CREATED, Json(details)))
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub status: Option<String>,
    pub payment_status: Option<String>,
    pub customer_email: Option<String>,
}

pub async fn list_orders(State(state): State<AppState>, Query(p): Query<ListParams>) -> ApiResult<Page<Order>> {
    let filter = OrderFilter {
        status: p.status.as_deref().map(str::parse::<OrderStatus>).transpose().map_err(crate::EcommerceError::from)?,
        payment_status: p
            .payment_status
            .as_deref()
            .map(str::parse::<PaymentStatus>)
            .transpose()
            .map_err(crate::EcommerceError::from)?,
        customer_email: p.customer_email,
        page: p.page.unwrap_or(1).max(1),
        per_page: p.per_page.unwrap_or(20).min(100),
    };
    Ok(Json(state.service.list_orders(filter).await?))
}

pub async fn get_order(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<OrderDetails> {
    Ok(Json(state.service.get_order(id).await?))
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateStatusRequest {
    pub status: String,
    #[validate(length(max = 1000))]
    pub reason: Option<String>,
}

pub async fn update_status(
    State(state): State<AppState>,
    RequestActor(actor): RequestActor,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateStatusRequest>,
) -> ApiResult<Order> {
    req.validate()?;
    let to: OrderStatus = req.status.parse().map_err(crate::EcommerceError::from)?;
    Ok(Json(state.service.update_status(id, to, req.reason, &actor).await?))
}

#[derive(Debug, Deserialize, Validate)]
pub struct CancelRequest {
    #[validate(length(min = 1, max = 1000, message = "a cancellation reason is required"))]
    pub reason: String,
}

pub async fn cancel_order(
    State(state): State<AppState>,
    RequestActor(actor): RequestActor,
    Path(id): Path<Uuid>,
    Json(req): Json<CancelRequest>,
) -> ApiResult<Order> {
    req.validate()?;
    Ok(Json(state.service.cancel_order(id, req.reason, &actor).await?))
}

#[derive(Debug, Deserialize)]
pub struct UpdatePaymentStatusRequest {
    pub payment_status: String,
}

pub async fn update_payment_status(
    State(state): State<AppState>,
    RequestActor(actor): RequestActor,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdatePaymentStatusRequest>,
) -> ApiResult<Order> {
    let to: PaymentStatus = req.payment_status.parse().map_err(crate::EcommerceError::from)?;
    Ok(Json(state.service.update_payment_status(id, to, &actor).await?))
}

pub async fn allowed_transitions(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<TransitionOptions> {
    Ok(Json(state.service.allowed_transitions(id).await?))
}

pub async fn history(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Vec<HistoryEntry>> {
    Ok(Json(state.service.history(id).await?))
}

#[derive(Debug, Deserialize, Validate)]
pub struct NotesRequest {
    #[validate(length(max = 5000))]
    pub admin_notes: Option<String>,
}

pub async fn set_admin_notes(
    State(state): State<AppState>,
    RequestActor(actor): RequestActor,
    Path(id): Path<Uuid>,
    Json(req): Json<NotesRequest>,
) -> ApiResult<Order> {
    req.validate()?;
    Ok(Json(state.service.set_admin_notes(id, req.admin_notes, &actor).await?))
}

// =============================================================================
// Refunds
// =============================================================================

#[derive(Debug, Deserialize, Validate)]
pub struct RefundRequest {
    pub amount: Decimal,
    #[validate(length(min = 1, max = 1000, message = "a refund reason is required"))]
    pub reason: String,
}

pub async fn list_refunds(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Vec<Refund>> {
    Ok(Json(state.service.refunds(id).await?))
}

pub async fn process_refund(
    State(state): State<AppState>,
    RequestActor(actor): RequestActor,
    Path(id): Path<Uuid>,
    Json(req): Json<RefundRequest>,
) -> Result<(StatusCode, Json<RefundResult>), ApiError> {
    req.validate()?;
    let result = state.service.process_refund(id, req.amount, req.reason, &actor).await?;
    Ok((StatusCode::CREATED, Json(result)))
}

// =============================================================================
// Inventory
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct VariationParam {
    pub variation_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SetStockRequest {
    #[validate(range(min = 0))]
    pub on_hand: i64,
}

pub async fn get_stock(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
    Query(v): Query<VariationParam>,
) -> ApiResult<StockLevel> {
    Ok(Json(state.service.stock(StockKey::new(product_id, v.variation_id)).await?))
}

pub async fn set_stock(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
    Query(v): Query<VariationParam>,
    Json(req): Json<SetStockRequest>,
) -> ApiResult<StockLevel> {
    req.validate()?;
    Ok(Json(state.service.set_stock(StockKey::new(product_id, v.variation_id), req.on_hand).await?))
}

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::domain::DomainError;
use crate::{EcommerceError, InventoryError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    code: &'a str,
    message: &'a str,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self { status, code, message: message.into() }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad_request", message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody { code: self.code, message: &self.message };
        (self.status, Json(body)).into_response()
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "validation_failed", errors.to_string())
    }
}

impl From<EcommerceError> for ApiError {
    fn from(err: EcommerceError) -> Self {
        let message = err.to_string();
        let (status, code) = match &err {
            EcommerceError::OrderNotFound(_) => (StatusCode::NOT_FOUND, "order_not_found"),
            EcommerceError::StockNotFound(_) => (StatusCode::NOT_FOUND, "stock_not_found"),
            EcommerceError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            EcommerceError::Domain(e) => (StatusCode::BAD_REQUEST, domain_code(e)),
            EcommerceError::Inventory(e) => match e {
                InventoryError::Insufficient { .. } => (StatusCode::CONFLICT, "insufficient_stock"),
                InventoryError::UnknownItem(_) => (StatusCode::CONFLICT, "unknown_stock_item"),
                InventoryError::BelowReserved { .. } => (StatusCode::CONFLICT, "below_reserved"),
                InventoryError::Inconsistent { .. } | InventoryError::Storage(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "inventory_error")
                }
            },
            EcommerceError::StorageError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage_error"),
        };
        if status.is_server_error() {
            tracing::error!(error = %message, "request failed");
            return Self::new(status, code, "internal error");
        }
        Self::new(status, code, message)
    }
}

fn domain_code(err: &DomainError) -> &'static str {
    match err {
        DomainError::InvalidTransition { .. } => "invalid_transition",
        DomainError::InvalidPaymentTransition { .. } => "invalid_payment_transition",
        DomainError::PaymentRejected { .. } => "payment_rejected",
        DomainError::UnknownStatus(_) => "unknown_status",
        DomainError::RefundViaStatusUpdate => "refund_requires_refund_endpoint",
        DomainError::RefundNotAllowed(_) => "refund_not_allowed",
        DomainError::InvalidRefundAmount => "invalid_refund_amount",
        DomainError::RefundExceedsRemaining { .. } => "refund_exceeds_remaining",
        DomainError::NoItems => "no_items",
        DomainError::Validation(_) => "validation_failed",
        DomainError::Money(_) => "currency_mismatch",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::lifecycle::OrderStatus;
    use uuid::Uuid;

    #[test]
    fn test_status_mapping() {
        let err: ApiError = EcommerceError::OrderNotFound(Uuid::nil()).into();
        assert_eq!(err.status, StatusCode::NOT_FOUND);

        let err: ApiError = EcommerceError::Domain(DomainError::InvalidTransition {
            from: OrderStatus::Cancelled,
            to: OrderStatus::Pending,
        })
        .into();
        assert_eq!((err.status, err.code), (StatusCode::BAD_REQUEST, "invalid_transition"));

        let err: ApiError = EcommerceError::Conflict(Uuid::nil()).into();
        assert_eq!(err.status, StatusCode::CONFLICT);
    }

    #[test]
    fn test_server_errors_hide_details() {
        let err: ApiError = EcommerceError::StorageError("connection refused on 10.0.0.5".into()).into();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message, "internal error");
    }
}

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::{
    db::is_lock_timeout,
    entity::enums::OrderStatus,
    response::{ApiResponse, Meta},
};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not Found")]
    NotFound,

    #[error("Bad Request {0}")]
    BadRequest(String),

    #[error("Unauthorized {0}")]
    Unauthorized(String),

    #[error("Forbidden")]
    Forbidden,

    #[error("Cart is empty")]
    EmptyCart,

    #[error("Address not found")]
    AddressNotFound,

    #[error("Product variant {0} not found")]
    VariantNotFound(Uuid),

    #[error("Insufficient stock for variant {variant_id}: available {available}, requested {requested}")]
    InsufficientStock {
        variant_id: Uuid,
        available: i32,
        requested: i32,
    },

    #[error("Timed out waiting for a stock lock")]
    LockTimeout,

    #[error("Failed to generate order number")]
    OrderNumberExhausted,

    #[error("Payment record not found")]
    PaymentNotFound,

    #[error("Invalid payment signature")]
    InvalidSignature,

    #[error("Payment already processed")]
    AlreadyProcessed,

    #[error("Payment has failed, start a new payment")]
    PaymentFailed,

    #[error("Cannot move order from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("Database error")]
    DbError(#[from] sqlx::Error),

    #[error("ORM error")]
    OrmError(sea_orm::DbErr),

    #[error("Internal Server Error")]
    Internal(#[from] anyhow::Error),
}

impl From<sea_orm::DbErr> for AppError {
    fn from(err: sea_orm::DbErr) -> Self {
        if is_lock_timeout(&err) {
            AppError::LockTimeout
        } else {
            AppError::OrmError(err)
        }
    }
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound
            | AppError::AddressNotFound
            | AppError::VariantNotFound(_)
            | AppError::PaymentNotFound => StatusCode::NOT_FOUND,
            AppError::BadRequest(_)
            | AppError::EmptyCart
            | AppError::InsufficientStock { .. }
            | AppError::InvalidSignature
            | AppError::PaymentFailed
            | AppError::InvalidTransition { .. } => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::AlreadyProcessed => StatusCode::CONFLICT,
            AppError::LockTimeout => StatusCode::SERVICE_UNAVAILABLE,
            AppError::OrderNumberExhausted
            | AppError::DbError(_)
            | AppError::OrmError(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorData {
    error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match &self {
            AppError::DbError(err) => tracing::error!(error = %err, "database error"),
            AppError::OrmError(err) => tracing::error!(error = %err, "orm error"),
            AppError::Internal(err) => tracing::error!(error = ?err, "internal error"),
            _ => {}
        }

        let body = ApiResponse {
            message: self.to_string(),
            data: Some(ErrorData {
                error: self.to_string(),
            }),
            meta: Some(Meta::empty()),
            replayed: false,
        };

        (status, axum::Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkout_errors_map_to_documented_statuses() {
        assert_eq!(AppError::EmptyCart.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::AddressNotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            AppError::OrderNumberExhausted.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        let shortage = AppError::InsufficientStock {
            variant_id: Uuid::nil(),
            available: 0,
            requested: 1,
        };
        assert_eq!(shortage.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn settlement_errors_map_to_documented_statuses() {
        assert_eq!(AppError::InvalidSignature.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::PaymentNotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::Forbidden.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::AlreadyProcessed.status_code(), StatusCode::CONFLICT);
    }

    #[test]
    fn cancelling_shipped_order_is_a_client_error() {
        let err = AppError::InvalidTransition {
            from: OrderStatus::Shipped,
            to: OrderStatus::Cancelled,
        };
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.to_string(), "Cannot move order from shipped to cancelled");
    }

    #[test]
    fn plain_db_errors_are_not_lock_timeouts() {
        let err: AppError = sea_orm::DbErr::RecordNotFound("orders".into()).into();
        assert!(matches!(err, AppError::OrmError(_)));
    }
}

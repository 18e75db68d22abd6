use serde_json::Value;
use uuid::Uuid;

use crate::{db::DbPool, error::AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    OrderCreated,
    OrderCancelled,
    OrderExpired,
    OrderStatusUpdated,
    PaymentSettled,
    PaymentFailed,
    CaptureRefused,
}

impl AuditAction {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditAction::OrderCreated => "order_created",
            AuditAction::OrderCancelled => "order_cancelled",
            AuditAction::OrderExpired => "order_expired",
            AuditAction::OrderStatusUpdated => "order_status_updated",
            AuditAction::PaymentSettled => "payment_settled",
            AuditAction::PaymentFailed => "payment_failed",
            AuditAction::CaptureRefused => "capture_refused",
        }
    }

    pub fn resource(self) -> &'static str {
        match self {
            AuditAction::OrderCreated
            | AuditAction::OrderCancelled
            | AuditAction::OrderExpired
            | AuditAction::OrderStatusUpdated => "orders",
            AuditAction::PaymentSettled | AuditAction::PaymentFailed | AuditAction::CaptureRefused => {
                "payments"
            }
        }
    }
}

pub async fn log_audit(
    pool: &DbPool,
    user_id: Option<Uuid>,
    action: AuditAction,
    metadata: Value,
) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO audit_logs (id, user_id, action, resource, metadata)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(action.as_str())
    .bind(action.resource())
    .bind(metadata)
    .execute(pool)
    .await?;

    Ok(())
}

/// Audit writes happen after commit and must never change the request outcome.
pub async fn record(pool: &DbPool, user_id: Option<Uuid>, action: AuditAction, metadata: Value) {
    if let Err(err) = log_audit(pool, user_id, action, metadata).await {
        tracing::warn!(error = %err, action = action.as_str(), "audit log failed");
    }
}

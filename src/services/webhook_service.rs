//! Asynchronous gateway notifications, delivered at least once.
//!
//! Anything a retry cannot change (duplicates, unknown events, refused
//! settlements) is acknowledged with 2xx. Only bad signatures and infrastructure
//! failures surface as errors.

use chrono::Utc;
use sea_orm::sea_query::LockType;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QuerySelect, Set};
use serde::Deserialize;

use crate::{
    audit::{self, AuditAction},
    db::begin_locking,
    dto::payments::{WebhookAck, WebhookOutcome},
    entity::{
        enums::PaymentStatus,
        orders::Entity as Orders,
        payments::{ActiveModel as PaymentActive, Column as PaymentCol, Entity as Payments},
    },
    error::{AppError, AppResult},
    gateway::verify_webhook_signature,
    services::{
        payment_service::{SettleSource, Settlement, settle},
        reservation_service::lock_order,
    },
    state::AppState,
};

#[derive(Debug, Deserialize)]
struct RawEvent {
    event: String,
    #[serde(default)]
    payload: Option<RawPayload>,
}

#[derive(Debug, Deserialize)]
struct RawPayload {
    payment: RawPaymentEnvelope,
}

#[derive(Debug, Deserialize)]
struct RawPaymentEnvelope {
    entity: RawPayment,
}

#[derive(Debug, Deserialize)]
struct RawPayment {
    id: String,
    order_id: String,
    #[serde(default)]
    error_description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayEvent {
    Captured {
        gateway_order_id: String,
        gateway_payment_id: String,
    },
    Failed {
        gateway_order_id: String,
        gateway_payment_id: String,
        reason: Option<String>,
    },
    Other(String),
}

#[derive(Debug, thiserror::Error)]
pub enum EventParseError {
    #[error("malformed webhook body: {0}")]
    Json(#[from] serde_json::Error),
    #[error("event {0} carries no payment entity")]
    MissingPayment(String),
}

pub fn parse_event(body: &[u8]) -> Result<GatewayEvent, EventParseError> {
    let RawEvent { event, payload } = serde_json::from_slice(body)?;
    let captured = match event.as_str() {
        "payment.captured" => true,
        "payment.failed" => false,
        _ => return Ok(GatewayEvent::Other(event)),
    };
    let Some(RawPayload {
        payment: RawPaymentEnvelope { entity: p },
    }) = payload
    else {
        return Err(EventParseError::MissingPayment(event));
    };

    if captured {
        Ok(GatewayEvent::Captured {
            gateway_order_id: p.order_id,
            gateway_payment_id: p.id,
        })
    } else {
        Ok(GatewayEvent::Failed {
            gateway_order_id: p.order_id,
            gateway_payment_id: p.id,
            reason: p.error_description,
        })
    }
}

fn ack(outcome: WebhookOutcome, order_number: Option<String>) -> WebhookAck {
    WebhookAck {
        outcome,
        order_number,
    }
}

pub async fn handle_notification(
    state: &AppState,
    body: &[u8],
    signature: Option<&str>,
) -> AppResult<WebhookAck> {
    let verified = signature.is_some_and(|sig| {
        verify_webhook_signature(body, sig, &state.gateway_settings.webhook_secret)
    });
    if !verified {
        tracing::warn!(
            has_signature = signature.is_some(),
            body_len = body.len(),
            "webhook signature mismatch"
        );
        return Err(AppError::InvalidSignature);
    }

    let event = match parse_event(body) {
        Ok(event) => event,
        Err(err) => {
            tracing::warn!(error = %err, "ignoring signed but unreadable webhook");
            return Ok(ack(WebhookOutcome::Ignored, None));
        }
    };

    let result = match event {
        GatewayEvent::Captured {
            gateway_order_id,
            gateway_payment_id,
        } => captured(state, &gateway_order_id, &gateway_payment_id).await,
        GatewayEvent::Failed {
            gateway_order_id,
            gateway_payment_id,
            reason,
        } => failed(state, &gateway_order_id, &gateway_payment_id, reason).await,
        GatewayEvent::Other(name) => {
            tracing::info!(event = %name, "ignoring unhandled webhook event");
            Ok(ack(WebhookOutcome::Ignored, None))
        }
    }?;

    tracing::debug!(
        outcome = ?result.outcome,
        order_number = ?result.order_number,
        "webhook handled"
    );
    Ok(result)
}

async fn captured(
    state: &AppState,
    gateway_order_id: &str,
    gateway_payment_id: &str,
) -> AppResult<WebhookAck> {
    let Some(payment) = Payments::find()
        .filter(PaymentCol::GatewayOrderId.eq(gateway_order_id))
        .one(&state.orm)
        .await?
    else {
        // Also reached when the payment was re-armed and the old gateway order
        // still got captured. Money moved either way.
        tracing::error!(
            gateway_order_id,
            gateway_payment_id,
            "capture for unknown gateway order, manual refund required"
        );
        audit::record(
            &state.pool,
            None,
            AuditAction::CaptureRefused,
            serde_json::json!({
                "gateway_order_id": gateway_order_id,
                "gateway_payment_id": gateway_payment_id,
                "reason": "unknown gateway order",
            }),
        )
        .await;
        return Ok(ack(WebhookOutcome::Ignored, None));
    };

    let order_number = Orders::find_by_id(payment.order_id)
        .one(&state.orm)
        .await?
        .map(|order| order.order_number);

    if payment.payment_status == PaymentStatus::Success {
        tracing::info!(gateway_order_id, "duplicate capture acknowledged");
        return Ok(ack(WebhookOutcome::Duplicate, order_number));
    }

    let settled = settle(
        state,
        payment.order_id,
        payment.id,
        gateway_payment_id,
        None,
        SettleSource::Webhook,
    )
    .await;

    match settled {
        Ok(Settlement::Applied { order, .. }) => {
            Ok(ack(WebhookOutcome::Applied, Some(order.order_number)))
        }
        Ok(Settlement::AlreadyPaid { order }) => {
            Ok(ack(WebhookOutcome::Duplicate, Some(order.order_number)))
        }
        Err(err @ (AppError::InsufficientStock { .. } | AppError::InvalidTransition { .. })) => {
            // Money was taken but the order cannot be confirmed.
            tracing::error!(
                error = %err,
                order_id = %payment.order_id,
                gateway_order_id,
                gateway_payment_id,
                "captured payment refused, manual refund required"
            );
            audit::record(
                &state.pool,
                None,
                AuditAction::CaptureRefused,
                serde_json::json!({
                    "order_id": payment.order_id,
                    "gateway_payment_id": gateway_payment_id,
                    "reason": err.to_string(),
                }),
            )
            .await;
            Ok(ack(WebhookOutcome::Rejected, order_number))
        }
        Err(AppError::NotFound | AppError::PaymentNotFound) => {
            Ok(ack(WebhookOutcome::Ignored, order_number))
        }
        Err(err) => Err(err),
    }
}

async fn failed(
    state: &AppState,
    gateway_order_id: &str,
    gateway_payment_id: &str,
    reason: Option<String>,
) -> AppResult<WebhookAck> {
    let Some(payment) = Payments::find()
        .filter(PaymentCol::GatewayOrderId.eq(gateway_order_id))
        .one(&state.orm)
        .await?
    else {
        tracing::warn!(gateway_order_id, "failure for unknown payment");
        return Ok(ack(WebhookOutcome::Ignored, None));
    };

    let txn = begin_locking(&state.orm, state.checkout.lock_timeout).await?;
    let order = lock_order(&txn, payment.order_id).await?;
    let Some(payment) = Payments::find_by_id(payment.id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
    else {
        return Ok(ack(WebhookOutcome::Ignored, None));
    };
    let order_number = order.map(|order| order.order_number);

    match payment.payment_status {
        PaymentStatus::Success => {
            txn.rollback().await?;
            tracing::warn!(gateway_order_id, "failure reported for a captured payment, ignored");
            return Ok(ack(WebhookOutcome::Duplicate, order_number));
        }
        PaymentStatus::Failed => {
            txn.rollback().await?;
            return Ok(ack(WebhookOutcome::Duplicate, order_number));
        }
        PaymentStatus::Pending => {}
    }

    let order_id = payment.order_id;
    let mut active: PaymentActive = payment.into();
    active.payment_status = Set(PaymentStatus::Failed);
    active.gateway_payment_id = Set(Some(gateway_payment_id.to_string()));
    active.updated_at = Set(Utc::now().into());
    active.update(&txn).await?;
    txn.commit().await?;

    tracing::info!(
        %order_id,
        gateway_order_id,
        gateway_payment_id,
        reason = reason.as_deref().unwrap_or("-"),
        "payment failed"
    );
    audit::record(
        &state.pool,
        None,
        AuditAction::PaymentFailed,
        serde_json::json!({
            "order_id": order_id,
            "gateway_payment_id": gateway_payment_id,
            "reason": reason,
        }),
    )
    .await;

    Ok(ack(WebhookOutcome::Applied, order_number))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_captured_event() {
        let body = br#"{
            "event": "payment.captured",
            "payload": {"payment": {"entity": {"id": "pay_1", "order_id": "order_1", "amount": 1180}}}
        }"#;
        assert_eq!(
            parse_event(body).unwrap(),
            GatewayEvent::Captured {
                gateway_order_id: "order_1".into(),
                gateway_payment_id: "pay_1".into(),
            }
        );
    }

    #[test]
    fn parses_failed_event_with_reason() {
        let body = br#"{
            "event": "payment.failed",
            "payload": {"payment": {"entity": {"id": "pay_2", "order_id": "order_2", "error_description": "card declined"}}}
        }"#;
        match parse_event(body).unwrap() {
            GatewayEvent::Failed { reason, .. } => {
                assert_eq!(reason.as_deref(), Some("card declined"))
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn unknown_events_pass_through_without_payload() {
        let body = br#"{"event": "refund.created"}"#;
        assert_eq!(parse_event(body).unwrap(), GatewayEvent::Other("refund.created".into()));
    }

    #[test]
    fn payment_events_require_an_entity() {
        let body = br#"{"event": "payment.captured"}"#;
        assert!(matches!(parse_event(body), Err(EventParseError::MissingPayment(_))));
        assert!(matches!(parse_event(b"not json"), Err(EventParseError::Json(_))));
    }
}

//! Gateway payment orders and settlement.
//!
//! Checkout callbacks (`verify_payment`) and gateway webhooks both end in
//! [`settle`], which is the only place a payment becomes `Success`.

use chrono::Utc;
use sea_orm::sea_query::LockType;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QuerySelect, Set};
use uuid::Uuid;

use crate::{
    audit::{self, AuditAction},
    db::begin_locking,
    dto::payments::{CreatePaymentOrderRequest, PaymentOrder, PaymentVerified, VerifyPaymentRequest},
    entity::{
        enums::{OrderStatus, PaymentMethod, PaymentStatus},
        orders::{Entity as Orders, Model as OrderModel},
        payments::{
            ActiveModel as PaymentActive, Column as PaymentCol, Entity as Payments,
            Model as PaymentModel,
        },
    },
    error::{AppError, AppResult},
    gateway::verify_payment_signature,
    middleware::auth::AuthUser,
    notifications::Notification,
    response::{ApiResponse, Meta},
    services::{
        inventory_service::{LockedVariants, quantities_for_order},
        reservation_service::{lock_order, transition},
    },
    state::AppState,
};

/// Who is asking for the payment to be settled.
#[derive(Debug, Clone, Copy)]
pub enum SettleSource {
    /// The buyer's browser returning from checkout.
    Checkout { user_id: Uuid },
    /// An authenticated gateway notification. The gateway is authoritative, so a
    /// payment previously marked failed can still be captured.
    Webhook,
}

impl SettleSource {
    fn changed_by(self) -> Option<Uuid> {
        match self {
            SettleSource::Checkout { user_id } => Some(user_id),
            SettleSource::Webhook => None,
        }
    }

    fn label(self) -> &'static str {
        match self {
            SettleSource::Checkout { .. } => "checkout",
            SettleSource::Webhook => "webhook",
        }
    }
}

#[derive(Debug)]
pub enum Settlement {
    Applied {
        order: OrderModel,
        payment: PaymentModel,
    },
    /// The payment had already succeeded when the lock was taken.
    AlreadyPaid { order: OrderModel },
}

pub async fn create_payment_order(
    state: &AppState,
    user: &AuthUser,
    payload: CreatePaymentOrderRequest,
) -> AppResult<ApiResponse<PaymentOrder>> {
    let settings = state.checkout.as_ref();
    // The order row lock serialises requests for the same order.
    let txn = begin_locking(&state.orm, settings.lock_timeout).await?;
    let order = lock_order(&txn, payload.order_id)
        .await?
        .filter(|order| order.user_id == user.user_id)
        .ok_or(AppError::NotFound)?;

    if order.payment_method != PaymentMethod::Gateway {
        return Err(AppError::BadRequest("Order is not paid through the gateway".into()));
    }
    if order.status != OrderStatus::Pending {
        return Err(AppError::BadRequest(format!(
            "Order is {} and cannot be paid",
            order.status
        )));
    }

    let existing = Payments::find()
        .filter(PaymentCol::OrderId.eq(order.id))
        .lock(LockType::Update)
        .one(&txn)
        .await?;

    if let Some(payment) = &existing {
        match (payment.payment_status, &payment.gateway_order_id) {
            (PaymentStatus::Success, _) => return Err(AppError::AlreadyProcessed),
            (PaymentStatus::Pending, Some(gateway_order_id)) => {
                let data = PaymentOrder {
                    order_number: order.order_number.clone(),
                    gateway_order_id: gateway_order_id.clone(),
                    gateway_key_id: state.gateway_settings.key_id.clone(),
                    amount: payment.amount,
                    currency: payment.currency.clone(),
                };
                txn.rollback().await?;
                return Ok(ApiResponse::success("Payment order exists", data, Some(Meta::empty())));
            }
            _ => {}
        }
    }

    let gateway_order = state
        .gateway
        .create_order(order.total_amount, &settings.currency, &order.order_number)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, order_id = %order.id, "gateway order creation failed");
            AppError::Internal(err)
        })?;

    let now = Utc::now();
    let payment = match existing {
        Some(payment) => {
            // A failed attempt is re-armed with a fresh gateway order.
            let mut active: PaymentActive = payment.into();
            active.payment_status = Set(PaymentStatus::Pending);
            active.amount = Set(order.total_amount);
            active.gateway_order_id = Set(Some(gateway_order.id.clone()));
            active.gateway_payment_id = Set(None);
            active.gateway_signature = Set(None);
            active.updated_at = Set(now.into());
            active.update(&txn).await?
        }
        None => {
            PaymentActive {
                id: Set(Uuid::new_v4()),
                order_id: Set(order.id),
                payment_method: Set(PaymentMethod::Gateway),
                payment_status: Set(PaymentStatus::Pending),
                amount: Set(order.total_amount),
                currency: Set(settings.currency.clone()),
                gateway_order_id: Set(Some(gateway_order.id.clone())),
                gateway_payment_id: Set(None),
                gateway_signature: Set(None),
                paid_at: Set(None),
                created_at: Set(now.into()),
                updated_at: Set(now.into()),
            }
            .insert(&txn)
            .await?
        }
    };
    txn.commit().await?;

    tracing::info!(
        order_id = %order.id,
        gateway_order_id = %gateway_order.id,
        amount = payment.amount,
        "payment order created"
    );

    Ok(ApiResponse::success(
        "Payment order created",
        PaymentOrder {
            order_number: order.order_number,
            gateway_order_id: gateway_order.id,
            gateway_key_id: state.gateway_settings.key_id.clone(),
            amount: payment.amount,
            currency: payment.currency,
        },
        Some(Meta::empty()),
    ))
}

pub async fn verify_payment(
    state: &AppState,
    user: &AuthUser,
    payload: VerifyPaymentRequest,
) -> AppResult<ApiResponse<PaymentVerified>> {
    let payment = Payments::find()
        .filter(PaymentCol::GatewayOrderId.eq(payload.gateway_order_id.as_str()))
        .one(&state.orm)
        .await?
        .ok_or(AppError::PaymentNotFound)?;

    let order = Orders::find_by_id(payment.order_id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::PaymentNotFound)?;
    if order.user_id != user.user_id {
        return Err(AppError::Forbidden);
    }

    if !verify_payment_signature(
        &payload.gateway_order_id,
        &payload.gateway_payment_id,
        &payload.signature,
        &state.gateway_settings.key_secret,
    ) {
        tracing::warn!(
            order_id = %order.id,
            gateway_order_id = %payload.gateway_order_id,
            gateway_payment_id = %payload.gateway_payment_id,
            "payment signature mismatch"
        );
        return Err(AppError::InvalidSignature);
    }

    match payment.payment_status {
        PaymentStatus::Success => return Err(AppError::AlreadyProcessed),
        PaymentStatus::Failed => return Err(AppError::PaymentFailed),
        PaymentStatus::Pending => {}
    }

    let settlement = settle(
        state,
        order.id,
        payment.id,
        &payload.gateway_payment_id,
        Some(&payload.signature),
        SettleSource::Checkout {
            user_id: user.user_id,
        },
    )
    .await?;

    match settlement {
        Settlement::Applied { order, payment } => Ok(ApiResponse::success(
            "Payment verified",
            PaymentVerified {
                order_number: order.order_number,
                payment_status: payment.payment_status,
                order_status: order.status,
            },
            Some(Meta::empty()),
        )),
        Settlement::AlreadyPaid { .. } => Err(AppError::AlreadyProcessed),
    }
}

/// Confirm an order and its payment in one transaction.
///
/// Locks in the global order: variants ascending, the order row, then the payment
/// row. When stock was not reserved at creation it is validated and deducted here;
/// a shortage aborts the whole transaction and leaves both rows pending.
pub async fn settle(
    state: &AppState,
    order_id: Uuid,
    payment_id: Uuid,
    gateway_payment_id: &str,
    signature: Option<&str>,
    source: SettleSource,
) -> AppResult<Settlement> {
    let txn = begin_locking(&state.orm, state.checkout.lock_timeout).await?;

    let quantities = quantities_for_order(&txn, order_id).await?;
    let mut locked = LockedVariants::acquire(&txn, quantities.keys().copied()).await?;
    let order = lock_order(&txn, order_id).await?.ok_or(AppError::NotFound)?;
    let payment = Payments::find_by_id(payment_id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or(AppError::PaymentNotFound)?;

    match (payment.payment_status, source) {
        (PaymentStatus::Success, _) => {
            txn.rollback().await?;
            return Ok(Settlement::AlreadyPaid { order });
        }
        (PaymentStatus::Failed, SettleSource::Checkout { .. }) => {
            return Err(AppError::PaymentFailed);
        }
        _ => {}
    }
    if order.status != OrderStatus::Pending {
        return Err(AppError::InvalidTransition {
            from: order.status,
            to: OrderStatus::Confirmed,
        });
    }

    let deducted_now = !order.stock_deducted;
    if deducted_now {
        locked.deduct_all(&txn, &quantities).await?;
    }

    let now = Utc::now();
    let mut active: PaymentActive = payment.into();
    active.payment_status = Set(PaymentStatus::Success);
    active.gateway_payment_id = Set(Some(gateway_payment_id.to_string()));
    if let Some(signature) = signature {
        active.gateway_signature = Set(Some(signature.to_string()));
    }
    active.paid_at = Set(Some(now.into()));
    active.updated_at = Set(now.into());
    let payment = active.update(&txn).await?;

    let order = transition(
        &txn,
        order,
        OrderStatus::Confirmed,
        source.changed_by(),
        Some(format!("Payment {gateway_payment_id} captured via {}", source.label())),
        |active| {
            active.expires_at = Set(None);
            active.stock_deducted = Set(true);
        },
    )
    .await?;

    txn.commit().await?;

    tracing::info!(
        order_id = %order.id,
        order_number = %order.order_number,
        gateway_payment_id,
        deducted_now,
        source = source.label(),
        "payment settled"
    );
    audit::record(
        &state.pool,
        source.changed_by(),
        AuditAction::PaymentSettled,
        serde_json::json!({
            "order_id": order.id,
            "payment_id": payment.id,
            "gateway_payment_id": gateway_payment_id,
            "source": source.label(),
        }),
    )
    .await;

    state.notifier.notify(Notification::OrderConfirmed {
        order_id: order.id,
        order_number: order.order_number.clone(),
        user_id: order.user_id,
    });

    Ok(Settlement::Applied { order, payment })
}

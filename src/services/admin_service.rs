use sea_orm::{Set, TransactionTrait};
use uuid::Uuid;

use crate::{
    audit::{self, AuditAction},
    db::begin_locking,
    dto::orders::UpdateOrderStatusRequest,
    entity::enums::OrderStatus,
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::Order,
    notifications::Notification,
    response::{ApiResponse, Meta},
    services::reservation_service::{self, lock_order, transition},
    state::AppState,
};

pub async fn update_order_status(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateOrderStatusRequest,
) -> AppResult<ApiResponse<Order>> {
    ensure_admin(user)?;

    let order = match payload.status {
        OrderStatus::Cancelled => {
            let txn = begin_locking(&state.orm, state.checkout.lock_timeout).await?;
            let released = reservation_service::cancel(
                &txn,
                id,
                Some(user.user_id),
                payload.notes.clone().or_else(|| Some("Cancelled by admin".into())),
            )
            .await?;
            txn.commit().await?;
            tracing::info!(
                order_id = %id,
                stock_restored = released.stock_restored,
                "order cancelled by admin"
            );
            released.order
        }
        // Confirmation belongs to payment settlement, which also reserves stock.
        OrderStatus::Confirmed => {
            return Err(AppError::BadRequest(
                "Orders are confirmed by payment settlement".into(),
            ));
        }
        next => {
            let txn = state.orm.begin().await?;
            let current = lock_order(&txn, id).await?.ok_or(AppError::NotFound)?;
            let tracking_number = payload.tracking_number.clone();
            let carrier_name = payload.carrier_name.clone();
            let order = transition(
                &txn,
                current,
                next,
                Some(user.user_id),
                payload.notes.clone(),
                |active| {
                    if let Some(tracking_number) = tracking_number {
                        active.tracking_number = Set(Some(tracking_number));
                    }
                    if let Some(carrier_name) = carrier_name {
                        active.carrier_name = Set(Some(carrier_name));
                    }
                },
            )
            .await?;
            txn.commit().await?;
            order
        }
    };

    audit::record(
        &state.pool,
        Some(user.user_id),
        AuditAction::OrderStatusUpdated,
        serde_json::json!({ "order_id": order.id, "status": order.status }),
    )
    .await;

    match order.status {
        OrderStatus::Shipped => state.notifier.notify(Notification::OrderShipped {
            order_id: order.id,
            order_number: order.order_number.clone(),
            user_id: order.user_id,
            tracking_number: order.tracking_number.clone(),
        }),
        OrderStatus::Delivered => state.notifier.notify(Notification::OrderDelivered {
            order_id: order.id,
            order_number: order.order_number.clone(),
            user_id: order.user_id,
        }),
        _ => {}
    }

    Ok(ApiResponse::success(
        "Order status updated",
        Order::from(order),
        Some(Meta::empty()),
    ))
}
